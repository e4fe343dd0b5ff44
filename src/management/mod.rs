mod token;

pub use token::TokenManager;
pub use token::TokenStatus;
