use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use tracing::warn;

use crate::{
    error::AuthError,
    types::{Secret, Token, TokenResponse},
};

/// One of the two grants accepted by the token endpoint.
#[derive(Debug, Clone)]
pub enum Grant {
    AuthorizationCode { code: String, code_verifier: String },
    RefreshToken(Secret),
}

impl Grant {
    /// Builds a grant from optional parts.
    ///
    /// Exactly one of `(auth_code, code_verifier)` or `refresh_token` must be
    /// supplied; anything else is rejected before the network is touched.
    pub fn from_parts(
        auth_code: Option<String>,
        code_verifier: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<Self, AuthError> {
        let auth_code = auth_code.filter(|c| !c.is_empty());
        let refresh_token = refresh_token.filter(|t| !t.is_empty());

        match (auth_code, refresh_token) {
            (Some(_), Some(_)) | (None, None) => Err(AuthError::MissingGrant),
            (None, Some(token)) => Ok(Grant::RefreshToken(Secret::new(token))),
            (Some(code), None) => match code_verifier.filter(|v| !v.is_empty()) {
                Some(code_verifier) => Ok(Grant::AuthorizationCode {
                    code,
                    code_verifier,
                }),
                None => Err(AuthError::MissingVerifier),
            },
        }
    }

    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::RefreshToken(_) => "refresh_token",
        }
    }
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange(&self, grant: &Grant) -> Result<Token, AuthError>;
}

/// Parameters of the authorization redirect.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_url: String,
}

/// Builds the PKCE authorization URL for a state nonce and code challenge.
pub fn authorization_url(
    settings: &OAuthSettings,
    state: &str,
    code_challenge: &str,
) -> Result<String, AuthError> {
    let url = Url::parse_with_params(
        &settings.auth_url,
        &[
            ("response_type", "code"),
            ("client_id", settings.client_id.as_str()),
            ("state", state),
            ("scope", settings.scope.as_str()),
            ("code_challenge_method", "S256"),
            ("code_challenge", code_challenge),
            ("redirect_uri", settings.redirect_uri.as_str()),
        ],
    )
    .map_err(|e| AuthError::Decode(format!("invalid authorization url: {e}")))?;
    Ok(url.to_string())
}

/// Spotify accounts service token endpoint. Public client: no secret is sent.
#[derive(Clone)]
pub struct HttpTokenEndpoint {
    http: Client,
    token_url: String,
    client_id: String,
    redirect_uri: String,
}

impl HttpTokenEndpoint {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange(&self, grant: &Grant) -> Result<Token, AuthError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant.grant_type()),
            ("client_id", self.client_id.as_str()),
        ];
        match grant {
            Grant::AuthorizationCode {
                code,
                code_verifier,
            } => {
                form.push(("code", code.as_str()));
                form.push(("code_verifier", code_verifier.as_str()));
                form.push(("redirect_uri", self.redirect_uri.as_str()));
            }
            Grant::RefreshToken(refresh_token) => {
                form.push(("refresh_token", refresh_token.expose()));
            }
        }

        let res = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            warn!(grant_type = grant.grant_type(), status = status.as_u16(), "token exchange rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let json: TokenResponse = res
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        // Refresh responses may omit the refresh token; the old one stays valid.
        let refresh_token = match (json.refresh_token, grant) {
            (Some(token), _) if !token.is_empty() => Secret::new(token),
            (_, Grant::RefreshToken(previous)) => previous.clone(),
            _ => Secret::default(),
        };

        Ok(Token {
            access_token: Secret::new(json.access_token),
            refresh_token,
            scope: json.scope,
            expires_in: json.expires_in,
            obtained_at: Utc::now().timestamp() as u64,
        })
    }
}
