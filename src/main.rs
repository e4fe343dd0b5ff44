use clap::{
    Args, CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use spotgraph::{cli, config, error};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize a tenant with the Spotify API
    Auth(TenantOption),

    /// Pull recently played tracks into the graph
    Sync(SyncOptions),

    /// Delete every node of a tenant
    DeleteTenant(TenantOption),

    /// Node counts per label for a tenant
    Stats(TenantOption),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Args, Debug, Clone)]
pub struct TenantOption {
    /// Tenant id
    #[clap(long)]
    tenant: String,
}

#[derive(Args, Debug, Clone)]
pub struct SyncOptions {
    /// Tenant id; can be repeated
    #[clap(long = "tenant", required_unless_present = "all", conflicts_with = "all")]
    tenants: Vec<String>,

    /// Synchronize every tenant with a configuration record
    #[clap(long)]
    all: bool,

    /// Maximum number of tenants synchronized concurrently
    #[clap(long)]
    workers: Option<usize>,

    /// Print pass reports as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spotgraph=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }
    let settings = match config::Settings::from_env() {
        Ok(s) => s,
        Err(e) => error!("Invalid configuration. Err: {}", e),
    };

    match cli.command {
        Command::Auth(opt) => cli::auth(&settings, &opt.tenant).await,
        Command::Sync(opt) => {
            cli::sync(&settings, opt.tenants, opt.all, opt.workers, opt.json).await
        }
        Command::DeleteTenant(opt) => cli::delete_tenant(&settings, &opt.tenant).await,
        Command::Stats(opt) => cli::stats(&settings, &opt.tenant).await,
        Command::Completions(_) => {}
    }
}
