//! Signs a Microsoft account into Minecraft from the terminal using the
//! device-code flow and prints the resulting account.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use config_manager::LoginConfig;
use futures::StreamExt;
use microsoft_auth::{Account, FlowState, MicrosoftAuthenticator, NoBrowser};

#[derive(Parser)]
#[command(name = "fastmc-login")]
#[command(version)]
#[command(about = "Sign a Microsoft account into Minecraft with a device code")]
struct Cli {
    /// Azure application id; overrides the configured one
    #[arg(long)]
    client_id: Option<String>,

    /// Store the given client id in the config file
    #[arg(long, requires = "client_id")]
    save: bool,

    /// Do not open the verification page in a browser
    #[arg(long)]
    no_browser: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "fastmc_login={log_level},microsoft_auth={log_level},config_manager={log_level}"
                )
                .into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = LoginConfig::load().context("Failed to load config")?;
    if let Some(client_id) = cli.client_id {
        config.accounts.microsoft_client_id = Some(client_id);
        if cli.save {
            config.save().context("Failed to save config")?;
        }
    }

    let settings = config
        .auth_settings()
        .context("Microsoft client id is not configured, pass --client-id")?;
    let mut authenticator =
        MicrosoftAuthenticator::with_reqwest(&settings, config.http_timeout())?;
    if cli.no_browser || !config.accounts.open_browser {
        authenticator = authenticator.with_url_opener(Arc::new(NoBrowser));
    }

    let mut flow = authenticator.start();
    let cancel = flow.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling sign-in");
            cancel.cancel();
        }
    });

    while let Some(state) = flow.next().await {
        match state {
            FlowState::Start => tracing::info!("Requesting a device code"),
            FlowState::AwaitUser {
                user_code,
                verification_uri,
            } => {
                eprintln!();
                eprintln!("  Open {verification_uri} and enter the code {user_code}");
                eprintln!();
            }
            FlowState::Polling => tracing::info!("Waiting for the sign-in to be approved"),
            FlowState::GetAccountInfo => tracing::info!("Fetching the Minecraft account"),
            FlowState::Succeeded(account) => {
                print_account(&account, cli.format)?;
                return Ok(());
            }
            FlowState::Failed(err) => return Err(err).context("Sign-in failed"),
        }
    }

    anyhow::bail!("sign-in ended without a result")
}

fn print_account(account: &Account, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Signed in as {} ({})", account.username(), account.uuid());
            if let Some(skin) = account.active_skin() {
                println!("Skin: {}", skin.url);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(account)?);
        }
    }
    Ok(())
}
