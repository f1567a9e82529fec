//! scanlogin - Log in on a second device by scanning a rotating QR code
//!
//! Runs one QR login against an identity provider and prints the token
//! response as JSON.

use anyhow::Result;
use clap::Parser;
use scanlogin_core::{ClientConfig, HandshakeConfig, ResponseType};
use scanlogin_handshake::{
    AuthorizeOptions, HandshakeError, HandshakeState, QrAuthorizer, QrDisplay, QrPayload,
};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// scanlogin - Log in by scanning a QR code with another device
#[derive(Parser, Debug)]
#[command(name = "scanlogin")]
#[command(version, about, long_about = None)]
struct Args {
    /// Identity provider domain, or a full http(s) origin
    domain: String,

    /// OAuth2 client id
    client_id: String,

    /// Requested scope
    #[arg(short, long, default_value = "openid")]
    scope: String,

    /// Authentication methods to offer (comma separated acr values)
    #[arg(short, long, value_delimiter = ',')]
    acr_values: Vec<String>,

    /// Response type: code or id_token
    #[arg(short, long, default_value = "id_token")]
    response_type: String,

    /// Correlation state echoed on the result
    #[arg(long)]
    state: Option<String>,

    /// QR refresh interval in milliseconds
    #[arg(long, default_value = "2500")]
    refresh_ms: u64,

    /// How long a displayed QR code stays scannable, in seconds
    #[arg(long, default_value = "30")]
    lifetime_secs: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Prints each QR payload URL to the terminal
struct TerminalDisplay;

impl QrDisplay for TerminalDisplay {
    fn show(&mut self, payload: &QrPayload) {
        println!("Scan to log in: {}", payload.url);
    }

    fn clear(&mut self) {
        info!("QR code removed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("scanlogin v{}", env!("CARGO_PKG_VERSION"));

    let response_type: ResponseType = args
        .response_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let config = ClientConfig::new(args.domain, args.client_id)
        .with_scope(args.scope)
        .with_response_type(response_type)
        .with_acr_values(args.acr_values);
    let handshake = HandshakeConfig::new()
        .with_refresh_interval(Duration::from_millis(args.refresh_ms))
        .with_lifetime_budget(Duration::from_secs(args.lifetime_secs));

    let authorizer = QrAuthorizer::new(config).with_handshake_config(handshake);
    let options = AuthorizeOptions {
        state: args.state,
        ..Default::default()
    };

    let mut handle = authorizer
        .authorize(options, Box::new(TerminalDisplay))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start QR login: {}", e))?;

    let canceller = handle.canceller();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling login...");
        canceller.cancel();
    });

    while let Some(state) = handle.next_state().await {
        if state == HandshakeState::Acknowledged {
            info!("QR code scanned, waiting for the login to complete");
        }
        if state.is_terminal() {
            break;
        }
    }

    match handle.result().await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(HandshakeError::Cancelled { .. }) => {
            info!("Login cancelled");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Login failed: {}", e)),
    }
}
