use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dialbridge::providers::{Telephony, TwilioClient};
use dialbridge::{ApiServer, ApiState, Config, Providers};

/// Dialbridge - Real-time spoken-dialogue bridge for phone calls
#[derive(Parser)]
#[command(name = "dialbridge", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge server (default)
    Serve,
    /// Place an outbound call that connects to this bridge
    Call {
        /// Number to dial, E.164 format
        number: String,
    },
    /// Print a fresh API key for the call-initiation endpoint
    GenerateKey,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,dialbridge=info",
        1 => "info,dialbridge=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.port).await,
        Command::Call { number } => call(&number).await,
        Command::GenerateKey => {
            println!("{}", generate_key());
            Ok(())
        }
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate_for_serving()?;
    tracing::debug!(?config, "loaded configuration");

    if config.server.api_keys.is_empty() {
        tracing::warn!("no API keys configured, call initiation endpoint will reject every request");
    }

    let providers = Providers::from_config(&config)?;
    let server = ApiServer::new(ApiState::new(config, providers));

    tracing::info!("dialbridge ready");
    server.run().await?;

    Ok(())
}

async fn call(number: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let telephony = TwilioClient::from_config(&config)?;

    let call_sid = telephony.initiate_call(number).await?;
    println!("Call initiated to {number}: {call_sid}");

    Ok(())
}

/// 32 random bytes, hex encoded
fn generate_key() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_is_64_hex_chars() {
        let key = generate_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_key());
    }

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::parse_from(["dialbridge", "-v"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["dialbridge", "call", "+15550100"]);
        assert!(matches!(cli.command, Some(Command::Call { number }) if number == "+15550100"));
    }
}
