//! SimplISS NFSe command line client.
//!
//! Run with: `simpliss-nfse --config config.json --cert cert.pem --key key.pem
//! --operation ConsultarNfseServicoTomado --body request.xml`

use anyhow::{Context, Result};
use clap::Parser;
use simpliss_nfse::{Certificate, ClientConfig, Environment, NfseClient};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Send one request to a SimplISS NFSe web service.
///
/// The request body is wrapped in the operation envelope, sent to the
/// endpoint listed for the configured municipality, and the normalized
/// response is printed to stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or YAML)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// PEM certificate for mutual TLS
    #[arg(long)]
    cert: Option<PathBuf>,

    /// PEM private key matching --cert
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Operation name as listed in the service catalog
    #[arg(short, long)]
    operation: String,

    /// File holding the request body XML
    #[arg(short, long)]
    body: PathBuf,

    /// Target production instead of the configured environment
    #[arg(long)]
    production: bool,

    /// Print the raw response instead of the normalized one
    #[arg(long)]
    raw: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting SimplISS NFSe client v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let config = ClientConfig::from_path(&args.config).context("Failed to load config file")?;

    info!(
        version = %config.version,
        uf = %config.jurisdiction,
        municipality = %config.municipality,
        proxy = config.proxy.is_configured(),
        "Configuration loaded"
    );

    // Load the client certificate
    let certificate = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            Certificate::from_pem_files(cert, key).context("Failed to read certificate")?
        }
        (Some(_), None) => anyhow::bail!("--cert requires --key"),
        _ => {
            warn!("No certificate given, connecting without client authentication");
            Certificate::default()
        }
    };

    // Read the request body
    let body = std::fs::read_to_string(&args.body)
        .with_context(|| format!("Failed to read request body {}", args.body.display()))?;

    // Create the client
    let mut client = NfseClient::new(config, certificate).context("Invalid configuration")?;
    if args.production {
        client.set_environment(Environment::Production);
    }

    // Dispatch and report
    let result = client
        .dispatch(&args.operation, &body)
        .with_context(|| format!("Dispatch of {} failed", args.operation))?;

    for issue in &result.validation_issues {
        warn!(issue = %issue, "Schema validation issue");
    }

    if let Some(fault) = result.fault() {
        warn!(code = %fault.code, reason = %fault.reason, "Server returned a SOAP Fault");
    }

    if args.raw {
        println!("{}", result.raw_response);
    } else {
        println!("{}", result.cleaned);
    }

    Ok(())
}
