use clap::Parser;
use log::info;
use portcullis::config::{Config, LoggingConfig};
use portcullis::logging;
use portcullis::proxy::ProxyServer;
use std::path::Path;
use tokio::signal;

#[derive(Parser)]
#[clap(
    version = "0.3.1",
    about = "A forward HTTP/HTTPS proxy with CONNECT tunneling"
)]
struct Args {
    #[clap(short, long, value_name = "ADDR", help = "Listen address (e.g., 127.0.0.1:3128)")]
    listen: Option<String>,

    #[clap(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<String>,

    #[clap(long, value_name = "SECONDS", help = "CONNECT dial timeout in seconds")]
    connect_timeout: Option<u64>,

    #[clap(long, value_name = "SECONDS", help = "Outbound HTTP request timeout in seconds (no limit when omitted)")]
    forward_timeout: Option<u64>,

    #[clap(long, value_name = "FILE", help = "Private key file path for serving the proxy endpoint over TLS")]
    private_key: Option<String>,

    #[clap(long, value_name = "FILE", help = "Certificate file path for serving the proxy endpoint over TLS")]
    certificate: Option<String>,

    #[clap(long, value_name = "LEVEL", help = "Log level: trace, debug, info, warn, error")]
    log_level: Option<String>,

    #[clap(long, value_name = "FORMAT", help = "Log format: text or json")]
    log_format: Option<String>,

    #[clap(long, value_name = "FILE", help = "Generate a sample configuration file")]
    generate_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(config_file) = &args.generate_config {
        generate_sample_config(config_file)?;
        println!("Sample configuration file generated: {}", config_file);
        return Ok(());
    }

    let mut config = if let Some(config_file) = &args.config {
        if !Path::new(config_file).exists() {
            return Err(format!("Configuration file not found: {}", config_file).into());
        }
        Config::from_file(config_file)?
    } else {
        Config::default()
    };
    apply_arg_overrides(&mut config, &args)?;

    logging::init(&build_logging_config(&config, &args)?)?;

    info!("Starting proxy server...");
    let mut server = ProxyServer::new(config);
    server.start().await?;

    signal::ctrl_c().await?;
    info!("🛑 Received Ctrl+C, shutting down gracefully...");
    server.shutdown().await?;
    info!("👋 Proxy server stopped. Goodbye!");
    Ok(())
}

fn apply_arg_overrides(config: &mut Config, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(listen) = &args.listen {
        config.listen_addr = listen.parse()?;
    }
    if args.connect_timeout.is_some() {
        config.connect_timeout_secs = args.connect_timeout;
    }
    if args.forward_timeout.is_some() {
        config.forward_timeout_secs = args.forward_timeout;
    }
    if args.private_key.is_some() {
        config.private_key = args.private_key.clone();
    }
    if args.certificate.is_some() {
        config.certificate = args.certificate.clone();
    }
    Ok(())
}

fn build_logging_config(
    config: &Config,
    args: &Args,
) -> Result<LoggingConfig, Box<dyn std::error::Error>> {
    let mut logging_config = config.logging.clone().unwrap_or_default();
    if let Some(level) = &args.log_level {
        logging_config.level = Some(logging::parse_log_level(level)?);
    }
    if let Some(format) = &args.log_format {
        logging_config.format = Some(logging::parse_log_format(format)?);
    }
    Ok(logging_config)
}

fn generate_sample_config(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sample = r#"{
  "listen_addr": "127.0.0.1:3128",
  "connect_timeout_secs": 10,
  "forward_timeout_secs": null,
  "logging": {
    "level": "info",
    "format": "text"
  }
}"#;

    std::fs::write(file_path, sample)?;
    Ok(())
}
