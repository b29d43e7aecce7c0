use crate::config::{LogFormat, LogLevel, LoggingConfig};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::io::Write;

/// Initializes the global logger from the logging section of the config.
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = config.level.clone().unwrap_or_default();
    let format = config.format.clone().unwrap_or_default();

    match format {
        LogFormat::Json => {
            let mut builder = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or(level.to_string()),
            );
            builder.format(|buf, record| {
                let timestamp: DateTime<Utc> = Utc::now();
                let timestamp_str = timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
                let log_entry = json!({
                    "timestamp": timestamp_str,
                    "level": record.level().to_string().to_lowercase(),
                    "target": record.target(),
                    "module": record.module_path().unwrap_or("unknown"),
                    "file": record.file().unwrap_or("unknown"),
                    "line": record.line().unwrap_or(0),
                    "message": record.args().to_string(),
                });
                writeln!(
                    buf,
                    "{}",
                    serde_json::to_string(&log_entry).unwrap_or_default()
                )
            });
            builder.init();
        }
        LogFormat::Text => {
            env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or(level.to_string()),
            )
            .init();
        }
    }

    Ok(())
}

// Parse string to LogLevel
pub fn parse_log_level(s: &str) -> Result<LogLevel, Box<dyn std::error::Error>> {
    match s.to_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        _ => Err(format!(
            "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
            s
        )
        .into()),
    }
}

// Parse string to LogFormat
pub fn parse_log_format(s: &str) -> Result<LogFormat, Box<dyn std::error::Error>> {
    match s.to_lowercase().as_str() {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        _ => Err(format!("Invalid log format: {}. Must be one of: text, json", s).into()),
    }
}
