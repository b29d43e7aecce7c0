use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
}

fn default_connect_timeout() -> Option<u64> {
    Some(10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Bound on the CONNECT-path TCP dial.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: Option<u64>,
    /// Bound on the whole outbound exchange for plain HTTP requests.
    /// Absent means the proxy waits on the origin without limit.
    #[serde(default)]
    pub forward_timeout_secs: Option<u64>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
            connect_timeout_secs: Some(10),
            forward_timeout_secs: None,
            private_key: None,
            certificate: None,
            logging: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.connect_timeout_secs, Some(10));
        assert_eq!(config.forward_timeout_secs, None);
        assert!(config.private_key.is_none());
        assert!(config.certificate.is_none());
    }

    #[test]
    fn test_minimal_document_gets_defaults() {
        let config: Config = serde_json::from_str(r#"{"listen_addr": "127.0.0.1:3128"}"#).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3128".parse().unwrap());
        assert_eq!(config.connect_timeout_secs, Some(10));
        assert_eq!(config.forward_timeout_secs, None);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("proxy.json");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.forward_timeout_secs = Some(30);
        config.to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.listen_addr, config.listen_addr);
        assert_eq!(loaded.forward_timeout_secs, Some(30));
    }
}
