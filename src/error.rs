use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Tunnel dial error: {0}")]
    TunnelDial(String),

    #[error("Connection takeover not supported by the serving layer")]
    UpgradeUnsupported,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("URI error: {0}")]
    Uri(String),

    #[error("Server state error: {0}")]
    State(String),

    #[error("Hyper error: {0}")]
    Hyper(String),
}
