pub mod config;
pub mod error;
pub mod forward;
pub mod headers;
pub mod logging;
pub mod proxy;
pub mod tunnel;

pub use config::Config;
pub use error::ProxyError;
pub use proxy::{ProxyServer, ServerState};
