use crate::config::Config;
use crate::error::ProxyError;
use crate::forward::HttpForwarder;
use crate::tunnel::TunnelEstablisher;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1::Builder as ServerBuilder;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use rustls::ServerConfig;
use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

type ProxyBody = BoxBody<Bytes, hyper::Error>;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Routes each inbound request by method: CONNECT goes to the tunnel
/// establisher, everything else to the HTTP forwarder. One instance is
/// shared by every connection task.
pub struct Dispatcher {
    forwarder: HttpForwarder,
    tunneler: TunnelEstablisher,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            forwarder: HttpForwarder::new(config.forward_timeout_secs),
            tunneler: TunnelEstablisher::new(
                config
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        }
    }

    pub async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<ProxyBody>, Infallible> {
        debug!("client request: {} {}", req.method(), req.uri());

        let result = if *req.method() == Method::CONNECT {
            self.tunneler.establish(req).await
        } else {
            self.forwarder.forward(req).await
        };

        match result {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("request failed: {}", e);
                // Only the tunnel dial and a missing raw takeover get their
                // own codes; everything else is 400 with the error text as
                // the body.
                let status = match e {
                    ProxyError::TunnelDial(_) => StatusCode::SERVICE_UNAVAILABLE,
                    ProxyError::UpgradeUnsupported => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                Ok(error_response(status, &e.to_string()))
            }
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .body(
            Full::new(Bytes::from(message.to_string()))
                .map_err(|never| match never {})
                .boxed(),
        )
        .unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Running,
    Stopped,
}

/// Caller-owned handle for the listening endpoint.
///
/// States move Idle -> Running -> Stopped: `start` binds the listener and
/// spawns the accept loop, `shutdown` signals it and waits for it to drain.
/// A handle never goes back to Idle; build a new one to listen again.
pub struct ProxyServer {
    config: Config,
    state: ServerState,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<watch::Sender<bool>>,
    accept_task: Option<JoinHandle<()>>,
}

impl ProxyServer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: ServerState::Idle,
            local_addr: None,
            shutdown_tx: None,
            accept_task: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The bound address once Running. Useful with a `:0` listen address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn start(&mut self) -> Result<(), ProxyError> {
        if self.state != ServerState::Idle {
            return Err(ProxyError::State(format!(
                "cannot start server in {:?} state",
                self.state
            )));
        }

        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let tls_acceptor = match (&self.config.private_key, &self.config.certificate) {
            (Some(key_path), Some(cert_path)) => {
                let tls_config = create_tls_config(key_path, cert_path)?;
                Some(TlsAcceptor::from(Arc::new(tls_config)))
            }
            _ => None,
        };

        let scheme = if tls_acceptor.is_some() { "https" } else { "http" };
        info!("forward proxy listening on: {}://{}", scheme, local_addr);

        let dispatcher = Arc::new(Dispatcher::new(&self.config));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            tls_acceptor,
            shutdown_rx,
        ));

        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.accept_task = Some(accept_task);
        self.state = ServerState::Running;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ProxyError> {
        if self.state != ServerState::Running {
            return Err(ProxyError::State(format!(
                "cannot shut down server in {:?} state",
                self.state
            )));
        }

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(accept_task) = self.accept_task.take() {
            if let Err(e) = accept_task.await {
                error!("accept loop task error: {}", e);
            }
        }

        self.state = ServerState::Stopped;
        info!("forward proxy stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    tls_acceptor: Option<TlsAcceptor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("accept failed: {}", e);
                        continue;
                    }
                };

                let dispatcher = dispatcher.clone();
                let tls_acceptor = tls_acceptor.clone();
                tokio::spawn(async move {
                    match tls_acceptor {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                serve_connection(TokioIo::new(tls_stream), dispatcher, remote_addr)
                                    .await
                            }
                            Err(e) => {
                                warn!("TLS handshake with {} failed: {}", remote_addr, e)
                            }
                        },
                        None => {
                            serve_connection(TokioIo::new(stream), dispatcher, remote_addr).await
                        }
                    }
                });
            }
        }
    }
}

async fn serve_connection<I>(io: I, dispatcher: Arc<Dispatcher>, remote_addr: SocketAddr)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let dispatcher = dispatcher.clone();
        async move { dispatcher.handle_request(req).await }
    });

    // with_upgrades is what makes the CONNECT raw takeover possible.
    if let Err(e) = ServerBuilder::new()
        .keep_alive(true)
        .preserve_header_case(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        debug!("connection from {} ended with error: {}", remote_addr, e);
    }
}

/// Create TLS server configuration from certificate and private key files
fn create_tls_config(private_key_path: &str, cert_path: &str) -> Result<ServerConfig, ProxyError> {
    let mut private_key_file = BufReader::new(File::open(private_key_path).map_err(|e| {
        ProxyError::Config(format!("Failed to open private key file: {}", e))
    })?);

    let mut cert_file = BufReader::new(
        File::open(cert_path)
            .map_err(|e| ProxyError::Config(format!("Failed to open certificate file: {}", e)))?,
    );

    let certs = rustls_pemfile::certs(&mut cert_file)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::Config(format!("Failed to read certificate: {}", e)))?;

    if certs.is_empty() {
        return Err(ProxyError::Config("No valid certificate found".to_string()));
    }

    let private_key = rustls_pemfile::private_key(&mut private_key_file)
        .map_err(|e| ProxyError::Config(format!("Failed to read private key: {}", e)))?
        .ok_or_else(|| ProxyError::Config("No valid private key found".to_string()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, private_key)
        .map_err(|e| ProxyError::Config(format!("Failed to create TLS config: {}", e)))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.listen_addr = "127.0.0.1:0".parse().unwrap();
        config
    }

    #[tokio::test]
    async fn test_server_state_transitions() {
        let mut server = ProxyServer::new(test_config());
        assert_eq!(server.state(), ServerState::Idle);
        assert!(server.local_addr().is_none());

        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.local_addr().is_some());

        server.shutdown().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_server_rejects_start_when_not_idle() {
        let mut server = ProxyServer::new(test_config());
        server.start().await.unwrap();

        assert!(matches!(server.start().await, Err(ProxyError::State(_))));

        server.shutdown().await.unwrap();
        assert!(matches!(server.start().await, Err(ProxyError::State(_))));
    }

    #[tokio::test]
    async fn test_server_rejects_shutdown_when_not_running() {
        let mut server = ProxyServer::new(test_config());
        assert!(matches!(
            server.shutdown().await,
            Err(ProxyError::State(_))
        ));
    }

    #[test]
    fn test_tls_config_requires_existing_files() {
        let result = create_tls_config("missing.key", "missing.crt");
        assert!(matches!(result, Err(ProxyError::Config(_))));
    }
}
