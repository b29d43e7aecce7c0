use crate::error::ProxyError;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::header::HOST;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Turns a CONNECT request into an opaque byte tunnel between the client
/// and the dialed target. After the 200 goes out, nothing on this path is
/// parsed as HTTP anymore.
pub struct TunnelEstablisher {
    connect_timeout: Duration,
}

impl TunnelEstablisher {
    pub fn new(connect_timeout_secs: u64) -> Self {
        Self {
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        }
    }

    pub async fn establish<B>(
        &self,
        mut req: Request<B>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ProxyError>
    where
        B: Send + 'static,
    {
        let authority = connect_authority(&req)?;

        // Dial failure is terminal for this request: no tunnel, one error
        // response.
        let target = timeout(self.connect_timeout, TcpStream::connect(&authority))
            .await
            .map_err(|_| ProxyError::TunnelDial(format!("dial {} timed out", authority)))?
            .map_err(|e| ProxyError::TunnelDial(format!("dial {}: {}", authority, e)))?;

        if req.extensions().get::<OnUpgrade>().is_none() {
            return Err(ProxyError::UpgradeUnsupported);
        }

        info!("CONNECT tunnel to {}", authority);

        // The raw takeover completes only after the 200 below has been
        // flushed to the client, which is the ordering CONNECT requires.
        tokio::spawn(async move {
            match hyper::upgrade::on(&mut req).await {
                Ok(upgraded) => {
                    let (client_read, client_write) = tokio::io::split(TokioIo::new(upgraded));
                    let (target_read, target_write) = target.into_split();
                    tokio::spawn(transfer(client_read, target_write, "client->target"));
                    tokio::spawn(transfer(target_read, client_write, "target->client"));
                }
                Err(e) => debug!("connection takeover for {} failed: {}", authority, e),
            }
        });

        Ok(Response::builder()
            .status(StatusCode::OK)
            .body(empty_body())
            .map_err(|e| ProxyError::Http(e.to_string()))?)
    }
}

/// Resolves the CONNECT target authority.
///
/// The `Host` header wins when present; otherwise the request-target is
/// used, stripped of any `http://` prefix and trailing path, because some
/// clients populate only the request line on CONNECT.
fn connect_authority<B>(req: &Request<B>) -> Result<String, ProxyError> {
    if let Some(host) = req.headers().get(HOST) {
        let host = host
            .to_str()
            .map_err(|e| ProxyError::Http(format!("Invalid Host header: {}", e)))?;
        if !host.is_empty() {
            return Ok(host.to_string());
        }
    }

    let target = req.uri().to_string();
    let target = target.strip_prefix("http://").unwrap_or(&target);
    let authority = match target.find('/') {
        Some(idx) => &target[..idx],
        None => target,
    };

    if authority.is_empty() {
        return Err(ProxyError::TunnelDial("empty CONNECT target".to_string()));
    }
    Ok(authority.to_string())
}

/// One direction of an established tunnel. Copies until the source hits
/// end-of-stream or errors, then releases both ends of its pair: the
/// destination write half is shut down and the source read half dropped.
/// The paired task observes the resulting EOF on its own source.
async fn transfer<R, W>(mut source: R, mut destination: W, direction: &'static str)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::io::copy(&mut source, &mut destination).await {
        Ok(bytes) => debug!("{}: {} bytes relayed", direction, bytes),
        // Mid-tunnel failures stay local; the client already holds its 200
        // and there is no response channel left.
        Err(e) => debug!("{}: tunnel closed: {}", direction, e),
    }
    let _ = destination.shutdown().await;
    drop(source);
}

fn empty_body() -> BoxBody<Bytes, hyper::Error> {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}
