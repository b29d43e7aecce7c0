use crate::error::ProxyError;
use crate::headers;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::{debug, info};
use tokio::time::{timeout, Duration};
use url::Url;

/// Relays one plain-HTTP request to its origin on behalf of the client.
///
/// The proxy always talks unencrypted HTTP to the origin on this path;
/// encrypted traffic goes through the CONNECT tunnel instead.
pub struct HttpForwarder {
    client: Client<HttpConnector, Incoming>,
    forward_timeout: Option<Duration>,
}

impl HttpForwarder {
    /// `forward_timeout_secs` bounds the whole outbound exchange when set.
    /// Unset means the request waits on the origin indefinitely.
    pub fn new(forward_timeout_secs: Option<u64>) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new())
                .http1_preserve_header_case(true)
                .build_http(),
            forward_timeout: forward_timeout_secs.map(Duration::from_secs),
        }
    }

    pub async fn forward(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ProxyError> {
        let target_uri = extract_target_uri(&req)?;
        info!("HTTP request: {} {}", req.method(), target_uri);

        let (parts, body) = req.into_parts();

        // Same method, body moved through untouched. A request without a
        // body stays bodyless on the wire rather than gaining an empty one.
        let mut outbound = Request::builder()
            .method(parts.method)
            .uri(target_uri)
            .body(body)
            .map_err(|e| ProxyError::Http(e.to_string()))?;
        headers::copy_request_headers(&parts.headers, outbound.headers_mut());

        // Single shot, no retry. Failure surfaces to the dispatcher.
        let response = match self.forward_timeout {
            Some(bound) => timeout(bound, self.client.request(outbound))
                .await
                .map_err(|_| ProxyError::Connection("Request timeout".to_string()))?,
            None => self.client.request(outbound).await,
        }
        .map_err(|e| ProxyError::Http(e.to_string()))?;

        debug!("origin responded with status {}", response.status());

        // Status and headers are written before any body bytes; the body
        // itself streams to the client as it arrives from the origin and is
        // released when the stream is dropped, on every exit path.
        let (parts, body) = response.into_parts();
        let mut relayed = Response::builder()
            .status(parts.status)
            .body(body.boxed())
            .map_err(|e| ProxyError::Http(e.to_string()))?;
        headers::copy_response_headers(&parts.headers, relayed.headers_mut());

        Ok(relayed)
    }
}

/// Builds the origin URL for a proxied request.
///
/// The authority comes from the `Host` header, falling back to the
/// absolute-form request URI; the scheme is always `http` and the path and
/// query carry over unchanged.
fn extract_target_uri<B>(req: &Request<B>) -> Result<Uri, ProxyError> {
    let authority = match req.headers().get(HOST) {
        Some(host) => host
            .to_str()
            .map_err(|e| ProxyError::Http(format!("Invalid Host header: {}", e)))?
            .to_string(),
        None => req
            .uri()
            .authority()
            .map(|a| a.to_string())
            .ok_or_else(|| ProxyError::Http("Cannot determine target host".to_string()))?,
    };

    let absolute_url = match req.uri().path_and_query() {
        Some(pq) => format!("http://{}{}", authority, pq.as_str()),
        None => format!("http://{}", authority),
    };

    let url = Url::parse(&absolute_url)?;
    url.as_str()
        .parse::<Uri>()
        .map_err(|e| ProxyError::Uri(e.to_string()))
}
