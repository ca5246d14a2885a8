//! Redirect-following HTTP transport

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Response body handed back by a [`Transport`]
pub type TransportBody = UnsyncBoxBody<Bytes, Error>;

/// Wrap an in-memory payload as a [`TransportBody`]
pub fn full_body(bytes: impl Into<Bytes>) -> TransportBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Request extension marking a long-poll request, which is exempt from the
/// per-request timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongPoll;

/// Sends a request and returns the final response after redirects.
///
/// Implementations own connection management; the client only builds
/// requests and decodes responses.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Send `req`, following redirects, and return the final response
    fn send(
        &self,
        req: Request<Full<Bytes>>,
    ) -> impl Future<Output = Result<Response<TransportBody>>> + Send;
}

/// Build a rustls ClientConfig verifying against the webpki root store.
fn build_tls_config() -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Pooled hyper client speaking HTTP/1.1 and h2 over plaintext or TLS.
///
/// Follows `301`, `302`, `303`, `307` and `308` responses up to
/// `max_redirects` hops, re-sending the original method, headers and body to
/// the `Location` target (v2 followers redirect writes to the leader). A `303`
/// is re-issued as a `GET` without a body.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: HttpClient<HttpsConnector, Full<Bytes>>,
    max_redirects: usize,
    timeout_ms: u64,
}

impl HttpTransport {
    /// Create a transport with the given redirect limit and request timeout
    pub fn new(max_redirects: usize, timeout_ms: u64) -> Result<Self> {
        let tls_config = build_tls_config()?;

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let http_client = HttpClient::builder(TokioExecutor::new()).build(https_connector);

        Ok(Self {
            http_client,
            max_redirects,
            timeout_ms,
        })
    }

    async fn dispatch(&self, req: Request<Full<Bytes>>, long_poll: bool) -> Result<Response<TransportBody>> {
        let response = if long_poll {
            self.http_client.request(req).await
        } else {
            let timeout = Duration::from_millis(self.timeout_ms);
            tokio::time::timeout(timeout, self.http_client.request(req))
                .await
                .map_err(|_| Error::Timeout(self.timeout_ms))?
        };

        let response = response.map_err(|e| Error::Connection(format!("Request failed: {}", e)))?;

        Ok(response.map(|body| {
            body.map_err(|e| Error::Connection(format!("Failed to read body: {}", e)))
                .boxed_unsync()
        }))
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Resolve a `Location` header value against the URI that produced it
pub(crate) fn resolve_location(base: &Uri, location: &str) -> Result<Uri> {
    let base = Url::parse(&base.to_string())
        .map_err(|e| Error::InvalidUrl(format!("Invalid request URL: {}", e)))?;
    let target = base
        .join(location)
        .map_err(|e| Error::InvalidUrl(format!("Invalid redirect location '{}': {}", location, e)))?;
    target
        .as_str()
        .parse()
        .map_err(|e| Error::InvalidUrl(format!("Invalid redirect location '{}': {}", location, e)))
}

/// Method, headers and body sent on one hop of a redirect chain
#[derive(Debug, Clone)]
struct Hop {
    method: Method,
    headers: HeaderMap,
    body: Bytes,
}

impl Hop {
    fn request(&self, uri: Uri) -> Request<Full<Bytes>> {
        let mut req = Request::new(Full::new(self.body.clone()));
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = uri;
        *req.headers_mut() = self.headers.clone();
        req
    }

    /// The hop to send after a redirect answered with `status`
    fn redirected(mut self, status: StatusCode) -> Hop {
        if status == StatusCode::SEE_OTHER && self.method != Method::HEAD {
            self.method = Method::GET;
            self.body = Bytes::new();
            self.headers.remove(CONTENT_TYPE);
            self.headers.remove(CONTENT_LENGTH);
        }
        self
    }
}

impl Transport for HttpTransport {
    async fn send(&self, req: Request<Full<Bytes>>) -> Result<Response<TransportBody>> {
        let long_poll = req.extensions().get::<LongPoll>().is_some();
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        let mut hop = Hop {
            method: parts.method,
            headers: parts.headers,
            body,
        };
        let mut uri = parts.uri;
        for _ in 0..=self.max_redirects {
            debug!("Sending request: {} {}", hop.method, uri);
            let response = self.dispatch(hop.request(uri.clone()), long_poll).await?;

            let status = response.status();
            if !is_followed_redirect(status) {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(hyper::header::LOCATION)
                .and_then(|v| v.to_str().ok());
            let Some(location) = location else {
                return Ok(response);
            };

            let next = resolve_location(&uri, location)?;
            debug!("Following {} redirect: {} -> {}", status.as_u16(), uri, next);
            uri = next;
            hop = hop.redirected(status);
        }

        Err(Error::TooManyRedirects(self.max_redirects))
    }
}
