//! Mapping of logical operations onto HTTP requests

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, Uri};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Error, Result};
use crate::params::Params;

/// Path prefix of the keys API
pub const KEYS_PREFIX: &str = "/v2/keys";

/// Content type of write-style request bodies
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Characters allowed unencoded in URI path segments per RFC 3986, plus `/`
/// so that a key keeps its directory structure.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@')
    .remove(b'/');

/// Path of `key` under the keys API. A leading `/` on the key is optional.
pub fn keys_path(key: &str) -> String {
    let key = key.strip_prefix('/').unwrap_or(key);
    format!("{}/{}", KEYS_PREFIX, utf8_percent_encode(key, PATH_SEGMENT))
}

/// Where a request carries its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// URL query string
    Query,
    /// Form-encoded request body
    Body,
}

impl Placement {
    /// PUT and POST carry a form body; every other method uses the query.
    pub fn for_method(method: &Method) -> Self {
        if method == Method::PUT || method == Method::POST {
            Placement::Body
        } else {
            Placement::Query
        }
    }
}

/// A fully described API call, independent of the endpoint it is sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute path, already percent-encoded
    pub path: String,
    /// Ordered optional parameters
    pub params: Params,
}

impl ApiRequest {
    /// Request against `/v2/keys/<key>`. The key is not validated.
    pub fn keys(method: Method, key: &str, params: Params) -> Self {
        Self {
            method,
            path: keys_path(key),
            params,
        }
    }

    /// Request against an arbitrary path without parameters
    pub fn raw(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            params: Params::new(),
        }
    }

    /// Where the parameters of this request go
    pub fn placement(&self) -> Placement {
        Placement::for_method(&self.method)
    }

    /// Path plus query string, if any
    pub fn path_and_query(&self) -> String {
        match self.placement() {
            Placement::Query if !self.params.is_empty() => {
                format!("{}?{}", self.path, self.params.to_query())
            }
            _ => self.path.clone(),
        }
    }

    /// Encoded form body for PUT/POST requests
    pub fn body(&self) -> Option<Bytes> {
        match self.placement() {
            Placement::Body => Some(self.params.to_body()),
            Placement::Query => None,
        }
    }

    /// Assemble the HTTP request against `endpoint` (scheme and authority, no path)
    pub fn build(&self, endpoint: &str) -> Result<Request<Full<Bytes>>> {
        let url = format!("{}{}", endpoint.trim_end_matches('/'), self.path_and_query());
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::InvalidUrl(format!("Invalid request URL: {}", e)))?;

        let builder = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .header(hyper::header::ACCEPT, "application/json");

        let req = match self.body() {
            Some(body) => builder
                .header(hyper::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(Full::new(body)),
            None => builder.body(Full::new(Bytes::new())),
        };

        req.map_err(|e| Error::InvalidRequest(format!("Failed to build request: {}", e)))
    }
}
