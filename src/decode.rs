//! Status-based decoding of responses into results or typed errors

use bytes::Bytes;
use hyper::{Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{Error, Result};
use crate::transport::TransportBody;
use crate::types::{etcd_index_from_headers, EtcdError, EtcdResponse};

/// Drain a response body into memory
pub async fn read_body_to_bytes(body: TransportBody) -> Result<Bytes> {
    Ok(body.collect().await?.to_bytes())
}

/// Map a non-success response body to an error.
///
/// Bodies that are not an etcd error document (proxies, load balancers)
/// surface as [`Error::UnexpectedStatus`].
pub fn decode_error(status: StatusCode, body: &[u8]) -> Error {
    match serde_json::from_slice::<EtcdError>(body) {
        Ok(err) => Error::Etcd(err),
        Err(e) => {
            warn!("Non-etcd error body for status {}: {}", status, e);
            Error::UnexpectedStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(body).into_owned(),
            }
        }
    }
}

/// Decode any JSON success document, or the error on failure statuses.
///
/// Success bodies must be valid UTF-8 JSON; anything else is [`Error::Decode`].
pub async fn decode_json<T: DeserializeOwned>(response: Response<TransportBody>) -> Result<T> {
    let (parts, body) = response.into_parts();
    let bytes = read_body_to_bytes(body).await?;

    if parts.status.is_success() {
        Ok(serde_json::from_slice(&bytes)?)
    } else {
        Err(decode_error(parts.status, &bytes))
    }
}

/// Decode a keys API response, attaching the `X-Etcd-Index` header
pub async fn decode_response(response: Response<TransportBody>) -> Result<EtcdResponse> {
    let etcd_index = etcd_index_from_headers(response.headers());
    let mut decoded: EtcdResponse = decode_json(response).await?;
    decoded.etcd_index = etcd_index;
    Ok(decoded)
}
