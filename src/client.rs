//! etcd v2 keys API client

use std::sync::Arc;

use hyper::{Method, Uri};
use tracing::debug;

use crate::config::ClientConfig;
use crate::decode::{decode_json, decode_response};
use crate::error::{Error, Result};
use crate::params::Params;
use crate::request::ApiRequest;
use crate::transport::{HttpTransport, LongPoll, Transport};
use crate::types::{EtcdResponse, VersionInfo};
use crate::watch::{wait_params, watch_stream, WatchCursor, WatchStream};

/// Client for the etcd v2 keys API
///
/// Every operation maps to one HTTP request (plus any redirects the transport
/// follows) and resolves to an [`EtcdResponse`] or an [`Error`]. Server-side
/// failures arrive as [`Error::Etcd`] carrying the decoded error document.
///
/// The client is cheap to clone; clones share the connection pool.
///
/// # Example
/// ```rust,no_run
/// use etcd_v2_client::EtcdClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), etcd_v2_client::Error> {
///     let client = EtcdClient::new("http://127.0.0.1:2379")?;
///
///     client.set("/config/mode", "active", None).await?;
///     let resp = client.get("/config/mode", false, false).await?;
///     println!("mode = {:?}", resp.value());
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct EtcdClient<T: Transport = HttpTransport> {
    config: Arc<ClientConfig>,
    transport: T,
}

impl EtcdClient<HttpTransport> {
    /// Create a client for `endpoint` with default settings
    ///
    /// # Errors
    /// Returns an error if the endpoint URL is invalid
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(endpoint))
    }

    /// Create a client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.max_redirects, config.timeout_ms)?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> EtcdClient<T> {
    /// Create a client sending its requests through `transport`
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        // Validate the endpoint URL early
        let uri: Uri = config
            .endpoint
            .parse()
            .map_err(|e| Error::InvalidUrl(format!("Invalid endpoint URL: {}", e)))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(Error::InvalidUrl(format!(
                "Endpoint must include scheme and host: {}",
                config.endpoint
            )));
        }

        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn execute(&self, request: ApiRequest, long_poll: bool) -> Result<EtcdResponse> {
        debug!("{} {}", request.method, request.path);
        let mut req = request.build(&self.config.endpoint)?;
        if long_poll {
            req.extensions_mut().insert(LongPoll);
        }
        let response = self.transport.send(req).await?;
        decode_response(response).await
    }

    async fn keys(&self, method: Method, key: &str, params: Params) -> Result<EtcdResponse> {
        self.execute(ApiRequest::keys(method, key, params), false).await
    }

    /// Read a key or directory
    ///
    /// # Example
    /// ```rust,no_run
    /// # use etcd_v2_client::EtcdClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), etcd_v2_client::Error> {
    /// # let client = EtcdClient::new("http://127.0.0.1:2379")?;
    /// let resp = client.get("/services", true, true).await?;
    /// for node in resp.node.children() {
    ///     println!("{} = {:?}", node.key, node.value);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get(&self, key: &str, recursive: bool, sorted: bool) -> Result<EtcdResponse> {
        let params = Params::new()
            .flag("recursive", recursive)
            .flag("sorted", sorted);
        self.keys(Method::GET, key, params).await
    }

    /// Read through the raft log so the answer reflects every committed write
    pub async fn get_quorum(&self, key: &str, recursive: bool, sorted: bool) -> Result<EtcdResponse> {
        let params = Params::new()
            .flag("recursive", recursive)
            .flag("sorted", sorted)
            .flag("quorum", true);
        self.keys(Method::GET, key, params).await
    }

    /// Wait once for the next change of `key` at or after `wait_index`
    pub async fn wait(
        &self,
        key: &str,
        wait_index: Option<u64>,
        recursive: bool,
        sorted: bool,
        quorum: bool,
    ) -> Result<EtcdResponse> {
        let params = wait_params(wait_index, recursive, sorted, quorum);
        self.execute(ApiRequest::keys(Method::GET, key, params), true).await
    }

    pub(crate) async fn wait_at(&self, cursor: &WatchCursor) -> Result<EtcdResponse> {
        self.execute(ApiRequest::keys(Method::GET, &cursor.key, cursor.params()), true)
            .await
    }

    /// Write `value` to `key`, optionally expiring after `ttl` seconds
    pub async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<EtcdResponse> {
        let params = Params::new().value("value", value).opt("ttl", ttl);
        self.keys(Method::PUT, key, params).await
    }

    /// Write `value` only if the current node matches every given condition.
    ///
    /// `prev_exist = Some(false)` turns the write into create-if-absent.
    pub async fn compare_and_set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<u64>,
        prev_value: Option<&str>,
        prev_index: Option<u64>,
        prev_exist: Option<bool>,
    ) -> Result<EtcdResponse> {
        let params = Params::new()
            .value("value", value)
            .opt("ttl", ttl)
            .opt("prevValue", prev_value)
            .opt("prevIndex", prev_index)
            .opt("prevExist", prev_exist);
        self.keys(Method::PUT, key, params).await
    }

    /// Remove the expiration of an existing key, keeping its value
    pub async fn clear_ttl(&self, key: &str) -> Result<EtcdResponse> {
        let params = Params::new().value("ttl", "").flag("prevExist", true);
        self.keys(Method::PUT, key, params).await
    }

    /// Append `value` under directory `key` with a server-generated, ordered name
    pub async fn create(&self, key: &str, value: &str) -> Result<EtcdResponse> {
        let params = Params::new().value("value", value);
        self.keys(Method::POST, key, params).await
    }

    /// Create a directory, optionally expiring after `ttl` seconds
    pub async fn create_dir(&self, key: &str, ttl: Option<u64>) -> Result<EtcdResponse> {
        let params = Params::new().flag("dir", true).opt("ttl", ttl);
        self.keys(Method::PUT, key, params).await
    }

    /// Delete a key, or a whole subtree when `recursive`
    pub async fn delete(&self, key: &str, recursive: bool) -> Result<EtcdResponse> {
        let params = Params::new().flag("recursive", recursive);
        self.keys(Method::DELETE, key, params).await
    }

    /// Delete a directory; without `recursive` it must be empty
    pub async fn delete_dir(&self, key: &str, recursive: bool) -> Result<EtcdResponse> {
        let params = Params::new()
            .flag("dir", true)
            .flag("recursive", recursive);
        self.keys(Method::DELETE, key, params).await
    }

    /// Delete `key` only if it matches every given condition
    pub async fn compare_and_delete(
        &self,
        key: &str,
        prev_value: Option<&str>,
        prev_index: Option<u64>,
    ) -> Result<EtcdResponse> {
        let params = Params::new()
            .opt("prevValue", prev_value)
            .opt("prevIndex", prev_index);
        self.keys(Method::DELETE, key, params).await
    }

    /// Stream every change of `key`, starting at `wait_index` or from now
    ///
    /// # Example
    /// ```rust,no_run
    /// # use etcd_v2_client::EtcdClient;
    /// use futures::StreamExt;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), etcd_v2_client::Error> {
    /// # let client = EtcdClient::new("http://127.0.0.1:2379")?;
    /// let mut changes = client.watch("/jobs", None, true, false);
    /// while let Some(change) = changes.next().await {
    ///     let change = change?;
    ///     println!("{} {}", change.action, change.node.key);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn watch(&self, key: &str, wait_index: Option<u64>, recursive: bool, quorum: bool) -> WatchStream {
        let cursor = WatchCursor::new(key)
            .from_index(wait_index)
            .recursive(recursive)
            .quorum(quorum);
        self.watch_from(cursor)
    }

    /// Stream changes starting at an explicit cursor
    pub fn watch_from(&self, cursor: WatchCursor) -> WatchStream {
        watch_stream(self.clone(), cursor)
    }

    /// Server and cluster version of the member behind the endpoint
    pub async fn version(&self) -> Result<VersionInfo> {
        let req = ApiRequest::raw(Method::GET, "/version").build(&self.config.endpoint)?;
        let response = self.transport.send(req).await?;
        decode_json(response).await
    }
}
