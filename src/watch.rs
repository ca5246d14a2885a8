//! Long-poll watch loop
//!
//! The keys API only supports one wait per request. A watch turns that into
//! an unbounded stream: each successful wait yields one notification and the
//! next request waits from `modifiedIndex + 1` of the node just observed.
//!
//! The stream is lazy and holds at most one request in flight. Nothing runs in
//! the background: dropping the stream drops the pending request, and the
//! first error ends the stream.

use futures::stream::{self, BoxStream, StreamExt};
use tracing::trace;

use crate::client::EtcdClient;
use crate::error::{Error, Result};
use crate::params::Params;
use crate::transport::Transport;
use crate::types::EtcdResponse;

/// Stream of change notifications produced by a watch
pub type WatchStream = BoxStream<'static, Result<EtcdResponse>>;

/// Parameters of a single wait request
pub fn wait_params(wait_index: Option<u64>, recursive: bool, sorted: bool, quorum: bool) -> Params {
    Params::new()
        .flag("wait", true)
        .opt("waitIndex", wait_index)
        .flag("recursive", recursive)
        .flag("sorted", sorted)
        .flag("quorum", quorum)
}

/// Position of a watch: what to wait on and from which index.
///
/// Never updated in place; [`WatchCursor::advance`] produces its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchCursor {
    /// Key or directory being watched
    pub key: String,
    /// Index to wait from; `None` waits for the next change after now
    pub index: Option<u64>,
    /// Watch the whole subtree
    pub recursive: bool,
    /// Require a quorum read
    pub quorum: bool,
}

impl WatchCursor {
    /// Cursor waiting on `key` from now
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            index: None,
            recursive: false,
            quorum: false,
        }
    }

    /// Start from `index` instead of now
    pub fn from_index(mut self, index: Option<u64>) -> Self {
        self.index = index;
        self
    }

    /// Watch the whole subtree under the key
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Require quorum reads
    pub fn quorum(mut self, quorum: bool) -> Self {
        self.quorum = quorum;
        self
    }

    /// Successor cursor after `response` was observed.
    ///
    /// Never moves backwards: a response without a usable `modifiedIndex`
    /// keeps the current index.
    pub fn advance(&self, response: &EtcdResponse) -> WatchCursor {
        let observed = response.node.modified_index.saturating_add(1);
        WatchCursor {
            key: self.key.clone(),
            index: Some(self.index.map_or(observed, |current| current.max(observed))),
            recursive: self.recursive,
            quorum: self.quorum,
        }
    }

    /// Parameters of the wait request for this position
    pub fn params(&self) -> Params {
        wait_params(self.index, self.recursive, false, self.quorum)
    }
}

/// Drive the watch loop for `cursor` on `client`
pub fn watch_stream<T: Transport>(client: EtcdClient<T>, cursor: WatchCursor) -> WatchStream {
    stream::try_unfold((client, cursor), |(client, cursor)| async move {
        trace!("Waiting on {} from index {:?}", cursor.key, cursor.index);
        let response = client.wait_at(&cursor).await?;
        let next = cursor.advance(&response);
        trace!(
            "Watch on {} observed {} at index {}",
            cursor.key,
            response.action,
            response.node.modified_index
        );
        Ok::<_, Error>(Some((response, (client, next))))
    })
    .boxed()
}
