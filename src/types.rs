//! Data types for the etcd v2 keys API

use std::fmt;

use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Header carrying the cluster index at the time the response was produced
pub const ETCD_INDEX_HEADER: &str = "x-etcd-index";

/// Action reported by the server for a successful operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Plain read
    Get,
    /// Value written unconditionally
    Set,
    /// Key created (POST append or `prevExist=false`)
    Create,
    /// Key removed
    Delete,
    /// Existing key overwritten (`prevExist=true`)
    Update,
    /// Conditional write succeeded
    CompareAndSwap,
    /// Conditional delete succeeded
    CompareAndDelete,
    /// TTL elapsed
    Expire,
}

impl Action {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Set => "set",
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Update => "update",
            Action::CompareAndSwap => "compareAndSwap",
            Action::CompareAndDelete => "compareAndDelete",
            Action::Expire => "expire",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A key or directory entry
///
/// A node is either a leaf carrying `value`, or a directory (`dir == true`)
/// carrying `nodes`. The root directory is returned without a key or indices,
/// so those fields default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Full path of the node
    #[serde(default)]
    pub key: String,
    /// Value of a leaf node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the node is a directory
    #[serde(default, skip_serializing_if = "is_false")]
    pub dir: bool,
    /// Index of the mutation that created the node
    #[serde(default)]
    pub created_index: u64,
    /// Index of the last mutation of the node
    #[serde(default)]
    pub modified_index: u64,
    /// Remaining time to live in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    /// Absolute expiration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    /// Children of a directory, in server order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
}

impl Node {
    /// Returns true if this node is a directory
    pub fn is_dir(&self) -> bool {
        self.dir
    }

    /// Children of a directory; empty for leaves
    pub fn children(&self) -> &[Node] {
        &self.nodes
    }

    /// Last path segment of the key
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or_default()
    }
}

/// Result of any successful operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdResponse {
    /// What the server did
    pub action: Action,
    /// Node after the operation
    pub node: Node,
    /// Node before the operation, for mutations that replaced or removed a value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_node: Option<Node>,
    /// Cluster index from the `X-Etcd-Index` header
    #[serde(skip)]
    pub etcd_index: Option<u64>,
}

impl EtcdResponse {
    /// Value of the current node, if it is a leaf
    pub fn value(&self) -> Option<&str> {
        self.node.value.as_deref()
    }
}

/// Error body returned by the server on a non-success status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdError {
    /// Protocol-defined error code
    pub error_code: u64,
    /// Human readable message
    pub message: String,
    /// Context, usually the offending key
    #[serde(default)]
    pub cause: String,
    /// Cluster index at the time of the error
    #[serde(default)]
    pub index: u64,
}

impl EtcdError {
    /// Key not found
    pub const KEY_NOT_FOUND: u64 = 100;
    /// Compare failed
    pub const COMPARE_FAILED: u64 = 101;
    /// Not a file
    pub const NOT_FILE: u64 = 102;
    /// Not a directory
    pub const NOT_DIR: u64 = 104;
    /// Key already exists
    pub const NODE_EXIST: u64 = 105;
    /// Root is read only
    pub const ROOT_READ_ONLY: u64 = 107;
    /// Directory not empty
    pub const DIR_NOT_EMPTY: u64 = 108;
    /// prevValue required for this operation
    pub const PREV_VALUE_REQUIRED: u64 = 201;
    /// TTL is not a number
    pub const TTL_NAN: u64 = 202;
    /// Index is not a number
    pub const INDEX_NAN: u64 = 203;
    /// Invalid field
    pub const INVALID_FIELD: u64 = 209;
    /// Invalid POST form
    pub const INVALID_FORM: u64 = 210;
    /// Raft internal error
    pub const RAFT_INTERNAL: u64 = 300;
    /// During leader election
    pub const LEADER_ELECT: u64 = 301;
    /// Watcher cleared due to etcd recovery
    pub const WATCHER_CLEARED: u64 = 400;
    /// Requested index is outdated and cleared
    pub const EVENT_INDEX_CLEARED: u64 = 401;

    /// Returns true for error code 100
    pub fn is_key_not_found(&self) -> bool {
        self.error_code == Self::KEY_NOT_FOUND
    }

    /// Returns true for error code 101
    pub fn is_compare_failed(&self) -> bool {
        self.error_code == Self::COMPARE_FAILED
    }

    /// Returns true for error code 105
    pub fn is_node_exist(&self) -> bool {
        self.error_code == Self::NODE_EXIST
    }

    /// The requested watch index has been compacted out of the event history.
    /// Re-watch from `index + 1`.
    pub fn is_event_index_cleared(&self) -> bool {
        self.error_code == Self::EVENT_INDEX_CLEARED
    }
}

impl fmt::Display for EtcdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [code {}, index {}]",
            self.message, self.cause, self.error_code, self.index
        )
    }
}

impl std::error::Error for EtcdError {}

/// Response of `GET /version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Server binary version
    pub etcdserver: String,
    /// Cluster protocol version
    pub etcdcluster: String,
}

/// Read the cluster index from response headers
pub(crate) fn etcd_index_from_headers(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(ETCD_INDEX_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
