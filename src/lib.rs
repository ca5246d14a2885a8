//! An async client for the etcd v2 keys API
//!
//! This library maps typed operations onto the HTTP/JSON v2 keys protocol,
//! follows redirects to the cluster leader, and decodes responses and error
//! documents into typed results.
//!
//! # Features
//! - get / set / compare-and-swap / delete / compare-and-delete / create / directories
//! - Long-poll watches exposed as a lazy `Stream` of changes
//! - Redirect-following transport over HTTP/1.1 or h2, plaintext or TLS
//! - Typed etcd error codes
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use etcd_v2_client::EtcdClient;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), etcd_v2_client::Error> {
//!     let client = EtcdClient::new("http://127.0.0.1:2379")?;
//!
//!     // Store a value for 60 seconds
//!     let resp = client.set("/greeting", "hello", Some(60)).await?;
//!     println!("Stored at index {}", resp.node.modified_index);
//!
//!     // Follow every subsequent change
//!     let mut changes = client.watch("/greeting", Some(resp.node.modified_index + 1), false, false);
//!     while let Some(change) = changes.next().await {
//!         println!("{:?}", change?.value());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod params;
pub mod request;
pub mod transport;
pub mod types;
pub mod watch;

pub use client::EtcdClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use params::Params;
pub use transport::{HttpTransport, Transport};
pub use types::*;
pub use watch::{WatchCursor, WatchStream};
