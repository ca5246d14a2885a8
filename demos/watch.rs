//! Follow changes under a key, re-seeding the watch when history is cleared
//!
//! Run with: cargo run --example watch -- /config

use etcd_v2_client::{ClientConfig, EtcdClient, Error, WatchCursor};
use futures::StreamExt;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let key = std::env::args().nth(1).unwrap_or_else(|| "/".to_string());
    let client = EtcdClient::with_config(ClientConfig::from_env())?;

    let mut cursor = WatchCursor::new(&key).recursive(true);
    loop {
        info!("Watching {} from {:?}", cursor.key, cursor.index);
        let mut changes = client.watch_from(cursor.clone());

        while let Some(change) = changes.next().await {
            match change {
                Ok(change) => {
                    info!("{} {} = {:?}", change.action, change.node.key, change.node.value);
                    cursor = cursor.advance(&change);
                }
                Err(Error::Etcd(e)) if e.is_event_index_cleared() => {
                    warn!("History cleared, resuming from index {}", e.index + 1);
                    cursor = cursor.clone().from_index(Some(e.index + 1));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
