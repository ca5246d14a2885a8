//! Basic usage example for the etcd v2 client
//!
//! Run with: ETCD_ENDPOINT=http://127.0.0.1:2379 cargo run --example basic_usage

use etcd_v2_client::{ClientConfig, EtcdClient};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::from_env();
    info!("Connecting to {}", config.endpoint);
    let client = EtcdClient::with_config(config)?;

    let version = client.version().await?;
    info!("Server {} / cluster {}", version.etcdserver, version.etcdcluster);

    // Store a value that expires in a minute
    let resp = client.set("/example/hello", "Hello, etcd!", Some(60)).await?;
    info!("Stored at index {} (ttl {:?})", resp.node.modified_index, resp.node.ttl);

    // Make it permanent again
    client.clear_ttl("/example/hello").await?;

    // Conditional update guarded by the index we just saw
    let index = client.get("/example/hello", false, false).await?.node.modified_index;
    match client
        .compare_and_set("/example/hello", "Hello again!", None, None, Some(index), None)
        .await
    {
        Ok(resp) => info!("Swapped: {:?}", resp.value()),
        Err(e) if e.as_etcd().is_some_and(|e| e.is_compare_failed()) => {
            warn!("Someone else updated the key first")
        }
        Err(e) => return Err(e.into()),
    }

    // Queue style in-order keys
    client.create("/example/queue", "job-1").await?;
    client.create("/example/queue", "job-2").await?;
    let queue = client.get("/example/queue", false, true).await?;
    for node in queue.node.children() {
        info!("  {} = {:?}", node.key, node.value);
    }

    // Clean up
    client.delete_dir("/example", true).await?;
    info!("Example completed successfully!");
    Ok(())
}
