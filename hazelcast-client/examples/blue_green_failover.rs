//! Blue/green failover between two clusters.
//!
//! Run with: `cargo run --example blue_green_failover`
//!
//! Requires a cluster named "blue" on localhost:5701 and one named "green"
//! on localhost:6701. Shut the blue cluster down while this runs.

use std::time::Duration;

use hazelcast_client::core::protocol::codecs::client::ClientPing;
use hazelcast_client::{
    ClientConfig, ClientFailoverConfig, HazelcastClient, InvocationTarget, LifecycleEvent,
};

fn cluster(name: &str, address: &str) -> Result<ClientConfig, hazelcast_client::ConfigError> {
    ClientConfig::builder()
        .cluster_name(name)
        .add_address(address)
        .retry(|r| {
            r.initial_backoff(Duration::from_millis(500))
                .max_backoff(Duration::from_secs(5))
                .cluster_connect_timeout(Duration::from_secs(20))
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let failover = ClientFailoverConfig::builder()
        .add_client_config(cluster("blue", "127.0.0.1:5701")?)
        .add_client_config(cluster("green", "127.0.0.1:6701")?)
        .try_count(4)
        .build()?;

    let client = HazelcastClient::with_failover(failover).await?;
    println!("Connected to '{}'", client.cluster_name());

    let mut lifecycle = client.subscribe_lifecycle();
    let watcher = client.clone();
    tokio::spawn(async move {
        while let Ok(event) = lifecycle.recv().await {
            match event {
                LifecycleEvent::ClientChangedCluster => {
                    println!("switched to cluster '{}'", watcher.cluster_name())
                }
                other => println!("lifecycle: {}", other),
            }
        }
    });

    while client.is_running() {
        match client.invoke::<ClientPing>(&(), InvocationTarget::Any).await {
            Ok(()) => println!("ping ok via '{}'", client.cluster_name()),
            Err(e) => println!("ping failed: {}", e),
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    Ok(())
}
