//! Topic listener that keeps receiving messages across member restarts.
//!
//! Run with: `cargo run --example reconnecting_listener`
//!
//! Requires a Hazelcast cluster running on localhost:5701. Restart members
//! while it runs; the registration is replayed on every new connection.

use std::sync::Arc;
use std::time::Duration;

use hazelcast_client::core::protocol::codecs::topic::{PublishRequest, TopicPublish};
use hazelcast_client::core::protocol::Data;
use hazelcast_client::{
    ClientConfig, ClientEvent, HazelcastClient, InvocationTarget, RoutingMode, TopicListenerCodec,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ClientConfig::builder()
        .cluster_name("dev")
        .network(|n| {
            n.add_address("127.0.0.1:5701")
                .routing_mode(RoutingMode::AllMembers)
        })
        .retry(|r| r.unlimited_cluster_connect_timeout())
        .build()?;

    let client = HazelcastClient::new(config).await?;
    println!(
        "Connected to cluster '{}' with {} connection(s)",
        client.cluster_name(),
        client.connection_count()
    );

    let registration = client
        .register_listener(
            Arc::new(TopicListenerCodec::new("news")),
            |event: ClientEvent| {
                if let ClientEvent::TopicMessage(message) = event {
                    println!(
                        "received {} bytes from {:?}",
                        message.item.len(),
                        message.publishing_member
                    );
                }
            },
        )
        .await?;

    let mut lifecycle = client.subscribe_lifecycle();
    tokio::spawn(async move {
        while let Ok(event) = lifecycle.recv().await {
            println!("lifecycle: {}", event);
        }
    });

    for i in 0..60u32 {
        let request = PublishRequest {
            name: "news".to_string(),
            message: Data::new(i.to_be_bytes().to_vec()),
        };
        if let Err(e) = client
            .invoke::<TopicPublish>(&request, InvocationTarget::Any)
            .await
        {
            println!("publish {} failed: {}", i, e);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    client.deregister_listener(registration).await?;
    client.shutdown().await;
    Ok(())
}
