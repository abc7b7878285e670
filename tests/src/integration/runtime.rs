//! # Runtime Lifecycle
//!
//! The assembled node starts every enabled loop, answers on its status
//! port and stops cleanly.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    use bn_02_transfer_store::InMemoryKVStore;
    use node_runtime::{BonderConfig, NodeContainer, NodeRuntime};
    use shared_types::ManualTimeSource;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    use crate::fixtures::*;

    fn config() -> BonderConfig {
        let mut config = BonderConfig {
            bonder: BONDER,
            ..Default::default()
        };
        config.storage.in_memory = true;
        config.health.enabled = false;
        config.status.bind = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.bonding.routes.push(route());
        config
    }

    fn container(config: BonderConfig) -> NodeContainer {
        NodeContainer::assemble(
            config,
            Box::new(InMemoryKVStore::new()),
            HashMap::new(),
            Arc::new(RecordingSubmitter::default()),
            Arc::new(ManualTimeSource::new(NOW)),
        )
        .unwrap()
    }

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_node_starts_and_stops_every_loop() {
        let mut config = config();
        config.status.enabled = false;
        let runtime = NodeRuntime::start(container(config), 0).await.unwrap();

        // Bonding, settlement, relay and the gap sweeper.
        assert_eq!(runtime.running(), 4);
        assert!(runtime.status_addr().is_none());
        timeout(Duration::from_secs(5), runtime.shutdown())
            .await
            .expect("shutdown within timeout");
    }

    #[tokio::test]
    async fn test_disabled_subsystems_are_not_spawned() {
        let mut config = config();
        config.status.enabled = false;
        config.bonding.enabled = false;
        config.relay.enabled = false;
        let runtime = NodeRuntime::start(container(config), 0).await.unwrap();

        // Settlement and the gap sweeper always run.
        assert_eq!(runtime.running(), 2);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_is_pending_before_first_report() {
        let runtime = NodeRuntime::start(container(config()), 0).await.unwrap();
        let addr = runtime.status_addr().unwrap();

        let response = timeout(Duration::from_secs(5), get(addr, "/health")).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 503"), "got {response}");
        assert!(response.contains("pending"));

        let metrics = timeout(Duration::from_secs(5), get(addr, "/metrics")).await.unwrap();
        assert!(metrics.starts_with("HTTP/1.1 200"), "got {metrics}");

        timeout(Duration::from_secs(5), runtime.shutdown())
            .await
            .expect("shutdown within timeout");
    }
}
