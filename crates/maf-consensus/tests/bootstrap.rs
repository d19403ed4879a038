//! Single-node devmode cluster: bootstrap, lead, replicate, read back.

use std::time::Duration;

use maf_consensus::{Consensus, Engine, EngineConfig};
use tokio::sync::mpsc;

fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr.to_string()
}

async fn wait_for<F: Fn() -> bool>(what: &str, deadline: Duration, check: F) {
    let started = std::time::Instant::now();
    while !check() {
        assert!(started.elapsed() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn bootstrap_set_get() {
    let engine = Engine::new(EngineConfig {
        addr: free_addr(),
        node_id: "node-1".to_string(),
        devmode: true,
        peers: vec![],
        data_dir: None,
        bootstrap: true,
        server_client_tls: None,
    });

    let (leadership_tx, mut leadership_rx) = mpsc::channel(1);
    engine.subscribe_on_leadership_changes(leadership_tx);

    engine.init().await.expect("engine init");
    assert!(engine.is_ready());

    wait_for("leadership", Duration::from_secs(10), || engine.is_leader()).await;
    assert!(engine.is_live());

    // The watcher delivered the transition to the subscribed inbox.
    let became_leader = tokio::time::timeout(Duration::from_secs(5), leadership_rx.recv())
        .await
        .expect("leadership event in time")
        .expect("channel open");
    assert!(became_leader);

    engine.set("k", "v").await.expect("set");
    assert_eq!(engine.get("k"), Some("v".to_string()));

    engine.set("empty", "").await.expect("set empty");
    assert_eq!(engine.get("empty"), Some(String::new()));

    engine.delete("k").await.expect("delete");
    assert_eq!(engine.get("k"), None);

    let info = engine.get_info(true).await.expect("info");
    assert_eq!(info.state, "Leader");
    assert_eq!(info.servers.len(), 1);
    assert_eq!(info.servers[0].id, "node-1");
    assert!(info.servers[0].leader);
    assert_eq!(info.servers[0].suffrage, "Voter");
    assert!(info.stats.is_some());

    engine.stop().await;
}

#[tokio::test]
async fn bootstrap_twice_is_tolerated() {
    let engine = Engine::new(EngineConfig {
        addr: free_addr(),
        node_id: "node-1".to_string(),
        devmode: true,
        peers: vec![],
        data_dir: None,
        bootstrap: true,
        server_client_tls: None,
    });

    engine.init().await.expect("engine init");
    wait_for("leadership", Duration::from_secs(10), || engine.is_leader()).await;

    engine.stop().await;
}
