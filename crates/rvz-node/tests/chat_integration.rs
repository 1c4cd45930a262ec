//! Chat integration tests
//!
//! Runs complete nodes (discovery, acceptor, sessions, shell) over the
//! in-memory network.

use std::time::Duration;

use tokio::time::Instant;

use rvz_core::config::{BackoffConfig, ChatConfig};
use rvz_core::{PeerDescriptor, PeerId};
use rvz_node::console::{Console, ConsoleBuffer};
use rvz_node::net::MemoryNetwork;
use rvz_node::node::NodeTasks;
use rvz_node::ChatNode;

struct TestPeer {
    node: ChatNode,
    out: ConsoleBuffer,
    tasks: Option<NodeTasks>,
}

impl TestPeer {
    fn id(&self) -> &PeerId {
        self.node.state().local_id()
    }

    fn connected_to(&self, other: &TestPeer) -> bool {
        let registry = &self.node.state().registry;
        registry.is_outbound_connected(other.id()) && registry.is_inbound_connected(other.id())
    }

    async fn stop(mut self) {
        self.node.shutdown().await;
        if let Some(tasks) = self.tasks.take() {
            tasks.join().await;
        }
    }
}

fn fast_config() -> ChatConfig {
    ChatConfig {
        rendezvous: "integration-room".to_string(),
        announce_timeout: Duration::from_millis(200),
        announce_deadline: Duration::from_secs(2),
        lookup_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
        dial_timeout: Duration::from_millis(500),
        color: false,
        backoff: BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.0,
        },
        ..ChatConfig::default()
    }
}

fn create_peer(network: &MemoryNetwork, id: &str, config: ChatConfig) -> TestPeer {
    let (console, out) = Console::buffered(format!("{} ", id), false);
    let node = ChatNode::new(
        config,
        network.host(PeerId::new(id)),
        network.directory(PeerId::new(id)),
        console,
    );
    TestPeer {
        node,
        out,
        tasks: None,
    }
}

async fn start_peer(network: &MemoryNetwork, id: &str) -> TestPeer {
    let mut peer = create_peer(network, id, fast_config());
    peer.tasks = Some(peer.node.start().await.expect("node failed to start"));
    peer
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_two_peers_connect_in_both_directions() {
    let network = MemoryNetwork::new();
    let a = start_peer(&network, "peerA").await;
    let b = start_peer(&network, "peerB").await;

    wait_until("A and B connected", || a.connected_to(&b) && b.connected_to(&a)).await;

    let counts = a.node.state().registry.counts();
    assert_eq!((counts.inbound, counts.outbound), (1, 1));
    assert!(a
        .out
        .contents()
        .contains("Inbound Connections: 1 Outbound Connections: 1"));

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_chat_line_is_delivered_with_sender_prefix() {
    let network = MemoryNetwork::new();
    let a = start_peer(&network, "peerA").await;
    let b = start_peer(&network, "peerB").await;
    wait_until("A and B connected", || a.connected_to(&b) && b.connected_to(&a)).await;

    a.node.shell().handle_line("hello").await;

    wait_until("B printed the line", || b.out.contents().contains("\npeerA hello\npeerB ")).await;
    assert!(!a.out.contents().contains("\npeerA hello\n"));

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_three_peers_form_full_mesh() {
    let network = MemoryNetwork::new();
    let a = start_peer(&network, "peerA").await;
    let b = start_peer(&network, "peerB").await;
    let c = start_peer(&network, "peerC").await;

    wait_until("full mesh", || {
        a.connected_to(&b)
            && a.connected_to(&c)
            && b.connected_to(&a)
            && b.connected_to(&c)
            && c.connected_to(&a)
            && c.connected_to(&b)
    })
    .await;

    c.node.shell().handle_line("hi all").await;
    wait_until("A and B got the line", || {
        a.out.contents().contains("peerC hi all") && b.out.contents().contains("peerC hi all")
    })
    .await;

    for peer in [&a, &b, &c] {
        assert_eq!(peer.node.state().registry.counts().outbound, 2);
    }

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

#[tokio::test]
async fn test_repeated_polls_dial_each_peer_once() {
    let network = MemoryNetwork::new();
    let a = start_peer(&network, "peerA").await;
    let b = start_peer(&network, "peerB").await;
    wait_until("A and B connected", || a.connected_to(&b) && b.connected_to(&a)).await;

    // Let several more discovery iterations run
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(network.dial_attempts(a.id()), 1);
    assert_eq!(network.dial_attempts(b.id()), 1);
    assert_eq!(a.node.state().registry.counts().outbound, 1);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_self_and_addressless_providers_are_never_dialed() {
    let network = MemoryNetwork::new();
    let a = start_peer(&network, "peerA").await;
    let ghost = PeerId::new("ghost");
    network.inject_provider(&a.node.state().key, PeerDescriptor::new(ghost.clone(), vec![]));

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(network.dial_attempts(&ghost), 0);
    assert_eq!(network.dial_attempts(a.id()), 0);
    assert_eq!(a.node.state().registry.counts().outbound, 0);

    a.stop().await;
}

#[tokio::test]
async fn test_unreachable_peer_is_retried() {
    let network = MemoryNetwork::new();
    let b = start_peer(&network, "peerB").await;
    network.set_unreachable(b.id(), true);
    let a = start_peer(&network, "peerA").await;

    wait_until("a failed dial", || network.dial_attempts(b.id()) >= 1).await;
    assert!(!a.node.state().registry.is_outbound_connected(b.id()));

    network.set_unreachable(b.id(), false);
    wait_until("A connected to B", || {
        a.node.state().registry.is_outbound_connected(b.id())
    })
    .await;
    assert!(network.dial_attempts(b.id()) >= 2);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_lookup_failures_are_not_fatal() {
    let network = MemoryNetwork::new();
    network.fail_lookups(5);
    let a = start_peer(&network, "peerA").await;
    let b = start_peer(&network, "peerB").await;

    wait_until("A and B connected", || a.connected_to(&b) && b.connected_to(&a)).await;

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_announce_failure_is_fatal_at_startup() {
    let network = MemoryNetwork::new();
    network.fail_announces(usize::MAX);

    let config = ChatConfig {
        announce_deadline: Duration::from_millis(300),
        ..fast_config()
    };
    let peer = create_peer(&network, "peerA", config);

    assert!(peer.node.start().await.is_err());
    assert!(peer.node.state().cancel.is_cancelled());
}

#[tokio::test]
async fn test_vanished_peer_is_removed() {
    let network = MemoryNetwork::new();
    let a = start_peer(&network, "peerA").await;
    let b = start_peer(&network, "peerB").await;
    wait_until("A and B connected", || a.connected_to(&b) && b.connected_to(&a)).await;

    // Stop B and drop everything it holds, closing its streams
    network.set_unreachable(b.id(), true);
    b.stop().await;

    wait_until("A dropped B", || {
        let counts = a.node.state().registry.counts();
        counts.inbound == 0 && counts.outbound == 0
    })
    .await;

    // Broadcasting with nobody connected is harmless
    a.node.shell().handle_line("anyone?").await;

    a.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_outbound_streams() {
    let network = MemoryNetwork::new();
    let a = start_peer(&network, "peerA").await;
    let b = start_peer(&network, "peerB").await;
    wait_until("A and B connected", || a.connected_to(&b) && b.connected_to(&a)).await;

    // B keeps its state alive; only the shutdown itself closes its writers
    b.node.shutdown().await;
    wait_until("A saw B's stream end", || {
        !a.node.state().registry.is_inbound_connected(b.id())
    })
    .await;

    a.stop().await;
    b.stop().await;
}
