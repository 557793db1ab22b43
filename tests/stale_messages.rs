//! Stale and replayed protocol messages must never move a node backwards

use minibank::cluster::network::{ChannelNetwork, Network};
use minibank::common::{Envelope, Message, NodeId};
use minibank::{ClusterConfig, Error, Node, Operation};
use std::sync::Arc;

const LEADER: NodeId = 5;

/// A lone follower, driven by hand. Its tasks are never started.
fn follower() -> Node {
    follower_on(Arc::new(ChannelNetwork::new()))
}

fn follower_on(network: Arc<ChannelNetwork>) -> Node {
    let config = Arc::new(ClusterConfig::with_members([1, 3, LEADER]).with_heartbeat_interval_ms(20));
    Node::new(1, config, network)
}

fn announce(from: NodeId, tenure: u64) -> Envelope {
    Envelope {
        from,
        message: Message::CoordinatorAnnouncement {
            leader: from,
            tenure,
        },
    }
}

fn replicate(tenure: u64, order_key: u64, account: &str, delta: i64) -> Envelope {
    Envelope {
        from: LEADER,
        message: Message::ReplicateOperation {
            order_key,
            tenure,
            leader: LEADER,
            operation: Operation::new(account, delta),
        },
    }
}

#[tokio::test]
async fn test_older_order_key_discarded() {
    let node = follower();
    node.deliver(Envelope {
        from: LEADER,
        message: Message::CoordinatorAnnouncement {
            leader: LEADER,
            tenure: 5,
        },
    });
    assert_eq!(node.leader(), Some(LEADER));

    node.deliver(replicate(5, 2, "A", 100));
    assert_eq!(node.balance("A"), Some(100));
    let clock = node.clock();
    assert_eq!(clock, 3);

    // Late arrival of an earlier operation from the same tenure
    node.deliver(replicate(5, 1, "A", 40));
    assert_eq!(node.balance("A"), Some(100));
    assert_eq!(node.journal().len(), 1);
    assert_eq!(node.clock(), clock);
    assert_eq!(node.metrics().stale_discarded, 1);
}

#[tokio::test]
async fn test_replayed_operation_applied_once() {
    let node = follower();
    let operation = Operation::new("B", 25);

    assert_eq!(node.apply_replicated(LEADER, 1, 7, &operation).unwrap(), 25);
    let err = node.apply_replicated(LEADER, 1, 7, &operation).unwrap_err();
    match err {
        Error::StaleReplication {
            tenure,
            order_key,
            applied_tenure,
            applied_order_key,
        } => {
            assert_eq!((tenure, order_key), (1, 7));
            assert_eq!((applied_tenure, applied_order_key), (1, 7));
        }
        other => panic!("expected StaleReplication, got {:?}", other),
    }
    assert_eq!(node.balance("B"), Some(25));
}

#[tokio::test]
async fn test_older_tenure_discarded_despite_higher_order_key() {
    let node = follower();
    node.apply_replicated(LEADER, 5, 3, &Operation::new("A", 10))
        .unwrap();

    let err = node
        .apply_replicated(LEADER, 4, 100, &Operation::new("A", 999))
        .unwrap_err();
    assert!(matches!(err, Error::StaleReplication { .. }));
    assert_eq!(node.balance("A"), Some(10));
}

#[tokio::test]
async fn test_newer_tenure_accepted_with_lower_order_key() {
    let node = follower();
    node.apply_replicated(LEADER, 5, 40, &Operation::new("A", 10))
        .unwrap();

    // A new leader's clock may lag; its tenure alone orders it after
    node.apply_replicated(LEADER, 6, 1, &Operation::new("A", 5))
        .unwrap();
    assert_eq!(node.balance("A"), Some(15));
    assert!(node.clock() > 40);
}

#[tokio::test]
async fn test_same_generation_orders_by_leader_identity() {
    let node = follower();
    node.apply_replicated(3, 2, 10, &Operation::new("A", 1))
        .unwrap();

    // A recovered higher node can reuse generation 2
    node.apply_replicated(LEADER, 2, 1, &Operation::new("A", 1))
        .unwrap();
    assert!(node
        .apply_replicated(3, 2, 11, &Operation::new("A", 1))
        .is_err());
    assert_eq!(node.balance("A"), Some(2));
}

#[tokio::test]
async fn test_stale_heartbeat_ignored() {
    let node = follower();
    node.deliver(Envelope {
        from: LEADER,
        message: Message::Heartbeat {
            leader: LEADER,
            tenure: 4,
        },
    });
    assert_eq!(node.tenure(), 4);

    node.deliver(Envelope {
        from: 3,
        message: Message::Heartbeat {
            leader: 3,
            tenure: 2,
        },
    });
    assert_eq!(node.leader(), Some(LEADER));
    assert_eq!(node.tenure(), 4);
    assert_eq!(node.metrics().stale_discarded, 1);
}

#[tokio::test]
async fn test_crashed_node_ignores_everything() {
    let node = follower();
    node.crash();

    node.deliver(replicate(1, 1, "A", 100));
    assert_eq!(node.balance("A"), None);
    assert!(matches!(
        node.apply_replicated(LEADER, 1, 1, &Operation::new("A", 1)),
        Err(Error::NodeDown(1))
    ));
}

#[tokio::test]
async fn test_stale_leader_told_current_tenure() {
    let network = Arc::new(ChannelNetwork::new());
    let mut stale_inbox = network.connect(LEADER);
    let node = follower_on(network.clone());

    node.deliver(announce(3, 6));
    assert_eq!(node.leader(), Some(3));

    // LEADER outranks 3 but claimed on an older generation
    node.deliver(announce(LEADER, 2));
    assert_eq!(node.leader(), Some(3));
    assert_eq!(node.metrics().stale_discarded, 1);

    let reply = stale_inbox.try_recv().unwrap();
    assert_eq!(reply.from, 1);
    assert_eq!(reply.message, announce(3, 6).message);
}

#[tokio::test]
async fn test_stale_replication_answered_with_current_tenure() {
    let network = Arc::new(ChannelNetwork::new());
    let mut stale_inbox = network.connect(LEADER);
    let node = follower_on(network.clone());

    node.deliver(announce(3, 6));
    node.apply_replicated(3, 6, 1, &Operation::new("A", 10))
        .unwrap();
    node.deliver(replicate(2, 50, "A", 100));
    assert_eq!(node.balance("A"), Some(10));

    let reply = stale_inbox.try_recv().unwrap();
    assert_eq!(reply.from, 1);
    assert_eq!(
        reply.message,
        Message::CoordinatorAnnouncement {
            leader: 3,
            tenure: 6
        }
    );
}

#[tokio::test]
async fn test_current_leader_not_corrected_about_itself() {
    let network = Arc::new(ChannelNetwork::new());
    let mut leader_inbox = network.connect(LEADER);
    let node = follower_on(network.clone());

    node.deliver(announce(LEADER, 4));
    node.deliver(Envelope {
        from: LEADER,
        message: Message::Heartbeat {
            leader: LEADER,
            tenure: 3,
        },
    });
    assert_eq!(node.metrics().stale_discarded, 1);
    assert!(leader_inbox.try_recv().is_err());
}
