//! A replicated ledger node
//!
//! Each node is an independent unit with its own inbox. Three long-lived
//! tasks run per incarnation: the inbox handler, the leader heartbeat ticker
//! and the follower failure detector. Election waits run as short-lived
//! tasks on the same tracker so a crash cancels all of them together.
//!
//! All protocol state sits behind one mutex (`NodeState`), which is never
//! held across an `.await`.

pub mod detector;
pub mod election;
pub mod ledger;
pub mod replication;
pub mod state;

pub use ledger::{Ledger, Transaction};
pub use replication::SubmitReceipt;
pub use state::{ElectionState, NodeState, OrderStamp, Role, Tenure, TenureOutcome};

use crate::cluster::network::{Inbox, Network};
use crate::common::{
    AccountId, Balance, ClusterConfig, Envelope, LamportClock, Message, MetricsSnapshot, NodeId,
    NodeMetrics,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Point-in-time view of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub alive: bool,
    pub role: Role,
    pub election_state: ElectionState,
    pub leader: Option<NodeId>,
    pub tenure: u64,
    pub clock: u64,
    pub applied: Option<OrderStamp>,
    pub ledger: BTreeMap<AccountId, Balance>,
    pub transaction_count: usize,
    pub metrics: MetricsSnapshot,
}

/// Tasks and cancellation for one alive period of a node.
struct Incarnation {
    cancel: CancellationToken,
    tasks: TaskTracker,
}

struct NodeInner {
    id: NodeId,
    config: Arc<ClusterConfig>,
    network: Arc<dyn Network>,
    state: Mutex<NodeState>,
    clock: LamportClock,
    metrics: NodeMetrics,
    incarnation: Mutex<Option<Incarnation>>,
}

/// Cheap, cloneable handle to a node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(id: NodeId, config: Arc<ClusterConfig>, network: Arc<dyn Network>) -> Self {
        let state = NodeState::new(id, &config.seed);
        Self {
            inner: Arc::new(NodeInner {
                id,
                config,
                network,
                state: Mutex::new(state),
                clock: LamportClock::new(),
                metrics: NodeMetrics::new(),
                incarnation: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Connect the inbox and start the node's background tasks.
    pub fn start(&self) {
        let inbox = self.inner.network.connect(self.inner.id);
        self.launch(inbox);
    }

    /// Start background tasks on an already connected inbox.
    pub(crate) fn launch(&self, inbox: Inbox) {
        let mut incarnation = self.inner.incarnation.lock();
        if incarnation.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();

        tasks.spawn(run_inbox(self.clone(), inbox, cancel.clone()));
        tasks.spawn(detector::run_heartbeat_ticker(self.clone(), cancel.clone()));
        tasks.spawn(detector::run_failure_detector(self.clone(), cancel.clone()));

        *incarnation = Some(Incarnation { cancel, tasks });
        tracing::info!(node = self.inner.id, "node started");
    }

    /// Fail-stop: mark the node dead, stop every task and drop its inbox.
    pub fn crash(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.alive {
                return;
            }
            state.crash();
        }
        self.stop_tasks();
        self.inner.network.disconnect(self.inner.id);
        tracing::info!(node = self.inner.id, "node crashed");
    }

    /// Bring a crashed node back as a follower. It listens for one heartbeat
    /// timeout before it may elect, so a live leader's tenure reaches it first
    /// and any claim it makes afterwards outranks that leader.
    pub fn recover(&self) {
        let listen = self.inner.config.heartbeat_timeout();
        {
            let mut state = self.inner.state.lock();
            if state.alive {
                return;
            }
            state.recover(Instant::now(), listen);
        }
        tracing::info!(node = self.inner.id, "node recovered, listening for {:?}", listen);
        self.start();
    }

    /// Stop all tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        let incarnation = self.inner.incarnation.lock().take();
        if let Some(incarnation) = incarnation {
            incarnation.cancel.cancel();
            incarnation.tasks.close();
            incarnation.tasks.wait().await;
        }
        self.inner.network.disconnect(self.inner.id);
    }

    fn stop_tasks(&self) {
        if let Some(incarnation) = self.inner.incarnation.lock().take() {
            incarnation.cancel.cancel();
            incarnation.tasks.close();
        }
    }

    /// Handle one inbound message. Called by the inbox task; public so
    /// harnesses can inject messages directly.
    pub fn deliver(&self, envelope: Envelope) {
        if !self.is_alive() {
            return;
        }
        tracing::trace!(
            node = self.inner.id,
            from = envelope.from,
            kind = envelope.message.kind(),
            "message received"
        );

        match envelope.message {
            Message::ElectionRequest { from } => self.on_election_request(from),
            Message::ElectionAck { from } => self.on_election_ack(from),
            Message::CoordinatorAnnouncement { leader, tenure } => {
                self.on_leader_message(leader, tenure, false)
            }
            Message::Heartbeat { leader, tenure } => self.on_leader_message(leader, tenure, true),
            Message::ReplicateOperation {
                order_key,
                tenure,
                leader,
                operation,
            } => {
                if let Err(e) = self.apply_replicated(leader, tenure, order_key, &operation) {
                    tracing::debug!(node = self.inner.id, "replication dropped: {}", e);
                }
            }
        }
    }

    /// Spawn a task tied to the current incarnation. No-op while crashed.
    pub(crate) fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let incarnation = self.inner.incarnation.lock();
        if let Some(incarnation) = incarnation.as_ref() {
            incarnation.tasks.spawn(task(incarnation.cancel.clone()));
        }
    }

    /// Send to one peer. Unreachable peers are logged and counted, never fatal.
    pub(crate) fn send(&self, to: NodeId, message: Message) -> bool {
        let kind = message.kind();
        match self.inner.network.send(self.inner.id, to, message) {
            Ok(()) => true,
            Err(e) => {
                self.inner.metrics.unreachable_sends.inc();
                tracing::debug!(node = self.inner.id, peer = to, kind, "send failed: {}", e);
                false
            }
        }
    }

    /// Send to every other member; returns how many sends went through.
    pub(crate) fn broadcast(&self, message: Message) -> usize {
        self.peers()
            .into_iter()
            .filter(|&peer| self.send(peer, message.clone()))
            .count()
    }

    pub(crate) fn peers(&self) -> Vec<NodeId> {
        self.inner
            .config
            .member_ids()
            .into_iter()
            .filter(|&id| id != self.inner.id)
            .collect()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.state.lock().alive
    }

    pub fn role(&self) -> Role {
        self.inner.state.lock().role()
    }

    pub fn is_leader(&self) -> bool {
        self.inner.state.lock().is_leader()
    }

    pub fn election_state(&self) -> ElectionState {
        self.inner.state.lock().election
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.inner.state.lock().leader
    }

    pub fn tenure(&self) -> u64 {
        self.inner.state.lock().tenure.generation
    }

    pub fn clock(&self) -> u64 {
        self.inner.clock.current()
    }

    pub fn balance(&self, account: &str) -> Option<Balance> {
        self.inner.state.lock().ledger.balance(account)
    }

    pub fn ledger(&self) -> BTreeMap<AccountId, Balance> {
        self.inner.state.lock().ledger.balances().clone()
    }

    pub fn journal(&self) -> Vec<Transaction> {
        self.inner.state.lock().ledger.journal().to_vec()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn status(&self) -> NodeStatus {
        let state = self.inner.state.lock();
        NodeStatus {
            id: self.inner.id,
            alive: state.alive,
            role: state.role(),
            election_state: state.election,
            leader: state.leader,
            tenure: state.tenure.generation,
            clock: self.inner.clock.current(),
            applied: state.applied,
            ledger: state.ledger.balances().clone(),
            transaction_count: state.ledger.transaction_count(),
            metrics: self.inner.metrics.snapshot(),
        }
    }

    pub(crate) fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }
}

async fn run_inbox(node: Node, mut inbox: Inbox, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = inbox.recv() => match envelope {
                Some(envelope) => node.deliver(envelope),
                None => break,
            },
        }
    }
    tracing::debug!(node = node.id(), "inbox task stopped");
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancellation.
pub(crate) async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
