//! In-process cluster bootstrap
//!
//! [`Cluster`] owns the member registry: it builds every node over one shared
//! [`Network`], starts them, routes client submissions to the leader and
//! injects crashes and recoveries. It is passed around by handle; there is
//! no process-wide cluster singleton.

use crate::cluster::http::create_router;
use crate::cluster::network::{ChannelNetwork, Network};
use crate::common::{ApiConfig, ClusterConfig, NodeId, Operation};
use crate::node::{Node, NodeStatus, SubmitReceipt};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on `NotLeader` redirects followed by [`Cluster::submit`].
const MAX_REDIRECTS: usize = 3;

/// Aggregate view of every member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Leader every alive node agrees on, if any
    pub leader: Option<NodeId>,
    pub nodes: Vec<NodeStatus>,
}

pub struct Cluster {
    config: Arc<ClusterConfig>,
    network: Arc<ChannelNetwork>,
    nodes: BTreeMap<NodeId, Node>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("members", &self.config.member_ids())
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// Build and start every configured member.
    pub fn start(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let network = Arc::new(ChannelNetwork::new());
        let shared: Arc<dyn Network> = network.clone();

        let nodes: BTreeMap<NodeId, Node> = config
            .member_ids()
            .into_iter()
            .map(|id| (id, Node::new(id, config.clone(), shared.clone())))
            .collect();

        // Open every inbox before any node starts electing.
        let inboxes: Vec<_> = nodes
            .keys()
            .map(|&id| (id, network.connect(id)))
            .collect();
        for (id, inbox) in inboxes {
            if let Some(node) = nodes.get(&id) {
                node.launch(inbox);
            }
        }

        for member in &config.members {
            tracing::info!(node = member.id, address = %member.address, "member started");
        }
        Ok(Self {
            config,
            network,
            nodes,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn network(&self) -> &ChannelNetwork {
        &self.network
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(Error::UnknownNode(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn alive_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_alive())
    }

    pub fn crash(&self, id: NodeId) -> Result<()> {
        self.node(id)?.crash();
        Ok(())
    }

    pub fn recover(&self, id: NodeId) -> Result<()> {
        self.node(id)?.recover();
        Ok(())
    }

    /// Ask `id` to start an election. Returns whether a new round began.
    pub fn start_election(&self, id: NodeId) -> Result<bool> {
        let node = self.node(id)?;
        if !node.is_alive() {
            return Err(Error::NodeDown(id));
        }
        Ok(node.start_election())
    }

    /// Alive nodes currently in the `Leader` role.
    pub fn leaders(&self) -> Vec<NodeId> {
        self.alive_nodes()
            .filter(|n| n.is_leader())
            .map(|n| n.id())
            .collect()
    }

    /// The leader, when exactly one alive node leads and every alive node follows it.
    pub fn agreed_leader(&self) -> Option<NodeId> {
        let leaders = self.leaders();
        let [leader] = leaders.as_slice() else {
            return None;
        };
        self.alive_nodes()
            .all(|n| n.leader() == Some(*leader))
            .then_some(*leader)
    }

    /// Poll until the cluster settles on one agreed leader.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Result<NodeId> {
        let deadline = Instant::now() + timeout;
        let poll = self.config.heartbeat_interval() / 2;
        loop {
            if let Some(leader) = self.agreed_leader() {
                return Ok(leader);
            }
            if self.alive_nodes().next().is_none() {
                return Err(Error::NoLeader);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "no agreed leader after {:?}",
                    timeout
                )));
            }
            tokio::time::sleep(poll.max(Duration::from_millis(1))).await;
        }
    }

    /// Submit directly to one node, without redirection.
    pub fn submit_to(&self, id: NodeId, operation: Operation) -> Result<SubmitReceipt> {
        self.node(id)?.submit(operation)
    }

    /// Submit to whichever node leads, following `NotLeader` redirects.
    /// With no leader known, starts an election and waits one election
    /// cycle for a leader to emerge before failing with `NoLeader`.
    pub async fn submit(&self, operation: Operation) -> Result<SubmitReceipt> {
        operation.validate()?;

        let mut target = match self.alive_nodes().next() {
            Some(node) => node.leader().unwrap_or(node.id()),
            None => return Err(Error::NoLeader),
        };

        for _ in 0..=MAX_REDIRECTS {
            match self.node(target)?.submit(operation.clone()) {
                Err(Error::NotLeader {
                    known_leader: Some(leader),
                }) if leader != target => {
                    tracing::debug!("redirecting submission from {} to {}", target, leader);
                    target = leader;
                }
                Err(Error::NotLeader { known_leader: None }) => {
                    self.node(target)?.start_election();
                    break;
                }
                Err(Error::NotLeader { .. }) | Err(Error::NodeDown(_)) => break,
                other => return other,
            }
        }

        // Detection, one election round and one backed-off retry.
        let settle = self.config.heartbeat_timeout() * 2
            + self.config.election_timeout()
            + self.config.announcement_timeout()
            + self.config.max_election_backoff();
        match self.wait_for_leader(settle).await {
            Ok(leader) => self.node(leader)?.submit(operation),
            Err(_) => Err(Error::NoLeader),
        }
    }

    pub fn status(&self) -> ClusterStatus {
        ClusterStatus {
            leader: self.agreed_leader(),
            nodes: self.nodes.values().map(|n| n.status()).collect(),
        }
    }

    /// Stop every node and wait for their tasks.
    pub async fn shutdown(&self) {
        for node in self.nodes.values() {
            node.shutdown().await;
        }
        tracing::info!("cluster stopped");
    }

    /// Serve the HTTP API until ctrl-c, then shut the cluster down.
    pub async fn serve(self: Arc<Self>, api: ApiConfig) -> Result<()> {
        let router = create_router(self.clone());
        let listener = tokio::net::TcpListener::bind(api.bind_addr).await?;
        tracing::info!("HTTP API listening on {}", api.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for ctrl-c: {}", e);
                }
            })
            .await?;

        self.shutdown().await;
        Ok(())
    }
}
