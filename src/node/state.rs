//! Per-node protocol state
//!
//! Everything here is guarded by the node's single state mutex; the
//! decision helpers are pure so the election and replication rules can be
//! exercised without a runtime.

use crate::common::{AccountId, Balance, NodeId, Operation};
use crate::node::ledger::Ledger;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Externally visible role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Leader,
    Follower,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Follower => write!(f, "follower"),
        }
    }
}

/// Election state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionState {
    Idle,
    Electing,
    Follower,
    Leader,
}

impl std::fmt::Display for ElectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionState::Idle => write!(f, "idle"),
            ElectionState::Electing => write!(f, "electing"),
            ElectionState::Follower => write!(f, "follower"),
            ElectionState::Leader => write!(f, "leader"),
        }
    }
}

/// A leader tenure. Ordered by generation, then by leader identity so two
/// leaders that picked the same generation still compare deterministically.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tenure {
    pub generation: u64,
    pub leader: NodeId,
}

impl Tenure {
    pub fn new(generation: u64, leader: NodeId) -> Self {
        Self { generation, leader }
    }
}

/// Position of an operation in the replicated order: tenure first, then order key.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OrderStamp {
    pub tenure: Tenure,
    pub order_key: u64,
}

impl OrderStamp {
    pub fn new(tenure: Tenure, order_key: u64) -> Self {
        Self { tenure, order_key }
    }
}

/// What a node did with an incoming announcement or heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenureOutcome {
    /// Older than what we have seen; dropped.
    Stale,
    /// Same leader and tenure as we follow; liveness refreshed.
    Refreshed,
    /// New leader adopted.
    Adopted,
    /// Lower-identity leader adopted; we outrank it and should elect.
    AdoptedOutranked,
    /// Lower-identity leader observed mid-election; our election continues.
    IgnoredWhileElecting,
    /// We lead and outrank the sender; re-announce with a newer tenure.
    Reassert,
}

#[derive(Debug)]
pub struct NodeState {
    pub id: NodeId,
    pub alive: bool,
    pub election: ElectionState,
    pub leader: Option<NodeId>,
    /// Highest tenure observed (or held)
    pub tenure: Tenure,
    /// Highest applied `(tenure, order_key)`
    pub applied: Option<OrderStamp>,
    pub last_heartbeat: Instant,
    /// Bumped on every election start; stale election tasks compare against it
    pub election_round: u64,
    /// Consecutive elections that produced no leader
    pub election_attempt: u32,
    /// Set on recovery: no elections until a tenure is heard or this passes
    pub rejoin_until: Option<Instant>,
    pub ledger: Ledger,
}

impl NodeState {
    pub fn new(id: NodeId, seed: &BTreeMap<AccountId, Balance>) -> Self {
        Self {
            id,
            alive: true,
            election: ElectionState::Idle,
            leader: None,
            tenure: Tenure::default(),
            applied: None,
            last_heartbeat: Instant::now(),
            election_round: 0,
            election_attempt: 0,
            rejoin_until: None,
            ledger: Ledger::with_seed(seed),
        }
    }

    pub fn role(&self) -> Role {
        if self.alive && self.election == ElectionState::Leader {
            Role::Leader
        } else {
            Role::Follower
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role() == Role::Leader
    }

    /// Enter `Electing` from `Idle` or `Follower`. Returns the new round, or
    /// `None` when the node is down, already electing, leading, or still
    /// listening for the current tenure after a recovery.
    pub fn begin_election(&mut self, now: Instant) -> Option<u64> {
        if !self.alive
            || matches!(
                self.election,
                ElectionState::Electing | ElectionState::Leader
            )
            || self.rejoin_until.is_some_and(|until| now < until)
        {
            return None;
        }
        self.rejoin_until = None;
        self.election = ElectionState::Electing;
        self.leader = None;
        self.election_round += 1;
        Some(self.election_round)
    }

    /// A higher node answered our ElectionRequest: wait for its announcement.
    pub fn record_ack(&mut self, from: NodeId) -> bool {
        if self.alive && self.election == ElectionState::Electing && from > self.id {
            self.election = ElectionState::Follower;
            self.leader = None;
            true
        } else {
            false
        }
    }

    /// Take leadership with a tenure newer than anything observed.
    pub fn become_leader(&mut self) -> Tenure {
        self.tenure = Tenure::new(self.tenure.generation.saturating_add(1), self.id);
        self.election = ElectionState::Leader;
        self.leader = Some(self.id);
        self.election_attempt = 0;
        self.tenure
    }

    /// Fold in a CoordinatorAnnouncement or Heartbeat from `leader`.
    pub fn observe_tenure(&mut self, leader: NodeId, generation: u64, now: Instant) -> TenureOutcome {
        let incoming = Tenure::new(generation, leader);
        if !self.alive || incoming < self.tenure {
            return TenureOutcome::Stale;
        }

        if incoming == self.tenure && self.leader == Some(leader) {
            if leader != self.id {
                self.last_heartbeat = now;
            }
            return TenureOutcome::Refreshed;
        }

        self.tenure = incoming;
        self.rejoin_until = None;

        if leader < self.id {
            match self.election {
                ElectionState::Leader => return TenureOutcome::Reassert,
                ElectionState::Electing => return TenureOutcome::IgnoredWhileElecting,
                ElectionState::Idle | ElectionState::Follower => {}
            }
        }

        self.election = ElectionState::Follower;
        self.leader = Some(leader);
        self.last_heartbeat = now;
        self.election_attempt = 0;

        if leader < self.id {
            TenureOutcome::AdoptedOutranked
        } else {
            TenureOutcome::Adopted
        }
    }

    /// Follower-side liveness check. Clears the leader and returns `true`
    /// when its heartbeats went quiet for longer than `timeout`.
    pub fn leader_timed_out(&mut self, now: Instant, timeout: Duration) -> bool {
        if self.alive
            && self.election == ElectionState::Follower
            && self.leader.is_some()
            && now.saturating_duration_since(self.last_heartbeat) > timeout
        {
            self.leader = None;
            self.election = ElectionState::Idle;
            true
        } else {
            false
        }
    }

    /// No leader known and no election in flight.
    pub fn needs_election(&self) -> bool {
        self.alive && self.election == ElectionState::Idle && self.leader.is_none()
    }

    /// Reject `(tenure, order_key)` pairs not strictly after the high-water mark.
    pub fn check_order(&self, stamp: OrderStamp) -> Result<()> {
        match self.applied {
            Some(applied) if stamp <= applied => Err(Error::StaleReplication {
                tenure: stamp.tenure.generation,
                order_key: stamp.order_key,
                applied_tenure: applied.tenure.generation,
                applied_order_key: applied.order_key,
            }),
            _ => Ok(()),
        }
    }

    /// Apply an ordered operation once, advancing the high-water mark.
    pub fn apply_ordered(&mut self, stamp: OrderStamp, op: &Operation) -> Result<Balance> {
        self.check_order(stamp)?;
        let balance = self.ledger.apply(
            op,
            stamp.tenure.generation,
            stamp.order_key,
            stamp.tenure.leader,
        );
        self.applied = Some(stamp);
        Ok(balance)
    }

    pub fn crash(&mut self) {
        self.alive = false;
        self.election = ElectionState::Idle;
        self.leader = None;
    }

    /// Back up as a follower with no leader; the ledger keeps whatever it had.
    /// Elections stay closed for `listen` so a live leader's tenure is
    /// learned before this node can claim one.
    pub fn recover(&mut self, now: Instant, listen: Duration) {
        self.alive = true;
        self.election = ElectionState::Idle;
        self.leader = None;
        self.election_attempt = 0;
        self.last_heartbeat = now;
        self.rejoin_until = Some(now + listen);
    }
}
