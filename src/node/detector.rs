//! Heartbeats and leader failure detection
//!
//! Both tickers run for the whole incarnation and gate themselves on the
//! node's role each tick: only a leader sends heartbeats, only a follower
//! watches for their absence.

use super::Node;
use crate::common::Message;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run_heartbeat_ticker(node: Node, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(node.config().heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                node.send_heartbeats();
            }
        }
    }
    tracing::debug!(node = node.id(), "heartbeat ticker stopped");
}

pub(crate) async fn run_failure_detector(node: Node, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(node.config().heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                node.check_leader();
            }
        }
    }
    tracing::debug!(node = node.id(), "failure detector stopped");
}

impl Node {
    /// Push `Heartbeat{tenure}` to every follower. Does nothing unless leading.
    pub fn send_heartbeats(&self) -> usize {
        let id = self.inner.id;
        let state = self.inner.state.lock();
        if !state.is_leader() {
            return 0;
        }

        let delivered = self.broadcast(Message::Heartbeat {
            leader: id,
            tenure: state.tenure.generation,
        });
        self.inner.metrics.heartbeats_sent.add(delivered as u64);
        delivered
    }

    /// One failure-detector tick. Starts an election when the leader went
    /// silent or none is known. Returns whether an election was started.
    pub fn check_leader(&self) -> bool {
        let id = self.inner.id;
        let timeout = self.inner.config.heartbeat_timeout();

        let (lost, needs_election) = {
            let mut state = self.inner.state.lock();
            let previous = state.leader;
            let timed_out = state.leader_timed_out(Instant::now(), timeout);
            (
                previous.filter(|_| timed_out),
                state.needs_election(),
            )
        };

        if let Some(leader) = lost {
            self.inner.metrics.leader_timeouts.inc();
            tracing::warn!(
                node = id,
                "no heartbeat from leader {} for over {:?}",
                leader,
                timeout
            );
        }

        needs_election && self.start_election()
    }
}
