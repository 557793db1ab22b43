//! Priority ("bully") election
//!
//! A node that starts an election asks every higher member to take over.
//! If nobody higher answers within `election_timeout`, it takes leadership
//! with a tenure newer than any it has seen and announces it. If somebody
//! does answer, it waits `announcement_timeout` for the announcement and
//! re-elects (with backoff) when none shows up, which covers a higher node
//! crashing between its ack and its announcement.

use super::state::{ElectionState, Tenure, TenureOutcome};
use super::{sleep_or_cancel, Node};
use crate::common::{election_backoff, Message, NodeId};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

impl Node {
    /// Enter `Electing` unless already electing or leading. Returns whether
    /// a new election round was started. Waiting happens on a separate task.
    pub fn start_election(&self) -> bool {
        let id = self.inner.id;
        let round = match self.inner.state.lock().begin_election(Instant::now()) {
            Some(round) => round,
            None => return false,
        };
        self.inner.metrics.elections_started.inc();

        let higher: Vec<NodeId> = self.peers().into_iter().filter(|&p| p > id).collect();
        tracing::info!(node = id, round, "starting election, contacting {:?}", higher);

        let delivered = higher
            .iter()
            .filter(|&&peer| self.send(peer, Message::ElectionRequest { from: id }))
            .count();

        if delivered == 0 {
            // Nobody higher is reachable: no ack can come back.
            self.claim_leadership(round);
        } else {
            let node = self.clone();
            self.spawn(move |cancel| async move { node.await_election(round, cancel).await });
        }
        true
    }

    async fn await_election(self, round: u64, cancel: CancellationToken) {
        let id = self.inner.id;
        let config = self.inner.config.clone();

        if !sleep_or_cancel(&cancel, config.election_timeout()).await {
            return;
        }

        let acked = {
            let state = self.inner.state.lock();
            if !state.alive || state.election_round != round {
                return;
            }
            match state.election {
                ElectionState::Electing => false,
                ElectionState::Follower if state.leader.is_none() => true,
                _ => return,
            }
        };

        if !acked {
            tracing::debug!(node = id, round, "election timeout without ack");
            self.claim_leadership(round);
            return;
        }

        if !sleep_or_cancel(&cancel, config.announcement_timeout()).await {
            return;
        }

        let attempt = {
            let mut state = self.inner.state.lock();
            if !state.alive
                || state.election_round != round
                || state.election != ElectionState::Follower
                || state.leader.is_some()
            {
                return;
            }
            state.election_attempt = state.election_attempt.saturating_add(1);
            state.election_attempt
        };

        let delay = election_backoff(
            config.election_timeout(),
            config.max_election_backoff(),
            attempt - 1,
        );
        tracing::warn!(
            node = id,
            round,
            attempt,
            "acked but no coordinator announced; re-electing in {:?}",
            delay
        );

        if !sleep_or_cancel(&cancel, delay).await {
            return;
        }

        let retry = {
            let mut state = self.inner.state.lock();
            let still_leaderless = state.alive
                && state.election_round == round
                && state.election == ElectionState::Follower
                && state.leader.is_none();
            if still_leaderless {
                state.election = ElectionState::Idle;
            }
            still_leaderless
        };
        if retry {
            self.start_election();
        }
    }

    /// Become leader if `round` is still the live election, then announce.
    fn claim_leadership(&self, round: u64) {
        let id = self.inner.id;
        let mut state = self.inner.state.lock();
        if !state.alive
            || state.election_round != round
            || state.election != ElectionState::Electing
        {
            return;
        }

        let tenure = state.become_leader();
        self.inner.metrics.elections_won.inc();
        tracing::info!(
            node = id,
            tenure = tenure.generation,
            "elected leader"
        );

        self.broadcast(Message::CoordinatorAnnouncement {
            leader: id,
            tenure: tenure.generation,
        });
    }

    pub(crate) fn on_election_request(&self, from: NodeId) {
        let id = self.inner.id;
        if from >= id {
            tracing::debug!(node = id, from, "ignoring election request from non-lower node");
            return;
        }

        {
            let state = self.inner.state.lock();
            if !state.alive {
                return;
            }
            self.send(from, Message::ElectionAck { from: id });
            if state.is_leader() {
                // Already in charge: tell the requester directly.
                self.send(
                    from,
                    Message::CoordinatorAnnouncement {
                        leader: id,
                        tenure: state.tenure.generation,
                    },
                );
                return;
            }
        }

        self.start_election();
    }

    pub(crate) fn on_election_ack(&self, from: NodeId) {
        if self.inner.state.lock().record_ack(from) {
            tracing::debug!(node = self.inner.id, from, "election acked, awaiting coordinator");
        }
    }

    /// Tell a node acting on an older tenure who leads now. A stale leader
    /// that outranks the current one reasserts above `current`; any other
    /// adopts it.
    pub(crate) fn correct_stale_leader(&self, to: NodeId, current: Tenure) {
        if to == self.inner.id || current.leader == to {
            return;
        }
        tracing::debug!(
            node = self.inner.id,
            to,
            tenure = current.generation,
            leader = current.leader,
            "correcting stale leader"
        );
        self.send(
            to,
            Message::CoordinatorAnnouncement {
                leader: current.leader,
                tenure: current.generation,
            },
        );
    }

    /// CoordinatorAnnouncement or Heartbeat from a (claimed) leader.
    pub(crate) fn on_leader_message(&self, leader: NodeId, generation: u64, heartbeat: bool) {
        let id = self.inner.id;
        if heartbeat {
            self.inner.metrics.heartbeats_received.inc();
        }

        let (outcome, current) = {
            let mut state = self.inner.state.lock();
            let outcome = state.observe_tenure(leader, generation, Instant::now());
            if outcome == TenureOutcome::Reassert {
                let tenure = state.become_leader();
                tracing::info!(
                    node = id,
                    tenure = tenure.generation,
                    "outranking leader {}, re-announcing",
                    leader
                );
                self.broadcast(Message::CoordinatorAnnouncement {
                    leader: id,
                    tenure: tenure.generation,
                });
            }
            (outcome, state.alive.then_some(state.tenure))
        };

        match outcome {
            TenureOutcome::Stale => {
                self.inner.metrics.stale_discarded.inc();
                tracing::debug!(
                    node = id,
                    leader,
                    tenure = generation,
                    "stale {} discarded",
                    if heartbeat { "heartbeat" } else { "announcement" }
                );
                if let Some(current) = current {
                    self.correct_stale_leader(leader, current);
                }
            }
            TenureOutcome::Refreshed => {
                tracing::trace!(node = id, leader, tenure = generation, "leader alive");
            }
            TenureOutcome::Adopted => {
                tracing::info!(node = id, tenure = generation, "following leader {}", leader);
            }
            TenureOutcome::AdoptedOutranked => {
                tracing::info!(
                    node = id,
                    tenure = generation,
                    "following lower leader {} for now, starting election",
                    leader
                );
                self.start_election();
            }
            TenureOutcome::IgnoredWhileElecting => {
                tracing::debug!(node = id, leader, "lower leader announced mid-election");
            }
            TenureOutcome::Reassert => {}
        }
    }
}
