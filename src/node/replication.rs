//! Leader admission and replica application
//!
//! The leader stamps each admitted operation with its Lamport clock, applies
//! it locally and pushes it to every follower without waiting for acks.
//! Every node applies an ordered operation at most once: anything not
//! strictly after its `(tenure, order_key)` high-water mark is dropped.

use super::state::{OrderStamp, Tenure};
use super::Node;
use crate::common::{Balance, Message, NodeId, Operation, SubmitResult};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Outcome of an admitted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub order_key: u64,
    pub tenure: u64,
    pub leader: NodeId,
    pub balance: Balance,
}

impl From<SubmitReceipt> for SubmitResult {
    fn from(receipt: SubmitReceipt) -> Self {
        SubmitResult {
            accepted: true,
            applied_order_key: Some(receipt.order_key),
            tenure: Some(receipt.tenure),
            known_leader: Some(receipt.leader),
            balance: Some(receipt.balance),
            error: None,
        }
    }
}

impl Node {
    /// Admit a client operation. Only the current leader accepts; any other
    /// node answers `NotLeader` with the leader it knows of, if any.
    pub fn submit(&self, operation: Operation) -> Result<SubmitReceipt> {
        operation.validate()?;
        let id = self.inner.id;

        let mut state = self.inner.state.lock();
        if !state.alive {
            return Err(Error::NodeDown(id));
        }
        if !state.is_leader() {
            return Err(Error::NotLeader {
                known_leader: state.leader,
            });
        }

        let order_key = self.inner.clock.tick();
        let stamp = OrderStamp::new(state.tenure, order_key);
        let balance = state.apply_ordered(stamp, &operation)?;
        self.inner.metrics.operations_admitted.inc();
        self.inner.metrics.operations_applied.inc();

        // Still under the lock so followers see operations in stamp order.
        let delivered = self.broadcast(Message::ReplicateOperation {
            order_key,
            tenure: stamp.tenure.generation,
            leader: id,
            operation: operation.clone(),
        });
        drop(state);

        tracing::info!(
            node = id,
            tenure = stamp.tenure.generation,
            order_key,
            "admitted {} {:+} (replicated to {} peers)",
            operation.account_id,
            operation.delta,
            delivered
        );

        Ok(SubmitReceipt {
            order_key,
            tenure: stamp.tenure.generation,
            leader: id,
            balance,
        })
    }

    /// Apply a `ReplicateOperation` from `leader`. Stale or duplicate
    /// stamps return `StaleReplication` and leave the ledger untouched.
    pub fn apply_replicated(
        &self,
        leader: NodeId,
        generation: u64,
        order_key: u64,
        operation: &Operation,
    ) -> Result<Balance> {
        let id = self.inner.id;
        let stamp = OrderStamp::new(Tenure::new(generation, leader), order_key);

        let mut state = self.inner.state.lock();
        if !state.alive {
            return Err(Error::NodeDown(id));
        }
        if let Err(e) = state.check_order(stamp) {
            self.inner.metrics.stale_discarded.inc();
            let current = state.tenure;
            drop(state);
            if stamp.tenure < current {
                self.correct_stale_leader(leader, current);
            }
            return Err(e);
        }

        self.inner.clock.merge(order_key);
        let balance = state.apply_ordered(stamp, operation)?;
        self.inner.metrics.operations_applied.inc();

        tracing::debug!(
            node = id,
            tenure = generation,
            order_key,
            "applied {} {:+} from leader {}",
            operation.account_id,
            operation.delta,
            leader
        );
        Ok(balance)
    }
}
