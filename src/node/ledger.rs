//! Replicated account ledger and its transaction journal

use crate::common::{AccountId, Balance, NodeId, Operation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A transaction as applied on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub order_key: u64,
    pub tenure: u64,
    pub leader: NodeId,
    pub account_id: AccountId,
    pub delta: Balance,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    balances: BTreeMap<AccountId, Balance>,
    journal: Vec<Transaction>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with opening balances. Seeds are not journaled.
    pub fn with_seed(seed: &BTreeMap<AccountId, Balance>) -> Self {
        Self {
            balances: seed.clone(),
            journal: Vec::new(),
        }
    }

    /// Apply `op` stamped `(tenure, order_key)` and return the new balance.
    pub fn apply(&mut self, op: &Operation, tenure: u64, order_key: u64, leader: NodeId) -> Balance {
        let balance = self.balances.entry(op.account_id.clone()).or_insert(0);
        *balance = balance.saturating_add(op.delta);
        let new_balance = *balance;

        self.journal.push(Transaction {
            order_key,
            tenure,
            leader,
            account_id: op.account_id.clone(),
            delta: op.delta,
            applied_at: Utc::now(),
        });

        new_balance
    }

    pub fn balance(&self, account: &str) -> Option<Balance> {
        self.balances.get(account).copied()
    }

    pub fn balances(&self) -> &BTreeMap<AccountId, Balance> {
        &self.balances
    }

    pub fn journal(&self) -> &[Transaction] {
        &self.journal
    }

    pub fn transaction_count(&self) -> usize {
        self.journal.len()
    }
}
