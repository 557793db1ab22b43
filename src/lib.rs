//! # minibank
//!
//! A small replicated ledger:
//! - Bully election: the highest alive node identity becomes coordinator
//! - Heartbeat failure detection with automatic re-election
//! - Leader-stamped, Lamport-ordered replication of balance updates
//! - Fail-stop nodes, in-memory state, no quorum
//!
//! ## Architecture
//!
//! ```text
//!            client
//!              │ submit(account, delta)
//!              ▼
//!   ┌─────────────────────┐  Heartbeat / CoordinatorAnnouncement
//!   │ leader (highest id) │──────────────────────────────┐
//!   │  tick() → order_key │  ReplicateOperation          │
//!   └─────────┬───────────┘──────────────┐               │
//!             │                          │               │
//!   ┌─────────▼─────────┐      ┌─────────▼─────────┐     │
//!   │ follower          │      │ follower          │◄────┘
//!   │  merge(order_key) │      │  merge(order_key) │
//!   │  failure detector │      │  failure detector │
//!   └───────────────────┘      └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start an in-process cluster with an HTTP API
//! ```bash
//! minibank-cluster serve --nodes 1,2,3 --bind 127.0.0.1:7000
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minibank submit ACC001 1000
//! minibank crash 3
//! minibank status
//! ```

pub mod cluster;
pub mod common;
pub mod node;

// Re-export commonly used types
pub use cluster::{Cluster, ClusterClient, ClusterStatus};
pub use common::{ClusterConfig, Config, Error, Operation, Result};
pub use node::{Node, NodeStatus, Role};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
