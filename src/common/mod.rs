//! Common utilities and types shared across minibank

pub mod clock;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod tracing_middleware;
pub mod utils;

pub use clock::LamportClock;
pub use config::{ApiConfig, ClusterConfig, Config, MemberConfig};
pub use error::{Error, Result};
pub use message::{
    AccountId, Balance, Envelope, Message, NodeId, Operation, SubmitOperation, SubmitResult,
};
pub use metrics::{MetricsSnapshot, NodeMetrics};
pub use utils::{election_backoff, parse_duration};
