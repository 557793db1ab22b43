//! Error types for minibank

use crate::common::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Leadership Errors ===
    #[error("Not leader: current leader is {}", display_leader(.known_leader))]
    NotLeader { known_leader: Option<NodeId> },

    #[error("No alive leader and no election could produce one")]
    NoLeader,

    // === Replication Errors ===
    #[error(
        "Stale replication message: ({tenure}, {order_key}) is not after applied ({applied_tenure}, {applied_order_key})"
    )]
    StaleReplication {
        tenure: u64,
        order_key: u64,
        applied_tenure: u64,
        applied_order_key: u64,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // === Node / Network Errors ===
    #[error("Peer {0} is unreachable")]
    UnreachablePeer(NodeId),

    #[error("Node {0} is down")]
    NodeDown(NodeId),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

fn display_leader(leader: &Option<NodeId>) -> String {
    match leader {
        Some(id) => id.to_string(),
        None => "unknown".to_string(),
    }
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::NotLeader { .. }
                | Error::UnreachablePeer(_)
                | Error::NodeDown(_)
        )
    }

    /// Leader hint carried by a `NotLeader` error
    pub fn known_leader(&self) -> Option<NodeId> {
        match self {
            Error::NotLeader { known_leader } => *known_leader,
            _ => None,
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotLeader { .. } => StatusCode::TEMPORARY_REDIRECT,
            Error::NoLeader | Error::NodeDown(_) | Error::UnreachablePeer(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::UnknownNode(_) => StatusCode::NOT_FOUND,
            Error::InvalidConfig(_) | Error::InvalidOperation(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::StaleReplication { .. } => StatusCode::CONFLICT,
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
