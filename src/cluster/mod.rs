//! Cluster wiring: transport, bootstrap, and the client-facing HTTP surface

pub mod client;
pub mod http;
pub mod network;
pub mod server;

pub use client::ClusterClient;
pub use network::{ChannelNetwork, Inbox, Network};
pub use server::{Cluster, ClusterStatus};
