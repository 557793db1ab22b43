//! Message transport between nodes
//!
//! [`Network`] is the seam between a node and whatever carries its messages.
//! [`ChannelNetwork`] is the in-process registry: one unbounded Tokio mpsc
//! inbox per connected node. Channels preserve per-sender order, and a
//! send to a node that is not connected fails with `UnreachablePeer`.

use crate::common::{Envelope, Message, NodeId};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

pub trait Network: Send + Sync + 'static {
    /// Open (or replace) the inbox of `id`.
    fn connect(&self, id: NodeId) -> Inbox;

    /// Drop the inbox of `id`; later sends to it fail.
    fn disconnect(&self, id: NodeId);

    /// Deliver `message` from `from` to `to` without blocking.
    fn send(&self, from: NodeId, to: NodeId, message: Message) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct ChannelNetwork {
    mailboxes: RwLock<HashMap<NodeId, mpsc::UnboundedSender<Envelope>>>,
    /// Directed links `(from, to)` that silently lose traffic
    cut_links: RwLock<HashSet<(NodeId, NodeId)>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        self.mailboxes
            .read()
            .get(&id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Drop every message `from` sends to `to` until [`ChannelNetwork::heal_link`].
    pub fn cut_link(&self, from: NodeId, to: NodeId) {
        self.cut_links.write().insert((from, to));
    }

    pub fn heal_link(&self, from: NodeId, to: NodeId) {
        self.cut_links.write().remove(&(from, to));
    }
}

impl Network for ChannelNetwork {
    fn connect(&self, id: NodeId) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.write().insert(id, tx);
        tracing::debug!(node = id, "inbox connected");
        rx
    }

    fn disconnect(&self, id: NodeId) {
        if self.mailboxes.write().remove(&id).is_some() {
            tracing::debug!(node = id, "inbox disconnected");
        }
    }

    fn send(&self, from: NodeId, to: NodeId, message: Message) -> Result<()> {
        if self.cut_links.read().contains(&(from, to)) {
            tracing::trace!(from, to, kind = message.kind(), "dropped on cut link");
            return Ok(());
        }

        let mailboxes = self.mailboxes.read();
        let tx = mailboxes.get(&to).ok_or(Error::UnreachablePeer(to))?;
        tx.send(Envelope { from, message })
            .map_err(|_| Error::UnreachablePeer(to))
    }
}
