//! Recipient resolution and delivery
//!
//! Resolution runs inside the registry lock over a borrowed view of the live
//! sessions and yields the peers to write to. Delivery happens afterwards,
//! outside the lock, by pushing lines onto each peer's outbound queue.

use tokio::sync::mpsc;

use crate::server::protocol::Recipient;
use crate::server::registry::ConnectionId;

/// Outbound handle for one live session
#[derive(Debug, Clone)]
pub struct Peer {
    pub connection_id: ConnectionId,
    outbox: mpsc::UnboundedSender<String>,
}

impl Peer {
    pub fn new(connection_id: ConnectionId, outbox: mpsc::UnboundedSender<String>) -> Self {
        Self {
            connection_id,
            outbox,
        }
    }

    /// Queue a line for this session's writer; false if the session is gone
    pub fn deliver(&self, line: &str) -> bool {
        self.outbox.send(line.to_string()).is_ok()
    }
}

/// Borrowed view of a session used during resolution
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub connection_id: ConnectionId,
    pub assigned_user: Option<&'a str>,
}

/// Resolve a `send` target to the connections that should receive it.
///
/// - `all`: every authenticated session except the sender's own
/// - a user ID: the one session logged in under it, unless that is the sender
///
/// An unauthenticated sender may still send; it has no user ID to match.
pub fn resolve<'a>(
    sessions: impl IntoIterator<Item = SessionView<'a>>,
    sender: ConnectionId,
    sender_user: Option<&str>,
    recipient: &Recipient,
) -> Vec<ConnectionId> {
    match recipient {
        Recipient::All => broadcast_targets(sessions, sender),
        Recipient::User(target) => {
            if sender_user == Some(target.as_str()) {
                return Vec::new();
            }
            sessions
                .into_iter()
                .find(|s| s.assigned_user == Some(target.as_str()))
                .map(|s| vec![s.connection_id])
                .unwrap_or_default()
        }
    }
}

/// Every authenticated session other than `exclude`
pub fn broadcast_targets<'a>(
    sessions: impl IntoIterator<Item = SessionView<'a>>,
    exclude: ConnectionId,
) -> Vec<ConnectionId> {
    sessions
        .into_iter()
        .filter(|s| s.connection_id != exclude && s.assigned_user.is_some())
        .map(|s| s.connection_id)
        .collect()
}

/// Write a line to every peer, returning how many accepted it
pub fn deliver_all(peers: &[Peer], line: &str) -> usize {
    peers.iter().filter(|peer| peer.deliver(line)).count()
}
