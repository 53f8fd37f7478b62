//! Session and user registry
//!
//! Holds the two pieces of state shared by every session task: the live
//! connections (and who each one is logged in as) and the known accounts with
//! their login status. Both maps sit behind one `parking_lot::Mutex`, and
//! every operation that reads or changes them is a method here, so each
//! login check, registration, logout and teardown is atomic with respect to
//! the others.
//!
//! Methods that produce notices return [`Peer`] snapshots taken under the
//! lock; callers write to them after the lock is released.
//!
//! # Invariants
//!
//! - At most `max_clients` sessions are registered.
//! - Every session's assigned user has status [`LoginStatus::LoggedIn`], and no
//!   two sessions share an assigned user.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::credentials::Credential;
use crate::error::ChatError;
use crate::server::protocol::{reply, Recipient};
use crate::server::router::{self, Peer, SessionView};

/// Opaque identifier of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hyphenated = self.0.hyphenated().to_string();
        let short = hyphenated.split('-').next().unwrap_or(&hyphenated);
        write!(f, "conn_{}", short)
    }
}

/// Whether an account is free to log in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Available,
    LoggedIn,
}

/// A registered account
#[derive(Debug, Clone)]
struct User {
    password: String,
    status: LoginStatus,
}

/// Per-connection state
#[derive(Debug)]
struct SessionEntry {
    peer_addr: Option<SocketAddr>,
    assigned_user: Option<String>,
    /// Position in login order, for `who`
    login_seq: u64,
    connected_at: Instant,
    outbox: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    sessions: HashMap<ConnectionId, SessionEntry>,
    users: HashMap<String, User>,
    /// Names being persisted by an in-flight registration
    reserved: HashSet<String>,
    next_login_seq: u64,
}

impl RegistryInner {
    fn views(&self) -> impl Iterator<Item = SessionView<'_>> {
        self.sessions.iter().map(|(id, entry)| SessionView {
            connection_id: *id,
            assigned_user: entry.assigned_user.as_deref(),
        })
    }

    fn peers(&self, ids: &[ConnectionId]) -> Vec<Peer> {
        ids.iter()
            .filter_map(|id| {
                self.sessions
                    .get(id)
                    .map(|entry| Peer::new(*id, entry.outbox.clone()))
            })
            .collect()
    }

    fn others(&self, exclude: ConnectionId) -> Vec<Peer> {
        let ids = router::broadcast_targets(self.views(), exclude);
        self.peers(&ids)
    }
}

/// Admission refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Maximum number of clients already connected to server. Please try again later.")]
    ServerFull { max_clients: usize },
}

/// Login refused. The message is the reply line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginDenied {
    #[error("Denied. User name or password incorrect.")]
    BadCredentials,

    #[error("Denied. User is already logged in.")]
    AlreadyLoggedIn,

    #[error("Denied. Already logged in on this connection.")]
    SessionAuthenticated,

    #[error("Denied. Session is not registered.")]
    UnknownSession,
}

/// Registration refused. The message is the reply line.
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Denied. User account already exists.")]
    AlreadyExists,

    #[error("Denied. Account could not be saved.")]
    Store(#[source] ChatError),
}

/// Logout refused. The message is the reply line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogoutError {
    #[error("Logout failed.")]
    NotLoggedIn,
}

/// Successful login
#[derive(Debug)]
pub struct LoginOutcome {
    /// Other authenticated sessions to send the join notice to
    pub notify: Vec<Peer>,
}

/// Successful logout, or a logged-in session that went away
#[derive(Debug)]
pub struct Departure {
    pub user_id: String,
    /// Remaining authenticated sessions to send the leave notice to
    pub notify: Vec<Peer>,
}

/// Result of resolving a `send` target
#[derive(Debug)]
pub struct Resolution {
    /// Sender's user ID, if the sending session is logged in
    pub sender: Option<String>,
    pub peers: Vec<Peer>,
}

/// Counts for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub sessions: usize,
    pub authenticated: usize,
    pub users: usize,
}

/// Shared registry of live sessions and known users
#[derive(Debug)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    max_clients: usize,
}

impl SessionRegistry {
    /// Create an empty registry admitting at most `max_clients` sessions
    pub fn new(max_clients: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            max_clients,
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Add accounts loaded from the credential store, all logged out.
    /// A later record for the same user replaces the earlier password.
    pub fn load_users(&self, credentials: impl IntoIterator<Item = Credential>) -> usize {
        let mut inner = self.inner.lock();
        let mut loaded = 0;
        for credential in credentials {
            inner.users.insert(
                credential.user_id,
                User {
                    password: credential.password,
                    status: LoginStatus::Available,
                },
            );
            loaded += 1;
        }
        loaded
    }

    /// Register a new session if there is room.
    ///
    /// The capacity check and the insert happen under one lock acquisition.
    /// The returned guard removes the session again when dropped.
    pub fn admit(
        self: &Arc<Self>,
        peer_addr: Option<SocketAddr>,
        outbox: mpsc::UnboundedSender<String>,
    ) -> Result<SessionGuard, AdmissionError> {
        let connection_id = ConnectionId::new();
        {
            let mut inner = self.inner.lock();
            if inner.sessions.len() >= self.max_clients {
                return Err(AdmissionError::ServerFull {
                    max_clients: self.max_clients,
                });
            }
            inner.sessions.insert(
                connection_id,
                SessionEntry {
                    peer_addr,
                    assigned_user: None,
                    login_seq: 0,
                    connected_at: Instant::now(),
                    outbox,
                },
            );
        }

        tracing::debug!("Admitted {} from {:?}", connection_id, peer_addr);
        Ok(SessionGuard {
            registry: Arc::clone(self),
            connection_id,
        })
    }

    /// Log a session in as `user_id`.
    ///
    /// Denials are checked in order: this connection already logged in,
    /// unknown user or wrong password (same reply for both), account in use.
    pub fn try_login(
        &self,
        connection_id: ConnectionId,
        user_id: &str,
        password: &str,
    ) -> Result<LoginOutcome, LoginDenied> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let session = inner
            .sessions
            .get_mut(&connection_id)
            .ok_or(LoginDenied::UnknownSession)?;
        if session.assigned_user.is_some() {
            return Err(LoginDenied::SessionAuthenticated);
        }

        let user = inner
            .users
            .get_mut(user_id)
            .ok_or(LoginDenied::BadCredentials)?;
        if user.password != password {
            return Err(LoginDenied::BadCredentials);
        }
        if user.status == LoginStatus::LoggedIn {
            return Err(LoginDenied::AlreadyLoggedIn);
        }

        user.status = LoginStatus::LoggedIn;
        inner.next_login_seq += 1;
        session.assigned_user = Some(user_id.to_string());
        session.login_seq = inner.next_login_seq;

        Ok(LoginOutcome {
            notify: inner.others(connection_id),
        })
    }

    /// Create an account, persisting it through `persist` before it becomes
    /// visible. A persist failure leaves the registry unchanged.
    ///
    /// The name is reserved under the lock and `persist` runs with the lock
    /// released, so a slow store only delays this caller. A concurrent
    /// registration of the same name is refused while the reservation holds.
    pub fn register_user<F>(
        &self,
        user_id: &str,
        password: &str,
        persist: F,
    ) -> Result<(), RegisterError>
    where
        F: FnOnce(&str, &str) -> crate::error::Result<()>,
    {
        {
            let mut inner = self.inner.lock();
            if inner.users.contains_key(user_id) || !inner.reserved.insert(user_id.to_string()) {
                return Err(RegisterError::AlreadyExists);
            }
        }

        let persisted = persist(user_id, password);

        let mut inner = self.inner.lock();
        inner.reserved.remove(user_id);
        persisted.map_err(RegisterError::Store)?;
        inner.users.insert(
            user_id.to_string(),
            User {
                password: password.to_string(),
                status: LoginStatus::Available,
            },
        );
        Ok(())
    }

    /// Log the session's user out.
    ///
    /// The account becomes available again and the session loses its
    /// assignment here, so it is never listed or addressed while its task
    /// winds down; removing the session itself is left to the guard.
    pub fn logout(&self, connection_id: ConnectionId) -> Result<Departure, LogoutError> {
        let mut inner = self.inner.lock();
        let user_id = inner
            .sessions
            .get_mut(&connection_id)
            .and_then(|session| session.assigned_user.take())
            .ok_or(LogoutError::NotLoggedIn)?;

        if let Some(user) = inner.users.get_mut(&user_id) {
            user.status = LoginStatus::Available;
        }

        Ok(Departure {
            notify: inner.others(connection_id),
            user_id,
        })
    }

    /// Remove a session. Returns a departure if it was still logged in, in
    /// which case its account is released as well.
    pub fn remove_session(&self, connection_id: ConnectionId) -> Option<Departure> {
        let mut inner = self.inner.lock();
        let entry = inner.sessions.remove(&connection_id)?;

        tracing::debug!(
            "Removed {} ({:?}) after {:?}",
            connection_id,
            entry.peer_addr,
            entry.connected_at.elapsed()
        );

        let user_id = entry.assigned_user?;
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.status = LoginStatus::Available;
        }
        Some(Departure {
            notify: inner.others(connection_id),
            user_id,
        })
    }

    /// Resolve a `send` target for the given sending session
    pub fn resolve(&self, connection_id: ConnectionId, recipient: &Recipient) -> Resolution {
        let inner = self.inner.lock();
        let sender = inner
            .sessions
            .get(&connection_id)
            .and_then(|session| session.assigned_user.clone());
        let ids = router::resolve(inner.views(), connection_id, sender.as_deref(), recipient);
        Resolution {
            peers: inner.peers(&ids),
            sender,
        }
    }

    /// Logged-in users in login order
    pub fn who(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut logged_in: Vec<(u64, &str)> = inner
            .sessions
            .values()
            .filter_map(|s| s.assigned_user.as_deref().map(|user| (s.login_seq, user)))
            .collect();
        logged_in.sort_unstable_by_key(|(seq, _)| *seq);
        logged_in
            .into_iter()
            .map(|(_, user)| user.to_string())
            .collect()
    }

    /// The user a session is logged in as
    pub fn assigned_user(&self, connection_id: ConnectionId) -> Option<String> {
        self.inner
            .lock()
            .sessions
            .get(&connection_id)
            .and_then(|session| session.assigned_user.clone())
    }

    /// Login status of an account, if it exists
    pub fn login_status(&self, user_id: &str) -> Option<LoginStatus> {
        self.inner.lock().users.get(user_id).map(|user| user.status)
    }

    pub fn contains_session(&self, connection_id: ConnectionId) -> bool {
        self.inner.lock().sessions.contains_key(&connection_id)
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            sessions: inner.sessions.len(),
            authenticated: inner
                .sessions
                .values()
                .filter(|s| s.assigned_user.is_some())
                .count(),
            users: inner.users.len(),
        }
    }
}

/// Registry membership of one session, released on drop.
///
/// Dropping the guard removes the session on every exit path (logout, peer
/// disconnect, I/O error, task abort). If the session was still logged in,
/// its account is released and the remaining users get a leave notice.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    connection_id: ConnectionId,
}

impl SessionGuard {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(departure) = self.registry.remove_session(self.connection_id) {
            tracing::info!("{} disconnected.", departure.user_id);
            router::deliver_all(&departure.notify, &reply::left(&departure.user_id));
        }
    }
}
