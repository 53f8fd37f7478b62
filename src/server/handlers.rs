//! Command handlers
//!
//! One [`SessionHandler`] per connection turns parsed commands into registry
//! operations and reply lines. Replies go to the session's own outbox;
//! notices and chat lines go to the peers the registry hands back.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::credentials::CredentialStore;
use crate::server::protocol::{reply, Command, ProtocolError, Recipient};
use crate::server::registry::{
    ConnectionId, LoginDenied, LogoutError, RegisterError, SessionRegistry,
};
use crate::server::router;

/// What the receive loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// `send` produced no delivery
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("no recipients for {recipient}")]
    NoRecipients { recipient: String },
}

/// Per-connection command dispatcher
pub struct SessionHandler {
    connection_id: ConnectionId,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn CredentialStore>,
    outbox: mpsc::UnboundedSender<String>,
}

impl SessionHandler {
    pub fn new(
        connection_id: ConnectionId,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn CredentialStore>,
        outbox: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            connection_id,
            registry,
            store,
            outbox,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    fn reply(&self, line: &str) {
        // Fails only once the writer is gone, i.e. the connection is closing
        let _ = self.outbox.send(line.to_string());
    }

    /// Parse and run one received line
    pub fn handle_line(&self, line: &str) -> Flow {
        match Command::parse(line) {
            Ok(command) => self.dispatch(command),
            Err(e) => {
                tracing::debug!("{} sent malformed command: {}", self.connection_id, e);
                self.reply(&e.to_string());
                Flow::Continue
            }
        }
    }

    /// Report a line that exceeded the length limit
    pub fn line_too_long(&self, max: usize) {
        tracing::debug!("{} sent a line over {} bytes", self.connection_id, max);
        self.reply(&ProtocolError::LineTooLong { max }.to_string());
    }

    pub fn dispatch(&self, command: Command) -> Flow {
        tracing::trace!("{} -> {}", self.connection_id, command.name());
        match command {
            Command::Login { user_id, password } => {
                if let Err(e) = self.login(&user_id, &password) {
                    self.reply(&e.to_string());
                }
                Flow::Continue
            }
            Command::NewUser { user_id, password } => {
                if let Err(e) = self.newuser(&user_id, &password) {
                    self.reply(&e.to_string());
                }
                Flow::Continue
            }
            Command::Who => {
                self.who();
                Flow::Continue
            }
            Command::Send { recipient, message } => {
                if let Err(e) = self.send(&recipient, &message) {
                    tracing::debug!("{} send failed: {}", self.connection_id, e);
                }
                Flow::Continue
            }
            Command::Logout => match self.logout() {
                Ok(()) => Flow::Close,
                Err(e) => {
                    self.reply(&e.to_string());
                    Flow::Continue
                }
            },
            Command::Unknown(_) => Flow::Continue,
        }
    }

    fn login(&self, user_id: &str, password: &str) -> Result<(), LoginDenied> {
        let outcome = self.registry.try_login(self.connection_id, user_id, password)?;

        tracing::info!("{} login.", user_id);
        self.reply(reply::LOGIN_CONFIRMED);
        router::deliver_all(&outcome.notify, &reply::joins(user_id));
        Ok(())
    }

    fn newuser(&self, user_id: &str, password: &str) -> Result<(), RegisterError> {
        let result = self
            .registry
            .register_user(user_id, password, |u, p| self.store.append(u, p));

        if let Err(RegisterError::Store(ref e)) = result {
            tracing::error!("Failed to persist account {}: {}", user_id, e);
        }
        result?;

        tracing::info!("New user account created.");
        tracing::debug!("Registered {}", user_id);
        self.reply(reply::ACCOUNT_CREATED);
        Ok(())
    }

    fn logout(&self) -> Result<(), LogoutError> {
        let departure = self.registry.logout(self.connection_id)?;
        let notice = reply::left(&departure.user_id);

        tracing::info!("{} logout.", departure.user_id);
        router::deliver_all(&departure.notify, &notice);
        // The caller sees the same notice as its confirmation
        self.reply(&notice);
        Ok(())
    }

    fn who(&self) {
        self.reply(&self.registry.who().join(", "));
    }

    fn send(&self, recipient: &Recipient, message: &str) -> Result<usize, SendError> {
        let resolution = self.registry.resolve(self.connection_id, recipient);
        if resolution.peers.is_empty() {
            return Err(SendError::NoRecipients {
                recipient: recipient.to_string(),
            });
        }
        // Sessions that never logged in send under an empty name
        let sender = resolution.sender.unwrap_or_default();

        let line = reply::chat(&sender, message);
        match recipient {
            Recipient::All => tracing::info!("{}", line),
            Recipient::User(target) => {
                tracing::info!("{} (to {}): {}", sender, target, message)
            }
        }
        Ok(router::deliver_all(&resolution.peers, &line))
    }
}
