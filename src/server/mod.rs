//! Chat room server
//!
//! A TCP server where clients register, log in, and exchange direct or
//! broadcast messages, with at most `max_clients` connections live at once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      ChatServer (acceptor)                          │
//! │   accept ──► SessionRegistry::admit ──► JoinSet::spawn(session)     │
//! │                 │ full? reply + close                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                SessionRegistry (Arc<Mutex<..>>)                      │
//! │   sessions: ConnectionId ──► { assigned_user, login_seq, outbox }   │
//! │   users:    userID       ──► { password, LoginStatus }              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   Session task (one per connection)                                 │
//! │     FramedRead<LineCodec> ──► Command::parse ──► SessionHandler     │
//! │     outbox (mpsc) ──► writer future ──► FramedWrite<LineCodec>       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Newline-terminated text lines of at most 294 bytes:
//!
//! ```text
//! newuser <userID> <password>   -> New user account created. Please login.
//! login <userID> <password>     -> login confirmed.     (others: "<userID> joins.")
//! who                           -> alice, bob
//! send <userID|all> <message>   -> recipients get "<sender>: <message>"
//! logout                        -> "<userID> left." to everyone, then close
//! ```
//!
//! # Locking
//!
//! The registry mutex is the only lock on shared state. It is never held
//! across an `.await` or a socket write: handlers collect [`router::Peer`]
//! handles under the lock and push lines onto their outboxes afterwards.

pub mod acceptor;
pub mod codec;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod session;

pub use acceptor::{bind, ChatServer};
pub use codec::{Line, LineCodec};
pub use handlers::{Flow, SessionHandler};
pub use protocol::{reply, Command, ProtocolError, Recipient};
pub use registry::{ConnectionId, LoginStatus, RegistryStats, SessionGuard, SessionRegistry};
pub use router::Peer;
