//! chatroom: a multi-user chat room server
//!
//! Clients connect over TCP, register (`newuser`) or authenticate (`login`),
//! then exchange direct or broadcast messages (`send`), list who is online
//! (`who`) and leave (`logout`). At most `max_clients` connections are served
//! at once; the rest are told the server is full and disconnected.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chatroom::{ChatServer, FileCredentialStore, ServerConfig};
//!
//! let config = ServerConfig::default();
//! let store = Arc::new(FileCredentialStore::new(&config.storage.users_file));
//! let server = ChatServer::new(&config, store)?;
//! let listener = chatroom::server::bind(&config.listen_addr()).await?;
//! server.serve(listener, async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod server;

// Re-export commonly used types
pub use cli::Cli;
pub use config::ServerConfig;
pub use credentials::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ChatError, Result};
pub use server::{ChatServer, Command, SessionRegistry};
