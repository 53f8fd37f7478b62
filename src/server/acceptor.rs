//! Connection acceptor
//!
//! Owns the listener and a `JoinSet` holding every session task, so shutdown
//! can abort and await all of them. Admission (cap check plus registry insert)
//! happens in the registry before a task is spawned.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::credentials::CredentialStore;
use crate::error::{ChatError, Result};
use crate::server::protocol::reply;
use crate::server::registry::SessionRegistry;
use crate::server::session::{run_session, Session};

/// Bind the listening socket
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| ChatError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// The chat server: registry, credential store and accept loop
pub struct ChatServer {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn CredentialStore>,
    max_line_length: usize,
}

impl ChatServer {
    /// Build a server and load every stored account into the registry
    pub fn new(config: &ServerConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let registry = Arc::new(SessionRegistry::new(config.server.max_clients));
        let loaded = registry.load_users(store.load_all()?);
        tracing::info!("Loaded {} user accounts", loaded);

        Ok(Self {
            registry,
            store,
            max_line_length: config.server.max_line_length,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Accept connections until `shutdown` resolves or accept fails.
    ///
    /// An accept failure ends the loop with an error. In both cases every
    /// session task is aborted and awaited before returning, which releases
    /// their registry entries.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        let mut sessions: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break Ok(());
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!("Session task panicked: {}", e);
                        }
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.admit(stream, addr, &mut sessions),
                    Err(source) => {
                        tracing::error!("accept() error: {}", source);
                        break Err(ChatError::Accept { addr: local_addr, source });
                    }
                }
            }
        };

        if !sessions.is_empty() {
            tracing::info!("Closing {} open connections", sessions.len());
        }
        sessions.shutdown().await;
        result
    }

    fn admit(&self, stream: TcpStream, addr: SocketAddr, sessions: &mut JoinSet<()>) {
        let (outbox, inbox) = mpsc::unbounded_channel();

        match self.registry.admit(Some(addr), outbox.clone()) {
            Ok(guard) => {
                tracing::debug!("Accepted {} ({:?})", addr, self.registry.stats());
                sessions.spawn(run_session(Session {
                    stream,
                    guard,
                    outbox,
                    inbox,
                    store: Arc::clone(&self.store),
                    max_line_length: self.max_line_length,
                }));
            }
            Err(e) => {
                tracing::info!("Maximum number of clients already connected to server.");
                tracing::debug!("Rejected {}: {:?}", addr, e);
                sessions.spawn(reject(stream));
            }
        }
    }
}

/// Tell a client the server is full and close the connection
async fn reject(mut stream: TcpStream) {
    let line = format!("{}\n", reply::SERVER_FULL);
    if let Err(e) = stream.write_all(line.as_bytes()).await {
        tracing::debug!("Failed to send capacity notice: {}", e);
    }
    let _ = stream.shutdown().await;
}
