//! Per-connection session task
//!
//! Each accepted connection is split into halves. The read half feeds the
//! receive loop. The write half belongs to a writer future that drains the
//! session's outbox and is joined with the reader on the same task, so lines
//! from other sessions never wait on this socket while the registry lock is
//! held.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::credentials::CredentialStore;
use crate::server::codec::{Line, LineCodec};
use crate::server::handlers::{Flow, SessionHandler};
use crate::server::registry::SessionGuard;

/// Everything a session task needs, handed over by the acceptor
pub struct Session {
    pub stream: TcpStream,
    pub guard: SessionGuard,
    pub outbox: mpsc::UnboundedSender<String>,
    pub inbox: mpsc::UnboundedReceiver<String>,
    pub store: Arc<dyn CredentialStore>,
    pub max_line_length: usize,
}

/// Run a session until the peer disconnects or logs out
pub async fn run_session(session: Session) {
    let Session {
        stream,
        guard,
        outbox,
        inbox,
        store,
        max_line_length,
    } = session;

    let connection_id = guard.connection_id();
    let peer = stream.peer_addr().ok();
    tracing::info!("Session {} started for {:?}", connection_id, peer);

    let (read_half, write_half) = stream.into_split();
    let writer = write_loop(
        FramedWrite::new(write_half, LineCodec::new(max_line_length)),
        inbox,
    );

    let registry = Arc::clone(guard.registry());
    let handler = SessionHandler::new(connection_id, Arc::clone(&registry), store, outbox);
    let reader = async move {
        let result = receive_loop(read_half, &handler, max_line_length).await;
        // Dropping both outbox senders lets the writer drain and close the socket
        drop(handler);
        drop(guard);
        result
    };

    // Both halves run on this task, so aborting the session stops the writer too
    let (read_result, write_result) = tokio::join!(reader, writer);
    if let Err(e) = read_result {
        tracing::warn!("Session {} read error: {}", connection_id, e);
    }
    if let Err(e) = write_result {
        tracing::debug!("Session {} write error: {}", connection_id, e);
    }
    tracing::info!("Session {} closed", connection_id);
    tracing::debug!("Registry after teardown: {:?}", registry.stats());
}

async fn receive_loop(
    read_half: tokio::net::tcp::OwnedReadHalf,
    handler: &SessionHandler,
    max_line_length: usize,
) -> anyhow::Result<()> {
    let mut lines = FramedRead::new(read_half, LineCodec::new(max_line_length));

    while let Some(frame) = lines.next().await {
        match frame? {
            Line::Text(text) => {
                if handler.handle_line(&text) == Flow::Close {
                    break;
                }
            }
            Line::TooLong => handler.line_too_long(max_line_length),
        }
    }
    Ok(())
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, LineCodec>,
    mut inbox: mpsc::UnboundedReceiver<String>,
) -> std::io::Result<()> {
    while let Some(line) = inbox.recv().await {
        sink.send(line).await?;
    }
    // Flushes and shuts down the write half
    sink.close().await
}
