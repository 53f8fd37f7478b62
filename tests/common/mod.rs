//! Common test utilities for chatroom integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use chatroom::server::{bind, ChatServer};
use chatroom::{Credential, CredentialStore, MemoryCredentialStore, ServerConfig, SessionRegistry};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE_WINDOW: Duration = Duration::from_millis(200);

/// A chat server running on an ephemeral localhost port
pub struct TestServer {
    pub addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<chatroom::Result<()>>,
}

impl TestServer {
    /// Start a server with the default capacity and no accounts
    pub async fn start() -> Self {
        Self::with_store(3, Arc::new(MemoryCredentialStore::new())).await
    }

    /// Start a server with the given capacity and pre-registered accounts
    pub async fn with_accounts(max_clients: usize, accounts: &[(&str, &str)]) -> Self {
        let store = MemoryCredentialStore::with_credentials(
            accounts.iter().map(|(u, p)| Credential::new(*u, *p)),
        );
        Self::with_store(max_clients, Arc::new(store)).await
    }

    pub async fn with_store(max_clients: usize, store: Arc<dyn CredentialStore>) -> Self {
        let mut config = ServerConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.max_clients = max_clients;

        let server = ChatServer::new(&config, store).expect("server construction failed");
        let registry = Arc::clone(server.registry());
        let listener = bind(&config.listen_addr()).await.expect("bind failed");
        let addr = listener.local_addr().expect("local_addr failed");

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        Self {
            addr,
            registry,
            shutdown: Some(tx),
            task,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open a client connection
    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Open a connection and wait until the server has admitted it
    pub async fn connect_admitted(&self) -> TestClient {
        let mut client = self.connect().await;
        // `who` always answers, so a reply proves the session is live
        client.send("who").await;
        client.recv().await;
        client
    }

    /// Connect, log in and wait for the confirmation
    pub async fn login(&self, user_id: &str, password: &str) -> TestClient {
        let mut client = self.connect().await;
        client.send(&format!("login {} {}", user_id, password)).await;
        assert_eq!(client.recv().await, "login confirmed.");
        client
    }

    /// Poll until the registry holds `expected` sessions
    pub async fn wait_for_sessions(&self, expected: usize) {
        let registry = Arc::clone(&self.registry);
        let waited = tokio::time::timeout(RECV_TIMEOUT, async move {
            while registry.session_count() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "registry never reached {} sessions (has {})",
            expected,
            self.registry.session_count()
        );
    }

    /// Trigger shutdown and wait for the accept loop to finish
    pub async fn stop(mut self) -> chatroom::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(RECV_TIMEOUT, &mut self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// Line-oriented client speaking the chat protocol
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{}\n", line).as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write failed");
    }

    /// Next line from the server; panics on timeout or close
    pub async fn recv(&mut self) -> String {
        match tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => panic!("connection closed while waiting for a line"),
            Ok(Err(e)) => panic!("read failed: {}", e),
            Err(_) => panic!("timed out waiting for a line"),
        }
    }

    /// Assert nothing arrives within a short window
    pub async fn expect_silence(&mut self) {
        if let Ok(result) = tokio::time::timeout(SILENCE_WINDOW, self.lines.next_line()).await {
            panic!("expected silence, got {:?}", result);
        }
    }

    /// Assert the server closes the connection without sending more lines
    pub async fn expect_closed(&mut self) {
        match tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(None)) | Ok(Err(_)) => {}
            Ok(Ok(Some(line))) => panic!("expected close, got line {:?}", line),
            Err(_) => panic!("timed out waiting for close"),
        }
    }
}
