//! Integration tests for the TCP chat server.
//!
//! These tests run a real `ChatServer` on `127.0.0.1:0` and talk to it over
//! TCP, covering the handshake, chat commands, room scoping, the status
//! reporter and graceful shutdown.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free behavior of
//! production code is checked through assertions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use roomchat_core::MemoryCredentialStore;
use roomchatd::config::{Config, NoticeScope};
use roomchatd::registry::spawn_dispatcher;
use roomchatd::server::ChatServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on any single network wait
const IO_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle.
struct TestServer {
    addr: SocketAddr,
    status_addr: Option<SocketAddr>,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(Config::default()).await
    }

    /// Spawns a server on loopback ports chosen by the OS.
    async fn spawn_with(mut config: Config) -> Self {
        config.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.status_addr = Some("127.0.0.1:0".parse().unwrap());

        let registry = spawn_dispatcher(config.notice_scope);
        let credentials = Arc::new(MemoryCredentialStore::new());
        let cancel_token = CancellationToken::new();

        let server = ChatServer::bind(&config, registry, credentials, cancel_token.clone())
            .await
            .expect("bind server");
        let addr = server.local_addr().expect("local addr");
        let status_addr = server.status_addr();

        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        TestServer {
            addr,
            status_addr,
            cancel_token,
            task,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to server");
        TestClient { stream }
    }

    /// Logs in and consumes the greeting lines of a fresh account.
    async fn login(&self, name: &str, secret: &str) -> TestClient {
        let mut client = self.connect().await;
        client.send(name).await;
        client.send(secret).await;
        client.expect("Enter your username: ").await;
        client.expect("Enter your password: ").await;
        client
            .expect("Registration successful. You are now authenticated.\n")
            .await;
        client.expect(&format!("{name} joined the chat\n")).await;
        client
    }

    async fn status(&self) -> String {
        let addr = self.status_addr.expect("status reporter enabled");
        let mut stream = TcpStream::connect(addr).await.expect("connect to status");
        let mut report = String::new();
        timeout(IO_TIMEOUT, stream.read_to_string(&mut report))
            .await
            .expect("status in time")
            .expect("read status");
        report
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(IO_TIMEOUT, self.task)
            .await
            .expect("server stops in time")
            .expect("server task");
    }
}

/// Test client connection with line helpers.
struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    async fn send(&mut self, line: &str) {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write line");
    }

    /// Reads exactly `expected.len()` bytes and compares them.
    async fn expect(&mut self, expected: &str) {
        let mut buf = vec![0u8; expected.len()];
        timeout(IO_TIMEOUT, self.stream.read_exact(&mut buf))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {expected:?}"))
            .expect("read reply");
        assert_eq!(String::from_utf8_lossy(&buf), expected);
    }

    /// Waits for the server to close the connection.
    async fn expect_closed(&mut self) {
        let mut buf = [0u8; 256];
        let n = timeout(IO_TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("close in time")
            .unwrap_or(0);
        assert_eq!(n, 0, "unexpected data: {:?}", String::from_utf8_lossy(&buf[..n]));
    }

    async fn quit(mut self) {
        self.send("/quit").await;
        self.expect("Goodbye.\n").await;
        self.expect_closed().await;
    }
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_first_use_registration_then_password_check() {
    let server = TestServer::spawn().await;

    let x = server.login("alice", "pw1").await;
    x.quit().await;

    // Same name, different password
    let mut x = server.connect().await;
    x.send("alice").await;
    x.send("pw2").await;
    x.expect("Enter your username: ").await;
    x.expect("Enter your password: ").await;
    x.expect("Invalid Password.\n").await;
    x.expect_closed().await;

    // Original password still works
    let mut y = server.connect().await;
    y.send("alice").await;
    y.send("pw1").await;
    y.expect("Enter your username: ").await;
    y.expect("Enter your password: ").await;
    y.expect("Authentication Successful.\n").await;
    y.expect("alice joined the chat\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_credentials_are_trimmed() {
    let server = TestServer::spawn().await;

    let mut x = server.connect().await;
    x.send("  alice \r").await;
    x.send(" pw ").await;
    x.expect("Enter your username: ").await;
    x.expect("Enter your password: ").await;
    x.expect("Registration successful. You are now authenticated.\n")
        .await;
    x.expect("alice joined the chat\n").await;
    x.quit().await;

    let y = server.login("bob", "pw").await;
    drop(y);

    let mut z = server.connect().await;
    z.send("alice").await;
    z.send("pw").await;
    z.expect("Enter your username: ").await;
    z.expect("Enter your password: ").await;
    z.expect("Authentication Successful.\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_username_rejected() {
    let server = TestServer::spawn().await;

    let mut x = server.connect().await;
    x.send("two words").await;
    x.send("pw").await;
    x.expect("Enter your username: ").await;
    x.expect("Enter your password: ").await;
    x.expect("Invalid username.\n").await;
    x.expect_closed().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_second_live_login_rejected() {
    let server = TestServer::spawn().await;
    let _alice = server.login("alice", "pw").await;

    let mut dup = server.connect().await;
    dup.send("alice").await;
    dup.send("pw").await;
    dup.expect("Enter your username: ").await;
    dup.expect("Enter your password: ").await;
    dup.expect("Authentication Successful.\n").await;
    dup.expect("User alice is already connected.\n").await;
    dup.expect_closed().await;

    server.shutdown().await;
}

// ============================================================================
// Chat Tests
// ============================================================================

#[tokio::test]
async fn test_room_chat_without_replay() {
    let server = TestServer::spawn().await;

    let mut x = server.login("alice", "pw").await;
    x.send("/join lobby").await;
    x.expect("Joined room lobby\n").await;
    x.send("hi").await;
    x.expect("[lobby] alice: hi\n").await;

    let mut y = server.login("bob", "pw").await;
    y.send("/join lobby").await;
    y.expect("Joined room lobby\n").await;

    x.send("again").await;
    x.expect("[lobby] alice: again\n").await;
    // Bob's first chat line is the one sent after he joined
    y.expect("[lobby] alice: again\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let server = TestServer::spawn().await;

    let mut a = server.login("alice", "pw").await;
    let mut c = server.login("carol", "pw").await;
    a.send("/join lobby").await;
    a.expect("Joined room lobby\n").await;
    c.send("/join games").await;
    c.expect("Joined room games\n").await;

    a.send("lobby only").await;
    a.expect("[lobby] alice: lobby only\n").await;
    c.send("games only").await;
    // Carol's next line is her own message, not alice's
    c.expect("[games] carol: games only\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_text_before_join() {
    let server = TestServer::spawn().await;
    let mut a = server.login("alice", "pw").await;

    a.send("hello").await;
    a.expect("Join a room to start chatting. Use /join <room> to join a room.\n")
        .await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_private_messages() {
    let server = TestServer::spawn().await;
    let mut a = server.login("alice", "pw").await;
    let mut b = server.login("bob", "pw").await;

    a.send("/msg bob hello there").await;
    a.expect("Private to bob: hello there\n").await;
    b.expect("Private from alice: hello there\n").await;

    a.send("/msg carol hi").await;
    a.expect("User carol not found\n").await;

    a.send("/msg bob").await;
    a.expect("Usage: /msg <user> <message>\n").await;

    // Bob received exactly one private message
    b.send("/list").await;
    b.expect("alice\nbob\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_list_after_disconnect() {
    let server = TestServer::spawn().await;
    let mut a = server.login("alice", "pw").await;
    let b = server.login("bob", "pw").await;

    a.send("/list").await;
    a.expect("alice\nbob\n").await;

    b.quit().await;

    a.send("/list").await;
    a.expect("alice\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_dropped_client_leaves_room() {
    let server = TestServer::spawn().await;
    let mut a = server.login("alice", "pw").await;
    let mut b = server.login("bob", "pw").await;
    a.send("/join lobby").await;
    a.expect("Joined room lobby\n").await;
    b.send("/join lobby").await;
    b.expect("Joined room lobby\n").await;

    drop(b);
    a.expect("bob left the chat\n").await;

    a.send("/list").await;
    a.expect("alice\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_protocol_errors_keep_session() {
    let server = TestServer::spawn().await;
    let mut a = server.login("alice", "pw").await;

    a.send("/dance").await;
    a.expect("Unknown command\n").await;
    a.send("/join").await;
    a.expect("Usage: /join <room>\n").await;

    // Still active after the errors
    a.send("/join lobby").await;
    a.expect("Joined room lobby\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_partial_line_at_close_is_ignored() {
    let server = TestServer::spawn().await;
    let mut a = server.login("alice", "pw").await;
    let mut b = server.login("bob", "pw").await;
    a.send("/join lobby").await;
    a.expect("Joined room lobby\n").await;
    b.send("/join lobby").await;
    b.expect("Joined room lobby\n").await;

    b.stream.write_all(b"never finished").await.unwrap();
    b.stream.shutdown().await.unwrap();

    // Only the leave notice arrives, never the unterminated text
    a.expect("bob left the chat\n").await;

    server.shutdown().await;
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[tokio::test]
async fn test_default_room() {
    let config = Config {
        default_room: Some("lobby".to_string()),
        ..Config::default()
    };
    let server = TestServer::spawn_with(config).await;

    let mut a = server.login("alice", "pw").await;
    let _b = server.login("bob", "pw").await;
    a.expect("bob joined the chat\n").await;

    a.send("hi").await;
    a.expect("[lobby] alice: hi\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_global_notices() {
    let config = Config {
        notice_scope: NoticeScope::Global,
        ..Config::default()
    };
    let server = TestServer::spawn_with(config).await;

    let mut a = server.login("alice", "pw").await;
    let b = server.login("bob", "pw").await;
    a.expect("bob joined the chat\n").await;

    b.quit().await;
    a.expect("bob left the chat\n").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_long_line_rejected() {
    let config = Config {
        max_line_length: 16,
        ..Config::default()
    };
    let server = TestServer::spawn_with(config).await;
    let mut a = server.login("alice", "pw").await;

    a.send("/join a-room-name-well-past-the-limit").await;
    a.expect("Message too long (max 16 bytes)\n").await;
    a.send("/list").await;
    a.expect("alice\n").await;

    server.shutdown().await;
}

// ============================================================================
// Status and Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_status_report() {
    let server = TestServer::spawn().await;
    assert_eq!(server.status().await, "Connected clients: 0\n");

    let mut a = server.login("alice", "pw").await;
    let _b = server.login("bob", "pw").await;
    a.send("/join lobby").await;
    a.expect("Joined room lobby\n").await;

    assert_eq!(
        server.status().await,
        "Connected clients: 2\nUser: alice, Room: lobby\nUser: bob, Room: \n"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_notifies_clients() {
    let server = TestServer::spawn().await;
    let mut a = server.login("alice", "pw").await;
    let mut b = server.login("bob", "pw").await;

    server.shutdown().await;

    a.expect("Server is shutting down...\n").await;
    a.expect_closed().await;
    b.expect("Server is shutting down...\n").await;
    b.expect_closed().await;
}
