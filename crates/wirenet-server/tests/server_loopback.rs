//! End-to-end server tests over real loopback sockets.
//!
//! Clients here are plain blocking `std::net::TcpStream`s that speak the
//! handshake and framing by hand, so every byte the server writes is
//! observable.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use wirenet_core::protocol::{scramble, ChatKind};
use wirenet_core::{Connection, Message, HEADER_SIZE};
use wirenet_server::application::chat::ChatServer;
use wirenet_server::{ClientRegistry, RunningServer, Server, ServerConfig, ServerHandler};

// ── Helpers ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Probe {
    deny: bool,
    validated: AtomicUsize,
    disconnects: AtomicUsize,
    chat: ChatServer,
}

impl ServerHandler<ChatKind> for Probe {
    fn should_accept(&self, _conn: &Arc<Connection<ChatKind>>) -> bool {
        !self.deny
    }

    fn on_client_validated(&self, _registry: &dyn ClientRegistry<ChatKind>, _conn: &Arc<Connection<ChatKind>>) {
        self.validated.fetch_add(1, Ordering::SeqCst);
    }

    fn on_client_disconnect(&self, _registry: &dyn ClientRegistry<ChatKind>, _conn: &Arc<Connection<ChatKind>>) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_message(
        &self,
        registry: &dyn ClientRegistry<ChatKind>,
        sender: &Arc<Connection<ChatKind>>,
        message: Message<ChatKind>,
    ) {
        self.chat.on_message(registry, sender, message);
    }
}

fn start(probe: &Arc<Probe>) -> RunningServer<ChatKind> {
    let config = ServerConfig {
        bind_address: "127.0.0.1".parse().unwrap(),
        port: 0,
        reactor_threads: Some(2),
        first_connection_id: 10,
    };
    Server::<ChatKind>::new(config, probe.clone()).start().unwrap()
}

fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn open(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

fn read_u8(stream: &mut TcpStream) -> u8 {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).unwrap();
    byte[0]
}

/// Answers the challenge correctly and returns the connected stream.
fn connect_validated(addr: SocketAddr) -> TcpStream {
    let mut stream = open(addr);
    assert_eq!(read_u8(&mut stream), 1, "accept flag");
    let mut challenge = [0u8; 8];
    stream.read_exact(&mut challenge).unwrap();
    let response = scramble(u64::from_le_bytes(challenge));
    stream.write_all(&response.to_le_bytes()).unwrap();
    assert_eq!(read_u8(&mut stream), 1, "validation result flag");
    stream
}

fn send(stream: &mut TcpStream, message: &Message<ChatKind>) {
    stream.write_all(&message.to_bytes()).unwrap();
}

fn recv(stream: &mut TcpStream) -> io::Result<Message<ChatKind>> {
    let mut frame = vec![0u8; HEADER_SIZE];
    stream.read_exact(&mut frame)?;
    let size = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
    frame.resize(HEADER_SIZE + size, 0);
    stream.read_exact(&mut frame[HEADER_SIZE..])?;
    let (message, _) = Message::from_bytes(&frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(message)
}

/// `true` if the peer closed the stream without sending anything else.
fn sees_eof(stream: &mut TcpStream) -> bool {
    let mut rest = Vec::new();
    matches!(stream.read_to_end(&mut rest), Ok(0))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_message_all_reaches_every_other_client_once() {
    // Arrange
    let probe = Arc::new(Probe::default());
    let server = start(&probe);
    let addr = server.local_addr();
    let mut a = connect_validated(addr);
    let mut b = connect_validated(addr);
    let mut c = connect_validated(addr);
    assert!(eventually(|| probe.validated.load(Ordering::SeqCst) == 3));
    assert_eq!(server.handle().client_ids(), vec![10, 11, 12]);

    // Act
    let mut outgoing = Message::new(ChatKind::MessageAll);
    outgoing.push_json(&json!({"name": "ada", "age": 36})).unwrap();
    send(&mut a, &outgoing);

    // Assert
    for peer in [&mut b, &mut c] {
        let mut relayed = recv(peer).unwrap();
        assert_eq!(relayed.id(), ChatKind::ServerMessage);
        assert_eq!(relayed.pop::<u32>().unwrap(), 10);
        let body: serde_json::Value = relayed.pop_json().unwrap();
        assert_eq!(body, json!({"name": "ada", "age": 36}));
    }
    a.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    assert!(recv(&mut a).is_err(), "sender must not receive its own broadcast");
    b.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    assert!(recv(&mut b).is_err(), "each peer receives the broadcast once");

    server.shutdown().unwrap();
}

#[test]
fn test_ping_is_echoed_to_sender() {
    let probe = Arc::new(Probe::default());
    let server = start(&probe);
    let mut client = connect_validated(server.local_addr());
    let mut ping = Message::new(ChatKind::ServerPing);
    ping.push(1_700_000_000_123_456u64);

    send(&mut client, &ping);
    let echoed = recv(&mut client).unwrap();

    assert_eq!(echoed, ping);
    server.shutdown().unwrap();
}

#[test]
fn test_messages_from_one_client_arrive_in_order() {
    let probe = Arc::new(Probe::default());
    let server = start(&probe);
    let mut client = connect_validated(server.local_addr());

    for seq in 0..50u32 {
        let mut ping = Message::new(ChatKind::ServerPing);
        ping.push(seq);
        send(&mut client, &ping);
    }

    for seq in 0..50u32 {
        let mut echoed = recv(&mut client).unwrap();
        assert_eq!(echoed.pop::<u32>().unwrap(), seq);
    }
    server.shutdown().unwrap();
}

#[test]
fn test_client_close_removes_it_exactly_once() {
    // Arrange
    let probe = Arc::new(Probe::default());
    let server = start(&probe);
    let client = connect_validated(server.local_addr());
    let _other = connect_validated(server.local_addr());
    assert!(eventually(|| server.handle().client_count() == 2));

    // Act
    drop(client);

    // Assert
    assert!(eventually(|| server.handle().client_ids() == vec![11]));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(probe.disconnects.load(Ordering::SeqCst), 1);
    server.shutdown().unwrap();
}

#[test]
fn test_denied_client_gets_only_the_deny_flag() {
    // Arrange
    let probe = Arc::new(Probe {
        deny: true,
        ..Probe::default()
    });
    let server = start(&probe);

    // Act
    let mut client = open(server.local_addr());

    // Assert
    assert_eq!(read_u8(&mut client), 0);
    assert!(sees_eof(&mut client), "no challenge bytes after a deny");
    assert!(eventually(|| probe.disconnects.load(Ordering::SeqCst) == 1));
    assert_eq!(server.handle().client_count(), 0);
    assert_eq!(probe.validated.load(Ordering::SeqCst), 0);
    server.shutdown().unwrap();
}

#[test]
fn test_wrong_response_fails_validation() {
    // Arrange
    let probe = Arc::new(Probe::default());
    let server = start(&probe);
    let mut client = open(server.local_addr());
    assert_eq!(read_u8(&mut client), 1);
    let mut challenge = [0u8; 8];
    client.read_exact(&mut challenge).unwrap();

    // Act
    let wrong = scramble(u64::from_le_bytes(challenge)) ^ 1;
    client.write_all(&wrong.to_le_bytes()).unwrap();

    // Assert
    assert_eq!(read_u8(&mut client), 0);
    assert!(sees_eof(&mut client));
    assert!(eventually(|| server.handle().client_count() == 0));
    assert_eq!(probe.validated.load(Ordering::SeqCst), 0);
    server.shutdown().unwrap();
}

#[test]
fn test_server_side_disconnect_closes_client_socket() {
    let probe = Arc::new(Probe::default());
    let server = start(&probe);
    let mut client = connect_validated(server.local_addr());
    assert!(eventually(|| server.handle().client_count() == 1));
    let handle = server.handle();

    assert!(handle.disconnect(10));
    assert!(!handle.disconnect(10));

    assert!(sees_eof(&mut client));
    assert_eq!(probe.disconnects.load(Ordering::SeqCst), 1);
    server.shutdown().unwrap();
}

#[test]
fn test_send_to_targets_a_single_client() {
    let probe = Arc::new(Probe::default());
    let server = start(&probe);
    let mut first = connect_validated(server.local_addr());
    let mut second = connect_validated(server.local_addr());
    assert!(eventually(|| server.handle().client_count() == 2));

    let mut direct = Message::new(ChatKind::ServerMessage);
    direct.push_str("hello").push(0u32);
    assert!(server.handle().send_to(11, direct.clone()));
    assert!(!server.handle().send_to(99, direct.clone()));

    assert_eq!(recv(&mut second).unwrap(), direct);
    first.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    assert!(recv(&mut first).is_err());
    server.shutdown().unwrap();
}

#[test]
fn test_shutdown_disconnects_every_client() {
    let probe = Arc::new(Probe::default());
    let server = start(&probe);
    let mut clients: Vec<TcpStream> = (0..3).map(|_| connect_validated(server.local_addr())).collect();
    assert!(eventually(|| probe.validated.load(Ordering::SeqCst) == 3));

    server.shutdown().unwrap();

    assert_eq!(probe.disconnects.load(Ordering::SeqCst), 3);
    for client in &mut clients {
        assert!(sees_eof(client));
    }
}
