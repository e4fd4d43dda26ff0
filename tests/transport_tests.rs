// ABOUTME: Tests for the chat transport session over in-memory duplex streams
// ABOUTME: Covers login handshake, fixed-delay reconnects, PING/PONG, line framing and fault handling

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lore_clipper::error::TransportError;
use lore_clipper::irc::ChatMessage;
use lore_clipper::transport::{
    BoxedStream, ChatLines, ChatSession, ConnectionState, Connector, LineHandler, SessionConfig,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

/// Hands out scripted connection results in order and counts attempts
struct ScriptedConnector {
    script: Mutex<VecDeque<io::Result<DuplexStream>>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    fn new(script: Vec<io::Result<DuplexStream>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: AtomicUsize::new(0),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> io::Result<BoxedStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(stream)) => Ok(Box::new(stream)),
            Some(Err(e)) => Err(e),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "script exhausted",
            )),
        }
    }
}

#[derive(Default)]
struct RecordingHandler {
    messages: Mutex<Vec<ChatMessage>>,
}

impl RecordingHandler {
    fn bodies(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }
}

#[async_trait]
impl LineHandler for RecordingHandler {
    async fn on_chat_message(&self, message: ChatMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

fn session_config(delay: Duration) -> SessionConfig {
    SessionConfig {
        host: "tmi.twitch.tv".to_string(),
        nick: "clipperbot".to_string(),
        password: "oauth:secret".to_string(),
        channel: "lorestream".to_string(),
        reconnect_delay: delay,
    }
}

fn refused() -> io::Result<DuplexStream> {
    Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
}

/// Server side of a duplex pair: line reader plus raw writer
struct FakeServer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeServer {
    fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn next_line(&mut self) -> String {
        // Longer than any reconnect delay used under the paused clock
        tokio::time::timeout(Duration::from_secs(60), self.lines.next_line())
            .await
            .expect("timed out waiting for client line")
            .expect("read failed")
            .expect("client closed connection")
    }

    async fn send(&mut self, raw: &[u8]) {
        self.writer.write_all(raw).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn expect_handshake(&mut self) {
        assert_eq!(self.next_line().await, "PASS oauth:secret");
        assert_eq!(self.next_line().await, "NICK clipperbot");
        assert_eq!(self.next_line().await, "JOIN #lorestream");
    }

    /// Read the handshake and answer with the welcome numeric
    async fn accept_login(&mut self) {
        self.expect_handshake().await;
        self.send(b":tmi.twitch.tv 001 clipperbot :Welcome, GLHF!\r\n")
            .await;
    }
}

/// Run `connect` against a server that accepts the login
async fn connect_and_accept(
    session: &ChatSession,
    server: DuplexStream,
) -> (ChatLines, FakeServer) {
    let mut server = FakeServer::new(server);
    let (lines, ()) = tokio::join!(session.connect(), server.accept_login());
    (lines, server)
}

/// Accepts TCP, then refuses the credentials and hangs up like Twitch does
#[derive(Default)]
struct RejectingConnector {
    attempts: AtomicUsize,
    // Server halves stay alive so the client's handshake writes succeed
    servers: tokio::sync::Mutex<Vec<DuplexStream>>,
}

#[async_trait]
impl Connector for RejectingConnector {
    async fn connect(&self) -> io::Result<BoxedStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (client, mut server) = tokio::io::duplex(4096);
        server
            .write_all(b":tmi.twitch.tv NOTICE * :Login authentication failed\r\n")
            .await?;
        server.shutdown().await?;
        self.servers.lock().await.push(server);
        Ok(Box::new(client))
    }
}

// =============================================================================
// Connect / reconnect
// =============================================================================

#[tokio::test]
async fn test_handshake_sends_pass_nick_join_in_order() {
    let (client, server) = tokio::io::duplex(4096);
    let connector = ScriptedConnector::new(vec![Ok(client)]);
    let session = ChatSession::new(connector.clone(), session_config(Duration::from_secs(5)));

    let (_lines, _server) = connect_and_accept(&session, server).await;

    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.sender().is_connected());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_not_connected_until_server_welcomes() {
    let (client, server) = tokio::io::duplex(4096);
    let session = Arc::new(ChatSession::new(
        ScriptedConnector::new(vec![Ok(client)]),
        session_config(Duration::from_secs(5)),
    ));

    let task = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let _lines = session.connect().await;
        })
    };

    let mut server = FakeServer::new(server);
    server.expect_handshake().await;
    server.send(b"PING :tmi.twitch.tv\r\n").await;
    assert_eq!(server.next_line().await, "PONG :tmi.twitch.tv");
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert!(!session.sender().is_connected());

    server
        .send(b":tmi.twitch.tv 001 clipperbot :Welcome, GLHF!\r\n")
        .await;
    task.await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_login_waits_reconnect_delay_between_attempts() {
    let connector = Arc::new(RejectingConnector::default());
    let session = ChatSession::new(connector.clone(), session_config(Duration::from_secs(5)));
    let handler = RecordingHandler::default();

    let outcome = tokio::time::timeout(Duration::from_secs(12), session.run(&handler)).await;

    assert!(outcome.is_err(), "run never returns");
    // Attempts at t=0, 5 and 10
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    assert_ne!(session.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_n_failures_make_n_plus_one_attempts_with_fixed_delay() {
    let failures = 3;
    let delay = Duration::from_secs(5);
    let (client, server) = tokio::io::duplex(4096);

    let mut script: Vec<io::Result<DuplexStream>> = (0..failures).map(|_| refused()).collect();
    script.push(Ok(client));
    let connector = ScriptedConnector::new(script);
    let session = ChatSession::new(connector.clone(), session_config(delay));

    let started = tokio::time::Instant::now();
    let _connected = connect_and_accept(&session, server).await;
    let elapsed = started.elapsed();

    assert_eq!(connector.attempts(), failures + 1);
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(elapsed >= delay * failures as u32, "elapsed {:?}", elapsed);
    assert!(elapsed < delay * (failures as u32 + 1), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_state_is_disconnected_while_waiting_to_retry() {
    let (client, server) = tokio::io::duplex(4096);
    let connector = ScriptedConnector::new(vec![refused(), Ok(client)]);
    let session = Arc::new(ChatSession::new(
        connector.clone(),
        session_config(Duration::from_secs(10)),
    ));
    let mut states = session.subscribe();

    let task = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let _lines = session.connect().await;
        })
    };

    // Starting value is already Disconnected, so wait for the post-failure transition
    loop {
        states.changed().await.unwrap();
        if *states.borrow_and_update() == ConnectionState::Disconnected {
            break;
        }
    }
    assert_eq!(connector.attempts(), 1);
    assert!(!session.sender().is_connected());

    let mut server = FakeServer::new(server);
    server.accept_login().await;
    task.await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(connector.attempts(), 2);
}

// =============================================================================
// Read loop
// =============================================================================

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let (client, server) = tokio::io::duplex(4096);
    let session = Arc::new(ChatSession::new(
        ScriptedConnector::new(vec![Ok(client)]),
        session_config(Duration::from_secs(1)),
    ));
    let handler = Arc::new(RecordingHandler::default());

    let (lines, mut server) = connect_and_accept(&session, server).await;

    let loop_task = {
        let session = Arc::clone(&session);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { session.read_loop(lines, handler.as_ref()).await })
    };

    server.send(b"PING :tmi.twitch.tv\r\n").await;
    assert_eq!(server.next_line().await, "PONG :tmi.twitch.tv");

    drop(server);
    let reason = loop_task.await.unwrap();
    assert!(matches!(reason, TransportError::Closed), "{reason:?}");
    assert!(handler.bodies().is_empty());
}

#[tokio::test]
async fn test_chat_messages_are_forwarded_and_garbage_is_survived() {
    let (client, server) = tokio::io::duplex(4096);
    let session = Arc::new(ChatSession::new(
        ScriptedConnector::new(vec![Ok(client)]),
        session_config(Duration::from_secs(1)),
    ));
    let handler = Arc::new(RecordingHandler::default());

    let (lines, mut server) = connect_and_accept(&session, server).await;

    let loop_task = {
        let session = Arc::clone(&session);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { session.read_loop(lines, handler.as_ref()).await })
    };

    server
        .send(b":tmi.twitch.tv 001 clipperbot :Welcome, GLHF!\r\n")
        .await;
    server.send(b"PRIVMSG no prefix at all\r\n").await;
    server.send(b":::: ::: :\r\n").await;
    // One message split across two writes
    server
        .send(b":alice!alice@alice.tmi.twitch.tv PRIVMSG #lorestream :!clip co")
        .await;
    server.send(b"ol moment\r\n").await;
    server
        .send(b":bob!bob@bob.tmi.twitch.tv PRIVMSG #lorestream :hello\r\n")
        .await;

    drop(server);
    let reason = loop_task.await.unwrap();

    assert!(matches!(reason, TransportError::Closed));
    assert_eq!(handler.bodies(), vec!["!clip cool moment", "hello"]);
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_invalid_utf8_faults_and_closes_handle() {
    let (client, server) = tokio::io::duplex(4096);
    let session = Arc::new(ChatSession::new(
        ScriptedConnector::new(vec![Ok(client)]),
        session_config(Duration::from_secs(1)),
    ));
    let handler = RecordingHandler::default();

    let (lines, mut server) = connect_and_accept(&session, server).await;

    server.send(b"\xff\xfe broken\r\n").await;
    let reason = session.read_loop(lines, &handler).await;

    assert!(matches!(reason, TransportError::Io(_)), "{reason:?}");
    assert_eq!(session.state(), ConnectionState::Disconnected);
    let err = session
        .sender()
        .send_chat_message("anyone there?")
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
}

#[tokio::test]
async fn test_reconnect_request_ends_read_loop() {
    let (client, server) = tokio::io::duplex(4096);
    let session = ChatSession::new(
        ScriptedConnector::new(vec![Ok(client)]),
        session_config(Duration::from_secs(1)),
    );
    let handler = RecordingHandler::default();

    let (lines, mut server) = connect_and_accept(&session, server).await;

    server.send(b":tmi.twitch.tv RECONNECT\r\n").await;
    let reason = session.read_loop(lines, &handler).await;
    assert!(matches!(reason, TransportError::ReconnectRequested));
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_run_reconnects_after_connection_drop() {
    let (first_client, first_server) = tokio::io::duplex(4096);
    let (second_client, second_server) = tokio::io::duplex(4096);
    let connector = ScriptedConnector::new(vec![Ok(first_client), Ok(second_client)]);
    let session = Arc::new(ChatSession::new(
        connector.clone(),
        session_config(Duration::from_millis(10)),
    ));
    let handler = Arc::new(RecordingHandler::default());

    let run_task = {
        let session = Arc::clone(&session);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { session.run(handler.as_ref()).await })
    };

    let mut first = FakeServer::new(first_server);
    first.accept_login().await;
    drop(first);

    let mut second = FakeServer::new(second_server);
    second.accept_login().await;
    second
        .send(b":carol!carol@carol.tmi.twitch.tv PRIVMSG #lorestream :still here\r\n")
        .await;
    second.send(b"PING :tmi.twitch.tv\r\n").await;
    assert_eq!(second.next_line().await, "PONG :tmi.twitch.tv");

    assert_eq!(connector.attempts(), 2);
    assert_eq!(handler.bodies(), vec!["still here"]);
    run_task.abort();
}

// =============================================================================
// Sender
// =============================================================================

#[tokio::test]
async fn test_send_while_disconnected_is_a_noop() {
    let session = ChatSession::new(
        ScriptedConnector::new(vec![]),
        session_config(Duration::from_secs(1)),
    );
    let err = session
        .sender()
        .send_chat_message("hello")
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_concurrent_sends_never_interleave() {
    let (client, server) = tokio::io::duplex(64);
    let session = ChatSession::new(
        ScriptedConnector::new(vec![Ok(client)]),
        session_config(Duration::from_secs(1)),
    );
    let (_lines, mut server) = connect_and_accept(&session, server).await;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let sender = session.sender();
        tasks.push(tokio::spawn(async move {
            sender
                .send_chat_message(&format!("message number {i} with some padding text"))
                .await
                .unwrap();
        }));
    }

    let mut received = Vec::new();
    for _ in 0..10 {
        received.push(server.next_line().await);
    }
    for task in tasks {
        task.await.unwrap();
    }

    for line in &received {
        assert!(
            line.starts_with("PRIVMSG #lorestream :message number ")
                && line.ends_with(" with some padding text"),
            "interleaved line: {line}"
        );
    }
}

#[tokio::test]
async fn test_long_messages_are_truncated() {
    let (client, server) = tokio::io::duplex(4096);
    let session = ChatSession::new(
        ScriptedConnector::new(vec![Ok(client)]),
        session_config(Duration::from_secs(1)),
    );
    let (_lines, mut server) = connect_and_accept(&session, server).await;

    session
        .sender()
        .send_chat_message(&"a".repeat(800))
        .await
        .unwrap();
    let line = server.next_line().await;
    let body = line.strip_prefix("PRIVMSG #lorestream :").unwrap();
    assert_eq!(body.len(), 500);
}
