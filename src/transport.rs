// ABOUTME: Twitch chat transport: login with fixed-delay retry, read loop, shared sender
// ABOUTME: Tracks Disconnected/Connecting/Connected/Faulted and answers PING without involving workers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, Notify};

use crate::error::TransportError;
use crate::irc::{self, ChatMessage, IrcLine};

/// Twitch drops PRIVMSG bodies longer than this
pub const MAX_MESSAGE_CHARS: usize = 500;

/// How long the server gets to send its `001` welcome after our credentials
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

pub trait ChatStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> ChatStream for T {}

pub type BoxedStream = Box<dyn ChatStream>;

/// Buffered inbound side of a logged-in connection
pub type ChatLines = Lines<BufReader<ReadHalf<BoxedStream>>>;

/// Opens the raw duplex connection; the session performs the handshake on top
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> std::io::Result<BoxedStream>;
}

pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> std::io::Result<BoxedStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

/// Receives every chat message the read loop decodes
#[async_trait]
pub trait LineHandler: Send + Sync {
    async fn on_chat_message(&self, message: ChatMessage);
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Used as the PONG payload when a PING carries none
    pub host: String,
    pub nick: String,
    pub password: String,
    pub channel: String,
    pub reconnect_delay: Duration,
}

/// State shared between the session and every sender clone
struct Link {
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    state: watch::Sender<ConnectionState>,
    write_fault: Notify,
}

impl Link {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

/// Cloneable handle for writing to chat; safe to use from any task
#[derive(Clone)]
pub struct ChatSender {
    channel: String,
    link: Arc<Link>,
}

impl ChatSender {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_connected(&self) -> bool {
        *self.link.state.borrow() == ConnectionState::Connected
    }

    /// Send one PRIVMSG to the joined channel; a no-op with a warning while disconnected
    pub async fn send_chat_message(&self, text: &str) -> Result<(), TransportError> {
        let text = truncate_chars(text, MAX_MESSAGE_CHARS);
        self.send_raw(&irc::privmsg(&self.channel, text)).await
    }

    pub(crate) async fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        let mut writer = self.link.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            tracing::warn!(channel = %self.channel, "Not connected to chat, dropping outbound line");
            return Err(TransportError::NotConnected);
        };

        let result = async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "Chat write failed, closing connection");
            writer.take();
            self.link.set_state(ConnectionState::Faulted);
            self.link.write_fault.notify_one();
            return Err(TransportError::Io(e));
        }
        Ok(())
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct ChatSession {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    link: Arc<Link>,
}

impl ChatSession {
    pub fn new(connector: Arc<dyn Connector>, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            config,
            link: Arc::new(Link {
                writer: Mutex::new(None),
                state,
                write_fault: Notify::new(),
            }),
        }
    }

    pub fn sender(&self) -> ChatSender {
        ChatSender {
            channel: self.config.channel.clone(),
            link: Arc::clone(&self.link),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.link.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.link.state.subscribe()
    }

    /// Log in and read forever, logging in again whenever the connection drops
    pub async fn run(&self, handler: &dyn LineHandler) {
        loop {
            let lines = self.connect().await;
            let reason = self.read_loop(lines, handler).await;
            tracing::warn!(error = %reason, "Chat connection lost, reconnecting");
        }
    }

    /// Retry with a fixed delay until the server confirms the login; there is no attempt limit
    pub async fn connect(&self) -> ChatLines {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            self.link.set_state(ConnectionState::Connecting);
            tracing::info!(
                attempt,
                channel = %self.config.channel,
                "Connecting to chat"
            );

            match self.login().await {
                Ok((lines, writer)) => {
                    *self.link.writer.lock().await = Some(writer);
                    self.link.set_state(ConnectionState::Connected);
                    tracing::info!(
                        attempt,
                        channel = %self.config.channel,
                        nick = %self.config.nick,
                        "Connected and joined chat channel"
                    );
                    return lines;
                }
                Err(e) => {
                    self.link.set_state(ConnectionState::Disconnected);
                    tracing::error!(
                        attempt,
                        error = %e,
                        retry_in_secs = self.config.reconnect_delay.as_secs(),
                        "Chat connection failed"
                    );
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    /// Send PASS/NICK/JOIN and wait for the welcome numeric. A server that
    /// rejects the credentials closes the socket instead, which fails the attempt.
    async fn login(&self) -> std::io::Result<(ChatLines, WriteHalf<BoxedStream>)> {
        let stream = self.connector.connect().await?;
        let (reader, mut writer) = tokio::io::split(stream);

        writer.write_all(irc::pass(&self.config.password).as_bytes()).await?;
        writer.write_all(irc::nick(&self.config.nick).as_bytes()).await?;
        writer.write_all(irc::join(&self.config.channel).as_bytes()).await?;
        writer.flush().await?;

        let mut lines = BufReader::new(reader).lines();
        tokio::time::timeout(LOGIN_TIMEOUT, self.await_welcome(&mut lines, &mut writer))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "chat server did not confirm login",
                )
            })??;

        Ok((lines, writer))
    }

    async fn await_welcome(
        &self,
        lines: &mut ChatLines,
        writer: &mut WriteHalf<BoxedStream>,
    ) -> std::io::Result<()> {
        let mut rejection = None;
        loop {
            let Some(line) = lines.next_line().await? else {
                let reason = match rejection {
                    Some(notice) => format!("login rejected: {}", notice),
                    None => "connection closed before login completed".to_string(),
                };
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    reason,
                ));
            };

            match irc::parse_line(&line) {
                IrcLine::Welcome => return Ok(()),
                IrcLine::Ping { payload } => {
                    writer
                        .write_all(irc::pong(self.pong_host(&payload)).as_bytes())
                        .await?;
                    writer.flush().await?;
                }
                IrcLine::Notice { message } => {
                    tracing::warn!(notice = %message, "Chat server notice during login");
                    rejection = Some(message);
                }
                _ => {
                    tracing::trace!(line = %line, "Ignoring line before login");
                }
            }
        }
    }

    fn pong_host<'a>(&'a self, payload: &'a str) -> &'a str {
        if payload.is_empty() {
            self.config.host.as_str()
        } else {
            payload
        }
    }

    /// Read until the connection faults, then close it and report why
    pub async fn read_loop(
        &self,
        mut lines: ChatLines,
        handler: &dyn LineHandler,
    ) -> TransportError {
        let sender = self.sender();

        let reason = loop {
            let next = tokio::select! {
                line = lines.next_line() => line,
                _ = self.link.write_fault.notified() => {
                    if self.state() != ConnectionState::Faulted {
                        // Leftover permit from an earlier connection
                        continue;
                    }
                    Err(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "chat write failed",
                    ))
                }
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break TransportError::Closed,
                Err(e) => break TransportError::Io(e),
            };

            match irc::parse_line(&line) {
                IrcLine::Ping { payload } => {
                    let host = self.pong_host(&payload);
                    tracing::debug!(host, "Answering keep-alive");
                    if let Err(e) = sender.send_raw(&irc::pong(host)).await {
                        break e;
                    }
                }
                IrcLine::ChatMessage(message) => handler.on_chat_message(message).await,
                IrcLine::Reconnect => break TransportError::ReconnectRequested,
                IrcLine::Notice { message } => {
                    tracing::warn!(notice = %message, "Chat server notice");
                }
                IrcLine::Welcome | IrcLine::Unrecognized => {
                    tracing::trace!(line = %line, "Ignoring line");
                }
            }
        };

        self.link.set_state(ConnectionState::Faulted);
        self.link.writer.lock().await.take();
        self.link.set_state(ConnectionState::Disconnected);
        reason
    }
}
