//! WebRcon transport client.
//!
//! One client owns one socket to one game server. Construction performs the
//! login handshake and then an *initialization probe*: a uniquely-tokenized
//! `echotest` whose echo, awaited with a generous timeout, separates "the
//! connection just opened" from "the server is replaying historical log
//! lines from session start". Until the probe succeeds nothing reaches
//! event processing, which is what suppresses replayed history and
//! double-initialization races when several servers come up back to back.
//!
//! A spawned read loop decodes frames and fans every message out in arrival
//! order: response probes first, then (once initialized) the log-line
//! channel consumed by the gather engine. A single malformed frame is
//! logged and skipped; only a socket-level error ends the loop. This layer
//! never reconnects: supervision is an external collaborator's job.

mod commands;
mod correlator;

pub use commands::{MapChange, PlayerInfo, ServerControl};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::wire::{MessageType, MessageWriter, RawFrame};
use crate::{GatherError, Result};

use correlator::PendingSet;

fn default_response_timeout() -> Duration {
    ClientConfig::DEFAULT_RESPONSE_TIMEOUT
}

/// Connection credentials and timing knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub session_id: String,
    pub server_key: String,
    /// How long a correlated command waits for its reply.
    #[serde(default = "default_response_timeout")]
    pub response_timeout: Duration,
}

impl ClientConfig {
    pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(session_id: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            server_key: server_key.into(),
            response_timeout: Self::DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Timeout for the login and initialization probe: 3x the response
    /// timeout, since a busy server replays history before settling.
    pub fn init_timeout(&self) -> Duration {
        self.response_timeout * 3
    }
}

pub(crate) struct ClientShared {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingSet,
    initialized: AtomicBool,
    response_timeout: Duration,
}

/// Client for one game server's remote console.
pub struct WebRconClient {
    shared: Arc<ClientShared>,
    cancel: CancellationToken,
    lines: std::sync::Mutex<Option<UnboundedReceiver<String>>>,
}

impl std::fmt::Debug for WebRconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRconClient").finish_non_exhaustive()
    }
}

impl WebRconClient {
    /// Connect over TCP and run the full handshake.
    pub async fn connect(addr: impl ToSocketAddrs, config: ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            GatherError::connection_failed_with_source("TCP connect failed", Box::new(e))
        })?;
        Self::handshake(stream, config).await
    }

    /// Run the login handshake and initialization probe over an established
    /// stream. Public so tests (and alternative transports) can drive a
    /// client over an in-memory duplex.
    pub async fn handshake<S>(stream: S, config: ClientConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut rd, mut wr) = tokio::io::split(stream);

        // Login: session id + server key, answered by LoginOk (or Error).
        let mut login = MessageWriter::new();
        login.write_string(&config.session_id);
        login.write_string(&config.server_key);
        let frame = login.into_frame(MessageType::Login)?;
        wr.write_all(&frame)
            .await
            .map_err(|e| GatherError::io_error("login write", e))?;

        await_login_ok(&mut rd, config.init_timeout()).await?;
        debug!("login accepted");

        let shared = Arc::new(ClientShared {
            writer: tokio::sync::Mutex::new(Box::new(wr) as Box<dyn AsyncWrite + Send + Unpin>),
            pending: PendingSet::new(),
            initialized: AtomicBool::new(false),
            response_timeout: config.response_timeout,
        });

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(read_loop(rd, Arc::clone(&shared), line_tx, cancel.clone()));

        let client = Self {
            shared,
            cancel,
            lines: std::sync::Mutex::new(Some(line_rx)),
        };

        // Initialization probe: our own echo, not the replayed backlog,
        // proves the stream has caught up to live traffic.
        let token = random_token();
        let probe = format!("echotest {token}");
        let echoed = client
            .command_with_reply(
                &probe,
                move |line: &str| line.contains(token.as_str()).then_some(()),
                config.init_timeout(),
            )
            .await?;
        if echoed.is_none() {
            return Err(GatherError::connection_failed(
                "initialization probe got no echo; server considered unhealthy",
            ));
        }
        client.shared.initialized.store(true, Ordering::SeqCst);
        info!("connection initialized");
        Ok(client)
    }

    /// Whether the initialization probe has completed. Log lines are only
    /// forwarded to event processing once this is true.
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// The configured per-command reply timeout.
    pub fn response_timeout(&self) -> Duration {
        self.shared.response_timeout
    }

    /// Take the log-line stream. There is exactly one consumer: the gather
    /// engine; subsequent calls return `None`.
    pub fn take_log_lines(&self) -> Option<UnboundedReceiver<String>> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Send a free-text command frame.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        let mut writer = MessageWriter::new();
        writer.write_string(command);
        let frame = writer.into_frame(MessageType::Command)?;
        let mut guard = self.shared.writer.lock().await;
        guard
            .write_all(&frame)
            .await
            .map_err(|e| GatherError::io_error("command write", e))?;
        trace!(command, "command sent");
        Ok(())
    }

    /// Send a command and await the first inbound line its predicate
    /// accepts. `Ok(None)` is the soft timeout outcome: no answer arrived;
    /// the caller decides whether that means the server is unhealthy.
    pub async fn command_with_reply<R, F>(
        &self,
        command: &str,
        predicate: F,
        timeout: Duration,
    ) -> Result<Option<R>>
    where
        R: Send + 'static,
        F: Fn(&str) -> Option<R> + Send + 'static,
    {
        // Register before sending so a fast reply cannot slip past.
        let (id, rx) = self.shared.pending.register(predicate);
        if let Err(error) = self.send_command(command).await {
            self.shared.pending.remove(id);
            return Err(error);
        }
        let outcome = tokio::time::timeout(timeout, rx).await;
        // Idempotent on both paths: the probe may already have removed
        // itself by resolving.
        self.shared.pending.remove(id);
        match outcome {
            Ok(Ok(result)) => Ok(Some(result)),
            // Read loop gone: the socket died while we waited.
            Ok(Err(_closed)) => Ok(None),
            Err(_elapsed) => {
                debug!(command, "correlated reply timed out");
                Ok(None)
            }
        }
    }
}

impl Drop for WebRconClient {
    fn drop(&mut self) {
        debug!("dropping rcon client");
        self.cancel.cancel();
    }
}

async fn await_login_ok<S>(rd: &mut ReadHalf<S>, timeout: Duration) -> Result<()>
where
    S: AsyncRead,
{
    let wait = tokio::time::timeout(timeout, async {
        loop {
            let frame = read_frame(rd).await?;
            match frame.kind() {
                Some(MessageType::LoginOk) => return Ok(()),
                Some(MessageType::Error) => {
                    let reason = frame.text().unwrap_or_else(|_| "<unreadable>".to_string());
                    return Err(GatherError::LoginRejected { reason });
                }
                other => {
                    trace!(?other, "ignoring pre-login frame");
                }
            }
        }
    })
    .await;
    match wait {
        Ok(result) => result,
        Err(_elapsed) => Err(GatherError::Timeout { duration: timeout }),
    }
}

/// Read one length-prefixed frame. An I/O error (including EOF) is
/// socket-fatal; a zero-length frame is reported as malformed for the
/// caller to skip.
async fn read_frame<S>(rd: &mut ReadHalf<S>) -> Result<RawFrame>
where
    S: AsyncRead,
{
    let mut header = [0u8; 2];
    rd.read_exact(&mut header)
        .await
        .map_err(|e| GatherError::io_error("frame length read", e))?;
    let length = u16::from_be_bytes(header) as usize;
    if length < 1 {
        return Err(GatherError::malformed_frame("frame header", "zero-length frame"));
    }
    let mut body = vec![0u8; length];
    rd.read_exact(&mut body)
        .await
        .map_err(|e| GatherError::io_error("frame body read", e))?;
    Ok(RawFrame { code: body[0], payload: body.split_off(1) })
}

async fn read_loop<S>(
    mut rd: ReadHalf<S>,
    shared: Arc<ClientShared>,
    line_tx: UnboundedSender<String>,
    cancel: CancellationToken,
) where
    S: AsyncRead + Send,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("read loop cancelled");
                break;
            }
            frame = read_frame(&mut rd) => frame,
        };
        match frame {
            Ok(frame) => handle_frame(frame, &shared, &line_tx),
            Err(GatherError::Io { source, .. }) => {
                // Socket closed or errored: surface to the supervisor by
                // ending the stream. No reconnect here.
                info!(error = %source, "socket closed, read loop ending");
                break;
            }
            Err(error) => {
                warn!(%error, "skipping malformed frame");
            }
        }
    }
    // Dropping line_tx closes the engine's stream.
}

/// Fan one decoded frame out to the listeners, in order: pending response
/// probes first, then (only once initialized) the log-line channel.
fn handle_frame(frame: RawFrame, shared: &ClientShared, line_tx: &UnboundedSender<String>) {
    match frame.kind() {
        Some(MessageType::LogLine) | Some(MessageType::CommandInfo) => match frame.text() {
            Ok(line) => {
                shared.pending.offer(&line);
                if shared.initialized.load(Ordering::SeqCst) {
                    let _ = line_tx.send(line);
                } else {
                    trace!(%line, "dropping replayed line before initialization");
                }
            }
            Err(error) => warn!(%error, "undecodable log line payload"),
        },
        Some(MessageType::Error) => {
            let detail = frame.text().unwrap_or_else(|_| "<unreadable>".to_string());
            warn!(%detail, "server reported error");
        }
        Some(MessageType::SetState)
        | Some(MessageType::NewTab)
        | Some(MessageType::CloseTab)
        | Some(MessageType::LoginOk)
        | Some(MessageType::Login)
        | Some(MessageType::Command) => {
            trace!(kind = ?frame.kind(), "ignoring control frame");
        }
        None => {
            warn!(code = frame.code, "unknown message type, skipping frame");
        }
    }
}

pub(crate) fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
