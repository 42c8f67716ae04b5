//! Persistent link to the streaming transcription service.
//!
//! One link serves one voice session. It connects, performs the
//! session-begin handshake, streams base64 audio payloads, and forwards the
//! selected transcript kind to a registered channel. Socket closure for any
//! reason triggers an automatic reconnect with backoff; state is wiped and
//! a fresh handshake (and session id) is mandatory after every reconnect.

use crate::defaults::{
    HANDSHAKE_TIMEOUT, PING_INTERVAL, RECONNECT_BACKOFF_MAX, RECONNECT_BACKOFF_MIN,
};
use crate::error::{BanterError, Result};
use crate::report::{ErrorReporter, LogReporter};
use crate::stt::chunk::{AudioChunk, ChunkPolicy};
use crate::stt::protocol::{AudioPayload, SESSION_BEGINS, ServiceMessage, TranscriptKind};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

/// Connection states of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Streaming,
    /// Terminal; reachable only via explicit `stop()`.
    Closed,
}

/// Configuration for a transcription link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Websocket endpoint; the sample rate is appended as a query parameter.
    pub endpoint: String,
    /// API key sent in the authorization header.
    pub api_key: String,
    /// Which transcript kind is forwarded to the handler.
    pub transcript: TranscriptKind,
    /// Duration window outbound chunks must respect.
    pub policy: ChunkPolicy,
    pub reconnect_backoff_min: Duration,
    pub reconnect_backoff_max: Duration,
}

impl LinkConfig {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            transcript: TranscriptKind::Final,
            policy: ChunkPolicy::default(),
            reconnect_backoff_min: RECONNECT_BACKOFF_MIN,
            reconnect_backoff_max: RECONNECT_BACKOFF_MAX,
        }
    }

    pub fn with_transcript(mut self, kind: TranscriptKind) -> Self {
        self.transcript = kind;
        self
    }

    pub fn with_policy(mut self, policy: ChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_backoff_min = min;
        self.reconnect_backoff_max = max;
        self
    }
}

struct LinkShared {
    state: Mutex<LinkState>,
    /// Sender into the active socket; present only while streaming.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    session_id: Mutex<Option<String>>,
    handshakes: AtomicU64,
    dropped_sends: AtomicU64,
    transcripts: mpsc::UnboundedSender<String>,
}

impl LinkShared {
    fn set_state(&self, state: LinkState) {
        if let Ok(mut current) = self.state.lock() {
            if *current != LinkState::Closed {
                *current = state;
            }
        }
    }
}

/// Client for the remote streaming speech-to-text service.
pub struct TranscriptionLink {
    config: LinkConfig,
    shared: Arc<LinkShared>,
    reporter: Arc<dyn ErrorReporter>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TranscriptionLink {
    /// Create a link that forwards selected transcripts to `transcripts`.
    pub fn new(config: LinkConfig, transcripts: mpsc::UnboundedSender<String>) -> Self {
        Self {
            config,
            shared: Arc::new(LinkShared {
                state: Mutex::new(LinkState::Disconnected),
                outbound: Mutex::new(None),
                session_id: Mutex::new(None),
                handshakes: AtomicU64::new(0),
                dropped_sends: AtomicU64::new(0),
                transcripts,
            }),
            reporter: Arc::new(LogReporter),
            task: Mutex::new(None),
        }
    }

    /// Sets a custom error reporter. Only effective before `start`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> LinkState {
        self.shared
            .state
            .lock()
            .map(|state| *state)
            .unwrap_or(LinkState::Closed)
    }

    /// Session id assigned by the service for the current connection.
    pub fn session_id(&self) -> Option<String> {
        self.shared
            .session_id
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Number of successful handshakes over the link's lifetime.
    pub fn handshake_count(&self) -> u64 {
        self.shared.handshakes.load(Ordering::SeqCst)
    }

    /// Number of chunk sends dropped because no session was active.
    pub fn dropped_sends(&self) -> u64 {
        self.shared.dropped_sends.load(Ordering::SeqCst)
    }

    /// Start the connect/receive loop.
    pub fn start(&self, sample_rate: u32) -> Result<()> {
        if self.state() == LinkState::Closed {
            return Err(BanterError::Socket {
                message: "link has been stopped".to_string(),
            });
        }
        if sample_rate != self.config.policy.sample_rate {
            return Err(BanterError::Protocol {
                message: format!(
                    "sample rate {} does not match chunk policy rate {}",
                    sample_rate, self.config.policy.sample_rate
                ),
            });
        }
        let mut task = self.task.lock().map_err(|_| BanterError::Socket {
            message: "link task lock poisoned".to_string(),
        })?;
        if task.is_some() {
            return Err(BanterError::Socket {
                message: "link already started".to_string(),
            });
        }

        // Surface endpoint/key problems now instead of inside the retry loop.
        build_request(&self.config.endpoint, &self.config.api_key, sample_rate)?;

        let config = self.config.clone();
        let shared = self.shared.clone();
        let reporter = self.reporter.clone();
        *task = Some(tokio::spawn(run_link(config, sample_rate, shared, reporter)));
        Ok(())
    }

    /// Queue one chunk for transmission.
    ///
    /// Out-of-window or misaligned chunks are caller defects and are
    /// rejected. Silent chunks are accepted but never transmitted. Without
    /// an active session the send is a no-op.
    pub fn send(&self, chunk: &AudioChunk) -> Result<()> {
        if !chunk.is_sample_aligned() {
            return Err(BanterError::InvalidChunk {
                message: format!("{} bytes is not sample-aligned", chunk.pcm.len()),
            });
        }
        let duration = chunk.duration_ms();
        let policy = &self.config.policy;
        if duration <= policy.min_ms || duration >= policy.max_ms {
            return Err(BanterError::InvalidChunk {
                message: format!(
                    "{}ms outside the ({}, {})ms window",
                    duration, policy.min_ms, policy.max_ms
                ),
            });
        }

        if chunk.is_silence() {
            return Ok(());
        }

        let outbound = self
            .shared
            .outbound
            .lock()
            .ok()
            .and_then(|guard| guard.clone());
        match outbound {
            Some(tx) => {
                let payload = AudioPayload {
                    audio_data: BASE64.encode(&chunk.pcm),
                };
                let json = payload.to_json().map_err(|e| BanterError::Protocol {
                    message: format!("failed to encode audio payload: {}", e),
                })?;
                if tx.send(Message::Text(json)).is_err() {
                    // Session tore down between the check and the send.
                    self.shared.dropped_sends.fetch_add(1, Ordering::SeqCst);
                }
            }
            None => {
                self.shared.dropped_sends.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// Stop the link permanently. Idempotent.
    pub async fn stop(&self) {
        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            handle.abort();
            let _joined = handle.await;
        }
        if let Ok(mut outbound) = self.shared.outbound.lock() {
            *outbound = None;
        }
        if let Ok(mut session_id) = self.shared.session_id.lock() {
            *session_id = None;
        }
        if let Ok(mut state) = self.shared.state.lock() {
            *state = LinkState::Closed;
        }
    }
}

fn build_request(endpoint: &str, api_key: &str, sample_rate: u32) -> Result<Request> {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    let url = format!("{}{}sample_rate={}", endpoint, separator, sample_rate);
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| BanterError::Socket {
            message: format!("invalid endpoint '{}': {}", url, e),
        })?;
    let value = HeaderValue::from_str(api_key).map_err(|e| BanterError::Socket {
        message: format!("api key is not a valid header value: {}", e),
    })?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

/// Connect/handshake/stream loop. Runs until the owning task is aborted.
async fn run_link(
    config: LinkConfig,
    sample_rate: u32,
    shared: Arc<LinkShared>,
    reporter: Arc<dyn ErrorReporter>,
) {
    let mut backoff = config.reconnect_backoff_min;

    loop {
        shared.set_state(LinkState::Connecting);

        let request = match build_request(&config.endpoint, &config.api_key, sample_rate) {
            Ok(request) => request,
            Err(e) => {
                // Validated at start(); a failure here is unrecoverable.
                reporter.report("stt-link", &e);
                shared.set_state(LinkState::Disconnected);
                return;
            }
        };

        let ws = match connect_async(request).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                reporter.report(
                    "stt-link",
                    &BanterError::Socket {
                        message: format!("connect failed: {}", e),
                    },
                );
                shared.set_state(LinkState::Disconnected);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_backoff_max);
                continue;
            }
        };

        shared.set_state(LinkState::AwaitingHandshake);
        let (mut sink, mut stream) = ws.split();

        // The first message must be session-begin; anything else aborts this
        // attempt and lets the reconnect loop retry.
        let session_id = match tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(Message::Text(first)))) => match ServiceMessage::parse(&first) {
                Ok(msg)
                    if msg.message_type.as_deref() == Some(SESSION_BEGINS)
                        && msg.session_id.is_some() =>
                {
                    msg.session_id
                }
                Ok(msg) => {
                    reporter.report(
                        "stt-link",
                        &BanterError::Handshake {
                            message: format!(
                                "expected {} message, got {:?}",
                                SESSION_BEGINS, msg.message_type
                            ),
                        },
                    );
                    None
                }
                Err(e) => {
                    reporter.report(
                        "stt-link",
                        &BanterError::Handshake {
                            message: format!("malformed session-begin message: {}", e),
                        },
                    );
                    None
                }
            },
            Ok(_) => {
                reporter.report(
                    "stt-link",
                    &BanterError::Handshake {
                        message: "connection closed before session-begin".to_string(),
                    },
                );
                None
            }
            Err(_) => {
                reporter.report(
                    "stt-link",
                    &BanterError::Handshake {
                        message: "timed out waiting for session-begin".to_string(),
                    },
                );
                None
            }
        };

        let Some(session_id) = session_id else {
            shared.set_state(LinkState::Disconnected);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(config.reconnect_backoff_max);
            continue;
        };

        if let Ok(mut current) = shared.session_id.lock() {
            *current = Some(session_id);
        }
        shared.handshakes.fetch_add(1, Ordering::SeqCst);
        backoff = config.reconnect_backoff_min;

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        if let Ok(mut outbound) = shared.outbound.lock() {
            *outbound = Some(out_tx);
        }
        shared.set_state(LinkState::Streaming);

        let mut ping = tokio::time::interval(PING_INTERVAL);
        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(raw))) => {
                        handle_service_message(&raw, &config, &shared, reporter.as_ref());
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong: nothing to do
                },
                outbound = out_rx.recv() => match outbound {
                    Some(message) => {
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _tick = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        // Socket is gone: wipe session state, a fresh handshake is mandatory.
        if let Ok(mut outbound) = shared.outbound.lock() {
            *outbound = None;
        }
        if let Ok(mut current) = shared.session_id.lock() {
            *current = None;
        }
        shared.set_state(LinkState::Disconnected);
    }
}

fn handle_service_message(
    raw: &str,
    config: &LinkConfig,
    shared: &LinkShared,
    reporter: &dyn ErrorReporter,
) {
    let msg = match ServiceMessage::parse(raw) {
        Ok(msg) => msg,
        Err(e) => {
            // A single malformed message must not kill the link.
            reporter.report(
                "stt-link",
                &BanterError::Protocol {
                    message: format!("malformed service message: {}", e),
                },
            );
            return;
        }
    };

    if let Some(error) = msg.error {
        reporter.report(
            "stt-link",
            &BanterError::Protocol {
                message: format!("service error: {}", error),
            },
        );
        return;
    }

    if msg.is_transcript(config.transcript)
        && let Some(text) = msg.text
        && !text.is_empty()
    {
        shared.transcripts.send(text).ok();
    }
}
