//! Conversation turn dispatcher.
//!
//! One transcript becomes one turn: announce receipt, ask the backend,
//! speak the answer. Turns for a session are processed one at a time; a
//! transcript arriving mid-turn queues behind it. Access to the chat client
//! is serialized process-wide because it holds mutable per-conversation
//! state.

use crate::audio::encoder::PcmEncoder;
use crate::audio::track::PcmTrack;
use crate::chat::client::{Answer, ChatClient};
use crate::chat::speech::Synthesizer;
use crate::defaults::{DEFAULT_LANGUAGE, RETRY_COOLDOWN};
use crate::error::{BanterError, Result};
use crate::playback::queue::TrackQueue;
use crate::report::{ErrorReporter, LogReporter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spoken while the backend cools down after a rate limit.
pub const STALL_SPEECH: &str =
    "I lost my train of thought. Give me a minute to get back on track...";

fn acknowledge_line(speech: &str) -> String {
    format!("I heard you say \"{speech}\". Give me a second to think...")
}

/// Configuration for the turn dispatcher.
#[derive(Debug, Clone)]
pub struct TurnDispatcherConfig {
    pub language: String,
    /// Cooldown before retrying a rate-limited request.
    pub retry_cooldown: Duration,
    /// Suppress status messages.
    pub quiet: bool,
}

impl Default for TurnDispatcherConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            retry_cooldown: RETRY_COOLDOWN,
            quiet: false,
        }
    }
}

/// Turns finalized transcripts into spoken answers.
pub struct TurnDispatcher {
    client: Arc<dyn ChatClient>,
    /// Serializes in-flight backend requests across the whole process.
    gate: tokio::sync::Mutex<()>,
    synthesizer: Arc<dyn Synthesizer>,
    encoder: Arc<PcmEncoder>,
    queue: Arc<TrackQueue>,
    config: TurnDispatcherConfig,
    conversation_id: std::sync::Mutex<Option<String>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl TurnDispatcher {
    pub fn new(
        client: Arc<dyn ChatClient>,
        synthesizer: Arc<dyn Synthesizer>,
        encoder: Arc<PcmEncoder>,
        queue: Arc<TrackQueue>,
        config: TurnDispatcherConfig,
    ) -> Self {
        Self {
            client,
            gate: tokio::sync::Mutex::new(()),
            synthesizer,
            encoder,
            queue,
            config,
            conversation_id: std::sync::Mutex::new(None),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Continue an existing conversation instead of starting a new one.
    pub fn with_conversation(self, conversation_id: &str) -> Self {
        if let Ok(mut current) = self.conversation_id.lock() {
            *current = Some(conversation_id.to_string());
        }
        self
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.conversation_id
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Synthesize and enqueue an announcement; failures are absorbed.
    pub async fn announce(&self, text: &str) {
        if let Err(e) = self.speak(text).await {
            self.reporter.report("dispatcher", &e);
        }
    }

    /// Run one conversation turn for a finalized transcript.
    ///
    /// Returns `None` when the backend produced no answer; every other
    /// failure along the way is absorbed and reported.
    pub async fn handle(&self, transcript: &str) -> Option<Answer> {
        self.announce(&acknowledge_line(transcript)).await;

        loop {
            let conversation = self
                .conversation_id
                .lock()
                .ok()
                .and_then(|guard| guard.clone());

            let result = {
                let _serialized = self.gate.lock().await;
                self.client.ask(transcript, conversation.as_deref()).await
            };

            match result {
                Ok(answer) => {
                    if let Ok(mut current) = self.conversation_id.lock() {
                        *current = Some(answer.conversation_id.clone());
                    }
                    self.announce(&answer.message).await;
                    return Some(answer);
                }
                Err(BanterError::ChatSessionRefresh) => {
                    // Announce the stall, cool down, retry the same request.
                    self.reporter.report("dispatcher", &BanterError::ChatSessionRefresh);
                    self.announce(STALL_SPEECH).await;
                    tokio::time::sleep(self.config.retry_cooldown).await;
                }
                Err(e) => {
                    self.reporter.report("dispatcher", &e);
                    return None;
                }
            }
        }
    }

    /// Consume transcripts one turn at a time until the channel closes.
    pub fn spawn(self: Arc<Self>, mut transcripts: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(text) = transcripts.recv().await {
                self.handle(&text).await;
            }
        })
    }

    /// Synthesize text and enqueue one track per clip, in order.
    async fn speak(&self, text: &str) -> Result<()> {
        if !self.config.quiet {
            eprintln!("banter: speaking: {}", text);
        }

        let synthesizer = self.synthesizer.clone();
        let owned_text = text.to_string();
        let language = self.config.language.clone();
        let clips =
            tokio::task::spawn_blocking(move || synthesizer.synthesize(&owned_text, &language))
                .await
                .map_err(|e| BanterError::Other(format!("synthesis task failed: {e}")))??;

        for clip in clips {
            let encoder = self.encoder.clone();
            let track = tokio::task::spawn_blocking(move || PcmTrack::from_clip(&clip, &encoder))
                .await
                .map_err(|e| BanterError::Other(format!("clip decode task failed: {e}")))??;
            self.queue.push(Box::new(track));
        }
        Ok(())
    }
}
