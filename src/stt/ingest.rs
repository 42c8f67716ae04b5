//! Inbound frame routing: per-speaker accumulation workers.
//!
//! Frames for one speaker must be processed in arrival order (the
//! leftover-merge logic depends on it), so every speaker gets a dedicated
//! worker task owning that speaker's accumulation state exclusively.
//! Streams from different speakers proceed independently.

use crate::error::{BanterError, Result};
use crate::playback::transport::InboundFrame;
use crate::report::{ErrorReporter, LogReporter};
use crate::stt::chunk::{AudioChunk, ChunkPolicy, ChunkState, accumulate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Destination for well-formed chunks.
///
/// This trait allows swapping implementations (transcription link vs mock).
pub trait ChunkSink: Send + Sync {
    fn accept(&self, chunk: AudioChunk) -> Result<()>;
}

/// Routes inbound frames to per-speaker accumulation workers.
pub struct IngestRouter {
    policy: ChunkPolicy,
    sink: Arc<dyn ChunkSink>,
    reporter: Arc<dyn ErrorReporter>,
    /// The session's own speaker id; loopback of our own playback is dropped.
    own_speaker: Option<u64>,
    slots: Mutex<HashMap<u64, mpsc::UnboundedSender<Vec<u8>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl IngestRouter {
    pub fn new(policy: ChunkPolicy, sink: Arc<dyn ChunkSink>) -> Self {
        Self {
            policy,
            sink,
            reporter: Arc::new(LogReporter),
            own_speaker: None,
            slots: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Sets the session's own speaker id so looped-back audio is filtered.
    pub fn with_own_speaker(mut self, speaker: u64) -> Self {
        self.own_speaker = Some(speaker);
        self
    }

    /// Sets a custom error reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Route one inbound frame to its speaker's worker.
    ///
    /// Never blocks; must be called from within a tokio runtime.
    pub fn ingest(&self, frame: InboundFrame) {
        if self.own_speaker == Some(frame.speaker) {
            // Our own playback looped back; it never reaches accumulation.
            return;
        }
        if frame.pcm.len() % 2 != 0 {
            self.reporter.report(
                "ingest",
                &BanterError::InvalidChunk {
                    message: format!(
                        "inbound frame of {} bytes is not sample-aligned",
                        frame.pcm.len()
                    ),
                },
            );
            return;
        }

        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        let sender = slots
            .entry(frame.speaker)
            .or_insert_with(|| self.spawn_worker());
        if let Err(mpsc::error::SendError(pcm)) = sender.send(frame.pcm) {
            // Worker died; rebuild the slot so the stream keeps flowing.
            let sender = self.spawn_worker();
            sender.send(pcm).ok();
            slots.insert(frame.speaker, sender);
        }
    }

    fn spawn_worker(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let policy = self.policy.clone();
        let sink = self.sink.clone();
        let reporter = self.reporter.clone();

        let handle = tokio::spawn(async move {
            let mut state = ChunkState::default();
            while let Some(pcm) = rx.recv().await {
                let (next, chunks) = accumulate(&policy, state, &pcm);
                state = next;
                for chunk in chunks {
                    if let Err(e) = sink.accept(chunk) {
                        reporter.report("ingest", &e);
                    }
                }
            }
        });

        if let Ok(mut workers) = self.workers.lock() {
            workers.push(handle);
        }
        tx
    }

    /// Number of speaker streams seen so far.
    pub fn speaker_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    /// Close all speaker slots and let in-flight workers drain.
    pub async fn shutdown(&self) {
        let senders: Vec<_> = match self.slots.lock() {
            Ok(mut slots) => slots.drain().map(|(_, tx)| tx).collect(),
            Err(_) => Vec::new(),
        };
        drop(senders);

        let workers: Vec<_> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for worker in workers {
            let _joined = worker.await;
        }
    }
}
