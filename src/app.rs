//! Composition root: wires one live voice conversation together.
//!
//! Inbound transport frames flow through the ingest router to the
//! transcription link; finalized transcripts flow through the turn
//! dispatcher to the playback queue; the playback session streams the
//! resulting speech back out through the transport.

use crate::audio::encoder::PcmEncoder;
use crate::chat::client::ChatClient;
use crate::chat::dispatcher::{TurnDispatcher, TurnDispatcherConfig};
use crate::chat::speech::Synthesizer;
use crate::config::Config;
use crate::error::{BanterError, Result};
use crate::playback::queue::TrackQueue;
use crate::playback::session::{PlaybackSession, PlaybackSessionConfig};
use crate::playback::transport::{InboundFrame, VoiceTransport};
use crate::stt::ingest::IngestRouter;
use crate::stt::link::{LinkConfig, TranscriptionLink};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One live voice conversation: playback, ingest, transcription and turns.
pub struct VoiceSession {
    queue: Arc<TrackQueue>,
    playback: Arc<PlaybackSession>,
    link: Arc<TranscriptionLink>,
    router: Arc<IngestRouter>,
    dispatcher: Arc<TurnDispatcher>,
    dispatch_worker: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceSession {
    /// Wire and start a session. Must be called from within a tokio runtime.
    ///
    /// `own_speaker` is the transport's identifier for this session's own
    /// audio, so loopback of our playback never reaches transcription.
    pub fn start(
        config: &Config,
        transport: Arc<dyn VoiceTransport>,
        client: Arc<dyn ChatClient>,
        synthesizer: Arc<dyn Synthesizer>,
        own_speaker: Option<u64>,
        quiet: bool,
    ) -> Result<Self> {
        config.validate()?;
        let api_key = config
            .stt
            .api_key
            .clone()
            .ok_or_else(|| BanterError::ConfigInvalidValue {
                key: "stt.api_key".to_string(),
                message: "required to reach the transcription service".to_string(),
            })?;

        let queue = Arc::new(TrackQueue::from_config_capacity(
            config.playback.queue_capacity,
        ));
        let playback = Arc::new(PlaybackSession::new(
            queue.clone(),
            transport,
            PlaybackSessionConfig {
                idle_timeout: config.idle_timeout()?,
                recovery_idle_timeout: config.recovery_idle_timeout()?,
            },
        ));
        playback.spawn()?;

        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let link_config = LinkConfig::new(&config.stt.endpoint, &api_key)
            .with_transcript(config.stt.transcript)
            .with_policy(config.chunk_policy());
        let link = Arc::new(TranscriptionLink::new(link_config, transcript_tx));
        link.start(config.audio.sample_rate)?;

        let mut router = IngestRouter::new(config.chunk_policy(), link.clone());
        if let Some(speaker) = own_speaker {
            router = router.with_own_speaker(speaker);
        }
        let router = Arc::new(router);

        let encoder = Arc::new(PcmEncoder::new(
            &config.audio.encoder,
            config.audio.sample_rate,
        ));
        let dispatcher = Arc::new(TurnDispatcher::new(
            client,
            synthesizer,
            encoder,
            queue.clone(),
            TurnDispatcherConfig {
                language: config.chat.language.clone(),
                retry_cooldown: config.retry_cooldown()?,
                quiet,
            },
        ));
        let dispatch_worker = dispatcher.clone().spawn(transcript_rx);

        Ok(Self {
            queue,
            playback,
            link,
            router,
            dispatcher,
            dispatch_worker: Mutex::new(Some(dispatch_worker)),
        })
    }

    /// Feed one inbound transport frame into transcription.
    pub fn ingest(&self, frame: InboundFrame) {
        self.router.ingest(frame);
    }

    /// Speak an announcement into the session.
    pub async fn announce(&self, text: &str) {
        self.dispatcher.announce(text).await;
    }

    pub fn queue(&self) -> Arc<TrackQueue> {
        self.queue.clone()
    }

    pub fn playback(&self) -> &PlaybackSession {
        &self.playback
    }

    pub fn link(&self) -> &TranscriptionLink {
        &self.link
    }

    pub fn dispatcher(&self) -> &TurnDispatcher {
        &self.dispatcher
    }

    /// Tear the session down in dependency order: playback loop and
    /// transport first, then the transcription link, then the ingest
    /// workers, then the turn worker. In-flight ingest output is discarded
    /// by the stopped link.
    pub async fn shutdown(&self) {
        self.playback.disconnect().await;
        self.link.stop().await;
        self.router.shutdown().await;
        let worker = self
            .dispatch_worker
            .lock()
            .ok()
            .and_then(|mut worker| worker.take());
        if let Some(worker) = worker {
            worker.abort();
            let _joined = worker.await;
        }
    }
}
