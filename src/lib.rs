//! banter - live voice conversations with a conversational-AI backend
//!
//! Mediates a two-way voice conversation inside a group voice session:
//! inbound microphone frames are chunked and streamed to a remote
//! transcription service, finalized transcripts become backend turns, and
//! the synthesized answers are sequenced back into the session as one
//! continuous outbound audio stream.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
pub mod chat;
pub mod config;
pub mod defaults;
pub mod error;
pub mod playback;
pub mod report;
pub mod stt;

// Core traits (seams to the outside collaborators)
pub use audio::encoder::{CommandRunner, PcmEncoder};
pub use audio::track::Track;
pub use chat::client::{Answer, ChatClient};
pub use chat::speech::Synthesizer;
pub use playback::transport::{InboundFrame, VoiceTransport};
pub use stt::ingest::ChunkSink;

// Pipeline components
pub use app::VoiceSession;
pub use chat::dispatcher::{TurnDispatcher, TurnDispatcherConfig};
pub use playback::queue::TrackQueue;
pub use playback::session::{PlaybackSession, PlaybackSessionConfig, PlaybackState};
pub use stt::chunk::{AudioChunk, ChunkPolicy, ChunkState, accumulate};
pub use stt::ingest::IngestRouter;
pub use stt::link::{LinkConfig, LinkState, TranscriptionLink};
pub use stt::protocol::TranscriptKind;

// Error handling
pub use error::{BanterError, Result};

// Config
pub use config::Config;

// Reporting
pub use report::{ErrorReporter, LogReporter};
