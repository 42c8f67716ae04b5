//! Inbound speech-to-text: chunk accumulation, frame routing, and the
//! persistent link to the streaming transcription service.

pub mod chunk;
pub mod ingest;
pub mod link;
pub mod protocol;

pub use chunk::{AudioChunk, ChunkPolicy, ChunkState, accumulate};
pub use ingest::{ChunkSink, IngestRouter};
pub use link::{LinkConfig, LinkState, TranscriptionLink};
pub use protocol::TranscriptKind;

use crate::error::Result;

/// Chunks forwarded to a link are queued on its active session.
impl ChunkSink for TranscriptionLink {
    fn accept(&self, chunk: AudioChunk) -> Result<()> {
        self.send(&chunk)
    }
}
