//! Playback: track queue, sequencing session and the voice transport seam.

pub mod queue;
pub mod session;
pub mod transport;

pub use queue::TrackQueue;
pub use session::{IDLE_NOTICE, PlaybackSession, PlaybackSessionConfig, PlaybackState};
pub use transport::{InboundFrame, MockVoiceTransport, VoiceTransport};
