//! Outbound audio: playable tracks and external clip encoding.

pub mod encoder;
pub mod track;

pub use encoder::{CommandRunner, PcmEncoder, SystemCommandRunner};
pub use track::{MockTrack, PcmTrack, Track, VolumeTrack};
