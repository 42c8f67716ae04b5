//! Default configuration constants for banter.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and is what the streaming
/// transcription service is asked to expect via its query parameter.
pub const SAMPLE_RATE: u32 = 16_000;

/// Playback frame cadence in milliseconds.
///
/// Outbound PCM is pulled from tracks in fixed 20ms frames, the framing
/// voice transports expect.
pub const FRAME_MS: u64 = 20;

/// Bytes per sample for mono 16-bit PCM.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Hard minimum chunk duration the transcription service accepts, in ms.
pub const MIN_CHUNK_MS: u64 = 100;

/// Hard maximum chunk duration the transcription service accepts, in ms.
pub const MAX_CHUNK_MS: u64 = 2_000;

/// Quality floor for chunk duration, in ms.
///
/// The service technically accepts chunks down to [`MIN_CHUNK_MS`], but
/// transcription quality degrades badly below one second, so undersized
/// frames are merged until they reach this floor.
pub const USABLE_MIN_CHUNK_MS: u64 = 1_000;

/// Safety margin subtracted from the oversize-split chunk size, in bytes.
///
/// Keeps split chunks strictly under the service ceiling even if the
/// byte-per-millisecond arithmetic rounds against us.
pub const SPLIT_SAFETY_BYTES: usize = 10;

/// Idle timeout applied after the playback queue first runs dry.
pub const RECOVERY_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Cooldown before retrying a rate-limited chat backend request.
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(60);

/// Keepalive ping interval on the transcription socket.
pub const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Time allowed for the service's session-begin message after connecting.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Initial reconnect backoff for the transcription socket.
pub const RECONNECT_BACKOFF_MIN: Duration = Duration::from_millis(500);

/// Reconnect backoff ceiling for the transcription socket.
pub const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Default external encoder executable for non-PCM clips.
pub const ENCODER_PROGRAM: &str = "ffmpeg";

/// Default language code for speech synthesis.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Bytes of PCM per millisecond at the given sample rate (mono 16-bit).
pub fn bytes_per_ms(sample_rate: u32) -> usize {
    (sample_rate as usize / 1000) * BYTES_PER_SAMPLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_ms_at_default_rate() {
        // 16k samples/s mono 16-bit = 32 bytes per millisecond
        assert_eq!(bytes_per_ms(SAMPLE_RATE), 32);
    }

    #[test]
    fn test_chunk_window_ordering() {
        assert!(MIN_CHUNK_MS < USABLE_MIN_CHUNK_MS);
        assert!(USABLE_MIN_CHUNK_MS < MAX_CHUNK_MS);
    }
}
