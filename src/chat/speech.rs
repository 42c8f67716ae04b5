//! Speech synthesis seam.
//!
//! Synthesis is an external collaborator: text goes in, a sequence of
//! encoded audio clips comes out. Clips are decoded to PCM tracks by the
//! caller. Synthesis is CPU-bound; async callers wrap it in
//! `tokio::task::spawn_blocking`.

use crate::error::{BanterError, Result};
use std::sync::Mutex;

/// Trait for text-to-speech synthesis.
///
/// This trait allows swapping implementations (real engine vs mock).
pub trait Synthesizer: Send + Sync {
    /// Synthesize text into a sequence of encoded audio clips.
    fn synthesize(&self, text: &str, language: &str) -> Result<Vec<Vec<u8>>>;
}

/// Mock synthesizer for testing.
pub struct MockSynthesizer {
    clips: Vec<Vec<u8>>,
    requests: Mutex<Vec<String>>,
    should_fail: bool,
}

impl MockSynthesizer {
    /// Create a mock that returns one tiny WAV clip per request.
    pub fn new() -> Self {
        Self {
            clips: vec![Self::wav_clip(&[100i16; 160])],
            requests: Mutex::new(Vec::new()),
            should_fail: false,
        }
    }

    /// Configure the clips returned for every request.
    pub fn with_clips(mut self, clips: Vec<Vec<u8>>) -> Self {
        self.clips = clips;
        self
    }

    /// Configure the mock to fail on synthesize.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Texts synthesized so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Build a small mono 16-bit WAV clip (test fixture helper).
    #[allow(clippy::expect_used)]
    pub fn wav_clip(samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).expect("in-memory WAV writer");
            for &sample in samples {
                writer.write_sample(sample).expect("in-memory WAV write");
            }
            writer.finalize().expect("in-memory WAV finalize");
        }
        cursor.into_inner()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer for MockSynthesizer {
    fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<Vec<u8>>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(text.to_string());
        }
        if self.should_fail {
            return Err(BanterError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        Ok(self.clips.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::{PcmTrack, Track};

    #[test]
    fn test_mock_synthesizer_records_requests() {
        let synth = MockSynthesizer::new();
        let clips = synth.synthesize("hello", "en").unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(synth.requests(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_mock_clip_decodes_as_wav() {
        let clip = MockSynthesizer::wav_clip(&[500i16; 320]);
        let track = PcmTrack::from_wav(&clip).unwrap();
        assert_eq!(track.sample_rate(), 16_000);
        assert_eq!(track.duration_ms(), Some(20));
    }

    #[test]
    fn test_mock_synthesizer_failure() {
        let synth = MockSynthesizer::new().with_failure();
        assert!(synth.synthesize("hello", "en").is_err());
    }
}
