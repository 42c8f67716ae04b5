//! Playable audio tracks.
//!
//! A track is a pull-based producer of fixed-size PCM frames, consumed
//! exactly once by the playback session. Tracks may be refreshed before
//! playing to revalidate (or rewind) their backing data.

use crate::audio::encoder::PcmEncoder;
use crate::defaults::{self, FRAME_MS};
use crate::error::{BanterError, Result};
use std::io::Cursor;

/// Trait for playable audio sources.
///
/// This trait allows swapping implementations (in-memory PCM vs mock).
pub trait Track: Send {
    /// Pull the next frame of PCM bytes ([`FRAME_MS`] worth, zero-padded at
    /// the tail). Returns `None` when the track is exhausted.
    fn next_frame(&mut self) -> Option<Vec<u8>>;

    /// Total duration in milliseconds, if known.
    fn duration_ms(&self) -> Option<u64> {
        None
    }

    /// Human-readable label for logging.
    fn name(&self) -> &str {
        "track"
    }

    /// Revalidate the backing data before (re)playing.
    ///
    /// Sources whose backing data can expire fetch it again here; in-memory
    /// sources rewind. The default is a no-op: the track remains valid as-is.
    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory PCM track (mono 16-bit little-endian).
pub struct PcmTrack {
    pcm: Vec<u8>,
    pos: usize,
    sample_rate: u32,
    name: String,
}

impl PcmTrack {
    /// Wrap a raw PCM byte buffer.
    pub fn new(pcm: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            pcm,
            pos: 0,
            sample_rate,
            name: "track".to_string(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Decode a WAV clip (mono or stereo, 16-bit) into a PCM track.
    ///
    /// Stereo input is mixed down to mono by averaging channel pairs.
    pub fn from_wav(bytes: &[u8]) -> Result<Self> {
        let mut reader =
            hound::WavReader::new(Cursor::new(bytes)).map_err(|e| BanterError::Track {
                message: format!("invalid WAV clip: {}", e),
            })?;
        let spec = reader.spec();
        if spec.bits_per_sample != 16 {
            return Err(BanterError::Track {
                message: format!("unsupported WAV bit depth: {}", spec.bits_per_sample),
            });
        }
        if spec.channels == 0 || spec.channels > 2 {
            return Err(BanterError::Track {
                message: format!("unsupported WAV channel count: {}", spec.channels),
            });
        }

        let samples: Vec<i16> = reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| BanterError::Track {
                message: format!("failed to read WAV samples: {}", e),
            })?;

        let mono: Vec<i16> = if spec.channels == 2 {
            samples
                .chunks_exact(2)
                .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
                .collect()
        } else {
            samples
        };

        let mut pcm = Vec::with_capacity(mono.len() * defaults::BYTES_PER_SAMPLE);
        for sample in mono {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }

        Ok(Self::new(pcm, spec.sample_rate))
    }

    /// Decode an arbitrary synthesis clip into a PCM track.
    ///
    /// WAV clips are parsed directly; anything else is piped through the
    /// external encoder.
    pub fn from_clip(clip: &[u8], encoder: &PcmEncoder) -> Result<Self> {
        if clip.starts_with(b"RIFF") {
            Self::from_wav(clip)
        } else {
            let pcm = encoder.encode(clip)?;
            Ok(Self::new(pcm, encoder.sample_rate()))
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_bytes(&self) -> usize {
        defaults::bytes_per_ms(self.sample_rate) * FRAME_MS as usize
    }
}

impl Track for PcmTrack {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.pos >= self.pcm.len() {
            return None;
        }
        let frame_bytes = self.frame_bytes();
        let end = (self.pos + frame_bytes).min(self.pcm.len());
        let mut frame = self.pcm[self.pos..end].to_vec();
        frame.resize(frame_bytes, 0);
        self.pos = end;
        Some(frame)
    }

    fn duration_ms(&self) -> Option<u64> {
        let bytes_per_ms = defaults::bytes_per_ms(self.sample_rate);
        if bytes_per_ms == 0 {
            return None;
        }
        Some((self.pcm.len() / bytes_per_ms) as u64)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn refresh(&mut self) -> Result<()> {
        // In-memory data never expires; refreshing rewinds for replay.
        self.pos = 0;
        Ok(())
    }
}

/// Track wrapper that scales 16-bit sample amplitude by a constant factor.
pub struct VolumeTrack {
    inner: Box<dyn Track>,
    volume: f32,
}

impl VolumeTrack {
    pub fn new(inner: Box<dyn Track>, volume: f32) -> Self {
        Self { inner, volume }
    }
}

impl Track for VolumeTrack {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let frame = self.inner.next_frame()?;
        let mut scaled = Vec::with_capacity(frame.len());
        for pair in frame.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            let adjusted = (sample as f32 * self.volume)
                .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            scaled.extend_from_slice(&adjusted.to_le_bytes());
        }
        Some(scaled)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.inner.duration_ms()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn refresh(&mut self) -> Result<()> {
        self.inner.refresh()
    }
}

/// Mock track for testing.
pub struct MockTrack {
    frames: Vec<Vec<u8>>,
    pos: usize,
    duration_ms: Option<u64>,
    name: String,
    refresh_count: u64,
    should_fail_refresh: bool,
    rewind_on_refresh: bool,
}

impl MockTrack {
    /// Create a mock track with the given number of identical frames.
    pub fn new(frame_count: usize, fill: u8) -> Self {
        Self {
            frames: vec![vec![fill; 8]; frame_count],
            pos: 0,
            duration_ms: None,
            name: "mock-track".to_string(),
            refresh_count: 0,
            should_fail_refresh: false,
            rewind_on_refresh: true,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_refresh_failure(mut self) -> Self {
        self.should_fail_refresh = true;
        self
    }

    /// Disable the rewind-on-refresh behavior (track plays once only).
    pub fn without_rewind(mut self) -> Self {
        self.rewind_on_refresh = false;
        self
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }
}

impl Track for MockTrack {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.pos >= self.frames.len() {
            return None;
        }
        let frame = self.frames[self.pos].clone();
        self.pos += 1;
        Some(frame)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn refresh(&mut self) -> Result<()> {
        self.refresh_count += 1;
        if self.should_fail_refresh {
            return Err(BanterError::Track {
                message: "mock refresh failure".to_string(),
            });
        }
        if self.rewind_on_refresh {
            self.pos = 0;
        }
        Ok(())
    }
}
