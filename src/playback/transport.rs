//! Voice transport boundary.
//!
//! The transport collaborator owns the actual voice connection: it accepts
//! outbound PCM frames for playback and delivers inbound frames tagged with
//! a speaker identifier. Only the interface lives here; real transports are
//! provided by the host.

use crate::error::{BanterError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// One inbound PCM frame from the voice connection.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Identifier of the speaker this frame belongs to.
    pub speaker: u64,
    /// Raw mono 16-bit PCM bytes.
    pub pcm: Vec<u8>,
}

impl InboundFrame {
    pub fn new(speaker: u64, pcm: Vec<u8>) -> Self {
        Self { speaker, pcm }
    }
}

/// Trait for the outbound side of a voice connection.
///
/// This trait allows swapping implementations (real voice client vs mock).
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Write one frame of outbound PCM. Implementations own pacing: the
    /// call resolves when the frame has been accepted for transmission.
    async fn write_frame(&self, frame: &[u8]) -> Result<()>;

    /// Release the underlying voice connection. Must be idempotent.
    async fn disconnect(&self) -> Result<()>;
}

/// Mock voice transport for testing.
#[derive(Default)]
pub struct MockVoiceTransport {
    frames: Mutex<Vec<Vec<u8>>>,
    disconnects: AtomicU64,
    should_fail_writes: bool,
}

impl MockVoiceTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail every frame write.
    pub fn with_write_failure(mut self) -> Self {
        self.should_fail_writes = true;
        self
    }

    /// All frames written so far, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn disconnect_count(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for MockVoiceTransport {
    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        if self.should_fail_writes {
            return Err(BanterError::Transport {
                message: "mock write failure".to_string(),
            });
        }
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame.to_vec());
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_records_frames() {
        let transport = MockVoiceTransport::new();
        transport.write_frame(&[1, 2, 3]).await.unwrap();
        transport.write_frame(&[4, 5, 6]).await.unwrap();

        assert_eq!(transport.frame_count(), 2);
        assert_eq!(transport.frames()[1], vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn test_mock_transport_write_failure() {
        let transport = MockVoiceTransport::new().with_write_failure();
        assert!(transport.write_frame(&[0]).await.is_err());
        assert_eq!(transport.frame_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_transport_counts_disconnects() {
        let transport = MockVoiceTransport::new();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert_eq!(transport.disconnect_count(), 2);
    }
}
