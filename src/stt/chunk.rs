//! Chunk accumulation for the streaming transcription service.
//!
//! The service enforces a hard per-message duration window; microphone
//! frames rarely land in it. Undersized frames are merged across calls via
//! a per-speaker leftover buffer, oversized frames are split along sample
//! boundaries. Accumulation is a pure function over an explicit state value
//! so it can be tested without any I/O.

use crate::defaults::{self, SPLIT_SAFETY_BYTES};

/// Duration window and audio format for chunk accumulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPolicy {
    /// Hard floor the service accepts, in ms.
    pub min_ms: u64,
    /// Hard ceiling the service accepts, in ms.
    pub max_ms: u64,
    /// Quality floor; undersized frames are merged up to at least this.
    pub usable_min_ms: u64,
    /// Sample rate of the inbound PCM.
    pub sample_rate: u32,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            min_ms: defaults::MIN_CHUNK_MS,
            max_ms: defaults::MAX_CHUNK_MS,
            usable_min_ms: defaults::USABLE_MIN_CHUNK_MS,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl ChunkPolicy {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    fn bytes_per_ms(&self) -> usize {
        defaults::bytes_per_ms(self.sample_rate)
    }

    /// Duration in milliseconds of a PCM buffer of the given length.
    pub fn duration_ms(&self, byte_len: usize) -> u64 {
        let bytes_per_ms = self.bytes_per_ms();
        if bytes_per_ms == 0 {
            return 0;
        }
        (byte_len / bytes_per_ms) as u64
    }

    /// Byte size of an oversize-split sub-chunk.
    ///
    /// A hair under the ceiling, rounded down to an even count so a split
    /// never lands inside a 16-bit sample.
    fn split_bytes(&self) -> usize {
        let mut bytes = (self.max_ms as usize * self.bytes_per_ms())
            .saturating_sub(SPLIT_SAFETY_BYTES);
        if bytes % 2 != 0 {
            bytes -= 1;
        }
        bytes.max(2)
    }
}

/// One transmittable chunk of raw PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(pcm: Vec<u8>, sample_rate: u32) -> Self {
        Self { pcm, sample_rate }
    }

    pub fn duration_ms(&self) -> u64 {
        let bytes_per_ms = defaults::bytes_per_ms(self.sample_rate);
        if bytes_per_ms == 0 {
            return 0;
        }
        (self.pcm.len() / bytes_per_ms) as u64
    }

    /// True when every byte is zero. Silent chunks are never transmitted.
    pub fn is_silence(&self) -> bool {
        self.pcm.iter().all(|&b| b == 0)
    }

    /// True when the byte length respects the 16-bit sample boundary.
    pub fn is_sample_aligned(&self) -> bool {
        self.pcm.len() % 2 == 0
    }
}

/// Accumulation state for one speaker stream.
///
/// Holds at most one pending undersized buffer; cleared whenever its content
/// is merged into a forwarded chunk or discarded as unreconcilable.
#[derive(Debug, Clone, Default)]
pub struct ChunkState {
    leftover: Vec<u8>,
}

impl ChunkState {
    pub fn has_leftover(&self) -> bool {
        !self.leftover.is_empty()
    }

    pub fn leftover_len(&self) -> usize {
        self.leftover.len()
    }
}

/// Fold one inbound frame into the speaker's accumulation state.
///
/// Returns the next state and zero or more chunks ready to forward, each
/// strictly inside the policy's duration window and sample-aligned.
pub fn accumulate(
    policy: &ChunkPolicy,
    state: ChunkState,
    frame: &[u8],
) -> (ChunkState, Vec<AudioChunk>) {
    let duration = policy.duration_ms(frame.len());

    if duration < policy.usable_min_ms {
        // Merge with whatever is pending for this speaker.
        let mut merged = state.leftover;
        merged.extend_from_slice(frame);
        let merged_duration = policy.duration_ms(merged.len());

        if merged_duration < policy.usable_min_ms {
            // Still not enough; hold it for the next frame.
            return (ChunkState { leftover: merged }, Vec::new());
        }
        if merged_duration > policy.max_ms {
            // Cannot be reconciled with the window; drop it all.
            return (ChunkState::default(), Vec::new());
        }
        return (
            ChunkState::default(),
            vec![AudioChunk::new(merged, policy.sample_rate)],
        );
    }

    if duration >= policy.max_ms {
        // Any pending leftover is stale relative to this frame.
        let split_bytes = policy.split_bytes();
        let mut chunks = Vec::new();
        let mut leftover = Vec::new();

        for piece in frame.chunks(split_bytes) {
            if policy.duration_ms(piece.len()) > policy.min_ms {
                chunks.push(AudioChunk::new(piece.to_vec(), policy.sample_rate));
            } else {
                // A tail shorter than the service floor waits for more audio.
                leftover = piece.to_vec();
            }
        }
        return (ChunkState { leftover }, chunks);
    }

    // Within the window on its own; any leftover is stale.
    (
        ChunkState::default(),
        vec![AudioChunk::new(frame.to_vec(), policy.sample_rate)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ChunkPolicy {
        ChunkPolicy::default() // 100 / 1000 / 2000 ms at 16kHz (32 bytes/ms)
    }

    fn frame_of_ms(ms: usize) -> Vec<u8> {
        vec![1u8; ms * 32]
    }

    #[test]
    fn test_duration_calculation() {
        let p = policy();
        assert_eq!(p.duration_ms(32_000), 1_000);
        assert_eq!(p.duration_ms(12_800), 400);
        assert_eq!(p.duration_ms(0), 0);
    }

    #[test]
    fn test_undersized_frame_becomes_leftover() {
        let (state, chunks) = accumulate(&policy(), ChunkState::default(), &frame_of_ms(400));
        assert!(chunks.is_empty());
        assert_eq!(state.leftover_len(), 400 * 32);
    }

    #[test]
    fn test_two_undersized_frames_merge_into_one_chunk() {
        let p = policy();
        let (state, chunks) = accumulate(&p, ChunkState::default(), &frame_of_ms(600));
        assert!(chunks.is_empty());

        let (state, chunks) = accumulate(&p, state, &frame_of_ms(600));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].duration_ms(), 1_200);
        assert!(!state.has_leftover());
    }

    #[test]
    fn test_three_400ms_frames_forward_one_chunk() {
        let p = policy();
        let mut state = ChunkState::default();

        let (next, chunks) = accumulate(&p, state, &frame_of_ms(400));
        assert!(chunks.is_empty());
        state = next;

        let (next, chunks) = accumulate(&p, state, &frame_of_ms(400));
        assert!(chunks.is_empty());
        assert_eq!(next.leftover_len(), 800 * 32);
        state = next;

        let (state, chunks) = accumulate(&p, state, &frame_of_ms(400));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].duration_ms(), 1_200);
        assert!(!state.has_leftover());
    }

    #[test]
    fn test_in_window_frame_forwards_and_drops_stale_leftover() {
        let p = policy();
        let (state, _) = accumulate(&p, ChunkState::default(), &frame_of_ms(400));
        assert!(state.has_leftover());

        let frame = frame_of_ms(1_500);
        let (state, chunks) = accumulate(&p, state, &frame);
        assert_eq!(chunks.len(), 1);
        // The stale leftover is not prepended.
        assert_eq!(chunks[0].pcm, frame);
        assert!(!state.has_leftover());
    }

    #[test]
    fn test_oversize_frame_splits_into_aligned_subchunks() {
        let p = policy();
        let frame: Vec<u8> = (0..160_000u32).map(|i| (i % 251) as u8).collect(); // 5000ms

        let (state, chunks) = accumulate(&p, ChunkState::default(), &frame);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.is_sample_aligned());
            assert!(chunk.duration_ms() > p.min_ms);
            assert!(chunk.duration_ms() < p.max_ms);
        }

        // Concatenation reproduces the original bytes.
        let rebuilt: Vec<u8> = chunks.iter().flat_map(|c| c.pcm.clone()).collect();
        assert_eq!(rebuilt, frame);
        assert!(!state.has_leftover());
    }

    #[test]
    fn test_oversize_split_sub_floor_tail_is_retained() {
        let p = policy();
        let split = 2_000 * 32 - 10; // one full sub-chunk
        let frame = vec![3u8; split + 32]; // plus a 1ms tail

        let (state, chunks) = accumulate(&p, ChunkState::default(), &frame);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].pcm.len(), split);
        // The 1ms tail is below the service floor; it waits as leftover
        // rather than being transmitted or dropped.
        assert_eq!(state.leftover_len(), 32);
    }

    #[test]
    fn test_exact_ceiling_frame_is_split_not_forwarded_whole() {
        let p = policy();
        let frame = frame_of_ms(2_000);
        let (_, chunks) = accumulate(&p, ChunkState::default(), &frame);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.duration_ms() < p.max_ms);
        }
    }

    #[test]
    fn test_merged_over_ceiling_is_discarded() {
        // Window tight enough that two mergeable frames can overshoot it.
        let p = ChunkPolicy {
            min_ms: 100,
            max_ms: 1_100,
            usable_min_ms: 1_000,
            sample_rate: 16_000,
        };

        let (state, chunks) = accumulate(&p, ChunkState::default(), &frame_of_ms(900));
        assert!(chunks.is_empty());

        let (state, chunks) = accumulate(&p, state, &frame_of_ms(900));
        // 1800ms cannot be reconciled: everything is dropped, state cleared.
        assert!(chunks.is_empty());
        assert!(!state.has_leftover());
    }

    #[test]
    fn test_silence_is_processed_like_any_frame() {
        let p = policy();
        let silent = vec![0u8; 400 * 32];

        let (state, chunks) = accumulate(&p, ChunkState::default(), &silent);
        assert!(chunks.is_empty());
        assert_eq!(state.leftover_len(), 400 * 32);

        let (state, chunks) = accumulate(&p, state, &vec![0u8; 800 * 32]);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_silence());
        assert!(!state.has_leftover());
    }

    #[test]
    fn test_window_property_over_mixed_sequence() {
        let p = policy();
        let mut state = ChunkState::default();
        let mut forwarded = Vec::new();

        for ms in [40, 950, 1_500, 30, 5_000, 700, 400, 2_000, 1_999, 120] {
            let frame = frame_of_ms(ms);
            let (next, chunks) = accumulate(&p, state, &frame);
            state = next;
            forwarded.extend(chunks);
        }

        assert!(!forwarded.is_empty());
        for chunk in &forwarded {
            assert!(chunk.is_sample_aligned());
            assert!(
                chunk.duration_ms() > p.min_ms && chunk.duration_ms() < p.max_ms,
                "chunk of {}ms escaped the ({}, {}) window",
                chunk.duration_ms(),
                p.min_ms,
                p.max_ms
            );
        }
    }
}
