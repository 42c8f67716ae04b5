//! Playback session: sequences queued tracks into one outbound stream.
//!
//! One session exists per voice connection. A single background task pulls
//! tracks from the queue, plays each to completion, and waits for the next
//! with an idle timeout. Teardown always cancels the task and releases the
//! transport together, on every exit path.

use crate::audio::track::Track;
use crate::defaults::{FRAME_MS, RECOVERY_IDLE_TIMEOUT};
use crate::error::{BanterError, Result};
use crate::playback::queue::TrackQueue;
use crate::playback::transport::VoiceTransport;
use crate::report::{ErrorReporter, LogReporter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Notice sent to the bound notification target when the queue runs dry.
pub const IDLE_NOTICE: &str = "Ran out of tracks to play. Leaving...";

/// Playback sequencing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Created, sequencing loop not yet started.
    Idle,
    /// Waiting for a track to become available.
    Waiting,
    /// Streaming a track to the transport.
    Playing,
    /// Torn down; terminal.
    Disconnected,
}

/// Configuration for a playback session.
#[derive(Debug, Clone)]
pub struct PlaybackSessionConfig {
    /// Initial idle timeout; `None` waits indefinitely for the first track.
    pub idle_timeout: Option<Duration>,
    /// Idle timeout installed after the queue first runs dry.
    pub recovery_idle_timeout: Duration,
}

impl Default for PlaybackSessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            recovery_idle_timeout: RECOVERY_IDLE_TIMEOUT,
        }
    }
}

struct SessionShared {
    queue: Arc<TrackQueue>,
    transport: Arc<dyn VoiceTransport>,
    reporter: Arc<dyn ErrorReporter>,
    state: Mutex<PlaybackState>,
    looping: AtomicBool,
    disconnected: AtomicBool,
    idle_timeout: Mutex<Option<Duration>>,
    recovery_idle_timeout: Duration,
    notice_tx: Mutex<Option<crossbeam_channel::Sender<String>>>,
    frames_played: AtomicU64,
    has_played: AtomicBool,
    current_duration: Mutex<Option<u64>>,
}

impl SessionShared {
    fn set_state(&self, state: PlaybackState) {
        if let Ok(mut current) = self.state.lock() {
            // Disconnected is terminal.
            if *current != PlaybackState::Disconnected {
                *current = state;
            }
        }
    }

    /// Release the transport exactly once, whichever exit path got here.
    async fn release(&self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.transport.disconnect().await {
                self.reporter.report("playback", &e);
            }
        }
        if let Ok(mut state) = self.state.lock() {
            *state = PlaybackState::Disconnected;
        }
    }
}

/// Owns the track queue and sequencing loop for one voice connection.
pub struct PlaybackSession {
    shared: Arc<SessionShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackSession {
    pub fn new(
        queue: Arc<TrackQueue>,
        transport: Arc<dyn VoiceTransport>,
        config: PlaybackSessionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                queue,
                transport,
                reporter: Arc::new(LogReporter),
                state: Mutex::new(PlaybackState::Idle),
                looping: AtomicBool::new(false),
                disconnected: AtomicBool::new(false),
                idle_timeout: Mutex::new(config.idle_timeout),
                recovery_idle_timeout: config.recovery_idle_timeout,
                notice_tx: Mutex::new(None),
                frames_played: AtomicU64::new(0),
                has_played: AtomicBool::new(false),
                current_duration: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Sets a custom error reporter. Only effective before `spawn`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.reporter = reporter;
        }
        self
    }

    pub fn queue(&self) -> Arc<TrackQueue> {
        self.shared.queue.clone()
    }

    /// Append a track to the queue. Never blocks.
    pub fn enqueue(&self, track: Box<dyn Track>) {
        self.shared.queue.push(track);
    }

    /// Bind a notification target for idle notices.
    ///
    /// Binding twice is a caller defect and is rejected.
    pub fn bind(&self, target: crossbeam_channel::Sender<String>) -> Result<()> {
        let mut notice_tx = self.shared.notice_tx.lock().map_err(|_| BanterError::Playback {
            message: "notification target lock poisoned".to_string(),
        })?;
        if notice_tx.is_some() {
            return Err(BanterError::AlreadyBound);
        }
        *notice_tx = Some(target);
        Ok(())
    }

    /// Replay the current track instead of advancing.
    pub fn set_looping(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::SeqCst);
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping.load(Ordering::SeqCst)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.shared.idle_timeout.lock().ok().and_then(|guard| *guard)
    }

    pub fn set_idle_timeout(&self, timeout: Option<Duration>) {
        if let Ok(mut guard) = self.shared.idle_timeout.lock() {
            *guard = timeout;
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared
            .state
            .lock()
            .map(|state| *state)
            .unwrap_or(PlaybackState::Disconnected)
    }

    pub fn is_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::SeqCst)
    }

    /// Frames streamed from the current (or last) track.
    pub fn frames_played(&self) -> u64 {
        self.shared.frames_played.load(Ordering::SeqCst)
    }

    /// Milliseconds streamed from the current (or last) track.
    ///
    /// Returns `None` before anything has played.
    pub fn elapsed_ms(&self) -> Option<u64> {
        if !self.shared.has_played.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.frames_played() * FRAME_MS)
    }

    /// Fraction of the current track played, 0.0..=1.0.
    ///
    /// Returns `None` when nothing has played or the track's duration is
    /// unknown.
    pub fn progress(&self) -> Option<f32> {
        let elapsed = self.elapsed_ms()?;
        let duration = (*self.shared.current_duration.lock().ok()?)?;
        if duration == 0 {
            return None;
        }
        Some((elapsed as f32 / duration as f32).min(1.0))
    }

    /// Start the sequencing loop. A session runs at most one loop.
    pub fn spawn(&self) -> Result<()> {
        let mut task = self.task.lock().map_err(|_| BanterError::Playback {
            message: "task handle lock poisoned".to_string(),
        })?;
        if task.is_some() {
            return Err(BanterError::Playback {
                message: "sequencing loop already started".to_string(),
            });
        }
        if self.is_disconnected() {
            return Err(BanterError::Playback {
                message: "session already disconnected".to_string(),
            });
        }
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(run(shared)));
        Ok(())
    }

    /// Tear the session down: cancel the sequencing loop, wait for it, then
    /// release the transport. Idempotent.
    pub async fn disconnect(&self) {
        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            handle.abort();
            let _joined = handle.await;
        }
        self.shared.release().await;
    }
}

/// Sequencing loop: wait for a track, refresh, play, repeat.
async fn run(shared: Arc<SessionShared>) {
    loop {
        shared.set_state(PlaybackState::Waiting);
        let limit = shared.idle_timeout.lock().ok().and_then(|guard| *guard);

        match shared.queue.pop_timeout(limit).await {
            None => {
                // Queue ran dry: notify, arm the recovery timeout, leave.
                let notice_tx = shared
                    .notice_tx
                    .lock()
                    .ok()
                    .and_then(|guard| guard.clone());
                if let Some(tx) = notice_tx {
                    tx.send(IDLE_NOTICE.to_string()).ok();
                }
                if let Ok(mut timeout) = shared.idle_timeout.lock() {
                    *timeout = Some(shared.recovery_idle_timeout);
                }
                break;
            }
            Some(mut track) => {
                shared.set_state(PlaybackState::Playing);
                loop {
                    if shared.disconnected.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = track.refresh() {
                        shared.reporter.report("playback", &e);
                        break;
                    }
                    if let Ok(mut duration) = shared.current_duration.lock() {
                        *duration = track.duration_ms();
                    }
                    shared.frames_played.store(0, Ordering::SeqCst);
                    shared.has_played.store(true, Ordering::SeqCst);

                    // A single bad track must not kill the session.
                    if let Err(e) = play_track(&shared, track.as_mut()).await {
                        shared.reporter.report("playback", &e);
                    }

                    if !shared.looping.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }

        if shared.disconnected.load(Ordering::SeqCst) {
            break;
        }
    }

    shared.release().await;
}

async fn play_track(shared: &SessionShared, track: &mut dyn Track) -> Result<()> {
    while let Some(frame) = track.next_frame() {
        if shared.disconnected.load(Ordering::SeqCst) {
            break;
        }
        shared.transport.write_frame(&frame).await?;
        shared.frames_played.fetch_add(1, Ordering::SeqCst);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::{MockTrack, PcmTrack};
    use crate::playback::transport::MockVoiceTransport;
    use crate::report::test_support::CollectingReporter;

    fn session_with(
        transport: Arc<MockVoiceTransport>,
        config: PlaybackSessionConfig,
    ) -> PlaybackSession {
        let queue = Arc::new(TrackQueue::unbounded());
        PlaybackSession::new(queue, transport, config)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_plays_enqueued_tracks_in_order_exactly_once() {
        let transport = Arc::new(MockVoiceTransport::new());
        let session = session_with(transport.clone(), PlaybackSessionConfig::default());

        for fill in [0x11u8, 0x22, 0x33] {
            session.enqueue(Box::new(MockTrack::new(2, fill)));
        }
        session.spawn().unwrap();

        assert!(wait_until(|| transport.frame_count() == 6, Duration::from_secs(2)).await);
        // Order and exactly-once: payload fills appear as contiguous runs.
        let fills: Vec<u8> = transport.frames().iter().map(|f| f[0]).collect();
        assert_eq!(fills, vec![0x11, 0x11, 0x22, 0x22, 0x33, 0x33]);

        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_scenario_known_then_unknown_duration_then_idle() {
        let transport = Arc::new(MockVoiceTransport::new());
        let queue = Arc::new(TrackQueue::unbounded());
        let session = PlaybackSession::new(
            queue,
            transport.clone(),
            PlaybackSessionConfig {
                idle_timeout: Some(Duration::from_millis(50)),
                recovery_idle_timeout: Duration::from_secs(120),
            },
        );

        let (notice_tx, notice_rx) = crossbeam_channel::unbounded();
        session.bind(notice_tx).unwrap();

        // A: 500ms of known-duration PCM at 16kHz (25 frames of 640 bytes)
        session.enqueue(Box::new(
            PcmTrack::new(vec![0xAAu8; 16_000], 16_000).with_name("a"),
        ));
        // B: three frames, duration unknown
        session.enqueue(Box::new(MockTrack::new(3, 0xBB).with_name("b")));
        session.spawn().unwrap();

        // A fully, then B, then idle-timeout disconnect
        assert!(
            wait_until(
                || session.state() == PlaybackState::Disconnected,
                Duration::from_secs(2)
            )
            .await
        );

        let frames = transport.frames();
        assert_eq!(frames.len(), 28);
        assert!(frames[..25].iter().all(|f| f.len() == 640 && f[0] == 0xAA));
        assert!(frames[25..].iter().all(|f| f[0] == 0xBB));

        // Exactly one idle notice, then the transport was released.
        assert_eq!(notice_rx.try_iter().count(), 1);
        assert_eq!(transport.disconnect_count(), 1);

        // The recovery timeout is armed for any future silence.
        assert_eq!(session.idle_timeout(), Some(Duration::from_secs(120)));

        // B had unknown duration: elapsed known, fraction unknown.
        assert_eq!(session.elapsed_ms(), Some(60));
        assert!(session.progress().is_none());
    }

    #[tokio::test]
    async fn test_progress_with_known_duration() {
        let transport = Arc::new(MockVoiceTransport::new());
        let session = session_with(transport.clone(), PlaybackSessionConfig::default());

        assert!(session.elapsed_ms().is_none());
        assert!(session.progress().is_none());

        session.enqueue(Box::new(
            PcmTrack::new(vec![0u8; 16_000], 16_000).with_name("half-second"),
        ));
        session.spawn().unwrap();

        assert!(wait_until(|| transport.frame_count() == 25, Duration::from_secs(2)).await);
        assert_eq!(session.elapsed_ms(), Some(500));
        assert_eq!(session.progress(), Some(1.0));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_looping_replays_current_track() {
        let transport = Arc::new(MockVoiceTransport::new());
        let session = session_with(transport.clone(), PlaybackSessionConfig::default());

        session.set_looping(true);
        session.enqueue(Box::new(MockTrack::new(2, 0x55)));
        session.spawn().unwrap();

        // Replayed at least twice without a second enqueue
        assert!(wait_until(|| transport.frame_count() >= 4, Duration::from_secs(2)).await);
        session.set_looping(false);
        session.disconnect().await;

        assert!(transport.frames().iter().all(|f| f[0] == 0x55));
    }

    #[tokio::test]
    async fn test_idle_timeout_emits_one_notice_then_disconnects() {
        let transport = Arc::new(MockVoiceTransport::new());
        let session = session_with(
            transport.clone(),
            PlaybackSessionConfig {
                idle_timeout: Some(Duration::from_millis(30)),
                recovery_idle_timeout: Duration::from_secs(120),
            },
        );
        let (notice_tx, notice_rx) = crossbeam_channel::unbounded();
        session.bind(notice_tx).unwrap();
        session.spawn().unwrap();

        assert!(
            wait_until(
                || session.state() == PlaybackState::Disconnected,
                Duration::from_secs(2)
            )
            .await
        );
        let notices: Vec<String> = notice_rx.try_iter().collect();
        assert_eq!(notices, vec![IDLE_NOTICE.to_string()]);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = Arc::new(MockVoiceTransport::new());
        let session = session_with(transport.clone(), PlaybackSessionConfig::default());
        session.spawn().unwrap();

        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(transport.disconnect_count(), 1);
        assert_eq!(session.state(), PlaybackState::Disconnected);
    }

    #[tokio::test]
    async fn test_bad_track_does_not_kill_session() {
        let transport = Arc::new(MockVoiceTransport::new().with_write_failure());
        let reporter = Arc::new(CollectingReporter::default());
        let queue = Arc::new(TrackQueue::unbounded());
        let session = PlaybackSession::new(
            queue,
            transport.clone(),
            PlaybackSessionConfig {
                idle_timeout: Some(Duration::from_millis(50)),
                recovery_idle_timeout: Duration::from_secs(120),
            },
        )
        .with_reporter(reporter.clone());

        session.enqueue(Box::new(MockTrack::new(2, 1)));
        session.enqueue(Box::new(MockTrack::new(2, 2)));
        session.spawn().unwrap();

        // Both tracks fail to play; the loop survives to the idle timeout.
        assert!(
            wait_until(
                || session.state() == PlaybackState::Disconnected,
                Duration::from_secs(2)
            )
            .await
        );
        assert_eq!(reporter.reports.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_skips_track() {
        let transport = Arc::new(MockVoiceTransport::new());
        let reporter = Arc::new(CollectingReporter::default());
        let queue = Arc::new(TrackQueue::unbounded());
        let session = PlaybackSession::new(
            queue,
            transport.clone(),
            PlaybackSessionConfig {
                idle_timeout: Some(Duration::from_millis(50)),
                recovery_idle_timeout: Duration::from_secs(120),
            },
        )
        .with_reporter(reporter.clone());

        session.enqueue(Box::new(MockTrack::new(2, 1).with_refresh_failure()));
        session.enqueue(Box::new(MockTrack::new(2, 9)));
        session.spawn().unwrap();

        assert!(
            wait_until(
                || session.state() == PlaybackState::Disconnected,
                Duration::from_secs(2)
            )
            .await
        );
        // Only the healthy track produced frames.
        assert!(transport.frames().iter().all(|f| f[0] == 9));
        assert_eq!(reporter.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bind_twice_is_rejected() {
        let transport = Arc::new(MockVoiceTransport::new());
        let session = session_with(transport, PlaybackSessionConfig::default());

        let (tx1, _rx1) = crossbeam_channel::unbounded();
        let (tx2, _rx2) = crossbeam_channel::unbounded();
        session.bind(tx1).unwrap();
        assert!(matches!(session.bind(tx2), Err(BanterError::AlreadyBound)));
    }

    #[tokio::test]
    async fn test_spawn_twice_is_rejected() {
        let transport = Arc::new(MockVoiceTransport::new());
        let session = session_with(transport, PlaybackSessionConfig::default());
        session.spawn().unwrap();
        assert!(session.spawn().is_err());
        session.disconnect().await;
    }
}
