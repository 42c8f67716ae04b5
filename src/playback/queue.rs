//! FIFO track queue feeding the playback session.

use crate::audio::track::Track;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Ordered queue of tracks for one playback session.
///
/// Pushes never block. A bounded queue evicts its oldest entry when full
/// (ring-buffer policy); an unbounded queue grows without limit.
pub struct TrackQueue {
    items: Mutex<VecDeque<Box<dyn Track>>>,
    notify: Notify,
    capacity: Option<usize>,
}

impl TrackQueue {
    /// Create a queue with no capacity limit.
    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: None,
        }
    }

    /// Create a bounded queue. When full, pushing evicts the oldest track.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity: Some(capacity),
        }
    }

    /// Queue capacity from a config value where 0 means unbounded.
    pub fn from_config_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            Self::unbounded()
        } else {
            Self::with_capacity(capacity)
        }
    }

    /// Append a track. Never blocks the caller.
    pub fn push(&self, track: Box<dyn Track>) {
        if let Ok(mut items) = self.items.lock() {
            if let Some(capacity) = self.capacity {
                while items.len() >= capacity.max(1) {
                    items.pop_front();
                }
            }
            items.push_back(track);
        }
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_pop(&self) -> Option<Box<dyn Track>> {
        self.items.lock().ok()?.pop_front()
    }

    /// Wait for the next track.
    pub async fn pop(&self) -> Box<dyn Track> {
        loop {
            if let Some(track) = self.try_pop() {
                return track;
            }
            self.notify.notified().await;
        }
    }

    /// Wait for the next track with an optional time limit.
    ///
    /// Returns `None` if the limit expires; a limit of `None` waits
    /// indefinitely.
    pub async fn pop_timeout(&self, limit: Option<Duration>) -> Option<Box<dyn Track>> {
        match limit {
            None => Some(self.pop().await),
            Some(limit) => tokio::time::timeout(limit, self.pop()).await.ok(),
        }
    }
}
