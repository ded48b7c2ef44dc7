//! Sliding-window rate limiter keyed by user identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Admits at most `max_events` events per identity within the trailing
/// `window`. Denied events are not recorded, so a flood does not extend
/// its own penalty.
///
/// Each identity owns its own lock; the outer map lock is only taken to
/// find or create the slot, so unrelated identities never serialize on
/// each other's windows.
pub struct RateLimiter {
    max_events: usize,
    window: Duration,
    windows: RwLock<HashMap<i64, Arc<Mutex<Vec<Instant>>>>>,
}

impl RateLimiter {
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            max_events,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Decide whether the next event from `user_id` at `now` is admitted.
    /// Trims stale timestamps on every call.
    pub fn admit(&self, user_id: i64, now: Instant) -> bool {
        let slot = {
            let windows = self.windows.read().expect("rate window map poisoned");
            windows.get(&user_id).cloned()
        };
        let slot = match slot {
            Some(slot) => slot,
            None => {
                let mut windows = self.windows.write().expect("rate window map poisoned");
                // Evict identities with no in-window events while the
                // write lock is held anyway, so the map does not grow
                // one slot per identity ever seen.
                windows.retain(|_, slot| {
                    let stamps = slot.lock().expect("rate window poisoned");
                    stamps.iter().any(|t| now.duration_since(*t) < self.window)
                });
                windows
                    .entry(user_id)
                    .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
                    .clone()
            }
        };

        let mut stamps = slot.lock().expect("rate window poisoned");
        stamps.retain(|t| now.duration_since(*t) < self.window);
        if stamps.len() >= self.max_events {
            debug!("Rate limit hit for user {user_id}");
            return false;
        }
        stamps.push(now);
        true
    }

    #[cfg(test)]
    fn tracked_identities(&self) -> usize {
        self.windows.read().expect("rate window map poisoned").len()
    }
}
