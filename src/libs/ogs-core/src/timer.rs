//! One-shot timer manager
//!
//! Cancellable deferred actions keyed by a numeric timer id. The owner polls
//! `process_expired` from its event loop and dispatches the returned entries.
//! Id `TIMER_INACTIVE_ID` is never handed out, so callers can store it as the
//! "no timer armed" sentinel.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Sentinel id for a timer that is not armed
pub const TIMER_INACTIVE_ID: u64 = 0;

/// A one-shot timer
#[derive(Debug, Clone)]
pub struct TimerEntry<T: Clone + fmt::Debug> {
    pub id: u64,
    pub timer_type: T,
    pub expires_at: Instant,
    pub duration: Duration,
    /// Context handed back on expiry (UE id, association id, ...)
    pub data: u64,
}

impl<T: Clone + fmt::Debug> TimerEntry<T> {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Time left relative to `now`
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// One-shot timer manager
pub struct TimerMgr<T: Clone + fmt::Debug + Send + Sync + 'static> {
    timers: RwLock<HashMap<u64, TimerEntry<T>>>,
    next_id: AtomicU64,
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> TimerMgr<T> {
    pub fn new() -> Self {
        Self {
            timers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(TIMER_INACTIVE_ID + 1),
        }
    }

    /// Arm a timer firing `duration` from now
    pub fn start(&self, timer_type: T, duration: Duration, data: u64) -> u64 {
        self.start_at(Instant::now(), timer_type, duration, data)
    }

    /// Arm a timer firing `duration` after `now`
    pub fn start_at(&self, now: Instant, timer_type: T, duration: Duration, data: u64) -> u64 {
        let mut id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if id == TIMER_INACTIVE_ID {
            id = self.next_id.fetch_add(1, Ordering::SeqCst);
        }
        let entry = TimerEntry {
            id,
            timer_type: timer_type.clone(),
            expires_at: now + duration,
            duration,
            data,
        };
        if let Ok(mut timers) = self.timers.write() {
            timers.insert(id, entry);
        }
        log::debug!("Timer started: id={id} type={timer_type:?} duration={duration:?} data={data}");
        id
    }

    /// Disarm a timer. Returns false for unknown or inactive ids.
    pub fn cancel(&self, id: u64) -> bool {
        if id == TIMER_INACTIVE_ID {
            return false;
        }
        match self.timers.write() {
            Ok(mut timers) => match timers.remove(&id) {
                Some(entry) => {
                    log::debug!("Timer cancelled: id={} type={:?}", id, entry.timer_type);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Remove and return every timer expired at `now`, earliest first
    pub fn process_expired_at(&self, now: Instant) -> Vec<TimerEntry<T>> {
        let mut expired = Vec::new();
        if let Ok(mut timers) = self.timers.write() {
            let ids: Vec<u64> = timers
                .values()
                .filter(|e| e.is_expired_at(now))
                .map(|e| e.id)
                .collect();
            for id in ids {
                if let Some(entry) = timers.remove(&id) {
                    expired.push(entry);
                }
            }
        }
        expired.sort_by_key(|e| (e.expires_at, e.id));
        expired
    }

    pub fn process_expired(&self) -> Vec<TimerEntry<T>> {
        self.process_expired_at(Instant::now())
    }

    /// Time until the earliest timer fires, `None` when idle
    pub fn next_expiration_at(&self, now: Instant) -> Option<Duration> {
        self.timers
            .read()
            .ok()?
            .values()
            .map(|e| e.remaining_at(now))
            .min()
    }

    pub fn is_active(&self, id: u64) -> bool {
        self.timers
            .read()
            .map(|t| t.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn get(&self, id: u64) -> Option<TimerEntry<T>> {
        self.timers.read().ok()?.get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.timers.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut timers) = self.timers.write() {
            timers.clear();
        }
    }
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> Default for TimerMgr<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> fmt::Debug for TimerMgr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerMgr").field("armed", &self.count()).finish()
    }
}
