use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

/// A recurring timer callback. Fired once per elapsed period.
pub type TickFn = Box<dyn FnMut() + Send>;

/// Handle to a live recurring timer. Cancelling (or dropping) guarantees no
/// further fires begin; a fire already in progress runs to completion.
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancelled: Arc<AtomicBool>, on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancelled,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.do_cancel();
    }

    fn do_cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(f) = self.on_cancel.take() {
            f();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.do_cancel();
    }
}

/// Recurring-timer scheduling, injected so the scheduler runs without a host
/// event loop in tests. Timer handles cannot be paused, only cancelled and
/// recreated.
pub trait Timers: Send + Sync {
    fn repeating(&self, every: Duration, tick: TickFn) -> TimerHandle;
}

/// Production driver: one spawned task per timer, cancelled through a watch
/// channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimers;

impl Timers for TokioTimers {
    fn repeating(&self, every: Duration, mut tick: TickFn) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            // Start one full period out: setInterval semantics, no
            // immediate first fire.
            let start = tokio::time::Instant::now() + every;
            let mut interval = tokio::time::interval_at(start, every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if flag.load(Ordering::SeqCst) {
                            break;
                        }
                        tick();
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("timer task stopped");
        });

        TimerHandle::new(cancelled, move || {
            let _ = tx.send(true);
        })
    }
}

struct ManualEntry {
    every: Duration,
    next_due: Duration,
    tick: TickFn,
    cancelled: Arc<AtomicBool>,
}

struct ManualInner {
    now: Duration,
    entries: Vec<ManualEntry>,
}

/// Deterministic timer driver for tests: nothing fires until [`advance`] is
/// called, and due callbacks fire in schedule order on the caller's thread.
///
/// [`advance`]: ManualTimers::advance
pub struct ManualTimers {
    inner: Mutex<ManualInner>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ManualInner {
                now: Duration::ZERO,
                entries: Vec::new(),
            }),
        }
    }

    /// Move the virtual clock forward, firing every due callback. A timer
    /// whose period elapsed several times over fires once per period.
    pub fn advance(&self, by: Duration) {
        let target = {
            let mut inner = self.inner.lock().unwrap();
            inner.now += by;
            inner.now
        };

        loop {
            // Pull one due entry out and fire it with the registry unlocked,
            // so a tick can schedule or cancel timers without deadlocking.
            let due = {
                let mut inner = self.inner.lock().unwrap();
                inner
                    .entries
                    .retain(|e| !e.cancelled.load(Ordering::SeqCst));
                let idx = inner
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.next_due <= target)
                    .min_by_key(|(i, e)| (e.next_due, *i))
                    .map(|(i, _)| i);
                idx.map(|i| {
                    let mut entry = inner.entries.remove(i);
                    entry.next_due += entry.every;
                    (i, entry)
                })
            };

            let Some((idx, mut entry)) = due else {
                break;
            };
            if !entry.cancelled.load(Ordering::SeqCst) {
                (entry.tick)();
            }
            let mut inner = self.inner.lock().unwrap();
            let pos = idx.min(inner.entries.len());
            inner.entries.insert(pos, entry);
        }
    }

    /// Count of live (uncancelled) timers.
    pub fn live(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entries
            .retain(|e| !e.cancelled.load(Ordering::SeqCst));
        inner.entries.len()
    }
}

impl Default for ManualTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl Timers for ManualTimers {
    fn repeating(&self, every: Duration, tick: TickFn) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut inner = self.inner.lock().unwrap();
        let next_due = inner.now + every;
        inner.entries.push(ManualEntry {
            every,
            next_due,
            tick,
            cancelled: cancelled.clone(),
        });
        TimerHandle::new(cancelled, || {})
    }
}
