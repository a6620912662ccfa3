//! Timer facility seam.
//!
//! Debounce needs one primitive: run a callback once, no sooner than a given
//! delay from now. No cancel primitive is required; the dispatcher discards
//! superseded flushes by generation comparison, so a late callback is a
//! guaranteed no-op.
//!
//! Two drivers are provided: [`ThreadTimer`] runs against real time on a
//! dedicated worker thread, [`ManualTimer`] runs against a virtual clock and
//! exists for deterministic tests and simulations.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::trace;

/// Boxed deferred callback.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Fire-and-forget delayed execution.
pub trait TimerDriver: Send + Sync {
    /// Run `callback` once, no sooner than `delay` from now.
    ///
    /// Callbacks scheduled with equal deadlines fire in scheduling order.
    fn schedule_after(&self, delay: Duration, callback: TimerCallback);
}

/// Max queued schedule requests before `schedule_after` applies backpressure.
const TIMER_QUEUE_CAPACITY: usize = 1024;

struct Entry<T> {
    deadline: T,
    seq: u64,
    callback: TimerCallback,
}

impl<T: Ord> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T: Ord> Eq for Entry<T> {}

impl<T: Ord> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Real-time timer driver backed by a dedicated worker thread.
///
/// Schedule requests are queued over a bounded channel; the worker keeps a
/// min-heap of deadlines and fires due callbacks in deadline order. Dropping
/// the driver closes the channel; the worker sleeps out any remaining
/// deadlines and then exits.
pub struct ThreadTimer {
    tx: Sender<Entry<Instant>>,
    seq: AtomicU64,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadTimer {
    /// Spawn the worker thread and return the driver handle.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded::<Entry<Instant>>(TIMER_QUEUE_CAPACITY);

        let join = thread::Builder::new()
            .name("quiesce-timer".to_string())
            .spawn(move || worker_loop(&rx))
            .expect("failed to spawn quiesce timer worker");

        Self {
            tx,
            seq: AtomicU64::new(0),
            join: Mutex::new(Some(join)),
        }
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerDriver for ThreadTimer {
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) {
        let entry = Entry {
            deadline: Instant::now() + delay,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            callback,
        };

        // A closed channel means the worker is gone and the process is
        // shutting down; the callback is dropped unfired.
        if self.tx.send(entry).is_err() {
            trace!("timer worker gone, dropping scheduled callback");
        }
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        // Close the channel so the worker can drain pending deadlines and exit.
        let (dummy_tx, _) = bounded::<Entry<Instant>>(1);
        drop(std::mem::replace(&mut self.tx, dummy_tx));

        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                // Detach rather than join: remaining deadlines may be far in
                // the future, and late callbacks no-op once their targets are
                // gone.
                drop(handle);
            }
        }
    }
}

impl std::fmt::Debug for ThreadTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTimer")
            .field("scheduled", &self.seq.load(Ordering::Relaxed))
            .finish()
    }
}

fn worker_loop(rx: &Receiver<Entry<Instant>>) {
    let mut pending: BinaryHeap<Reverse<Entry<Instant>>> = BinaryHeap::new();
    let mut disconnected = false;

    loop {
        let now = Instant::now();
        while pending
            .peek()
            .is_some_and(|Reverse(entry)| entry.deadline <= now)
        {
            if let Some(Reverse(entry)) = pending.pop() {
                (entry.callback)();
            }
        }

        if disconnected {
            let Some(Reverse(next)) = pending.peek() else {
                break;
            };
            thread::sleep(next.deadline.saturating_duration_since(Instant::now()));
            continue;
        }

        let received = if let Some(Reverse(next)) = pending.peek() {
            let wait = next.deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok(entry) => Some(entry),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    disconnected = true;
                    None
                }
            }
        } else {
            match rx.recv() {
                Ok(entry) => Some(entry),
                Err(_) => {
                    disconnected = true;
                    None
                }
            }
        };

        if let Some(entry) = received {
            pending.push(Reverse(entry));
        }
    }
}

/// Virtual-clock timer driver.
///
/// Time only moves when [`Self::advance`] is called, which makes every
/// debounce timing scenario exactly reproducible. Intended for tests and
/// embedded simulations.
#[derive(Default)]
pub struct ManualTimer {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    pending: BinaryHeap<Reverse<Entry<Duration>>>,
}

impl ManualTimer {
    /// Creates a timer with the virtual clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().map_or(Duration::ZERO, |state| state.now)
    }

    /// Number of scheduled callbacks that have not fired yet.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().map_or(0, |state| state.pending.len())
    }

    /// Advance the virtual clock by `delta`, firing every due callback in
    /// deadline order.
    ///
    /// Callbacks run with the internal lock released and observe the virtual
    /// time of their own deadline, so they may schedule further timers; any
    /// callback they schedule inside the advanced window fires within the
    /// same call.
    pub fn advance(&self, delta: Duration) {
        let target = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            state.now.saturating_add(delta)
        };

        loop {
            let due = {
                let Ok(mut state) = self.state.lock() else {
                    return;
                };
                let is_due = state
                    .pending
                    .peek()
                    .is_some_and(|Reverse(entry)| entry.deadline <= target);
                if is_due {
                    if let Some(Reverse(entry)) = state.pending.pop() {
                        state.now = state.now.max(entry.deadline);
                        Some(entry)
                    } else {
                        None
                    }
                } else {
                    state.now = target;
                    None
                }
            };

            match due {
                Some(entry) => (entry.callback)(),
                None => break,
            }
        }
    }
}

impl TimerDriver for ManualTimer {
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let deadline = state.now.saturating_add(delay);
        let seq = state.seq;
        state.seq += 1;
        state.pending.push(Reverse(Entry {
            deadline,
            seq,
            callback,
        }));
    }
}

impl std::fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTimer")
            .field("now", &self.now())
            .field("pending", &self.pending_count())
            .finish()
    }
}
