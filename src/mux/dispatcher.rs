//! Debounce dispatcher and the public multiplexer service.
//!
//! This module owns group registrations and converts each group's stream of
//! raw events into coalesced notifications: every raw event advances the
//! group's generation counter and arms a timer; a timer that fires under an
//! outdated generation is stale and does nothing, so only the flush armed by
//! the most recent raw event in a burst executes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, trace};

use crate::config::{AttachRequest, Target};
use crate::error::{QuiesceError, QuiesceResult};
use crate::source::RawHandler;
use crate::timer::TimerDriver;

use super::registry::{Group, GroupId, Registry, SubscriberId};

/// Multiplexer service: debounces and groups event subscriptions.
///
/// One instance owns one registry. Each group holds exactly one underlying
/// subscription on its event source no matter how many subscribers join it,
/// and every subscriber in a group is notified once per quiet period.
///
/// Subscriber callbacks run without internal locks held, so a callback may
/// re-enter [`attach`](Self::attach) and [`detach`](Self::detach). A
/// panicking callback aborts the remainder of its flush; panics are not
/// caught.
pub struct Multiplexer {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Mutex<Registry>,
    timer: Arc<dyn TimerDriver>,
    flushes: AtomicU64,
    stale_flushes: AtomicU64,
}

impl Multiplexer {
    /// Create a multiplexer backed by the given timer driver.
    #[must_use]
    pub fn new(timer: Arc<dyn TimerDriver>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                timer,
                flushes: AtomicU64::new(0),
                stale_flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Register interest in a debounced event.
    ///
    /// For [`Target::NewGroup`] this allocates a fresh id, creates the group
    /// with the caller as its first subscriber and installs the single
    /// underlying subscription. For [`Target::JoinGroup`] it appends the
    /// caller to the live group named by the key.
    ///
    /// # Errors
    ///
    /// Returns [`QuiesceError::Validation`] when a new-group request carries
    /// a zero timeout or an empty event name, and
    /// [`QuiesceError::UnknownGroup`] when a join targets an id with no live
    /// group.
    pub fn attach(&self, request: AttachRequest) -> QuiesceResult<GroupId> {
        request.validate()?;
        let AttachRequest { target, done, once } = request;

        match target {
            Target::JoinGroup { key } => {
                let mut registry = self.lock_registry("attach.join")?;
                let group = registry
                    .get_mut(key)
                    .ok_or(QuiesceError::UnknownGroup { id: key })?;
                group.add_subscriber(done, once);
                trace!(group = %key, once, "subscriber joined group");
                Ok(key)
            }
            Target::NewGroup {
                source,
                event_name,
                timeout,
            } => {
                let (id, handler) = {
                    let mut registry = self.lock_registry("attach.new")?;
                    let id = registry.allocate_id();
                    let handler = raw_handler(Arc::downgrade(&self.shared), id);
                    let mut group = Group::new(
                        Arc::clone(&source),
                        event_name.clone(),
                        timeout,
                        Arc::clone(&handler),
                    );
                    group.add_subscriber(done, once);
                    registry.insert(id, group);
                    (id, handler)
                };

                // Subscribe with the lock released: the group must already be
                // visible because a source may deliver the first raw event
                // synchronously from inside `subscribe`.
                source.subscribe(&event_name, handler);
                debug!(group = %id, event = %event_name, ?timeout, once, "group created");
                Ok(id)
            }
        }
    }

    /// Remove a group and detach its underlying subscription.
    ///
    /// # Errors
    ///
    /// Returns [`QuiesceError::UnknownGroup`] when no live group has this id,
    /// including ids that were already detached or torn down after their last
    /// one-shot subscriber fired. Double-detach is a caller defect and fails.
    pub fn detach(&self, id: GroupId) -> QuiesceResult<()> {
        let group = {
            let mut registry = self.lock_registry("detach")?;
            registry
                .remove(id)
                .ok_or(QuiesceError::UnknownGroup { id })?
        };

        group.source.unsubscribe(&group.event_name, &group.handler);
        debug!(group = %id, event = %group.event_name, "group detached");
        Ok(())
    }

    /// Number of live groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.shared.registry.lock().map_or(0, |registry| registry.len())
    }

    /// Whether a live group exists with this id.
    #[must_use]
    pub fn contains(&self, id: GroupId) -> bool {
        self.shared
            .registry
            .lock()
            .map_or(false, |registry| registry.contains(id))
    }

    /// Number of subscribers in a group, or `None` if the group is gone.
    #[must_use]
    pub fn subscriber_count(&self, id: GroupId) -> Option<usize> {
        self.shared
            .registry
            .lock()
            .ok()
            .and_then(|registry| registry.get(id).map(|group| group.subscribers.len()))
    }

    /// Total flushes executed across all groups.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.shared.flushes.load(Ordering::Relaxed)
    }

    /// Total flushes discarded because a newer raw event superseded them.
    #[must_use]
    pub fn stale_flushes(&self) -> u64 {
        self.shared.stale_flushes.load(Ordering::Relaxed)
    }

    fn lock_registry(&self, context: &'static str) -> QuiesceResult<MutexGuard<'_, Registry>> {
        self.shared
            .registry
            .lock()
            .map_err(|_| QuiesceError::internal(format!("poisoned registry lock: {context}")))
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        // Detach every remaining hookup so sources do not retain handlers
        // for a registry that no longer exists.
        let groups = {
            let Ok(mut registry) = self.shared.registry.lock() else {
                return;
            };
            registry.drain()
        };

        for group in groups {
            group.source.unsubscribe(&group.event_name, &group.handler);
        }
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("groups", &self.group_count())
            .field("flushes", &self.flushes())
            .field("stale_flushes", &self.stale_flushes())
            .finish()
    }
}

/// Build the single raw handler installed on a group's event source.
///
/// The handler holds a weak reference to the service; raw events delivered
/// after the multiplexer is gone are ignored.
fn raw_handler(shared: Weak<Shared>, id: GroupId) -> RawHandler {
    Arc::new(move || {
        if let Some(shared) = shared.upgrade() {
            Shared::on_raw_event(&shared, id);
        }
    })
}

impl Shared {
    /// A raw event arrived: supersede any pending flush and arm a new one.
    ///
    /// The previous timer is not cancelled; it becomes stale through the
    /// generation comparison and its firing is a guaranteed no-op.
    fn on_raw_event(shared: &Arc<Self>, id: GroupId) {
        let (generation, timeout) = {
            let Ok(mut registry) = shared.registry.lock() else {
                return;
            };
            // The source may still deliver events that raced group teardown.
            let Some(group) = registry.get_mut(id) else {
                trace!(group = %id, "raw event for torn-down group ignored");
                return;
            };
            (group.bump_generation(), group.timeout)
        };

        trace!(group = %id, generation, "raw event, arming flush");

        let weak = Arc::downgrade(shared);
        shared.timer.schedule_after(
            timeout,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.flush(id, generation);
                }
            }),
        );
    }

    /// A timer fired: execute the flush unless it was superseded.
    fn flush(&self, id: GroupId, generation: u64) {
        // The subscriber sequence is read now, at flush time, so listeners
        // added while the group was dormant take part automatically.
        let batch = {
            let Ok(registry) = self.registry.lock() else {
                return;
            };
            let Some(group) = registry.get(id) else {
                return;
            };
            if group.generation != generation {
                self.stale_flushes.fetch_add(1, Ordering::Relaxed);
                trace!(
                    group = %id,
                    armed = generation,
                    current = group.generation,
                    "stale flush skipped"
                );
                return;
            }
            group.subscribers.clone()
        };

        trace!(group = %id, subscribers = batch.len(), "flushing");

        // Lock released: callbacks may re-enter attach/detach. A panicking
        // callback aborts the remainder of this flush.
        for subscriber in &batch {
            (subscriber.done)();
        }
        self.flushes.fetch_add(1, Ordering::Relaxed);

        let fired_once: Vec<SubscriberId> = batch
            .iter()
            .filter(|s| s.once)
            .map(|s| s.id)
            .collect();

        // Re-read the group: callbacks may have joined, detached the group
        // outright, or new raw events may have arrived mid-flush. Invoked
        // one-shots are removed regardless; they already had their one call.
        let emptied = {
            let Ok(mut registry) = self.registry.lock() else {
                return;
            };
            let Some(group) = registry.get_mut(id) else {
                return;
            };
            group.remove_subscribers(&fired_once);
            if group.subscribers.is_empty() {
                registry.remove(id)
            } else {
                None
            }
        };

        if let Some(group) = emptied {
            debug!(group = %id, event = %group.event_name, "last subscriber removed, group torn down");
            group.source.unsubscribe(&group.event_name, &group.handler);
        }
    }
}
