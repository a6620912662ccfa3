//! Group registry: id allocation and subscriber bookkeeping.
//!
//! The registry is an explicit owned mapping held by a [`Multiplexer`]
//! instance, not a process-wide singleton; construction and teardown are
//! under caller control.
//!
//! [`Multiplexer`]: super::Multiplexer

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DoneCallback;
use crate::source::{EventSource, RawHandler};

/// Unique identifier for a debounce group.
///
/// Auto-allocated ids come from a monotonically increasing per-registry
/// counter and are never reused, so an id observed once always refers to the
/// same logical group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u64);

impl GroupId {
    /// Wrap a raw id value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-group subscriber identity.
///
/// Gives one-shot removal a stable key, so removal applied after invocation
/// cannot disturb subscribers appended to the sequence mid-flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriberId(u64);

/// One registered listener: a callback plus its one-shot flag.
#[derive(Clone)]
pub(crate) struct Subscriber {
    pub id: SubscriberId,
    pub done: DoneCallback,
    pub once: bool,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

/// One debounce group: the ordered subscriber sequence plus everything
/// needed to drive and eventually detach the underlying subscription.
pub(crate) struct Group {
    pub source: Arc<dyn EventSource>,
    pub event_name: String,
    pub timeout: Duration,
    /// The installed raw handler; kept for identity-based unsubscription.
    pub handler: RawHandler,
    /// Incremented on every raw event; flushes scheduled under an older
    /// value are stale.
    pub generation: u64,
    next_subscriber_id: u64,
    pub subscribers: Vec<Subscriber>,
}

impl Group {
    pub fn new(
        source: Arc<dyn EventSource>,
        event_name: String,
        timeout: Duration,
        handler: RawHandler,
    ) -> Self {
        Self {
            source,
            event_name,
            timeout,
            handler,
            generation: 0,
            next_subscriber_id: 0,
            subscribers: Vec::new(),
        }
    }

    /// Append a subscriber; dispatch order equals registration order.
    pub fn add_subscriber(&mut self, done: DoneCallback, once: bool) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber_id);
        self.next_subscriber_id += 1;
        self.subscribers.push(Subscriber { id, done, once });
        id
    }

    /// Record a raw event; returns the new generation value.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Remove exactly the given subscribers, preserving the relative order
    /// of everything retained.
    pub fn remove_subscribers(&mut self, fired: &[SubscriberId]) {
        self.subscribers.retain(|s| !fired.contains(&s.id));
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("event_name", &self.event_name)
            .field("timeout", &self.timeout)
            .field("generation", &self.generation)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

/// Owned mapping from group id to group.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    next_group_id: u64,
    groups: HashMap<GroupId, Group>,
}

impl Registry {
    /// Allocate a fresh id. Ids are monotonic and never reused.
    pub fn allocate_id(&mut self) -> GroupId {
        let id = GroupId(self.next_group_id);
        self.next_group_id += 1;
        id
    }

    pub fn insert(&mut self, id: GroupId, group: Group) {
        self.groups.insert(id, group);
    }

    pub fn get(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    pub fn remove(&mut self, id: GroupId) -> Option<Group> {
        self.groups.remove(&id)
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Remove and return every group; used for final teardown.
    pub fn drain(&mut self) -> Vec<Group> {
        self.groups.drain().map(|(_, group)| group).collect()
    }
}
