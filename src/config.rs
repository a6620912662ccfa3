//! Attach-time configuration.
//!
//! Which group a registration targets is an explicit tagged variant rather
//! than a dynamic field-presence check: [`Target::NewGroup`] binds a fresh
//! group to an event source, [`Target::JoinGroup`] appends to a live one.
//! Optional fields have documented defaults (`once` defaults to `false`).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ValidationError;
use crate::mux::GroupId;
use crate::source::EventSource;

/// Zero-argument notification callback.
///
/// Invoked once per flush with no arguments and no implicit context beyond
/// what it closed over at registration time.
pub type DoneCallback = Arc<dyn Fn() + Send + Sync>;

/// Which group a registration targets.
pub enum Target {
    /// Create a fresh group bound to `source`/`event_name`, debounced by
    /// `timeout`. Exactly one underlying subscription is created.
    NewGroup {
        /// The event source to subscribe on.
        source: Arc<dyn EventSource>,
        /// Name of the raw event to debounce.
        event_name: String,
        /// Quiet period that must elapse after the last raw event before
        /// subscribers are notified. Must be non-zero.
        timeout: Duration,
    },

    /// Join the live group identified by `key`. Never creates a group and
    /// never touches the underlying subscription.
    JoinGroup {
        /// Id returned by an earlier `attach`.
        key: GroupId,
    },
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewGroup {
                event_name,
                timeout,
                ..
            } => f
                .debug_struct("NewGroup")
                .field("event_name", event_name)
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            Self::JoinGroup { key } => {
                f.debug_struct("JoinGroup").field("key", key).finish()
            }
        }
    }
}

/// A single registration request.
pub struct AttachRequest {
    /// Group selection.
    pub target: Target,
    /// Callback invoked on each flush.
    pub done: DoneCallback,
    /// Remove the subscriber after its first invocation. Defaults to `false`.
    pub once: bool,
}

impl AttachRequest {
    /// Request a fresh group on `source` for `event_name`, debounced by
    /// `timeout`.
    pub fn new_group(
        source: Arc<dyn EventSource>,
        event_name: impl Into<String>,
        timeout: Duration,
        done: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            target: Target::NewGroup {
                source,
                event_name: event_name.into(),
                timeout,
            },
            done: Arc::new(done),
            once: false,
        }
    }

    /// Request to join the live group identified by `key`.
    pub fn join(key: GroupId, done: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            target: Target::JoinGroup { key },
            done: Arc::new(done),
            once: false,
        }
    }

    /// Set the one-shot flag.
    #[must_use]
    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Fail-fast input validation.
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if let Target::NewGroup {
            event_name,
            timeout,
            ..
        } = &self.target
        {
            if timeout.is_zero() {
                return Err(ValidationError::ZeroTimeout);
            }
            if event_name.trim().is_empty() {
                return Err(ValidationError::EmptyEventName);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AttachRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachRequest")
            .field("target", &self.target)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LocalSource;

    fn local() -> Arc<dyn EventSource> {
        Arc::new(LocalSource::new())
    }

    #[test]
    fn once_defaults_to_false() {
        let request = AttachRequest::new_group(local(), "tick", Duration::from_millis(10), || {});
        assert!(!request.once);

        let request = request.once(true);
        assert!(request.once);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let request = AttachRequest::new_group(local(), "tick", Duration::ZERO, || {});
        assert_eq!(request.validate(), Err(ValidationError::ZeroTimeout));
    }

    #[test]
    fn empty_event_name_is_rejected() {
        let request = AttachRequest::new_group(local(), "  ", Duration::from_millis(10), || {});
        assert_eq!(request.validate(), Err(ValidationError::EmptyEventName));
    }

    #[test]
    fn join_requests_skip_new_group_validation() {
        let request = AttachRequest::join(GroupId::from_raw(3), || {});
        assert_eq!(request.validate(), Ok(()));
    }
}
