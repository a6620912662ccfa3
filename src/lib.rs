//! # Quiesce - Debounced Event Subscription Multiplexer
//!
//! Quiesce lets many independent callers be notified when an event source
//! stabilizes: fires and then goes quiet for a configured interval. All
//! subscribers of a group share a single underlying subscription and receive
//! exactly one coalesced notification per quiet period.
//!
//! ## Core Concepts
//!
//! - **Group**: the set of subscribers debounced together under one
//!   underlying event subscription
//! - **Debounce**: delay notification until a quiet period of the configured
//!   duration has elapsed since the last raw event
//! - **One-shot subscriber**: removed automatically after its first
//!   invocation
//! - **Staleness**: a scheduled flush is stale when a newer raw event has
//!   advanced the group's generation counter since the flush was armed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use quiesce::{AttachRequest, LocalSource, Multiplexer, ThreadTimer};
//!
//! let source = Arc::new(LocalSource::new());
//! let mux = Multiplexer::new(Arc::new(ThreadTimer::new()));
//!
//! // First registration creates the group and the single subscription.
//! let id = mux.attach(AttachRequest::new_group(
//!     source.clone(),
//!     "scroll",
//!     Duration::from_millis(100),
//!     || println!("scrolling settled"),
//! ))?;
//!
//! // Later registrations multiplex onto the same hookup.
//! mux.attach(AttachRequest::join(id, || println!("me too")).once(true))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod mux;
pub mod source;
pub mod timer;

// Re-export primary types at crate root for convenience
pub use config::{AttachRequest, DoneCallback, Target};
pub use error::{QuiesceError, QuiesceResult, ValidationError};
pub use mux::{GroupId, Multiplexer};
pub use source::{EventSource, LocalSource, RawHandler};
pub use timer::{ManualTimer, ThreadTimer, TimerCallback, TimerDriver};
