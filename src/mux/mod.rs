//! Debounce multiplexer subsystem.
//!
//! The registry owns group records and id allocation; the dispatcher turns
//! raw event streams into coalesced notifications. Both are driven through
//! one [`Multiplexer`] service instance.

/// Group dispatch and the public multiplexer service.
pub mod dispatcher;
/// Group storage and id allocation.
pub mod registry;

pub use dispatcher::Multiplexer;
pub use registry::GroupId;
