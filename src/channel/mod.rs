//! Channel-level protocol rules.
//!
//! A connection multiplexes numbered channels; each channel runs its own
//! synchronous call window, tracked by [`CallTracker`].

mod tracker;

pub use tracker::{CallTracker, Routing};
