//! # Hooksmith Events
//!
//! The `Event` type shared between the dispatcher and the delivery
//! record it ends up embedded in. Deliberately small: this crate does not
//! own a bus, a store, or a schema registry — events are not persisted
//! independently of the deliveries that reference them.

mod event;

pub use event::Event;
