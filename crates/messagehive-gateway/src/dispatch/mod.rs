//! Dispatcher module exports.
//!
//! The dispatcher is the single consumer of the inbound envelope queue. It
//! classifies each envelope by its flag set, applies presence and group
//! mutations, acknowledges the sender, and routes the envelope to a user, to
//! every member of a group (by re-injection), or to the transient queue.
//!
//! Ordering: none across senders; within one sender, FIFO holds only until an
//! envelope is retried or fanned out, since those go to the back of the queue.

pub mod dispatcher;

pub use dispatcher::{DispatchConfig, Dispatcher};
