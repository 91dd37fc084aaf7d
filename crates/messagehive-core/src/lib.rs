//! MessageHive core: transport-agnostic protocol primitives and error types.
//!
//! This crate defines the envelope record routed between users and groups,
//! the classification bitmask that drives the dispatcher, and the group-action
//! body codec. It carries no transport or runtime dependencies so it can be
//! reused by the gateway, tests, and client tooling alike.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `HiveError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{Result, HiveError};
pub use protocol::{Classification, Envelope, GroupAction, GroupActionKind};
