//! Protocol modules.
//!
//! - `envelope`: the routed message record and its JSON wire form.
//! - `classification`: the 32-bit flag set carried by every envelope.
//! - `group`: lenient decoder for group-action bodies.
//!
//! All decoders are panic-free: malformed input is reported as `HiveError`.

pub mod classification;
pub mod envelope;
pub mod group;

pub use classification::Classification;
pub use envelope::Envelope;
pub use group::{GroupAction, GroupActionKind};
