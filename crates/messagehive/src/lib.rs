//! Top-level facade crate for MessageHive.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use messagehive_core::*;
}

pub mod gateway {
    pub use messagehive_gateway::*;
}
