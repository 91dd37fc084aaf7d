//! MessageHive gateway library entry.
//!
//! Wires the presence directory, the dispatcher and its workers, group
//! persistence, auth adapters and the WebSocket transport into one hub. It is
//! consumed by the `messagehive` binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod auth;
pub mod cli;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod router;
pub mod store;
pub mod transport;
pub mod workers;
