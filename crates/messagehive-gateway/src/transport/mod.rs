//! Transport layer (WebSocket).
//!
//! Owns each user's delivery channel: registers it in the presence directory
//! on connect, feeds decoded envelopes into the inbound queue, and writes
//! everything the dispatcher delivers back to the socket.

pub mod codec;
pub mod ws;
