//! Background workers fed by the dispatcher.
//!
//! - `event`: reacts to user online/offline transitions.
//! - `transient`: parks envelopes whose recipient is offline.

pub mod event;
pub mod transient;

pub use event::{EventWorker, PresenceEvent, PresenceEventKind};
pub use transient::{MemoryTransientStore, TransientStore, TransientWorker};
