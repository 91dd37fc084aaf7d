//! Envelope classification bitmask.
//!
//! A `Classification` is a *set* of flags, not an exclusive enum: one envelope
//! may carry several bits and the dispatcher reacts to each of them in
//! ascending bit order. Bits 7..=9 are internal and are only ever set by the
//! gateway itself (transport lifecycle and transient re-queueing).

use std::fmt;

use serde::{Deserialize, Serialize};

/// 32-bit set of classification flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Classification(u32);

impl Classification {
    /// Reserved.
    pub const IDENTITY: u32 = 0;
    /// Reserved.
    pub const AUTHENTICATE: u32 = 1;
    /// Reserved.
    pub const HEARTBEAT: u32 = 2;
    /// Reserved.
    pub const RECEIPT: u32 = 3;
    /// Deliverable-when-offline hint.
    pub const TRANSIENT: u32 = 4;
    /// Body carries a group action.
    pub const GROUP: u32 = 5;
    /// System event; no acknowledgement is sent.
    pub const EVENT: u32 = 6;
    /// Internal: sender came online.
    pub const ONLINE: u32 = 7;
    /// Internal: sender went offline.
    pub const OFFLINE: u32 = 8;
    /// Internal: envelope already passed through the transient queue.
    pub const QUEUED: u32 = 9;
    /// Upper bound of the classification scan.
    pub const ERROR: u32 = 31;

    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Set containing exactly the given bit positions.
    pub fn of(positions: &[u32]) -> Self {
        positions.iter().fold(Self::empty(), |acc, &p| acc.with(p))
    }

    /// Whether bit `pos` is set. Positions above 31 are never set.
    pub fn contains(self, pos: u32) -> bool {
        pos <= Self::ERROR && self.0 & (1 << pos) != 0
    }

    /// Copy of this set with bit `pos` added.
    #[must_use]
    pub fn with(self, pos: u32) -> Self {
        if pos > Self::ERROR {
            return self;
        }
        Self(self.0 | (1 << pos))
    }

    /// Copy of this set with bit `pos` cleared.
    #[must_use]
    pub fn without(self, pos: u32) -> Self {
        if pos > Self::ERROR {
            return self;
        }
        Self(self.0 & !(1 << pos))
    }

    /// Copy with the gateway-internal bits (ONLINE, OFFLINE, QUEUED) cleared.
    #[must_use]
    pub fn external(self) -> Self {
        self.without(Self::ONLINE).without(Self::OFFLINE).without(Self::QUEUED)
    }

    /// Set bit positions in ascending order (0..=31).
    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..=Self::ERROR).filter(move |&pos| self.contains(pos))
    }

    /// EVENT, OFFLINE and QUEUED envelopes are processed even when the sender
    /// is not (or no longer) present in the directory.
    pub fn bypasses_sender_check(self) -> bool {
        self.contains(Self::EVENT) || self.contains(Self::OFFLINE) || self.contains(Self::QUEUED)
    }
}

impl From<u32> for Classification {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iter_is_ascending_and_complete() {
        let c = Classification::of(&[Classification::EVENT, Classification::TRANSIENT, Classification::ERROR]);
        let bits: Vec<u32> = c.iter().collect();
        assert_eq!(bits, vec![4, 6, 31]);
    }

    #[test]
    fn out_of_range_bits_are_ignored() {
        let c = Classification::empty().with(32);
        assert_eq!(c.bits(), 0);
        assert!(!c.contains(40));
    }

    #[test]
    fn external_strips_internal_bits() {
        let c = Classification::of(&[Classification::GROUP, Classification::ONLINE, Classification::QUEUED]);
        assert_eq!(c.external(), Classification::of(&[Classification::GROUP]));
    }

    #[test]
    fn sender_check_bypass() {
        assert!(Classification::of(&[Classification::QUEUED]).bypasses_sender_check());
        assert!(Classification::of(&[Classification::OFFLINE]).bypasses_sender_check());
        assert!(!Classification::of(&[Classification::ONLINE, Classification::GROUP]).bypasses_sender_check());
    }
}
