//! # tempera-types
//!
//! Shared type definitions for the Tempera controller workspace.
//! Everything here is plain data: identifiers, wire messages, patterns,
//! event payloads and read-only state snapshots. No I/O happens in this crate.

mod command;
mod event;
mod message;
mod pattern;
mod state;

pub use command::{EmitterCommand, EmitterEvent, GrainParams};
pub use event::SequencerEvent;
pub use message::{MessageKind, WireMessage, CLOCK, START, STOP};
pub use pattern::{deserialize_flags, BankPattern, LinearPattern, MutePattern};
pub use state::{BankState, BankedState, LinearState, RunState};

/// Number of emitters on the device.
pub const EMITTER_COUNT: u8 = 4;

/// Identifier for one of the device's emitters (1-based).
///
/// Construction does not range-check; the control layer rejects ids outside
/// `1..=EMITTER_COUNT` at its API boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct EmitterId(u8);

impl EmitterId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }
    pub fn get(self) -> u8 {
        self.0
    }

    /// All emitter ids in ascending order.
    pub fn all() -> impl Iterator<Item = EmitterId> {
        (1..=EMITTER_COUNT).map(EmitterId)
    }

    pub fn is_valid(self) -> bool {
        (1..=EMITTER_COUNT).contains(&self.0)
    }
}

impl std::fmt::Display for EmitterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a bank (a grid column / track), 1-based.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct BankId(u8);

impl BankId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }
    pub fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for BankId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_ids_are_one_based() {
        let ids: Vec<u8> = EmitterId::all().map(EmitterId::get).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(!EmitterId::new(0).is_valid());
        assert!(!EmitterId::new(5).is_valid());
    }

    #[test]
    fn ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&BankId::new(3)).unwrap(), "3");
        let id: EmitterId = serde_json::from_str("2").unwrap();
        assert_eq!(id, EmitterId::new(2));
    }
}
