//! Sparse step patterns and cyclic mute schedules.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::EmitterId;

/// Step index (0-based, over the whole grid) to the emitter active on it.
/// Absent keys are silent steps.
pub type LinearPattern = BTreeMap<u16, EmitterId>;

/// Cell index within a bank (1-based) to the emitter active on it.
pub type BankPattern = BTreeMap<u8, EmitterId>;

/// Cyclic per-loop play/mute schedule for one bank. Never empty.
///
/// Loop `i` plays when `flags[i % flags.len()]` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MutePattern(Vec<bool>);

impl MutePattern {
    /// Returns `None` for an empty schedule.
    pub fn new(flags: Vec<bool>) -> Option<Self> {
        if flags.is_empty() {
            None
        } else {
            Some(Self(flags))
        }
    }

    pub fn always() -> Self {
        Self(vec![true])
    }

    pub fn never() -> Self {
        Self(vec![false])
    }

    pub fn plays_on(&self, loop_index: u64) -> bool {
        self.0[(loop_index % self.0.len() as u64) as usize]
    }

    pub fn flags(&self) -> &[bool] {
        &self.0
    }
}

impl Default for MutePattern {
    fn default() -> Self {
        Self::always()
    }
}

impl<'de> Deserialize<'de> for MutePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flags = deserialize_flags(deserializer)?;
        MutePattern::new(flags)
            .ok_or_else(|| serde::de::Error::custom("mute pattern must not be empty"))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

/// Accepts `[true, false]` as well as `[1, 0]`; any non-zero integer plays.
pub fn deserialize_flags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<bool>, D::Error> {
    let raw = Vec::<Flag>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|f| match f {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mute_pattern_is_rejected() {
        assert!(MutePattern::new(Vec::new()).is_none());
        assert!(serde_json::from_str::<MutePattern>("[]").is_err());
    }

    #[test]
    fn mute_pattern_cycles_by_loop_index() {
        let pattern = MutePattern::new(vec![true, false]).unwrap();
        let plays: Vec<bool> = (0..5).map(|i| pattern.plays_on(i)).collect();
        assert_eq!(plays, vec![true, false, true, false, true]);
    }

    #[test]
    fn mute_pattern_accepts_integer_flags() {
        let pattern: MutePattern = serde_json::from_str("[0, 1, 2]").unwrap();
        assert_eq!(pattern.flags(), &[false, true, true]);
    }

    #[test]
    fn linear_pattern_reads_string_keys() {
        let pattern: LinearPattern = serde_json::from_str(r#"{"0": 1, "4": 2}"#).unwrap();
        assert_eq!(pattern.get(&4), Some(&EmitterId::new(2)));
    }
}
