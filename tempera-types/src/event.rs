//! Sequencer control events, tagged by `action`.

use serde::{Deserialize, Serialize};

use crate::pattern::deserialize_flags;
use crate::{BankId, BankPattern, LinearPattern};

/// External control of a running (or idle) sequencer.
///
/// Bank-addressed events accept `column` as an alias of `bank`, which is how
/// the device labels its banks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SequencerEvent {
    SetPattern {
        pattern: LinearPattern,
    },
    SetColumnPattern {
        #[serde(alias = "column")]
        bank: BankId,
        pattern: BankPattern,
    },
    Clear,
    ClearColumn {
        #[serde(alias = "column")]
        bank: BankId,
    },
    MuteColumn {
        #[serde(alias = "column")]
        bank: BankId,
    },
    UnmuteColumn {
        #[serde(alias = "column")]
        bank: BankId,
    },
    SetMutePattern {
        #[serde(alias = "column")]
        bank: BankId,
        #[serde(deserialize_with = "deserialize_flags")]
        pattern: Vec<bool>,
    },
    SetLoops {
        loops: u32,
    },
    Pause,
    Resume,
    Stop,
    Cleanup,
}

impl SequencerEvent {
    /// Every recognised `action` tag.
    pub const ACTIONS: &'static [&'static str] = &[
        "set_pattern",
        "set_column_pattern",
        "clear",
        "clear_column",
        "mute_column",
        "unmute_column",
        "set_mute_pattern",
        "set_loops",
        "pause",
        "resume",
        "stop",
        "cleanup",
    ];

    pub fn action(&self) -> &'static str {
        match self {
            SequencerEvent::SetPattern { .. } => "set_pattern",
            SequencerEvent::SetColumnPattern { .. } => "set_column_pattern",
            SequencerEvent::Clear => "clear",
            SequencerEvent::ClearColumn { .. } => "clear_column",
            SequencerEvent::MuteColumn { .. } => "mute_column",
            SequencerEvent::UnmuteColumn { .. } => "unmute_column",
            SequencerEvent::SetMutePattern { .. } => "set_mute_pattern",
            SequencerEvent::SetLoops { .. } => "set_loops",
            SequencerEvent::Pause => "pause",
            SequencerEvent::Resume => "resume",
            SequencerEvent::Stop => "stop",
            SequencerEvent::Cleanup => "cleanup",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmitterId;

    #[test]
    fn column_alias_is_accepted() {
        let event: SequencerEvent = serde_json::from_str(
            r#"{"action": "set_column_pattern", "column": 1, "pattern": {"1": 1, "3": 1}}"#,
        )
        .unwrap();
        match event {
            SequencerEvent::SetColumnPattern { bank, pattern } => {
                assert_eq!(bank, BankId::new(1));
                assert_eq!(pattern.get(&3), Some(&EmitterId::new(1)));
            }
            other => panic!("Expected SetColumnPattern, got {:?}", other),
        }
    }

    #[test]
    fn unit_actions_round_trip_their_tag() {
        let event: SequencerEvent = serde_json::from_str(r#"{"action": "pause"}"#).unwrap();
        assert_eq!(event, SequencerEvent::Pause);
        assert!(SequencerEvent::ACTIONS.contains(&event.action()));
    }

    #[test]
    fn mute_pattern_event_takes_integer_flags() {
        let event: SequencerEvent =
            serde_json::from_str(r#"{"action": "set_mute_pattern", "bank": 2, "pattern": [1, 0]}"#)
                .unwrap();
        assert_eq!(
            event,
            SequencerEvent::SetMutePattern {
                bank: BankId::new(2),
                pattern: vec![true, false],
            }
        );
    }
}
