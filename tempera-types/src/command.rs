//! Emitter control payloads.

use serde::{Deserialize, Serialize};

/// Grain parameters; `None` leaves a parameter untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrainParams {
    pub length_cell: Option<u8>,
    pub length_note: Option<u8>,
    pub density: Option<u8>,
    pub shape: Option<u8>,
    pub shape_attack: Option<u8>,
    pub pan: Option<u8>,
    pub tune_spread: Option<u8>,
}

/// One call on a single emitter, tagged by `method`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EmitterCommand {
    Volume { value: u8 },
    Grain(GrainParams),
    Octave { value: u8 },
    RelativePosition {
        #[serde(default)]
        x: Option<u8>,
        #[serde(default)]
        y: Option<u8>,
    },
    Spray {
        #[serde(default)]
        x: Option<u8>,
        #[serde(default)]
        y: Option<u8>,
    },
    ToneFilter {
        #[serde(default)]
        width: Option<u8>,
        #[serde(default)]
        center: Option<u8>,
    },
    EffectsSend { value: u8 },
    SetActive,
    PlaceInCell { column: u8, cell: u8 },
    RemoveFromCell { column: u8, cell: u8 },
    Activate,
    Deactivate,
}

/// An [`EmitterCommand`] addressed to an emitter number, as received from
/// external event sources: `{"emitter": 1, "method": "volume", "value": 64}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterEvent {
    pub emitter: u8,
    #[serde(flatten)]
    pub command: EmitterCommand,
}
