//! Message factory: pure encoders from validated parameter values to wire
//! messages, plus the sinks that carry them to the device.
//!
//! Every emitter owns a contiguous block of sixteen CC numbers; emitter `n`
//! is normally addressed on MIDI channel `n`. Global and track controls share
//! the configured global channel.

pub mod sink;

use tempera_types::{EmitterId, GrainParams, WireMessage, EMITTER_COUNT};

use crate::error::EncodeError;

pub const MODWHEEL: u8 = 1;
pub const ACTIVE_EMITTER: u8 = 14;
pub const PLACE_EMITTER_IN_CELL: u8 = 15;
pub const REMOVE_EMITTER_FROM_CELL: u8 = 16;

const EMITTER_CC_BASE: u8 = 20;
const EMITTER_CC_STRIDE: u8 = 16;

const MODULATOR_SIZE_BASE: u8 = 100;
const MODULATOR_COUNT: u8 = 10;
const TRACK_VOLUME_BASE: u8 = 110;
const TRACK_COUNT: u8 = 8;
const TRACK_RECORD_NOTE_BASE: u8 = 100;

/// Columns and cells on the device grid are both 1..=8.
pub const GRID_SIDE: u8 = 8;

const MAX_VALUE: u8 = 127;

fn check(param: &'static str, value: u8) -> Result<u8, EncodeError> {
    if value > MAX_VALUE {
        Err(EncodeError::out_of_range(param, value, 0, MAX_VALUE as i64))
    } else {
        Ok(value)
    }
}

fn check_between(param: &'static str, value: u8, min: u8, max: u8) -> Result<u8, EncodeError> {
    if value < min || value > max {
        Err(EncodeError::out_of_range(param, value, min as i64, max as i64))
    } else {
        Ok(value)
    }
}

/// Grid index sent with place/remove: `(column - 1) * 8 + (cell - 1)`.
pub fn cell_index(column: u8, cell: u8) -> Result<u8, EncodeError> {
    let column = check_between("column", column, 1, GRID_SIDE)?;
    let cell = check_between("cell", cell, 1, GRID_SIDE)?;
    Ok((column - 1) * GRID_SIDE + (cell - 1))
}

/// Per-emitter continuous parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmitterParam {
    Volume,
    GrainLengthCell,
    GrainLengthNote,
    GrainDensity,
    GrainShape,
    GrainShapeAttack,
    GrainPan,
    GrainTuneSpread,
    Octave,
    RelativeX,
    RelativeY,
    SprayX,
    SprayY,
    ToneFilterWidth,
    ToneFilterCenter,
    EffectsSend,
}

impl EmitterParam {
    pub const ALL: [EmitterParam; 16] = [
        EmitterParam::Volume,
        EmitterParam::GrainLengthCell,
        EmitterParam::GrainLengthNote,
        EmitterParam::GrainDensity,
        EmitterParam::GrainShape,
        EmitterParam::GrainShapeAttack,
        EmitterParam::GrainPan,
        EmitterParam::GrainTuneSpread,
        EmitterParam::Octave,
        EmitterParam::RelativeX,
        EmitterParam::RelativeY,
        EmitterParam::SprayX,
        EmitterParam::SprayY,
        EmitterParam::ToneFilterWidth,
        EmitterParam::ToneFilterCenter,
        EmitterParam::EffectsSend,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EmitterParam::Volume => "volume",
            EmitterParam::GrainLengthCell => "grain_length_cell",
            EmitterParam::GrainLengthNote => "grain_length_note",
            EmitterParam::GrainDensity => "grain_density",
            EmitterParam::GrainShape => "grain_shape",
            EmitterParam::GrainShapeAttack => "grain_shape_attack",
            EmitterParam::GrainPan => "grain_pan",
            EmitterParam::GrainTuneSpread => "grain_tune_spread",
            EmitterParam::Octave => "octave",
            EmitterParam::RelativeX => "relative_x",
            EmitterParam::RelativeY => "relative_y",
            EmitterParam::SprayX => "spray_x",
            EmitterParam::SprayY => "spray_y",
            EmitterParam::ToneFilterWidth => "tone_filter_width",
            EmitterParam::ToneFilterCenter => "tone_filter_center",
            EmitterParam::EffectsSend => "effects_send",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, EncodeError> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == name)
            .ok_or_else(|| EncodeError::UnknownParameter(name.to_string()))
    }

    fn offset(self) -> u8 {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0) as u8
    }

    /// CC number of this parameter for `emitter` (which must be valid).
    pub fn cc(self, emitter: EmitterId) -> u8 {
        EMITTER_CC_BASE + (emitter.get() - 1) * EMITTER_CC_STRIDE + self.offset()
    }
}

/// Encoder bound to one emitter and the MIDI channel it listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterEncoder {
    emitter: EmitterId,
    channel: u8,
}

impl EmitterEncoder {
    pub fn new(emitter: EmitterId, channel: u8) -> Result<Self, EncodeError> {
        check_between("emitter", emitter.get(), 1, EMITTER_COUNT)?;
        let channel = check_between("channel", channel, 1, 16)?;
        Ok(Self { emitter, channel })
    }

    pub fn emitter(&self) -> EmitterId {
        self.emitter
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn param(&self, param: EmitterParam, value: u8) -> Result<WireMessage, EncodeError> {
        let value = check(param.name(), value)?;
        Ok(WireMessage::control_change(self.channel, param.cc(self.emitter), value))
    }

    /// Encode a parameter looked up by its name (`"volume"`, `"spray_x"`, ...).
    pub fn encode(&self, name: &str, value: u8) -> Result<WireMessage, EncodeError> {
        self.param(EmitterParam::from_name(name)?, value)
    }

    /// Messages for the given parameters, skipping `None`s, in argument order.
    /// Nothing is returned unless every value is in range.
    pub fn params(&self, values: &[(EmitterParam, Option<u8>)]) -> Result<Vec<WireMessage>, EncodeError> {
        values
            .iter()
            .filter_map(|(param, value)| value.map(|v| self.param(*param, v)))
            .collect()
    }

    pub fn grain(&self, grain: &GrainParams) -> Result<Vec<WireMessage>, EncodeError> {
        self.params(&[
            (EmitterParam::GrainLengthCell, grain.length_cell),
            (EmitterParam::GrainLengthNote, grain.length_note),
            (EmitterParam::GrainDensity, grain.density),
            (EmitterParam::GrainShape, grain.shape),
            (EmitterParam::GrainShapeAttack, grain.shape_attack),
            (EmitterParam::GrainPan, grain.pan),
            (EmitterParam::GrainTuneSpread, grain.tune_spread),
        ])
    }

    pub fn set_active(&self) -> WireMessage {
        WireMessage::control_change(self.channel, ACTIVE_EMITTER, self.emitter.get() - 1)
    }

    pub fn place_in_cell(&self, column: u8, cell: u8) -> Result<WireMessage, EncodeError> {
        Ok(WireMessage::control_change(
            self.channel,
            PLACE_EMITTER_IN_CELL,
            cell_index(column, cell)?,
        ))
    }

    pub fn remove_from_cell(&self, column: u8, cell: u8) -> Result<WireMessage, EncodeError> {
        Ok(WireMessage::control_change(
            self.channel,
            REMOVE_EMITTER_FROM_CELL,
            cell_index(column, cell)?,
        ))
    }

    /// Start the emitter sounding.
    pub fn activate(&self, note: u8, velocity: u8) -> Result<WireMessage, EncodeError> {
        Ok(WireMessage::note_on(
            self.channel,
            check("note", note)?,
            check("velocity", velocity)?,
        ))
    }

    pub fn deactivate(&self, note: u8) -> Result<WireMessage, EncodeError> {
        Ok(WireMessage::note_off(self.channel, check("note", note)?))
    }
}

/// Device-wide controls: modwheel, envelope and effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalParam {
    Modwheel,
    Attack,
    Decay,
    Sustain,
    Release,
    ReverbSize,
    ReverbColor,
    ReverbMix,
    DelayFeedback,
    DelayTime,
    DelayColor,
    DelayMix,
    ChorusDepth,
    ChorusSpeed,
    ChorusFlange,
    ChorusMix,
}

impl GlobalParam {
    pub const ALL: [GlobalParam; 16] = [
        GlobalParam::Modwheel,
        GlobalParam::Attack,
        GlobalParam::Decay,
        GlobalParam::Sustain,
        GlobalParam::Release,
        GlobalParam::ReverbSize,
        GlobalParam::ReverbColor,
        GlobalParam::ReverbMix,
        GlobalParam::DelayFeedback,
        GlobalParam::DelayTime,
        GlobalParam::DelayColor,
        GlobalParam::DelayMix,
        GlobalParam::ChorusDepth,
        GlobalParam::ChorusSpeed,
        GlobalParam::ChorusFlange,
        GlobalParam::ChorusMix,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GlobalParam::Modwheel => "modwheel",
            GlobalParam::Attack => "attack",
            GlobalParam::Decay => "decay",
            GlobalParam::Sustain => "sustain",
            GlobalParam::Release => "release",
            GlobalParam::ReverbSize => "reverb_size",
            GlobalParam::ReverbColor => "reverb_color",
            GlobalParam::ReverbMix => "reverb_mix",
            GlobalParam::DelayFeedback => "delay_feedback",
            GlobalParam::DelayTime => "delay_time",
            GlobalParam::DelayColor => "delay_color",
            GlobalParam::DelayMix => "delay_mix",
            GlobalParam::ChorusDepth => "chorus_depth",
            GlobalParam::ChorusSpeed => "chorus_speed",
            GlobalParam::ChorusFlange => "chorus_flange",
            GlobalParam::ChorusMix => "chorus_mix",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, EncodeError> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == name)
            .ok_or_else(|| EncodeError::UnknownParameter(name.to_string()))
    }

    pub fn cc(self) -> u8 {
        match self {
            GlobalParam::Modwheel => MODWHEEL,
            GlobalParam::Attack => 84,
            GlobalParam::Decay => 85,
            GlobalParam::Sustain => 86,
            GlobalParam::Release => 87,
            GlobalParam::ReverbSize => 88,
            GlobalParam::ReverbColor => 89,
            GlobalParam::ReverbMix => 90,
            GlobalParam::DelayFeedback => 91,
            GlobalParam::DelayTime => 92,
            GlobalParam::DelayColor => 93,
            GlobalParam::DelayMix => 94,
            GlobalParam::ChorusDepth => 95,
            GlobalParam::ChorusSpeed => 96,
            GlobalParam::ChorusFlange => 97,
            GlobalParam::ChorusMix => 98,
        }
    }
}

/// Encoder for global and track controls on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalEncoder {
    channel: u8,
}

impl GlobalEncoder {
    pub fn new(channel: u8) -> Result<Self, EncodeError> {
        Ok(Self {
            channel: check_between("channel", channel, 1, 16)?,
        })
    }

    pub fn param(&self, param: GlobalParam, value: u8) -> Result<WireMessage, EncodeError> {
        Ok(WireMessage::control_change(
            self.channel,
            param.cc(),
            check(param.name(), value)?,
        ))
    }

    pub fn encode(&self, name: &str, value: u8) -> Result<WireMessage, EncodeError> {
        self.param(GlobalParam::from_name(name)?, value)
    }

    /// Size of modulator `modulator` (1-10).
    pub fn modulator_size(&self, modulator: u8, value: u8) -> Result<WireMessage, EncodeError> {
        let modulator = check_between("modulator", modulator, 1, MODULATOR_COUNT)?;
        Ok(WireMessage::control_change(
            self.channel,
            MODULATOR_SIZE_BASE + modulator - 1,
            check("modulator_size", value)?,
        ))
    }

    /// Load canvas number `program` from the current canvas folder.
    pub fn change_canvas(&self, program: u8) -> Result<WireMessage, EncodeError> {
        Ok(WireMessage::program_change(self.channel, check("program", program)?))
    }

    pub fn track_volume(&self, track: u8, value: u8) -> Result<WireMessage, EncodeError> {
        let track = check_between("track", track, 1, TRACK_COUNT)?;
        Ok(WireMessage::control_change(
            self.channel,
            TRACK_VOLUME_BASE + track - 1,
            check("track_volume", value)?,
        ))
    }

    pub fn record_on(&self, track: u8) -> Result<WireMessage, EncodeError> {
        let track = check_between("track", track, 1, TRACK_COUNT)?;
        Ok(WireMessage::note_on(
            self.channel,
            TRACK_RECORD_NOTE_BASE + track - 1,
            MAX_VALUE,
        ))
    }

    pub fn record_off(&self, track: u8) -> Result<WireMessage, EncodeError> {
        let track = check_between("track", track, 1, TRACK_COUNT)?;
        Ok(WireMessage::note_off(self.channel, TRACK_RECORD_NOTE_BASE + track - 1))
    }

    pub fn clock() -> WireMessage {
        WireMessage::realtime(tempera_types::CLOCK)
    }

    pub fn start() -> WireMessage {
        WireMessage::realtime(tempera_types::START)
    }

    pub fn stop() -> WireMessage {
        WireMessage::realtime(tempera_types::STOP)
    }
}
