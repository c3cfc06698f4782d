//! Pattern sequencers.
//!
//! Both topologies share one clock loop ([`clock`]): at every step boundary it
//! asks the topology which emitters are active, submits their placement and
//! activation as one request, releases them after `gate_ratio` of the step,
//! and advances. Pattern state and transport state live behind one lock, so a
//! step boundary sees a pattern either entirely before or entirely after a
//! mutation.

mod banked;
mod clock;
mod linear;

pub use banked::BankedSequencer;
pub use linear::LinearSequencer;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::Value;
use tempera_types::{RunState, SequencerEvent};

use crate::config::{Config, GridLayout};
use crate::error::SequencerError;

/// Steps per beat assumed when a sequencer is built from a plain step duration.
pub const DEFAULT_STEPS_PER_BEAT: f64 = 1.0;

/// How long one step lasts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timing {
    StepDuration(Duration),
    Tempo { bpm: f64, steps_per_beat: f64 },
}

impl Timing {
    pub fn from_secs(secs: f64) -> Result<Self, SequencerError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(SequencerError::InvalidTiming(secs));
        }
        Ok(Timing::StepDuration(Duration::from_secs_f64(secs)))
    }

    pub fn tempo(bpm: f64, steps_per_beat: f64) -> Self {
        Timing::Tempo { bpm, steps_per_beat }
    }

    /// `60 / (bpm * steps_per_beat)` for a tempo.
    pub fn step_duration(&self) -> Result<Duration, SequencerError> {
        match *self {
            Timing::StepDuration(d) if d.is_zero() => Err(SequencerError::InvalidTiming(0.0)),
            Timing::StepDuration(d) => Ok(d),
            Timing::Tempo { bpm, steps_per_beat } => {
                if !bpm.is_finite() || bpm <= 0.0 {
                    return Err(SequencerError::InvalidTiming(bpm));
                }
                if !steps_per_beat.is_finite() || steps_per_beat <= 0.0 {
                    return Err(SequencerError::InvalidTiming(steps_per_beat));
                }
                Ok(Duration::from_secs_f64(60.0 / (bpm * steps_per_beat)))
            }
        }
    }

    fn steps_per_beat(&self) -> f64 {
        match *self {
            Timing::StepDuration(_) => DEFAULT_STEPS_PER_BEAT,
            Timing::Tempo { steps_per_beat, .. } => steps_per_beat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerOptions {
    pub layout: GridLayout,
    /// Fraction of the step an emitter sounds before its release.
    pub gate_ratio: f64,
}

impl SequencerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: config.grid(),
            gate_ratio: config.playback().gate_ratio,
        }
    }
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            layout: GridLayout::default(),
            gate_ratio: 0.999,
        }
    }
}

/// Transport and event control common to both topologies.
pub trait Sequencer: Send + Sync + 'static {
    /// Play from step 0 until `loops` loops have completed (0 = forever) or
    /// [`stop`](Sequencer::stop) is called. Blocks the calling thread.
    fn run(&self, loops: u32) -> Result<(), SequencerError>;

    /// Ask a running clock loop to release sounding emitters and exit.
    /// Returns without waiting; a no-op when idle.
    fn stop(&self);

    fn pause(&self) -> Result<(), SequencerError>;

    fn resume(&self) -> Result<(), SequencerError>;

    /// Change the remaining loop target of a running sequencer (0 = forever).
    fn set_loops(&self, loops: u32) -> Result<(), SequencerError>;

    /// Takes effect at the next step boundary.
    fn set_timing(&self, timing: Timing) -> Result<(), SequencerError>;

    fn set_bpm(&self, bpm: f64) -> Result<(), SequencerError>;

    fn set_step_duration(&self, step: Duration) -> Result<(), SequencerError> {
        self.set_timing(Timing::StepDuration(step))
    }

    /// Release sounding emitters and remove every cell placement this
    /// sequencer made.
    fn cleanup(&self) -> Result<(), SequencerError>;

    fn run_state(&self) -> RunState;

    fn dispatch(&self, event: SequencerEvent) -> Result<(), SequencerError>;

    /// Parse a JSON event and dispatch it.
    fn dispatch_json(&self, json: &str) -> Result<(), SequencerError> {
        self.dispatch(parse_event_str(json)?)
    }
}

/// Run `sequencer` on its own thread.
pub fn spawn<S: Sequencer>(
    sequencer: &Arc<S>,
    loops: u32,
) -> std::io::Result<JoinHandle<Result<(), SequencerError>>> {
    let sequencer = Arc::clone(sequencer);
    std::thread::Builder::new()
        .name("tempera-sequencer".into())
        .spawn(move || sequencer.run(loops))
}

/// Read an event payload. An unknown `action` is `UnsupportedEvent`; a known
/// action with unreadable fields is `MalformedEvent`.
pub fn parse_event(value: Value) -> Result<SequencerEvent, SequencerError> {
    let action = match value.get("action") {
        Some(Value::String(action)) => action.clone(),
        Some(other) => {
            return Err(SequencerError::MalformedEvent(format!(
                "action must be a string, got {}",
                other
            )))
        }
        None => return Err(SequencerError::MalformedEvent("missing action".to_string())),
    };
    if !SequencerEvent::ACTIONS.contains(&action.as_str()) {
        return Err(SequencerError::UnsupportedEvent(action));
    }
    serde_json::from_value(value).map_err(|e| SequencerError::MalformedEvent(e.to_string()))
}

pub fn parse_event_str(json: &str) -> Result<SequencerEvent, SequencerError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| SequencerError::MalformedEvent(e.to_string()))?;
    parse_event(value)
}
