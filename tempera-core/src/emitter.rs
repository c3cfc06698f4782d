//! Emitter controller handles.
//!
//! An [`EmitterHandle`] encodes one call into messages and submits them to the
//! shared [`Dispatcher`] as a single request. Encoding happens first, so an
//! out-of-range value never reaches the queue.

use std::sync::Arc;

use tempera_types::{EmitterCommand, EmitterEvent, EmitterId, GrainParams, WireMessage, EMITTER_COUNT};

use crate::config::PlaybackSettings;
use crate::dispatcher::{Delivery, DispatchRequest, Dispatcher};
use crate::error::{ControlError, EncodeError};
use crate::midi::{EmitterEncoder, EmitterParam};

/// An emitter placed in a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Placement {
    pub emitter: EmitterId,
    pub column: u8,
    pub cell: u8,
}

pub struct EmitterHandle {
    encoder: EmitterEncoder,
    dispatcher: Arc<Dispatcher>,
    note: u8,
    velocity: u8,
}

impl EmitterHandle {
    /// Handle for `emitter`, addressed on MIDI channel `emitter`.
    pub fn new(
        emitter: EmitterId,
        dispatcher: Arc<Dispatcher>,
        playback: &PlaybackSettings,
    ) -> Result<Self, EncodeError> {
        Ok(Self {
            encoder: EmitterEncoder::new(emitter, emitter.get())?,
            dispatcher,
            note: playback.note,
            velocity: playback.velocity,
        })
    }

    pub fn emitter(&self) -> EmitterId {
        self.encoder.emitter()
    }

    pub fn encoder(&self) -> &EmitterEncoder {
        &self.encoder
    }

    fn submit(&self, messages: Vec<WireMessage>) -> Result<Delivery, ControlError> {
        Ok(self.dispatcher.submit(DispatchRequest::new(messages))?)
    }

    pub fn volume(&self, value: u8) -> Result<Delivery, ControlError> {
        self.submit(vec![self.encoder.param(EmitterParam::Volume, value)?])
    }

    pub fn grain(&self, grain: &GrainParams) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.grain(grain)?)
    }

    pub fn octave(&self, value: u8) -> Result<Delivery, ControlError> {
        self.submit(vec![self.encoder.param(EmitterParam::Octave, value)?])
    }

    pub fn relative_position(&self, x: Option<u8>, y: Option<u8>) -> Result<Delivery, ControlError> {
        self.submit(
            self.encoder
                .params(&[(EmitterParam::RelativeX, x), (EmitterParam::RelativeY, y)])?,
        )
    }

    pub fn spray(&self, x: Option<u8>, y: Option<u8>) -> Result<Delivery, ControlError> {
        self.submit(
            self.encoder
                .params(&[(EmitterParam::SprayX, x), (EmitterParam::SprayY, y)])?,
        )
    }

    pub fn tone_filter(&self, width: Option<u8>, center: Option<u8>) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.params(&[
            (EmitterParam::ToneFilterWidth, width),
            (EmitterParam::ToneFilterCenter, center),
        ])?)
    }

    pub fn effects_send(&self, value: u8) -> Result<Delivery, ControlError> {
        self.submit(vec![self.encoder.param(EmitterParam::EffectsSend, value)?])
    }

    /// Select this emitter on the device.
    pub fn set_active(&self) -> Result<Delivery, ControlError> {
        self.submit(vec![self.encoder.set_active()])
    }

    pub fn place_in_cell(&self, column: u8, cell: u8) -> Result<Delivery, ControlError> {
        self.submit(vec![self.encoder.place_in_cell(column, cell)?])
    }

    pub fn remove_from_cell(&self, column: u8, cell: u8) -> Result<Delivery, ControlError> {
        self.submit(vec![self.encoder.remove_from_cell(column, cell)?])
    }

    pub fn activate(&self) -> Result<Delivery, ControlError> {
        self.submit(vec![self.encoder.activate(self.note, self.velocity)?])
    }

    pub fn deactivate(&self) -> Result<Delivery, ControlError> {
        self.submit(vec![self.encoder.deactivate(self.note)?])
    }

    /// Messages a command would produce, without submitting them.
    pub fn messages(&self, command: &EmitterCommand) -> Result<Vec<WireMessage>, EncodeError> {
        let enc = &self.encoder;
        Ok(match *command {
            EmitterCommand::Volume { value } => vec![enc.param(EmitterParam::Volume, value)?],
            EmitterCommand::Grain(ref grain) => enc.grain(grain)?,
            EmitterCommand::Octave { value } => vec![enc.param(EmitterParam::Octave, value)?],
            EmitterCommand::RelativePosition { x, y } => {
                enc.params(&[(EmitterParam::RelativeX, x), (EmitterParam::RelativeY, y)])?
            }
            EmitterCommand::Spray { x, y } => {
                enc.params(&[(EmitterParam::SprayX, x), (EmitterParam::SprayY, y)])?
            }
            EmitterCommand::ToneFilter { width, center } => enc.params(&[
                (EmitterParam::ToneFilterWidth, width),
                (EmitterParam::ToneFilterCenter, center),
            ])?,
            EmitterCommand::EffectsSend { value } => {
                vec![enc.param(EmitterParam::EffectsSend, value)?]
            }
            EmitterCommand::SetActive => vec![enc.set_active()],
            EmitterCommand::PlaceInCell { column, cell } => vec![enc.place_in_cell(column, cell)?],
            EmitterCommand::RemoveFromCell { column, cell } => {
                vec![enc.remove_from_cell(column, cell)?]
            }
            EmitterCommand::Activate => vec![enc.activate(self.note, self.velocity)?],
            EmitterCommand::Deactivate => vec![enc.deactivate(self.note)?],
        })
    }

    pub fn command(&self, command: &EmitterCommand) -> Result<Delivery, ControlError> {
        self.submit(self.messages(command)?)
    }
}

/// The four emitter handles sharing one dispatcher.
pub struct EmitterPool {
    dispatcher: Arc<Dispatcher>,
    handles: Vec<EmitterHandle>,
    playback: PlaybackSettings,
}

impl EmitterPool {
    pub fn new(dispatcher: Arc<Dispatcher>, playback: PlaybackSettings) -> Result<Self, EncodeError> {
        let handles = EmitterId::all()
            .map(|id| EmitterHandle::new(id, Arc::clone(&dispatcher), &playback))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dispatcher,
            handles,
            playback,
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn playback(&self) -> &PlaybackSettings {
        &self.playback
    }

    pub fn handles(&self) -> &[EmitterHandle] {
        &self.handles
    }

    pub fn handle(&self, emitter: EmitterId) -> Result<&EmitterHandle, EncodeError> {
        if !emitter.is_valid() {
            return Err(EncodeError::out_of_range(
                "emitter",
                emitter.get(),
                1,
                EMITTER_COUNT as i64,
            ));
        }
        Ok(&self.handles[emitter.get() as usize - 1])
    }

    /// Route an addressed command, as received from an external event source.
    pub fn dispatch(&self, event: &EmitterEvent) -> Result<Delivery, ControlError> {
        self.handle(EmitterId::new(event.emitter))?.command(&event.command)
    }

    /// Place every emitter in its cell, then activate each distinct emitter
    /// once, all in one request.
    pub fn activate_step(&self, placements: &[Placement]) -> Result<Delivery, ControlError> {
        let mut request = DispatchRequest::default();
        for p in placements {
            request.push(self.handle(p.emitter)?.encoder.place_in_cell(p.column, p.cell)?);
        }
        for emitter in distinct_emitters(placements) {
            let handle = self.handle(emitter)?;
            request.push(handle.encoder.activate(self.playback.note, self.playback.velocity)?);
        }
        Ok(self.dispatcher.submit(request)?)
    }

    pub fn deactivate_step(&self, emitters: &[EmitterId]) -> Result<Delivery, ControlError> {
        let mut request = DispatchRequest::default();
        for emitter in emitters {
            request.push(self.handle(*emitter)?.encoder.deactivate(self.playback.note)?);
        }
        Ok(self.dispatcher.submit(request)?)
    }

    pub fn remove_cells(&self, placements: &[Placement]) -> Result<Delivery, ControlError> {
        let mut request = DispatchRequest::default();
        for p in placements {
            request.push(self.handle(p.emitter)?.encoder.remove_from_cell(p.column, p.cell)?);
        }
        Ok(self.dispatcher.submit(request)?)
    }
}

/// Emitters of `placements` in first-seen order, without repeats.
pub fn distinct_emitters(placements: &[Placement]) -> Vec<EmitterId> {
    let mut emitters: Vec<EmitterId> = Vec::with_capacity(placements.len());
    for p in placements {
        if !emitters.contains(&p.emitter) {
            emitters.push(p.emitter);
        }
    }
    emitters
}
