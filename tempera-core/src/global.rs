//! Device-wide and per-track controls.

use std::sync::Arc;

use tempera_types::WireMessage;

use crate::config::MidiSettings;
use crate::dispatcher::{Delivery, Dispatcher};
use crate::error::{ControlError, EncodeError};
use crate::midi::{GlobalEncoder, GlobalParam};

pub struct GlobalControls {
    encoder: GlobalEncoder,
    dispatcher: Arc<Dispatcher>,
}

impl GlobalControls {
    pub fn new(dispatcher: Arc<Dispatcher>, channel: u8) -> Result<Self, EncodeError> {
        Ok(Self {
            encoder: GlobalEncoder::new(channel)?,
            dispatcher,
        })
    }

    pub fn from_settings(dispatcher: Arc<Dispatcher>, settings: &MidiSettings) -> Result<Self, EncodeError> {
        Self::new(dispatcher, settings.global_channel)
    }

    fn submit(&self, message: WireMessage) -> Result<Delivery, ControlError> {
        Ok(self.dispatcher.submit(message)?)
    }

    pub fn set(&self, param: GlobalParam, value: u8) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.param(param, value)?)
    }

    /// Set a parameter by name, e.g. `"reverb_mix"`.
    pub fn set_named(&self, name: &str, value: u8) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.encode(name, value)?)
    }

    pub fn modulator_size(&self, modulator: u8, value: u8) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.modulator_size(modulator, value)?)
    }

    pub fn change_canvas(&self, program: u8) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.change_canvas(program)?)
    }

    pub fn track_volume(&self, track: u8, value: u8) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.track_volume(track, value)?)
    }

    pub fn record_on(&self, track: u8) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.record_on(track)?)
    }

    pub fn record_off(&self, track: u8) -> Result<Delivery, ControlError> {
        self.submit(self.encoder.record_off(track)?)
    }

    pub fn clock(&self) -> Result<Delivery, ControlError> {
        self.submit(GlobalEncoder::clock())
    }

    pub fn start(&self) -> Result<Delivery, ControlError> {
        self.submit(GlobalEncoder::start())
    }

    pub fn stop(&self) -> Result<Delivery, ControlError> {
        self.submit(GlobalEncoder::stop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::sink::RecordingSink;
    use tempera_types::MessageKind;

    #[test]
    fn controls_use_the_global_channel() {
        let sink = RecordingSink::new();
        let dispatcher = Arc::new(Dispatcher::new(Box::new(sink.clone())));
        dispatcher.start().unwrap();
        let controls = GlobalControls::new(Arc::clone(&dispatcher), 16).unwrap();
        controls.set_named("reverb_mix", 40).unwrap().wait().unwrap();
        controls.record_on(2).unwrap().wait().unwrap();
        controls.start().unwrap().wait().unwrap();
        dispatcher.stop().unwrap();

        let kinds: Vec<_> = sink.messages().iter().map(|m| m.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::ControlChange {
                    channel: 16,
                    control: GlobalParam::ReverbMix.cc(),
                    value: 40
                },
                MessageKind::NoteOn {
                    channel: 16,
                    note: 101,
                    velocity: 127
                },
                MessageKind::Realtime(tempera_types::START),
            ]
        );
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let dispatcher = Arc::new(Dispatcher::new(Box::new(RecordingSink::new())));
        let controls = GlobalControls::new(dispatcher, 1).unwrap();
        assert!(matches!(
            controls.set_named("flanger", 1),
            Err(ControlError::Encode(EncodeError::UnknownParameter(_)))
        ));
    }
}
