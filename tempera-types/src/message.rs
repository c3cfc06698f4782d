//! Fixed-format wire messages.

use serde::{Deserialize, Serialize};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;

/// MIDI timing clock (realtime).
pub const CLOCK: u8 = 0xF8;
/// MIDI start (realtime).
pub const START: u8 = 0xFA;
/// MIDI stop (realtime).
pub const STOP: u8 = 0xFC;

/// A single MIDI message of one to three bytes.
///
/// Channels are given 1-16 at construction (as shown on hardware) and stored
/// 0-15 in the status byte. Data bytes are masked to 7 bits; range checking is
/// the encoder's job, not this type's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireMessage {
    bytes: [u8; 3],
    len: u8,
}

/// Decoded view of a [`WireMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    Realtime(u8),
    Other,
}

fn status(kind: u8, channel: u8) -> u8 {
    kind | (channel.saturating_sub(1) & 0x0F)
}

impl WireMessage {
    pub fn control_change(channel: u8, control: u8, value: u8) -> Self {
        Self {
            bytes: [status(CONTROL_CHANGE, channel), control & 0x7F, value & 0x7F],
            len: 3,
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            bytes: [status(NOTE_ON, channel), note & 0x7F, velocity & 0x7F],
            len: 3,
        }
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        Self {
            bytes: [status(NOTE_OFF, channel), note & 0x7F, 0],
            len: 3,
        }
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self {
            bytes: [status(PROGRAM_CHANGE, channel), program & 0x7F, 0],
            len: 2,
        }
    }

    /// Single-byte system realtime message (clock, start, stop).
    pub fn realtime(status: u8) -> Self {
        Self {
            bytes: [status, 0, 0],
            len: 1,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Channel 1-16 for channel-voice messages.
    pub fn channel(&self) -> Option<u8> {
        if self.bytes[0] < 0xF0 {
            Some((self.bytes[0] & 0x0F) + 1)
        } else {
            None
        }
    }

    pub fn kind(&self) -> MessageKind {
        let [status, d1, d2] = self.bytes;
        let channel = (status & 0x0F) + 1;
        match status & 0xF0 {
            NOTE_ON => MessageKind::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            },
            NOTE_OFF => MessageKind::NoteOff { channel, note: d1 },
            CONTROL_CHANGE => MessageKind::ControlChange {
                channel,
                control: d1,
                value: d2,
            },
            PROGRAM_CHANGE => MessageKind::ProgramChange {
                channel,
                program: d1,
            },
            0xF0 if self.len == 1 => MessageKind::Realtime(status),
            _ => MessageKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cc_uses_zero_based_channel_in_status() {
        let msg = WireMessage::control_change(2, 7, 100);
        assert_eq!(msg.as_bytes(), &[0xB1, 7, 100]);
        assert_eq!(msg.channel(), Some(2));
    }

    #[test]
    fn program_change_is_two_bytes() {
        let msg = WireMessage::program_change(1, 5);
        assert_eq!(msg.as_bytes(), &[0xC0, 5]);
    }

    #[test]
    fn realtime_has_no_channel() {
        let msg = WireMessage::realtime(CLOCK);
        assert_eq!(msg.as_bytes(), &[0xF8]);
        assert_eq!(msg.channel(), None);
        assert_eq!(msg.kind(), MessageKind::Realtime(CLOCK));
    }

    #[test]
    fn kind_decodes_notes() {
        assert_eq!(
            WireMessage::note_on(4, 60, 127).kind(),
            MessageKind::NoteOn {
                channel: 4,
                note: 60,
                velocity: 127
            }
        );
        assert_eq!(
            WireMessage::note_off(4, 60).kind(),
            MessageKind::NoteOff { channel: 4, note: 60 }
        );
    }
}
