#![allow(dead_code)]
//! Test harness utilities for tempera-core integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempera_core::config::PlaybackSettings;
use tempera_core::dispatcher::Dispatcher;
use tempera_core::emitter::EmitterPool;
use tempera_core::midi::sink::{RecordingSink, SentMessage};
use tempera_core::midi::{PLACE_EMITTER_IN_CELL, REMOVE_EMITTER_FROM_CELL};
use tempera_core::sequencer::{BankedSequencer, LinearSequencer, SequencerOptions, Timing};
use tempera_types::{BankId, BankPattern, EmitterId, LinearPattern, MessageKind, WireMessage};

/// A started dispatcher on a recording sink, with the emitter pool on top.
pub struct Rig {
    pub sink: RecordingSink,
    pub dispatcher: Arc<Dispatcher>,
    pub pool: Arc<EmitterPool>,
}

impl Rig {
    pub fn new() -> Self {
        let sink = RecordingSink::new();
        let dispatcher = Arc::new(Dispatcher::new(Box::new(sink.clone())));
        dispatcher.start().unwrap();
        let pool = Arc::new(EmitterPool::new(Arc::clone(&dispatcher), PlaybackSettings::default()).unwrap());
        Self {
            sink,
            dispatcher,
            pool,
        }
    }

    pub fn linear(&self, step: Duration) -> Arc<LinearSequencer> {
        Arc::new(
            LinearSequencer::new(
                Arc::clone(&self.pool),
                Timing::StepDuration(step),
                SequencerOptions::default(),
            )
            .unwrap(),
        )
    }

    pub fn banked(&self, step: Duration) -> Arc<BankedSequencer> {
        Arc::new(
            BankedSequencer::new(
                Arc::clone(&self.pool),
                Timing::StepDuration(step),
                SequencerOptions::default(),
            )
            .unwrap(),
        )
    }

    /// Drain the dispatcher so every submitted message is recorded.
    pub fn finish(&self) {
        self.dispatcher.stop().unwrap();
    }
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub fn linear_pattern(steps: &[(u16, u8)]) -> LinearPattern {
    steps.iter().map(|&(s, e)| (s, EmitterId::new(e))).collect()
}

pub fn bank_pattern(cells: &[(u8, u8)]) -> BankPattern {
    cells.iter().map(|&(c, e)| (c, EmitterId::new(e))).collect()
}

pub fn bank(id: u8) -> BankId {
    BankId::new(id)
}

/// Activation edge of one emitter, identified by its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Note {
    On(u8),
    Off(u8),
}

pub fn note_of(message: &WireMessage) -> Option<Note> {
    match message.kind() {
        MessageKind::NoteOn { channel, .. } => Some(Note::On(channel)),
        MessageKind::NoteOff { channel, .. } => Some(Note::Off(channel)),
        _ => None,
    }
}

/// Note edges in arrival order, with arrival times.
pub fn notes(sink: &RecordingSink) -> Vec<(Instant, Note)> {
    sink.sent()
        .iter()
        .filter_map(|SentMessage { at, message }| note_of(message).map(|n| (*at, n)))
        .collect()
}

pub fn note_sequence(sink: &RecordingSink) -> Vec<Note> {
    notes(sink).into_iter().map(|(_, n)| n).collect()
}

pub fn note_on_channels(sink: &RecordingSink) -> Vec<u8> {
    note_sequence(sink)
        .into_iter()
        .filter_map(|n| match n {
            Note::On(ch) => Some(ch),
            Note::Off(_) => None,
        })
        .collect()
}

pub fn count_on(sink: &RecordingSink) -> usize {
    note_on_channels(sink).len()
}

/// `(channel, cell index)` of every place-in-cell message.
pub fn placements(sink: &RecordingSink) -> Vec<(u8, u8)> {
    cell_messages(sink, PLACE_EMITTER_IN_CELL)
}

/// `(channel, cell index)` of every remove-from-cell message.
pub fn removals(sink: &RecordingSink) -> Vec<(u8, u8)> {
    cell_messages(sink, REMOVE_EMITTER_FROM_CELL)
}

/// Note-ons sent ahead of the first remove-from-cell message.
pub fn ons_before_first_removal(sink: &RecordingSink) -> Option<usize> {
    let mut ons = 0;
    for message in sink.messages() {
        match message.kind() {
            MessageKind::NoteOn { .. } => ons += 1,
            MessageKind::ControlChange { control, .. } if control == REMOVE_EMITTER_FROM_CELL => {
                return Some(ons)
            }
            _ => {}
        }
    }
    None
}

fn cell_messages(sink: &RecordingSink, cc: u8) -> Vec<(u8, u8)> {
    sink.messages()
        .iter()
        .filter_map(|m| match m.kind() {
            MessageKind::ControlChange {
                channel,
                control,
                value,
            } if control == cc => Some((channel, value)),
            _ => None,
        })
        .collect()
}

/// Every note-on is released before the same channel is activated again.
pub fn assert_no_self_overlap(sequence: &[Note]) {
    let mut sounding = [false; 17];
    for (i, note) in sequence.iter().enumerate() {
        match *note {
            Note::On(ch) => {
                assert!(!sounding[ch as usize], "channel {} re-activated at edge {}", ch, i);
                sounding[ch as usize] = true;
            }
            Note::Off(ch) => sounding[ch as usize] = false,
        }
    }
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(ms(2));
    }
    cond()
}

/// Assert `actual` is within `tolerance` of `expected`.
pub fn assert_close(actual: Duration, expected: Duration, tolerance: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= tolerance,
        "expected {:?} (+/- {:?}), got {:?}",
        expected,
        tolerance,
        actual
    );
}
