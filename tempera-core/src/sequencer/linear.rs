//! One flat cyclic pattern over the whole grid.

use std::collections::BTreeMap;
use std::sync::Arc;

use tempera_types::{EmitterId, LinearPattern, LinearState, RunState, SequencerEvent};

use super::clock::{Clock, Topology};
use super::{Sequencer, SequencerOptions, Timing};
use crate::config::GridLayout;
use crate::emitter::{EmitterPool, Placement};
use crate::error::SequencerError;

/// Step `s` lives in column `s / cells + 1`, cell `s % cells + 1`.
pub(crate) struct LinearGrid {
    layout: GridLayout,
    pattern: LinearPattern,
    cycle_len: usize,
    placed: BTreeMap<u16, EmitterId>,
}

impl LinearGrid {
    fn new(layout: GridLayout) -> Self {
        Self {
            layout,
            pattern: LinearPattern::new(),
            cycle_len: layout.cells as usize,
            placed: BTreeMap::new(),
        }
    }

    fn placement(&self, step: u16, emitter: EmitterId) -> Placement {
        let cells = self.layout.cells as u16;
        Placement {
            emitter,
            column: (step / cells + 1) as u8,
            cell: (step % cells + 1) as u8,
        }
    }

    /// Whole columns up to the last occupied step; one column when empty.
    fn cycle_len_of(&self, pattern: &LinearPattern) -> usize {
        let cells = self.layout.cells as usize;
        match pattern.keys().next_back() {
            Some(&last) => ((last as usize / cells + 1) * cells).min(self.layout.step_count()),
            None => cells,
        }
    }

    /// Install `pattern`, returning placements it no longer holds.
    fn replace(&mut self, pattern: LinearPattern) -> Vec<Placement> {
        let dropped: Vec<(u16, EmitterId)> = self
            .placed
            .iter()
            .filter(|&(step, emitter)| pattern.get(step) != Some(emitter))
            .map(|(step, emitter)| (*step, *emitter))
            .collect();
        for (step, _) in &dropped {
            self.placed.remove(step);
        }
        self.cycle_len = self.cycle_len_of(&pattern);
        self.pattern = pattern;
        dropped
            .into_iter()
            .map(|(step, emitter)| self.placement(step, emitter))
            .collect()
    }
}

impl Topology for LinearGrid {
    fn cycle_len(&self) -> usize {
        self.cycle_len
    }

    fn plan(&mut self, position: usize) -> Vec<Placement> {
        let step = position as u16;
        match self.pattern.get(&step).copied() {
            Some(emitter) => {
                self.placed.insert(step, emitter);
                vec![self.placement(step, emitter)]
            }
            None => Vec::new(),
        }
    }

    fn take_placed(&mut self) -> Vec<Placement> {
        std::mem::take(&mut self.placed)
            .into_iter()
            .map(|(step, emitter)| self.placement(step, emitter))
            .collect()
    }
}

/// Plays one pattern over the whole grid, column by column.
pub struct LinearSequencer {
    clock: Clock<LinearGrid>,
    layout: GridLayout,
}

impl LinearSequencer {
    pub fn new(
        pool: Arc<EmitterPool>,
        timing: Timing,
        options: SequencerOptions,
    ) -> Result<Self, SequencerError> {
        Ok(Self {
            clock: Clock::new(pool, timing, options.gate_ratio, LinearGrid::new(options.layout))?,
            layout: options.layout,
        })
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    /// Replace the whole pattern. Steps run `0..columns * cells`.
    pub fn set_pattern(&self, pattern: LinearPattern) -> Result<(), SequencerError> {
        for (&step, &emitter) in &pattern {
            if step as usize >= self.layout.step_count() {
                return Err(SequencerError::StepOutOfRange(step));
            }
            if !emitter.is_valid() {
                return Err(SequencerError::EmitterOutOfRange(emitter));
            }
        }
        let mut state = self.clock.lock();
        log::debug!(target: "sequencer", "pattern replaced ({} active steps)", pattern.len());
        let removed = state.topology.replace(pattern);
        self.clock.remove(&removed)
    }

    pub fn clear(&self) -> Result<(), SequencerError> {
        self.set_pattern(LinearPattern::new())
    }

    pub fn pattern(&self) -> LinearPattern {
        self.clock.lock().topology.pattern.clone()
    }

    pub fn get_state(&self) -> LinearState {
        let state = self.clock.lock();
        LinearState {
            pattern: state.topology.pattern.clone(),
            position: state.position,
            cycle_len: state.topology.cycle_len,
            loop_count: state.loop_count,
            target_loops: state.target_loops,
            run_state: state.run_state,
            step_duration: state.step_duration,
        }
    }
}

impl Sequencer for LinearSequencer {
    fn run(&self, loops: u32) -> Result<(), SequencerError> {
        self.clock.run(loops)
    }

    fn stop(&self) {
        self.clock.stop()
    }

    fn pause(&self) -> Result<(), SequencerError> {
        self.clock.pause()
    }

    fn resume(&self) -> Result<(), SequencerError> {
        self.clock.resume()
    }

    fn set_loops(&self, loops: u32) -> Result<(), SequencerError> {
        self.clock.set_loops(loops)
    }

    fn set_timing(&self, timing: Timing) -> Result<(), SequencerError> {
        self.clock.set_timing(timing)
    }

    fn set_bpm(&self, bpm: f64) -> Result<(), SequencerError> {
        self.clock.set_bpm(bpm)
    }

    fn cleanup(&self) -> Result<(), SequencerError> {
        self.clock.cleanup()
    }

    fn run_state(&self) -> RunState {
        self.clock.run_state()
    }

    fn dispatch(&self, event: SequencerEvent) -> Result<(), SequencerError> {
        match event {
            SequencerEvent::SetPattern { pattern } => self.set_pattern(pattern),
            SequencerEvent::Clear => self.clear(),
            SequencerEvent::SetLoops { loops } => self.set_loops(loops),
            SequencerEvent::Pause => self.pause(),
            SequencerEvent::Resume => self.resume(),
            SequencerEvent::Stop => {
                self.stop();
                Ok(())
            }
            SequencerEvent::Cleanup => self.cleanup(),
            other => Err(SequencerError::UnsupportedEvent(other.action().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::PlaybackSettings;
    use crate::dispatcher::Dispatcher;
    use crate::midi::sink::RecordingSink;

    fn grid() -> LinearGrid {
        LinearGrid::new(GridLayout::default())
    }

    fn pattern(steps: &[(u16, u8)]) -> LinearPattern {
        steps.iter().map(|&(s, e)| (s, EmitterId::new(e))).collect()
    }

    #[test]
    fn steps_map_column_major() {
        let g = grid();
        let p = g.placement(9, EmitterId::new(1));
        assert_eq!((p.column, p.cell), (2, 2));
        let p = g.placement(63, EmitterId::new(1));
        assert_eq!((p.column, p.cell), (8, 8));
    }

    #[test]
    fn cycle_covers_whole_columns() {
        let g = grid();
        assert_eq!(g.cycle_len_of(&LinearPattern::new()), 8);
        assert_eq!(g.cycle_len_of(&pattern(&[(0, 1), (4, 2)])), 8);
        assert_eq!(g.cycle_len_of(&pattern(&[(8, 1)])), 16);
        assert_eq!(g.cycle_len_of(&pattern(&[(63, 1)])), 64);
    }

    #[test]
    fn replacing_reports_dropped_placements() {
        let mut g = grid();
        g.replace(pattern(&[(0, 1), (9, 2)]));
        g.plan(0);
        g.plan(9);
        let removed = g.replace(pattern(&[(0, 1), (9, 3)]));
        assert_eq!(
            removed,
            vec![Placement {
                emitter: EmitterId::new(2),
                column: 2,
                cell: 2
            }]
        );
        assert_eq!(g.take_placed().len(), 1);
    }

    fn sequencer() -> LinearSequencer {
        let dispatcher = Arc::new(Dispatcher::new(Box::new(RecordingSink::new())));
        let pool = Arc::new(EmitterPool::new(dispatcher, PlaybackSettings::default()).unwrap());
        LinearSequencer::new(
            pool,
            Timing::StepDuration(Duration::from_millis(10)),
            SequencerOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn set_pattern_validates_steps_and_emitters() {
        let seq = sequencer();
        assert_eq!(
            seq.set_pattern(pattern(&[(64, 1)])),
            Err(SequencerError::StepOutOfRange(64))
        );
        assert_eq!(
            seq.set_pattern(pattern(&[(3, 5)])),
            Err(SequencerError::EmitterOutOfRange(EmitterId::new(5)))
        );
        assert!(seq.pattern().is_empty());
    }

    #[test]
    fn bank_events_are_unsupported() {
        let seq = sequencer();
        assert_eq!(
            seq.dispatch_json(r#"{"action": "mute_column", "bank": 1}"#),
            Err(SequencerError::UnsupportedEvent("mute_column".to_string()))
        );
    }

    #[test]
    fn transport_calls_need_a_run() {
        let seq = sequencer();
        assert_eq!(seq.pause(), Err(SequencerError::NotRunning));
        assert_eq!(seq.set_loops(2), Err(SequencerError::NotRunning));
        seq.stop();
        assert_eq!(seq.run_state(), RunState::Idle);
    }
}
