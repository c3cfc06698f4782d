//! Independent per-bank patterns with their own mute schedules.
//!
//! Banks advance in lockstep on the global clock but each keeps its own
//! position, length and loop counter. A bank plays on its loop `i` only when
//! its mute pattern allows loop `i`; the global loop (what `run(loops)`
//! counts) is always `cells` steps long.
//!
//! On a muted loop a bank's previously placed cell is removed from the
//! device when its step comes round.

use std::collections::BTreeMap;
use std::sync::Arc;

use tempera_types::{
    BankId, BankPattern, BankState, BankedState, EmitterId, MutePattern, RunState, SequencerEvent,
};

use super::clock::{Clock, Topology};
use super::{Sequencer, SequencerOptions, Timing};
use crate::config::GridLayout;
use crate::emitter::{EmitterPool, Placement};
use crate::error::SequencerError;

struct Bank {
    pattern: BankPattern,
    mute: MutePattern,
    position: usize,
    length: usize,
    loop_count: u64,
    placed: BTreeMap<u8, EmitterId>,
}

impl Bank {
    fn new(length: usize) -> Self {
        Self {
            pattern: BankPattern::new(),
            mute: MutePattern::always(),
            position: 0,
            length,
            loop_count: 0,
            placed: BTreeMap::new(),
        }
    }

    fn snapshot(&self) -> BankState {
        BankState {
            pattern: self.pattern.clone(),
            mute_pattern: self.mute.clone(),
            position: self.position,
            length: self.length,
            loop_count: self.loop_count,
        }
    }
}

pub(crate) struct BankGrid {
    layout: GridLayout,
    banks: BTreeMap<BankId, Bank>,
}

impl BankGrid {
    fn new(layout: GridLayout) -> Self {
        let banks = (1..=layout.columns)
            .map(|id| (BankId::new(id), Bank::new(layout.cells as usize)))
            .collect();
        Self { layout, banks }
    }

    fn bank_mut(&mut self, id: BankId) -> Result<&mut Bank, SequencerError> {
        self.banks.get_mut(&id).ok_or(SequencerError::BankOutOfRange(id))
    }

    /// Set a bank's cycle length. A bank already past the new end wraps to
    /// its next loop at once.
    fn set_length(&mut self, id: BankId, length: usize) -> Result<(), SequencerError> {
        let bank = self.bank_mut(id)?;
        bank.length = length;
        if bank.position >= length {
            bank.position = 0;
            bank.loop_count += 1;
        }
        Ok(())
    }

    /// Install `pattern` on bank `id`, returning placements it no longer holds.
    fn replace(&mut self, id: BankId, pattern: BankPattern) -> Result<Vec<Placement>, SequencerError> {
        let bank = self.bank_mut(id)?;
        let dropped: Vec<(u8, EmitterId)> = bank
            .placed
            .iter()
            .filter(|&(cell, emitter)| pattern.get(cell) != Some(emitter))
            .map(|(cell, emitter)| (*cell, *emitter))
            .collect();
        for (cell, _) in &dropped {
            bank.placed.remove(cell);
        }
        bank.pattern = pattern;
        Ok(dropped
            .into_iter()
            .map(|(cell, emitter)| Placement {
                emitter,
                column: id.get(),
                cell,
            })
            .collect())
    }
}

impl Topology for BankGrid {
    fn cycle_len(&self) -> usize {
        self.layout.cells as usize
    }

    fn plan(&mut self, _position: usize) -> Vec<Placement> {
        let mut placements = Vec::new();
        for (id, bank) in self.banks.iter_mut() {
            if !bank.mute.plays_on(bank.loop_count) {
                continue;
            }
            let cell = bank.position as u8 + 1;
            if let Some(&emitter) = bank.pattern.get(&cell) {
                bank.placed.insert(cell, emitter);
                placements.push(Placement {
                    emitter,
                    column: id.get(),
                    cell,
                });
            }
        }
        placements
    }

    fn vacate(&mut self, _position: usize) -> Vec<Placement> {
        let mut vacated = Vec::new();
        for (id, bank) in self.banks.iter_mut() {
            if bank.mute.plays_on(bank.loop_count) {
                continue;
            }
            let cell = bank.position as u8 + 1;
            if let Some(emitter) = bank.placed.remove(&cell) {
                vacated.push(Placement {
                    emitter,
                    column: id.get(),
                    cell,
                });
            }
        }
        vacated
    }

    fn advance(&mut self) {
        for bank in self.banks.values_mut() {
            bank.position += 1;
            if bank.position >= bank.length {
                bank.position = 0;
                bank.loop_count += 1;
            }
        }
    }

    fn rewind(&mut self) {
        for bank in self.banks.values_mut() {
            bank.position = 0;
            bank.loop_count = 0;
        }
    }

    fn take_placed(&mut self) -> Vec<Placement> {
        let mut placements = Vec::new();
        for (id, bank) in self.banks.iter_mut() {
            placements.extend(std::mem::take(&mut bank.placed).into_iter().map(|(cell, emitter)| {
                Placement {
                    emitter,
                    column: id.get(),
                    cell,
                }
            }));
        }
        placements
    }
}

/// Plays `columns` independent bank patterns side by side.
pub struct BankedSequencer {
    clock: Clock<BankGrid>,
    layout: GridLayout,
}

impl BankedSequencer {
    pub fn new(
        pool: Arc<EmitterPool>,
        timing: Timing,
        options: SequencerOptions,
    ) -> Result<Self, SequencerError> {
        Ok(Self {
            clock: Clock::new(pool, timing, options.gate_ratio, BankGrid::new(options.layout))?,
            layout: options.layout,
        })
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    fn check_bank(&self, bank: BankId) -> Result<(), SequencerError> {
        if bank.get() == 0 || bank.get() > self.layout.columns {
            return Err(SequencerError::BankOutOfRange(bank));
        }
        Ok(())
    }

    /// Replace one bank's pattern. Cells run `1..=cells`.
    pub fn set_column_pattern(&self, bank: BankId, pattern: BankPattern) -> Result<(), SequencerError> {
        self.check_bank(bank)?;
        for (&cell, &emitter) in &pattern {
            if cell == 0 || cell > self.layout.cells {
                return Err(SequencerError::CellOutOfRange { bank, cell });
            }
            if !emitter.is_valid() {
                return Err(SequencerError::EmitterOutOfRange(emitter));
            }
        }
        let mut state = self.clock.lock();
        log::debug!(target: "sequencer", "bank {} pattern replaced ({} active cells)", bank, pattern.len());
        let removed = state.topology.replace(bank, pattern)?;
        self.clock.remove(&removed)
    }

    pub fn clear_column(&self, bank: BankId) -> Result<(), SequencerError> {
        self.set_column_pattern(bank, BankPattern::new())
    }

    /// Clear every bank.
    pub fn clear(&self) -> Result<(), SequencerError> {
        let mut state = self.clock.lock();
        let mut removed = Vec::new();
        for id in 1..=self.layout.columns {
            removed.extend(state.topology.replace(BankId::new(id), BankPattern::new())?);
        }
        self.clock.remove(&removed)
    }

    pub fn set_column_mute_pattern(&self, bank: BankId, flags: Vec<bool>) -> Result<(), SequencerError> {
        self.check_bank(bank)?;
        let mute = MutePattern::new(flags).ok_or(SequencerError::InvalidMutePattern)?;
        self.clock.lock().topology.bank_mut(bank)?.mute = mute;
        Ok(())
    }

    pub fn mute_column(&self, bank: BankId) -> Result<(), SequencerError> {
        self.set_column_mute_pattern(bank, vec![false])
    }

    pub fn unmute_column(&self, bank: BankId) -> Result<(), SequencerError> {
        self.set_column_mute_pattern(bank, vec![true])
    }

    /// Cycle length of one bank, `1..=cells`.
    pub fn set_column_length(&self, bank: BankId, length: u8) -> Result<(), SequencerError> {
        self.check_bank(bank)?;
        if length == 0 || length > self.layout.cells {
            return Err(SequencerError::CellOutOfRange { bank, cell: length });
        }
        self.clock.lock().topology.set_length(bank, length as usize)
    }

    pub fn get_column_state(&self, bank: BankId) -> Result<BankState, SequencerError> {
        self.check_bank(bank)?;
        let mut state = self.clock.lock();
        Ok(state.topology.bank_mut(bank)?.snapshot())
    }

    pub fn get_state(&self) -> BankedState {
        let state = self.clock.lock();
        BankedState {
            banks: state
                .topology
                .banks
                .iter()
                .map(|(id, bank)| (*id, bank.snapshot()))
                .collect(),
            position: state.position,
            loop_count: state.loop_count,
            target_loops: state.target_loops,
            run_state: state.run_state,
            step_duration: state.step_duration,
        }
    }
}

impl Sequencer for BankedSequencer {
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
            SequencerEvent::SetColumnPattern { bank, pattern } => self.set_column_pattern(bank, pattern),
            SequencerEvent::Clear => self.clear(),
            SequencerEvent::ClearColumn { bank } => self.clear_column(bank),
            SequencerEvent::MuteColumn { bank } => self.mute_column(bank),
            SequencerEvent::UnmuteColumn { bank } => self.unmute_column(bank),
            SequencerEvent::SetMutePattern { bank, pattern } => {
                self.set_column_mute_pattern(bank, pattern)
            }
            SequencerEvent::SetLoops { loops } => self.set_loops(loops),
            SequencerEvent::Pause => self.pause(),
            SequencerEvent::Resume => self.resume(),
            SequencerEvent::Stop => {
                self.stop();
                Ok(())
            }
            SequencerEvent::Cleanup => self.cleanup(),
            SequencerEvent::SetPattern { .. } => {
                Err(SequencerError::UnsupportedEvent("set_pattern".to_string()))
            }
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

    fn cells(entries: &[(u8, u8)]) -> BankPattern {
        entries.iter().map(|&(c, e)| (c, EmitterId::new(e))).collect()
    }

    #[test]
    fn banks_wrap_at_their_own_length() {
        let mut grid = BankGrid::new(GridLayout::default());
        grid.bank_mut(BankId::new(1)).unwrap().length = 3;
        for _ in 0..8 {
            grid.advance();
        }
        let short = &grid.banks[&BankId::new(1)];
        let full = &grid.banks[&BankId::new(2)];
        assert_eq!((short.position, short.loop_count), (2, 2));
        assert_eq!((full.position, full.loop_count), (0, 1));
    }

    #[test]
    fn shrinking_below_the_position_wraps_the_bank() {
        let mut grid = BankGrid::new(GridLayout::default());
        grid.replace(BankId::new(1), cells(&[(1, 4)])).unwrap();
        for _ in 0..5 {
            grid.advance();
        }
        grid.set_length(BankId::new(1), 3).unwrap();
        let bank = &grid.banks[&BankId::new(1)];
        assert_eq!((bank.position, bank.length, bank.loop_count), (0, 3, 1));
        assert_eq!(grid.plan(5).len(), 1);

        grid.set_length(BankId::new(1), 8).unwrap();
        assert_eq!(grid.banks[&BankId::new(1)].position, 0);
    }

    #[test]
    fn muted_loop_vacates_the_cell_placed_on_an_earlier_loop() {
        let mut grid = BankGrid::new(GridLayout::default());
        grid.replace(BankId::new(1), cells(&[(1, 3)])).unwrap();
        grid.bank_mut(BankId::new(1)).unwrap().mute = MutePattern::new(vec![true, false]).unwrap();
        assert!(grid.vacate(0).is_empty());
        assert_eq!(grid.plan(0).len(), 1);
        for _ in 0..8 {
            grid.advance();
        }
        let placed = Placement {
            emitter: EmitterId::new(3),
            column: 1,
            cell: 1,
        };
        assert_eq!(grid.vacate(0), vec![placed]);
        assert!(grid.plan(0).is_empty());
        assert!(grid.vacate(0).is_empty());
        assert!(grid.take_placed().is_empty());
    }

    #[test]
    fn muted_loop_plans_nothing() {
        let mut grid = BankGrid::new(GridLayout::default());
        grid.replace(BankId::new(2), cells(&[(1, 2)])).unwrap();
        grid.bank_mut(BankId::new(2)).unwrap().mute = MutePattern::new(vec![false, true]).unwrap();
        assert!(grid.plan(0).is_empty());
        for _ in 0..8 {
            grid.advance();
        }
        assert_eq!(
            grid.plan(0),
            vec![Placement {
                emitter: EmitterId::new(2),
                column: 2,
                cell: 1
            }]
        );
    }

    fn sequencer() -> BankedSequencer {
        let dispatcher = Arc::new(Dispatcher::new(Box::new(RecordingSink::new())));
        let pool = Arc::new(EmitterPool::new(dispatcher, PlaybackSettings::default()).unwrap());
        BankedSequencer::new(
            pool,
            Timing::StepDuration(Duration::from_millis(10)),
            SequencerOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn setters_validate_their_input() {
        let seq = sequencer();
        assert_eq!(
            seq.set_column_pattern(BankId::new(9), cells(&[(1, 1)])),
            Err(SequencerError::BankOutOfRange(BankId::new(9)))
        );
        assert_eq!(
            seq.set_column_pattern(BankId::new(1), cells(&[(0, 1)])),
            Err(SequencerError::CellOutOfRange {
                bank: BankId::new(1),
                cell: 0
            })
        );
        assert_eq!(
            seq.set_column_mute_pattern(BankId::new(1), vec![]),
            Err(SequencerError::InvalidMutePattern)
        );
        assert!(seq.set_column_length(BankId::new(1), 9).is_err());
    }

    #[test]
    fn mute_events_set_single_flag_schedules() {
        let seq = sequencer();
        seq.dispatch_json(r#"{"action": "mute_column", "column": 4}"#).unwrap();
        let state = seq.get_column_state(BankId::new(4)).unwrap();
        assert_eq!(state.mute_pattern, MutePattern::never());
        seq.dispatch_json(r#"{"action": "set_mute_pattern", "bank": 4, "pattern": [1, 0, 0]}"#)
            .unwrap();
        let state = seq.get_column_state(BankId::new(4)).unwrap();
        assert_eq!(state.mute_pattern.flags(), &[true, false, false]);
        assert!(seq
            .dispatch_json(r#"{"action": "set_pattern", "pattern": {}}"#)
            .is_err());
    }

    #[test]
    fn state_reports_every_bank() {
        let seq = sequencer();
        seq.set_column_pattern(BankId::new(1), cells(&[(1, 1), (3, 1)])).unwrap();
        let state = seq.get_state();
        assert_eq!(state.banks.len(), 8);
        assert_eq!(state.banks[&BankId::new(1)].pattern.len(), 2);
        assert_eq!(state.run_state, RunState::Idle);
    }
}
