//! The step clock shared by both topologies.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tempera_types::{EmitterId, RunState};

use super::Timing;
use crate::dispatcher::Delivery;
use crate::emitter::{distinct_emitters, EmitterPool, Placement};
use crate::error::{ControlError, DispatchError, SequencerError};

/// Pattern geometry of one sequencer.
pub(crate) trait Topology: Send {
    /// Steps in one global loop.
    fn cycle_len(&self) -> usize;

    /// Cells active at global step `position`. Returned cells are recorded as
    /// placed on the device.
    fn plan(&mut self, position: usize) -> Vec<Placement>;

    /// Placed cells to take off the device before step `position` is planned.
    fn vacate(&mut self, _position: usize) -> Vec<Placement> {
        Vec::new()
    }

    /// Move per-bank counters on after a step.
    fn advance(&mut self) {}

    /// Back to step 0 for a new run.
    fn rewind(&mut self) {}

    /// Forget every placement, returning them for removal.
    fn take_placed(&mut self) -> Vec<Placement>;
}

pub(crate) struct ClockState<T> {
    pub run_state: RunState,
    pub target_loops: u32,
    pub position: usize,
    pub loop_count: u64,
    pub step_duration: Duration,
    pub steps_per_beat: f64,
    pub topology: T,
    sounding: Vec<EmitterId>,
}

enum Wake {
    Elapsed,
    Stopped,
}

enum Hold {
    Running,
    Resumed,
    Stopped,
}

pub(crate) struct Clock<T> {
    state: Mutex<ClockState<T>>,
    // Rung on every transport change so waits re-check the state.
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
    pool: Arc<EmitterPool>,
    gate_ratio: f64,
}

impl<T: Topology> Clock<T> {
    pub fn new(
        pool: Arc<EmitterPool>,
        timing: Timing,
        gate_ratio: f64,
        topology: T,
    ) -> Result<Self, SequencerError> {
        let step_duration = timing.step_duration()?;
        let (doorbell_tx, doorbell_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            state: Mutex::new(ClockState {
                run_state: RunState::Idle,
                target_loops: 0,
                position: 0,
                loop_count: 0,
                step_duration,
                steps_per_beat: timing.steps_per_beat(),
                topology,
                sounding: Vec::new(),
            }),
            doorbell_tx,
            doorbell_rx,
            pool,
            gate_ratio: gate_ratio.clamp(0.01, 1.0),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, ClockState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ring(&self) {
        let _ = self.doorbell_tx.send(());
    }

    pub fn run(&self, loops: u32) -> Result<(), SequencerError> {
        {
            let mut state = self.lock();
            if state.run_state != RunState::Idle {
                return Err(SequencerError::AlreadyRunning);
            }
            state.run_state = RunState::Running;
            state.target_loops = loops;
            state.position = 0;
            state.loop_count = 0;
            state.topology.rewind();
        }
        while self.doorbell_rx.try_recv().is_ok() {}
        log::info!(target: "sequencer", "run started (loops: {})", loops);

        let result = self.tick_loop();
        let loop_count = {
            let mut state = self.lock();
            state.run_state = RunState::Idle;
            state.loop_count
        };
        match &result {
            Ok(()) => log::info!(target: "sequencer", "run finished after {} loop(s)", loop_count),
            Err(e) => log::error!(target: "sequencer", "run aborted: {}", e),
        }
        result
    }

    fn tick_loop(&self) -> Result<(), SequencerError> {
        let mut boundary = Instant::now();
        loop {
            match self.hold_while_paused() {
                Hold::Stopped => return Ok(()),
                Hold::Resumed => {
                    boundary = Instant::now() + self.lock().step_duration;
                    if let Wake::Stopped = self.sleep_until(boundary) {
                        return Ok(());
                    }
                    continue;
                }
                Hold::Running => {}
            }

            let step_start = boundary;
            let (emitters, step_duration) = self.begin_step()?;
            boundary = step_start + step_duration;

            if !emitters.is_empty() {
                let release_at = step_start + step_duration.mul_f64(self.gate_ratio);
                let wake = self.sleep_until(release_at);
                self.end_step(&emitters)?;
                if let Wake::Stopped = wake {
                    return Ok(());
                }
            }

            let finished = self.advance();
            if let Wake::Stopped = self.sleep_until(boundary) {
                return Ok(());
            }
            if finished {
                return Ok(());
            }
        }
    }

    /// Plan the current step and submit its removals, then its activation,
    /// under the state lock so a concurrent pattern change or cleanup is
    /// ordered around them.
    fn begin_step(&self) -> Result<(Vec<EmitterId>, Duration), SequencerError> {
        let mut state = self.lock();
        let position = state.position;
        let vacated = state.topology.vacate(position);
        if !vacated.is_empty() {
            log::debug!(target: "sequencer", "step {}: removing {} muted cells", position, vacated.len());
            submitted(self.pool.remove_cells(&vacated))?;
        }
        let placements = state.topology.plan(position);
        let emitters = distinct_emitters(&placements);
        if !placements.is_empty() {
            log::debug!(target: "sequencer", "step {}: activating {:?}", position, emitters);
            submitted(self.pool.activate_step(&placements))?;
            state.sounding = emitters.clone();
        }
        Ok((emitters, state.step_duration))
    }

    fn end_step(&self, emitters: &[EmitterId]) -> Result<(), SequencerError> {
        let mut state = self.lock();
        state.sounding.clear();
        submitted(self.pool.deactivate_step(emitters))
    }

    /// Returns true once the loop target has been reached.
    fn advance(&self) -> bool {
        let mut state = self.lock();
        state.topology.advance();
        state.position += 1;
        if state.position >= state.topology.cycle_len() {
            state.position = 0;
            state.loop_count += 1;
            log::debug!(target: "sequencer", "loop {} complete", state.loop_count);
            return state.target_loops != 0 && state.loop_count >= state.target_loops as u64;
        }
        false
    }

    fn sleep_until(&self, deadline: Instant) -> Wake {
        loop {
            if self.lock().run_state == RunState::Stopping {
                return Wake::Stopped;
            }
            match self.doorbell_rx.recv_deadline(deadline) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Wake::Elapsed
                }
            }
        }
    }

    fn hold_while_paused(&self) -> Hold {
        let mut held = false;
        loop {
            match self.lock().run_state {
                RunState::Paused => held = true,
                RunState::Stopping => return Hold::Stopped,
                RunState::Running | RunState::Idle if held => return Hold::Resumed,
                RunState::Running | RunState::Idle => return Hold::Running,
            }
            if self.doorbell_rx.recv().is_err() {
                return Hold::Stopped;
            }
        }
    }

    pub fn stop(&self) {
        let mut state = self.lock();
        if matches!(state.run_state, RunState::Running | RunState::Paused) {
            state.run_state = RunState::Stopping;
            drop(state);
            log::info!(target: "sequencer", "stop requested");
            self.ring();
        }
    }

    pub fn pause(&self) -> Result<(), SequencerError> {
        let mut state = self.lock();
        match state.run_state {
            RunState::Running => {
                state.run_state = RunState::Paused;
                log::info!(target: "sequencer", "paused at step {}", state.position);
                Ok(())
            }
            RunState::Paused => Ok(()),
            RunState::Idle | RunState::Stopping => Err(SequencerError::NotRunning),
        }
    }

    pub fn resume(&self) -> Result<(), SequencerError> {
        let mut state = self.lock();
        match state.run_state {
            RunState::Paused => {
                state.run_state = RunState::Running;
                drop(state);
                log::info!(target: "sequencer", "resumed");
                self.ring();
                Ok(())
            }
            RunState::Running => Ok(()),
            RunState::Idle | RunState::Stopping => Err(SequencerError::NotRunning),
        }
    }

    pub fn set_loops(&self, loops: u32) -> Result<(), SequencerError> {
        let mut state = self.lock();
        match state.run_state {
            RunState::Running | RunState::Paused => {
                state.target_loops = loops;
                Ok(())
            }
            RunState::Idle | RunState::Stopping => Err(SequencerError::NotRunning),
        }
    }

    pub fn set_timing(&self, timing: Timing) -> Result<(), SequencerError> {
        let step_duration = timing.step_duration()?;
        let mut state = self.lock();
        state.step_duration = step_duration;
        state.steps_per_beat = timing.steps_per_beat();
        log::debug!(target: "sequencer", "step duration now {:?}", step_duration);
        Ok(())
    }

    pub fn set_bpm(&self, bpm: f64) -> Result<(), SequencerError> {
        let steps_per_beat = self.lock().steps_per_beat;
        self.set_timing(Timing::tempo(bpm, steps_per_beat))
    }

    pub fn cleanup(&self) -> Result<(), SequencerError> {
        let mut state = self.lock();
        let sounding = std::mem::take(&mut state.sounding);
        let placed = state.topology.take_placed();
        if !sounding.is_empty() {
            let _ = self.pool.deactivate_step(&sounding)?;
        }
        if !placed.is_empty() {
            let _ = self.pool.remove_cells(&placed)?;
        }
        log::debug!(target: "sequencer", "cleanup removed {} placement(s)", placed.len());
        Ok(())
    }

    /// Submit removals for cells a pattern change dropped.
    pub fn remove(&self, removed: &[Placement]) -> Result<(), SequencerError> {
        if !removed.is_empty() {
            let _ = self.pool.remove_cells(removed)?;
        }
        Ok(())
    }

    pub fn run_state(&self) -> RunState {
        self.lock().run_state
    }
}

/// A closed dispatcher ends the run; anything else is logged and the clock
/// keeps going.
fn submitted(result: Result<Delivery, ControlError>) -> Result<(), SequencerError> {
    match result {
        Ok(_) => Ok(()),
        Err(ControlError::Dispatch(DispatchError::Closed)) => Err(DispatchError::Closed.into()),
        Err(e) => {
            log::warn!(target: "sequencer", "step messages rejected: {}", e);
            Ok(())
        }
    }
}
