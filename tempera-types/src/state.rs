//! Read-only sequencer snapshots.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BankId, BankPattern, LinearPattern, MutePattern};

/// Transport state of a sequencer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
    /// A stop was requested; the clock loop is emitting cleanup and exiting.
    Stopping,
}

impl RunState {
    pub fn is_active(self) -> bool {
        !matches!(self, RunState::Idle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearState {
    pub pattern: LinearPattern,
    pub position: usize,
    /// Steps in one loop of the current pattern.
    pub cycle_len: usize,
    pub loop_count: u64,
    /// 0 = loop forever.
    pub target_loops: u32,
    pub run_state: RunState,
    pub step_duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankState {
    pub pattern: BankPattern,
    pub mute_pattern: MutePattern,
    pub position: usize,
    pub length: usize,
    pub loop_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankedState {
    pub banks: BTreeMap<BankId, BankState>,
    pub position: usize,
    pub loop_count: u64,
    pub target_loops: u32,
    pub run_state: RunState,
    pub step_duration: Duration,
}
