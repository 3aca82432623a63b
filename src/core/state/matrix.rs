//! Matrix switcher state

use super::mapping::{MappingTable, MappingType, OutputTie};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Front panel lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Panel unlocked
    #[default]
    None = 0,
    /// Panel fully locked
    All = 1,
    /// Advanced lock
    Advanced = 2,
}

impl LockMode {
    /// Decode the numeric lock mode report
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::None),
            1 => Some(Self::All),
            2 => Some(Self::Advanced),
            _ => None,
        }
    }
}

/// Port counts reported by identify
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Input ports
    pub inputs: u16,
    /// Output ports
    pub outputs: u16,
}

#[derive(Debug, Default)]
struct Bootstrap {
    generation: u64,
    queries_sent: bool,
    outstanding: HashSet<(u16, MappingType)>,
}

/// Shared matrix state, written by the dispatcher and the bootstrap task
#[derive(Debug, Default)]
pub struct MatrixState {
    topology: RwLock<Topology>,
    firmware: RwLock<Option<String>>,
    lock_mode: RwLock<LockMode>,
    table: MappingTable,
    bootstrap: Mutex<Bootstrap>,
}

impl MatrixState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new topology and allocate a zeroed tie table
    ///
    /// Starts a new bootstrap round and returns its generation; every
    /// output must then report both its video and audio tie.
    pub fn begin_bootstrap(&self, topology: Topology) -> u64 {
        *self.topology.write() = topology;
        self.table.allocate(topology.outputs);

        let mut bootstrap = self.bootstrap.lock();
        bootstrap.generation = bootstrap.generation.wrapping_add(1);
        bootstrap.queries_sent = false;
        bootstrap.outstanding = (1..=topology.outputs)
            .flat_map(|o| [(o, MappingType::Video), (o, MappingType::Audio)])
            .collect();
        bootstrap.generation
    }

    /// Mark every bootstrap query of `generation` as written
    ///
    /// Returns whether the state is now complete.
    pub fn finish_queries(&self, generation: u64) -> bool {
        let mut bootstrap = self.bootstrap.lock();
        if bootstrap.generation != generation {
            return false;
        }
        bootstrap.queries_sent = true;
        bootstrap.outstanding.is_empty()
    }

    /// Whether the bootstrap round has completed
    pub fn is_bootstrapped(&self) -> bool {
        let bootstrap = self.bootstrap.lock();
        bootstrap.queries_sent && bootstrap.outstanding.is_empty()
    }

    /// Apply a confirmed tie
    ///
    /// Returns whether this update completed the bootstrap round.
    pub fn apply_tie(&self, output: u16, input: u16, kind: MappingType) -> bool {
        if !self.table.apply(output, input, kind) {
            return false;
        }

        let mut bootstrap = self.bootstrap.lock();
        if bootstrap.outstanding.is_empty() {
            return false;
        }
        if kind.has_video() {
            bootstrap.outstanding.remove(&(output, MappingType::Video));
        }
        if kind.has_audio() {
            bootstrap.outstanding.remove(&(output, MappingType::Audio));
        }
        bootstrap.queries_sent && bootstrap.outstanding.is_empty()
    }

    /// Outputs still waiting for a bootstrap response
    pub fn outstanding(&self) -> usize {
        self.bootstrap.lock().outstanding.len()
    }

    /// Reset everything, invalidating any running bootstrap
    pub fn reset(&self) {
        *self.topology.write() = Topology::default();
        *self.firmware.write() = None;
        *self.lock_mode.write() = LockMode::default();
        self.table.clear();
        let mut bootstrap = self.bootstrap.lock();
        bootstrap.generation = bootstrap.generation.wrapping_add(1);
        bootstrap.queries_sent = false;
        bootstrap.outstanding.clear();
    }

    /// Reported port counts
    pub fn topology(&self) -> Topology {
        *self.topology.read()
    }

    /// Input port count
    pub fn inputs(&self) -> u16 {
        self.topology.read().inputs
    }

    /// Output port count
    pub fn outputs(&self) -> u16 {
        self.topology.read().outputs
    }

    /// Set the firmware version
    pub fn set_firmware(&self, version: &str) {
        *self.firmware.write() = Some(version.to_string());
    }

    /// Firmware version
    pub fn firmware(&self) -> Option<String> {
        self.firmware.read().clone()
    }

    /// Set the lock mode
    pub fn set_lock_mode(&self, mode: LockMode) {
        *self.lock_mode.write() = mode;
    }

    /// Front panel lock mode
    pub fn lock_mode(&self) -> LockMode {
        *self.lock_mode.read()
    }

    /// Tie table
    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// Copy of every tie, ordered by output
    pub fn mappings(&self) -> Vec<OutputTie> {
        self.table.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_needs_both_media_per_output() {
        let state = MatrixState::new();
        let generation = state.begin_bootstrap(Topology { inputs: 8, outputs: 2 });
        assert_eq!(state.outstanding(), 4);

        assert!(!state.apply_tie(1, 3, MappingType::Video));
        assert!(!state.apply_tie(1, 3, MappingType::Audio));
        assert!(!state.apply_tie(2, 1, MappingType::All));
        assert_eq!(state.outstanding(), 0);
        assert!(!state.is_bootstrapped());

        assert!(state.finish_queries(generation));
        assert!(state.is_bootstrapped());
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let state = MatrixState::new();
        let old = state.begin_bootstrap(Topology { inputs: 4, outputs: 1 });
        let _new = state.begin_bootstrap(Topology { inputs: 4, outputs: 1 });
        state.apply_tie(1, 2, MappingType::All);

        assert!(!state.finish_queries(old));
        assert!(!state.is_bootstrapped());
    }

    #[test]
    fn test_lock_mode_numbers() {
        assert_eq!(LockMode::from_number(2), Some(LockMode::Advanced));
        assert_eq!(LockMode::from_number(7), None);
    }
}
