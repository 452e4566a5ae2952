//! Clock-domain primitives.
//!
//! A derived clock domain is built from a [`ClockDivider`] (power-of-two
//! ratio, enable, phase) and optionally a [`ClockMux`] choosing between
//! several upstream sources. Both are plain state machines driven from a
//! component's clock slave handlers; the component decides what to do with
//! the emitted level (usually `sync` it on a [`ClockMaster`](crate::port::ClockMaster)).

use serde::{Deserialize, Serialize};

/// Largest supported divider exponent.
pub const MAX_DIVIDER_EXPONENT: u32 = 31;

/// Behavior of a divider while its enable is low.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisabledMode {
    /// No output edges
    #[default]
    Gate,
    /// Every source edge produces an output edge
    Bypass,
}

/// Power-of-two clock divider.
///
/// While enabled, the phase counter advances on every source edge; after
/// `2^exponent` edges one output edge is emitted and the phase restarts.
/// Output levels alternate, starting low. While disabled the phase is
/// frozen, so re-enabling resumes where counting stopped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDivider {
    phase: u64,
    level: bool,
    mode: DisabledMode,
}

impl ClockDivider {
    pub fn new(mode: DisabledMode) -> Self {
        Self {
            phase: 0,
            level: false,
            mode,
        }
    }

    /// Feeds one source edge. Returns the level to emit, if any.
    ///
    /// Panics if `exponent` exceeds [`MAX_DIVIDER_EXPONENT`].
    pub fn on_source_edge(&mut self, enabled: bool, exponent: u32) -> Option<bool> {
        assert!(
            exponent <= MAX_DIVIDER_EXPONENT,
            "divider exponent {} out of range",
            exponent
        );

        if !enabled {
            return match self.mode {
                DisabledMode::Gate => None,
                DisabledMode::Bypass => Some(self.emit()),
            };
        }

        self.phase += 1;
        if self.phase >= 1u64 << exponent {
            self.phase = 0;
            Some(self.emit())
        } else {
            None
        }
    }

    fn emit(&mut self) -> bool {
        let level = self.level;
        self.level = !self.level;
        level
    }

    /// Restarts counting from zero (divider reprogrammed).
    pub fn reset_phase(&mut self) {
        self.phase = 0;
    }

    /// Returns to the power-on state.
    pub fn reset(&mut self) {
        self.phase = 0;
        self.level = false;
    }

    pub fn phase(&self) -> u64 {
        self.phase
    }

    /// Level of the next emitted edge.
    pub fn next_level(&self) -> bool {
        self.level
    }

    pub fn mode(&self) -> DisabledMode {
        self.mode
    }
}

/// Clock source selector.
///
/// The selection is only sampled when an edge arrives, so a change takes
/// effect on the next edge of the newly selected source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockMux {
    selected: usize,
}

impl ClockMux {
    pub fn new(selected: usize) -> Self {
        Self { selected }
    }

    pub fn select(&mut self, source: usize) {
        self.selected = source;
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// True if an edge from `source` should be forwarded.
    pub fn accepts(&self, source: usize) -> bool {
        self.selected == source
    }
}
