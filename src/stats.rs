//! Statistics reports for a simulation run.
//!
//! [`SimulationStats`] gathers the engine counters, the per-component JSON
//! exports and wall-clock timing into one serializable report, with JSON,
//! CSV and human-readable renderings.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::engine::EngineStats;
use crate::types::SimTime;

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Simulation metadata
    pub metadata: SimulationMetadata,

    /// Engine-level statistics
    pub engine: EngineSummary,

    /// Per-component exports, keyed by instance name
    pub components: serde_json::Value,

    /// Timing statistics
    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Simulation name/description
    pub name: String,

    /// Crate version that produced the report
    pub version: String,

    /// Configuration file used (if any)
    pub config_file: Option<String>,
}

/// Engine-level statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineSummary {
    /// Final simulation time
    pub final_time: SimTime,

    /// Exit code, if a component halted the run
    pub exit_code: Option<i32>,

    #[serde(flatten)]
    pub counters: EngineStats,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Simulation time per wall-clock second
    pub sim_time_per_second: f64,

    /// Events processed per second
    pub events_per_second: f64,
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Builds a report from engine counters.
    pub fn from_engine(final_time: SimTime, exit_code: Option<i32>, counters: &EngineStats) -> Self {
        let mut stats = Self::new();
        stats.engine = EngineSummary {
            final_time,
            exit_code,
            counters: counters.clone(),
        };
        stats
    }

    /// Sets the simulation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Attaches per-component exports.
    pub fn with_components(mut self, components: serde_json::Value) -> Self {
        self.components = components;
        self
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.sim_time_per_second = self.engine.final_time as f64 / seconds;
            self.timing.events_per_second = self.engine.counters.events_processed as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let counters = &self.engine.counters;
        let mut csv = String::from("metric,value\n");
        let rows: [(&str, String); 8] = [
            ("final_time", self.engine.final_time.to_string()),
            (
                "exit_code",
                self.engine.exit_code.map(|c| c.to_string()).unwrap_or_default(),
            ),
            ("events_processed", counters.events_processed.to_string()),
            ("events_scheduled", counters.events_scheduled.to_string()),
            ("io_requests", counters.io_requests.to_string()),
            ("resets", counters.resets.to_string()),
            ("peak_queue_len", counters.peak_queue_len.to_string()),
            ("wall_time_ms", format!("{:.2}", self.timing.total_wall_time_ms)),
        ];
        for (metric, value) in rows {
            let _ = writeln!(csv, "{},{}", metric, value);
        }
        csv
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let counters = &self.engine.counters;
        let mut out = String::new();
        let _ = writeln!(out, "=== Simulation Statistics ===");
        if !self.metadata.name.is_empty() {
            let _ = writeln!(out, "Name: {}", self.metadata.name);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Engine ---");
        let _ = writeln!(out, "Final simulation time: {}", self.engine.final_time);
        match self.engine.exit_code {
            Some(code) => {
                let _ = writeln!(out, "Exit code: {}", code);
            }
            None => {
                let _ = writeln!(out, "Exit code: none");
            }
        }
        let _ = writeln!(out, "Events processed: {}", counters.events_processed);
        let _ = writeln!(out, "Events scheduled: {}", counters.events_scheduled);
        let _ = writeln!(out, "I/O requests: {}", counters.io_requests);
        let _ = writeln!(out, "Resets: {}", counters.resets);
        let _ = writeln!(out, "Peak queue length: {}", counters.peak_queue_len);
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Timing ---");
        let _ = writeln!(out, "Wall time: {:.2} ms", self.timing.total_wall_time_ms);
        let _ = writeln!(out, "Sim time/sec: {:.2}", self.timing.sim_time_per_second);
        let _ = writeln!(out, "Events/sec: {:.2}", self.timing.events_per_second);

        if let Some(components) = self.components.as_object() {
            let _ = writeln!(out);
            let _ = writeln!(out, "--- Components ---");
            for (name, export) in components {
                let _ = writeln!(out, "{}: {}", name, export);
            }
        }
        out
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
