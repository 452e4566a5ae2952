//! Event-driven clock source.
//!
//! The `ClockGenerator` toggles its output every half period and delivers
//! each edge to every slave bound on its `out` port. It keeps its own
//! timebase running while gated, so re-enabling it stays phase-aligned with
//! the original period.

use crate::component::{Build, Component};
use crate::engine::EngineHandle;
use crate::error::BuildError;
use crate::event::Event;
use crate::port::{ClockMaster, WireSlave};
use crate::trace::Trace;
use crate::types::{ComponentId, SimTime};

const TICK: u64 = 0;

/// A free-running clock.
///
/// # Configuration
///
/// | Key | Type | Default | Meaning |
/// |-----|------|---------|---------|
/// | `period` | integer | required | Full period in time units (at least 2) |
/// | `enabled` | bool | `true` | Initial state of the gate |
///
/// # Ports
///
/// - `out` (clock master, broadcast): one edge per half period
/// - `enable` (wire<bool> slave): gates the output
///
/// # Example
///
/// ```rust
/// use vplat::components::{ClockCounter, ClockGenerator};
/// use vplat::config::ConfigNode;
/// use vplat::engine::Simulation;
///
/// let mut sim = Simulation::new();
/// sim.add("clk", ClockGenerator::new(), ConfigNode::empty("clk").with("period", 4)).unwrap();
/// let cnt = sim.add("cnt", ClockCounter::new(), ConfigNode::empty("cnt")).unwrap();
/// sim.connect("clk/out", "cnt/clock").unwrap();
///
/// sim.run(20).unwrap();
/// // Edges at 2, 4, ..., 20
/// assert_eq!(sim.component::<ClockCounter>(cnt).unwrap().edges(), 10);
/// ```
#[derive(Debug)]
pub struct ClockGenerator {
    out: ClockMaster,
    id: ComponentId,
    engine: EngineHandle,
    trace: Trace,
    half_period: SimTime,
    enabled: bool,
    reset_enabled: bool,
    level: bool,
    edges: u64,
}

impl ClockGenerator {
    pub fn new() -> Self {
        Self {
            out: ClockMaster::new(),
            id: ComponentId(0),
            engine: EngineHandle::default(),
            trace: Trace::new("", "trace"),
            half_period: 0,
            enabled: true,
            reset_enabled: true,
            level: false,
            edges: 0,
        }
    }

    /// Number of edges produced on `out` (gated edges excluded).
    pub fn edges(&self) -> u64 {
        self.edges
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current output level.
    pub fn level(&self) -> bool {
        self.level
    }

    pub fn half_period(&self) -> SimTime {
        self.half_period
    }

    fn next_tick(&self) -> Event {
        Event::new(self.engine.time() + self.half_period, self.id, TICK)
    }

    fn on_enable(&mut self, enabled: bool) {
        if enabled != self.enabled {
            self.trace
                .debug(format_args!("Clock {}", if enabled { "enabled" } else { "gated" }));
        }
        self.enabled = enabled;
    }
}

impl Default for ClockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for ClockGenerator {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        let period = b.config().get_u64("period")?;
        if period < 2 {
            return Err(BuildError::Invalid(format!(
                "clock period must be at least 2, got {}",
                period
            )));
        }
        self.half_period = period / 2;
        self.reset_enabled = b.config().get_bool_or("enabled", true)?;
        self.id = b.id();
        self.engine = b.engine();
        self.trace = b.trace("trace");

        b.new_master_port("out", &self.out)?;
        b.new_slave_port("enable", WireSlave::new(Self::on_enable))?;
        Ok(())
    }

    fn reset(&mut self, active: bool) {
        if active {
            self.enabled = self.reset_enabled;
            self.level = false;
        }
    }

    fn start(&mut self) -> Vec<Event> {
        vec![self.next_tick()]
    }

    fn on_event(&mut self, event: &Event) -> Vec<Event> {
        if event.tag != TICK {
            return Vec::new();
        }
        if self.enabled {
            self.level = !self.level;
            self.edges += 1;
            if self.out.is_bound() {
                self.out.sync(self.level);
            }
        }
        vec![self.next_tick()]
    }

    fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "half_period": self.half_period,
            "enabled": self.enabled,
            "edges": self.edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::mock::{ClockCounter, WireProbe};
    use crate::config::ConfigNode;
    use crate::engine::Simulation;
    use crate::error::SimError;

    fn config(period: u64) -> ConfigNode {
        ConfigNode::empty("clk").with("period", period)
    }

    #[test]
    fn test_period_too_short() {
        let mut sim = Simulation::new();
        sim.add("clk", ClockGenerator::new(), config(1)).unwrap();
        assert!(matches!(
            sim.build(),
            Err(SimError::Build {
                source: BuildError::Invalid(_),
                ..
            })
        ));
    }

    #[test]
    fn test_edge_levels_alternate() {
        let mut sim = Simulation::new();
        sim.add("clk", ClockGenerator::new(), config(10)).unwrap();
        let cnt = sim
            .add("cnt", ClockCounter::new(), ConfigNode::empty("cnt"))
            .unwrap();
        sim.connect("clk/out", "cnt/clock").unwrap();

        sim.run(15).unwrap();
        let cnt = sim.component::<ClockCounter>(cnt).unwrap();
        assert_eq!(cnt.edges(), 3);
        assert_eq!(cnt.rising_edges(), 2);
    }

    #[test]
    fn test_gating_through_enable_wire() {
        let mut sim = Simulation::new();
        let clk = sim
            .add(
                "clk",
                ClockGenerator::new(),
                config(10).with("enabled", false),
            )
            .unwrap();
        let cnt = sim
            .add("cnt", ClockCounter::new(), ConfigNode::empty("cnt"))
            .unwrap();
        sim.connect("clk/out", "cnt/clock").unwrap();

        sim.run(20).unwrap();
        assert_eq!(sim.component::<ClockCounter>(cnt).unwrap().edges(), 0);

        sim.sync_wire(clk, "enable", true).unwrap();
        sim.run(40).unwrap();
        assert_eq!(sim.component::<ClockCounter>(cnt).unwrap().edges(), 4);
        assert_eq!(sim.component::<ClockGenerator>(clk).unwrap().edges(), 4);
    }

    #[test]
    fn test_slave_cannot_drive_slave() {
        let mut sim = Simulation::new();
        sim.add("clk", ClockGenerator::new(), config(4)).unwrap();
        sim.add("probe", WireProbe::<bool>::new(), ConfigNode::empty("probe"))
            .unwrap();
        // Slave to slave is a direction error, not a kind error.
        sim.connect("probe/input", "clk/enable").unwrap();
        assert!(matches!(sim.build(), Err(SimError::Bind(_))));
    }
}
