//! Simulation engine (platform owner and event loop).
//!
//! The [`Simulation`] owns every component of a platform. It drives the
//! lifecycle (build, bind, reset, start), resolves the binding manifest,
//! and advances logical time by delivering scheduled [`Event`]s in time
//! order. Everything that happens inside one instant (port syncs, I/O
//! requests) is synchronous and runs inside the handler that caused it.

use std::cell::{Cell, Ref, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::component::{Build, Component, ComponentCell};
use crate::config::{ConfigNode, PlatformConfig};
use crate::error::{BindError, SimError, SimResult};
use crate::event::{Event, EventQueue};
use crate::hooks::{PowerCapture, PowerHook};
use crate::io::{IoReq, IoStatus};
use crate::port::{
    ClockDelegate, IoDelegate, PendingSyncs, PortKind, PortTable, SlaveEntry, SlaveOwner, WireDelegate,
    WireValue,
};
use crate::registry::ComponentRegistry;
use crate::stats::SimulationStats;
use crate::types::{ComponentId, PortPath, SimTime};

/// Counters maintained by the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Events delivered to components
    pub events_processed: u64,
    /// Events accepted into the queue
    pub events_scheduled: u64,
    /// Requests injected through `io_request`
    pub io_requests: u64,
    /// Reset assertions
    pub resets: u64,
    /// Largest queue length seen
    pub peak_queue_len: usize,
}

#[derive(Debug, Default)]
struct EngineState {
    time: Cell<SimTime>,
    exit: Cell<Option<i32>>,
}

/// Component-side handle on the engine.
///
/// Gives access to the current time and lets a component request the end
/// of the simulation.
#[derive(Clone, Debug, Default)]
pub struct EngineHandle {
    state: Rc<EngineState>,
}

impl EngineHandle {
    /// Current logical time.
    pub fn time(&self) -> SimTime {
        self.state.time.get()
    }

    /// Requests a halt with `code`. The first request wins.
    pub fn stop(&self, code: i32) {
        if self.state.exit.get().is_none() {
            tracing::info!(code, time = self.time(), "Halt requested");
            self.state.exit.set(Some(code));
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.exit.get().is_some()
    }

    /// Exit code of the requested halt, if any.
    pub fn exit_code(&self) -> Option<i32> {
        self.state.exit.get()
    }

    fn set_time(&self, time: SimTime) {
        self.state.time.set(time);
    }
}

/// Why [`Simulation::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// No event left to deliver
    Idle,
    /// The next event lies beyond the time limit
    TimeLimit,
    /// A component requested a halt
    Halted { code: i32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Assembling,
    Built,
    Started,
    Broken,
}

struct Entry {
    name: String,
    cell: Rc<ComponentCell>,
    pending: Rc<PendingSyncs>,
    config: ConfigNode,
    ports: PortTable,
}

impl Entry {
    /// Runs `f` on the component, then delivers the syncs that looped back
    /// into it meanwhile.
    fn with_component<R>(&self, f: impl FnOnce(&mut dyn Component) -> R) -> R {
        let mut guard = self.cell.borrow_mut();
        let result = f(&mut **guard);
        self.pending.drain(&mut **guard);
        result
    }
}

/// A platform instance.
///
/// # Example
///
/// ```
/// use vplat::components::{ClockCounter, ClockGenerator};
/// use vplat::config::ConfigNode;
/// use vplat::engine::{RunOutcome, Simulation};
///
/// let mut sim = Simulation::new();
/// sim.add("clk", ClockGenerator::new(), ConfigNode::empty("clk").with("period", 10)).unwrap();
/// let counter = sim.add("counter", ClockCounter::new(), ConfigNode::empty("counter")).unwrap();
/// sim.connect("clk/out", "counter/clock").unwrap();
///
/// assert_eq!(sim.run(100).unwrap(), RunOutcome::TimeLimit);
/// assert_eq!(sim.component::<ClockCounter>(counter).unwrap().edges(), 20);
/// ```
pub struct Simulation {
    entries: Vec<Entry>,
    names: HashMap<String, ComponentId>,
    manifest: Vec<(PortPath, PortPath)>,
    queue: EventQueue,
    handle: EngineHandle,
    power: PowerHook,
    phase: Phase,
    reset_active: bool,
    stats: EngineStats,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    /// Creates an empty platform.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: HashMap::new(),
            manifest: Vec::new(),
            queue: EventQueue::new(),
            handle: EngineHandle::default(),
            power: PowerHook::detached(),
            phase: Phase::Assembling,
            reset_active: false,
            stats: EngineStats::default(),
        }
    }

    /// Installs the power-capture collaborator components will see.
    pub fn with_power_capture(mut self, capture: Rc<dyn PowerCapture>) -> Self {
        self.power = PowerHook::new(capture);
        self
    }

    /// Instantiates a platform from a configuration document.
    pub fn from_config(config: &PlatformConfig, registry: &ComponentRegistry) -> SimResult<Self> {
        config.validate()?;
        let mut sim = Self::new();
        for decl in &config.components {
            let component = registry.create(&decl.component_type).ok_or_else(|| {
                SimError::UnknownComponentType {
                    name: decl.name.clone(),
                    type_name: decl.component_type.clone(),
                }
            })?;
            sim.add_component(decl.name.clone(), component, decl.node())?;
        }
        for binding in &config.bindings {
            sim.connect(&binding.master, &binding.slave)?;
        }
        Ok(sim)
    }

    /// Adds a component under a unique name.
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        component: Box<dyn Component>,
        config: ConfigNode,
    ) -> SimResult<ComponentId> {
        if self.phase != Phase::Assembling {
            return Err(SimError::BindingClosed);
        }
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(SimError::InvalidComponentName(name));
        }
        if self.names.contains_key(&name) {
            return Err(SimError::DuplicateComponent(name));
        }

        let id = ComponentId(self.entries.len());
        self.names.insert(name.clone(), id);
        self.entries.push(Entry {
            name,
            cell: Rc::new(ComponentCell::new(component)),
            pending: Rc::new(PendingSyncs::default()),
            config,
            ports: PortTable::default(),
        });
        Ok(id)
    }

    /// Adds a component by value.
    pub fn add<C: Component>(
        &mut self,
        name: impl Into<String>,
        component: C,
        config: ConfigNode,
    ) -> SimResult<ComponentId> {
        self.add_component(name, Box::new(component), config)
    }

    /// Records a binding from a master port to a slave port.
    ///
    /// Paths are written `component/port` and resolved when the platform is
    /// built.
    pub fn connect(&mut self, master: &str, slave: &str) -> SimResult<()> {
        if self.phase != Phase::Assembling {
            return Err(SimError::BindingClosed);
        }
        let parse = |path: &str| {
            PortPath::parse(path).ok_or_else(|| BindError::MalformedPath(path.to_string()))
        };
        self.manifest.push((parse(master)?, parse(slave)?));
        Ok(())
    }

    /// Builds every component in insertion order, then resolves bindings.
    ///
    /// Any failure leaves the platform unusable.
    pub fn build(&mut self) -> SimResult<()> {
        match self.phase {
            Phase::Assembling => {}
            Phase::Broken => return Err(SimError::BindingClosed),
            Phase::Built | Phase::Started => return Ok(()),
        }

        let result = self.build_components().and_then(|()| self.resolve_manifest());
        match result {
            Ok(()) => {
                self.phase = Phase::Built;
                tracing::info!(
                    components = self.entries.len(),
                    "Platform built"
                );
                Ok(())
            }
            Err(e) => {
                self.phase = Phase::Broken;
                tracing::error!(error = %e, "Platform construction failed");
                Err(e)
            }
        }
    }

    fn build_components(&mut self) -> SimResult<()> {
        let Simulation {
            entries,
            handle,
            power,
            ..
        } = self;

        for (index, entry) in entries.iter_mut().enumerate() {
            let Entry {
                name,
                cell,
                pending,
                config,
                ports,
            } = entry;

            let owner_type = {
                let guard = cell.borrow();
                let component: &dyn Component = &**guard;
                component.as_any().type_id()
            };
            let owner = SlaveOwner::new(Rc::downgrade(cell), Rc::clone(pending));
            let mut guard = cell.borrow_mut();
            let mut b = Build::new(
                ComponentId(index),
                name,
                config,
                ports,
                owner,
                owner_type,
                handle,
                power,
            );
            guard.build(&mut b).map_err(|source| SimError::Build {
                component: name.clone(),
                source,
            })?;
            tracing::debug!(component = %name, ports = ports.len(), "Component built");
        }
        Ok(())
    }

    fn resolve_manifest(&mut self) -> SimResult<()> {
        let manifest = std::mem::take(&mut self.manifest);
        for (master, slave) in &manifest {
            self.bind(master, slave)?;
            tracing::debug!(master = %master, slave = %slave, "Ports bound");
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<ComponentId, BindError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| BindError::UnresolvedComponent(name.to_string()))
    }

    fn bind(&mut self, master: &PortPath, slave: &PortPath) -> Result<(), BindError> {
        let mid = self.resolve(&master.component)?;
        let sid = self.resolve(&slave.component)?;

        {
            let masters = &self.entries[mid.index()].ports;
            let binding = masters.masters.get(&master.port).ok_or_else(|| {
                wrong_or_missing(masters.slaves.contains_key(&master.port), master, "master", "slave")
            })?;
            let slaves = &self.entries[sid.index()].ports;
            let entry = slaves.slaves.get(&slave.port).ok_or_else(|| {
                wrong_or_missing(slaves.masters.contains_key(&slave.port), slave, "slave", "master")
            })?;

            if binding.kind() != entry.kind {
                return Err(BindError::KindMismatch {
                    master: master.clone(),
                    master_kind: binding.kind(),
                    slave: slave.clone(),
                    slave_kind: entry.kind,
                });
            }
            if entry.bound {
                return Err(BindError::SlaveAlreadyBound(slave.clone()));
            }
            binding.bind(master, slave, &*entry.target)?;
        }

        if let Some(entry) = self.entries[sid.index()].ports.slaves.get_mut(&slave.port) {
            entry.bound = true;
        }
        Ok(())
    }

    /// Builds if needed, pulses reset once and starts every component.
    pub fn init(&mut self) -> SimResult<()> {
        if self.phase == Phase::Started {
            return Ok(());
        }
        self.build()?;
        self.reset(true)?;
        self.reset(false)?;

        for index in 0..self.entries.len() {
            let events = self.entries[index].with_component(|c| c.start());
            self.schedule(events);
        }
        self.phase = Phase::Started;
        tracing::info!(pending = self.queue.len(), "Platform started");
        Ok(())
    }

    /// Asserts (`true`) or releases (`false`) the system-wide reset.
    ///
    /// Every component sees the pulse in insertion order.
    pub fn reset(&mut self, active: bool) -> SimResult<()> {
        self.build()?;
        if active && self.reset_active {
            return Err(SimError::ResetAlreadyActive);
        }
        if !active && !self.reset_active {
            tracing::debug!("Reset release without assertion ignored");
            return Ok(());
        }

        self.reset_active = active;
        if active {
            self.stats.resets += 1;
        }
        tracing::debug!(active, time = self.current_time(), "Reset");
        for index in 0..self.entries.len() {
            self.entries[index].with_component(|c| c.reset(active));
        }
        Ok(())
    }

    /// Queues events returned by a component.
    ///
    /// Panics if an event lies in the past or targets no component.
    fn schedule(&mut self, events: Vec<Event>) {
        let now = self.current_time();
        for event in events {
            assert!(
                event.time >= now,
                "event for {} scheduled in the past ({} < {})",
                event.target,
                event.time,
                now
            );
            assert!(
                event.target.index() < self.entries.len(),
                "event for unknown component {}",
                event.target
            );
            self.queue.push(event);
            self.stats.events_scheduled += 1;
        }
        self.stats.peak_queue_len = self.queue.peak_len();
    }

    /// Runs until no event is left, the next event lies after `max_time`,
    /// or a component requests a halt.
    pub fn run(&mut self, max_time: SimTime) -> SimResult<RunOutcome> {
        self.init()?;
        loop {
            if let Some(code) = self.handle.exit_code() {
                return Ok(RunOutcome::Halted { code });
            }
            match self.queue.next_time() {
                None => return Ok(RunOutcome::Idle),
                Some(time) if time > max_time => {
                    if max_time > self.current_time() {
                        self.handle.set_time(max_time);
                    }
                    return Ok(RunOutcome::TimeLimit);
                }
                Some(_) => {
                    self.step();
                }
            }
        }
    }

    /// Delivers the earliest pending event. Returns false if none is left.
    pub fn step(&mut self) -> bool {
        let Some(event) = self.queue.pop() else {
            return false;
        };
        self.handle.set_time(event.time);

        let events = self.entries[event.target.index()].with_component(|c| c.on_event(&event));
        self.stats.events_processed += 1;
        self.schedule(events);
        true
    }

    fn slave(&self, id: ComponentId, port: &str) -> SimResult<(&SlaveEntry, PortPath)> {
        let entry = self
            .entries
            .get(id.index())
            .ok_or_else(|| SimError::UnknownComponent(id.to_string()))?;
        let path = PortPath::new(entry.name.clone(), port);
        match entry.ports.slaves.get(port) {
            Some(slave) => Ok((slave, path)),
            None => Err(SimError::UnknownPort(path)),
        }
    }

    /// Sends `req` into the `io` slave port `port` of `id`.
    pub fn io_request(&mut self, id: ComponentId, port: &str, req: &mut IoReq) -> SimResult<IoStatus> {
        self.build()?;
        let call = {
            let (slave, path) = self.slave(id, port)?;
            let delegate = slave
                .target
                .downcast_ref::<IoDelegate>()
                .ok_or(SimError::PortKindMismatch {
                    path,
                    kind: slave.kind,
                })?;
            Rc::clone(&delegate.call)
        };
        let status = call(req);
        req.status = status;
        self.stats.io_requests += 1;
        Ok(status)
    }

    /// Drives `value` into the `wire<T>` slave port `port` of `id`.
    pub fn sync_wire<T: WireValue>(&mut self, id: ComponentId, port: &str, value: T) -> SimResult<()> {
        self.build()?;
        let call = {
            let (slave, path) = self.slave(id, port)?;
            let delegate = slave
                .target
                .downcast_ref::<WireDelegate<T>>()
                .ok_or(SimError::PortKindMismatch {
                    path,
                    kind: slave.kind,
                })?;
            Rc::clone(&delegate.call)
        };
        call(value);
        Ok(())
    }

    /// Delivers a clock edge into the `clock` slave port `port` of `id`.
    pub fn sync_clock(&mut self, id: ComponentId, port: &str, level: bool) -> SimResult<()> {
        self.build()?;
        let call = {
            let (slave, path) = self.slave(id, port)?;
            let delegate = slave
                .target
                .downcast_ref::<ClockDelegate>()
                .ok_or(SimError::PortKindMismatch {
                    path,
                    kind: slave.kind,
                })?;
            Rc::clone(&delegate.call)
        };
        call(level);
        Ok(())
    }

    /// Kind of a declared port, master or slave.
    pub fn port_kind(&self, id: ComponentId, port: &str) -> Option<PortKind> {
        let ports = &self.entries.get(id.index())?.ports;
        ports
            .masters
            .get(port)
            .map(|m| m.kind())
            .or_else(|| ports.slaves.get(port).map(|s| s.kind))
    }

    /// True if the port is bound (either direction).
    pub fn is_port_bound(&self, id: ComponentId, port: &str) -> bool {
        let Some(entry) = self.entries.get(id.index()) else {
            return false;
        };
        entry
            .ports
            .masters
            .get(port)
            .map(|m| m.is_bound())
            .or_else(|| entry.ports.slaves.get(port).map(|s| s.bound))
            .unwrap_or(false)
    }

    /// Typed shared access to a component.
    ///
    /// Returns `None` for an unknown id, a different type, or a component
    /// currently running a handler.
    pub fn component<C: Component>(&self, id: ComponentId) -> Option<Ref<'_, C>> {
        let cell = &self.entries.get(id.index())?.cell;
        let guard = cell.try_borrow().ok()?;
        Ref::filter_map(guard, |boxed| {
            let component: &dyn Component = &**boxed;
            component.as_any().downcast_ref::<C>()
        })
        .ok()
    }

    /// Typed exclusive access to a component.
    pub fn component_mut<C: Component>(&self, id: ComponentId) -> Option<RefMut<'_, C>> {
        let cell = &self.entries.get(id.index())?.cell;
        let guard = cell.try_borrow_mut().ok()?;
        RefMut::filter_map(guard, |boxed| {
            let component: &mut dyn Component = &mut **boxed;
            component.as_any_mut().downcast_mut::<C>()
        })
        .ok()
    }

    /// Looks up a component by name.
    pub fn id_of(&self, name: &str) -> Option<ComponentId> {
        self.names.get(name).copied()
    }

    pub fn name_of(&self, id: ComponentId) -> Option<&str> {
        self.entries.get(id.index()).map(|e| e.name.as_str())
    }

    pub fn component_count(&self) -> usize {
        self.entries.len()
    }

    pub fn current_time(&self) -> SimTime {
        self.handle.time()
    }

    /// Exit code of a requested halt.
    pub fn exit_code(&self) -> Option<i32> {
        self.handle.exit_code()
    }

    /// A handle on the engine, as components see it.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn is_built(&self) -> bool {
        matches!(self.phase, Phase::Built | Phase::Started)
    }

    pub fn is_reset_active(&self) -> bool {
        self.reset_active
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Exports engine and per-component statistics.
    pub fn export_stats(&self) -> serde_json::Value {
        let mut components = serde_json::Map::new();
        for entry in &self.entries {
            if let Ok(guard) = entry.cell.try_borrow() {
                components.insert(entry.name.clone(), guard.export_stats());
            }
        }

        serde_json::json!({
            "engine": {
                "current_time": self.current_time(),
                "events_processed": self.stats.events_processed,
                "events_scheduled": self.stats.events_scheduled,
                "io_requests": self.stats.io_requests,
                "resets": self.stats.resets,
                "peak_queue_len": self.stats.peak_queue_len,
                "pending_events": self.queue.len(),
                "component_count": self.entries.len(),
                "exit_code": self.exit_code(),
            },
            "components": components,
        })
    }

    /// Snapshot of the statistics as a report.
    pub fn report(&self) -> SimulationStats {
        SimulationStats::from_engine(self.current_time(), self.exit_code(), &self.stats)
            .with_components(self.export_stats()["components"].clone())
    }
}

fn wrong_or_missing(
    exists_other_way: bool,
    path: &PortPath,
    expected: &'static str,
    found: &'static str,
) -> BindError {
    if exists_other_way {
        BindError::WrongDirection {
            path: path.clone(),
            expected,
            found,
        }
    } else {
        BindError::UnresolvedPort(path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::mock::{ClockCounter, WireProbe};
    use crate::components::ClockGenerator;
    use crate::error::BuildError;

    fn clk_config(period: u64) -> ConfigNode {
        ConfigNode::empty("clk").with("period", period)
    }

    #[test]
    fn test_simulation_creation() {
        let sim = Simulation::new();
        assert_eq!(sim.current_time(), 0);
        assert_eq!(sim.component_count(), 0);
        assert!(!sim.is_built());
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let mut sim = Simulation::new();
        sim.add("probe", WireProbe::<bool>::new(), ConfigNode::empty("probe"))
            .unwrap();
        assert!(matches!(
            sim.add("probe", WireProbe::<bool>::new(), ConfigNode::empty("probe")),
            Err(SimError::DuplicateComponent(_))
        ));
        assert!(matches!(
            sim.add("a/b", WireProbe::<bool>::new(), ConfigNode::empty("a/b")),
            Err(SimError::InvalidComponentName(_))
        ));
    }

    #[test]
    fn test_run_until_idle() {
        let mut sim = Simulation::new();
        assert_eq!(sim.run(100).unwrap(), RunOutcome::Idle);
        assert!(sim.is_built());
    }

    #[test]
    fn test_clock_counter_run() {
        let mut sim = Simulation::new();
        sim.add("clk", ClockGenerator::new(), clk_config(10)).unwrap();
        let counter = sim
            .add("counter", ClockCounter::new(), ConfigNode::empty("counter"))
            .unwrap();
        sim.connect("clk/out", "counter/clock").unwrap();

        assert_eq!(sim.run(50).unwrap(), RunOutcome::TimeLimit);
        assert_eq!(sim.current_time(), 50);
        let counter = sim.component::<ClockCounter>(counter).unwrap();
        assert_eq!(counter.edges(), 10);
        assert_eq!(counter.rising_edges(), 5);
    }

    #[test]
    fn test_binding_closed_after_build() {
        let mut sim = Simulation::new();
        sim.build().unwrap();
        assert!(matches!(
            sim.connect("a/out", "b/in"),
            Err(SimError::BindingClosed)
        ));
        assert!(matches!(
            sim.add("late", WireProbe::<u32>::new(), ConfigNode::empty("late")),
            Err(SimError::BindingClosed)
        ));
    }

    #[test]
    fn test_build_error_is_fatal() {
        let mut sim = Simulation::new();
        sim.add("clk", ClockGenerator::new(), ConfigNode::empty("clk"))
            .unwrap();
        match sim.init() {
            Err(SimError::Build { component, source }) => {
                assert_eq!(component, "clk");
                assert!(matches!(source, BuildError::Config(_)));
            }
            other => panic!("Expected build error, got {:?}", other.err()),
        }
        assert!(!sim.is_built());
        assert!(sim.run(10).is_err());
    }

    #[test]
    fn test_reset_twice_is_error() {
        let mut sim = Simulation::new();
        sim.reset(true).unwrap();
        assert!(sim.is_reset_active());
        assert!(matches!(sim.reset(true), Err(SimError::ResetAlreadyActive)));
        sim.reset(false).unwrap();
        assert!(!sim.is_reset_active());
        assert_eq!(sim.stats().resets, 1);
    }

    #[test]
    fn test_halt_stops_run() {
        let mut sim = Simulation::new();
        sim.add("clk", ClockGenerator::new(), clk_config(2)).unwrap();
        sim.init().unwrap();
        sim.handle().stop(3);
        assert_eq!(sim.run(1_000).unwrap(), RunOutcome::Halted { code: 3 });
        assert_eq!(sim.exit_code(), Some(3));
    }

    #[test]
    fn test_stimulus_kind_mismatch() {
        let mut sim = Simulation::new();
        let probe = sim
            .add("probe", WireProbe::<u32>::new(), ConfigNode::empty("probe"))
            .unwrap();
        sim.build().unwrap();

        sim.sync_wire(probe, "input", 5u32).unwrap();
        assert!(matches!(
            sim.sync_wire(probe, "input", true),
            Err(SimError::PortKindMismatch { .. })
        ));
        assert!(matches!(
            sim.sync_wire(probe, "missing", 1u32),
            Err(SimError::UnknownPort(_))
        ));
        assert_eq!(sim.component::<WireProbe<u32>>(probe).unwrap().values(), &[5]);
    }

    #[test]
    fn test_export_stats() {
        let mut sim = Simulation::new();
        sim.add("clk", ClockGenerator::new(), clk_config(10)).unwrap();
        sim.run(100).unwrap();

        let stats = sim.export_stats();
        assert_eq!(stats["engine"]["current_time"], 100);
        assert_eq!(stats["engine"]["events_processed"], 20);
        assert!(stats["components"]["clk"].is_object());
    }
}
