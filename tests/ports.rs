//! Port declaration and binding rules.

use vplat::components::{ClockCounter, ClockGenerator, IoInitiator, Memory, WireProbe};
use vplat::{
    BindError, Build, BuildError, Component, ConfigNode, IoMaster, IoReq, IoSlave, IoStatus,
    PortKind, SimError, Simulation, WireMaster, WireSlave,
};

// ============================================================================
// Test Components
// ============================================================================

/// Drives a value on `out` whenever its `trigger` wire fires.
struct Relay {
    out: WireMaster<u32>,
}

impl Relay {
    fn new() -> Self {
        Self {
            out: WireMaster::new(),
        }
    }

    fn on_trigger(&mut self, value: u32) {
        if self.out.is_bound() {
            self.out.sync(value + 1);
        }
    }
}

impl Component for Relay {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_master_port("out", &self.out)?;
        b.new_slave_port("trigger", WireSlave::new(Self::on_trigger))
    }
}

/// Declares the same port name twice.
struct Clash {
    out: WireMaster<bool>,
}

impl Component for Clash {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_master_port("p", &self.out)?;
        b.new_slave_port("p", WireSlave::new(|_: &mut Clash, _: bool| {}))
    }
}

/// Registers a handler that belongs to another component type.
struct Impostor;

impl Component for Impostor {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_slave_port("input", WireSlave::new(|_: &mut Relay, _: u32| {}))
    }
}

fn empty(name: &str) -> ConfigNode {
    ConfigNode::empty(name)
}

fn bind_error(sim: &mut Simulation) -> BindError {
    match sim.build() {
        Err(SimError::Bind(e)) => e,
        other => panic!("Expected bind error, got {:?}", other),
    }
}

// ============================================================================
// Declaration
// ============================================================================

#[test]
fn test_duplicate_port_name() {
    let mut sim = Simulation::new();
    sim.add(
        "clash",
        Clash {
            out: WireMaster::new(),
        },
        empty("clash"),
    )
    .unwrap();

    match sim.build() {
        Err(SimError::Build { component, source }) => {
            assert_eq!(component, "clash");
            assert!(matches!(source, BuildError::DuplicatePort(name) if name == "p"));
        }
        other => panic!("Expected duplicate port, got {:?}", other),
    }
}

#[test]
fn test_handler_owner_mismatch() {
    let mut sim = Simulation::new();
    sim.add("impostor", Impostor, empty("impostor")).unwrap();
    assert!(matches!(
        sim.build(),
        Err(SimError::Build {
            source: BuildError::HandlerOwnerMismatch { .. },
            ..
        })
    ));
}

#[test]
fn test_port_kinds_are_reported() {
    let mut sim = Simulation::new();
    let relay = sim.add("relay", Relay::new(), empty("relay")).unwrap();
    let cnt = sim.add("cnt", ClockCounter::new(), empty("cnt")).unwrap();
    sim.build().unwrap();

    assert_eq!(sim.port_kind(relay, "out"), Some(PortKind::wire::<u32>()));
    assert_eq!(sim.port_kind(cnt, "clock"), Some(PortKind::Clock));
    assert_eq!(sim.port_kind(cnt, "nope"), None);
}

// ============================================================================
// Binding
// ============================================================================

#[test]
fn test_chained_propagation() {
    let mut sim = Simulation::new();
    let first = sim.add("first", Relay::new(), empty("first")).unwrap();
    sim.add("second", Relay::new(), empty("second")).unwrap();
    let probe = sim.add("probe", WireProbe::<u32>::new(), empty("probe")).unwrap();
    sim.connect("first/out", "second/trigger").unwrap();
    sim.connect("second/out", "probe/input").unwrap();
    sim.init().unwrap();

    sim.sync_wire(first, "trigger", 1u32).unwrap();
    assert_eq!(sim.component::<WireProbe<u32>>(probe).unwrap().values(), &[3]);
    assert!(sim.is_port_bound(first, "out"));
}

#[test]
fn test_second_master_on_slave_rejected() {
    let mut sim = Simulation::new();
    sim.add("a", Relay::new(), empty("a")).unwrap();
    sim.add("b", Relay::new(), empty("b")).unwrap();
    sim.add("probe", WireProbe::<u32>::new(), empty("probe")).unwrap();
    sim.connect("a/out", "probe/input").unwrap();
    sim.connect("b/out", "probe/input").unwrap();

    assert_eq!(
        bind_error(&mut sim),
        BindError::SlaveAlreadyBound(vplat::PortPath::new("probe", "input"))
    );
    assert!(!sim.is_built());
}

#[test]
fn test_second_slave_on_exclusive_master_rejected() {
    let mut sim = Simulation::new();
    sim.add("a", Relay::new(), empty("a")).unwrap();
    sim.add("p1", WireProbe::<u32>::new(), empty("p1")).unwrap();
    sim.add("p2", WireProbe::<u32>::new(), empty("p2")).unwrap();
    sim.connect("a/out", "p1/input").unwrap();
    sim.connect("a/out", "p2/input").unwrap();

    assert!(matches!(bind_error(&mut sim), BindError::MasterAlreadyBound(_)));
}

#[test]
fn test_clock_master_broadcasts() {
    let mut sim = Simulation::new();
    sim.add("clk", ClockGenerator::new(), empty("clk").with("period", 2))
        .unwrap();
    let c1 = sim.add("c1", ClockCounter::new(), empty("c1")).unwrap();
    let c2 = sim.add("c2", ClockCounter::new(), empty("c2")).unwrap();
    sim.connect("clk/out", "c1/clock").unwrap();
    sim.connect("clk/out", "c2/clock").unwrap();

    sim.run(10).unwrap();
    assert_eq!(sim.component::<ClockCounter>(c1).unwrap().edges(), 10);
    assert_eq!(sim.component::<ClockCounter>(c2).unwrap().edges(), 10);
}

#[test]
fn test_value_type_mismatch() {
    let mut sim = Simulation::new();
    sim.add("relay", Relay::new(), empty("relay")).unwrap();
    sim.add("probe", WireProbe::<bool>::new(), empty("probe")).unwrap();
    sim.connect("relay/out", "probe/input").unwrap();

    match bind_error(&mut sim) {
        BindError::KindMismatch {
            master_kind,
            slave_kind,
            ..
        } => {
            assert_eq!(master_kind, PortKind::wire::<u32>());
            assert_eq!(slave_kind, PortKind::wire::<bool>());
        }
        other => panic!("Expected kind mismatch, got {:?}", other),
    }
}

#[test]
fn test_port_kind_mismatch() {
    let mut sim = Simulation::new();
    sim.add("clk", ClockGenerator::new(), empty("clk").with("period", 2))
        .unwrap();
    sim.add("probe", WireProbe::<bool>::new(), empty("probe")).unwrap();
    sim.connect("clk/out", "probe/input").unwrap();
    assert!(matches!(bind_error(&mut sim), BindError::KindMismatch { .. }));
}

#[test]
fn test_unresolved_references() {
    let mut sim = Simulation::new();
    sim.add("relay", Relay::new(), empty("relay")).unwrap();
    sim.connect("relay/out", "ghost/input").unwrap();
    assert_eq!(
        bind_error(&mut sim),
        BindError::UnresolvedComponent("ghost".into())
    );

    let mut sim = Simulation::new();
    sim.add("relay", Relay::new(), empty("relay")).unwrap();
    sim.add("probe", WireProbe::<u32>::new(), empty("probe")).unwrap();
    sim.connect("relay/out", "probe/missing").unwrap();
    assert!(matches!(bind_error(&mut sim), BindError::UnresolvedPort(_)));
}

#[test]
fn test_wrong_direction() {
    let mut sim = Simulation::new();
    sim.add("a", Relay::new(), empty("a")).unwrap();
    sim.add("b", Relay::new(), empty("b")).unwrap();
    sim.connect("a/trigger", "b/trigger").unwrap();
    assert!(matches!(
        bind_error(&mut sim),
        BindError::WrongDirection {
            expected: "master",
            ..
        }
    ));
}

#[test]
fn test_malformed_path() {
    let mut sim = Simulation::new();
    assert!(matches!(
        sim.connect("no-slash", "b/in"),
        Err(SimError::Bind(BindError::MalformedPath(_)))
    ));
}

#[test]
fn test_unbound_master_is_legal() {
    let mut sim = Simulation::new();
    let relay = sim.add("relay", Relay::new(), empty("relay")).unwrap();
    sim.init().unwrap();

    assert!(!sim.is_port_bound(relay, "out"));
    // The relay checks is_bound() before syncing.
    sim.sync_wire(relay, "trigger", 5u32).unwrap();
}

// ============================================================================
// I/O Dispatch
// ============================================================================

#[test]
fn test_io_round_trip_through_memory() {
    let mut sim = Simulation::new();
    let cpu = sim.add("cpu", IoInitiator::new(), empty("cpu")).unwrap();
    sim.add("mem", Memory::new(), empty("mem").with("size", 64))
        .unwrap();
    sim.connect("cpu/output", "mem/input").unwrap();
    sim.init().unwrap();

    let mut cpu = sim.component_mut::<IoInitiator>(cpu).unwrap();
    assert_eq!(cpu.write_u32(0x10, 0xDEAD_BEEF), IoStatus::Ok);
    assert_eq!(cpu.read_u32(0x10), Some(0xDEAD_BEEF));
    assert_eq!(cpu.write_u32(0x40, 1), IoStatus::Error);
    assert_eq!(cpu.failed(), 1);
}

#[test]
fn test_io_request_into_wire_port_is_rejected() {
    let mut sim = Simulation::new();
    let probe = sim.add("probe", WireProbe::<u32>::new(), empty("probe")).unwrap();
    sim.build().unwrap();

    let mut req = IoReq::read_u32(0);
    assert!(matches!(
        sim.io_request(probe, "input", &mut req),
        Err(SimError::PortKindMismatch { .. })
    ));
}

// ============================================================================
// Synchronization Cycles
// ============================================================================

/// Re-propagates a value only when it differs from the last one seen.
#[derive(Default)]
struct Guarded {
    out: WireMaster<u32>,
    last: Option<u32>,
    seen: Vec<u32>,
}

impl Guarded {
    fn on_input(&mut self, value: u32) {
        self.seen.push(value);
        if self.last == Some(value) {
            return;
        }
        self.last = Some(value);
        if self.out.is_bound() {
            self.out.sync(value);
        }
    }
}

impl Component for Guarded {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_master_port("out", &self.out)?;
        b.new_slave_port("input", WireSlave::new(Self::on_input))
    }
}

#[test]
fn test_guarded_loop_settles() {
    let mut sim = Simulation::new();
    let a = sim.add("a", Guarded::default(), empty("a")).unwrap();
    let b = sim.add("b", Guarded::default(), empty("b")).unwrap();
    sim.connect("a/out", "b/input").unwrap();
    sim.connect("b/out", "a/input").unwrap();
    sim.init().unwrap();

    sim.sync_wire(a, "input", 1u32).unwrap();
    // a -> b -> a: the bounce into a is delivered once a's handler returns,
    // and a stops there since the value did not change.
    assert_eq!(sim.component::<Guarded>(a).unwrap().seen, vec![1, 1]);
    assert_eq!(sim.component::<Guarded>(b).unwrap().seen, vec![1]);

    sim.sync_wire(b, "input", 2u32).unwrap();
    assert_eq!(sim.component::<Guarded>(a).unwrap().seen, vec![1, 1, 2]);
    assert_eq!(sim.component::<Guarded>(b).unwrap().seen, vec![1, 2, 2]);
}

/// Counts down through its own input until it reaches zero.
#[derive(Default)]
struct Countdown {
    out: WireMaster<u32>,
    seen: Vec<u32>,
}

impl Countdown {
    fn on_input(&mut self, value: u32) {
        self.seen.push(value);
        if value > 0 && self.out.is_bound() {
            self.out.sync(value - 1);
        }
    }
}

impl Component for Countdown {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_master_port("out", &self.out)?;
        b.new_slave_port("input", WireSlave::new(Self::on_input))
    }
}

#[test]
fn test_self_loop_delivers_in_order() {
    let mut sim = Simulation::new();
    let c = sim.add("c", Countdown::default(), empty("c")).unwrap();
    sim.connect("c/out", "c/input").unwrap();
    sim.init().unwrap();

    sim.sync_wire(c, "input", 3u32).unwrap();
    assert_eq!(sim.component::<Countdown>(c).unwrap().seen, vec![3, 2, 1, 0]);
}

/// Echoes every value straight back to its `out` port.
struct Echo {
    out: WireMaster<u32>,
}

impl Echo {
    fn on_input(&mut self, value: u32) {
        if self.out.is_bound() {
            self.out.sync(value);
        }
    }
}

impl Component for Echo {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_master_port("out", &self.out)?;
        b.new_slave_port("input", WireSlave::new(Self::on_input))
    }
}

#[test]
#[should_panic(expected = "did not settle")]
fn test_unsettled_cycle_panics() {
    let mut sim = Simulation::new();
    let a = sim
        .add(
            "a",
            Echo {
                out: WireMaster::new(),
            },
            empty("a"),
        )
        .unwrap();
    sim.add(
        "b",
        Echo {
            out: WireMaster::new(),
        },
        empty("b"),
    )
    .unwrap();
    sim.connect("a/out", "b/input").unwrap();
    sim.connect("b/out", "a/input").unwrap();
    sim.init().unwrap();

    sim.sync_wire(a, "input", 1u32).unwrap();
}

/// Forwards every request on its own `out` port.
#[derive(Default)]
struct Forwarder {
    out: IoMaster,
}

impl Forwarder {
    fn on_request(&mut self, req: &mut IoReq) -> IoStatus {
        self.out.req(req)
    }
}

impl Component for Forwarder {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_master_port("out", &self.out)?;
        b.new_slave_port("input", IoSlave::new(Self::on_request))
    }
}

#[test]
#[should_panic(expected = "re-entrant io request")]
fn test_io_request_cycle_panics() {
    let mut sim = Simulation::new();
    let f = sim.add("f", Forwarder::default(), empty("f")).unwrap();
    sim.connect("f/out", "f/input").unwrap();
    sim.init().unwrap();

    let mut req = IoReq::read_u32(0);
    let _ = sim.io_request(f, "input", &mut req);
}
