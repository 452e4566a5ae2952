//! Clock-domain propagation: divider periodicity, gating and mux switching.

use proptest::prelude::*;
use vplat::components::soc_ctrl::offsets;
use vplat::components::{ClockCounter, SocCtrl};
use vplat::{ClockDivider, ComponentId, ConfigNode, DisabledMode, IoReq, Simulation};

// ============================================================================
// Divider State Machine
// ============================================================================

proptest! {
    #[test]
    fn prop_emissions_are_exactly_two_pow_k_apart(k in 0u32..6, edges in 1usize..200) {
        let mut div = ClockDivider::new(DisabledMode::Gate);
        let emitted: Vec<usize> = (0..edges)
            .filter(|_| div.on_source_edge(true, k).is_some())
            .collect();

        let period = 1usize << k;
        prop_assert_eq!(emitted.len(), edges / period);
        for (n, at) in emitted.iter().enumerate() {
            prop_assert_eq!(*at, (n + 1) * period - 1);
        }
    }

    #[test]
    fn prop_disable_window_preserves_phase(
        k in 1u32..5,
        before in 0usize..40,
        gated in 0usize..40,
        after in 0usize..40,
    ) {
        let mut gated_div = ClockDivider::new(DisabledMode::Gate);
        let mut plain_div = ClockDivider::new(DisabledMode::Gate);

        let mut count = 0;
        for _ in 0..before {
            count += usize::from(gated_div.on_source_edge(true, k).is_some());
        }
        for _ in 0..gated {
            prop_assert!(gated_div.on_source_edge(false, k).is_none());
        }
        for _ in 0..after {
            count += usize::from(gated_div.on_source_edge(true, k).is_some());
        }

        let reference = (0..before + after)
            .filter(|_| plain_div.on_source_edge(true, k).is_some())
            .count();
        prop_assert_eq!(count, reference);
        prop_assert_eq!(gated_div.phase(), plain_div.phase());
    }
}

// ============================================================================
// Reference Clock Mux on SocCtrl
// ============================================================================

fn platform() -> (Simulation, ComponentId, ComponentId) {
    let mut sim = Simulation::new();
    let ctrl = sim
        .add(
            "soc_ctrl",
            SocCtrl::new(),
            ConfigNode::empty("soc_ctrl")
                .with("nb_harts", 1)
                .with("cluster_power_event", 0)
                .with("cluster_clock_gate_event", 1)
                .with("nb_l2_shared_banks", 1),
        )
        .unwrap();
    let cnt = sim
        .add("ref_cnt", ClockCounter::new(), ConfigNode::empty("ref_cnt"))
        .unwrap();
    sim.connect("soc_ctrl/ref_clock_muxed", "ref_cnt/clock").unwrap();
    sim.init().unwrap();
    (sim, ctrl, cnt)
}

fn write(sim: &mut Simulation, ctrl: ComponentId, offset: u64, value: u32) {
    sim.io_request(ctrl, "input", &mut IoReq::write_u32(offset, value))
        .unwrap();
}

fn edges(sim: &Simulation, cnt: ComponentId) -> u64 {
    sim.component::<ClockCounter>(cnt).unwrap().edges()
}

fn fast_edges(sim: &mut Simulation, ctrl: ComponentId, n: usize) {
    for i in 0..n {
        sim.sync_clock(ctrl, "fast_clock", i % 2 == 0).unwrap();
    }
}

#[test]
fn test_ref_clock_forwarded_by_default() {
    let (mut sim, ctrl, cnt) = platform();
    for level in [true, false, true] {
        sim.sync_clock(ctrl, "ref_clock", level).unwrap();
    }
    fast_edges(&mut sim, ctrl, 4);
    assert_eq!(edges(&sim, cnt), 3);
}

#[test]
fn test_divided_fast_clock_period() {
    let (mut sim, ctrl, cnt) = platform();
    // Divide by 4, enabled, then select the fast source.
    write(&mut sim, ctrl, offsets::CLK_DIV_REF_FAST_POW2, 0x102);
    write(&mut sim, ctrl, offsets::REF_CLK_MUX, 1);

    fast_edges(&mut sim, ctrl, 3);
    assert_eq!(edges(&sim, cnt), 0);
    fast_edges(&mut sim, ctrl, 1);
    assert_eq!(edges(&sim, cnt), 1);
    fast_edges(&mut sim, ctrl, 8);
    assert_eq!(edges(&sim, cnt), 3);

    // The reference clock no longer reaches the output.
    sim.sync_clock(ctrl, "ref_clock", true).unwrap();
    assert_eq!(edges(&sim, cnt), 3);
}

#[test]
fn test_disabled_divider_bypasses() {
    let (mut sim, ctrl, cnt) = platform();
    write(&mut sim, ctrl, offsets::CLK_DIV_REF_FAST_POW2, 0x002);
    write(&mut sim, ctrl, offsets::REF_CLK_MUX, 1);

    fast_edges(&mut sim, ctrl, 5);
    assert_eq!(edges(&sim, cnt), 5);
    assert_eq!(sim.component::<SocCtrl>(ctrl).unwrap().divider_phase(), 0);
}

#[test]
fn test_mux_switch_takes_effect_on_next_edge() {
    let (mut sim, ctrl, cnt) = platform();
    write(&mut sim, ctrl, offsets::CLK_DIV_REF_FAST_POW2, 0x101);

    // Counting happens while the fast source is not selected.
    fast_edges(&mut sim, ctrl, 1);
    assert_eq!(sim.component::<SocCtrl>(ctrl).unwrap().divider_phase(), 1);
    assert_eq!(edges(&sim, cnt), 0);

    write(&mut sim, ctrl, offsets::REF_CLK_MUX, 1);
    assert_eq!(sim.component::<SocCtrl>(ctrl).unwrap().ref_clock_source(), 1);
    assert_eq!(edges(&sim, cnt), 0);

    fast_edges(&mut sim, ctrl, 1);
    assert_eq!(edges(&sim, cnt), 1);

    write(&mut sim, ctrl, offsets::REF_CLK_MUX, 0);
    fast_edges(&mut sim, ctrl, 2);
    sim.sync_clock(ctrl, "ref_clock", true).unwrap();
    assert_eq!(edges(&sim, cnt), 2);
}

#[test]
fn test_reset_restores_mux_and_divider() {
    let (mut sim, ctrl, _) = platform();
    write(&mut sim, ctrl, offsets::CLK_DIV_REF_FAST_POW2, 0x103);
    write(&mut sim, ctrl, offsets::REF_CLK_MUX, 1);
    fast_edges(&mut sim, ctrl, 3);

    sim.reset(true).unwrap();
    sim.reset(false).unwrap();

    let soc = sim.component::<SocCtrl>(ctrl).unwrap();
    assert_eq!(soc.ref_clock_source(), 0);
    assert_eq!(soc.divider_phase(), 0);
    let div = soc.registers().id_of("CLK_DIV_REF_FAST_POW2").unwrap();
    assert_eq!(soc.registers().get(div), 0);
}
