//! SoC Boot Example
//!
//! This example assembles a small platform around the system controller:
//! - A fast and a reference clock generator feeding the controller
//! - A counter on the muxed reference clock output
//! - A bus initiator standing in for the fabric controller core
//! - Probes on the boot address and on the shared-bank power lines
//!
//! The "firmware" programs the boot address, switches the reference clock
//! to the divided fast clock, powers half the L2 banks, brackets a power
//! capture window and finally reports end of computation.
//!
//! Run with: `cargo run --example soc_boot`

use std::rc::Rc;

use vplat::components::soc_ctrl::{offsets, CORESTATUS_EOC, POWER_CAPTURE_START, POWER_CAPTURE_STOP};
use vplat::components::{ClockCounter, IoInitiator, WireProbe};
use vplat::{
    create_default_registry, init_logging, CaptureRecorder, IoStatus, PlatformConfigBuilder,
    RunOutcome, SimResult, Simulation, Timer,
};

const NB_L2_BANKS: usize = 4;
const FAST_PERIOD: u64 = 2;
const REF_PERIOD: u64 = 64;
const SIMULATION_TIME: u64 = 10_000;

fn build_platform() -> SimResult<Simulation> {
    let mut builder = PlatformConfigBuilder::new()
        .max_time(SIMULATION_TIME)
        .add_component("cpu", "io_initiator", serde_json::json!({}))
        .add_component(
            "soc_ctrl",
            "soc_ctrl",
            serde_json::json!({
                "nb_harts": 2,
                "cluster_power_event": 3,
                "cluster_clock_gate_event": 4,
                "nb_l2_shared_banks": NB_L2_BANKS,
            }),
        )
        .add_component("fast_clk", "clock_gen", serde_json::json!({ "period": FAST_PERIOD }))
        .add_component("ref_clk", "clock_gen", serde_json::json!({ "period": REF_PERIOD }))
        .add_component("timer", "clock_counter", serde_json::json!({}))
        .add_component("boot", "wire_probe_u32", serde_json::json!({}))
        .bind("cpu/output", "soc_ctrl/input")
        .bind("fast_clk/out", "soc_ctrl/fast_clock")
        .bind("ref_clk/out", "soc_ctrl/ref_clock")
        .bind("soc_ctrl/ref_clock_muxed", "timer/clock")
        .bind("soc_ctrl/bootaddr", "boot/input");

    for i in 0..NB_L2_BANKS {
        let name = format!("bank{}", i);
        builder = builder
            .add_component(name.as_str(), "wire_probe_bool", serde_json::json!({}))
            .bind(format!("soc_ctrl/l2_power_ctrl_{}", i), format!("{}/input", name));
    }

    let config = builder.build()?;
    let sim = Simulation::from_config(&config, &create_default_registry())?;
    Ok(sim)
}

/// One bus write from the "firmware".
fn write(sim: &Simulation, offset: u64, value: u32) {
    let Some(cpu) = sim.id_of("cpu") else {
        return;
    };
    if let Some(mut cpu) = sim.component_mut::<IoInitiator>(cpu) {
        let status = cpu.write_u32(offset, value);
        if status != IoStatus::Ok {
            tracing::warn!(offset, value, "Bus write failed");
        }
    }
}

fn timer_edges(sim: &Simulation) -> u64 {
    sim.id_of("timer")
        .and_then(|id| sim.component::<ClockCounter>(id).map(|c| c.edges()))
        .unwrap_or(0)
}

fn main() -> SimResult<()> {
    init_logging("info");

    println!("=== SoC Boot Simulation ===");
    println!();

    let recorder = Rc::new(CaptureRecorder::new());
    let mut sim = build_platform()?.with_power_capture(recorder.clone());
    let timer = Timer::start();

    sim.init()?;
    sim.run(1_000)?;
    println!("Reference clock edges after boot: {}", timer_edges(&sim));

    // Boot address and clocking.
    write(&sim, offsets::FC_BOOT, 0x1C00_8080);
    write(&sim, offsets::CLK_DIV_REF_FAST_POW2, 0x100 | 3);
    write(&sim, offsets::REF_CLK_MUX, 1);
    let before = timer_edges(&sim);
    sim.run(2_000)?;
    println!(
        "Edges on divided fast clock over 1000 time units: {}",
        timer_edges(&sim) - before
    );

    // Power banks 0 and 1, inside a capture window.
    write(&sim, offsets::CORESTATUS, POWER_CAPTURE_START);
    write(&sim, offsets::L2_PWR_ACTIVE, 0b0011);
    sim.run(5_000)?;
    write(&sim, offsets::CORESTATUS, POWER_CAPTURE_STOP);

    for i in 0..NB_L2_BANKS {
        let level = sim
            .id_of(&format!("bank{}", i))
            .and_then(|id| sim.component::<WireProbe<bool>>(id).and_then(|p| p.last()));
        println!("L2 bank {} power control: {:?}", i, level);
    }
    println!("Power capture events: {:?}", recorder.events());

    // End of computation.
    write(&sim, offsets::CORESTATUS, CORESTATUS_EOC);
    let outcome = sim.run(SIMULATION_TIME)?;

    println!();
    match outcome {
        RunOutcome::Halted { code } => println!("Firmware exited with code {}", code),
        other => println!("Simulation ended without exit: {:?}", other),
    }

    let mut report = sim.report().with_name("soc_boot");
    report.compute_timing(timer.elapsed_ms());
    println!();
    println!("{}", report.summary());
    Ok(())
}
