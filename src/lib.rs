//! # vplat
//!
//! A cycle-level virtual platform kernel: the framework hardware models are
//! written against to simulate a system-on-chip as a graph of components
//! advancing in logical time.
//!
//! ## Design Principles
//!
//! - **Explicit platform context**: a [`Simulation`] owns every component and
//!   hands out [`ComponentId`] handles. There is no global state, so several
//!   platforms can coexist in one process.
//! - **Typed ports**: components talk through `io`, `wire<T>` and `clock`
//!   ports. Bindings are checked for direction, kind and value type once,
//!   after every component has built, and never change afterwards.
//! - **Synchronous propagation**: a `sync` or bus request runs the bound
//!   handler to completion before returning. Only [`Event`]s move time
//!   forward.
//! - **Declarative registers**: a [`RegMap`] turns raw bus accesses into
//!   field-level updates with merge-on-write and callback-after-commit.
//!
//! ## Quick Start
//!
//! ```rust
//! use vplat::components::{IoInitiator, SocCtrl, WireProbe};
//! use vplat::config::ConfigNode;
//! use vplat::Simulation;
//!
//! let mut sim = Simulation::new();
//! let cpu = sim.add("cpu", IoInitiator::new(), ConfigNode::empty("cpu")).unwrap();
//! sim.add(
//!     "soc_ctrl",
//!     SocCtrl::new(),
//!     ConfigNode::empty("soc_ctrl")
//!         .with("nb_harts", 1)
//!         .with("cluster_power_event", 0)
//!         .with("cluster_clock_gate_event", 1)
//!         .with("nb_l2_shared_banks", 2),
//! )
//! .unwrap();
//! let boot = sim.add("boot", WireProbe::<u32>::new(), ConfigNode::empty("boot")).unwrap();
//! sim.connect("cpu/output", "soc_ctrl/input").unwrap();
//! sim.connect("soc_ctrl/bootaddr", "boot/input").unwrap();
//! sim.init().unwrap();
//!
//! // Program the boot address, then end the run with exit code 0.
//! sim.component_mut::<IoInitiator>(cpu).unwrap().write_u32(0x04, 0x1C00_0080);
//! sim.component_mut::<IoInitiator>(cpu).unwrap().write_u32(0x00, 1 << 31);
//!
//! assert_eq!(sim.component::<WireProbe<u32>>(boot).unwrap().values(), &[0x1C00_0080]);
//! assert_eq!(sim.exit_code(), Some(0));
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use vplat::config::PlatformConfig;
//! use vplat::registry::create_default_registry;
//! use vplat::Simulation;
//!
//! let config = PlatformConfig::from_yaml_file("platform.yaml")?;
//! let mut sim = Simulation::from_config(&config, &create_default_registry())?;
//! sim.run(config.simulation.max_time)?;
//! ```

pub mod types;
pub mod event;
pub mod trace;
pub mod error;
pub mod config;
pub mod io;
pub mod port;
pub mod component;
pub mod regmap;
pub mod clock;
pub mod hooks;
pub mod engine;
pub mod registry;
pub mod stats;
pub mod components;

// Re-export commonly used types
pub use types::{ComponentId, PortPath, SimTime};
pub use event::{Event, EventQueue};
pub use trace::Trace;
pub use error::{BindError, BuildError, IoError, SimError, SimResult};
pub use config::{ConfigError, ConfigNode, PlatformConfig, PlatformConfigBuilder};
pub use io::{IoReq, IoStatus};
pub use port::{
    ClockMaster, ClockSlave, IoMaster, IoSlave, MasterPort, PortKind, SlavePort, WireMaster,
    WireSlave, WireValue,
};
pub use component::{Build, Component};
pub use regmap::{Access, Field, HasRegMap, RegAccess, RegId, RegMap, Register, UnmappedPolicy};
pub use clock::{ClockDivider, ClockMux, DisabledMode};
pub use hooks::{fan_out_mask, CaptureEvent, CaptureRecorder, Polarity, PowerCapture, PowerHook};
pub use engine::{EngineHandle, EngineStats, RunOutcome, Simulation};
pub use registry::{create_default_registry, ComponentRegistry};
pub use stats::{SimulationStats, Timer};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// vplat::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
