//! Built-in component models.
//!
//! This module contains reference components that can be used directly or
//! as examples for implementing custom hardware models.
//!
//! # Available Components
//!
//! ## System
//! - [`SocCtrl`] - System controller (exit/status, boot address, clocks, power masks)
//! - [`ClockGenerator`] - Event-driven clock source
//! - [`Memory`] - Byte-addressable RAM behind an `io` slave
//!
//! ## Test Doubles (mock)
//! - [`WireProbe`] - Records every value synchronized onto a wire
//! - [`ClockCounter`] - Counts clock edges
//! - [`IoInitiator`] - Issues bus requests through an `io` master

pub mod clock_gen;
pub mod memory;
pub mod mock;
pub mod soc_ctrl;

pub use clock_gen::ClockGenerator;
pub use memory::Memory;
pub use mock::{ClockCounter, IoInitiator, WireProbe};
pub use soc_ctrl::SocCtrl;
