//! Mock components for testing.
//!
//! These components provide simple, predictable behaviors useful for
//! observing and driving ports from tests and demos.

use std::fmt;

use crate::component::{Build, Component};
use crate::error::BuildError;
use crate::io::{IoReq, IoStatus};
use crate::port::{ClockSlave, IoMaster, WireSlave, WireValue};

/// Records every value synchronized onto its `input` wire.
///
/// Useful for verifying what a master propagated and in which order.
pub struct WireProbe<T: WireValue> {
    values: Vec<T>,
}

impl<T: WireValue> WireProbe<T> {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Values received so far, oldest first.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn last(&self) -> Option<T> {
        self.values.last().copied()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn on_input(&mut self, value: T) {
        self.values.push(value);
    }
}

impl<T: WireValue> Default for WireProbe<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WireValue> fmt::Debug for WireProbe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireProbe")
            .field("values", &self.values)
            .finish()
    }
}

impl<T: WireValue> Component for WireProbe<T> {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_slave_port("input", WireSlave::new(Self::on_input))
    }

    fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "received": self.values.len(),
            "last": self.values.last().map(|v| format!("{:?}", v)),
        })
    }
}

/// Counts the edges delivered on its `clock` slave port.
#[derive(Debug, Default)]
pub struct ClockCounter {
    edges: u64,
    rising: u64,
}

impl ClockCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of edges seen.
    pub fn edges(&self) -> u64 {
        self.edges
    }

    /// Number of edges with a high level.
    pub fn rising_edges(&self) -> u64 {
        self.rising
    }

    fn on_clock(&mut self, level: bool) {
        self.edges += 1;
        if level {
            self.rising += 1;
        }
    }
}

impl Component for ClockCounter {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_slave_port("clock", ClockSlave::new(Self::on_clock))
    }

    fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "edges": self.edges,
            "rising_edges": self.rising,
        })
    }
}

/// Issues bus requests through its `output` master port.
///
/// Stands in for a processor core: tests grab it through
/// [`Simulation::component_mut`](crate::engine::Simulation::component_mut)
/// and drive the bus by hand.
#[derive(Debug, Default)]
pub struct IoInitiator {
    output: IoMaster,
    issued: u64,
    failed: u64,
}

impl IoInitiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `req` to the bound slave and returns its status.
    ///
    /// An unbound initiator reports `Error` without dispatching.
    pub fn request(&mut self, req: &mut IoReq) -> IoStatus {
        self.issued += 1;
        let status = if self.output.is_bound() {
            self.output.req(req)
        } else {
            req.status = IoStatus::Error;
            IoStatus::Error
        };
        if !status.is_ok() {
            self.failed += 1;
        }
        status
    }

    /// Writes a 32-bit word at `addr`.
    pub fn write_u32(&mut self, addr: u64, value: u32) -> IoStatus {
        self.request(&mut IoReq::write_u32(addr, value))
    }

    /// Reads a 32-bit word at `addr`; `None` if the request failed.
    pub fn read_u32(&mut self, addr: u64) -> Option<u32> {
        let mut req = IoReq::read_u32(addr);
        match self.request(&mut req) {
            IoStatus::Ok => Some(req.value() as u32),
            _ => None,
        }
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}

impl Component for IoInitiator {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        b.new_master_port("output", &self.output)
    }

    fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "issued": self.issued,
            "failed": self.failed,
        })
    }
}
