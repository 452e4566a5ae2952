//! Core type definitions for the simulation kernel.
//!
//! This module defines the fundamental types used throughout the kernel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Simulation time unit (e.g., picoseconds or global cycles).
///
/// All events and clock edges use the same `SimTime` representation,
/// giving every component a single logical timeline.
pub type SimTime = u64;

/// Stable handle of a component inside a [`Simulation`](crate::engine::Simulation).
///
/// Handles are dense indices assigned in insertion order and never reused
/// for the lifetime of the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub usize);

impl ComponentId {
    /// Returns the raw index of this handle.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fully qualified port reference, written `component/port` in manifests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortPath {
    /// Name of the component owning the port
    pub component: String,
    /// Name of the port inside that component
    pub port: String,
}

impl PortPath {
    /// Creates a new port path.
    pub fn new(component: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            port: port.into(),
        }
    }

    /// Parses a `component/port` string.
    ///
    /// The component part may itself not contain `/`; everything after the
    /// first separator is the port name.
    pub fn parse(path: &str) -> Option<Self> {
        let (component, port) = path.split_once('/')?;
        if component.is_empty() || port.is_empty() {
            return None;
        }
        Some(Self::new(component, port))
    }
}

impl fmt::Display for PortPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component, self.port)
    }
}
