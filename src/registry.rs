//! Component factory registry for configuration-driven platforms.
//!
//! The registry maps type names used in a platform document to factories,
//! so [`Simulation::from_config`](crate::engine::Simulation::from_config)
//! can instantiate components it has never heard of at compile time.
//!
//! # Example
//!
//! ```
//! use vplat::component::{Build, Component};
//! use vplat::error::BuildError;
//! use vplat::registry::ComponentRegistry;
//!
//! struct Blank;
//! impl Component for Blank {
//!     fn build(&mut self, _b: &mut Build<'_>) -> Result<(), BuildError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register("blank", || Box::new(Blank));
//!
//! let component = registry.create("blank").unwrap();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::Component;

/// Type alias for component factory functions.
pub type ComponentFactory = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// A registry for component factories.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Creates a component instance by type name.
    pub fn create(&self, type_name: &str) -> Option<Box<dyn Component>> {
        self.factories.get(type_name).map(|f| f())
    }

    /// Returns true if a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Returns an iterator over registered type names.
    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.factories.keys()
    }

    /// Unregisters a component type.
    pub fn unregister(&mut self, type_name: &str) -> bool {
        self.factories.remove(type_name).is_some()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ComponentRegistry")
            .field("registered_types", &names)
            .finish()
    }
}

/// Creates a registry with the built-in component types.
///
/// | Type name | Component |
/// |-----------|-----------|
/// | `soc_ctrl` | [`SocCtrl`](crate::components::SocCtrl) |
/// | `clock_gen` | [`ClockGenerator`](crate::components::ClockGenerator) |
/// | `memory` | [`Memory`](crate::components::Memory) |
/// | `clock_counter` | [`ClockCounter`](crate::components::ClockCounter) |
/// | `wire_probe_bool` | [`WireProbe<bool>`](crate::components::WireProbe) |
/// | `wire_probe_u32` | [`WireProbe<u32>`](crate::components::WireProbe) |
/// | `io_initiator` | [`IoInitiator`](crate::components::IoInitiator) |
pub fn create_default_registry() -> ComponentRegistry {
    use crate::components::{ClockCounter, ClockGenerator, IoInitiator, Memory, SocCtrl, WireProbe};

    let mut registry = ComponentRegistry::new();
    registry.register("soc_ctrl", || Box::new(SocCtrl::new()));
    registry.register("clock_gen", || Box::new(ClockGenerator::new()));
    registry.register("memory", || Box::new(Memory::new()));
    registry.register("clock_counter", || Box::new(ClockCounter::new()));
    registry.register("wire_probe_bool", || Box::new(WireProbe::<bool>::new()));
    registry.register("wire_probe_u32", || Box::new(WireProbe::<u32>::new()));
    registry.register("io_initiator", || Box::new(IoInitiator::new()));
    registry
}
