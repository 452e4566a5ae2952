//! Component definitions and the `Component` trait.
//!
//! Components are the hardware blocks of the platform graph. Each one is a
//! local state machine that declares its ports while it builds, reacts to
//! port traffic synchronously, and asks the kernel for timed callbacks by
//! returning [`Event`]s.
//!
//! # Lifecycle
//!
//! 1. Constructed and handed to a [`Simulation`](crate::engine::Simulation).
//! 2. [`Component::build`] runs exactly once with a [`Build`] context: read
//!    configuration, declare ports and registers.
//! 3. The binding manifest is resolved.
//! 4. [`Component::reset`] is pulsed (`true` then `false`).
//! 5. [`Component::start`] runs once and returns the first events.
//! 6. [`Component::on_event`] runs for every delivered event.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use crate::config::ConfigNode;
use crate::engine::EngineHandle;
use crate::error::BuildError;
use crate::event::Event;
use crate::hooks::PowerHook;
use crate::port::{MasterPort, PortTable, SlaveEntry, SlaveOwner, SlavePort};
use crate::trace::Trace;
use crate::types::{ComponentId, PortPath};

/// Upcast to `Any` so the kernel can hand typed access back to callers.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The storage cell a component lives in.
pub type ComponentCell = RefCell<Box<dyn Component>>;

/// The core trait that all hardware models must implement.
pub trait Component: AsAny {
    /// Declares ports and registers and reads static configuration.
    ///
    /// An error aborts construction of the whole platform.
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError>;

    /// Called with `true` when reset is asserted and `false` on release.
    ///
    /// While asserted, outputs must sit in their reset state.
    fn reset(&mut self, _active: bool) {}

    /// Called once after binding. Returns the initial events to schedule.
    fn start(&mut self) -> Vec<Event> {
        Vec::new()
    }

    /// Called when a scheduled event for this component fires.
    fn on_event(&mut self, _event: &Event) -> Vec<Event> {
        Vec::new()
    }

    /// Exports component statistics as JSON.
    fn export_stats(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Context handed to [`Component::build`].
///
/// Ports can only be declared through this context, so no port can appear
/// after a component has finished building.
pub struct Build<'a> {
    id: ComponentId,
    name: &'a str,
    config: &'a ConfigNode,
    ports: &'a mut PortTable,
    owner: SlaveOwner,
    owner_type: TypeId,
    engine: &'a EngineHandle,
    power: &'a PowerHook,
}

impl<'a> Build<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ComponentId,
        name: &'a str,
        config: &'a ConfigNode,
        ports: &'a mut PortTable,
        owner: SlaveOwner,
        owner_type: TypeId,
        engine: &'a EngineHandle,
        power: &'a PowerHook,
    ) -> Self {
        Self {
            id,
            name,
            config,
            ports,
            owner,
            owner_type,
            engine,
            power,
        }
    }

    /// Handle of the component being built.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Instance name of the component being built.
    pub fn name(&self) -> &str {
        self.name
    }

    /// This component's configuration subtree.
    pub fn config(&self) -> &ConfigNode {
        self.config
    }

    /// Opens a named trace channel for this component.
    pub fn trace(&self, channel: &str) -> Trace {
        Trace::new(self.name, channel)
    }

    /// Handle on the engine (time, halt requests).
    pub fn engine(&self) -> EngineHandle {
        self.engine.clone()
    }

    /// The power-capture hook installed on the simulation.
    pub fn power(&self) -> PowerHook {
        self.power.clone()
    }

    fn claim(&self, name: &str) -> Result<(), BuildError> {
        if name.is_empty() || self.ports.contains(name) {
            return Err(BuildError::DuplicatePort(name.to_string()));
        }
        Ok(())
    }

    /// Registers a master port under `name`.
    pub fn new_master_port(&mut self, name: &str, port: &impl MasterPort) -> Result<(), BuildError> {
        self.claim(name)?;
        self.ports.masters.insert(name.to_string(), port.binding());
        Ok(())
    }

    /// Registers a slave port under `name`, handled by a method of `C`.
    ///
    /// `C` must be the type of the component being built.
    pub fn new_slave_port<C, P>(&mut self, name: &str, port: P) -> Result<(), BuildError>
    where
        C: Component,
        P: SlavePort<C>,
    {
        self.claim(name)?;
        if TypeId::of::<C>() != self.owner_type {
            return Err(BuildError::HandlerOwnerMismatch {
                port: name.to_string(),
                handler_owner: type_name::<C>(),
            });
        }
        let kind = port.kind();
        let target = port.into_target(PortPath::new(self.name, name), self.owner.clone());
        self.ports.slaves.insert(
            name.to_string(),
            SlaveEntry {
                kind,
                target,
                bound: false,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blank;

    impl Component for Blank {
        fn build(&mut self, _b: &mut Build<'_>) -> Result<(), BuildError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_hooks() {
        let mut blank = Blank;
        blank.reset(true);
        assert!(blank.start().is_empty());
        assert!(blank.on_event(&Event::new(0, ComponentId(0), 0)).is_empty());
        assert!(blank.export_stats().is_null());
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let mut boxed: Box<dyn Component> = Box::new(Blank);
        let component: &mut dyn Component = &mut *boxed;
        assert!(component.as_any_mut().downcast_mut::<Blank>().is_some());
        assert_eq!(component.as_any().type_id(), TypeId::of::<Blank>());
    }
}
