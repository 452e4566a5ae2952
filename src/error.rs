//! Error types for every layer of the kernel.
//!
//! Build and bind errors are fatal: they surface from
//! [`Simulation::build`](crate::engine::Simulation::build) before simulated
//! time advances. Transaction-level problems are not errors at this level;
//! they are reported through [`IoStatus`](crate::io::IoStatus).

use thiserror::Error;

use crate::config::ConfigError;
use crate::port::PortKind;
use crate::types::PortPath;

/// Errors raised by a component while it builds.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Port '{0}' declared twice")]
    DuplicatePort(String),

    #[error("Handler of port '{port}' belongs to {handler_owner}, not to the component being built")]
    HandlerOwnerMismatch {
        port: String,
        handler_owner: &'static str,
    },

    #[error("Register '{name}' overlaps register '{other}'")]
    RegisterOverlap { name: String, other: String },

    #[error("Invalid register '{name}': {reason}")]
    InvalidRegister { name: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Invalid(String),
}

/// Errors raised while resolving the binding manifest.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BindError {
    #[error("Malformed port path '{0}' (expected 'component/port')")]
    MalformedPath(String),

    #[error("No component named '{0}'")]
    UnresolvedComponent(String),

    #[error("No port named '{0}'")]
    UnresolvedPort(PortPath),

    #[error("Port '{path}' is a {found} port, expected a {expected} port")]
    WrongDirection {
        path: PortPath,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Cannot bind {master} ({master_kind}) to {slave} ({slave_kind})")]
    KindMismatch {
        master: PortPath,
        master_kind: PortKind,
        slave: PortPath,
        slave_kind: PortKind,
    },

    #[error("Slave port '{0}' is already bound to a master")]
    SlaveAlreadyBound(PortPath),

    #[error("Master port '{0}' is not a broadcast port and is already bound")]
    MasterAlreadyBound(PortPath),
}

/// Errors raised when constructing an I/O request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    #[error("Invalid transfer size {0} (expected 1, 2, 4 or 8)")]
    InvalidSize(usize),
}

/// Top-level simulation error.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Component '{component}' failed to build: {source}")]
    Build {
        component: String,
        #[source]
        source: BuildError,
    },

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("Component name '{0}' is already used")]
    DuplicateComponent(String),

    #[error("Invalid component name '{0}'")]
    InvalidComponentName(String),

    #[error("Unknown component type '{type_name}' for component '{name}'")]
    UnknownComponentType { name: String, type_name: String },

    #[error("No component with id {0}")]
    UnknownComponent(String),

    #[error("No slave port '{0}'")]
    UnknownPort(PortPath),

    #[error("Slave port '{path}' is a {kind} port")]
    PortKindMismatch { path: PortPath, kind: PortKind },

    #[error("The platform is already built; components and bindings are closed")]
    BindingClosed,

    #[error("Reset is already asserted")]
    ResetAlreadyActive,
}

/// Result alias for simulation-level operations.
pub type SimResult<T> = Result<T, SimError>;
