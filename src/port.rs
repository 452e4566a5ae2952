//! Typed ports: `io`, `wire<T>` and `clock`.
//!
//! A master port is a plain field of the component that owns it. During
//! `build()` the component registers it with
//! [`Build::new_master_port`](crate::component::Build::new_master_port),
//! which hands the kernel a second handle to the same binding slots. Once
//! the manifest is resolved, `sync`/`req` on the field call straight into
//! the bound slave.
//!
//! A slave port is a handler: a plain method of the owning component. The
//! kernel turns it into a delegate that borrows the owner for the duration
//! of one call.
//!
//! A wire or clock sync that reaches a component already running a handler
//! is queued on that component and delivered as soon as the running handler
//! returns, within the same instant and before the originating `sync`
//! returns. Loops therefore work as long as they settle, typically by
//! re-propagating only on a value change. A loop that keeps queuing past
//! [`MAX_DEFERRED_SYNCS`] deliveries panics with the port path. An `io`
//! request cannot be deferred, since its status is needed at once: re-entering
//! a busy component through an `io` port panics.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::component::{Component, ComponentCell};
use crate::error::BindError;
use crate::io::{IoReq, IoStatus};
use crate::types::PortPath;

/// Values that can travel over a wire port.
pub trait WireValue: Copy + fmt::Debug + 'static {}

impl<T: Copy + fmt::Debug + 'static> WireValue for T {}

/// The kind of a port, compared at bind time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortKind {
    Io,
    Wire {
        type_id: TypeId,
        type_name: &'static str,
    },
    Clock,
}

impl PortKind {
    /// Kind of a `wire<T>` port.
    pub fn wire<T: WireValue>() -> Self {
        PortKind::Wire {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Io => write!(f, "io"),
            PortKind::Wire { type_name, .. } => write!(f, "wire<{}>", type_name),
            PortKind::Clock => write!(f, "clock"),
        }
    }
}

/// A bound slave entry point with its resolved target.
pub(crate) struct Delegate<F: ?Sized> {
    pub(crate) path: PortPath,
    pub(crate) call: Rc<F>,
}

impl<F: ?Sized> Clone for Delegate<F> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            call: Rc::clone(&self.call),
        }
    }
}

pub(crate) type WireDelegate<T> = Delegate<dyn Fn(T)>;
pub(crate) type IoDelegate = Delegate<dyn Fn(&mut IoReq) -> IoStatus>;
pub(crate) type ClockDelegate = Delegate<dyn Fn(bool)>;

/// Deferred deliveries queued on one busy component before a loop counts as
/// unsettled.
pub const MAX_DEFERRED_SYNCS: usize = 1024;

type DeferredSync = Box<dyn FnOnce(&mut dyn Component)>;

/// Syncs that reached a component while it was running a handler.
#[derive(Default)]
pub(crate) struct PendingSyncs {
    queue: RefCell<VecDeque<(PortPath, DeferredSync)>>,
}

impl PendingSyncs {
    fn push(&self, path: PortPath, sync: DeferredSync) {
        self.queue.borrow_mut().push_back((path, sync));
    }

    /// Delivers queued syncs in arrival order, including the ones queued
    /// while delivering, until none is left.
    pub(crate) fn drain(&self, component: &mut dyn Component) {
        let mut delivered = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some((path, sync)) = next else {
                return;
            };
            delivered += 1;
            if delivered > MAX_DEFERRED_SYNCS {
                self.queue.borrow_mut().clear();
                panic!(
                    "synchronization cycle through {} did not settle after {} deliveries",
                    path, MAX_DEFERRED_SYNCS
                );
            }
            sync(&mut *component);
        }
    }
}

fn downcast<'c, C: Component>(component: &'c mut dyn Component, path: &PortPath) -> &'c mut C {
    match component.as_any_mut().downcast_mut::<C>() {
        Some(owner) => owner,
        None => panic!("handler of {} does not belong to its component", path),
    }
}

/// The component a slave delegate calls into, with its deferred syncs.
#[doc(hidden)]
#[derive(Clone)]
pub struct SlaveOwner {
    cell: Weak<ComponentCell>,
    pending: Rc<PendingSyncs>,
}

impl SlaveOwner {
    pub(crate) fn new(cell: Weak<ComponentCell>, pending: Rc<PendingSyncs>) -> Self {
        Self { cell, pending }
    }

    fn upgrade(&self, path: &PortPath) -> Rc<ComponentCell> {
        match self.cell.upgrade() {
            Some(cell) => cell,
            None => panic!("port {} called after its component was dropped", path),
        }
    }

    fn dispatch<C: Component, R>(
        &self,
        component: &mut dyn Component,
        path: &PortPath,
        f: impl FnOnce(&mut C) -> R,
    ) -> R {
        // Leftovers from a borrow taken outside the kernel go first.
        self.pending.drain(component);
        let result = f(downcast::<C>(component, path));
        self.pending.drain(component);
        result
    }

    /// Runs `f` on the owner now. Panics if the owner is busy.
    fn request<C: Component, R>(&self, path: &PortPath, f: impl FnOnce(&mut C) -> R) -> R {
        let cell = self.upgrade(path);
        let mut guard = match cell.try_borrow_mut() {
            Ok(guard) => guard,
            Err(_) => panic!("re-entrant io request into {} (synchronization cycle)", path),
        };
        self.dispatch(&mut **guard, path, f)
    }

    /// Runs `f` on the owner, or queues it if the owner is busy.
    fn sync<C: Component>(&self, path: &PortPath, f: impl FnOnce(&mut C) + 'static) {
        let cell = self.upgrade(path);
        let Ok(mut guard) = cell.try_borrow_mut() else {
            let at = path.clone();
            self.pending.push(
                path.clone(),
                Box::new(move |component: &mut dyn Component| f(downcast::<C>(component, &at))),
            );
            return;
        };
        self.dispatch(&mut **guard, path, f);
    }
}

/// The kernel-side view of a registered master port.
#[doc(hidden)]
pub trait MasterBinding {
    fn kind(&self) -> PortKind;
    fn is_bound(&self) -> bool;
    fn bind(&self, master: &PortPath, slave: &PortPath, target: &dyn Any) -> Result<(), BindError>;
}

/// A port that can be registered as a master.
pub trait MasterPort {
    #[doc(hidden)]
    fn binding(&self) -> Box<dyn MasterBinding>;
}

/// A handler that can be registered as a slave port of component `C`.
pub trait SlavePort<C: Component> {
    fn kind(&self) -> PortKind;

    #[doc(hidden)]
    fn into_target(self, path: PortPath, owner: SlaveOwner) -> Box<dyn Any>;
}

/// Shared binding slots of a master.
struct Slots<F: ?Sized> {
    targets: Rc<RefCell<Vec<Delegate<F>>>>,
    broadcast: bool,
    kind: PortKind,
}

impl<F: ?Sized + 'static> Slots<F> {
    fn new(kind: PortKind, broadcast: bool) -> Self {
        Self {
            targets: Rc::new(RefCell::new(Vec::new())),
            broadcast,
            kind,
        }
    }

    fn share(&self) -> Self {
        Self {
            targets: Rc::clone(&self.targets),
            broadcast: self.broadcast,
            kind: self.kind,
        }
    }

    fn has_targets(&self) -> bool {
        !self.targets.borrow().is_empty()
    }
}

impl<F: ?Sized + 'static> MasterBinding for Slots<F> {
    fn kind(&self) -> PortKind {
        self.kind
    }

    fn is_bound(&self) -> bool {
        self.has_targets()
    }

    fn bind(&self, master: &PortPath, slave: &PortPath, target: &dyn Any) -> Result<(), BindError> {
        let delegate = target
            .downcast_ref::<Delegate<F>>()
            .ok_or_else(|| BindError::KindMismatch {
                master: master.clone(),
                master_kind: self.kind,
                slave: slave.clone(),
                slave_kind: self.kind,
            })?;
        let mut targets = self.targets.borrow_mut();
        if !self.broadcast && !targets.is_empty() {
            return Err(BindError::MasterAlreadyBound(master.clone()));
        }
        targets.push(delegate.clone());
        Ok(())
    }
}

/// Master side of a `wire<T>` port.
pub struct WireMaster<T: WireValue> {
    slots: Slots<dyn Fn(T)>,
}

impl<T: WireValue> WireMaster<T> {
    /// Creates a master that binds to exactly one slave.
    pub fn new() -> Self {
        Self {
            slots: Slots::new(PortKind::wire::<T>(), false),
        }
    }

    /// Creates a master that may bind to any number of slaves.
    pub fn broadcast() -> Self {
        Self {
            slots: Slots::new(PortKind::wire::<T>(), true),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.slots.has_targets()
    }

    /// Propagates `value` to every bound slave, in binding order.
    ///
    /// Must only be called on a bound port.
    pub fn sync(&self, value: T) {
        let targets = self.slots.targets.borrow();
        debug_assert!(!targets.is_empty(), "sync on an unbound wire master");
        for target in targets.iter() {
            (target.call)(value);
        }
    }

    /// Paths of the slaves this master is bound to.
    pub fn targets(&self) -> Vec<PortPath> {
        self.slots.targets.borrow().iter().map(|d| d.path.clone()).collect()
    }
}

impl<T: WireValue> Default for WireMaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WireValue> fmt::Debug for WireMaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireMaster")
            .field("kind", &self.slots.kind.to_string())
            .field("targets", &self.targets())
            .finish()
    }
}

impl<T: WireValue> MasterPort for WireMaster<T> {
    fn binding(&self) -> Box<dyn MasterBinding> {
        Box::new(self.slots.share())
    }
}

/// Master side of a `clock` port. Clock masters always broadcast.
pub struct ClockMaster {
    slots: Slots<dyn Fn(bool)>,
}

impl ClockMaster {
    pub fn new() -> Self {
        Self {
            slots: Slots::new(PortKind::Clock, true),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.slots.has_targets()
    }

    /// Delivers one edge with the given level to every bound slave.
    pub fn sync(&self, level: bool) {
        let targets = self.slots.targets.borrow();
        debug_assert!(!targets.is_empty(), "sync on an unbound clock master");
        for target in targets.iter() {
            (target.call)(level);
        }
    }
}

impl Default for ClockMaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClockMaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockMaster")
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl MasterPort for ClockMaster {
    fn binding(&self) -> Box<dyn MasterBinding> {
        Box::new(self.slots.share())
    }
}

/// Master side of an `io` port.
pub struct IoMaster {
    slots: Slots<dyn Fn(&mut IoReq) -> IoStatus>,
}

impl IoMaster {
    pub fn new() -> Self {
        Self {
            slots: Slots::new(PortKind::Io, false),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.slots.has_targets()
    }

    /// Dispatches `req` to the bound slave and returns its status.
    ///
    /// The slave runs to completion before this returns. A request always
    /// gets a status, so on an unbound port nothing is dispatched, the payload
    /// is left untouched and the status is `Error`, in every build.
    pub fn req(&self, req: &mut IoReq) -> IoStatus {
        let targets = self.slots.targets.borrow();
        let status = match targets.first() {
            Some(target) => (target.call)(req),
            None => IoStatus::Error,
        };
        req.status = status;
        status
    }
}

impl Default for IoMaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IoMaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoMaster")
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl MasterPort for IoMaster {
    fn binding(&self) -> Box<dyn MasterBinding> {
        Box::new(self.slots.share())
    }
}

enum WireHandler<C, T> {
    Plain(fn(&mut C, T)),
    Muxed(fn(&mut C, usize, T), usize),
}

/// Slave side of a `wire<T>` port, handled by a method of `C`.
pub struct WireSlave<C, T> {
    handler: WireHandler<C, T>,
}

impl<C: Component, T: WireValue> WireSlave<C, T> {
    pub fn new(handler: fn(&mut C, T)) -> Self {
        Self {
            handler: WireHandler::Plain(handler),
        }
    }

    /// Handler shared by several ports, told apart by `index`.
    pub fn muxed(handler: fn(&mut C, usize, T), index: usize) -> Self {
        Self {
            handler: WireHandler::Muxed(handler, index),
        }
    }
}

impl<C: Component, T: WireValue> SlavePort<C> for WireSlave<C, T> {
    fn kind(&self) -> PortKind {
        PortKind::wire::<T>()
    }

    fn into_target(self, path: PortPath, owner: SlaveOwner) -> Box<dyn Any> {
        let at = path.clone();
        let call: Rc<dyn Fn(T)> = match self.handler {
            WireHandler::Plain(f) => {
                Rc::new(move |value| owner.sync::<C>(&at, move |c| f(c, value)))
            }
            WireHandler::Muxed(f, index) => {
                Rc::new(move |value| owner.sync::<C>(&at, move |c| f(c, index, value)))
            }
        };
        Box::new(WireDelegate::<T> { path, call })
    }
}

/// Slave side of a `clock` port, handled by a method of `C`.
pub struct ClockSlave<C> {
    handler: fn(&mut C, bool),
}

impl<C: Component> ClockSlave<C> {
    pub fn new(handler: fn(&mut C, bool)) -> Self {
        Self { handler }
    }
}

impl<C: Component> SlavePort<C> for ClockSlave<C> {
    fn kind(&self) -> PortKind {
        PortKind::Clock
    }

    fn into_target(self, path: PortPath, owner: SlaveOwner) -> Box<dyn Any> {
        let at = path.clone();
        let f = self.handler;
        let call: Rc<dyn Fn(bool)> =
            Rc::new(move |level| owner.sync::<C>(&at, move |c| f(c, level)));
        Box::new(ClockDelegate { path, call })
    }
}

/// Slave side of an `io` port, handled by a method of `C`.
pub struct IoSlave<C> {
    handler: fn(&mut C, &mut IoReq) -> IoStatus,
}

impl<C: Component> IoSlave<C> {
    pub fn new(handler: fn(&mut C, &mut IoReq) -> IoStatus) -> Self {
        Self { handler }
    }
}

impl<C: Component> SlavePort<C> for IoSlave<C> {
    fn kind(&self) -> PortKind {
        PortKind::Io
    }

    fn into_target(self, path: PortPath, owner: SlaveOwner) -> Box<dyn Any> {
        let at = path.clone();
        let f = self.handler;
        let call: Rc<dyn Fn(&mut IoReq) -> IoStatus> =
            Rc::new(move |req: &mut IoReq| owner.request::<C, _>(&at, |c| f(c, req)));
        Box::new(IoDelegate { path, call })
    }
}

/// A registered slave port: its kind, resolved delegate and binding state.
pub(crate) struct SlaveEntry {
    pub(crate) kind: PortKind,
    pub(crate) target: Box<dyn Any>,
    pub(crate) bound: bool,
}

/// Ports declared by one component.
#[derive(Default)]
pub(crate) struct PortTable {
    pub(crate) masters: std::collections::BTreeMap<String, Box<dyn MasterBinding>>,
    pub(crate) slaves: std::collections::BTreeMap<String, SlaveEntry>,
}

impl PortTable {
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.masters.contains_key(name) || self.slaves.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.masters.len() + self.slaves.len()
    }
}
