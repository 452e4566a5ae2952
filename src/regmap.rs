//! Declarative register maps.
//!
//! A [`RegMap`] owns the registers of one component's address window. It
//! resolves an [`IoReq`] to the register(s) it covers, splits requests that
//! cross register boundaries, merges partial writes with the bits they do
//! not touch, enforces field access modes and runs per-register callbacks:
//!
//! - write callbacks run after the new value is committed, so they observe
//!   post-write state;
//! - read callbacks run before the bytes are copied out, so they can refresh
//!   the register (e.g. snapshot another register) first.
//!
//! Byte order is little-endian throughout.
//!
//! Callbacks are plain `fn(&mut C, &RegAccess)` pointers. The owner reaches
//! its map through [`HasRegMap`], which lets the map hand the whole owner to
//! a callback once it has released its own borrow.

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::io::{IoReq, IoStatus};
use crate::trace::Trace;

/// Index of a register inside its map, in declaration order.
pub type RegId = usize;

/// Access mode of a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl Access {
    pub fn readable(self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    pub fn writable(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }
}

/// A bit field inside a register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: &'static str,
    pub bit_offset: u32,
    pub width: u32,
    pub access: Access,
}

impl Field {
    pub const fn new(name: &'static str, bit_offset: u32, width: u32, access: Access) -> Self {
        Self {
            name,
            bit_offset,
            width,
            access,
        }
    }

    /// Read-write field.
    pub const fn rw(name: &'static str, bit_offset: u32, width: u32) -> Self {
        Self::new(name, bit_offset, width, Access::ReadWrite)
    }

    /// Read-only field.
    pub const fn ro(name: &'static str, bit_offset: u32, width: u32) -> Self {
        Self::new(name, bit_offset, width, Access::ReadOnly)
    }

    /// Write-only field.
    pub const fn wo(name: &'static str, bit_offset: u32, width: u32) -> Self {
        Self::new(name, bit_offset, width, Access::WriteOnly)
    }

    /// Bits covered by this field, in register position.
    pub const fn mask(&self) -> u64 {
        let bits = if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        };
        bits << self.bit_offset
    }

    /// Reads this field out of a register value.
    pub fn extract(&self, reg: u64) -> u64 {
        (reg & self.mask()) >> self.bit_offset
    }

    /// Returns `reg` with this field replaced by `value`.
    pub fn insert(&self, reg: u64, value: u64) -> u64 {
        (reg & !self.mask()) | ((value << self.bit_offset) & self.mask())
    }
}

/// Description of one register access, handed to callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegAccess {
    /// Register being accessed
    pub reg: RegId,
    /// Byte offset inside the register
    pub offset: usize,
    /// Number of bytes accessed
    pub size: usize,
    pub is_write: bool,
    bytes: [u8; 8],
}

impl RegAccess {
    /// Bytes written (writes) or the register bytes before the callback (reads).
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size]
    }

    /// `bytes()` as a little-endian integer.
    pub fn value(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf[..self.size].copy_from_slice(self.bytes());
        u64::from_le_bytes(buf)
    }
}

/// Callback attached to a register.
pub type RegCallback<C> = fn(&mut C, &RegAccess);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Storage {
    Own,
    Alias(RegId),
}

/// What to do with bytes of a request that no register covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmappedPolicy {
    /// Leave the bytes untouched and complete with `Ok`
    #[default]
    Ignore,
    /// Fail the whole request with `Error`
    Error,
}

/// A register declaration.
///
/// Without fields every bit has the register-level access mode. Once fields
/// are declared, bits outside every field are reserved: they read as zero
/// and ignore writes.
pub struct Register<C> {
    name: String,
    offset: u64,
    width: usize,
    reset_value: u64,
    value: u64,
    access: Access,
    fields: Vec<Field>,
    storage: Storage,
    callback: Option<RegCallback<C>>,
}

impl<C> Register<C> {
    /// A register of `width` bytes at `offset`.
    pub fn new(name: impl Into<String>, offset: u64, width: usize) -> Self {
        Self {
            name: name.into(),
            offset,
            width,
            reset_value: 0,
            value: 0,
            access: Access::ReadWrite,
            fields: Vec::new(),
            storage: Storage::Own,
            callback: None,
        }
    }

    /// A read-only view at `offset` of the live value of `target`.
    pub fn alias(name: impl Into<String>, offset: u64, target: RegId) -> Self {
        let mut reg = Self::new(name, offset, 0);
        reg.storage = Storage::Alias(target);
        reg.access = Access::ReadOnly;
        reg
    }

    pub fn reset_value(mut self, value: u64) -> Self {
        self.reset_value = value;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: &[Field]) -> Self {
        self.fields.extend_from_slice(fields);
        self
    }

    pub fn on_access(mut self, callback: RegCallback<C>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Width in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.storage, Storage::Alias(_))
    }

    fn end(&self) -> u64 {
        self.offset + self.width as u64
    }

    fn width_mask(&self) -> u64 {
        if self.width >= 8 {
            u64::MAX
        } else {
            (1u64 << (8 * self.width)) - 1
        }
    }

    fn mask_where(&self, pick: fn(Access) -> bool) -> u64 {
        if self.fields.is_empty() {
            if pick(self.access) {
                self.width_mask()
            } else {
                0
            }
        } else {
            self.fields
                .iter()
                .filter(|f| pick(f.access))
                .fold(0, |mask, f| mask | f.mask())
        }
    }

    fn readable_mask(&self) -> u64 {
        self.mask_where(Access::readable)
    }

    fn writable_mask(&self) -> u64 {
        self.mask_where(Access::writable)
    }

    fn validate(&self) -> Result<(), BuildError> {
        let invalid = |reason: String| BuildError::InvalidRegister {
            name: self.name.clone(),
            reason,
        };
        if !matches!(self.width, 1 | 2 | 4 | 8) {
            return Err(invalid(format!("width {} is not 1, 2, 4 or 8 bytes", self.width)));
        }
        if self.offset.checked_add(self.width as u64).is_none() {
            return Err(invalid(format!(
                "offset {:#x} leaves no room for {} bytes",
                self.offset, self.width
            )));
        }
        let bits = 8 * self.width as u32;
        for field in &self.fields {
            let end = field.bit_offset.saturating_add(field.width);
            if field.width == 0 || end > bits {
                return Err(invalid(format!(
                    "field '{}' ({}..{}) does not fit in {} bits",
                    field.name,
                    field.bit_offset,
                    end,
                    bits
                )));
            }
        }
        Ok(())
    }
}

/// Types that own a register map of themselves.
pub trait HasRegMap: Sized {
    fn regmap(&mut self) -> &mut RegMap<Self>;
}

/// The registers of one address window.
pub struct RegMap<C> {
    regs: Vec<Register<C>>,
    /// Register ids sorted by offset
    order: Vec<RegId>,
    policy: UnmappedPolicy,
    trace: Trace,
}

impl<C> Default for RegMap<C> {
    fn default() -> Self {
        Self::new(Trace::new("", "regmap"))
    }
}

#[derive(Clone, Copy, Debug)]
struct Piece {
    reg: RegId,
    reg_offset: usize,
    req_offset: usize,
    len: usize,
}

impl<C> RegMap<C> {
    /// Creates an empty map logging through `trace`.
    pub fn new(trace: Trace) -> Self {
        Self {
            regs: Vec::new(),
            order: Vec::new(),
            policy: UnmappedPolicy::default(),
            trace,
        }
    }

    pub fn with_policy(mut self, policy: UnmappedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_policy(&mut self, policy: UnmappedPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> UnmappedPolicy {
        self.policy
    }

    /// Declares a register and returns its id.
    pub fn add(&mut self, mut reg: Register<C>) -> Result<RegId, BuildError> {
        if let Storage::Alias(target) = reg.storage {
            let live = self.regs.get(target).ok_or_else(|| BuildError::InvalidRegister {
                name: reg.name.clone(),
                reason: format!("alias target {} does not exist", target),
            })?;
            reg.storage = Storage::Alias(self.storage(target));
            reg.width = live.width;
        }
        reg.validate()?;

        if let Some(other) = self
            .regs
            .iter()
            .find(|other| reg.offset < other.end() && other.offset < reg.end())
        {
            return Err(BuildError::RegisterOverlap {
                name: reg.name.clone(),
                other: other.name.clone(),
            });
        }

        reg.reset_value &= reg.width_mask();
        reg.value = reg.reset_value;

        let id = self.regs.len();
        let pos = self
            .order
            .partition_point(|&other| self.regs[other].offset < reg.offset);
        self.order.insert(pos, id);
        self.regs.push(reg);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// Finds a register by name.
    pub fn id_of(&self, name: &str) -> Option<RegId> {
        self.regs.iter().position(|r| r.name == name)
    }

    pub fn register(&self, id: RegId) -> &Register<C> {
        &self.regs[id]
    }

    /// Registers in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (RegId, &Register<C>)> + '_ {
        self.order.iter().map(move |&id| (id, &self.regs[id]))
    }

    fn storage(&self, id: RegId) -> RegId {
        match self.regs[id].storage {
            Storage::Own => id,
            Storage::Alias(target) => target,
        }
    }

    /// Live value of a register (aliases read their target).
    pub fn get(&self, id: RegId) -> u64 {
        self.regs[self.storage(id)].value
    }

    /// Sets a register from the hardware side, ignoring access modes.
    pub fn set(&mut self, id: RegId, value: u64) {
        let id = self.storage(id);
        let reg = &mut self.regs[id];
        reg.value = value & reg.width_mask();
    }

    /// Reads one field of a register.
    pub fn field(&self, id: RegId, field: &Field) -> u64 {
        field.extract(self.get(id))
    }

    /// Writes one field from the hardware side, ignoring its access mode.
    pub fn set_field(&mut self, id: RegId, field: &Field, value: u64) {
        let current = self.get(id);
        self.set(id, field.insert(current, value));
    }

    /// Restores reset values while `active`.
    pub fn reset(&mut self, active: bool) {
        if !active {
            return;
        }
        for reg in self.regs.iter_mut().filter(|r| r.storage == Storage::Own) {
            reg.value = reg.reset_value;
        }
        self.trace
            .debug(format_args!("Reset {} registers", self.regs.len()));
    }

    fn lookup(&self, addr: u64) -> Option<RegId> {
        let idx = self
            .order
            .partition_point(|&id| self.regs[id].end() <= addr);
        let id = *self.order.get(idx)?;
        (self.regs[id].offset <= addr).then_some(id)
    }

    /// Splits `[addr, addr + size)` into per-register pieces. The flag is
    /// set if some bytes are not covered by any register. A range running
    /// past the top of the address space is unmapped as a whole.
    fn plan(&self, addr: u64, size: usize) -> (Vec<Piece>, bool) {
        let Some(end) = addr.checked_add(size as u64) else {
            return (Vec::new(), true);
        };
        let mut pieces = Vec::new();
        let mut unmapped = false;
        let mut cursor = addr;

        while cursor < end {
            match self.lookup(cursor) {
                Some(id) => {
                    let reg = &self.regs[id];
                    let stop = end.min(reg.end());
                    pieces.push(Piece {
                        reg: id,
                        reg_offset: (cursor - reg.offset) as usize,
                        req_offset: (cursor - addr) as usize,
                        len: (stop - cursor) as usize,
                    });
                    cursor = stop;
                }
                None => {
                    unmapped = true;
                    let idx = self
                        .order
                        .partition_point(|&id| self.regs[id].offset <= cursor);
                    cursor = self
                        .order
                        .get(idx)
                        .map_or(end, |&id| end.min(self.regs[id].offset));
                }
            }
        }

        (pieces, unmapped)
    }

    /// Commits the bytes of one write piece and returns the callback to run.
    fn commit(&mut self, piece: Piece, bytes: &[u8]) -> Option<(RegCallback<C>, RegAccess)> {
        let reg = &self.regs[piece.reg];
        if reg.is_alias() {
            self.trace.debug(format_args!(
                "Ignoring write to alias register {} (offset: {:#x})",
                reg.name, reg.offset
            ));
            return None;
        }

        let old = reg.value;
        let mut merged = old.to_le_bytes();
        merged[piece.reg_offset..piece.reg_offset + piece.len].copy_from_slice(bytes);
        let incoming = u64::from_le_bytes(merged);
        let writable = reg.writable_mask();
        let committed = (old & !writable) | (incoming & writable);

        if (incoming ^ old) & !writable != 0 {
            self.trace.warn(format_args!(
                "Discarding write to read-only bits of {} (value: {:#x}, mask: {:#x})",
                reg.name,
                incoming,
                !writable & reg.width_mask()
            ));
        }
        self.trace.trace(format_args!(
            "Write {} (offset: {}, size: {}, value: {:#x})",
            reg.name, piece.reg_offset, piece.len, committed
        ));

        let callback = reg.callback;
        self.regs[piece.reg].value = committed;

        let mut raw = [0u8; 8];
        raw[..piece.len].copy_from_slice(bytes);
        callback.map(|cb| {
            (
                cb,
                RegAccess {
                    reg: piece.reg,
                    offset: piece.reg_offset,
                    size: piece.len,
                    is_write: true,
                    bytes: raw,
                },
            )
        })
    }

    fn read_access(&self, piece: Piece) -> RegAccess {
        let current = self.get(piece.reg).to_le_bytes();
        let mut raw = [0u8; 8];
        raw[..piece.len].copy_from_slice(&current[piece.reg_offset..piece.reg_offset + piece.len]);
        RegAccess {
            reg: piece.reg,
            offset: piece.reg_offset,
            size: piece.len,
            is_write: false,
            bytes: raw,
        }
    }

    fn readable_value(&self, id: RegId) -> u64 {
        let live = &self.regs[self.storage(id)];
        live.value & live.readable_mask()
    }
}

impl<C: HasRegMap> RegMap<C> {
    /// Performs `req` against the register map of `owner`.
    pub fn access(owner: &mut C, req: &mut IoReq) -> IoStatus {
        let (pieces, unmapped) = owner.regmap().plan(req.addr, req.size());

        if unmapped {
            let map = owner.regmap();
            match map.policy {
                UnmappedPolicy::Ignore => map.trace.debug(format_args!(
                    "Ignoring unmapped access (offset: {:#x}, size: {}, is_write: {})",
                    req.addr,
                    req.size(),
                    req.is_write()
                )),
                UnmappedPolicy::Error => {
                    map.trace.warn(format_args!(
                        "Rejecting unmapped access (offset: {:#x}, size: {}, is_write: {})",
                        req.addr,
                        req.size(),
                        req.is_write()
                    ));
                    req.status = IoStatus::Error;
                    return IoStatus::Error;
                }
            }
        }

        for piece in pieces {
            if req.is_write() {
                let bytes = &req.data()[piece.req_offset..piece.req_offset + piece.len];
                if let Some((callback, access)) = owner.regmap().commit(piece, bytes) {
                    callback(owner, &access);
                }
            } else {
                let (callback, access) = {
                    let map = owner.regmap();
                    (map.regs[piece.reg].callback, map.read_access(piece))
                };
                if let Some(callback) = callback {
                    callback(owner, &access);
                }
                let value = owner.regmap().readable_value(piece.reg).to_le_bytes();
                req.data_mut()[piece.req_offset..piece.req_offset + piece.len]
                    .copy_from_slice(&value[piece.reg_offset..piece.reg_offset + piece.len]);
            }
        }

        req.status = IoStatus::Ok;
        IoStatus::Ok
    }
}
