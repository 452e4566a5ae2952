//! Memory-mapped I/O requests.
//!
//! An [`IoReq`] lives for exactly one synchronous dispatch: the initiator
//! builds it, hands it to an [`IoMaster`](crate::port::IoMaster) (or to
//! [`Simulation::io_request`](crate::engine::Simulation::io_request)), and
//! reads the outcome once the call returns. Payload bytes are little-endian.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// Outcome of an I/O request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoStatus {
    /// Completed
    #[default]
    Ok,
    /// Rejected by the target
    Error,
    /// Accepted, completion reported later by the target
    Pending,
    /// Target is busy, the initiator should retry
    Retry,
}

impl IoStatus {
    pub fn is_ok(self) -> bool {
        self == IoStatus::Ok
    }
}

/// One bus transaction.
#[derive(Clone, PartialEq, Eq)]
pub struct IoReq {
    /// Byte offset inside the target window
    pub addr: u64,
    size: usize,
    data: [u8; 8],
    is_write: bool,
    /// Outcome, set by the target
    pub status: IoStatus,
}

impl IoReq {
    fn new(addr: u64, size: usize, is_write: bool) -> Result<Self, IoError> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(IoError::InvalidSize(size));
        }
        Ok(Self {
            addr,
            size,
            data: [0; 8],
            is_write,
            status: IoStatus::Ok,
        })
    }

    /// Creates a read of `size` bytes at `addr`.
    pub fn read(addr: u64, size: usize) -> Result<Self, IoError> {
        Self::new(addr, size, false)
    }

    /// Creates a write of `bytes` at `addr`.
    pub fn write(addr: u64, bytes: &[u8]) -> Result<Self, IoError> {
        let mut req = Self::new(addr, bytes.len(), true)?;
        req.data[..bytes.len()].copy_from_slice(bytes);
        Ok(req)
    }

    /// Creates a write of the low `size` bytes of `value` at `addr`.
    pub fn write_value(addr: u64, size: usize, value: u64) -> Result<Self, IoError> {
        let mut req = Self::new(addr, size, true)?;
        req.set_value(value);
        Ok(req)
    }

    /// Creates a 32-bit read.
    pub fn read_u32(addr: u64) -> Self {
        Self {
            addr,
            size: 4,
            data: [0; 8],
            is_write: false,
            status: IoStatus::Ok,
        }
    }

    /// Creates a 32-bit write.
    pub fn write_u32(addr: u64, value: u32) -> Self {
        let mut req = Self::read_u32(addr);
        req.is_write = true;
        req.data[..4].copy_from_slice(&value.to_le_bytes());
        req
    }

    /// Transfer size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_write(&self) -> bool {
        self.is_write
    }

    /// Payload bytes, `size()` long.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.size]
    }

    /// Payload interpreted as a little-endian integer.
    pub fn value(&self) -> u64 {
        u64::from_le_bytes(self.data)
    }

    /// Replaces the payload with the low `size()` bytes of `value`.
    pub fn set_value(&mut self, value: u64) {
        let bytes = value.to_le_bytes();
        self.data = [0; 8];
        self.data[..self.size].copy_from_slice(&bytes[..self.size]);
    }

    /// End of the byte range covered by this request (exclusive), or `None`
    /// if the range runs past the top of the address space.
    pub fn end(&self) -> Option<u64> {
        self.addr.checked_add(self.size as u64)
    }
}

impl fmt::Debug for IoReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoReq")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("size", &self.size)
            .field("is_write", &self.is_write)
            .field("data", &format_args!("{:#x}", self.value()))
            .field("status", &self.status)
            .finish()
    }
}
