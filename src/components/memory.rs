//! Byte-addressable RAM.

use crate::component::{Build, Component};
use crate::error::BuildError;
use crate::io::{IoReq, IoStatus};
use crate::port::IoSlave;
use crate::trace::Trace;

/// A flat RAM behind an `io` slave port named `input`.
///
/// Configuration: `size` (bytes, required). Accesses that run past the end
/// of the array complete with `Error` and leave memory untouched. Contents
/// survive reset.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
    trace: Trace,
    reads: u64,
    writes: u64,
    errors: u64,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            trace: Trace::new("", "trace"),
            reads: 0,
            writes: 0,
            errors: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Backdoor view of the contents.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Backdoor load, e.g. of a boot image.
    pub fn load(&mut self, offset: usize, image: &[u8]) -> bool {
        let Some(end) = offset.checked_add(image.len()) else {
            return false;
        };
        match self.data.get_mut(offset..end) {
            Some(dst) => {
                dst.copy_from_slice(image);
                true
            }
            None => false,
        }
    }

    fn on_request(&mut self, req: &mut IoReq) -> IoStatus {
        let len = self.data.len() as u64;
        let Some(end) = req.end().filter(|&end| end <= len) else {
            self.errors += 1;
            self.trace.warn(format_args!(
                "Out-of-range access (offset: {:#x}, size: {}, memory size: {:#x})",
                req.addr,
                req.size(),
                self.data.len()
            ));
            return IoStatus::Error;
        };
        let (start, end) = (req.addr as usize, end as usize);

        if req.is_write() {
            self.writes += 1;
            self.data[start..end].copy_from_slice(req.data());
        } else {
            self.reads += 1;
            req.data_mut().copy_from_slice(&self.data[start..end]);
        }
        IoStatus::Ok
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Memory {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        let size = b.config().get_usize("size")?;
        if size == 0 {
            return Err(BuildError::Invalid("memory size must not be zero".into()));
        }
        self.data = vec![0; size];
        self.trace = b.trace("trace");
        b.new_slave_port("input", IoSlave::new(Self::on_request))
    }

    fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "size": self.data.len(),
            "reads": self.reads,
            "writes": self.writes,
            "errors": self.errors,
        })
    }
}
