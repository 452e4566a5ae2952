//! Side-channel hooks: power capture and mask fan-out.
//!
//! Both are fire-and-forget. A component never learns whether a capture
//! collaborator exists, and fanning a mask out over unbound ports is a
//! no-op for those ports.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::port::WireMaster;

/// External power-accounting collaborator.
pub trait PowerCapture {
    fn start_capture(&self);
    fn stop_capture(&self);
}

/// Component-side handle on the installed [`PowerCapture`], if any.
#[derive(Clone, Default)]
pub struct PowerHook {
    capture: Option<Rc<dyn PowerCapture>>,
}

impl PowerHook {
    /// Hook that forwards to `capture`.
    pub fn new(capture: Rc<dyn PowerCapture>) -> Self {
        Self {
            capture: Some(capture),
        }
    }

    /// Hook with nothing behind it.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.capture.is_some()
    }

    pub fn start_capture(&self) {
        if let Some(capture) = &self.capture {
            capture.start_capture();
        }
    }

    pub fn stop_capture(&self) {
        if let Some(capture) = &self.capture {
            capture.stop_capture();
        }
    }
}

impl fmt::Debug for PowerHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerHook")
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// A capture request observed by [`CaptureRecorder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureEvent {
    Start,
    Stop,
}

/// A [`PowerCapture`] that records requests in order.
#[derive(Debug, Default)]
pub struct CaptureRecorder {
    log: RefCell<Vec<CaptureEvent>>,
}

impl CaptureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far.
    pub fn events(&self) -> Vec<CaptureEvent> {
        self.log.borrow().clone()
    }

    /// True while a capture is open.
    pub fn is_capturing(&self) -> bool {
        self.log.borrow().last() == Some(&CaptureEvent::Start)
    }
}

impl PowerCapture for CaptureRecorder {
    fn start_capture(&self) {
        tracing::info!("power capture started");
        self.log.borrow_mut().push(CaptureEvent::Start);
    }

    fn stop_capture(&self) {
        tracing::info!("power capture stopped");
        self.log.borrow_mut().push(CaptureEvent::Stop);
    }
}

/// How a mask bit maps onto a port level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    /// Bit set drives `true`
    Direct,
    /// Bit set drives `false`
    Inverted,
}

impl Polarity {
    /// Level driven for `bit`.
    pub fn level(self, bit: bool) -> bool {
        match self {
            Polarity::Direct => bit,
            Polarity::Inverted => !bit,
        }
    }
}

/// Drives bit `i` of `mask` onto `ports[i]`, in index order.
///
/// Unbound ports are skipped. Bits beyond the last port are ignored, and
/// ports past bit 63 see a clear bit.
pub fn fan_out_mask(ports: &[WireMaster<bool>], mask: u64, polarity: Polarity) {
    for (i, port) in ports.iter().enumerate() {
        if !port.is_bound() {
            continue;
        }
        let bit = u32::try_from(i)
            .ok()
            .and_then(|shift| mask.checked_shr(shift))
            .map_or(false, |m| m & 1 != 0);
        port.sync(polarity.level(bit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MasterBinding, MasterPort, WireDelegate};
    use crate::types::PortPath;

    #[test]
    fn test_detached_hook_is_noop() {
        let hook = PowerHook::detached();
        assert!(!hook.is_installed());
        hook.start_capture();
        hook.stop_capture();
    }

    #[test]
    fn test_hook_forwards_in_order() {
        let recorder = Rc::new(CaptureRecorder::new());
        let hook = PowerHook::new(recorder.clone());

        hook.start_capture();
        assert!(recorder.is_capturing());
        hook.stop_capture();

        assert_eq!(recorder.events(), vec![CaptureEvent::Start, CaptureEvent::Stop]);
        assert!(!recorder.is_capturing());
    }

    #[test]
    fn test_polarity() {
        assert!(Polarity::Direct.level(true));
        assert!(!Polarity::Direct.level(false));
        assert!(!Polarity::Inverted.level(true));
        assert!(Polarity::Inverted.level(false));
    }

    fn recording_ports(count: usize) -> (Vec<WireMaster<bool>>, Rc<RefCell<Vec<(usize, bool)>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let ports = (0..count)
            .map(|i| {
                let port = WireMaster::<bool>::new();
                let sink = Rc::clone(&seen);
                let target = WireDelegate::<bool> {
                    path: PortPath::new(format!("bank{}", i), "input"),
                    call: Rc::new(move |level: bool| sink.borrow_mut().push((i, level))),
                };
                port.binding()
                    .bind(&PortPath::new("ctrl", format!("out{}", i)), &target.path, &target)
                    .unwrap();
                port
            })
            .collect();
        (ports, seen)
    }

    #[test]
    fn test_fan_out_drives_ports_in_order() {
        let (ports, seen) = recording_ports(4);
        fan_out_mask(&ports, 0b0101, Polarity::Direct);
        assert_eq!(
            *seen.borrow(),
            vec![(0, true), (1, false), (2, true), (3, false)]
        );
    }

    #[test]
    fn test_fan_out_past_bit_63() {
        let (ports, seen) = recording_ports(66);
        fan_out_mask(&ports, 1 << 63, Polarity::Inverted);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 66);
        assert_eq!(seen[0], (0, true));
        assert_eq!(seen[63], (63, false));
        // No bit backs ports 64 and 65: clear, so inverted drives true.
        assert_eq!(seen[64], (64, true));
        assert_eq!(seen[65], (65, true));
    }

    #[test]
    fn test_fan_out_skips_unbound_ports() {
        let ports = vec![WireMaster::<bool>::new(), WireMaster::<bool>::new()];
        // Nothing bound: must not trip the unbound-sync assertion.
        fan_out_mask(&ports, 0b11, Polarity::Direct);
    }
}
