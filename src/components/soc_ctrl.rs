//! System controller.
//!
//! `SocCtrl` is the small always-on block that firmware talks to for
//! platform-level control: reporting the exit status, setting the boot
//! address, muxing and dividing the reference clock, and gating debug
//! availability and shared-bank power.
//!
//! # Register layout
//!
//! All registers are 32 bits wide.
//!
//! | Offset | Name | Access | Behavior on write |
//! |--------|------|--------|-------------------|
//! | `0x00` | `CORESTATUS` | RW | Bit 31 halts with bits 30..0 as exit code; magic values drive power capture |
//! | `0x04` | `FC_BOOT` | RW | Propagated on `bootaddr` |
//! | `0x08` | `JTAGREG` | RW | Propagated on `confreg_soc`; reads return the external value in bits 15..8 |
//! | `0x0C` | `BOOTSEL` | RO | Mirrors the `bootsel` wire |
//! | `0x10` | `SLEEP_CTRL` | RW | Stored |
//! | `0x14` | `SLEEP_CTRL_INFO` | RO | Live view of `SLEEP_CTRL` |
//! | `0x18` | `DBG_CTRL` | RW | Bit `i` drives `dm_hart_available_<i>` |
//! | `0x1C` | `REG_OSC_CTRL` | RW | Bits 0/1 drive `fast_clk_ctrl`/`ref_clk_ctrl` |
//! | `0x20` | `REF_CLK_MUX` | RW | Bit 0 selects the fast divided clock for `ref_clock_muxed` |
//! | `0x24` | `CLK_DIV_REF_FAST_POW2` | RW | Divider exponent (bits 4..0) and enable (bit 8); restarts the divider |
//! | `0x28` | `L2_PWR_ACTIVE` | RW | Bit `i` set drives `l2_power_ctrl_<i>` low (bank powered) |
//!
//! Register state is always committed before any port is synchronized.

use crate::clock::{ClockDivider, ClockMux, DisabledMode};
use crate::component::{Build, Component};
use crate::engine::EngineHandle;
use crate::error::BuildError;
use crate::hooks::{fan_out_mask, Polarity, PowerHook};
use crate::io::{IoReq, IoStatus};
use crate::port::{ClockMaster, ClockSlave, IoSlave, WireMaster, WireSlave};
use crate::regmap::{Field, HasRegMap, RegAccess, RegId, RegMap, Register, UnmappedPolicy};
use crate::trace::Trace;

/// Register offsets.
pub mod offsets {
    pub const CORESTATUS: u64 = 0x00;
    pub const FC_BOOT: u64 = 0x04;
    pub const JTAGREG: u64 = 0x08;
    pub const BOOTSEL: u64 = 0x0C;
    pub const SLEEP_CTRL: u64 = 0x10;
    pub const SLEEP_CTRL_INFO: u64 = 0x14;
    pub const DBG_CTRL: u64 = 0x18;
    pub const REG_OSC_CTRL: u64 = 0x1C;
    pub const REF_CLK_MUX: u64 = 0x20;
    pub const CLK_DIV_REF_FAST_POW2: u64 = 0x24;
    pub const L2_PWR_ACTIVE: u64 = 0x28;
}

/// Status bit that ends the simulation.
pub const CORESTATUS_EOC: u32 = 1 << 31;
/// Status value that opens a power capture window.
pub const POWER_CAPTURE_START: u32 = 0x0BBA_ABBA;
/// Status value that closes a power capture window.
pub const POWER_CAPTURE_STOP: u32 = 0x0BBA_DEAD;

/// Position of the external value in `JTAGREG` reads.
const JTAGREG_EXTERNAL_BIT: u32 = 8;

pub const FAST_OSC_EN: Field = Field::rw("fast_osc_en", 0, 1);
pub const SLOW_OSC_EN: Field = Field::rw("slow_osc_en", 1, 1);
pub const REF_CLK_SEL: Field = Field::rw("sel", 0, 1);
pub const DIV_EXPONENT: Field = Field::rw("divider", 0, 5);
pub const DIV_EN: Field = Field::rw("en", 8, 1);

/// Mux inputs of `ref_clock_muxed`.
const MUX_REF: usize = 0;
const MUX_FAST: usize = 1;

#[derive(Debug, Default)]
struct RegIds {
    corestatus: RegId,
    fc_boot: RegId,
    jtagreg: RegId,
    bootsel: RegId,
    sleep_ctrl: RegId,
    dbg_ctrl: RegId,
    osc_ctrl: RegId,
    ref_clk_mux: RegId,
    clk_div: RegId,
    l2_pwr_active: RegId,
}

/// The system controller.
///
/// # Configuration
///
/// | Key | Type | Default |
/// |-----|------|---------|
/// | `nb_harts` | integer | required |
/// | `cluster_power_event` | integer | required |
/// | `cluster_clock_gate_event` | integer | required |
/// | `nb_l2_shared_banks` | integer | required |
/// | `strict_io` | bool | `false` (unmapped accesses complete with `Ok`) |
///
/// # Ports
///
/// Slaves: `input` (io), `bootsel` (wire<i32>), `confreg_ext` (wire<u32>),
/// `wakeup_rtc` (wire<bool>), `fast_clock` and `ref_clock` (clock).
///
/// Masters: `bootaddr` and `confreg_soc` (wire<u32>), `fast_clk_ctrl`,
/// `ref_clk_ctrl` and `wakeup_out` (wire<bool>), `ref_clock_muxed` (clock),
/// `dm_hart_available_<i>` and `l2_power_ctrl_<i>` (wire<bool>).
pub struct SocCtrl {
    regs: RegMap<SocCtrl>,
    ids: RegIds,
    trace: Trace,
    engine: EngineHandle,
    power: PowerHook,

    bootaddr: WireMaster<u32>,
    confreg_soc: WireMaster<u32>,
    fast_clk_ctrl: WireMaster<bool>,
    ref_clk_ctrl: WireMaster<bool>,
    wakeup_out: WireMaster<bool>,
    ref_clock_muxed: ClockMaster,
    dm_hart_available: Vec<WireMaster<bool>>,
    l2_power_ctrl: Vec<WireMaster<bool>>,

    fast_div: ClockDivider,
    mux: ClockMux,
    jtag_ext: u32,
    cluster_power_event: i64,
    cluster_clock_gate_event: i64,

    requests: u64,
    errors: u64,
    wakeups: u64,
}

impl SocCtrl {
    pub fn new() -> Self {
        Self {
            regs: RegMap::default(),
            ids: RegIds::default(),
            trace: Trace::new("", "trace"),
            engine: EngineHandle::default(),
            power: PowerHook::detached(),
            bootaddr: WireMaster::new(),
            confreg_soc: WireMaster::new(),
            fast_clk_ctrl: WireMaster::new(),
            ref_clk_ctrl: WireMaster::new(),
            wakeup_out: WireMaster::new(),
            ref_clock_muxed: ClockMaster::new(),
            dm_hart_available: Vec::new(),
            l2_power_ctrl: Vec::new(),
            fast_div: ClockDivider::new(DisabledMode::Bypass),
            mux: ClockMux::new(MUX_REF),
            jtag_ext: 0,
            cluster_power_event: 0,
            cluster_clock_gate_event: 0,
            requests: 0,
            errors: 0,
            wakeups: 0,
        }
    }

    /// Read-only view of the register map.
    pub fn registers(&self) -> &RegMap<SocCtrl> {
        &self.regs
    }

    pub fn core_status(&self) -> u32 {
        self.regs.get(self.ids.corestatus) as u32
    }

    pub fn boot_addr(&self) -> u32 {
        self.regs.get(self.ids.fc_boot) as u32
    }

    pub fn nb_harts(&self) -> usize {
        self.dm_hart_available.len()
    }

    pub fn nb_l2_shared_banks(&self) -> usize {
        self.l2_power_ctrl.len()
    }

    /// Source currently driving `ref_clock_muxed` (0: ref clock, 1: fast divided).
    pub fn ref_clock_source(&self) -> usize {
        self.mux.selected()
    }

    /// Fast clock edges counted towards the next divided edge.
    pub fn divider_phase(&self) -> u64 {
        self.fast_div.phase()
    }

    /// Bus accesses refused under the strict policy.
    pub fn io_errors(&self) -> u64 {
        self.errors
    }

    fn on_request(&mut self, req: &mut IoReq) -> IoStatus {
        self.requests += 1;
        self.trace.trace(format_args!(
            "Access (offset: {:#x}, size: {}, is_write: {})",
            req.addr,
            req.size(),
            req.is_write()
        ));
        let status = RegMap::access(self, req);
        if !status.is_ok() {
            self.errors += 1;
        }
        status
    }

    fn on_corestatus(&mut self, access: &RegAccess) {
        if !access.is_write {
            return;
        }
        let status = self.core_status();
        if status & CORESTATUS_EOC != 0 {
            let code = (status & !CORESTATUS_EOC) as i32;
            self.trace
                .info(format_args!("End of computation (status: {})", code));
            self.engine.stop(code);
            return;
        }
        match status {
            POWER_CAPTURE_START => {
                self.trace.debug(format_args!("Starting power capture"));
                self.power.start_capture();
            }
            POWER_CAPTURE_STOP => {
                self.trace.debug(format_args!("Stopping power capture"));
                self.power.stop_capture();
            }
            _ => {}
        }
    }

    fn on_fc_boot(&mut self, access: &RegAccess) {
        if !access.is_write {
            return;
        }
        let addr = self.boot_addr();
        self.trace
            .info(format_args!("Setting boot address (addr: {:#x})", addr));
        if self.bootaddr.is_bound() {
            self.bootaddr.sync(addr);
        }
    }

    fn on_jtagreg(&mut self, access: &RegAccess) {
        if access.is_write {
            let value = self.regs.get(self.ids.jtagreg) as u32;
            if self.confreg_soc.is_bound() {
                self.confreg_soc.sync(value);
            }
        } else {
            let external = u64::from(self.jtag_ext) << JTAGREG_EXTERNAL_BIT;
            self.regs.set(self.ids.jtagreg, external);
        }
    }

    fn on_dbg_ctrl(&mut self, access: &RegAccess) {
        if access.is_write {
            self.sync_dm_available();
        }
    }

    fn on_osc_ctrl(&mut self, access: &RegAccess) {
        if access.is_write {
            self.sync_osc_enables();
        }
    }

    fn on_ref_clk_mux(&mut self, access: &RegAccess) {
        if !access.is_write {
            return;
        }
        let source = self.regs.field(self.ids.ref_clk_mux, &REF_CLK_SEL) as usize;
        if source != self.mux.selected() {
            self.trace
                .debug(format_args!("Switching reference clock source (source: {})", source));
        }
        self.mux.select(source);
    }

    fn on_clk_div(&mut self, access: &RegAccess) {
        if access.is_write {
            self.fast_div.reset_phase();
        }
    }

    fn on_l2_pwr_active(&mut self, access: &RegAccess) {
        if access.is_write {
            let mask = self.regs.get(self.ids.l2_pwr_active);
            fan_out_mask(&self.l2_power_ctrl, mask, Polarity::Inverted);
        }
    }

    fn sync_dm_available(&self) {
        let mask = self.regs.get(self.ids.dbg_ctrl);
        fan_out_mask(&self.dm_hart_available, mask, Polarity::Direct);
    }

    fn sync_osc_enables(&self) {
        let fast = self.regs.field(self.ids.osc_ctrl, &FAST_OSC_EN) != 0;
        let slow = self.regs.field(self.ids.osc_ctrl, &SLOW_OSC_EN) != 0;
        if self.fast_clk_ctrl.is_bound() {
            self.fast_clk_ctrl.sync(fast);
        }
        if self.ref_clk_ctrl.is_bound() {
            self.ref_clk_ctrl.sync(slow);
        }
    }

    fn on_bootsel(&mut self, value: i32) {
        self.trace
            .debug(format_args!("Boot select changed (value: {})", value));
        self.regs.set(self.ids.bootsel, u64::from(value as u32));
    }

    fn on_confreg_ext(&mut self, value: u32) {
        self.jtag_ext = value;
    }

    /// Any RTC sync is a wakeup, whatever its level.
    fn on_wakeup_rtc(&mut self, level: bool) {
        self.wakeups += 1;
        self.trace
            .debug(format_args!("Received RTC wakeup (level: {})", level));
        if self.wakeup_out.is_bound() {
            self.wakeup_out.sync(true);
        }
    }

    fn on_ref_clock(&mut self, level: bool) {
        if self.mux.accepts(MUX_REF) && self.ref_clock_muxed.is_bound() {
            self.ref_clock_muxed.sync(level);
        }
    }

    fn on_fast_clock(&mut self, _level: bool) {
        let enabled = self.regs.field(self.ids.clk_div, &DIV_EN) != 0;
        let exponent = self.regs.field(self.ids.clk_div, &DIV_EXPONENT) as u32;
        let Some(level) = self.fast_div.on_source_edge(enabled, exponent) else {
            return;
        };
        if self.mux.accepts(MUX_FAST) && self.ref_clock_muxed.is_bound() {
            self.trace
                .trace(format_args!("Propagating fast divided edge (level: {})", level));
            self.ref_clock_muxed.sync(level);
        }
    }

    fn build_registers(&mut self, strict: bool) -> Result<(), BuildError> {
        let regs = &mut self.regs;
        regs.set_policy(if strict {
            UnmappedPolicy::Error
        } else {
            UnmappedPolicy::Ignore
        });

        self.ids.corestatus = regs.add(
            Register::new("CORESTATUS", offsets::CORESTATUS, 4).on_access(Self::on_corestatus),
        )?;
        self.ids.fc_boot =
            regs.add(Register::new("FC_BOOT", offsets::FC_BOOT, 4).on_access(Self::on_fc_boot))?;
        self.ids.jtagreg =
            regs.add(Register::new("JTAGREG", offsets::JTAGREG, 4).on_access(Self::on_jtagreg))?;
        self.ids.bootsel = regs.add(Register::new("BOOTSEL", offsets::BOOTSEL, 4).read_only())?;
        self.ids.sleep_ctrl = regs.add(Register::new("SLEEP_CTRL", offsets::SLEEP_CTRL, 4))?;
        regs.add(Register::alias(
            "SLEEP_CTRL_INFO",
            offsets::SLEEP_CTRL_INFO,
            self.ids.sleep_ctrl,
        ))?;
        self.ids.dbg_ctrl =
            regs.add(Register::new("DBG_CTRL", offsets::DBG_CTRL, 4).on_access(Self::on_dbg_ctrl))?;
        self.ids.osc_ctrl = regs.add(
            Register::new("REG_OSC_CTRL", offsets::REG_OSC_CTRL, 4)
                .fields(&[FAST_OSC_EN, SLOW_OSC_EN])
                .reset_value(0x3)
                .on_access(Self::on_osc_ctrl),
        )?;
        self.ids.ref_clk_mux = regs.add(
            Register::new("REF_CLK_MUX", offsets::REF_CLK_MUX, 4)
                .field(REF_CLK_SEL)
                .on_access(Self::on_ref_clk_mux),
        )?;
        self.ids.clk_div = regs.add(
            Register::new("CLK_DIV_REF_FAST_POW2", offsets::CLK_DIV_REF_FAST_POW2, 4)
                .fields(&[DIV_EXPONENT, DIV_EN])
                .on_access(Self::on_clk_div),
        )?;
        self.ids.l2_pwr_active = regs.add(
            Register::new("L2_PWR_ACTIVE", offsets::L2_PWR_ACTIVE, 4)
                .on_access(Self::on_l2_pwr_active),
        )?;
        Ok(())
    }
}

impl Default for SocCtrl {
    fn default() -> Self {
        Self::new()
    }
}

impl HasRegMap for SocCtrl {
    fn regmap(&mut self) -> &mut RegMap<Self> {
        &mut self.regs
    }
}

impl Component for SocCtrl {
    fn build(&mut self, b: &mut Build<'_>) -> Result<(), BuildError> {
        let config = b.config();
        let nb_harts = config.get_usize("nb_harts")?;
        let nb_banks = config.get_usize("nb_l2_shared_banks")?;
        self.cluster_power_event = config.get_int("cluster_power_event")?;
        self.cluster_clock_gate_event = config.get_int("cluster_clock_gate_event")?;
        let strict = config.get_bool_or("strict_io", false)?;

        self.trace = b.trace("trace");
        self.engine = b.engine();
        self.power = b.power();
        self.regs = RegMap::new(b.trace("regmap"));
        self.build_registers(strict)?;

        b.new_slave_port("input", IoSlave::new(Self::on_request))?;
        b.new_slave_port("bootsel", WireSlave::new(Self::on_bootsel))?;
        b.new_slave_port("confreg_ext", WireSlave::new(Self::on_confreg_ext))?;
        b.new_slave_port("wakeup_rtc", WireSlave::new(Self::on_wakeup_rtc))?;
        b.new_slave_port("fast_clock", ClockSlave::new(Self::on_fast_clock))?;
        b.new_slave_port("ref_clock", ClockSlave::new(Self::on_ref_clock))?;

        b.new_master_port("bootaddr", &self.bootaddr)?;
        b.new_master_port("confreg_soc", &self.confreg_soc)?;
        b.new_master_port("fast_clk_ctrl", &self.fast_clk_ctrl)?;
        b.new_master_port("ref_clk_ctrl", &self.ref_clk_ctrl)?;
        b.new_master_port("wakeup_out", &self.wakeup_out)?;
        b.new_master_port("ref_clock_muxed", &self.ref_clock_muxed)?;

        self.dm_hart_available = (0..nb_harts).map(|_| WireMaster::new()).collect();
        for (i, port) in self.dm_hart_available.iter().enumerate() {
            b.new_master_port(&format!("dm_hart_available_{}", i), port)?;
        }
        self.l2_power_ctrl = (0..nb_banks).map(|_| WireMaster::new()).collect();
        for (i, port) in self.l2_power_ctrl.iter().enumerate() {
            b.new_master_port(&format!("l2_power_ctrl_{}", i), port)?;
        }

        self.trace.debug(format_args!(
            "Built (harts: {}, l2 banks: {}, strict_io: {})",
            nb_harts, nb_banks, strict
        ));
        Ok(())
    }

    fn reset(&mut self, active: bool) {
        self.regs.reset(active);
        if active {
            self.fast_div.reset();
            self.mux.select(MUX_REF);
            self.sync_dm_available();
            self.sync_osc_enables();
        }
    }

    fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "core_status": self.core_status(),
            "boot_addr": self.boot_addr(),
            "requests": self.requests,
            "errors": self.errors,
            "wakeups": self.wakeups,
            "ref_clock_source": self.mux.selected(),
            "cluster_power_event": self.cluster_power_event,
            "cluster_clock_gate_event": self.cluster_clock_gate_event,
        })
    }
}
