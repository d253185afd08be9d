//! Diagnostic dumps
//!
//! [`Rtl8169Soc::dump`] renders the rings, the MAC register window and the
//! driver state as text. Open devices are listed in a process-wide
//! registry; its root exists while at least one device is open.

use alloc::vec::Vec;
use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;

use super::desc::DescRing;
use super::regs::R8169_REGS_SIZE;
use super::storm::PacketClass;
use super::Rtl8169Soc;
use crate::LOG_TAG;

/// Name of the registry root
pub const DIAG_ROOT: &str = "r8169soc";

/// Open devices, by chip name
#[derive(Debug, Default)]
pub struct DiagRegistry {
    root: Option<&'static str>,
    devices: Vec<&'static str>,
}

impl DiagRegistry {
    pub const fn new() -> Self {
        Self {
            root: None,
            devices: Vec::new(),
        }
    }

    /// Add `name`; returns true if this created the root
    pub fn attach(&mut self, name: &'static str) -> bool {
        let created = self.root.is_none();
        if created {
            self.root = Some(DIAG_ROOT);
        }
        self.devices.push(name);
        created
    }

    /// Remove one entry for `name`; returns true if the root was torn down
    pub fn detach(&mut self, name: &'static str) -> bool {
        if let Some(pos) = self.devices.iter().position(|&d| d == name) {
            self.devices.swap_remove(pos);
        }
        if self.devices.is_empty() && self.root.is_some() {
            self.root = None;
            return true;
        }
        false
    }

    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    pub fn devices(&self) -> &[&'static str] {
        &self.devices
    }
}

lazy_static! {
    static ref REGISTRY: Mutex<DiagRegistry> = Mutex::new(DiagRegistry::new());
}

/// Registry entry held by an open device
#[derive(Debug)]
pub(crate) struct DiagHandle {
    name: &'static str,
}

impl DiagHandle {
    pub(crate) fn acquire(name: &'static str) -> Self {
        if REGISTRY.lock().attach(name) {
            log::debug!("[{}] diagnostics root created", LOG_TAG);
        }
        Self { name }
    }
}

impl Drop for DiagHandle {
    fn drop(&mut self) {
        if REGISTRY.lock().detach(self.name) {
            log::debug!("[{}] diagnostics root removed", LOG_TAG);
        }
    }
}

/// Names of the devices currently open
pub fn open_devices() -> Vec<&'static str> {
    REGISTRY.lock().devices().to_vec()
}

fn dump_ring(out: &mut dyn fmt::Write, name: &str, ring: &DescRing, cursors: (u32, u32)) -> fmt::Result {
    writeln!(
        out,
        "{} ring: size {} base {:#x} head {} tail {}",
        name,
        ring.size(),
        ring.phys(),
        cursors.0,
        cursors.1
    )?;
    for idx in 0..ring.size() {
        writeln!(
            out,
            "  [{:03}] {:08x} {:08x} {:016x}",
            idx,
            ring.opts1(idx),
            ring.opts2(idx),
            ring.addr(idx)
        )?;
    }
    Ok(())
}

impl Rtl8169Soc {
    /// Write rings, registers, driver variables and the chip's own dump
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let work = self.work.lock();
        writeln!(out, "{} {}", self.chip.name(), work.mac)?;

        match self.rings.as_ref() {
            Some(rings) => {
                dump_ring(out, "tx", rings.tx.desc(), rings.tx.cursors())?;
                dump_ring(out, "rx", rings.rx.desc(), rings.rx.cursors())?;
            }
            None => writeln!(out, "rings not allocated")?,
        }

        writeln!(out, "mac registers:")?;
        for row in (0..R8169_REGS_SIZE).step_by(16) {
            write!(out, "{:#04x}:", row)?;
            for word in (row..row + 16).step_by(4) {
                for b in self.regs.read32(word).to_le_bytes() {
                    write!(out, " {:02x}", b)?;
                }
            }
            writeln!(out)?;
        }

        writeln!(out, "features: {:?}", self.features)?;
        writeln!(out, "status: {:?}", self.status.load())?;
        writeln!(out, "tasks: {:?}", self.tasks.load())?;
        writeln!(out, "wol: {:?}", work.wol)?;
        writeln!(out, "wake rules enabled: {}", work.rules.enabled_count())?;
        for class in PacketClass::ALL {
            let storm = &work.storm[class as usize];
            writeln!(out, "storm {}: {:?} {}", class, storm.mode, storm.limit)?;
        }
        writeln!(out, "eee: {} pwr_saving: {} power: {:?}", work.eee, work.pwr_saving, work.power)?;
        writeln!(out, "link: {}", if self.link_up() { "up" } else { "down" })?;

        self.chip.dump_regs(&self.ctx(), out)?;
        self.chip.dump_var(out)
    }
}
