//! System suspend and resume
//!
//! With wake sources configured the MAC stays powered at suspend, with its
//! receiver filtering for wake frames and the wake engine routed to the SoC.
//! Without them the MAC is reset and, in power-saving mode, the LED is
//! switched off. Resume always re-runs the chip bring-up, since the SoC
//! may have cut clocks and resets behind the driver's back.

use super::chip::{self, ChipFeatures};
use super::error::ProbeError;
use super::regs::{RX_CONFIG, RX_CONFIG_ACCEPT_MASK, RxAccept};
use super::wol::{self, WolFlags};
use super::{Quiesced, Rtl8169Soc, TaskFlags, stats};
use crate::LOG_TAG;

/// Device power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Active,
    /// Suspended with the wake engine armed
    WakeArmed,
    /// Suspended, MAC reset
    Off,
}

impl Rtl8169Soc {
    pub fn power_state(&self) -> PowerState {
        self.work.lock().power
    }

    /// Quiesce the device and arm the configured wake sources
    pub fn suspend(&self) {
        let mut work = self.work.lock();
        if work.power != PowerState::Active || !self.is_running() {
            return;
        }
        let Some(rings) = self.rings.as_ref() else {
            return;
        };
        self.tasks.remove(TaskFlags::ENABLED);

        let armed = !work.wol.is_empty() && self.features.contains(ChipFeatures::WOL);
        // a magic packet wake needs the MAC as it is
        let q = self.quiesce(rings, work.wol.contains(WolFlags::MAGIC));

        if armed {
            wol::enable(&*self.regs, work.wol, &work.rules);
            let accept = RxAccept::MY_PHYS | RxAccept::BROADCAST | RxAccept::MULTICAST;
            self.regs.modify32(RX_CONFIG, RX_CONFIG_ACCEPT_MASK, accept.bits());
            self.chip.wakeup_arm(&self.ctx(), true);
            work.power = PowerState::WakeArmed;
        } else {
            if work.pwr_saving {
                self.chip.led_set(&self.ctx(), false);
            }
            work.power = PowerState::Off;
        }

        let Quiesced { napi, producer } = q;
        drop(producer);
        napi.keep_disabled();
        log::info!("[{}] {}: suspended ({:?}, wol {:?})", LOG_TAG, self.chip.name(), work.power, work.wol);
    }

    /// Disarm wake sources, bring the chip up again and restart traffic
    pub fn resume(&self) -> Result<(), ProbeError> {
        let mut work = self.work.lock();
        if work.power == PowerState::Active {
            return Ok(());
        }
        let Some(rings) = self.rings.as_ref() else {
            work.power = PowerState::Active;
            return Ok(());
        };

        if work.power == PowerState::WakeArmed {
            if !wol::disable(&*self.regs, &*self.platform, work.wol, work.rules.mode()) {
                log::warn!("[{}] wake engine did not release the RX buffer", LOG_TAG);
            }
            self.chip.wakeup_arm(&self.ctx(), false);
        }

        self.status.remove(super::chip::DrvStatus::HW_FAIL);
        chip::bring_up(&*self.chip, &self.ctx())?;

        let q = Quiesced {
            napi: self.napi.disable(core::hint::spin_loop),
            producer: rings.tx.lock_producer(),
        };
        let dropped = rings.tx.reset(q.napi.owner(), &q.producer);
        stats::add(&self.stats.tx_dropped, dropped as u64);
        let rebuilt = rings.rx.rebuild(q.napi.owner());

        self.hw_start(rings, &work);
        self.chip.led_set(&self.ctx(), true);
        work.power = PowerState::Active;
        self.tasks.insert(TaskFlags::ENABLED);
        self.finish(rings, q);
        drop(work);

        if let Err(e) = rebuilt {
            log::warn!("[{}] RX ring refill incomplete after resume: {}", LOG_TAG, e);
            self.schedule_task(TaskFlags::RESET_PENDING);
        }
        log::info!("[{}] {}: resumed", LOG_TAG, self.chip.name());
        Ok(())
    }
}
