//! Interrupt handler and poll routine
//!
//! The interrupt handler does the minimum: it filters foreign and dead
//! interrupts, escalates a system error to the deferred worker, reports
//! link changes, then masks everything and hands off to the poll routine.
//! The poll routine reclaims TX, drains RX, refills, and unmasks when it
//! finishes under budget.

use super::regs::{INTR_MASK, INTR_STATUS, IntrStatus};
use super::rx::RxOptions;
use super::{Rtl8169Soc, TaskFlags, stats};
use crate::LOG_TAG;

/// What the interrupt handler did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// Not ours, or the device is gone
    NotHandled,
    Handled {
        /// The platform was asked to run [`Rtl8169Soc::poll`]
        poll_scheduled: bool,
    },
}

impl Rtl8169Soc {
    /// Top half
    pub fn interrupt(&self) -> IrqReturn {
        let raw = self.regs.read16(INTR_STATUS);
        // all ones: the MAC is unclocked or held in reset
        if raw == 0xffff {
            return IrqReturn::NotHandled;
        }
        let status = IntrStatus::from_bits_retain(raw);
        if !status.intersects(self.irq_mask) {
            return IrqReturn::NotHandled;
        }

        if status.contains(IntrStatus::SYS_ERR) {
            self.regs.write16(INTR_MASK, 0);
            self.regs.write16(INTR_STATUS, raw);
            if self.schedule_task(TaskFlags::RESET_PENDING) {
                log::error!("[{}] system error, status {:#06x}", LOG_TAG, raw);
            }
            return IrqReturn::Handled { poll_scheduled: false };
        }

        if status.contains(IntrStatus::LINK_CHG) {
            self.check_link_status();
        }

        self.regs.write16(INTR_MASK, 0);
        // RX_OVERFLOW stays latched until the backlog is gone
        self.regs.write16(INTR_STATUS, (status - IntrStatus::RX_OVERFLOW).bits());

        let poll_scheduled = self.napi.schedule();
        if poll_scheduled {
            self.platform.schedule_poll();
        }
        IrqReturn::Handled { poll_scheduled }
    }

    /// Bottom half: one poll round
    ///
    /// Returns the work done. When it equals the weight the round stays
    /// scheduled, interrupts stay masked and the platform is asked to poll
    /// again, unless someone is waiting to disable polling.
    pub fn poll(&self) -> u32 {
        let Some(poll) = self.napi.begin_poll() else {
            return 0;
        };
        let Some(rings) = self.rings.as_ref() else {
            return 0;
        };
        let budget = self.napi.weight();
        let owner = poll.owner();

        let tx = rings.tx.reclaim(owner, &*self.regs, budget);
        stats::add(&self.stats.tx_packets, tx.packets as u64);
        stats::add(&self.stats.tx_bytes, tx.bytes);
        if tx.woke {
            self.stack.tx_queue_wake();
        }

        let opts = RxOptions {
            keep_crc: self.config.keep_crc,
            checksum: self.config.rx_checksum,
            vlan: self.config.rx_vlan,
            timestamp_us: self.platform.timestamp_us(),
        };
        let rx = rings
            .rx
            .drain(owner, budget, &opts, &self.stats, &mut |skb| self.stack.receive_indicate(skb));
        if rx.reset_needed && self.schedule_task(TaskFlags::RESET_PENDING) {
            log::warn!("[{}] RX FIFO overflow, resetting", LOG_TAG);
        }

        if rings.rx.refill(owner) && self.schedule_task(TaskFlags::RESET_PENDING) {
            log::warn!("[{}] RX ring starved, resetting", LOG_TAG);
        }

        let work = if tx.exhausted { budget } else { rx.processed };
        // a pending disable must see SCHED drop, so a full round still completes
        if work >= budget && !self.napi.disable_pending() {
            drop(poll);
            self.platform.schedule_poll();
            return work;
        }

        let status = IntrStatus::from_bits_retain(self.regs.read16(INTR_STATUS));
        if status.contains(IntrStatus::RX_OVERFLOW) {
            self.regs.write16(INTR_STATUS, IntrStatus::RX_OVERFLOW.bits());
        }
        if poll.complete() {
            self.regs.write16(INTR_MASK, self.irq_mask.bits());
        }
        work
    }
}
