//! Deferred worker
//!
//! Recovery that needs to sleep, or to own both rings, runs here. Requests
//! arrive as [`TaskFlags`] bits set from interrupt, poll and transmit
//! context; each bit is consumed exactly once by `test_and_clear`, and the
//! worker loops until none is left, so a request raised while another is
//! being handled is never lost.

use super::chip::{self, DrvStatus};
use super::stats;
use super::{Rtl8169Soc, TaskFlags, WorkState};
use crate::drivers::dma::DmaError;
use crate::LOG_TAG;

impl Rtl8169Soc {
    /// Run every pending task; called by the platform after `schedule_work`
    pub fn run_deferred(&self) {
        let work = self.work.lock();
        if !self.tasks.contains(TaskFlags::ENABLED) {
            return;
        }

        let mut retry = false;
        loop {
            let result = if self.tasks.test_and_clear(TaskFlags::RESET_PENDING) {
                self.reset_task(&work)
            } else if self.tasks.test_and_clear(TaskFlags::TX_TIMEOUT) {
                self.reinit_task(&work)
            } else {
                break;
            };
            if let Err(e) = result {
                log::warn!("[{}] RX ring refill incomplete: {}", LOG_TAG, e);
                retry = true;
            }
        }
        drop(work);

        if retry {
            self.schedule_task(TaskFlags::RESET_PENDING);
        }
    }

    /// Rebuild both rings behind a MAC reset
    fn reset_task(&self, work: &WorkState) -> Result<(), DmaError> {
        let Some(rings) = self.rings.as_ref() else {
            return Ok(());
        };
        log::warn!("[{}] {}: resetting rings", LOG_TAG, self.chip.name());
        stats::bump(&self.stats.resets);

        let q = self.quiesce(rings, false);
        let dropped = rings.tx.reset(q.napi.owner(), &q.producer);
        stats::add(&self.stats.tx_dropped, dropped as u64);
        let rebuilt = rings.rx.rebuild(q.napi.owner());

        self.hw_start(rings, work);
        self.finish(rings, q);
        rebuilt
    }

    /// Full MAC and PHY re-initialization
    ///
    /// If the chip fails to come back the device stays quiesced with
    /// HW_FAIL set; only close and open recover it.
    fn reinit_task(&self, work: &WorkState) -> Result<(), DmaError> {
        let Some(rings) = self.rings.as_ref() else {
            return Ok(());
        };
        log::warn!("[{}] {}: reinitializing MAC and PHY", LOG_TAG, self.chip.name());
        self.status.insert(DrvStatus::REINIT);

        let q = self.quiesce(rings, false);
        let dropped = rings.tx.reset(q.napi.owner(), &q.producer);
        stats::add(&self.stats.tx_dropped, dropped as u64);

        self.status.remove(DrvStatus::HW_FAIL);
        if chip::bring_up(&*self.chip, &self.ctx()).is_err() {
            self.status.remove(DrvStatus::REINIT);
            self.tasks.remove(TaskFlags::ENABLED);
            q.napi.keep_disabled();
            return Ok(());
        }

        let rebuilt = rings.rx.rebuild(q.napi.owner());
        self.hw_start(rings, work);
        self.status.remove(DrvStatus::REINIT);
        stats::bump(&self.stats.reinits);
        self.finish(rings, q);
        rebuilt
    }
}
