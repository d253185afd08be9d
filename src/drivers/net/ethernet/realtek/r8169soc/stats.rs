//! Interface statistics
//!
//! Counters are bumped from poll, interrupt and deferred-work context
//! without a lock. A snapshot is a best-effort read of each counter; it is
//! not atomic across counters.

use core::sync::atomic::{AtomicU64, Ordering};

/// Live counters
#[derive(Default)]
pub struct Stats {
    pub rx_packets: AtomicU64,
    pub rx_bytes: AtomicU64,
    pub rx_errors: AtomicU64,
    pub rx_dropped: AtomicU64,
    pub rx_crc_errors: AtomicU64,
    pub rx_length_errors: AtomicU64,
    pub rx_fifo_errors: AtomicU64,
    pub rx_missed: AtomicU64,
    pub multicast: AtomicU64,
    pub tx_packets: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub tx_dropped: AtomicU64,
    pub resets: AtomicU64,
    pub reinits: AtomicU64,
}

/// Point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub rx_crc_errors: u64,
    pub rx_length_errors: u64,
    pub rx_fifo_errors: u64,
    pub rx_missed: u64,
    pub multicast: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_dropped: u64,
    /// Ring rebuilds run by deferred work
    pub resets: u64,
    /// Full MAC/PHY re-initializations
    pub reinits: u64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn add(counter: &AtomicU64, n: u64) {
    if n != 0 {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            rx_packets: get(&self.rx_packets),
            rx_bytes: get(&self.rx_bytes),
            rx_errors: get(&self.rx_errors),
            rx_dropped: get(&self.rx_dropped),
            rx_crc_errors: get(&self.rx_crc_errors),
            rx_length_errors: get(&self.rx_length_errors),
            rx_fifo_errors: get(&self.rx_fifo_errors),
            rx_missed: get(&self.rx_missed),
            multicast: get(&self.multicast),
            tx_packets: get(&self.tx_packets),
            tx_bytes: get(&self.tx_bytes),
            tx_dropped: get(&self.tx_dropped),
            resets: get(&self.resets),
            reinits: get(&self.reinits),
        }
    }
}
