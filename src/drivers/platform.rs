//! Services the host environment provides to drivers
//!
//! A driver never owns a timer or a thread. It asks the platform to wait
//! (bounded hardware polls during bring-up, reset and loopback) and to run
//! its deferred-work routine from a context that is allowed to sleep.

/// Host services for one device
pub trait Platform: Send + Sync {
    /// Busy-wait or sleep for at least `us` microseconds
    fn delay_us(&self, us: u32);

    /// Monotonic time in microseconds, used to timestamp received frames
    fn timestamp_us(&self) -> u64 {
        0
    }

    /// Arrange for the device's poll routine to run soon
    ///
    /// Called from interrupt context once per scheduled poll round.
    fn schedule_poll(&self);

    /// Arrange for the device's deferred-work routine to run soon
    ///
    /// Repeated calls before the routine runs may be coalesced into one run.
    fn schedule_work(&self);

    /// Wait for at least `ms` milliseconds
    fn delay_ms(&self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }
}
