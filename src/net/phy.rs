//! smoltcp device adapter
//!
//! [`BacklogStack`] is a [`NetStack`] that parks received frames in a
//! lock-free queue. [`Interface`] drains that queue and feeds transmit
//! tokens into [`Rtl8169Soc::start_xmit`], which is all smoltcp needs to
//! run an `Interface` on the MAC.

use alloc::vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use smoltcp::phy::{self, Device, DeviceCapabilities, Medium};
use smoltcp::time::Instant;

use crate::drivers::net::ethernet::realtek::r8169soc::Rtl8169Soc;
use crate::drivers::net::netdev::{NetStack, NetdevTx, NetworkError};
use crate::net::ethernet::EthernetFrame;
use crate::net::queue::SkBuffQueue;
use crate::net::skbuff::SkBuff;
use crate::LOG_TAG;

/// Receive backlog plus link and queue state
pub struct BacklogStack<const N: usize> {
    rx: SkBuffQueue<N>,
    link: AtomicBool,
    wakes: AtomicU32,
    dropped: AtomicU64,
}

impl<const N: usize> BacklogStack<N> {
    pub const fn new() -> Self {
        Self {
            rx: SkBuffQueue::new(),
            link: AtomicBool::new(false),
            wakes: AtomicU32::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn dequeue(&self) -> Option<SkBuff> {
        self.rx.dequeue()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn link_up(&self) -> bool {
        self.link.load(Ordering::Acquire)
    }

    /// Frames lost because the backlog was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue restarts seen so far
    pub fn wakes(&self) -> u32 {
        self.wakes.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for BacklogStack<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NetStack for BacklogStack<N> {
    fn receive_indicate(&self, skb: SkBuff) {
        if self.rx.enqueue(skb).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn link_changed(&self, up: bool) {
        self.link.store(up, Ordering::Release);
    }

    fn tx_queue_wake(&self) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
    }
}

/// smoltcp view of one open device
pub struct Interface<'a, const N: usize> {
    dev: &'a Rtl8169Soc,
    backlog: &'a BacklogStack<N>,
}

impl<'a, const N: usize> Interface<'a, N> {
    /// `backlog` must be the stack the device was probed with
    pub fn new(dev: &'a Rtl8169Soc, backlog: &'a BacklogStack<N>) -> Self {
        Self { dev, backlog }
    }

    /// Send one complete frame outside of smoltcp
    pub fn send(&self, frame: &[u8]) -> Result<(), NetworkError> {
        if !self.dev.is_running() {
            return Err(NetworkError::NotInitialized);
        }
        if frame.len() > EthernetFrame::MAX_FRAME_SIZE {
            return Err(NetworkError::FrameTooLarge);
        }
        let skb = SkBuff::copy_from(frame).map_err(|_| NetworkError::HardwareError)?;
        match self.dev.start_xmit(skb) {
            NetdevTx::Ok => Ok(()),
            NetdevTx::Busy(_) => Err(NetworkError::TxBufferFull),
        }
    }
}

pub struct RxToken {
    skb: SkBuff,
}

impl phy::RxToken for RxToken {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        f(self.skb.data_mut())
    }
}

pub struct TxToken<'a> {
    dev: &'a Rtl8169Soc,
}

impl phy::TxToken for TxToken<'_> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buf = vec![0u8; len].into_boxed_slice();
        let result = f(&mut buf);
        if let NetdevTx::Busy(_) = self.dev.start_xmit(SkBuff::from_buffer(buf, len)) {
            log::debug!("[{}] smoltcp frame dropped, queue busy", LOG_TAG);
        }
        result
    }
}

impl<const N: usize> Device for Interface<'_, N> {
    type RxToken<'b>
        = RxToken
    where
        Self: 'b;
    type TxToken<'b>
        = TxToken<'b>
    where
        Self: 'b;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        if !self.dev.is_running() {
            return None;
        }
        let skb = self.backlog.dequeue()?;
        Some((RxToken { skb }, TxToken { dev: self.dev }))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        if !self.dev.is_running() || self.dev.tx_queue_stopped() {
            return None;
        }
        Some(TxToken { dev: self.dev })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.medium = Medium::Ethernet;
        caps.max_transmission_unit = EthernetFrame::MAX_FRAME_SIZE;
        caps.max_burst_size = Some(self.dev.napi_weight() as usize);
        caps
    }
}
