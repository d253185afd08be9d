//! Network Device Abstraction
//!
//! The contract between an Ethernet driver and the network stack above it.
//!
//! Downward, the stack offers one packet at a time and the driver either
//! takes it or hands it back ([`NetdevTx`]). Upward, the driver calls into a
//! [`NetStack`] from its poll routine (received frames, TX queue restarts)
//! and from its link handling.
//!
//! ```text
//!   stack ──start_xmit(skb)──────────────▶ driver ──▶ TX ring
//!   stack ◀──receive_indicate(skb)──────── driver ◀── RX ring (poll)
//!   stack ◀──tx_queue_wake()────────────── driver ◀── TX reclaim (poll)
//!   stack ◀──link_changed(up)───────────── driver ◀── LINK_CHG interrupt
//! ```

use core::fmt;

use crate::net::skbuff::SkBuff;

/// Errors that can occur during network device operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// Hardware is not present or not responding
    HardwareNotPresent,

    /// Device is not initialized (interface down)
    NotInitialized,

    /// Transmit ring is full (try again later)
    TxBufferFull,

    /// Frame is too large for device
    FrameTooLarge,

    /// Hardware error during operation
    HardwareError,

    /// Timeout waiting for operation to complete
    Timeout,

    /// Invalid configuration or parameter
    InvalidConfiguration,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::HardwareNotPresent => write!(f, "Hardware not present"),
            NetworkError::NotInitialized => write!(f, "Device not initialized"),
            NetworkError::TxBufferFull => write!(f, "Transmit buffer full"),
            NetworkError::FrameTooLarge => write!(f, "Frame too large"),
            NetworkError::HardwareError => write!(f, "Hardware error"),
            NetworkError::Timeout => write!(f, "Operation timeout"),
            NetworkError::InvalidConfiguration => write!(f, "Invalid configuration"),
        }
    }
}

/// Result of offering a packet to the driver
#[derive(Debug)]
#[must_use = "a busy packet is handed back and must be requeued or dropped"]
pub enum NetdevTx {
    /// The driver took the packet. It may still be dropped and counted
    /// (unsupported offload, mapping failure) but is no longer the caller's.
    Ok,

    /// The ring is full or the queue is stopped. The packet is returned
    /// untouched; retry after [`NetStack::tx_queue_wake`].
    Busy(SkBuff),
}

impl NetdevTx {
    pub fn is_ok(&self) -> bool {
        matches!(self, NetdevTx::Ok)
    }
}

/// Upcalls from a driver into the network stack
///
/// Called from poll and interrupt context: implementations must not block.
pub trait NetStack: Send + Sync {
    /// A frame was received; ownership passes to the stack
    fn receive_indicate(&self, skb: SkBuff);

    /// Carrier changed
    fn link_changed(&self, up: bool);

    /// The transmit queue was stopped and has room again
    fn tx_queue_wake(&self);
}
