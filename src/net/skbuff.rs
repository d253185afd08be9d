//! Socket Buffer (sk_buff) - Linux-inspired packet buffer
//!
//! A packet travels between the network stack and the driver as an owned
//! [`SkBuff`]. The buffer decouples packet data from DMA descriptors:
//!
//! - On receive, the driver either copies a completed frame into a fresh
//!   `SkBuff` (copy mode) or adopts the DMA buffer itself (zero-copy mode),
//!   and annotates it with what the MAC reported (checksum status, VLAN tag,
//!   timestamp).
//! - On transmit, the stack hands the driver an `SkBuff` carrying a linear
//!   head, optional paged fragments and the offloads it wants the MAC to
//!   perform. The driver keeps the buffer until the device has finished
//!   reading every fragment, then drops it.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ SkBuff                                        │
//! │  data: [ frame bytes ][unused]                │
//! │                        ^len                   │
//! │  frags: [frag 0][frag 1] ... (TX only)        │
//! │  rx:    checksum / vlan / timestamp           │
//! │  tx:    checksum / mss / vlan requests        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every allocation is fallible. A driver running in poll context must be
//! able to drop a frame when the heap is exhausted instead of aborting.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Largest packet the stack may hand down (64 KiB GSO super-packet)
pub const MAX_PACKET_SIZE: usize = 65536;

/// Most paged fragments one packet may carry
pub const MAX_SKB_FRAGS: usize = 17;

/// Socket buffer - Linux sk_buff equivalent
pub struct SkBuff {
    /// Packet data (owned, heap-allocated)
    data: Box<[u8]>,

    /// Live bytes at the front of `data`
    len: usize,

    /// Paged fragments following the linear data
    frags: Vec<Box<[u8]>>,

    /// What the MAC reported about a received frame
    rx: RxMetadata,

    /// What the stack wants the MAC to do with an outgoing frame
    tx: TxOffload,
}

/// Checksum state of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxChecksum {
    /// Nothing known; the stack must verify
    #[default]
    None,
    /// The MAC verified the TCP or UDP checksum
    Unnecessary,
}

/// Receive-side annotations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxMetadata {
    pub checksum: RxChecksum,

    /// 802.1Q tag control information stripped by the MAC
    pub vlan_tci: Option<u16>,

    /// Receive timestamp (microseconds since boot)
    pub timestamp_us: u64,
}

/// Checksum the MAC should insert on transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxChecksum {
    #[default]
    None,
    /// IPv4 header + TCP checksum
    Tcp,
    /// IPv4 header + UDP checksum
    Udp,
}

/// Transmit offload requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOffload {
    pub checksum: TxChecksum,

    /// Segment size for TCP segmentation offload
    pub mss: Option<u16>,

    /// 802.1Q tag control information to insert
    pub vlan_tci: Option<u16>,
}

/// Errors that can occur during sk_buff operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkBuffError {
    /// Heap allocation failed (out of memory)
    AllocationFailed,

    /// Packet size exceeds maximum
    PacketTooLarge,

    /// Packet already carries `MAX_SKB_FRAGS` fragments
    TooManyFragments,
}

impl fmt::Display for SkBuffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed => write!(f, "heap allocation failed"),
            Self::PacketTooLarge => write!(f, "packet exceeds maximum size"),
            Self::TooManyFragments => write!(f, "too many fragments"),
        }
    }
}

/// Allocate a zeroed buffer of `len` bytes without aborting on OOM
pub fn alloc_buffer(len: usize) -> Result<Box<[u8]>, SkBuffError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| SkBuffError::AllocationFailed)?;
    buf.resize(len, 0);
    Ok(buf.into_boxed_slice())
}

impl SkBuff {
    /// Allocate an sk_buff holding a copy of `frame`
    ///
    /// This is the copy-mode receive path: the DMA buffer stays posted and
    /// the frame bytes move to a heap buffer the stack owns.
    pub fn copy_from(frame: &[u8]) -> Result<Self, SkBuffError> {
        if frame.len() > MAX_PACKET_SIZE {
            return Err(SkBuffError::PacketTooLarge);
        }

        let mut data = Vec::new();
        data.try_reserve_exact(frame.len())
            .map_err(|_| SkBuffError::AllocationFailed)?;
        data.extend_from_slice(frame);
        Ok(Self::from_buffer(data.into_boxed_slice(), frame.len()))
    }

    /// Adopt `buf` as packet data, of which the first `len` bytes are live
    ///
    /// Zero-copy receive uses this to hand a DMA buffer to the stack.
    pub fn from_buffer(buf: Box<[u8]>, len: usize) -> Self {
        let len = len.min(buf.len());
        Self {
            data: buf,
            len,
            frags: Vec::new(),
            rx: RxMetadata::default(),
            tx: TxOffload::default(),
        }
    }

    /// Append a paged fragment
    pub fn push_frag(&mut self, frag: &[u8]) -> Result<(), SkBuffError> {
        if self.frags.len() >= MAX_SKB_FRAGS {
            return Err(SkBuffError::TooManyFragments);
        }
        if self.len() + frag.len() > MAX_PACKET_SIZE {
            return Err(SkBuffError::PacketTooLarge);
        }
        self.frags
            .try_reserve(1)
            .map_err(|_| SkBuffError::AllocationFailed)?;
        let mut page = Vec::new();
        page.try_reserve_exact(frag.len())
            .map_err(|_| SkBuffError::AllocationFailed)?;
        page.extend_from_slice(frag);
        self.frags.push(page.into_boxed_slice());
        Ok(())
    }

    /// Linear data
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    /// Paged fragments, in transmit order
    pub fn frags(&self) -> &[Box<[u8]>] {
        &self.frags
    }

    pub fn rx(&self) -> &RxMetadata {
        &self.rx
    }

    pub fn rx_mut(&mut self) -> &mut RxMetadata {
        &mut self.rx
    }

    pub fn tx_offload(&self) -> &TxOffload {
        &self.tx
    }

    pub fn set_tx_offload(&mut self, offload: TxOffload) {
        self.tx = offload;
    }

    /// Bytes in the linear part
    pub fn linear_len(&self) -> usize {
        self.len
    }

    /// Total packet length, linear part plus fragments
    pub fn len(&self) -> usize {
        self.linear_len() + self.frags.iter().map(|f| f.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the whole packet (linear part and fragments) into one vector
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(self.data());
        for frag in &self.frags {
            out.extend_from_slice(frag);
        }
        out
    }
}

impl fmt::Debug for SkBuff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkBuff")
            .field("len", &self.len())
            .field("capacity", &self.data.len())
            .field("frags", &self.frags.len())
            .field("rx", &self.rx)
            .field("tx", &self.tx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn copy_from_keeps_bytes() {
        let skb = SkBuff::copy_from(&[1, 2, 3, 4]).unwrap();
        assert_eq!(skb.data(), &[1, 2, 3, 4]);
        assert_eq!(skb.len(), 4);
        assert_eq!(skb.rx().checksum, RxChecksum::None);
    }

    #[test]
    fn too_large_is_rejected() {
        let data = vec![0u8; MAX_PACKET_SIZE + 1];
        assert!(matches!(SkBuff::copy_from(&data), Err(SkBuffError::PacketTooLarge)));
    }

    #[test]
    fn adopted_buffer_exposes_only_live_bytes() {
        let mut buf = alloc_buffer(2048).unwrap();
        buf[..3].copy_from_slice(&[9, 8, 7]);
        let skb = SkBuff::from_buffer(buf, 3);
        assert_eq!(skb.data(), &[9, 8, 7]);
        assert_eq!(skb.len(), 3);

        let short = SkBuff::from_buffer(alloc::vec![1u8; 2].into_boxed_slice(), 8);
        assert_eq!(short.data(), &[1, 1]);
    }

    #[test]
    fn fragments_count_towards_length() {
        let mut skb = SkBuff::copy_from(&[0u8; 54]).unwrap();
        skb.push_frag(&[1u8; 100]).unwrap();
        skb.push_frag(&[2u8; 10]).unwrap();

        assert_eq!(skb.linear_len(), 54);
        assert_eq!(skb.len(), 164);
        let flat = skb.to_vec();
        assert_eq!(flat[54], 1);
        assert_eq!(flat[163], 2);
    }

    #[test]
    fn fragment_limit() {
        let mut skb = SkBuff::copy_from(&[0u8; 14]).unwrap();
        for _ in 0..MAX_SKB_FRAGS {
            skb.push_frag(&[0u8; 4]).unwrap();
        }
        assert_eq!(skb.push_frag(&[0u8; 4]).unwrap_err(), SkBuffError::TooManyFragments);
    }
}
