//! Ethernet frame handling
//!
//! MAC addresses and the Ethernet II header. The driver needs just enough of
//! it to program the station address, classify received frames as
//! multicast, and build self-test frames.

use core::fmt;

/// 48-bit MAC (Media Access Control) address
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Broadcast MAC address (FF:FF:FF:FF:FF:FF)
    pub const fn broadcast() -> Self {
        Self([0xFF; 6])
    }

    /// Zero MAC address (00:00:00:00:00:00)
    pub const fn zero() -> Self {
        Self([0x00; 6])
    }

    /// Group bit (bit 0 of the first octet) set; broadcast included
    pub fn is_multicast(&self) -> bool {
        (self.0[0] & 0x01) != 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Split into the `MAC0` (bytes 0..4) and `MAC4` (bytes 4..6) register
    /// values, both little-endian
    pub fn to_registers(&self) -> (u32, u16) {
        let b = &self.0;
        (
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
        )
    }

    /// Destination address of a raw frame
    pub fn destination_of(frame: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = frame.get(0..6)?.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Ethernet II frame
///
/// - Destination MAC (6 bytes)
/// - Source MAC (6 bytes)
/// - EtherType (2 bytes, big-endian)
/// - Payload (46-1500 bytes)
/// - CRC (4 bytes, appended and checked by the MAC)
pub struct EthernetFrame<'a> {
    pub dest_mac: MacAddress,
    pub src_mac: MacAddress,
    pub ethertype: u16,
    pub payload: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    /// Minimum frame size (excluding CRC): 14 byte header + 46 byte min payload
    pub const MIN_FRAME_SIZE: usize = 60;

    /// Maximum frame size (excluding CRC): 14 byte header + 1500 byte max payload
    pub const MAX_FRAME_SIZE: usize = 1514;

    /// Ethernet header size: dest MAC (6) + src MAC (6) + ethertype (2)
    pub const HEADER_SIZE: usize = 14;

    /// Trailing frame check sequence
    pub const FCS_SIZE: usize = 4;

    pub fn new(dest_mac: MacAddress, src_mac: MacAddress, ethertype: u16, payload: &'a [u8]) -> Self {
        Self {
            dest_mac,
            src_mac,
            ethertype,
            payload,
        }
    }

    /// Write this frame to a buffer
    ///
    /// Returns the number of bytes written, or None if the buffer is too small.
    pub fn write_to(&self, buffer: &mut [u8]) -> Option<usize> {
        let total_size = self.size();
        if buffer.len() < total_size {
            return None;
        }

        buffer[0..6].copy_from_slice(&self.dest_mac.0);
        buffer[6..12].copy_from_slice(&self.src_mac.0);
        buffer[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
        buffer[Self::HEADER_SIZE..total_size].copy_from_slice(self.payload);

        Some(total_size)
    }

    pub fn size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len()
    }
}
