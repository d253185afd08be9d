//! Device configuration
//!
//! Everything the platform decides once per device, before probe. Values
//! that depend on the chip (copy vs zero-copy RX, wake engine flavour) are
//! not configured here; they come from [`ChipFeatures`].

use alloc::vec::Vec;

use super::chip::ChipFeatures;
use super::error::ConfigError;
use super::storm::StormControl;
use super::tx::MAX_TX_DESCS_PER_PACKET;
use super::wol::{WakeRule, WolFlags};
use crate::net::ethernet::MacAddress;
use crate::sync::napi::NAPI_WEIGHT;

/// TX descriptors per ring
pub const NUM_TX_DESC: u32 = 1024;
/// RX descriptors per ring in copy mode
pub const NUM_RX_DESC: u32 = 1024;
/// RX descriptors per ring in zero-copy mode
pub const NUM_RX_DESC_NO_COPY: u32 = 4096;
/// RX buffer size: 1522-byte VLAN frame + 1
pub const RX_BUF_SIZE: u32 = 0x05f3;
/// Largest ring the close-index counters can address
const MAX_RING_SIZE: u32 = 0x4000;
/// Largest length a descriptor's length field can hold
const MAX_DESC_LEN: u32 = 0x3fff;

/// Per-device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Station address programmed at every hardware start
    pub mac_address: MacAddress,
    /// TX ring size (power of two)
    pub tx_ring_size: u32,
    /// RX ring size (power of two); `None` picks the mode default
    pub rx_ring_size: Option<u32>,
    /// Bytes per posted RX buffer
    pub rx_buf_size: u32,
    /// Packets per poll round
    pub napi_weight: u32,
    /// Deliver frames with the trailing FCS attached
    pub keep_crc: bool,
    /// Use the hardware RX checksum status
    pub rx_checksum: bool,
    /// Strip VLAN tags into frame metadata
    pub rx_vlan: bool,
    /// Wake sources armed at suspend
    pub wol: WolFlags,
    /// Wake rules supplied by the platform at boot
    pub wake_rules: Vec<(usize, WakeRule)>,
    /// Turn the LED off while suspended
    pub pwr_saving: bool,
    /// Energy Efficient Ethernet
    pub eee: bool,
    /// Storm control per packet class: broadcast, multicast, unknown unicast
    pub storm: [StormControl; 3],
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mac_address: MacAddress::zero(),
            tx_ring_size: NUM_TX_DESC,
            rx_ring_size: None,
            rx_buf_size: RX_BUF_SIZE,
            napi_weight: NAPI_WEIGHT,
            keep_crc: false,
            rx_checksum: true,
            rx_vlan: true,
            wol: WolFlags::empty(),
            wake_rules: Vec::new(),
            pwr_saving: false,
            eee: false,
            storm: [StormControl::disabled(); 3],
        }
    }
}

impl DeviceConfig {
    /// RX ring size for a chip with `features`
    pub fn rx_ring_size(&self, features: ChipFeatures) -> u32 {
        self.rx_ring_size.unwrap_or(if features.contains(ChipFeatures::RX_NO_COPY) {
            NUM_RX_DESC_NO_COPY
        } else {
            NUM_RX_DESC
        })
    }

    /// Check the configuration against what `features` can support
    pub fn validate(&self, features: ChipFeatures) -> Result<(), ConfigError> {
        ring_size_ok(self.tx_ring_size)?;
        // room for two worst-case packets, so the queue can run while one drains
        if self.tx_ring_size < 2 * MAX_TX_DESCS_PER_PACKET {
            return Err(ConfigError::InvalidRingSize);
        }
        ring_size_ok(self.rx_ring_size(features))?;

        if self.rx_buf_size < 64 || self.rx_buf_size > MAX_DESC_LEN {
            return Err(ConfigError::InvalidBufferSize);
        }
        if self.napi_weight == 0 {
            return Err(ConfigError::InvalidRingSize);
        }
        if !self.wol.is_empty() && !features.contains(ChipFeatures::WOL) {
            return Err(ConfigError::Unsupported);
        }
        if self.eee && !features.contains(ChipFeatures::EEE) {
            return Err(ConfigError::Unsupported);
        }
        if self.storm.iter().any(|s| !s.is_disabled()) && !features.contains(ChipFeatures::STORM_CTRL) {
            return Err(ConfigError::Unsupported);
        }
        for storm in &self.storm {
            storm.validate()?;
        }
        Ok(())
    }
}

fn ring_size_ok(size: u32) -> Result<(), ConfigError> {
    if size < 16 || !size.is_power_of_two() || size > MAX_RING_SIZE {
        return Err(ConfigError::InvalidRingSize);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_rx_mode() {
        let cfg = DeviceConfig::default();
        assert_eq!(cfg.rx_ring_size(ChipFeatures::empty()), NUM_RX_DESC);
        assert_eq!(cfg.rx_ring_size(ChipFeatures::RX_NO_COPY), NUM_RX_DESC_NO_COPY);
        assert!(cfg.validate(ChipFeatures::empty()).is_ok());
    }

    #[test]
    fn rejects_non_power_of_two_rings() {
        let cfg = DeviceConfig {
            tx_ring_size: 1000,
            ..DeviceConfig::default()
        };
        assert_eq!(cfg.validate(ChipFeatures::empty()), Err(ConfigError::InvalidRingSize));
    }

    #[test]
    fn tx_ring_must_hold_two_full_packets() {
        for tx_ring_size in [16, 32] {
            let cfg = DeviceConfig {
                tx_ring_size,
                ..DeviceConfig::default()
            };
            assert_eq!(cfg.validate(ChipFeatures::empty()), Err(ConfigError::InvalidRingSize));
        }
        let cfg = DeviceConfig {
            tx_ring_size: 64,
            rx_ring_size: Some(16),
            ..DeviceConfig::default()
        };
        assert!(cfg.validate(ChipFeatures::empty()).is_ok());
    }

    #[test]
    fn rejects_features_the_chip_lacks() {
        let cfg = DeviceConfig {
            wol: WolFlags::MAGIC,
            ..DeviceConfig::default()
        };
        assert_eq!(cfg.validate(ChipFeatures::empty()), Err(ConfigError::Unsupported));
        assert!(cfg.validate(ChipFeatures::WOL).is_ok());
    }
}
