//! Wake-on-LAN rule table and compiler
//!
//! Rules are edited in memory (directly or through a staging buffer that
//! mirrors the administrative tool commands) and only turned into register
//! contents when the device arms its wake filter. Compilation is a pure
//! function of the table: it produces the complete list of register writes
//! for every rule slot, so recompiling after an edit fully re-derives the
//! hardware state and compiling twice yields identical writes.
//!
//! Two wake engines exist.
//!
//! **CRC mode** (16 rules): the hardware CRC-16s the masked bytes and
//! compares against the rule CRC.
//!
//! ```text
//!   mask table   WAKE_MASK_BASE + idx*16        4 x u32, mask bytes LE
//!   rules 0..8   WAKE_CRC_LSB + (idx/4)*4       byte idx%4 = crc & 0xff
//!                WAKE_CRC_MSB + (idx/4)*4       byte idx%4 = crc >> 8
//!   rules 8..16  WAKE_CRC_HI + ((idx-8)/4)*8
//!                           + ((idx%4)/2)*4     half idx%2 = crc
//! ```
//!
//! **Pattern mode** (32 rules): the hardware compares the masked bytes
//! against a stored pattern.
//!
//! ```text
//!   selector     PAT_MASK_SEL_BASE + idx*2      (offset/256)<<1 | (offset%256 >= 128)
//!   mask         PAT_MASK_BASE + (idx*64+n)*2   nibble n of a 32-byte window;
//!                                               mask byte k sits at
//!                                               ((offset%256)/8 + k) % 32
//!   pattern      PAT_DATA_BASE + idx*138        [offset u16][pattern, 136 bytes]
//!                                               as 69 LE u16 words
//! ```
//!
//! The hardware evaluates the mask in whole 8-byte groups starting at
//! `offset` rounded down to 8, so the leading `offset % 8` mask bits and
//! pattern bytes must be zero.

use alloc::vec;
use alloc::vec::Vec;

use bitflags::bitflags;

use super::chip::ChipFeatures;
use super::error::ConfigError;
use super::regs::*;
use crate::drivers::mmio::{RegisterBus, poll_until};
use crate::drivers::platform::Platform;

bitflags! {
    /// Wake sources armed at suspend
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WolFlags: u32 {
        const MAGIC = 1 << 0;
        /// Match the rule table
        const CRC_MATCH = 1 << 1;
        /// Wake packet detection; recorded only
        const WPD = 1 << 2;
        /// mDNS offload; recorded only
        const MDNS_OFFLOAD = 1 << 3;
    }
}

/// Rules in the CRC engine
pub const CRC_WAKE_RULES: usize = 16;
/// Rules in the pattern engine
pub const PAT_WAKE_RULES: usize = 32;
/// Mask bytes per CRC rule
pub const CRC_MASK_SIZE: usize = 16;
/// Mask bytes per pattern rule
pub const PAT_MASK_SIZE: usize = 17;
/// Pattern bytes per rule
pub const PAT_SIZE: usize = 136;
/// Largest offset: last byte of a maximum-size frame
pub const MAX_WAKE_OFFSET: u16 = 1535;

/// Bytes in the pattern-mode mask window
const PAT_WINDOW: usize = 32;
/// Link-list-ready wait after disarming: 1000 x 1 ms
const LINK_LIST_TRIES: u32 = 1000;

/// Wake engine flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeMode {
    Crc,
    Pattern,
}

impl WakeMode {
    pub fn for_features(features: ChipFeatures) -> Self {
        if features.contains(ChipFeatures::PAT_WAKE) {
            Self::Pattern
        } else {
            Self::Crc
        }
    }

    pub fn rule_count(self) -> usize {
        match self {
            Self::Crc => CRC_WAKE_RULES,
            Self::Pattern => PAT_WAKE_RULES,
        }
    }

    pub fn mask_size(self) -> usize {
        match self {
            Self::Crc => CRC_MASK_SIZE,
            Self::Pattern => PAT_MASK_SIZE,
        }
    }

    fn match_enable(self) -> WakeCtrl {
        match self {
            Self::Crc => WakeCtrl::CRC_MATCH_EN,
            Self::Pattern => WakeCtrl::PATTERN_MATCH_EN,
        }
    }
}

/// One wake condition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WakeRule {
    pub enabled: bool,
    /// Bit `j` of byte `k` selects frame byte `offset / 8 * 8 + 8k + j`
    pub mask: Vec<u8>,
    pub crc: u16,
    pub offset: u16,
    /// Pattern mode only
    pub pattern: Vec<u8>,
}

impl WakeRule {
    /// Check size and zero-prefix constraints for rule `index`
    pub fn validate(&self, index: usize, mode: WakeMode) -> Result<(), ConfigError> {
        if self.mask.len() > mode.mask_size() {
            return Err(ConfigError::MaskTooLong {
                len: self.mask.len(),
                limit: mode.mask_size(),
            });
        }
        if self.pattern.len() > PAT_SIZE {
            return Err(ConfigError::PatternTooLong {
                len: self.pattern.len(),
                limit: PAT_SIZE,
            });
        }
        if self.offset > MAX_WAKE_OFFSET {
            return Err(ConfigError::OffsetOutOfRange { offset: self.offset });
        }

        let skip = (self.offset % 8) as usize;
        let prefix_bits = ((1u16 << skip) - 1) as u8;
        if self.mask.first().is_some_and(|&b| b & prefix_bits != 0) {
            return Err(ConfigError::MaskPrefixNotZero { index });
        }
        if self.pattern.iter().take(skip).any(|&b| b != 0) {
            return Err(ConfigError::PatternPrefixNotZero { index });
        }
        Ok(())
    }
}

/// Register access width of a compiled write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWidth {
    W16,
    W32,
}

/// One register write produced by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    pub offset: usize,
    pub width: RegWidth,
    pub value: u32,
}

impl RegWrite {
    fn w16(offset: usize, value: u16) -> Self {
        Self {
            offset,
            width: RegWidth::W16,
            value: value as u32,
        }
    }

    fn w32(offset: usize, value: u32) -> Self {
        Self {
            offset,
            width: RegWidth::W32,
            value,
        }
    }
}

/// Compiled wake table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeProgram {
    pub writes: Vec<RegWrite>,
    /// Rules that made it into the program
    pub armed: usize,
}

impl WakeProgram {
    pub fn apply(&self, regs: &dyn RegisterBus) {
        for w in &self.writes {
            match w.width {
                RegWidth::W16 => regs.write16(w.offset, w.value as u16),
                RegWidth::W32 => regs.write32(w.offset, w.value),
            }
        }
    }
}

/// Indexed rule table plus the staging buffer
#[derive(Debug, Clone)]
pub struct WakeTable {
    mode: WakeMode,
    rules: Vec<WakeRule>,
    staging: WakeRule,
}

impl WakeTable {
    pub fn new(mode: WakeMode) -> Self {
        Self {
            mode,
            rules: vec![WakeRule::default(); mode.rule_count()],
            staging: WakeRule::default(),
        }
    }

    pub fn mode(&self) -> WakeMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn check_index(&self, index: usize) -> Result<(), ConfigError> {
        if index >= self.rules.len() {
            return Err(ConfigError::RuleIndexOutOfRange {
                index,
                limit: self.rules.len(),
            });
        }
        Ok(())
    }

    /// Replace rule `index` after validating it
    pub fn set_rule(&mut self, index: usize, rule: WakeRule) -> Result<(), ConfigError> {
        self.check_index(index)?;
        rule.validate(index, self.mode)?;
        self.rules[index] = rule;
        Ok(())
    }

    pub fn get_rule(&self, index: usize) -> Result<&WakeRule, ConfigError> {
        self.check_index(index)?;
        Ok(&self.rules[index])
    }

    pub fn rules(&self) -> &[WakeRule] {
        &self.rules
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }

    pub fn staged(&self) -> &WakeRule {
        &self.staging
    }

    pub fn stage_mask(&mut self, mask: &[u8]) -> Result<(), ConfigError> {
        if mask.len() > self.mode.mask_size() {
            return Err(ConfigError::MaskTooLong {
                len: mask.len(),
                limit: self.mode.mask_size(),
            });
        }
        self.staging.mask = mask.to_vec();
        Ok(())
    }

    pub fn stage_crc(&mut self, crc: u16) {
        self.staging.crc = crc;
    }

    pub fn stage_offset(&mut self, offset: u16) -> Result<(), ConfigError> {
        if offset > MAX_WAKE_OFFSET {
            return Err(ConfigError::OffsetOutOfRange { offset });
        }
        self.staging.offset = offset;
        Ok(())
    }

    pub fn stage_pattern(&mut self, pattern: &[u8]) -> Result<(), ConfigError> {
        if pattern.len() > PAT_SIZE {
            return Err(ConfigError::PatternTooLong {
                len: pattern.len(),
                limit: PAT_SIZE,
            });
        }
        self.staging.pattern = pattern.to_vec();
        Ok(())
    }

    /// Store the staging buffer at `index`
    pub fn commit(&mut self, index: usize, enable: bool) -> Result<(), ConfigError> {
        let rule = WakeRule {
            enabled: enable,
            ..self.staging.clone()
        };
        self.set_rule(index, rule)
    }

    /// Copy rule `index` into the staging buffer
    pub fn load(&mut self, index: usize) -> Result<(), ConfigError> {
        self.check_index(index)?;
        self.staging = self.rules[index].clone();
        Ok(())
    }

    /// Compile every rule slot into register writes
    pub fn compile(&self) -> WakeProgram {
        match self.mode {
            WakeMode::Crc => compile_crc(&self.rules),
            WakeMode::Pattern => compile_pattern(&self.rules),
        }
    }
}

/// Rules that may be armed; invalid ones are reported and left out
fn usable(index: usize, rule: &WakeRule, mode: WakeMode) -> bool {
    if !rule.enabled {
        return false;
    }
    match rule.validate(index, mode) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("[{}] skipping {}", crate::LOG_TAG, e);
            false
        }
    }
}

fn compile_crc(rules: &[WakeRule]) -> WakeProgram {
    let mut writes = Vec::new();
    let mut lsb = [0u32; 2];
    let mut msb = [0u32; 2];
    let mut hi = [0u32; 4];
    let mut armed = 0;

    for (idx, rule) in rules.iter().enumerate().take(CRC_WAKE_RULES) {
        let base = WAKE_MASK_BASE + idx * WAKE_MASK_STRIDE;
        if !usable(idx, rule, WakeMode::Crc) {
            if !rule.enabled {
                for w in 0..4 {
                    writes.push(RegWrite::w32(base + w * 4, 0));
                }
            }
            continue;
        }
        armed += 1;

        let mut mask = [0u8; CRC_MASK_SIZE];
        mask[..rule.mask.len()].copy_from_slice(&rule.mask);
        for (w, chunk) in mask.chunks_exact(4).enumerate() {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            writes.push(RegWrite::w32(base + w * 4, word));
        }

        let crc = rule.crc as u32;
        if idx < 8 {
            let shift = 8 * (idx % 4);
            lsb[idx / 4] |= (crc & 0xff) << shift;
            msb[idx / 4] |= (crc >> 8) << shift;
        } else {
            let word = (idx - 8) / 4 * 2 + (idx % 4) / 2;
            hi[word] |= crc << (16 * (idx % 2));
        }
    }

    for (i, v) in lsb.iter().enumerate() {
        writes.push(RegWrite::w32(WAKE_CRC_LSB + i * 4, *v));
    }
    for (i, v) in msb.iter().enumerate() {
        writes.push(RegWrite::w32(WAKE_CRC_MSB + i * 4, *v));
    }
    for (i, v) in hi.iter().enumerate() {
        writes.push(RegWrite::w32(WAKE_CRC_HI + i * 4, *v));
    }
    WakeProgram { writes, armed }
}

/// Mask selector word for `offset`
fn mask_selector(offset: u16) -> u16 {
    (offset / 256) << 1 | ((offset % 256) >= 128) as u16
}

/// Place `mask` into the 32-byte window at its offset-derived origin
fn mask_window(mask: &[u8], offset: u16) -> [u8; PAT_WINDOW] {
    let origin = (offset % 256) as usize / 8;
    let mut window = [0u8; PAT_WINDOW];
    for (k, &byte) in mask.iter().enumerate() {
        window[(origin + k) % PAT_WINDOW] = byte;
    }
    window
}

fn compile_pattern(rules: &[WakeRule]) -> WakeProgram {
    let mut writes = Vec::new();
    let mut armed = 0;

    for (idx, rule) in rules.iter().enumerate().take(PAT_WAKE_RULES) {
        let live = usable(idx, rule, WakeMode::Pattern);
        if !live && rule.enabled {
            continue;
        }
        let empty = WakeRule::default();
        let rule = if live {
            armed += 1;
            rule
        } else {
            &empty
        };

        writes.push(RegWrite::w16(PAT_MASK_SEL_BASE + idx * 2, mask_selector(rule.offset)));

        let window = mask_window(&rule.mask, rule.offset);
        for n in 0..PAT_MASK_NIBBLES {
            let nibble = (window[n / 2] >> (4 * (n % 2))) & 0x0f;
            writes.push(RegWrite::w16(
                PAT_MASK_BASE + (idx * PAT_MASK_NIBBLES + n) * 2,
                nibble as u16,
            ));
        }

        let mut data = [0u8; PAT_DATA_STRIDE];
        data[..2].copy_from_slice(&rule.offset.to_le_bytes());
        data[2..2 + rule.pattern.len()].copy_from_slice(&rule.pattern);
        let base = PAT_DATA_BASE + idx * PAT_DATA_STRIDE;
        for (w, pair) in data.chunks_exact(2).enumerate() {
            writes.push(RegWrite::w16(base + w * 2, u16::from_le_bytes([pair[0], pair[1]])));
        }
    }
    WakeProgram { writes, armed }
}

/// Arm the wake filter
///
/// Order: clear wake status, program the rules, lend SRAM and enable
/// matching, then magic packet.
pub(crate) fn enable(regs: &dyn RegisterBus, wol: WolFlags, table: &WakeTable) {
    regs.write16(WAKE_STATUS, 0xffff);

    if wol.contains(WolFlags::CRC_MATCH) {
        let program = table.compile();
        program.apply(regs);
        regs.modify16(
            WAKE_CTRL,
            0,
            (WakeCtrl::BORROW_SRAM | table.mode().match_enable()).bits(),
        );
        log::debug!("[{}] {} wake rules armed", crate::LOG_TAG, program.armed);
    }

    if wol.contains(WolFlags::MAGIC) {
        regs.write8(CFG9346, CFG9346_UNLOCK);
        regs.modify8(CONFIG3, 0, MAGIC_PKT);
        regs.modify8(CONFIG5, 0, LAN_WAKE);
        regs.write8(CFG9346, CFG9346_LOCK);
    }
}

/// Disarm the wake filter and wait for the MAC to take its SRAM back
///
/// Returns `false` if link-list ready never came.
pub(crate) fn disable(regs: &dyn RegisterBus, platform: &dyn Platform, wol: WolFlags, mode: WakeMode) -> bool {
    if wol.contains(WolFlags::MAGIC) {
        regs.write8(CFG9346, CFG9346_UNLOCK);
        regs.modify8(CONFIG5, LAN_WAKE, 0);
        regs.modify8(CONFIG3, MAGIC_PKT, 0);
        regs.write8(CFG9346, CFG9346_LOCK);
    }

    regs.modify16(
        WAKE_CTRL,
        (WakeCtrl::BORROW_SRAM | mode.match_enable()).bits(),
        0,
    );
    regs.write16(WAKE_STATUS, 0xffff);

    let ready = poll_until(
        LINK_LIST_TRIES,
        || platform.delay_us(1000),
        || Mcu::from_bits_retain(regs.read8(MCU)).contains(Mcu::LINK_LIST_RDY),
    );
    if !ready {
        log::warn!("[{}] link list not ready after wake disarm", crate::LOG_TAG);
    }
    ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::net::ethernet::realtek::r8169soc::testing::{BusWrite, MockBus, MockPlatform};

    fn rule(mask: &[u8], crc: u16, offset: u16, pattern: &[u8]) -> WakeRule {
        WakeRule {
            enabled: true,
            mask: mask.to_vec(),
            crc,
            offset,
            pattern: pattern.to_vec(),
        }
    }

    #[test]
    fn zero_prefix_is_enforced() {
        // offset % 8 == 3: low three bits of mask byte 0 must be clear
        let bad = rule(&[0x04], 0, 11, &[]);
        assert_eq!(
            bad.validate(5, WakeMode::Crc),
            Err(ConfigError::MaskPrefixNotZero { index: 5 })
        );
        assert!(rule(&[0x08], 0, 11, &[]).validate(5, WakeMode::Crc).is_ok());

        let bad = rule(&[0xf8], 0, 11, &[0, 0, 7, 1]);
        assert_eq!(
            bad.validate(2, WakeMode::Pattern),
            Err(ConfigError::PatternPrefixNotZero { index: 2 })
        );
        assert!(rule(&[0xf8], 0, 11, &[0, 0, 0, 1]).validate(2, WakeMode::Pattern).is_ok());
    }

    #[test]
    fn sizes_and_offset_are_bounded() {
        let long_mask = rule(&[0xff; 17], 0, 0, &[]);
        assert!(matches!(
            long_mask.validate(0, WakeMode::Crc),
            Err(ConfigError::MaskTooLong { len: 17, limit: 16 })
        ));
        assert!(long_mask.validate(0, WakeMode::Pattern).is_ok());

        let far = rule(&[], 0, MAX_WAKE_OFFSET + 1, &[]);
        assert!(matches!(
            far.validate(0, WakeMode::Pattern),
            Err(ConfigError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn set_then_get_returns_identical_rule() {
        let mut table = WakeTable::new(WakeMode::Pattern);
        let r = rule(&[0xf0, 0x0f], 0xbeef, 12, &[0, 0, 0, 0, 1, 2, 3]);
        table.set_rule(31, r.clone()).unwrap();
        assert_eq!(table.get_rule(31).unwrap(), &r);
        assert!(matches!(
            table.set_rule(32, r),
            Err(ConfigError::RuleIndexOutOfRange { index: 32, limit: 32 })
        ));
    }

    #[test]
    fn staging_commit_and_load() {
        let mut table = WakeTable::new(WakeMode::Crc);
        table.stage_mask(&[0xc0, 0xff]).unwrap();
        table.stage_crc(0x1234);
        table.stage_offset(14).unwrap();
        table.commit(3, true).unwrap();

        let stored = table.get_rule(3).unwrap().clone();
        assert!(stored.enabled);
        assert_eq!((stored.crc, stored.offset), (0x1234, 14));

        // 14 % 8 = 6: the low six mask bits must be clear
        table.stage_mask(&[0x3f]).unwrap();
        assert_eq!(
            table.commit(3, true),
            Err(ConfigError::MaskPrefixNotZero { index: 3 })
        );
        assert_eq!(table.get_rule(3).unwrap(), &stored);

        table.load(3).unwrap();
        assert_eq!(table.staged(), &stored);
        assert!(table.stage_mask(&[0; 17]).is_err());
        assert!(table.stage_offset(2000).is_err());
        assert!(table.load(16).is_err());
    }

    #[test]
    fn crc_rules_land_in_their_banks() {
        let mut table = WakeTable::new(WakeMode::Crc);
        table.set_rule(0, rule(&[0xff, 0x00, 0x00, 0x00, 0x01], 0xbeef, 0, &[])).unwrap();
        table.set_rule(7, rule(&[0x0f], 0x1234, 0, &[])).unwrap();
        table.set_rule(8, rule(&[0xf0], 0xcafe, 0, &[])).unwrap();
        table.set_rule(15, rule(&[0x01], 0x5678, 0, &[])).unwrap();

        let bus = MockBus::new();
        let program = table.compile();
        assert_eq!(program.armed, 4);
        program.apply(&bus);

        assert_eq!(bus.get32(WAKE_MASK_BASE), 0x0000_00ff);
        assert_eq!(bus.get32(WAKE_MASK_BASE + 4), 0x0000_0001);
        assert_eq!(bus.get32(WAKE_MASK_BASE + 7 * 16), 0x0000_000f);
        assert_eq!(bus.get32(WAKE_MASK_BASE + 8 * 16), 0x0000_00f0);

        // rule 0: byte 0 of bank word 0; rule 7: byte 3 of bank word 1
        assert_eq!(bus.get32(WAKE_CRC_LSB), 0x0000_00ef);
        assert_eq!(bus.get32(WAKE_CRC_MSB), 0x0000_00be);
        assert_eq!(bus.get32(WAKE_CRC_LSB + 4), 0x3400_0000);
        assert_eq!(bus.get32(WAKE_CRC_MSB + 4), 0x1200_0000);

        // rule 8: low half of the first high word; rule 15: high half of the last
        assert_eq!(bus.get32(WAKE_CRC_HI), 0x0000_cafe);
        assert_eq!(bus.get32(WAKE_CRC_HI + 12), 0x5678_0000);
    }

    #[test]
    fn pattern_rule_at_last_index() {
        let mut table = WakeTable::new(WakeMode::Pattern);
        // offset 300: block 1, lower half, origin byte 5, four skipped bits
        let pattern = [0, 0, 0, 0, 0xaa, 0xbb];
        table.set_rule(31, rule(&[0xf0, 0xff], 0, 300, &pattern)).unwrap();

        let bus = MockBus::new();
        table.compile().apply(&bus);

        assert_eq!(bus.get16(PAT_MASK_SEL_BASE + 31 * 2), 2);
        let nibble = |n: usize| bus.get16(PAT_MASK_BASE + (31 * PAT_MASK_NIBBLES + n) * 2);
        assert_eq!(nibble(9), 0);
        assert_eq!(nibble(10), 0x0);
        assert_eq!(nibble(11), 0xf);
        assert_eq!(nibble(12), 0xf);
        assert_eq!(nibble(13), 0xf);
        assert_eq!(nibble(14), 0);

        let data = PAT_DATA_BASE + 31 * PAT_DATA_STRIDE;
        assert_eq!(bus.get16(data), 300);
        assert_eq!(bus.get16(data + 2), 0);
        assert_eq!(bus.get16(data + 6), 0xbbaa);
        assert_eq!(bus.get16(data + 136), 0);
    }

    #[test]
    fn pattern_window_wraps() {
        assert_eq!(mask_selector(248), 1);
        assert_eq!(mask_selector(1535), (5 << 1) | 1);

        let window = mask_window(&[1, 2, 3], 248);
        assert_eq!((window[31], window[0], window[1]), (1, 2, 3));
    }

    #[test]
    fn compile_is_idempotent() {
        let mut table = WakeTable::new(WakeMode::Crc);
        table.set_rule(2, rule(&[0xff; 4], 0xaaaa, 0, &[])).unwrap();
        table.set_rule(9, rule(&[0x01], 0x5555, 0, &[])).unwrap();

        let bus = MockBus::new();
        table.compile().apply(&bus);
        let first: Vec<BusWrite> = bus.writes();
        bus.clear_log();
        table.compile().apply(&bus);
        assert_eq!(bus.writes(), first);
    }

    #[test]
    fn disabled_slots_are_cleared() {
        let mut table = WakeTable::new(WakeMode::Crc);
        table.set_rule(1, rule(&[0xff], 0x1111, 0, &[])).unwrap();
        let bus = MockBus::new();
        table.compile().apply(&bus);
        assert_eq!(bus.get32(WAKE_MASK_BASE + 16), 0xff);

        let mut off = table.get_rule(1).unwrap().clone();
        off.enabled = false;
        table.set_rule(1, off).unwrap();
        table.compile().apply(&bus);
        assert_eq!(bus.get32(WAKE_MASK_BASE + 16), 0);
        assert_eq!(bus.get32(WAKE_CRC_LSB), 0);
    }

    #[test]
    fn enable_sequence_order() {
        let mut table = WakeTable::new(WakeMode::Crc);
        table.set_rule(0, rule(&[0xff], 0x1234, 0, &[])).unwrap();
        let bus = MockBus::new();

        enable(&bus, WolFlags::MAGIC | WolFlags::CRC_MATCH, &table);
        let writes = bus.writes();

        let pos = |offset: usize| writes.iter().position(|w| w.offset == offset).unwrap();
        assert_eq!(pos(WAKE_STATUS), 0);
        assert!(pos(WAKE_MASK_BASE) < pos(WAKE_CTRL));
        assert!(pos(WAKE_CTRL) < pos(CONFIG3));
        let ctrl = WakeCtrl::from_bits_retain(bus.get16(WAKE_CTRL));
        assert!(ctrl.contains(WakeCtrl::BORROW_SRAM | WakeCtrl::CRC_MATCH_EN));
        assert_eq!(bus.get8(CONFIG3) & MAGIC_PKT, MAGIC_PKT);
        assert_eq!(bus.get8(CONFIG5) & LAN_WAKE, LAN_WAKE);
        assert_eq!(bus.get8(CFG9346), CFG9346_LOCK);
    }

    #[test]
    fn disable_reverses_and_waits_for_link_list() {
        let table = WakeTable::new(WakeMode::Pattern);
        let bus = MockBus::new();
        let platform = MockPlatform::new();
        enable(&bus, WolFlags::MAGIC | WolFlags::CRC_MATCH, &table);

        assert!(disable(&bus, &platform, WolFlags::MAGIC | WolFlags::CRC_MATCH, WakeMode::Pattern));
        assert_eq!(bus.get16(WAKE_CTRL), 0);
        assert_eq!(bus.get8(CONFIG3) & MAGIC_PKT, 0);

        bus.set8(MCU, 0);
        assert!(!disable(&bus, &platform, WolFlags::empty(), WakeMode::Pattern));
        assert_eq!(platform.total_delay_us(), 1000 * LINK_LIST_TRIES as u64);
    }
}
