//! Memory interface register map.
//!
//! Register offsets are relative to the peripheral base the register lives
//! in. The memory interface (`MEM_IF`) hosts both the IMA staging registers
//! and the DMA arbitration controls; the battery info peripheral only
//! contributes the peek mux used to observe the algorithm-active signal.

use enumset::EnumSetType;

/// Fuel gauge hardware generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Generation {
    /// 4 byte SRAM words, three DMA partitions.
    Gen3 = 3,
    /// 2 byte SRAM words, six DMA partitions.
    Gen4 = 4,
}

impl TryFrom<u8> for Generation {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            3 => Ok(Generation::Gen3),
            4 => Ok(Generation::Gen4),
            _ => Err(tag),
        }
    }
}

impl From<Generation> for u8 {
    fn from(generation: Generation) -> u8 {
        generation as u8
    }
}

/// Hardware revision specific workarounds.
#[derive(EnumSetType, Debug)]
pub enum Workaround {
    /// The DMA grant may only be requested while the gauge algorithm is
    /// idle, and needs extra settle time after being granted.
    DmaAlgActive,
}

/// Symbolic register names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    IntRtSts,
    MemArbCfg,
    MemIntfCfg,
    ImaCtl,
    ImaCfg,
    ImaOprSts,
    ImaExpSts,
    ImaHwSts,
    BeatCount,
    ImaErrSts,
    ImaByteEn,
    AddrLsb,
    AddrMsb,
    WrData0,
    RdData0,
    DmaSts,
    DmaCtl,
    PeekMux4,
    PeekRd,
}

impl Reg {
    const fn offset(self) -> u16 {
        match self {
            Reg::IntRtSts => 0x10,
            Reg::MemArbCfg => 0x40,
            Reg::MemIntfCfg => 0x50,
            Reg::ImaCtl => 0x51,
            Reg::ImaCfg => 0x52,
            Reg::ImaOprSts => 0x54,
            Reg::ImaExpSts => 0x55,
            Reg::ImaHwSts => 0x56,
            Reg::BeatCount => 0x57,
            Reg::ImaErrSts => 0x5F,
            Reg::ImaByteEn => 0x60,
            Reg::AddrLsb => 0x61,
            Reg::AddrMsb => 0x62,
            Reg::WrData0 => 0x63,
            Reg::RdData0 => 0x67,
            Reg::DmaSts => 0x70,
            Reg::DmaCtl => 0x71,
            Reg::PeekMux4 => 0xED,
            Reg::PeekRd => 0xEE,
        }
    }

    const fn in_batt_info(self) -> bool {
        matches!(self, Reg::PeekMux4 | Reg::PeekRd)
    }
}

pub const DEFAULT_BATT_INFO_BASE: u16 = 0x4100;
pub const DEFAULT_MEM_IF_BASE: u16 = 0x4400;

/// Resolves symbolic register names to bus addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterMap {
    pub mem_if_base: u16,
    pub batt_info_base: u16,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            mem_if_base: DEFAULT_MEM_IF_BASE,
            batt_info_base: DEFAULT_BATT_INFO_BASE,
        }
    }
}

impl RegisterMap {
    pub const fn address(&self, reg: Reg) -> u16 {
        let base = if reg.in_batt_info() {
            self.batt_info_base
        } else {
            self.mem_if_base
        };

        base + reg.offset()
    }
}

// INT_RT_STS
pub const MEM_GNT_BIT: u8 = 1 << 2;
pub const GEN4_MEM_GNT_BIT: u8 = 1 << 3;

// MEM_ARB_CFG
pub const MEM_ARB_REQ_BIT: u8 = 1 << 0;
pub const MEM_ARB_LO_LATENCY_EN_BIT: u8 = 1 << 1;
pub const MEM_CLR_LOG_BIT: u8 = 1 << 2;

// MEM_INTF_CFG
pub const MEM_ACCESS_REQ_BIT: u8 = 1 << 7;
pub const IACS_SLCT_BIT: u8 = 1 << 5;

// IMA_CTL
pub const MEM_ACS_BURST_BIT: u8 = 1 << 7;
pub const IMA_WR_EN_BIT: u8 = 1 << 6;
pub const IMA_CTL_MASK: u8 = MEM_ACS_BURST_BIT | IMA_WR_EN_BIT;

// IMA_CFG
pub const IACS_CLR_BIT: u8 = 1 << 2;
pub const IACS_INTR_SRC_SLCT_BIT: u8 = 1 << 3;
pub const STATIC_CLK_EN_BIT: u8 = 1 << 4;

// IMA_OPR_STS
pub const IACS_RDY_BIT: u8 = 1 << 1;

// IMA_EXP_STS
pub const IACS_ERR_BIT: u8 = 1 << 0;
pub const XCT_TYPE_ERR_BIT: u8 = 1 << 1;
pub const DATA_RD_ERR_BIT: u8 = 1 << 3;
pub const DATA_WR_ERR_BIT: u8 = 1 << 4;
pub const ADDR_BURST_WRAP_BIT: u8 = 1 << 5;
pub const ADDR_STABLE_ERR_BIT: u8 = 1 << 7;
pub const IMA_EXCEPTION_MASK: u8 = IACS_ERR_BIT
    | XCT_TYPE_ERR_BIT
    | DATA_RD_ERR_BIT
    | DATA_WR_ERR_BIT
    | ADDR_BURST_WRAP_BIT
    | ADDR_STABLE_ERR_BIT;

// FG_BEAT_COUNT
pub const BEAT_COUNT_MASK: u8 = 0x0F;

// DMA_STS
pub const DMA_WRITE_ERROR_BIT: u8 = 1 << 1;
pub const DMA_READ_ERROR_BIT: u8 = 1 << 2;

// DMA_CTL
pub const DMA_CLEAR_LOG_BIT: u8 = 1 << 0;
pub const ADDR_KIND_BIT: u8 = 1 << 1;

// BATT_INFO_PEEK_MUX4 / PEEK_RD
pub const ALG_ACTIVE_PEEK_CFG: u8 = 0xAC;
pub const ALG_ACTIVE_BIT: u8 = 1 << 3;

/// Offset of the SRAM data inside each DMA peripheral.
pub const SRAM_ADDR_OFFSET: u16 = 0x20;

pub const FG_DMA0_BASE: u16 = 0x4800;
pub const FG_DMA1_BASE: u16 = 0x4900;
pub const FG_DMA2_BASE: u16 = 0x4A00;
pub const FG_DMA3_BASE: u16 = 0x4B00;
pub const FG_DMA4_BASE: u16 = 0x4C00;
pub const FG_DMA5_BASE: u16 = 0x4D00;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generation_tags() {
        assert_eq!(Generation::try_from(3), Ok(Generation::Gen3));
        assert_eq!(Generation::try_from(4), Ok(Generation::Gen4));
        assert_eq!(Generation::try_from(5), Err(5));
        assert_eq!(u8::from(Generation::Gen4), 4);
    }

    #[test]
    fn registers_resolve_against_their_peripheral() {
        let map = RegisterMap {
            mem_if_base: 0x2400,
            batt_info_base: 0x2100,
        };

        assert_eq!(map.address(Reg::MemIntfCfg), 0x2450);
        assert_eq!(map.address(Reg::RdData0), 0x2467);
        assert_eq!(map.address(Reg::PeekRd), 0x21EE);
        assert_eq!(RegisterMap::default().address(Reg::DmaCtl), 0x4471);
    }
}
