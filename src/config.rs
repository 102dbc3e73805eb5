use enumset::EnumSet;

use crate::{
    ll::{Generation, RegisterMap, Workaround, GEN4_MEM_GNT_BIT, MEM_GNT_BIT},
    partition::{SramLayout, GEN3_PARTITIONS, GEN4_PARTITIONS},
};

/// Description of the fuel gauge provided by the device configuration.
#[derive(Clone, Copy, Debug)]
pub struct MemifConfig {
    pub generation: Generation,

    /// Peripheral base addresses.
    pub registers: RegisterMap,

    /// Workarounds required by the hardware revision.
    pub workarounds: EnumSet<Workaround>,

    /// Access the SRAM through the DMA window. Selects the DMA address
    /// space and the DMA specific initialization.
    pub use_dma: bool,

    /// Never use IMA burst mode, rewrite the address register for every word
    /// instead.
    pub use_ima_single_mode: bool,

    /// No battery is connected, hardware initialization is skipped.
    pub battery_missing: bool,
}

impl MemifConfig {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            registers: RegisterMap::default(),
            workarounds: EnumSet::new(),
            use_dma: false,
            use_ima_single_mode: false,
            battery_missing: false,
        }
    }
}

/// Memory parameters derived once from [`MemifConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SramParams {
    pub generation: Generation,
    pub bytes_per_word: u8,
    pub max_word_address: u16,
    /// IMA transactions spanning more than one word may use burst mode.
    pub burst_capable: bool,
    pub workarounds: EnumSet<Workaround>,
    pub layout: SramLayout,
}

impl SramParams {
    pub fn new(config: &MemifConfig) -> Self {
        let (bytes_per_word, max_word_address, layout) = match config.generation {
            Generation::Gen3 => (4, 255, SramLayout::new(&GEN3_PARTITIONS, 4)),
            Generation::Gen4 if config.use_dma => (2, 485, SramLayout::new(&GEN4_PARTITIONS, 2)),
            Generation::Gen4 => (2, 480, SramLayout::new(&GEN4_PARTITIONS, 2)),
        };

        Self {
            generation: config.generation,
            bytes_per_word,
            max_word_address,
            burst_capable: !config.use_ima_single_mode,
            workarounds: config.workarounds,
            layout,
        }
    }

    /// Largest intra-word byte offset a transaction may start at.
    pub fn max_offset(&self) -> u8 {
        self.bytes_per_word - 1
    }

    /// Data register lane that starts the IMA transaction when accessed.
    pub fn last_lane(&self) -> u8 {
        self.bytes_per_word - 1
    }

    /// Address MSB written while running the IACS clear sequence.
    pub fn clear_address_msb(&self) -> u8 {
        match self.generation {
            Generation::Gen3 => 0x00,
            Generation::Gen4 => 0x04,
        }
    }

    /// Encodes an SRAM word address for the IMA address registers.
    pub fn address_bytes(&self, address: u16) -> [u8; 2] {
        let [lsb, msb] = address.to_le_bytes();
        match self.generation {
            // The MSB must be written as zero
            Generation::Gen3 => [lsb, 0],
            Generation::Gen4 => [lsb, msb],
        }
    }

    /// Bit of the interrupt status register that signals a DMA grant.
    pub fn grant_bit(&self) -> u8 {
        match self.generation {
            Generation::Gen3 => MEM_GNT_BIT,
            Generation::Gen4 => GEN4_MEM_GNT_BIT,
        }
    }

    pub fn needs(&self, workaround: Workaround) -> bool {
        self.workarounds.contains(workaround)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generation_parameters() {
        let gen3 = SramParams::new(&MemifConfig::new(Generation::Gen3));
        assert_eq!(gen3.bytes_per_word, 4);
        assert_eq!(gen3.max_offset(), 3);
        assert_eq!(gen3.max_word_address, 255);
        assert_eq!(gen3.layout.partitions().len(), 3);
        assert_eq!(gen3.address_bytes(0x0134), [0x34, 0x00]);

        let gen4 = SramParams::new(&MemifConfig::new(Generation::Gen4));
        assert_eq!(gen4.bytes_per_word, 2);
        assert_eq!(gen4.max_offset(), 1);
        assert_eq!(gen4.max_word_address, 480);
        assert_eq!(gen4.layout.partitions().len(), 6);
        assert_eq!(gen4.address_bytes(0x0134), [0x34, 0x01]);
        assert!(gen4.burst_capable);
    }

    #[test]
    fn dma_path_uses_the_full_gen4_address_space() {
        let config = MemifConfig {
            use_dma: true,
            use_ima_single_mode: true,
            workarounds: EnumSet::only(Workaround::DmaAlgActive),
            ..MemifConfig::new(Generation::Gen4)
        };
        let params = SramParams::new(&config);

        assert_eq!(params.max_word_address, 485);
        assert!(!params.burst_capable);
        assert!(params.needs(Workaround::DmaAlgActive));
        assert_eq!(params.grant_bit(), GEN4_MEM_GNT_BIT);
    }
}
