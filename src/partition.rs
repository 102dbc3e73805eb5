//! SRAM word address to DMA window translation.

use crate::ll::{
    FG_DMA0_BASE, FG_DMA1_BASE, FG_DMA2_BASE, FG_DMA3_BASE, FG_DMA4_BASE, FG_DMA5_BASE,
    SRAM_ADDR_OFFSET,
};

/// A contiguous range of SRAM words mapped to one DMA window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Partition {
    /// First word of the partition.
    pub start: u16,
    /// Last word of the partition, inclusive.
    pub end: u16,
    /// Bus address of `start`.
    pub base: u16,
}

impl Partition {
    pub const fn new(start: u16, end: u16, base: u16) -> Self {
        Self { start, end, base }
    }

    pub const fn contains(&self, word: u16) -> bool {
        self.start <= word && word <= self.end
    }

    pub const fn words(&self) -> u16 {
        self.end - self.start + 1
    }
}

/// The address translator could not place a word in any partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NotFound;

pub const GEN3_PARTITIONS: [Partition; 3] = [
    // system
    Partition::new(0, 23, FG_DMA0_BASE + SRAM_ADDR_OFFSET),
    // battery profile
    Partition::new(24, 79, FG_DMA1_BASE + SRAM_ADDR_OFFSET),
    // scratch pad
    Partition::new(80, 125, FG_DMA2_BASE + SRAM_ADDR_OFFSET),
];

pub const GEN4_PARTITIONS: [Partition; 6] = [
    // system
    Partition::new(0, 63, FG_DMA0_BASE + SRAM_ADDR_OFFSET),
    // battery profile
    Partition::new(64, 169, FG_DMA1_BASE + SRAM_ADDR_OFFSET),
    Partition::new(170, 274, FG_DMA2_BASE + SRAM_ADDR_OFFSET),
    // dp/SW
    Partition::new(275, 299, FG_DMA3_BASE + SRAM_ADDR_OFFSET),
    // wk/scratch pad
    Partition::new(300, 405, FG_DMA4_BASE + SRAM_ADDR_OFFSET),
    Partition::new(406, 486, FG_DMA5_BASE + SRAM_ADDR_OFFSET),
];

/// Partition table together with the word size it is expressed in.
///
/// Lengths passed to this type are byte counts measured from the first byte
/// of the given word, so callers with an intra-word offset add it to the
/// length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SramLayout {
    partitions: &'static [Partition],
    bytes_per_word: u8,
}

impl SramLayout {
    pub const fn new(partitions: &'static [Partition], bytes_per_word: u8) -> Self {
        Self {
            partitions,
            bytes_per_word,
        }
    }

    pub fn partitions(&self) -> &'static [Partition] {
        self.partitions
    }

    fn position(&self, word: u16) -> Result<usize, NotFound> {
        self.partitions
            .iter()
            .position(|partition| partition.contains(word))
            .ok_or(NotFound)
    }

    /// Returns the partition holding `word`.
    pub fn locate(&self, word: u16) -> Result<&'static Partition, NotFound> {
        let partitions = self.partitions;
        self.position(word).map(|idx| &partitions[idx])
    }

    /// Returns the bus address of byte `offset` of `word`.
    pub fn dma_address(&self, word: u16, offset: u8) -> Result<u16, NotFound> {
        let partition = self.locate(word)?;

        Ok(partition.base
            + offset as u16
            + (word - partition.start) * self.bytes_per_word as u16)
    }

    /// Returns the last word touched by `len` bytes starting at `word`.
    fn end_word(&self, word: u16, len: usize) -> u16 {
        let words = len.saturating_sub(1) / self.bytes_per_word as usize;
        word.saturating_add(words.min(u16::MAX as usize) as u16)
    }

    /// Returns the number of partitions touched by `len` bytes starting at `word`.
    pub fn partition_count(&self, word: u16, len: usize) -> Result<usize, NotFound> {
        let first = self.position(word)?;
        let last = self.position(self.end_word(word, len))?;

        Ok(last - first + 1)
    }

    /// Returns how many of `len` bytes starting at `word` fit before the end
    /// of the partition holding `word`.
    pub fn available_in_partition(&self, word: u16, len: usize) -> Result<usize, NotFound> {
        let partition = self.locate(word)?;

        let available = (partition.end - word + 1) as usize * self.bytes_per_word as usize;
        if available == 0 {
            return Err(NotFound);
        }

        Ok(available.min(len))
    }
}
