#![cfg_attr(not(test), no_std)]

//! Host access to the fuel gauge SRAM.
//!
//! The SRAM is not memory mapped. It is reached either through the
//! interleaved memory access (IMA) staging registers, one word per
//! transaction, or, on hardware that supports it, through per-partition DMA
//! windows after the memory arbiter granted access. Both paths own a shared
//! hardware resource for the duration of a transaction and release it on
//! every exit path.
//!
//! ```rust,ignore
//! let config = MemifConfig::new(Generation::Gen4);
//! let mut memif = FgMemif::new(bus, delay, config);
//! memif.initialize()?;
//!
//! let mut profile = [0; 8];
//! memif.ima_read(64, 0, &mut profile)?;
//! ```

#[macro_use]
extern crate logger;

use register_access::RegisterAccess;

pub mod config;
pub mod dma;
mod error;
pub mod ima;
mod init;
pub mod ll;
pub mod partition;

#[cfg(test)]
mod sim;

pub use config::{MemifConfig, SramParams};
pub use dma::DmaAccess;
pub use error::{Error, ErrorCheck};
pub use ll::{Generation, Workaround};

use ll::{Reg, RegisterMap};

/// Fuel gauge memory interface.
///
/// Transactions must not overlap. The type does no locking of its own; the
/// caller serializes access, which `&mut self` enforces within one owner.
pub struct FgMemif<B, D> {
    bus: B,
    delay: D,
    registers: RegisterMap,
    config: MemifConfig,
    params: SramParams,
}

impl<B, D> FgMemif<B, D> {
    pub fn new(bus: B, delay: D, config: MemifConfig) -> Self {
        Self {
            bus,
            delay,
            registers: config.registers,
            params: SramParams::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &MemifConfig {
        &self.config
    }

    pub fn params(&self) -> &SramParams {
        &self.params
    }

    pub fn inner(&self) -> &B {
        &self.bus
    }

    pub fn inner_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// Rejects requests that can not be valid before any register is touched.
    fn check_request<E>(&self, address: u16, offset: u8, len: usize) -> Result<(), Error<E>> {
        if offset > self.params.max_offset() {
            error!("Offset too large: {}", offset);
            return Err(Error::InvalidArgument);
        }

        if len == 0 {
            error!("Empty SRAM transfer requested");
            return Err(Error::InvalidArgument);
        }

        let bytes_per_word = self.params.bytes_per_word as usize;
        let last_word = address as usize + (offset as usize + len - 1) / bytes_per_word;
        if last_word > self.params.max_word_address as usize {
            error!(
                "SRAM address out of range: {} + {} bytes",
                address,
                offset as usize + len
            );
            return Err(Error::InvalidArgument);
        }

        Ok(())
    }
}

impl<B, D> FgMemif<B, D>
where
    B: RegisterAccess,
{
    fn read_reg(&mut self, reg: Reg) -> Result<u8, Error<B::Error>> {
        let address = self.registers.address(reg);
        self.bus.read_u8(address).map_err(Error::Transport)
    }

    fn write_reg(&mut self, reg: Reg, value: u8) -> Result<(), Error<B::Error>> {
        let address = self.registers.address(reg);
        self.bus.write_u8(address, value).map_err(Error::Transport)
    }

    fn masked_write_reg(&mut self, reg: Reg, mask: u8, value: u8) -> Result<(), Error<B::Error>> {
        let address = self.registers.address(reg);
        self.bus
            .masked_write(address, mask, value)
            .map_err(Error::Transport)
    }

    /// Reads consecutive byte lanes of a multi-byte register, starting at `lane`.
    fn read_lanes(&mut self, reg: Reg, lane: u8, buffer: &mut [u8]) -> Result<(), Error<B::Error>> {
        let address = self.registers.address(reg) + lane as u16;
        self.bus.read(address, buffer).map_err(Error::Transport)
    }

    /// Writes consecutive byte lanes of a multi-byte register, starting at `lane`.
    fn write_lanes(&mut self, reg: Reg, lane: u8, data: &[u8]) -> Result<(), Error<B::Error>> {
        let address = self.registers.address(reg) + lane as u16;
        self.bus.write(address, data).map_err(Error::Transport)
    }
}
