//! DMA access to the SRAM.
//!
//! Once the memory arbiter granted access, every SRAM partition is visible as
//! a plain register window and is transferred in one bus access. A request
//! touching several partitions is split at the partition boundaries.

use core::ops::Range;

use embedded_hal::delay::DelayNs;
use register_access::RegisterAccess;

use crate::{
    error::with_release,
    ll::{Reg, Workaround, ALG_ACTIVE_BIT, IACS_SLCT_BIT, MEM_ACCESS_REQ_BIT, MEM_ARB_REQ_BIT},
    Error, FgMemif,
};

const GRANT_SETTLE_US: u32 = 40;
const GRANT_POLLS: u8 = 50;
const GRANT_POLL_INTERVAL_MS: u32 = 10;
const GRANT_WORKAROUND_SETTLE_MS: u32 = 1;

const ALG_ACTIVE_POLLS: u8 = 35;
const ALG_ACTIVE_POLL_INTERVAL_MS: u32 = 10;
const ALG_ACTIVE_SETTLE_MS: u32 = 1;

const HOLD_GRANT_POLLS: u8 = 3;
const HOLD_GRANT_POLL_INTERVAL_MS: u32 = 20;

/// Registers logged when the grant never arrives.
const DUMP_REGISTERS: [Reg; 8] = [
    Reg::IntRtSts,
    Reg::MemArbCfg,
    Reg::MemIntfCfg,
    Reg::ImaOprSts,
    Reg::ImaExpSts,
    Reg::ImaHwSts,
    Reg::DmaSts,
    Reg::DmaCtl,
];

impl<B, D> FgMemif<B, D>
where
    B: RegisterAccess,
    D: DelayNs,
{
    /// Reads `buffer.len()` bytes starting at byte `offset` of SRAM word `address`.
    pub fn dma_read(
        &mut self,
        address: u16,
        offset: u8,
        buffer: &mut [u8],
    ) -> Result<(), Error<B::Error>> {
        self.check_request(address, offset, buffer.len())?;
        debug!(
            "DMA read: address {} offset {} length {}",
            address,
            offset,
            buffer.len()
        );

        let len = buffer.len();
        self.dma_transaction(address, offset, len, |bus, physical, range| {
            bus.read(physical, &mut buffer[range])
        })?;

        debug!("DMA data read: {}", logger::Hex(buffer));
        Ok(())
    }

    /// Writes `data` starting at byte `offset` of SRAM word `address`.
    pub fn dma_write(&mut self, address: u16, offset: u8, data: &[u8]) -> Result<(), Error<B::Error>> {
        self.check_request(address, offset, data.len())?;
        debug!(
            "DMA write: address {} offset {} data {}",
            address,
            offset,
            logger::Hex(data)
        );

        self.dma_transaction(address, offset, data.len(), |bus, physical, range| {
            bus.write(physical, &data[range])
        })
    }

    /// Requests the DMA grant and keeps it until the returned guard is
    /// released or dropped.
    ///
    /// While held, the SRAM windows can be accessed directly through
    /// [`DmaAccess::bus`].
    pub fn hold_dma_access(&mut self) -> Result<DmaAccess<'_, B, D>, Error<B::Error>> {
        if let Err(error) = self.request_dma_hold() {
            let released = self.release_dma();
            return with_release(Err(error), released);
        }

        debug!("Holding DMA access");
        Ok(DmaAccess {
            memif: self,
            released: false,
        })
    }

    /// Deasserts both access request bits. Both writes are attempted.
    pub(crate) fn release_dma(&mut self) -> Result<(), Error<B::Error>> {
        let interface = self.masked_write_reg(
            Reg::MemIntfCfg,
            MEM_ACCESS_REQ_BIT | IACS_SLCT_BIT,
            0,
        );
        let arbiter = self.masked_write_reg(Reg::MemArbCfg, MEM_ARB_REQ_BIT, 0);

        trace!("Released DMA access");
        interface.and(arbiter)
    }

    fn dma_transaction<F>(
        &mut self,
        address: u16,
        offset: u8,
        len: usize,
        io: F,
    ) -> Result<(), Error<B::Error>>
    where
        F: FnMut(&mut B, u16, Range<usize>) -> Result<(), B::Error>,
    {
        let partitions = self
            .params
            .layout
            .partition_count(address, offset as usize + len)?;
        trace!("DMA transfer touches {} partitions", partitions);

        self.request_dma_grant()?;

        let result = self.dma_transfer(address, offset, len, partitions, io);
        let released = self.release_dma();

        with_release(result, released)
    }

    fn dma_transfer<F>(
        &mut self,
        mut address: u16,
        offset: u8,
        len: usize,
        partitions: usize,
        mut io: F,
    ) -> Result<(), Error<B::Error>>
    where
        F: FnMut(&mut B, u16, Range<usize>) -> Result<(), B::Error>,
    {
        let layout = self.params.layout;
        let bytes_per_word = self.params.bytes_per_word as usize;
        let mut offset = offset as usize;
        let mut done = 0;

        for _ in 0..partitions {
            let physical = layout.dma_address(address, offset as u8)?;
            let count = layout.available_in_partition(address, offset + len - done)? - offset;
            trace!(
                "DMA transfer: address {} offset {} physical {:#x} length {}",
                address,
                offset,
                physical,
                count
            );

            io(&mut self.bus, physical, done..done + count).map_err(|error| {
                error!("DMA transfer at {:#x} failed", physical);
                Error::Transport(error)
            })?;

            done += count;
            address += ((offset + count) / bytes_per_word) as u16;
            offset = 0;
        }

        Ok(())
    }

    fn request_dma_grant(&mut self) -> Result<(), Error<B::Error>> {
        if self.params.needs(Workaround::DmaAlgActive) {
            self.wait_for_alg_inactive()?;
        }

        if let Err(error) = self.assert_dma_request() {
            let released = self.release_dma();
            return with_release(Err(error), released);
        }

        Ok(())
    }

    fn assert_dma_request(&mut self) -> Result<(), Error<B::Error>> {
        self.masked_write_reg(Reg::MemArbCfg, MEM_ARB_REQ_BIT, MEM_ARB_REQ_BIT)?;
        // IACS_SLCT clear selects DMA
        self.masked_write_reg(
            Reg::MemIntfCfg,
            MEM_ACCESS_REQ_BIT | IACS_SLCT_BIT,
            MEM_ACCESS_REQ_BIT,
        )?;

        // The grant takes a few cycles of the 200 kHz gauge clock
        self.delay.delay_us(GRANT_SETTLE_US);

        if !self.poll_grant(GRANT_POLLS, GRANT_POLL_INTERVAL_MS)? {
            error!("Timed out waiting for the DMA grant");
            self.dump_registers();
            return Err(Error::Timeout);
        }

        if self.params.needs(Workaround::DmaAlgActive) {
            self.delay.delay_ms(GRANT_WORKAROUND_SETTLE_MS);
        }

        trace!("DMA access granted");
        Ok(())
    }

    fn request_dma_hold(&mut self) -> Result<(), Error<B::Error>> {
        self.masked_write_reg(
            Reg::MemIntfCfg,
            MEM_ACCESS_REQ_BIT | IACS_SLCT_BIT,
            MEM_ACCESS_REQ_BIT,
        )?;
        self.masked_write_reg(Reg::MemArbCfg, MEM_ARB_REQ_BIT, MEM_ARB_REQ_BIT)?;

        if !self.poll_grant(HOLD_GRANT_POLLS, HOLD_GRANT_POLL_INTERVAL_MS)? {
            error!("Failed to get DMA access");
            return Err(Error::Timeout);
        }

        Ok(())
    }

    /// Polls the grant bit, sleeping after every miss.
    fn poll_grant(&mut self, polls: u8, interval_ms: u32) -> Result<bool, Error<B::Error>> {
        let grant = self.params.grant_bit();

        for _ in 0..polls {
            if self.read_reg(Reg::IntRtSts)? & grant != 0 {
                return Ok(true);
            }
            self.delay.delay_ms(interval_ms);
        }

        Ok(false)
    }

    fn wait_for_alg_inactive(&mut self) -> Result<(), Error<B::Error>> {
        for _ in 0..ALG_ACTIVE_POLLS {
            if self.read_reg(Reg::PeekRd)? & ALG_ACTIVE_BIT == 0 {
                self.delay.delay_ms(ALG_ACTIVE_SETTLE_MS);
                return Ok(());
            }
            self.delay.delay_ms(ALG_ACTIVE_POLL_INTERVAL_MS);
        }

        error!("Gauge algorithm stayed active, DMA not requested");
        Err(Error::Timeout)
    }

    fn dump_registers(&mut self) {
        for reg in DUMP_REGISTERS {
            match self.read_reg(reg) {
                Ok(value) => {
                    error!("{:?}: {:#x}", reg, value);
                }
                Err(_) => {
                    error!("{:?}: read failed", reg);
                }
            }
        }
    }
}

/// DMA grant held on behalf of the caller.
///
/// Dropping the guard releases the grant. Use [`DmaAccess::release`] to
/// observe a release failure.
pub struct DmaAccess<'a, B, D>
where
    B: RegisterAccess,
    D: DelayNs,
{
    memif: &'a mut FgMemif<B, D>,
    released: bool,
}

impl<B, D> DmaAccess<'_, B, D>
where
    B: RegisterAccess,
    D: DelayNs,
{
    /// Register transport for direct access to the SRAM windows.
    pub fn bus(&mut self) -> &mut B {
        &mut self.memif.bus
    }

    pub fn release(mut self) -> Result<(), Error<B::Error>> {
        self.released = true;
        self.memif.release_dma()
    }
}

impl<B, D> Drop for DmaAccess<'_, B, D>
where
    B: RegisterAccess,
    D: DelayNs,
{
    fn drop(&mut self) {
        if !self.released && self.memif.release_dma().is_err() {
            error!("Failed to release DMA access");
        }
    }
}
