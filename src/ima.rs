//! Interleaved memory access (IMA).
//!
//! IMA reaches the SRAM one word at a time through staging registers: the
//! word address, a byte enable mask and one data register per byte lane.
//! Accessing the last lane starts the transaction. In burst mode the hardware
//! advances the address after every word, in single mode the driver rewrites
//! it.
//!
//! Every transaction is preceded by a check of the exception latches. A
//! latched exception is cleared with the IACS clear sequence, after which the
//! whole transaction is started over.

use embedded_hal::delay::DelayNs;
use register_access::RegisterAccess;

use crate::{
    error::{with_release, with_release_on_error},
    ll::{
        Reg, BEAT_COUNT_MASK, IACS_CLR_BIT, IACS_RDY_BIT, IACS_SLCT_BIT, IMA_CTL_MASK,
        IMA_EXCEPTION_MASK, IMA_WR_EN_BIT, MEM_ACCESS_REQ_BIT, MEM_ACS_BURST_BIT,
        STATIC_CLK_EN_BIT,
    },
    Error, ErrorCheck, FgMemif,
};

/// Attempts made for one IMA transaction.
const RETRY_COUNT: u8 = 3;

const ACCESS_FREE_POLLS: u8 = 5;
const ACCESS_FREE_POLL_INTERVAL_MS: u32 = 4;

const IACS_READY_SETTLE_US: u32 = 30;
const IACS_READY_POLLS: u16 = 250;
const IACS_READY_POLL_INTERVAL_US: u32 = 5_000;

const CLEAR_SEQUENCE_SETTLE_US: u32 = 35;
const CLEAR_SEQUENCE_ITERATIONS: u16 = 250;
const CLEAR_BIT_HOLD_US: u32 = 5;

const IMA_ACCESS_BITS: u8 = MEM_ACCESS_REQ_BIT | IACS_SLCT_BIT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Access {
    Read,
    Write,
}

/// Beat counter sampled before and after the data transfer.
///
/// The counter changing means the gauge algorithm touched the SRAM while the
/// transfer was in progress.
struct Beats {
    start: u8,
    end: u8,
}

impl Beats {
    fn consistent(&self) -> bool {
        self.start == self.end
    }
}

/// Byte enable mask selecting `count` lanes starting at lane `offset`.
fn byte_enable_mask(offset: usize, count: usize) -> u8 {
    debug_assert!(offset + count <= 8);
    (((1u16 << count) - 1) << offset) as u8
}

impl<B, D> FgMemif<B, D>
where
    B: RegisterAccess,
    D: DelayNs,
{
    /// Reads `buffer.len()` bytes starting at byte `offset` of SRAM word `address`.
    pub fn ima_read(
        &mut self,
        address: u16,
        offset: u8,
        buffer: &mut [u8],
    ) -> Result<(), Error<B::Error>> {
        self.check_request(address, offset, buffer.len())?;
        debug!(
            "IMA read: address {} offset {} length {}",
            address,
            offset,
            buffer.len()
        );

        let len = buffer.len();
        let mut last_error = Error::Hardware;
        for attempt in 1..=RETRY_COUNT {
            let result = self.ima_attempt(Access::Read, address, offset, len, |memif| {
                memif.ima_read_words(address, offset, &mut *buffer)
            });

            match result {
                Ok(beats) if beats.consistent() => {
                    debug!("IMA data read: {}", logger::Hex(buffer));
                    return Ok(());
                }
                Ok(beats) => {
                    warn!(
                        "Beat count changed during read ({} -> {}), attempt {}",
                        beats.start, beats.end, attempt
                    );
                    last_error = Error::Hardware;
                }
                Err(error) if error.is_retryable() => {
                    warn!("IMA read attempt {} failed", attempt);
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }

        error!("IMA read failed after {} attempts", RETRY_COUNT);
        Err(last_error)
    }

    /// Writes `data` starting at byte `offset` of SRAM word `address`.
    ///
    /// An `atomic` write is retried when the gauge algorithm accessed the
    /// SRAM during the transfer. Otherwise that is only logged.
    pub fn ima_write(
        &mut self,
        address: u16,
        offset: u8,
        data: &[u8],
        atomic: bool,
    ) -> Result<(), Error<B::Error>> {
        self.check_request(address, offset, data.len())?;
        debug!(
            "IMA write: address {} offset {} data {}",
            address,
            offset,
            logger::Hex(data)
        );

        let mut last_error = Error::Hardware;
        for attempt in 1..=RETRY_COUNT {
            let result = self.ima_attempt(Access::Write, address, offset, data.len(), |memif| {
                memif.ima_write_words(address, offset, data)
            });

            match result {
                Ok(beats) if beats.consistent() => return Ok(()),
                Ok(beats) if atomic => {
                    warn!(
                        "Beat count changed during atomic write ({} -> {}), attempt {}",
                        beats.start, beats.end, attempt
                    );
                    last_error = Error::Hardware;
                }
                Ok(beats) => {
                    debug!(
                        "Beat count changed during write ({} -> {})",
                        beats.start, beats.end
                    );
                    return Ok(());
                }
                Err(error) if error.is_retryable() => {
                    warn!("IMA write attempt {} failed", attempt);
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }

        error!("IMA write failed after {} attempts", RETRY_COUNT);
        Err(last_error)
    }

    /// Checks the IMA exception latches and clears them if needed.
    ///
    /// With `check_hw_status` set, the two halves of the hardware status
    /// register are also compared; they differ when the IMA state machine is
    /// stuck.
    pub fn clear_ima_errors(
        &mut self,
        check_hw_status: bool,
    ) -> Result<ErrorCheck, Error<B::Error>> {
        let exp_sts = self.read_reg(Reg::ImaExpSts)?;
        let hw_sts = self.read_reg(Reg::ImaHwSts)?;
        let err_sts = self.read_reg(Reg::ImaErrSts)?;
        debug!(
            "ima_err_sts={:#x} ima_exp_sts={:#x} ima_hw_sts={:#x}",
            err_sts, exp_sts, hw_sts
        );

        let mut run_clear_sequence = false;
        if check_hw_status && (hw_sts & 0x0F) != hw_sts >> 4 {
            warn!("IMA hardware state mismatch, hw_sts={:#x}", hw_sts);
            run_clear_sequence = true;
        }

        if exp_sts & IMA_EXCEPTION_MASK != 0 {
            warn!("IMA exception latched, exp_sts={:#x}", exp_sts);
            run_clear_sequence = true;
        }

        if !run_clear_sequence {
            return Ok(ErrorCheck::Clean);
        }

        self.run_iacs_clear_sequence()?;
        Ok(ErrorCheck::Cleared)
    }

    pub(crate) fn release_ima(&mut self) -> Result<(), Error<B::Error>> {
        self.masked_write_reg(Reg::MemIntfCfg, IMA_ACCESS_BITS, 0)
    }

    /// One attempt: acquire, configure, transfer, release.
    fn ima_attempt<F>(
        &mut self,
        access: Access,
        address: u16,
        offset: u8,
        len: usize,
        transfer: F,
    ) -> Result<Beats, Error<B::Error>>
    where
        F: FnOnce(&mut Self) -> Result<(), Error<B::Error>>,
    {
        self.wait_for_access_free(access)?;

        let result = self.ima_session(access, address, offset, len, transfer);
        let released = self.release_ima();

        with_release_on_error(result, released)
    }

    fn ima_session<F>(
        &mut self,
        access: Access,
        address: u16,
        offset: u8,
        len: usize,
        transfer: F,
    ) -> Result<Beats, Error<B::Error>>
    where
        F: FnOnce(&mut Self) -> Result<(), Error<B::Error>>,
    {
        self.masked_write_reg(Reg::MemIntfCfg, IMA_ACCESS_BITS, IMA_ACCESS_BITS)?;
        self.configure_ima(access, address, offset, len)?;

        let start = self.beat_count()?;
        transfer(self)?;
        let end = self.beat_count()?;

        Ok(Beats { start, end })
    }

    fn configure_ima(
        &mut self,
        access: Access,
        address: u16,
        offset: u8,
        len: usize,
    ) -> Result<(), Error<B::Error>> {
        let burst =
            self.params.burst_capable && offset as usize + len > self.params.bytes_per_word as usize;

        self.set_access_mode(access, burst)?;
        self.wait_for_iacs_ready()?;
        self.set_ima_address(address)?;

        if access == Access::Read {
            self.wait_for_iacs_ready()?;
        }

        Ok(())
    }

    fn set_access_mode(&mut self, access: Access, burst: bool) -> Result<(), Error<B::Error>> {
        trace!("IMA access mode: {:?} burst: {}", access, burst);

        let mut mode = 0;
        if access == Access::Write {
            mode |= IMA_WR_EN_BIT;
        }
        if burst {
            mode |= MEM_ACS_BURST_BIT;
        }

        self.masked_write_reg(Reg::ImaCtl, IMA_CTL_MASK, mode)
    }

    fn set_ima_address(&mut self, address: u16) -> Result<(), Error<B::Error>> {
        let bytes = self.params.address_bytes(address);
        self.write_lanes(Reg::AddrLsb, 0, &bytes)
    }

    fn beat_count(&mut self) -> Result<u8, Error<B::Error>> {
        Ok(self.read_reg(Reg::BeatCount)? & BEAT_COUNT_MASK)
    }

    fn wait_for_access_free(&mut self, access: Access) -> Result<(), Error<B::Error>> {
        for poll in 0..ACCESS_FREE_POLLS {
            if self.read_reg(Reg::MemIntfCfg)? & MEM_ACCESS_REQ_BIT == 0 {
                return Ok(());
            }

            trace!("Memory access request still pending for {:?}", access);
            if poll + 1 < ACCESS_FREE_POLLS {
                self.delay.delay_ms(ACCESS_FREE_POLL_INTERVAL_MS);
            }
        }

        error!("Memory access request stayed set, {:?} not started", access);
        Err(Error::Busy)
    }

    fn wait_for_iacs_ready(&mut self) -> Result<(), Error<B::Error>> {
        self.delay.delay_us(IACS_READY_SETTLE_US);

        let mut status = 0;
        for poll in 0..IACS_READY_POLLS {
            status = self.read_reg(Reg::ImaOprSts)?;
            if status & IACS_RDY_BIT != 0 {
                return Ok(());
            }

            if poll + 1 < IACS_READY_POLLS {
                self.delay.delay_us(IACS_READY_POLL_INTERVAL_US);
            }
        }

        error!("IACS_RDY not set, opr_sts: {:#x}", status);
        match self.clear_ima_errors(false)? {
            ErrorCheck::Cleared => Err(Error::Hardware),
            ErrorCheck::Clean => Err(Error::Busy),
        }
    }

    /// Error check between words. A cleared error aborts the attempt.
    fn check_transfer_errors(
        &mut self,
        address: u16,
        remaining: usize,
    ) -> Result<(), Error<B::Error>> {
        if self.clear_ima_errors(false)?.needs_retry() {
            warn!(
                "IMA error cleared at address {}, {} bytes left",
                address, remaining
            );
            return Err(Error::Hardware);
        }

        Ok(())
    }

    fn ima_write_words(
        &mut self,
        mut address: u16,
        offset: u8,
        data: &[u8],
    ) -> Result<(), Error<B::Error>> {
        let bytes_per_word = self.params.bytes_per_word as usize;
        let last_lane = self.params.last_lane();
        let mut offset = offset as usize;
        let mut remaining = data;

        while !remaining.is_empty() {
            let count = (bytes_per_word - offset).min(remaining.len());
            let (word, rest) = remaining.split_at(count);
            let byte_enable = byte_enable_mask(offset, count);

            self.write_reg(Reg::ImaByteEn, byte_enable)?;
            self.write_lanes(Reg::WrData0, offset as u8, word)?;

            // Accessing the last lane starts the transaction. Its byte enable
            // bit is clear so the dummy byte is not stored.
            if byte_enable & (1 << last_lane) == 0 {
                self.write_lanes(Reg::WrData0, last_lane, &[0])?;
            }

            remaining = rest;
            offset = 0;
            self.check_transfer_errors(address, remaining.len())?;

            if !self.params.burst_capable && !remaining.is_empty() {
                address += 1;
                self.set_ima_address(address)?;
            }

            self.wait_for_iacs_ready()?;
        }

        Ok(())
    }

    fn ima_read_words(
        &mut self,
        mut address: u16,
        offset: u8,
        buffer: &mut [u8],
    ) -> Result<(), Error<B::Error>> {
        let bytes_per_word = self.params.bytes_per_word as usize;
        let mut offset = offset as usize;
        let mut remaining = buffer;

        while !remaining.is_empty() {
            let count = (bytes_per_word - offset).min(remaining.len());
            let (word, rest) = core::mem::take(&mut remaining).split_at_mut(count);

            self.read_lanes(Reg::RdData0, offset as u8, word)?;

            remaining = rest;
            offset = 0;
            self.check_transfer_errors(address, remaining.len())?;

            if remaining.is_empty() {
                // done, wait for the hardware to go idle
            } else if !self.params.burst_capable {
                address += 1;
                self.set_ima_address(address)?;
            } else if remaining.len() < bytes_per_word {
                // The trailing partial word does not reach the last lane,
                // which would be needed to advance a burst.
                self.set_access_mode(Access::Read, false)?;
            }

            self.wait_for_iacs_ready()?;
        }

        Ok(())
    }

    /// Recovers the IMA state machine from a latched exception.
    ///
    /// Teardown runs even if the body failed, so the clear bit and the access
    /// request never stay asserted.
    fn run_iacs_clear_sequence(&mut self) -> Result<(), Error<B::Error>> {
        let clear_bits = IACS_CLR_BIT | STATIC_CLK_EN_BIT;
        self.masked_write_reg(Reg::ImaCfg, clear_bits, clear_bits)?;

        let result = self.iacs_clear_passes();

        let cleared = self.masked_write_reg(Reg::ImaCfg, IACS_CLR_BIT, 0);
        self.delay.delay_us(CLEAR_BIT_HOLD_US);
        let released = self.release_ima();
        self.delay.delay_us(CLEAR_SEQUENCE_SETTLE_US);

        with_release(result.and(cleared), released)?;
        debug!("IACS clear sequence done");
        Ok(())
    }

    fn iacs_clear_passes(&mut self) -> Result<(), Error<B::Error>> {
        self.set_access_mode(Access::Read, false)?;
        self.masked_write_reg(Reg::MemIntfCfg, IMA_ACCESS_BITS, IMA_ACCESS_BITS)?;
        self.delay.delay_us(CLEAR_SEQUENCE_SETTLE_US);

        let clear_address_msb = self.params.clear_address_msb();
        let last_lane = self.params.last_lane();
        let mut hw_sts = 0;
        let mut exp_sts = 0;

        for _ in 0..CLEAR_SEQUENCE_ITERATIONS {
            self.write_reg(Reg::AddrMsb, clear_address_msb)?;
            self.write_lanes(Reg::WrData0, last_lane, &[0])?;

            let mut dummy = [0];
            self.read_lanes(Reg::RdData0, last_lane, &mut dummy)?;
            self.delay.delay_us(CLEAR_SEQUENCE_SETTLE_US);

            hw_sts = self.read_reg(Reg::ImaHwSts)?;
            if hw_sts != 0 {
                continue;
            }

            exp_sts = self.read_reg(Reg::ImaExpSts)?;
            if exp_sts == 0 {
                return Ok(());
            }
        }

        error!(
            "IACS clear did not settle, hw_sts={:#x} exp_sts={:#x}",
            hw_sts, exp_sts
        );
        Ok(())
    }
}
