use embedded_hal::delay::DelayNs;
use register_access::RegisterAccess;

use crate::{
    ll::{
        Reg, ADDR_KIND_BIT, ALG_ACTIVE_PEEK_CFG, DMA_CLEAR_LOG_BIT, DMA_READ_ERROR_BIT,
        DMA_WRITE_ERROR_BIT, IACS_INTR_SRC_SLCT_BIT, MEM_ARB_LO_LATENCY_EN_BIT, MEM_CLR_LOG_BIT,
    },
    Error, ErrorCheck, FgMemif,
};

impl<B, D> FgMemif<B, D>
where
    B: RegisterAccess,
    D: DelayNs,
{
    /// Prepares the memory interface for SRAM transactions.
    ///
    /// Does nothing when the battery is missing.
    pub fn initialize(&mut self) -> Result<(), Error<B::Error>> {
        if self.config.battery_missing {
            info!("Battery missing, SRAM interface left unconfigured");
            return Ok(());
        }

        if self.config.use_dma {
            self.init_dma()?;
        } else {
            self.init_ima()?;
        }

        info!("SRAM interface ready ({:?})", self.params.generation);
        Ok(())
    }

    /// Clears the DMA error log if a read or write error was recorded.
    pub fn clear_dma_errors(&mut self) -> Result<ErrorCheck, Error<B::Error>> {
        let status = self.read_reg(Reg::DmaSts)?;
        let error_logged = status & (DMA_WRITE_ERROR_BIT | DMA_READ_ERROR_BIT) != 0;

        let clear = if error_logged { DMA_CLEAR_LOG_BIT } else { 0 };
        self.masked_write_reg(Reg::DmaCtl, DMA_CLEAR_LOG_BIT, clear)?;

        if error_logged {
            warn!("DMA error cleared, dma_sts={:#x}", status);
            Ok(ErrorCheck::Cleared)
        } else {
            Ok(ErrorCheck::Clean)
        }
    }

    fn init_ima(&mut self) -> Result<(), Error<B::Error>> {
        // Signal IACS_RDY instead of the end of the transaction
        self.masked_write_reg(Reg::ImaCfg, IACS_INTR_SRC_SLCT_BIT, IACS_INTR_SRC_SLCT_BIT)?;

        // DMA errors first, they also show up as IMA exceptions
        let _ = self.clear_dma_errors()?;

        // A stuck state machine is expected after reset
        let _ = self.clear_ima_errors(true)?;

        Ok(())
    }

    fn init_dma(&mut self) -> Result<(), Error<B::Error>> {
        let _ = self.clear_dma_errors()?;

        // Address the SRAM by partition
        self.masked_write_reg(Reg::DmaCtl, ADDR_KIND_BIT, ADDR_KIND_BIT)?;

        // The grant may still be held from before a reset
        self.release_dma()?;

        self.masked_write_reg(
            Reg::MemArbCfg,
            MEM_ARB_LO_LATENCY_EN_BIT | MEM_CLR_LOG_BIT,
            MEM_ARB_LO_LATENCY_EN_BIT,
        )?;

        // Route the algorithm active signal to the peek register
        self.write_reg(Reg::PeekMux4, ALG_ACTIVE_PEEK_CFG)?;

        Ok(())
    }
}
