//! Register level model of the fuel gauge memory interface, for tests.
//!
//! The model keeps a flat register file and an SRAM array reachable through
//! both the IMA staging registers and the DMA partition windows. Knobs make
//! the hardware misbehave; counters record what the driver asked for.

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use register_access::RegisterAccess;

use crate::{
    ll::*,
    partition::Partition,
    FgMemif, MemifConfig, SramParams,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusFault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Read { address: u16, len: usize },
    Write { address: u16, len: usize },
    Masked { address: u16, mask: u8, value: u8 },
}

/// Beat counter value reported once the scripted values ran out.
const IDLE_BEAT_COUNT: u8 = 0x05;

pub struct SimFuelGauge {
    map: RegisterMap,
    params: SramParams,
    registers: Vec<u8>,
    pub sram: Vec<u8>,
    ima_address: u16,
    write_latch: [u8; 4],

    pub ops: Vec<Op>,
    /// Fail the bus operation with this index.
    pub fail_at: Option<usize>,

    /// `MEM_ACCESS_REQ` reads back as set.
    pub access_stuck: bool,
    /// `IACS_RDY` never sets.
    pub never_ready: bool,
    pub never_grant: bool,
    /// Number of peek reads still reporting the algorithm as active.
    pub alg_active_reads: usize,
    /// Values returned by successive beat counter reads.
    pub beats: VecDeque<u8>,
    pub hw_sts: u8,
    pub exp_sts: u8,
    /// The clear sequence does not clear the exception latches.
    pub sticky_errors: bool,
    pub dma_sts: u8,

    pub access_requests: usize,
    pub access_releases: usize,
    pub arb_requests: usize,
    pub arb_releases: usize,
    pub clear_sequences: usize,
    pub dma_log_clears: usize,
    pub dma_transfers: Vec<(u16, usize)>,
}

impl SimFuelGauge {
    pub fn new(config: &MemifConfig) -> Self {
        let params = SramParams::new(config);
        let sram_len = 512 * params.bytes_per_word as usize;

        Self {
            map: config.registers,
            params,
            registers: vec![0; 0x1_0000],
            sram: (0..sram_len).map(|i| (i % 251) as u8).collect(),
            ima_address: 0,
            write_latch: [0; 4],

            ops: Vec::new(),
            fail_at: None,

            access_stuck: false,
            never_ready: false,
            never_grant: false,
            alg_active_reads: 0,
            beats: VecDeque::new(),
            hw_sts: 0,
            exp_sts: 0,
            sticky_errors: false,
            dma_sts: 0,

            access_requests: 0,
            access_releases: 0,
            arb_requests: 0,
            arb_releases: 0,
            clear_sequences: 0,
            dma_log_clears: 0,
            dma_transfers: Vec::new(),
        }
    }

    /// Raw register file content.
    pub fn register(&self, reg: Reg) -> u8 {
        self.registers[self.map.address(reg) as usize]
    }

    pub fn set_register(&mut self, reg: Reg, value: u8) {
        self.registers[self.map.address(reg) as usize] = value;
    }

    /// Bytes of `len` starting at `offset` of SRAM word `word`.
    pub fn sram_bytes(&self, word: u16, offset: u8, len: usize) -> &[u8] {
        let start = word as usize * self.params.bytes_per_word as usize + offset as usize;
        &self.sram[start..start + len]
    }

    pub fn count_reads(&self, reg: Reg) -> usize {
        let address = self.map.address(reg);
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Read { address: a, .. } if *a == address))
            .count()
    }

    pub fn count_writes(&self, reg: Reg) -> usize {
        let address = self.map.address(reg);
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Write { address: a, .. } if *a == address))
            .count()
    }

    /// Both access request bits are deasserted.
    pub fn is_idle(&self) -> bool {
        self.register(Reg::MemIntfCfg) & (MEM_ACCESS_REQ_BIT | IACS_SLCT_BIT) == 0
            && self.register(Reg::MemArbCfg) & MEM_ARB_REQ_BIT == 0
    }

    fn granted(&self) -> bool {
        !self.never_grant
            && self.register(Reg::MemArbCfg) & MEM_ARB_REQ_BIT != 0
            && self.register(Reg::MemIntfCfg) & MEM_ACCESS_REQ_BIT != 0
    }

    fn burst(&self) -> bool {
        self.register(Reg::ImaCtl) & MEM_ACS_BURST_BIT != 0
    }

    fn lane(&self, address: u16, reg: Reg) -> Option<u8> {
        let base = self.map.address(reg);
        (address >= base && address < base + self.params.bytes_per_word as u16)
            .then(|| (address - base) as u8)
    }

    fn window(&self, address: u16) -> Option<usize> {
        let bytes_per_word = self.params.bytes_per_word as usize;
        self.params
            .layout
            .partitions()
            .iter()
            .find_map(|partition: &Partition| {
                let size = partition.words() as usize * bytes_per_word;
                let relative = address.checked_sub(partition.base)? as usize;
                (relative < size).then(|| partition.start as usize * bytes_per_word + relative)
            })
    }

    fn ima_index(&self, lane: u8) -> usize {
        self.ima_address as usize * self.params.bytes_per_word as usize + lane as usize
    }

    fn record(&mut self, op: Op) -> Result<(), BusFault> {
        let index = self.ops.len();
        self.ops.push(op);
        if self.fail_at == Some(index) {
            return Err(BusFault);
        }
        Ok(())
    }

    fn read_byte(&mut self, address: u16) -> u8 {
        let raw = self.registers[address as usize];
        let map = self.map;

        if address == map.address(Reg::MemIntfCfg) && self.access_stuck {
            raw | MEM_ACCESS_REQ_BIT
        } else if address == map.address(Reg::ImaOprSts) {
            if self.never_ready {
                0
            } else {
                IACS_RDY_BIT
            }
        } else if address == map.address(Reg::ImaExpSts) {
            self.exp_sts
        } else if address == map.address(Reg::ImaHwSts) {
            self.hw_sts
        } else if address == map.address(Reg::BeatCount) {
            self.beats.pop_front().unwrap_or(IDLE_BEAT_COUNT)
        } else if address == map.address(Reg::IntRtSts) {
            if self.granted() {
                self.params.grant_bit()
            } else {
                0
            }
        } else if address == map.address(Reg::PeekRd) {
            if self.alg_active_reads > 0 {
                self.alg_active_reads -= 1;
                ALG_ACTIVE_BIT
            } else {
                0
            }
        } else if address == map.address(Reg::DmaSts) {
            self.dma_sts
        } else if let Some(lane) = self.lane(address, Reg::RdData0) {
            let value = self.sram.get(self.ima_index(lane)).copied().unwrap_or(0);
            if lane == self.params.last_lane() && self.burst() {
                self.ima_address += 1;
            }
            value
        } else if let Some(index) = self.window(address) {
            assert!(self.granted(), "DMA window read without a grant");
            self.sram[index]
        } else {
            raw
        }
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        let map = self.map;
        self.registers[address as usize] = value;

        if address == map.address(Reg::AddrLsb) || address == map.address(Reg::AddrMsb) {
            self.ima_address =
                u16::from_le_bytes([self.register(Reg::AddrLsb), self.register(Reg::AddrMsb)]);
        } else if address == map.address(Reg::DmaCtl) && value & DMA_CLEAR_LOG_BIT != 0 {
            self.dma_sts = 0;
            self.dma_log_clears += 1;
        } else if let Some(lane) = self.lane(address, Reg::WrData0) {
            self.write_latch[lane as usize] = value;
            if lane == self.params.last_lane() {
                self.start_write_transaction();
            }
        } else if let Some(index) = self.window(address) {
            assert!(self.granted(), "DMA window written without a grant");
            self.sram[index] = value;
        }
    }

    fn start_write_transaction(&mut self) {
        if self.register(Reg::ImaCfg) & IACS_CLR_BIT != 0 {
            if !self.sticky_errors {
                self.hw_sts = 0;
                self.exp_sts = 0;
            }
            return;
        }

        if self.register(Reg::ImaCtl) & IMA_WR_EN_BIT == 0 {
            return;
        }

        let byte_enable = self.register(Reg::ImaByteEn);
        for lane in 0..self.params.bytes_per_word {
            if byte_enable & (1 << lane) != 0 {
                let index = self.ima_index(lane);
                if let Some(byte) = self.sram.get_mut(index) {
                    *byte = self.write_latch[lane as usize];
                }
            }
        }

        if self.burst() {
            self.ima_address += 1;
        }
    }
}

impl RegisterAccess for SimFuelGauge {
    type Error = BusFault;

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.record(Op::Read {
            address,
            len: buffer.len(),
        })?;

        if self.window(address).is_some() {
            self.dma_transfers.push((address, buffer.len()));
        }

        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.read_byte(address + i as u16);
        }
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        self.record(Op::Write {
            address,
            len: data.len(),
        })?;

        if self.window(address).is_some() {
            self.dma_transfers.push((address, data.len()));
        }

        for (i, byte) in data.iter().enumerate() {
            self.write_byte(address + i as u16, *byte);
        }
        Ok(())
    }

    fn masked_write(&mut self, address: u16, mask: u8, value: u8) -> Result<(), Self::Error> {
        let map = self.map;
        if address == map.address(Reg::MemIntfCfg) && mask & MEM_ACCESS_REQ_BIT != 0 {
            if value & MEM_ACCESS_REQ_BIT != 0 {
                self.access_requests += 1;
            } else {
                self.access_releases += 1;
            }
        } else if address == map.address(Reg::MemArbCfg) && mask & MEM_ARB_REQ_BIT != 0 {
            if value & MEM_ARB_REQ_BIT != 0 {
                self.arb_requests += 1;
            } else {
                self.arb_releases += 1;
            }
        } else if address == map.address(Reg::ImaCfg) && mask & value & IACS_CLR_BIT != 0 {
            self.clear_sequences += 1;
        }

        self.record(Op::Masked {
            address,
            mask,
            value,
        })?;

        let current = self.registers[address as usize];
        self.write_byte(address, (current & !mask) | (value & mask));
        Ok(())
    }
}

/// Delay that returns immediately and adds up what was requested.
#[derive(Default)]
pub struct RecordingDelay {
    pub total_ns: u64,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}

pub fn init_logging() {
    #[cfg(feature = "log")]
    {
        let _ = simple_logger::SimpleLogger::new().init();
    }
}

pub type SimMemif = FgMemif<SimFuelGauge, RecordingDelay>;

pub fn memif(config: MemifConfig) -> SimMemif {
    init_logging();
    FgMemif::new(SimFuelGauge::new(&config), RecordingDelay::default(), config)
}

/// Counts the bus operations of a run on a fresh simulator.
pub fn clean_op_count(config: MemifConfig, run: impl FnOnce(&mut SimMemif)) -> usize {
    let mut memif = memif(config);
    run(&mut memif);
    memif.inner().ops.len()
}
