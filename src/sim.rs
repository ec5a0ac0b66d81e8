//! Deterministic in-memory NOR flash for tests and host-side experiments.
//!
//! [`SimNorFlash`] implements the blocking `embedded-storage` traits with
//! the physics that matter to this engine: erase sets whole pages to all
//! ones, programming is bitwise AND (bits only ever clear), and alignment
//! contracts are enforced with assertions. It tracks per-operation
//! statistics, counts erase cycles per page, and can simulate a power cut
//! after a configurable number of mutated bytes — the failure mode the
//! engine is built to survive.

use std::vec::Vec;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

/// Failure injected by [`SimNorFlash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// The armed power-cut budget ran out mid-operation; the operation was
    /// applied partially, byte by byte.
    PowerCut,
}

impl NorFlashError for SimError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

/// In-memory NOR flash with `WRITE_SIZE` program and `ERASE_SIZE` erase
/// granularity. Reads are byte-granular.
pub struct SimNorFlash<const WRITE_SIZE: usize = 1, const ERASE_SIZE: usize = 4096> {
    data: Vec<u8>,
    page_cycles: Vec<u32>,
    bytes_read: usize,
    bytes_programmed: usize,
    bytes_erased: usize,
    read_ops: usize,
    program_ops: usize,
    erase_ops: usize,
    power_cut: Option<u64>,
    cut_hit: bool,
}

impl<const WS: usize, const ES: usize> SimNorFlash<WS, ES> {
    /// Create an erased device (all bits set) of `size` bytes.
    ///
    /// Panics if `size` is not a multiple of `ERASE_SIZE`.
    pub fn new(size: usize) -> Self {
        assert_eq!(0, size % ES);
        let mut data = Vec::new();
        data.resize(size, 0xFF);
        let mut page_cycles = Vec::new();
        page_cycles.resize(size / ES, 0);
        Self {
            data,
            page_cycles,
            bytes_read: 0,
            bytes_programmed: 0,
            bytes_erased: 0,
            read_ops: 0,
            program_ops: 0,
            erase_ops: 0,
            power_cut: None,
            cut_hit: false,
        }
    }

    /// Total capacity in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Raw contents, for white-box inspection.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Bytes read since the last stats reset.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Bytes programmed since the last stats reset.
    pub fn bytes_programmed(&self) -> usize {
        self.bytes_programmed
    }

    /// Bytes erased since the last stats reset.
    pub fn bytes_erased(&self) -> usize {
        self.bytes_erased
    }

    /// Bytes mutated (programmed + erased) since the last stats reset; the
    /// unit the power-cut budget is expressed in.
    pub fn mutation_bytes(&self) -> u64 {
        (self.bytes_programmed + self.bytes_erased) as u64
    }

    /// Number of program operations since the last stats reset.
    pub fn program_ops(&self) -> usize {
        self.program_ops
    }

    /// Number of erase operations since the last stats reset.
    pub fn erase_ops(&self) -> usize {
        self.erase_ops
    }

    /// Number of read operations since the last stats reset.
    pub fn read_ops(&self) -> usize {
        self.read_ops
    }

    /// Per-page erase cycle counters, for wear analysis.
    pub fn page_erase_cycles(&self) -> &[u32] {
        &self.page_cycles
    }

    /// Clear all counters. Contents are untouched.
    pub fn reset_stats(&mut self) {
        self.bytes_read = 0;
        self.bytes_programmed = 0;
        self.bytes_erased = 0;
        self.read_ops = 0;
        self.program_ops = 0;
        self.erase_ops = 0;
        self.page_cycles.fill(0);
    }

    /// Fail with [`SimError::PowerCut`] once `budget` more bytes have been
    /// mutated. The failing operation is applied partially, byte by byte,
    /// so every byte-granular tear point is reachable.
    pub fn arm_power_cut(&mut self, budget: u64) {
        self.power_cut = Some(budget);
        self.cut_hit = false;
    }

    /// Disarm the power cut; the partially applied state is kept.
    pub fn disarm_power_cut(&mut self) {
        self.power_cut = None;
    }

    /// Whether an armed power cut has fired.
    pub fn power_cut_hit(&self) -> bool {
        self.cut_hit
    }

    fn take_budget(&mut self, wanted: usize) -> (usize, bool) {
        match self.power_cut {
            None => (wanted, false),
            Some(remaining) => {
                let allowed = remaining.min(wanted as u64) as usize;
                self.power_cut = Some(remaining - allowed as u64);
                let cut = allowed < wanted;
                if cut {
                    self.cut_hit = true;
                }
                (allowed, cut)
            }
        }
    }
}

impl<const WS: usize, const ES: usize> ErrorType for SimNorFlash<WS, ES> {
    type Error = SimError;
}

impl<const WS: usize, const ES: usize> ReadNorFlash for SimNorFlash<WS, ES> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset as usize + bytes.len() <= self.data.len());

        bytes.copy_from_slice(&self.data[offset as usize..offset as usize + bytes.len()]);
        self.bytes_read += bytes.len();
        self.read_ops += 1;
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl<const WS: usize, const ES: usize> NorFlash for SimNorFlash<WS, ES> {
    const WRITE_SIZE: usize = WS;
    const ERASE_SIZE: usize = ES;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert_eq!(0, from % ES as u32);
        assert_eq!(0, to % ES as u32);
        assert!(from <= to);
        assert!((to as usize) <= self.data.len());

        let span = (to - from) as usize;
        let (allowed, cut) = self.take_budget(span);
        for page in (from as usize..from as usize + allowed).step_by(ES) {
            // a page counts as cycled as soon as the cut reaches into it
            self.page_cycles[page / ES] += 1;
        }
        self.data[from as usize..from as usize + allowed].fill(0xFF);
        self.bytes_erased += allowed;
        self.erase_ops += 1;
        if cut {
            return Err(SimError::PowerCut);
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset as usize + bytes.len() <= self.data.len());
        assert_eq!(0, offset % WS as u32);
        assert_eq!(0, bytes.len() % WS);

        let (allowed, cut) = self.take_budget(bytes.len());
        for (i, byte) in bytes[..allowed].iter().enumerate() {
            // NOR programming only clears bits
            self.data[offset as usize + i] &= byte;
        }
        self.bytes_programmed += allowed;
        self.program_ops += 1;
        if cut {
            return Err(SimError::PowerCut);
        }
        Ok(())
    }
}
