//! Address-window bookkeeping and the thin wrappers that map engine
//! addresses onto [`NorFlash`] device offsets.
//!
//! All engine addresses are absolute addresses inside
//! `[props.base, props.base + props.size)`; the device itself is addressed
//! from offset zero. Every helper here skips zero-length operations without
//! touching the device.

use embedded_storage::nor_flash::NorFlash;

use crate::WU_MAX_SIZE;
use crate::error::Error;

/// Properties of the physical NVM behind one [`Ftl`](crate::Ftl) instance.
///
/// `write_size` and `erase_size` are the engine-level granularities. They
/// may be multiples of what the device supports, never less.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NvmProps {
    /// Base address of the NVM window.
    pub base: u32,
    /// Size of the NVM window in bytes.
    pub size: u32,
    /// Program granularity in bytes (at most [`WU_MAX_SIZE`](crate::WU_MAX_SIZE)).
    pub write_size: u32,
    /// Erase granularity in bytes.
    pub erase_size: u32,
}

impl NvmProps {
    /// Whether `addr` falls inside the NVM window. The upper bound is
    /// exclusive.
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    pub(crate) fn contains_range(&self, addr: u32, len: u32) -> bool {
        if !self.contains(addr) {
            return false;
        }
        match (addr - self.base).checked_add(len) {
            Some(end) => end <= self.size,
            None => false,
        }
    }

    fn offset(&self, addr: u32) -> u32 {
        addr - self.base
    }

    /// Largest multiple of `write_size` that fits the copy bounce buffer.
    pub(crate) fn copy_chunk(&self) -> u32 {
        (WU_MAX_SIZE as u32 / self.write_size) * self.write_size
    }
}

pub(crate) fn erase_pages<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    base: u32,
    n_pages: u32,
) -> Result<(), Error<F::Error>> {
    if n_pages == 0 {
        return Ok(());
    }
    let from = props.offset(base);
    let to = from + n_pages * props.erase_size;
    flash.erase(from, to).map_err(Error::Erase)
}

pub(crate) fn program<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    dst: u32,
    src: &[u8],
) -> Result<(), Error<F::Error>> {
    if src.is_empty() {
        return Ok(());
    }
    flash.write(props.offset(dst), src).map_err(Error::Program)
}

pub(crate) fn read<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    dst: &mut [u8],
    src: u32,
) -> Result<(), Error<F::Error>> {
    if dst.is_empty() {
        return Ok(());
    }
    flash.read(props.offset(src), dst).map_err(Error::Read)
}

/// NVM→NVM copy through a bounded stack buffer.
///
/// `dst` must be write-unit aligned and `len` a write-unit multiple; the
/// source may be anywhere in the window and does not overlap the
/// destination (sources and destinations live in different slots).
pub(crate) fn copy<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    dst: u32,
    src: u32,
    len: u32,
) -> Result<(), Error<F::Error>> {
    let mut buf = [0u8; WU_MAX_SIZE];
    let chunk = props.copy_chunk();
    let mut done = 0u32;
    while done < len {
        let n = (len - done).min(chunk) as usize;
        read(flash, props, &mut buf[..n], src + done)?;
        program(flash, props, dst + done, &buf[..n])?;
        done += n as u32;
    }
    Ok(())
}

/// A write source after registry resolution: either caller RAM or a
/// physical NVM address (raw NVM, or an area's current slot).
pub(crate) enum Resolved<'a> {
    Ram(&'a [u8]),
    Phys(u32),
}

/// Read `dst.len()` source bytes starting `src_off` bytes into the source.
pub(crate) fn source_read<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    src: &Resolved<'_>,
    src_off: u32,
    dst: &mut [u8],
) -> Result<(), Error<F::Error>> {
    match src {
        Resolved::Ram(buf) => {
            let at = src_off as usize;
            dst.copy_from_slice(&buf[at..at + dst.len()]);
            Ok(())
        }
        Resolved::Phys(addr) => read(flash, props, dst, addr + src_off),
    }
}

/// Program `len` source bytes (offset `src_off`) to `dst`. Alignment of
/// `dst`/`len` is the caller's responsibility; RAM sources may be
/// misaligned.
pub(crate) fn program_from<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    dst: u32,
    src: &Resolved<'_>,
    src_off: u32,
    len: u32,
) -> Result<(), Error<F::Error>> {
    match src {
        Resolved::Ram(buf) => {
            let at = src_off as usize;
            program(flash, props, dst, &buf[at..at + len as usize])
        }
        Resolved::Phys(addr) => copy(flash, props, dst, addr + src_off, len),
    }
}
