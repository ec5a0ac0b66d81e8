//! Slot metadata footer codec.
//!
//! Each slot ends with three metadata items (`version`, `checksum`,
//! `checksum₂`), each stored in its own write-unit-sized cell so the items
//! can be programmed independently. Items are little-endian `u32` in the
//! low 4 bytes of their cell; remaining cell bytes are programmed to zero
//! when the cell is written and stay erased otherwise.

use embedded_storage::nor_flash::NorFlash;

use crate::WU_MAX_SIZE;
use crate::error::Error;
use crate::layout::Geometry;
use crate::nvm::{self, NvmProps};

/// Version value of an erased slot.
pub const ERASED_VERSION: u32 = 0xFFFF_FFFF;

const META_BUF: usize = 3 * WU_MAX_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotMeta {
    pub version: u32,
    pub checksum: u32,
    pub checksum2: u32,
}

pub(crate) fn read_meta<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    geo: &Geometry,
    slot: u32,
) -> Result<SlotMeta, Error<F::Error>> {
    let cell = geo.meta_cell() as usize;
    let len = geo.meta_phy_size() as usize;
    let mut buf = [0u8; META_BUF];
    nvm::read(
        flash,
        props,
        &mut buf[..len],
        geo.slot_base(slot) + geo.meta_offset(),
    )?;
    let item = |i: usize| {
        let at = i * cell;
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    };
    Ok(SlotMeta {
        version: item(0),
        checksum: item(1),
        checksum2: item(2),
    })
}

/// Program a freshly erased footer.
///
/// `(version, checksum)` go out in one program operation and `checksum₂` in
/// a second one, in that order. A tear between the two phases leaves
/// `checksum₂ ≠ checksum`, which mount detects and repairs; a tear inside
/// the first phase leaves the version erased or the checksum wrong, so slot
/// selection keeps the previous slot.
pub(crate) fn write_meta<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    geo: &Geometry,
    slot: u32,
    meta: &SlotMeta,
) -> Result<(), Error<F::Error>> {
    let cell = geo.meta_cell() as usize;
    let mut buf = [0u8; META_BUF];
    buf[..4].copy_from_slice(&meta.version.to_le_bytes());
    buf[cell..cell + 4].copy_from_slice(&meta.checksum.to_le_bytes());
    buf[2 * cell..2 * cell + 4].copy_from_slice(&meta.checksum2.to_le_bytes());
    let base = geo.slot_base(slot) + geo.meta_offset();
    nvm::program(flash, props, base, &buf[..2 * cell])?;
    nvm::program(flash, props, base + 2 * cell as u32, &buf[2 * cell..3 * cell])
}

/// Finish a footer torn between the `checksum` and `checksum₂` programs.
///
/// Only the `checksum₂` cell is reprogrammed; the elected slot's `checksum`
/// already matched the recomputed digest, so the rest of the footer is
/// known good.
pub(crate) fn repair_checksum2<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    geo: &Geometry,
    slot: u32,
    checksum: u32,
) -> Result<(), Error<F::Error>> {
    let cell = geo.meta_cell() as usize;
    let mut buf = [0u8; WU_MAX_SIZE];
    buf[..4].copy_from_slice(&checksum.to_le_bytes());
    let at = geo.slot_base(slot) + geo.meta_offset() + 2 * cell as u32;
    nvm::program(flash, props, at, &buf[..cell])
}
