//! The area engine: lazy slot election, logical→physical translation and
//! the copy-on-write basic write path.
//!
//! An area is `n_slots >= 2` equal slots; exactly one holds the latest
//! committed data. Updates stage a full new image in the next slot and
//! commit by stamping its metadata footer, which atomically moves the
//! "current" designation. Interrupting any operation at any instant leaves
//! either the previous committed state or the new one observable on the
//! next mount.

use embedded_storage::nor_flash::NorFlash;

use crate::WU_MAX_SIZE;
use crate::checksum;
use crate::error::Error;
use crate::layout::Geometry;
use crate::meta::{self, ERASED_VERSION, SlotMeta};
use crate::nvm::{self, NvmProps, Resolved};

/// Descriptor of one area, supplied by the host at registration.
///
/// `area` is the absolute base address (aligned to erase pages), `area_size`
/// the total reserved range and `data_size` the logical payload size. The
/// ratio of `area_size` to the derived slot size is the wear-leveling
/// factor; it must be at least 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AreaConfig {
    /// Base address of the area.
    pub area: u32,
    /// Total size of the area in bytes.
    pub area_size: u32,
    /// Size of the logical data window in bytes.
    pub data_size: u32,
}

/// Runtime state of one registered area.
pub(crate) struct Area<'t> {
    pub geo: Geometry,
    /// Index of the current slot; `None` until the first mount.
    pub current: Option<u32>,
    /// Transaction tracker; `Some` while a transaction is active.
    pub tracker: Option<&'t mut [u8]>,
}

/// Elect the current slot, repairing a torn `checksum₂` if needed.
///
/// Runs lazily: a no-op when the slot cache is already valid.
pub(crate) fn mount<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
) -> Result<u32, Error<F::Error>> {
    if let Some(current) = area.current {
        return Ok(current);
    }
    let geo = area.geo;

    // any two slots sharing a non-erased version is corruption
    for i in 0..geo.n_slots {
        let vi = meta::read_meta(flash, props, &geo, i)?.version;
        if vi == ERASED_VERSION {
            continue;
        }
        for j in i + 1..geo.n_slots {
            if meta::read_meta(flash, props, &geo, j)?.version == vi {
                return Err(Error::VersionCollision);
            }
        }
    }

    // elect the highest version that passes the integrity check; a corrupt
    // higher slot loses to an intact lower one
    let mut elected: Option<(u32, SlotMeta)> = None;
    for i in 0..geo.n_slots {
        let m = meta::read_meta(flash, props, &geo, i)?;
        if m.version == ERASED_VERSION {
            continue;
        }
        if let Some((_, best)) = elected {
            if m.version <= best.version {
                continue;
            }
        }
        let digest =
            checksum::slot_digest(flash, props, geo.slot_base(i), geo.data_size, m.version)?;
        if digest == m.checksum {
            elected = Some((i, m));
        }
    }
    let Some((index, m)) = elected else {
        return Err(Error::NoValidVersion);
    };

    if m.checksum2 != m.checksum {
        // torn between the checksum and checksum₂ programs; the data and
        // checksum are complete, so finish the footer
        meta::repair_checksum2(flash, props, &geo, index, m.checksum)?;
    }
    area.current = Some(index);
    Ok(index)
}

/// Logical address → physical address in the current slot, mounting first
/// when necessary.
pub(crate) fn translate<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
    addr: u32,
    len: u32,
) -> Result<u32, Error<F::Error>> {
    let offset = data_offset(&area.geo, addr, len)?;
    let current = mount(flash, props, area)?;
    Ok(area.geo.slot_base(current) + offset)
}

/// Bounds-check `addr..addr+len` against the data window and return the
/// logical offset.
pub(crate) fn data_offset<E>(geo: &Geometry, addr: u32, len: u32) -> Result<u32, Error<E>> {
    if !geo.contains_data(addr) {
        return Err(Error::FirstNotInData);
    }
    let offset = addr - geo.area;
    let end = offset.checked_add(len).ok_or(Error::LastNotInData)?;
    if end > geo.data_size {
        return Err(Error::LastNotInData);
    }
    Ok(offset)
}

/// Read committed data, ignoring any in-flight transaction.
pub(crate) fn read_current<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
    dst: &mut [u8],
    src: u32,
) -> Result<(), Error<F::Error>> {
    if dst.is_empty() {
        return Ok(());
    }
    let phys = translate(flash, props, area, src, dst.len() as u32)?;
    nvm::read(flash, props, dst, phys)
}

pub(crate) fn erase_slot<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    geo: &Geometry,
    slot: u32,
) -> Result<(), Error<F::Error>> {
    nvm::erase_pages(flash, props, geo.slot_base(slot), geo.pages_per_slot())
}

/// Compute the digest of a fully staged slot and program its footer.
pub(crate) fn stamp_slot<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    geo: &Geometry,
    slot: u32,
    version: u32,
) -> Result<(), Error<F::Error>> {
    let digest =
        checksum::slot_digest(flash, props, geo.slot_base(slot), geo.data_size, version)?;
    meta::write_meta(
        flash,
        props,
        geo,
        slot,
        &SlotMeta {
            version,
            checksum: digest,
            checksum2: digest,
        },
    )
}

/// Program the write units touched by `[offset, end)` into the staging
/// slot, splicing partially covered head/tail units against the current
/// slot.
///
/// Shared by the basic path and the transactional path; the caller decides
/// what surrounds it (erase, prefix/suffix copies, stamping, tracking).
pub(crate) fn write_span<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    geo: &Geometry,
    current_base: u32,
    staging_base: u32,
    offset: u32,
    end: u32,
    src: &Resolved<'_>,
) -> Result<(), Error<F::Error>> {
    let ws = geo.write_size;
    let mut wu = [0u8; WU_MAX_SIZE];
    let mut pos = offset;
    let mut src_off = 0u32;

    if pos % ws != 0 {
        // head splice; also covers a write confined to a single unit
        let wu_base = pos - pos % ws;
        let in_wu = (pos - wu_base) as usize;
        let take = (ws - pos % ws).min(end - pos);
        nvm::read(flash, props, &mut wu[..ws as usize], current_base + wu_base)?;
        nvm::source_read(flash, props, src, src_off, &mut wu[in_wu..in_wu + take as usize])?;
        nvm::program(flash, props, staging_base + wu_base, &wu[..ws as usize])?;
        pos += take;
        src_off += take;
    }

    let interior_end = end - end % ws;
    if pos < interior_end {
        nvm::program_from(flash, props, staging_base + pos, src, src_off, interior_end - pos)?;
        src_off += interior_end - pos;
        pos = interior_end;
    }

    if pos < end {
        // tail splice; `pos` is aligned here
        let take = (end - pos) as usize;
        nvm::read(flash, props, &mut wu[..ws as usize], current_base + pos)?;
        nvm::source_read(flash, props, src, src_off, &mut wu[..take])?;
        nvm::program(flash, props, staging_base + pos, &wu[..ws as usize])?;
    }
    Ok(())
}

/// The copy-on-write basic write path.
///
/// Erases the next slot, mirrors the untouched prefix and suffix from the
/// current slot, programs the new bytes, stamps `version + 1` and installs
/// the next slot as current. Any tear before the final checksum program
/// leaves the previous slot elected on the next mount.
pub(crate) fn basic_write<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
    dst: u32,
    src: &Resolved<'_>,
    len: u32,
    allow_unaligned: bool,
) -> Result<(), Error<F::Error>> {
    if len == 0 {
        return Ok(());
    }
    if area.tracker.is_some() {
        return Err(Error::TransactionOngoing);
    }
    let geo = area.geo;
    let ws = geo.write_size;
    let offset = data_offset(&geo, dst, len)?;
    if !allow_unaligned {
        if offset % ws != 0 {
            return Err(Error::BaseMisaligned);
        }
        if len % ws != 0 {
            return Err(Error::SizeMisaligned);
        }
    }
    let current = mount(flash, props, area)?;
    let next = geo.next_slot(current);
    if next == current {
        return Err(Error::Internal);
    }
    let current_base = geo.slot_base(current);
    let next_base = geo.slot_base(next);
    let end = offset + len;
    let head = offset - offset % ws;
    let tail = end.div_ceil(ws) * ws;

    erase_slot(flash, props, &geo, next)?;
    nvm::copy(flash, props, next_base, current_base, head)?;
    write_span(flash, props, &geo, current_base, next_base, offset, end, src)?;
    nvm::copy(
        flash,
        props,
        next_base + tail,
        current_base + tail,
        geo.data_phy_end().saturating_sub(tail),
    )?;

    let version = meta::read_meta(flash, props, &geo, current)?.version;
    stamp_slot(flash, props, &geo, next, version.wrapping_add(1))?;
    area.current = Some(next);
    Ok(())
}

/// Logical erase of the whole data window through the copy-on-write path:
/// the next slot is erased, nothing is copied into it, and a new version is
/// stamped over the all-erased payload.
pub(crate) fn erase_all<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
) -> Result<(), Error<F::Error>> {
    if area.tracker.is_some() {
        return Err(Error::TransactionOngoing);
    }
    let geo = area.geo;
    let current = mount(flash, props, area)?;
    let next = geo.next_slot(current);
    erase_slot(flash, props, &geo, next)?;
    let version = meta::read_meta(flash, props, &geo, current)?.version;
    stamp_slot(flash, props, &geo, next, version.wrapping_add(1))?;
    area.current = Some(next);
    Ok(())
}

/// One-shot provisioning of a blank area. NOT tearing-safe.
///
/// Erases every page of the area and stamps slot 0 with version 1. Any
/// active transaction is abandoned.
pub(crate) fn format<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
) -> Result<(), Error<F::Error>> {
    area.tracker = None;
    area.current = None;
    let geo = area.geo;
    nvm::erase_pages(flash, props, geo.area, geo.area_size / geo.erase_size)?;
    stamp_slot(flash, props, &geo, 0, 1)?;
    area.current = Some(0);
    Ok(())
}
