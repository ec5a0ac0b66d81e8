//! The transaction engine: staging several writes into the next slot and
//! committing them as one version bump.
//!
//! The caller-owned tracker bitmap records which write units the
//! transaction has touched. No write unit is ever programmed twice between
//! two erases, which keeps the protocol valid on media that forbid
//! reprogramming; the tracker enforces it by rejecting overlapping writes.

use embedded_storage::nor_flash::NorFlash;

use crate::area::{self, Area};
use crate::error::Error;
use crate::layout::tracker_len;
use crate::meta;
use crate::nvm::{self, NvmProps, Resolved};

fn bit(tracker: &[u8], wu: u32) -> bool {
    tracker[(wu / 8) as usize] & (1 << (wu % 8)) != 0
}

fn set_bit(tracker: &mut [u8], wu: u32) {
    tracker[(wu / 8) as usize] |= 1 << (wu % 8);
}

/// Begin a transaction on `area`, staging into the next slot.
///
/// The tracker buffer is owned by the caller and must stay available until
/// commit or abort. The next slot is erased here; the current slot's
/// contents are mirrored at commit time, not now.
pub(crate) fn start<'t, F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'t>,
    tracker: &'t mut [u8],
) -> Result<(), Error<F::Error>> {
    if area.tracker.is_some() {
        return Err(Error::TransactionOngoing);
    }
    let geo = area.geo;
    if tracker.len() < tracker_len(geo.data_size, geo.write_size) {
        return Err(Error::TrackerTooSmall);
    }
    let current = area::mount(flash, props, area)?;
    tracker.fill(0);
    area::erase_slot(flash, props, &geo, geo.next_slot(current))?;
    area.tracker = Some(tracker);
    Ok(())
}

/// Stage a write into the next slot.
///
/// Every touched write unit is checked against the tracker and marked;
/// touching a unit twice fails with [`Error::TransactionOverwrite`] before
/// anything is programmed.
pub(crate) fn write<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
    dst: u32,
    src: &Resolved<'_>,
    len: u32,
    allow_unaligned: bool,
) -> Result<(), Error<F::Error>> {
    if area.tracker.is_none() {
        return Err(Error::NoTransaction);
    }
    if len == 0 {
        return Ok(());
    }
    let geo = area.geo;
    let ws = geo.write_size;
    let offset = area::data_offset(&geo, dst, len)?;
    if !allow_unaligned {
        if offset % ws != 0 {
            return Err(Error::BaseMisaligned);
        }
        if len % ws != 0 {
            return Err(Error::SizeMisaligned);
        }
    }
    let current = area::mount(flash, props, area)?;
    let end = offset + len;
    let first_wu = offset / ws;
    let last_wu = (end - 1) / ws;
    {
        let Some(tracker) = area.tracker.as_deref_mut() else {
            return Err(Error::Internal);
        };
        for wu in first_wu..=last_wu {
            if bit(tracker, wu) {
                return Err(Error::TransactionOverwrite);
            }
        }
        for wu in first_wu..=last_wu {
            set_bit(tracker, wu);
        }
    }
    let next = geo.next_slot(current);
    area::write_span(
        flash,
        props,
        &geo,
        geo.slot_base(current),
        geo.slot_base(next),
        offset,
        end,
        src,
    )
}

/// Read the in-flight view: staged write units from the next slot,
/// everything else from the current slot.
///
/// Supports arbitrary byte ranges; a partially covered head or tail unit
/// reads the chosen slot's bytes directly.
pub(crate) fn read_staged<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
    dst: &mut [u8],
    src: u32,
) -> Result<(), Error<F::Error>> {
    if area.tracker.is_none() {
        return Err(Error::NoTransaction);
    }
    if dst.is_empty() {
        return Ok(());
    }
    let geo = area.geo;
    let ws = geo.write_size;
    let len = dst.len() as u32;
    let offset = area::data_offset(&geo, src, len)?;
    let current = area::mount(flash, props, area)?;
    let next = geo.next_slot(current);
    let Some(tracker) = area.tracker.as_deref() else {
        return Err(Error::Internal);
    };
    let end = offset + len;
    let mut pos = offset;
    while pos < end {
        let wu = pos / ws;
        let wu_end = ((wu + 1) * ws).min(end);
        let slot = if bit(tracker, wu) { next } else { current };
        let chunk = &mut dst[(pos - offset) as usize..(wu_end - offset) as usize];
        nvm::read(flash, props, chunk, geo.slot_base(slot) + pos)?;
        pos = wu_end;
    }
    Ok(())
}

/// Dispatch between the committed and the in-flight view.
pub(crate) fn read_newer<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'_>,
    dst: &mut [u8],
    src: u32,
) -> Result<(), Error<F::Error>> {
    if area.tracker.is_some() {
        read_staged(flash, props, area, dst, src)
    } else {
        area::read_current(flash, props, area, dst, src)
    }
}

/// Commit: mirror every untouched write unit from the current slot, stamp
/// the new version and install the staging slot as current.
///
/// The version is incremented once per transaction, regardless of how many
/// writes it contained. The tracker loan is handed back for reuse.
pub(crate) fn commit<'t, F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    area: &mut Area<'t>,
) -> Result<&'t mut [u8], Error<F::Error>> {
    if area.tracker.is_none() {
        return Err(Error::NoTransaction);
    }
    let geo = area.geo;
    let ws = geo.write_size;
    let current = area::mount(flash, props, area)?;
    let next = geo.next_slot(current);
    let current_base = geo.slot_base(current);
    let next_base = geo.slot_base(next);
    {
        let Some(tracker) = area.tracker.as_deref() else {
            return Err(Error::Internal);
        };
        // copy untouched units in runs to keep the program calls large
        let n_wu = geo.n_write_units();
        let mut wu = 0u32;
        while wu < n_wu {
            if bit(tracker, wu) {
                wu += 1;
                continue;
            }
            let run_start = wu;
            while wu < n_wu && !bit(tracker, wu) {
                wu += 1;
            }
            let at = run_start * ws;
            nvm::copy(
                flash,
                props,
                next_base + at,
                current_base + at,
                (wu - run_start) * ws,
            )?;
        }
    }
    let version = meta::read_meta(flash, props, &geo, current)?.version;
    area::stamp_slot(flash, props, &geo, next, version.wrapping_add(1))?;
    area.current = Some(next);
    area.tracker.take().ok_or(Error::Internal)
}

/// Abort: forget the tracker and hand its loan back. The partially staged
/// slot is left as is and will be erased by the next operation that needs
/// it.
pub(crate) fn abort<'t>(area: &mut Area<'t>) -> Option<&'t mut [u8]> {
    area.tracker.take()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_addressing() {
        let mut t = [0u8; 2];
        assert!(!bit(&t, 0));
        set_bit(&mut t, 0);
        set_bit(&mut t, 9);
        assert!(bit(&t, 0));
        assert!(bit(&t, 9));
        assert!(!bit(&t, 8));
        assert_eq!(t, [0x01, 0x02]);
    }
}
