//! The area registry and public API façade.
//!
//! [`Ftl`] owns the flash device and every registered area, which is what
//! lets the write path source data from another area's current slot without
//! RAM buffering, and what pins the whole engine to one thread of control.

use embedded_storage::nor_flash::NorFlash;

use crate::WU_MAX_SIZE;
use crate::area::{self, Area, AreaConfig};
use crate::error::Error;
use crate::layout::Geometry;
use crate::nvm::{self, NvmProps, Resolved};
use crate::transaction;

/// Handle to a registered area. Only valid for the [`Ftl`] that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AreaId(usize);

/// Result of an address lookup, in lookup order: managed areas win over the
/// raw NVM window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Lookup {
    /// The address falls inside a registered area's data window.
    Area(AreaId),
    /// Inside the NVM window but outside every area.
    RawNvm,
    /// Outside the NVM window.
    Outside,
}

/// A write source: caller RAM, or an NVM address.
///
/// An NVM address inside a registered area's data window is a *logical*
/// address; the engine resolves it to that area's current slot before
/// copying, so cross-area copies always see committed data.
pub enum Source<'a> {
    /// Bytes in volatile memory.
    Ram(&'a [u8]),
    /// `len` bytes at an absolute NVM address.
    Nvm { addr: u32, len: u32 },
}

impl Source<'_> {
    fn len(&self) -> u32 {
        match self {
            Source::Ram(buf) => buf.len() as u32,
            Source::Nvm { len, .. } => *len,
        }
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(buf: &'a [u8]) -> Self {
        Source::Ram(buf)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Source<'a> {
    fn from(buf: &'a [u8; N]) -> Self {
        Source::Ram(buf)
    }
}

/// The engine: one NVM device, up to `MAX_AREAS` tearing-safe areas.
///
/// All operations take `&mut self`; the engine is single-threaded and never
/// blocks outside the flash driver. `'t` is the lifetime of the
/// caller-owned transaction tracker buffers.
pub struct Ftl<'t, F: NorFlash, const MAX_AREAS: usize = 4> {
    flash: F,
    props: NvmProps,
    areas: heapless::Vec<Area<'t>, MAX_AREAS>,
}

impl<'t, F: NorFlash, const MAX_AREAS: usize> Ftl<'t, F, MAX_AREAS> {
    /// Take ownership of the device and validate the NVM properties.
    ///
    /// `props.write_size` must be a multiple of the device write size, at
    /// most [`WU_MAX_SIZE`](crate::WU_MAX_SIZE); `props.erase_size` a
    /// multiple of both the device erase size and `props.write_size`.
    pub fn new(flash: F, props: NvmProps) -> Result<Self, Error<F::Error>> {
        const {
            assert!(F::READ_SIZE == 1, "the engine requires byte-granular reads");
        }
        let ws = props.write_size;
        let es = props.erase_size;
        if ws == 0 || ws as usize > WU_MAX_SIZE || ws % F::WRITE_SIZE as u32 != 0 {
            return Err(Error::WuSizeTooLarge);
        }
        if es == 0 || es % F::ERASE_SIZE as u32 != 0 || es % ws != 0 {
            return Err(Error::WuSizeTooLarge);
        }
        if props.base.checked_add(props.size).is_none()
            || props.size as usize > flash.capacity()
        {
            return Err(Error::AreaOutOfBounds);
        }
        Ok(Ftl {
            flash,
            props,
            areas: heapless::Vec::new(),
        })
    }

    /// Register an area and hand out its handle.
    ///
    /// The area must lie inside the NVM window, be aligned to erase pages
    /// and hold at least two slots. Overlap between areas is not checked.
    pub fn register(&mut self, cfg: AreaConfig) -> Result<AreaId, Error<F::Error>> {
        let p = &self.props;
        if !p.contains_range(cfg.area, cfg.area_size) {
            return Err(Error::AreaOutOfBounds);
        }
        if (cfg.area - p.base) % p.erase_size != 0 || cfg.area_size % p.erase_size != 0 {
            return Err(Error::AreaMisaligned);
        }
        if cfg.data_size == 0 {
            return Err(Error::AreaTooSmall);
        }
        let geo = Geometry::new(p, cfg.area, cfg.area_size, cfg.data_size);
        if geo.n_slots < 2 {
            return Err(Error::AreaTooSmall);
        }
        let id = AreaId(self.areas.len());
        self.areas
            .push(Area {
                geo,
                current: None,
                tracker: None,
            })
            .map_err(|_| Error::TooManyAreas)?;
        Ok(id)
    }

    /// Find who owns `addr`: registered areas first, then the raw window.
    pub fn lookup(&self, addr: u32) -> Lookup {
        for (i, a) in self.areas.iter().enumerate() {
            if a.geo.contains_data(addr) {
                return Lookup::Area(AreaId(i));
            }
        }
        if self.props.contains(addr) {
            Lookup::RawNvm
        } else {
            Lookup::Outside
        }
    }

    /// One-shot provisioning of a blank area; NOT tearing-safe. See
    /// [`erase_all`](Self::erase_all) for the tearing-safe way to clear
    /// data.
    pub fn format(&mut self, id: AreaId) -> Result<(), Error<F::Error>> {
        let Ftl { flash, props, areas } = self;
        area::format(flash, props, &mut areas[id.0])
    }

    /// Tearing-safe logical erase of the whole data window.
    pub fn erase_all(&mut self, id: AreaId) -> Result<(), Error<F::Error>> {
        let Ftl { flash, props, areas } = self;
        area::erase_all(flash, props, &mut areas[id.0])
    }

    /// Read committed data at logical address `src`.
    ///
    /// During a transaction this still returns the pre-transaction bytes.
    pub fn read(&mut self, id: AreaId, dst: &mut [u8], src: u32) -> Result<(), Error<F::Error>> {
        let Ftl { flash, props, areas } = self;
        area::read_current(flash, props, &mut areas[id.0], dst, src)
    }

    /// Read through the transaction view when one is active, committed data
    /// otherwise.
    pub fn read_newer(
        &mut self,
        id: AreaId,
        dst: &mut [u8],
        src: u32,
    ) -> Result<(), Error<F::Error>> {
        let Ftl { flash, props, areas } = self;
        transaction::read_newer(flash, props, &mut areas[id.0], dst, src)
    }

    /// Write-unit-aligned write, dispatched to the basic or transactional
    /// path depending on whether a transaction is active on `id`.
    pub fn write<'a>(
        &mut self,
        id: AreaId,
        dst: u32,
        src: impl Into<Source<'a>>,
    ) -> Result<(), Error<F::Error>> {
        self.write_impl(id, dst, src.into(), false)
    }

    /// As [`write`](Self::write), accepting unaligned addresses and sizes.
    ///
    /// Partially covered write units are spliced against the current slot,
    /// so neighbouring bytes keep their values. Within a transaction the
    /// splice still counts the whole unit as written.
    pub fn write_any<'a>(
        &mut self,
        id: AreaId,
        dst: u32,
        src: impl Into<Source<'a>>,
    ) -> Result<(), Error<F::Error>> {
        self.write_impl(id, dst, src.into(), true)
    }

    /// The copy-on-write path, bypassing transaction dispatch. Fails with
    /// [`Error::TransactionOngoing`] when a transaction is active.
    pub fn basic_write<'a>(
        &mut self,
        id: AreaId,
        dst: u32,
        src: impl Into<Source<'a>>,
    ) -> Result<(), Error<F::Error>> {
        let src = src.into();
        let (resolved, len) = self.resolve(src)?;
        let Ftl { flash, props, areas } = self;
        area::basic_write(flash, props, &mut areas[id.0], dst, &resolved, len, false)
    }

    /// Begin a transaction. `tracker` is caller-owned scratch of at least
    /// [`tracker_len`](crate::tracker_len) bytes; it must outlive the
    /// transaction.
    pub fn transaction_start(
        &mut self,
        id: AreaId,
        tracker: &'t mut [u8],
    ) -> Result<(), Error<F::Error>> {
        let Ftl { flash, props, areas } = self;
        transaction::start(flash, props, &mut areas[id.0], tracker)
    }

    /// Stage an aligned write into the open transaction.
    pub fn transaction_write<'a>(
        &mut self,
        id: AreaId,
        dst: u32,
        src: impl Into<Source<'a>>,
    ) -> Result<(), Error<F::Error>> {
        let src = src.into();
        let (resolved, len) = self.resolve(src)?;
        let Ftl { flash, props, areas } = self;
        transaction::write(flash, props, &mut areas[id.0], dst, &resolved, len, false)
    }

    /// Stage an unaligned write into the open transaction.
    pub fn transaction_write_any<'a>(
        &mut self,
        id: AreaId,
        dst: u32,
        src: impl Into<Source<'a>>,
    ) -> Result<(), Error<F::Error>> {
        let src = src.into();
        let (resolved, len) = self.resolve(src)?;
        let Ftl { flash, props, areas } = self;
        transaction::write(flash, props, &mut areas[id.0], dst, &resolved, len, true)
    }

    /// Read the in-flight transaction view. Fails with
    /// [`Error::NoTransaction`] outside a transaction.
    pub fn transaction_read(
        &mut self,
        id: AreaId,
        dst: &mut [u8],
        src: u32,
    ) -> Result<(), Error<F::Error>> {
        let Ftl { flash, props, areas } = self;
        transaction::read_staged(flash, props, &mut areas[id.0], dst, src)
    }

    /// Commit the open transaction: one version bump covering every staged
    /// write.
    ///
    /// Returns the tracker buffer so the caller can reuse it for the next
    /// transaction.
    pub fn transaction_commit(&mut self, id: AreaId) -> Result<&'t mut [u8], Error<F::Error>> {
        let Ftl { flash, props, areas } = self;
        transaction::commit(flash, props, &mut areas[id.0])
    }

    /// Abandon the open transaction. Nothing is written; the staging slot
    /// is reclaimed by the next operation that needs it. Returns the
    /// tracker buffer when a transaction was active.
    pub fn transaction_abort(&mut self, id: AreaId) -> Option<&'t mut [u8]> {
        transaction::abort(&mut self.areas[id.0])
    }

    /// Whether a transaction is active on `id`.
    pub fn transaction_active(&self, id: AreaId) -> bool {
        self.areas[id.0].tracker.is_some()
    }

    /// Read from anywhere in the NVM window: an area's committed data, or
    /// raw NVM outside every area.
    pub fn memread(&mut self, dst: &mut [u8], src: u32) -> Result<(), Error<F::Error>> {
        match self.lookup(src) {
            Lookup::Area(id) => self.read(id, dst, src),
            Lookup::RawNvm => self.raw_read(dst, src),
            Lookup::Outside => Err(Error::SourceOutOfBounds),
        }
    }

    /// As [`memread`](Self::memread), honouring the transaction view of the
    /// owning area.
    pub fn memread_newer(&mut self, dst: &mut [u8], src: u32) -> Result<(), Error<F::Error>> {
        match self.lookup(src) {
            Lookup::Area(id) => self.read_newer(id, dst, src),
            Lookup::RawNvm => self.raw_read(dst, src),
            Lookup::Outside => Err(Error::SourceOutOfBounds),
        }
    }

    /// Drop the cached slot election and any transaction state, as a reset
    /// would. The next operation mounts from scratch.
    pub fn invalidate(&mut self, id: AreaId) {
        let area = &mut self.areas[id.0];
        area.current = None;
        area.tracker = None;
    }

    /// The NVM properties this engine was built with.
    pub fn props(&self) -> &NvmProps {
        &self.props
    }

    /// Direct access to the flash device, e.g. to provision raw NVM ranges
    /// outside any area.
    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Give the device back, discarding all area state.
    pub fn into_flash(self) -> F {
        self.flash
    }

    fn raw_read(&mut self, dst: &mut [u8], src: u32) -> Result<(), Error<F::Error>> {
        if !self.props.contains_range(src, dst.len() as u32) {
            return Err(Error::SourceOutOfBounds);
        }
        nvm::read(&mut self.flash, &self.props, dst, src)
    }

    fn write_impl(
        &mut self,
        id: AreaId,
        dst: u32,
        src: Source<'_>,
        allow_unaligned: bool,
    ) -> Result<(), Error<F::Error>> {
        let (resolved, len) = self.resolve(src)?;
        let Ftl { flash, props, areas } = self;
        let area = &mut areas[id.0];
        if area.tracker.is_some() {
            transaction::write(flash, props, area, dst, &resolved, len, allow_unaligned)
        } else {
            area::basic_write(flash, props, area, dst, &resolved, len, allow_unaligned)
        }
    }

    /// Turn a [`Source`] into RAM bytes or a physical address. A logical
    /// address inside another area resolves to that area's current slot,
    /// once, mounting it first when necessary.
    fn resolve<'a>(&mut self, src: Source<'a>) -> Result<(Resolved<'a>, u32), Error<F::Error>> {
        let len = src.len();
        match src {
            Source::Ram(buf) => Ok((Resolved::Ram(buf), len)),
            Source::Nvm { addr, .. } => match self.lookup(addr) {
                Lookup::Area(id) => {
                    let Ftl { flash, props, areas } = self;
                    let phys = area::translate(flash, props, &mut areas[id.0], addr, len)?;
                    Ok((Resolved::Phys(phys), len))
                }
                Lookup::RawNvm => {
                    if !self.props.contains_range(addr, len) {
                        return Err(Error::SourceOutOfBounds);
                    }
                    Ok((Resolved::Phys(addr), len))
                }
                Lookup::Outside => Err(Error::SourceOutOfBounds),
            },
        }
    }
}
