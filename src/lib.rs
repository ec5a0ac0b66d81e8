//! Tearing-safe, copy-on-write storage areas for NOR-like flash.
//!
//! This crate manages *areas*: contiguous flash regions holding one logical
//! blob of `data_size` bytes each, updated atomically. An area is divided
//! into `n >= 2` slots; every update stages a complete new image in the
//! next slot (round robin) and commits by programming a versioned,
//! checksummed metadata footer. Power loss or reset at any byte-granular
//! instant leaves either the previous committed state or the new one — never
//! anything in between.
//!
//! On top of the basic copy-on-write path, a transaction protocol batches
//! several writes into a single version bump, with a caller-owned bitmap
//! tracking staged write units so nothing is ever programmed twice between
//! erases.
//!
//! Typical use:
//! - Implement (or reuse) an `embedded_storage::nor_flash::NorFlash` driver
//!   for the device. The engine needs byte-granular reads.
//! - Build an [`Ftl`] from the driver and its [`NvmProps`], then
//!   [`register`](Ftl::register) each [`AreaConfig`].
//! - Provision blank areas once with [`format`](Ftl::format); afterwards
//!   use [`read`](Ftl::read) / [`write`](Ftl::write) and the
//!   `transaction_*` operations, all of which are tearing-safe.
//!
//! The engine is `no_std`, allocation-free and single-threaded; it never
//! blocks outside the flash driver. The `sim` feature adds
//! [`sim::SimNorFlash`], an in-memory device with power-cut injection for
//! host-side tests.

#![no_std]

#[cfg(feature = "sim")]
extern crate std;

mod area;
mod checksum;
mod error;
mod layout;
mod meta;
mod nvm;
mod registry;
mod transaction;

#[cfg(feature = "sim")]
pub mod sim;

pub use area::AreaConfig;
pub use checksum::SLOT_CRC_ALG;
pub use error::Error;
pub use layout::{META_ITEMS, tracker_len};
pub use meta::ERASED_VERSION;
pub use nvm::NvmProps;
pub use registry::{AreaId, Ftl, Lookup, Source};

/// Largest supported write-unit size in bytes. Bounds the engine's stack
/// buffers.
pub const WU_MAX_SIZE: usize = 128;

/// Crate version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
