//! The slot digest: a CRC-32 variant over the slot's logical data, bound to
//! the slot version by modular addition.
//!
//! The all-ones initial value and the version term together guarantee that a
//! freshly erased slot (all `0xFF`, version `0xFFFFFFFF`) can never pass the
//! integrity check by accident.

use crc::{Algorithm, Crc};
use embedded_storage::nor_flash::NorFlash;

use crate::WU_MAX_SIZE;
use crate::error::Error;
use crate::nvm::{self, NvmProps};

/// On-flash digest algorithm. `0x8F6E37A0` is the normal-form polynomial;
/// its reflected-domain constant is `0x05EC76F1`. No final xor: the digest
/// is the raw reflected register.
pub const SLOT_CRC_ALG: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x8F6E_37A0,
    init: 0xFFFF_FFFF,
    refin: true,
    refout: true,
    xorout: 0x0000_0000,
    check: 0x04B3_8042,
    residue: 0x0000_0000,
};

const SLOT_CRC: Crc<u32> = Crc::<u32>::new(&SLOT_CRC_ALG);

/// Digest of `len` data bytes at `src`, bound to `version`.
///
/// Streams the data through a small stack buffer so arbitrarily large areas
/// need no allocation.
pub(crate) fn slot_digest<F: NorFlash>(
    flash: &mut F,
    props: &NvmProps,
    src: u32,
    len: u32,
    version: u32,
) -> Result<u32, Error<F::Error>> {
    let mut digest = SLOT_CRC.digest();
    let mut buf = [0u8; WU_MAX_SIZE];
    let mut done = 0u32;
    while done < len {
        let n = (len - done).min(WU_MAX_SIZE as u32) as usize;
        nvm::read(flash, props, &mut buf[..n], src + done)?;
        digest.update(&buf[..n]);
        done += n as u32;
    }
    Ok(digest.finalize().wrapping_add(version))
}
