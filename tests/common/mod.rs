#![allow(dead_code)]

use tearless::sim::SimNorFlash;
use tearless::{AreaConfig, AreaId, Ftl, NvmProps};

pub const WRITE_SIZE: u32 = 16;
pub const ERASE_SIZE: u32 = 8192;
pub const DATA_SIZE: u32 = 128;
pub const BASE: u32 = 0x0800_0000;
pub const NVM_SIZE: u32 = 0x2_0000;

pub type Flash = SimNorFlash<16, 8192>;

pub const PROPS: NvmProps = NvmProps {
    base: BASE,
    size: NVM_SIZE,
    write_size: WRITE_SIZE,
    erase_size: ERASE_SIZE,
};

/// Two slots of one page each, 128 data bytes.
pub const AREA_A: AreaConfig = AreaConfig {
    area: BASE,
    area_size: 2 * ERASE_SIZE,
    data_size: DATA_SIZE,
};

/// Second area right behind the first, 256 data bytes.
pub const AREA_B: AreaConfig = AreaConfig {
    area: BASE + 2 * ERASE_SIZE,
    area_size: 2 * ERASE_SIZE,
    data_size: 256,
};

/// Start of the NVM range outside every area.
pub const RAW: u32 = BASE + 4 * ERASE_SIZE;

pub fn single_area<'t>() -> (Ftl<'t, Flash>, AreaId) {
    let mut ftl = Ftl::new(Flash::new(NVM_SIZE as usize), PROPS).unwrap();
    let a = ftl.register(AREA_A).unwrap();
    ftl.format(a).unwrap();
    (ftl, a)
}

pub fn two_areas<'t>() -> (Ftl<'t, Flash>, AreaId, AreaId) {
    let mut ftl = Ftl::new(Flash::new(NVM_SIZE as usize), PROPS).unwrap();
    let a = ftl.register(AREA_A).unwrap();
    let b = ftl.register(AREA_B).unwrap();
    ftl.format(a).unwrap();
    ftl.format(b).unwrap();
    (ftl, a, b)
}

pub fn read_all(ftl: &mut Ftl<'_, Flash>, id: AreaId, area_base: u32, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    ftl.read(id, &mut buf, area_base).unwrap();
    buf
}

/// Counter-based filler, the cheapest recognizable pattern.
pub fn fill_pattern(state: &mut u8, buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b = *state;
        *state = state.wrapping_add(1);
    }
}

/// Little-endian u32 at a raw device offset.
pub fn raw_u32(flash_raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(flash_raw[offset..offset + 4].try_into().unwrap())
}

/// Device offset of slot `slot` of an area starting at `area` (absolute).
pub fn slot_offset(area: u32, slot: u32) -> usize {
    (area - BASE + slot * ERASE_SIZE) as usize
}

/// Device offset of the metadata footer of a one-page slot.
pub fn meta_offset(area: u32, slot: u32) -> usize {
    slot_offset(area, slot) + (ERASE_SIZE - 3 * WRITE_SIZE) as usize
}
