//! Area geometry: how an area divides into slots and where the metadata
//! footer lives inside each slot.
//!
//! Everything here is plain arithmetic derived once at registration from
//! the NVM properties and the area descriptor.

use crate::nvm::NvmProps;

/// Number of items in the metadata footer (version, checksum, checksum₂).
pub const META_ITEMS: u32 = 3;

/// Bytes required for a transaction tracker covering `data_size` bytes of
/// area data at `write_size` program granularity.
///
/// Callers use this to size the tracker buffer statically:
///
/// ```
/// const DATA_SIZE: u32 = 128;
/// const WRITE_SIZE: u32 = 16;
/// let mut tracker = [0u8; tearless::tracker_len(DATA_SIZE, WRITE_SIZE)];
/// # let _ = tracker;
/// ```
pub const fn tracker_len(data_size: u32, write_size: u32) -> usize {
    (data_size.div_ceil(write_size)).div_ceil(8) as usize
}

/// Fixed geometry of one area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Geometry {
    /// Base address of the area (first slot).
    pub area: u32,
    /// Total size of the area in bytes.
    pub area_size: u32,
    /// Size of the logical data window in bytes.
    pub data_size: u32,
    pub write_size: u32,
    pub erase_size: u32,
    /// Size of one slot, a whole number of erase pages.
    pub slot_size: u32,
    /// Wear-leveling factor; at least 2.
    pub n_slots: u32,
}

impl Geometry {
    pub fn new(props: &NvmProps, area: u32, area_size: u32, data_size: u32) -> Self {
        let write_size = props.write_size;
        let erase_size = props.erase_size;
        let meta_phy = META_ITEMS * write_size.max(4);
        let slot_size = (data_size + meta_phy).div_ceil(erase_size) * erase_size;
        Geometry {
            area,
            area_size,
            data_size,
            write_size,
            erase_size,
            slot_size,
            n_slots: area_size / slot_size,
        }
    }

    /// Size of one metadata cell; each item gets a full write unit, at
    /// least 4 bytes.
    pub fn meta_cell(&self) -> u32 {
        self.write_size.max(4)
    }

    pub fn meta_phy_size(&self) -> u32 {
        META_ITEMS * self.meta_cell()
    }

    /// Offset of the metadata footer inside a slot.
    pub fn meta_offset(&self) -> u32 {
        self.slot_size - self.meta_phy_size()
    }

    pub fn pages_per_slot(&self) -> u32 {
        self.slot_size / self.erase_size
    }

    pub fn slot_base(&self, slot: u32) -> u32 {
        self.area + slot * self.slot_size
    }

    /// Round-robin slot rotation.
    pub fn next_slot(&self, current: u32) -> u32 {
        (current + 1) % self.n_slots
    }

    /// Whether `addr` falls inside the logical data window. Upper bound
    /// exclusive.
    pub fn contains_data(&self, addr: u32) -> bool {
        addr >= self.area && addr - self.area < self.data_size
    }

    /// Number of write units covering the data window, counting a partial
    /// final unit.
    pub fn n_write_units(&self) -> u32 {
        self.data_size.div_ceil(self.write_size)
    }

    /// End of the write-unit-aligned data region inside a slot.
    pub fn data_phy_end(&self) -> u32 {
        self.n_write_units() * self.write_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPS: NvmProps = NvmProps {
        base: 0,
        size: 0x1_0000,
        write_size: 16,
        erase_size: 8192,
    };

    #[test]
    fn reference_geometry() {
        // one erase page per slot: 128 data bytes + 48 footer bytes
        let geo = Geometry::new(&PROPS, 0, 16384, 128);
        assert_eq!(geo.meta_cell(), 16);
        assert_eq!(geo.meta_phy_size(), 48);
        assert_eq!(geo.slot_size, 8192);
        assert_eq!(geo.n_slots, 2);
        assert_eq!(geo.meta_offset(), 8144);
        assert_eq!(geo.pages_per_slot(), 1);
        assert_eq!(geo.slot_base(1), 8192);
        assert_eq!(geo.next_slot(1), 0);
    }

    #[test]
    fn small_write_units_still_get_four_byte_cells() {
        let props = NvmProps { write_size: 2, ..PROPS };
        let geo = Geometry::new(&props, 0, 16384, 100);
        assert_eq!(geo.meta_cell(), 4);
        assert_eq!(geo.meta_phy_size(), 12);
    }

    #[test]
    fn slot_spills_into_a_second_page_when_data_fills_the_first() {
        let geo = Geometry::new(&PROPS, 0, 0x1_0000, 8190);
        assert_eq!(geo.slot_size, 16384);
        assert_eq!(geo.n_slots, 4);
    }

    #[test]
    fn data_window_bounds() {
        let geo = Geometry::new(&PROPS, 8192, 16384, 128);
        assert!(geo.contains_data(8192));
        assert!(geo.contains_data(8192 + 127));
        assert!(!geo.contains_data(8192 + 128));
        assert!(!geo.contains_data(8191));
    }

    #[test]
    fn tracker_sizing() {
        assert_eq!(tracker_len(128, 16), 1);
        assert_eq!(tracker_len(129, 16), 2);
        assert_eq!(tracker_len(1024, 8), 16);
        assert_eq!(tracker_len(1, 128), 1);
    }

    #[test]
    fn partial_final_write_unit_is_counted() {
        let geo = Geometry::new(&PROPS, 0, 16384, 100);
        assert_eq!(geo.n_write_units(), 7);
        assert_eq!(geo.data_phy_end(), 112);
    }
}
