use crate::serialize::{hex_range, hex_range_de, hex_u64, hex_u64_de};
use crate::FlashAlgorithm;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Represents a region of flash memory, together with the algorithm
/// used to program it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlashRegion {
    /// A name to describe the region
    pub name: Option<String>,
    /// Address range of the region
    #[serde(serialize_with = "hex_range", deserialize_with = "hex_range_de")]
    pub range: Range<u64>,
    /// True if the chip boots from this memory. At most one flash
    /// region per memory map may set this.
    #[serde(default)]
    pub is_boot_memory: bool,
    /// Erase granularity hint. The sector table of the algorithm is
    /// authoritative; this value is only used for display purposes.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub blocksize: u64,
    /// The algorithm used to erase and program this region.
    pub algorithm: FlashAlgorithm,
}

/// Represents a region in RAM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RamRegion {
    /// A name to describe the region
    pub name: Option<String>,
    /// Address range of the region
    #[serde(serialize_with = "hex_range", deserialize_with = "hex_range_de")]
    pub range: Range<u64>,
}

/// Represents a generic region without special properties,
/// used for ROM, device and alias spans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenericRegion {
    /// A name to describe the region
    pub name: Option<String>,
    /// Address range of the region
    #[serde(serialize_with = "hex_range", deserialize_with = "hex_range_de")]
    pub range: Range<u64>,
}

/// The kind of a memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    /// Programmable non-volatile memory.
    Flash,
    /// Volatile memory, usable as scratch space for flash algorithms.
    Ram,
    /// Read-only memory.
    Rom,
    /// Memory mapped peripherals.
    Device,
    /// An alias of another region. Alias regions may overlap
    /// regions of any other kind.
    Alias,
}

/// Declares the type of a memory region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryRegion {
    /// Memory region describing flash or other programmable non-volatile memory.
    Flash(FlashRegion),
    /// Memory region describing RAM.
    Ram(RamRegion),
    /// Read-only memory.
    Rom(GenericRegion),
    /// Peripheral space.
    Device(GenericRegion),
    /// An alias of another region.
    Alias(GenericRegion),
}

impl MemoryRegion {
    /// Returns the kind of the region.
    pub fn kind(&self) -> RegionKind {
        match self {
            MemoryRegion::Flash(_) => RegionKind::Flash,
            MemoryRegion::Ram(_) => RegionKind::Ram,
            MemoryRegion::Rom(_) => RegionKind::Rom,
            MemoryRegion::Device(_) => RegionKind::Device,
            MemoryRegion::Alias(_) => RegionKind::Alias,
        }
    }

    /// Returns the address range of the memory region.
    pub fn address_range(&self) -> Range<u64> {
        match self {
            MemoryRegion::Flash(r) => r.range.clone(),
            MemoryRegion::Ram(r) => r.range.clone(),
            MemoryRegion::Rom(r) | MemoryRegion::Device(r) | MemoryRegion::Alias(r) => {
                r.range.clone()
            }
        }
    }

    /// Returns the name of the memory region, if it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            MemoryRegion::Flash(r) => r.name.as_deref(),
            MemoryRegion::Ram(r) => r.name.as_deref(),
            MemoryRegion::Rom(r) | MemoryRegion::Device(r) | MemoryRegion::Alias(r) => {
                r.name.as_deref()
            }
        }
    }

    /// Returns whether the memory region contains the given address.
    pub fn contains(&self, address: u64) -> bool {
        self.address_range().contains(&address)
    }

    /// Returns the flash region if this is a flash region, otherwise None.
    pub fn as_flash_region(&self) -> Option<&FlashRegion> {
        match self {
            MemoryRegion::Flash(region) => Some(region),
            _ => None,
        }
    }

    /// Returns the RAM region if this is a RAM region, otherwise None.
    pub fn as_ram_region(&self) -> Option<&RamRegion> {
        match self {
            MemoryRegion::Ram(region) => Some(region),
            _ => None,
        }
    }
}

/// Holds information about a specific, individual flash sector.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SectorInfo {
    /// Base address of the flash sector
    pub base_address: u64,
    /// Size of the flash sector
    pub size: u64,
}

impl SectorInfo {
    /// Returns the address range of the sector.
    pub fn address_range(&self) -> Range<u64> {
        self.base_address..self.base_address + self.size
    }
}

/// Information about a group of flash sectors, which is used as part
/// of the [`FlashProperties`] struct.
///
/// The `SectorDescription` means that, starting at the flash offset
/// `address`, all following sectors will have a size of `size`, until
/// either the end of the flash or another `SectorDescription` changes
/// the sector size.
///
/// [`FlashProperties`]: crate::FlashProperties
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorDescription {
    /// Size of each individual flash sector
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub size: u64,
    /// Start address of the group of flash sectors, relative
    /// to the start address of the flash.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub address: u64,
}

/// Holds information about a page in flash.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Base address of the page in flash.
    pub base_address: u64,
    /// Size of the page
    pub size: u32,
}

impl PageInfo {
    /// Returns the address range of the page.
    pub fn address_range(&self) -> Range<u64> {
        self.base_address..self.base_address + self.size as u64
    }
}

/// Enables the user to do range intersection testing.
pub trait MemoryRange {
    /// Returns true if `self` contains `range` fully.
    fn contains_range(&self, range: &Range<u64>) -> bool;

    /// Returns true if `self` intersects `range` partially.
    fn intersects_range(&self, range: &Range<u64>) -> bool;
}

impl MemoryRange for Range<u64> {
    fn contains_range(&self, range: &Range<u64>) -> bool {
        if range.end == 0 {
            false
        } else {
            self.contains(&range.start) && self.contains(&(range.end - 1))
        }
    }

    fn intersects_range(&self, range: &Range<u64>) -> bool {
        if range.end == 0 {
            false
        } else {
            self.contains(&range.start) && !self.contains(&(range.end - 1))
                || !self.contains(&range.start) && self.contains(&(range.end - 1))
                || self.contains_range(range)
                || range.contains_range(self)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn contains_range_inclusive_bounds() {
        assert!((0u64..4).contains_range(&(0..1)));
        assert!((4u64..8).contains_range(&(6..8)));
        assert!(!(0u64..1).contains_range(&(0..2)));
        assert!(!(4u64..8).contains_range(&(3..9)));
    }

    #[test]
    fn empty_range_never_contained() {
        assert!(!(0u64..8).contains_range(&(0..0)));
        assert!(!(0u64..8).intersects_range(&(0..0)));
    }

    #[test]
    fn intersects_range_partial_overlap() {
        assert!((4u64..8).intersects_range(&(3..9)));
        assert!((4u64..8).intersects_range(&(6..10)));
        assert!(!(4u64..8).intersects_range(&(0..4)));
        assert!(!(8u64..9).intersects_range(&(6..8)));
    }
}
