use crate::memory::{FlashRegion, MemoryRange, MemoryRegion, RamRegion, RegionKind};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// An ordered collection of non-overlapping memory regions, describing
/// the addressable memory of one target.
///
/// The map is validated once at construction and never mutated
/// afterwards. Regions are kept sorted by start address so lookups are
/// a single binary search.
///
/// Alias regions are allowed to overlap regions of any other kind,
/// since they intentionally shadow another span of the address space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MemoryRegion>", into = "Vec<MemoryRegion>")]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

impl MemoryMap {
    /// Build a memory map from the given regions.
    ///
    /// Fails if a region is empty, if two non-alias regions overlap, or
    /// if more than one flash region is marked as boot memory.
    pub fn new(mut regions: Vec<MemoryRegion>) -> Result<Self, ConfigError> {
        regions.sort_by_key(|region| region.address_range().start);

        for region in &regions {
            let range = region.address_range();
            if range.end <= range.start {
                return Err(ConfigError::EmptyRegion {
                    name: region.name().map(String::from),
                    range,
                });
            }
        }

        for (i, region) in regions.iter().enumerate() {
            if region.kind() == RegionKind::Alias {
                continue;
            }
            for other in &regions[i + 1..] {
                if other.kind() == RegionKind::Alias {
                    continue;
                }
                if region
                    .address_range()
                    .intersects_range(&other.address_range())
                {
                    return Err(ConfigError::OverlappingRegions {
                        first: region.address_range(),
                        second: other.address_range(),
                    });
                }
            }
        }

        let boot_regions = regions
            .iter()
            .filter_map(MemoryRegion::as_flash_region)
            .filter(|region| region.is_boot_memory)
            .count();
        if boot_regions > 1 {
            return Err(ConfigError::MultipleBootRegions);
        }

        Ok(Self { regions })
    }

    /// All regions, sorted by start address.
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// Finds the region which contains `address`.
    ///
    /// When an alias region shadows another region at this address, the
    /// region with the greater start address wins.
    pub fn region_for(&self, address: u64) -> Option<&MemoryRegion> {
        let idx = self
            .regions
            .partition_point(|region| region.address_range().start <= address);

        self.regions[..idx]
            .iter()
            .rev()
            .find(|region| region.contains(address))
    }

    /// All regions overlapping `range`, in address order.
    pub fn regions_overlapping(&self, range: Range<u64>) -> impl Iterator<Item = &MemoryRegion> {
        self.regions
            .iter()
            .filter(move |region| region.address_range().intersects_range(&range))
    }

    /// The unique flash region marked as boot memory, if any.
    pub fn boot_region(&self) -> Option<&FlashRegion> {
        self.regions
            .iter()
            .filter_map(MemoryRegion::as_flash_region)
            .find(|region| region.is_boot_memory)
    }

    /// All flash regions, in address order.
    pub fn flash_regions(&self) -> impl Iterator<Item = &FlashRegion> {
        self.regions.iter().filter_map(MemoryRegion::as_flash_region)
    }

    /// All RAM regions, in address order.
    pub fn ram_regions(&self) -> impl Iterator<Item = &RamRegion> {
        self.regions.iter().filter_map(MemoryRegion::as_ram_region)
    }
}

impl TryFrom<Vec<MemoryRegion>> for MemoryMap {
    type Error = ConfigError;

    fn try_from(regions: Vec<MemoryRegion>) -> Result<Self, Self::Error> {
        Self::new(regions)
    }
}

impl From<MemoryMap> for Vec<MemoryRegion> {
    fn from(map: MemoryMap) -> Self {
        map.regions
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{FlashAlgorithm, GenericRegion};

    fn ram(start: u64, length: u64) -> MemoryRegion {
        MemoryRegion::Ram(RamRegion {
            name: None,
            range: start..start + length,
        })
    }

    fn flash(start: u64, length: u64, is_boot_memory: bool) -> MemoryRegion {
        MemoryRegion::Flash(FlashRegion {
            name: None,
            range: start..start + length,
            is_boot_memory,
            blocksize: 0x400,
            algorithm: FlashAlgorithm::default(),
        })
    }

    fn alias(start: u64, length: u64) -> MemoryRegion {
        MemoryRegion::Alias(GenericRegion {
            name: None,
            range: start..start + length,
        })
    }

    #[test]
    fn region_lookup() {
        let map = MemoryMap::new(vec![
            ram(0x2000_0000, 0x8000),
            flash(0x0800_0000, 0x2_0000, true),
        ])
        .unwrap();

        assert_eq!(
            map.region_for(0x0800_0000).unwrap().kind(),
            RegionKind::Flash
        );
        assert_eq!(
            map.region_for(0x0801_ffff).unwrap().kind(),
            RegionKind::Flash
        );
        assert!(map.region_for(0x0802_0000).is_none());
        assert_eq!(map.region_for(0x2000_1234).unwrap().kind(), RegionKind::Ram);
        assert!(map.region_for(0).is_none());
    }

    #[test]
    fn lookup_never_returns_non_containing_region() {
        let map = MemoryMap::new(vec![
            flash(0x0800_0000, 0x1000, false),
            flash(0x0800_2000, 0x1000, false),
        ])
        .unwrap();

        // In the hole between the two regions.
        assert!(map.region_for(0x0800_1800).is_none());
    }

    #[test]
    fn overlapping_regions_rejected() {
        let result = MemoryMap::new(vec![
            flash(0x0800_0000, 0x2_0000, false),
            flash(0x0801_0000, 0x2_0000, false),
        ]);
        assert!(matches!(
            result,
            Err(ConfigError::OverlappingRegions { .. })
        ));

        // Different kinds may not overlap either.
        let result = MemoryMap::new(vec![
            flash(0x0800_0000, 0x2_0000, false),
            ram(0x0801_0000, 0x2_0000),
        ]);
        assert!(matches!(
            result,
            Err(ConfigError::OverlappingRegions { .. })
        ));
    }

    #[test]
    fn alias_may_shadow_other_regions() {
        let map = MemoryMap::new(vec![
            flash(0x0800_0000, 0x2_0000, true),
            alias(0x0000_0000, 0x2_0000),
            alias(0x0800_0000, 0x2_0000),
        ])
        .unwrap();

        assert!(map.boot_region().is_some());
        // The alias with the greater start shadows the flash region itself.
        assert_eq!(
            map.region_for(0x0800_0004).unwrap().kind(),
            RegionKind::Alias
        );
    }

    #[test]
    fn single_boot_region_enforced() {
        let result = MemoryMap::new(vec![
            flash(0x0000_0000, 0x1000, true),
            flash(0x0800_0000, 0x1000, true),
        ]);
        assert!(matches!(result, Err(ConfigError::MultipleBootRegions)));
    }

    #[test]
    fn empty_region_rejected() {
        let result = MemoryMap::new(vec![ram(0x2000_0000, 0)]);
        assert!(matches!(result, Err(ConfigError::EmptyRegion { .. })));
    }

    #[test]
    fn regions_overlapping_in_address_order() {
        let map = MemoryMap::new(vec![
            ram(0x2000_0000, 0x8000),
            flash(0x0800_0000, 0x1000, false),
            flash(0x0800_1000, 0x1000, false),
        ])
        .unwrap();

        let touched: Vec<_> = map
            .regions_overlapping(0x0800_0800..0x0800_1800)
            .map(|region| region.address_range().start)
            .collect();
        assert_eq!(touched, vec![0x0800_0000, 0x0800_1000]);
    }
}
