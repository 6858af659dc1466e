use crate::memory::SectorDescription;
use crate::serialize::{hex_range, hex_range_de, hex_u32, hex_u32_de};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Properties of flash memory, which are used when programming flash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlashProperties {
    /// The range of the device flash covered by the algorithm.
    #[serde(serialize_with = "hex_range", deserialize_with = "hex_range_de")]
    pub address_range: Range<u64>,
    /// The page size of the device flash.
    #[serde(serialize_with = "hex_u32", deserialize_with = "hex_u32_de")]
    pub page_size: u32,
    /// The smallest unit the algorithm can program in one call.
    #[serde(serialize_with = "hex_u32", deserialize_with = "hex_u32_de")]
    pub min_program_length: u32,
    /// The value of a byte in flash that was just erased.
    pub erased_byte_value: u8,
    /// The approximate time it takes to program a page, in milliseconds.
    pub program_page_timeout: u32,
    /// The approximate time it takes to erase a sector, in milliseconds.
    pub erase_sector_timeout: u32,
    /// The available sectors of the device flash, sorted by their
    /// start offset. Each entry is effective until the next one.
    pub sectors: Vec<SectorDescription>,
}

impl Default for FlashProperties {
    #[allow(clippy::reversed_empty_ranges)]
    fn default() -> Self {
        FlashProperties {
            address_range: 0..0,
            page_size: 0,
            min_program_length: 0,
            erased_byte_value: 0xff,
            program_page_timeout: 0,
            erase_sector_timeout: 0,
            sectors: vec![],
        }
    }
}

impl FlashProperties {
    /// The total size of the flash covered by these properties.
    pub fn size(&self) -> u64 {
        self.address_range.end - self.address_range.start
    }
}
