use crate::serialize::{base64_words, base64_words_de, hex_u32, hex_u32_de, hex_u64, hex_u64_de};
use crate::{ConfigError, FlashProperties, PageInfo, SectorInfo};
use serde::{Deserialize, Serialize};

/// A flash algorithm: a small position-independent blob of machine code
/// which is loaded into target RAM and then driven through the debug
/// transport to erase and program the flash of a specific chip family.
///
/// All `pc_*` entry points are byte offsets from [`load_address`]; the
/// RAM addresses (`static_base`, stack bounds, data buffers) are
/// absolute target addresses.
///
/// [`load_address`]: FlashAlgorithm::load_address
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashAlgorithm {
    /// The name of the flash algorithm.
    pub name: String,
    /// Memory address where the flash algo instructions will be loaded to.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub load_address: u64,
    /// List of 32-bit words containing the position-independent code for the algo.
    #[serde(serialize_with = "base64_words")]
    #[serde(deserialize_with = "base64_words_de")]
    pub instructions: Vec<u32>,
    /// Offset of the `Init()` entry point. Optional.
    pub pc_init: Option<u32>,
    /// Offset of the `UnInit()` entry point. Optional.
    pub pc_uninit: Option<u32>,
    /// Offset of the `ProgramPage()` entry point.
    #[serde(serialize_with = "hex_u32", deserialize_with = "hex_u32_de")]
    pub pc_program_page: u32,
    /// Offset of the `EraseSector()` entry point.
    #[serde(serialize_with = "hex_u32", deserialize_with = "hex_u32_de")]
    pub pc_erase_sector: u32,
    /// Offset of the `EraseAll()` entry point. Optional.
    pub pc_erase_all: Option<u32>,
    /// Initial value of the static base register, which determines
    /// where the position-independent data resides.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub static_base: u64,
    /// Initial value of the stack pointer when calling any flash algo routine.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub begin_stack: u64,
    /// Lowest usable stack address. The stack grows down from
    /// [`begin_stack`](FlashAlgorithm::begin_stack) towards this address.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub end_stack: u64,
    /// Base address of the scratch RAM used for page data.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub begin_data: u64,
    /// A list of base addresses for page buffers. The buffers must be at
    /// least as large as the `page_size` attribute. If two buffers are
    /// configured, double buffered programming is enabled.
    pub page_buffers: Vec<u64>,
    /// Address of an auxiliary CRC/verify accelerator blob, if the
    /// algorithm supports one.
    pub analyzer_address: Option<u64>,
    /// The read-only (code) section of the blob, relative to the load address.
    pub ro_section: Option<Section>,
    /// The read-write (data) section of the blob, relative to the load address.
    pub rw_section: Option<Section>,
    /// The zero-initialized section of the blob, relative to the load address.
    pub zi_section: Option<Section>,
    /// The properties of the flash on the device.
    pub flash_properties: FlashProperties,
}

/// A section of the flash algorithm blob, relative to its load address.
///
/// Only used to verify that the blob relocated correctly; the engine
/// does not interpret the section contents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Section {
    /// Offset of the section from the load address.
    #[serde(serialize_with = "hex_u32", deserialize_with = "hex_u32_de")]
    pub offset: u32,
    /// Size of the section in bytes.
    #[serde(serialize_with = "hex_u32", deserialize_with = "hex_u32_de")]
    pub size: u32,
}

impl FlashAlgorithm {
    /// Size of the instruction image in bytes.
    pub fn code_size(&self) -> u64 {
        self.instructions.len() as u64 * 4
    }

    /// Whether two page buffers are configured, enabling the
    /// double-buffered programming pipeline.
    pub fn double_buffering_supported(&self) -> bool {
        self.page_buffers.len() > 1
    }

    /// Absolute address of the `Init()` routine, if present.
    pub fn init_address(&self) -> Option<u64> {
        self.pc_init.map(|offset| self.load_address + offset as u64)
    }

    /// Absolute address of the `UnInit()` routine, if present.
    pub fn uninit_address(&self) -> Option<u64> {
        self.pc_uninit
            .map(|offset| self.load_address + offset as u64)
    }

    /// Absolute address of the `ProgramPage()` routine.
    pub fn program_page_address(&self) -> u64 {
        self.load_address + self.pc_program_page as u64
    }

    /// Absolute address of the `EraseSector()` routine.
    pub fn erase_sector_address(&self) -> u64 {
        self.load_address + self.pc_erase_sector as u64
    }

    /// Absolute address of the `EraseAll()` routine, if present.
    pub fn erase_all_address(&self) -> Option<u64> {
        self.pc_erase_all
            .map(|offset| self.load_address + offset as u64)
    }

    /// Try to retrieve the information about the flash sector
    /// which contains `address`.
    ///
    /// If the `address` is not part of the flash, None will be returned.
    pub fn sector_info(&self, address: u64) -> Option<SectorInfo> {
        if !self.flash_properties.address_range.contains(&address) {
            tracing::trace!("Address {:#010x} not contained in this flash device", address);
            return None;
        }

        let offset_address = address - self.flash_properties.address_range.start;

        let containing_sector = self
            .flash_properties
            .sectors
            .iter()
            .rfind(|s| s.address <= offset_address)?;

        let sector_index = (offset_address - containing_sector.address) / containing_sector.size;

        let sector_address = self.flash_properties.address_range.start
            + containing_sector.address
            + sector_index * containing_sector.size;

        Some(SectorInfo {
            base_address: sector_address,
            size: containing_sector.size,
        })
    }

    /// Returns the necessary information about the page which `address`
    /// resides in, if the address is inside the flash region.
    pub fn page_info(&self, address: u64) -> Option<PageInfo> {
        if !self.flash_properties.address_range.contains(&address) {
            return None;
        }

        Some(PageInfo {
            base_address: address - (address % self.flash_properties.page_size as u64),
            size: self.flash_properties.page_size,
        })
    }

    /// Iterate over all the sectors of the flash.
    pub fn iter_sectors(&self) -> impl Iterator<Item = SectorInfo> + '_ {
        let props = &self.flash_properties;

        assert!(!props.sectors.is_empty());
        assert!(props.sectors[0].address == 0);

        let mut addr = props.address_range.start;
        let mut desc_idx = 0;
        std::iter::from_fn(move || {
            if addr >= props.address_range.end {
                return None;
            }

            // Advance desc_idx if needed
            if let Some(next_desc) = props.sectors.get(desc_idx + 1) {
                if props.address_range.start + next_desc.address <= addr {
                    desc_idx += 1;
                }
            }

            let size = props.sectors[desc_idx].size;
            let sector = SectorInfo {
                base_address: addr,
                size,
            };
            addr += size;

            Some(sector)
        })
    }

    /// Iterate over all the pages of the flash.
    pub fn iter_pages(&self) -> impl Iterator<Item = PageInfo> + '_ {
        let props = &self.flash_properties;

        let mut addr = props.address_range.start;
        std::iter::from_fn(move || {
            if addr >= props.address_range.end {
                return None;
            }

            let page = PageInfo {
                base_address: addr,
                size: props.page_size,
            };
            addr += props.page_size as u64;

            Some(page)
        })
    }

    /// Returns true if the entire contents of the argument array equal
    /// the erased byte value.
    pub fn is_erased(&self, data: &[u8]) -> bool {
        data.iter()
            .all(|b| *b == self.flash_properties.erased_byte_value)
    }

    /// Check the internal consistency of the descriptor.
    ///
    /// Shipped descriptors are not assumed to be well formed; every
    /// descriptor is validated before a programming session starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let props = &self.flash_properties;

        if props.page_size == 0 || !props.page_size.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize {
                size: props.page_size,
            });
        }

        if props.min_program_length == 0
            || !props.min_program_length.is_power_of_two()
            || props.min_program_length > props.page_size
        {
            return Err(ConfigError::InvalidMinProgramLength {
                length: props.min_program_length,
            });
        }

        let code_size = self.code_size();
        let entry_points = [
            ("init", self.pc_init),
            ("uninit", self.pc_uninit),
            ("program_page", Some(self.pc_program_page)),
            ("erase_sector", Some(self.pc_erase_sector)),
            ("erase_all", self.pc_erase_all),
        ];
        for (name, offset) in entry_points {
            if let Some(offset) = offset {
                if offset as u64 >= code_size {
                    return Err(ConfigError::EntryPointOutOfBounds {
                        name,
                        offset: offset as u64,
                        code_size,
                    });
                }
            }
        }

        self.validate_sectors()?;

        if self.page_buffers.is_empty() || self.page_buffers.len() > 2 {
            return Err(ConfigError::InvalidPageBufferCount {
                count: self.page_buffers.len(),
            });
        }

        if self.begin_stack <= self.end_stack {
            return Err(ConfigError::InvalidStackBounds {
                begin: self.begin_stack,
                end: self.end_stack,
            });
        }

        Ok(())
    }

    fn validate_sectors(&self) -> Result<(), ConfigError> {
        let props = &self.flash_properties;
        let invalid = |reason: String| ConfigError::InvalidSectorDescriptions { reason };

        if props.sectors.is_empty() {
            return Err(invalid("no sector descriptions".into()));
        }
        if props.sectors[0].address != 0 {
            return Err(invalid(format!(
                "first sector group starts at {:#x}, not 0",
                props.sectors[0].address
            )));
        }

        for (desc, next) in props.sectors.iter().zip(
            props.sectors[1..]
                .iter()
                .map(|d| d.address)
                .chain(std::iter::once(props.size())),
        ) {
            if desc.size == 0 {
                return Err(invalid(format!(
                    "sector group at {:#x} has zero sector size",
                    desc.address
                )));
            }
            if next <= desc.address {
                return Err(invalid(format!(
                    "sector group addresses not strictly increasing at {:#x}",
                    desc.address
                )));
            }
            if (next - desc.address) % desc.size != 0 {
                return Err(invalid(format!(
                    "sector group at {:#x} (sector size {:#x}) does not end \
                     on a sector boundary at {:#x}",
                    desc.address, desc.size, next
                )));
            }
        }

        Ok(())
    }
}
