use std::ops::Range;
use std::time::{Duration, Instant};

use flashprobe_target::{MemoryMap, MemoryRegion, TargetDefinition};

use super::{FlashBuilder, FlashError, FlashProgress, Flasher};
use crate::transport::{DebugTransport, TransportError};

/// Options for the programming of a staged set of data.
#[derive(Default)]
pub struct DownloadOptions {
    /// Erase the whole flash region with the chip-erase routine (or a
    /// sector-by-sector fallback) before programming, instead of
    /// erasing only the sectors the staged data touches.
    pub do_chip_erase: bool,
    /// Read the bytes of partially written pages back from the device
    /// before erasing, so unwritten spans keep their previous contents
    /// instead of being padded with the erased byte value.
    pub keep_unwritten_bytes: bool,
    /// Skip erasing entirely. The caller guarantees the flash is
    /// already blank.
    pub skip_erase: bool,
    /// Force the single-buffer programming loop even when the
    /// algorithm has two page buffers.
    pub disable_double_buffering: bool,
    /// Progress reporting for the whole download.
    pub progress: Option<FlashProgress>,
}

/// A report of one completed programming run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSummary {
    /// The number of bytes that were staged and programmed.
    pub bytes_written: u64,
    /// The number of sectors that were erased.
    pub sectors_erased: usize,
    /// The wall-clock duration of the run.
    pub elapsed: Duration,
}

/// `FlashLoader` manages the flashing of any chunks of data onto any
/// flash regions of a target.
///
/// Use [`add_data()`](FlashLoader::add_data) to add chunks of data.
/// Once you are done adding all your data, use
/// [`commit()`](FlashLoader::commit) to program it. The flash loader
/// selects the appropriate flash region, and with it the appropriate
/// flash algorithm, for each chunk.
pub struct FlashLoader<'data> {
    memory_map: MemoryMap,
    builder: FlashBuilder<'data>,
}

impl<'data> FlashLoader<'data> {
    /// Create a new flash loader for the given memory map.
    pub fn new(memory_map: MemoryMap) -> Self {
        Self {
            memory_map,
            builder: FlashBuilder::new(),
        }
    }

    /// Check that the given address range is completely covered by
    /// flash regions of the memory map, possibly by several in a row.
    fn check_data_in_memory_map(&self, range: Range<u64>) -> Result<(), FlashError> {
        let mut address = range.start;
        while address < range.end {
            match self.memory_map.region_for(address) {
                Some(MemoryRegion::Flash(region)) => address = region.range.end,
                _ => {
                    return Err(FlashError::NoFlashRegion {
                        start: range.start,
                        end: range.end,
                    })
                }
            }
        }
        Ok(())
    }

    /// Stage a chunk of data to be programmed.
    ///
    /// The chunk may cross region boundaries as long as contiguous
    /// flash regions cover it completely.
    pub fn add_data(&mut self, address: u64, data: &'data [u8]) -> Result<(), FlashError> {
        tracing::debug!(
            "Staging data at address {:#010x} with size {} bytes",
            address,
            data.len()
        );

        self.check_data_in_memory_map(address..address + data.len() as u64)?;
        self.builder.add_data(address, data)
    }

    /// Program all staged data into flash.
    pub fn commit(
        &self,
        transport: &mut dyn DebugTransport,
        options: DownloadOptions,
    ) -> Result<ProgramSummary, FlashError> {
        tracing::debug!("Committing staged data to flash.");
        let start = Instant::now();
        let progress = options.progress.clone().unwrap_or_else(FlashProgress::empty);

        let mut bytes_written = 0;
        let mut sectors_erased = 0;

        for region in self.memory_map.flash_regions() {
            let mut region_builder = FlashBuilder::new();
            for (address, data) in self.builder.data_in_range(&region.range) {
                bytes_written += data.len() as u64;
                region_builder.add_data(address, data)?;
            }
            if region_builder.is_empty() {
                continue;
            }

            tracing::debug!(
                "Programming region {:#010x}..{:#010x}",
                region.range.start,
                region.range.end
            );

            let mut flasher = Flasher::new(&mut *transport, region, progress.clone())?;

            let skip_erasing = if options.do_chip_erase {
                sectors_erased += erase_region(&mut flasher)?;
                true
            } else if options.skip_erase {
                flasher.assume_pre_erased();
                true
            } else {
                false
            };

            sectors_erased += flasher.program(
                &region_builder,
                options.keep_unwritten_bytes,
                !options.disable_double_buffering,
                skip_erasing,
            )?;
        }

        Ok(ProgramSummary {
            bytes_written,
            sectors_erased,
            elapsed: start.elapsed(),
        })
    }
}

/// Erase a whole region, preferring the chip-erase routine and falling
/// back to erasing every sector when the algorithm has none. Returns
/// the number of sectors erased.
fn erase_region(flasher: &mut Flasher<'_>) -> Result<usize, FlashError> {
    let sector_count = flasher.flash_algorithm().iter_sectors().count();

    match flasher.erase_all() {
        Ok(()) => Ok(sector_count),
        Err(FlashError::EraseAllNotSupported) => {
            tracing::debug!("No erase-all routine, erasing sector by sector.");
            let sectors: Vec<u64> = flasher
                .flash_algorithm()
                .iter_sectors()
                .map(|sector| sector.base_address)
                .collect();
            for address in sectors {
                flasher.erase_sector(address)?;
            }
            Ok(sector_count)
        }
        Err(error) => Err(error),
    }
}

/// Apply the target's connect-time register fix-up.
///
/// Must be called once after the debug connection is established and
/// before programming starts. A failure is reported to the caller but
/// is not fatal: some chips program reliably without the fix-up.
pub fn connect(
    transport: &mut dyn DebugTransport,
    target: &TargetDefinition,
) -> Result<(), TransportError> {
    let Some(fixup) = &target.connect_fixup else {
        return Ok(());
    };

    tracing::debug!(
        "Applying connect fix-up: writing {:#010x} to {:#010x}",
        fixup.value,
        fixup.address
    );

    let value = (fixup.value as u32).to_le_bytes();
    if let Err(error) = transport.write_memory_block(fixup.address, &value) {
        tracing::warn!("The connect fix-up register write failed: {error}");
        return Err(error);
    }

    Ok(())
}

/// Program `image` to the target's flash, starting at `address`.
///
/// Sectors touched by the image are erased first; writes shorter than
/// a page are padded with the flash's erased byte value.
pub fn program(
    transport: &mut dyn DebugTransport,
    target: &TargetDefinition,
    image: &[u8],
    address: u64,
) -> Result<ProgramSummary, FlashError> {
    let mut loader = FlashLoader::new(target.memory_map.clone());
    loader.add_data(address, image)?;
    loader.commit(transport, DownloadOptions::default())
}

/// Erase all flash regions of the target.
pub fn erase_all(
    transport: &mut dyn DebugTransport,
    target: &TargetDefinition,
) -> Result<(), FlashError> {
    for region in target.memory_map.flash_regions() {
        let mut flasher = Flasher::new(&mut *transport, region, FlashProgress::empty())?;
        erase_region(&mut flasher)?;
    }
    Ok(())
}

/// Erase the single flash sector containing `address`.
pub fn erase_sector(
    transport: &mut dyn DebugTransport,
    target: &TargetDefinition,
    address: u64,
) -> Result<(), FlashError> {
    let region = target
        .memory_map
        .flash_regions()
        .find(|region| region.range.contains(&address))
        .ok_or(FlashError::NoFlashRegion {
            start: address,
            end: address + 1,
        })?;

    let mut flasher = Flasher::new(&mut *transport, region, FlashProgress::empty())?;
    let sector = flasher
        .flash_algorithm()
        .sector_info(address)
        .ok_or(FlashError::InvalidFlashAddress(address))?;
    flasher.erase_sector(sector.base_address)
}
