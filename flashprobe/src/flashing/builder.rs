use std::fmt::{Debug, Formatter};
use std::ops::Range;

use flashprobe_target::FlashAlgorithm;

use super::FlashError;

/// The description of a page in flash.
///
/// Pages are always full `page_size` bytes. Bytes not covered by any
/// staged data block are pre-filled with the flash's erased byte value,
/// so that short writes are padded before programming.
#[derive(Clone)]
pub struct FlashPage {
    address: u64,
    data: Vec<u8>,
}

impl Debug for FlashPage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashPage")
            .field("address", &format_args!("{:#010x}", self.address))
            .field("size", &format_args!("{:#x}", self.size()))
            .finish()
    }
}

impl FlashPage {
    fn new(address: u64, size: u32, erased_byte_value: u8) -> Self {
        Self {
            address,
            data: vec![erased_byte_value; size as usize],
        }
    }

    /// Returns the start address of the page.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the address range of the page.
    pub fn address_range(&self) -> Range<u64> {
        self.address..self.address + self.size() as u64
    }

    /// Returns the size of the page in bytes.
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Returns the data slice of the page.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(super) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// The description of a sector in flash.
#[derive(Clone, PartialEq, Eq)]
pub struct FlashSector {
    address: u64,
    size: u64,
}

impl Debug for FlashSector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashSector")
            .field("address", &format_args!("{:#010x}", self.address))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

impl FlashSector {
    /// Returns the start address of the sector.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the address range of the sector.
    pub fn address_range(&self) -> Range<u64> {
        self.address..self.address + self.size
    }

    /// Returns the size of the sector in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// A span inside a page which no staged data block covers.
///
/// Fills record where the page was padded, so a caller that wants to
/// preserve the previous flash contents can read those spans back from
/// the device before the sector is erased.
#[derive(Clone)]
pub struct FlashFill {
    address: u64,
    size: u64,
    page_index: usize,
}

impl Debug for FlashFill {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashFill")
            .field("address", &format_args!("{:#010x}", self.address))
            .field("size", &format_args!("{:#x}", self.size))
            .field("page_index", &self.page_index)
            .finish()
    }
}

impl FlashFill {
    fn new(address: u64, size: u64, page_index: usize) -> Self {
        Self {
            address,
            size,
            page_index,
        }
    }

    /// Returns the start address of the fill.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the size of the fill in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the index of the page this fill belongs to.
    pub fn page_index(&self) -> usize {
        self.page_index
    }
}

/// The built layout of the data in flash.
#[derive(Debug, Clone)]
pub struct FlashLayout {
    sectors: Vec<FlashSector>,
    pages: Vec<FlashPage>,
    fills: Vec<FlashFill>,
}

impl FlashLayout {
    /// The sectors that have to be erased, in ascending address order,
    /// deduplicated.
    pub fn sectors(&self) -> &[FlashSector] {
        &self.sectors
    }

    /// The pages that have to be programmed, in ascending address order.
    pub fn pages(&self) -> &[FlashPage] {
        &self.pages
    }

    pub(super) fn pages_mut(&mut self) -> &mut [FlashPage] {
        &mut self.pages
    }

    /// The padded spans inside the pages.
    pub fn fills(&self) -> &[FlashFill] {
        &self.fills
    }
}

/// A block of data that is to be written to flash.
#[derive(Clone, Copy)]
struct FlashDataBlock<'data> {
    address: u64,
    data: &'data [u8],
}

impl<'data> FlashDataBlock<'data> {
    fn new(address: u64, data: &'data [u8]) -> Self {
        Self { address, data }
    }

    fn address_range(&self) -> Range<u64> {
        self.address..self.address + self.data.len() as u64
    }
}

/// A helper structure to build a flash layout from a set of data blocks.
///
/// Blocks are kept sorted by address and must not overlap.
#[derive(Default)]
pub struct FlashBuilder<'data> {
    data_blocks: Vec<FlashDataBlock<'data>>,
}

impl<'data> FlashBuilder<'data> {
    /// Creates a new `FlashBuilder` with empty data.
    pub fn new() -> Self {
        Self {
            data_blocks: vec![],
        }
    }

    /// Add a block of data to be programmed.
    ///
    /// Programming does not start until the data is committed.
    pub fn add_data(&mut self, address: u64, data: &'data [u8]) -> Result<(), FlashError> {
        // Add the block to the sorted list, rejecting any overlap with
        // its prospective neighbours.
        match self
            .data_blocks
            .binary_search_by_key(&address, |&v| v.address)
        {
            Ok(_) => Err(FlashError::DataOverlap(address)),
            Err(position) => {
                let new_range = address..address + data.len() as u64;

                if position > 0 {
                    if let Some(block) = self.data_blocks.get(position - 1) {
                        if block.address_range().end > new_range.start {
                            return Err(FlashError::DataOverlap(address));
                        }
                    }
                }

                if let Some(block) = self.data_blocks.get(position) {
                    if new_range.end > block.address_range().start {
                        return Err(FlashError::DataOverlap(address));
                    }
                }

                self.data_blocks
                    .insert(position, FlashDataBlock::new(address, data));
                Ok(())
            }
        }
    }

    /// Whether no data has been staged yet.
    pub fn is_empty(&self) -> bool {
        self.data_blocks.is_empty()
    }

    /// The total number of staged bytes.
    pub fn size(&self) -> u64 {
        self.data_blocks
            .iter()
            .map(|block| block.data.len() as u64)
            .sum()
    }

    /// The staged data clipped to `range`, in ascending address order.
    pub(super) fn data_in_range(
        &self,
        range: &Range<u64>,
    ) -> impl Iterator<Item = (u64, &'data [u8])> + '_ {
        let range = range.clone();
        self.data_blocks.iter().filter_map(move |block| {
            let block_range = block.address_range();
            let start = block_range.start.max(range.start);
            let end = block_range.end.min(range.end);
            if start >= end {
                return None;
            }
            let offset = (start - block.address) as usize;
            let length = (end - start) as usize;
            Some((start, &block.data[offset..offset + length]))
        })
    }

    /// Lay out the staged data as full flash pages and the sectors
    /// containing them.
    ///
    /// Pages are pre-filled with the erased byte value; every span that
    /// was padded rather than staged is reported as a [`FlashFill`].
    /// Sectors come out deduplicated in ascending address order, pages
    /// in ascending address order.
    pub(super) fn build_sectors_and_pages(
        &self,
        flash_algorithm: &FlashAlgorithm,
    ) -> Result<FlashLayout, FlashError> {
        let erased_byte_value = flash_algorithm.flash_properties.erased_byte_value;

        let mut pages: Vec<FlashPage> = Vec::new();
        let mut fills: Vec<FlashFill> = Vec::new();

        // Address up to which the current (last) page is covered by
        // staged data. Anything between this and the next staged byte
        // inside the same page is a fill.
        let mut covered_until = 0u64;

        for block in &self.data_blocks {
            let mut block_offset = 0usize;

            while block_offset < block.data.len() {
                let address = block.address + block_offset as u64;

                let needs_new_page = match pages.last() {
                    Some(page) => address >= page.address_range().end,
                    None => true,
                };

                if needs_new_page {
                    // Close the fill at the tail of the previous page.
                    if let Some(page) = pages.last() {
                        let page_end = page.address_range().end;
                        if covered_until < page_end {
                            fills.push(FlashFill::new(
                                covered_until,
                                page_end - covered_until,
                                pages.len() - 1,
                            ));
                        }
                    }

                    let info = flash_algorithm
                        .page_info(address)
                        .ok_or(FlashError::InvalidFlashAddress(address))?;
                    tracing::trace!(
                        "Adding page {:#010x}..{:#010x}",
                        info.base_address,
                        info.base_address + info.size as u64
                    );
                    pages.push(FlashPage::new(
                        info.base_address,
                        info.size,
                        erased_byte_value,
                    ));
                    covered_until = info.base_address;
                }

                // The page was just pushed if it was missing.
                let page_index = pages.len() - 1;
                let page = &mut pages[page_index];

                // Record the gap in front of this chunk, if any.
                if address > covered_until {
                    fills.push(FlashFill::new(
                        covered_until,
                        address - covered_until,
                        page_index,
                    ));
                }

                let page_offset = (address - page.address()) as usize;
                let length = (page.data.len() - page_offset).min(block.data.len() - block_offset);
                page.data[page_offset..page_offset + length]
                    .copy_from_slice(&block.data[block_offset..block_offset + length]);

                covered_until = address + length as u64;
                block_offset += length;
            }
        }

        // Close the fill at the tail of the final page.
        if let Some(page) = pages.last() {
            let page_end = page.address_range().end;
            if covered_until < page_end {
                fills.push(FlashFill::new(
                    covered_until,
                    page_end - covered_until,
                    pages.len() - 1,
                ));
            }
        }

        // Collect every sector overlapped by a page. Pages come in
        // ascending order, so deduplication only has to look at the
        // last added sector.
        let mut sectors: Vec<FlashSector> = Vec::new();
        for page in &pages {
            let mut address = page.address();
            while address < page.address_range().end {
                let info = flash_algorithm
                    .sector_info(address)
                    .ok_or(FlashError::InvalidFlashAddress(address))?;
                let matches_last = sectors
                    .last()
                    .map(|sector| sector.address == info.base_address)
                    .unwrap_or(false);
                if !matches_last {
                    tracing::trace!(
                        "Adding sector {:#010x}..{:#010x}",
                        info.base_address,
                        info.base_address + info.size
                    );
                    sectors.push(FlashSector {
                        address: info.base_address,
                        size: info.size,
                    });
                }
                address = info.base_address + info.size;
            }
        }

        Ok(FlashLayout {
            sectors,
            pages,
            fills,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashprobe_target::{FlashProperties, SectorDescription};

    fn demo_algorithm(sector_size: u64) -> FlashAlgorithm {
        FlashAlgorithm {
            flash_properties: FlashProperties {
                address_range: 0x0800_0000..0x0802_0000,
                page_size: 0x400,
                min_program_length: 0x400,
                erased_byte_value: 0xff,
                program_page_timeout: 200,
                erase_sector_timeout: 200,
                sectors: vec![SectorDescription {
                    size: sector_size,
                    address: 0,
                }],
            },
            ..Default::default()
        }
    }

    #[test]
    fn add_overlapping_data() {
        let mut flash_builder = FlashBuilder::new();
        assert!(flash_builder.add_data(0, &[42]).is_ok());
        assert!(flash_builder.add_data(0, &[42]).is_err());
    }

    #[test]
    fn add_non_overlapping_data() {
        let mut flash_builder = FlashBuilder::new();
        assert!(flash_builder.add_data(0, &[42]).is_ok());
        assert!(flash_builder.add_data(1, &[42]).is_ok());
    }

    #[test]
    fn add_data_inside_previous_block_is_rejected() {
        let mut flash_builder = FlashBuilder::new();
        assert!(flash_builder.add_data(0, &[42; 16]).is_ok());
        assert!(flash_builder.add_data(8, &[42]).is_err());
        assert!(flash_builder.add_data(16, &[42]).is_ok());
    }

    #[test]
    fn single_byte_in_single_page() {
        let algorithm = demo_algorithm(0x1000);
        let mut flash_builder = FlashBuilder::new();
        flash_builder.add_data(0x0800_0000, &[42]).unwrap();
        let layout = flash_builder.build_sectors_and_pages(&algorithm).unwrap();

        assert_eq!(layout.pages().len(), 1);
        assert_eq!(layout.pages()[0].address(), 0x0800_0000);
        assert_eq!(layout.pages()[0].size(), 0x400);
        assert_eq!(layout.pages()[0].data()[0], 42);
        assert!(layout.pages()[0].data()[1..].iter().all(|b| *b == 0xff));

        assert_eq!(layout.sectors().len(), 1);
        assert_eq!(layout.sectors()[0].address(), 0x0800_0000);
        assert_eq!(layout.sectors()[0].size(), 0x1000);

        // One fill covering everything but the staged byte.
        assert_eq!(layout.fills().len(), 1);
        assert_eq!(layout.fills()[0].address(), 0x0800_0001);
        assert_eq!(layout.fills()[0].size(), 0x3ff);
    }

    #[test]
    fn full_image_has_no_fills() {
        let algorithm = demo_algorithm(0x400);
        let mut flash_builder = FlashBuilder::new();
        let image = vec![0xaa; 0x1000];
        flash_builder.add_data(0x0800_0000, &image).unwrap();
        let layout = flash_builder.build_sectors_and_pages(&algorithm).unwrap();

        assert_eq!(layout.pages().len(), 4);
        assert_eq!(layout.sectors().len(), 4);
        assert!(layout.fills().is_empty());

        let page_addresses: Vec<u64> = layout.pages().iter().map(|p| p.address()).collect();
        assert_eq!(
            page_addresses,
            vec![0x0800_0000, 0x0800_0400, 0x0800_0800, 0x0800_0c00]
        );
        let sector_addresses: Vec<u64> = layout.sectors().iter().map(|s| s.address()).collect();
        assert_eq!(page_addresses, sector_addresses);
    }

    #[test]
    fn data_at_offset_spans_two_pages() {
        let algorithm = demo_algorithm(0x400);
        let mut flash_builder = FlashBuilder::new();
        flash_builder.add_data(0x0800_0200, &[42; 0x400]).unwrap();
        let layout = flash_builder.build_sectors_and_pages(&algorithm).unwrap();

        assert_eq!(layout.pages().len(), 2);
        assert_eq!(layout.sectors().len(), 2);
        // Head of the first page and tail of the second are padded.
        assert_eq!(layout.fills().len(), 2);
        assert_eq!(layout.fills()[0].address(), 0x0800_0000);
        assert_eq!(layout.fills()[0].size(), 0x200);
        assert_eq!(layout.fills()[1].address(), 0x0800_0600);
        assert_eq!(layout.fills()[1].size(), 0x200);
    }

    #[test]
    fn sectors_smaller_than_page_are_all_collected() {
        let algorithm = demo_algorithm(0x80);
        let mut flash_builder = FlashBuilder::new();
        flash_builder.add_data(0x0800_0000, &[42; 0x400]).unwrap();
        let layout = flash_builder.build_sectors_and_pages(&algorithm).unwrap();

        assert_eq!(layout.pages().len(), 1);
        // One 0x400 page covers eight 0x80 sectors.
        assert_eq!(layout.sectors().len(), 8);
        for (index, sector) in layout.sectors().iter().enumerate() {
            assert_eq!(sector.address(), 0x0800_0000 + index as u64 * 0x80);
        }
    }

    #[test]
    fn gap_between_blocks_in_one_page_is_a_fill() {
        let algorithm = demo_algorithm(0x400);
        let mut flash_builder = FlashBuilder::new();
        flash_builder.add_data(0x0800_0000, &[1; 0x100]).unwrap();
        flash_builder.add_data(0x0800_0300, &[2; 0x100]).unwrap();
        let layout = flash_builder.build_sectors_and_pages(&algorithm).unwrap();

        assert_eq!(layout.pages().len(), 1);
        assert_eq!(layout.fills().len(), 1);
        assert_eq!(layout.fills()[0].address(), 0x0800_0100);
        assert_eq!(layout.fills()[0].size(), 0x200);
    }

    #[test]
    fn address_outside_flash_is_rejected() {
        let algorithm = demo_algorithm(0x400);
        let mut flash_builder = FlashBuilder::new();
        flash_builder.add_data(0x0900_0000, &[42]).unwrap();
        assert!(matches!(
            flash_builder.build_sectors_and_pages(&algorithm),
            Err(FlashError::InvalidFlashAddress(0x0900_0000))
        ));
    }

    #[test]
    fn data_in_range_clips_blocks() {
        let mut flash_builder = FlashBuilder::new();
        flash_builder.add_data(0x100, &[1; 0x100]).unwrap();
        flash_builder.add_data(0x300, &[2; 0x100]).unwrap();

        let clipped: Vec<(u64, usize)> = flash_builder
            .data_in_range(&(0x180..0x340))
            .map(|(address, data)| (address, data.len()))
            .collect();
        assert_eq!(clipped, vec![(0x180, 0x80), (0x300, 0x40)]);
    }
}
