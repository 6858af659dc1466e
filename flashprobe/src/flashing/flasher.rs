use std::marker::PhantomData;
use std::ops::Range;
use std::time::{Duration, Instant};

use flashprobe_target::{FlashAlgorithm, FlashRegion, MemoryRange};

use super::{FlashBuilder, FlashError, FlashFill, FlashLayout, FlashPage, FlashProgress};
use crate::transport::{CoreRegister, DebugTransport};

/// Timeout for the init and uninit routines.
const INIT_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout for a full chip erase.
const CHIP_ERASE_TIMEOUT: Duration = Duration::from_secs(30);

pub(super) trait Operation {
    fn operation() -> u32;
    fn operation_name() -> &'static str {
        match Self::operation() {
            1 => "Erase",
            2 => "Program",
            3 => "Verify",
            _ => "Unknown Operation",
        }
    }
}

pub(super) struct Erase;

impl Operation for Erase {
    fn operation() -> u32 {
        1
    }
}

pub(super) struct Program;

impl Operation for Program {
    fn operation() -> u32 {
        2
    }
}

pub(super) struct Verify;

impl Operation for Verify {
    fn operation() -> u32 {
        3
    }
}

/// Drives the flash algorithm of one flash region over a debug
/// transport.
///
/// Constructing a `Flasher` loads the algorithm image into target RAM
/// and verifies it by read-back. The flasher then tracks which sectors
/// have been erased during its lifetime; a page is never programmed
/// into a sector that was not erased in the same session.
pub struct Flasher<'transport> {
    transport: &'transport mut dyn DebugTransport,
    region: FlashRegion,
    progress: FlashProgress,
    erased: Vec<Range<u64>>,
}

impl<'transport> Flasher<'transport> {
    /// Create a flasher for `region` and load its algorithm into
    /// target RAM.
    pub fn new(
        transport: &'transport mut dyn DebugTransport,
        region: &FlashRegion,
        progress: FlashProgress,
    ) -> Result<Self, FlashError> {
        region.algorithm.validate()?;

        let mut this = Self {
            transport,
            region: region.clone(),
            progress,
            erased: Vec::new(),
        };

        this.load()?;

        Ok(this)
    }

    /// The algorithm this flasher drives.
    pub fn flash_algorithm(&self) -> &FlashAlgorithm {
        &self.region.algorithm
    }

    /// Whether two page buffers are configured, enabling the
    /// double-buffered programming pipeline.
    pub fn double_buffering_supported(&self) -> bool {
        self.region.algorithm.double_buffering_supported()
    }

    fn load(&mut self) -> Result<(), FlashError> {
        let algo = &self.region.algorithm;
        tracing::debug!(
            "Loading flash algorithm '{}' to address {:#010x}",
            algo.name,
            algo.load_address
        );

        let mut image = Vec::with_capacity(algo.instructions.len() * 4);
        for word in &algo.instructions {
            image.extend_from_slice(&word.to_le_bytes());
        }

        self.transport.write_memory_block(algo.load_address, &image)?;

        let mut readback = vec![0u8; image.len()];
        self.transport
            .read_memory_block(algo.load_address, &mut readback)?;

        if let Some(offset) = image
            .iter()
            .zip(readback.iter())
            .position(|(original, read_back)| original != read_back)
        {
            let address = algo.load_address + offset as u64;
            tracing::error!(
                "Verification of the loaded flash algorithm failed: \
                 mismatch at address {:#010x}",
                address
            );
            return Err(FlashError::AlgorithmLoad { address });
        }

        tracing::debug!("RAM contents match the flash algorithm image.");
        Ok(())
    }

    fn init<O: Operation>(
        &mut self,
        clock: Option<u32>,
    ) -> Result<ActiveFlasher<'_, O>, FlashError> {
        tracing::debug!("Preparing flasher for operation {}", O::operation_name());

        let mut active = ActiveFlasher::<O> {
            transport: &mut *self.transport,
            flash_algorithm: self.region.algorithm.clone(),
            progress: self.progress.clone(),
            _operation: PhantomData,
        };

        active.init(clock)?;

        Ok(active)
    }

    fn run_erase<T, F>(&mut self, f: F) -> Result<T, FlashError>
    where
        F: FnOnce(&mut ActiveFlasher<'_, Erase>) -> Result<T, FlashError>,
    {
        let mut active = self.init(None)?;
        let result = f(&mut active);
        active.uninit();
        result
    }

    fn run_program<T, F>(&mut self, f: F) -> Result<T, FlashError>
    where
        F: FnOnce(&mut ActiveFlasher<'_, Program>) -> Result<T, FlashError>,
    {
        let mut active = self.init(None)?;
        let result = f(&mut active);
        active.uninit();
        result
    }

    fn run_verify<T, F>(&mut self, f: F) -> Result<T, FlashError>
    where
        F: FnOnce(&mut ActiveFlasher<'_, Verify>) -> Result<T, FlashError>,
    {
        let mut active = self.init(None)?;
        let result = f(&mut active);
        active.uninit();
        result
    }

    fn mark_erased(&mut self, range: Range<u64>) {
        let position = self.erased.partition_point(|r| r.start < range.start);
        self.erased.insert(position, range);

        let mut merged: Vec<Range<u64>> = Vec::with_capacity(self.erased.len());
        for range in self.erased.drain(..) {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        self.erased = merged;
    }

    fn is_erased(&self, range: &Range<u64>) -> bool {
        self.erased.iter().any(|erased| erased.contains_range(range))
    }

    /// Marks the whole region as erased without any transport traffic,
    /// for callers that guarantee the flash contents are already blank.
    pub(super) fn assume_pre_erased(&mut self) {
        let range = self.region.algorithm.flash_properties.address_range.clone();
        self.mark_erased(range);
    }

    /// Erase the entire flash region with the algorithm's erase-all
    /// routine.
    ///
    /// Fails with [`FlashError::EraseAllNotSupported`] when the
    /// algorithm has no such routine; the caller may fall back to
    /// erasing sector by sector.
    pub fn erase_all(&mut self) -> Result<(), FlashError> {
        self.progress.started_erasing();
        let result = self.run_erase(|active| active.erase_all());

        match result {
            Ok(()) => {
                self.assume_pre_erased();
                self.progress.finished_erasing();
                Ok(())
            }
            Err(error) => {
                self.progress.failed_erasing();
                Err(error)
            }
        }
    }

    /// Erase the single sector starting at `address`.
    ///
    /// `address` must be the base address of a sector of this region.
    pub fn erase_sector(&mut self, address: u64) -> Result<(), FlashError> {
        let sector = self
            .region
            .algorithm
            .sector_info(address)
            .ok_or(FlashError::InvalidFlashAddress(address))?;
        if sector.base_address != address {
            return Err(FlashError::InvalidFlashAddress(address));
        }

        self.run_erase(|active| active.erase_sector(address))?;
        self.mark_erased(sector.address_range());
        Ok(())
    }

    /// Program the contents of the given `FlashBuilder` into this
    /// region.
    ///
    /// If `restore_unwritten_bytes` is true, padded page spans are read
    /// back from the flash first so the previous contents survive the
    /// erase. If `skip_erasing` is true no erase calls are issued; the
    /// sectors touched must then already have been erased in this
    /// session or the pass is rejected. Returns the number of sectors
    /// erased by this call.
    pub fn program(
        &mut self,
        builder: &FlashBuilder<'_>,
        restore_unwritten_bytes: bool,
        enable_double_buffering: bool,
        skip_erasing: bool,
    ) -> Result<usize, FlashError> {
        tracing::debug!("Starting program procedure.");
        let mut flash_layout = builder.build_sectors_and_pages(&self.region.algorithm)?;
        self.progress.initialized(flash_layout.clone());

        tracing::debug!("Double buffering enabled: {:?}", enable_double_buffering);
        tracing::debug!(
            "Restoring unwritten bytes enabled: {:?}",
            restore_unwritten_bytes
        );

        if restore_unwritten_bytes {
            let fills = flash_layout.fills().to_vec();
            self.progress.started_filling();
            for fill in &fills {
                let t = Instant::now();
                let page = &mut flash_layout.pages_mut()[fill.page_index()];

                if let Err(error) = self.fill_page(page, fill) {
                    self.progress.failed_filling();
                    return Err(error);
                }
                self.progress.page_filled(fill.size(), t.elapsed());
            }
            self.progress.finished_filling();
        }

        let mut sectors_erased = 0;
        if !skip_erasing {
            self.sector_erase(&flash_layout)?;
            sectors_erased = flash_layout.sectors().len();
        }

        // Never program into a sector that was not erased during this
        // session. Checked before any page data goes over the wire.
        for page in flash_layout.pages() {
            if !self.is_erased(&page.address_range()) {
                return Err(FlashError::SectorNotErased {
                    page_address: page.address(),
                });
            }
        }

        if self.double_buffering_supported() && enable_double_buffering {
            self.program_double_buffer(&flash_layout)?;
        } else {
            self.program_simple(&flash_layout)?;
        }

        Ok(sectors_erased)
    }

    /// Read the current flash contents of a padded span back into the
    /// page, so the erase/program cycle preserves them.
    fn fill_page(&mut self, page: &mut FlashPage, fill: &FlashFill) -> Result<(), FlashError> {
        let page_offset = (fill.address() - page.address()) as usize;
        let page_slice = &mut page.data_mut()[page_offset..page_offset + fill.size() as usize];
        self.run_verify(|active| {
            active
                .transport
                .read_memory_block(fill.address(), page_slice)
                .map_err(FlashError::from)
        })
    }

    /// Erase all sectors of the given layout, ascending.
    fn sector_erase(&mut self, flash_layout: &FlashLayout) -> Result<(), FlashError> {
        self.progress.started_erasing();

        let mut t = Instant::now();
        let result = self.run_erase(|active| {
            for sector in flash_layout.sectors() {
                active.erase_sector(sector.address())?;
                active.progress.sector_erased(sector.size(), t.elapsed());
                t = Instant::now();
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                for sector in flash_layout.sectors() {
                    self.mark_erased(sector.address_range());
                }
                self.progress.finished_erasing();
                Ok(())
            }
            Err(error) => {
                self.progress.failed_erasing();
                Err(error)
            }
        }
    }

    /// Program the layout's pages one by one through the single data
    /// buffer.
    fn program_simple(&mut self, flash_layout: &FlashLayout) -> Result<(), FlashError> {
        self.progress.started_programming();

        let mut t = Instant::now();
        let result = self.run_program(|active| {
            for page in flash_layout.pages() {
                active.program_page(page.address(), page.data())?;
                active.progress.page_programmed(page.size(), t.elapsed());
                t = Instant::now();
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                self.progress.finished_programming();
                Ok(())
            }
            Err(error) => {
                self.progress.failed_programming();
                Err(error)
            }
        }
    }

    /// Program the layout's pages using both page buffers.
    ///
    /// While the algorithm is programming the contents of one buffer,
    /// the data for the next page is already downloaded into the other
    /// buffer, overlapping transport latency with in-chip programming
    /// time. The buffers swap only after the in-flight call returned
    /// successfully.
    fn program_double_buffer(&mut self, flash_layout: &FlashLayout) -> Result<(), FlashError> {
        self.progress.started_programming();

        let page_timeout = Duration::from_millis(
            self.region.algorithm.flash_properties.program_page_timeout as u64,
        );

        let mut t = Instant::now();
        let result = self.run_program(|active| {
            let mut current_buffer = 0;
            let mut in_flight: Option<(u64, u32)> = None;

            for page in flash_layout.pages() {
                // Download the next page while the previous one may
                // still be programming.
                active.load_page_buffer(page.data(), current_buffer)?;

                if let Some((address, size)) = in_flight.take() {
                    let result = active.wait_for_completion(page_timeout, "program_page")?;
                    if result != 0 {
                        return Err(FlashError::ProgramFailed {
                            page_address: address,
                            error_code: result,
                        });
                    }
                    active.progress.page_programmed(size, t.elapsed());
                    t = Instant::now();
                }

                active.start_program_page_with_buffer(page.address(), current_buffer)?;
                in_flight = Some((page.address(), page.size()));

                current_buffer = if current_buffer == 1 { 0 } else { 1 };
            }

            if let Some((address, size)) = in_flight {
                let result = active.wait_for_completion(page_timeout, "program_page")?;
                if result != 0 {
                    return Err(FlashError::ProgramFailed {
                        page_address: address,
                        error_code: result,
                    });
                }
                active.progress.page_programmed(size, t.elapsed());
            }

            Ok(())
        });

        match result {
            Ok(()) => {
                self.progress.finished_programming();
                Ok(())
            }
            Err(error) => {
                self.progress.failed_programming();
                Err(error)
            }
        }
    }
}

/// The register state for one algorithm routine call.
struct Registers {
    pc: u64,
    r0: Option<u64>,
    r1: Option<u64>,
    r2: Option<u64>,
    r3: Option<u64>,
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}({:?}, {:?}, {:?}, {:?})",
            self.pc, self.r0, self.r1, self.r2, self.r3
        )
    }
}

/// A flasher whose algorithm has been initialized for one operation.
///
/// The operation code passed to the init routine is pinned in the type,
/// so erase calls cannot be issued on a flasher initialized for
/// programming and vice versa.
pub(super) struct ActiveFlasher<'transport, O: Operation> {
    transport: &'transport mut dyn DebugTransport,
    flash_algorithm: FlashAlgorithm,
    progress: FlashProgress,
    _operation: PhantomData<O>,
}

impl<'transport, O: Operation> ActiveFlasher<'transport, O> {
    fn init(&mut self, clock: Option<u32>) -> Result<(), FlashError> {
        let algo = &self.flash_algorithm;
        let address = algo.flash_properties.address_range.start;

        // Execute the init routine if one is present.
        if let Some(pc_init) = algo.init_address() {
            let result = self.call_function_and_wait(
                &Registers {
                    pc: pc_init,
                    r0: Some(address),
                    r1: Some(clock.unwrap_or_default() as u64),
                    r2: Some(O::operation() as u64),
                    r3: None,
                },
                true,
                INIT_TIMEOUT,
                "init",
            )?;

            if result != 0 {
                return Err(FlashError::AlgorithmInit { error_code: result });
            }
        }

        Ok(())
    }

    /// Run the uninit routine, best effort.
    ///
    /// The algorithm's RAM footprint is about to be discarded anyway,
    /// so a failure here is logged rather than escalated. Runs even
    /// when the preceding pass failed.
    fn uninit(&mut self) {
        tracing::debug!("Running uninit routine.");
        let algo = &self.flash_algorithm;

        let Some(pc_uninit) = algo.uninit_address() else {
            return;
        };

        let result = self.call_function_and_wait(
            &Registers {
                pc: pc_uninit,
                r0: Some(O::operation() as u64),
                r1: None,
                r2: None,
                r3: None,
            },
            false,
            INIT_TIMEOUT,
            "uninit",
        );

        match result {
            Ok(0) => (),
            Ok(error_code) => {
                tracing::warn!("The uninit routine returned error code {error_code}.")
            }
            Err(error) => tracing::warn!("Failed to run the uninit routine: {error}"),
        }
    }

    fn call_function_and_wait(
        &mut self,
        registers: &Registers,
        init: bool,
        timeout: Duration,
        routine: &'static str,
    ) -> Result<u64, FlashError> {
        self.call_function(registers, init)?;
        self.wait_for_completion(timeout, routine)
    }

    fn call_function(&mut self, registers: &Registers, init: bool) -> Result<(), FlashError> {
        tracing::debug!("Calling routine {:?}, init={}", registers, init);

        let algo = &self.flash_algorithm;

        self.transport.set_program_counter(registers.pc)?;

        let arguments = [registers.r0, registers.r1, registers.r2, registers.r3];
        for (index, value) in arguments.iter().enumerate() {
            if let Some(value) = value {
                self.transport
                    .write_register(CoreRegister::Argument(index), *value)?;
            }
        }

        if init {
            self.transport
                .write_register(CoreRegister::StaticBase, algo.static_base)?;
            self.transport
                .write_register(CoreRegister::StackPointer, algo.begin_stack)?;
        }

        // The blob starts with a breakpoint pair; returning to its load
        // address (with the Thumb bit set) halts the core and marks the
        // routine as finished.
        self.transport
            .write_register(CoreRegister::ReturnAddress, algo.load_address | 1)?;

        self.transport.resume()?;

        Ok(())
    }

    fn wait_for_completion(
        &mut self,
        timeout: Duration,
        routine: &'static str,
    ) -> Result<u64, FlashError> {
        tracing::debug!("Waiting for routine call completion.");

        if !self.transport.wait_until_halted(timeout)? {
            return Err(FlashError::AlgorithmTimeout { routine, timeout });
        }

        Ok(self.transport.read_register(CoreRegister::Result)?)
    }
}

impl<'transport> ActiveFlasher<'transport, Erase> {
    pub(super) fn erase_all(&mut self) -> Result<(), FlashError> {
        tracing::debug!("Erasing entire chip.");

        let Some(pc_erase_all) = self.flash_algorithm.erase_all_address() else {
            return Err(FlashError::EraseAllNotSupported);
        };

        let result = self.call_function_and_wait(
            &Registers {
                pc: pc_erase_all,
                r0: None,
                r1: None,
                r2: None,
                r3: None,
            },
            false,
            CHIP_ERASE_TIMEOUT,
            "erase_all",
        )?;

        if result != 0 {
            return Err(FlashError::EraseFailed {
                sector_address: self.flash_algorithm.flash_properties.address_range.start,
                error_code: result,
            });
        }

        Ok(())
    }

    pub(super) fn erase_sector(&mut self, address: u64) -> Result<(), FlashError> {
        tracing::info!("Erasing sector at address {:#010x}", address);
        let t = Instant::now();

        let timeout = Duration::from_millis(
            self.flash_algorithm.flash_properties.erase_sector_timeout as u64,
        );
        let result = self.call_function_and_wait(
            &Registers {
                pc: self.flash_algorithm.erase_sector_address(),
                r0: Some(address),
                r1: None,
                r2: None,
                r3: None,
            },
            false,
            timeout,
            "erase_sector",
        )?;
        tracing::info!(
            "Done erasing sector. Result is {}. This took {:?}",
            result,
            t.elapsed()
        );

        if result != 0 {
            return Err(FlashError::EraseFailed {
                sector_address: address,
                error_code: result,
            });
        }

        Ok(())
    }
}

impl<'transport> ActiveFlasher<'transport, Program> {
    pub(super) fn program_page(&mut self, address: u64, bytes: &[u8]) -> Result<(), FlashError> {
        let t = Instant::now();
        tracing::info!(
            "Programming page at address {:#010x} with size {}",
            address,
            bytes.len()
        );

        // Transfer the page data into the scratch RAM.
        self.transport
            .write_memory_block(self.flash_algorithm.begin_data, bytes)?;

        let timeout = Duration::from_millis(
            self.flash_algorithm.flash_properties.program_page_timeout as u64,
        );
        let result = self.call_function_and_wait(
            &Registers {
                pc: self.flash_algorithm.program_page_address(),
                r0: Some(address),
                r1: Some(bytes.len() as u64),
                r2: Some(self.flash_algorithm.begin_data),
                r3: None,
            },
            false,
            timeout,
            "program_page",
        )?;
        tracing::info!("Programming took {:?}", t.elapsed());

        if result != 0 {
            return Err(FlashError::ProgramFailed {
                page_address: address,
                error_code: result,
            });
        }

        Ok(())
    }

    pub(super) fn start_program_page_with_buffer(
        &mut self,
        address: u64,
        buffer_number: usize,
    ) -> Result<(), FlashError> {
        // A bad buffer number is a bug in the flashing code, not a
        // runtime condition.
        assert!(
            buffer_number < self.flash_algorithm.page_buffers.len(),
            "invalid page buffer index {}/{}",
            buffer_number,
            self.flash_algorithm.page_buffers.len()
        );

        self.call_function(
            &Registers {
                pc: self.flash_algorithm.program_page_address(),
                r0: Some(address),
                r1: Some(self.flash_algorithm.flash_properties.page_size as u64),
                r2: Some(self.flash_algorithm.page_buffers[buffer_number]),
                r3: None,
            },
            false,
        )
    }

    pub(super) fn load_page_buffer(
        &mut self,
        bytes: &[u8],
        buffer_number: usize,
    ) -> Result<(), FlashError> {
        assert!(
            buffer_number < self.flash_algorithm.page_buffers.len(),
            "invalid page buffer index {}/{}",
            buffer_number,
            self.flash_algorithm.page_buffers.len()
        );

        let t = Instant::now();
        self.transport
            .write_memory_block(self.flash_algorithm.page_buffers[buffer_number], bytes)?;
        tracing::debug!(
            "Took {:?} to download a {} byte page into RAM",
            t.elapsed(),
            bytes.len()
        );

        Ok(())
    }
}
