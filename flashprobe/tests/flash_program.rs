//! End-to-end tests of the flashing engine against a simulated target.
//!
//! The mock transport keeps a RAM and flash image and interprets a
//! resume at one of the flash algorithm's entry points as a call to
//! the corresponding routine, so the whole engine runs without
//! hardware.

use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;

use flashprobe::config::{builtin, FlashAlgorithm, TargetDefinition};
use flashprobe::flashing::{
    self, DownloadOptions, FlashBuilder, FlashError, FlashLoader, FlashProgress, Flasher,
};
use flashprobe::transport::{CoreRegister, DebugTransport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Init { operation: u64 },
    Uninit { operation: u64 },
    EraseSector { address: u64 },
    EraseAll,
    ProgramPage { address: u64, length: u64, buffer: u64 },
}

struct MockTransport {
    algo: FlashAlgorithm,
    flash_range: Range<u64>,
    ram: HashMap<u64, u8>,
    flash: HashMap<u64, u8>,
    registers: HashMap<CoreRegister, u64>,
    pc: u64,
    halted: bool,
    hang_at: Option<u64>,
    calls: Vec<Call>,
    ram_writes: Vec<u64>,
}

impl MockTransport {
    fn new(algo: &FlashAlgorithm) -> Self {
        Self {
            algo: algo.clone(),
            flash_range: algo.flash_properties.address_range.clone(),
            ram: HashMap::new(),
            flash: HashMap::new(),
            registers: HashMap::new(),
            pc: 0,
            halted: true,
            hang_at: None,
            calls: Vec::new(),
            ram_writes: Vec::new(),
        }
    }

    fn register(&self, register: CoreRegister) -> u64 {
        self.registers.get(&register).copied().unwrap_or(0)
    }

    fn flash_contents(&self, range: Range<u64>) -> Vec<u8> {
        range
            .map(|address| self.flash.get(&address).copied().unwrap_or(0xff))
            .collect()
    }

    fn erase_calls(&self) -> Vec<u64> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::EraseSector { address } => Some(*address),
                _ => None,
            })
            .collect()
    }

    fn program_calls(&self) -> Vec<(u64, u64)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::ProgramPage {
                    address, length, ..
                } => Some((*address, *length)),
                _ => None,
            })
            .collect()
    }
}

impl DebugTransport for MockTransport {
    fn write_memory_block(&mut self, address: u64, data: &[u8]) -> Result<(), TransportError> {
        assert!(
            !self.flash_range.contains(&address),
            "direct write into flash at {address:#010x}"
        );
        self.ram_writes.push(address);
        for (offset, byte) in data.iter().enumerate() {
            self.ram.insert(address + offset as u64, *byte);
        }
        Ok(())
    }

    fn read_memory_block(&mut self, address: u64, data: &mut [u8]) -> Result<(), TransportError> {
        for (offset, slot) in data.iter_mut().enumerate() {
            let address = address + offset as u64;
            *slot = if self.flash_range.contains(&address) {
                self.flash.get(&address).copied().unwrap_or(0xff)
            } else {
                self.ram.get(&address).copied().unwrap_or(0)
            };
        }
        Ok(())
    }

    fn write_register(
        &mut self,
        register: CoreRegister,
        value: u64,
    ) -> Result<(), TransportError> {
        self.registers.insert(register, value);
        Ok(())
    }

    fn read_register(&mut self, register: CoreRegister) -> Result<u64, TransportError> {
        Ok(self.register(register))
    }

    fn set_program_counter(&mut self, address: u64) -> Result<(), TransportError> {
        self.pc = address;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), TransportError> {
        if self.hang_at == Some(self.pc) {
            self.halted = false;
            return Ok(());
        }

        let r0 = self.register(CoreRegister::Argument(0));
        let r1 = self.register(CoreRegister::Argument(1));
        let r2 = self.register(CoreRegister::Argument(2));

        let result: u64 = if Some(self.pc) == self.algo.init_address() {
            self.calls.push(Call::Init { operation: r2 });
            0
        } else if Some(self.pc) == self.algo.uninit_address() {
            self.calls.push(Call::Uninit { operation: r0 });
            0
        } else if self.pc == self.algo.erase_sector_address() {
            let sector = self
                .algo
                .sector_info(r0)
                .unwrap_or_else(|| panic!("erase outside flash at {r0:#010x}"));
            for address in sector.address_range() {
                self.flash.insert(address, 0xff);
            }
            self.calls.push(Call::EraseSector { address: r0 });
            0
        } else if Some(self.pc) == self.algo.erase_all_address() {
            for address in self.flash_range.clone() {
                self.flash.insert(address, 0xff);
            }
            self.calls.push(Call::EraseAll);
            0
        } else if self.pc == self.algo.program_page_address() {
            for offset in 0..r1 {
                let byte = self.ram.get(&(r2 + offset)).copied().unwrap_or(0);
                self.flash.insert(r0 + offset, byte);
            }
            self.calls.push(Call::ProgramPage {
                address: r0,
                length: r1,
                buffer: r2,
            });
            0
        } else {
            panic!("resumed at unexpected pc {:#010x}", self.pc);
        };

        self.registers.insert(CoreRegister::Result, result);
        self.halted = true;
        Ok(())
    }

    fn wait_until_halted(&mut self, _timeout: Duration) -> Result<bool, TransportError> {
        Ok(self.halted)
    }
}

fn stm32f103xb() -> TargetDefinition {
    builtin::get("stm32f103xb").unwrap()
}

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn programs_four_sectors_in_ascending_order() {
    let target = stm32f103xb();
    let region = target.memory_map.boot_region().unwrap();
    let mut mock = MockTransport::new(&region.algorithm);

    let image = image(0x1000);
    let summary = flashing::program(&mut mock, &target, &image, 0x0800_0000).unwrap();

    assert_eq!(summary.bytes_written, 0x1000);
    assert_eq!(summary.sectors_erased, 4);

    assert_eq!(
        mock.erase_calls(),
        vec![0x0800_0000, 0x0800_0400, 0x0800_0800, 0x0800_0c00]
    );
    assert_eq!(
        mock.program_calls(),
        vec![
            (0x0800_0000, 0x400),
            (0x0800_0400, 0x400),
            (0x0800_0800, 0x400),
            (0x0800_0c00, 0x400),
        ]
    );

    // All erase calls happen before the first program call.
    let first_program = mock
        .calls
        .iter()
        .position(|call| matches!(call, Call::ProgramPage { .. }))
        .unwrap();
    let last_erase = mock
        .calls
        .iter()
        .rposition(|call| matches!(call, Call::EraseSector { .. }))
        .unwrap();
    assert!(last_erase < first_program);

    // The erase and program passes run under their own operation codes.
    assert!(mock.calls.contains(&Call::Init { operation: 1 }));
    assert!(mock.calls.contains(&Call::Uninit { operation: 1 }));
    assert!(mock.calls.contains(&Call::Init { operation: 2 }));
    assert!(mock.calls.contains(&Call::Uninit { operation: 2 }));

    assert_eq!(mock.flash_contents(0x0800_0000..0x0800_1000), image);
}

#[test]
fn double_and_single_buffering_produce_identical_flash() {
    let target = stm32f103xb();
    let region = target.memory_map.boot_region().unwrap();
    let image = image(0x1400);

    let mut run = |disable_double_buffering: bool| {
        let mut mock = MockTransport::new(&region.algorithm);
        let mut loader = FlashLoader::new(target.memory_map.clone());
        loader.add_data(0x0800_0000, &image).unwrap();
        loader
            .commit(
                &mut mock,
                DownloadOptions {
                    disable_double_buffering,
                    ..Default::default()
                },
            )
            .unwrap();
        mock
    };

    let single = run(true);
    let double = run(false);

    assert_eq!(
        single.flash_contents(0x0800_0000..0x0800_1400),
        double.flash_contents(0x0800_0000..0x0800_1400)
    );
    assert_eq!(single.erase_calls(), double.erase_calls());
    assert_eq!(single.program_calls(), double.program_calls());

    // The double buffered run alternates between both page buffers.
    let buffers: Vec<u64> = double
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::ProgramPage { buffer, .. } => Some(*buffer),
            _ => None,
        })
        .collect();
    assert_eq!(
        buffers,
        vec![
            region.algorithm.page_buffers[0],
            region.algorithm.page_buffers[1],
            region.algorithm.page_buffers[0],
            region.algorithm.page_buffers[1],
            region.algorithm.page_buffers[0],
        ]
    );
}

#[test]
fn short_image_is_padded_with_the_erased_byte() {
    let target = stm32f103xb();
    let region = target.memory_map.boot_region().unwrap();
    let mut mock = MockTransport::new(&region.algorithm);

    let image = image(0x100);
    let summary = flashing::program(&mut mock, &target, &image, 0x0800_0000).unwrap();

    assert_eq!(summary.bytes_written, 0x100);
    assert_eq!(summary.sectors_erased, 1);
    assert_eq!(mock.program_calls(), vec![(0x0800_0000, 0x400)]);

    let mut expected = image.clone();
    expected.resize(0x400, 0xff);
    assert_eq!(mock.flash_contents(0x0800_0000..0x0800_0400), expected);
}

#[test]
fn erasing_a_sector_twice_succeeds() {
    let target = stm32f103xb();
    let region = target.memory_map.boot_region().unwrap();
    let mut mock = MockTransport::new(&region.algorithm);

    // Unaligned addresses are resolved to the containing sector.
    flashing::erase_sector(&mut mock, &target, 0x0800_0410).unwrap();
    let after_first = mock.flash_contents(0x0800_0400..0x0800_0800);

    flashing::erase_sector(&mut mock, &target, 0x0800_0410).unwrap();
    let after_second = mock.flash_contents(0x0800_0400..0x0800_0800);

    assert_eq!(mock.erase_calls(), vec![0x0800_0400, 0x0800_0400]);
    assert_eq!(after_first, vec![0xff; 0x400]);
    assert_eq!(after_first, after_second);
}

#[test]
fn programming_an_unerased_sector_is_rejected_without_transport_writes() {
    let target = stm32f103xb();
    let region = target.memory_map.boot_region().unwrap();
    let mut mock = MockTransport::new(&region.algorithm);

    let data = [0x55u8; 0x400];
    let mut builder = FlashBuilder::new();
    builder.add_data(0x0800_0000, &data).unwrap();

    let mut flasher = Flasher::new(&mut mock, region, FlashProgress::empty()).unwrap();
    let result = flasher.program(&builder, false, false, true);
    assert!(matches!(
        result,
        Err(FlashError::SectorNotErased {
            page_address: 0x0800_0000
        })
    ));
    drop(flasher);

    // Only the algorithm image itself was downloaded; no page data
    // reached the target.
    assert_eq!(mock.ram_writes, vec![region.algorithm.load_address]);
    assert!(mock.program_calls().is_empty());
    assert!(mock.flash.is_empty());
}

#[test]
fn init_timeout_aborts_before_any_program_call() {
    let target = stm32f103xb();
    let region = target.memory_map.boot_region().unwrap();
    let mut mock = MockTransport::new(&region.algorithm);
    mock.hang_at = region.algorithm.init_address();

    let image = image(0x1000);
    let result = flashing::program(&mut mock, &target, &image, 0x0800_0000);

    assert!(matches!(
        result,
        Err(FlashError::AlgorithmTimeout {
            routine: "init",
            ..
        })
    ));
    assert!(mock.program_calls().is_empty());
    assert!(mock.erase_calls().is_empty());
}

#[test]
fn chip_erase_uses_the_erase_all_routine() {
    let target = stm32f103xb();
    let region = target.memory_map.boot_region().unwrap();
    let mut mock = MockTransport::new(&region.algorithm);

    flashing::erase_all(&mut mock, &target).unwrap();

    assert_eq!(mock.calls.iter().filter(|c| **c == Call::EraseAll).count(), 1);
    assert!(mock.erase_calls().is_empty());
}

#[test]
fn chip_erase_falls_back_to_sectors_without_an_erase_all_routine() {
    // The stm32l073xb descriptor ships without a usable erase-all
    // entry point.
    let target = builtin::get("stm32l073xb").unwrap();
    let region = target.memory_map.boot_region().unwrap();
    assert!(region.algorithm.pc_erase_all.is_none());

    let mut mock = MockTransport::new(&region.algorithm);
    flashing::erase_all(&mut mock, &target).unwrap();

    let sector_count = (region.range.end - region.range.start) / 0x80;
    assert_eq!(mock.erase_calls().len(), sector_count as usize);
    assert!(!mock.calls.contains(&Call::EraseAll));
}

#[test]
fn keep_unwritten_bytes_restores_previous_contents() {
    let target = stm32f103xb();
    let region = target.memory_map.boot_region().unwrap();
    let mut mock = MockTransport::new(&region.algorithm);

    // Pre-existing flash contents in the second half of the page.
    for (offset, address) in (0x0800_0200u64..0x0800_0400).enumerate() {
        mock.flash.insert(address, (offset % 7) as u8);
    }
    let previous = mock.flash_contents(0x0800_0200..0x0800_0400);

    let data = [0x11u8; 0x200];
    let mut loader = FlashLoader::new(target.memory_map.clone());
    loader.add_data(0x0800_0000, &data).unwrap();
    loader
        .commit(
            &mut mock,
            DownloadOptions {
                keep_unwritten_bytes: true,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(
        mock.flash_contents(0x0800_0000..0x0800_0200),
        vec![0x11; 0x200]
    );
    assert_eq!(mock.flash_contents(0x0800_0200..0x0800_0400), previous);
}

#[test]
fn data_outside_flash_is_rejected() {
    let target = stm32f103xb();
    let mut loader = FlashLoader::new(target.memory_map.clone());
    let data = [0u8; 16];
    assert!(matches!(
        loader.add_data(0x2000_0000, &data),
        Err(FlashError::NoFlashRegion { .. })
    ));
}
