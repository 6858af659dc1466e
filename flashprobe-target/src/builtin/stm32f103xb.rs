//! STMicroelectronics STM32F103xB series.

use crate::{
    FlashAlgorithm, FlashProperties, FlashRegion, MemoryMap, MemoryRegion, RamRegion,
    RegisterWrite, Section, SectorDescription, TargetDefinition,
};

const DBGMCU_CR: u64 = 0xE004_2004;
const DBGMCU_VAL: u64 = 0x7E3F_FF00;

pub(super) fn target() -> TargetDefinition {
    let algorithm = FlashAlgorithm {
        name: "stm32f103xb".into(),
        load_address: 0x2000_0000,
        instructions: vec![
            0xe7fdbe00, //
            0x4603b510, 0x4c442000, 0x48446020, 0x48446060, 0x46206060, 0xf01069c0, 0xd1080f04,
            0x5055f245, 0x60204c40, 0x60602006, 0x70fff640, 0x200060a0, 0x4601bd10, 0x69004838,
            0x0080f040, 0x61104a36, 0x47702000, 0x69004834, 0x0004f040, 0x61084932, 0x69004608,
            0x0040f040, 0xe0036108, 0x20aaf64a, 0x60084930, 0x68c0482c, 0x0f01f010, 0x482ad1f6,
            0xf0206900, 0x49280004, 0x20006108, 0x46014770, 0x69004825, 0x0002f040, 0x61104a23,
            0x61414610, 0xf0406900, 0x61100040, 0xf64ae003, 0x4a2120aa, 0x481d6010, 0xf01068c0,
            0xd1f60f01, 0x6900481a, 0x0002f020, 0x61104a18, 0x47702000, 0x4603b510, 0xf0201c48,
            0xe0220101, 0x69004813, 0x0001f040, 0x61204c11, 0x80188810, 0x480fbf00, 0xf01068c0,
            0xd1fa0f01, 0x6900480c, 0x0001f020, 0x61204c0a, 0x68c04620, 0x0f14f010, 0x4620d006,
            0xf04068c0, 0x60e00014, 0xbd102001, 0x1c921c9b, 0x29001e89, 0x2000d1da, 0x0000e7f7,
            0x40022000, 0x45670123, 0xcdef89ab, 0x40003000, 0x00000000,
        ],
        pc_init: Some(0x5),
        pc_uninit: Some(0x37),
        pc_program_page: 0xc1,
        pc_erase_sector: 0x83,
        pc_erase_all: Some(0x49),
        static_base: 0x2000_012c,
        begin_stack: 0x2000_1930,
        end_stack: 0x2000_0930,
        begin_data: 0x2000_1000,
        page_buffers: vec![0x2000_0130, 0x2000_0530],
        analyzer_address: None,
        ro_section: Some(Section {
            offset: 0x4,
            size: 0x128,
        }),
        rw_section: Some(Section {
            offset: 0x12c,
            size: 0x4,
        }),
        zi_section: Some(Section {
            offset: 0x130,
            size: 0x0,
        }),
        flash_properties: FlashProperties {
            address_range: 0x0800_0000..0x0802_0000,
            page_size: 0x400,
            min_program_length: 0x400,
            erased_byte_value: 0xff,
            program_page_timeout: 1000,
            erase_sector_timeout: 2000,
            sectors: vec![SectorDescription {
                size: 0x400,
                address: 0x0,
            }],
        },
    };

    TargetDefinition {
        name: "stm32f103xb".into(),
        vendor: "STMicroelectronics".into(),
        memory_map: MemoryMap::new(vec![
            MemoryRegion::Flash(FlashRegion {
                name: Some("flash".into()),
                range: 0x0800_0000..0x0802_0000,
                is_boot_memory: true,
                blocksize: 0x200,
                algorithm,
            }),
            MemoryRegion::Ram(RamRegion {
                name: Some("ram".into()),
                range: 0x2000_0000..0x2000_5000,
            }),
        ])
        .expect("stm32f103xb memory map is valid"),
        connect_fixup: Some(RegisterWrite {
            address: DBGMCU_CR,
            value: DBGMCU_VAL,
        }),
    }
}
