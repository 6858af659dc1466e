//! STMicroelectronics STM32L073xB series.

use crate::{
    FlashAlgorithm, FlashProperties, FlashRegion, MemoryMap, MemoryRegion, RamRegion,
    RegisterWrite, Section, SectorDescription, TargetDefinition,
};

const DBGMCU_CR: u64 = 0x4001_5804;
const DBGMCU_VAL: u64 = 0x0000_0000;

pub(super) fn target() -> TargetDefinition {
    let algorithm = FlashAlgorithm {
        name: "stm32l073xb".into(),
        load_address: 0x2000_0000,
        instructions: vec![
            0xe7fdbe00, //
            0xd0012a01, 0xd1172a02, 0x6981483b, 0x0212220f, 0x61814311, 0x60c14939, 0x60c14939,
            0x61014939, 0x61014939, 0x02c069c0, 0x4839d406, 0x60014937, 0x60412106, 0x60814937,
            0x47702000, 0xd0012801, 0xd1082802, 0x6841482c, 0x43112202, 0x68416041, 0x43112201,
            0x20006041, 0xb5304770, 0x684a4926, 0x4322154c, 0x684a604a, 0x432a2508, 0x2200604a,
            0x48296002, 0xe0004a26, 0x698b6010, 0xd1fb07db, 0x43a06848, 0x68486048, 0x604843a8,
            0xbd302000, 0x47702001, 0x4c18b5f0, 0x15252300, 0x313f2608, 0x468c0989, 0x6861e024,
            0x60614329, 0x43316861, 0x21406061, 0xc080ca80, 0x29001f09, 0x4916d1fa, 0x07ff69a7,
            0x4f12d002, 0xe7f96039, 0x050969a1, 0xd0060f09, 0x210f69a0, 0x43080209, 0x200161a0,
            0x6861bdf0, 0x606143a9, 0x43b16861, 0x1c5b6061, 0xd8d8459c, 0xbdf02000, 0x40022000,
            0x89abcdef, 0x02030405, 0x8c9daebf, 0x13141516, 0x00005555, 0x40003000, 0x00000fff,
            0x0000aaaa, 0x00000000,
        ],
        pc_init: Some(0x5),
        pc_uninit: Some(0x41),
        pc_program_page: 0x99,
        pc_erase_sector: 0x5f,
        // The mass-erase entry point in the vendor blob points outside
        // the image, so chip erase is done sector by sector instead.
        pc_erase_all: None,
        static_base: 0x2000_0120,
        begin_stack: 0x2000_1930,
        end_stack: 0x2000_0930,
        begin_data: 0x2000_1000,
        page_buffers: vec![0x2000_0130, 0x2000_0530],
        analyzer_address: None,
        ro_section: Some(Section {
            offset: 0x4,
            size: 0x11c,
        }),
        rw_section: Some(Section {
            offset: 0x120,
            size: 0x4,
        }),
        zi_section: Some(Section {
            offset: 0x124,
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
                size: 0x80,
                address: 0x0,
            }],
        },
    };

    TargetDefinition {
        name: "stm32l073xb".into(),
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
        .expect("stm32l073xb memory map is valid"),
        connect_fixup: Some(RegisterWrite {
            address: DBGMCU_CR,
            value: DBGMCU_VAL,
        }),
    }
}
