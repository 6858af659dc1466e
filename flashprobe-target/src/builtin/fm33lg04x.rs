//! FMSH FM33LG04x series.

use crate::{
    FlashAlgorithm, FlashProperties, FlashRegion, MemoryMap, MemoryRegion, RamRegion,
    RegisterWrite, Section, SectorDescription, TargetDefinition,
};

const DBGMCU_CR: u64 = 0x4000_0004;
const DBGMCU_VAL: u64 = 0x0001_FF03;

pub(super) fn target() -> TargetDefinition {
    let algorithm = FlashAlgorithm {
        name: "fm33lg04x".into(),
        load_address: 0x2000_0000,
        instructions: vec![
            0xe7fdbe00, //
            0xe0052200, 0xbf002100, 0x29391c49, 0x1c52d3fb, 0xd3f74282, 0x48544770, 0x22206b81,
            0x63814311, 0x31404951, 0x050368ca, 0x60ca431a, 0x60412101, 0x08c96801, 0x600100c9,
            0x47702000, 0x6b81484a, 0x43912220, 0x48486381, 0x68c13040, 0x43910602, 0x200060c1,
            0xb5f04770, 0x4d442400, 0x69692601, 0x02002003, 0x61694381, 0x20026969, 0x61694381,
            0x43306968, 0x483e6168, 0x483e61a8, 0x026061a8, 0x2300493d, 0x379127ff, 0xe0056001,
            0xd20642bb, 0x1c5b2001, 0xffb4f7ff, 0x07c06a28, 0x622ed0f6, 0x61a82000, 0x02402001,
            0x42841c64, 0x2000d3d7, 0xb570bdf0, 0x69614c2d, 0x02122203, 0x61614391, 0x22026961,
            0x61614391, 0x25016961, 0x61614329, 0x61a14927, 0x61a14927, 0x23004927, 0x369126ff,
            0xe0056001, 0xd20642b3, 0x1c5b2001, 0xff88f7ff, 0x07c06a20, 0x6225d0f6, 0x61a02000,
            0xb5f0bd70, 0x468c4616, 0x25004604, 0xe0294f18, 0x08406978, 0x61780040, 0x21026978,
            0x61784308, 0x61b84817, 0x61b84817, 0x78317870, 0x43080200, 0x230078b1, 0x43010409,
            0x060078f0, 0xc4014308, 0xe0071d36, 0x309120ff, 0xd2064283, 0x1c5b2001, 0xff58f7ff,
            0x07806a38, 0x2002d5f4, 0x20006238, 0x1d2d61b8, 0xd3d34565, 0xbdf02000, 0x40002400,
            0x40001000, 0x96969696, 0xeaeaeaea, 0x1234abcd, 0xa5a5a5a5, 0xf1f1f1f1, 0x00000000,
        ],
        pc_init: Some(0x1b),
        pc_uninit: Some(0x41),
        pc_program_page: 0x103,
        pc_erase_sector: 0xb7,
        pc_erase_all: Some(0x5b),
        static_base: 0x2000_0188,
        begin_stack: 0x2000_1990,
        end_stack: 0x2000_0990,
        begin_data: 0x2000_1000,
        page_buffers: vec![0x2000_0190, 0x2000_0590],
        analyzer_address: None,
        ro_section: Some(Section {
            offset: 0x4,
            size: 0x184,
        }),
        rw_section: Some(Section {
            offset: 0x188,
            size: 0x4,
        }),
        zi_section: Some(Section {
            offset: 0x18c,
            size: 0x0,
        }),
        flash_properties: FlashProperties {
            address_range: 0x0..0x4_0000,
            page_size: 0x400,
            min_program_length: 0x400,
            erased_byte_value: 0xff,
            program_page_timeout: 1000,
            erase_sector_timeout: 2000,
            sectors: vec![SectorDescription {
                size: 0x200,
                address: 0x0,
            }],
        },
    };

    TargetDefinition {
        name: "fm33lg04x".into(),
        vendor: "FMSH".into(),
        memory_map: MemoryMap::new(vec![
            MemoryRegion::Flash(FlashRegion {
                name: Some("flash".into()),
                range: 0x0..0x4_0000,
                is_boot_memory: true,
                blocksize: 0x200,
                algorithm,
            }),
            MemoryRegion::Ram(RamRegion {
                name: Some("ram".into()),
                range: 0x2000_0000..0x2000_8000,
            }),
        ])
        .expect("fm33lg04x memory map is valid"),
        connect_fixup: Some(RegisterWrite {
            address: DBGMCU_CR,
            value: DBGMCU_VAL,
        }),
    }
}
