//! FMSH FM33LC02x series.

use crate::{
    FlashAlgorithm, FlashProperties, FlashRegion, MemoryMap, MemoryRegion, RamRegion,
    RegisterWrite, Section, SectorDescription, TargetDefinition,
};

const DBGMCU_CR: u64 = 0x4000_0004;
const DBGMCU_VAL: u64 = 0x0000_3D03;

pub(super) fn target() -> TargetDefinition {
    let algorithm = FlashAlgorithm {
        name: "fm33lc02x".into(),
        load_address: 0x2000_0000,
        instructions: vec![
            0xe7fdbe00, //
            0xe0052200, 0xbf002100, 0x29391c49, 0x1c52d3fb, 0xd3f74282, 0x48664770, 0x22206ac1,
            0x62c14311, 0x31404963, 0x03436b0a, 0x630a431a, 0x61012101, 0x08c968c1, 0x60c100c9,
            0x47702000, 0x6ac1485c, 0x43912220, 0x485a62c1, 0x6b013040, 0x43910452, 0x20006301,
            0xb5f04770, 0x4d562400, 0x69692601, 0x02002003, 0x61694381, 0x61686968, 0x20026969,
            0x61694381, 0x43306968, 0x484f6168, 0x484f61a8, 0x026061a8, 0x2300494e, 0x01bf2719,
            0xe0056001, 0xd20642bb, 0x1c5b2001, 0xffb2f7ff, 0x07c06a28, 0x622ed0f6, 0x27ff2300,
            0xe0053791, 0xd20642bb, 0x1c5b2001, 0xffa4f7ff, 0x07c06a28, 0x2000d1f6, 0x1c6461a8,
            0xd9ca2cff, 0xb570bdf0, 0x69614c39, 0x02122203, 0x61614391, 0x61616961, 0x22026961,
            0x61614391, 0x26016961, 0x61614331, 0x61a14932, 0x61a14932, 0x23004932, 0x359125ff,
            0xe0056001, 0xd20642ab, 0x1c5b2001, 0xff7af7ff, 0x07c06a20, 0x6226d0f6, 0xe0052300,
            0xd20642ab, 0x1c5b2001, 0xff6ef7ff, 0x07c06a20, 0x2000d1f6, 0xbd7061a0, 0x4616b5f0,
            0x4604468c, 0x4f1e2500, 0x6978e034, 0x00400840, 0x69786178, 0x43082102, 0x481d6178,
            0x481d61b8, 0x787061b8, 0x02007831, 0x78b14308, 0x04092300, 0x78f04301, 0x43080600,
            0x1d36c401, 0x2b0ae005, 0x2001d206, 0xf7ff1c5b, 0x6a38ff41, 0xd5f60780, 0x21026a38,
            0x62384308, 0xe0052300, 0xd2062b0a, 0x1c5b2001, 0xff32f7ff, 0x07806a38, 0x2000d4f6,
            0x1d2d61b8, 0xd3c84565, 0xbdf02000, 0x40000200, 0x40001000, 0x96969696, 0xeaeaeaea,
            0x1234abcd, 0xa5a5a5a5, 0xf1f1f1f1, 0x00000000,
        ],
        pc_init: Some(0x1b),
        pc_uninit: Some(0x41),
        pc_program_page: 0x135,
        pc_erase_sector: 0xcf,
        pc_erase_all: Some(0x5b),
        static_base: 0x2000_01d0,
        begin_stack: 0x2000_19e0,
        end_stack: 0x2000_09e0,
        begin_data: 0x2000_1000,
        page_buffers: vec![0x2000_01e0, 0x2000_05e0],
        analyzer_address: None,
        ro_section: Some(Section {
            offset: 0x4,
            size: 0x1cc,
        }),
        rw_section: Some(Section {
            offset: 0x1d0,
            size: 0x4,
        }),
        zi_section: Some(Section {
            offset: 0x1d4,
            size: 0x0,
        }),
        flash_properties: FlashProperties {
            address_range: 0x0..0x2_0000,
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
        name: "fm33lc02x".into(),
        vendor: "FMSH".into(),
        memory_map: MemoryMap::new(vec![
            MemoryRegion::Flash(FlashRegion {
                name: Some("flash".into()),
                range: 0x0..0x2_0000,
                is_boot_memory: true,
                blocksize: 0x200,
                algorithm,
            }),
            MemoryRegion::Ram(RamRegion {
                name: Some("ram".into()),
                range: 0x2000_0000..0x2000_6000,
            }),
        ])
        .expect("fm33lc02x memory map is valid"),
        connect_fixup: Some(RegisterWrite {
            address: DBGMCU_CR,
            value: DBGMCU_VAL,
        }),
    }
}
