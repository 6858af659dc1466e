//! Target description schema
//!
//! To program the flash of a microcontroller, called *target* in flashprobe,
//! some target specific configuration is required: the layout of the target's
//! address space, and a flash algorithm which can be loaded into target RAM
//! to perform the actual erasing and programming.
//!
//! This crate contains the schema structs for these descriptions. They are
//! either compiled in (see [`builtin`]) or read from YAML target description
//! files (see [`TargetDefinition::from_yaml`]).
#![warn(missing_docs)]

pub mod builtin;
mod error;
mod flash_algorithm;
mod flash_properties;
mod memory;
mod memory_map;
pub(crate) mod serialize;
mod target;

pub use error::ConfigError;
pub use flash_algorithm::{FlashAlgorithm, Section};
pub use flash_properties::FlashProperties;
pub use memory::{
    FlashRegion, GenericRegion, MemoryRange, MemoryRegion, PageInfo, RamRegion, RegionKind,
    SectorDescription, SectorInfo,
};
pub use memory_map::MemoryMap;
pub use target::{RegisterWrite, TargetDefinition};
