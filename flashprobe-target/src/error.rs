use std::ops::Range;

/// An error in a target description.
///
/// All of these are raised while a [`TargetDefinition`](crate::TargetDefinition)
/// or one of its parts is constructed or validated. A definition which passed
/// validation will not produce any of these during programming.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A memory region has a zero or negative length.
    #[error("memory region {name:?} ({range:#x?}) is empty")]
    EmptyRegion {
        /// Name of the offending region, if it has one.
        name: Option<String>,
        /// The empty address range.
        range: Range<u64>,
    },

    /// Two regions of the same kind overlap.
    #[error("memory regions {first:#x?} and {second:#x?} overlap")]
    OverlappingRegions {
        /// Address range of the lower region.
        first: Range<u64>,
        /// Address range of the overlapping region.
        second: Range<u64>,
    },

    /// More than one flash region is marked as boot memory.
    #[error("more than one flash region is marked as boot memory")]
    MultipleBootRegions,

    /// The page size is not a power of two.
    #[error("page size {size:#x} is not a power of two")]
    InvalidPageSize {
        /// The offending page size.
        size: u32,
    },

    /// The minimum programmable unit is invalid.
    #[error("minimum program length {length:#x} is not a power of two or exceeds the page size")]
    InvalidMinProgramLength {
        /// The offending minimum program length.
        length: u32,
    },

    /// An entry point offset lies outside the instruction image.
    #[error(
        "entry point `{name}` at offset {offset:#x} lies outside the \
         {code_size:#x} byte instruction image"
    )]
    EntryPointOutOfBounds {
        /// Name of the routine.
        name: &'static str,
        /// The offending offset, relative to the load address.
        offset: u64,
        /// Size of the instruction image in bytes.
        code_size: u64,
    },

    /// The sector size table does not describe the whole flash.
    #[error("sector descriptions do not cover the flash without gaps or overlaps: {reason}")]
    InvalidSectorDescriptions {
        /// What exactly is wrong with the table.
        reason: String,
    },

    /// The algorithm carries no page buffer, or more than two.
    #[error("flash algorithm must have one or two page buffers, has {count}")]
    InvalidPageBufferCount {
        /// Number of configured page buffers.
        count: usize,
    },

    /// The stack bounds are inverted or empty.
    #[error("stack bounds {begin:#x}..{end:#x} are invalid")]
    InvalidStackBounds {
        /// Initial stack pointer (top of stack).
        begin: u64,
        /// Lowest usable stack address.
        end: u64,
    },

    /// A YAML target description could not be parsed.
    #[error("failed to parse target description")]
    Yaml(#[from] serde_yaml::Error),
}
