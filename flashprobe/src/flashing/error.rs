use crate::transport::TransportError;
use flashprobe_target::ConfigError;
use std::time::Duration;

/// Describes any error that happened during the flash programming process.
#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    /// The target definition or flash algorithm descriptor is malformed.
    #[error("target configuration is invalid")]
    Config(#[from] ConfigError),
    /// The flash algorithm image did not read back from target RAM
    /// byte-exact after loading. Not retried: rewriting identical data
    /// over the same fault is expected to fail identically.
    #[error("flash algorithm could not be loaded: read-back mismatch at address {address:#010x}")]
    AlgorithmLoad {
        /// Address of the first mismatching byte.
        address: u64,
    },
    /// The algorithm's init routine returned a nonzero error code.
    #[error("the flash algorithm init routine failed with error code {error_code}")]
    AlgorithmInit {
        /// The error code returned by the routine.
        error_code: u64,
    },
    /// An algorithm routine did not return within its timeout. Always
    /// fatal to the session: the target may be hung, and continuing
    /// would risk corrupting the flash state.
    #[error("the flash algorithm routine '{routine}' did not complete within {timeout:?}")]
    AlgorithmTimeout {
        /// Name of the routine that was called.
        routine: &'static str,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// The sector at the given address could not be erased.
    #[error(
        "failed to erase the flash sector at address {sector_address:#010x} \
         (error code {error_code})"
    )]
    EraseFailed {
        /// The base address of the sector.
        sector_address: u64,
        /// The error code returned by the erase routine.
        error_code: u64,
    },
    /// The page at the given address could not be programmed.
    #[error(
        "failed to program the flash page at address {page_address:#010x} \
         (error code {error_code})"
    )]
    ProgramFailed {
        /// The base address of the page.
        page_address: u64,
        /// The error code returned by the program routine.
        error_code: u64,
    },
    /// The flash algorithm of this region has no erase-all routine.
    #[error("this flash algorithm does not support chip erase")]
    EraseAllNotSupported,
    /// A page was about to be programmed into a sector which has not
    /// been erased in the current session.
    #[error(
        "the page at address {page_address:#010x} lies in a sector \
         that was not erased in this session"
    )]
    SectorNotErased {
        /// The base address of the rejected page.
        page_address: u64,
    },
    /// No flash region of the memory map covers the given address range.
    #[error("no flash memory region covers the address range {start:#010x}..{end:#010x}")]
    NoFlashRegion {
        /// Start of the uncovered range.
        start: u64,
        /// End of the uncovered range.
        end: u64,
    },
    /// The given address does not lie inside the flash handled by the
    /// selected algorithm.
    #[error("the address {0:#010x} is not a valid flash address for this algorithm")]
    InvalidFlashAddress(u64),
    /// Data to be written overlaps data that was already staged.
    #[error("the data to write at address {0:#010x} overlaps already staged data")]
    DataOverlap(u64),
    /// The debug transport failed. Propagated as-is so the underlying
    /// diagnostic is preserved.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
