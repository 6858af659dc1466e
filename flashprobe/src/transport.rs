//! The seam between the flashing engine and the debug probe.
//!
//! The engine does not talk to any particular probe or wire protocol.
//! Everything it needs from the target is expressed through the
//! [`DebugTransport`] trait: block memory access, a handful of core
//! registers named by their role in the flash algorithm calling
//! convention, and run control.

use std::time::Duration;

/// A core register, named by the role it plays in the flash algorithm
/// calling convention rather than by its architectural number.
///
/// On ARM Cortex-M, `Argument(0..=3)` map to `r0..r3`, `StaticBase` to
/// `r9`, `ReturnAddress` to `lr` and `Result` to `r0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreRegister {
    /// One of the four argument registers. The index must be in `0..=3`.
    Argument(usize),
    /// The static base register used by position-independent code to
    /// locate its data section.
    StaticBase,
    /// The stack pointer.
    StackPointer,
    /// The return address register.
    ReturnAddress,
    /// The register holding a routine's return value after it halted.
    Result,
}

/// An error reported by the debug transport.
///
/// The engine never retries a failed transport operation and never
/// wraps the diagnostic in anything but a transparent error variant:
/// retry semantics depend on the probe and are its own responsibility.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Communication with the debug probe broke down.
    #[error("debug probe communication failed: {0}")]
    Probe(String),
    /// The target rejected a memory access.
    #[error("memory access at address {address:#010x} failed")]
    MemoryAccess {
        /// The address of the failed access.
        address: u64,
    },
    /// Any other transport specific error.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Access to a halted target, as required by the flashing engine.
///
/// One session owns one transport exclusively; the engine takes it by
/// `&mut` so that two sessions can never interleave register writes on
/// the same core.
pub trait DebugTransport {
    /// Write a block of bytes to target memory.
    fn write_memory_block(&mut self, address: u64, data: &[u8]) -> Result<(), TransportError>;

    /// Read a block of bytes from target memory into `data`.
    fn read_memory_block(&mut self, address: u64, data: &mut [u8]) -> Result<(), TransportError>;

    /// Write a core register.
    fn write_register(&mut self, register: CoreRegister, value: u64)
        -> Result<(), TransportError>;

    /// Read a core register.
    fn read_register(&mut self, register: CoreRegister) -> Result<u64, TransportError>;

    /// Set the program counter of the halted core.
    fn set_program_counter(&mut self, address: u64) -> Result<(), TransportError>;

    /// Resume execution of the core.
    fn resume(&mut self) -> Result<(), TransportError>;

    /// Wait until the core halts again, up to `timeout`.
    ///
    /// Returns `Ok(true)` once the core is halted, `Ok(false)` if the
    /// timeout elapsed with the core still running.
    fn wait_until_halted(&mut self, timeout: Duration) -> Result<bool, TransportError>;
}
