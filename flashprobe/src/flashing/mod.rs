//! Flash programming through a target-resident flash algorithm.
//!
//! A flash algorithm is a small position-independent blob which is
//! loaded into target RAM and then driven through the debug transport
//! to erase and program the flash of the chip. This module contains
//! the whole pipeline around it:
//!
//! * [`FlashBuilder`] collects the data to program and lays it out as
//!   full flash pages and the sectors containing them.
//! * [`Flasher`] loads and verifies the algorithm image, runs its
//!   init/uninit routines, erases sectors and programs pages, using
//!   the double-buffered pipeline when the algorithm has two page
//!   buffers.
//! * [`FlashLoader`] resolves staged data against the target's memory
//!   map and drives one `Flasher` per touched flash region.
//!
//! For the common cases there are the free functions [`program`],
//! [`erase_all`] and [`erase_sector`], plus [`connect`] for the
//! connect-time register fix-up some chips need.

mod builder;
mod error;
mod flasher;
mod loader;
mod progress;

pub use builder::{FlashBuilder, FlashFill, FlashLayout, FlashPage, FlashSector};
pub use error::FlashError;
pub use flasher::Flasher;
pub use loader::{
    connect, erase_all, erase_sector, program, DownloadOptions, FlashLoader, ProgramSummary,
};
pub use progress::{FlashProgress, ProgressEvent};
