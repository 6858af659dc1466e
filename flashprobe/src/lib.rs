//! Flash programming for microcontroller targets over a debug probe.
//!
//! flashprobe programs on-chip flash by downloading a chip family's
//! flash algorithm into target RAM and invoking its entry points
//! through a debug transport, instead of writing flash directly with
//! protocol specific commands. One generic engine therefore supports
//! many chip families; each family only contributes a data descriptor
//! (see the [`config`] crate re-export).
//!
//! The probe itself is abstracted behind
//! [`DebugTransport`](transport::DebugTransport); the engine lives in
//! [`flashing`].
#![warn(missing_docs)]

pub mod flashing;
pub mod transport;

pub use flashprobe_target as config;
