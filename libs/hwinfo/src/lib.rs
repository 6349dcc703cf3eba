// Lumen Hardware Identification Core
//
// Portable, allocation-free library that answers one question at boot:
// "what machine are we running on?". Both architecture paths converge here
// on a single normalized record and a coarse capability tier.
//
// Key responsibilities:
// - Walk a big-endian flattened device tree and extract memory, CPU count,
//   UART and GIC MMIO bases (`fdt`)
// - Identify peripherals and CPU cores by IP-block identity, never by board
//   name (`ident`)
// - Derive the same facts on x86_64 from CPUID leaves and CMOS registers (`x86`)
// - Fold either result into the write-once `HardwareInfo` and score its tier
//   (`info`)
// - Define the arch capability interface and the portable boot sequence,
//   banner and shell that run on top of it (`hal`, `boot`, `shell`)
// - Compute interrupt controller mask and enable bits (`intc`)
//
// Design principles:
// - `no_std`, no heap: every buffer is a fixed-capacity `heapless` container
// - Detection never fails structurally; degraded input yields zeroed fields
//   plus a diagnostic status
// - Hardware access sits behind small traits so everything here runs in
//   host unit tests
//
// The kernel crate supplies the concrete `Hal` implementation for the
// target it is compiled for; this crate never touches hardware directly.

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod error;
pub mod fdt;
pub mod hal;
pub mod ident;
pub mod info;
pub mod intc;
pub mod shell;
pub mod x86;

pub use boot::Banner;
pub use error::FdtError;
pub use fdt::{FdtScan, RawDescriptor, ScanStatus, Truncation};
pub use hal::{ConsoleColor, Hal};
pub use info::{Arch, HardwareInfo, Tier};
pub use shell::Shell;
