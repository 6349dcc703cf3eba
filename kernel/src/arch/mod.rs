// Architecture Selection Layer
//
// Picks the one `Hal` implementation for the compilation target and
// re-exports the handful of free functions the logger and the panic
// handler need before (or without) a `PlatformHal` value.
//
// Exports:
// - `PlatformHal`: the target's `lumen_hwinfo::Hal` implementation
// - `serial_write_fmt`: lock-protected formatted serial output
// - `display_write_fmt`: colored formatted output on the text console
// - `DISPLAY_IS_SERIAL`: true where the console is the serial port, so the
//   logger does not print every line twice
// - `halt_forever`: mask interrupts and park the CPU
//
// Only x86_64 and aarch64 are supported; any other target fails to build.

#[cfg(target_arch = "x86_64")]
mod x86;

#[cfg(target_arch = "x86_64")]
pub use x86::{
    display_write_fmt, halt_forever, serial_write_fmt, PcHal as PlatformHal, DISPLAY_IS_SERIAL,
};

#[cfg(target_arch = "aarch64")]
mod aarch64;

#[cfg(target_arch = "aarch64")]
pub use aarch64::{
    display_write_fmt, halt_forever, serial_write_fmt, ArmHal as PlatformHal, DISPLAY_IS_SERIAL,
};

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("lumen supports only x86_64 and aarch64 targets");
