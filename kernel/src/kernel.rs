// Kernel entry point and boot orchestration
//
// This file defines `kmain`, the first Rust code to run after the
// architecture's entry stub has set up a stack. Everything portable about
// boot lives in `lumen_hwinfo`; this crate only supplies the concrete `Hal`
// for the target it is compiled for and wires the two together.
//
// Boot flow:
// - Install the kernel logger so every later step can report progress
// - Build the platform HAL from the boot argument (the DTB address on
//   aarch64, ignored on x86_64)
// - Run the portable bring-up sequence, which detects the hardware first
//   and then initializes serial, CPU tables, interrupt controller, display
//   and input in that order
// - Print the hardware line and the banner, then hand control to the shell
//
// Design and implementation:
// - Kernel is `no_std` and `no_main`, linked as a staticlib into the
//   per-architecture boot stub
// - Exactly one `PlatformHal` exists, selected at compile time
// - The `HardwareInfo` record is created once and only read afterwards
//
// Safety and correctness notes:
// - The shell never returns; `halt` is the only way out
// - The panic handler logs the message and parks the CPU with interrupts
//   masked

#![no_std]
#![no_main]
#![cfg_attr(target_arch = "x86_64", feature(abi_x86_interrupt))]

mod arch;
mod build_info;
mod log;

use core::panic::PanicInfo;

use lumen_hwinfo::{boot, Shell};

use crate::arch::PlatformHal;

const LOG_ORIGIN: &str = "kernel:init";

#[no_mangle]
pub extern "C" fn kmain(boot_arg: u64) -> ! {
    crate::log::init();
    log_info!(LOG_ORIGIN, "{} starting", build_info::VERSION_TAG);

    let mut hal = PlatformHal::new(boot_arg);
    let info = boot::bring_up(&mut hal);

    log_info!(LOG_ORIGIN, "capability tier {}", info.tier());

    boot::write_banner(&mut hal, &info, &build_info::BANNER);
    log_info!(LOG_ORIGIN, "entering shell");

    Shell::new(&info, &build_info::BANNER).run(&mut hal)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log_panic!("PANIC", "{}", info);
    arch::halt_forever()
}
