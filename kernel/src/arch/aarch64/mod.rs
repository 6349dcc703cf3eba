// AArch64 Platform HAL
//
// Routes every `Hal` capability to the ARM drivers in this directory. The
// firmware hands the kernel a device tree address in x0; the entry stub
// passes it on to `kmain`, and from there it reaches `ArmHal::new`.
//
// Mapping:
// - serial, display and input: the one PL011 (`pl011`); the display clear
//   is an ANSI erase and colors are ignored
// - intc: GICv2 distributor and CPU interface (`gic`)
// - cpu: nothing to do, VBAR_EL1 is set by the entry stub
// - detection: device tree scan plus MIDR_EL1 (`midr`)
//
// Every peripheral base comes from the detected record. A missing or broken
// device tree leaves them at zero, and the drivers then stay inert: the
// kernel still reaches the shell, it just cannot be seen.

mod gic;
mod midr;
mod pl011;

use core::fmt;

use lumen_hwinfo::{fdt, ident, ConsoleColor, Hal, HardwareInfo};

use crate::{log_debug, log_info, log_warn};

/// The console is the UART, so log lines are never mirrored onto it.
pub const DISPLAY_IS_SERIAL: bool = true;

const ANSI_CLEAR: &str = "\x1b[2J\x1b[H";
const LOG_ORIGIN: &str = "hal";

pub struct ArmHal {
    dtb_address: u64,
}

impl ArmHal {
    pub fn new(dtb_address: u64) -> Self {
        Self { dtb_address }
    }
}

impl Hal for ArmHal {
    fn serial_init(&mut self, info: &HardwareInfo) {
        pl011::init(info.uart_base());
    }

    fn serial_write_byte(&mut self, byte: u8) {
        pl011::write_byte(byte);
    }

    fn display_init(&mut self) {}

    fn display_clear(&mut self) {
        pl011::write_str(ANSI_CLEAR);
    }

    fn display_write_byte(&mut self, byte: u8) {
        pl011::write_byte(byte);
    }

    fn display_set_color(&mut self, _fg: ConsoleColor, _bg: ConsoleColor) {}

    fn input_init(&mut self) {}

    fn input_read_byte(&mut self) -> u8 {
        if !pl011::is_configured() {
            park();
        }
        pl011::read_byte()
    }

    fn intc_init(&mut self, info: &HardwareInfo) {
        let (dist, cpu) = (info.intc_dist_base(), info.intc_cpu_base());

        if gic::GIC.lock().init(dist, cpu) {
            log_info!(LOG_ORIGIN, "GIC at dist {:#x}, cpu {:#x}", dist, cpu);
        } else {
            log_warn!(LOG_ORIGIN, "no usable GIC bases, interrupts stay off");
        }
    }

    fn intc_unmask(&mut self, irq: u32) {
        gic::GIC.lock().enable(irq);
    }

    fn intc_end_of_interrupt(&mut self, irq: u32) {
        gic::GIC.lock().end_of_interrupt(irq);
    }

    fn cpu_init(&mut self) {
        log_debug!(LOG_ORIGIN, "vector base already installed by the entry stub");
    }

    fn halt(&mut self) -> ! {
        halt_forever()
    }

    fn detect_hardware(&mut self) -> HardwareInfo {
        let scan = unsafe { fdt::scan_at(self.dtb_address) };
        if !scan.is_valid() {
            log_warn!(LOG_ORIGIN, "no usable device tree at {:#x}", self.dtb_address);
        }

        let cpu = midr::current_cpu();
        log_debug!(
            LOG_ORIGIN,
            "MIDR implementer {:#x} part {:#x}",
            cpu.implementer,
            cpu.part
        );

        HardwareInfo::from_device_tree(&scan.descriptor, ident::cpu_model_name(cpu))
    }
}

pub fn serial_write_fmt(args: fmt::Arguments) {
    pl011::_print(args);
}

pub fn display_write_fmt(_color: ConsoleColor, args: fmt::Arguments) {
    pl011::_print(args);
}

fn park() -> ! {
    loop {
        unsafe {
            core::arch::asm!("wfe", options(nomem, nostack, preserves_flags));
        }
    }
}

pub fn halt_forever() -> ! {
    unsafe {
        core::arch::asm!("msr daifset, #0xf", options(nomem, nostack, preserves_flags));
    }
    park()
}
