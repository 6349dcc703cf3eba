// x86_64 Platform HAL
//
// Routes every `Hal` capability to the PC drivers in this directory:
// - serial: COM1 16550 (`serial`)
// - display: VGA text buffer (`vga`)
// - input: PS/2 keyboard on IRQ1 (`keyboard`)
// - intc: cascaded 8259 PIC (`pic`)
// - cpu: GDT + TSS (`gdt`), then the IDT (`idt`)
// - detection: CPUID and CMOS (`cpuid`) fed to the portable detector
//
// The serial port is a fixed legacy address, so nothing here depends on the
// detected record; `serial_init` and `intc_init` ignore it.

mod cpuid;
mod gdt;
mod idt;
mod keyboard;
mod pic;
mod serial;
mod vga;

use core::fmt;

use lumen_hwinfo::intc::PIC_LINES;
use lumen_hwinfo::{ConsoleColor, Hal, HardwareInfo};
use x86_64::instructions::{hlt, interrupts};

use crate::log_warn;

/// VGA is a separate device, so log lines may be mirrored onto it.
pub const DISPLAY_IS_SERIAL: bool = false;

const LOG_ORIGIN: &str = "hal";

pub struct PcHal {
    _private: (),
}

impl PcHal {
    /// PCs boot without a device tree; the boot argument is not consulted.
    pub fn new(_boot_arg: u64) -> Self {
        Self { _private: () }
    }
}

impl Hal for PcHal {
    fn serial_init(&mut self, _info: &HardwareInfo) {
        serial::init();
    }

    fn serial_write_byte(&mut self, byte: u8) {
        serial::write_byte(byte);
    }

    fn display_init(&mut self) {
        vga::init();
    }

    fn display_clear(&mut self) {
        vga::clear();
    }

    fn display_write_byte(&mut self, byte: u8) {
        vga::write_byte(byte);
    }

    fn display_set_color(&mut self, fg: ConsoleColor, bg: ConsoleColor) {
        vga::set_color(fg, bg);
    }

    fn input_init(&mut self) {
        keyboard::init();
        pic::unmask(idt::KEYBOARD_IRQ);
        interrupts::enable();
    }

    fn input_read_byte(&mut self) -> u8 {
        keyboard::read_byte()
    }

    fn intc_init(&mut self, _info: &HardwareInfo) {
        pic::init();
    }

    fn intc_unmask(&mut self, irq: u32) {
        match u8::try_from(irq) {
            Ok(line) if line < PIC_LINES => pic::unmask(line),
            _ => log_warn!(LOG_ORIGIN, "IRQ {} is not an 8259 line", irq),
        }
    }

    fn intc_end_of_interrupt(&mut self, irq: u32) {
        if let Ok(line) = u8::try_from(irq) {
            pic::end_of_interrupt(line);
        }
    }

    fn cpu_init(&mut self) {
        gdt::init();
        idt::init();
    }

    fn halt(&mut self) -> ! {
        halt_forever()
    }

    fn detect_hardware(&mut self) -> HardwareInfo {
        let detection = lumen_hwinfo::x86::detect(&cpuid::Cpuid, &mut cpuid::Cmos::new());
        HardwareInfo::from_x86(detection)
    }
}

pub fn serial_write_fmt(args: fmt::Arguments) {
    serial::_print(args);
}

pub fn display_write_fmt(color: ConsoleColor, args: fmt::Arguments) {
    vga::write_colored(color, args);
}

pub fn halt_forever() -> ! {
    interrupts::disable();
    loop {
        hlt();
    }
}
