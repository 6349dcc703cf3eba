// Architecture Capability Interface
//
// Everything portable in Lumen (boot sequencing, the banner, the shell)
// talks to the machine exclusively through `Hal`. Each supported target
// provides exactly one implementation in the kernel crate, chosen at compile
// time; nothing here dispatches at runtime.
//
// Capabilities:
// - serial: early debug output, available before the display
// - display: the interactive text console (VGA on PCs, the UART on arm64)
// - input: blocking byte input for the shell
// - intc: interrupt controller bring-up, masking and EOI
// - cpu: descriptor tables or vector base setup
// - halt: stop the machine for good
// - detection: produce the one `HardwareInfo` for this boot
//
// Fallback contract:
// - An implementation that could not find a peripheral's base turns that
//   peripheral's operations into no-ops instead of faulting. A machine with
//   a broken device tree boots to a silent console; it does not crash.
//
// Colors use the VGA attribute palette. UART-only targets ignore them.

use core::fmt;

use crate::info::HardwareInfo;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleColor {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

impl ConsoleColor {
    /// VGA attribute byte for this foreground on `bg`.
    pub const fn attribute(self, bg: ConsoleColor) -> u8 {
        (bg as u8) << 4 | (self as u8)
    }
}

pub trait Hal {
    /// Brings up the debug UART. Needs the UART base on MMIO targets.
    fn serial_init(&mut self, info: &HardwareInfo);
    fn serial_write_byte(&mut self, byte: u8);

    fn serial_write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.serial_write_byte(byte);
        }
    }

    fn display_init(&mut self);
    fn display_clear(&mut self);
    fn display_write_byte(&mut self, byte: u8);
    fn display_set_color(&mut self, fg: ConsoleColor, bg: ConsoleColor);

    fn display_write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.display_write_byte(byte);
        }
    }

    fn input_init(&mut self);

    /// Blocks until a byte arrives. Without a working input device this
    /// never returns.
    fn input_read_byte(&mut self) -> u8;

    fn intc_init(&mut self, info: &HardwareInfo);
    fn intc_unmask(&mut self, irq: u32);
    fn intc_end_of_interrupt(&mut self, irq: u32);

    fn cpu_init(&mut self);

    fn halt(&mut self) -> !;

    /// Runs this target's detector. Called once, before anything else.
    fn detect_hardware(&mut self) -> HardwareInfo;
}

/// `fmt::Write` adapter over the display capability.
pub struct DisplayWriter<'a, H: Hal + ?Sized> {
    hal: &'a mut H,
}

impl<'a, H: Hal + ?Sized> DisplayWriter<'a, H> {
    pub fn new(hal: &'a mut H) -> Self {
        Self { hal }
    }
}

impl<H: Hal + ?Sized> fmt::Write for DisplayWriter<'_, H> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.hal.display_write_str(s);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::info::Arch;

    /// Records every capability call, and everything written to the display,
    /// in order.
    pub struct MockHal {
        pub info: HardwareInfo,
        pub calls: Vec<&'static str>,
        pub serial: String,
        pub display: String,
        pub colors: Vec<(ConsoleColor, ConsoleColor)>,
        pub input: std::collections::VecDeque<u8>,
        pub seen_uart_base: Option<u64>,
    }

    impl MockHal {
        pub fn new(info: HardwareInfo) -> Self {
            Self {
                info,
                calls: Vec::new(),
                serial: String::new(),
                display: String::new(),
                colors: Vec::new(),
                input: Default::default(),
                seen_uart_base: None,
            }
        }

        pub fn blank() -> Self {
            Self::new(HardwareInfo::empty(Arch::Unknown))
        }
    }

    impl Hal for MockHal {
        fn serial_init(&mut self, info: &HardwareInfo) {
            self.calls.push("serial_init");
            self.seen_uart_base = Some(info.uart_base());
        }

        fn serial_write_byte(&mut self, byte: u8) {
            self.serial.push(char::from(byte));
        }

        fn display_init(&mut self) {
            self.calls.push("display_init");
        }

        fn display_clear(&mut self) {
            self.calls.push("display_clear");
            self.display.clear();
        }

        fn display_write_byte(&mut self, byte: u8) {
            if byte == 0x08 {
                self.display.pop();
            } else {
                self.display.push(char::from(byte));
            }
        }

        fn display_set_color(&mut self, fg: ConsoleColor, bg: ConsoleColor) {
            self.colors.push((fg, bg));
        }

        fn input_init(&mut self) {
            self.calls.push("input_init");
        }

        fn input_read_byte(&mut self) -> u8 {
            self.input.pop_front().unwrap_or(b'\n')
        }

        fn intc_init(&mut self, _info: &HardwareInfo) {
            self.calls.push("intc_init");
        }

        fn intc_unmask(&mut self, _irq: u32) {
            self.calls.push("intc_unmask");
        }

        fn intc_end_of_interrupt(&mut self, _irq: u32) {
            self.calls.push("intc_end_of_interrupt");
        }

        fn cpu_init(&mut self) {
            self.calls.push("cpu_init");
        }

        fn halt(&mut self) -> ! {
            panic!("halted");
        }

        fn detect_hardware(&mut self) -> HardwareInfo {
            self.calls.push("detect_hardware");
            self.info.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockHal;
    use super::*;
    use core::fmt::Write;

    #[test]
    fn attribute_packs_background_high() {
        assert_eq!(ConsoleColor::Yellow.attribute(ConsoleColor::Black), 0x0E);
        assert_eq!(ConsoleColor::White.attribute(ConsoleColor::Blue), 0x1F);
    }

    #[test]
    fn default_string_writers_go_byte_by_byte() {
        let mut hal = MockHal::blank();
        hal.serial_write_str("boot\n");
        hal.display_write_str("lumen");
        assert_eq!(hal.serial, "boot\n");
        assert_eq!(hal.display, "lumen");
    }

    #[test]
    fn display_writer_formats() {
        let mut hal = MockHal::blank();
        write!(DisplayWriter::new(&mut hal), "{} cores", 4).unwrap();
        assert_eq!(hal.display, "4 cores");
    }
}
