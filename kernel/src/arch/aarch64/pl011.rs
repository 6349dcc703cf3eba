// ARM PL011 UART Driver
//
// On aarch64 the PL011 is serial, display and input at once. Register
// offsets are fixed by the PL011 IP block; only the MMIO base varies per
// board, and it comes from the device tree at runtime.
//
// Configuration:
// - 115200 baud from a 48 MHz reference clock (IBRD 26, FBRD 3)
// - 8N1 with FIFOs enabled, all UART interrupts masked (polled mode)
// - UART, transmitter and receiver enabled
//
// Fallback behavior:
// - Until `init` receives a non-zero base, every operation is a no-op and
//   reads return NUL. A board whose device tree lacks a UART therefore
//   boots silently instead of faulting on a guessed address.

use core::fmt;
use core::ptr;

use spin::Mutex;

const UARTDR: usize = 0x000;
const UARTFR: usize = 0x018;
const UARTIBRD: usize = 0x024;
const UARTFBRD: usize = 0x028;
const UARTLCRH: usize = 0x02C;
const UARTCR: usize = 0x030;
const UARTIMSC: usize = 0x038;

const FR_RXFE: u32 = 1 << 4;
const FR_TXFF: u32 = 1 << 5;

const LCRH_FEN: u32 = 1 << 4;
const LCRH_WLEN_8: u32 = 3 << 5;

const CR_UARTEN: u32 = 1 << 0;
const CR_TXE: u32 = 1 << 8;
const CR_RXE: u32 = 1 << 9;

const IBRD_115200_48MHZ: u32 = 26;
const FBRD_115200_48MHZ: u32 = 3;

pub struct Pl011 {
    base: Option<usize>,
}

impl Pl011 {
    pub const fn unconfigured() -> Self {
        Self { base: None }
    }

    unsafe fn write_reg(base: usize, offset: usize, value: u32) {
        ptr::write_volatile((base + offset) as *mut u32, value);
    }

    unsafe fn read_reg(base: usize, offset: usize) -> u32 {
        ptr::read_volatile((base + offset) as *const u32)
    }

    pub fn init(&mut self, base: u64) {
        let Some(base) = usize::try_from(base).ok().filter(|&base| base != 0) else {
            return;
        };

        unsafe {
            Self::write_reg(base, UARTCR, 0);
            Self::write_reg(base, UARTIBRD, IBRD_115200_48MHZ);
            Self::write_reg(base, UARTFBRD, FBRD_115200_48MHZ);
            Self::write_reg(base, UARTLCRH, LCRH_WLEN_8 | LCRH_FEN);
            Self::write_reg(base, UARTIMSC, 0);
            Self::write_reg(base, UARTCR, CR_UARTEN | CR_TXE | CR_RXE);
        }

        self.base = Some(base);
    }

    pub fn is_configured(&self) -> bool {
        self.base.is_some()
    }

    pub fn write_raw(&mut self, byte: u8) {
        let Some(base) = self.base else {
            return;
        };

        unsafe {
            while Self::read_reg(base, UARTFR) & FR_TXFF != 0 {
                core::hint::spin_loop();
            }
            Self::write_reg(base, UARTDR, u32::from(byte));
        }
    }

    /// Writes `byte`, expanding `\n` to CRLF and backspace to an erase.
    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => {
                self.write_raw(b'\r');
                self.write_raw(b'\n');
            }
            0x08 => {
                self.write_raw(0x08);
                self.write_raw(b' ');
                self.write_raw(0x08);
            }
            byte => self.write_raw(byte),
        }
    }

    pub fn read_byte(&mut self) -> u8 {
        let Some(base) = self.base else {
            return 0;
        };

        unsafe {
            while Self::read_reg(base, UARTFR) & FR_RXFE != 0 {
                core::hint::spin_loop();
            }
            (Self::read_reg(base, UARTDR) & 0xFF) as u8
        }
    }
}

impl fmt::Write for Pl011 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

pub static UART: Mutex<Pl011> = Mutex::new(Pl011::unconfigured());

pub fn init(base: u64) {
    UART.lock().init(base);
}

pub fn is_configured() -> bool {
    UART.lock().is_configured()
}

pub fn write_byte(byte: u8) {
    UART.lock().write_byte(byte);
}

pub fn write_str(s: &str) {
    let mut uart = UART.lock();
    for byte in s.bytes() {
        uart.write_byte(byte);
    }
}

pub fn read_byte() -> u8 {
    UART.lock().read_byte()
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    let _ = UART.lock().write_fmt(args);
}
