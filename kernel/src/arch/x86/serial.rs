// Serial Port Driver (COM1)
//
// Minimal 16550 UART driver on the legacy COM1 port. It is the ground-truth
// log sink on PCs and works before any other device is initialized.
//
// Implementation details:
// - Port I/O through `x86_64::instructions::port::Port`
// - UART configured for 38400 baud (divisor 3), 8N1, FIFOs on
// - A loopback self-test guards the switch to normal operation; a port
//   that fails it keeps its previous mode
// - Transmit holding register is polled before every byte
// - Newlines are normalized to CRLF for terminal compatibility
//
// Concurrency:
// - `SERIAL1` is a spinlock; `_print` runs with interrupts disabled so an
//   IRQ handler that logs cannot deadlock against the interrupted writer

use core::fmt;

use spin::Mutex;
use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

const COM1: u16 = 0x3F8;

const REG_DATA: u16 = 0;
const REG_INT_ENABLE: u16 = 1;
const REG_FIFO_CTRL: u16 = 2;
const REG_LINE_CTRL: u16 = 3;
const REG_MODEM_CTRL: u16 = 4;
const REG_LINE_STATUS: u16 = 5;

const LINE_STATUS_THR_EMPTY: u8 = 0x20;
const LOOPBACK_PROBE: u8 = 0xAE;

pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        SerialPort { base }
    }

    fn port(&self, register: u16) -> Port<u8> {
        Port::new(self.base + register)
    }

    pub fn init(&mut self) {
        unsafe {
            self.port(REG_INT_ENABLE).write(0x00);
            self.port(REG_LINE_CTRL).write(0x80);
            self.port(REG_DATA).write(0x03);
            self.port(REG_INT_ENABLE).write(0x00);
            self.port(REG_LINE_CTRL).write(0x03);
            self.port(REG_FIFO_CTRL).write(0xC7);
            self.port(REG_MODEM_CTRL).write(0x0B);
            self.port(REG_MODEM_CTRL).write(0x1E);
            self.port(REG_DATA).write(LOOPBACK_PROBE);

            if self.port(REG_DATA).read() != LOOPBACK_PROBE {
                return;
            }

            self.port(REG_MODEM_CTRL).write(0x0F);
        }
    }

    fn is_transmit_empty(&self) -> bool {
        unsafe { self.port(REG_LINE_STATUS).read() & LINE_STATUS_THR_EMPTY != 0 }
    }

    pub fn write_raw(&mut self, byte: u8) {
        while !self.is_transmit_empty() {
            core::hint::spin_loop();
        }

        unsafe {
            self.port(REG_DATA).write(byte);
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        if byte == b'\n' {
            self.write_raw(b'\r');
        }
        self.write_raw(byte);
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

pub static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

pub fn init() {
    interrupts::without_interrupts(|| SERIAL1.lock().init());
}

pub fn write_byte(byte: u8) {
    interrupts::without_interrupts(|| SERIAL1.lock().write_byte(byte));
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    interrupts::without_interrupts(|| {
        let _ = SERIAL1.lock().write_fmt(args);
    });
}
