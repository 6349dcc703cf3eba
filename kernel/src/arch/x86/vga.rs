// VGA Text Mode Driver
//
// The interactive console on PCs. Writes straight into the firmware-
// configured 80x25 text buffer at 0xB8000.
//
// Implementation details:
// - Each cell is a 16-bit value: ASCII byte plus `ConsoleColor` attribute
// - `VgaWriter` tracks the cursor and the current colors
// - Newline, carriage return and backspace are interpreted; other bytes
//   outside printable ASCII render as a filled square
// - Scrolling copies every row one line up and blanks the last one
//
// Correctness notes:
// - All buffer accesses are volatile and bounds-checked against the grid
// - `WRITER` is a spinlock; callers wrap access in `without_interrupts`

use core::fmt;
use core::ptr;

use lumen_hwinfo::ConsoleColor;
use spin::Mutex;
use x86_64::instructions::interrupts;

const VGA_BUFFER: *mut u16 = 0xB8000 as *mut u16;
const VGA_WIDTH: usize = 80;
const VGA_HEIGHT: usize = 25;

const BACKSPACE: u8 = 0x08;
const UNPRINTABLE: u8 = 0xFE;

#[inline]
fn make_vga_entry(c: u8, attribute: u8) -> u16 {
    (attribute as u16) << 8 | c as u16
}

pub struct VgaWriter {
    row: usize,
    col: usize,
    fg_color: ConsoleColor,
    bg_color: ConsoleColor,
}

impl VgaWriter {
    pub const fn new() -> Self {
        VgaWriter {
            row: 0,
            col: 0,
            fg_color: ConsoleColor::LightGray,
            bg_color: ConsoleColor::Black,
        }
    }

    pub fn set_color(&mut self, fg: ConsoleColor, bg: ConsoleColor) {
        self.fg_color = fg;
        self.bg_color = bg;
    }

    fn blank(&self) -> u16 {
        make_vga_entry(b' ', self.fg_color.attribute(self.bg_color))
    }

    fn put(&self, row: usize, col: usize, entry: u16) {
        if row < VGA_HEIGHT && col < VGA_WIDTH {
            unsafe {
                ptr::write_volatile(VGA_BUFFER.add(row * VGA_WIDTH + col), entry);
            }
        }
    }

    pub fn clear_screen(&mut self) {
        let blank = self.blank();

        for row in 0..VGA_HEIGHT {
            for col in 0..VGA_WIDTH {
                self.put(row, col, blank);
            }
        }

        self.row = 0;
        self.col = 0;
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\r' => self.col = 0,
            BACKSPACE => self.backspace(),
            byte => {
                if self.col >= VGA_WIDTH {
                    self.new_line();
                }

                let glyph = match byte {
                    0x20..=0x7e => byte,
                    _ => UNPRINTABLE,
                };
                let entry = make_vga_entry(glyph, self.fg_color.attribute(self.bg_color));
                self.put(self.row, self.col, entry);

                self.col += 1;
            }
        }
    }

    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }

    fn backspace(&mut self) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = VGA_WIDTH - 1;
        } else {
            return;
        }

        self.put(self.row, self.col, self.blank());
    }

    fn new_line(&mut self) {
        self.col = 0;
        self.row += 1;

        if self.row >= VGA_HEIGHT {
            self.scroll();
            self.row = VGA_HEIGHT - 1;
        }
    }

    fn scroll(&mut self) {
        let blank = self.blank();

        unsafe {
            for row in 1..VGA_HEIGHT {
                for col in 0..VGA_WIDTH {
                    let src = row * VGA_WIDTH + col;
                    let dst = (row - 1) * VGA_WIDTH + col;
                    let entry = ptr::read_volatile(VGA_BUFFER.add(src));
                    ptr::write_volatile(VGA_BUFFER.add(dst), entry);
                }
            }
        }

        for col in 0..VGA_WIDTH {
            self.put(VGA_HEIGHT - 1, col, blank);
        }
    }
}

impl fmt::Write for VgaWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

pub static WRITER: Mutex<VgaWriter> = Mutex::new(VgaWriter::new());

pub fn init() {
    interrupts::without_interrupts(|| {
        let mut writer = WRITER.lock();
        writer.set_color(ConsoleColor::LightGray, ConsoleColor::Black);
        writer.clear_screen();
    });
}

pub fn clear() {
    interrupts::without_interrupts(|| WRITER.lock().clear_screen());
}

pub fn write_byte(byte: u8) {
    interrupts::without_interrupts(|| WRITER.lock().write_byte(byte));
}

pub fn set_color(fg: ConsoleColor, bg: ConsoleColor) {
    interrupts::without_interrupts(|| WRITER.lock().set_color(fg, bg));
}

/// Writes `args` in `fg` on black, restoring the previous colors afterwards.
pub fn write_colored(fg: ConsoleColor, args: fmt::Arguments) {
    use core::fmt::Write;

    interrupts::without_interrupts(|| {
        let mut writer = WRITER.lock();
        let old_fg = writer.fg_color;
        let old_bg = writer.bg_color;
        writer.set_color(fg, ConsoleColor::Black);
        let _ = writer.write_fmt(args);
        writer.set_color(old_fg, old_bg);
    });
}
