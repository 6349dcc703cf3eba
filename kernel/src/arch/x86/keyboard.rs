// PS/2 Keyboard Driver
//
// Scancode set 1 keyboard on IRQ1, translated to ASCII (US layout) and
// queued for the shell.
//
// Key responsibilities:
// - Read scancodes from the PS/2 data port when IRQ1 fires
// - Track Shift and Caps Lock; ignore key releases
// - Buffer translated bytes in a 256-byte ring
// - Hand bytes to the shell through a blocking `read_byte`
//
// Implementation details:
// - The IRQ handler is the only producer and `read_byte` the only consumer
// - A full ring drops new input instead of overwriting unread bytes
// - `read_byte` sleeps with `sti; hlt` so a keypress between the empty
//   check and the halt still wakes it

use spin::Mutex;
use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

use crate::log_info;

const PS2_DATA_PORT: u16 = 0x60;
const PS2_STATUS_PORT: u16 = 0x64;
const STATUS_OUTPUT_FULL: u8 = 0x01;
const BUFFER_CAPACITY: usize = 256;

const SC_LEFT_SHIFT: u8 = 0x2A;
const SC_RIGHT_SHIFT: u8 = 0x36;
const SC_CAPS_LOCK: u8 = 0x3A;
const SC_EXTENDED: u8 = 0xE0;
const SC_RELEASE: u8 = 0x80;

struct KeyboardState {
    shift: bool,
    caps_lock: bool,
    buffer: [u8; BUFFER_CAPACITY],
    head: usize,
    tail: usize,
}

impl KeyboardState {
    const fn new() -> Self {
        Self {
            shift: false,
            caps_lock: false,
            buffer: [0; BUFFER_CAPACITY],
            head: 0,
            tail: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        let next_head = (self.head + 1) % BUFFER_CAPACITY;
        if next_head != self.tail {
            self.buffer[self.head] = byte;
            self.head = next_head;
        }
    }

    fn pop(&mut self) -> Option<u8> {
        if self.head == self.tail {
            return None;
        }

        let byte = self.buffer[self.tail];
        self.tail = (self.tail + 1) % BUFFER_CAPACITY;
        Some(byte)
    }
}

static KEYBOARD: Mutex<KeyboardState> = Mutex::new(KeyboardState::new());

pub fn init() {
    interrupts::without_interrupts(|| *KEYBOARD.lock() = KeyboardState::new());
    log_info!("keyboard", "Keyboard driver ready (PS/2 set 1)");
}

/// Called from the IRQ1 handler, with interrupts already disabled.
pub fn handle_interrupt() {
    let mut state = KEYBOARD.lock();

    while let Some(scancode) = read_scancode() {
        process_scancode(scancode, &mut state);
    }
}

pub fn read_byte() -> u8 {
    loop {
        interrupts::disable();

        if let Some(byte) = KEYBOARD.lock().pop() {
            interrupts::enable();
            return byte;
        }

        interrupts::enable_and_hlt();
    }
}

fn read_scancode() -> Option<u8> {
    let mut status = Port::<u8>::new(PS2_STATUS_PORT);
    let mut data = Port::<u8>::new(PS2_DATA_PORT);

    unsafe {
        if status.read() & STATUS_OUTPUT_FULL == 0 {
            return None;
        }

        Some(data.read())
    }
}

fn process_scancode(scancode: u8, state: &mut KeyboardState) {
    if scancode == SC_EXTENDED {
        return;
    }

    let is_break = scancode & SC_RELEASE != 0;
    let code = scancode & !SC_RELEASE;

    match code {
        SC_LEFT_SHIFT | SC_RIGHT_SHIFT => {
            state.shift = !is_break;
            return;
        }
        SC_CAPS_LOCK => {
            if !is_break {
                state.caps_lock = !state.caps_lock;
            }
            return;
        }
        _ => {}
    }

    if is_break {
        return;
    }

    if let Some(ascii) = translate_scancode(code, state.shift, state.caps_lock) {
        state.push(ascii);
    }
}

fn translate_scancode(scancode: u8, shift: bool, caps_lock: bool) -> Option<u8> {
    match scancode {
        0x02 => Some(if shift { b'!' } else { b'1' }),
        0x03 => Some(if shift { b'@' } else { b'2' }),
        0x04 => Some(if shift { b'#' } else { b'3' }),
        0x05 => Some(if shift { b'$' } else { b'4' }),
        0x06 => Some(if shift { b'%' } else { b'5' }),
        0x07 => Some(if shift { b'^' } else { b'6' }),
        0x08 => Some(if shift { b'&' } else { b'7' }),
        0x09 => Some(if shift { b'*' } else { b'8' }),
        0x0A => Some(if shift { b'(' } else { b'9' }),
        0x0B => Some(if shift { b')' } else { b'0' }),
        0x0C => Some(if shift { b'_' } else { b'-' }),
        0x0D => Some(if shift { b'+' } else { b'=' }),
        0x0E => Some(0x08),
        0x0F => Some(b'\t'),
        0x10 => Some(letter(b'q', shift, caps_lock)),
        0x11 => Some(letter(b'w', shift, caps_lock)),
        0x12 => Some(letter(b'e', shift, caps_lock)),
        0x13 => Some(letter(b'r', shift, caps_lock)),
        0x14 => Some(letter(b't', shift, caps_lock)),
        0x15 => Some(letter(b'y', shift, caps_lock)),
        0x16 => Some(letter(b'u', shift, caps_lock)),
        0x17 => Some(letter(b'i', shift, caps_lock)),
        0x18 => Some(letter(b'o', shift, caps_lock)),
        0x19 => Some(letter(b'p', shift, caps_lock)),
        0x1A => Some(if shift { b'{' } else { b'[' }),
        0x1B => Some(if shift { b'}' } else { b']' }),
        0x1C => Some(b'\n'),
        0x1E => Some(letter(b'a', shift, caps_lock)),
        0x1F => Some(letter(b's', shift, caps_lock)),
        0x20 => Some(letter(b'd', shift, caps_lock)),
        0x21 => Some(letter(b'f', shift, caps_lock)),
        0x22 => Some(letter(b'g', shift, caps_lock)),
        0x23 => Some(letter(b'h', shift, caps_lock)),
        0x24 => Some(letter(b'j', shift, caps_lock)),
        0x25 => Some(letter(b'k', shift, caps_lock)),
        0x26 => Some(letter(b'l', shift, caps_lock)),
        0x27 => Some(if shift { b':' } else { b';' }),
        0x28 => Some(if shift { b'"' } else { b'\'' }),
        0x29 => Some(if shift { b'~' } else { b'`' }),
        0x2B => Some(if shift { b'|' } else { b'\\' }),
        0x2C => Some(letter(b'z', shift, caps_lock)),
        0x2D => Some(letter(b'x', shift, caps_lock)),
        0x2E => Some(letter(b'c', shift, caps_lock)),
        0x2F => Some(letter(b'v', shift, caps_lock)),
        0x30 => Some(letter(b'b', shift, caps_lock)),
        0x31 => Some(letter(b'n', shift, caps_lock)),
        0x32 => Some(letter(b'm', shift, caps_lock)),
        0x33 => Some(if shift { b'<' } else { b',' }),
        0x34 => Some(if shift { b'>' } else { b'.' }),
        0x35 => Some(if shift { b'?' } else { b'/' }),
        0x37 => Some(b'*'),
        0x39 => Some(b' '),
        0x4A => Some(b'-'),
        0x4E => Some(b'+'),
        _ => None,
    }
}

fn letter(base: u8, shift: bool, caps_lock: bool) -> u8 {
    if shift ^ caps_lock {
        base.to_ascii_uppercase()
    } else {
        base
    }
}
