// Legacy 8259 PIC
//
// Cascaded master/slave pair, remapped so IRQ 0-7 land on vectors 32-39 and
// IRQ 8-15 on 40-47, clear of the CPU exception range. Every line starts
// masked, the cascade included; drivers unmask the one IRQ they own, and a
// slave line opens IRQ2 with it.

use lumen_hwinfo::intc::{self, PicUnmask, PIC_CASCADE_IRQ, PIC_LINES};
use spin::Mutex;
use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

use crate::log_info;

pub const PIC1_OFFSET: u8 = 32;
pub const PIC2_OFFSET: u8 = 40;

const PIC1_CMD: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;
const POST_PORT: u16 = 0x80;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;
const CASCADE_IRQ_MASK: u8 = 1 << PIC_CASCADE_IRQ;
const CASCADE_IDENTITY: u8 = 0x02;
const EOI: u8 = 0x20;
const ALL_MASKED: u8 = 0xFF;

const LOG_ORIGIN: &str = "pic";

struct ChainedPics {
    master_cmd: Port<u8>,
    master_data: Port<u8>,
    slave_cmd: Port<u8>,
    slave_data: Port<u8>,
    wait: Port<u8>,
}

impl ChainedPics {
    const fn new() -> Self {
        Self {
            master_cmd: Port::new(PIC1_CMD),
            master_data: Port::new(PIC1_DATA),
            slave_cmd: Port::new(PIC2_CMD),
            slave_data: Port::new(PIC2_DATA),
            wait: Port::new(POST_PORT),
        }
    }

    unsafe fn io_wait(&mut self) {
        self.wait.write(0);
    }

    unsafe fn init(&mut self) {
        self.master_cmd.write(ICW1_INIT | ICW1_ICW4);
        self.io_wait();
        self.slave_cmd.write(ICW1_INIT | ICW1_ICW4);
        self.io_wait();

        self.master_data.write(PIC1_OFFSET);
        self.io_wait();
        self.slave_data.write(PIC2_OFFSET);
        self.io_wait();

        self.master_data.write(CASCADE_IRQ_MASK);
        self.io_wait();
        self.slave_data.write(CASCADE_IDENTITY);
        self.io_wait();

        self.master_data.write(ICW4_8086);
        self.io_wait();
        self.slave_data.write(ICW4_8086);
        self.io_wait();

        self.master_data.write(ALL_MASKED);
        self.slave_data.write(ALL_MASKED);
    }

    unsafe fn clear_mask(&mut self, bits: PicUnmask) {
        if bits.slave != 0 {
            let current = self.slave_data.read();
            self.slave_data.write(current & !bits.slave);
        }
        if bits.master != 0 {
            let current = self.master_data.read();
            self.master_data.write(current & !bits.master);
        }
    }

    unsafe fn end_of_interrupt(&mut self, irq: u8) {
        if irq >= 8 {
            self.slave_cmd.write(EOI);
        }
        self.master_cmd.write(EOI);
    }
}

static PICS: Mutex<ChainedPics> = Mutex::new(ChainedPics::new());

pub fn init() {
    interrupts::without_interrupts(|| unsafe { PICS.lock().init() });
    log_info!(LOG_ORIGIN, "8259 remapped to vectors {}-{}", PIC1_OFFSET, PIC2_OFFSET + 7);
}

pub fn unmask(irq: u8) {
    if let Some(bits) = intc::pic_unmask(irq) {
        interrupts::without_interrupts(|| unsafe { PICS.lock().clear_mask(bits) });
    }
}

/// Called from IRQ handlers, with interrupts already disabled.
pub fn end_of_interrupt(irq: u8) {
    if irq < PIC_LINES {
        unsafe {
            PICS.lock().end_of_interrupt(irq);
        }
    }
}
