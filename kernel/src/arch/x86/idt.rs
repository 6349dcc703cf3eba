// Interrupt Descriptor Table (IDT) Setup
//
// Builds the 256-entry IDT by hand and loads it with `lidt`.
//
// Installed vectors:
// - CPU exceptions the kernel can actually raise: #DE, #DB, NMI, #BP, #UD,
//   #DF (on its own IST stack), #NP, #SS, #GP, #PF
// - 33: PS/2 keyboard (IRQ1 after the PIC remap)
// - 39 and 47: spurious IRQ7/IRQ15 from the 8259 pair
//
// Implementation details:
// - `IdtEntry` splits the handler address into low/mid/high fields and
//   masks the IST index to 3 bits
// - Handlers use the `x86-interrupt` ABI; the frame type comes from the
//   `x86_64` crate
// - #BP is a trap gate so IF stays as it was; everything else is an
//   interrupt gate
// - Fatal exceptions log the faulting state and park the CPU
//
// Correctness notes:
// - The GDT (and with it the TSS for the IST stack) must be loaded first
// - Unpopulated vectors have P=0, so a stray interrupt there escalates to
//   #NP and is reported rather than silently ignored

use core::mem::size_of;

use x86_64::registers::control::Cr2;
use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

use lumen_hwinfo::intc::PIC_CASCADE_IRQ;

use super::gdt::{DOUBLE_FAULT_IST, KERNEL_CODE_SELECTOR};
use super::pic::{self, PIC1_OFFSET, PIC2_OFFSET};
use super::{halt_forever, keyboard};
use crate::{log_info, log_panic, log_warn};

const IDT_SIZE: usize = 256;

const GATE_TYPE_INTERRUPT: u8 = 0x8E;
const GATE_TYPE_TRAP: u8 = 0x8F;

pub const KEYBOARD_IRQ: u8 = 1;
const KEYBOARD_VECTOR: u8 = PIC1_OFFSET + KEYBOARD_IRQ;
const SPURIOUS_MASTER_VECTOR: u8 = PIC1_OFFSET + 7;
const SPURIOUS_SLAVE_VECTOR: u8 = PIC2_OFFSET + 7;

const LOG_ORIGIN: &str = "idt";
const EXCEPTION_ORIGIN: &str = "exception";

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry {
            offset_low: 0,
            selector: 0,
            ist: 0,
            type_attr: 0,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    fn set_handler(&mut self, handler: usize, selector: u16, ist: u8, type_attr: u8) {
        self.offset_low = (handler & 0xFFFF) as u16;
        self.offset_mid = ((handler >> 16) & 0xFFFF) as u16;
        self.offset_high = ((handler >> 32) & 0xFFFFFFFF) as u32;
        self.selector = selector;
        self.ist = ist & 0x07;
        self.type_attr = type_attr;
        self.reserved = 0;
    }
}

#[repr(C, align(16))]
struct Idt {
    entries: [IdtEntry; IDT_SIZE],
}

impl Idt {
    fn set(&mut self, vector: u8, handler: usize, ist: u8, type_attr: u8) {
        self.entries[usize::from(vector)].set_handler(handler, KERNEL_CODE_SELECTOR, ist, type_attr);
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u64,
}

static mut IDT: Idt = Idt {
    entries: [IdtEntry::missing(); IDT_SIZE],
};

pub fn init() {
    let idt = unsafe { &mut *core::ptr::addr_of_mut!(IDT) };

    idt.set(0, divide_error_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(1, debug_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(2, nmi_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(3, breakpoint_handler as usize, 0, GATE_TYPE_TRAP);
    idt.set(6, invalid_opcode_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(8, double_fault_handler as usize, DOUBLE_FAULT_IST, GATE_TYPE_INTERRUPT);
    idt.set(11, segment_not_present_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(12, stack_segment_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(13, general_protection_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(14, page_fault_handler as usize, 0, GATE_TYPE_INTERRUPT);

    idt.set(KEYBOARD_VECTOR, keyboard_interrupt_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(SPURIOUS_MASTER_VECTOR, spurious_master_handler as usize, 0, GATE_TYPE_INTERRUPT);
    idt.set(SPURIOUS_SLAVE_VECTOR, spurious_slave_handler as usize, 0, GATE_TYPE_INTERRUPT);

    let idt_ptr = IdtPointer {
        limit: (size_of::<Idt>() - 1) as u16,
        base: core::ptr::addr_of!(IDT) as u64,
    };

    unsafe {
        load_idt(&idt_ptr);
    }

    log_info!(LOG_ORIGIN, "IDT loaded ({} vectors)", IDT_SIZE);
}

#[inline]
unsafe fn load_idt(idt_ptr: &IdtPointer) {
    core::arch::asm!(
        "lidt [{}]",
        in(reg) idt_ptr,
        options(readonly, nostack, preserves_flags)
    );
}

fn fatal(name: &str, frame: &InterruptStackFrame, error_code: Option<u64>) -> ! {
    log_panic!(EXCEPTION_ORIGIN, "{}", name);
    log_panic!(
        EXCEPTION_ORIGIN,
        "RIP={:#018X} CS={:#06X} RFLAGS={:#018X}",
        frame.instruction_pointer.as_u64(),
        frame.code_segment,
        frame.cpu_flags
    );
    log_panic!(
        EXCEPTION_ORIGIN,
        "RSP={:#018X} SS={:#06X}",
        frame.stack_pointer.as_u64(),
        frame.stack_segment
    );
    if let Some(code) = error_code {
        log_panic!(EXCEPTION_ORIGIN, "error code {:#X}", code);
    }

    halt_forever()
}

extern "x86-interrupt" fn divide_error_handler(frame: InterruptStackFrame) {
    fatal("#DE - Divide Error", &frame, None);
}

extern "x86-interrupt" fn debug_handler(frame: InterruptStackFrame) {
    log_warn!(EXCEPTION_ORIGIN, "#DB at {:#X}", frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn nmi_handler(frame: InterruptStackFrame) {
    log_warn!(EXCEPTION_ORIGIN, "NMI at {:#X}", frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn breakpoint_handler(frame: InterruptStackFrame) {
    log_warn!(EXCEPTION_ORIGIN, "#BP at {:#X}", frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn invalid_opcode_handler(frame: InterruptStackFrame) {
    fatal("#UD - Invalid Opcode", &frame, None);
}

extern "x86-interrupt" fn double_fault_handler(frame: InterruptStackFrame, error_code: u64) -> ! {
    fatal("#DF - Double Fault", &frame, Some(error_code))
}

extern "x86-interrupt" fn segment_not_present_handler(frame: InterruptStackFrame, error_code: u64) {
    fatal("#NP - Segment Not Present", &frame, Some(error_code));
}

extern "x86-interrupt" fn stack_segment_handler(frame: InterruptStackFrame, error_code: u64) {
    fatal("#SS - Stack-Segment Fault", &frame, Some(error_code));
}

extern "x86-interrupt" fn general_protection_handler(frame: InterruptStackFrame, error_code: u64) {
    if error_code != 0 {
        log_panic!(
            EXCEPTION_ORIGIN,
            "selector index {} (table {})",
            (error_code >> 3) & 0x1FFF,
            (error_code >> 1) & 0x3
        );
    }
    fatal("#GP - General Protection Fault", &frame, Some(error_code));
}

extern "x86-interrupt" fn page_fault_handler(frame: InterruptStackFrame, error_code: PageFaultErrorCode) {
    log_panic!(EXCEPTION_ORIGIN, "faulting address {:#X}", Cr2::read().as_u64());
    log_panic!(EXCEPTION_ORIGIN, "flags {:?}", error_code);
    fatal("#PF - Page Fault", &frame, Some(error_code.bits()));
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_frame: InterruptStackFrame) {
    keyboard::handle_interrupt();
    pic::end_of_interrupt(KEYBOARD_IRQ);
}

extern "x86-interrupt" fn spurious_master_handler(_frame: InterruptStackFrame) {}

extern "x86-interrupt" fn spurious_slave_handler(_frame: InterruptStackFrame) {
    // The master did see the cascade line go up, so it still wants its EOI.
    pic::end_of_interrupt(PIC_CASCADE_IRQ);
}
