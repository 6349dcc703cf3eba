// Global Descriptor Table (GDT) and Task State Segment (TSS)
//
// Long mode ignores most of segmentation, but the CPU still needs a GDT with
// a 64-bit code segment and a TSS to find the stack used for double faults.
//
// Layout:
// - 0x00 null, 0x08 kernel code, 0x10 kernel data
// - 0x18 TSS descriptor, spanning two entries (low/high)
//
// Implementation details:
// - Descriptors are raw 64-bit values encoded by hand
// - `#[repr(C, packed)]` matches the hardware TSS layout exactly
// - After `lgdt`, CS is reloaded with a far return and the data segment
//   registers are reloaded explicitly; then `ltr` loads the TSS
// - IST slot 0 points at a dedicated, statically allocated stack so a
//   double fault on a blown kernel stack still reaches its handler
//
// Safety notes:
// - `init` must run once, on the boot CPU, before the IDT is loaded

use core::mem::size_of;

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const TSS_SELECTOR: u16 = 0x18;

/// IST slot used by the double-fault gate (1-based, as the IDT encodes it).
pub const DOUBLE_FAULT_IST: u8 = 1;

const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 4;

const GDT_KERNEL_CODE: u64 = 0x00AF9A000000FFFF;
const GDT_KERNEL_DATA: u64 = 0x00AF92000000FFFF;
const TSS_TYPE_AVAILABLE: u64 = 0x89;
const TSS_LOW_INDEX: usize = 3;
const TSS_HIGH_INDEX: usize = 4;

#[repr(align(16))]
struct AlignedStack([u8; DOUBLE_FAULT_STACK_SIZE]);

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u64,
}

#[repr(C, packed)]
struct Tss {
    _reserved_0: u32,
    rsp: [u64; 3],
    _reserved_1: u64,
    ist: [u64; 7],
    _reserved_2: u64,
    _reserved_3: u16,
    iomap_base: u16,
}

#[repr(C, align(16))]
struct Gdt {
    entries: [u64; 5],
}

static mut GDT: Gdt = Gdt {
    entries: [0, GDT_KERNEL_CODE, GDT_KERNEL_DATA, 0, 0],
};

static mut DOUBLE_FAULT_STACK: AlignedStack = AlignedStack([0; DOUBLE_FAULT_STACK_SIZE]);

static mut TSS: Tss = Tss {
    _reserved_0: 0,
    rsp: [0; 3],
    _reserved_1: 0,
    ist: [0; 7],
    _reserved_2: 0,
    _reserved_3: 0,
    iomap_base: 0,
};

pub fn init() {
    unsafe {
        TSS.ist[usize::from(DOUBLE_FAULT_IST - 1)] = double_fault_stack_top();
        TSS.iomap_base = size_of::<Tss>() as u16;

        write_tss_descriptor();
        load_gdt_and_segments();
        load_tr();
    }
}

unsafe fn write_tss_descriptor() {
    let tss_addr = core::ptr::addr_of!(TSS) as u64;
    let limit = (size_of::<Tss>() - 1) as u64;

    let low = limit & 0xFFFF
        | ((tss_addr & 0xFFFFFF) << 16)
        | (TSS_TYPE_AVAILABLE << 40)
        | ((limit & 0xF0000) << 32)
        | ((tss_addr & 0xFF000000) << 32);

    let high = tss_addr >> 32;

    GDT.entries[TSS_LOW_INDEX] = low;
    GDT.entries[TSS_HIGH_INDEX] = high;
}

unsafe fn load_gdt_and_segments() {
    let ptr = DescriptorTablePointer {
        limit: (size_of::<Gdt>() - 1) as u16,
        base: core::ptr::addr_of!(GDT) as u64,
    };

    core::arch::asm!(
        "lgdt [{gdt_ptr}]",
        "push {code}",
        "lea {tmp}, [rip + 2f]",
        "push {tmp}",
        "retfq",
        "2:",
        "mov ax, {data}",
        "mov ds, ax",
        "mov es, ax",
        "mov ss, ax",
        gdt_ptr = in(reg) &ptr,
        code = const KERNEL_CODE_SELECTOR,
        data = const KERNEL_DATA_SELECTOR,
        tmp = lateout(reg) _,
        out("ax") _,
        options(preserves_flags)
    );
}

unsafe fn load_tr() {
    core::arch::asm!("ltr ax", in("ax") TSS_SELECTOR, options(nostack, preserves_flags));
}

unsafe fn double_fault_stack_top() -> u64 {
    let stack_ptr = core::ptr::addr_of!(DOUBLE_FAULT_STACK) as *const u8;
    stack_ptr.add(DOUBLE_FAULT_STACK_SIZE) as u64
}
