// MIDR_EL1 access
//
// The main ID register names the CPU core (implementer and part number).
// Matching on it instead of a board model string is what lets one image
// name the core on every board built around it.

use lumen_hwinfo::ident::CpuId;

pub fn read_midr() -> u64 {
    let midr: u64;
    unsafe {
        core::arch::asm!("mrs {}, midr_el1", out(reg) midr, options(nomem, nostack, preserves_flags));
    }
    midr
}

pub fn current_cpu() -> CpuId {
    CpuId::from_midr(read_midr())
}
