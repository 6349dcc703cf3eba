// CPUID and CMOS access for hardware detection
//
// Concrete sources behind `lumen_hwinfo::x86::{CpuidSource, CmosSource}`.
// The detector itself lives in the library; this file only touches the
// instruction and the RTC index/data ports.

use core::arch::x86_64::__cpuid_count;

use lumen_hwinfo::x86::{CmosSource, CpuidResult, CpuidSource};
use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

const CMOS_INDEX_PORT: u16 = 0x70;
const CMOS_DATA_PORT: u16 = 0x71;

/// Keeps NMIs disabled while an index is selected.
const CMOS_NMI_DISABLE: u8 = 0x80;

pub struct Cpuid;

impl CpuidSource for Cpuid {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidResult {
        let raw = unsafe { __cpuid_count(leaf, subleaf) };
        CpuidResult {
            eax: raw.eax,
            ebx: raw.ebx,
            ecx: raw.ecx,
            edx: raw.edx,
        }
    }
}

pub struct Cmos {
    index: Port<u8>,
    data: Port<u8>,
}

impl Cmos {
    pub const fn new() -> Self {
        Self {
            index: Port::new(CMOS_INDEX_PORT),
            data: Port::new(CMOS_DATA_PORT),
        }
    }
}

impl CmosSource for Cmos {
    fn read_register(&mut self, index: u8) -> u8 {
        interrupts::without_interrupts(|| unsafe {
            self.index.write(CMOS_NMI_DISABLE | index);
            self.data.read()
        })
    }
}
