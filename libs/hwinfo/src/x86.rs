// x86_64 Hardware Detection
//
// PCs carry no device tree, so the same facts are read from the CPU and the
// RTC/CMOS instead:
// - Core count from the extended topology leaf (0xB, subleaf 1) when the CPU
//   has it, otherwise from the legacy leaf 1 logical processor field
// - Model name from the 48-byte brand string in leaves 0x80000002..4, or a
//   fixed placeholder when the CPU lacks those leaves. A CPU that has them
//   but reports only blanks gets an empty name.
// - RAM from the CMOS extended memory registers
//
// The CMOS numbers are an estimate, not a memory map. They are floored at
// 128 MiB so the tier scorer never sees an implausible zero on a machine
// that clearly booted. A firmware-provided map would replace this path.
//
// The instruction and the ports are reached through `CpuidSource` and
// `CmosSource`; the kernel implements them on real hardware and the tests
// implement them with fixed tables.

use crate::info::{ModelString, MIB};

pub const LEAF_VENDOR: u32 = 0x0000_0000;
pub const LEAF_FEATURES: u32 = 0x0000_0001;
pub const LEAF_TOPOLOGY: u32 = 0x0000_000B;
pub const LEAF_EXTENDED_MAX: u32 = 0x8000_0000;
pub const LEAF_BRAND_FIRST: u32 = 0x8000_0002;
pub const LEAF_BRAND_LAST: u32 = 0x8000_0004;

pub const CMOS_EXT_MEM_LOW: u8 = 0x30;
pub const CMOS_EXT_MEM_HIGH: u8 = 0x31;
pub const CMOS_EXT_MEM_16M_LOW: u8 = 0x34;
pub const CMOS_EXT_MEM_16M_HIGH: u8 = 0x35;

pub const RAM_FLOOR: u64 = 128 * MIB;
pub const BRAND_LEN: usize = 48;
pub const PLACEHOLDER_BRAND: &str = "x86_64 CPU";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

pub trait CpuidSource {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidResult;
}

pub trait CmosSource {
    fn read_register(&mut self, index: u8) -> u8;

    fn read_word(&mut self, low: u8, high: u8) -> u16 {
        let low = self.read_register(low);
        let high = self.read_register(high);
        u16::from_le_bytes([low, high])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X86Detection {
    pub cores: u32,
    pub ram_bytes: u64,
    pub brand: ModelString,
}

pub fn core_count<C: CpuidSource + ?Sized>(cpu: &C) -> u32 {
    let max_leaf = cpu.cpuid(LEAF_VENDOR, 0).eax;

    if max_leaf >= LEAF_TOPOLOGY {
        let cores = cpu.cpuid(LEAF_TOPOLOGY, 1).ebx & 0xFFFF;
        if cores > 0 {
            return cores;
        }
    }

    let logical = (cpu.cpuid(LEAF_FEATURES, 0).ebx >> 16) & 0xFF;
    logical.max(1)
}

pub fn brand_string<C: CpuidSource + ?Sized>(cpu: &C) -> ModelString {
    let mut brand = ModelString::new();

    if cpu.cpuid(LEAF_EXTENDED_MAX, 0).eax >= LEAF_BRAND_LAST {
        let mut raw = [0u8; BRAND_LEN];
        let leaves = LEAF_BRAND_FIRST..=LEAF_BRAND_LAST;

        for (chunk, leaf) in raw.chunks_exact_mut(16).zip(leaves) {
            let regs = cpu.cpuid(leaf, 0);
            for (slot, reg) in chunk.chunks_exact_mut(4).zip([regs.eax, regs.ebx, regs.ecx, regs.edx]) {
                slot.copy_from_slice(&reg.to_le_bytes());
            }
        }

        let end = raw.iter().position(|&byte| byte == 0).unwrap_or(BRAND_LEN);
        let text = match core::str::from_utf8(&raw[..end]) {
            Ok(text) => text,
            Err(err) => core::str::from_utf8(&raw[..err.valid_up_to()]).unwrap_or(""),
        };
        let _ = brand.push_str(text.trim_start_matches(' '));
    } else {
        let _ = brand.push_str(PLACEHOLDER_BRAND);
    }

    brand
}

pub fn estimate_ram<S: CmosSource + ?Sized>(cmos: &mut S) -> u64 {
    let above_1m_kib = u64::from(cmos.read_word(CMOS_EXT_MEM_LOW, CMOS_EXT_MEM_HIGH));
    let above_16m_64k = u64::from(cmos.read_word(CMOS_EXT_MEM_16M_LOW, CMOS_EXT_MEM_16M_HIGH));

    let total = (1024 + above_1m_kib) * 1024 + above_16m_64k * 64 * 1024;
    total.max(RAM_FLOOR)
}

pub fn detect<C, S>(cpu: &C, cmos: &mut S) -> X86Detection
where
    C: CpuidSource + ?Sized,
    S: CmosSource + ?Sized,
{
    let detection = X86Detection {
        cores: core_count(cpu),
        ram_bytes: estimate_ram(cmos),
        brand: brand_string(cpu),
    };

    log::debug!(
        target: "x86",
        "cpuid: {} cores, brand \"{}\"; cmos ram estimate {} MiB",
        detection.cores,
        detection.brand,
        detection.ram_bytes / MIB
    );

    detection
}
