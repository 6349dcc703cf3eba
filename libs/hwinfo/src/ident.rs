// IP-Block Identification
//
// One rule, applied twice: hardware is recognized by the identity of the IP
// block the silicon vendor licensed or designed, never by the name of the
// board it was soldered onto. The same kernel image therefore keeps working
// on every board generation that reuses a known UART, interrupt controller
// or CPU core.
//
// Peripheral side:
// - A device tree node's `compatible` property is a NUL-separated list of
//   identifiers; a node is a UART or GIC if any entry equals one of the
//   fixed identifiers below (exact, case-sensitive)
//
// CPU side:
// - MIDR_EL1 carries an implementer code (bits 31:24) and a part number
//   (bits 15:4); both are looked up in a static, ordered table
// - Apple reuses part numbers across generations, so its entry matches on
//   the implementer alone through the `ANY_PART` sentinel
// - First match wins; an unknown core gets a label with both codes in hex

use core::fmt::Write;

use crate::info::ModelString;

pub const UART_COMPATIBLES: [&str; 2] = ["arm,pl011", "brcm,bcm2835-aux-uart"];

pub const GIC_COMPATIBLES: [&str; 3] = ["arm,cortex-a15-gic", "arm,gic-400", "arm,gic-v3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralKind {
    Uart,
    InterruptController,
}

impl PeripheralKind {
    pub const fn identifiers(self) -> &'static [&'static str] {
        match self {
            PeripheralKind::Uart => &UART_COMPATIBLES,
            PeripheralKind::InterruptController => &GIC_COMPATIBLES,
        }
    }
}

/// Iterates the non-empty entries of a NUL-separated `compatible` list.
pub fn compatible_entries(list: &[u8]) -> impl Iterator<Item = &[u8]> {
    list.split(|&byte| byte == 0).filter(|entry| !entry.is_empty())
}

/// Returns the known identifier for `kind` found earliest in `list`.
pub fn match_compatible(list: &[u8], kind: PeripheralKind) -> Option<&'static str> {
    compatible_entries(list).find_map(|entry| {
        kind.identifiers()
            .iter()
            .copied()
            .find(|known| known.as_bytes() == entry)
    })
}

pub const IMPLEMENTER_ARM: u8 = 0x41;
pub const IMPLEMENTER_BROADCOM: u8 = 0x42;
pub const IMPLEMENTER_QUALCOMM: u8 = 0x51;
pub const IMPLEMENTER_APPLE: u8 = 0x61;

/// Part numbers are 12 bits wide, so this can never collide with a real one.
pub const ANY_PART: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuEntry {
    pub implementer: u8,
    pub part: u16,
    pub name: &'static str,
}

impl CpuEntry {
    const fn new(implementer: u8, part: u16, name: &'static str) -> Self {
        Self { implementer, part, name }
    }

    fn matches(&self, id: CpuId) -> bool {
        self.implementer == id.implementer && (self.part == ANY_PART || self.part == id.part)
    }
}

pub static CPU_TABLE: [CpuEntry; 24] = [
    CpuEntry::new(IMPLEMENTER_ARM, 0xD03, "ARM Cortex-A53"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD04, "ARM Cortex-A35"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD05, "ARM Cortex-A55"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD07, "ARM Cortex-A57"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD08, "ARM Cortex-A72"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD09, "ARM Cortex-A73"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD0A, "ARM Cortex-A75"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD0B, "ARM Cortex-A76"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD0C, "ARM Neoverse-N1"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD0D, "ARM Cortex-A77"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD40, "ARM Neoverse-V1"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD41, "ARM Cortex-A78"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD44, "ARM Cortex-X1"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD46, "ARM Cortex-A510"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD47, "ARM Cortex-A710"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD48, "ARM Cortex-X2"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD4B, "ARM Cortex-A78C"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD4D, "ARM Cortex-A715"),
    CpuEntry::new(IMPLEMENTER_ARM, 0xD4E, "ARM Cortex-X3"),
    CpuEntry::new(IMPLEMENTER_APPLE, ANY_PART, "Apple Silicon"),
    CpuEntry::new(IMPLEMENTER_QUALCOMM, 0x800, "Qualcomm Kryo"),
    CpuEntry::new(IMPLEMENTER_QUALCOMM, 0x801, "Qualcomm Kryo"),
    CpuEntry::new(IMPLEMENTER_QUALCOMM, 0x802, "Qualcomm Kryo"),
    CpuEntry::new(IMPLEMENTER_BROADCOM, 0x00F, "Broadcom Cortex-A7"),
];

/// Implementer and part fields pulled out of a MIDR_EL1 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuId {
    pub implementer: u8,
    pub part: u16,
}

impl CpuId {
    pub const fn from_midr(midr: u64) -> Self {
        Self {
            implementer: ((midr >> 24) & 0xFF) as u8,
            part: ((midr >> 4) & 0xFFF) as u16,
        }
    }
}

pub fn lookup_cpu(id: CpuId) -> Option<&'static CpuEntry> {
    CPU_TABLE.iter().find(|entry| entry.matches(id))
}

pub fn cpu_model_name(id: CpuId) -> ModelString {
    let mut model = ModelString::new();

    // Both branches fit well inside the model capacity.
    let _ = match lookup_cpu(id) {
        Some(entry) => model.push_str(entry.name).map_err(|_| core::fmt::Error),
        None => write!(
            model,
            "AArch64 CPU (impl=0x{:x} part=0x{:x})",
            id.implementer, id.part
        ),
    };

    model
}
