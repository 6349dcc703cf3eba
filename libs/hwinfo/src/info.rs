// Canonical Hardware Record and Tier Scoring
//
// `HardwareInfo` is the one normalized description of the machine that the
// rest of the kernel reads. It is produced exactly once per boot by whichever
// detector matches the compiled architecture and is never mutated afterwards:
// the fields are private, the only constructors are the two detector folds,
// and the tier is computed inside those constructors as the last step.
//
// Tiering is a pure function of (cores, RAM) and is evaluated in order:
// - zero cores or zero RAM      -> FALLBACK (overrides everything else)
// - >= 4 cores and >= 2 GiB     -> HIGH
// - >= 2 cores and >= 512 MiB   -> MID
// - >= 128 MiB                  -> LOW
// - anything else               -> FALLBACK
//
// All thresholds are inclusive.

use core::fmt;

use heapless::String;

use crate::fdt::RawDescriptor;
use crate::x86::X86Detection;

pub const MODEL_CAPACITY: usize = 128;
pub const COMPAT_CAPACITY: usize = 128;

pub type ModelString = String<MODEL_CAPACITY>;
pub type CompatString = String<COMPAT_CAPACITY>;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

pub const HIGH_MIN_CORES: u32 = 4;
pub const HIGH_MIN_RAM: u64 = 2 * GIB;
pub const MID_MIN_CORES: u32 = 2;
pub const MID_MIN_RAM: u64 = 512 * MIB;
pub const LOW_MIN_RAM: u64 = 128 * MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Tier {
    #[default]
    Fallback = 0,
    Low = 1,
    Mid = 2,
    High = 3,
}

impl Tier {
    pub const fn score(cpu_cores: u32, ram_bytes: u64) -> Self {
        if cpu_cores == 0 || ram_bytes == 0 {
            return Tier::Fallback;
        }

        if cpu_cores >= HIGH_MIN_CORES && ram_bytes >= HIGH_MIN_RAM {
            Tier::High
        } else if cpu_cores >= MID_MIN_CORES && ram_bytes >= MID_MIN_RAM {
            Tier::Mid
        } else if ram_bytes >= LOW_MIN_RAM {
            Tier::Low
        } else {
            Tier::Fallback
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Tier::Fallback => "FALLBACK",
            Tier::Low => "LOW",
            Tier::Mid => "MID",
            Tier::High => "HIGH",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Arm64,
    Unknown,
}

impl Arch {
    /// Architecture this crate was compiled for.
    pub const fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            Arch::Unknown
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
            Arch::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-once description of the running machine.
///
/// A zero MMIO base means the peripheral is absent or was not detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareInfo {
    arch: Arch,
    cpu_cores: u32,
    ram_bytes: u64,
    model: ModelString,
    compat: CompatString,
    uart_base: u64,
    intc_cpu_base: u64,
    intc_dist_base: u64,
    tier: Tier,
}

impl HardwareInfo {
    /// The all-zero record; scores as `Tier::Fallback`.
    pub fn empty(arch: Arch) -> Self {
        Self {
            arch,
            cpu_cores: 0,
            ram_bytes: 0,
            model: ModelString::new(),
            compat: CompatString::new(),
            uart_base: 0,
            intc_cpu_base: 0,
            intc_dist_base: 0,
            tier: Tier::Fallback,
        }
    }

    /// Folds a device tree scan and the MIDR-derived model into the record.
    pub fn from_device_tree(raw: &RawDescriptor, model: ModelString) -> Self {
        let mut compat = CompatString::new();
        // uart_compat is half the capacity of compat.
        let _ = compat.push_str(raw.uart_compat.as_str());

        Self {
            arch: Arch::Arm64,
            cpu_cores: raw.cpu_count,
            ram_bytes: raw.ram_size,
            model,
            compat,
            uart_base: raw.uart_base,
            intc_cpu_base: raw.gic_cpu_base,
            intc_dist_base: raw.gic_dist_base,
            tier: Tier::Fallback,
        }
        .seal()
    }

    /// Folds a CPUID/CMOS detection into the record. No MMIO bases exist on
    /// this path.
    pub fn from_x86(detection: X86Detection) -> Self {
        Self {
            arch: Arch::X86_64,
            cpu_cores: detection.cores,
            ram_bytes: detection.ram_bytes,
            model: detection.brand,
            compat: CompatString::new(),
            uart_base: 0,
            intc_cpu_base: 0,
            intc_dist_base: 0,
            tier: Tier::Fallback,
        }
        .seal()
    }

    fn seal(mut self) -> Self {
        self.tier = Tier::score(self.cpu_cores, self.ram_bytes);
        self
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn cpu_cores(&self) -> u32 {
        self.cpu_cores
    }

    pub fn ram_bytes(&self) -> u64 {
        self.ram_bytes
    }

    pub fn ram_mib(&self) -> u64 {
        self.ram_bytes / MIB
    }

    pub fn model(&self) -> &str {
        self.model.as_str()
    }

    /// Matched UART compatible string (arm64 only, empty otherwise).
    pub fn compat(&self) -> &str {
        self.compat.as_str()
    }

    pub fn uart_base(&self) -> u64 {
        self.uart_base
    }

    /// GIC CPU interface base.
    pub fn intc_cpu_base(&self) -> u64 {
        self.intc_cpu_base
    }

    /// GIC distributor base.
    pub fn intc_dist_base(&self) -> u64 {
        self.intc_dist_base
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }
}

impl fmt::Display for HardwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = if self.model.is_empty() { "unknown CPU" } else { self.model() };
        write!(
            f,
            "{} | {} | {} cores | {} MiB | tier {}",
            self.arch,
            model,
            self.cpu_cores,
            self.ram_mib(),
            self.tier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_table() {
        assert_eq!(Tier::score(4, 2 * GIB), Tier::High);
        assert_eq!(Tier::score(2, 512 * MIB), Tier::Mid);
        assert_eq!(Tier::score(1, 200 * MIB), Tier::Low);
        assert_eq!(Tier::score(0, GIB), Tier::Fallback);
        assert_eq!(Tier::score(8, 100 * MIB), Tier::Fallback);
        assert_eq!(Tier::score(8, 128 * MIB), Tier::Low);
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(Tier::score(4, HIGH_MIN_RAM), Tier::High);
        assert_eq!(Tier::score(4, HIGH_MIN_RAM - 1), Tier::Mid);
        assert_eq!(Tier::score(3, 64 * GIB), Tier::Mid);
        assert_eq!(Tier::score(2, MID_MIN_RAM - 1), Tier::Low);
        assert_eq!(Tier::score(1, LOW_MIN_RAM), Tier::Low);
        assert_eq!(Tier::score(1, LOW_MIN_RAM - 1), Tier::Fallback);
    }

    #[test]
    fn zero_ram_overrides_core_count() {
        assert_eq!(Tier::score(64, 0), Tier::Fallback);
    }

    #[test]
    fn eight_cores_with_little_ram_is_not_high() {
        // 100 MiB sits under the LOW floor as well.
        assert_eq!(Tier::score(8, 100 * MIB), Tier::Fallback);
        assert_eq!(Tier::score(8, 256 * MIB), Tier::Low);
    }

    #[test]
    fn device_tree_fold_copies_fields_and_scores() {
        let mut raw = RawDescriptor::default();
        raw.cpu_count = 4;
        raw.ram_size = 4 * GIB;
        raw.uart_base = 0xFE20_1000;
        raw.gic_dist_base = 0xFF84_1000;
        raw.gic_cpu_base = 0xFF84_2000;
        raw.uart_compat.push_str("arm,pl011").unwrap();

        let mut model = ModelString::new();
        model.push_str("ARM Cortex-A72").unwrap();

        let info = HardwareInfo::from_device_tree(&raw, model);
        assert_eq!(info.arch(), Arch::Arm64);
        assert_eq!(info.cpu_cores(), 4);
        assert_eq!(info.ram_bytes(), 4 * GIB);
        assert_eq!(info.uart_base(), 0xFE20_1000);
        assert_eq!(info.intc_dist_base(), 0xFF84_1000);
        assert_eq!(info.intc_cpu_base(), 0xFF84_2000);
        assert_eq!(info.compat(), "arm,pl011");
        assert_eq!(info.model(), "ARM Cortex-A72");
        assert_eq!(info.tier(), Tier::High);
    }

    #[test]
    fn empty_device_tree_scores_fallback() {
        let info = HardwareInfo::from_device_tree(&RawDescriptor::default(), ModelString::new());
        assert_eq!(info.tier(), Tier::Fallback);
        assert_eq!(info, HardwareInfo::empty(Arch::Arm64));
    }

    #[test]
    fn x86_fold_has_no_mmio_bases() {
        let mut brand = ModelString::new();
        brand.push_str("QEMU Virtual CPU").unwrap();
        let info = HardwareInfo::from_x86(X86Detection {
            cores: 2,
            ram_bytes: 512 * MIB,
            brand,
        });

        assert_eq!(info.arch(), Arch::X86_64);
        assert_eq!(info.uart_base(), 0);
        assert_eq!(info.intc_cpu_base(), 0);
        assert_eq!(info.intc_dist_base(), 0);
        assert_eq!(info.compat(), "");
        assert_eq!(info.tier(), Tier::Mid);
    }

    #[test]
    fn summary_line_names_tier() {
        let info = HardwareInfo::empty(Arch::X86_64);
        let line = format!("{info}");
        assert!(line.starts_with("x86_64 | unknown CPU | 0 cores"));
        assert!(line.ends_with("tier FALLBACK"));
    }
}
