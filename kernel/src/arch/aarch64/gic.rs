// ARM Generic Interrupt Controller (GICv2 programming model)
//
// Drives the distributor and the CPU interface of a GIC-400 class
// controller (GIC-600 in its v2-compatible mode works too). Both MMIO bases
// come from the device tree.
//
// Bring-up:
// - Enable the distributor
// - Every interrupt at priority 0xA0
// - Every SPI (32 and up) routed to CPU 0
// - Every interrupt disabled until a driver unmasks it
// - CPU interface priority mask at 0xFF (accept all), then enabled
//
// Without both bases the controller stays unconfigured and unmask/EOI
// calls do nothing. Unmasking an INTID past the configured range does
// nothing either.

use core::ptr;

use lumen_hwinfo::intc::{self, GIC_MAX_INTERRUPTS};
use spin::Mutex;

const GICD_CTLR: usize = 0x000;
const GICD_ISENABLER: usize = 0x100;
const GICD_ICENABLER: usize = 0x180;
const GICD_IPRIORITYR: usize = 0x400;
const GICD_ITARGETSR: usize = 0x800;

const GICC_CTLR: usize = 0x000;
const GICC_PMR: usize = 0x004;
const GICC_EOIR: usize = 0x010;

const MAX_INTERRUPTS: usize = GIC_MAX_INTERRUPTS as usize;
const FIRST_SPI: usize = 32;
const DEFAULT_PRIORITY: u32 = 0xA0A0_A0A0;
const TARGET_CPU0: u32 = 0x0101_0101;
const PRIORITY_ACCEPT_ALL: u32 = 0xFF;

#[derive(Clone, Copy)]
struct Bases {
    dist: usize,
    cpu: usize,
}

pub struct Gic {
    bases: Option<Bases>,
}

unsafe fn write_reg(base: usize, offset: usize, value: u32) {
    ptr::write_volatile((base + offset) as *mut u32, value);
}

impl Gic {
    pub const fn unconfigured() -> Self {
        Self { bases: None }
    }

    pub fn init(&mut self, dist_base: u64, cpu_base: u64) -> bool {
        let (Ok(dist), Ok(cpu)) = (usize::try_from(dist_base), usize::try_from(cpu_base)) else {
            return false;
        };
        if dist == 0 || cpu == 0 {
            return false;
        }

        unsafe {
            write_reg(dist, GICD_CTLR, 1);

            for offset in (0..MAX_INTERRUPTS).step_by(4) {
                write_reg(dist, GICD_IPRIORITYR + offset, DEFAULT_PRIORITY);
            }

            for offset in (FIRST_SPI..MAX_INTERRUPTS).step_by(4) {
                write_reg(dist, GICD_ITARGETSR + offset, TARGET_CPU0);
            }

            for irq in (0..MAX_INTERRUPTS).step_by(32) {
                write_reg(dist, GICD_ICENABLER + irq / 8, 0xFFFF_FFFF);
            }

            write_reg(cpu, GICC_PMR, PRIORITY_ACCEPT_ALL);
            write_reg(cpu, GICC_CTLR, 1);
        }

        self.bases = Some(Bases { dist, cpu });
        true
    }

    pub fn enable(&mut self, irq: u32) {
        let Some(bases) = self.bases else {
            return;
        };
        let Some(enable) = intc::gic_enable(irq) else {
            return;
        };

        unsafe {
            write_reg(bases.dist, GICD_ISENABLER + enable.register * 4, enable.bit);
        }
    }

    pub fn end_of_interrupt(&mut self, irq: u32) {
        let Some(bases) = self.bases else {
            return;
        };

        unsafe {
            write_reg(bases.cpu, GICC_EOIR, irq);
        }
    }
}

pub static GIC: Mutex<Gic> = Mutex::new(Gic::unconfigured());
