// Interrupt Controller Line Arithmetic
//
// The register math behind the kernel's 8259 and GICv2 drivers, kept apart
// from the port and MMIO writes so it runs in host tests.
//
// 8259 pair:
// - IRQ 0-7 live on the master, 8-15 on the slave
// - The slave reports through the master's IRQ2, so unmasking a slave line
//   also clears the cascade bit on the master
//
// GICv2:
// - ISENABLER is a bank of 32-bit set-enable registers, one bit per INTID
// - Only the first `GIC_MAX_INTERRUPTS` are configured at bring-up; anything
//   above is rejected rather than written past that bank

pub const PIC_LINES: u8 = 16;
pub const PIC_CASCADE_IRQ: u8 = 2;

pub const GIC_MAX_INTERRUPTS: u32 = 256;

/// Mask bits to clear on each 8259 to deliver one IRQ line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PicUnmask {
    pub master: u8,
    pub slave: u8,
}

pub fn pic_unmask(irq: u8) -> Option<PicUnmask> {
    match irq {
        0..=7 => Some(PicUnmask {
            master: 1 << irq,
            slave: 0,
        }),
        8..=15 => Some(PicUnmask {
            master: 1 << PIC_CASCADE_IRQ,
            slave: 1 << (irq - 8),
        }),
        _ => None,
    }
}

/// ISENABLER register index and bit for `irq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicEnable {
    pub register: usize,
    pub bit: u32,
}

pub fn gic_enable(irq: u32) -> Option<GicEnable> {
    if irq >= GIC_MAX_INTERRUPTS {
        return None;
    }

    Some(GicEnable {
        register: (irq / 32) as usize,
        bit: 1 << (irq % 32),
    })
}
