use lumen_hwinfo::fdt::{self, FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_MAGIC, FDT_NOP, FDT_PROP, HEADER_LEN};
use lumen_hwinfo::ident::{cpu_model_name, CpuId};
use lumen_hwinfo::info::{GIB, MIB};
use lumen_hwinfo::{FdtError, HardwareInfo, RawDescriptor, ScanStatus, Tier, Truncation};

const RSVMAP_LEN: usize = 16;

/// Assembles a DTB one token at a time.
#[derive(Default)]
struct DtbBuilder {
    structure: Vec<u8>,
    strings: Vec<u8>,
}

fn push_be32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn pad(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

impl DtbBuilder {
    fn new() -> Self {
        Self::default()
    }

    fn offset(&self) -> usize {
        self.structure.len()
    }

    fn begin(&mut self, name: &str) -> &mut Self {
        push_be32(&mut self.structure, FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        pad(&mut self.structure);
        self
    }

    fn end(&mut self) -> &mut Self {
        push_be32(&mut self.structure, FDT_END_NODE);
        self
    }

    fn token(&mut self, token: u32) -> &mut Self {
        push_be32(&mut self.structure, token);
        self
    }

    fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let name_offset = self.strings.len();
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);

        push_be32(&mut self.structure, FDT_PROP);
        push_be32(&mut self.structure, u32::try_from(value.len()).unwrap());
        push_be32(&mut self.structure, u32::try_from(name_offset).unwrap());
        self.structure.extend_from_slice(value);
        pad(&mut self.structure);
        self
    }

    fn prop_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        let value: Vec<u8> = cells.iter().flat_map(|cell| cell.to_be_bytes()).collect();
        self.prop(name, &value)
    }

    fn compatible(&mut self, entries: &[&str]) -> &mut Self {
        let mut value = Vec::new();
        for entry in entries {
            value.extend_from_slice(entry.as_bytes());
            value.push(0);
        }
        self.prop("compatible", &value)
    }

    fn root_cells(&mut self, address: u32, size: u32) -> &mut Self {
        self.prop_cells("#address-cells", &[address])
            .prop_cells("#size-cells", &[size])
    }

    /// Blob without the closing END token.
    fn unterminated(&self) -> Vec<u8> {
        let off_dt_struct = HEADER_LEN + RSVMAP_LEN;
        let off_dt_strings = off_dt_struct + self.structure.len();
        let totalsize = off_dt_strings + self.strings.len();

        let mut blob = Vec::with_capacity(totalsize);
        push_be32(&mut blob, FDT_MAGIC);
        push_be32(&mut blob, u32::try_from(totalsize).unwrap());
        push_be32(&mut blob, u32::try_from(off_dt_struct).unwrap());
        push_be32(&mut blob, u32::try_from(off_dt_strings).unwrap());
        push_be32(&mut blob, u32::try_from(HEADER_LEN).unwrap());
        push_be32(&mut blob, 17);
        push_be32(&mut blob, 16);
        push_be32(&mut blob, 0);
        push_be32(&mut blob, u32::try_from(self.strings.len()).unwrap());
        push_be32(&mut blob, u32::try_from(self.structure.len()).unwrap());
        blob.resize(off_dt_struct, 0);
        blob.extend_from_slice(&self.structure);
        blob.extend_from_slice(&self.strings);
        blob
    }

    fn finish(&mut self) -> Vec<u8> {
        self.token(FDT_END);
        self.unterminated()
    }
}

fn pl011_board() -> Vec<u8> {
    DtbBuilder::new()
        .begin("")
        .root_cells(1, 1)
        .begin("serial@fe201000")
        .compatible(&["arm,pl011", "arm,primecell"])
        .prop_cells("reg", &[0xFE20_1000, 0x200])
        .end()
        .end()
        .finish()
}

#[test]
fn memory_node_with_two_address_cells() {
    let blob = DtbBuilder::new()
        .begin("")
        .root_cells(2, 1)
        .begin("memory@0")
        .prop("device_type", b"memory\0")
        .prop_cells("reg", &[0x0, 0x0, 0x4000_0000])
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.is_clean());
    assert_eq!(scan.descriptor.ram_base, 0);
    assert_eq!(scan.descriptor.ram_size, GIB);
}

#[test]
fn pl011_uart_is_found_by_ip_block() {
    let scan = fdt::scan(&pl011_board());
    assert!(scan.is_clean());
    assert_eq!(scan.descriptor.uart_base, 0xFE20_1000);
    assert_eq!(scan.descriptor.uart_compat.as_str(), "arm,pl011");
}

#[test]
fn first_uart_in_document_order_wins() {
    let blob = DtbBuilder::new()
        .begin("")
        .begin("serial@7e201000")
        .compatible(&["arm,pl011"])
        .prop_cells("reg", &[0x7E20_1000, 0x200])
        .end()
        .begin("serial@7e215040")
        .compatible(&["brcm,bcm2835-aux-uart"])
        .prop_cells("reg", &[0x7E21_5040, 0x40])
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert_eq!(scan.descriptor.uart_base, 0x7E20_1000);
    assert_eq!(scan.descriptor.uart_compat.as_str(), "arm,pl011");
}

#[test]
fn gic_distributor_and_cpu_interface() {
    let blob = DtbBuilder::new()
        .begin("")
        .root_cells(1, 1)
        .begin("intc@8000000")
        .compatible(&["arm,cortex-a15-gic"])
        .prop_cells("reg", &[0x0800_0000, 0x0001_0000, 0x0801_0000, 0x0001_0000])
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert_eq!(scan.descriptor.gic_dist_base, 0x0800_0000);
    assert_eq!(scan.descriptor.gic_cpu_base, 0x0801_0000);
}

#[test]
fn gic_with_msi_child_frame_is_settled_before_the_child() {
    let blob = DtbBuilder::new()
        .begin("")
        .root_cells(2, 2)
        .begin("intc@8000000")
        .compatible(&["arm,gic-400"])
        .prop_cells("reg", &[0, 0x0800_0000, 0, 0x1_0000, 0, 0x0801_0000, 0, 0x1_0000])
        .begin("v2m@8020000")
        .compatible(&["arm,gic-v2m-frame"])
        .prop_cells("reg", &[0, 0x0802_0000, 0, 0x1000])
        .end()
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.is_clean());
    assert_eq!(scan.descriptor.gic_dist_base, 0x0800_0000);
    assert_eq!(scan.descriptor.gic_cpu_base, 0x0801_0000);
}

#[test]
fn gic_with_a_single_region_has_no_cpu_interface() {
    let blob = DtbBuilder::new()
        .begin("")
        .begin("interrupt-controller@ff841000")
        .compatible(&["arm,gic-v3"])
        .prop_cells("reg", &[0xFF84_1000, 0x1000])
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert_eq!(scan.descriptor.gic_dist_base, 0xFF84_1000);
    assert_eq!(scan.descriptor.gic_cpu_base, 0);
}

#[test]
fn cpus_are_counted_only_under_cpus() {
    let blob = DtbBuilder::new()
        .begin("")
        .begin("cpus")
        .prop_cells("#address-cells", &[1])
        .prop_cells("#size-cells", &[0])
        .begin("cpu@0")
        .prop_cells("reg", &[0])
        .begin("l2-cache")
        .end()
        .end()
        .begin("cpu@1")
        .end()
        .begin("cpu-map")
        .begin("cluster0")
        .end()
        .end()
        .begin("cpu@2")
        .end()
        .begin("cpu@3")
        .end()
        .end()
        .begin("cpu@99")
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.is_clean());
    assert_eq!(scan.descriptor.cpu_count, 4);
}

#[test]
fn nested_cell_widths_are_ignored() {
    let blob = DtbBuilder::new()
        .begin("")
        .root_cells(1, 1)
        .begin("soc")
        .prop_cells("#address-cells", &[2])
        .prop_cells("#size-cells", &[2])
        .begin("serial@1000")
        .compatible(&["arm,pl011"])
        .prop_cells("reg", &[0x1000, 0x100])
        .end()
        .end()
        .end()
        .finish();

    assert_eq!(fdt::scan(&blob).descriptor.uart_base, 0x1000);
}

#[test]
fn board_compatible_strings_are_not_peripherals() {
    let blob = DtbBuilder::new()
        .begin("")
        .compatible(&["raspberrypi,4-model-b", "brcm,bcm2711"])
        .prop("model", b"Raspberry Pi 4 Model B\0")
        .begin("serial@7e201000")
        .compatible(&["brcm,bcm2835-pl011"])
        .prop_cells("reg", &[0x7E20_1000, 0x200])
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.is_clean());
    assert_eq!(scan.descriptor.uart_base, 0);
    assert!(scan.descriptor.uart_compat.is_empty());
}

#[test]
fn nop_tokens_are_skipped() {
    let blob = DtbBuilder::new()
        .token(FDT_NOP)
        .begin("")
        .token(FDT_NOP)
        .begin("memory")
        .prop_cells("reg", &[0x4000_0000, 0x2000_0000])
        .token(FDT_NOP)
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.is_clean());
    assert_eq!(scan.descriptor.ram_base, 0x4000_0000);
    assert_eq!(scan.descriptor.ram_size, 512 * MIB);
}

#[test]
fn bad_magic_and_missing_blob_leave_everything_zero() {
    let mut blob = pl011_board();
    blob[0] ^= 0xFF;

    let scan = fdt::scan(&blob);
    assert!(!scan.is_valid());
    assert!(matches!(scan.status, ScanStatus::Rejected(FdtError::BadMagic(_))));
    assert!(scan.descriptor.is_empty());

    let scan = unsafe { fdt::scan_at(0) };
    assert_eq!(scan.status, ScanStatus::Rejected(FdtError::MissingSource));
    assert_eq!(scan.descriptor, RawDescriptor::default());

    let scan = fdt::scan(&blob[..12]);
    assert!(scan.descriptor.is_empty());
}

#[test]
fn out_of_range_structure_block_is_rejected() {
    let mut blob = pl011_board();
    blob[8..12].copy_from_slice(&0xFFFF_0000u32.to_be_bytes());

    let scan = fdt::scan(&blob);
    assert_eq!(scan.status, ScanStatus::Rejected(FdtError::Bounds));
    assert!(scan.descriptor.is_empty());
}

#[test]
fn unknown_token_halts_but_keeps_earlier_fields() {
    let mut builder = DtbBuilder::new();
    builder
        .begin("")
        .begin("memory@0")
        .prop_cells("reg", &[0, 0x8000_0000])
        .end();
    let bad_offset = builder.offset();
    builder
        .token(0x0000_0007)
        .begin("serial@fe201000")
        .compatible(&["arm,pl011"])
        .prop_cells("reg", &[0xFE20_1000, 0x200])
        .end()
        .end();
    let blob = builder.finish();

    let scan = fdt::scan(&blob);
    assert!(scan.is_valid());
    assert_eq!(
        scan.status,
        ScanStatus::Halted(FdtError::UnknownToken { token: 7, offset: bad_offset })
    );
    assert_eq!(scan.descriptor.ram_size, 0x8000_0000);
    assert_eq!(scan.descriptor.uart_base, 0);
}

#[test]
fn stream_without_end_token_halts() {
    let blob = DtbBuilder::new()
        .begin("")
        .begin("memory")
        .prop_cells("reg", &[0, 0x1000_0000])
        .end()
        .unterminated();

    let scan = fdt::scan(&blob);
    assert!(matches!(scan.status, ScanStatus::Halted(FdtError::Truncated(_))));
    assert_eq!(scan.descriptor.ram_size, 0x1000_0000);
}

#[test]
fn oversized_values_are_truncated_and_flagged() {
    let long_name = "n".repeat(100);
    let long_entry = "vendor,".repeat(40);
    let reg: Vec<u32> = (0..32).collect();

    let blob = DtbBuilder::new()
        .begin("")
        .begin(&long_name)
        .compatible(&[long_entry.as_str(), "arm,pl011"])
        .prop_cells("reg", &reg)
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.is_clean());
    assert_eq!(
        scan.truncated,
        Truncation::NODE_NAME | Truncation::COMPATIBLE | Truncation::REG
    );
    // The UART entry fell past the compatible bound.
    assert_eq!(scan.descriptor.uart_base, 0);
}

#[test]
fn cut_off_identifier_does_not_match_by_prefix() {
    // 245 filler bytes plus NUL leave exactly "arm,pl011" of the next entry
    // inside the 255-byte copy.
    let filler = "x".repeat(245);
    let blob = DtbBuilder::new()
        .begin("")
        .begin("serial@1000")
        .compatible(&[filler.as_str(), "arm,pl011-rev2"])
        .prop_cells("reg", &[0x1000, 0x100])
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.truncated.contains(Truncation::COMPATIBLE));
    assert_eq!(scan.descriptor.uart_base, 0);
}

#[test]
fn identifier_ending_at_the_bound_still_matches() {
    // 245 filler bytes plus NUL, then "arm,pl011" fills the copy exactly and
    // its NUL is the one byte left behind.
    let filler = "x".repeat(245);
    let blob = DtbBuilder::new()
        .begin("")
        .begin("serial@1000")
        .compatible(&[filler.as_str(), "arm,pl011"])
        .prop_cells("reg", &[0x1000, 0x200])
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.truncated.contains(Truncation::COMPATIBLE));
    assert_eq!(scan.descriptor.uart_base, 0x1000);
    assert_eq!(scan.descriptor.uart_compat.as_str(), "arm,pl011");
}

#[test]
fn scanning_twice_gives_the_same_record() {
    let blob = pl011_board();
    assert_eq!(fdt::scan(&blob), fdt::scan(&blob));
}

#[test]
fn scan_at_reads_the_same_blob_from_memory() {
    let blob = pl011_board();
    let from_memory = unsafe { fdt::scan_at(blob.as_ptr() as u64) };
    assert_eq!(from_memory, fdt::scan(&blob));
}

#[test]
fn raspberry_pi_4_end_to_end() {
    let blob = DtbBuilder::new()
        .begin("")
        .root_cells(2, 1)
        .compatible(&["raspberrypi,4-model-b", "brcm,bcm2711"])
        .begin("cpus")
        .begin("cpu@0")
        .end()
        .begin("cpu@1")
        .end()
        .begin("cpu@2")
        .end()
        .begin("cpu@3")
        .end()
        .end()
        .begin("memory@0")
        .prop_cells("reg", &[0, 0, 0x3B40_0000])
        .end()
        .begin("serial@7e201000")
        .compatible(&["arm,pl011", "arm,primecell"])
        .prop_cells("reg", &[0, 0xFE20_1000, 0x200])
        .end()
        .begin("interrupt-controller@40041000")
        .compatible(&["arm,gic-400"])
        .prop_cells("reg", &[0, 0xFF84_1000, 0x1000, 0, 0xFF84_2000, 0x2000])
        .end()
        .end()
        .finish();

    let scan = fdt::scan(&blob);
    assert!(scan.is_clean());

    let model = cpu_model_name(CpuId::from_midr(0x410F_D083));
    let info = HardwareInfo::from_device_tree(&scan.descriptor, model);

    assert_eq!(info.cpu_cores(), 4);
    assert_eq!(info.ram_bytes(), 0x3B40_0000);
    assert_eq!(info.uart_base(), 0xFE20_1000);
    assert_eq!(info.intc_dist_base(), 0xFF84_1000);
    assert_eq!(info.intc_cpu_base(), 0xFF84_2000);
    assert_eq!(info.model(), "ARM Cortex-A72");
    assert_eq!(info.compat(), "arm,pl011");
    // Under 2 GiB visible to the first memory node.
    assert_eq!(info.tier(), Tier::Mid);
}
