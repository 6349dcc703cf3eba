// Flattened Device Tree Scanner
//
// Walks the structure block of a big-endian FDT blob once and pulls out the
// handful of facts the kernel needs at boot: the first memory range, the
// number of CPU nodes, and the MMIO bases of the first UART and the first
// GIC whose `compatible` lists name a known IP block.
//
// Key responsibilities:
// - Validate the 40-byte header and bound the structure and strings blocks
// - Follow the BEGIN_NODE / END_NODE / PROP / NOP / END token stream
// - Decode `reg` payloads with the root `#address-cells` / `#size-cells`
// - Report partial results together with a diagnostic status
//
// Parsing model:
// - Every scalar in the blob is big-endian and goes through `be32_at`
// - Tokens are 4-byte aligned relative to the start of the structure block
// - A node's properties always precede its first child, so a node is
//   "settled" (its `reg` decoded against its classification) either when its
//   first child begins or when it ends, whichever comes first
// - For every kind of node the first match in document order wins
//
// Failure model:
// - Header problems reject the scan before any field is touched
// - Unknown tokens and streams that run off the block halt the walk; fields
//   resolved before that point are kept
// - Oversized names, compatible lists and `reg` payloads are cut to fixed
//   capacities and flagged in `Truncation`
//
// Nothing here allocates. Every buffer lives on the stack with a fixed
// capacity, so the cost of a scan is linear in the structure block size.

use bitflags::bitflags;
use heapless::{String, Vec};
use log::{debug, warn};

use crate::error::FdtError;
use crate::ident::{match_compatible, PeripheralKind};

const LOG_TARGET: &str = "fdt";

pub const FDT_MAGIC: u32 = 0xD00D_FEED;

pub const FDT_BEGIN_NODE: u32 = 0x0000_0001;
pub const FDT_END_NODE: u32 = 0x0000_0002;
pub const FDT_PROP: u32 = 0x0000_0003;
pub const FDT_NOP: u32 = 0x0000_0004;
pub const FDT_END: u32 = 0x0000_0009;

pub const HEADER_LEN: usize = 40;

pub const NODE_NAME_CAPACITY: usize = 63;
pub const COMPATIBLE_CAPACITY: usize = 255;
pub const REG_CAPACITY: usize = 64;
pub const UART_COMPAT_CAPACITY: usize = 64;

/// Facts extracted from the tree, before they are folded into
/// `HardwareInfo`. Zero means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDescriptor {
    pub uart_base: u64,
    pub gic_dist_base: u64,
    pub gic_cpu_base: u64,
    pub ram_base: u64,
    pub ram_size: u64,
    pub cpu_count: u32,
    pub uart_compat: String<UART_COMPAT_CAPACITY>,
}

impl RawDescriptor {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

bitflags! {
    /// Bounded buffers that had to drop input during a scan.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Truncation: u8 {
        const NODE_NAME = 1 << 0;
        const COMPATIBLE = 1 << 1;
        const REG = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// The walk reached the END token.
    Clean,
    /// The header was unusable; the descriptor is all zero.
    Rejected(FdtError),
    /// The walk stopped early; fields resolved before the stop are kept.
    Halted(FdtError),
}

impl ScanStatus {
    pub fn error(&self) -> Option<FdtError> {
        match self {
            ScanStatus::Clean => None,
            ScanStatus::Rejected(err) | ScanStatus::Halted(err) => Some(*err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdtScan {
    pub descriptor: RawDescriptor,
    pub status: ScanStatus,
    pub truncated: Truncation,
}

impl FdtScan {
    fn rejected(err: FdtError) -> Self {
        Self {
            descriptor: RawDescriptor::default(),
            status: ScanStatus::Rejected(err),
            truncated: Truncation::empty(),
        }
    }

    /// True when the header validated, whatever happened during the walk.
    pub fn is_valid(&self) -> bool {
        !matches!(self.status, ScanStatus::Rejected(_))
    }

    pub fn is_clean(&self) -> bool {
        self.status == ScanStatus::Clean
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtHeader {
    pub magic: u32,
    pub totalsize: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub off_mem_rsvmap: u32,
    pub version: u32,
    pub last_comp_version: u32,
    pub boot_cpuid_phys: u32,
    pub size_dt_strings: u32,
    pub size_dt_struct: u32,
}

impl FdtHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, FdtError> {
        let magic = be32_at(bytes, 0).ok_or(FdtError::TooShort)?;
        if magic != FDT_MAGIC {
            return Err(FdtError::BadMagic(magic));
        }

        let field = |index: usize| be32_at(bytes, index * 4).ok_or(FdtError::TooShort);

        Ok(Self {
            magic,
            totalsize: field(1)?,
            off_dt_struct: field(2)?,
            off_dt_strings: field(3)?,
            off_mem_rsvmap: field(4)?,
            version: field(5)?,
            last_comp_version: field(6)?,
            boot_cpuid_phys: field(7)?,
            size_dt_strings: field(8)?,
            size_dt_struct: field(9)?,
        })
    }

    /// A zero size means the header predates the size field; the block then
    /// runs to the end of the blob.
    fn block<'a>(blob: &'a [u8], offset: u32, size: u32) -> Result<&'a [u8], FdtError> {
        let start = offset as usize;
        let block = if size == 0 {
            blob.get(start..)
        } else {
            start
                .checked_add(size as usize)
                .and_then(|end| blob.get(start..end))
        };
        block.ok_or(FdtError::Bounds)
    }

    pub fn structure_block<'a>(&self, blob: &'a [u8]) -> Result<&'a [u8], FdtError> {
        Self::block(blob, self.off_dt_struct, self.size_dt_struct)
    }

    pub fn strings_block<'a>(&self, blob: &'a [u8]) -> Result<&'a [u8], FdtError> {
        Self::block(blob, self.off_dt_strings, self.size_dt_strings)
    }
}

/// Big-endian word at `offset`, or `None` when it does not fit.
pub fn be32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let word: [u8; 4] = bytes.get(offset..end)?.try_into().ok()?;
    Some(u32::from_be_bytes(word))
}

/// Address and size widths, in 32-bit cells, for `reg` decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellWidths {
    pub address: u32,
    pub size: u32,
}

impl Default for CellWidths {
    fn default() -> Self {
        Self { address: 1, size: 1 }
    }
}

impl CellWidths {
    /// Bytes taken by one (address, size) pair.
    pub fn stride(&self) -> Option<usize> {
        let cells = self.address.checked_add(self.size)?;
        (cells as usize).checked_mul(4)
    }

    pub fn decode_address(&self, reg: &[u8]) -> u64 {
        read_cells(reg, 0, self.address)
    }

    pub fn decode_size(&self, reg: &[u8]) -> u64 {
        match (self.address as usize).checked_mul(4) {
            Some(offset) => read_cells(reg, offset, self.size),
            None => 0,
        }
    }
}

// Only one- and two-cell fields exist on the boards we care about.
fn read_cells(bytes: &[u8], offset: usize, cells: u32) -> u64 {
    match cells {
        1 => be32_at(bytes, offset).map_or(0, u64::from),
        2 => {
            let high = be32_at(bytes, offset);
            let low = offset.checked_add(4).and_then(|next| be32_at(bytes, next));
            match (high, low) {
                (Some(high), Some(low)) => (u64::from(high) << 32) | u64::from(low),
                _ => 0,
            }
        }
        _ => 0,
    }
}

/// Copies as much of `src` as fits. Returns true if anything was dropped.
fn bounded_copy<const N: usize>(dst: &mut Vec<u8, N>, src: &[u8]) -> bool {
    dst.clear();
    let kept = src.len().min(N);
    let _ = dst.extend_from_slice(&src[..kept]);
    kept < src.len()
}

fn display_name(name: &[u8]) -> &str {
    match core::str::from_utf8(name) {
        Ok(name) if name.is_empty() => "/",
        Ok(name) => name,
        Err(_) => "<non-utf8>",
    }
}

struct Cursor<'a> {
    block: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(block: &'a [u8]) -> Self {
        Self { block, offset: 0 }
    }

    fn align(&mut self) {
        self.offset = self.offset.saturating_add(3) & !3;
    }

    fn read_u32(&mut self) -> Result<u32, FdtError> {
        let value = be32_at(self.block, self.offset).ok_or(FdtError::Truncated(self.offset))?;
        self.offset += 4;
        Ok(value)
    }

    fn read_cstr(&mut self) -> Result<&'a [u8], FdtError> {
        let rest = self
            .block
            .get(self.offset..)
            .ok_or(FdtError::Truncated(self.offset))?;
        let len = rest
            .iter()
            .position(|&byte| byte == 0)
            .ok_or(FdtError::Truncated(self.offset))?;
        self.offset += len + 1;
        Ok(&rest[..len])
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FdtError> {
        let bytes = self
            .offset
            .checked_add(len)
            .and_then(|end| self.block.get(self.offset..end))
            .ok_or(FdtError::Truncated(self.offset))?;
        self.offset += len;
        Ok(bytes)
    }
}

/// Accumulators for the node whose properties are currently being read.
#[derive(Default)]
struct NodeState {
    name: Vec<u8, NODE_NAME_CAPACITY>,
    is_memory: bool,
    compatible: Vec<u8, COMPATIBLE_CAPACITY>,
    uart: Option<&'static str>,
    gic: bool,
    reg: Vec<u8, REG_CAPACITY>,
    has_reg: bool,
}

struct Walker<'a> {
    strings: &'a [u8],
    cells: CellWidths,
    depth: u32,
    under_cpus: bool,
    node: NodeState,
    memory_seen: bool,
    uart_seen: bool,
    gic_seen: bool,
    out: RawDescriptor,
    truncated: Truncation,
}

impl<'a> Walker<'a> {
    fn new(strings: &'a [u8]) -> Self {
        Self {
            strings,
            cells: CellWidths::default(),
            depth: 0,
            under_cpus: false,
            node: NodeState::default(),
            memory_seen: false,
            uart_seen: false,
            gic_seen: false,
            out: RawDescriptor::default(),
            truncated: Truncation::empty(),
        }
    }

    fn walk(&mut self, cursor: &mut Cursor<'a>) -> Result<(), FdtError> {
        loop {
            cursor.align();
            let offset = cursor.offset;

            match cursor.read_u32()? {
                FDT_BEGIN_NODE => {
                    let name = cursor.read_cstr()?;
                    self.begin_node(name);
                }
                FDT_END_NODE => self.end_node(),
                FDT_PROP => {
                    let len = cursor.read_u32()? as usize;
                    let name_offset = cursor.read_u32()? as usize;
                    let value = cursor.take(len)?;
                    self.property(name_offset, value)?;
                }
                FDT_NOP => {}
                FDT_END => return Ok(()),
                token => return Err(FdtError::UnknownToken { token, offset }),
            }
        }
    }

    fn begin_node(&mut self, name: &[u8]) {
        // The parent cannot receive more properties once a child starts.
        self.settle();

        let base = name.split(|&byte| byte == b'@').next().unwrap_or(name);

        if self.depth == 1 {
            self.under_cpus = base == b"cpus";
        }

        if self.depth == 2 && self.under_cpus && name.starts_with(b"cpu@") {
            self.out.cpu_count = self.out.cpu_count.saturating_add(1);
        }

        let mut node = NodeState {
            is_memory: self.depth == 1 && base == b"memory",
            ..NodeState::default()
        };

        if bounded_copy(&mut node.name, name) {
            self.truncated |= Truncation::NODE_NAME;
            warn!(target: LOG_TARGET, "node name cut to {} bytes", NODE_NAME_CAPACITY);
        }

        self.node = node;
        self.depth = self.depth.saturating_add(1);
    }

    fn end_node(&mut self) {
        self.settle();
        self.depth = self.depth.saturating_sub(1);
        if self.depth <= 1 {
            self.under_cpus = false;
        }
    }

    fn property_name(&self, offset: usize) -> Result<&'a [u8], FdtError> {
        let rest = self.strings.get(offset..).ok_or(FdtError::Bounds)?;
        let len = rest
            .iter()
            .position(|&byte| byte == 0)
            .ok_or(FdtError::Bounds)?;
        Ok(&rest[..len])
    }

    fn property(&mut self, name_offset: usize, value: &[u8]) -> Result<(), FdtError> {
        match self.property_name(name_offset)? {
            b"compatible" => {
                let cut = bounded_copy(&mut self.node.compatible, value);
                let list = if cut {
                    self.truncated |= Truncation::COMPATIBLE;
                    warn!(
                        target: LOG_TARGET,
                        "compatible list of {} cut to {} bytes",
                        display_name(&self.node.name),
                        COMPATIBLE_CAPACITY
                    );
                    // Drop the partial last entry. A kept tail whose NUL is
                    // the first byte past the bound is still whole.
                    let complete = if value.get(COMPATIBLE_CAPACITY) == Some(&0) {
                        COMPATIBLE_CAPACITY
                    } else {
                        self.node
                            .compatible
                            .iter()
                            .rposition(|&byte| byte == 0)
                            .unwrap_or(0)
                    };
                    &self.node.compatible[..complete]
                } else {
                    &self.node.compatible[..]
                };

                self.node.uart = match_compatible(list, PeripheralKind::Uart);
                self.node.gic =
                    match_compatible(list, PeripheralKind::InterruptController).is_some();
            }
            b"#address-cells" if self.depth == 1 => {
                if let Some(cells) = be32_at(value, 0) {
                    self.cells.address = cells;
                }
            }
            b"#size-cells" if self.depth == 1 => {
                if let Some(cells) = be32_at(value, 0) {
                    self.cells.size = cells;
                }
            }
            b"reg" => {
                if bounded_copy(&mut self.node.reg, value) {
                    self.truncated |= Truncation::REG;
                    warn!(
                        target: LOG_TARGET,
                        "reg of {} cut to {} bytes",
                        display_name(&self.node.name),
                        REG_CAPACITY
                    );
                }
                self.node.has_reg = true;
            }
            _ => {}
        }

        Ok(())
    }

    /// Decodes the current node's `reg` against its classification. Runs at
    /// most once per node.
    fn settle(&mut self) {
        let node = core::mem::take(&mut self.node);
        if !node.has_reg {
            return;
        }

        let reg = node.reg.as_slice();
        let name = display_name(&node.name);

        if node.is_memory && !self.memory_seen {
            self.memory_seen = true;
            self.out.ram_base = self.cells.decode_address(reg);
            self.out.ram_size = self.cells.decode_size(reg);
            debug!(
                target: LOG_TARGET,
                "{}: ram base={:#x} size={:#x}", name, self.out.ram_base, self.out.ram_size
            );
        }

        if let Some(identifier) = node.uart {
            if !self.uart_seen {
                self.uart_seen = true;
                self.out.uart_base = self.cells.decode_address(reg);
                self.out.uart_compat.clear();
                let _ = self.out.uart_compat.push_str(identifier);
                debug!(
                    target: LOG_TARGET,
                    "{}: uart {} at {:#x}", name, identifier, self.out.uart_base
                );
            }
        }

        if node.gic && !self.gic_seen {
            self.gic_seen = true;
            self.out.gic_dist_base = self.cells.decode_address(reg);

            if let Some(stride) = self.cells.stride() {
                let second_pair = stride
                    .checked_mul(2)
                    .filter(|&needed| stride > 0 && reg.len() >= needed)
                    .and_then(|_| reg.get(stride..));
                if let Some(second) = second_pair {
                    self.out.gic_cpu_base = self.cells.decode_address(second);
                }
            }

            debug!(
                target: LOG_TARGET,
                "{}: gic dist={:#x} cpu={:#x}",
                name,
                self.out.gic_dist_base,
                self.out.gic_cpu_base
            );
        }
    }
}

fn report(scan: &FdtScan) {
    match scan.status {
        ScanStatus::Clean => debug!(
            target: LOG_TARGET,
            "scan complete: {} cpus, ram {:#x}+{:#x}",
            scan.descriptor.cpu_count,
            scan.descriptor.ram_base,
            scan.descriptor.ram_size
        ),
        ScanStatus::Rejected(err) => warn!(target: LOG_TARGET, "device tree rejected: {}", err),
        ScanStatus::Halted(err) => warn!(target: LOG_TARGET, "device tree walk halted: {}", err),
    }

    if !scan.truncated.is_empty() {
        warn!(target: LOG_TARGET, "bounded buffers truncated: {:?}", scan.truncated);
    }
}

fn scan_blob(blob: &[u8]) -> FdtScan {
    let header = match FdtHeader::parse(blob) {
        Ok(header) => header,
        Err(err) => return FdtScan::rejected(err),
    };

    let blocks = blob
        .get(..header.totalsize as usize)
        .ok_or(FdtError::Bounds)
        .and_then(|blob| Ok((header.structure_block(blob)?, header.strings_block(blob)?)));

    let (structure, strings) = match blocks {
        Ok(blocks) => blocks,
        Err(err) => return FdtScan::rejected(err),
    };

    let mut walker = Walker::new(strings);
    let mut cursor = Cursor::new(structure);
    let status = match walker.walk(&mut cursor) {
        Ok(()) => ScanStatus::Clean,
        Err(err) => ScanStatus::Halted(err),
    };

    FdtScan {
        descriptor: walker.out,
        status,
        truncated: walker.truncated,
    }
}

/// Scans an in-memory blob. Every read is bounded by `blob` and by the
/// header's `totalsize`.
pub fn scan(blob: &[u8]) -> FdtScan {
    let result = scan_blob(blob);
    report(&result);
    result
}

/// Scans the blob the boot stub left at `address`.
///
/// # Safety
///
/// `address` must be zero or point to readable memory that holds a complete
/// FDT header followed by `totalsize` bytes of blob.
pub unsafe fn scan_at(address: u64) -> FdtScan {
    if address == 0 {
        let result = FdtScan::rejected(FdtError::MissingSource);
        report(&result);
        return result;
    }

    let base = address as usize as *const u8;

    // SAFETY: the caller guarantees a readable header at `base`.
    let header_bytes = unsafe { core::slice::from_raw_parts(base, HEADER_LEN) };
    let len = match FdtHeader::parse(header_bytes) {
        Ok(header) => header.totalsize as usize,
        Err(err) => {
            let result = FdtScan::rejected(err);
            report(&result);
            return result;
        }
    };

    // SAFETY: the caller guarantees `totalsize` readable bytes at `base`.
    let blob = unsafe { core::slice::from_raw_parts(base, len) };
    scan(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn be32_reads_network_order() {
        let bytes = [0xD0, 0x0D, 0xFE, 0xED, 0x00];
        assert_eq!(be32_at(&bytes, 0), Some(FDT_MAGIC));
        assert_eq!(be32_at(&bytes, 2), None);
        assert_eq!(be32_at(&bytes, usize::MAX), None);
    }

    #[test]
    fn header_rejects_short_and_foreign_blobs() {
        assert_eq!(FdtHeader::parse(&[]), Err(FdtError::TooShort));
        assert_eq!(
            FdtHeader::parse(&[0xED, 0xFE, 0x0D, 0xD0]),
            Err(FdtError::BadMagic(0xEDFE_0DD0))
        );

        let mut truncated = [0u8; HEADER_LEN - 4];
        truncated[..4].copy_from_slice(&FDT_MAGIC.to_be_bytes());
        assert_eq!(FdtHeader::parse(&truncated), Err(FdtError::TooShort));
    }

    #[test]
    fn one_cell_pairs() {
        let reg = [0x08, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        let cells = CellWidths::default();
        assert_eq!(cells.decode_address(&reg), 0x0800_0000);
        assert_eq!(cells.decode_size(&reg), 0x0001_0000);
        assert_eq!(cells.stride(), Some(8));
    }

    #[test]
    fn two_cell_address() {
        let reg = [0, 0, 0, 0x1, 0xFE, 0x20, 0x10, 0x00, 0, 0, 0x02, 0];
        let cells = CellWidths { address: 2, size: 1 };
        assert_eq!(cells.decode_address(&reg), 0x1_FE20_1000);
        assert_eq!(cells.decode_size(&reg), 0x200);
    }

    #[test]
    fn unsupported_widths_and_short_payloads_decode_to_zero() {
        let reg = [0xFFu8; 16];
        assert_eq!(CellWidths { address: 3, size: 1 }.decode_address(&reg), 0);
        assert_eq!(CellWidths { address: 0, size: 1 }.decode_address(&reg), 0);
        assert_eq!(CellWidths { address: 2, size: 2 }.decode_size(&reg[..12]), 0);
        assert_eq!(CellWidths::default().decode_address(&reg[..3]), 0);
    }

    #[test]
    fn cursor_aligns_after_names() {
        let block = [b'a', b'b', 0, 0, 0, 0, 0, 2];
        let mut cursor = Cursor::new(&block);
        assert_eq!(cursor.read_cstr(), Ok(&b"ab"[..]));
        assert_eq!(cursor.offset, 3);
        cursor.align();
        assert_eq!(cursor.read_u32(), Ok(FDT_END_NODE));
        assert_eq!(cursor.read_u32(), Err(FdtError::Truncated(8)));
    }

    #[test]
    fn bounded_copy_reports_overflow() {
        let mut small: Vec<u8, 4> = Vec::new();
        assert!(!bounded_copy(&mut small, b"abcd"));
        assert!(bounded_copy(&mut small, b"abcdef"));
        assert_eq!(small.as_slice(), b"abcd");
    }

    #[test]
    fn null_address_is_missing_source() {
        let result = unsafe { scan_at(0) };
        assert_eq!(result.status, ScanStatus::Rejected(FdtError::MissingSource));
        assert!(!result.is_valid());
        assert!(result.descriptor.is_empty());
    }
}
