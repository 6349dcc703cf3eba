// Device tree diagnostics.
//
// None of these values ever abort boot. The parser records the first one it
// hits inside `ScanStatus` and hands back whatever it resolved up to that
// point.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FdtError {
    /// The boot stub passed a null blob address.
    #[error("no device tree supplied")]
    MissingSource,
    /// Fewer bytes than a complete FDT header.
    #[error("blob shorter than the FDT header")]
    TooShort,
    #[error("bad FDT magic 0x{0:08x}")]
    BadMagic(u32),
    /// A header offset or size points outside the blob.
    #[error("FDT block lies outside the blob")]
    Bounds,
    #[error("unknown FDT token 0x{token:08x} at structure offset {offset}")]
    UnknownToken { token: u32, offset: usize },
    /// The token stream ran past the end of the structure block.
    #[error("FDT structure block truncated at offset {0}")]
    Truncated(usize),
}
