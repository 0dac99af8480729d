use thiserror::Error;

/// Error taxonomy for the dump reader, walker, and ELF writer.
///
/// `PageTableOutOfBounds` and `UnresolvableOffset` are rarely returned as a
/// hard `Err` — most call sites log them at `debug!`/`warn!` and keep going,
/// per the recovery policy: a dropped subtree or an unresolvable page is not
/// fatal to the surrounding process walk.
#[derive(Debug, Error)]
pub enum Error {
    #[error("dump is malformed: {0}")]
    DumpMalformed(String),

    #[error("unknown or unsupported architecture/MMU mode: {0}")]
    UnknownArchitecture(String),

    #[error("page table at physical address {addr:#x} (level {level}) is not RAM-resident")]
    PageTableOutOfBounds { addr: u64, level: usize },

    #[error("walk produced no user-accessible mappings")]
    EmptyMapping,

    #[error("physical address {addr:#x} has no corresponding file offset")]
    UnresolvableOffset { addr: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
