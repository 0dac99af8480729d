//! Architecture-specific radix-tree decoding.
//!
//! Each adapter knows the shape of its page table (levels, entry size,
//! per-level shift) and how to turn a raw table entry into a
//! [`DecodedEntry`]. The walker in [`crate::walker`] is generic over
//! [`Decoder`] and drives the traversal; the adapters only decode.

mod amd64;
mod ia32;
mod sv32;
mod sv39;

pub use amd64::IntelAmd64;
pub use ia32::IntelIa32;
pub use sv32::RiscVSv32;
pub use sv39::RiscVSv39;

/// `(kernel_triple, user_triple)`, each a 3-bit R/W/X mask (R=bit2, W=bit1,
/// X=bit0). Exactly one of the two is nonzero for any given mapping: a page
/// is either kernel-only or user-accessible, never both at once.
pub type PermKey = (u8, u8);

/// The permission bits carried by one radix-tree entry, before composition
/// across levels. `r`/`x` are meaningless on IA-32 (always readable,
/// always executable) and are set to `true` there so composition can treat
/// all four architectures uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPerm {
    pub kernel: bool,
    pub r: bool,
    pub w: bool,
    pub x: bool,
}

impl RawPerm {
    /// The permission an un-traversed root table implicitly grants: fully
    /// accessible, to be narrowed by whatever levels are traversed below it.
    pub const ROOT: RawPerm = RawPerm { kernel: false, r: true, w: true, x: true };
}

/// The result of decoding one radix-tree entry.
#[derive(Debug, Clone, Copy)]
pub struct DecodedEntry {
    pub valid: bool,
    pub perm: RawPerm,
    /// Physical address of the next-level table, or of the mapped page.
    pub addr: u64,
    /// Nonzero (and equal to the level's page size) exactly when this entry
    /// is a leaf; zero for a pointer to a lower-level table.
    pub page_size: u64,
}

impl DecodedEntry {
    fn invalid() -> Self {
        DecodedEntry { valid: false, perm: RawPerm::ROOT, addr: 0, page_size: 0 }
    }

    /// True when this entry is a leaf independent of tree depth (a huge
    /// page at a non-bottom level). The walker also treats the bottom
    /// level as a leaf regardless of this flag.
    pub(crate) fn is_leaf(&self) -> bool {
        self.page_size != 0
    }
}

/// An architecture-specific page-table decoder.
pub trait Decoder {
    fn total_levels(&self) -> usize;
    fn table_size(&self, lvl: usize) -> u64;
    fn shift(&self, lvl: usize) -> u32;
    /// Size in bytes of one raw table entry: 4 for IA-32/Sv32, 8 otherwise.
    fn entry_size(&self) -> usize;
    /// OR'd onto canonicalized virtual addresses; zero except on AMD64.
    fn prefix(&self) -> u64;
    /// The permission mask that should seed the top-level walk, before any
    /// entry has been composed in.
    fn root_upmask(&self) -> RawPerm {
        RawPerm::ROOT
    }
    fn decode(&self, raw_entry: u64, lvl: usize) -> DecodedEntry;
    /// Composes the permission chain accumulated from the root down to (and
    /// including) a leaf entry into a single `(kernel, user)` triple pair.
    fn compose_perms(&self, chain: &[RawPerm]) -> PermKey;
    /// Applies architecture-specific virtual address post-processing (only
    /// AMD64 canonical sign-extension does anything here).
    fn finalize_va(&self, virt_addr: u64, perms: PermKey) -> u64;
}

/// Reads a little-endian raw table entry of the decoder's native width.
pub(crate) fn read_native(bytes: &[u8], entry_size: usize) -> u64 {
    match entry_size {
        4 => u32::from_le_bytes(bytes[..4].try_into().unwrap()) as u64,
        8 => u64::from_le_bytes(bytes[..8].try_into().unwrap()),
        _ => unreachable!("entry_size is always 4 or 8"),
    }
}

/// A tagged union of the four supported decoders, dispatching [`Decoder`]
/// through a single `match` rather than dynamic dispatch — the walker only
/// ever holds one concrete adapter per process, chosen once by
/// [`crate::factory::build_adapter`].
pub enum Adapter {
    IntelIa32(IntelIa32),
    IntelAmd64(IntelAmd64),
    RiscVSv32(RiscVSv32),
    RiscVSv39(RiscVSv39),
}

impl Decoder for Adapter {
    fn total_levels(&self) -> usize {
        match self {
            Adapter::IntelIa32(a) => a.total_levels(),
            Adapter::IntelAmd64(a) => a.total_levels(),
            Adapter::RiscVSv32(a) => a.total_levels(),
            Adapter::RiscVSv39(a) => a.total_levels(),
        }
    }

    fn table_size(&self, lvl: usize) -> u64 {
        match self {
            Adapter::IntelIa32(a) => a.table_size(lvl),
            Adapter::IntelAmd64(a) => a.table_size(lvl),
            Adapter::RiscVSv32(a) => a.table_size(lvl),
            Adapter::RiscVSv39(a) => a.table_size(lvl),
        }
    }

    fn shift(&self, lvl: usize) -> u32 {
        match self {
            Adapter::IntelIa32(a) => a.shift(lvl),
            Adapter::IntelAmd64(a) => a.shift(lvl),
            Adapter::RiscVSv32(a) => a.shift(lvl),
            Adapter::RiscVSv39(a) => a.shift(lvl),
        }
    }

    fn entry_size(&self) -> usize {
        match self {
            Adapter::IntelIa32(a) => a.entry_size(),
            Adapter::IntelAmd64(a) => a.entry_size(),
            Adapter::RiscVSv32(a) => a.entry_size(),
            Adapter::RiscVSv39(a) => a.entry_size(),
        }
    }

    fn prefix(&self) -> u64 {
        match self {
            Adapter::IntelIa32(a) => a.prefix(),
            Adapter::IntelAmd64(a) => a.prefix(),
            Adapter::RiscVSv32(a) => a.prefix(),
            Adapter::RiscVSv39(a) => a.prefix(),
        }
    }

    fn decode(&self, raw_entry: u64, lvl: usize) -> DecodedEntry {
        match self {
            Adapter::IntelIa32(a) => a.decode(raw_entry, lvl),
            Adapter::IntelAmd64(a) => a.decode(raw_entry, lvl),
            Adapter::RiscVSv32(a) => a.decode(raw_entry, lvl),
            Adapter::RiscVSv39(a) => a.decode(raw_entry, lvl),
        }
    }

    fn compose_perms(&self, chain: &[RawPerm]) -> PermKey {
        match self {
            Adapter::IntelIa32(a) => a.compose_perms(chain),
            Adapter::IntelAmd64(a) => a.compose_perms(chain),
            Adapter::RiscVSv32(a) => a.compose_perms(chain),
            Adapter::RiscVSv39(a) => a.compose_perms(chain),
        }
    }

    fn finalize_va(&self, virt_addr: u64, perms: PermKey) -> u64 {
        match self {
            Adapter::IntelIa32(a) => a.finalize_va(virt_addr, perms),
            Adapter::IntelAmd64(a) => a.finalize_va(virt_addr, perms),
            Adapter::RiscVSv32(a) => a.finalize_va(virt_addr, perms),
            Adapter::RiscVSv39(a) => a.finalize_va(virt_addr, perms),
        }
    }
}

/// Composes an Intel-style permission chain: hierarchical AND across every
/// level traversed. `wp` only gates the *kernel*-page write bit (it governs
/// whether supervisor mode honors read-only pages, a user page's write bit
/// is never affected by it); `nxe` gates execute for both.
fn compose_intel_perms(chain: &[RawPerm], wp: bool, nxe: bool) -> PermKey {
    let kernel = chain.iter().any(|p| p.kernel);
    let x = if nxe { chain.iter().all(|p| p.x) } else { true };
    let triple = |w: bool| (1u8 << 2) | ((w as u8) << 1) | (x as u8);
    if kernel {
        let w = if wp { chain.iter().all(|p| p.w) } else { true };
        (triple(w), 0)
    } else {
        let w = chain.iter().all(|p| p.w);
        (0, triple(w))
    }
}

/// Composes a RISC-V leaf-only permission: no hierarchy, only the leaf
/// entry's own flags matter, with `mxr` folding executable pages into the
/// readable set.
fn compose_riscv_perms(chain: &[RawPerm], mxr: bool) -> PermKey {
    let leaf = *chain.last().expect("chain always has at least the leaf entry");
    let r = leaf.r || (mxr && leaf.x);
    let triple = ((r as u8) << 2) | ((leaf.w as u8) << 1) | (leaf.x as u8);
    if leaf.kernel { (triple, 0) } else { (0, triple) }
}
