use super::{compose_riscv_perms, DecodedEntry, Decoder, PermKey, RawPerm};

/// RISC-V Sv39: three-level paging, 8-byte PTEs.
pub struct RiscVSv39 {
    pub mxr: bool,
}

const SHIFTS: [u32; 3] = [30, 21, 12];

impl Decoder for RiscVSv39 {
    fn total_levels(&self) -> usize {
        3
    }

    fn table_size(&self, _lvl: usize) -> u64 {
        0x1000
    }

    fn shift(&self, lvl: usize) -> u32 {
        SHIFTS[lvl]
    }

    fn entry_size(&self) -> usize {
        8
    }

    fn prefix(&self) -> u64 {
        0
    }

    fn decode(&self, raw_entry: u64, lvl: usize) -> DecodedEntry {
        if raw_entry & 0x1 == 0 {
            return DecodedEntry::invalid();
        }

        let r = raw_entry & 0x2 != 0;
        let w = raw_entry & 0x4 != 0;
        let x = raw_entry & 0x8 != 0;
        let perm = RawPerm { kernel: raw_entry & 0x10 == 0, r, w, x };

        let addr = ((raw_entry >> 10) & ((1u64 << 44) - 1)) << 12;
        if r || w || x || lvl == 2 {
            DecodedEntry { valid: true, perm, addr, page_size: 1u64 << SHIFTS[lvl] }
        } else {
            DecodedEntry { valid: true, perm, addr, page_size: 0 }
        }
    }

    fn compose_perms(&self, chain: &[RawPerm]) -> PermKey {
        compose_riscv_perms(chain, self.mxr)
    }

    fn finalize_va(&self, virt_addr: u64, _perms: PermKey) -> u64 {
        virt_addr
    }
}
