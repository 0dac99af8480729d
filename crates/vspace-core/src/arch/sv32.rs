use super::{compose_riscv_perms, DecodedEntry, Decoder, PermKey, RawPerm};

/// RISC-V Sv32: two-level paging, 4-byte PTEs, no hierarchy in permissions
/// (only the leaf entry's own R/W/X/U bits matter).
pub struct RiscVSv32 {
    pub mxr: bool,
}

const SHIFTS: [u32; 2] = [22, 12];

impl Decoder for RiscVSv32 {
    fn total_levels(&self) -> usize {
        2
    }

    fn table_size(&self, _lvl: usize) -> u64 {
        0x1000
    }

    fn shift(&self, lvl: usize) -> u32 {
        SHIFTS[lvl]
    }

    fn entry_size(&self) -> usize {
        4
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

        let addr = ((raw_entry >> 10) & ((1u64 << 22) - 1)) << 12;
        if r || w || x || lvl == 1 {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entry_is_invalid() {
        let d = RiscVSv32 { mxr: false };
        assert!(!d.decode(0, 0).valid);
    }

    #[test]
    fn non_leaf_entry_at_level_zero_points_to_next_table() {
        let d = RiscVSv32 { mxr: false };
        let decoded = d.decode(0x1, 0); // V=1 only, no R/W/X
        assert_eq!(decoded.page_size, 0);
    }

    #[test]
    fn any_rwx_bit_forces_a_leaf_even_at_level_zero() {
        let d = RiscVSv32 { mxr: false };
        let decoded = d.decode(0x3, 0); // V=1, R=1
        assert_eq!(decoded.page_size, 1 << 22);
    }

    #[test]
    fn level_one_is_always_a_leaf() {
        let d = RiscVSv32 { mxr: false };
        let decoded = d.decode(0x1, 1);
        assert_eq!(decoded.page_size, 1 << 12);
    }

    #[test]
    fn user_bit_clear_marks_kernel_page() {
        let d = RiscVSv32 { mxr: false };
        let decoded = d.decode(0x3, 1); // U bit (0x10) clear
        assert!(decoded.perm.kernel);
    }
}
