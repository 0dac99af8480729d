use super::{compose_intel_perms, DecodedEntry, Decoder, PermKey, RawPerm};

/// IA-32 (non-PAE) two-level paging: a page directory of 4MB (`PS`-bit set)
/// or 4KB pages.
pub struct IntelIa32 {
    pub maxphyaddr: u32,
    pub wp: bool,
    pub nxe: bool,
}

const SHIFTS: [u32; 2] = [22, 12];

impl Decoder for IntelIa32 {
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

        let perm = RawPerm {
            kernel: raw_entry & 0x4 == 0,
            r: true,
            w: raw_entry & 0x2 != 0,
            x: true,
        };

        let is_huge_page = lvl == 0 && raw_entry & 0x80 != 0;
        if lvl == 1 || is_huge_page {
            let addr = if lvl == 0 {
                let high_bits = ((raw_entry >> 13) & ((1u64 << (self.maxphyaddr - 32)) - 1)) << 32;
                let low_bits = ((raw_entry >> 22) & 0x3FF) << 22;
                high_bits | low_bits
            } else {
                ((raw_entry >> 12) & 0xFFFFF) << 12
            };
            DecodedEntry { valid: true, perm, addr, page_size: 1u64 << SHIFTS[lvl] }
        } else {
            let addr = ((raw_entry >> 12) & 0xFFFFF) << 12;
            DecodedEntry { valid: true, perm, addr, page_size: 0 }
        }
    }

    fn compose_perms(&self, chain: &[RawPerm]) -> PermKey {
        compose_intel_perms(chain, self.wp, self.nxe)
    }

    fn finalize_va(&self, virt_addr: u64, _perms: PermKey) -> u64 {
        virt_addr
    }
}
