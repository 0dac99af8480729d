//! Depth-first radix-tree traversal and the post-walk construction of a
//! process's virtual-to-offset, offset-to-virtual, and permission maps.

use std::collections::HashMap;

use log::debug;

use crate::arch::{Decoder, PermKey, RawPerm};
use crate::dump::DumpSource;
use crate::error::{Error, Result};
use crate::interval::{Overlapping, WithData, WithOffset};

/// One leaf mapping discovered by the walk: a contiguous run of `page_size`
/// bytes starting at `virt_addr`, backed by physical memory at `phy_addr`.
#[derive(Debug, Clone, Copy)]
pub struct MappingEntry {
    pub virt_addr: u64,
    pub page_size: u64,
    pub phy_addr: u64,
    pub in_mmio: bool,
}

/// The fully reconstructed per-process address space, plus the diagnostic
/// counts a caller logs as an operational summary of the walk.
pub struct WalkResult {
    pub v2o: WithOffset,
    pub o2v: Overlapping,
    pub perms: WithData<PermKey>,
    /// User-accessible, non-MMIO leaf pages successfully resolved to a file offset.
    pub mapped_pages: usize,
    /// User-accessible, non-MMIO leaf pages whose physical address had no
    /// corresponding file offset in the dump, and were dropped.
    pub dropped_unresolvable: usize,
    /// Leaf pages excluded because they carried no user-accessible permission.
    pub kernel_excluded: usize,
}

/// Walks the radix tree rooted at `table_addr`, returning every leaf mapping
/// grouped by its composed permission key, plus a reverse index (keyed the
/// same way) from `(phy_addr, page_size)` to the virtual addresses that map
/// it — used to build the offset-to-virtual aliasing map.
pub fn walk(
    dump: &impl DumpSource,
    adapter: &impl Decoder,
    table_addr: u64,
) -> (HashMap<PermKey, Vec<MappingEntry>>, HashMap<PermKey, HashMap<(u64, u64), Vec<u64>>>) {
    let mut mapping: HashMap<PermKey, Vec<MappingEntry>> = HashMap::new();
    let mut reverse_mapping: HashMap<PermKey, HashMap<(u64, u64), Vec<u64>>> = HashMap::new();
    explore(
        dump,
        adapter,
        table_addr,
        &mut mapping,
        &mut reverse_mapping,
        0,
        0,
        &[adapter.root_upmask()],
    );
    (mapping, reverse_mapping)
}

#[allow(clippy::too_many_arguments)]
fn explore(
    dump: &impl DumpSource,
    adapter: &impl Decoder,
    table_addr: u64,
    mapping: &mut HashMap<PermKey, Vec<MappingEntry>>,
    reverse_mapping: &mut HashMap<PermKey, HashMap<(u64, u64), Vec<u64>>>,
    lvl: usize,
    virt_prefix: u64,
    upmask: &[RawPerm],
) {
    let table_size = adapter.table_size(lvl);
    let table = dump.read(table_addr, table_size);
    if table.is_empty() {
        debug!(
            "page table at {:#x} (level {lvl}, size {table_size:#x}) is not RAM-resident",
            table_addr
        );
        return;
    }

    let entry_size = adapter.entry_size();
    let shift = adapter.shift(lvl);

    for (index, chunk) in table.chunks_exact(entry_size).enumerate() {
        let raw_entry = crate::arch::read_native(chunk, entry_size);
        let decoded = adapter.decode(raw_entry, lvl);
        if !decoded.valid {
            continue;
        }

        let virt_addr = virt_prefix | ((index as u64) << shift);
        let mut chain = Vec::with_capacity(upmask.len() + 1);
        chain.extend_from_slice(upmask);
        chain.push(decoded.perm);

        if lvl == adapter.total_levels() - 1 || decoded.is_leaf() {
            let in_ram = dump.in_ram(decoded.addr, decoded.page_size);
            let in_mmio = dump.in_mmio(decoded.addr, decoded.page_size);
            if !in_ram && !in_mmio {
                continue;
            }

            let perms = adapter.compose_perms(&chain);
            let virt_addr = adapter.finalize_va(virt_addr, perms);
            mapping.entry(perms).or_default().push(MappingEntry {
                virt_addr,
                page_size: decoded.page_size,
                phy_addr: decoded.addr,
                in_mmio,
            });

            if in_ram && !in_mmio {
                reverse_mapping
                    .entry(perms)
                    .or_default()
                    .entry((decoded.addr, decoded.page_size))
                    .or_default()
                    .push(virt_addr);
            }
        } else {
            explore(
                dump,
                adapter,
                decoded.addr,
                mapping,
                reverse_mapping,
                lvl + 1,
                virt_addr,
                &chain,
            );
        }
    }
}

/// Builds the per-process interval maps from a completed walk, restricted to
/// user-accessible, non-MMIO mappings. Returns [`Error::EmptyMapping`] if
/// that restriction leaves nothing behind.
pub fn build_process_maps(
    dump: &impl DumpSource,
    mapping: &HashMap<PermKey, Vec<MappingEntry>>,
    reverse_mapping: &HashMap<PermKey, HashMap<(u64, u64), Vec<u64>>>,
) -> Result<WalkResult> {
    let mut v2o_intervals: Vec<(u64, u64, u64)> = Vec::new();
    let mut perm_intervals: Vec<(u64, u64, PermKey)> = Vec::new();
    let mut mapped_pages = 0usize;
    let mut dropped_unresolvable = 0usize;
    let mut kernel_excluded = 0usize;

    for (&perms, entries) in mapping {
        let (_, user) = perms;
        if user == 0 {
            kernel_excluded += entries.len();
            continue;
        }
        for entry in entries {
            if entry.in_mmio {
                continue;
            }
            let begin = entry.virt_addr;
            let end = begin + entry.page_size;
            perm_intervals.push((begin, end, perms));
            match dump.p2o(entry.phy_addr) {
                Some(offset) => {
                    v2o_intervals.push((begin, end, offset));
                    mapped_pages += 1;
                }
                None => {
                    dropped_unresolvable += 1;
                    debug!(
                        "physical address {:#x} has no file offset; dropping virtual mapping {:#x}",
                        entry.phy_addr, begin
                    );
                }
            }
        }
    }

    if perm_intervals.is_empty() {
        return Err(Error::EmptyMapping);
    }

    let mut o2v_intervals: Vec<(u64, u64, Vec<u64>)> = Vec::new();
    for (&perms, by_phys) in reverse_mapping {
        let (_, user) = perms;
        if user == 0 {
            continue;
        }
        for (&(phy_addr, page_size), virts) in by_phys {
            let Some(offset) = dump.p2o(phy_addr) else {
                debug!("physical address {phy_addr:#x} has no file offset; dropping from o2v");
                continue;
            };
            o2v_intervals.push((offset, offset + page_size, virts.clone()));
        }
    }

    Ok(WalkResult {
        v2o: WithOffset::new(v2o_intervals),
        o2v: Overlapping::new(o2v_intervals),
        perms: WithData::new(perm_intervals),
        mapped_pages,
        dropped_unresolvable,
        kernel_excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::IntelIa32;

    /// A physical address space backed by a plain byte buffer, with every
    /// page treated as RAM and none as MMIO — enough to drive `explore()`
    /// without a real ELF dump.
    struct FakePhysical {
        bytes: Vec<u8>,
    }

    impl DumpSource for FakePhysical {
        fn read(&self, p: u64, size: u64) -> Vec<u8> {
            let start = p as usize;
            let end = start + size as usize;
            self.bytes.get(start..end).map(|s| s.to_vec()).unwrap_or_default()
        }

        fn in_ram(&self, p: u64, size: u64) -> bool {
            (p as usize + size as usize) <= self.bytes.len()
        }

        fn in_mmio(&self, _p: u64, _size: u64) -> bool {
            false
        }

        fn p2o(&self, p: u64) -> Option<u64> {
            (p as usize + 1 <= self.bytes.len()).then_some(p)
        }
    }

    fn write_entry(bytes: &mut [u8], index: usize, entry: u32) {
        let at = index * 4;
        bytes[at..at + 4].copy_from_slice(&entry.to_le_bytes());
    }

    #[test]
    fn empty_walk_yields_empty_mapping_error() {
        let mapping = HashMap::new();
        let reverse_mapping = HashMap::new();
        let dump = FakePhysical { bytes: Vec::new() };
        let err = build_process_maps(&dump, &mapping, &reverse_mapping).unwrap_err();
        assert!(matches!(err, Error::EmptyMapping));
    }

    #[test]
    fn ia32_two_level_walk_finds_one_user_page() {
        // A page directory at 0x0 pointing to a page table at 0x1000, whose
        // first entry maps a 4KB user-writable page at 0x2000.
        let mut phys = vec![0u8; 0x3000];
        write_entry(&mut phys, 0, 0x1000 | 0x7); // present, RW, US -> PDE -> 0x1000
        write_entry(&mut phys[0x1000..], 0, 0x2000 | 0x7); // present, RW, US -> leaf @0x2000
        let dump = FakePhysical { bytes: phys };
        let adapter = IntelIa32 { maxphyaddr: 36, wp: true, nxe: false };

        let (mapping, reverse_mapping) = walk(&dump, &adapter, 0);
        let result = build_process_maps(&dump, &mapping, &reverse_mapping).unwrap();

        assert_eq!(result.v2o.lookup(0), Some(0x2000));
        assert_eq!(result.perms.lookup(0), Some((0, 0b111)));
        assert_eq!(result.o2v.lookup(0x2000), vec![0]);
    }
}
