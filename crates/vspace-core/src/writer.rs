//! Exports one process's virtual address space as a standalone ELF64 file:
//! one `PT_LOAD` segment per permission key, `p_vaddr` holding the
//! reconstructed virtual address and `p_paddr` the original physical
//! address it was backed by.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use crate::arch::PermKey;
use crate::dump::DumpReader;
use crate::error::Result;
use crate::machine::MachineDescription;
use crate::walker::MappingEntry;

const ELF_HEADER_SIZE: usize = 0x40;
const PROGRAM_HEADER_ENTRY_SIZE: usize = 0x38;
const SECTION_HEADER_ENTRY_SIZE: usize = 0x40;
const PT_LOAD: u32 = 1;
const ET_CORE: u16 = 4;
const MINIMUM_PAGE: u64 = 0x1000;

/// One `PT_LOAD`-to-be: virtual range, the dump's file offset it was read
/// from, and (once written) the destination offset in the output file.
struct PendingSegment {
    begin: u64,
    end: u64,
    src_offset: u64,
    dst_offset: u64,
}

pub fn export_virtual_memory_elf(
    dump: &DumpReader,
    machine: &MachineDescription,
    mapping: &HashMap<PermKey, Vec<MappingEntry>>,
    path: impl AsRef<Path>,
) -> Result<()> {
    let little_endian = matches!(machine.endianness, crate::machine::Endianness::Little);

    let mut buf = Vec::new();
    buf.extend(build_elf_header(machine, little_endian));

    // Per permission key, fuse virtually-and-offset-contiguous runs and sort
    // longest-first so the largest segments claim the dedup cache first.
    let mut by_perm: Vec<(u32, Vec<(u64, u64, u64)>)> = Vec::new();
    for (&(_, user), entries) in mapping {
        if user == 0 {
            continue;
        }
        let mut raw: Vec<(u64, u64, u64)> = entries
            .iter()
            .filter(|e| !e.in_mmio)
            .filter_map(|e| {
                dump.p2o(e.phy_addr).map(|offset| (e.virt_addr, e.virt_addr + e.page_size, offset))
            })
            .collect();
        raw.sort_by_key(|i| i.0);
        let fused = fuse_contiguous(&raw);
        if fused.is_empty() {
            continue;
        }
        let mut fused = fused;
        fused.sort_by_key(|(b, e, _)| std::cmp::Reverse(e - b));
        by_perm.push((user as u32, fused));
    }

    // Write segment payloads, deduping identical source pages across every
    // permission key (the same physical page can be mapped more than once).
    let mut offset2p_offset: HashMap<u64, u64> = HashMap::new();
    let mut segments: Vec<(u32, PendingSegment)> = Vec::new();
    for (pmask, intervals) in &by_perm {
        for &(begin, end, src_offset) in intervals {
            let size = end - begin;
            let dst_offset = if let Some(&cached) = offset2p_offset.get(&src_offset) {
                cached
            } else {
                let new_offset = buf.len() as u64;
                buf.extend_from_slice(dump.read_at_offset(src_offset, size));
                let mut page = 0;
                while page < size {
                    offset2p_offset.insert(src_offset + page, new_offset + page);
                    page += MINIMUM_PAGE;
                }
                new_offset
            };
            segments.push((*pmask, PendingSegment { begin, end, src_offset, dst_offset }));
        }
    }

    let e_phoff = buf.len() as u64;
    let e_phnum = segments.len();
    for (pmask, segment) in &segments {
        let p_filesz = segment.end - segment.begin;
        let p_paddr = dump
            .o2p(segment.src_offset)
            .expect("p2o and o2p are built from the same LOAD segments and must agree");
        buf.extend(build_program_header(
            *pmask,
            segment.begin,
            p_paddr,
            segment.dst_offset,
            p_filesz,
            little_endian,
        ));
    }

    let s_header_pos = buf.len() as u64;
    if e_phnum < 0x10000 {
        patch_u16(&mut buf, 0x38, e_phnum as u16, little_endian);
    } else {
        patch_u64(&mut buf, 0x28, s_header_pos, little_endian);
        patch_u16(&mut buf, 0x38, 0xFFFF, little_endian);
        patch_u16(&mut buf, 0x3A, SECTION_HEADER_ENTRY_SIZE as u16, little_endian);
        patch_u16(&mut buf, 0x3C, 1, little_endian);

        let mut section = vec![0u8; SECTION_HEADER_ENTRY_SIZE];
        write_u32(&mut section, 0x2C, e_phnum as u32, little_endian);
        buf.extend(section);
    }
    patch_u64(&mut buf, 0x20, e_phoff, little_endian);

    let mut file = File::create(path)?;
    file.write_all(&buf)?;
    Ok(())
}

/// Fuses `(begin, end, offset)` triples (pre-sorted by `begin`) wherever
/// both the virtual range and the backing offset are contiguous.
fn fuse_contiguous(intervals: &[(u64, u64, u64)]) -> Vec<(u64, u64, u64)> {
    let mut fused: Vec<(u64, u64, u64)> = Vec::new();
    for &(begin, end, offset) in intervals {
        match fused.last_mut() {
            Some((prev_begin, prev_end, prev_offset))
                if *prev_end == begin && *prev_offset + (*prev_end - *prev_begin) == offset =>
            {
                *prev_end = end;
            }
            _ => fused.push((begin, end, offset)),
        }
    }
    fused
}

fn build_elf_header(machine: &MachineDescription, little_endian: bool) -> Vec<u8> {
    let mut header = vec![0u8; ELF_HEADER_SIZE];
    header[0x00..0x04].copy_from_slice(b"\x7fELF");
    header[0x04] = 2; // ELFCLASS64
    header[0x05] = if little_endian { 1 } else { 2 };
    header[0x06] = 1; // EI_VERSION

    write_u16(&mut header, 0x10, ET_CORE, little_endian);
    write_u16(&mut header, 0x12, machine.architecture.export_e_machine(), little_endian);
    write_u32(&mut header, 0x14, 1, little_endian); // e_version
    write_u16(&mut header, 0x34, ELF_HEADER_SIZE as u16, little_endian);
    write_u16(&mut header, 0x36, PROGRAM_HEADER_ENTRY_SIZE as u16, little_endian);
    header
}

#[allow(clippy::too_many_arguments)]
fn build_program_header(
    p_flags: u32,
    p_vaddr: u64,
    p_paddr: u64,
    p_offset: u64,
    p_filesz: u64,
    little_endian: bool,
) -> Vec<u8> {
    let mut entry = vec![0u8; PROGRAM_HEADER_ENTRY_SIZE];
    write_u32(&mut entry, 0x00, PT_LOAD, little_endian);
    write_u32(&mut entry, 0x04, p_flags, little_endian);
    write_u64(&mut entry, 0x08, p_offset, little_endian);
    write_u64(&mut entry, 0x10, p_vaddr, little_endian);
    write_u64(&mut entry, 0x18, p_paddr, little_endian);
    write_u64(&mut entry, 0x20, p_filesz, little_endian);
    write_u64(&mut entry, 0x28, p_filesz, little_endian); // p_memsz
    entry
}

fn write_u16(buf: &mut [u8], at: usize, v: u16, little_endian: bool) {
    let bytes = if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
    buf[at..at + 2].copy_from_slice(&bytes);
}

fn write_u32(buf: &mut [u8], at: usize, v: u32, little_endian: bool) {
    let bytes = if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
    buf[at..at + 4].copy_from_slice(&bytes);
}

fn write_u64(buf: &mut [u8], at: usize, v: u64, little_endian: bool) {
    let bytes = if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
    buf[at..at + 8].copy_from_slice(&bytes);
}

fn patch_u16(buf: &mut [u8], at: usize, v: u16, little_endian: bool) {
    write_u16(buf, at, v, little_endian);
}

fn patch_u64(buf: &mut [u8], at: usize, v: u64, little_endian: bool) {
    write_u64(buf, at, v, little_endian);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuse_contiguous_merges_matching_virt_and_offset_runs() {
        let intervals = vec![(0, 0x1000, 0x5000), (0x1000, 0x2000, 0x6000)];
        assert_eq!(fuse_contiguous(&intervals), vec![(0, 0x2000, 0x5000)]);
    }

    #[test]
    fn fuse_contiguous_keeps_offset_jump_separate() {
        let intervals = vec![(0, 0x1000, 0x5000), (0x1000, 0x2000, 0x9000)];
        assert_eq!(fuse_contiguous(&intervals), vec![(0, 0x1000, 0x5000), (0x1000, 0x2000, 0x9000)]);
    }

    #[test]
    fn elf_header_carries_core_type_and_machine() {
        let machine = MachineDescription {
            endianness: crate::machine::Endianness::Little,
            architecture: crate::machine::Architecture::X86_64,
            mmu_mode: "ia64".to_string(),
            maxphyaddr: Some(48),
            mmio_devices: Vec::new(),
        };
        let header = build_elf_header(&machine, true);
        assert_eq!(&header[0..4], b"\x7fELF");
        assert_eq!(header[0x04], 2);
        assert_eq!(u16::from_le_bytes([header[0x10], header[0x11]]), ET_CORE);
        assert_eq!(u16::from_le_bytes([header[0x12], header[0x13]]), 0x3E);
    }
}
