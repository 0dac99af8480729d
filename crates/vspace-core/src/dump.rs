//! Parses the physical-dump ELF and builds the physical-memory indices.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use object::Endianness;
use object::read::elf::{ElfFile, FileHeader, ProgramHeader};

use crate::error::{Error, Result};
use crate::interval::{Simple, WithOffset};
use crate::machine::{Architecture, MachineDescription, MachineDescriptionJson};

const NOTE_OWNER: &[u8] = b"FOSSIL";
const NOTE_TYPE: u32 = 0xDEADC0DE;

/// The physical-memory operations the radix-tree walker needs. Split out
/// from [`DumpReader`] so the walker can be driven by a synthetic dump in
/// tests without building a real ELF file.
pub trait DumpSource {
    fn read(&self, p: u64, size: u64) -> Vec<u8>;
    fn in_ram(&self, p: u64, size: u64) -> bool;
    fn in_mmio(&self, p: u64, size: u64) -> bool;
    fn p2o(&self, p: u64) -> Option<u64>;
}

/// An opened physical-memory dump: the mapped file bytes plus the RAM/MMIO
/// indices built from its LOAD segments.
pub struct DumpReader {
    mmap: Mmap,
    machine: MachineDescription,
    p2o: WithOffset,
    o2p: WithOffset,
    mmio: Simple,
}

impl DumpReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the dump file is not expected to be concurrently
        // truncated or modified by another process while this reader is
        // alive; that is an external invariant of the forensics workflow,
        // not something this crate can enforce.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_mmap(mmap)
    }

    fn from_mmap(mmap: Mmap) -> Result<Self> {
        let data: &[u8] = &mmap;
        let elf = ElfFile::<object::elf::FileHeader64<Endianness>>::parse(data)
            .map_err(|e| Error::DumpMalformed(format!("not a valid ELF64 file: {e}")))?;
        let endian = elf.endian();

        let architecture = Architecture::from_elf_machine(elf.raw_header().e_machine(endian))
            .ok_or_else(|| Error::DumpMalformed("unrecognized e_machine".into()))?;
        let endianness = endian;

        let mut machine_json: Option<MachineDescriptionJson> = None;
        let mut p2o_list: Vec<(u64, u64, u64)> = Vec::new();
        let mut o2p_list: Vec<(u64, u64, u64)> = Vec::new();
        let mut mmio_list: Vec<(u64, u64)> = Vec::new();

        for segment in elf.elf_program_headers() {
            if segment.p_type(endian) == object::elf::PT_NOTE {
                if let Some(json) = parse_note(segment, endian, data)? {
                    machine_json = Some(json);
                }
                continue;
            }

            let p_vaddr = segment.p_vaddr(endian);
            let p_memsz = segment.p_memsz(endian);
            let p_filesz = segment.p_filesz(endian);
            let r_start = p_vaddr;
            let r_end = r_start + p_memsz;

            if p_filesz > 0 {
                let p_offset = segment.p_offset(endian);
                p2o_list.push((r_start, r_end, p_offset));
                o2p_list.push((p_offset, p_offset + (r_end - r_start), r_start));
            } else {
                mmio_list.push((r_start, r_end));
            }
        }

        let machine_json = machine_json
            .ok_or_else(|| Error::DumpMalformed("missing FOSSIL/0xDEADC0DE NOTE segment".into()))?;
        let machine = MachineDescription::from_parts(endianness, architecture, machine_json);

        Ok(DumpReader {
            mmap,
            machine,
            p2o: WithOffset::new(p2o_list),
            o2p: WithOffset::new(o2p_list),
            mmio: Simple::new(mmio_list),
        })
    }

    pub fn machine(&self) -> &MachineDescription {
        &self.machine
    }

    pub fn in_ram(&self, p: u64, size: u64) -> bool {
        self.p2o.contains(p, size).0 == size
    }

    pub fn in_mmio(&self, p: u64, size: u64) -> bool {
        self.mmio.contains(p, size)
    }

    /// Physical address → file offset, or `None` if unresolvable.
    pub fn p2o(&self, p: u64) -> Option<u64> {
        self.p2o.lookup(p)
    }

    /// File offset → physical address, or `None` if unresolvable.
    pub fn o2p(&self, offset: u64) -> Option<u64> {
        self.o2p.lookup(offset)
    }

    /// Bytes at physical address `p`, concatenated across contiguous RAM
    /// intervals; empty if coverage is incomplete.
    pub fn read(&self, p: u64, size: u64) -> Vec<u8> {
        let (achieved, segments) = self.p2o.contains(p, size);
        if achieved != size {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(size as usize);
        for (_, len, offset) in segments {
            out.extend_from_slice(self.read_at_offset(offset, len));
        }
        out
    }

    pub fn read_at_offset(&self, offset: u64, size: u64) -> &[u8] {
        let start = offset as usize;
        let end = start + size as usize;
        &self.mmap[start..end]
    }

    pub fn ram_regions(&self) -> impl Iterator<Item = (u64, u64, u64)> + '_ {
        self.p2o.iter()
    }

    pub fn mmio_regions(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.mmio.iter()
    }
}

impl DumpSource for DumpReader {
    fn read(&self, p: u64, size: u64) -> Vec<u8> {
        DumpReader::read(self, p, size)
    }

    fn in_ram(&self, p: u64, size: u64) -> bool {
        DumpReader::in_ram(self, p, size)
    }

    fn in_mmio(&self, p: u64, size: u64) -> bool {
        DumpReader::in_mmio(self, p, size)
    }

    fn p2o(&self, p: u64) -> Option<u64> {
        DumpReader::p2o(self, p)
    }
}

fn parse_note<P>(
    segment: &P,
    endian: Endianness,
    data: &[u8],
) -> Result<Option<MachineDescriptionJson>>
where
    P: ProgramHeader<Elf = object::elf::FileHeader64<Endianness>>,
{
    let Some(mut notes) = segment
        .notes(endian, data)
        .map_err(|e| Error::DumpMalformed(format!("malformed NOTE segment: {e:?}")))?
    else {
        return Ok(None);
    };

    while let Some(note) = notes
        .next()
        .map_err(|e| Error::DumpMalformed(format!("malformed NOTE entry: {e:?}")))?
    {
        if note.name() != NOTE_OWNER || note.n_type(endian) != NOTE_TYPE {
            continue;
        }
        let desc = note.desc();
        let trimmed = trim_trailing_nul(desc);
        let json: MachineDescriptionJson = serde_json::from_slice(trimmed)
            .map_err(|e| Error::DumpMalformed(format!("invalid FOSSIL note JSON: {e}")))?;
        return Ok(Some(json));
    }
    Ok(None)
}

fn trim_trailing_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_nuls() {
        assert_eq!(trim_trailing_nul(b"{}\0\0\0"), b"{}");
        assert_eq!(trim_trailing_nul(b"{}"), b"{}");
        assert_eq!(trim_trailing_nul(b"\0\0\0"), b"");
    }
}
