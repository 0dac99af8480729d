//! Builds the right [`Adapter`] for a dump's architecture and MMU mode, and
//! derives the translation-base physical address from the per-process
//! register snapshot.

use std::collections::HashMap;

use crate::arch::{Adapter, IntelAmd64, IntelIa32, RiscVSv32, RiscVSv39};
use crate::error::{Error, Result};
use crate::machine::{Architecture, MachineDescription};

/// Builds the architecture-appropriate [`Adapter`] plus the physical
/// address of the top-level radix-tree table (the "DTB": `cr3` masked down
/// to its table-base bits on Intel, `satp` verbatim on RISC-V).
pub fn build_adapter(
    machine: &MachineDescription,
    registers: &HashMap<String, u64>,
) -> Result<(Adapter, u64)> {
    match machine.architecture {
        Architecture::X86 | Architecture::X86_64 => intel_factory(machine, registers),
        Architecture::RiscV => riscv_factory(machine, registers),
        other => Err(Error::UnknownArchitecture(format!(
            "{} has no supported MMU walker",
            other.tag()
        ))),
    }
}

fn intel_factory(
    machine: &MachineDescription,
    registers: &HashMap<String, u64>,
) -> Result<(Adapter, u64)> {
    let cr3 = *registers
        .get("cr3")
        .ok_or_else(|| Error::UnknownArchitecture("missing cr3 register".into()))?;
    let maxphyaddr = machine
        .maxphyaddr
        .ok_or_else(|| Error::UnknownArchitecture("MAXPHYADDR not present in machine description".into()))?;

    match machine.mmu_mode.as_str() {
        "ia64" => {
            let dtb = (cr3 >> 12 & ((1u64 << (maxphyaddr - 12)) - 1)) << 12;
            let adapter = IntelAmd64 { maxphyaddr, wp: true, nxe: true };
            Ok((Adapter::IntelAmd64(adapter), dtb))
        }
        "ia32" => {
            let dtb = (cr3 >> 12 & ((1u64 << 20) - 1)) << 12;
            let maxphyaddr = maxphyaddr.min(40);
            let adapter = IntelIa32 { maxphyaddr, wp: true, nxe: false };
            Ok((Adapter::IntelIa32(adapter), dtb))
        }
        "pae" => Err(Error::UnknownArchitecture("PAE paging is not supported".into())),
        other => Err(Error::UnknownArchitecture(format!("unrecognized Intel MMU mode {other:?}"))),
    }
}

fn riscv_factory(
    machine: &MachineDescription,
    registers: &HashMap<String, u64>,
) -> Result<(Adapter, u64)> {
    let satp = *registers
        .get("satp")
        .ok_or_else(|| Error::UnknownArchitecture("missing satp register".into()))?;

    // Sum (user-mode access to supervisor pages) is not modeled by the
    // walker: permissions are reconstructed, not enforced, so it has no
    // observable effect here. mxr folds executable pages into the readable
    // set; it is derived false, matching the settings every RISC-V
    // translator is actually constructed with.
    let mxr = false;

    match machine.mmu_mode.as_str() {
        "sv39" => Ok((Adapter::RiscVSv39(RiscVSv39 { mxr }), satp)),
        "sv32" => Ok((Adapter::RiscVSv32(RiscVSv32 { mxr }), satp)),
        other => {
            Err(Error::UnknownArchitecture(format!("unrecognized RISC-V MMU mode {other:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Endianness;

    fn machine(mmu_mode: &str, maxphyaddr: Option<u32>, arch: Architecture) -> MachineDescription {
        MachineDescription {
            endianness: Endianness::Little,
            architecture: arch,
            mmu_mode: mmu_mode.to_string(),
            maxphyaddr,
            mmio_devices: Vec::new(),
        }
    }

    #[test]
    fn amd64_dtb_masks_cr3_to_table_base_bits() {
        let m = machine("ia64", Some(48), Architecture::X86_64);
        let regs = HashMap::from([("cr3".to_string(), 0x1234_5678u64)]);
        let (adapter, dtb) = build_adapter(&m, &regs).unwrap();
        assert!(matches!(adapter, Adapter::IntelAmd64(_)));
        assert_eq!(dtb, 0x1234_5678 & !0xFFF);
    }

    #[test]
    fn ia32_clamps_maxphyaddr_to_40_bits() {
        let m = machine("ia32", Some(52), Architecture::X86);
        let regs = HashMap::from([("cr3".to_string(), 0x1000u64)]);
        let (adapter, _) = build_adapter(&m, &regs).unwrap();
        match adapter {
            Adapter::IntelIa32(a) => assert_eq!(a.maxphyaddr, 40),
            _ => panic!("expected IntelIa32"),
        }
    }

    #[test]
    fn pae_is_explicitly_unsupported() {
        let m = machine("pae", Some(36), Architecture::X86);
        let regs = HashMap::from([("cr3".to_string(), 0x1000u64)]);
        assert!(build_adapter(&m, &regs).is_err());
    }

    #[test]
    fn riscv_dispatches_on_mmu_mode() {
        let m = machine("sv39", None, Architecture::RiscV);
        let regs = HashMap::from([("satp".to_string(), 0xABCDu64)]);
        let (adapter, dtb) = build_adapter(&m, &regs).unwrap();
        assert!(matches!(adapter, Adapter::RiscVSv39(_)));
        assert_eq!(dtb, 0xABCD);
    }

    #[test]
    fn missing_register_is_an_error() {
        let m = machine("sv32", None, Architecture::RiscV);
        let regs = HashMap::new();
        assert!(build_adapter(&m, &regs).is_err());
    }
}
