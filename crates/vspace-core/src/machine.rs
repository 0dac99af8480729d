//! The machine description attached to a dump: endianness, architecture,
//! MMU mode, CPU specifics, and the memory-mapped device list. Sourced from
//! a `FOSSIL`/`0xDEADC0DE` NOTE segment whose payload is JSON, merged with
//! endianness/architecture derived from the ELF header itself.

use serde::Deserialize;

pub use object::Endianness;

/// The architecture tag carried in the output ELF's `e_machine` field and
/// used by the adapter factory's substring dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86,
    X86_64,
    Arm,
    Aarch64,
    RiscV,
}

impl Architecture {
    /// Derived from the ELF header's `e_machine` field.
    pub fn from_elf_machine(e_machine: u16) -> Option<Self> {
        match e_machine as u32 {
            object::elf::EM_386 => Some(Architecture::X86),
            object::elf::EM_X86_64 => Some(Architecture::X86_64),
            object::elf::EM_ARM => Some(Architecture::Arm),
            object::elf::EM_AARCH64 => Some(Architecture::Aarch64),
            object::elf::EM_RISCV => Some(Architecture::RiscV),
            _ => None,
        }
    }

    /// Lowercase tag used for the factory's substring dispatch and for
    /// producing diagnostic messages; mirrors the strings spec.md's
    /// architecture field would carry (`x86`, `x86_64`, `riscv32`,
    /// `riscv64`, `arm`, `aarch64`).
    pub fn tag(&self) -> &'static str {
        match self {
            Architecture::X86 => "386",
            Architecture::X86_64 => "x86_64",
            Architecture::Arm => "arm",
            Architecture::Aarch64 => "aarch64",
            Architecture::RiscV => "riscv",
        }
    }

    /// The `e_machine` value to write into an exported virtual-space ELF.
    pub fn export_e_machine(&self) -> u16 {
        match self {
            Architecture::X86 => 0x03,
            Architecture::X86_64 => 0x3E,
            Architecture::Arm => 0x28,
            Architecture::Aarch64 => 0xB7,
            Architecture::RiscV => 0xF3,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CpuSpecifics {
    #[serde(rename = "MAXPHYADDR")]
    maxphyaddr: Option<u32>,
}

/// Shape of the JSON payload carried by the `FOSSIL` NOTE.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MachineDescriptionJson {
    #[serde(rename = "MMUMode")]
    pub mmu_mode: String,
    #[serde(rename = "MemoryMappedDevices", default)]
    pub memory_mapped_devices: Vec<(u64, String)>,
    #[serde(rename = "CPUSpecifics", default)]
    cpu_specifics: CpuSpecifics,
}

/// A memory-mapped device region named in the NOTE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmioDevice {
    pub base: u64,
    pub name: String,
}

/// Full machine description: the JSON payload merged with ELF-derived
/// endianness and architecture.
#[derive(Debug, Clone)]
pub struct MachineDescription {
    pub endianness: Endianness,
    pub architecture: Architecture,
    pub mmu_mode: String,
    pub maxphyaddr: Option<u32>,
    pub mmio_devices: Vec<MmioDevice>,
}

impl MachineDescription {
    pub(crate) fn from_parts(
        endianness: Endianness,
        architecture: Architecture,
        json: MachineDescriptionJson,
    ) -> Self {
        MachineDescription {
            endianness,
            architecture,
            mmu_mode: json.mmu_mode,
            maxphyaddr: json.cpu_specifics.maxphyaddr,
            mmio_devices: json
                .memory_mapped_devices
                .into_iter()
                .map(|(base, name)| MmioDevice { base, name })
                .collect(),
        }
    }
}
