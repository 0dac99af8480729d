//! Reconstructs per-process virtual address spaces from an ELF-packaged
//! physical memory dump by walking architecture-specific radix-tree page
//! tables, and exports each as a standalone ELF64 file.

pub mod arch;
pub mod dump;
pub mod error;
pub mod factory;
pub mod interval;
pub mod machine;
pub mod walker;
pub mod writer;

pub use arch::{Adapter, Decoder, PermKey};
pub use dump::{DumpReader, DumpSource};
pub use error::{Error, Result};
pub use factory::build_adapter;
pub use machine::{Architecture, Endianness, MachineDescription, MmioDevice};
pub use walker::{build_process_maps, walk, MappingEntry, WalkResult};
pub use writer::export_virtual_memory_elf;
