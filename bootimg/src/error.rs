// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use core::error::Error;
use core::fmt;
use core::fmt::Display;

use elf::ElfError;

/// Error taxonomy for the image-building core (§7). Every variant is fatal:
/// there is no partial success and no retry, and the only condition the
/// core treats as recoverable internally is "no relocations exist", which
/// is not an error at all (it takes the empty-table branch in the raw
/// relocation translator).
#[derive(Clone, Debug)]
pub enum BuildError {
    BadElf(ElfError),
    UndefinedSymbol(String),
    NoStartSymbol,
    UnsupportedRelocation { machine: u16, reloc_type: u32 },
    RelocationOutOfRange,
    MiscompiledStartAddress { expected: u64, actual: u64 },
    RelocSectionTooLarge,
    UnsupportedAbsoluteOnRelocatableTarget,
}

impl From<ElfError> for BuildError {
    fn from(e: ElfError) -> Self {
        BuildError::BadElf(e)
    }
}

/// Wrapper implementing `core::error::Error`, matching the shape of the
/// teacher's `BootImageError`/`BootImageErrorFull` split.
#[derive(Clone, Debug)]
pub struct BuildErrorFull {
    err: BuildError,
}

impl Error for BuildErrorFull {}

impl Display for BuildErrorFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.err {
            BuildError::BadElf(e) => write!(f, "failed to parse kernel ELF file: {e}"),
            BuildError::UndefinedSymbol(name) => {
                write!(f, "{name} referenced but not defined")
            }
            BuildError::NoStartSymbol => {
                write!(f, "start symbol is not defined")
            }
            BuildError::UnsupportedRelocation { machine, reloc_type } => {
                write!(f, "relocation type {reloc_type} is not supported on machine {machine}")
            }
            BuildError::RelocationOutOfRange => {
                write!(f, "relocation offset is out of range for its encoding")
            }
            BuildError::MiscompiledStartAddress { expected, actual } => {
                write!(
                    f,
                    "the program load address mismatch ({expected:#x} != {actual:#x}); the core was probably misconfigured for this target"
                )
            }
            BuildError::RelocSectionTooLarge => {
                write!(f, "relocation section is too large for the early boot stack")
            }
            BuildError::UnsupportedAbsoluteOnRelocatableTarget => {
                write!(f, "can't add fixup entry for an absolute relocation on a relocatable target")
            }
        }
    }
}

impl BuildError {
    pub fn dyn_error(self) -> Box<dyn Error> {
        Box::new(BuildErrorFull { err: self })
    }
}
