use core::fmt;

/// Failure modes for [`crate::ElfImage::read`] and the typed views it hands
/// out. Every variant corresponds to a check that is performed exactly once,
/// up front, so that later accessors never need to re-validate bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElfError {
    FileTooShort,
    BadMagic,
    BadClass,
    BadEndian,
    BadVersion,
    InvalidShdrSize,
    InvalidShdrTable,
    InvalidSectionIndex,
    InvalidStrtabIndex,
    InvalidString,
    InvalidSymtabEntsize,
    InvalidSymbolIndex,
    InvalidRelocEntsize,
    InvalidRelocTable,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfError::FileTooShort => write!(f, "ELF file is too short to contain a valid header"),
            ElfError::BadMagic => write!(f, "ELF magic number is invalid"),
            ElfError::BadClass => write!(f, "ELF class does not match the selected target"),
            ElfError::BadEndian => write!(f, "ELF data encoding does not match the selected target"),
            ElfError::BadVersion => write!(f, "ELF version field is not EV_CURRENT"),
            ElfError::InvalidShdrSize => write!(f, "section header entry size is inconsistent"),
            ElfError::InvalidShdrTable => write!(f, "section header table overflows the file"),
            ElfError::InvalidSectionIndex => write!(f, "section index is out of range"),
            ElfError::InvalidStrtabIndex => write!(f, "string table section index is invalid"),
            ElfError::InvalidString => write!(f, "string table entry is not NUL-terminated"),
            ElfError::InvalidSymtabEntsize => write!(f, "symbol table entry size is inconsistent"),
            ElfError::InvalidSymbolIndex => write!(f, "symbol index is out of range"),
            ElfError::InvalidRelocEntsize => write!(f, "relocation table entry size is inconsistent"),
            ElfError::InvalidRelocTable => write!(f, "relocation table overflows the file"),
        }
    }
}

impl core::error::Error for ElfError {}
