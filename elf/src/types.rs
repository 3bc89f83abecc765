//! Raw constants and small enums mirrored from the ELF specification.
//!
//! Values are widened to `u64`/`u32` uniformly regardless of the object's
//! class so that the same relocation and layout code serves both
//! `ELFCLASS32` and `ELFCLASS64` images (see `SPEC_FULL.md`, "unified by
//! parameterizing over word size").

/// Word size of the object file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    pub(crate) fn from_ident(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Class::Elf32),
            2 => Some(Class::Elf64),
            _ => None,
        }
    }

    pub fn addr_size(self) -> usize {
        match self {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        }
    }
}

/// Byte order of multi-byte fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub(crate) fn from_ident(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Endian::Little),
            2 => Some(Endian::Big),
            _ => None,
        }
    }

    pub fn read_u16(self, b: &[u8]) -> u16 {
        let a = [b[0], b[1]];
        match self {
            Endian::Little => u16::from_le_bytes(a),
            Endian::Big => u16::from_be_bytes(a),
        }
    }

    pub fn read_u32(self, b: &[u8]) -> u32 {
        let a = [b[0], b[1], b[2], b[3]];
        match self {
            Endian::Little => u32::from_le_bytes(a),
            Endian::Big => u32::from_be_bytes(a),
        }
    }

    pub fn read_u64(self, b: &[u8]) -> u64 {
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        match self {
            Endian::Little => u64::from_le_bytes(a),
            Endian::Big => u64::from_be_bytes(a),
        }
    }

    pub fn write_u16(self, out: &mut [u8], v: u16) {
        out.copy_from_slice(&match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        });
    }

    pub fn write_u32(self, out: &mut [u8], v: u32) {
        out.copy_from_slice(&match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        });
    }

    pub fn write_u64(self, out: &mut [u8], v: u64) {
        out.copy_from_slice(&match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        });
    }
}

/// `e_machine` values this crate understands. Anything else is still
/// readable through [`crate::ElfImage`] (the reader does not reject unknown
/// machines), but `bootimg`'s relocators only dispatch on these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Machine {
    I386,
    X86_64,
    Arm,
    Aarch64,
    Ia64,
    Other(u16),
}

impl Machine {
    pub const EM_386: u16 = 3;
    pub const EM_ARM: u16 = 40;
    pub const EM_IA_64: u16 = 50;
    pub const EM_X86_64: u16 = 62;
    pub const EM_AARCH64: u16 = 183;

    pub fn from_u16(v: u16) -> Self {
        match v {
            Self::EM_386 => Machine::I386,
            Self::EM_ARM => Machine::Arm,
            Self::EM_IA_64 => Machine::Ia64,
            Self::EM_X86_64 => Machine::X86_64,
            Self::EM_AARCH64 => Machine::Aarch64,
            other => Machine::Other(other),
        }
    }
}

pub const EI_NMAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const EV_CURRENT: u8 = 1;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_REL: u32 = 9;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ShFlags: u64 {
        const WRITE = 0x1;
        const ALLOC = 0x2;
        const EXECINSTR = 0x4;
    }
}

pub const SHN_UNDEF: u32 = 0;
pub const SHN_ABS: u32 = 0xfff1;
pub const SHN_XINDEX: u32 = 0xffff;

pub const STT_NOTYPE: u8 = 0;
pub const STT_FUNC: u8 = 2;

pub fn st_type(st_info: u8) -> u8 {
    st_info & 0xf
}
