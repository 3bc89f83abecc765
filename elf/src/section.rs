use crate::types::{Class, Endian, ShFlags};

/// A section header, widened to 64-bit fields regardless of the object's
/// class (see `types.rs`).
#[derive(Clone, Copy, Debug)]
pub struct Shdr {
    pub name_off: u32,
    pub sh_type: u32,
    pub flags: ShFlags,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

impl Shdr {
    pub const SIZE_32: usize = 40;
    pub const SIZE_64: usize = 64;

    pub fn size_for(class: Class) -> usize {
        match class {
            Class::Elf32 => Self::SIZE_32,
            Class::Elf64 => Self::SIZE_64,
        }
    }

    pub(crate) fn parse(class: Class, endian: Endian, b: &[u8]) -> Self {
        match class {
            Class::Elf32 => Shdr {
                name_off: endian.read_u32(&b[0..4]),
                sh_type: endian.read_u32(&b[4..8]),
                flags: ShFlags::from_bits_truncate(endian.read_u32(&b[8..12]) as u64),
                addr: endian.read_u32(&b[12..16]) as u64,
                offset: endian.read_u32(&b[16..20]) as u64,
                size: endian.read_u32(&b[20..24]) as u64,
                link: endian.read_u32(&b[24..28]),
                info: endian.read_u32(&b[28..32]),
                addralign: endian.read_u32(&b[32..36]) as u64,
                entsize: endian.read_u32(&b[36..40]) as u64,
            },
            Class::Elf64 => Shdr {
                name_off: endian.read_u32(&b[0..4]),
                sh_type: endian.read_u32(&b[4..8]),
                flags: ShFlags::from_bits_truncate(endian.read_u64(&b[8..16])),
                addr: endian.read_u64(&b[16..24]),
                offset: endian.read_u64(&b[24..32]),
                size: endian.read_u64(&b[32..40]),
                link: endian.read_u32(&b[40..44]),
                info: endian.read_u32(&b[44..48]),
                addralign: endian.read_u64(&b[48..56]),
                entsize: endian.read_u64(&b[56..64]),
            },
        }
    }

    /// `sh_addralign == 0` is equivalent to an alignment of 1 (§4.2 edge
    /// cases).
    pub fn effective_align(&self) -> u64 {
        if self.addralign == 0 { 1 } else { self.addralign }
    }

    pub fn is_alloc(&self) -> bool {
        self.flags.contains(ShFlags::ALLOC)
    }
}
