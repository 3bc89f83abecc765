use crate::types::{Class, Endian};

/// A single REL or RELA record, widened to 64-bit fields. `addend` is `0`
/// for REL tables (the addend then lives in the relocated slot itself).
#[derive(Clone, Copy, Debug)]
pub struct Reloc {
    pub offset: u64,
    pub sym: u32,
    pub r#type: u32,
    pub addend: i64,
}

impl Reloc {
    pub(crate) fn parse(class: Class, endian: Endian, b: &[u8], has_addend: bool) -> Self {
        match class {
            Class::Elf32 => {
                let offset = endian.read_u32(&b[0..4]) as u64;
                let info = endian.read_u32(&b[4..8]);
                let addend = if has_addend {
                    endian.read_u32(&b[8..12]) as i32 as i64
                } else {
                    0
                };
                Reloc { offset, sym: info >> 8, r#type: info & 0xff, addend }
            }
            Class::Elf64 => {
                let offset = endian.read_u64(&b[0..8]);
                let info = endian.read_u64(&b[8..16]);
                let addend = if has_addend { endian.read_u64(&b[16..24]) as i64 } else { 0 };
                Reloc { offset, sym: (info >> 32) as u32, r#type: (info & 0xffff_ffff) as u32, addend }
            }
        }
    }

    pub fn entsize(class: Class, has_addend: bool) -> usize {
        match (class, has_addend) {
            (Class::Elf32, false) => 8,
            (Class::Elf32, true) => 12,
            (Class::Elf64, false) => 16,
            (Class::Elf64, true) => 24,
        }
    }
}
