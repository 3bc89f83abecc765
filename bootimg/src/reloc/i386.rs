// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::error::BuildError;
use crate::layout::SectionAddressMap;
use crate::object::ObjectView;
use crate::target::TargetDescriptor;

use super::{input_offset, read_u32, sym_addr, write_u32};

const R_386_NONE: u32 = 0;
const R_386_32: u32 = 1;
const R_386_PC32: u32 = 2;

pub(crate) fn apply(
    object: &ObjectView,
    target: &TargetDescriptor,
    map: &SectionAddressMap,
    out: &mut [u8],
) -> Result<(), BuildError> {
    let endian = target.endianness;
    for rs in &object.relocation_sections {
        let section_vaddr = map.vaddr(rs.target_section);
        let section_input_off = input_offset(object, rs.target_section);
        for reloc in &rs.relocs {
            let patch_off = section_input_off + reloc.offset;
            log::trace!("i386 reloc type {} at offset {:#x}", reloc.r#type, patch_off);
            match reloc.r#type {
                R_386_NONE => {}
                R_386_32 => {
                    let addend = read_u32(out, patch_off, endian)? as i64 + reloc.addend;
                    let value = sym_addr(object, reloc.sym)? as i64 + addend;
                    write_u32(out, patch_off, value as u32, endian)?;
                }
                R_386_PC32 => {
                    let addend = read_u32(out, patch_off, endian)? as i64 + reloc.addend;
                    let pc = section_vaddr + reloc.offset;
                    let value = sym_addr(object, reloc.sym)? as i64 + addend - pc as i64;
                    write_u32(out, patch_off, value as u32, endian)?;
                }
                other => {
                    return Err(BuildError::UnsupportedRelocation {
                        machine: elf::Machine::EM_386,
                        reloc_type: other,
                    })
                }
            }
        }
    }
    Ok(())
}
