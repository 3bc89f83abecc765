// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::error::BuildError;
use crate::layout::SectionAddressMap;
use crate::object::ObjectView;
use crate::target::TargetDescriptor;

use super::{input_offset, read_u32, sym_addr, write_u32, write_u64};

const R_X86_64_NONE: u32 = 0;
const R_X86_64_64: u32 = 1;
const R_X86_64_PC32: u32 = 2;
const R_X86_64_32: u32 = 10;
const R_X86_64_32S: u32 = 11;
const R_X86_64_PC64: u32 = 24;

pub(crate) fn apply(
    object: &ObjectView,
    target: &TargetDescriptor,
    map: &SectionAddressMap,
    out: &mut [u8],
) -> Result<(), BuildError> {
    let endian = target.endianness;
    let relocatable = target.is_relocatable_output();
    for rs in &object.relocation_sections {
        let section_vaddr = map.vaddr(rs.target_section);
        let section_input_off = input_offset(object, rs.target_section);
        for reloc in &rs.relocs {
            let patch_off = section_input_off + reloc.offset;
            log::trace!("x86-64 reloc type {} at offset {:#x}", reloc.r#type, patch_off);
            match reloc.r#type {
                R_X86_64_NONE => {}
                R_X86_64_64 => {
                    let value = (sym_addr(object, reloc.sym)? as i64 + reloc.addend) as u64;
                    write_u64(out, patch_off, value, endian)?;
                }
                R_X86_64_PC64 => {
                    let pc = section_vaddr + reloc.offset;
                    let value = sym_addr(object, reloc.sym)? as i64 + reloc.addend - pc as i64;
                    write_u64(out, patch_off, value as u64, endian)?;
                }
                R_X86_64_PC32 => {
                    let pc = section_vaddr + reloc.offset;
                    let value = sym_addr(object, reloc.sym)? as i64 + reloc.addend - pc as i64;
                    write_u32(out, patch_off, value as u32, endian)?;
                }
                R_X86_64_32 | R_X86_64_32S => {
                    if relocatable {
                        return Err(BuildError::UnsupportedAbsoluteOnRelocatableTarget);
                    }
                    let value = (sym_addr(object, reloc.sym)? as i64 + reloc.addend) as u64;
                    write_u32(out, patch_off, value as u32, endian)?;
                }
                other => {
                    return Err(BuildError::UnsupportedRelocation {
                        machine: elf::Machine::EM_X86_64,
                        reloc_type: other,
                    })
                }
            }
        }
    }
    Ok(())
}
