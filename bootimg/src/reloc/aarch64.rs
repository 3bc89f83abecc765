// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::error::BuildError;
use crate::layout::SectionAddressMap;
use crate::object::ObjectView;
use crate::target::TargetDescriptor;

use super::{input_offset, read_u32, sym_addr, write_u32};

const R_AARCH64_ABS64: u32 = 257;
const R_AARCH64_JUMP26: u32 = 282;
const R_AARCH64_CALL26: u32 = 283;
const R_AARCH64_ADR_PREL_PG_HI21: u32 = 275;
const R_AARCH64_ADD_ABS_LO12_NC: u32 = 277;
const R_AARCH64_LDST64_ABS_LO12_NC: u32 = 286;

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
            let pc = section_vaddr + reloc.offset;
            let value = (sym_addr(object, reloc.sym)? as i64 + reloc.addend) as u64;
            log::trace!("aarch64 reloc type {} at offset {:#x}", reloc.r#type, patch_off);
            match reloc.r#type {
                R_AARCH64_ABS64 => {
                    super::write_u64(out, patch_off, value, endian)?;
                }
                R_AARCH64_ADR_PREL_PG_HI21 => {
                    let page_delta = ((value & !0xFFF) as i64) - ((pc & !0xFFF) as i64);
                    let imm = page_delta >> 12;
                    if !(-(1 << 20)..(1 << 20)).contains(&imm) {
                        return Err(BuildError::RelocationOutOfRange);
                    }
                    let imm = imm as u32;
                    let immlo = imm & 0x3;
                    let immhi = (imm >> 2) & 0x7ffff;
                    let instr = read_u32(out, patch_off, endian)?;
                    let instr = (instr & !((0x3 << 29) | (0x7ffff << 5))) | (immlo << 29) | (immhi << 5);
                    write_u32(out, patch_off, instr, endian)?;
                }
                R_AARCH64_ADD_ABS_LO12_NC => {
                    let lo12 = (value & 0xfff) as u32;
                    let instr = read_u32(out, patch_off, endian)?;
                    let instr = (instr & !(0xfff << 10)) | (lo12 << 10);
                    write_u32(out, patch_off, instr, endian)?;
                }
                R_AARCH64_LDST64_ABS_LO12_NC => {
                    let lo12 = ((value & 0xfff) >> 3) as u32;
                    let instr = read_u32(out, patch_off, endian)?;
                    let instr = (instr & !(0xfff << 10)) | (lo12 << 10);
                    write_u32(out, patch_off, instr, endian)?;
                }
                R_AARCH64_JUMP26 | R_AARCH64_CALL26 => {
                    let offset = value as i64 - pc as i64;
                    if offset % 4 != 0 {
                        return Err(BuildError::RelocationOutOfRange);
                    }
                    let imm26 = offset >> 2;
                    if !(-(1 << 25)..(1 << 25)).contains(&imm26) {
                        return Err(BuildError::RelocationOutOfRange);
                    }
                    let instr = read_u32(out, patch_off, endian)?;
                    let instr = (instr & !0x3ff_ffff) | (imm26 as u32 & 0x3ff_ffff);
                    write_u32(out, patch_off, instr, endian)?;
                }
                other => {
                    return Err(BuildError::UnsupportedRelocation {
                        machine: elf::Machine::EM_AARCH64,
                        reloc_type: other,
                    })
                }
            }
        }
    }
    Ok(())
}
