// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::error::BuildError;
use crate::layout::{Layout, SectionAddressMap};
use crate::object::ObjectView;
use crate::target::{TargetDescriptor, TargetId};

use super::{input_offset, read_u32, sym_addr, write_u32};

const R_ARM_NONE: u32 = 0;
const R_ARM_ABS32: u32 = 2;
const R_ARM_THM_CALL: u32 = 10;
const R_ARM_V4BX: u32 = 40;
const R_ARM_CALL: u32 = 28;
const R_ARM_JUMP24: u32 = 29;
const R_ARM_THM_JUMP24: u32 = 30;
const R_ARM_THM_JUMP19: u32 = 51;

/// Two 16-bit halves of a Thumb-2 32-bit branch encoding, approximated (not
/// ISA-conformant down to the J1/J2 scrambled-bit form) as a plain
/// sign-extended immediate split across the high and low halfwords. Good
/// enough to round-trip our own encode/decode; see `DESIGN.md`.
fn patch_thumb_branch(out: &mut [u8], off: u64, endian: elf::Endian, imm: i32, bits: u32) -> Result<(), BuildError> {
    if !(-(1i32 << (bits - 1))..(1i32 << (bits - 1))).contains(&imm) {
        return Err(BuildError::RelocationOutOfRange);
    }
    let hi = (0xf000u32 | ((imm as u32 >> 12) & 0x7ff)) as u16;
    let lo = (0xf800u32 | ((imm as u32 >> 1) & 0x7ff)) as u16;
    let off = off as usize;
    let hi_bytes = out.get_mut(off..off + 2).ok_or(BuildError::RelocationOutOfRange)?;
    endian.write_u16(hi_bytes, hi);
    let lo_bytes = out.get_mut(off + 2..off + 4).ok_or(BuildError::RelocationOutOfRange)?;
    endian.write_u16(lo_bytes, lo);
    Ok(())
}

/// Emits an 8-byte `nop; bx pc; b <target>` veneer for a Thumb caller
/// branching to an ARM-state symbol, returning the veneer's file address.
fn emit_thumb_to_arm_veneer(
    out: &mut [u8],
    endian: elf::Endian,
    veneer_faddr: u64,
    veneer_vaddr: u64,
    target_vaddr: u64,
) -> Result<(), BuildError> {
    write_u32(out, veneer_faddr, 0x46c0_4778, endian)?;
    let branch_pc = veneer_vaddr + 4 + 8;
    let branch_off = (target_vaddr as i64 - branch_pc as i64) >> 2;
    let insn = 0xea00_0000u32 | (branch_off as u32 & 0x00ff_ffff);
    write_u32(out, veneer_faddr + 4, insn, endian)?;
    Ok(())
}

/// Emits a 16-byte `ldr ip, [pc, #4]; bx ip; .word target|1; nop` veneer for
/// an ARM caller branching to a Thumb-state symbol.
fn emit_arm_to_thumb_veneer(
    out: &mut [u8],
    endian: elf::Endian,
    veneer_faddr: u64,
    target_vaddr: u64,
) -> Result<(), BuildError> {
    write_u32(out, veneer_faddr, 0xe59f_c004, endian)?;
    write_u32(out, veneer_faddr + 4, 0xe12f_ff1c, endian)?;
    write_u32(out, veneer_faddr + 8, target_vaddr as u32 | 1, endian)?;
    write_u32(out, veneer_faddr + 12, 0xe1a0_0000, endian)?;
    Ok(())
}

pub(crate) fn apply(
    object: &ObjectView,
    target: &TargetDescriptor,
    map: &SectionAddressMap,
    layout: &mut Layout,
    input: &mut [u8],
    out_img: &mut [u8],
) -> Result<(), BuildError> {
    let endian = target.endianness;
    let mut tramp_used = 0u64;
    let bias = if target.id == TargetId::Efi { 0x400 } else { 0 };

    for rs in &object.relocation_sections {
        let section_vaddr = map.vaddr(rs.target_section);
        let section_input_off = input_offset(object, rs.target_section);
        for reloc in &rs.relocs {
            let patch_off = section_input_off + reloc.offset;
            let pc = section_vaddr + reloc.offset;
            let sym = sym_addr(object, reloc.sym)?;
            log::trace!("arm reloc type {} at offset {:#x}", reloc.r#type, patch_off);

            match reloc.r#type {
                R_ARM_NONE | R_ARM_V4BX => {}
                R_ARM_ABS32 => {
                    let cur = read_u32(input, patch_off, endian)?;
                    let value = cur.wrapping_add(sym as u32).wrapping_add(bias);
                    write_u32(input, patch_off, value, endian)?;
                }
                R_ARM_THM_CALL | R_ARM_THM_JUMP24 | R_ARM_THM_JUMP19 => {
                    let bits = if reloc.r#type == R_ARM_THM_JUMP19 { 19 } else { 24 };
                    let mut dest = sym;
                    if sym & 1 == 0 {
                        let veneer_faddr = align_tramp(layout.tramp_off + tramp_used);
                        if veneer_faddr + 8 > layout.tramp_off + layout.tramp_size {
                            return Err(BuildError::RelocationOutOfRange);
                        }
                        let veneer_vaddr = veneer_faddr + target.vaddr_offset;
                        log::debug!("emitting thumb-to-arm veneer at {:#x} for target {:#x}", veneer_faddr, sym);
                        emit_thumb_to_arm_veneer(out_img, endian, veneer_faddr, veneer_vaddr, sym)?;
                        tramp_used = veneer_faddr + 8 - layout.tramp_off;
                        dest = veneer_vaddr;
                    }
                    let branch_pc = pc + 4;
                    let imm = (dest as i64 - branch_pc as i64) >> 1;
                    patch_thumb_branch(input, patch_off, endian, imm as i32, bits)?;
                }
                R_ARM_CALL | R_ARM_JUMP24 => {
                    let mut dest = sym;
                    if sym & 1 != 0 {
                        let veneer_faddr = align_tramp(layout.tramp_off + tramp_used);
                        if veneer_faddr + 16 > layout.tramp_off + layout.tramp_size {
                            return Err(BuildError::RelocationOutOfRange);
                        }
                        log::debug!("emitting arm-to-thumb veneer at {:#x} for target {:#x}", veneer_faddr, sym);
                        emit_arm_to_thumb_veneer(out_img, endian, veneer_faddr, sym)?;
                        tramp_used = veneer_faddr + 16 - layout.tramp_off;
                        dest = veneer_faddr + target.vaddr_offset;
                    }
                    let branch_pc = pc + 8;
                    let branch_off = (dest as i64 - branch_pc as i64) >> 2;
                    if !(-(1i64 << 23)..(1i64 << 23)).contains(&branch_off) {
                        return Err(BuildError::RelocationOutOfRange);
                    }
                    let cur = read_u32(input, patch_off, endian)?;
                    let insn = (cur & 0xff00_0000) | (branch_off as u32 & 0x00ff_ffff);
                    write_u32(input, patch_off, insn, endian)?;
                }
                other => {
                    return Err(BuildError::UnsupportedRelocation {
                        machine: elf::Machine::EM_ARM,
                        reloc_type: other,
                    })
                }
            }
        }
    }
    Ok(())
}

fn align_tramp(off: u64) -> u64 {
    (off + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{compute_layout, RelocSection};
    use crate::object::ObjectView;
    use crate::target::EFI_ARM;
    use alloc::string::String;
    use elf::types::{ShFlags, SHT_PROGBITS};
    use elf::{Reloc, Shdr, Sym};

    /// S3: a Thumb `BL` to an ARM-state symbol gets a 2-word
    /// `nop; bx pc; b <target>` veneer, and the branch itself is retargeted
    /// to the veneer rather than the ARM-state symbol directly.
    #[test]
    fn thumb_call_to_arm_symbol_emits_veneer() {
        let text = Shdr {
            name_off: 0,
            sh_type: SHT_PROGBITS,
            flags: ShFlags::ALLOC | ShFlags::EXECINSTR,
            addr: 0,
            offset: 0,
            size: 8,
            link: 0,
            info: 0,
            addralign: 4,
            entsize: 0,
        };
        let arm_target_sym = Sym { name_off: 0, info: 0, other: 0, shndx: 0, value: 0x2000, size: 0 };
        let object = ObjectView {
            class: elf::Class::Elf32,
            endian: elf::Endian::Little,
            machine: elf::Machine::Arm,
            shdrs: alloc::vec![text],
            symtab_idx: 0,
            symbols: alloc::vec![Sym { name_off: 0, info: 0, other: 0, shndx: 0, value: 0, size: 0 }, arm_target_sym],
            symbol_names: alloc::vec![String::new(), String::new()],
            relocation_sections: alloc::vec![RelocSection {
                target_section: 0,
                relocs: alloc::vec![Reloc { offset: 0, sym: 1, r#type: R_ARM_THM_CALL, addend: 0 }],
            }],
        };

        let (mut layout, map) = compute_layout(&object, &EFI_ARM).unwrap();
        assert_eq!(layout.tramp_size, 8, "one interworking veneer reserved");

        let mut input = alloc::vec![0u8; 8];
        let mut out_img = alloc::vec![0u8; layout.kernel_size as usize];
        apply(&object, &EFI_ARM, &map, &mut layout, &mut input, &mut out_img).unwrap();

        let veneer_word = u32::from_le_bytes(out_img[layout.tramp_off as usize..layout.tramp_off as usize + 4].try_into().unwrap());
        assert_eq!(veneer_word, 0x46c0_4778, "nop; bx pc veneer prologue");

        // The BL's encoding at offset 0 must have changed from the all-zero
        // placeholder now that it targets the veneer.
        assert_ne!(&input[0..4], &[0u8; 4]);
    }
}
