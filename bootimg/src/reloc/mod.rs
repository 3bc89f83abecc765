// SPDX-License-Identifier: MIT OR Apache-2.0

mod aarch64;
mod arm;
mod i386;
mod ia64;
mod x86_64;

use elf::Endian;

use crate::error::BuildError;
use crate::layout::{Layout, SectionAddressMap};
use crate::object::ObjectView;
use crate::target::TargetDescriptor;

/// Address relocator (C4.5/C5): walks every `SHT_REL`/`SHT_RELA` section in
/// `object` and patches the bytes each record addresses.
///
/// Two buffers are live at once, per §2's pipeline order (C5 runs before
/// section payloads are copied into the output image): `input_buf` is the
/// original linked object, indexed by each section's *original* `sh_offset`
/// — this is where patches to existing instructions/data land, since that's
/// still where their bytes live. `out_img` is the new output image,
/// indexed by [`SectionAddressMap`]/`Layout` offsets — this is where
/// trampolines, veneers and GOT/jumper slots are written, since those
/// regions don't exist in the input object at all.
///
/// `object.symbols` must already have been rebased by
/// [`crate::symbols::relocate_symbols`].
pub fn apply_relocations(
    object: &ObjectView,
    target: &TargetDescriptor,
    map: &SectionAddressMap,
    layout: &mut Layout,
    input_buf: &mut [u8],
    out_img: &mut [u8],
) -> Result<(), BuildError> {
    match target.elf_machine {
        elf::Machine::I386 => i386::apply(object, target, map, input_buf),
        elf::Machine::X86_64 => x86_64::apply(object, target, map, input_buf),
        elf::Machine::Arm => arm::apply(object, target, map, layout, input_buf, out_img),
        elf::Machine::Aarch64 => aarch64::apply(object, target, map, input_buf),
        elf::Machine::Ia64 => ia64::apply(object, target, map, layout, input_buf, out_img),
        elf::Machine::Other(m) => {
            if object.relocation_sections.iter().any(|rs| !rs.relocs.is_empty()) {
                return Err(BuildError::UnsupportedRelocation { machine: m, reloc_type: 0 });
            }
            Ok(())
        }
    }
}

pub(crate) fn read_u32(buf: &[u8], off: u64, endian: Endian) -> Result<u32, BuildError> {
    let off = off as usize;
    let bytes = buf.get(off..off + 4).ok_or(BuildError::RelocationOutOfRange)?;
    Ok(endian.read_u32(bytes))
}

pub(crate) fn write_u32(buf: &mut [u8], off: u64, v: u32, endian: Endian) -> Result<(), BuildError> {
    let off = off as usize;
    let bytes = buf.get_mut(off..off + 4).ok_or(BuildError::RelocationOutOfRange)?;
    endian.write_u32(bytes, v);
    Ok(())
}

pub(crate) fn read_u64(buf: &[u8], off: u64, endian: Endian) -> Result<u64, BuildError> {
    let off = off as usize;
    let bytes = buf.get(off..off + 8).ok_or(BuildError::RelocationOutOfRange)?;
    Ok(endian.read_u64(bytes))
}

pub(crate) fn write_u64(buf: &mut [u8], off: u64, v: u64, endian: Endian) -> Result<(), BuildError> {
    let off = off as usize;
    let bytes = buf.get_mut(off..off + 8).ok_or(BuildError::RelocationOutOfRange)?;
    endian.write_u64(bytes, v);
    Ok(())
}

/// Resolved address of the symbol a relocation record references, after
/// C4 has rebased `object.symbols`.
pub(crate) fn sym_addr(object: &ObjectView, sym_idx: u32) -> Result<u64, BuildError> {
    object
        .symbols
        .get(sym_idx as usize)
        .map(|s| s.value)
        .ok_or(BuildError::RelocationOutOfRange)
}

/// Original, pre-layout file offset of a section, for patches that land in
/// `input_buf`.
pub(crate) fn input_offset(object: &ObjectView, section: usize) -> u64 {
    object.shdrs[section].offset
}
