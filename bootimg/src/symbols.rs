// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

use alloc::string::ToString;

use elf::types::{st_type, SHN_ABS, SHN_UNDEF, STT_FUNC};
use elf::Endian;

use crate::error::BuildError;
use crate::layout::{Layout, SectionAddressMap};
use crate::object::ObjectView;
use crate::target::TargetDescriptor;

/// Symbol relocator (C4): a single pass over `object.symbols`, rewriting
/// every `st_value` to its final address and allocating IA-64 jumper slots
/// in `out_img` as it goes. `out_img` must already be large enough to hold
/// `layout.ia64jmp_off + 16 * layout.ia64jmpnum` bytes.
///
/// Returns the resolved `_start`/`start` address; also stores it in
/// `layout.start_address`.
pub fn relocate_symbols(
    object: &mut ObjectView,
    target: &TargetDescriptor,
    map: &SectionAddressMap,
    layout: &mut Layout,
    out_img: &mut [u8],
) -> Result<u64, BuildError> {
    let endian = target.endianness;
    let vaddr_offset = target.vaddr_offset;
    let is_ia64 = target.elf_machine == elf::Machine::Ia64;
    let mut jumper_slot = 0u64;
    let mut start_address = None;

    for (sym, name) in object.symbols.iter_mut().zip(object.symbol_names.iter()) {
        if sym.shndx == SHN_ABS {
            // left unchanged
        } else if sym.shndx == SHN_UNDEF {
            match name.as_str() {
                "__bss_start" => sym.value = layout.bss_start + vaddr_offset,
                "_end" => sym.value = layout.end + vaddr_offset,
                "" => {}
                other => return Err(BuildError::UndefinedSymbol(other.to_string())),
            }
        } else if map.is_placed(sym.shndx as usize) {
            sym.value += map.vaddr(sym.shndx as usize);
        }

        if is_ia64
            && st_type(sym.info) == STT_FUNC
            && sym.shndx != SHN_UNDEF
            && sym.shndx != SHN_ABS
        {
            let slot_off = layout.ia64jmp_off + 16 * jumper_slot;
            write_jumper_slot(out_img, endian, slot_off as usize, sym.value)?;
            sym.value = slot_off + vaddr_offset;
            jumper_slot += 1;
        }

        if (name.as_str() == "_start" || name.as_str() == "start") && start_address.is_none() {
            start_address = Some(sym.value);
        }
    }

    let start_address = start_address.ok_or(BuildError::NoStartSymbol)?;
    layout.start_address = start_address;
    Ok(start_address)
}

fn write_jumper_slot(out_img: &mut [u8], endian: Endian, off: usize, value: u64) -> Result<(), BuildError> {
    let slot = out_img
        .get_mut(off..off + 16)
        .ok_or(BuildError::RelocationOutOfRange)?;
    endian.write_u64(&mut slot[0..8], value);
    endian.write_u64(&mut slot[8..16], 0);
    Ok(())
}
