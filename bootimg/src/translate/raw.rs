// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::BuildError;
use crate::layout::SectionAddressMap;
use crate::object::ObjectView;
use crate::target::TargetDescriptor;

const RAW_SEPARATOR: u32 = 0xffff_fffe;
const RAW_END_MARKER: u32 = 0xffff_ffff;

/// The only raw relocation kind this table format carries: an absolute
/// 32-bit word needing the load delta added. PC-relative/branch
/// relocations classify to nothing and never reach this table.
const RAW_RELOC_32: u32 = 0;

/// Raw relocation table for loaders (U-Boot) that apply fixups themselves
/// rather than parsing a PE `.reloc` section: one group of addresses per
/// raw relocation kind (currently just `RAW_RELOC_32`), with the kind
/// implied by the group's position in the table, not written out as a
/// word of its own. `RAW_SEPARATOR` sits between groups; the very last
/// separator is replaced by `RAW_END_MARKER` rather than followed by one.
/// A table with no entries at all is just the bare end marker.
pub(crate) fn build(object: &ObjectView, target: &TargetDescriptor, map: &SectionAddressMap) -> Result<Vec<u8>, BuildError> {
    let mut groups: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for rs in &object.relocation_sections {
        let section_faddr = map.file_addr(rs.target_section);
        for reloc in &rs.relocs {
            if super::fixup_kind(target.elf_machine, reloc.r#type).is_none() {
                continue;
            }
            let addr = section_faddr + reloc.offset;
            let addr: u32 = addr.try_into().map_err(|_| BuildError::RelocationOutOfRange)?;
            groups.entry(RAW_RELOC_32).or_default().push(addr);
        }
    }

    let endian = target.endianness;
    let mut out = Vec::new();
    for (_reloc_type, mut addrs) in groups {
        addrs.sort_unstable();
        for addr in addrs {
            push_u32(&mut out, endian, addr);
        }
        push_u32(&mut out, endian, RAW_SEPARATOR);
    }
    if out.is_empty() {
        push_u32(&mut out, endian, RAW_END_MARKER);
    } else {
        let tail = out.len() - 4;
        endian.write_u32(&mut out[tail..], RAW_END_MARKER);
    }
    Ok(out)
}

fn push_u32(out: &mut Vec<u8>, endian: elf::Endian, v: u32) {
    let mut b = [0u8; 4];
    endian.write_u32(&mut b, v);
    out.extend_from_slice(&b);
}
