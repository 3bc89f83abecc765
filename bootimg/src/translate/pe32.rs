// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use crate::error::BuildError;
use crate::layout::{Layout, SectionAddressMap};
use crate::object::ObjectView;
use crate::target::TargetDescriptor;

fn align_up(v: u64, a: u64) -> u64 {
    (v + a - 1) & !(a - 1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FixupKind {
    HighLow,
    Dir64,
}

impl FixupKind {
    fn code(self) -> u16 {
        match self {
            FixupKind::HighLow => 3,
            FixupKind::Dir64 => 10,
        }
    }
}

/// Builds the `.reloc`-style fixup blocks a PE32(+) loader consumes to
/// rebase the image: one block per 4KiB page, each a `(page_rva,
/// block_size)` header followed by 16-bit `(kind << 12) | (rva & 0xfff)`
/// entries (§4.5, §6).
struct FixupBlockList {
    blocks: Vec<(u32, Vec<u16>)>,
}

impl FixupBlockList {
    fn new() -> Self {
        FixupBlockList { blocks: Vec::new() }
    }

    fn add(&mut self, rva: u32, kind: FixupKind) {
        let page = rva & !0xfff;
        let off = rva & 0xfff;
        let entry = (kind.code() << 12) | (off as u16);
        match self.blocks.last_mut() {
            Some((p, entries)) if *p == page => entries.push(entry),
            _ => self.blocks.push((page, vec![entry])),
        }
    }

    /// Serializes every block. Every block (including the last) is padded
    /// with trailing zero ("ABSOLUTE", ignored by the loader) entries to
    /// keep `block_size % 8 == 0`; the last block additionally gets
    /// further zero entries so the *total* serialized length comes out
    /// aligned to `section_align`, so that whatever follows the `.reloc`
    /// section in the image stays page-aligned.
    fn serialize(&self, section_align: u64) -> Vec<u8> {
        let mut padded: Vec<(u32, Vec<u16>)> = self
            .blocks
            .iter()
            .map(|(page, entries)| {
                let mut entries = entries.clone();
                while (8 + entries.len() * 2) % 8 != 0 {
                    entries.push(0);
                }
                (*page, entries)
            })
            .collect();

        if !padded.is_empty() {
            let last_idx = padded.len() - 1;
            let total: usize = padded.iter().map(|(_, e)| 8 + e.len() * 2).sum();
            let aligned_total = align_up(total as u64, section_align.max(1)) as usize;
            let mut extra = (aligned_total - total) / 2;
            let entries = &mut padded[last_idx].1;
            while extra > 0 {
                entries.push(0);
                extra -= 1;
            }
        }

        let mut out = Vec::new();
        for (page, entries) in &padded {
            let block_size = (8 + entries.len() * 2) as u32;
            out.extend_from_slice(&page.to_le_bytes());
            out.extend_from_slice(&block_size.to_le_bytes());
            for e in entries {
                out.extend_from_slice(&e.to_le_bytes());
            }
        }
        out
    }
}

pub(crate) fn build(
    object: &ObjectView,
    target: &TargetDescriptor,
    map: &SectionAddressMap,
    layout: &Layout,
) -> Result<Vec<u8>, BuildError> {
    let mut entries: Vec<(u32, FixupKind)> = Vec::new();
    for rs in &object.relocation_sections {
        let section_faddr = map.file_addr(rs.target_section);
        for reloc in &rs.relocs {
            let Some(kind) = super::fixup_kind(target.elf_machine, reloc.r#type) else {
                continue;
            };
            let rva = section_faddr + reloc.offset;
            let rva: u32 = rva.try_into().map_err(|_| BuildError::RelocationOutOfRange)?;
            entries.push((rva, kind));
        }
    }

    // Every 8-byte word in the IA-64 jumper and GOT regions holds an
    // absolute address the loader must rebase, not just the jumpers'
    // first (address) word — the second (zero guard) word gets patched
    // too, since the loader doesn't distinguish them.
    if target.elf_machine == elf::Machine::Ia64 {
        let words = 2 * layout.ia64jmpnum + layout.got_size / 8;
        for i in 0..words {
            let rva = layout.ia64jmp_off + 8 * i;
            let rva: u32 = rva.try_into().map_err(|_| BuildError::RelocationOutOfRange)?;
            entries.push((rva, FixupKind::Dir64));
        }
    }

    entries.sort_by_key(|(rva, _)| *rva);

    let mut list = FixupBlockList::new();
    for (rva, kind) in entries {
        list.add(rva, kind);
    }
    Ok(list.serialize(target.section_align))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S1-style single-entry block: one `DIR64` fixup at rva 3 lands in the
    /// page-0 block, padded out to a `section_align` of 8 (the smallest
    /// alignment that still exercises both padding tiers).
    #[test]
    fn single_entry_block_header_and_padding() {
        let mut list = FixupBlockList::new();
        list.add(3, FixupKind::Dir64);
        let bytes = list.serialize(8);

        // header: page_rva=0, block_size=8 (header) + 2 (one entry) padded
        // up to a multiple of 8 -> 10 rounds up to 16, i.e. three padding
        // entries, then further padded to `section_align=8` (already a
        // multiple of 8, so no extra padding beyond the per-block tier).
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 0);
        let block_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(block_size % 8, 0);
        assert_eq!(bytes.len(), block_size as usize);

        let entry = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
        assert_eq!(entry >> 12, FixupKind::Dir64.code());
        assert_eq!(entry & 0xfff, 3);
    }

    #[test]
    fn final_block_pads_to_section_align() {
        let mut list = FixupBlockList::new();
        list.add(0, FixupKind::HighLow);
        let bytes = list.serialize(4096);
        assert_eq!(bytes.len() % 4096, 0);
    }

    #[test]
    fn entries_on_different_pages_start_new_blocks() {
        let mut list = FixupBlockList::new();
        list.add(0, FixupKind::HighLow);
        list.add(0x1000, FixupKind::HighLow);
        let bytes = list.serialize(8);
        let first_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let second_page = u32::from_le_bytes(bytes[first_size..first_size + 4].try_into().unwrap());
        assert_eq!(second_page, 0x1000);
    }
}
