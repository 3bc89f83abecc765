// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use elf::types::SHT_SYMTAB;
use elf::{Class, ElfImage, Endian, Machine, Reloc, Shdr, Sym};

use crate::error::BuildError;
use crate::target::TargetDescriptor;

/// One `SHT_REL`/`SHT_RELA` section's records, together with the index of
/// the section they apply to (`sh_info`).
#[derive(Clone, Debug)]
pub struct RelocSection {
    pub target_section: usize,
    pub relocs: Vec<Reloc>,
}

/// An owned, flattened snapshot of everything the layout/relocation
/// passes need from the input object. Built once by [`ObjectView::read`]
/// so that later passes never hold a borrow into the byte buffer they are
/// about to mutate in place (§9: cyclic pointer graphs re-expressed as
/// indices into flat arrays).
#[derive(Clone, Debug)]
pub struct ObjectView {
    pub class: Class,
    pub endian: Endian,
    pub machine: Machine,
    pub shdrs: Vec<Shdr>,
    pub symtab_idx: usize,
    pub symbols: Vec<Sym>,
    pub symbol_names: Vec<String>,
    pub relocation_sections: Vec<RelocSection>,
}

impl ObjectView {
    pub fn read(buf: &[u8], target: &TargetDescriptor) -> Result<Self, BuildError> {
        let image = ElfImage::read(buf, target.elf_class, target.endianness)?;
        if image.machine() != target.elf_machine {
            return Err(BuildError::BadElf(elf::ElfError::BadClass));
        }

        let shdrs = image.shdrs().to_vec();

        let symtab_idx = shdrs
            .iter()
            .position(|s| s.sh_type == SHT_SYMTAB)
            .ok_or(BuildError::BadElf(elf::ElfError::InvalidSymtabEntsize))?;
        let symtab = &shdrs[symtab_idx];
        let symbols = image.symbols(symtab)?;
        let symbol_names = symbols
            .iter()
            .map(|s| image.symbol_name(symtab, s).map(|n| n.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut relocation_sections = Vec::new();
        for shidx in image.iter_relocation_sections() {
            let shdr = &shdrs[shidx];
            let relocs = image.relocations(shdr)?;
            let target_section = shdr.info as usize;
            if target_section >= shdrs.len() {
                return Err(BuildError::RelocationOutOfRange);
            }
            relocation_sections.push(RelocSection { target_section, relocs });
        }

        Ok(ObjectView {
            class: image.class(),
            endian: image.endian(),
            machine: image.machine(),
            shdrs,
            symtab_idx,
            symbols,
            symbol_names,
            relocation_sections,
        })
    }
}
