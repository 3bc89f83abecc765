// SPDX-License-Identifier: MIT OR Apache-2.0

//! A read-only, section-oriented ELF reader.
//!
//! Unlike a loader that walks program headers to map a PIE into memory,
//! this crate's sole consumer is an image builder that works from the
//! *section* view of a relinked object: section headers, symbol tables,
//! relocation tables, string tables. No program header or `.dynamic`
//! support is provided because nothing downstream needs it.
//!
//! Every bounds check happens once, in [`ElfImage::read`]; the typed views
//! handed out afterwards (`Shdr`, `Sym`, `Reloc`) never re-validate offsets
//! into the underlying buffer beyond what an index/slice range implies.

#![no_std]

extern crate alloc;

mod error;
mod relocation;
mod section;
mod symbol;
pub mod types;

use alloc::vec::Vec;

pub use error::ElfError;
pub use relocation::Reloc;
pub use section::Shdr;
pub use symbol::Sym;
pub use types::{Class, Endian, Machine};

use types::{EI_NMAGIC, EV_CURRENT, SHN_XINDEX, SHT_NOBITS, SHT_REL, SHT_RELA, SHT_STRTAB};

const EHDR_SIZE_32: usize = 52;
const EHDR_SIZE_64: usize = 64;

/// A parsed ELF object file.
#[derive(Debug)]
pub struct ElfImage<'a> {
    buf: &'a [u8],
    class: Class,
    endian: Endian,
    machine: Machine,
    entry: u64,
    shdrs: Vec<Shdr>,
    shstrndx: usize,
}

impl<'a> ElfImage<'a> {
    /// Validate the header and section header table and build an
    /// `ElfImage`. `expected_class`/`expected_endian` come from the
    /// `TargetDescriptor` selected by the caller; a mismatch is a `BadElf`
    /// condition (§4.1).
    pub fn read(
        buf: &'a [u8],
        expected_class: Class,
        expected_endian: Endian,
    ) -> Result<Self, ElfError> {
        if buf.len() < 20 {
            return Err(ElfError::FileTooShort);
        }
        if buf[0..4] != EI_NMAGIC {
            return Err(ElfError::BadMagic);
        }
        let class = Class::from_ident(buf[4]).ok_or(ElfError::BadClass)?;
        if class != expected_class {
            return Err(ElfError::BadClass);
        }
        let endian = Endian::from_ident(buf[5]).ok_or(ElfError::BadEndian)?;
        if endian != expected_endian {
            return Err(ElfError::BadEndian);
        }
        if buf[6] != EV_CURRENT {
            return Err(ElfError::BadVersion);
        }

        let ehdr_size = match class {
            Class::Elf32 => EHDR_SIZE_32,
            Class::Elf64 => EHDR_SIZE_64,
        };
        if buf.len() < ehdr_size {
            return Err(ElfError::FileTooShort);
        }

        let (e_version_off, e_machine_off, e_entry_off, e_shoff_off, e_shentsize_off, e_shnum_off, e_shstrndx_off);
        match class {
            Class::Elf32 => {
                e_machine_off = 18;
                e_version_off = 20;
                e_entry_off = 24;
                e_shoff_off = 32;
                e_shentsize_off = 46;
                e_shnum_off = 48;
                e_shstrndx_off = 50;
            }
            Class::Elf64 => {
                e_machine_off = 18;
                e_version_off = 20;
                e_entry_off = 24;
                e_shoff_off = 40;
                e_shentsize_off = 58;
                e_shnum_off = 60;
                e_shstrndx_off = 62;
            }
        }

        if endian.read_u32(&buf[e_version_off..e_version_off + 4]) != EV_CURRENT as u32 {
            return Err(ElfError::BadVersion);
        }
        let machine = Machine::from_u16(endian.read_u16(&buf[e_machine_off..e_machine_off + 2]));
        let entry = match class {
            Class::Elf32 => endian.read_u32(&buf[e_entry_off..e_entry_off + 4]) as u64,
            Class::Elf64 => endian.read_u64(&buf[e_entry_off..e_entry_off + 8]),
        };
        let shoff = match class {
            Class::Elf32 => endian.read_u32(&buf[e_shoff_off..e_shoff_off + 4]) as u64,
            Class::Elf64 => endian.read_u64(&buf[e_shoff_off..e_shoff_off + 8]),
        };
        let shentsize = endian.read_u16(&buf[e_shentsize_off..e_shentsize_off + 2]) as usize;
        let mut shnum = endian.read_u16(&buf[e_shnum_off..e_shnum_off + 2]) as usize;
        let mut shstrndx = endian.read_u16(&buf[e_shstrndx_off..e_shstrndx_off + 2]) as usize;

        if shoff == 0 && shnum == 0 {
            return Ok(ElfImage { buf, class, endian, machine, entry, shdrs: Vec::new(), shstrndx: 0 });
        }

        let want_entsize = Shdr::size_for(class);
        if shentsize != want_entsize {
            return Err(ElfError::InvalidShdrSize);
        }

        let shoff_usize = shoff as usize;
        let shdr0_end = shoff_usize.checked_add(shentsize).ok_or(ElfError::InvalidShdrTable)?;
        if shdr0_end > buf.len() {
            return Err(ElfError::InvalidShdrTable);
        }

        // e_shnum == 0 with a non-zero e_shoff means the real count lives in
        // sh_size of the null section (extended section count).
        if shnum == 0 {
            let shdr0 = Shdr::parse(class, endian, &buf[shoff_usize..shdr0_end]);
            shnum = shdr0.size as usize;
            if shstrndx == SHN_XINDEX as usize {
                shstrndx = shdr0.link as usize;
            }
        }

        let table_bytes = shnum.checked_mul(shentsize).ok_or(ElfError::InvalidShdrTable)?;
        let table_end = shoff_usize.checked_add(table_bytes).ok_or(ElfError::InvalidShdrTable)?;
        if table_end > buf.len() {
            return Err(ElfError::InvalidShdrTable);
        }

        let mut shdrs = Vec::with_capacity(shnum);
        for i in 0..shnum {
            let start = shoff_usize + i * shentsize;
            shdrs.push(Shdr::parse(class, endian, &buf[start..start + shentsize]));
        }

        if shstrndx != 0 && shstrndx >= shdrs.len() {
            return Err(ElfError::InvalidStrtabIndex);
        }

        Ok(ElfImage { buf, class, endian, machine, entry, shdrs, shstrndx })
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn machine(&self) -> Machine {
        self.machine
    }

    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn shdrs(&self) -> &[Shdr] {
        &self.shdrs
    }

    fn section_file_range(&self, shdr: &Shdr) -> Result<(usize, usize), ElfError> {
        let start = shdr.offset as usize;
        let end = start.checked_add(shdr.size as usize).ok_or(ElfError::InvalidSectionIndex)?;
        if shdr.sh_type != SHT_NOBITS && end > self.buf.len() {
            return Err(ElfError::InvalidSectionIndex);
        }
        Ok((start, end))
    }

    /// Raw bytes backing a section. `SHT_NOBITS` sections occupy no file
    /// bytes and yield an empty slice.
    pub fn section_bytes(&self, shdr: &Shdr) -> Result<&'a [u8], ElfError> {
        if shdr.sh_type == SHT_NOBITS {
            return Ok(&[]);
        }
        let (start, end) = self.section_file_range(shdr)?;
        Ok(&self.buf[start..end])
    }

    fn str_in(&self, strtab: &Shdr, off: u32) -> Result<&'a str, ElfError> {
        if strtab.sh_type != SHT_STRTAB {
            return Err(ElfError::InvalidStrtabIndex);
        }
        let bytes = self.section_bytes(strtab)?;
        let off = off as usize;
        if off >= bytes.len() {
            return Err(ElfError::InvalidString);
        }
        let nul = bytes[off..].iter().position(|&b| b == 0).ok_or(ElfError::InvalidString)?;
        core::str::from_utf8(&bytes[off..off + nul]).map_err(|_| ElfError::InvalidString)
    }

    /// The name of a section, looked up through `e_shstrndx`.
    pub fn section_name(&self, shdr: &Shdr) -> Result<&'a str, ElfError> {
        let strtab = self.shdrs.get(self.shstrndx).ok_or(ElfError::InvalidStrtabIndex)?;
        self.str_in(strtab, shdr.name_off)
    }

    /// The name of a symbol, looked up through the string table linked by
    /// the owning symbol table's `sh_link`.
    pub fn symbol_name(&self, symtab: &Shdr, sym: &Sym) -> Result<&'a str, ElfError> {
        if sym.name_off == 0 {
            return Ok("");
        }
        let strtab = self.shdrs.get(symtab.link as usize).ok_or(ElfError::InvalidStrtabIndex)?;
        self.str_in(strtab, sym.name_off)
    }

    /// All symbols in a `SHT_SYMTAB`/`SHT_DYNSYM` section.
    pub fn symbols(&self, symtab: &Shdr) -> Result<Vec<Sym>, ElfError> {
        let entsize = Sym::size_for(self.class);
        if symtab.entsize as usize != entsize {
            return Err(ElfError::InvalidSymtabEntsize);
        }
        let bytes = self.section_bytes(symtab)?;
        if bytes.len() % entsize != 0 {
            return Err(ElfError::InvalidSymtabEntsize);
        }
        Ok(bytes
            .chunks_exact(entsize)
            .map(|b| Sym::parse(self.class, self.endian, b))
            .collect())
    }

    /// All relocation records in a `SHT_REL`/`SHT_RELA` section.
    pub fn relocations(&self, shdr: &Shdr) -> Result<Vec<Reloc>, ElfError> {
        let has_addend = shdr.sh_type == SHT_RELA;
        if shdr.sh_type != SHT_REL && shdr.sh_type != SHT_RELA {
            return Err(ElfError::InvalidRelocTable);
        }
        let entsize = Reloc::entsize(self.class, has_addend);
        if shdr.entsize as usize != entsize {
            return Err(ElfError::InvalidRelocEntsize);
        }
        let bytes = self.section_bytes(shdr)?;
        if bytes.len() % entsize != 0 {
            return Err(ElfError::InvalidRelocTable);
        }
        Ok(bytes
            .chunks_exact(entsize)
            .map(|b| Reloc::parse(self.class, self.endian, b, has_addend))
            .collect())
    }

    /// Indices of every `SHT_REL`/`SHT_RELA` section, in section-table
    /// order.
    pub fn iter_relocation_sections(&self) -> impl Iterator<Item = usize> + '_ {
        self.shdrs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.sh_type == SHT_REL || s.sh_type == SHT_RELA)
            .map(|(i, _)| i)
    }
}
