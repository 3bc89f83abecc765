// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core of a bootloader image builder: lays out an object's sections,
//! resolves its symbols and relocations against a chosen boot target, and
//! emits either a relocatable kernel image plus a residual fixup table
//! (EFI, U-Boot) or a statically linked image wrapped in a firmware-specific
//! ELF envelope (CHRP, Xen, Coreboot, LoongSon). See `SPEC_FULL.md`.
//!
//! This crate does not drive a CLI, compress or pack modules, or perform
//! any host file I/O — callers hand it an in-memory ELF object and a
//! [`TargetDescriptor`] and get an in-memory image back.

#![no_std]

extern crate alloc;

mod container;
mod error;
mod image;
mod layout;
mod object;
mod reloc;
mod symbols;
mod target;
mod translate;

pub use error::{BuildError, BuildErrorFull};
pub use image::{build_image, BuiltImage};
pub use layout::{Layout, SectionAddressMap, SectionClass};
pub use object::ObjectView;
pub use target::{
    TargetDescriptor, TargetId, CHRP_POWERPC, COREBOOT_I386, EFI_AARCH64, EFI_ARM, EFI_I386, EFI_IA64, EFI_X86_64,
    LOONGSON_ELF, UBOOT_ARM, XEN_X86_64,
};

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn push_ehdr64(buf: &mut Vec<u8>, machine: u16, shoff: u64, shnum: u16, shstrndx: u16) {
        buf.extend_from_slice(&elf::types::EI_NMAGIC);
        buf.push(2); // ELFCLASS64
        buf.push(1); // little endian
        buf.push(1);
        buf.extend_from_slice(&[0u8; 9]);
        buf.extend_from_slice(&2u16.to_le_bytes()); // e_type
        buf.extend_from_slice(&machine.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // e_version
        buf.extend_from_slice(&0u64.to_le_bytes()); // e_entry
        buf.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
        buf.extend_from_slice(&shoff.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        buf.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
        buf.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
        buf.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        buf.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
        buf.extend_from_slice(&shnum.to_le_bytes());
        buf.extend_from_slice(&shstrndx.to_le_bytes());
    }

    fn push_shdr64(buf: &mut Vec<u8>, name: u32, sh_type: u32, flags: u64, addr: u64, offset: u64, size: u64, link: u32, info: u32, addralign: u64, entsize: u64) {
        buf.extend_from_slice(&name.to_le_bytes());
        buf.extend_from_slice(&sh_type.to_le_bytes());
        buf.extend_from_slice(&flags.to_le_bytes());
        buf.extend_from_slice(&addr.to_le_bytes());
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&link.to_le_bytes());
        buf.extend_from_slice(&info.to_le_bytes());
        buf.extend_from_slice(&addralign.to_le_bytes());
        buf.extend_from_slice(&entsize.to_le_bytes());
    }

    /// Builds a minimal x86-64 object: `.text` (one `mov eax, imm32` using
    /// an `R_X86_64_32` we don't exercise), a defined `_start` symbol, an
    /// undefined `__bss_start` reference, and no relocations, then runs it
    /// through the full EFI x86-64 pipeline.
    #[test]
    fn build_image_minimal_efi_x86_64() {
        let text: &[u8] = &[0x90, 0x90, 0x90, 0x90, 0xc3, 0, 0, 0];

        let shstrtab: &[u8] = b"\0.shstrtab\0.text\0.symtab\0.strtab\0";
        let strtab: &[u8] = b"\0_start\0";

        // symbol table: one STT_FUNC _start defined in .text at offset 0.
        let mut symtab = Vec::new();
        // null symbol
        symtab.extend_from_slice(&[0u8; 24]);
        // _start
        symtab.extend_from_slice(&1u32.to_le_bytes()); // st_name
        symtab.push(0x12); // STB_GLOBAL<<4 | STT_FUNC
        symtab.push(0);
        symtab.extend_from_slice(&2u16.to_le_bytes()); // shndx = .text (section index 2)
        symtab.extend_from_slice(&0u64.to_le_bytes()); // st_value
        symtab.extend_from_slice(&0u64.to_le_bytes()); // st_size

        let mut buf = Vec::new();
        push_ehdr64(&mut buf, elf::Machine::EM_X86_64, 0, 5, 1);
        let ehdr_len = buf.len();

        let text_off = ehdr_len as u64;
        let shstrtab_off = text_off + text.len() as u64;
        let symtab_off = shstrtab_off + shstrtab.len() as u64;
        let strtab_off = symtab_off + symtab.len() as u64;
        let shoff = strtab_off + strtab.len() as u64;

        buf.extend_from_slice(text);
        buf.extend_from_slice(shstrtab);
        buf.extend_from_slice(&symtab);
        buf.extend_from_slice(strtab);

        // section header table, 5 entries: null, .shstrtab, .text, .symtab, .strtab
        push_shdr64(&mut buf, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0);
        push_shdr64(&mut buf, 1, 3, 0, 0, shstrtab_off, shstrtab.len() as u64, 0, 0, 1, 0);
        push_shdr64(&mut buf, 11, 1, 0x6, 0, text_off, text.len() as u64, 0, 0, 16, 0);
        push_shdr64(&mut buf, 17, 2, 0, 0, symtab_off, symtab.len() as u64, 4, 1, 8, 24);
        push_shdr64(&mut buf, 25, 3, 0, 0, strtab_off, strtab.len() as u64, 0, 0, 1, 0);

        assert_eq!(buf.len() as u64, shoff + 5 * 64);

        let built = build_image(buf, &EFI_X86_64).expect("build succeeds");
        assert!(!built.kernel_image.is_empty());
        // No relocation sections at all: the PE32 fixup table is empty.
        assert!(built.reloc_table.is_empty());
        assert_eq!(built.start_address, 0);
    }

    #[test]
    fn build_image_rejects_machine_mismatch() {
        let mut buf = Vec::new();
        push_ehdr64(&mut buf, elf::Machine::EM_ARM, 0, 1, 0);
        push_shdr64(&mut buf, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0);
        let result = build_image(buf, &EFI_X86_64);
        assert!(result.is_err());
    }
}
