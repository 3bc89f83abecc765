// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

use alloc::vec::Vec;

use elf::types::EI_NMAGIC;
use elf::{Class, Endian};

use crate::layout::Layout;
use crate::target::{TargetDescriptor, TargetId};

const ET_EXEC: u16 = 2;
const PT_LOAD: u32 = 1;
const PT_NOTE: u32 = 4;
const PT_GNU_STACK: u32 = 0x6474_e551;
const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;

const SHT_NULL: u32 = 0;
const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_NOTE: u32 = 7;
const SHF_ALLOC: u64 = 0x2;
const SHF_EXECINSTR: u64 = 0x4;

fn push_u16(out: &mut Vec<u8>, endian: Endian, v: u16) {
    let mut b = [0u8; 2];
    endian.write_u16(&mut b, v);
    out.extend_from_slice(&b);
}

fn push_u32(out: &mut Vec<u8>, endian: Endian, v: u32) {
    let mut b = [0u8; 4];
    endian.write_u32(&mut b, v);
    out.extend_from_slice(&b);
}

fn push_u64(out: &mut Vec<u8>, endian: Endian, v: u64) {
    let mut b = [0u8; 8];
    endian.write_u64(&mut b, v);
    out.extend_from_slice(&b);
}

fn push_word(out: &mut Vec<u8>, class: Class, endian: Endian, v: u64) {
    match class {
        Class::Elf32 => push_u32(out, endian, v as u32),
        Class::Elf64 => push_u64(out, endian, v),
    }
}

fn align_up(v: usize, a: usize) -> usize {
    (v + a - 1) & !(a - 1)
}

/// One ELF note: `namesz`/`descsz`/`type` followed by the name and
/// descriptor, each padded to 4-byte alignment (`§4.6`).
fn push_note(out: &mut Vec<u8>, endian: Endian, name: &[u8], note_type: u32, desc: &[u8]) {
    let namesz = (name.len() + 1) as u32;
    push_u32(out, endian, namesz);
    push_u32(out, endian, desc.len() as u32);
    push_u32(out, endian, note_type);
    out.extend_from_slice(name);
    out.push(0);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out.extend_from_slice(desc);
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// IEEE1275 (Open Firmware) "PowerPC" note CHRP's loader looks for.
fn chrp_note(endian: Endian) -> Vec<u8> {
    let mut desc = Vec::new();
    for word in [0xffff_ffffu32, 0x00c0_0000, 0xffff_ffff, 0xffff_ffff, 0xffff_ffff, 0x0000_4000] {
        push_u32(&mut desc, endian, word);
    }
    let mut out = Vec::new();
    push_note(&mut out, endian, b"PowerPC", 0x1275, &desc);
    out
}

/// The six Xen PVH notes grub writes into its ELF notes section, naming
/// the loader and guest entry point (`§4.6`).
fn xen_notes(target: &TargetDescriptor, layout: &Layout) -> Vec<u8> {
    const XEN_ELFNOTE_GUEST_OS: u32 = 6;
    const XEN_ELFNOTE_LOADER: u32 = 8;
    const XEN_ELFNOTE_XEN_VERSION: u32 = 5;
    const XEN_ELFNOTE_ENTRY: u32 = 1;
    const XEN_ELFNOTE_VIRT_BASE: u32 = 3;
    const XEN_ELFNOTE_PAE_MODE: u32 = 9;

    let endian = target.endianness;
    let mut out = Vec::new();
    push_note(&mut out, endian, b"Xen", XEN_ELFNOTE_GUEST_OS, b"GRUB\0");
    push_note(&mut out, endian, b"Xen", XEN_ELFNOTE_LOADER, b"generic\0");
    push_note(&mut out, endian, b"Xen", XEN_ELFNOTE_XEN_VERSION, b"xen-3.0\0");

    let mut entry_desc = Vec::new();
    push_u64(&mut entry_desc, endian, layout.start_address);
    push_note(&mut out, endian, b"Xen", XEN_ELFNOTE_ENTRY, &entry_desc);

    let mut virt_base_desc = Vec::new();
    push_u64(&mut virt_base_desc, endian, target.link_addr);
    push_note(&mut out, endian, b"Xen", XEN_ELFNOTE_VIRT_BASE, &virt_base_desc);

    if target.elf_machine == elf::Machine::I386 {
        push_note(&mut out, endian, b"Xen", XEN_ELFNOTE_PAE_MODE, b"yes,bimodal\0");
    }
    out
}

/// Section-header-string-table bytes plus the name offsets of `.shstrtab`,
/// `.text` and `mods` within it (`.xen`'s offset too, for Xen targets).
fn build_shstrtab(has_xen: bool) -> (Vec<u8>, u32, u32, u32, u32) {
    let mut s = Vec::new();
    s.push(0); // name offset 0: the empty name, used by the null section
    let shstrtab_off = s.len() as u32;
    s.extend_from_slice(b".shstrtab\0");
    let text_off = s.len() as u32;
    s.extend_from_slice(b".text\0");
    let mods_off = s.len() as u32;
    s.extend_from_slice(b"mods\0");
    let xen_off = if has_xen {
        let off = s.len() as u32;
        s.extend_from_slice(b".xen\0");
        off
    } else {
        0
    };
    (s, shstrtab_off, text_off, mods_off, xen_off)
}

/// Container wrapper (C7): wraps an already-built kernel image in an outer
/// ELF envelope carrying whatever notes the firmware/hypervisor expects.
/// Image kinds with no wrapper (EFI, U-Boot, Coreboot) never call this —
/// their kernel image from C3-C6 is itself the final output.
pub fn wrap(target: &TargetDescriptor, layout: &Layout, kernel_image: &[u8]) -> Vec<u8> {
    let class = target.elf_class;
    let endian = target.endianness;
    let addr_size = class.addr_size();

    let notes = match target.id {
        TargetId::Chrp => chrp_note(endian),
        TargetId::Xen => xen_notes(target, layout),
        _ => Vec::new(),
    };
    let has_xen = target.id == TargetId::Xen;

    let ehdr_size = if addr_size == 4 { 52 } else { 64 };
    let phdr_size = if addr_size == 4 { 32 } else { 56 };
    let shdr_size = if addr_size == 4 { 40 } else { 64 };
    let num_phdrs = 2 + usize::from(!notes.is_empty());
    let num_shdrs = 4 + usize::from(has_xen);

    let phoff = ehdr_size;
    let notes_off = align_up(phoff + num_phdrs * phdr_size, 4);
    let kernel_off = align_up(notes_off + notes.len(), 8);

    let (shstrtab, shstrtab_name_off, text_name_off, mods_name_off, xen_name_off) = build_shstrtab(has_xen);
    let shstrtab_off = align_up(kernel_off + kernel_image.len(), 4);
    let shoff = align_up(shstrtab_off + shstrtab.len(), addr_size);
    let total_len = shoff + num_shdrs * shdr_size;

    let mut out = Vec::with_capacity(total_len);

    // e_ident
    out.extend_from_slice(&EI_NMAGIC);
    out.push(if addr_size == 4 { 1 } else { 2 });
    out.push(if endian == Endian::Little { 1 } else { 2 });
    out.push(1); // EI_VERSION
    out.extend_from_slice(&[0u8; 9]); // EI_OSABI, EI_ABIVERSION, padding
    push_u16(&mut out, endian, ET_EXEC);
    push_u16(&mut out, endian, elf_machine_code(target));
    push_u32(&mut out, endian, 1); // e_version
    push_word(&mut out, class, endian, layout.start_address);
    push_word(&mut out, class, endian, phoff as u64);
    push_word(&mut out, class, endian, shoff as u64);
    push_u32(&mut out, endian, 0); // e_flags
    push_u16(&mut out, endian, ehdr_size as u16);
    push_u16(&mut out, endian, phdr_size as u16);
    push_u16(&mut out, endian, num_phdrs as u16);
    push_u16(&mut out, endian, shdr_size as u16);
    push_u16(&mut out, endian, num_shdrs as u16);
    push_u16(&mut out, endian, 1); // e_shstrndx: .shstrtab is always section 1
    debug_assert_eq!(out.len(), ehdr_size);

    let load_filesz = kernel_off + kernel_image.len();
    let load_memsz = load_filesz + layout.bss_size as usize;
    push_phdr(&mut out, class, endian, PT_LOAD, PF_R | PF_W | PF_X, 0, target.link_addr, load_filesz, load_memsz, target.section_align);

    if !notes.is_empty() {
        push_phdr(
            &mut out,
            class,
            endian,
            PT_NOTE,
            PF_R,
            notes_off,
            target.link_addr + notes_off as u64,
            notes.len(),
            notes.len(),
            4,
        );
    }

    push_phdr(&mut out, class, endian, PT_GNU_STACK, PF_R | PF_W, 0, 0, 0, 0, 1);
    debug_assert_eq!(out.len(), phoff + num_phdrs * phdr_size);

    out.resize(notes_off, 0);
    out.extend_from_slice(&notes);
    out.resize(kernel_off, 0);
    out.extend_from_slice(kernel_image);
    out.resize(shstrtab_off as usize, 0);
    out.extend_from_slice(&shstrtab);
    out.resize(shoff, 0);

    // Section headers (§4.6): null, `.shstrtab`, `.text`, `mods`, plus
    // `.xen` for Xen, describing the same PT_NOTE bytes the Xen program
    // header already points at.
    push_shdr(&mut out, class, endian, 0, SHT_NULL, 0, 0, 0, 0, 0, 0, 0, 0);
    push_shdr(&mut out, class, endian, shstrtab_name_off, SHT_STRTAB, 0, 0, shstrtab_off as u64, shstrtab.len() as u64, 0, 0, 1, 0);
    push_shdr(
        &mut out,
        class,
        endian,
        text_name_off,
        SHT_PROGBITS,
        SHF_ALLOC | SHF_EXECINSTR,
        target.link_addr,
        kernel_off as u64,
        kernel_image.len() as u64,
        0,
        0,
        target.section_align,
        0,
    );
    push_shdr(
        &mut out,
        class,
        endian,
        mods_name_off,
        SHT_PROGBITS,
        SHF_ALLOC,
        target.link_addr + kernel_image.len() as u64,
        kernel_off as u64 + kernel_image.len() as u64,
        0,
        0,
        0,
        1,
        0,
    );
    if has_xen {
        push_shdr(
            &mut out,
            class,
            endian,
            xen_name_off,
            SHT_NOTE,
            SHF_ALLOC,
            target.link_addr + notes_off as u64,
            notes_off as u64,
            notes.len() as u64,
            0,
            0,
            4,
            0,
        );
    }
    debug_assert_eq!(out.len(), total_len);

    out
}

#[allow(clippy::too_many_arguments)]
fn push_phdr(
    out: &mut Vec<u8>,
    class: Class,
    endian: Endian,
    p_type: u32,
    p_flags: u32,
    p_offset: usize,
    p_vaddr: u64,
    p_filesz: usize,
    p_memsz: usize,
    p_align: u64,
) {
    match class {
        Class::Elf32 => {
            push_u32(out, endian, p_type);
            push_word(out, class, endian, p_offset as u64);
            push_word(out, class, endian, p_vaddr);
            push_word(out, class, endian, p_vaddr);
            push_word(out, class, endian, p_filesz as u64);
            push_word(out, class, endian, p_memsz as u64);
            push_u32(out, endian, p_flags);
            push_word(out, class, endian, p_align);
        }
        Class::Elf64 => {
            push_u32(out, endian, p_type);
            push_u32(out, endian, p_flags);
            push_word(out, class, endian, p_offset as u64);
            push_word(out, class, endian, p_vaddr);
            push_word(out, class, endian, p_vaddr);
            push_word(out, class, endian, p_filesz as u64);
            push_word(out, class, endian, p_memsz as u64);
            push_word(out, class, endian, p_align);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn push_shdr(
    out: &mut Vec<u8>,
    class: Class,
    endian: Endian,
    name_off: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
) {
    push_u32(out, endian, name_off);
    push_u32(out, endian, sh_type);
    match class {
        Class::Elf32 => {
            push_u32(out, endian, flags as u32);
            push_u32(out, endian, addr as u32);
            push_u32(out, endian, offset as u32);
            push_u32(out, endian, size as u32);
            push_u32(out, endian, link);
            push_u32(out, endian, info);
            push_u32(out, endian, addralign as u32);
            push_u32(out, endian, entsize as u32);
        }
        Class::Elf64 => {
            push_u64(out, endian, flags);
            push_u64(out, endian, addr);
            push_u64(out, endian, offset);
            push_u64(out, endian, size);
            push_u32(out, endian, link);
            push_u32(out, endian, info);
            push_u64(out, endian, addralign);
            push_u64(out, endian, entsize);
        }
    }
}

fn elf_machine_code(target: &TargetDescriptor) -> u16 {
    match target.elf_machine {
        elf::Machine::I386 => elf::Machine::EM_386,
        elf::Machine::X86_64 => elf::Machine::EM_X86_64,
        elf::Machine::Arm => elf::Machine::EM_ARM,
        elf::Machine::Aarch64 => elf::Machine::EM_AARCH64,
        elf::Machine::Ia64 => elf::Machine::EM_IA_64,
        elf::Machine::Other(m) => m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::XEN_X86_64;

    /// S6: the Xen wrapper carries exactly one `PT_NOTE` with six sub-notes
    /// (`GUEST_OS`, `LOADER`, `XEN_VERSION`, `ENTRY`, `VIRT_BASE`,
    /// `PAE_MODE`), and the PAE note is present iff the target is i386 —
    /// x86-64 carries five, since `XEN_ELFNOTE_PAE_MODE` is i386-only.
    #[test]
    fn xen_wrapper_note_count() {
        let layout = Layout { start_address: 0x1000, ..Default::default() };
        let notes = xen_notes(&XEN_X86_64, &layout);

        let mut count = 0;
        let mut off = 0;
        while off < notes.len() {
            let namesz = u32::from_le_bytes(notes[off..off + 4].try_into().unwrap()) as usize;
            let descsz = u32::from_le_bytes(notes[off + 4..off + 8].try_into().unwrap()) as usize;
            let name_pad = (4 - namesz % 4) % 4;
            let desc_pad = (4 - descsz % 4) % 4;
            off += 12 + namesz + name_pad + descsz + desc_pad;
            count += 1;
        }
        assert_eq!(count, 5, "x86-64 Xen carries no PAE_MODE note");
        assert_eq!(off, notes.len());
    }

    #[test]
    fn xen_wrapper_i386_adds_pae_note() {
        let i386_xen = TargetDescriptor { elf_machine: elf::Machine::I386, ..XEN_X86_64 };
        let layout = Layout { start_address: 0x1000, ..Default::default() };
        let notes = xen_notes(&i386_xen, &layout);

        let mut count = 0;
        let mut off = 0;
        while off < notes.len() {
            let namesz = u32::from_le_bytes(notes[off..off + 4].try_into().unwrap()) as usize;
            let descsz = u32::from_le_bytes(notes[off + 4..off + 8].try_into().unwrap()) as usize;
            let name_pad = (4 - namesz % 4) % 4;
            let desc_pad = (4 - descsz % 4) % 4;
            off += 12 + namesz + name_pad + descsz + desc_pad;
            count += 1;
        }
        assert_eq!(count, 6, "i386 Xen carries a PAE_MODE note");
    }

    #[test]
    fn xen_wrapper_has_single_pt_note() {
        let layout = Layout { start_address: 0x1000, ..Default::default() };
        let image = wrap(&XEN_X86_64, &layout, &[0x90, 0x90]);
        // e_phnum lives at byte 56 for ELF64.
        let phnum = u16::from_le_bytes(image[56..58].try_into().unwrap());
        assert_eq!(phnum, 3); // PT_LOAD, PT_NOTE, PT_GNU_STACK
    }

    /// S6: the Xen wrapper's section header table carries five entries
    /// (null, `.shstrtab`, `.text`, `mods`, `.xen`), with `.shstrtab` at
    /// index 1 and a non-zero `e_shoff`.
    #[test]
    fn xen_wrapper_has_five_section_headers() {
        let layout = Layout { start_address: 0x1000, ..Default::default() };
        let image = wrap(&XEN_X86_64, &layout, &[0x90, 0x90]);
        // e_shoff(8)/e_shentsize(2)/e_shnum(2)/e_shstrndx(2) live at bytes
        // 40/58/60/62 for ELF64.
        let shoff = u64::from_le_bytes(image[40..48].try_into().unwrap());
        let shentsize = u16::from_le_bytes(image[58..60].try_into().unwrap());
        let shnum = u16::from_le_bytes(image[60..62].try_into().unwrap());
        let shstrndx = u16::from_le_bytes(image[62..64].try_into().unwrap());
        assert_ne!(shoff, 0);
        assert_eq!(shentsize, 64);
        assert_eq!(shnum, 5);
        assert_eq!(shstrndx, 1);
        assert_eq!(image.len(), shoff as usize + shnum as usize * shentsize as usize);
    }

    /// A non-Xen wrapper (CHRP) carries four section headers: no `.xen`.
    #[test]
    fn chrp_wrapper_has_four_section_headers() {
        use crate::target::CHRP_POWERPC;
        let layout = Layout { start_address: 0x4000, ..Default::default() };
        let image = wrap(&CHRP_POWERPC, &layout, &[0x4e, 0x80, 0x00, 0x20]);
        // ELF32: e_shentsize/e_shnum/e_shstrndx live at bytes 46/48/50.
        let shnum = u16::from_le_bytes(image[48..50].try_into().unwrap());
        assert_eq!(shnum, 4);
    }
}
