// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal little-endian ELF32/ELF64 object builder shared by the
//! end-to-end scenario tests. Mirrors `bootimg::lib`'s own
//! `push_ehdr64`/`push_shdr64` test helpers, generalized to both ELF
//! classes and to symbol/relocation tables.

pub struct Section {
    pub name: &'static str,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub data: Vec<u8>,
    pub nobits_size: u64,
    pub addralign: u64,
}

impl Section {
    pub fn progbits(name: &'static str, flags: u64, addr: u64, data: Vec<u8>) -> Self {
        Section { name, sh_type: 1, flags, addr, data, nobits_size: 0, addralign: 4 }
    }

    pub fn nobits(name: &'static str, flags: u64, addr: u64, size: u64) -> Self {
        Section { name, sh_type: 8, flags, addr, data: Vec::new(), nobits_size: size, addralign: 4 }
    }
}

pub struct SymDef {
    pub name: &'static str,
    pub info: u8,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

pub struct RelocSpec {
    /// Index into `sections` (0-based, before the null/shstrtab/symtab/
    /// strtab sections this builder prepends).
    pub target_section: usize,
    pub has_addend: bool,
    /// (offset, symbol index into `syms` + 1 for the null symbol, type, addend)
    pub entries: Vec<(u64, u32, u32, i64)>,
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_word(buf: &mut Vec<u8>, is64: bool, v: u64) {
    if is64 {
        push_u64(buf, v);
    } else {
        push_u32(buf, v as u32);
    }
}

/// Builds a full little-endian ELF object: the caller's sections, a
/// symtab/strtab built from `syms`, an optional single `SHT_REL`/`SHT_RELA`
/// section, and a trailing section header table.
pub fn build_object(is64: bool, machine: u16, sections: Vec<Section>, syms: Vec<SymDef>, reloc: Option<RelocSpec>) -> Vec<u8> {
    let ehdr_size: usize = if is64 { 64 } else { 52 };
    let shdr_size: usize = if is64 { 64 } else { 40 };
    let sym_size: usize = if is64 { 24 } else { 16 };

    // Section layout: 0 null, 1 .shstrtab, 2 .symtab, 3 .strtab, then the
    // caller's sections, then (optionally) one reloc section.
    let mut shstrtab = vec![0u8];
    let shstrtab_name = push_name(&mut shstrtab, b".shstrtab");
    let symtab_name = push_name(&mut shstrtab, b".symtab");
    let strtab_name = push_name(&mut shstrtab, b".strtab");
    let mut section_name_offs = Vec::new();
    for s in &sections {
        section_name_offs.push(push_name(&mut shstrtab, s.name.as_bytes()));
    }
    let reloc_name = reloc.as_ref().map(|r| {
        let prefix: &[u8] = if r.has_addend { b".rela" } else { b".rel" };
        let mut name = prefix.to_vec();
        name.extend_from_slice(sections[r.target_section].name.as_bytes());
        push_name(&mut shstrtab, &name)
    });

    let mut strtab = vec![0u8];
    let mut sym_name_offs = Vec::new();
    for s in &syms {
        sym_name_offs.push(push_name(&mut strtab, s.name.as_bytes()));
    }

    let mut symtab = Vec::new();
    push_sym(&mut symtab, is64, 0, 0, 0, 0, 0); // null symbol
    for (s, name_off) in syms.iter().zip(&sym_name_offs) {
        push_sym(&mut symtab, is64, *name_off, s.info, s.shndx, s.value, s.size);
    }

    let num_user_sections = sections.len();
    let reloc_entsize: usize = match (&reloc, is64) {
        (Some(r), true) => {
            if r.has_addend {
                24
            } else {
                16
            }
        }
        (Some(r), false) => {
            if r.has_addend {
                12
            } else {
                8
            }
        }
        (None, _) => 0,
    };
    let num_sections = 4 + num_user_sections + usize::from(reloc.is_some());

    let phoff = 0u64;
    let mut buf = Vec::new();
    buf.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
    buf.push(if is64 { 2 } else { 1 });
    buf.push(1); // little endian
    buf.push(1);
    buf.extend_from_slice(&[0u8; 9]);
    push_u16(&mut buf, 2); // e_type ET_EXEC
    push_u16(&mut buf, machine);
    push_u32(&mut buf, 1); // e_version
    push_word(&mut buf, is64, 0); // e_entry
    push_word(&mut buf, is64, phoff); // e_phoff
    push_word(&mut buf, is64, 0); // e_shoff, patched below
    push_u32(&mut buf, 0); // e_flags
    push_u16(&mut buf, ehdr_size as u16);
    push_u16(&mut buf, 0); // e_phentsize
    push_u16(&mut buf, 0); // e_phnum
    push_u16(&mut buf, shdr_size as u16);
    push_u16(&mut buf, num_sections as u16);
    push_u16(&mut buf, 1); // e_shstrndx

    assert_eq!(buf.len(), ehdr_size);

    let mut offsets = Vec::new();
    for s in &sections {
        if s.sh_type == 8 {
            offsets.push(buf.len() as u64); // unused for NOBITS
            continue;
        }
        offsets.push(buf.len() as u64);
        buf.extend_from_slice(&s.data);
    }
    let shstrtab_off = buf.len() as u64;
    buf.extend_from_slice(&shstrtab);
    let symtab_off = buf.len() as u64;
    buf.extend_from_slice(&symtab);
    let strtab_off = buf.len() as u64;
    buf.extend_from_slice(&strtab);

    let reloc_off = reloc.as_ref().map(|r| {
        let off = buf.len() as u64;
        for &(roff, sym, rtype, addend) in &r.entries {
            push_word(&mut buf, is64, roff);
            if is64 {
                let info = ((sym as u64) << 32) | (rtype as u64);
                push_u64(&mut buf, info);
                if r.has_addend {
                    push_u64(&mut buf, addend as u64);
                }
            } else {
                let info = (sym << 8) | (rtype & 0xff);
                push_u32(&mut buf, info);
                if r.has_addend {
                    push_u32(&mut buf, addend as u32);
                }
            }
        }
        off
    });

    let shoff = buf.len() as u64;

    // section header table
    push_shdr(&mut buf, is64, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0); // null
    push_shdr(&mut buf, is64, shstrtab_name, 3, 0, 0, shstrtab_off, shstrtab.len() as u64, 0, 0, 1, 0);
    push_shdr(&mut buf, is64, symtab_name, 2, 0, 0, symtab_off, symtab.len() as u64, 3, 1, 8, sym_size as u64);
    push_shdr(&mut buf, is64, strtab_name, 3, 0, 0, strtab_off, strtab.len() as u64, 0, 0, 1, 0);
    for (i, s) in sections.iter().enumerate() {
        let size = if s.sh_type == 8 { s.nobits_size } else { s.data.len() as u64 };
        push_shdr(&mut buf, is64, section_name_offs[i], s.sh_type, s.flags, s.addr, offsets[i], size, 0, 0, s.addralign, 0);
    }
    if let Some(r) = &reloc {
        let sh_type = if r.has_addend { 4 } else { 9 };
        push_shdr(
            &mut buf,
            is64,
            reloc_name.unwrap(),
            sh_type,
            0,
            0,
            reloc_off.unwrap(),
            (r.entries.len() * reloc_entsize) as u64,
            2,                        // sh_link: symtab section index
            4 + r.target_section as u32, // sh_info: target section index
            if is64 { 8 } else { 4 },
            reloc_entsize as u64,
        );
    }

    // patch e_shoff
    let shoff_field_off = if is64 { 40 } else { 32 };
    let shoff_bytes = if is64 { shoff.to_le_bytes().to_vec() } else { (shoff as u32).to_le_bytes().to_vec() };
    buf[shoff_field_off..shoff_field_off + shoff_bytes.len()].copy_from_slice(&shoff_bytes);

    buf
}

fn push_name(strtab: &mut Vec<u8>, name: &[u8]) -> u32 {
    let off = strtab.len() as u32;
    strtab.extend_from_slice(name);
    strtab.push(0);
    off
}

#[allow(clippy::too_many_arguments)]
fn push_sym(buf: &mut Vec<u8>, is64: bool, name_off: u32, info: u8, shndx: u16, value: u64, size: u64) {
    if is64 {
        push_u32(buf, name_off);
        buf.push(info);
        buf.push(0);
        push_u16(buf, shndx);
        push_u64(buf, value);
        push_u64(buf, size);
    } else {
        push_u32(buf, name_off);
        push_u32(buf, value as u32);
        push_u32(buf, size as u32);
        buf.push(info);
        buf.push(0);
        push_u16(buf, shndx);
    }
}

#[allow(clippy::too_many_arguments)]
fn push_shdr(buf: &mut Vec<u8>, is64: bool, name_off: u32, sh_type: u32, flags: u64, addr: u64, offset: u64, size: u64, link: u32, info: u32, addralign: u64, entsize: u64) {
    push_u32(buf, name_off);
    push_u32(buf, sh_type);
    if is64 {
        push_u64(buf, flags);
        push_u64(buf, addr);
        push_u64(buf, offset);
        push_u64(buf, size);
        push_u32(buf, link);
        push_u32(buf, info);
        push_u64(buf, addralign);
        push_u64(buf, entsize);
    } else {
        push_u32(buf, flags as u32);
        push_u32(buf, addr as u32);
        push_u32(buf, offset as u32);
        push_u32(buf, size as u32);
        push_u32(buf, link);
        push_u32(buf, info);
        push_u32(buf, addralign as u32);
        push_u32(buf, entsize as u32);
    }
}
