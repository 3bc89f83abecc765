// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use elf::types::{st_type, SHT_NOBITS, SHT_PROGBITS, STT_FUNC};
use elf::{Machine, Shdr};

use crate::error::BuildError;
use crate::object::ObjectView;
use crate::target::{TargetDescriptor, TargetId};

fn align_up(v: u64, a: u64) -> u64 {
    if a <= 1 {
        return v;
    }
    (v + a - 1) & !(a - 1)
}

/// Which of the three merged regions a section belongs to (§4.2 steps 2-6,
/// `SPEC_FULL.md` supplemented detail #3). `sh_addralign == 0` is folded
/// into alignment 1 by [`Shdr::effective_align`] rather than here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionClass {
    Text,
    Data,
    Bss,
    Other,
}

pub fn classify_section(shdr: &Shdr, is_relocatable: bool) -> SectionClass {
    if !shdr.is_alloc() {
        return SectionClass::Other;
    }
    let progbits_or_relocatable = shdr.sh_type == SHT_PROGBITS || is_relocatable;
    if shdr.flags.contains(elf::types::ShFlags::EXECINSTR) {
        if progbits_or_relocatable {
            return SectionClass::Text;
        }
        return SectionClass::Other;
    }
    if shdr.sh_type == SHT_NOBITS {
        if is_relocatable {
            return SectionClass::Bss;
        }
        return SectionClass::Other;
    }
    if progbits_or_relocatable {
        return SectionClass::Data;
    }
    SectionClass::Other
}

/// Dense section-index -> address map. File addresses are offsets inside
/// the output image; the virtual address adds the target's
/// `vaddr_offset` (§3 `SectionAddressMap`).
#[derive(Clone, Debug)]
pub struct SectionAddressMap {
    file_addr: Vec<u64>,
    present: Vec<bool>,
    vaddr_offset: u64,
}

impl SectionAddressMap {
    fn new(count: usize, vaddr_offset: u64) -> Self {
        SectionAddressMap { file_addr: vec![0; count], present: vec![false; count], vaddr_offset }
    }

    fn set(&mut self, idx: usize, addr: u64) {
        self.file_addr[idx] = addr;
        self.present[idx] = true;
    }

    pub fn is_placed(&self, idx: usize) -> bool {
        self.present.get(idx).copied().unwrap_or(false)
    }

    pub fn file_addr(&self, idx: usize) -> u64 {
        self.file_addr.get(idx).copied().unwrap_or(0)
    }

    pub fn vaddr(&self, idx: usize) -> u64 {
        self.file_addr(idx) + self.vaddr_offset
    }
}

/// Output of the section layouter (C3), populated further by C4/C5.
#[derive(Clone, Debug, Default)]
pub struct Layout {
    pub kernel_size: u64,
    pub exec_size: u64,
    pub bss_start: u64,
    pub bss_size: u64,
    pub end: u64,
    pub align: u64,
    pub tramp_off: u64,
    pub tramp_size: u64,
    pub got_off: u64,
    pub got_size: u64,
    pub ia64jmp_off: u64,
    pub ia64jmpnum: u64,
    pub ia64_got_off: u64,
    pub start_address: u64,
    pub reloc_section: Vec<u8>,
}

/// Worst-case trampoline byte count for every interworking ARM/Thumb
/// branch relocation referencing `symbols` (§4.2 step 5). Mirrors the
/// corresponding prescan GRUB performs before materializing any branch so
/// that C5 can never overrun the reserved region.
fn arm_trampoline_bytes(object: &ObjectView) -> u64 {
    const R_ARM_THM_CALL: u32 = 10;
    const R_ARM_CALL: u32 = 28;
    const R_ARM_JUMP24: u32 = 29;
    const R_ARM_THM_JUMP24: u32 = 30;
    const R_ARM_THM_JUMP19: u32 = 51;

    let mut bytes = 0u64;
    for rs in &object.relocation_sections {
        for reloc in &rs.relocs {
            match reloc.r#type {
                R_ARM_THM_CALL | R_ARM_THM_JUMP24 | R_ARM_THM_JUMP19 => {
                    if let Some(sym) = object.symbols.get(reloc.sym as usize) {
                        if sym.value & 1 == 0 {
                            bytes += 8;
                        }
                    }
                }
                R_ARM_CALL | R_ARM_JUMP24 => {
                    if let Some(sym) = object.symbols.get(reloc.sym as usize) {
                        if sym.value & 1 != 0 {
                            bytes += 16;
                        }
                    }
                }
                _ => {}
            }
        }
    }
    bytes
}

const IA64_LTOFF22: u32 = 0x32;
const IA64_LTOFF22X: u32 = 0x86;
const IA64_LTOFF_FPTR22: u32 = 0x52;
const IA64_PCREL21B: u32 = 0x49;

/// Worst-case IA-64 jumper/GOT/trampoline reservation, folded into the
/// layout pass as explicit prescans (`SPEC_FULL.md` supplemented detail
/// #1) rather than computed lazily by C5.
fn ia64_reservations(object: &ObjectView) -> (u64, u64, u64) {
    let mut jumpers = 0u64;
    for sym in &object.symbols {
        if st_type(sym.info) == STT_FUNC
            && sym.shndx != elf::types::SHN_UNDEF
            && sym.shndx != elf::types::SHN_ABS
        {
            jumpers += 1;
        }
    }

    let mut got_slots = 0u64;
    let mut tramp_slots = 0u64;
    for rs in &object.relocation_sections {
        for reloc in &rs.relocs {
            match reloc.r#type {
                IA64_LTOFF22 | IA64_LTOFF22X | IA64_LTOFF_FPTR22 => got_slots += 1,
                IA64_PCREL21B => tramp_slots += 1,
                _ => {}
            }
        }
    }

    (tramp_slots * 16, jumpers, got_slots * 8)
}

/// Section layouter (C3): computes the `Layout` and `SectionAddressMap`
/// for `object` under `target`. `object.symbols` is the *raw*,
/// un-relocated symbol table — the ARM and IA-64 prescans need to inspect
/// symbol values as the linker left them, before C4 rebases anything.
pub fn compute_layout(
    object: &ObjectView,
    target: &TargetDescriptor,
) -> Result<(Layout, SectionAddressMap), BuildError> {
    let is_relocatable = target.is_relocatable_output();
    let shdrs = &object.shdrs;
    let mut map = SectionAddressMap::new(shdrs.len(), target.vaddr_offset);
    let mut layout = Layout {
        align: if target.elf_machine == Machine::Aarch64 { 4096 } else { 1 },
        ..Default::default()
    };

    for shdr in shdrs {
        if shdr.is_alloc() {
            layout.align = layout.align.max(shdr.effective_align());
        }
    }

    let mut kernel_size = 0u64;

    // Step 2: text pass.
    for (idx, shdr) in shdrs.iter().enumerate() {
        if classify_section(shdr, is_relocatable) != SectionClass::Text {
            continue;
        }
        kernel_size = align_up(kernel_size, shdr.effective_align());
        if !is_relocatable && shdr.addr != target.link_addr + kernel_size {
            return Err(BuildError::MiscompiledStartAddress {
                expected: target.link_addr + kernel_size,
                actual: shdr.addr,
            });
        }
        map.set(idx, kernel_size);
        kernel_size += shdr.size;
    }
    // Step 3.
    kernel_size = align_up(kernel_size, target.section_align);
    layout.exec_size = kernel_size;

    // Step 4: data pass.
    for (idx, shdr) in shdrs.iter().enumerate() {
        if classify_section(shdr, is_relocatable) != SectionClass::Data {
            continue;
        }
        kernel_size = align_up(kernel_size, shdr.effective_align());
        if !is_relocatable && shdr.addr != target.link_addr + kernel_size {
            return Err(BuildError::MiscompiledStartAddress {
                expected: target.link_addr + kernel_size,
                actual: shdr.addr,
            });
        }
        map.set(idx, kernel_size);
        kernel_size += shdr.size;
    }

    // Step 5: ARM trampoline reservation.
    if target.elf_machine == Machine::Arm {
        kernel_size = align_up(kernel_size, 16);
        layout.tramp_off = kernel_size;
        layout.tramp_size = arm_trampoline_bytes(object);
        kernel_size += layout.tramp_size;
    }

    // Step 6: bss pass (address assignment only happens on relocatable
    // targets, per the data-model invariant on `is_bss_section`).
    layout.bss_start = kernel_size;
    if is_relocatable {
        for (idx, shdr) in shdrs.iter().enumerate() {
            if classify_section(shdr, is_relocatable) != SectionClass::Bss {
                continue;
            }
            kernel_size = align_up(kernel_size, shdr.effective_align());
            map.set(idx, kernel_size);
            kernel_size += shdr.size;
        }
    } else {
        // Non-relocatable targets (CHRP/Xen/Coreboot/LoongSon) never pack
        // bss into the output file — `classify_section` leaves it `Other`
        // — but a symbol can still be defined inside one, and C4 needs its
        // address. The object was linked at a fixed address, so the
        // section's final file offset is already known the same way a
        // placed text/data section's is: as the offset from `link_addr`.
        for (idx, shdr) in shdrs.iter().enumerate() {
            if !shdr.is_alloc() || shdr.sh_type != SHT_NOBITS {
                continue;
            }
            map.set(idx, shdr.addr.saturating_sub(target.link_addr));
        }
    }
    kernel_size = align_up(kernel_size, target.section_align);
    layout.end = kernel_size;
    layout.bss_size = layout.end.saturating_sub(layout.bss_start);

    // Step 7: materialize bss in the file, except for U-Boot (its loader
    // zeroes bss itself; EFI needs it materialized to route around a
    // loader bug, per the original implementation).
    let materialize_bss = is_relocatable && target.id != TargetId::UBoot;
    if materialize_bss {
        kernel_size = layout.end;
    }

    // Step 8: module alignment for image kinds where modules sit directly
    // after the kernel image.
    kernel_size = align_up(kernel_size, target.mod_align);

    // Step 9: IA-64 reservations.
    if target.elf_machine == Machine::Ia64 {
        let (tramp_size, jumpers, got_size) = ia64_reservations(object);
        layout.tramp_off = kernel_size;
        layout.tramp_size = tramp_size;
        kernel_size += tramp_size;

        layout.ia64jmp_off = kernel_size;
        layout.ia64jmpnum = jumpers;
        kernel_size += jumpers * 16;

        layout.ia64_got_off = kernel_size;
        layout.got_off = kernel_size;
        layout.got_size = got_size;
        kernel_size += got_size;
    }

    layout.kernel_size = kernel_size;

    Ok((layout, map))
}
