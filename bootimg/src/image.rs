// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use elf::types::SHT_NOBITS;

use crate::container;
use crate::error::BuildError;
use crate::layout::{classify_section, compute_layout, SectionClass};
use crate::object::ObjectView;
use crate::reloc::apply_relocations;
use crate::symbols::relocate_symbols;
use crate::target::{TargetDescriptor, TargetId};
use crate::translate::translate;

/// EFI's PE32(+) loader on ARM runs `.reloc` fixups off a fixed-size stack
/// before any heap exists; a `.reloc` table bigger than this breaks that
/// assumption. Mirrors `GRUB_KERNEL_ARM_STACK_SIZE`. ARM/U-Boot's raw
/// relocation table is never loaded this way, so the check only applies to
/// ARM+EFI.
const ARM_STACK_SIZE: u64 = 1024 * 1024;

/// Output of a full build: the kernel image bytes (already container-wrapped
/// for CHRP/Xen/LoongSon targets) and, for relocatable image kinds, the
/// residual relocation table a loader applies after rebasing it.
#[derive(Clone, Debug)]
pub struct BuiltImage {
    pub kernel_image: Vec<u8>,
    pub reloc_table: Vec<u8>,
    pub start_address: u64,
}

/// Runs the full pipeline (§2): parses `input`, lays out the output image,
/// relocates symbols and applies in-object relocations to `input` in place,
/// copies patched section payloads into the freshly allocated output
/// buffer, then translates (C6) and, for container image kinds, wraps (C7)
/// the result.
///
/// `input` is consumed: per §5, the input ELF buffer is owned by the core
/// for the duration of a build and is mutated in place before being
/// discarded.
pub fn build_image(mut input: Vec<u8>, target: &TargetDescriptor) -> Result<BuiltImage, BuildError> {
    log::debug!("building image for target {:?} ({:?})", target.id, target.elf_machine);

    let mut object = ObjectView::read(&input, target)?;
    let (mut layout, map) = compute_layout(&object, target)?;
    log::debug!(
        "layout: kernel_size={:#x} exec_size={:#x} bss_size={:#x}",
        layout.kernel_size,
        layout.exec_size,
        layout.bss_size
    );

    let mut out_img = vec![0u8; layout.kernel_size as usize];

    relocate_symbols(&mut object, target, &map, &mut layout, &mut out_img)?;
    apply_relocations(&object, target, &map, &mut layout, &mut input, &mut out_img)?;

    let is_relocatable = target.is_relocatable_output();
    for (idx, shdr) in object.shdrs.iter().enumerate() {
        if !map.is_placed(idx) {
            continue;
        }
        let class = classify_section(shdr, is_relocatable);
        if class != SectionClass::Text && class != SectionClass::Data {
            continue;
        }
        if shdr.sh_type == SHT_NOBITS {
            continue; // bss: already zero in out_img
        }
        let src_start = shdr.offset as usize;
        let src_end = src_start + shdr.size as usize;
        let src = input.get(src_start..src_end).ok_or(BuildError::RelocationOutOfRange)?;
        let dst_start = map.file_addr(idx) as usize;
        let dst_end = dst_start + shdr.size as usize;
        let dst = out_img.get_mut(dst_start..dst_end).ok_or(BuildError::RelocationOutOfRange)?;
        dst.copy_from_slice(src);
    }

    let reloc_table = translate(&object, target, &map, &layout)?;
    if target.elf_machine == elf::Machine::Arm && target.id == TargetId::Efi && reloc_table.len() as u64 > ARM_STACK_SIZE {
        return Err(BuildError::RelocSectionTooLarge);
    }

    let kernel_image = match target.id {
        TargetId::Chrp | TargetId::Xen | TargetId::LoongsonElf => {
            log::debug!("wrapping kernel image in a firmware container for {:?}", target.id);
            container::wrap(target, &layout, &out_img)
        }
        _ => out_img,
    };

    log::info!("image built, start address {:#x}", layout.start_address);
    Ok(BuiltImage { kernel_image, reloc_table, start_address: layout.start_address })
}
