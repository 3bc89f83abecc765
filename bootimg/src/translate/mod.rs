// SPDX-License-Identifier: MIT OR Apache-2.0

extern crate alloc;

mod pe32;
mod raw;

use alloc::vec::Vec;

use crate::error::BuildError;
use crate::layout::{Layout, SectionAddressMap};
use crate::object::ObjectView;
use crate::target::{TargetDescriptor, TargetId};

const DIR64LSB: u32 = 0x27;
const FPTR64LSB: u32 = 0x47;

/// Which runtime fixup kind, if any, a given `(machine, reloc_type)` pair
/// produces once C5 has already resolved it to a concrete byte patch
/// (§4.5). PC-relative and already-resolved (trampoline/GOT-indirected)
/// relocations carry no runtime fixup at all: the loader never needs to
/// touch them again after rebasing.
fn fixup_kind(machine: elf::Machine, reloc_type: u32) -> Option<pe32::FixupKind> {
    use elf::Machine::*;
    match (machine, reloc_type) {
        (I386, 1) => Some(pe32::FixupKind::HighLow), // R_386_32
        (Arm, 2) => Some(pe32::FixupKind::HighLow),  // R_ARM_ABS32
        (X86_64, 1) => Some(pe32::FixupKind::Dir64), // R_X86_64_64
        (Aarch64, 257) => Some(pe32::FixupKind::Dir64), // R_AARCH64_ABS64
        (Ia64, t) if t == DIR64LSB || t == FPTR64LSB => Some(pe32::FixupKind::Dir64),
        _ => None,
    }
}

/// Relocation translator (C6): produces the bytes the final relocatable
/// image stores as its residual relocation table, or an empty buffer for
/// image kinds that aren't relocated at load time.
pub fn translate(
    object: &ObjectView,
    target: &TargetDescriptor,
    map: &SectionAddressMap,
    layout: &Layout,
) -> Result<Vec<u8>, BuildError> {
    match target.id {
        TargetId::Efi => pe32::build(object, target, map, layout),
        TargetId::UBoot => raw::build(object, target, map),
        _ => Ok(Vec::new()),
    }
}
