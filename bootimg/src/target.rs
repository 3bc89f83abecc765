// SPDX-License-Identifier: MIT OR Apache-2.0

use elf::{Class, Endian, Machine};

/// Which firmware/hardware environment the image is being built for.
///
/// Only EFI, U-Boot, Coreboot and Xen carry a custom relocation-emission
/// path through C5/C6 in this crate; CHRP, LoongSon and the SPARC64 image
/// kinds are container-wrapper-only (C7) — their relocation architectures
/// (PowerPC, MIPS, SPARC) fall outside the enumerated set this core
/// implements (spec Non-goals), so the address relocator for them simply
/// never runs (their objects carry no REL/RELA sections that reach C5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetId {
    Efi,
    UBoot,
    Coreboot,
    Xen,
    Chrp,
    LoongsonElf,
    Sparc64Aout,
    Sparc64Raw,
    Sparc64Cdcore,
}

/// Immutable per-target constants, selected once per build and threaded
/// through every component (C1). This is the entirety of this crate's
/// configuration surface: no environment variables, CLI flags or persisted
/// state are part of the core contract (§6).
#[derive(Clone, Copy, Debug)]
pub struct TargetDescriptor {
    pub id: TargetId,
    pub elf_class: Class,
    pub endianness: Endian,
    pub elf_machine: Machine,
    pub pointer_size: u32,
    pub link_addr: u64,
    pub vaddr_offset: u64,
    pub link_align: u64,
    pub section_align: u64,
    pub mod_align: u64,
    pub mod_gap: u64,
}

impl TargetDescriptor {
    /// `id ∈ {EFI, UBOOT}` are the image kinds whose loader rebases the
    /// image at load time and therefore need residual relocations
    /// translated by C6, rather than being pre-linked to a fixed address.
    pub fn is_relocatable_output(&self) -> bool {
        matches!(self.id, TargetId::Efi | TargetId::UBoot)
    }
}

pub const EFI_X86_64: TargetDescriptor = TargetDescriptor {
    id: TargetId::Efi,
    elf_class: Class::Elf64,
    endianness: Endian::Little,
    elf_machine: Machine::X86_64,
    pointer_size: 8,
    link_addr: 0,
    vaddr_offset: 0,
    link_align: 4096,
    section_align: 4096,
    mod_align: 4096,
    mod_gap: 0,
};

pub const EFI_I386: TargetDescriptor = TargetDescriptor {
    id: TargetId::Efi,
    elf_class: Class::Elf32,
    endianness: Endian::Little,
    elf_machine: Machine::I386,
    pointer_size: 4,
    link_addr: 0,
    vaddr_offset: 0,
    link_align: 4096,
    section_align: 4096,
    mod_align: 4096,
    mod_gap: 0,
};

pub const EFI_ARM: TargetDescriptor = TargetDescriptor {
    id: TargetId::Efi,
    elf_class: Class::Elf32,
    endianness: Endian::Little,
    elf_machine: Machine::Arm,
    pointer_size: 4,
    link_addr: 0,
    vaddr_offset: 0,
    link_align: 4096,
    section_align: 4096,
    mod_align: 4096,
    mod_gap: 0,
};

pub const EFI_AARCH64: TargetDescriptor = TargetDescriptor {
    id: TargetId::Efi,
    elf_class: Class::Elf64,
    endianness: Endian::Little,
    elf_machine: Machine::Aarch64,
    pointer_size: 8,
    link_addr: 0,
    vaddr_offset: 0,
    // AArch64 requires align >= 4096 (data model invariant).
    link_align: 4096,
    section_align: 4096,
    mod_align: 4096,
    mod_gap: 0,
};

pub const EFI_IA64: TargetDescriptor = TargetDescriptor {
    id: TargetId::Efi,
    elf_class: Class::Elf64,
    endianness: Endian::Little,
    elf_machine: Machine::Ia64,
    pointer_size: 8,
    link_addr: 0,
    vaddr_offset: 0,
    link_align: 16,
    section_align: 16,
    mod_align: 16,
    mod_gap: 0,
};

pub const UBOOT_ARM: TargetDescriptor = TargetDescriptor {
    id: TargetId::UBoot,
    elf_class: Class::Elf32,
    endianness: Endian::Little,
    elf_machine: Machine::Arm,
    pointer_size: 4,
    link_addr: 0,
    vaddr_offset: 0,
    link_align: 4,
    section_align: 4,
    mod_align: 4,
    mod_gap: 0,
};

pub const COREBOOT_I386: TargetDescriptor = TargetDescriptor {
    id: TargetId::Coreboot,
    elf_class: Class::Elf32,
    endianness: Endian::Little,
    elf_machine: Machine::I386,
    pointer_size: 4,
    link_addr: 0x8200,
    // Fixed-address target: no runtime rebase, so the virtual address a
    // section ends up at is just `link_addr` plus its offset into the
    // kernel region.
    vaddr_offset: 0x8200,
    link_align: 4,
    section_align: 4,
    mod_align: 4,
    mod_gap: 0,
};

pub const XEN_X86_64: TargetDescriptor = TargetDescriptor {
    id: TargetId::Xen,
    elf_class: Class::Elf64,
    endianness: Endian::Little,
    elf_machine: Machine::X86_64,
    pointer_size: 8,
    link_addr: 0,
    vaddr_offset: 0,
    link_align: 4096,
    section_align: 4096,
    mod_align: 4096,
    mod_gap: 0,
};

/// CHRP (Open Firmware) PowerPC target: container-wrapper-only, C5 never
/// runs for it (`e_machine` EM_PPC = 20 falls outside the enumerated
/// relocation architectures).
pub const CHRP_POWERPC: TargetDescriptor = TargetDescriptor {
    id: TargetId::Chrp,
    elf_class: Class::Elf32,
    endianness: Endian::Big,
    elf_machine: Machine::Other(20),
    pointer_size: 4,
    link_addr: 0x0000_4000,
    vaddr_offset: 0x0000_4000,
    link_align: 4,
    section_align: 4,
    mod_align: 4,
    mod_gap: 0,
};

/// LoongSon MIPS target: container-wrapper-only, same reasoning as
/// [`CHRP_POWERPC`] (`e_machine` EM_MIPS = 8).
pub const LOONGSON_ELF: TargetDescriptor = TargetDescriptor {
    id: TargetId::LoongsonElf,
    elf_class: Class::Elf32,
    endianness: Endian::Little,
    elf_machine: Machine::Other(8),
    pointer_size: 4,
    link_addr: 0x8020_0000,
    vaddr_offset: 0x8020_0000,
    link_align: 4,
    section_align: 4,
    mod_align: 4,
    mod_gap: 0,
};
