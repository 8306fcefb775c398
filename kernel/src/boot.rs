//! Multiboot header and entry point.
//!
//! The loader enters `_start` in 32-bit protected mode with paging off,
//! `eax` holding the Multiboot magic and `ebx` the information address.

use core::arch::global_asm;
use minios_kernel::arch::multiboot::{HEADER_CHECKSUM, HEADER_FLAGS, HEADER_MAGIC};

const BOOT_STACK_SIZE: usize = 64 * 1024;

global_asm!(
    ".pushsection .multiboot, \"a\"",
    ".align 4",
    ".long {magic}",
    ".long {flags}",
    ".long {checksum}",
    ".popsection",
    ".pushsection .bss.boot_stack, \"aw\", @nobits",
    ".align 16",
    "boot_stack_bottom:",
    ".skip {stack_size}",
    "boot_stack_top:",
    ".popsection",
    ".pushsection .text._start, \"ax\"",
    ".global _start",
    "_start:",
    "cli",
    "mov esp, offset boot_stack_top",
    "xor ebp, ebp",
    // Keep esp 16-byte aligned at the call.
    "sub esp, 8",
    "push ebx",
    "push eax",
    "call {kmain}",
    "2:",
    "cli",
    "hlt",
    "jmp 2b",
    ".popsection",
    magic = const HEADER_MAGIC,
    flags = const HEADER_FLAGS,
    checksum = const HEADER_CHECKSUM,
    stack_size = const BOOT_STACK_SIZE,
    kmain = sym crate::kmain,
);
