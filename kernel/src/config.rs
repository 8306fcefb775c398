//! Kernel configuration constants.
//!
//! This module contains compile-time configuration for the kernel.
//! Values here fix the memory layout, the process limit and the
//! descriptor selectors shared with the assembly stubs.

/// Size of one physical frame and one page-directory mapping (4 MiB).
pub const FRAME_SIZE: usize = 4 * 1024 * 1024;

/// log2 of [`FRAME_SIZE`].
pub const FRAME_SHIFT: u32 = 22;

/// Small page size (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Number of entries in a page directory.
pub const PAGE_DIRECTORY_ENTRIES: usize = 1024;

/// Highest physical memory the frame bitmap can describe (4 GiB).
pub const MAX_PHYSICAL_FRAMES: usize = PAGE_DIRECTORY_ENTRIES;

/// Number of low 4 MiB entries identity-mapped for the kernel.
///
/// Covers the kernel image at 1 MiB, its boot stack, and the VGA window.
pub const KERNEL_IDENTITY_ENTRIES: usize = 4;

/// First virtual address reserved for the kernel. User ranges end here.
pub const KERNEL_VIRTUAL_BASE: u32 = 0xC000_0000;

/// Directory index of the first process code region (0x4000_0000).
pub const USER_CODE_PDE_BASE: usize = 256;

/// Directory index of the first process stack region (0xBFC0_0000).
///
/// Stack regions grow downward from here, one entry per slot.
pub const USER_STACK_PDE_TOP: usize = 767;

/// Bytes left unused at the top of each stack region.
pub const USER_STACK_GUARD: u32 = PAGE_SIZE as u32;

/// Maximum number of processes.
pub const MAX_PROCESSES: usize = 4;

/// Maximum process name length in bytes, excluding the terminator slot.
pub const PROCESS_NAME_LEN: usize = 31;

/// Stack size per process kernel stack (8 KiB).
pub const KERNEL_STACK_SIZE: usize = 8 * 1024;

/// Timer interrupt frequency in Hz.
pub const TIMER_FREQUENCY: u32 = 100;

/// PIT input clock in Hz.
pub const PIT_BASE_FREQUENCY: u32 = 1_193_182;

/// Software interrupt vector for system calls.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// First vector used by the remapped master PIC.
pub const PIC1_OFFSET: u8 = 0x20;

/// First vector used by the remapped slave PIC.
pub const PIC2_OFFSET: u8 = 0x28;

/// Kernel code segment selector.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// Kernel data segment selector.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;

/// User code segment selector (RPL 3).
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;

/// User data segment selector (RPL 3).
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;

/// Task state segment selector.
pub const TSS_SELECTOR: u16 = 0x28;

/// EFLAGS for a fresh user context: IF set plus the reserved bit 1.
pub const USER_EFLAGS: u32 = 0x202;

/// Serial port for debug output (COM1).
pub const DEBUG_SERIAL_PORT: u16 = 0x3F8;

/// QEMU `isa-debug-exit` I/O port.
pub const QEMU_EXIT_PORT: u16 = 0xF4;

/// Largest chunk copied out of user memory per console write.
pub const WRITE_CHUNK_SIZE: usize = 256;

/// Enable kernel debugging features based on build profile.
pub const DEBUG_ENABLED: bool = cfg!(debug_assertions);

// Code regions grow up from USER_CODE_PDE_BASE and stack regions grow down
// from USER_STACK_PDE_TOP; the two ranges must not meet at full capacity.
const _: () = assert!(USER_CODE_PDE_BASE + MAX_PROCESSES <= USER_STACK_PDE_TOP + 1 - MAX_PROCESSES);
const _: () = assert!(USER_STACK_PDE_TOP < (KERNEL_VIRTUAL_BASE as usize >> FRAME_SHIFT));
const _: () = assert!(KERNEL_IDENTITY_ENTRIES <= USER_CODE_PDE_BASE);
const _: () = assert!(1 << FRAME_SHIFT == FRAME_SIZE);
