//! Architecture abstraction.
//!
//! The core kernel reaches hardware only through [`Hal`]. The i386
//! implementation lives in `i386`; host tests supply a mock.

#[cfg(target_arch = "x86")]
pub mod i386;
pub mod multiboot;

use crate::memory::{PageDirectory, VirtAddr};

/// Hardware operations the memory, process and syscall layers need.
pub trait Hal {
    /// Load `directory` and enable paging with 4 MiB pages.
    fn activate_paging(&mut self, directory: &PageDirectory);

    /// Drop any cached translation for the page containing `addr`.
    fn flush_tlb(&mut self, addr: VirtAddr);

    /// Stack pointer the CPU loads on the next ring 3 to ring 0 transition.
    fn set_kernel_stack(&mut self, top: usize);

    /// Address the switch path returns to for a process that has never run.
    fn user_entry_trampoline(&self) -> usize;

    /// Copy `src` to user memory at `dst`, translated through `directory`.
    ///
    /// The caller has already checked that the range is mapped.
    fn copy_to_user(&mut self, directory: &PageDirectory, dst: VirtAddr, src: &[u8]);

    /// Copy user memory at `src` into `dst`, translated through `directory`.
    ///
    /// The caller has already checked that the range is mapped.
    fn copy_from_user(&mut self, directory: &PageDirectory, src: VirtAddr, dst: &mut [u8]);

    /// Console collaborator behind `sys_write`.
    fn console_write(&mut self, bytes: &[u8]);
}
