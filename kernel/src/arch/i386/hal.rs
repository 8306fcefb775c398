//! [`Hal`] on real i386 hardware.

use core::arch::asm;

use super::{gdt, switch, vga};
use crate::arch::Hal;
use crate::memory::{PageDirectory, VirtAddr};

const CR0_PG: u32 = 1 << 31;
const CR4_PSE: u32 = 1 << 4;

/// The i386 platform. Stateless; all state lives in the CPU and devices.
#[derive(Debug, Default)]
pub struct I386Hal;

impl Hal for I386Hal {
    fn activate_paging(&mut self, directory: &PageDirectory) {
        let root = directory.as_ptr() as u32;
        unsafe {
            asm!(
                "mov cr3, {root}",
                "mov {tmp}, cr4",
                "or {tmp}, {pse}",
                "mov cr4, {tmp}",
                "mov {tmp}, cr0",
                "or {tmp}, {pg}",
                "mov cr0, {tmp}",
                root = in(reg) root,
                tmp = out(reg) _,
                pse = const CR4_PSE,
                pg = const CR0_PG,
                options(nostack),
            );
        }
    }

    fn flush_tlb(&mut self, addr: VirtAddr) {
        unsafe {
            asm!("invlpg [{}]", in(reg) addr.as_u32(), options(nostack, preserves_flags));
        }
    }

    fn set_kernel_stack(&mut self, top: usize) {
        gdt::set_kernel_stack(top);
    }

    fn user_entry_trampoline(&self) -> usize {
        switch::user_entry as usize
    }

    // One directory is shared by the kernel and every process and it is
    // always loaded, so user addresses are directly addressable here.
    fn copy_to_user(&mut self, _directory: &PageDirectory, dst: VirtAddr, src: &[u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_u32() as *mut u8, src.len());
        }
    }

    fn copy_from_user(&mut self, _directory: &PageDirectory, src: VirtAddr, dst: &mut [u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_u32() as *const u8, dst.as_mut_ptr(), dst.len());
        }
    }

    fn console_write(&mut self, bytes: &[u8]) {
        vga::VGA_WRITER.lock().write_bytes(bytes);
        #[cfg(feature = "serial-console")]
        crate::serial::write_bytes(bytes);
    }
}
