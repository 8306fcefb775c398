//! Port I/O.

use core::arch::asm;

/// Write a byte to an I/O port.
///
/// # Safety
///
/// Port writes can reconfigure hardware; the caller must own the device.
#[inline(always)]
pub unsafe fn outb(port: u16, value: u8) {
    unsafe { asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags)) };
}

/// Write a dword to an I/O port.
///
/// # Safety
///
/// Same as [`outb`].
#[inline(always)]
pub unsafe fn outl(port: u16, value: u32) {
    unsafe { asm!("out dx, eax", in("dx") port, in("eax") value, options(nomem, nostack, preserves_flags)) };
}

/// Read a byte from an I/O port.
///
/// # Safety
///
/// Some device registers have side effects on read.
#[inline(always)]
pub unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    unsafe { asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags)) };
    value
}

/// Give slow devices (the 8259) time to settle between writes.
#[inline(always)]
pub fn io_wait() {
    // Port 0x80 is the POST diagnostic port; writing it is harmless.
    unsafe { outb(0x80, 0) };
}
