//! QEMU `isa-debug-exit` device.

use super::io::outl;
use crate::config::QEMU_EXIT_PORT;

/// Exit status written to the debug-exit port. QEMU exits with
/// `(code << 1) | 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Ask QEMU to exit. Returns if no debug-exit device is present.
pub fn exit_qemu(code: QemuExitCode) {
    unsafe { outl(QEMU_EXIT_PORT, code as u32) };
}
