//! i386 platform layer.
//!
//! Descriptor tables, the interrupt controllers and timer, trap entry,
//! the context switch and the consoles. Kernel paths run with interrupts
//! disabled; only the idle loop enables them.

pub mod gdt;
pub mod hal;
pub mod idt;
pub mod io;
pub mod pic;
pub mod pit;
pub mod qemu;
pub mod switch;
pub mod traps;
pub mod vga;

use core::arch::asm;
use spin::Mutex;

pub use hal::I386Hal;

use crate::kernel::Kernel;
use crate::process::KernelStacks;
use crate::scheduler::Dispatch;

/// Per-process kernel stacks. Trap handlers run on them, so they live
/// outside the kernel lock.
static KERNEL_STACKS: KernelStacks = KernelStacks::new();

/// The kernel instance. Trap handlers lock it, take a [`Dispatch`] and
/// release it before calling [`perform`].
pub static KERNEL: Mutex<Kernel<I386Hal>> = Mutex::new(Kernel::new(I386Hal, &KERNEL_STACKS));

/// Carry out a scheduler decision. The kernel lock must not be held.
pub fn perform(dispatch: Dispatch) {
    match dispatch {
        Dispatch::Idle | Dispatch::Resume => {}
        Dispatch::Switch(plan) => {
            // SAFETY: save_to points into KERNEL_STACKS rather than locked
            // state, and resume was produced by a previous switch or by
            // push_initial_frame. Interrupts are off on every trap path.
            unsafe { switch::switch_context(plan.save_to, plan.resume.0) };
        }
        Dispatch::AllExited => finish(),
    }
}

/// Log the exit report and stop.
pub fn finish() -> ! {
    let report = KERNEL.lock().exit_report();
    if report.passed() {
        log::info!("[BOOT] Self-check PASSED");
        crate::vga_println!("MiniOS: self-check passed ({} processes)", report.processes);
    } else {
        log::error!(
            "[BOOT] Self-check FAILED: {}/{} exited, {} runs",
            report.exited,
            report.processes,
            report.total_runs
        );
        crate::vga_println!("MiniOS: self-check FAILED");
    }

    #[cfg(feature = "qemu-exit")]
    qemu::exit_qemu(if report.passed() {
        qemu::QemuExitCode::Success
    } else {
        qemu::QemuExitCode::Failed
    });

    halt()
}

/// Stop the CPU for good.
pub fn halt() -> ! {
    loop {
        unsafe { asm!("cli", "hlt", options(nomem, nostack)) };
    }
}

/// Wait for interrupts forever.
pub fn idle() -> ! {
    loop {
        unsafe { asm!("sti", "hlt", options(nomem, nostack)) };
    }
}
