//! Context switch and first entry to user mode.
//!
//! A saved context is a single kernel stack pointer (a resume point). The
//! word at that address is where execution continues when the context is
//! switched back in: [`switch_resume`] for a context that was switched
//! out, or [`user_entry`] for a process that has never run, whose kernel
//! stack holds the frame built by `KernelStacks::push_initial_frame`.

use core::arch::naked_asm;

use crate::config::USER_DATA_SELECTOR;

/// Save the current context into `*save_to` and continue at `next`.
///
/// Pushes the callee-saved registers and the address of
/// [`switch_resume`], stores the stack pointer, loads `next` and returns
/// into whatever that stack holds. Returns when this context is resumed.
///
/// # Safety
///
/// `save_to` must be writable and `next` must be a resume point produced
/// by this function or by `push_initial_frame`. Interrupts must be off.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(save_to: *mut usize, next: usize) {
    naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        // cdecl arguments sit above the four saves and the return address.
        "mov eax, [esp + 20]",
        "mov ecx, [esp + 24]",
        "lea edx, [{resume}]",
        "push edx",
        "mov [eax], esp",
        "mov esp, ecx",
        "ret",
        resume = sym switch_resume,
    );
}

/// Second half of [`switch_context`] for a context being resumed.
#[unsafe(naked)]
unsafe extern "C" fn switch_resume() {
    naked_asm!(
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    );
}

/// First entry into ring 3: load user data segments, restore the zeroed
/// general registers and `iretd` to the entry point with IF set.
#[unsafe(naked)]
pub unsafe extern "C" fn user_entry() {
    naked_asm!(
        "mov ax, {data}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "popad",
        "iretd",
        data = const USER_DATA_SELECTOR,
    );
}
