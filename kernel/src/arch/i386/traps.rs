//! Trap entry stubs and dispatch.
//!
//! Every vector gets a small stub that normalizes the stack (a dummy error
//! code where the CPU pushes none, then the vector number) and jumps to
//! [`trap_common`], which saves the general registers and data segments
//! into a [`TrapFrame`] and calls [`trap_dispatch`].
//!
//! Handlers take the kernel lock only long enough to get a [`Dispatch`],
//! then act on it with the lock released.

use core::arch::{asm, naked_asm};

use super::{halt, perform, pic, KERNEL};
use crate::config::{KERNEL_DATA_SELECTOR, PIC1_OFFSET, PIC2_OFFSET, SYSCALL_VECTOR};
use crate::kernel::{FaultInfo, FaultRegisters};
use crate::syscall::SyscallOutcome;

const PAGE_FAULT: u8 = 14;
const IRQ_FIRST: u8 = PIC1_OFFSET;
const IRQ_LAST: u8 = PIC2_OFFSET + 7;

static EXCEPTION_NAMES: [&str; 32] = [
    "Divide Error",
    "Debug",
    "NMI",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating-Point",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point",
    "Virtualization",
    "Control Protection",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Hypervisor Injection",
    "VMM Communication",
    "Security",
    "Reserved",
];

/// Register state saved by [`trap_common`], lowest address first.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TrapFrame {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    // pushad
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub kernel_esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error_code: u32,
    // Pushed by the CPU.
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    /// Only present when the trap came from ring 3.
    pub user_esp: u32,
    pub user_ss: u32,
}

impl TrapFrame {
    pub fn from_user(&self) -> bool {
        self.cs & 3 == 3
    }

    /// The saved registers, with the user stack when the trap came from
    /// ring 3.
    pub fn registers(&self) -> FaultRegisters {
        FaultRegisters {
            eax: self.eax,
            ebx: self.ebx,
            ecx: self.ecx,
            edx: self.edx,
            esi: self.esi,
            edi: self.edi,
            ebp: self.ebp,
            esp: self.kernel_esp,
            eip: self.eip,
            cs: self.cs,
            eflags: self.eflags,
            user_stack: self.from_user().then_some((self.user_esp, self.user_ss)),
        }
    }
}

#[unsafe(naked)]
unsafe extern "C" fn trap_common() {
    naked_asm!(
        "pushad",
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "mov ax, {data}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push esp",
        "call {dispatch}",
        "add esp, 4",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "popad",
        // Vector and error code.
        "add esp, 8",
        "iretd",
        data = const KERNEL_DATA_SELECTOR,
        dispatch = sym trap_dispatch,
    );
}

macro_rules! trap_stub {
    ($name:ident, $vector:literal) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                "push 0",
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym trap_common,
            );
        }
    };
    ($name:ident, $vector:literal, error_code) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym trap_common,
            );
        }
    };
}

macro_rules! trap_stubs {
    ($($name:ident => $vector:literal $(, $error:ident)?;)*) => {
        $(trap_stub!($name, $vector $(, $error)?);)*

        /// Every installed vector and its entry stub.
        pub static STUBS: [(u8, unsafe extern "C" fn()); trap_stubs!(@count $($name)*)] =
            [$(($vector, $name)),*];
    };
    (@count $($name:ident)*) => { 0 $(+ trap_stubs!(@one $name))* };
    (@one $name:ident) => { 1 };
}

trap_stubs! {
    trap_0 => 0;
    trap_1 => 1;
    trap_2 => 2;
    trap_3 => 3;
    trap_4 => 4;
    trap_5 => 5;
    trap_6 => 6;
    trap_7 => 7;
    trap_8 => 8, error_code;
    trap_9 => 9;
    trap_10 => 10, error_code;
    trap_11 => 11, error_code;
    trap_12 => 12, error_code;
    trap_13 => 13, error_code;
    trap_14 => 14, error_code;
    trap_15 => 15;
    trap_16 => 16;
    trap_17 => 17, error_code;
    trap_18 => 18;
    trap_19 => 19;
    trap_20 => 20;
    trap_21 => 21, error_code;
    trap_22 => 22;
    trap_23 => 23;
    trap_24 => 24;
    trap_25 => 25;
    trap_26 => 26;
    trap_27 => 27;
    trap_28 => 28;
    trap_29 => 29, error_code;
    trap_30 => 30, error_code;
    trap_31 => 31;
    irq_0 => 32;
    irq_1 => 33;
    irq_2 => 34;
    irq_3 => 35;
    irq_4 => 36;
    irq_5 => 37;
    irq_6 => 38;
    irq_7 => 39;
    irq_8 => 40;
    irq_9 => 41;
    irq_10 => 42;
    irq_11 => 43;
    irq_12 => 44;
    irq_13 => 45;
    irq_14 => 46;
    irq_15 => 47;
    syscall_entry => 128;
}

const _: () = assert!(IRQ_FIRST == 32 && IRQ_LAST == 47 && SYSCALL_VECTOR == 128);

extern "C" fn trap_dispatch(frame: &mut TrapFrame) {
    let vector = frame.vector as u8;
    match vector {
        0..=31 => exception(frame),
        IRQ_FIRST..=IRQ_LAST => irq(vector - IRQ_FIRST),
        SYSCALL_VECTOR => syscall(frame),
        _ => log::warn!("[EXCEPT] Unexpected vector {}", vector),
    }
}

fn irq(line: u8) {
    match line {
        pic::TIMER_IRQ => {
            // Acknowledge first: a switch may not come back here for a
            // whole round.
            pic::send_eoi(line);
            let dispatch = KERNEL.lock().on_timer_tick();
            perform(dispatch);
        }
        7 | 15 if pic::is_spurious(line) => {
            // The master still saw the cascade line for a spurious slave IRQ.
            if line == 15 {
                pic::send_eoi(0);
            }
        }
        _ => {
            log::warn!("[EXCEPT] Unhandled IRQ {}", line);
            pic::send_eoi(line);
        }
    }
}

fn syscall(frame: &mut TrapFrame) {
    let outcome = KERNEL
        .lock()
        .syscall(frame.eax, frame.ebx, frame.ecx, frame.edx);
    match outcome {
        SyscallOutcome::Return(value) => frame.eax = value as u32,
        SyscallOutcome::Dispatch(dispatch) => {
            perform(dispatch);
            // The caller has exited; there is nothing to return to.
            log::error!("[SYSCALL] Exited process has no successor");
            halt();
        }
    }
}

fn exception(frame: &TrapFrame) {
    let vector = frame.vector as u8;
    let fault = FaultInfo {
        vector,
        error_code: frame.error_code,
        eip: frame.eip,
        address: if vector == PAGE_FAULT { read_cr2() } else { 0 },
        regs: frame.registers(),
    };

    dump_frame(&fault);
    if frame.from_user() {
        let dispatch = KERNEL.lock().on_user_fault(&fault);
        perform(dispatch);
        halt();
    }

    panic!(
        "[EXCEPT] {} in kernel mode at {:#010x}",
        EXCEPTION_NAMES[vector as usize], frame.eip
    );
}

fn dump_frame(fault: &FaultInfo) {
    log::error!(
        "[EXCEPT] {} (vector {}, error {:#x}) in ring {}",
        EXCEPTION_NAMES[fault.vector as usize],
        fault.vector,
        fault.error_code,
        fault.regs.cs & 3
    );
    log::error!("[EXCEPT] {}", fault.regs);
    if fault.vector == PAGE_FAULT {
        log::error!("[EXCEPT] cr2={:#010x}", fault.address);
    }
}

fn read_cr2() -> u32 {
    let value: u32;
    unsafe { asm!("mov {}, cr2", out(reg) value, options(nomem, nostack, preserves_flags)) };
    value
}
