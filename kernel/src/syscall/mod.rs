//! System call handling module.
//!
//! User code traps through `int 0x80` with the call number in `eax` and
//! arguments in `ebx`, `ecx` and `edx`; the result goes back in `eax`.

pub mod handlers;
pub mod uaccess;

use crate::arch::Hal;
use crate::memory::AddressSpace;
use crate::process::ProcessTable;
use crate::scheduler::{Dispatch, Scheduler};
use core::fmt;

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyscallNumber {
    /// Exit the current process.
    Exit = 1,
    /// Write to a file descriptor.
    Write = 3,
    /// Read the timer tick counter.
    GetTickCount = 13,
    /// Get process ID.
    GetPid = 20,
}

impl TryFrom<u32> for SyscallNumber {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SyscallNumber::Exit),
            3 => Ok(SyscallNumber::Write),
            13 => Ok(SyscallNumber::GetTickCount),
            20 => Ok(SyscallNumber::GetPid),
            _ => Err(()),
        }
    }
}

/// System call errors, returned to user code as negative `eax` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SyscallError {
    InvalidSyscall = -1,
    InvalidArgument = -2,
    BadAddress = -3,
    NoProcess = -4,
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSyscall => write!(f, "invalid system call"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::BadAddress => write!(f, "bad user address"),
            Self::NoProcess => write!(f, "no current process"),
        }
    }
}

/// Registers captured by the trap stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SyscallContext {
    pub syscall_num: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub arg3: u32,
}

/// What the trap stub should do once a call is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Store the value in the caller's `eax` and return to it.
    Return(i32),
    /// The caller gave up the CPU; act on the scheduler's decision.
    Dispatch(Dispatch),
}

pub type SyscallResult = Result<SyscallOutcome, SyscallError>;

/// Kernel state a handler may touch.
pub struct SyscallEnv<'a, H: Hal> {
    pub table: &'a mut ProcessTable,
    pub space: &'a AddressSpace,
    pub scheduler: &'a mut Scheduler,
    pub hal: &'a mut H,
    pub ticks: u64,
}

/// Decode and run one system call.
pub fn dispatch<H: Hal>(ctx: &SyscallContext, env: &mut SyscallEnv<'_, H>) -> SyscallOutcome {
    #[cfg(feature = "trace-syscalls")]
    log::debug!(
        "[SYSCALL] nr={} ({:#x}, {:#x}, {:#x})",
        ctx.syscall_num,
        ctx.arg1,
        ctx.arg2,
        ctx.arg3
    );

    let result = match SyscallNumber::try_from(ctx.syscall_num) {
        Ok(syscall) => handlers::handle(syscall, ctx, env),
        Err(_) => {
            log::warn!("[SYSCALL] Unknown system call {}", ctx.syscall_num);
            Err(SyscallError::InvalidSyscall)
        }
    };

    match result {
        Ok(outcome) => outcome,
        Err(err) => SyscallOutcome::Return(err as i32),
    }
}
