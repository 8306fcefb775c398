//! System call handlers.

use super::uaccess::check_user_range;
use super::{SyscallContext, SyscallEnv, SyscallError, SyscallNumber, SyscallOutcome, SyscallResult};
use crate::arch::Hal;
use crate::config::WRITE_CHUNK_SIZE;
use crate::memory::VirtAddr;
use crate::process::ProcessState;

const STDOUT: u32 = 1;
const STDERR: u32 = 2;

/// Handle a system call.
pub fn handle<H: Hal>(
    syscall: SyscallNumber,
    ctx: &SyscallContext,
    env: &mut SyscallEnv<'_, H>,
) -> SyscallResult {
    match syscall {
        SyscallNumber::Exit => handle_exit(ctx, env),
        SyscallNumber::Write => handle_write(ctx, env),
        SyscallNumber::GetTickCount => handle_get_tick_count(env),
        SyscallNumber::GetPid => handle_getpid(env),
    }
}

/// Exit the current process and hand the CPU to the scheduler.
fn handle_exit<H: Hal>(ctx: &SyscallContext, env: &mut SyscallEnv<'_, H>) -> SyscallResult {
    let exit_code = ctx.arg1 as i32;
    let pcb = env.table.running_mut().ok_or(SyscallError::NoProcess)?;
    pcb.state = ProcessState::Exited;
    pcb.exit_code = Some(exit_code);
    log::info!(
        "[SYSCALL] pid {} '{}' exited with code {} after {} quanta",
        pcb.id,
        pcb.name(),
        exit_code,
        pcb.run_count
    );

    let dispatch = env.scheduler.schedule(env.table, env.hal);
    Ok(SyscallOutcome::Dispatch(dispatch))
}

/// Write a user buffer to the console.
fn handle_write<H: Hal>(ctx: &SyscallContext, env: &mut SyscallEnv<'_, H>) -> SyscallResult {
    let fd = ctx.arg1;
    let buf = ctx.arg2;
    let len = ctx.arg3;

    if fd != STDOUT && fd != STDERR {
        log::warn!("[SYSCALL] write: invalid fd {}", fd);
        return Err(SyscallError::InvalidArgument);
    }

    let caller = env.table.running().ok_or(SyscallError::NoProcess)?;
    if let Err(err) = check_user_range(env.space, caller, buf, len) {
        log::warn!(
            "[SYSCALL] write: pid {} passed invalid buffer {:#x} with count {}",
            caller.id,
            buf,
            len
        );
        return Err(err);
    }
    if len == 0 {
        return Ok(SyscallOutcome::Return(0));
    }

    log::debug!("[SYSCALL] write: fd={} buf={:#x} count={}", fd, buf, len);

    let mut chunk = [0u8; WRITE_CHUNK_SIZE];
    let mut offset = 0u32;
    while offset < len {
        let n = ((len - offset) as usize).min(WRITE_CHUNK_SIZE);
        env.hal
            .copy_from_user(env.space.directory(), VirtAddr::new(buf + offset), &mut chunk[..n]);
        env.hal.console_write(&chunk[..n]);
        offset += n as u32;
    }

    Ok(SyscallOutcome::Return(len as i32))
}

/// Return the id of the calling process.
fn handle_getpid<H: Hal>(env: &mut SyscallEnv<'_, H>) -> SyscallResult {
    let pid = env.table.running().map_or(0, |pcb| pcb.id.as_u32());
    Ok(SyscallOutcome::Return(pid as i32))
}

/// Return the timer tick counter, masked to stay non-negative.
fn handle_get_tick_count<H: Hal>(env: &mut SyscallEnv<'_, H>) -> SyscallResult {
    Ok(SyscallOutcome::Return((env.ticks & 0x7FFF_FFFF) as i32))
}
