//! Syscall Unit Tests
//!
//! Dispatch, pointer validation and the write/getpid/tick-count paths.

#[cfg(test)]
mod tests {
    use crate::config::KERNEL_VIRTUAL_BASE;
    use crate::kernel::Kernel;
    use crate::memory::VirtAddr;
    use crate::process::ProcessId;
    use crate::programs::HELLO;
    use crate::syscall::{SyscallError, SyscallNumber, SyscallOutcome};
    use crate::tests::cpu::{write_and_exit, Machine};
    use crate::tests::mock::{boot_kernel, MockHal};
    use crate::arch::Hal;

    const SYS_EXIT: u32 = SyscallNumber::Exit as u32;
    const SYS_WRITE: u32 = SyscallNumber::Write as u32;
    const SYS_GET_TICK_COUNT: u32 = SyscallNumber::GetTickCount as u32;
    const SYS_GETPID: u32 = SyscallNumber::GetPid as u32;

    /// A kernel with one process running and "Hi" at the top of its stack.
    fn running_kernel() -> (Box<Kernel<MockHal>>, u32) {
        let mut kernel = boot_kernel(128);
        kernel.spawn("p", &HELLO).unwrap();
        kernel.start();

        let buf = kernel.table().slot(0).unwrap().user_stack_top.as_u32() - 16;
        let (space, hal) = kernel.user_memory();
        hal.copy_to_user(space.directory(), VirtAddr::new(buf), b"Hi");
        (kernel, buf)
    }

    fn ret(outcome: SyscallOutcome) -> i32 {
        match outcome {
            SyscallOutcome::Return(value) => value,
            other => panic!("expected a return value, got {:?}", other),
        }
    }

    // ========================================
    // Syscall Number Tests
    // ========================================

    #[test]
    fn test_syscall_numbers() {
        assert_eq!(SYS_EXIT, 1);
        assert_eq!(SYS_WRITE, 3);
        assert_eq!(SyscallNumber::try_from(13), Ok(SyscallNumber::GetTickCount));
        assert_eq!(SyscallNumber::try_from(20), Ok(SyscallNumber::GetPid));
        assert_eq!(SyscallNumber::try_from(0), Err(()));
    }

    #[test]
    fn test_unknown_syscall() {
        let (mut kernel, _) = running_kernel();
        assert_eq!(ret(kernel.syscall(99, 0, 0, 0)), SyscallError::InvalidSyscall as i32);
        assert_eq!(ret(kernel.syscall(0, 0, 0, 0)), -1);
    }

    // ========================================
    // Write Tests
    // ========================================

    #[test]
    fn test_write_reaches_console() {
        let (mut kernel, buf) = running_kernel();
        assert_eq!(ret(kernel.syscall(SYS_WRITE, 1, buf, 2)), 2);
        assert_eq!(kernel.hal().console, b"Hi");

        assert_eq!(ret(kernel.syscall(SYS_WRITE, 2, buf, 1)), 1);
        assert_eq!(kernel.hal().console, b"HiH");
    }

    #[test]
    fn test_write_bad_fd_leaves_console_untouched() {
        let (mut kernel, buf) = running_kernel();
        let result = ret(kernel.syscall(SYS_WRITE, 5, buf, 2));
        assert!(result < 0);
        assert_eq!(result, SyscallError::InvalidArgument as i32);
        assert!(kernel.hal().console.is_empty());
    }

    #[test]
    fn test_write_rejects_kernel_base() {
        let (mut kernel, _) = running_kernel();
        let result = ret(kernel.syscall(SYS_WRITE, 1, KERNEL_VIRTUAL_BASE, 2));
        assert_eq!(result, SyscallError::BadAddress as i32);
        assert!(kernel.hal().console.is_empty());
    }

    #[test]
    fn test_write_rejects_bad_ranges() {
        let (mut kernel, buf) = running_kernel();
        let bad = [
            (0, 2),
            (0xFFFF_FFF0, 0x20),
            (KERNEL_VIRTUAL_BASE - 1, 2),
            (0x000B_8000, 2),
            (0x4040_0000, 2),
        ];
        for (ptr, len) in bad {
            assert_eq!(
                ret(kernel.syscall(SYS_WRITE, 1, ptr, len)),
                SyscallError::BadAddress as i32,
                "ptr {:#x} len {}",
                ptr,
                len
            );
        }
        assert!(kernel.hal().console.is_empty());
        assert_eq!(ret(kernel.syscall(SYS_WRITE, 1, buf, 0)), 0);
    }

    #[test]
    fn test_large_write_is_chunked() {
        let (mut kernel, _) = running_kernel();
        let base = kernel.table().slot(0).unwrap().stack.unwrap().base.as_u32();
        let data: Vec<u8> = (0..1000u32).map(|i| b'a' + (i % 26) as u8).collect();
        {
            let (space, hal) = kernel.user_memory();
            hal.copy_to_user(space.directory(), VirtAddr::new(base), &data);
        }
        assert_eq!(ret(kernel.syscall(SYS_WRITE, 1, base, 1000)), 1000);
        assert_eq!(kernel.hal().console, data);
    }

    // ========================================
    // Process Info Tests
    // ========================================

    #[test]
    fn test_getpid_and_tick_count() {
        let (mut kernel, _) = running_kernel();
        assert_eq!(ret(kernel.syscall(SYS_GETPID, 0, 0, 0)), 1);

        assert_eq!(ret(kernel.syscall(SYS_GET_TICK_COUNT, 0, 0, 0)), 0);
        for _ in 0..5 {
            kernel.on_timer_tick();
        }
        assert_eq!(ret(kernel.syscall(SYS_GET_TICK_COUNT, 0, 0, 0)), 5);
    }

    #[test]
    fn test_no_current_process() {
        let mut kernel = boot_kernel(128);
        assert_eq!(ret(kernel.syscall(SYS_GETPID, 0, 0, 0)), 0);
        assert_eq!(ret(kernel.syscall(SYS_EXIT, 0, 0, 0)), SyscallError::NoProcess as i32);
        assert_eq!(ret(kernel.syscall(SYS_WRITE, 1, 0x4000_0000, 1)), SyscallError::NoProcess as i32);
    }

    #[test]
    fn test_exit_records_code() {
        let (mut kernel, _) = running_kernel();
        let outcome = kernel.syscall(SYS_EXIT, 7, 0, 0);
        assert!(matches!(outcome, SyscallOutcome::Dispatch(_)));
        let pcb = kernel.table().slot(0).unwrap();
        assert_eq!(pcb.exit_code, Some(7));
        assert_eq!(pcb.id, ProcessId(1));
    }

    // ========================================
    // Scenario B
    // ========================================

    #[test]
    fn test_user_write_hi() {
        let image = write_and_exit(1, b"Hi");
        let mut machine = Machine::boot(&[("hi", &image[..])]);
        machine.run(1_000, 10_000);

        assert!(machine.finished);
        assert_eq!(machine.kernel.hal().console, b"Hi");
        assert_eq!(machine.kernel.table().slot(0).unwrap().exit_code, Some(2));
    }

    #[test]
    fn test_user_write_bad_fd() {
        let image = write_and_exit(5, b"Hi");
        let mut machine = Machine::boot(&[("bad-fd", &image[..])]);
        machine.run(1_000, 10_000);

        assert!(machine.finished);
        assert!(machine.kernel.hal().console.is_empty());
        let code = machine.kernel.table().slot(0).unwrap().exit_code.unwrap();
        assert_eq!(code, SyscallError::InvalidArgument as i32);
    }
}
