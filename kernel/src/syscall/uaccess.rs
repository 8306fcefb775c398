//! User pointer validation.
//!
//! Every address a system call receives from user code passes through
//! [`check_user_range`] before the kernel touches the memory behind it.

use super::SyscallError;
use crate::config::KERNEL_VIRTUAL_BASE;
use crate::memory::AddressSpace;
use crate::process::Pcb;

/// Check that `ptr..ptr+len` is safe to read on behalf of `caller`.
///
/// The range must be non-null, must not wrap, must end at or below the
/// kernel's reserved region, must be covered by present user mappings,
/// and must lie inside one of the caller's own regions.
pub fn check_user_range(
    space: &AddressSpace,
    caller: &Pcb,
    ptr: u32,
    len: u32,
) -> Result<(), SyscallError> {
    if ptr == 0 {
        return Err(SyscallError::BadAddress);
    }
    let end = ptr.checked_add(len).ok_or(SyscallError::BadAddress)?;
    if end > KERNEL_VIRTUAL_BASE {
        return Err(SyscallError::BadAddress);
    }
    if !space.is_user_range(ptr, len) || !caller.owns_range(ptr, len) {
        return Err(SyscallError::BadAddress);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessTable;
    use crate::tests::mock::{boot_memory, kernel_stacks};

    #[test]
    fn test_range_checks() {
        let (mut space, mut frames, mut hal) = boot_memory(128);
        let mut table = ProcessTable::new(kernel_stacks());
        let a = table.create("a", 16, &mut space, &mut frames, &mut hal).unwrap();
        let b = table.create("b", 16, &mut space, &mut frames, &mut hal).unwrap();
        let pa = table.get(a).unwrap();
        let pb = table.get(b).unwrap();

        assert_eq!(check_user_range(&space, pa, 0x4000_0010, 16), Ok(()));
        assert_eq!(check_user_range(&space, pa, 0xBFFF_EFF0, 16), Ok(()));
        assert_eq!(check_user_range(&space, pa, 0, 16), Err(SyscallError::BadAddress));
        assert_eq!(
            check_user_range(&space, pa, KERNEL_VIRTUAL_BASE, 2),
            Err(SyscallError::BadAddress)
        );
        assert_eq!(
            check_user_range(&space, pa, 0xFFFF_FFF0, 0x20),
            Err(SyscallError::BadAddress)
        );
        // Straddles the end of the code region.
        assert_eq!(
            check_user_range(&space, pa, 0x403F_FFFF, 2),
            Err(SyscallError::BadAddress)
        );
        // Another process's region is mapped user-accessible but not owned.
        assert_eq!(
            check_user_range(&space, pa, 0x4040_0000, 4),
            Err(SyscallError::BadAddress)
        );
        assert_eq!(check_user_range(&space, pb, 0x4040_0000, 4), Ok(()));
        // Kernel identity window.
        assert_eq!(check_user_range(&space, pa, 0xB8000, 4), Err(SyscallError::BadAddress));
    }
}
