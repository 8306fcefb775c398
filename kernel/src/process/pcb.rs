//! Process control block.

use crate::config::PROCESS_NAME_LEN;
use crate::memory::{MappedRegion, VirtAddr};

/// Process ID type. Assigned from 1 upward and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Placeholder for an unused slot.
    pub const NONE: ProcessId = ProcessId(0);

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Waiting for the scheduler
    Ready,
    /// Owns the CPU
    Running,
    /// Finished; never scheduled again
    Exited,
}

/// One schedulable process.
pub struct Pcb {
    pub id: ProcessId,
    name: [u8; PROCESS_NAME_LEN + 1],
    name_len: usize,
    pub state: ProcessState,
    /// User entry point (base of the code region).
    pub entry: VirtAddr,
    /// Initial user stack pointer.
    pub user_stack_top: VirtAddr,
    /// Quanta this process has been given.
    pub run_count: u32,
    /// Exit status once `Exited`.
    pub exit_code: Option<i32>,
    pub code: Option<MappedRegion>,
    pub stack: Option<MappedRegion>,
    /// Initial stack pointer of the process's kernel stack, loaded into
    /// the TSS whenever it is selected.
    pub kernel_stack_top: usize,
}

impl Pcb {
    pub const fn empty() -> Self {
        Self {
            id: ProcessId::NONE,
            name: [0; PROCESS_NAME_LEN + 1],
            name_len: 0,
            state: ProcessState::Exited,
            entry: VirtAddr(0),
            user_stack_top: VirtAddr(0),
            run_count: 0,
            exit_code: None,
            code: None,
            stack: None,
            kernel_stack_top: 0,
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("?")
    }

    /// Store `name`, truncated to the longest char-boundary prefix that fits.
    pub fn set_name(&mut self, name: &str) {
        let mut len = name.len().min(PROCESS_NAME_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        self.name = [0; PROCESS_NAME_LEN + 1];
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        self.name_len = len;
    }

    pub fn is_exited(&self) -> bool {
        self.state == ProcessState::Exited
    }

    /// Whether `addr..addr+len` lies inside this process's own code or
    /// stack region.
    pub fn owns_range(&self, addr: u32, len: u32) -> bool {
        [self.code, self.stack]
            .iter()
            .flatten()
            .any(|region| region.contains(addr, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_truncation() {
        let mut pcb = Pcb::empty();
        pcb.set_name("hello");
        assert_eq!(pcb.name(), "hello");

        pcb.set_name("a-very-long-process-name-that-does-not-fit");
        assert_eq!(pcb.name().len(), PROCESS_NAME_LEN);

        // Multi-byte char straddling the limit is dropped whole.
        let name = "abcdefghijklmnopqrstuvwxyz1234é";
        pcb.set_name(name);
        assert_eq!(pcb.name(), "abcdefghijklmnopqrstuvwxyz1234");
    }

    #[test]
    fn test_process_id_display() {
        assert_eq!(format!("{}", ProcessId(7)), "7");
    }
}
