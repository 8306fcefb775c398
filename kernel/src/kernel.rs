//! Kernel state.
//!
//! [`Kernel`] owns every mutable table: the frame bitmap, the page
//! directory, the process table and the scheduler. Interrupt and trap
//! handlers reach it through one lock and hand back a [`Dispatch`] the
//! architecture code acts on after releasing that lock.

use crate::arch::Hal;
use crate::config::TIMER_FREQUENCY;
use crate::memory::{AddressSpace, BootMemoryMap, FrameAllocator};
use crate::process::{KernelStacks, PcbHandle, ProcessError, ProcessState, ProcessTable};
use crate::programs::Program;
use crate::scheduler::{Dispatch, Scheduler};
use crate::syscall::{self, SyscallContext, SyscallEnv, SyscallOutcome};
use core::fmt;

/// Register frame saved when a fault was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultRegisters {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    /// Stack pointer inside the trap handler.
    pub esp: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    /// User stack pointer and segment, pushed by the CPU for ring 3 faults.
    pub user_stack: Option<(u32, u32)>,
}

impl fmt::Display for FaultRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "eax={:#010x} ebx={:#010x} ecx={:#010x} edx={:#010x} \
             esi={:#010x} edi={:#010x} ebp={:#010x} esp={:#010x} \
             eip={:#010x} cs={:#x} eflags={:#010x}",
            self.eax,
            self.ebx,
            self.ecx,
            self.edx,
            self.esi,
            self.edi,
            self.ebp,
            self.esp,
            self.eip,
            self.cs,
            self.eflags
        )?;
        if let Some((esp, ss)) = self.user_stack {
            write!(f, " user_esp={:#010x} user_ss={:#x}", esp, ss)?;
        }
        Ok(())
    }
}

/// Register state of a fault, as logged and recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultInfo {
    pub vector: u8,
    pub error_code: u32,
    pub eip: u32,
    /// CR2 for page faults, 0 otherwise.
    pub address: u32,
    pub regs: FaultRegisters,
}

impl FaultInfo {
    /// Exit code recorded for a process killed by this fault.
    pub fn exit_code(&self) -> i32 {
        -1 - self.vector as i32
    }
}

/// Aggregate results once every process has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub processes: usize,
    pub exited: usize,
    pub total_runs: u64,
    pub context_switches: u64,
    pub free_frames: usize,
    pub ticks: u64,
}

impl ExitReport {
    /// Self-check verdict: every process exited and each ran at least once
    /// on average.
    pub fn passed(&self) -> bool {
        self.processes > 0 && self.exited == self.processes && self.total_runs >= self.processes as u64
    }
}

/// The kernel.
pub struct Kernel<H: Hal> {
    hal: H,
    frames: FrameAllocator,
    space: AddressSpace,
    table: ProcessTable,
    scheduler: Scheduler,
    ticks: u64,
}

impl<H: Hal> Kernel<H> {
    /// A kernel whose processes will run on `stacks`.
    pub const fn new(hal: H, stacks: &'static KernelStacks) -> Self {
        Self {
            hal,
            frames: FrameAllocator::new(),
            space: AddressSpace::new(),
            table: ProcessTable::new(stacks),
            scheduler: Scheduler::new(),
            ticks: 0,
        }
    }

    /// Bring up physical and virtual memory from the boot memory map.
    pub fn boot(&mut self, map: &BootMemoryMap) {
        self.frames.init(map);
        if !self.frames.self_test() {
            log::error!("[PMM] Self-test failed");
        }
        self.space.init(&mut self.frames, &mut self.hal);
    }

    /// Create a process and load `image` into it.
    pub fn spawn(&mut self, name: &str, image: &[u8]) -> Result<PcbHandle, ProcessError> {
        if image.is_empty() {
            return Err(ProcessError::EmptyImage);
        }
        let handle = self
            .table
            .create(name, image.len(), &mut self.space, &mut self.frames, &mut self.hal)?;
        self.table.load(handle, Some(image), &self.space, &mut self.hal)?;
        Ok(handle)
    }

    /// Spawn every program in `manifest`, logging and skipping failures.
    ///
    /// Returns the number of processes created.
    pub fn spawn_all(&mut self, manifest: &[Program]) -> usize {
        let mut spawned = 0;
        for program in manifest {
            match self.spawn(program.name, program.image) {
                Ok(_) => spawned += 1,
                Err(err) => log::error!("[PROC] Failed to spawn '{}': {}", program.name, err),
            }
        }
        spawned
    }

    /// Select the first process to run.
    pub fn start(&mut self) -> Dispatch {
        log::info!("[SCHED] Starting scheduler with {} processes", self.table.len());
        self.scheduler.schedule(&mut self.table, &mut self.hal)
    }

    /// Timer interrupt: count the tick and preempt.
    pub fn on_timer_tick(&mut self) -> Dispatch {
        self.ticks += 1;
        if self.ticks % TIMER_FREQUENCY as u64 == 0 {
            log::debug!("[TIMER] Tick {}", self.ticks);
        }
        self.scheduler.schedule(&mut self.table, &mut self.hal)
    }

    /// `int 0x80` from user mode.
    pub fn syscall(&mut self, num: u32, arg1: u32, arg2: u32, arg3: u32) -> SyscallOutcome {
        let ctx = SyscallContext {
            syscall_num: num,
            arg1,
            arg2,
            arg3,
        };
        let mut env = SyscallEnv {
            table: &mut self.table,
            space: &self.space,
            scheduler: &mut self.scheduler,
            hal: &mut self.hal,
            ticks: self.ticks,
        };
        syscall::dispatch(&ctx, &mut env)
    }

    /// A CPU exception raised by user code: the faulting process exits and
    /// the rest of the system carries on.
    pub fn on_user_fault(&mut self, fault: &FaultInfo) -> Dispatch {
        match self.table.running_mut() {
            Some(pcb) => {
                log::error!(
                    "[EXCEPT] pid {} '{}' killed by vector {} (error {:#x}) at eip {:#010x}, addr {:#010x}",
                    pcb.id,
                    pcb.name(),
                    fault.vector,
                    fault.error_code,
                    fault.eip,
                    fault.address
                );
                pcb.state = ProcessState::Exited;
                pcb.exit_code = Some(fault.exit_code());
            }
            None => log::error!("[EXCEPT] User fault {} with no current process", fault.vector),
        }
        self.scheduler.schedule(&mut self.table, &mut self.hal)
    }

    /// Summarize the run and log one line per process.
    pub fn exit_report(&self) -> ExitReport {
        for pcb in self.table.iter() {
            log::info!(
                "[PROC] pid {} '{}': {:?}, ran {} quanta, exit code {:?}",
                pcb.id,
                pcb.name(),
                pcb.state,
                pcb.run_count,
                pcb.exit_code
            );
        }

        let report = ExitReport {
            processes: self.table.len(),
            exited: self.table.exited_count(),
            total_runs: self.table.total_runs(),
            context_switches: self.scheduler.context_switches(),
            free_frames: self.frames.free_count(),
            ticks: self.ticks,
        };
        log::info!(
            "[SCHED] exited_count={} total_runs={} switches={} free_frames={} ticks={}",
            report.exited,
            report.total_runs,
            report.context_switches,
            report.free_frames,
            report.ticks
        );
        report
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The address space alongside the HAL, for touching user memory.
    #[cfg(test)]
    pub(crate) fn user_memory(&mut self) -> (&AddressSpace, &mut H) {
        (&self.space, &mut self.hal)
    }
}
