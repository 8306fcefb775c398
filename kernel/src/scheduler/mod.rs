//! Round-robin preemptive scheduler.
//!
//! Selection happens with kernel state locked and produces a [`Dispatch`]
//! describing what the CPU should do next. The register-level switch is
//! performed by the caller **after** the lock is dropped (see
//! [`SwitchPlan`]).

use crate::arch::Hal;
use crate::process::{ProcessId, ProcessState, ProcessTable, ResumePoint};

/// Global scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// No process selected yet.
    Idle,
    /// A process owns the CPU.
    Dispatching,
    /// Every process has exited.
    AllExited,
}

/// A context switch decided under the kernel lock.
///
/// `save_to` points at the outgoing context's resume slot, which the
/// switch path overwrites with the current stack pointer before loading
/// `resume`. The slot lives in the [`KernelStacks`](crate::process::KernelStacks)
/// static, outside the kernel lock, so writing it after the lock is
/// released touches no locked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPlan {
    pub save_to: *mut usize,
    pub resume: ResumePoint,
    pub from: Option<ProcessId>,
    pub to: ProcessId,
}

/// Outcome of one scheduler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing to run; keep idling.
    Idle,
    /// Return to the interrupted process.
    Resume,
    /// Switch to another context.
    Switch(SwitchPlan),
    /// All processes have exited; run the exit report.
    AllExited,
}

/// Scheduler state.
pub struct Scheduler {
    phase: SchedulerPhase,
    context_switches: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            context_switches: 0,
        }
    }

    /// Pick the next process.
    ///
    /// The outgoing process (if any, and not exited) goes back to `Ready`;
    /// the table is scanned from the slot after it, wrapping, for the
    /// first `Ready` process. Selecting the outgoing process again is
    /// reported as [`Dispatch::Resume`] rather than a switch.
    pub fn schedule<H: Hal>(&mut self, table: &mut ProcessTable, hal: &mut H) -> Dispatch {
        if self.phase == SchedulerPhase::AllExited {
            return Dispatch::AllExited;
        }
        if table.is_empty() {
            return Dispatch::Idle;
        }

        let prev = table.running_slot();
        if let Some(pcb) = table.running_mut() {
            if pcb.state == ProcessState::Running {
                pcb.state = ProcessState::Ready;
            }
        }

        let count = table.len();
        let start = prev.map_or(0, |slot| slot + 1);
        let next = (0..count)
            .map(|i| (start + i) % count)
            .find(|&slot| table.slot(slot).is_some_and(|pcb| pcb.state == ProcessState::Ready));

        let Some(next) = next else {
            if table.all_exited() {
                self.phase = SchedulerPhase::AllExited;
                table.set_running_slot(None);
                log::info!("[SCHED] All {} processes exited", count);
                return Dispatch::AllExited;
            }
            return Dispatch::Resume;
        };

        table.set_running_slot(Some(next));
        self.phase = SchedulerPhase::Dispatching;

        let (to, stack_top) = match table.slot_mut(next) {
            Some(pcb) => {
                pcb.state = ProcessState::Running;
                pcb.run_count += 1;
                (pcb.id, pcb.kernel_stack_top)
            }
            None => return Dispatch::Resume,
        };
        hal.set_kernel_stack(stack_top);

        // Don't switch to ourselves.
        if prev == Some(next) {
            log::trace!("[SCHED] Continue pid {}", to);
            return Dispatch::Resume;
        }

        let from = prev.and_then(|slot| table.slot(slot)).map(|pcb| pcb.id);
        let save_to = table.stacks().save_slot(prev);
        let resume = table.resume(next);

        self.context_switches += 1;
        match from {
            Some(from) => log::debug!("[SCHED] Switch pid {} -> pid {}", from, to),
            None => log::info!("[SCHED] Starting pid {}", to),
        }

        Dispatch::Switch(SwitchPlan {
            save_to,
            resume,
            from,
            to,
        })
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Total context switches performed.
    pub fn context_switches(&self) -> u64 {
        self.context_switches
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessState;
    use crate::tests::mock::{boot_memory, kernel_stacks, MockHal};

    fn table_with(n: usize) -> (ProcessTable, MockHal) {
        let (mut space, mut frames, mut hal) = boot_memory(128);
        let mut table = ProcessTable::new(kernel_stacks());
        for _ in 0..n {
            table
                .create("p", 16, &mut space, &mut frames, &mut hal)
                .unwrap();
        }
        (table, hal)
    }

    fn selected(dispatch: Dispatch) -> Option<ProcessId> {
        match dispatch {
            Dispatch::Switch(plan) => Some(plan.to),
            _ => None,
        }
    }

    #[test]
    fn test_empty_table_idles() {
        let (mut table, mut hal) = table_with(0);
        let mut sched = Scheduler::new();
        assert_eq!(sched.schedule(&mut table, &mut hal), Dispatch::Idle);
        assert_eq!(sched.phase(), SchedulerPhase::Idle);
    }

    #[test]
    fn test_first_switch_saves_boot_context() {
        let (mut table, mut hal) = table_with(2);
        let mut sched = Scheduler::new();

        let Dispatch::Switch(plan) = sched.schedule(&mut table, &mut hal) else {
            panic!("expected a switch");
        };
        assert_eq!(plan.from, None);
        assert_eq!(plan.to, ProcessId(1));
        assert_eq!(plan.resume, table.resume(0));
        assert_eq!(plan.save_to, table.stacks().save_slot(None));
        assert_eq!(sched.phase(), SchedulerPhase::Dispatching);
        assert_eq!(hal.kernel_stack, Some(table.stacks().top(0)));
    }

    #[test]
    fn test_switch_saves_into_outgoing_slot() {
        let (mut table, mut hal) = table_with(2);
        let mut sched = Scheduler::new();
        sched.schedule(&mut table, &mut hal);

        let Dispatch::Switch(plan) = sched.schedule(&mut table, &mut hal) else {
            panic!("expected a switch");
        };
        assert_eq!(plan.from, Some(ProcessId(1)));
        assert_eq!(plan.save_to, table.stacks().save_slot(Some(0)));
        assert_eq!(plan.resume, table.resume(1));

        // What the switch path stores is what slot 0 resumes from next.
        // SAFETY: save_to is slot 0's resume cell and nothing runs on it.
        unsafe { *plan.save_to = 0xDEAD_0000 };
        let Dispatch::Switch(back) = sched.schedule(&mut table, &mut hal) else {
            panic!("expected a switch");
        };
        assert_eq!(back.to, ProcessId(1));
        assert_eq!(back.resume, ResumePoint(0xDEAD_0000));
    }

    #[test]
    fn test_single_process_is_resumed_not_switched() {
        let (mut table, mut hal) = table_with(1);
        let mut sched = Scheduler::new();

        assert!(selected(sched.schedule(&mut table, &mut hal)).is_some());
        assert_eq!(sched.schedule(&mut table, &mut hal), Dispatch::Resume);
        assert_eq!(table.slot(0).unwrap().state, ProcessState::Running);
        assert_eq!(table.slot(0).unwrap().run_count, 2);
        assert_eq!(sched.context_switches(), 1);
    }

    #[test]
    fn test_rotation_wraps_in_slot_order() {
        let (mut table, mut hal) = table_with(3);
        let mut sched = Scheduler::new();

        let order: Vec<_> = (0..6)
            .map(|_| selected(sched.schedule(&mut table, &mut hal)).unwrap().0)
            .collect();
        assert_eq!(order, [1, 2, 3, 1, 2, 3]);
        assert_eq!(table.iter().filter(|p| p.state == ProcessState::Running).count(), 1);
    }

    #[test]
    fn test_exited_prev_switches_away() {
        let (mut table, mut hal) = table_with(2);
        let mut sched = Scheduler::new();
        sched.schedule(&mut table, &mut hal);

        table.running_mut().unwrap().state = ProcessState::Exited;
        let Dispatch::Switch(plan) = sched.schedule(&mut table, &mut hal) else {
            panic!("expected a switch");
        };
        assert_eq!(plan.from, Some(ProcessId(1)));
        assert_eq!(plan.to, ProcessId(2));
        assert_eq!(table.slot(0).unwrap().state, ProcessState::Exited);
    }

    #[test]
    fn test_all_exited_is_terminal() {
        let (mut table, mut hal) = table_with(1);
        let mut sched = Scheduler::new();
        sched.schedule(&mut table, &mut hal);

        table.running_mut().unwrap().state = ProcessState::Exited;
        assert_eq!(sched.schedule(&mut table, &mut hal), Dispatch::AllExited);
        assert_eq!(sched.phase(), SchedulerPhase::AllExited);
        assert!(table.running().is_none());
        assert_eq!(sched.schedule(&mut table, &mut hal), Dispatch::AllExited);
    }
}
