//! Process Table
//!
//! Fixed-capacity table of process control blocks. Slots fill in creation
//! order and are never reclaimed; an exited process keeps its slot.

use super::context::{InitialFrame, KernelStacks, ResumePoint};
use super::pcb::{Pcb, ProcessId, ProcessState};
use crate::arch::Hal;
use crate::config::{FRAME_SIZE, MAX_PROCESSES, USER_STACK_GUARD};
use crate::memory::{AddressSpace, FrameAllocator, MapError, RegionPurpose, VirtAddr};
use core::fmt;

/// Reference to a created process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcbHandle {
    slot: usize,
    id: ProcessId,
}

impl PcbHandle {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }
}

/// Process creation and loading errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// Every slot is taken.
    TableFull,
    /// Program does not fit in one code region.
    ImageTooLarge,
    /// No image supplied.
    NullImage,
    /// Zero-length image.
    EmptyImage,
    /// Handle does not name a live slot.
    InvalidHandle,
    /// Region setup failed.
    Map(MapError),
}

impl From<MapError> for ProcessError {
    fn from(err: MapError) -> Self {
        ProcessError::Map(err)
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull => write!(f, "process table full"),
            Self::ImageTooLarge => write!(f, "image larger than a code region"),
            Self::NullImage => write!(f, "no image"),
            Self::EmptyImage => write!(f, "empty image"),
            Self::InvalidHandle => write!(f, "invalid process handle"),
            Self::Map(err) => write!(f, "mapping failed: {}", err),
        }
    }
}

/// The process table.
pub struct ProcessTable {
    slots: [Pcb; MAX_PROCESSES],
    stacks: &'static KernelStacks,
    count: usize,
    next_id: u32,
    running: Option<usize>,
}

impl ProcessTable {
    /// Empty table whose processes run on `stacks`.
    pub const fn new(stacks: &'static KernelStacks) -> Self {
        Self {
            slots: [const { Pcb::empty() }; MAX_PROCESSES],
            stacks,
            count: 0,
            next_id: 1,
            running: None,
        }
    }

    /// Create a process able to hold an image of `image_len` bytes.
    ///
    /// Maps its code and stack regions, reserves its kernel stack and
    /// synthesizes the frame the switch path will first resume it from.
    pub fn create<H: Hal>(
        &mut self,
        name: &str,
        image_len: usize,
        space: &mut AddressSpace,
        frames: &mut FrameAllocator,
        hal: &mut H,
    ) -> Result<PcbHandle, ProcessError> {
        if self.count == MAX_PROCESSES {
            log::warn!("[PROC] Cannot create '{}': table full", name);
            return Err(ProcessError::TableFull);
        }
        if image_len > FRAME_SIZE {
            return Err(ProcessError::ImageTooLarge);
        }

        let slot = self.count;
        let code = space.map_process_region(slot, RegionPurpose::Code, frames, hal)?;
        let stack = match space.map_process_region(slot, RegionPurpose::Stack, frames, hal) {
            Ok(stack) => stack,
            Err(err) => {
                // Leave no half-built process behind.
                if let Err(undo) = space.unmap_region(&code, frames, hal) {
                    log::warn!(
                        "[PROC] Rollback of '{}' code region at {} failed: {}",
                        name,
                        code.base,
                        undo
                    );
                }
                log::warn!("[PROC] Cannot create '{}': stack region: {}", name, err);
                return Err(err.into());
            }
        };

        let id = ProcessId(self.next_id);
        self.next_id += 1;

        let entry = code.base;
        let user_stack_top = VirtAddr::new(stack.base.as_u32() + FRAME_SIZE as u32 - USER_STACK_GUARD);
        let frame = InitialFrame::new(hal.user_entry_trampoline(), entry, user_stack_top);

        let pcb = &mut self.slots[slot];
        pcb.id = id;
        pcb.set_name(name);
        pcb.state = ProcessState::Ready;
        pcb.entry = entry;
        pcb.user_stack_top = user_stack_top;
        pcb.run_count = 0;
        pcb.exit_code = None;
        pcb.code = Some(code);
        pcb.stack = Some(stack);
        pcb.kernel_stack_top = self.stacks.top(slot);
        // SAFETY: the slot has never been handed out, so nothing runs on
        // or is suspended in its kernel stack.
        unsafe { self.stacks.push_initial_frame(slot, &frame) };
        self.count += 1;

        log::info!(
            "[PROC] Created pid {} '{}' in slot {}: entry {}, stack {}",
            id,
            pcb.name(),
            slot,
            entry,
            user_stack_top
        );

        Ok(PcbHandle { slot, id })
    }

    /// Copy a raw program image into the process's code region.
    pub fn load<H: Hal>(
        &mut self,
        handle: PcbHandle,
        image: Option<&[u8]>,
        space: &AddressSpace,
        hal: &mut H,
    ) -> Result<(), ProcessError> {
        let image = image.ok_or(ProcessError::NullImage)?;
        if image.is_empty() {
            return Err(ProcessError::EmptyImage);
        }
        let pcb = self.get(handle).ok_or(ProcessError::InvalidHandle)?;
        let code = pcb.code.ok_or(ProcessError::InvalidHandle)?;
        if image.len() > FRAME_SIZE {
            return Err(ProcessError::ImageTooLarge);
        }

        hal.copy_to_user(space.directory(), code.base, image);
        log::debug!(
            "[PROC] Loaded {} bytes for pid {} at {}",
            image.len(),
            pcb.id,
            code.base
        );
        Ok(())
    }

    pub fn get(&self, handle: PcbHandle) -> Option<&Pcb> {
        self.slots[..self.count]
            .get(handle.slot)
            .filter(|pcb| pcb.id == handle.id)
    }

    pub fn slot(&self, slot: usize) -> Option<&Pcb> {
        self.slots[..self.count].get(slot)
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut Pcb> {
        self.slots[..self.count].get_mut(slot)
    }

    /// Kernel stacks backing the table's slots.
    pub fn stacks(&self) -> &'static KernelStacks {
        self.stacks
    }

    /// The resume point saved for `slot`.
    pub fn resume(&self, slot: usize) -> ResumePoint {
        self.stacks.resume(slot)
    }

    /// Slot of the process that owns the CPU.
    pub fn running_slot(&self) -> Option<usize> {
        self.running
    }

    pub(crate) fn set_running_slot(&mut self, slot: Option<usize>) {
        self.running = slot;
    }

    pub fn running(&self) -> Option<&Pcb> {
        self.running.and_then(|slot| self.slot(slot))
    }

    pub fn running_mut(&mut self) -> Option<&mut Pcb> {
        self.running.and_then(move |slot| self.slot_mut(slot))
    }

    /// Number of created processes.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.slots[..self.count].iter()
    }

    pub fn exited_count(&self) -> usize {
        self.iter().filter(|pcb| pcb.is_exited()).count()
    }

    /// Sum of run counts over all processes.
    pub fn total_runs(&self) -> u64 {
        self.iter().map(|pcb| pcb.run_count as u64).sum()
    }

    /// Whether at least one process exists and every one has exited.
    pub fn all_exited(&self) -> bool {
        !self.is_empty() && self.iter().all(Pcb::is_exited)
    }
}
