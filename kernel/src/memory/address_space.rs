//! Address-space builder.
//!
//! A single page directory shared by the kernel and every process:
//!
//! | Directory index        | Virtual range              | Owner              |
//! |------------------------|----------------------------|--------------------|
//! | 0..=3                  | 0x0000_0000..0x0100_0000   | kernel (identity)  |
//! | 256 + slot             | 0x4000_0000 + slot * 4 MiB | process code       |
//! | 767 - slot             | 0xBFC0_0000 - slot * 4 MiB | process stack      |
//! | 768..                  | 0xC000_0000..              | kernel reserved    |

use super::{FrameAllocator, PageDirectory, PageDirectoryEntry, PdeFlags, PhysAddr, VirtAddr};
use crate::arch::Hal;
use crate::config::{
    FRAME_SIZE, KERNEL_IDENTITY_ENTRIES, KERNEL_VIRTUAL_BASE, MAX_PROCESSES, USER_CODE_PDE_BASE,
    USER_STACK_PDE_TOP,
};
use core::fmt;

/// What a process region is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionPurpose {
    Code,
    Stack,
}

/// Address-space errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Slot index beyond the process capacity.
    SlotOutOfRange,
    /// The directory entry for this slot is already in use.
    AlreadyMapped,
    /// The directory entry does not hold the expected mapping.
    NotMapped,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotOutOfRange => write!(f, "process slot out of range"),
            Self::AlreadyMapped => write!(f, "region already mapped"),
            Self::NotMapped => write!(f, "region not mapped"),
        }
    }
}

/// A user region installed for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRegion {
    pub purpose: RegionPurpose,
    /// Directory index holding the mapping.
    pub index: usize,
    /// Virtual base of the region.
    pub base: VirtAddr,
    /// Backing physical frame.
    pub frame: PhysAddr,
}

impl MappedRegion {
    /// Exclusive virtual end of the region.
    pub fn end(&self) -> u64 {
        self.base.as_u32() as u64 + FRAME_SIZE as u64
    }

    /// Whether `addr..addr+len` lies entirely inside this region.
    pub fn contains(&self, addr: u32, len: u32) -> bool {
        let start = addr as u64;
        start >= self.base.as_u32() as u64 && start + len as u64 <= self.end()
    }
}

/// The kernel's page directory and the bookkeeping around it.
pub struct AddressSpace {
    directory: PageDirectory,
    active: bool,
}

impl AddressSpace {
    pub const fn new() -> Self {
        Self {
            directory: PageDirectory::new(),
            active: false,
        }
    }

    /// Build the kernel identity window and turn on translation.
    ///
    /// Claims the frames backing the window so they are never handed to
    /// a process.
    pub fn init<H: Hal>(&mut self, frames: &mut FrameAllocator, hal: &mut H) {
        self.directory.clear();

        for index in 0..KERNEL_IDENTITY_ENTRIES {
            let frame = PhysAddr::from_frame_index(index);
            self.directory
                .set_entry(index, PageDirectoryEntry::new(frame, PdeFlags::KERNEL_4MB));
        }
        let claimed = frames.reserve_range(0, (KERNEL_IDENTITY_ENTRIES * FRAME_SIZE) as u64);

        hal.activate_paging(&self.directory);
        self.active = true;

        log::info!(
            "[VMM] Identity-mapped {} MiB for the kernel ({} frames claimed), paging on",
            KERNEL_IDENTITY_ENTRIES * FRAME_SIZE / (1024 * 1024),
            claimed
        );
    }

    /// Directory index for a process region.
    ///
    /// Code regions grow up from index 256 and stack regions grow down
    /// from index 767, so distinct slots never share an entry.
    pub fn region_index(slot: usize, purpose: RegionPurpose) -> Result<usize, MapError> {
        if slot >= MAX_PROCESSES {
            return Err(MapError::SlotOutOfRange);
        }
        Ok(match purpose {
            RegionPurpose::Code => USER_CODE_PDE_BASE + slot,
            RegionPurpose::Stack => USER_STACK_PDE_TOP - slot,
        })
    }

    /// Back a process region with a fresh frame and map it user-accessible.
    ///
    /// Frame exhaustion is fatal (see [`FrameAllocator::alloc`]).
    pub fn map_process_region<H: Hal>(
        &mut self,
        slot: usize,
        purpose: RegionPurpose,
        frames: &mut FrameAllocator,
        hal: &mut H,
    ) -> Result<MappedRegion, MapError> {
        let index = Self::region_index(slot, purpose)?;
        if !self.directory.entry(index).is_unused() {
            return Err(MapError::AlreadyMapped);
        }

        let frame = frames.alloc();
        self.directory
            .set_entry(index, PageDirectoryEntry::new(frame, PdeFlags::USER_4MB));

        let base = VirtAddr::from_directory_index(index);
        if self.active {
            hal.flush_tlb(base);
        }

        log::debug!(
            "[VMM] Slot {} {:?} region: PDE {} -> {} at {}",
            slot,
            purpose,
            index,
            frame,
            base
        );

        Ok(MappedRegion {
            purpose,
            index,
            base,
            frame,
        })
    }

    /// Remove a process region and return its frame to the allocator.
    pub fn unmap_region<H: Hal>(
        &mut self,
        region: &MappedRegion,
        frames: &mut FrameAllocator,
        hal: &mut H,
    ) -> Result<(), MapError> {
        if self.directory.entry(region.index).frame() != Some(region.frame) {
            return Err(MapError::NotMapped);
        }

        self.directory.set_entry(region.index, PageDirectoryEntry::empty());
        if self.active {
            hal.flush_tlb(region.base);
        }
        if let Err(err) = frames.free(region.frame) {
            log::warn!("[VMM] Unmapped {} but its frame was not owned: {}", region.base, err);
        }

        log::debug!("[VMM] Unmapped PDE {} ({})", region.index, region.base);
        Ok(())
    }

    pub fn translate(&self, virt: VirtAddr) -> Option<PhysAddr> {
        self.directory.translate(virt)
    }

    /// Whether `addr..addr+len` lies below the kernel's reserved region,
    /// does not wrap, and is covered by present user mappings.
    pub fn is_user_range(&self, addr: u32, len: u32) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        if end > KERNEL_VIRTUAL_BASE {
            return false;
        }
        if len == 0 {
            return true;
        }

        let first = VirtAddr::new(addr).directory_index();
        let last = VirtAddr::new(end - 1).directory_index();
        (first..=last).all(|index| {
            let flags = self.directory.entry(index).flags();
            flags.contains(PdeFlags::PRESENT | PdeFlags::USER)
        })
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    /// Whether paging has been turned on for this directory.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
