//! Memory management subsystem.
//!
//! # Components
//!
//! - **FrameAllocator**: 4 MiB physical frame bitmap seeded from the boot memory map
//! - **PageDirectory**: the single 1024-entry 32-bit mapping table
//! - **AddressSpace**: kernel identity window plus per-process code/stack regions

pub mod address_space;
pub mod frame;
pub mod page_table;

pub use address_space::{AddressSpace, MapError, MappedRegion, RegionPurpose};
pub use frame::{FrameAllocator, FrameError};
pub use page_table::{PageDirectory, PageDirectoryEntry, PdeFlags};

use crate::config::{FRAME_SHIFT, FRAME_SIZE};
use core::fmt;

/// A 32-bit physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(pub u32);

/// A 32-bit virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(pub u32);

impl PhysAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Whether this address sits on a frame boundary.
    pub const fn is_frame_aligned(self) -> bool {
        self.0 as usize % FRAME_SIZE == 0
    }

    /// Bitmap index of the frame containing this address.
    pub const fn frame_index(self) -> usize {
        (self.0 >> FRAME_SHIFT) as usize
    }

    /// Base address of the frame with the given bitmap index.
    pub const fn from_frame_index(index: usize) -> Self {
        Self((index << FRAME_SHIFT) as u32)
    }
}

impl VirtAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Page-directory index covering this address.
    pub const fn directory_index(self) -> usize {
        (self.0 >> FRAME_SHIFT) as usize
    }

    /// Offset of this address inside its 4 MiB mapping.
    pub const fn frame_offset(self) -> u32 {
        self.0 & (FRAME_SIZE as u32 - 1)
    }

    /// Base virtual address of the given directory index.
    pub const fn from_directory_index(index: usize) -> Self {
        Self((index << FRAME_SHIFT) as u32)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Kind of a boot-reported physical range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegionKind {
    Usable,
    Reserved,
}

/// A physical range reported by the boot loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u64,
    pub len: u64,
    pub kind: MemoryRegionKind,
}

impl MemoryRegion {
    pub const fn usable(start: u64, len: u64) -> Self {
        Self {
            start,
            len,
            kind: MemoryRegionKind::Usable,
        }
    }

    pub const fn reserved(start: u64, len: u64) -> Self {
        Self {
            start,
            len,
            kind: MemoryRegionKind::Reserved,
        }
    }

    /// Exclusive end address, saturating at the top of the 64-bit range.
    pub const fn end(&self) -> u64 {
        self.start.saturating_add(self.len)
    }
}

/// Maximum number of ranges kept from the boot memory map.
pub const MAX_MEMORY_REGIONS: usize = 32;

/// Boot-time memory descriptor handed to the frame allocator.
#[derive(Debug, Clone, Copy)]
pub struct BootMemoryMap {
    /// Total physical memory size in bytes.
    pub total_memory: u64,
    regions: [MemoryRegion; MAX_MEMORY_REGIONS],
    len: usize,
    usable_end: u64,
}

impl BootMemoryMap {
    pub const fn new(total_memory: u64) -> Self {
        Self {
            total_memory,
            regions: [MemoryRegion::reserved(0, 0); MAX_MEMORY_REGIONS],
            len: 0,
            usable_end: 0,
        }
    }

    /// Record a range.
    ///
    /// A range touching the previous one and of the same kind extends it.
    /// Once the map is full, a reserved range takes the place of the last
    /// usable entry, or widens the nearest reserved entry to cover itself
    /// when none is left, so reserved memory is never lost. A usable range
    /// that does not fit is dropped and reported as `false`.
    pub fn push(&mut self, region: MemoryRegion) -> bool {
        if region.kind == MemoryRegionKind::Usable {
            self.usable_end = self.usable_end.max(region.end());
        }
        if region.len == 0 {
            return true;
        }

        if let Some(last) = self.regions[..self.len].last_mut() {
            if last.kind == region.kind && region.start >= last.start && region.start <= last.end() {
                last.len = last.end().max(region.end()) - last.start;
                return true;
            }
        }

        if self.len < MAX_MEMORY_REGIONS {
            self.regions[self.len] = region;
            self.len += 1;
            return true;
        }

        if region.kind == MemoryRegionKind::Usable {
            log::warn!(
                "[PMM] Boot memory map full, dropping usable {:#x}..{:#x}",
                region.start,
                region.end()
            );
            return false;
        }

        let regions = &mut self.regions[..self.len];
        if let Some(index) = regions.iter().rposition(|r| r.kind == MemoryRegionKind::Usable) {
            let evicted = regions[index];
            let last = regions.len() - 1;
            regions.copy_within(index + 1.., index);
            regions[last] = region;
            log::warn!(
                "[PMM] Boot memory map full, evicted usable {:#x}..{:#x} for reserved {:#x}..{:#x}",
                evicted.start,
                evicted.end(),
                region.start,
                region.end()
            );
            return true;
        }

        let gap = |r: &MemoryRegion| {
            if region.end() < r.start {
                r.start - region.end()
            } else {
                region.start.saturating_sub(r.end())
            }
        };
        if let Some(nearest) = regions.iter_mut().min_by_key(|r| gap(r)) {
            let start = nearest.start.min(region.start);
            let end = nearest.end().max(region.end());
            log::warn!(
                "[PMM] Boot memory map full, widening reserved {:#x}..{:#x} to {:#x}..{:#x}",
                nearest.start,
                nearest.end(),
                start,
                end
            );
            nearest.start = start;
            nearest.len = end - start;
        }
        true
    }

    /// End of the highest usable range ever pushed, including ranges that
    /// were dropped or evicted.
    pub fn usable_end(&self) -> u64 {
        self.usable_end
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions[..self.len]
    }
}
