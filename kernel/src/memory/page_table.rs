//! Page directory for 32-bit paging with 4 MiB pages.
//!
//! Only the directory level is used: every present entry sets `PAGE_SIZE`
//! and maps a whole 4 MiB frame, so no second-level tables exist.

use super::{PhysAddr, VirtAddr};
use crate::config::PAGE_DIRECTORY_ENTRIES;
use bitflags::bitflags;

bitflags! {
    /// Page-directory entry flags. Bit positions follow the i386 PDE layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PdeFlags: u32 {
        /// Mapping is present.
        const PRESENT = 1 << 0;
        /// Mapping is writable.
        const WRITABLE = 1 << 1;
        /// Mapping is accessible from ring 3.
        const USER = 1 << 2;
        /// Write-through caching.
        const WRITE_THROUGH = 1 << 3;
        /// Disable caching.
        const CACHE_DISABLE = 1 << 4;
        /// Set by the CPU on access.
        const ACCESSED = 1 << 5;
        /// Set by the CPU on write (4 MiB pages only).
        const DIRTY = 1 << 6;
        /// Entry maps a 4 MiB page (requires CR4.PSE).
        const PAGE_SIZE = 1 << 7;
        /// Not flushed on CR3 reload (requires CR4.PGE).
        const GLOBAL = 1 << 8;
    }
}

impl PdeFlags {
    /// Kernel-only 4 MiB mapping (0x83).
    pub const KERNEL_4MB: Self = Self::PRESENT.union(Self::WRITABLE).union(Self::PAGE_SIZE);

    /// User-accessible 4 MiB mapping (0x87).
    pub const USER_4MB: Self = Self::KERNEL_4MB.union(Self::USER);
}

/// Physical address bits of a 4 MiB PDE (31:22).
const FRAME_ADDR_MASK: u32 = 0xFFC0_0000;

/// A single page-directory entry.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDirectoryEntry(u32);

impl PageDirectoryEntry {
    /// Create an empty (not present) entry.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Entry mapping the 4 MiB frame at `frame` with `flags`.
    pub const fn new(frame: PhysAddr, flags: PdeFlags) -> Self {
        Self((frame.as_u32() & FRAME_ADDR_MASK) | flags.bits())
    }

    pub const fn is_unused(&self) -> bool {
        self.0 == 0
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(PdeFlags::PRESENT)
    }

    pub fn flags(&self) -> PdeFlags {
        PdeFlags::from_bits_truncate(self.0)
    }

    /// Physical frame this entry points to, if present.
    pub fn frame(&self) -> Option<PhysAddr> {
        self.is_present().then_some(PhysAddr::new(self.0 & FRAME_ADDR_MASK))
    }

    /// Raw entry bits as the MMU sees them.
    pub const fn bits(&self) -> u32 {
        self.0
    }
}

/// The 1024-entry page directory, page aligned so CR3 can point at it.
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PageDirectoryEntry; PAGE_DIRECTORY_ENTRIES],
}

impl PageDirectory {
    /// Create an empty directory.
    pub const fn new() -> Self {
        Self {
            entries: [PageDirectoryEntry::empty(); PAGE_DIRECTORY_ENTRIES],
        }
    }

    pub fn entry(&self, index: usize) -> PageDirectoryEntry {
        self.entries[index]
    }

    pub fn set_entry(&mut self, index: usize, entry: PageDirectoryEntry) {
        self.entries[index] = entry;
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.entries = [PageDirectoryEntry::empty(); PAGE_DIRECTORY_ENTRIES];
    }

    /// Translate a virtual address through the directory.
    pub fn translate(&self, virt: VirtAddr) -> Option<PhysAddr> {
        let frame = self.entries[virt.directory_index()].frame()?;
        Some(PhysAddr::new(frame.as_u32() + virt.frame_offset()))
    }

    /// Iterate over `(index, entry)` pairs of present entries.
    pub fn present_entries(&self) -> impl Iterator<Item = (usize, PageDirectoryEntry)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, entry)| entry.is_present())
    }

    /// Address of the table, for loading into CR3.
    pub fn as_ptr(&self) -> *const PageDirectoryEntry {
        self.entries.as_ptr()
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bit_positions() {
        assert_eq!(PdeFlags::KERNEL_4MB.bits(), 0x83);
        assert_eq!(PdeFlags::USER_4MB.bits(), 0x87);
        assert_eq!(PdeFlags::GLOBAL.bits(), 0x100);
    }

    #[test]
    fn test_entry_encoding() {
        let entry = PageDirectoryEntry::new(PhysAddr::new(0x0140_0000), PdeFlags::USER_4MB);
        assert_eq!(entry.bits(), 0x0140_0087);
        assert_eq!(entry.frame(), Some(PhysAddr::new(0x0140_0000)));
        assert!(entry.flags().contains(PdeFlags::USER));
        assert!(PageDirectoryEntry::empty().frame().is_none());
    }

    #[test]
    fn test_translate() {
        let mut dir = PageDirectory::new();
        dir.set_entry(256, PageDirectoryEntry::new(PhysAddr::new(0x0100_0000), PdeFlags::USER_4MB));

        assert_eq!(
            dir.translate(VirtAddr::new(0x4000_1234)),
            Some(PhysAddr::new(0x0100_1234))
        );
        assert_eq!(dir.translate(VirtAddr::new(0x4040_0000)), None);
        assert_eq!(dir.present_entries().count(), 1);
    }

    #[test]
    fn test_directory_is_page_aligned() {
        assert_eq!(core::mem::align_of::<PageDirectory>(), 4096);
        assert_eq!(core::mem::size_of::<PageDirectory>(), 4096);
    }
}
