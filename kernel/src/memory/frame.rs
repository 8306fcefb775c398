//! Physical frame allocator.
//!
//! One bit per 4 MiB frame, set while the frame has an owner. Allocation
//! is first-fit from frame 0, so consecutive allocations without an
//! intervening free return strictly increasing addresses.

use super::{BootMemoryMap, MemoryRegionKind, PhysAddr};
use crate::config::{FRAME_SIZE, MAX_PHYSICAL_FRAMES};
use core::fmt;

const BITS_PER_WORD: usize = u32::BITS as usize;
const BITMAP_WORDS: usize = MAX_PHYSICAL_FRAMES / BITS_PER_WORD;

/// Frames the boot self-test borrows.
const SELF_TEST_FRAMES: usize = 4;

/// Frame allocator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Every tracked frame is allocated.
    OutOfFrames,
    /// Address lies beyond the tracked physical range.
    OutOfRange,
    /// Address is not on a frame boundary.
    Misaligned,
    /// Frame is not currently allocated.
    NotAllocated,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfFrames => write!(f, "out of physical frames"),
            Self::OutOfRange => write!(f, "frame outside tracked memory"),
            Self::Misaligned => write!(f, "address not frame aligned"),
            Self::NotAllocated => write!(f, "frame not allocated"),
        }
    }
}

/// Bitmap allocator over 4 MiB physical frames.
pub struct FrameAllocator {
    bitmap: [u32; BITMAP_WORDS],
    total_frames: usize,
    used_frames: usize,
}

impl FrameAllocator {
    /// Create an allocator tracking no memory. Call [`init`](Self::init).
    pub const fn new() -> Self {
        Self {
            bitmap: [0; BITMAP_WORDS],
            total_frames: 0,
            used_frames: 0,
        }
    }

    /// Size the bitmap from the boot memory map and mark every frame
    /// overlapping a non-usable range as allocated.
    pub fn init(&mut self, map: &BootMemoryMap) {
        let frames = (map.total_memory / FRAME_SIZE as u64) as usize;
        self.total_frames = frames.min(MAX_PHYSICAL_FRAMES);
        self.bitmap = [0; BITMAP_WORDS];
        self.used_frames = 0;

        for region in map.regions() {
            if region.kind != MemoryRegionKind::Usable {
                let marked = self.reserve_range(region.start, region.len);
                log::debug!(
                    "[PMM] Reserved {:#x}..{:#x} ({} frames)",
                    region.start,
                    region.end(),
                    marked
                );
            }
        }

        log::info!(
            "[PMM] {} frames total, {} used, {} free",
            self.total_frames,
            self.used_frames,
            self.free_count()
        );
    }

    /// Mark every tracked frame overlapping `start..start+len` as allocated.
    ///
    /// Returns the number of frames newly marked.
    pub fn reserve_range(&mut self, start: u64, len: u64) -> usize {
        if len == 0 {
            return 0;
        }
        let first = (start / FRAME_SIZE as u64) as usize;
        let end = start.saturating_add(len);
        let last = end.div_ceil(FRAME_SIZE as u64) as usize;

        let mut marked = 0;
        for index in first..last.min(self.total_frames) {
            if !self.test(index) {
                self.set(index);
                self.used_frames += 1;
                marked += 1;
            }
        }
        marked
    }

    /// Allocate the lowest free frame.
    ///
    /// # Panics
    ///
    /// Panics when no frame is free.
    pub fn alloc(&mut self) -> PhysAddr {
        match self.try_alloc() {
            Ok(addr) => addr,
            Err(err) => panic!(
                "[PMM] {} ({} frames, {} used)",
                err, self.total_frames, self.used_frames
            ),
        }
    }

    /// Allocate the lowest free frame, reporting exhaustion as an error.
    pub fn try_alloc(&mut self) -> Result<PhysAddr, FrameError> {
        let index = self.first_free().ok_or(FrameError::OutOfFrames)?;
        self.set(index);
        self.used_frames += 1;

        let addr = PhysAddr::from_frame_index(index);
        log::debug!("[PMM] Allocated frame {} at {}", index, addr);
        Ok(addr)
    }

    /// Return a frame to the pool.
    ///
    /// Rejects addresses the allocator never handed out without touching
    /// the bitmap.
    pub fn free(&mut self, addr: PhysAddr) -> Result<(), FrameError> {
        if !addr.is_frame_aligned() {
            return Err(FrameError::Misaligned);
        }
        let index = addr.frame_index();
        if index >= self.total_frames {
            return Err(FrameError::OutOfRange);
        }
        if !self.test(index) {
            return Err(FrameError::NotAllocated);
        }

        self.clear(index);
        self.used_frames -= 1;
        log::debug!("[PMM] Freed frame {} at {}", index, addr);
        Ok(())
    }

    /// Number of free frames.
    pub fn free_count(&self) -> usize {
        self.total_frames - self.used_frames
    }

    pub fn used_count(&self) -> usize {
        self.used_frames
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Whether the frame at `addr` is currently owned.
    pub fn is_allocated(&self, addr: PhysAddr) -> bool {
        let index = addr.frame_index();
        index < self.total_frames && self.test(index)
    }

    /// Allocate and release a handful of frames, checking alignment,
    /// ordering and that the free count is restored.
    ///
    /// Returns `false` on any failure. Skipped (returning `true`) when too
    /// few frames are free to borrow.
    pub fn self_test(&mut self) -> bool {
        let free_before = self.free_count();
        if free_before < 2 * SELF_TEST_FRAMES {
            log::info!("[PMM] Self-test skipped, only {} frames free", free_before);
            return true;
        }

        let mut frames = [PhysAddr::default(); SELF_TEST_FRAMES];
        for i in 0..SELF_TEST_FRAMES {
            let Ok(frame) = self.try_alloc() else {
                log::error!("[PMM] Self-test allocation {} failed", i);
                return false;
            };
            if !frame.is_frame_aligned() {
                log::error!("[PMM] Self-test got misaligned frame {}", frame);
                return false;
            }
            if i > 0 && frame <= frames[i - 1] {
                log::error!("[PMM] Self-test frames out of order at {}", frame);
                return false;
            }
            frames[i] = frame;
        }

        for frame in frames.iter().rev() {
            if let Err(err) = self.free(*frame) {
                log::error!("[PMM] Self-test free of {} failed: {}", frame, err);
                return false;
            }
        }

        if self.free_count() != free_before {
            log::error!(
                "[PMM] Self-test leaked frames: {} free, expected {}",
                self.free_count(),
                free_before
            );
            return false;
        }

        log::info!("[PMM] Self-test passed");
        true
    }

    fn first_free(&self) -> Option<usize> {
        for (word_index, &word) in self.bitmap.iter().enumerate() {
            if word == u32::MAX {
                continue;
            }
            let index = word_index * BITS_PER_WORD + (!word).trailing_zeros() as usize;
            return (index < self.total_frames).then_some(index);
        }
        None
    }

    #[inline]
    fn test(&self, index: usize) -> bool {
        self.bitmap[index / BITS_PER_WORD] & (1 << (index % BITS_PER_WORD)) != 0
    }

    #[inline]
    fn set(&mut self, index: usize) {
        self.bitmap[index / BITS_PER_WORD] |= 1 << (index % BITS_PER_WORD);
    }

    #[inline]
    fn clear(&mut self, index: usize) {
        self.bitmap[index / BITS_PER_WORD] &= !(1 << (index % BITS_PER_WORD));
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}
