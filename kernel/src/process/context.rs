//! Resumable execution contexts.
//!
//! A suspended process is represented by a single saved kernel stack
//! pointer, its [`ResumePoint`]. The context-switch path stores the
//! outgoing stack pointer, loads the incoming one and executes `ret`, so
//! the word at the resume point is always the code address execution
//! continues at.
//!
//! A process that has never run gets a synthesized [`InitialFrame`] whose
//! first word is the user-entry trampoline. Layout, in machine words from
//! the resume point upward:
//!
//! | Word   | Contents                                            |
//! |--------|-----------------------------------------------------|
//! | 0      | user-entry trampoline address                       |
//! | 1..=8  | `pushad` area (edi esi ebp esp ebx edx ecx eax), 0  |
//! | 9      | user eip (entry point)                              |
//! | 10     | user cs                                             |
//! | 11     | eflags                                              |
//! | 12     | user esp                                            |
//! | 13     | user ss                                             |
//!
//! The trampoline loads the user data selector into the segment
//! registers, executes `popad` and then `iretd` through words 9..=13.

use crate::config::{
    KERNEL_STACK_SIZE, MAX_PROCESSES, USER_CODE_SELECTOR, USER_DATA_SELECTOR, USER_EFLAGS,
};
use crate::memory::VirtAddr;
use core::cell::UnsafeCell;
use core::mem::size_of;
use core::ptr;

/// Number of machine words in an [`InitialFrame`].
pub const INITIAL_FRAME_WORDS: usize = 14;

/// Number of general registers saved by `pushad`.
const PUSHAD_WORDS: usize = 8;

const KERNEL_STACK_WORDS: usize = KERNEL_STACK_SIZE / size_of::<usize>();

/// A saved kernel stack pointer from which a process continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ResumePoint(pub usize);

impl ResumePoint {
    pub const NONE: ResumePoint = ResumePoint(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// The privilege-transition frame a brand-new process is resumed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialFrame {
    pub trampoline: usize,
    pub eip: u32,
    pub cs: u16,
    pub eflags: u32,
    pub user_esp: u32,
    pub ss: u16,
}

impl InitialFrame {
    /// Frame entering ring 3 at `entry` with the stack at `user_stack`.
    pub fn new(trampoline: usize, entry: VirtAddr, user_stack: VirtAddr) -> Self {
        Self {
            trampoline,
            eip: entry.as_u32(),
            cs: USER_CODE_SELECTOR,
            eflags: USER_EFLAGS,
            user_esp: user_stack.as_u32(),
            ss: USER_DATA_SELECTOR,
        }
    }

    /// Encode the frame in stack order, lowest address first.
    pub fn to_words(&self) -> [usize; INITIAL_FRAME_WORDS] {
        let mut words = [0; INITIAL_FRAME_WORDS];
        words[0] = self.trampoline;
        // words[1..=8]: zeroed pushad area
        words[1 + PUSHAD_WORDS] = self.eip as usize;
        words[2 + PUSHAD_WORDS] = self.cs as usize;
        words[3 + PUSHAD_WORDS] = self.eflags as usize;
        words[4 + PUSHAD_WORDS] = self.user_esp as usize;
        words[5 + PUSHAD_WORDS] = self.ss as usize;
        words
    }

    /// Decode a frame, rejecting words that break the layout contract.
    pub fn from_words(words: &[usize; INITIAL_FRAME_WORDS]) -> Option<Self> {
        if words[1..=PUSHAD_WORDS].iter().any(|&w| w != 0) {
            return None;
        }
        let frame = Self {
            trampoline: words[0],
            eip: u32::try_from(words[1 + PUSHAD_WORDS]).ok()?,
            cs: u16::try_from(words[2 + PUSHAD_WORDS]).ok()?,
            eflags: u32::try_from(words[3 + PUSHAD_WORDS]).ok()?,
            user_esp: u32::try_from(words[4 + PUSHAD_WORDS]).ok()?,
            ss: u16::try_from(words[5 + PUSHAD_WORDS]).ok()?,
        };
        (frame.trampoline != 0 && frame.cs & 3 == 3 && frame.ss & 3 == 3).then_some(frame)
    }
}

/// A private kernel-mode stack and the resume point saved when its
/// process was last switched out.
#[repr(C, align(16))]
pub struct KernelStack {
    words: UnsafeCell<[usize; KERNEL_STACK_WORDS]>,
    resume: UnsafeCell<ResumePoint>,
}

impl KernelStack {
    pub const fn new() -> Self {
        Self {
            words: UnsafeCell::new([0; KERNEL_STACK_WORDS]),
            resume: UnsafeCell::new(ResumePoint::NONE),
        }
    }

    fn base(&self) -> *mut usize {
        self.words.get().cast()
    }

    /// Address one past the highest word; the initial stack pointer.
    pub fn top(&self) -> usize {
        self.base().wrapping_add(KERNEL_STACK_WORDS) as usize
    }
}

impl Default for KernelStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Kernel stacks for every process slot, plus the save slot of the boot
/// context.
///
/// Kept apart from the locked kernel state: trap handlers run on these
/// stacks, and the switch path stores resume points into them after the
/// lock is released. All access goes through raw pointers and happens on
/// one CPU with interrupts disabled.
pub struct KernelStacks {
    stacks: [KernelStack; MAX_PROCESSES],
    boot: UnsafeCell<ResumePoint>,
}

// SAFETY: only the single CPU touches the stacks, with interrupts off.
unsafe impl Sync for KernelStacks {}

impl KernelStacks {
    pub const fn new() -> Self {
        Self {
            stacks: [const { KernelStack::new() }; MAX_PROCESSES],
            boot: UnsafeCell::new(ResumePoint::NONE),
        }
    }

    /// Initial stack pointer of `slot`'s stack.
    pub fn top(&self, slot: usize) -> usize {
        self.stacks[slot].top()
    }

    /// The resume point last saved for `slot`.
    pub fn resume(&self, slot: usize) -> ResumePoint {
        // SAFETY: the cell is always initialized and only written by
        // push_initial_frame or the switch path on this CPU.
        unsafe { ptr::read_volatile(self.stacks[slot].resume.get()) }
    }

    /// Where the switch path saves the outgoing stack pointer: `slot`'s
    /// resume point, or the boot context's when `slot` is `None`.
    pub fn save_slot(&self, slot: Option<usize>) -> *mut usize {
        match slot {
            Some(slot) => self.stacks[slot].resume.get().cast(),
            None => self.boot.get().cast(),
        }
    }

    /// Write `frame` at the top of `slot`'s stack and make it the slot's
    /// resume point.
    ///
    /// # Safety
    ///
    /// `slot` must not belong to a process that has run: nothing may be
    /// executing on, or suspended in, its stack.
    pub unsafe fn push_initial_frame(&self, slot: usize, frame: &InitialFrame) -> ResumePoint {
        let stack = &self.stacks[slot];
        let first = stack.base().wrapping_add(KERNEL_STACK_WORDS - INITIAL_FRAME_WORDS);
        for (i, word) in frame.to_words().into_iter().enumerate() {
            // SAFETY: first..first+INITIAL_FRAME_WORDS lies inside the stack.
            unsafe { ptr::write_volatile(first.add(i), word) };
        }
        let resume = ResumePoint(first as usize);
        // SAFETY: the caller guarantees no switch is saving into this slot.
        unsafe { ptr::write_volatile(stack.resume.get(), resume) };
        resume
    }

    /// Read back the frame stored by [`push_initial_frame`](Self::push_initial_frame).
    pub fn initial_frame(&self, slot: usize) -> Option<InitialFrame> {
        let first = self.stacks[slot]
            .base()
            .wrapping_add(KERNEL_STACK_WORDS - INITIAL_FRAME_WORDS);
        let mut words = [0; INITIAL_FRAME_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            // SAFETY: in bounds of the stack and always initialized.
            *word = unsafe { ptr::read_volatile(first.add(i)) };
        }
        InitialFrame::from_words(&words)
    }
}

impl Default for KernelStacks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_frame_layout() {
        let frame = InitialFrame::new(0xC0DE, VirtAddr::new(0x4000_0000), VirtAddr::new(0xBFFF_F000));
        let words = frame.to_words();

        assert_eq!(words[0], 0xC0DE);
        assert!(words[1..9].iter().all(|&w| w == 0));
        assert_eq!(words[9], 0x4000_0000);
        assert_eq!(words[10], 0x1B);
        assert_eq!(words[11], 0x202);
        assert_eq!(words[12], 0xBFFF_F000);
        assert_eq!(words[13], 0x23);
        assert_eq!(InitialFrame::from_words(&words), Some(frame));
    }

    #[test]
    fn test_from_words_rejects_dirty_register_area() {
        let frame = InitialFrame::new(0xC0DE, VirtAddr::new(0x4000_0000), VirtAddr::new(0xBFFF_F000));
        let mut words = frame.to_words();
        words[4] = 1;
        assert_eq!(InitialFrame::from_words(&words), None);

        let mut words = frame.to_words();
        words[10] = 0x08;
        assert_eq!(InitialFrame::from_words(&words), None);
    }

    #[test]
    fn test_resume_point_sits_below_top() {
        let stacks = Box::new(KernelStacks::new());
        let frame = InitialFrame::new(0xC0DE, VirtAddr::new(0x4040_0000), VirtAddr::new(0xBFBF_F000));
        // SAFETY: nothing runs on these stacks.
        let resume = unsafe { stacks.push_initial_frame(1, &frame) };

        assert_eq!(stacks.top(1) - resume.0, INITIAL_FRAME_WORDS * size_of::<usize>());
        assert_eq!(stacks.resume(1), resume);
        assert_eq!(stacks.initial_frame(1), Some(frame));
        assert_eq!(stacks.initial_frame(0), None);
        assert!(stacks.resume(0).is_none());
        // SAFETY: the resume point addresses the first word just written.
        let first = unsafe { *(resume.0 as *const usize) };
        assert_eq!(first, 0xC0DE);
    }

    #[test]
    fn test_save_slots_are_distinct() {
        let stacks = Box::new(KernelStacks::new());
        let boot = stacks.save_slot(None);
        let mut slots: Vec<_> = (0..MAX_PROCESSES).map(|slot| stacks.save_slot(Some(slot))).collect();
        assert!(!slots.contains(&boot));
        for (i, a) in slots.iter().enumerate() {
            assert!(slots[i + 1..].iter().all(|b| b != a));
        }

        // SAFETY: the save slot belongs to `stacks` and is a plain word.
        unsafe { *slots[2] = 0x1234 };
        assert_eq!(stacks.resume(2), ResumePoint(0x1234));
        assert!(stacks.top(2) > stacks.top(1));
    }
}
