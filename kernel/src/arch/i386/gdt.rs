//! GDT and TSS.
//!
//! Flat 4 GiB segments for ring 0 and ring 3 plus one TSS. The TSS is
//! only used for its `ss0:esp0` pair: the stack the CPU switches to when
//! user code traps into the kernel.

use core::arch::asm;
use core::mem::size_of;
use lazy_static::lazy_static;

use crate::config::{
    KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, TSS_SELECTOR, USER_DATA_SELECTOR,
};

/// 32-bit task state segment.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct TaskStateSegment {
    prev_task: u32,
    esp0: u32,
    ss0: u32,
    unused: [u32; 22],
    trap: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn new() -> Self {
        Self {
            prev_task: 0,
            esp0: 0,
            ss0: KERNEL_DATA_SELECTOR as u32,
            unused: [0; 22],
            trap: 0,
            // No I/O bitmap: every port access from ring 3 faults.
            iomap_base: size_of::<TaskStateSegment>() as u16,
        }
    }
}

static mut TSS: TaskStateSegment = TaskStateSegment::new();

// Access byte: present, DPL, descriptor type, executable/writable.
const ACCESS_KERNEL_CODE: u8 = 0x9A;
const ACCESS_KERNEL_DATA: u8 = 0x92;
const ACCESS_USER_CODE: u8 = 0xFA;
const ACCESS_USER_DATA: u8 = 0xF2;
const ACCESS_TSS: u8 = 0x89;

/// 4 KiB granularity, 32-bit operand size.
const FLAGS_FLAT: u8 = 0xC;

const fn descriptor(base: u32, limit: u32, access: u8, flags: u8) -> u64 {
    let mut d = (limit & 0xFFFF) as u64;
    d |= ((base & 0xFF_FFFF) as u64) << 16;
    d |= (access as u64) << 40;
    d |= (((limit >> 16) & 0xF) as u64) << 48;
    d |= ((flags & 0xF) as u64) << 52;
    d |= ((base >> 24) as u64) << 56;
    d
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

const GDT_ENTRIES: usize = 6;

lazy_static! {
    static ref GDT: [u64; GDT_ENTRIES] = {
        let tss_base = (&raw const TSS) as u32;
        let tss_limit = size_of::<TaskStateSegment>() as u32 - 1;
        [
            0,
            descriptor(0, 0xF_FFFF, ACCESS_KERNEL_CODE, FLAGS_FLAT),
            descriptor(0, 0xF_FFFF, ACCESS_KERNEL_DATA, FLAGS_FLAT),
            descriptor(0, 0xF_FFFF, ACCESS_USER_CODE, FLAGS_FLAT),
            descriptor(0, 0xF_FFFF, ACCESS_USER_DATA, FLAGS_FLAT),
            descriptor(tss_base, tss_limit, ACCESS_TSS, 0),
        ]
    };
}

/// Load the GDT, reload every segment register and load the task register.
pub fn init() {
    let pointer = DescriptorTablePointer {
        limit: (size_of::<[u64; GDT_ENTRIES]>() - 1) as u16,
        base: GDT.as_ptr() as u32,
    };

    unsafe {
        asm!(
            "lgdt [{ptr}]",
            // Far return to reload CS.
            "push {code}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov ds, {data:x}",
            "mov es, {data:x}",
            "mov fs, {data:x}",
            "mov gs, {data:x}",
            "mov ss, {data:x}",
            "ltr {tss:x}",
            ptr = in(reg) &pointer,
            code = const KERNEL_CODE_SELECTOR as u32,
            tmp = out(reg) _,
            data = in(reg) KERNEL_DATA_SELECTOR as u32,
            tss = in(reg) TSS_SELECTOR as u32,
        );
    }

    log::info!(
        "[BOOT] GDT loaded (user data {:#x}, tss {:#x})",
        USER_DATA_SELECTOR,
        TSS_SELECTOR
    );
}

/// Set the stack the CPU loads on the next ring 3 to ring 0 transition.
pub fn set_kernel_stack(top: usize) {
    // Only called with interrupts disabled, and the CPU reads esp0 only
    // when a trap arrives.
    unsafe {
        (*(&raw mut TSS)).esp0 = top as u32;
    }
}
