//! Interrupt descriptor table.

use core::arch::asm;
use core::mem::size_of;
use lazy_static::lazy_static;

use super::traps;
use crate::config::{KERNEL_CODE_SELECTOR, SYSCALL_VECTOR};

/// 32-bit interrupt gate, present. Interrupt gates clear IF on entry, so
/// every kernel path runs with interrupts off.
const GATE_KERNEL: u8 = 0x8E;
/// Same gate reachable from ring 3 with `int`.
const GATE_USER: u8 = 0xEE;

#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: usize, type_attr: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: KERNEL_CODE_SELECTOR,
            zero: 0,
            type_attr,
            offset_high: (handler >> 16) as u16,
        }
    }
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    static ref IDT: [IdtEntry; 256] = {
        let mut idt = [IdtEntry::missing(); 256];
        for (vector, stub) in traps::STUBS.iter() {
            let gate = if *vector == SYSCALL_VECTOR { GATE_USER } else { GATE_KERNEL };
            idt[*vector as usize] = IdtEntry::new(*stub as usize, gate);
        }
        idt
    };
}

/// Load the IDT: exceptions 0..=31, hardware IRQs and the syscall gate.
pub fn init() {
    let pointer = DescriptorTablePointer {
        limit: (size_of::<[IdtEntry; 256]>() - 1) as u16,
        base: IDT.as_ptr() as u32,
    };
    unsafe { asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags)) };
    log::info!("[BOOT] IDT loaded ({} gates, syscall vector {:#x})", traps::STUBS.len(), SYSCALL_VECTOR);
}
