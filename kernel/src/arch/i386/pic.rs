//! Legacy 8259 PIC pair.

use super::io::{inb, io_wait, outb};
use crate::config::{PIC1_OFFSET, PIC2_OFFSET};

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const EOI: u8 = 0x20;
const READ_ISR: u8 = 0x0B;

/// IRQ line of the PIT.
pub const TIMER_IRQ: u8 = 0;

/// Remap both controllers to [`PIC1_OFFSET`]/[`PIC2_OFFSET`] and mask every
/// line except the timer.
pub fn init() {
    unsafe {
        outb(PIC1_COMMAND, ICW1_INIT);
        io_wait();
        outb(PIC2_COMMAND, ICW1_INIT);
        io_wait();

        outb(PIC1_DATA, PIC1_OFFSET);
        io_wait();
        outb(PIC2_DATA, PIC2_OFFSET);
        io_wait();

        // Slave on IRQ2, cascade identity 2.
        outb(PIC1_DATA, 1 << 2);
        io_wait();
        outb(PIC2_DATA, 2);
        io_wait();

        outb(PIC1_DATA, ICW4_8086);
        io_wait();
        outb(PIC2_DATA, ICW4_8086);
        io_wait();

        outb(PIC1_DATA, !(1 << TIMER_IRQ));
        outb(PIC2_DATA, 0xFF);
    }
    log::info!(
        "[BOOT] PIC remapped to {:#x}/{:#x}, timer unmasked",
        PIC1_OFFSET,
        PIC2_OFFSET
    );
}

/// Acknowledge `irq`. Lines 8..16 need the slave acknowledged too.
pub fn send_eoi(irq: u8) {
    unsafe {
        if irq >= 8 {
            outb(PIC2_COMMAND, EOI);
        }
        outb(PIC1_COMMAND, EOI);
    }
}

/// Whether `irq` is actually in service. IRQ 7 and 15 fire spuriously
/// when a line drops before the CPU acknowledges it.
pub fn is_spurious(irq: u8) -> bool {
    let isr = unsafe {
        outb(PIC1_COMMAND, READ_ISR);
        outb(PIC2_COMMAND, READ_ISR);
        (inb(PIC2_COMMAND) as u16) << 8 | inb(PIC1_COMMAND) as u16
    };
    match irq {
        7 | 15 => isr & (1 << irq) == 0,
        _ => false,
    }
}
