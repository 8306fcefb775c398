//! 8254 PIT channel 0 as the preemption timer.

use super::io::outb;
use crate::config::PIT_BASE_FREQUENCY;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte, mode 3 (square wave).
const CHANNEL0_SQUARE_WAVE: u8 = 0x36;

/// Program channel 0 to fire at `hz`.
pub fn init(hz: u32) {
    let divisor = (PIT_BASE_FREQUENCY / hz.max(1)).clamp(1, u16::MAX as u32) as u16;
    unsafe {
        outb(PIT_COMMAND, CHANNEL0_SQUARE_WAVE);
        outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL0, (divisor >> 8) as u8);
    }
    log::info!("[TIMER] PIT at {} Hz (divisor {})", hz, divisor);
}
