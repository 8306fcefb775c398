//! VGA text-mode console at 0xB8000.

use lazy_static::lazy_static;
use spin::Mutex;

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;
const VGA_BUFFER_ADDR: usize = 0xB8000;

/// Light grey on black.
const DEFAULT_COLOR: u8 = 0x07;

lazy_static! {
    pub static ref VGA_WRITER: Mutex<VgaWriter> = Mutex::new(VgaWriter::new());
}

pub struct VgaWriter {
    column: usize,
    row: usize,
    color: u8,
    buffer: *mut u8,
}

// The buffer is a fixed MMIO region and the writer is only reachable
// through VGA_WRITER's lock.
unsafe impl Send for VgaWriter {}

impl VgaWriter {
    const fn new() -> Self {
        Self {
            column: 0,
            row: 0,
            color: DEFAULT_COLOR,
            buffer: VGA_BUFFER_ADDR as *mut u8,
        }
    }

    fn cell(&mut self, row: usize, column: usize, byte: u8, color: u8) {
        let offset = (row * BUFFER_WIDTH + column) * 2;
        unsafe {
            core::ptr::write_volatile(self.buffer.add(offset), byte);
            core::ptr::write_volatile(self.buffer.add(offset + 1), color);
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\r' => self.column = 0,
            byte => {
                if self.column >= BUFFER_WIDTH {
                    self.new_line();
                }
                // Non-ASCII shows as a solid block.
                let byte = if (0x20..0x7F).contains(&byte) { byte } else { 0xFE };
                self.cell(self.row, self.column, byte, self.color);
                self.column += 1;
            }
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }

    fn new_line(&mut self) {
        self.column = 0;
        if self.row + 1 < BUFFER_HEIGHT {
            self.row += 1;
            return;
        }
        unsafe {
            core::ptr::copy(
                self.buffer.add(BUFFER_WIDTH * 2),
                self.buffer,
                (BUFFER_HEIGHT - 1) * BUFFER_WIDTH * 2,
            );
        }
        for column in 0..BUFFER_WIDTH {
            self.cell(BUFFER_HEIGHT - 1, column, b' ', self.color);
        }
    }

    pub fn clear_screen(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            for column in 0..BUFFER_WIDTH {
                self.cell(row, column, b' ', self.color);
            }
        }
        self.row = 0;
        self.column = 0;
    }
}

impl core::fmt::Write for VgaWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Print to the VGA console.
#[macro_export]
macro_rules! vga_print {
    ($($arg:tt)*) => {
        $crate::arch::i386::vga::_print(format_args!($($arg)*))
    };
}

/// Print to the VGA console, with a newline.
#[macro_export]
macro_rules! vga_println {
    () => ($crate::vga_print!("\n"));
    ($($arg:tt)*) => ($crate::vga_print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    use core::fmt::Write;
    let _ = VGA_WRITER.lock().write_fmt(args);
}
