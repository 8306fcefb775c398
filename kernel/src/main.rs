//! MiniOS Kernel
//!
//! Boot sequence:
//!
//! 1. A Multiboot loader (GRUB, or QEMU `-kernel`) jumps to `_start`
//! 2. Serial console and logger, VGA console
//! 3. GDT with TSS, IDT, PIC remap, PIT at 100 Hz
//! 4. Memory map from the loader, frame allocator, paging
//! 5. Embedded programs spawned from the manifest
//! 6. Scheduler started; the boot context is never resumed
//!
//! When every process has exited the kernel logs the exit report and
//! halts, or exits QEMU with the self-check verdict (`qemu-exit`).

#![no_std]
#![no_main]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(not(target_arch = "x86"))]
compile_error!("the kernel binary is built for the i686-minios target");

mod boot;

use core::panic::PanicInfo;

use minios_kernel::arch::i386::{self, gdt, idt, pic, pit, vga, KERNEL};
use minios_kernel::arch::multiboot;
use minios_kernel::config::TIMER_FREQUENCY;
use minios_kernel::programs::MANIFEST;
use minios_kernel::{serial, serial_println, vga_println};

/// Rust entry point, called from `_start`.
#[no_mangle]
extern "C" fn kmain(magic: u32, info_addr: u32) -> ! {
    // Phase 1: consoles
    serial::init();
    serial::init_logger();
    vga::VGA_WRITER.lock().clear_screen();
    vga_println!("MiniOS {}", env!("CARGO_PKG_VERSION"));
    log::info!("[BOOT] MiniOS kernel {}", env!("CARGO_PKG_VERSION"));

    // Phase 2: descriptor tables and interrupt sources
    gdt::init();
    idt::init();
    pic::init();
    pit::init(TIMER_FREQUENCY);

    // Phase 3: memory map, read before paging hides anything above 16 MiB
    let map = match unsafe { multiboot::from_loader(magic, info_addr) } {
        Ok(map) => map,
        Err(err) => panic!("[BOOT] {}", err),
    };
    log::info!(
        "[BOOT] {} MiB physical memory, {} regions",
        map.total_memory / (1024 * 1024),
        map.regions().len()
    );

    // Phase 4: kernel state and processes
    let dispatch = {
        let mut kernel = KERNEL.lock();
        kernel.boot(&map);
        let spawned = kernel.spawn_all(MANIFEST);
        log::info!("[BOOT] Spawned {}/{} programs", spawned, MANIFEST.len());
        kernel.start()
    };

    // Phase 5: hand the CPU to the first process
    i386::perform(dispatch);

    log::warn!("[BOOT] Nothing to run, idling");
    i386::idle()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // The panic may have interrupted a holder of either console lock.
    unsafe {
        serial::SERIAL1.force_unlock();
        vga::VGA_WRITER.force_unlock();
    }

    serial_println!();
    serial_println!("========================================");
    serial_println!("KERNEL PANIC");
    serial_println!("========================================");
    if let Some(location) = info.location() {
        serial_println!(
            "Location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    serial_println!("Message: {}", info.message());
    serial_println!("System halted.");

    vga_println!("KERNEL PANIC: {}", info.message());

    #[cfg(feature = "qemu-exit")]
    i386::qemu::exit_qemu(i386::qemu::QemuExitCode::Failed);

    i386::halt()
}
