//! Kernel Unit Tests Module
//!
//! Host-side tests driving the kernel through a mock platform.

pub(crate) mod cpu;

mod syscall_tests;
