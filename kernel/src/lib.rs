//! MiniOS Kernel Library
//!
//! A 32-bit protected-mode kernel core: physical frame allocation, a
//! single page-directory address space, a fixed process table, a
//! round-robin preemptive scheduler and the `int 0x80` system call
//! dispatcher.
//!
//! Everything above [`arch`] is hardware independent and runs under
//! `cargo test` on the host. The i386 platform layer and the `kernel`
//! binary are only built for the `i686-minios` target.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod arch;
pub mod config;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod programs;
pub mod scheduler;
pub mod syscall;

#[cfg(target_arch = "x86")]
pub mod serial;

#[cfg(test)]
mod tests;

pub use kernel::{ExitReport, FaultInfo, Kernel};
