//! Process Management
//!
//! Process control blocks, the fixed-capacity process table, and the
//! resumable contexts the scheduler switches between.

pub mod context;
pub mod pcb;
pub mod table;

pub use context::{InitialFrame, KernelStacks, ResumePoint, INITIAL_FRAME_WORDS};
pub use pcb::{Pcb, ProcessId, ProcessState};
pub use table::{PcbHandle, ProcessError, ProcessTable};
