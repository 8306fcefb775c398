//! Minimal i386 interpreter for the embedded user images.
//!
//! Understands only the instructions the images use. [`Machine`] plays
//! the part of the CPU and the assembly stubs: it steps the running
//! process, raises timer ticks, forwards `int 0x80` to the kernel, and
//! acts on every [`Dispatch`] the kernel returns.

use super::mock::{boot_kernel, MockHal, MOCK_TRAMPOLINE};
use crate::config::{USER_CODE_SELECTOR, USER_DATA_SELECTOR, USER_EFLAGS};
use crate::kernel::{FaultInfo, FaultRegisters, Kernel};
use crate::memory::PageDirectory;
use crate::process::ProcessId;
use crate::scheduler::Dispatch;
use crate::syscall::SyscallOutcome;
use std::collections::HashMap;

const INVALID_OPCODE: u8 = 6;
const GENERAL_PROTECTION: u8 = 13;
const PAGE_FAULT: u8 = 14;

/// User-visible register file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Regs {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esp: u32,
    pub eip: u32,
    pub zf: bool,
}

/// Result of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    None,
    Syscall,
    Fault(FaultInfo),
}

fn fault(vector: u8, regs: &Regs, address: u32) -> Event {
    Event::Fault(FaultInfo {
        vector,
        error_code: 0,
        eip: regs.eip,
        address,
        regs: FaultRegisters {
            eax: regs.eax,
            ebx: regs.ebx,
            ecx: regs.ecx,
            edx: regs.edx,
            eip: regs.eip,
            cs: USER_CODE_SELECTOR as u32,
            eflags: USER_EFLAGS,
            user_stack: Some((regs.esp, USER_DATA_SELECTOR as u32)),
            ..FaultRegisters::default()
        },
    })
}

fn read_u32(mem: &MockHal, dir: &PageDirectory, addr: u32) -> Option<u32> {
    let mut bytes = [0u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = mem.read_byte(dir, addr.wrapping_add(i as u32))?;
    }
    Some(u32::from_le_bytes(bytes))
}

/// Execute the instruction at `regs.eip`.
pub fn step(regs: &mut Regs, mem: &mut MockHal, dir: &PageDirectory) -> Event {
    let eip = regs.eip;
    let byte = |mem: &MockHal, offset: u32| mem.read_byte(dir, eip.wrapping_add(offset));

    let Some(opcode) = byte(mem, 0) else {
        return fault(PAGE_FAULT, regs, eip);
    };

    match opcode {
        // call rel32
        0xE8 => {
            let Some(rel) = read_u32(mem, dir, eip + 1) else {
                return fault(PAGE_FAULT, regs, eip + 1);
            };
            let ret = eip + 5;
            regs.esp = regs.esp.wrapping_sub(4);
            for (i, b) in ret.to_le_bytes().iter().enumerate() {
                if !mem.write_byte(dir, regs.esp + i as u32, *b) {
                    return fault(PAGE_FAULT, regs, regs.esp);
                }
            }
            regs.eip = ret.wrapping_add(rel);
        }
        // pop ecx
        0x59 => {
            let Some(value) = read_u32(mem, dir, regs.esp) else {
                return fault(PAGE_FAULT, regs, regs.esp);
            };
            regs.ecx = value;
            regs.esp = regs.esp.wrapping_add(4);
            regs.eip += 1;
        }
        // add ecx, imm8
        0x83 if byte(mem, 1) == Some(0xC1) => {
            let Some(imm) = byte(mem, 2) else {
                return fault(PAGE_FAULT, regs, eip + 2);
            };
            regs.ecx = regs.ecx.wrapping_add(imm as i8 as i32 as u32);
            regs.zf = regs.ecx == 0;
            regs.eip += 3;
        }
        // mov r32, imm32
        0xB8..=0xBB => {
            let Some(imm) = read_u32(mem, dir, eip + 1) else {
                return fault(PAGE_FAULT, regs, eip + 1);
            };
            match opcode {
                0xB8 => regs.eax = imm,
                0xB9 => regs.ecx = imm,
                0xBA => regs.edx = imm,
                _ => regs.ebx = imm,
            }
            regs.eip += 5;
        }
        // xor r32, r32 (same register)
        0x31 if matches!(byte(mem, 1), Some(0xC0 | 0xDB)) => {
            if byte(mem, 1) == Some(0xC0) {
                regs.eax = 0;
            } else {
                regs.ebx = 0;
            }
            regs.zf = true;
            regs.eip += 2;
        }
        // mov ebx, eax
        0x89 if byte(mem, 1) == Some(0xC3) => {
            regs.ebx = regs.eax;
            regs.eip += 2;
        }
        // test eax, eax
        0x85 if byte(mem, 1) == Some(0xC0) => {
            regs.zf = regs.eax == 0;
            regs.eip += 2;
        }
        // jz rel8 / jmp rel8
        0x74 | 0xEB => {
            let Some(rel) = byte(mem, 1) else {
                return fault(PAGE_FAULT, regs, eip + 1);
            };
            let taken = opcode == 0xEB || regs.zf;
            regs.eip = eip + 2;
            if taken {
                regs.eip = regs.eip.wrapping_add(rel as i8 as i32 as u32);
            }
        }
        // int imm8
        0xCD => match byte(mem, 1) {
            Some(0x80) => {
                regs.eip += 2;
                return Event::Syscall;
            }
            _ => return fault(GENERAL_PROTECTION, regs, 0),
        },
        _ => return fault(INVALID_OPCODE, regs, 0),
    }
    Event::None
}

/// Image that writes `msg` to `fd` and exits with write's return value.
pub fn write_and_exit(fd: u8, msg: &[u8]) -> Vec<u8> {
    const MSG_OFFSET: u8 = 37;
    let len = u8::try_from(msg.len()).expect("short message");
    let mut image = vec![
        0xE8, 0x00, 0x00, 0x00, 0x00, // call $+5
        0x59, // pop ecx
        0x83, 0xC1, MSG_OFFSET - 5, // add ecx, msg - 5
        0xB8, 0x03, 0x00, 0x00, 0x00, // mov eax, SYS_WRITE
        0xBB, fd, 0x00, 0x00, 0x00, // mov ebx, fd
        0xBA, len, 0x00, 0x00, 0x00, // mov edx, len
        0xCD, 0x80, // int 0x80
        0x89, 0xC3, // mov ebx, eax
        0xB8, 0x01, 0x00, 0x00, 0x00, // mov eax, SYS_EXIT
        0xCD, 0x80, // int 0x80
        0xEB, 0xFE, // jmp $
    ];
    assert_eq!(image.len(), MSG_OFFSET as usize);
    image.extend_from_slice(msg);
    image
}

/// A mock machine running user images under the kernel.
pub struct Machine {
    pub kernel: Box<Kernel<MockHal>>,
    contexts: HashMap<ProcessId, Regs>,
    current: Option<ProcessId>,
    regs: Regs,
    /// Order in which processes were given the CPU by a switch.
    pub switches: Vec<ProcessId>,
    pub steps: u64,
    pub finished: bool,
    /// The most recent fault raised by a user image.
    pub last_fault: Option<FaultInfo>,
}

impl Machine {
    /// Boot a 128 MiB machine and spawn `programs` in order.
    pub fn boot(programs: &[(&str, &[u8])]) -> Self {
        let mut kernel = boot_kernel(128);
        for (name, image) in programs {
            kernel.spawn(name, image).expect("spawn");
        }
        Self {
            kernel,
            contexts: HashMap::new(),
            current: None,
            regs: Regs::default(),
            switches: Vec::new(),
            steps: 0,
            finished: false,
            last_fault: None,
        }
    }

    pub fn current(&self) -> Option<ProcessId> {
        self.current
    }

    /// Carry out a scheduler decision the way the switch path would.
    pub fn apply(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Idle | Dispatch::Resume => {}
            Dispatch::AllExited => {
                self.finished = true;
                self.current = None;
            }
            Dispatch::Switch(plan) => {
                if let Some(prev) = self.current {
                    assert_eq!(plan.from, Some(prev), "switch from wrong context");
                    self.contexts.insert(prev, self.regs);
                }
                self.regs = match self.contexts.get(&plan.to) {
                    Some(regs) => *regs,
                    None => self.first_entry(plan.to, plan.resume.0),
                };
                self.current = Some(plan.to);
                self.switches.push(plan.to);
            }
        }
    }

    /// Registers for a process that has never run, decoded from the frame
    /// synthesized on its kernel stack.
    fn first_entry(&self, id: ProcessId, resume: usize) -> Regs {
        let table = self.kernel.table();
        let slot = table
            .iter()
            .position(|pcb| pcb.id == id)
            .expect("switch target exists");
        assert_eq!(table.resume(slot).0, resume);
        let frame = table.stacks().initial_frame(slot).expect("initial frame intact");
        assert_eq!(frame.trampoline, MOCK_TRAMPOLINE);
        assert_eq!(frame.cs, USER_CODE_SELECTOR);
        assert_eq!(frame.ss, USER_DATA_SELECTOR);
        assert_eq!(frame.eflags, USER_EFLAGS);
        Regs {
            eip: frame.eip,
            esp: frame.user_esp,
            ..Regs::default()
        }
    }

    /// Trap into the kernel with the current registers.
    pub fn syscall(&mut self) {
        let Regs { eax, ebx, ecx, edx, .. } = self.regs;
        match self.kernel.syscall(eax, ebx, ecx, edx) {
            SyscallOutcome::Return(value) => self.regs.eax = value as u32,
            SyscallOutcome::Dispatch(dispatch) => self.apply(dispatch),
        }
    }

    pub fn tick(&mut self) {
        let dispatch = self.kernel.on_timer_tick();
        self.apply(dispatch);
    }

    /// Run until every process exits or `max_steps` instructions have
    /// executed, with a timer tick every `tick_every` steps.
    pub fn run(&mut self, tick_every: u64, max_steps: u64) {
        let dispatch = self.kernel.start();
        self.apply(dispatch);

        while !self.finished && self.steps < max_steps {
            self.steps += 1;
            if self.current.is_some() {
                let (space, hal) = self.kernel.user_memory();
                match step(&mut self.regs, hal, space.directory()) {
                    Event::None => {}
                    Event::Syscall => self.syscall(),
                    Event::Fault(info) => {
                        self.last_fault = Some(info);
                        let dispatch = self.kernel.on_user_fault(&info);
                        self.apply(dispatch);
                    }
                }
            }
            if self.steps % tick_every == 0 {
                self.tick();
            }
        }
    }
}
