//! Process control blocks: saved register file plus scheduling metadata.

use crate::cpu::Cpu;
use std::fmt;

pub type Pid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Resident,
    Ready,
    Running,
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessState::Resident => "RESIDENT",
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Terminated => "TERMINATED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLocation {
    Ram,
    Disk,
}

impl fmt::Display for ProcessLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessLocation::Ram => "RAM",
            ProcessLocation::Disk => "DSK",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Pcb {
    pub pid: Pid,
    /// Partition base while RAM-resident; `None` while the image lives in a
    /// swap file.
    pub base: Option<u16>,
    pub location: ProcessLocation,
    state: ProcessState,
    pub program_counter: u16,
    pub instruction_register: u8,
    pub accumulator: u8,
    pub x_register: u8,
    pub y_register: u8,
    pub z_flag: u8,
    pub priority: u8,
    /// Pulses consumed in the current dispatch.
    pub quantum_used: u32,
    /// Monotonic stamp of the last dispatch, for swap-victim selection.
    pub last_dispatch: u64,
}

impl Pcb {
    pub fn new_in_ram(pid: Pid, base: u16, priority: u8) -> Self {
        Self::new(pid, Some(base), ProcessLocation::Ram, priority)
    }

    pub fn new_on_disk(pid: Pid, priority: u8) -> Self {
        Self::new(pid, None, ProcessLocation::Disk, priority)
    }

    fn new(pid: Pid, base: Option<u16>, location: ProcessLocation, priority: u8) -> Self {
        Self {
            pid,
            base,
            location,
            state: ProcessState::Resident,
            program_counter: 0,
            instruction_register: 0,
            accumulator: 0,
            x_register: 0,
            y_register: 0,
            z_flag: 0,
            priority,
            quantum_used: 0,
            last_dispatch: 0,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// TERMINATED is final; any attempted transition out of it is dropped.
    pub fn set_state(&mut self, next: ProcessState) {
        if self.state == ProcessState::Terminated && next != ProcessState::Terminated {
            log::warn!("pid {} is terminated, ignoring transition to {next}", self.pid);
            return;
        }
        self.state = next;
    }

    pub fn is_live(&self) -> bool {
        self.state != ProcessState::Terminated
    }

    /// Capture the CPU register file into this block.
    pub fn snapshot(&mut self, cpu: &Cpu) {
        self.program_counter = cpu.pc;
        self.instruction_register = cpu.ir;
        self.accumulator = cpu.acc;
        self.x_register = cpu.x;
        self.y_register = cpu.y;
        self.z_flag = cpu.z_flag & 0x01;
    }

    /// Load the saved register file into the CPU.
    pub fn restore(&self, cpu: &mut Cpu) {
        cpu.pc = self.program_counter;
        cpu.ir = self.instruction_register;
        cpu.acc = self.accumulator;
        cpu.x = self.x_register;
        cpu.y = self.y_register;
        cpu.z_flag = self.z_flag & 0x01;
    }
}
