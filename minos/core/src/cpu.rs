//! The CPU: an explicit seven-step pipeline over the user ISA.
//!
//! One pulse runs one full instruction (the steps are collapsed the way the
//! reference machine does); hosts that want hardware-faithful timing can
//! drive [`Cpu::micro_step`] one step per pulse instead. Operand addresses
//! are relocated during decode, so by Execute the MAR is physical.

use crate::console::Console;
use crate::memory::{MemoryAccessor, PARTITION_SIZE};
use crate::opcodes::{self, AddressMode, Mnemonic, OpcodeEntry};
use crate::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Fetch,
    Decode1,
    Decode2,
    Execute1,
    Execute2,
    WriteBack,
    InterruptCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCause {
    /// The program executed opcode 00.
    Brk,
    /// The host killed the process.
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseOutcome {
    Running,
    Halted(HaltCause),
}

pub struct Cpu {
    pub pc: u16,
    pub ir: u8,
    pub acc: u8,
    pub x: u8,
    pub y: u8,
    pub z_flag: u8,
    pub carry: bool,
    pub is_executing: bool,
    step: PipelineStep,
    current: Option<&'static OpcodeEntry>,
    halt_cause: Option<HaltCause>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            pc: 0,
            ir: 0,
            acc: 0,
            x: 0,
            y: 0,
            z_flag: 0,
            carry: false,
            is_executing: false,
            step: PipelineStep::Fetch,
            current: None,
            halt_cause: None,
        }
    }

    pub fn step(&self) -> PipelineStep {
        self.step
    }

    pub fn reset_pipeline(&mut self) {
        self.step = PipelineStep::Fetch;
        self.current = None;
        self.halt_cause = None;
    }

    /// Request a halt to be honored when the current instruction closes.
    pub fn raise_kill(&mut self) {
        self.halt_cause = Some(HaltCause::Killed);
    }

    /// Run one full instruction. A trap error leaves the CPU halted with a
    /// clean pipeline; the caller owns deallocation and reporting.
    pub fn pulse(&mut self, bus: &mut MemoryAccessor, console: &mut dyn Console) -> Result<PulseOutcome> {
        loop {
            match self.micro_step(bus, console) {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {}
                Err(err) => {
                    self.is_executing = false;
                    self.reset_pipeline();
                    return Err(err);
                }
            }
        }
    }

    /// Advance the pipeline by a single step. Returns an outcome when the
    /// instruction completes at InterruptCheck.
    pub fn micro_step(
        &mut self,
        bus: &mut MemoryAccessor,
        console: &mut dyn Console,
    ) -> Result<Option<PulseOutcome>> {
        match self.step {
            PipelineStep::Fetch => {
                self.ir = bus.fetch(self.pc)?;
                self.pc = self.pc.wrapping_add(1);
                self.step = PipelineStep::Decode1;
                Ok(None)
            }
            PipelineStep::Decode1 => self.decode1(bus),
            PipelineStep::Decode2 => self.decode2(bus),
            PipelineStep::Execute1 => self.execute1(bus, console),
            PipelineStep::Execute2 => self.execute2(bus),
            PipelineStep::WriteBack => self.write_back(bus),
            PipelineStep::InterruptCheck => {
                self.step = PipelineStep::Fetch;
                self.current = None;
                if let Some(cause) = self.halt_cause.take() {
                    self.is_executing = false;
                    return Ok(Some(PulseOutcome::Halted(cause)));
                }
                Ok(Some(PulseOutcome::Running))
            }
        }
    }

    fn fetch_operand(&mut self, bus: &MemoryAccessor) -> Result<u8> {
        let byte = bus.fetch(self.pc)?;
        self.pc = self.pc.wrapping_add(1);
        Ok(byte)
    }

    fn decode1(&mut self, bus: &mut MemoryAccessor) -> Result<Option<PulseOutcome>> {
        let entry =
            opcodes::lookup(self.ir).ok_or(CoreError::InvalidInstruction { opcode: self.ir })?;
        self.current = Some(entry);
        match entry.mode {
            AddressMode::Immediate => {
                // Immediate loads finish in decode.
                let value = self.fetch_operand(bus)?;
                match entry.mnemonic {
                    Mnemonic::Lda => self.acc = value,
                    Mnemonic::Ldx => self.x = value,
                    Mnemonic::Ldy => self.y = value,
                    _ => unreachable!("only loads use immediate mode"),
                }
                self.step = PipelineStep::InterruptCheck;
            }
            AddressMode::Relative => {
                let offset = self.fetch_operand(bus)?;
                bus.set_low_order(offset);
                self.step = PipelineStep::Execute1;
            }
            AddressMode::Implied => {
                self.step = PipelineStep::Execute1;
            }
            AddressMode::Absolute | AddressMode::System => {
                if entry.operand_count(self.x) == 2 {
                    let low = self.fetch_operand(bus)?;
                    bus.set_low_order(low);
                    self.step = PipelineStep::Decode2;
                } else {
                    self.step = PipelineStep::Execute1;
                }
            }
        }
        Ok(None)
    }

    fn decode2(&mut self, bus: &mut MemoryAccessor) -> Result<Option<PulseOutcome>> {
        // Fold the partition offset into the high byte: the MAR goes physical
        // here.
        let high = self.fetch_operand(bus)?;
        let relocation = (bus.base() / PARTITION_SIZE as u16) as u8;
        bus.set_high_order(high.wrapping_add(relocation));
        self.step = PipelineStep::Execute1;
        Ok(None)
    }

    fn execute1(
        &mut self,
        bus: &mut MemoryAccessor,
        console: &mut dyn Console,
    ) -> Result<Option<PulseOutcome>> {
        let entry = self.current.expect("decoded instruction");
        match entry.mnemonic {
            Mnemonic::Brk => {
                self.halt_cause = Some(HaltCause::Brk);
            }
            Mnemonic::Adc => {
                let operand = bus.read()?;
                let sum = self.acc as u16 + operand as u16;
                self.carry = sum > 0xFF;
                self.acc = (sum & 0xFF) as u8;
            }
            Mnemonic::Sta => bus.write(self.acc)?,
            Mnemonic::Lda => self.acc = bus.read()?,
            Mnemonic::Ldx => self.x = bus.read()?,
            Mnemonic::Ldy => self.y = bus.read()?,
            Mnemonic::Tax => self.x = self.acc,
            Mnemonic::Tay => self.y = self.acc,
            Mnemonic::Txa => self.acc = self.x,
            Mnemonic::Tya => self.acc = self.y,
            Mnemonic::Bne => {
                if self.z_flag == 0 {
                    // Two's-complement add modulo the partition size, relative
                    // to the PC after the offset byte.
                    let offset = (bus.mar() & 0x00FF) as u16;
                    self.pc = (self.pc + offset) % PARTITION_SIZE as u16;
                }
            }
            Mnemonic::Nop => {}
            Mnemonic::Cpx => {
                let operand = bus.read()?;
                self.z_flag = u8::from(self.x == operand);
            }
            Mnemonic::Inc => {
                // Stage the cell in the accumulator; Execute2 and WriteBack
                // finish the read-modify-write.
                self.acc = bus.read()?;
            }
            Mnemonic::Sys => self.syscall(bus, console)?,
        }
        self.step = PipelineStep::Execute2;
        Ok(None)
    }

    fn execute2(&mut self, bus: &mut MemoryAccessor) -> Result<Option<PulseOutcome>> {
        if let Some(entry) = self.current {
            if entry.mnemonic == Mnemonic::Inc {
                if self.acc == 0xFF {
                    return Err(CoreError::IncrementOverflow { addr: bus.mar() });
                }
                self.acc += 1;
            }
        }
        self.step = PipelineStep::WriteBack;
        Ok(None)
    }

    fn write_back(&mut self, bus: &mut MemoryAccessor) -> Result<Option<PulseOutcome>> {
        if let Some(entry) = self.current {
            if entry.mnemonic == Mnemonic::Inc {
                bus.write(self.acc)?;
            }
        }
        self.step = PipelineStep::InterruptCheck;
        Ok(None)
    }

    fn syscall(&mut self, bus: &MemoryAccessor, console: &mut dyn Console) -> Result<()> {
        match self.x {
            1 => console.put_text(&self.y.to_string()),
            2 => {
                let text = self.read_string(bus, bus.base() + self.y as u16)?;
                console.put_text(&text);
            }
            3 => {
                let text = self.read_string(bus, bus.mar())?;
                console.put_text(&text);
            }
            other => log::trace!("syscall with unhandled X={other}, ignoring"),
        }
        Ok(())
    }

    /// NUL-terminated ASCII starting at a physical address. The window check
    /// in the accessor stops runaway strings at the partition edge.
    fn read_string(&self, bus: &MemoryAccessor, start: u16) -> Result<String> {
        let mut text = String::new();
        let mut addr = start;
        loop {
            let byte = bus.read_at(addr)?;
            if byte == 0 {
                return Ok(text);
            }
            text.push(byte as char);
            addr = addr.wrapping_add(1);
        }
    }
}
