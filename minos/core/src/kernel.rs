//! The kernel context: every component in one explicit struct, plus the
//! operations the shell (or any host) calls into.
//!
//! There are no process-wide singletons; a host owns a [`Kernel`] and drives
//! it one clock pulse at a time.

use crate::console::Console;
use crate::cpu::{Cpu, PipelineStep};
use crate::disk::{DiskDriver, DiskStats};
use crate::memory::MemoryAccessor;
use crate::mm::MemoryManager;
use crate::pcb::{Pid, ProcessLocation, ProcessState};
use crate::program::parse_hex_tokens;
use crate::scheduler::{Scheduler, SchedulingDiscipline};
use crate::snapshot;
use crate::{CoreError, Result};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub pid: Pid,
    pub state: ProcessState,
    pub location: ProcessLocation,
    pub priority: u8,
    pub program_counter: u16,
    pub base: Option<u16>,
}

impl fmt::Display for ProcessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.base {
            Some(base) => format!("0x{base:04X}"),
            None => "-".to_string(),
        };
        write!(
            f,
            "pid {:>3}  {:<10}  {}  prio {:>3}  pc 0x{:04X}  base {}",
            self.pid, self.state, self.location, self.priority, self.program_counter, base
        )
    }
}

pub struct Kernel<C: Console> {
    pub cpu: Cpu,
    pub bus: MemoryAccessor,
    pub disk: DiskDriver,
    pub mm: MemoryManager,
    pub scheduler: Scheduler,
    pub console: C,
}

impl<C: Console> Kernel<C> {
    pub fn new(console: C) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: MemoryAccessor::new(),
            disk: DiskDriver::new(),
            mm: MemoryManager::new(),
            scheduler: Scheduler::new(),
            console,
        }
    }

    pub fn trace(&self, message: &str) {
        log::trace!("{message}");
    }

    /// Last-resort reporting for conditions that should never happen in a
    /// healthy machine. The host keeps running.
    pub fn trap_error(&mut self, message: &str) {
        log::error!("{message}");
        if self.console.current_x_position() > 0 {
            self.console.advance_line();
        }
        self.console.put_text(&format!("KERNEL TRAP: {message}"));
        self.console.advance_line();
    }

    /// Advance the machine by one clock pulse.
    pub fn pulse(&mut self) -> Result<()> {
        let result = self.scheduler.tick(
            &mut self.cpu,
            &mut self.bus,
            &mut self.mm,
            &mut self.disk,
            &mut self.console,
        );
        if let Err(err) = &result {
            self.trap_error(&err.to_string());
        }
        result
    }

    /// Nothing running and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.scheduler.running().is_none() && self.scheduler.ready_pids().next().is_none()
    }

    /// Validate a hex program and hand it to the memory manager.
    pub fn load_program(&mut self, text: &str, priority: Option<u8>) -> Result<Pid> {
        let bytes = parse_hex_tokens(text)?;
        if bytes.is_empty() {
            return Err(CoreError::InvalidArgument("program is empty".to_string()));
        }
        self.mm.allocate(&mut self.bus, &mut self.disk, &bytes, priority)
    }

    pub fn run(&mut self, pid: Pid) -> Result<()> {
        let state = self.mm.process(pid)?.state();
        if state != ProcessState::Resident {
            return Err(CoreError::InvalidArgument(format!(
                "pid {pid} is {state}, only RESIDENT processes can be run"
            )));
        }
        self.scheduler.enqueue(pid, &mut self.mm)
    }

    pub fn run_all(&mut self) -> Result<Vec<Pid>> {
        let pids: Vec<Pid> = self
            .mm
            .processes()
            .iter()
            .filter(|p| p.state() == ProcessState::Resident)
            .map(|p| p.pid)
            .collect();
        for pid in &pids {
            self.scheduler.enqueue(*pid, &mut self.mm)?;
        }
        Ok(pids)
    }

    pub fn ps(&self) -> Vec<ProcessReport> {
        self.mm
            .processes()
            .iter()
            .map(|p| ProcessReport {
                pid: p.pid,
                state: p.state(),
                location: p.location,
                priority: p.priority,
                program_counter: p.program_counter,
                base: p.base,
            })
            .collect()
    }

    /// Terminate a process without any console output. Running processes
    /// mid-instruction get a kill raised instead, honored when the current
    /// instruction closes.
    pub fn halt_program_silent(&mut self, pid: Pid) -> Result<()> {
        if self.scheduler.running() == Some(pid) {
            if self.cpu.step() != PipelineStep::Fetch {
                self.cpu.raise_kill();
                return Ok(());
            }
            self.cpu.is_executing = false;
            self.cpu.reset_pipeline();
            self.scheduler.clear_running();
        } else {
            self.scheduler.extract(pid);
        }
        self.mm.deallocate(pid, &mut self.bus, &mut self.disk)
    }

    /// Kill lands at a pulse boundary by construction: the host is
    /// single-threaded and never calls in mid-pulse.
    pub fn kill(&mut self, pid: Pid) -> Result<()> {
        self.mm.process(pid)?;
        self.trace(&format!("kill pid {pid}"));
        self.halt_program_silent(pid)
    }

    pub fn kill_all(&mut self) -> Result<()> {
        if let Some(pid) = self.scheduler.running() {
            self.halt_program_silent(pid)?;
        }
        self.scheduler.clear();
        let live: Vec<Pid> =
            self.mm.processes().iter().filter(|p| p.is_live()).map(|p| p.pid).collect();
        for pid in live {
            self.mm.deallocate(pid, &mut self.bus, &mut self.disk)?;
        }
        Ok(())
    }

    /// Release every resident process. Refused while something runs.
    pub fn clear_mem(&mut self) -> Result<Vec<Pid>> {
        if self.scheduler.running().is_some() {
            return Err(CoreError::InvalidArgument(
                "cannot clear memory while a process is running".to_string(),
            ));
        }
        let cleared = self.mm.clear_resident(&mut self.bus, &mut self.disk)?;
        for pid in &cleared {
            self.scheduler.extract(*pid);
        }
        Ok(cleared)
    }

    pub fn quantum(&self) -> u32 {
        self.scheduler.quantum()
    }

    pub fn set_quantum(&mut self, quantum: u32) -> Result<()> {
        self.scheduler.set_quantum(quantum)
    }

    pub fn schedule(&self) -> SchedulingDiscipline {
        self.scheduler.schedule()
    }

    pub fn set_schedule(&mut self, algorithm: SchedulingDiscipline) {
        self.scheduler.set_schedule(algorithm, &self.mm);
    }

    pub fn format_disk(&mut self, quick: bool) -> Result<()> {
        if quick {
            self.disk.format_quick()
        } else {
            self.disk.format();
            Ok(())
        }
    }

    pub fn create_file(&mut self, name: &str) -> Result<()> {
        self.disk.create(name)
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        self.disk.read_string(name)
    }

    pub fn write_file(&mut self, name: &str, data: &str) -> Result<()> {
        self.disk.write(name, data.as_bytes())
    }

    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        self.disk.delete(name)
    }

    pub fn copy_file(&mut self, existing: &str, new: &str) -> Result<()> {
        self.disk.copy(existing, new)
    }

    pub fn rename_file(&mut self, old: &str, new: &str) -> Result<()> {
        self.disk.rename(old, new)
    }

    /// Compatibility knob: let `rename` land on a name that is already in
    /// use, the way the source system allows.
    pub fn set_rename_collision_check(&mut self, enabled: bool) {
        self.disk.set_rename_collision_check(enabled);
    }

    pub fn list_files(&self, show_hidden: bool) -> Result<Vec<String>> {
        self.disk.ls(show_hidden)
    }

    pub fn disk_stats(&self) -> DiskStats {
        self.disk.stats()
    }

    pub fn memory_dump(&self, start: u16, len: usize) -> Vec<String> {
        self.bus.dump(start, len)
    }

    pub fn save_disk_image(&self, path: &Path) -> Result<()> {
        snapshot::save_image(path, &self.disk)
    }

    pub fn load_disk_image(&mut self, path: &Path) -> Result<()> {
        self.disk = snapshot::load_image(path)?;
        Ok(())
    }
}
