//! CPU scheduler: the ready queue, quantum accounting, and the context
//! switch, including the swap protocol for disk-resident processes.

use crate::console::Console;
use crate::cpu::{Cpu, PulseOutcome};
use crate::disk::DiskDriver;
use crate::memory::MemoryAccessor;
use crate::mm::MemoryManager;
use crate::pcb::{Pid, ProcessLocation, ProcessState};
use crate::{CoreError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_QUANTUM: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingDiscipline {
    RoundRobin,
    Fcfs,
    Priority,
}

impl SchedulingDiscipline {
    pub fn preempts(self) -> bool {
        matches!(self, SchedulingDiscipline::RoundRobin)
    }
}

impl fmt::Display for SchedulingDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchedulingDiscipline::RoundRobin => "ROUND ROBIN",
            SchedulingDiscipline::Fcfs => "FCFS",
            SchedulingDiscipline::Priority => "PRIORITY",
        })
    }
}

impl FromStr for SchedulingDiscipline {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rr" | "round robin" | "round-robin" | "roundrobin" => {
                Ok(SchedulingDiscipline::RoundRobin)
            }
            "fcfs" => Ok(SchedulingDiscipline::Fcfs),
            "priority" => Ok(SchedulingDiscipline::Priority),
            other => Err(CoreError::InvalidArgument(format!("unknown schedule {other:?}"))),
        }
    }
}

pub struct Scheduler {
    quantum: u32,
    algorithm: SchedulingDiscipline,
    ready: VecDeque<Pid>,
    running: Option<Pid>,
    dispatch_clock: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            quantum: DEFAULT_QUANTUM,
            algorithm: SchedulingDiscipline::RoundRobin,
            ready: VecDeque::new(),
            running: None,
            dispatch_clock: 0,
        }
    }

    pub fn quantum(&self) -> u32 {
        self.quantum
    }

    pub fn set_quantum(&mut self, quantum: u32) -> Result<()> {
        if quantum < 1 {
            return Err(CoreError::InvalidArgument("quantum must be at least 1".to_string()));
        }
        self.quantum = quantum;
        Ok(())
    }

    pub fn schedule(&self) -> SchedulingDiscipline {
        self.algorithm
    }

    /// Switching to priority ordering re-sorts whatever is already queued;
    /// the sort is stable, so equal priorities keep their arrival order.
    pub fn set_schedule(&mut self, algorithm: SchedulingDiscipline, mm: &MemoryManager) {
        self.algorithm = algorithm;
        if algorithm == SchedulingDiscipline::Priority {
            let mut pids: Vec<Pid> = self.ready.drain(..).collect();
            pids.sort_by_key(|pid| mm.process(*pid).map(|p| p.priority).unwrap_or(u8::MAX));
            self.ready = pids.into();
        }
    }

    pub fn running(&self) -> Option<Pid> {
        self.running
    }

    pub(crate) fn clear_running(&mut self) {
        self.running = None;
    }

    pub fn ready_pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.ready.iter().copied()
    }

    /// Admit a RESIDENT (or re-admit a READY) process under the current
    /// policy. Disk-resident processes queue like any other; their swap-in
    /// happens at dispatch.
    pub fn enqueue(&mut self, pid: Pid, mm: &mut MemoryManager) -> Result<()> {
        let pcb = mm.process_mut(pid)?;
        match pcb.state() {
            ProcessState::Resident | ProcessState::Ready => {}
            other => {
                return Err(CoreError::InvalidArgument(format!(
                    "pid {pid} is {other} and cannot be scheduled"
                )))
            }
        }
        pcb.set_state(ProcessState::Ready);
        let priority = pcb.priority;
        match self.algorithm {
            SchedulingDiscipline::Priority => {
                let position = self
                    .ready
                    .iter()
                    .position(|other| {
                        mm.process(*other).map(|p| p.priority).unwrap_or(u8::MAX) > priority
                    })
                    .unwrap_or(self.ready.len());
                self.ready.insert(position, pid);
            }
            _ => self.ready.push_back(pid),
        }
        Ok(())
    }

    /// Drop a pid from the ready queue. Returns whether it was queued.
    pub fn extract(&mut self, pid: Pid) -> bool {
        let before = self.ready.len();
        self.ready.retain(|queued| *queued != pid);
        self.ready.len() != before
    }

    /// Empty the ready queue without touching the running process.
    pub fn clear(&mut self) {
        self.ready.clear();
    }

    /// One host clock pulse: dispatch if the CPU is idle, run one CPU pulse,
    /// then settle halts, traps, and quantum expiry.
    pub fn tick(
        &mut self,
        cpu: &mut Cpu,
        bus: &mut MemoryAccessor,
        mm: &mut MemoryManager,
        disk: &mut DiskDriver,
        console: &mut dyn Console,
    ) -> Result<()> {
        if self.running.is_none() && !self.dispatch_next(cpu, bus, mm, disk)? {
            return Ok(());
        }
        let pid = self.running.expect("a process is dispatched");

        match cpu.pulse(bus, console) {
            Ok(PulseOutcome::Running) => {
                let pcb = mm.process_mut(pid)?;
                pcb.quantum_used += 1;
                let expired = pcb.quantum_used >= self.quantum;
                if self.algorithm.preempts() && expired && !self.ready.is_empty() {
                    pcb.snapshot(cpu);
                    pcb.set_state(ProcessState::Ready);
                    pcb.quantum_used = 0;
                    log::trace!("pid {pid} preempted after {} pulses", self.quantum);
                    self.running = None;
                    self.enqueue(pid, mm)?;
                    self.dispatch_next(cpu, bus, mm, disk)?;
                }
            }
            Ok(PulseOutcome::Halted(cause)) => {
                log::trace!("pid {pid} halted ({cause:?})");
                mm.deallocate(pid, bus, disk)?;
                self.running = None;
                self.dispatch_next(cpu, bus, mm, disk)?;
            }
            Err(err) if err.is_trap() => {
                if console.current_x_position() > 0 {
                    console.advance_line();
                }
                console.put_text(&format!("ERR: {err}. Halting program..."));
                console.advance_line();
                log::warn!("pid {pid} trapped: {err}");
                mm.deallocate(pid, bus, disk)?;
                self.running = None;
                self.dispatch_next(cpu, bus, mm, disk)?;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Pull the next runnable pid, performing the swap protocol when the
    /// incoming image lives on disk: victim out first, then the image in,
    /// then the register load.
    fn dispatch_next(
        &mut self,
        cpu: &mut Cpu,
        bus: &mut MemoryAccessor,
        mm: &mut MemoryManager,
        disk: &mut DiskDriver,
    ) -> Result<bool> {
        let pid = loop {
            match self.ready.pop_front() {
                None => return Ok(false),
                Some(pid) => {
                    if mm.process(pid)?.is_live() {
                        break pid;
                    }
                    log::warn!("dropping terminated pid {pid} from the ready queue");
                }
            }
        };

        if mm.process(pid)?.location == ProcessLocation::Disk {
            if !mm.has_free_partition(bus) {
                let victim = self.swap_victim(mm).ok_or_else(|| {
                    CoreError::InvalidArgument(format!("no partition can be freed for pid {pid}"))
                })?;
                mm.swap_out(victim, bus, disk)?;
            }
            mm.swap_in(pid, bus, disk)?;
        }

        self.dispatch_clock += 1;
        let clock = self.dispatch_clock;
        let pcb = mm.process_mut(pid)?;
        pcb.set_state(ProcessState::Running);
        pcb.quantum_used = 0;
        pcb.last_dispatch = clock;
        pcb.restore(cpu);
        let base = pcb
            .base
            .ok_or_else(|| CoreError::InvalidArgument(format!("pid {pid} has no partition")))?;
        bus.set_window(base);
        cpu.reset_pipeline();
        cpu.is_executing = true;
        self.running = Some(pid);
        log::trace!("dispatch pid {pid} at 0x{base:04X}");
        Ok(true)
    }

    /// Least-recently-dispatched resident process that is not on the CPU.
    fn swap_victim(&self, mm: &MemoryManager) -> Option<Pid> {
        mm.processes()
            .iter()
            .filter(|p| {
                p.is_live() && p.location == ProcessLocation::Ram && Some(p.pid) != self.running
            })
            .min_by_key(|p| p.last_dispatch)
            .map(|p| p.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_names_parse_and_print() {
        assert_eq!("rr".parse::<SchedulingDiscipline>().unwrap(), SchedulingDiscipline::RoundRobin);
        assert_eq!("FCFS".parse::<SchedulingDiscipline>().unwrap(), SchedulingDiscipline::Fcfs);
        assert_eq!(
            "priority".parse::<SchedulingDiscipline>().unwrap(),
            SchedulingDiscipline::Priority
        );
        assert!("lottery".parse::<SchedulingDiscipline>().is_err());
        assert_eq!(SchedulingDiscipline::RoundRobin.to_string(), "ROUND ROBIN");
    }

    #[test]
    fn quantum_below_one_is_rejected() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.set_quantum(0).is_err());
        scheduler.set_quantum(2).unwrap();
        assert_eq!(scheduler.quantum(), 2);
    }

    #[test]
    fn priority_queue_orders_ascending_with_fifo_ties() {
        let mut scheduler = Scheduler::new();
        let mut mm = MemoryManager::new();
        let mut bus = MemoryAccessor::new();
        let mut disk = DiskDriver::new();
        disk.format();

        let program = [0xEA, 0x00];
        let low = mm.allocate(&mut bus, &mut disk, &program, Some(40)).unwrap();
        let high = mm.allocate(&mut bus, &mut disk, &program, Some(1)).unwrap();
        let mid_a = mm.allocate(&mut bus, &mut disk, &program, Some(20)).unwrap();
        let mid_b = mm.allocate(&mut bus, &mut disk, &program, Some(20)).unwrap();

        scheduler.set_schedule(SchedulingDiscipline::Priority, &mm);
        for pid in [low, mid_a, high, mid_b] {
            scheduler.enqueue(pid, &mut mm).unwrap();
        }
        let order: Vec<Pid> = scheduler.ready_pids().collect();
        assert_eq!(order, vec![high, mid_a, mid_b, low]);
    }

    #[test]
    fn extract_removes_only_the_target() {
        let mut scheduler = Scheduler::new();
        let mut mm = MemoryManager::new();
        let mut bus = MemoryAccessor::new();
        let mut disk = DiskDriver::new();
        disk.format();
        let a = mm.allocate(&mut bus, &mut disk, &[0xEA, 0x00], None).unwrap();
        let b = mm.allocate(&mut bus, &mut disk, &[0xEA, 0x00], None).unwrap();
        scheduler.enqueue(a, &mut mm).unwrap();
        scheduler.enqueue(b, &mut mm).unwrap();
        assert!(scheduler.extract(a));
        assert!(!scheduler.extract(a));
        assert_eq!(scheduler.ready_pids().collect::<Vec<_>>(), vec![b]);
    }
}
