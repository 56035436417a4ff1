//! Memory manager: partition allocation, the process table, and the swap
//! files that catch partition overflow.

use crate::disk::DiskDriver;
use crate::memory::{MemoryAccessor, PARTITION_COUNT, PARTITION_SIZE};
use crate::pcb::{Pcb, Pid, ProcessLocation, ProcessState};
use crate::program::{format_hex_tokens, parse_hex_tokens};
use crate::{CoreError, Result};

pub const DEFAULT_PRIORITY: u8 = 32;

const SWAP_FILE_PREFIX: &str = ".process";
const SWAP_FILE_SUFFIX: &str = ".swp";

/// The naming contract between the memory manager and the disk driver.
/// Swap files are hidden, so a plain `ls` never shows them.
pub fn swap_file_name(pid: Pid) -> String {
    format!("{SWAP_FILE_PREFIX}{pid}{SWAP_FILE_SUFFIX}")
}

/// Hex-token body of a swap file. The trailing newline fences the last
/// token off from the '0' padding the disk appends, so reading the file
/// back never loses a byte.
fn swap_image_text(image: &[u8]) -> String {
    let mut text = format_hex_tokens(image);
    text.push('\n');
    text
}

#[derive(Default)]
pub struct MemoryManager {
    table: Vec<Pcb>,
    next_pid: Pid,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_bases() -> impl Iterator<Item = u16> {
        (0..PARTITION_COUNT).map(|i| (i * PARTITION_SIZE) as u16)
    }

    pub fn processes(&self) -> &[Pcb] {
        &self.table
    }

    pub fn process(&self, pid: Pid) -> Result<&Pcb> {
        self.table.iter().find(|p| p.pid == pid).ok_or(CoreError::NoSuchProcess { pid })
    }

    pub fn process_mut(&mut self, pid: Pid) -> Result<&mut Pcb> {
        self.table.iter_mut().find(|p| p.pid == pid).ok_or(CoreError::NoSuchProcess { pid })
    }

    /// A partition is free when its base byte reads zero and no live process
    /// claims it. The process table is authoritative; the zero byte is only
    /// a cross-check.
    fn partition_is_free(&self, bus: &MemoryAccessor, base: u16) -> bool {
        bus.read_immediate(base) == 0x00
            && !self.table.iter().any(|p| p.is_live() && p.base == Some(base))
    }

    pub fn free_partition(&self, bus: &MemoryAccessor) -> Option<u16> {
        Self::partition_bases().find(|base| self.partition_is_free(bus, *base))
    }

    pub fn has_free_partition(&self, bus: &MemoryAccessor) -> bool {
        self.free_partition(bus).is_some()
    }

    /// Install a program, preferring a RAM partition and falling back to a
    /// swap file on disk. Returns the new pid.
    pub fn allocate(
        &mut self,
        bus: &mut MemoryAccessor,
        disk: &mut DiskDriver,
        program: &[u8],
        priority: Option<u8>,
    ) -> Result<Pid> {
        if program.len() > PARTITION_SIZE {
            return Err(CoreError::ProgramTooLarge { len: program.len(), limit: PARTITION_SIZE });
        }
        let pid = self.next_pid;
        let priority = priority.unwrap_or(DEFAULT_PRIORITY);
        let pcb = match self.free_partition(bus) {
            Some(base) => {
                bus.write_program(program, base, PARTITION_SIZE)?;
                log::debug!("pid {pid} resident at 0x{base:04X}");
                Pcb::new_in_ram(pid, base, priority)
            }
            None => {
                let name = swap_file_name(pid);
                disk.create(&name)?;
                disk.write(&name, swap_image_text(program).as_bytes())?;
                log::debug!("pid {pid} spilled to swap file {name}");
                Pcb::new_on_disk(pid, priority)
            }
        };
        self.next_pid += 1;
        self.table.push(pcb);
        Ok(pid)
    }

    /// Terminate a process and release whatever it held. Safe to call again
    /// on an already-terminated pid.
    pub fn deallocate(
        &mut self,
        pid: Pid,
        bus: &mut MemoryAccessor,
        disk: &mut DiskDriver,
    ) -> Result<()> {
        let pcb = self.process_mut(pid)?;
        if !pcb.is_live() {
            return Ok(());
        }
        let base = pcb.base;
        let location = pcb.location;
        pcb.set_state(ProcessState::Terminated);
        pcb.quantum_used = 0;
        match location {
            ProcessLocation::Ram => {
                if let Some(base) = base {
                    bus.clear_program(base, PARTITION_SIZE);
                }
            }
            ProcessLocation::Disk => match disk.delete(&swap_file_name(pid)) {
                Ok(()) | Err(CoreError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            },
        }
        log::debug!("pid {pid} terminated");
        Ok(())
    }

    /// Roll a resident process out to disk, freeing its partition.
    pub fn swap_out(
        &mut self,
        pid: Pid,
        bus: &mut MemoryAccessor,
        disk: &mut DiskDriver,
    ) -> Result<()> {
        let pcb = self.process_mut(pid)?;
        let base = pcb
            .base
            .ok_or_else(|| CoreError::InvalidArgument(format!("pid {pid} is not resident")))?;
        let image: Vec<u8> =
            (0..PARTITION_SIZE).map(|offset| bus.read_immediate(base + offset as u16)).collect();
        let name = swap_file_name(pid);
        disk.create(&name)?;
        disk.write(&name, swap_image_text(&image).as_bytes())?;
        bus.clear_program(base, PARTITION_SIZE);
        let pcb = self.process_mut(pid)?;
        pcb.location = ProcessLocation::Disk;
        pcb.base = None;
        log::debug!("pid {pid} swapped out of 0x{base:04X}");
        Ok(())
    }

    /// Roll a swapped process into a free partition and drop its swap file.
    pub fn swap_in(
        &mut self,
        pid: Pid,
        bus: &mut MemoryAccessor,
        disk: &mut DiskDriver,
    ) -> Result<()> {
        let base = self.free_partition(bus).ok_or_else(|| {
            CoreError::InvalidArgument(format!("no free partition to swap pid {pid} into"))
        })?;
        let name = swap_file_name(pid);
        let image = parse_hex_tokens(&disk.read_string(&name)?)?;
        bus.write_program(&image, base, PARTITION_SIZE)?;
        disk.delete(&name)?;
        let pcb = self.process_mut(pid)?;
        pcb.location = ProcessLocation::Ram;
        pcb.base = Some(base);
        log::debug!("pid {pid} swapped into 0x{base:04X}");
        Ok(())
    }

    /// Deallocate every live RAM-resident process. Returns the pids cleared.
    pub fn clear_resident(
        &mut self,
        bus: &mut MemoryAccessor,
        disk: &mut DiskDriver,
    ) -> Result<Vec<Pid>> {
        let pids: Vec<Pid> = self
            .table
            .iter()
            .filter(|p| p.is_live() && p.location == ProcessLocation::Ram)
            .map(|p| p.pid)
            .collect();
        for pid in &pids {
            self.deallocate(*pid, bus, disk)?;
        }
        Ok(pids)
    }
}
