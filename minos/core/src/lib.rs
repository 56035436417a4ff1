//! MINOS core: a pedagogical operating-system simulator.
//!
//! The crate models a small machine end to end: a single-accumulator CPU with
//! a 6502-like opcode set, a byte-addressable memory split into fixed
//! partitions, a track/sector/block disk with a chained-block filesystem, and
//! a pulse-driven scheduler that context-switches through process control
//! blocks. The host (CLI, tests, or any other front-end) owns the clock and
//! the console; everything else lives behind [`kernel::Kernel`].

pub mod console;
pub mod cpu;
pub mod disk;
pub mod kernel;
pub mod memory;
pub mod mm;
pub mod opcodes;
pub mod pcb;
pub mod program;
pub mod scheduler;
pub mod snapshot;

use std::time::SystemTime;
use thiserror::Error;

pub use console::{BufferConsole, Console};
pub use cpu::{Cpu, HaltCause, PipelineStep, PulseOutcome};
pub use disk::{
    BlockHeader, BlockRecord, DiskDriver, DiskStats, Tsb, BLOCKS, BLOCK_DATA_LEN, SECTORS, TRACKS,
};
pub use kernel::{Kernel, ProcessReport};
pub use memory::{Memory, MemoryAccessor, MEMORY_SIZE, PARTITION_COUNT, PARTITION_SIZE};
pub use mm::{swap_file_name, MemoryManager, DEFAULT_PRIORITY};
pub use pcb::{Pcb, Pid, ProcessLocation, ProcessState};
pub use program::{format_hex_tokens, parse_hex_tokens};
pub use scheduler::{Scheduler, SchedulingDiscipline, DEFAULT_QUANTUM};
pub use snapshot::{load_image, save_image, DiskImage, IMAGE_MAGIC, IMAGE_VERSION};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("program of {len} bytes exceeds the {limit}-byte partition")]
    ProgramTooLarge { len: usize, limit: usize },
    #[error("invalid program token {token:?}")]
    InvalidProgram { token: String },
    #[error("{opcode:02X} is not a valid instruction")]
    InvalidInstruction { opcode: u8 },
    #[error("memory access out of bounds at 0x{addr:04X}")]
    MemoryBounds { addr: u16 },
    #[error("increment past 0xFF at 0x{addr:04X}")]
    IncrementOverflow { addr: u16 },
    #[error("disk is not formatted")]
    NotFormatted,
    #[error("filename {name:?} is already in use")]
    NameInUse { name: String },
    #[error("no space left on disk")]
    NoSpace,
    #[error("file {name:?} not found")]
    NotFound { name: String },
    #[error("invalid filename {name:?}")]
    InvalidName { name: String },
    #[error("corrupt block chain: {0}")]
    CorruptChain(String),
    #[error("no process with pid {pid}")]
    NoSuchProcess { pid: Pid },
    #[error("{0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid disk image: {0}")]
    InvalidImage(String),
}

impl CoreError {
    /// Traps terminate the offending process; every other error is reported
    /// to the caller with no process effect.
    pub fn is_trap(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInstruction { .. }
                | CoreError::MemoryBounds { .. }
                | CoreError::IncrementOverflow { .. }
        )
    }
}

pub fn now_timestamp() -> String {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => format!("{}Z", duration.as_secs()),
        Err(_) => "0Z".to_string(),
    }
}
