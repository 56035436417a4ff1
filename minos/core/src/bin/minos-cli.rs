use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use minos_core::{Console, Kernel, SchedulingDiscipline};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "minos-cli")]
#[command(about = "Run hex programs on the MINOS machine", long_about = None)]
struct Args {
    /// Program files, each a whitespace-separated list of two-char hex tokens
    programs: Vec<PathBuf>,

    /// Scheduler quantum in CPU pulses
    #[arg(long, default_value_t = 6)]
    quantum: u32,

    /// Scheduling algorithm: rr, fcfs, or priority
    #[arg(long, default_value = "rr")]
    schedule: String,

    /// Priority for each program, positionally (missing entries use the default)
    #[arg(long)]
    priority: Vec<u8>,

    /// Stop after this many pulses even if processes are still live
    #[arg(long, default_value_t = 100_000)]
    max_pulses: u64,

    /// Load a disk image before running instead of formatting a fresh disk
    #[arg(long)]
    load_image: Option<PathBuf>,

    /// Save the disk image after the run
    #[arg(long)]
    save_image: Option<PathBuf>,

    /// Print the process table after the run
    #[arg(long, action = ArgAction::SetTrue)]
    ps: bool,

    /// Print disk usage after the run
    #[arg(long, action = ArgAction::SetTrue)]
    disk_stats: bool,
}

/// Console that writes straight to stdout.
#[derive(Default)]
struct TermConsole {
    x: usize,
}

impl Console for TermConsole {
    fn put_text(&mut self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
        self.x += text.len();
    }

    fn advance_line(&mut self) {
        println!();
        self.x = 0;
    }

    fn clear_screen(&mut self) {
        print!("\x1b[2J\x1b[H");
        let _ = io::stdout().flush();
        self.x = 0;
    }

    fn reset_xy(&mut self) {
        self.x = 0;
    }

    fn current_x_position(&self) -> usize {
        self.x
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut kernel = Kernel::new(TermConsole::default());
    match &args.load_image {
        Some(path) => kernel
            .load_disk_image(path)
            .with_context(|| format!("loading disk image {}", path.display()))?,
        None => kernel.format_disk(false)?,
    }

    kernel.set_quantum(args.quantum)?;
    let schedule: SchedulingDiscipline = args.schedule.parse()?;
    kernel.set_schedule(schedule);

    for (index, path) in args.programs.iter().enumerate() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading program {}", path.display()))?;
        let priority = args.priority.get(index).copied();
        let pid = kernel
            .load_program(&text, priority)
            .with_context(|| format!("loading program {}", path.display()))?;
        eprintln!("loaded {} as pid {pid}", path.display());
    }

    kernel.run_all()?;
    let mut pulses = 0u64;
    while !kernel.is_idle() {
        if pulses >= args.max_pulses {
            bail!("pulse limit of {} reached with processes still live", args.max_pulses);
        }
        kernel.pulse()?;
        pulses += 1;
    }
    if kernel.console.current_x_position() > 0 {
        kernel.console.advance_line();
    }
    eprintln!("machine idle after {pulses} pulses");

    if args.ps {
        for report in kernel.ps() {
            println!("{report}");
        }
    }
    if args.disk_stats {
        let stats = kernel.disk_stats();
        println!(
            "directory: {} used, {} free; data blocks: {} used, {} free",
            stats.directory_used, stats.directory_free, stats.data_used, stats.data_free
        );
    }
    if let Some(path) = &args.save_image {
        kernel
            .save_disk_image(path)
            .with_context(|| format!("saving disk image {}", path.display()))?;
        eprintln!("disk image saved to {}", path.display());
    }
    Ok(())
}
