use minos_core::{
    swap_file_name, BufferConsole, CoreError, Kernel, ProcessLocation, ProcessState,
};

fn boot() -> Kernel<BufferConsole> {
    let mut kernel = Kernel::new(BufferConsole::new());
    kernel.format_disk(false).unwrap();
    kernel
}

/// ldx #1, ldy #digit, print Y, halt. Four pulses.
fn one_shot_program(digit: u8) -> String {
    format!("A2 01 A0 {digit:02X} FF 00")
}

#[test]
fn fourth_load_overflows_to_a_hidden_swap_file() {
    let mut kernel = boot();
    for digit in 1..=4 {
        kernel.load_program(&one_shot_program(digit), None).unwrap();
    }
    let reports = kernel.ps();
    for report in &reports[..3] {
        assert_eq!(report.location, ProcessLocation::Ram);
    }
    assert_eq!(reports[3].location, ProcessLocation::Disk);
    assert_eq!(reports[3].base, None);

    let hidden = kernel.list_files(true).unwrap();
    assert!(hidden.contains(&".process3.swp".to_string()));
    // Swap files stay out of a plain listing.
    assert!(kernel.list_files(false).unwrap().is_empty());
}

#[test]
fn overflow_requires_a_formatted_disk() {
    let mut kernel = Kernel::new(BufferConsole::new());
    for digit in 1..=3 {
        kernel.load_program(&one_shot_program(digit), None).unwrap();
    }
    assert!(matches!(
        kernel.load_program(&one_shot_program(4), None),
        Err(CoreError::NotFormatted)
    ));
    assert_eq!(kernel.ps().len(), 3);
}

#[test]
fn disk_resident_process_swaps_in_and_runs_to_completion() {
    let mut kernel = boot();
    for digit in 1..=4 {
        kernel.load_program(&one_shot_program(digit), None).unwrap();
    }
    kernel.run_all().unwrap();
    kernel.set_quantum(2).unwrap();

    let mut saw_pid0_on_disk = false;
    let mut pulses = 0;
    while !kernel.is_idle() {
        kernel.pulse().unwrap();
        pulses += 1;
        assert!(pulses < 10_000, "machine failed to go idle");
        if kernel.mm.process(0).unwrap().location == ProcessLocation::Disk {
            saw_pid0_on_disk = true;
        }
    }

    // Pid 3's dispatch had no free partition, so the least-recently
    // dispatched resident process was rolled out to make room.
    assert!(saw_pid0_on_disk);
    assert_eq!(kernel.console.text(), "4123");
    for report in kernel.ps() {
        assert_eq!(report.state, ProcessState::Terminated);
    }
    // Every swap file was consumed or cleaned up.
    assert!(kernel.list_files(true).unwrap().is_empty());
}

#[test]
fn deallocating_a_disk_resident_process_removes_its_swap_file() {
    let mut kernel = boot();
    for digit in 1..=4 {
        kernel.load_program(&one_shot_program(digit), None).unwrap();
    }
    kernel.kill(3).unwrap();
    assert!(!kernel.list_files(true).unwrap().contains(&swap_file_name(3)));
    assert_eq!(kernel.ps()[3].state, ProcessState::Terminated);
}
