//! Static opcode table for the 6502-like user ISA.
//!
//! Decode works against [`OPCODES`] through the by-byte index; an opcode
//! missing from the table is an invalid-instruction trap, not a panic.

use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Brk,
    Adc,
    Sta,
    Lda,
    Ldx,
    Ldy,
    Tax,
    Tay,
    Txa,
    Tya,
    Bne,
    Nop,
    Cpx,
    Inc,
    Sys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// No operand bytes.
    Implied,
    /// One operand byte loaded directly into a register.
    Immediate,
    /// Two operand bytes (low then high) assembled into the MAR.
    Absolute,
    /// One signed offset byte.
    Relative,
    /// The syscall: two operand bytes iff X selects the pointer form.
    System,
}

#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: AddressMode,
}

impl OpcodeEntry {
    /// Operand count at decode time. `x` is the X register, which selects
    /// the syscall form (X==3 takes a two-byte pointer operand).
    pub fn operand_count(&self, x: u8) -> u8 {
        match self.mode {
            AddressMode::Implied => 0,
            AddressMode::Immediate | AddressMode::Relative => 1,
            AddressMode::Absolute => 2,
            AddressMode::System => {
                if x == 3 {
                    2
                } else {
                    0
                }
            }
        }
    }
}

pub const OPCODES: &[OpcodeEntry] = &[
    OpcodeEntry { opcode: 0x00, mnemonic: Mnemonic::Brk, mode: AddressMode::Implied },
    OpcodeEntry { opcode: 0x6D, mnemonic: Mnemonic::Adc, mode: AddressMode::Absolute },
    OpcodeEntry { opcode: 0x8A, mnemonic: Mnemonic::Txa, mode: AddressMode::Implied },
    OpcodeEntry { opcode: 0x8D, mnemonic: Mnemonic::Sta, mode: AddressMode::Absolute },
    OpcodeEntry { opcode: 0x98, mnemonic: Mnemonic::Tya, mode: AddressMode::Implied },
    OpcodeEntry { opcode: 0xA0, mnemonic: Mnemonic::Ldy, mode: AddressMode::Immediate },
    OpcodeEntry { opcode: 0xA2, mnemonic: Mnemonic::Ldx, mode: AddressMode::Immediate },
    OpcodeEntry { opcode: 0xA8, mnemonic: Mnemonic::Tay, mode: AddressMode::Implied },
    OpcodeEntry { opcode: 0xA9, mnemonic: Mnemonic::Lda, mode: AddressMode::Immediate },
    OpcodeEntry { opcode: 0xAA, mnemonic: Mnemonic::Tax, mode: AddressMode::Implied },
    OpcodeEntry { opcode: 0xAC, mnemonic: Mnemonic::Ldy, mode: AddressMode::Absolute },
    OpcodeEntry { opcode: 0xAD, mnemonic: Mnemonic::Lda, mode: AddressMode::Absolute },
    OpcodeEntry { opcode: 0xAE, mnemonic: Mnemonic::Ldx, mode: AddressMode::Absolute },
    OpcodeEntry { opcode: 0xD0, mnemonic: Mnemonic::Bne, mode: AddressMode::Relative },
    OpcodeEntry { opcode: 0xEA, mnemonic: Mnemonic::Nop, mode: AddressMode::Implied },
    OpcodeEntry { opcode: 0xEC, mnemonic: Mnemonic::Cpx, mode: AddressMode::Absolute },
    OpcodeEntry { opcode: 0xEE, mnemonic: Mnemonic::Inc, mode: AddressMode::Absolute },
    OpcodeEntry { opcode: 0xFF, mnemonic: Mnemonic::Sys, mode: AddressMode::System },
];

static BY_OPCODE: Lazy<HashMap<u8, &'static OpcodeEntry>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for entry in OPCODES {
        map.insert(entry.opcode, entry);
    }
    map
});

pub fn lookup(opcode: u8) -> Option<&'static OpcodeEntry> {
    BY_OPCODE.get(&opcode).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_entry_resolves_through_the_index() {
        for entry in OPCODES {
            let found = lookup(entry.opcode).expect("indexed");
            assert_eq!(found.mnemonic, entry.mnemonic);
        }
    }

    #[test]
    fn unknown_opcode_is_absent() {
        assert!(lookup(0xC3).is_none());
        assert!(lookup(0x01).is_none());
    }

    #[test]
    fn syscall_operand_count_depends_on_x() {
        let sys = lookup(0xFF).unwrap();
        assert_eq!(sys.operand_count(1), 0);
        assert_eq!(sys.operand_count(2), 0);
        assert_eq!(sys.operand_count(3), 2);
    }
}
