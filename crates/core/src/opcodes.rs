//! Declarative 6502 opcode table.
//!
//! One 256-entry table is the single source of truth for decode: mnemonic,
//! addressing mode, base cycle count, and whether an indexed read pays the
//! one-cycle page-crossing penalty. The interpreter in [`crate::cpu`] drives
//! everything off this table, so timing rules live here and nowhere else.
//!
//! All 151 documented NMOS opcodes are present. The remaining 105 encodings
//! are [`Mnemonic::Ill`]: on this machine they consume their opcode byte, cost
//! zero cycles, and execute nothing.

/// How an instruction interprets its operand bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddrMode {
    /// Operand length in bytes (opcode byte excluded).
    pub fn operand_len(self) -> u16 {
        match self {
            AddrMode::Implied | AddrMode::Accumulator => 0,
            AddrMode::Immediate
            | AddrMode::ZeroPage
            | AddrMode::ZeroPageX
            | AddrMode::ZeroPageY
            | AddrMode::IndirectX
            | AddrMode::IndirectY
            | AddrMode::Relative => 1,
            AddrMode::Absolute | AddrMode::AbsoluteX | AddrMode::AbsoluteY | AddrMode::Indirect => 2,
        }
    }
}

/// Documented 6502 operations, plus `Ill` for everything undocumented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx,
    Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp,
    Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay,
    Tsx, Txa, Txs, Tya,
    /// Undocumented encoding: zero cycles, PC advances past the opcode byte.
    Ill,
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpec {
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
    /// Base cycle count from the classic NMOS timing table.
    pub cycles: u8,
    /// Indexed read: +1 cycle when the effective address crosses a page.
    pub page_penalty: bool,
}

const ILL: OpSpec = OpSpec {
    mnemonic: Mnemonic::Ill,
    mode: AddrMode::Implied,
    cycles: 0,
    page_penalty: false,
};

const fn op(mnemonic: Mnemonic, mode: AddrMode, cycles: u8) -> OpSpec {
    OpSpec { mnemonic, mode, cycles, page_penalty: false }
}

const fn op_px(mnemonic: Mnemonic, mode: AddrMode, cycles: u8) -> OpSpec {
    OpSpec { mnemonic, mode, cycles, page_penalty: true }
}

/// The 256-entry opcode table, indexed by opcode byte.
pub static OPCODES: [OpSpec; 256] = build_table();

const fn build_table() -> [OpSpec; 256] {
    use AddrMode::*;
    use Mnemonic::*;

    let mut t = [ILL; 256];

    t[0x00] = op(Brk, Implied, 7);
    t[0x01] = op(Ora, IndirectX, 6);
    t[0x05] = op(Ora, ZeroPage, 3);
    t[0x06] = op(Asl, ZeroPage, 5);
    t[0x08] = op(Php, Implied, 3);
    t[0x09] = op(Ora, Immediate, 2);
    t[0x0A] = op(Asl, Accumulator, 2);
    t[0x0D] = op(Ora, Absolute, 4);
    t[0x0E] = op(Asl, Absolute, 6);
    t[0x10] = op(Bpl, Relative, 2);
    t[0x11] = op_px(Ora, IndirectY, 5);
    t[0x15] = op(Ora, ZeroPageX, 4);
    t[0x16] = op(Asl, ZeroPageX, 6);
    t[0x18] = op(Clc, Implied, 2);
    t[0x19] = op_px(Ora, AbsoluteY, 4);
    t[0x1D] = op_px(Ora, AbsoluteX, 4);
    t[0x1E] = op(Asl, AbsoluteX, 7);
    t[0x20] = op(Jsr, Absolute, 6);
    t[0x21] = op(And, IndirectX, 6);
    t[0x24] = op(Bit, ZeroPage, 3);
    t[0x25] = op(And, ZeroPage, 3);
    t[0x26] = op(Rol, ZeroPage, 5);
    t[0x28] = op(Plp, Implied, 4);
    t[0x29] = op(And, Immediate, 2);
    t[0x2A] = op(Rol, Accumulator, 2);
    t[0x2C] = op(Bit, Absolute, 4);
    t[0x2D] = op(And, Absolute, 4);
    t[0x2E] = op(Rol, Absolute, 6);
    t[0x30] = op(Bmi, Relative, 2);
    t[0x31] = op_px(And, IndirectY, 5);
    t[0x35] = op(And, ZeroPageX, 4);
    t[0x36] = op(Rol, ZeroPageX, 6);
    t[0x38] = op(Sec, Implied, 2);
    t[0x39] = op_px(And, AbsoluteY, 4);
    t[0x3D] = op_px(And, AbsoluteX, 4);
    t[0x3E] = op(Rol, AbsoluteX, 7);
    t[0x40] = op(Rti, Implied, 6);
    t[0x41] = op(Eor, IndirectX, 6);
    t[0x45] = op(Eor, ZeroPage, 3);
    t[0x46] = op(Lsr, ZeroPage, 5);
    t[0x48] = op(Pha, Implied, 3);
    t[0x49] = op(Eor, Immediate, 2);
    t[0x4A] = op(Lsr, Accumulator, 2);
    t[0x4C] = op(Jmp, Absolute, 3);
    t[0x4D] = op(Eor, Absolute, 4);
    t[0x4E] = op(Lsr, Absolute, 6);
    t[0x50] = op(Bvc, Relative, 2);
    t[0x51] = op_px(Eor, IndirectY, 5);
    t[0x55] = op(Eor, ZeroPageX, 4);
    t[0x56] = op(Lsr, ZeroPageX, 6);
    t[0x58] = op(Cli, Implied, 2);
    t[0x59] = op_px(Eor, AbsoluteY, 4);
    t[0x5D] = op_px(Eor, AbsoluteX, 4);
    t[0x5E] = op(Lsr, AbsoluteX, 7);
    t[0x60] = op(Rts, Implied, 6);
    t[0x61] = op(Adc, IndirectX, 6);
    t[0x65] = op(Adc, ZeroPage, 3);
    t[0x66] = op(Ror, ZeroPage, 5);
    t[0x68] = op(Pla, Implied, 4);
    t[0x69] = op(Adc, Immediate, 2);
    t[0x6A] = op(Ror, Accumulator, 2);
    t[0x6C] = op(Jmp, Indirect, 5);
    t[0x6D] = op(Adc, Absolute, 4);
    t[0x6E] = op(Ror, Absolute, 6);
    t[0x70] = op(Bvs, Relative, 2);
    t[0x71] = op_px(Adc, IndirectY, 5);
    t[0x75] = op(Adc, ZeroPageX, 4);
    t[0x76] = op(Ror, ZeroPageX, 6);
    t[0x78] = op(Sei, Implied, 2);
    t[0x79] = op_px(Adc, AbsoluteY, 4);
    t[0x7D] = op_px(Adc, AbsoluteX, 4);
    t[0x7E] = op(Ror, AbsoluteX, 7);
    t[0x81] = op(Sta, IndirectX, 6);
    t[0x84] = op(Sty, ZeroPage, 3);
    t[0x85] = op(Sta, ZeroPage, 3);
    t[0x86] = op(Stx, ZeroPage, 3);
    t[0x88] = op(Dey, Implied, 2);
    t[0x8A] = op(Txa, Implied, 2);
    t[0x8C] = op(Sty, Absolute, 4);
    t[0x8D] = op(Sta, Absolute, 4);
    t[0x8E] = op(Stx, Absolute, 4);
    t[0x90] = op(Bcc, Relative, 2);
    t[0x91] = op(Sta, IndirectY, 6);
    t[0x94] = op(Sty, ZeroPageX, 4);
    t[0x95] = op(Sta, ZeroPageX, 4);
    t[0x96] = op(Stx, ZeroPageY, 4);
    t[0x98] = op(Tya, Implied, 2);
    t[0x99] = op(Sta, AbsoluteY, 5);
    t[0x9A] = op(Txs, Implied, 2);
    t[0x9D] = op(Sta, AbsoluteX, 5);
    t[0xA0] = op(Ldy, Immediate, 2);
    t[0xA1] = op(Lda, IndirectX, 6);
    t[0xA2] = op(Ldx, Immediate, 2);
    t[0xA4] = op(Ldy, ZeroPage, 3);
    t[0xA5] = op(Lda, ZeroPage, 3);
    t[0xA6] = op(Ldx, ZeroPage, 3);
    t[0xA8] = op(Tay, Implied, 2);
    t[0xA9] = op(Lda, Immediate, 2);
    t[0xAA] = op(Tax, Implied, 2);
    t[0xAC] = op(Ldy, Absolute, 4);
    t[0xAD] = op(Lda, Absolute, 4);
    t[0xAE] = op(Ldx, Absolute, 4);
    t[0xB0] = op(Bcs, Relative, 2);
    t[0xB1] = op_px(Lda, IndirectY, 5);
    t[0xB4] = op(Ldy, ZeroPageX, 4);
    t[0xB5] = op(Lda, ZeroPageX, 4);
    t[0xB6] = op(Ldx, ZeroPageY, 4);
    t[0xB8] = op(Clv, Implied, 2);
    t[0xB9] = op_px(Lda, AbsoluteY, 4);
    t[0xBA] = op(Tsx, Implied, 2);
    t[0xBC] = op_px(Ldy, AbsoluteX, 4);
    t[0xBD] = op_px(Lda, AbsoluteX, 4);
    t[0xBE] = op_px(Ldx, AbsoluteY, 4);
    t[0xC0] = op(Cpy, Immediate, 2);
    t[0xC1] = op(Cmp, IndirectX, 6);
    t[0xC4] = op(Cpy, ZeroPage, 3);
    t[0xC5] = op(Cmp, ZeroPage, 3);
    t[0xC6] = op(Dec, ZeroPage, 5);
    t[0xC8] = op(Iny, Implied, 2);
    t[0xC9] = op(Cmp, Immediate, 2);
    t[0xCA] = op(Dex, Implied, 2);
    t[0xCC] = op(Cpy, Absolute, 4);
    t[0xCD] = op(Cmp, Absolute, 4);
    t[0xCE] = op(Dec, Absolute, 6);
    t[0xD0] = op(Bne, Relative, 2);
    t[0xD1] = op_px(Cmp, IndirectY, 5);
    t[0xD5] = op(Cmp, ZeroPageX, 4);
    t[0xD6] = op(Dec, ZeroPageX, 6);
    t[0xD8] = op(Cld, Implied, 2);
    t[0xD9] = op_px(Cmp, AbsoluteY, 4);
    t[0xDD] = op_px(Cmp, AbsoluteX, 4);
    t[0xDE] = op(Dec, AbsoluteX, 7);
    t[0xE0] = op(Cpx, Immediate, 2);
    t[0xE1] = op(Sbc, IndirectX, 6);
    t[0xE4] = op(Cpx, ZeroPage, 3);
    t[0xE5] = op(Sbc, ZeroPage, 3);
    t[0xE6] = op(Inc, ZeroPage, 5);
    t[0xE8] = op(Inx, Implied, 2);
    t[0xE9] = op(Sbc, Immediate, 2);
    t[0xEA] = op(Nop, Implied, 2);
    t[0xEC] = op(Cpx, Absolute, 4);
    t[0xED] = op(Sbc, Absolute, 4);
    t[0xEE] = op(Inc, Absolute, 6);
    t[0xF0] = op(Beq, Relative, 2);
    t[0xF1] = op_px(Sbc, IndirectY, 5);
    t[0xF5] = op(Sbc, ZeroPageX, 4);
    t[0xF6] = op(Inc, ZeroPageX, 6);
    t[0xF8] = op(Sed, Implied, 2);
    t[0xF9] = op_px(Sbc, AbsoluteY, 4);
    t[0xFD] = op_px(Sbc, AbsoluteX, 4);
    t[0xFE] = op(Inc, AbsoluteX, 7);

    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_count() {
        let documented = OPCODES.iter().filter(|s| s.mnemonic != Mnemonic::Ill).count();
        assert_eq!(documented, 151);
    }

    #[test]
    fn test_illegal_entries_cost_nothing() {
        for spec in OPCODES.iter().filter(|s| s.mnemonic == Mnemonic::Ill) {
            assert_eq!(spec.cycles, 0);
            assert!(!spec.page_penalty);
        }
    }

    #[test]
    fn test_branches_are_relative() {
        use Mnemonic::*;
        for spec in OPCODES.iter() {
            let is_branch = matches!(spec.mnemonic, Bcc | Bcs | Beq | Bmi | Bne | Bpl | Bvc | Bvs);
            assert_eq!(is_branch, spec.mode == AddrMode::Relative);
            if is_branch {
                assert_eq!(spec.cycles, 2);
            }
        }
    }

    #[test]
    fn test_page_penalty_only_on_indexed_reads() {
        use Mnemonic::*;
        for spec in OPCODES.iter().filter(|s| s.page_penalty) {
            assert!(matches!(
                spec.mode,
                AddrMode::AbsoluteX | AddrMode::AbsoluteY | AddrMode::IndirectY
            ));
            // Stores and read-modify-writes never pay the penalty.
            assert!(!matches!(
                spec.mnemonic,
                Sta | Stx | Sty | Asl | Lsr | Rol | Ror | Inc | Dec
            ));
        }
    }

    #[test]
    fn test_store_timings_fixed() {
        assert_eq!(OPCODES[0x9D].cycles, 5); // STA abs,X
        assert_eq!(OPCODES[0x99].cycles, 5); // STA abs,Y
        assert_eq!(OPCODES[0x91].cycles, 6); // STA (zp),Y
        assert!(!OPCODES[0x9D].page_penalty);
        assert!(!OPCODES[0x91].page_penalty);
    }

    #[test]
    fn test_operand_lengths() {
        assert_eq!(OPCODES[0xA9].mode.operand_len(), 1); // LDA #imm
        assert_eq!(OPCODES[0xAD].mode.operand_len(), 2); // LDA abs
        assert_eq!(OPCODES[0x0A].mode.operand_len(), 0); // ASL A
        assert_eq!(OPCODES[0x6C].mode.operand_len(), 2); // JMP (ind)
    }
}
