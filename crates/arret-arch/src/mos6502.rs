//! MOS 6502 architecture data.
//!
//! Table-driven disassembler covering all documented NMOS 6502 opcodes;
//! undocumented opcodes are treated as undefined.

use arret_abi::mos6502 as reg;

use crate::fmt::render;
use crate::table::{F_BREAKS, F_NONE, F_REL_TARGET, F_TARGET, OpEntry, UND, op};
use crate::{Instruction, RegFlag, RegLayoutEntry};

#[rustfmt::skip]
static OPS: [OpEntry; 256] = [
    // 0x00-0x0F
    op("BRK",                0, F_BREAKS),            // 00
    op("ORA ($@%02X,X)",     1, F_NONE),              // 01
    UND,                                              // 02
    UND,                                              // 03
    UND,                                              // 04
    op("ORA $@%02X",         1, F_NONE),              // 05
    op("ASL $@%02X",         1, F_NONE),              // 06
    UND,                                              // 07
    op("PHP",                0, F_NONE),              // 08
    op("ORA #$%02X",         1, F_NONE),              // 09
    op("ASL A",              0, F_NONE),              // 0A
    UND,                                              // 0B
    UND,                                              // 0C
    op("ORA $@%04X",         2, F_NONE),              // 0D
    op("ASL $@%04X",         2, F_NONE),              // 0E
    UND,                                              // 0F
    // 0x10-0x1F
    op("BPL $@%04X",         1, F_REL_TARGET),        // 10
    op("ORA ($@%02X),Y",     1, F_NONE),              // 11
    UND,                                              // 12
    UND,                                              // 13
    UND,                                              // 14
    op("ORA $@%02X,X",       1, F_NONE),              // 15
    op("ASL $@%02X,X",       1, F_NONE),              // 16
    UND,                                              // 17
    op("CLC",                0, F_NONE),              // 18
    op("ORA $@%04X,Y",       2, F_NONE),              // 19
    UND,                                              // 1A
    UND,                                              // 1B
    UND,                                              // 1C
    op("ORA $@%04X,X",       2, F_NONE),              // 1D
    op("ASL $@%04X,X",       2, F_NONE),              // 1E
    UND,                                              // 1F
    // 0x20-0x2F
    op("JSR $@%04X",         2, F_NONE),              // 20
    op("AND ($@%02X,X)",     1, F_NONE),              // 21
    UND,                                              // 22
    UND,                                              // 23
    op("BIT $@%02X",         1, F_NONE),              // 24
    op("AND $@%02X",         1, F_NONE),              // 25
    op("ROL $@%02X",         1, F_NONE),              // 26
    UND,                                              // 27
    op("PLP",                0, F_NONE),              // 28
    op("AND #$%02X",         1, F_NONE),              // 29
    op("ROL A",              0, F_NONE),              // 2A
    UND,                                              // 2B
    op("BIT $@%04X",         2, F_NONE),              // 2C
    op("AND $@%04X",         2, F_NONE),              // 2D
    op("ROL $@%04X",         2, F_NONE),              // 2E
    UND,                                              // 2F
    // 0x30-0x3F
    op("BMI $@%04X",         1, F_REL_TARGET),        // 30
    op("AND ($@%02X),Y",     1, F_NONE),              // 31
    UND,                                              // 32
    UND,                                              // 33
    UND,                                              // 34
    op("AND $@%02X,X",       1, F_NONE),              // 35
    op("ROL $@%02X,X",       1, F_NONE),              // 36
    UND,                                              // 37
    op("SEC",                0, F_NONE),              // 38
    op("AND $@%04X,Y",       2, F_NONE),              // 39
    UND,                                              // 3A
    UND,                                              // 3B
    UND,                                              // 3C
    op("AND $@%04X,X",       2, F_NONE),              // 3D
    op("ROL $@%04X,X",       2, F_NONE),              // 3E
    UND,                                              // 3F
    // 0x40-0x4F
    op("RTI",                0, F_BREAKS),            // 40
    op("EOR ($@%02X,X)",     1, F_NONE),              // 41
    UND,                                              // 42
    UND,                                              // 43
    UND,                                              // 44
    op("EOR $@%02X",         1, F_NONE),              // 45
    op("LSR $@%02X",         1, F_NONE),              // 46
    UND,                                              // 47
    op("PHA",                0, F_NONE),              // 48
    op("EOR #$%02X",         1, F_NONE),              // 49
    op("LSR A",              0, F_NONE),              // 4A
    UND,                                              // 4B
    op("JMP $@%04X",         2, F_BREAKS | F_TARGET), // 4C
    op("EOR $@%04X",         2, F_NONE),              // 4D
    op("LSR $@%04X",         2, F_NONE),              // 4E
    UND,                                              // 4F
    // 0x50-0x5F
    op("BVC $@%04X",         1, F_REL_TARGET),        // 50
    op("EOR ($@%02X),Y",     1, F_NONE),              // 51
    UND,                                              // 52
    UND,                                              // 53
    UND,                                              // 54
    op("EOR $@%02X,X",       1, F_NONE),              // 55
    op("LSR $@%02X,X",       1, F_NONE),              // 56
    UND,                                              // 57
    op("CLI",                0, F_NONE),              // 58
    op("EOR $@%04X,Y",       2, F_NONE),              // 59
    UND,                                              // 5A
    UND,                                              // 5B
    UND,                                              // 5C
    op("EOR $@%04X,X",       2, F_NONE),              // 5D
    op("LSR $@%04X,X",       2, F_NONE),              // 5E
    UND,                                              // 5F
    // 0x60-0x6F
    op("RTS",                0, F_BREAKS),            // 60
    op("ADC ($@%02X,X)",     1, F_NONE),              // 61
    UND,                                              // 62
    UND,                                              // 63
    UND,                                              // 64
    op("ADC $@%02X",         1, F_NONE),              // 65
    op("ROR $@%02X",         1, F_NONE),              // 66
    UND,                                              // 67
    op("PLA",                0, F_NONE),              // 68
    op("ADC #$%02X",         1, F_NONE),              // 69
    op("ROR A",              0, F_NONE),              // 6A
    UND,                                              // 6B
    op("JMP ($@%04X)",       2, F_BREAKS),            // 6C
    op("ADC $@%04X",         2, F_NONE),              // 6D
    op("ROR $@%04X",         2, F_NONE),              // 6E
    UND,                                              // 6F
    // 0x70-0x7F
    op("BVS $@%04X",         1, F_REL_TARGET),        // 70
    op("ADC ($@%02X),Y",     1, F_NONE),              // 71
    UND,                                              // 72
    UND,                                              // 73
    UND,                                              // 74
    op("ADC $@%02X,X",       1, F_NONE),              // 75
    op("ROR $@%02X,X",       1, F_NONE),              // 76
    UND,                                              // 77
    op("SEI",                0, F_NONE),              // 78
    op("ADC $@%04X,Y",       2, F_NONE),              // 79
    UND,                                              // 7A
    UND,                                              // 7B
    UND,                                              // 7C
    op("ADC $@%04X,X",       2, F_NONE),              // 7D
    op("ROR $@%04X,X",       2, F_NONE),              // 7E
    UND,                                              // 7F
    // 0x80-0x8F
    UND,                                              // 80
    op("STA ($@%02X,X)",     1, F_NONE),              // 81
    UND,                                              // 82
    UND,                                              // 83
    op("STY $@%02X",         1, F_NONE),              // 84
    op("STA $@%02X",         1, F_NONE),              // 85
    op("STX $@%02X",         1, F_NONE),              // 86
    UND,                                              // 87
    op("DEY",                0, F_NONE),              // 88
    UND,                                              // 89
    op("TXA",                0, F_NONE),              // 8A
    UND,                                              // 8B
    op("STY $@%04X",         2, F_NONE),              // 8C
    op("STA $@%04X",         2, F_NONE),              // 8D
    op("STX $@%04X",         2, F_NONE),              // 8E
    UND,                                              // 8F
    // 0x90-0x9F
    op("BCC $@%04X",         1, F_REL_TARGET),        // 90
    op("STA ($@%02X),Y",     1, F_NONE),              // 91
    UND,                                              // 92
    UND,                                              // 93
    op("STY $@%02X,X",       1, F_NONE),              // 94
    op("STA $@%02X,X",       1, F_NONE),              // 95
    op("STX $@%02X,Y",       1, F_NONE),              // 96
    UND,                                              // 97
    op("TYA",                0, F_NONE),              // 98
    op("STA $@%04X,Y",       2, F_NONE),              // 99
    op("TXS",                0, F_NONE),              // 9A
    UND,                                              // 9B
    UND,                                              // 9C
    op("STA $@%04X,X",       2, F_NONE),              // 9D
    UND,                                              // 9E
    UND,                                              // 9F
    // 0xA0-0xAF
    op("LDY #$%02X",         1, F_NONE),              // A0
    op("LDA ($@%02X,X)",     1, F_NONE),              // A1
    op("LDX #$%02X",         1, F_NONE),              // A2
    UND,                                              // A3
    op("LDY $@%02X",         1, F_NONE),              // A4
    op("LDA $@%02X",         1, F_NONE),              // A5
    op("LDX $@%02X",         1, F_NONE),              // A6
    UND,                                              // A7
    op("TAY",                0, F_NONE),              // A8
    op("LDA #$%02X",         1, F_NONE),              // A9
    op("TAX",                0, F_NONE),              // AA
    UND,                                              // AB
    op("LDY $@%04X",         2, F_NONE),              // AC
    op("LDA $@%04X",         2, F_NONE),              // AD
    op("LDX $@%04X",         2, F_NONE),              // AE
    UND,                                              // AF
    // 0xB0-0xBF
    op("BCS $@%04X",         1, F_REL_TARGET),        // B0
    op("LDA ($@%02X),Y",     1, F_NONE),              // B1
    UND,                                              // B2
    UND,                                              // B3
    op("LDY $@%02X,X",       1, F_NONE),              // B4
    op("LDA $@%02X,X",       1, F_NONE),              // B5
    op("LDX $@%02X,Y",       1, F_NONE),              // B6
    UND,                                              // B7
    op("CLV",                0, F_NONE),              // B8
    op("LDA $@%04X,Y",       2, F_NONE),              // B9
    op("TSX",                0, F_NONE),              // BA
    UND,                                              // BB
    op("LDY $@%04X,X",       2, F_NONE),              // BC
    op("LDA $@%04X,X",       2, F_NONE),              // BD
    op("LDX $@%04X,Y",       2, F_NONE),              // BE
    UND,                                              // BF
    // 0xC0-0xCF
    op("CPY #$%02X",         1, F_NONE),              // C0
    op("CMP ($@%02X,X)",     1, F_NONE),              // C1
    UND,                                              // C2
    UND,                                              // C3
    op("CPY $@%02X",         1, F_NONE),              // C4
    op("CMP $@%02X",         1, F_NONE),              // C5
    op("DEC $@%02X",         1, F_NONE),              // C6
    UND,                                              // C7
    op("INY",                0, F_NONE),              // C8
    op("CMP #$%02X",         1, F_NONE),              // C9
    op("DEX",                0, F_NONE),              // CA
    UND,                                              // CB
    op("CPY $@%04X",         2, F_NONE),              // CC
    op("CMP $@%04X",         2, F_NONE),              // CD
    op("DEC $@%04X",         2, F_NONE),              // CE
    UND,                                              // CF
    // 0xD0-0xDF
    op("BNE $@%04X",         1, F_REL_TARGET),        // D0
    op("CMP ($@%02X),Y",     1, F_NONE),              // D1
    UND,                                              // D2
    UND,                                              // D3
    UND,                                              // D4
    op("CMP $@%02X,X",       1, F_NONE),              // D5
    op("DEC $@%02X,X",       1, F_NONE),              // D6
    UND,                                              // D7
    op("CLD",                0, F_NONE),              // D8
    op("CMP $@%04X,Y",       2, F_NONE),              // D9
    UND,                                              // DA
    UND,                                              // DB
    UND,                                              // DC
    op("CMP $@%04X,X",       2, F_NONE),              // DD
    op("DEC $@%04X,X",       2, F_NONE),              // DE
    UND,                                              // DF
    // 0xE0-0xEF
    op("CPX #$%02X",         1, F_NONE),              // E0
    op("SBC ($@%02X,X)",     1, F_NONE),              // E1
    UND,                                              // E2
    UND,                                              // E3
    op("CPX $@%02X",         1, F_NONE),              // E4
    op("SBC $@%02X",         1, F_NONE),              // E5
    op("INC $@%02X",         1, F_NONE),              // E6
    UND,                                              // E7
    op("INX",                0, F_NONE),              // E8
    op("SBC #$%02X",         1, F_NONE),              // E9
    op("NOP",                0, F_NONE),              // EA
    UND,                                              // EB
    op("CPX $@%04X",         2, F_NONE),              // EC
    op("SBC $@%04X",         2, F_NONE),              // ED
    op("INC $@%04X",         2, F_NONE),              // EE
    UND,                                              // EF
    // 0xF0-0xFF
    op("BEQ $@%04X",         1, F_REL_TARGET),        // F0
    op("SBC ($@%02X),Y",     1, F_NONE),              // F1
    UND,                                              // F2
    UND,                                              // F3
    UND,                                              // F4
    op("SBC $@%02X,X",       1, F_NONE),              // F5
    op("INC $@%02X,X",       1, F_NONE),              // F6
    UND,                                              // F7
    op("SED",                0, F_NONE),              // F8
    op("SBC $@%04X,Y",       2, F_NONE),              // F9
    UND,                                              // FA
    UND,                                              // FB
    UND,                                              // FC
    op("SBC $@%04X,X",       2, F_NONE),              // FD
    op("INC $@%04X,X",       2, F_NONE),              // FE
    UND,                                              // FF
];

fn db_byte(addr: u64, opcode: u8) -> Instruction {
    Instruction {
        address: addr,
        length: 1,
        text: format!("DB ${opcode:02X}"),
        breaks_flow: false,
        target: None,
        is_error: true,
    }
}

pub(crate) fn disassemble(data: &[u8], base_addr: u64) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let addr = base_addr + pos as u64;
        let opcode = data[pos];

        let entry = &OPS[usize::from(opcode)];
        let Some(fmt) = entry.fmt else {
            out.push(db_byte(addr, opcode));
            pos += 1;
            continue;
        };

        let total = 1 + usize::from(entry.imm_bytes);
        if pos + total > data.len() {
            out.push(db_byte(addr, opcode));
            break;
        }

        let imm: u16 = match entry.imm_bytes {
            1 => u16::from(data[pos + 1]),
            2 => u16::from(data[pos + 1]) | (u16::from(data[pos + 2]) << 8),
            _ => 0,
        };

        let breaks_flow = entry.flags & F_BREAKS != 0;
        let mut target = None;
        let text;

        if entry.flags & F_REL_TARGET != 0 {
            // Relative branch: target = addr + 2 + signed offset.
            let offset = (imm & 0xFF) as u8 as i8;
            let dest = (addr as i64 + 2 + i64::from(offset)) as u64 & 0xFFFF;
            text = render(fmt, dest as u32);
            target = Some(dest);
        } else if entry.flags & F_TARGET != 0 {
            text = render(fmt, u32::from(imm));
            target = Some(u64::from(imm));
        } else {
            text = render(fmt, u32::from(imm));
        }

        out.push(Instruction {
            address: addr,
            length: total as u8,
            text,
            breaks_flow,
            target,
            is_error: false,
        });
        pos += total;
    }

    out
}

static P_FLAGS: [RegFlag; 8] = [
    RegFlag { bit: 7, name: Some("N") },
    RegFlag { bit: 6, name: Some("V") },
    RegFlag { bit: 5, name: None },
    RegFlag { bit: 4, name: Some("B") },
    RegFlag { bit: 3, name: Some("D") },
    RegFlag { bit: 2, name: Some("I") },
    RegFlag { bit: 1, name: Some("Z") },
    RegFlag { bit: 0, name: Some("C") },
];

pub(crate) static REG_LAYOUT: &[RegLayoutEntry] = &[
    RegLayoutEntry::Hex { label: "A", reg: reg::A, bits: 8 },
    RegLayoutEntry::Hex { label: "X", reg: reg::X, bits: 8 },
    RegLayoutEntry::Hex { label: "Y", reg: reg::Y, bits: 8 },
    RegLayoutEntry::Hex { label: "S", reg: reg::S, bits: 8 },
    RegLayoutEntry::Hex { label: "PC", reg: reg::PC, bits: 16 },
    RegLayoutEntry::Flags { reg: reg::P, flags: &P_FLAGS },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jmp_absolute_has_target() {
        let insns = disassemble(&[0x4C, 0x00, 0x80], 0xC000);
        assert_eq!(insns[0].text, "JMP $@8000");
        assert!(insns[0].breaks_flow);
        assert_eq!(insns[0].target, Some(0x8000));
    }

    #[test]
    fn branch_target_is_relative() {
        // BEQ +4 at 0xC000: target = 0xC000 + 2 + 4.
        let insns = disassemble(&[0xF0, 0x04], 0xC000);
        assert_eq!(insns[0].text, "BEQ $@C006");
        assert_eq!(insns[0].target, Some(0xC006));
        assert!(!insns[0].breaks_flow);
    }

    #[test]
    fn jsr_and_rts() {
        let insns = disassemble(&[0x20, 0x34, 0x12, 0x60], 0);
        assert_eq!(insns[0].text, "JSR $@1234");
        assert!(!insns[0].breaks_flow);
        assert_eq!(insns[1].text, "RTS");
        assert!(insns[1].breaks_flow);
    }

    #[test]
    fn undocumented_opcode_is_error() {
        let insns = disassemble(&[0x02], 0);
        assert!(insns[0].is_error);
        assert_eq!(insns[0].text, "DB $02");
    }

    #[test]
    fn indirect_jmp_has_no_target() {
        let insns = disassemble(&[0x6C, 0xFE, 0xFF], 0);
        assert_eq!(insns[0].text, "JMP ($@FFFE)");
        assert!(insns[0].breaks_flow);
        assert_eq!(insns[0].target, None);
    }
}
