//! Sharp LR35902 (Game Boy CPU) architecture data.
//!
//! Table-driven disassembler: 256-entry base opcode table with format
//! strings. CB-prefix opcodes are computed from their regular bit patterns
//! instead of a second table.

use arret_abi::lr35902 as reg;

use crate::fmt::render;
use crate::table::{F_BREAKS, F_NONE, F_REL_TARGET, F_TARGET, OpEntry, UND, op};
use crate::{Instruction, RegFlag, RegLayoutEntry, TraceReg};

#[rustfmt::skip]
static BASE_OPS: [OpEntry; 256] = [
    // 0x00-0x0F
    op("NOP",             0, F_NONE),                 // 00
    op("LD BC,$%04X",     2, F_NONE),                 // 01
    op("LD (BC),A",       0, F_NONE),                 // 02
    op("INC BC",          0, F_NONE),                 // 03
    op("INC B",           0, F_NONE),                 // 04
    op("DEC B",           0, F_NONE),                 // 05
    op("LD B,$%02X",      1, F_NONE),                 // 06
    op("RLCA",            0, F_NONE),                 // 07
    op("LD ($@%04X),SP",  2, F_NONE),                 // 08
    op("ADD HL,BC",       0, F_NONE),                 // 09
    op("LD A,(BC)",       0, F_NONE),                 // 0A
    op("DEC BC",          0, F_NONE),                 // 0B
    op("INC C",           0, F_NONE),                 // 0C
    op("DEC C",           0, F_NONE),                 // 0D
    op("LD C,$%02X",      1, F_NONE),                 // 0E
    op("RRCA",            0, F_NONE),                 // 0F
    // 0x10-0x1F
    op("STOP",            1, F_NONE),                 // 10
    op("LD DE,$%04X",     2, F_NONE),                 // 11
    op("LD (DE),A",       0, F_NONE),                 // 12
    op("INC DE",          0, F_NONE),                 // 13
    op("INC D",           0, F_NONE),                 // 14
    op("DEC D",           0, F_NONE),                 // 15
    op("LD D,$%02X",      1, F_NONE),                 // 16
    op("RLA",             0, F_NONE),                 // 17
    op("JR $@%04X",       1, F_BREAKS | F_REL_TARGET), // 18
    op("ADD HL,DE",       0, F_NONE),                 // 19
    op("LD A,(DE)",       0, F_NONE),                 // 1A
    op("DEC DE",          0, F_NONE),                 // 1B
    op("INC E",           0, F_NONE),                 // 1C
    op("DEC E",           0, F_NONE),                 // 1D
    op("LD E,$%02X",      1, F_NONE),                 // 1E
    op("RRA",             0, F_NONE),                 // 1F
    // 0x20-0x2F
    op("JR NZ,$@%04X",    1, F_REL_TARGET),           // 20
    op("LD HL,$%04X",     2, F_NONE),                 // 21
    op("LD (HL+),A",      0, F_NONE),                 // 22
    op("INC HL",          0, F_NONE),                 // 23
    op("INC H",           0, F_NONE),                 // 24
    op("DEC H",           0, F_NONE),                 // 25
    op("LD H,$%02X",      1, F_NONE),                 // 26
    op("DAA",             0, F_NONE),                 // 27
    op("JR Z,$@%04X",     1, F_REL_TARGET),           // 28
    op("ADD HL,HL",       0, F_NONE),                 // 29
    op("LD A,(HL+)",      0, F_NONE),                 // 2A
    op("DEC HL",          0, F_NONE),                 // 2B
    op("INC L",           0, F_NONE),                 // 2C
    op("DEC L",           0, F_NONE),                 // 2D
    op("LD L,$%02X",      1, F_NONE),                 // 2E
    op("CPL",             0, F_NONE),                 // 2F
    // 0x30-0x3F
    op("JR NC,$@%04X",    1, F_REL_TARGET),           // 30
    op("LD SP,$%04X",     2, F_NONE),                 // 31
    op("LD (HL-),A",      0, F_NONE),                 // 32
    op("INC SP",          0, F_NONE),                 // 33
    op("INC (HL)",        0, F_NONE),                 // 34
    op("DEC (HL)",        0, F_NONE),                 // 35
    op("LD (HL),$%02X",   1, F_NONE),                 // 36
    op("SCF",             0, F_NONE),                 // 37
    op("JR C,$@%04X",     1, F_REL_TARGET),           // 38
    op("ADD HL,SP",       0, F_NONE),                 // 39
    op("LD A,(HL-)",      0, F_NONE),                 // 3A
    op("DEC SP",          0, F_NONE),                 // 3B
    op("INC A",           0, F_NONE),                 // 3C
    op("DEC A",           0, F_NONE),                 // 3D
    op("LD A,$%02X",      1, F_NONE),                 // 3E
    op("CCF",             0, F_NONE),                 // 3F
    // 0x40-0x4F
    op("LD B,B",          0, F_NONE),                 // 40
    op("LD B,C",          0, F_NONE),                 // 41
    op("LD B,D",          0, F_NONE),                 // 42
    op("LD B,E",          0, F_NONE),                 // 43
    op("LD B,H",          0, F_NONE),                 // 44
    op("LD B,L",          0, F_NONE),                 // 45
    op("LD B,(HL)",       0, F_NONE),                 // 46
    op("LD B,A",          0, F_NONE),                 // 47
    op("LD C,B",          0, F_NONE),                 // 48
    op("LD C,C",          0, F_NONE),                 // 49
    op("LD C,D",          0, F_NONE),                 // 4A
    op("LD C,E",          0, F_NONE),                 // 4B
    op("LD C,H",          0, F_NONE),                 // 4C
    op("LD C,L",          0, F_NONE),                 // 4D
    op("LD C,(HL)",       0, F_NONE),                 // 4E
    op("LD C,A",          0, F_NONE),                 // 4F
    // 0x50-0x5F
    op("LD D,B",          0, F_NONE),                 // 50
    op("LD D,C",          0, F_NONE),                 // 51
    op("LD D,D",          0, F_NONE),                 // 52
    op("LD D,E",          0, F_NONE),                 // 53
    op("LD D,H",          0, F_NONE),                 // 54
    op("LD D,L",          0, F_NONE),                 // 55
    op("LD D,(HL)",       0, F_NONE),                 // 56
    op("LD D,A",          0, F_NONE),                 // 57
    op("LD E,B",          0, F_NONE),                 // 58
    op("LD E,C",          0, F_NONE),                 // 59
    op("LD E,D",          0, F_NONE),                 // 5A
    op("LD E,E",          0, F_NONE),                 // 5B
    op("LD E,H",          0, F_NONE),                 // 5C
    op("LD E,L",          0, F_NONE),                 // 5D
    op("LD E,(HL)",       0, F_NONE),                 // 5E
    op("LD E,A",          0, F_NONE),                 // 5F
    // 0x60-0x6F
    op("LD H,B",          0, F_NONE),                 // 60
    op("LD H,C",          0, F_NONE),                 // 61
    op("LD H,D",          0, F_NONE),                 // 62
    op("LD H,E",          0, F_NONE),                 // 63
    op("LD H,H",          0, F_NONE),                 // 64
    op("LD H,L",          0, F_NONE),                 // 65
    op("LD H,(HL)",       0, F_NONE),                 // 66
    op("LD H,A",          0, F_NONE),                 // 67
    op("LD L,B",          0, F_NONE),                 // 68
    op("LD L,C",          0, F_NONE),                 // 69
    op("LD L,D",          0, F_NONE),                 // 6A
    op("LD L,E",          0, F_NONE),                 // 6B
    op("LD L,H",          0, F_NONE),                 // 6C
    op("LD L,L",          0, F_NONE),                 // 6D
    op("LD L,(HL)",       0, F_NONE),                 // 6E
    op("LD L,A",          0, F_NONE),                 // 6F
    // 0x70-0x7F
    op("LD (HL),B",       0, F_NONE),                 // 70
    op("LD (HL),C",       0, F_NONE),                 // 71
    op("LD (HL),D",       0, F_NONE),                 // 72
    op("LD (HL),E",       0, F_NONE),                 // 73
    op("LD (HL),H",       0, F_NONE),                 // 74
    op("LD (HL),L",       0, F_NONE),                 // 75
    op("HALT",            0, F_NONE),                 // 76
    op("LD (HL),A",       0, F_NONE),                 // 77
    op("LD A,B",          0, F_NONE),                 // 78
    op("LD A,C",          0, F_NONE),                 // 79
    op("LD A,D",          0, F_NONE),                 // 7A
    op("LD A,E",          0, F_NONE),                 // 7B
    op("LD A,H",          0, F_NONE),                 // 7C
    op("LD A,L",          0, F_NONE),                 // 7D
    op("LD A,(HL)",       0, F_NONE),                 // 7E
    op("LD A,A",          0, F_NONE),                 // 7F
    // 0x80-0x8F
    op("ADD A,B",         0, F_NONE),                 // 80
    op("ADD A,C",         0, F_NONE),                 // 81
    op("ADD A,D",         0, F_NONE),                 // 82
    op("ADD A,E",         0, F_NONE),                 // 83
    op("ADD A,H",         0, F_NONE),                 // 84
    op("ADD A,L",         0, F_NONE),                 // 85
    op("ADD A,(HL)",      0, F_NONE),                 // 86
    op("ADD A,A",         0, F_NONE),                 // 87
    op("ADC A,B",         0, F_NONE),                 // 88
    op("ADC A,C",         0, F_NONE),                 // 89
    op("ADC A,D",         0, F_NONE),                 // 8A
    op("ADC A,E",         0, F_NONE),                 // 8B
    op("ADC A,H",         0, F_NONE),                 // 8C
    op("ADC A,L",         0, F_NONE),                 // 8D
    op("ADC A,(HL)",      0, F_NONE),                 // 8E
    op("ADC A,A",         0, F_NONE),                 // 8F
    // 0x90-0x9F
    op("SUB B",           0, F_NONE),                 // 90
    op("SUB C",           0, F_NONE),                 // 91
    op("SUB D",           0, F_NONE),                 // 92
    op("SUB E",           0, F_NONE),                 // 93
    op("SUB H",           0, F_NONE),                 // 94
    op("SUB L",           0, F_NONE),                 // 95
    op("SUB (HL)",        0, F_NONE),                 // 96
    op("SUB A",           0, F_NONE),                 // 97
    op("SBC A,B",         0, F_NONE),                 // 98
    op("SBC A,C",         0, F_NONE),                 // 99
    op("SBC A,D",         0, F_NONE),                 // 9A
    op("SBC A,E",         0, F_NONE),                 // 9B
    op("SBC A,H",         0, F_NONE),                 // 9C
    op("SBC A,L",         0, F_NONE),                 // 9D
    op("SBC A,(HL)",      0, F_NONE),                 // 9E
    op("SBC A,A",         0, F_NONE),                 // 9F
    // 0xA0-0xAF
    op("AND B",           0, F_NONE),                 // A0
    op("AND C",           0, F_NONE),                 // A1
    op("AND D",           0, F_NONE),                 // A2
    op("AND E",           0, F_NONE),                 // A3
    op("AND H",           0, F_NONE),                 // A4
    op("AND L",           0, F_NONE),                 // A5
    op("AND (HL)",        0, F_NONE),                 // A6
    op("AND A",           0, F_NONE),                 // A7
    op("XOR B",           0, F_NONE),                 // A8
    op("XOR C",           0, F_NONE),                 // A9
    op("XOR D",           0, F_NONE),                 // AA
    op("XOR E",           0, F_NONE),                 // AB
    op("XOR H",           0, F_NONE),                 // AC
    op("XOR L",           0, F_NONE),                 // AD
    op("XOR (HL)",        0, F_NONE),                 // AE
    op("XOR A",           0, F_NONE),                 // AF
    // 0xB0-0xBF
    op("OR B",            0, F_NONE),                 // B0
    op("OR C",            0, F_NONE),                 // B1
    op("OR D",            0, F_NONE),                 // B2
    op("OR E",            0, F_NONE),                 // B3
    op("OR H",            0, F_NONE),                 // B4
    op("OR L",            0, F_NONE),                 // B5
    op("OR (HL)",         0, F_NONE),                 // B6
    op("OR A",            0, F_NONE),                 // B7
    op("CP B",            0, F_NONE),                 // B8
    op("CP C",            0, F_NONE),                 // B9
    op("CP D",            0, F_NONE),                 // BA
    op("CP E",            0, F_NONE),                 // BB
    op("CP H",            0, F_NONE),                 // BC
    op("CP L",            0, F_NONE),                 // BD
    op("CP (HL)",         0, F_NONE),                 // BE
    op("CP A",            0, F_NONE),                 // BF
    // 0xC0-0xCF
    op("RET NZ",          0, F_NONE),                 // C0
    op("POP BC",          0, F_NONE),                 // C1
    op("JP NZ,$@%04X",    2, F_TARGET),               // C2
    op("JP $@%04X",       2, F_BREAKS | F_TARGET),    // C3
    op("CALL NZ,$@%04X",  2, F_NONE),                 // C4
    op("PUSH BC",         0, F_NONE),                 // C5
    op("ADD A,$%02X",     1, F_NONE),                 // C6
    op("RST $00",         0, F_NONE),                 // C7
    op("RET Z",           0, F_NONE),                 // C8
    op("RET",             0, F_BREAKS),               // C9
    op("JP Z,$@%04X",     2, F_TARGET),               // CA
    UND,                                              // CB (prefix, handled separately)
    op("CALL Z,$@%04X",   2, F_NONE),                 // CC
    op("CALL $@%04X",     2, F_NONE),                 // CD
    op("ADC A,$%02X",     1, F_NONE),                 // CE
    op("RST $08",         0, F_NONE),                 // CF
    // 0xD0-0xDF
    op("RET NC",          0, F_NONE),                 // D0
    op("POP DE",          0, F_NONE),                 // D1
    op("JP NC,$@%04X",    2, F_TARGET),               // D2
    UND,                                              // D3
    op("CALL NC,$@%04X",  2, F_NONE),                 // D4
    op("PUSH DE",         0, F_NONE),                 // D5
    op("SUB $%02X",       1, F_NONE),                 // D6
    op("RST $10",         0, F_NONE),                 // D7
    op("RET C",           0, F_NONE),                 // D8
    op("RETI",            0, F_BREAKS),               // D9
    op("JP C,$@%04X",     2, F_TARGET),               // DA
    UND,                                              // DB
    op("CALL C,$@%04X",   2, F_NONE),                 // DC
    UND,                                              // DD
    op("SBC A,$%02X",     1, F_NONE),                 // DE
    op("RST $18",         0, F_NONE),                 // DF
    // 0xE0-0xEF
    op("LDH ($@FF%02X),A", 1, F_NONE),                // E0
    op("POP HL",          0, F_NONE),                 // E1
    op("LD ($FF00+C),A",  0, F_NONE),                 // E2
    UND,                                              // E3
    UND,                                              // E4
    op("PUSH HL",         0, F_NONE),                 // E5
    op("AND $%02X",       1, F_NONE),                 // E6
    op("RST $20",         0, F_NONE),                 // E7
    op("ADD SP,$%02X",    1, F_NONE),                 // E8
    op("JP HL",           0, F_BREAKS),               // E9
    op("LD ($@%04X),A",   2, F_NONE),                 // EA
    UND,                                              // EB
    UND,                                              // EC
    UND,                                              // ED
    op("XOR $%02X",       1, F_NONE),                 // EE
    op("RST $28",         0, F_NONE),                 // EF
    // 0xF0-0xFF
    op("LDH A,($@FF%02X)", 1, F_NONE),                // F0
    op("POP AF",          0, F_NONE),                 // F1
    op("LD A,($FF00+C)",  0, F_NONE),                 // F2
    op("DI",              0, F_NONE),                 // F3
    UND,                                              // F4
    op("PUSH AF",         0, F_NONE),                 // F5
    op("OR $%02X",        1, F_NONE),                 // F6
    op("RST $30",         0, F_NONE),                 // F7
    op("LD HL,SP+$%02X",  1, F_NONE),                 // F8
    op("LD SP,HL",        0, F_NONE),                 // F9
    op("LD A,($@%04X)",   2, F_NONE),                 // FA
    op("EI",              0, F_NONE),                 // FB
    UND,                                              // FC
    UND,                                              // FD
    op("CP $%02X",        1, F_NONE),                 // FE
    op("RST $38",         0, F_NONE),                 // FF
];

// CB-prefix register names, indexed by the low 3 bits.
static CB_REGS: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];

// CB-prefix operation names for 0x00-0x3F, indexed by bits 5-3.
static CB_OPS: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SWAP", "SRL"];

// CB-prefix group names for 0x40-0xFF, indexed by bits 7-6.
static CB_GROUPS: [&str; 4] = ["", "BIT", "RES", "SET"];

fn decode_cb(opcode: u8, addr: u64) -> Instruction {
    let group = usize::from(opcode >> 6);
    let operand = CB_REGS[usize::from(opcode & 7)];

    let text = if group == 0 {
        let which = usize::from((opcode >> 3) & 7);
        format!("{} {}", CB_OPS[which], operand)
    } else {
        let bit = (opcode >> 3) & 7;
        format!("{} {},{}", CB_GROUPS[group], bit, operand)
    };

    Instruction {
        address: addr,
        length: 2,
        text,
        breaks_flow: false,
        target: None,
        is_error: false,
    }
}

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

        if opcode == 0xCB {
            if pos + 1 >= data.len() {
                // Truncated CB prefix.
                out.push(db_byte(addr, opcode));
                break;
            }
            out.push(decode_cb(data[pos + 1], addr));
            pos += 2;
            continue;
        }

        let entry = &BASE_OPS[usize::from(opcode)];
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
            // Relative jump: target = addr + 2 + signed offset.
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

static NAMED_FLAGS: [RegFlag; 4] = [
    RegFlag { bit: 7, name: Some("Z") },
    RegFlag { bit: 6, name: Some("N") },
    RegFlag { bit: 5, name: Some("H") },
    RegFlag { bit: 4, name: Some("C") },
];

static UNNAMED_FLAGS: [RegFlag; 4] = [
    RegFlag { bit: 3, name: None },
    RegFlag { bit: 2, name: None },
    RegFlag { bit: 1, name: None },
    RegFlag { bit: 0, name: None },
];

static IME_FLAG: [RegFlag; 1] = [RegFlag {
    bit: 0,
    name: Some("IME"),
}];

pub(crate) static REG_LAYOUT: &[RegLayoutEntry] = &[
    RegLayoutEntry::Hex { label: "A", reg: reg::A, bits: 8 },
    RegLayoutEntry::Hex { label: "BC", reg: reg::BC, bits: 16 },
    RegLayoutEntry::Hex { label: "DE", reg: reg::DE, bits: 16 },
    RegLayoutEntry::Hex { label: "HL", reg: reg::HL, bits: 16 },
    RegLayoutEntry::Hex { label: "SP", reg: reg::SP, bits: 16 },
    RegLayoutEntry::Hex { label: "PC", reg: reg::PC, bits: 16 },
    RegLayoutEntry::Flags { reg: reg::F, flags: &NAMED_FLAGS },
    RegLayoutEntry::Flags { reg: reg::F, flags: &UNNAMED_FLAGS },
    RegLayoutEntry::Flags { reg: reg::IME, flags: &IME_FLAG },
];

pub(crate) static TRACE_REGS: &[TraceReg] = &[
    TraceReg { reg: reg::AF, name: "AF", bits: 16 },
    TraceReg { reg: reg::BC, name: "BC", bits: 16 },
    TraceReg { reg: reg::DE, name: "DE", bits: 16 },
    TraceReg { reg: reg::HL, name: "HL", bits: 16 },
    TraceReg { reg: reg::SP, name: "SP", bits: 16 },
    TraceReg { reg: reg::PC, name: "PC", bits: 16 },
    TraceReg { reg: reg::IME, name: "IME", bits: 8 },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jp_absolute() {
        let insns = disassemble(&[0xC3, 0x50, 0x01], 0x0100);
        assert_eq!(insns.len(), 1);
        let i = &insns[0];
        assert_eq!(i.address, 0x0100);
        assert_eq!(i.length, 3);
        assert_eq!(i.text, "JP $@0150");
        assert!(i.breaks_flow);
        assert_eq!(i.target, Some(0x0150));
        assert!(!i.is_error);
    }

    #[test]
    fn jr_backward_to_self() {
        let insns = disassemble(&[0x18, 0xFE], 0x0150);
        assert_eq!(insns.len(), 1);
        let i = &insns[0];
        assert_eq!(i.length, 2);
        assert_eq!(i.text, "JR $@0150");
        assert!(i.breaks_flow);
        assert_eq!(i.target, Some(0x0150));
    }

    #[test]
    fn jr_target_wraps_to_16_bits() {
        // JR -4 at address 1 lands below zero and wraps.
        let insns = disassemble(&[0x18, 0xFB], 0x0001);
        assert_eq!(insns[0].target, Some(0xFFFE));
    }

    #[test]
    fn cb_prefix_decodes_from_bit_patterns() {
        let insns = disassemble(&[0xCB, 0x37, 0xCB, 0x7E, 0xCB, 0xC1], 0);
        assert_eq!(insns[0].text, "SWAP A");
        assert_eq!(insns[1].text, "BIT 7,(HL)");
        assert_eq!(insns[2].text, "SET 0,C");
        assert!(insns.iter().all(|i| i.length == 2 && !i.is_error));
    }

    #[test]
    fn undefined_opcode_is_db() {
        let insns = disassemble(&[0xD3], 0x4000);
        assert_eq!(insns[0].text, "DB $D3");
        assert!(insns[0].is_error);
        assert_eq!(insns[0].length, 1);
    }

    #[test]
    fn truncated_immediate_is_db() {
        let insns = disassemble(&[0x01, 0x34], 0);
        assert_eq!(insns.len(), 1);
        assert_eq!(insns[0].text, "DB $01");
        assert!(insns[0].is_error);
    }

    #[test]
    fn truncated_cb_prefix_is_db() {
        let insns = disassemble(&[0xCB], 0);
        assert_eq!(insns[0].text, "DB $CB");
        assert!(insns[0].is_error);
    }

    #[test]
    fn ldh_keeps_ff_page_marker() {
        let insns = disassemble(&[0xE0, 0x44], 0);
        assert_eq!(insns[0].text, "LDH ($@FF44),A");
    }

    #[test]
    fn listing_is_contiguous() {
        let bytes = [0x00, 0x3E, 0x12, 0x21, 0x00, 0xC0, 0xC9];
        let insns = disassemble(&bytes, 0x0200);
        let mut expect = 0x0200u64;
        for insn in &insns {
            assert_eq!(insn.address, expect);
            expect += u64::from(insn.length);
        }
        assert_eq!(expect, 0x0200 + bytes.len() as u64);
    }
}
