//! CPU-agnostic register name ↔ index mapping.
//!
//! Each CPU's registers are declared once in an ordered table; lookups by
//! name are case-insensitive. Digit counts drive hex formatting in trace
//! lines and the `reg` command.

use arret_abi::{CpuType, lr35902, m65816, mos6502, r3000a, z80};

struct RegEntry {
    index: u32,
    name: &'static str,
    digits: usize,
}

const fn e(index: u32, name: &'static str, digits: usize) -> RegEntry {
    RegEntry {
        index,
        name,
        digits,
    }
}

#[rustfmt::skip]
static LR35902_REGS: &[RegEntry] = &[
    e(lr35902::A, "a", 2),   e(lr35902::F, "f", 2),
    e(lr35902::B, "b", 2),   e(lr35902::C, "c", 2),
    e(lr35902::D, "d", 2),   e(lr35902::E, "e", 2),
    e(lr35902::H, "h", 2),   e(lr35902::L, "l", 2),
    e(lr35902::SP, "sp", 4), e(lr35902::PC, "pc", 4),
    e(lr35902::AF, "af", 4), e(lr35902::BC, "bc", 4),
    e(lr35902::DE, "de", 4), e(lr35902::HL, "hl", 4),
    e(lr35902::IME, "ime", 2),
];

#[rustfmt::skip]
static Z80_REGS: &[RegEntry] = &[
    e(z80::A, "a", 2),     e(z80::F, "f", 2),
    e(z80::BC, "bc", 4),   e(z80::DE, "de", 4),   e(z80::HL, "hl", 4),
    e(z80::IX, "ix", 4),   e(z80::IY, "iy", 4),
    e(z80::AF2, "af'", 4), e(z80::BC2, "bc'", 4),
    e(z80::DE2, "de'", 4), e(z80::HL2, "hl'", 4),
    e(z80::I, "i", 2),     e(z80::R, "r", 2),
    e(z80::SP, "sp", 4),   e(z80::PC, "pc", 4),
    e(z80::IFF, "iff", 2), e(z80::IM, "im", 2),   e(z80::WZ, "wz", 4),
];

#[rustfmt::skip]
static MOS6502_REGS: &[RegEntry] = &[
    e(mos6502::A, "a", 2), e(mos6502::X, "x", 2), e(mos6502::Y, "y", 2),
    e(mos6502::S, "s", 2), e(mos6502::PC, "pc", 4), e(mos6502::P, "p", 2),
];

#[rustfmt::skip]
static M65816_REGS: &[RegEntry] = &[
    e(m65816::A, "a", 4),   e(m65816::X, "x", 4),  e(m65816::Y, "y", 4),
    e(m65816::S, "s", 4),   e(m65816::PC, "pc", 4), e(m65816::P, "p", 2),
    e(m65816::DB, "db", 2), e(m65816::D, "d", 4),  e(m65816::PB, "pb", 2),
    e(m65816::EMU, "emu", 2),
];

#[rustfmt::skip]
static R3000A_REGS: &[RegEntry] = &[
    e(r3000a::R0, "r0", 8), e(r3000a::AT, "at", 8),
    e(r3000a::V0, "v0", 8), e(r3000a::V1, "v1", 8),
    e(r3000a::A0, "a0", 8), e(r3000a::A1, "a1", 8),
    e(r3000a::A2, "a2", 8), e(r3000a::A3, "a3", 8),
    e(r3000a::T0, "t0", 8), e(r3000a::T1, "t1", 8),
    e(r3000a::T2, "t2", 8), e(r3000a::T3, "t3", 8),
    e(r3000a::T4, "t4", 8), e(r3000a::T5, "t5", 8),
    e(r3000a::T6, "t6", 8), e(r3000a::T7, "t7", 8),
    e(r3000a::S0, "s0", 8), e(r3000a::S1, "s1", 8),
    e(r3000a::S2, "s2", 8), e(r3000a::S3, "s3", 8),
    e(r3000a::S4, "s4", 8), e(r3000a::S5, "s5", 8),
    e(r3000a::S6, "s6", 8), e(r3000a::S7, "s7", 8),
    e(r3000a::T8, "t8", 8), e(r3000a::T9, "t9", 8),
    e(r3000a::K0, "k0", 8), e(r3000a::K1, "k1", 8),
    e(r3000a::GP, "gp", 8), e(r3000a::SP, "sp", 8),
    e(r3000a::FP, "fp", 8), e(r3000a::RA, "ra", 8),
    e(r3000a::PC, "pc", 8), e(r3000a::LO, "lo", 8),
    e(r3000a::HI, "hi", 8),
];

fn table_for_cpu(cpu_type: CpuType) -> Option<&'static [RegEntry]> {
    match cpu_type {
        CpuType::LR35902 => Some(LR35902_REGS),
        CpuType::Z80 => Some(Z80_REGS),
        CpuType::MOS6502 => Some(MOS6502_REGS),
        CpuType::M65816 => Some(M65816_REGS),
        CpuType::R3000A => Some(R3000A_REGS),
        _ => None,
    }
}

pub fn reg_name(cpu_type: CpuType, reg_index: u32) -> Option<&'static str> {
    table_for_cpu(cpu_type)?
        .iter()
        .find(|e| e.index == reg_index)
        .map(|e| e.name)
}

pub fn reg_from_name(cpu_type: CpuType, name: &str) -> Option<u32> {
    table_for_cpu(cpu_type)?
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
        .map(|e| e.index)
}

/// Hex digit count for displaying the register.
pub fn reg_digits(cpu_type: CpuType, reg_index: u32) -> usize {
    table_for_cpu(cpu_type)
        .and_then(|t| t.iter().find(|e| e.index == reg_index))
        .map_or(2, |e| e.digits)
}

pub fn reg_count(cpu_type: CpuType) -> usize {
    table_for_cpu(cpu_type).map_or(0, <[RegEntry]>::len)
}

/// Register index at display position `n`, in declaration order.
pub fn reg_by_order(cpu_type: CpuType, n: usize) -> Option<u32> {
    table_for_cpu(cpu_type)?.get(n).map(|e| e.index)
}

pub fn pc_index(cpu_type: CpuType) -> Option<u32> {
    match cpu_type {
        CpuType::LR35902 => Some(lr35902::PC),
        CpuType::Z80 => Some(z80::PC),
        CpuType::MOS6502 => Some(mos6502::PC),
        CpuType::M65816 => Some(m65816::PC),
        CpuType::R3000A => Some(r3000a::PC),
        _ => None,
    }
}

pub fn sp_index(cpu_type: CpuType) -> Option<u32> {
    reg_from_name(cpu_type, "sp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_is_case_insensitive() {
        assert_eq!(reg_from_name(CpuType::LR35902, "HL"), Some(lr35902::HL));
        assert_eq!(reg_from_name(CpuType::R3000A, "Ra"), Some(r3000a::RA));
        assert_eq!(reg_from_name(CpuType::MOS6502, "q"), None);
    }

    #[test]
    fn pc_known_for_every_listed_cpu() {
        for cpu in [
            CpuType::LR35902,
            CpuType::Z80,
            CpuType::MOS6502,
            CpuType::M65816,
            CpuType::R3000A,
        ] {
            let pc = pc_index(cpu).unwrap();
            assert_eq!(reg_name(cpu, pc), Some("pc"));
        }
    }

    #[test]
    fn order_round_trips() {
        for n in 0..reg_count(CpuType::R3000A) {
            let idx = reg_by_order(CpuType::R3000A, n).unwrap();
            assert!(reg_name(CpuType::R3000A, idx).is_some());
        }
    }

    #[test]
    fn digits_match_width() {
        assert_eq!(reg_digits(CpuType::LR35902, lr35902::A), 2);
        assert_eq!(reg_digits(CpuType::LR35902, lr35902::PC), 4);
        assert_eq!(reg_digits(CpuType::R3000A, r3000a::SP), 8);
    }
}
