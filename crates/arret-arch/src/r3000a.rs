//! MIPS R3000A architecture data.
//!
//! Field-encoded disassembler covering MIPS I base instructions, COP0
//! (system control), and COP2/GTE (Geometry Transformation Engine) for
//! PlayStation. Canonical idioms are rendered as pseudo-ops (`NOP`, `MOVE`,
//! `B`, `LI`, `BEQZ`, `BNEZ`).

use arret_abi::r3000a as reg;

use crate::{Instruction, RegLayoutEntry, TraceReg};

static GPR_NAME: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", //
    "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", //
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", //
    "t8", "t9", "k0", "k1", "gp", "sp", "fp", "ra",
];

fn cop0_reg_name(r: u32) -> String {
    match r {
        3 => "BPC".into(),
        5 => "BDA".into(),
        7 => "DCIC".into(),
        8 => "BadVaddr".into(),
        9 => "BDAM".into(),
        11 => "BPCM".into(),
        12 => "Status".into(),
        13 => "Cause".into(),
        14 => "EPC".into(),
        15 => "PRId".into(),
        _ => format!("cop0r{r}"),
    }
}

struct GteCmd {
    funct: u8,
    name: &'static str,
}

#[rustfmt::skip]
static GTE_CMDS: [GteCmd; 22] = [
    GteCmd { funct: 0x01, name: "RTPS" },  GteCmd { funct: 0x06, name: "NCLIP" },
    GteCmd { funct: 0x0C, name: "OP" },    GteCmd { funct: 0x10, name: "DPCS" },
    GteCmd { funct: 0x11, name: "INTPL" }, GteCmd { funct: 0x12, name: "MVMVA" },
    GteCmd { funct: 0x13, name: "NCDS" },  GteCmd { funct: 0x14, name: "CDP" },
    GteCmd { funct: 0x16, name: "NCDT" },  GteCmd { funct: 0x1B, name: "NCCS" },
    GteCmd { funct: 0x1C, name: "CC" },    GteCmd { funct: 0x1E, name: "NCS" },
    GteCmd { funct: 0x20, name: "NCT" },   GteCmd { funct: 0x28, name: "SQR" },
    GteCmd { funct: 0x29, name: "DCPL" },  GteCmd { funct: 0x2A, name: "DPCT" },
    GteCmd { funct: 0x2D, name: "AVSZ3" }, GteCmd { funct: 0x2E, name: "AVSZ4" },
    GteCmd { funct: 0x30, name: "RTPT" },  GteCmd { funct: 0x3D, name: "GPF" },
    GteCmd { funct: 0x3E, name: "GPL" },   GteCmd { funct: 0x3F, name: "NCCT" },
];

fn gte_cmd_name(funct: u32) -> Option<&'static str> {
    GTE_CMDS
        .iter()
        .find(|c| u32::from(c.funct) == funct)
        .map(|c| c.name)
}

#[inline]
fn field_op(w: u32) -> u32 {
    (w >> 26) & 0x3F
}
#[inline]
fn field_rs(w: u32) -> usize {
    ((w >> 21) & 0x1F) as usize
}
#[inline]
fn field_rt(w: u32) -> usize {
    ((w >> 16) & 0x1F) as usize
}
#[inline]
fn field_rd(w: u32) -> usize {
    ((w >> 11) & 0x1F) as usize
}
#[inline]
fn field_shamt(w: u32) -> u32 {
    (w >> 6) & 0x1F
}
#[inline]
fn field_funct(w: u32) -> u32 {
    w & 0x3F
}
#[inline]
fn field_imm16(w: u32) -> u16 {
    w as u16
}
#[inline]
fn field_target(w: u32) -> u32 {
    w & 0x03FF_FFFF
}

fn branch_target(addr: u64, w: u32) -> u64 {
    let offset = i64::from(field_imm16(w) as i16) << 2;
    (addr as i64 + 4 + offset) as u64 & 0xFFFF_FFFF
}

fn insn(addr: u64, text: String, breaks_flow: bool, target: Option<u64>) -> Instruction {
    Instruction {
        address: addr,
        length: 4,
        text,
        breaks_flow,
        target,
        is_error: false,
    }
}

fn unknown(addr: u64, w: u32) -> Instruction {
    Instruction {
        address: addr,
        length: 4,
        text: format!("DW {w:08X}"),
        breaks_flow: false,
        target: None,
        is_error: true,
    }
}

fn decode_special(w: u32, addr: u64) -> Instruction {
    let rd = field_rd(w);
    let rs = field_rs(w);
    let rt = field_rt(w);
    let shamt = field_shamt(w);

    let (text, breaks) = match field_funct(w) {
        0x00 => {
            if rd == 0 && rt == 0 && shamt == 0 {
                ("NOP".to_string(), false)
            } else {
                (
                    format!("SLL {},{},{}", GPR_NAME[rd], GPR_NAME[rt], shamt),
                    false,
                )
            }
        }
        0x02 => (
            format!("SRL {},{},{}", GPR_NAME[rd], GPR_NAME[rt], shamt),
            false,
        ),
        0x03 => (
            format!("SRA {},{},{}", GPR_NAME[rd], GPR_NAME[rt], shamt),
            false,
        ),
        0x04 => (
            format!("SLLV {},{},{}", GPR_NAME[rd], GPR_NAME[rt], GPR_NAME[rs]),
            false,
        ),
        0x06 => (
            format!("SRLV {},{},{}", GPR_NAME[rd], GPR_NAME[rt], GPR_NAME[rs]),
            false,
        ),
        0x07 => (
            format!("SRAV {},{},{}", GPR_NAME[rd], GPR_NAME[rt], GPR_NAME[rs]),
            false,
        ),
        0x08 => (format!("JR {}", GPR_NAME[rs]), true),
        0x09 => {
            if rd == 31 {
                (format!("JALR {}", GPR_NAME[rs]), false)
            } else {
                (format!("JALR {},{}", GPR_NAME[rd], GPR_NAME[rs]), false)
            }
        }
        0x0C => ("SYSCALL".to_string(), true),
        0x0D => ("BREAK".to_string(), true),
        0x10 => (format!("MFHI {}", GPR_NAME[rd]), false),
        0x11 => (format!("MTHI {}", GPR_NAME[rs]), false),
        0x12 => (format!("MFLO {}", GPR_NAME[rd]), false),
        0x13 => (format!("MTLO {}", GPR_NAME[rs]), false),
        0x18 => (format!("MULT {},{}", GPR_NAME[rs], GPR_NAME[rt]), false),
        0x19 => (format!("MULTU {},{}", GPR_NAME[rs], GPR_NAME[rt]), false),
        0x1A => (format!("DIV {},{}", GPR_NAME[rs], GPR_NAME[rt]), false),
        0x1B => (format!("DIVU {},{}", GPR_NAME[rs], GPR_NAME[rt]), false),
        0x20 => (
            format!("ADD {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
            false,
        ),
        0x21 => {
            if rs == 0 {
                (format!("MOVE {},{}", GPR_NAME[rd], GPR_NAME[rt]), false)
            } else {
                (
                    format!("ADDU {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
                    false,
                )
            }
        }
        0x22 => (
            format!("SUB {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
            false,
        ),
        0x23 => (
            format!("SUBU {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
            false,
        ),
        0x24 => (
            format!("AND {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
            false,
        ),
        0x25 => {
            if rs == 0 {
                (format!("MOVE {},{}", GPR_NAME[rd], GPR_NAME[rt]), false)
            } else {
                (
                    format!("OR {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
                    false,
                )
            }
        }
        0x26 => (
            format!("XOR {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
            false,
        ),
        0x27 => (
            format!("NOR {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
            false,
        ),
        0x2A => (
            format!("SLT {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
            false,
        ),
        0x2B => (
            format!("SLTU {},{},{}", GPR_NAME[rd], GPR_NAME[rs], GPR_NAME[rt]),
            false,
        ),
        _ => return unknown(addr, w),
    };

    insn(addr, text, breaks, None)
}

fn decode_regimm(w: u32, addr: u64) -> Instruction {
    let rs = field_rs(w);
    let target = branch_target(addr, w);

    let text = match field_rt(w) {
        0x00 => format!("BLTZ {},$@{:08X}", GPR_NAME[rs], target as u32),
        0x01 => format!("BGEZ {},$@{:08X}", GPR_NAME[rs], target as u32),
        0x10 => format!("BLTZAL {},$@{:08X}", GPR_NAME[rs], target as u32),
        0x11 => format!("BGEZAL {},$@{:08X}", GPR_NAME[rs], target as u32),
        _ => return unknown(addr, w),
    };

    insn(addr, text, false, Some(target))
}

fn decode_cop0(w: u32, addr: u64) -> Instruction {
    let rt = field_rt(w);
    let rd = field_rd(w) as u32;

    let text = match field_rs(w) as u32 {
        0x00 => format!("MFC0 {},{}", GPR_NAME[rt], cop0_reg_name(rd)),
        0x02 => format!("CFC0 {},{}", GPR_NAME[rt], rd),
        0x04 => format!("MTC0 {},{}", GPR_NAME[rt], cop0_reg_name(rd)),
        0x06 => format!("CTC0 {},{}", GPR_NAME[rt], rd),
        0x08 => {
            let target = branch_target(addr, w);
            let text = match rt {
                0 => format!("BC0F $@{:08X}", target as u32),
                1 => format!("BC0T $@{:08X}", target as u32),
                _ => return unknown(addr, w),
            };
            return insn(addr, text, false, Some(target));
        }
        0x10 => {
            if field_funct(w) == 0x10 {
                "RFE".to_string()
            } else {
                return unknown(addr, w);
            }
        }
        _ => return unknown(addr, w),
    };

    insn(addr, text, false, None)
}

fn decode_cop2(w: u32, addr: u64) -> Instruction {
    let rt = field_rt(w);
    let rd = field_rd(w);

    // GTE command: bit 25 set, funct selects the operation.
    if w & (1 << 25) != 0 {
        let funct = field_funct(w);
        return match gte_cmd_name(funct) {
            Some(name) => insn(addr, name.to_string(), false, None),
            None => Instruction {
                address: addr,
                length: 4,
                text: format!("COP2 {:07X}", w & 0x1FF_FFFF),
                breaks_flow: false,
                target: None,
                is_error: true,
            },
        };
    }

    let text = match field_rs(w) as u32 {
        0x00 => format!("MFC2 {},{}", GPR_NAME[rt], rd),
        0x02 => format!("CFC2 {},{}", GPR_NAME[rt], rd),
        0x04 => format!("MTC2 {},{}", GPR_NAME[rt], rd),
        0x06 => format!("CTC2 {},{}", GPR_NAME[rt], rd),
        0x08 => {
            let target = branch_target(addr, w);
            let text = match rt {
                0 => format!("BC2F $@{:08X}", target as u32),
                1 => format!("BC2T $@{:08X}", target as u32),
                _ => return unknown(addr, w),
            };
            return insn(addr, text, false, Some(target));
        }
        _ => return unknown(addr, w),
    };

    insn(addr, text, false, None)
}

fn load_store(mnemonic: &str, w: u32) -> String {
    format!(
        "{} {},{}({})",
        mnemonic,
        GPR_NAME[field_rt(w)],
        field_imm16(w) as i16,
        GPR_NAME[field_rs(w)]
    )
}

pub(crate) fn disassemble(data: &[u8], base_addr: u64) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    while pos + 4 <= data.len() {
        let addr = base_addr + pos as u64;
        let w = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        pos += 4;

        let decoded = match field_op(w) {
            0x00 => decode_special(w, addr),
            0x01 => decode_regimm(w, addr),
            0x02 => {
                let target = (addr & 0xF000_0000) | (u64::from(field_target(w)) << 2);
                insn(
                    addr,
                    format!("J $@{:08X}", target as u32),
                    true,
                    Some(target),
                )
            }
            0x03 => {
                let target = (addr & 0xF000_0000) | (u64::from(field_target(w)) << 2);
                insn(
                    addr,
                    format!("JAL $@{:08X}", target as u32),
                    false,
                    Some(target),
                )
            }
            0x04 => {
                let target = branch_target(addr, w);
                let (rs, rt) = (field_rs(w), field_rt(w));
                let text = if rs == 0 && rt == 0 {
                    format!("B $@{:08X}", target as u32)
                } else if rt == 0 {
                    format!("BEQZ {},$@{:08X}", GPR_NAME[rs], target as u32)
                } else {
                    format!(
                        "BEQ {},{},$@{:08X}",
                        GPR_NAME[rs], GPR_NAME[rt], target as u32
                    )
                };
                insn(addr, text, false, Some(target))
            }
            0x05 => {
                let target = branch_target(addr, w);
                let (rs, rt) = (field_rs(w), field_rt(w));
                let text = if rt == 0 {
                    format!("BNEZ {},$@{:08X}", GPR_NAME[rs], target as u32)
                } else {
                    format!(
                        "BNE {},{},$@{:08X}",
                        GPR_NAME[rs], GPR_NAME[rt], target as u32
                    )
                };
                insn(addr, text, false, Some(target))
            }
            0x06 => {
                let target = branch_target(addr, w);
                insn(
                    addr,
                    format!("BLEZ {},$@{:08X}", GPR_NAME[field_rs(w)], target as u32),
                    false,
                    Some(target),
                )
            }
            0x07 => {
                let target = branch_target(addr, w);
                insn(
                    addr,
                    format!("BGTZ {},$@{:08X}", GPR_NAME[field_rs(w)], target as u32),
                    false,
                    Some(target),
                )
            }
            0x08 => insn(
                addr,
                format!(
                    "ADDI {},{},{}",
                    GPR_NAME[field_rt(w)],
                    GPR_NAME[field_rs(w)],
                    field_imm16(w) as i16
                ),
                false,
                None,
            ),
            0x09 => {
                let (rt, rs) = (field_rt(w), field_rs(w));
                let imm = field_imm16(w) as i16;
                let text = if rs == 0 {
                    format!("LI {},{}", GPR_NAME[rt], imm)
                } else {
                    format!("ADDIU {},{},{}", GPR_NAME[rt], GPR_NAME[rs], imm)
                };
                insn(addr, text, false, None)
            }
            0x0A => insn(
                addr,
                format!(
                    "SLTI {},{},{}",
                    GPR_NAME[field_rt(w)],
                    GPR_NAME[field_rs(w)],
                    field_imm16(w) as i16
                ),
                false,
                None,
            ),
            0x0B => insn(
                addr,
                format!(
                    "SLTIU {},{},{}",
                    GPR_NAME[field_rt(w)],
                    GPR_NAME[field_rs(w)],
                    field_imm16(w) as i16
                ),
                false,
                None,
            ),
            0x0C => insn(
                addr,
                format!(
                    "ANDI {},{},${:04X}",
                    GPR_NAME[field_rt(w)],
                    GPR_NAME[field_rs(w)],
                    field_imm16(w)
                ),
                false,
                None,
            ),
            0x0D => {
                let (rt, rs) = (field_rt(w), field_rs(w));
                let imm = field_imm16(w);
                let text = if rs == 0 {
                    format!("LI {},${:04X}", GPR_NAME[rt], imm)
                } else {
                    format!("ORI {},{},${:04X}", GPR_NAME[rt], GPR_NAME[rs], imm)
                };
                insn(addr, text, false, None)
            }
            0x0E => insn(
                addr,
                format!(
                    "XORI {},{},${:04X}",
                    GPR_NAME[field_rt(w)],
                    GPR_NAME[field_rs(w)],
                    field_imm16(w)
                ),
                false,
                None,
            ),
            0x0F => insn(
                addr,
                format!("LUI {},${:04X}", GPR_NAME[field_rt(w)], field_imm16(w)),
                false,
                None,
            ),
            0x10 => decode_cop0(w, addr),
            0x12 => decode_cop2(w, addr),
            0x20 => insn(addr, load_store("LB", w), false, None),
            0x21 => insn(addr, load_store("LH", w), false, None),
            0x22 => insn(addr, load_store("LWL", w), false, None),
            0x23 => insn(addr, load_store("LW", w), false, None),
            0x24 => insn(addr, load_store("LBU", w), false, None),
            0x25 => insn(addr, load_store("LHU", w), false, None),
            0x26 => insn(addr, load_store("LWR", w), false, None),
            0x28 => insn(addr, load_store("SB", w), false, None),
            0x29 => insn(addr, load_store("SH", w), false, None),
            0x2A => insn(addr, load_store("SWL", w), false, None),
            0x2B => insn(addr, load_store("SW", w), false, None),
            0x2E => insn(addr, load_store("SWR", w), false, None),
            0x32 => insn(
                addr,
                format!(
                    "LWC2 {},{}({})",
                    field_rt(w),
                    field_imm16(w) as i16,
                    GPR_NAME[field_rs(w)]
                ),
                false,
                None,
            ),
            0x3A => insn(
                addr,
                format!(
                    "SWC2 {},{}({})",
                    field_rt(w),
                    field_imm16(w) as i16,
                    GPR_NAME[field_rs(w)]
                ),
                false,
                None,
            ),
            _ => unknown(addr, w),
        };

        out.push(decoded);
    }

    out
}

#[rustfmt::skip]
pub(crate) static REG_LAYOUT: &[RegLayoutEntry] = &[
    RegLayoutEntry::Hex { label: "zero", reg: reg::R0, bits: 32 },
    RegLayoutEntry::Hex { label: "at",   reg: reg::AT, bits: 32 },
    RegLayoutEntry::Hex { label: "v0",   reg: reg::V0, bits: 32 },
    RegLayoutEntry::Hex { label: "v1",   reg: reg::V1, bits: 32 },
    RegLayoutEntry::Hex { label: "a0",   reg: reg::A0, bits: 32 },
    RegLayoutEntry::Hex { label: "a1",   reg: reg::A1, bits: 32 },
    RegLayoutEntry::Hex { label: "a2",   reg: reg::A2, bits: 32 },
    RegLayoutEntry::Hex { label: "a3",   reg: reg::A3, bits: 32 },
    RegLayoutEntry::Hex { label: "t0",   reg: reg::T0, bits: 32 },
    RegLayoutEntry::Hex { label: "t1",   reg: reg::T1, bits: 32 },
    RegLayoutEntry::Hex { label: "t2",   reg: reg::T2, bits: 32 },
    RegLayoutEntry::Hex { label: "t3",   reg: reg::T3, bits: 32 },
    RegLayoutEntry::Hex { label: "t4",   reg: reg::T4, bits: 32 },
    RegLayoutEntry::Hex { label: "t5",   reg: reg::T5, bits: 32 },
    RegLayoutEntry::Hex { label: "t6",   reg: reg::T6, bits: 32 },
    RegLayoutEntry::Hex { label: "t7",   reg: reg::T7, bits: 32 },
    RegLayoutEntry::Hex { label: "s0",   reg: reg::S0, bits: 32 },
    RegLayoutEntry::Hex { label: "s1",   reg: reg::S1, bits: 32 },
    RegLayoutEntry::Hex { label: "s2",   reg: reg::S2, bits: 32 },
    RegLayoutEntry::Hex { label: "s3",   reg: reg::S3, bits: 32 },
    RegLayoutEntry::Hex { label: "s4",   reg: reg::S4, bits: 32 },
    RegLayoutEntry::Hex { label: "s5",   reg: reg::S5, bits: 32 },
    RegLayoutEntry::Hex { label: "s6",   reg: reg::S6, bits: 32 },
    RegLayoutEntry::Hex { label: "s7",   reg: reg::S7, bits: 32 },
    RegLayoutEntry::Hex { label: "t8",   reg: reg::T8, bits: 32 },
    RegLayoutEntry::Hex { label: "t9",   reg: reg::T9, bits: 32 },
    RegLayoutEntry::Hex { label: "k0",   reg: reg::K0, bits: 32 },
    RegLayoutEntry::Hex { label: "k1",   reg: reg::K1, bits: 32 },
    RegLayoutEntry::Hex { label: "gp",   reg: reg::GP, bits: 32 },
    RegLayoutEntry::Hex { label: "sp",   reg: reg::SP, bits: 32 },
    RegLayoutEntry::Hex { label: "fp",   reg: reg::FP, bits: 32 },
    RegLayoutEntry::Hex { label: "ra",   reg: reg::RA, bits: 32 },
    RegLayoutEntry::Hex { label: "PC",   reg: reg::PC, bits: 32 },
    RegLayoutEntry::Hex { label: "HI",   reg: reg::HI, bits: 32 },
    RegLayoutEntry::Hex { label: "LO",   reg: reg::LO, bits: 32 },
];

#[rustfmt::skip]
pub(crate) static TRACE_REGS: &[TraceReg] = &[
    TraceReg { reg: reg::AT, name: "AT", bits: 32 },
    TraceReg { reg: reg::V0, name: "V0", bits: 32 }, TraceReg { reg: reg::V1, name: "V1", bits: 32 },
    TraceReg { reg: reg::A0, name: "A0", bits: 32 }, TraceReg { reg: reg::A1, name: "A1", bits: 32 },
    TraceReg { reg: reg::A2, name: "A2", bits: 32 }, TraceReg { reg: reg::A3, name: "A3", bits: 32 },
    TraceReg { reg: reg::T0, name: "T0", bits: 32 }, TraceReg { reg: reg::T1, name: "T1", bits: 32 },
    TraceReg { reg: reg::T2, name: "T2", bits: 32 }, TraceReg { reg: reg::T3, name: "T3", bits: 32 },
    TraceReg { reg: reg::T4, name: "T4", bits: 32 }, TraceReg { reg: reg::T5, name: "T5", bits: 32 },
    TraceReg { reg: reg::T6, name: "T6", bits: 32 }, TraceReg { reg: reg::T7, name: "T7", bits: 32 },
    TraceReg { reg: reg::S0, name: "S0", bits: 32 }, TraceReg { reg: reg::S1, name: "S1", bits: 32 },
    TraceReg { reg: reg::S2, name: "S2", bits: 32 }, TraceReg { reg: reg::S3, name: "S3", bits: 32 },
    TraceReg { reg: reg::S4, name: "S4", bits: 32 }, TraceReg { reg: reg::S5, name: "S5", bits: 32 },
    TraceReg { reg: reg::S6, name: "S6", bits: 32 }, TraceReg { reg: reg::S7, name: "S7", bits: 32 },
    TraceReg { reg: reg::T8, name: "T8", bits: 32 }, TraceReg { reg: reg::T9, name: "T9", bits: 32 },
    TraceReg { reg: reg::K0, name: "K0", bits: 32 }, TraceReg { reg: reg::K1, name: "K1", bits: 32 },
    TraceReg { reg: reg::GP, name: "GP", bits: 32 }, TraceReg { reg: reg::SP, name: "SP", bits: 32 },
    TraceReg { reg: reg::FP, name: "FP", bits: 32 }, TraceReg { reg: reg::RA, name: "RA", bits: 32 },
    TraceReg { reg: reg::HI, name: "HI", bits: 32 }, TraceReg { reg: reg::LO, name: "LO", bits: 32 },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn one(word: u32, addr: u64) -> Instruction {
        let insns = disassemble(&word.to_le_bytes(), addr);
        assert_eq!(insns.len(), 1);
        insns.into_iter().next().unwrap()
    }

    #[test]
    fn sll_zero_is_nop() {
        let i = one(0x0000_0000, 0x8000_1000);
        assert_eq!(i.text, "NOP");
        assert!(!i.is_error);
        assert_eq!(i.length, 4);
    }

    #[test]
    fn jal_targets_current_256mb_segment() {
        let i = one(0x0C10_0000, 0x8000_1000);
        assert_eq!(i.text, "JAL $@80400000");
        assert_eq!(i.target, Some(0x8040_0000));
        assert!(!i.breaks_flow);
    }

    #[test]
    fn jr_ra_breaks_flow() {
        let i = one(0x03E0_0008, 0);
        assert_eq!(i.text, "JR ra");
        assert!(i.breaks_flow);
    }

    #[test]
    fn beq_zero_zero_is_b() {
        // BEQ $0,$0,+0x10 at 0x80001000.
        let i = one(0x1000_0004, 0x8000_1000);
        assert_eq!(i.text, "B $@80001014");
        assert_eq!(i.target, Some(0x8000_1014));
    }

    #[test]
    fn backward_branch_target() {
        // BNE v0,zero,-4: target = pc + 4 - 16.
        let i = one(0x1440_FFFC, 0x8000_1010);
        assert_eq!(i.text, "BNEZ v0,$@80001004");
        assert_eq!(i.target, Some(0x8000_1004));
    }

    #[test]
    fn addiu_from_zero_is_li() {
        let i = one(0x2402_0001, 0);
        assert_eq!(i.text, "LI v0,1");
    }

    #[test]
    fn or_from_zero_is_move() {
        // OR a0,$0,s0.
        let i = one(0x0010_2025, 0);
        assert_eq!(i.text, "MOVE a0,s0");
    }

    #[test]
    fn cop0_register_names() {
        let i = one(0x408C_6000, 0); // MTC0 t4,Status
        assert_eq!(i.text, "MTC0 t4,Status");
    }

    #[test]
    fn gte_command_and_unknown() {
        let i = one(0x4A00_0001, 0); // RTPS
        assert_eq!(i.text, "RTPS");
        let i = one(0x4A00_0002, 0);
        assert!(i.is_error);
    }

    #[test]
    fn loads_and_stores() {
        let i = one(0x8FBF_0014, 0); // LW ra,20(sp)
        assert_eq!(i.text, "LW ra,20(sp)");
        let i = one(0xAFBF_FFF0, 0); // SW ra,-16(sp)
        assert_eq!(i.text, "SW ra,-16(sp)");
    }

    #[test]
    fn unknown_primary_opcode_is_dw() {
        let i = one(0xFC00_0000, 0);
        assert_eq!(i.text, "DW FC000000");
        assert!(i.is_error);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let insns = disassemble(&[0, 0, 0, 0, 0xFF, 0xFF], 0);
        assert_eq!(insns.len(), 1);
    }
}
