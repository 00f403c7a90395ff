//! R3000A (PSX) stack trace via prologue scanning.
//!
//! Unwinds the call stack by scanning backward from each return address for
//! the function prologue pattern:
//!
//! ```text
//! addiu sp, sp, -N    (0x27BDxxxx, imm16 negative)
//! sw ra, offset(sp)   (0xAFBFxxxx)
//! ```

use arret_abi::{Cpu, Memory, r3000a as reg};

use crate::{StackFrame, StackTrace, StackTraceStatus};

// PSX RAM: 2MB mirrored at KUSEG 0x00000000, KSEG0 0x80000000, KSEG1 0xA0000000.
const RAM_SIZE: u32 = 0x20_0000;
const KUSEG_BASE: u32 = 0x0000_0000;
const KSEG0_BASE: u32 = 0x8000_0000;
const KSEG1_BASE: u32 = 0xA000_0000;

const MAX_SCAN_INSNS: u32 = 2000;
const MAX_FRAME_SIZE: u32 = 0x1_0000;
const RA_SCAN_INSNS: u32 = 10;

fn is_ram_addr(addr: u32) -> bool {
    addr < KUSEG_BASE + RAM_SIZE
        || (KSEG0_BASE..KSEG0_BASE + RAM_SIZE).contains(&addr)
        || (KSEG1_BASE..KSEG1_BASE + RAM_SIZE).contains(&addr)
}

fn read32(mem: &dyn Memory, addr: u32) -> u32 {
    let mut bytes = [0u8; 4];
    mem.peek_range(u64::from(addr), &mut bytes);
    u32::from_le_bytes(bytes)
}

pub(crate) fn stack_trace(cpu: &dyn Cpu, max_depth: usize) -> StackTrace {
    let Some(mem) = cpu.memory() else {
        return StackTrace {
            frames: Vec::new(),
            status: StackTraceStatus::ReadError,
        };
    };

    let mut pc = cpu.get_register(reg::PC) as u32;
    let mut sp = cpu.get_register(reg::SP) as u32;
    let mut ra = cpu.get_register(reg::RA) as u32;

    let mut frames = vec![StackFrame {
        pc: u64::from(pc),
        sp: u64::from(sp),
        func_addr: None,
    }];

    for depth in 0..max_depth {
        if ra == 0 {
            return StackTrace {
                frames,
                status: StackTraceStatus::Ok,
            };
        }
        if ra & 3 != 0 || !is_ram_addr(ra) {
            return StackTrace {
                frames,
                status: StackTraceStatus::InvalidRa,
            };
        }

        // Scan backward from pc for the stack allocation.
        let scan_floor = if pc >= KSEG0_BASE {
            KSEG0_BASE.max(pc.saturating_sub(MAX_SCAN_INSNS * 4))
        } else {
            pc.saturating_sub(MAX_SCAN_INSNS * 4)
        };

        let mut frame_size = 0u32;
        let mut func_start = None;
        let mut addr = pc;
        while addr > scan_floor && addr >= 4 {
            let word = read32(mem.as_ref(), addr - 4);
            // addiu sp, sp, imm16 = 0x27BD____
            if word & 0xFFFF_0000 == 0x27BD_0000 {
                let imm = (word & 0xFFFF) as u16 as i16;
                if imm < 0 {
                    frame_size = (-i32::from(imm)) as u32;
                    func_start = Some(addr - 4);
                    break;
                }
            }
            addr -= 4;
        }

        if func_start.is_some() && frame_size > MAX_FRAME_SIZE {
            return StackTrace {
                frames,
                status: StackTraceStatus::ScanLimit,
            };
        }

        // Look forward from the prologue for sw ra, offset(sp).
        let mut ra_offset = None;
        if let Some(start) = func_start {
            let mut addr = start;
            while addr < start + RA_SCAN_INSNS * 4 && addr < pc {
                let word = read32(mem.as_ref(), addr);
                // sw ra, offset(sp) = 0xAFBF____
                if word & 0xFFFF_0000 == 0xAFBF_0000 {
                    ra_offset = Some(word & 0xFFFF);
                    break;
                }
                addr += 4;
            }
        }

        let next_ra = match ra_offset {
            Some(offset) => read32(mem.as_ref(), sp.wrapping_add(offset)),
            None if depth == 0 => {
                // Leaf function: RA is still in the register.
                if func_start.is_none() {
                    frame_size = 0;
                }
                ra
            }
            None => {
                return StackTrace {
                    frames,
                    status: StackTraceStatus::ScanLimit,
                };
            }
        };

        let next_sp = sp.wrapping_add(frame_size);
        if frame_size > 0 && (next_sp < sp || next_sp & 3 != 0) {
            return StackTrace {
                frames,
                status: StackTraceStatus::InvalidSp,
            };
        }

        frames.push(StackFrame {
            pc: u64::from(next_ra),
            sp: u64::from(next_sp),
            func_addr: func_start.map(u64::from),
        });

        if next_ra == 0 {
            return StackTrace {
                frames,
                status: StackTraceStatus::Ok,
            };
        }

        pc = next_ra;
        sp = next_sp;
        ra = next_ra;
    }

    StackTrace {
        frames,
        status: StackTraceStatus::MaxDepth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arret_abi::{Cpu, CpuType, Memory, MemoryRef};
    use std::sync::{Arc, Mutex};

    struct TestRam {
        base: u32,
        bytes: Mutex<Vec<u8>>,
    }

    impl Memory for TestRam {
        fn id(&self) -> &str {
            "ram"
        }
        fn description(&self) -> &str {
            "test ram"
        }
        fn base_address(&self) -> u64 {
            0
        }
        fn size(&self) -> u64 {
            self.bytes.lock().unwrap().len() as u64
        }
        fn peek(&self, address: u64, _side_effects: bool) -> u8 {
            let off = address.wrapping_sub(u64::from(self.base)) as usize;
            self.bytes.lock().unwrap().get(off).copied().unwrap_or(0)
        }
        fn poke(&self, address: u64, value: u8) -> bool {
            let off = address.wrapping_sub(u64::from(self.base)) as usize;
            let mut bytes = self.bytes.lock().unwrap();
            if off < bytes.len() {
                bytes[off] = value;
                true
            } else {
                false
            }
        }
    }

    struct TestCpu {
        mem: MemoryRef,
        regs: [u64; 35],
    }

    impl Cpu for TestCpu {
        fn id(&self) -> &str {
            "r3000a"
        }
        fn description(&self) -> &str {
            "test cpu"
        }
        fn cpu_type(&self) -> CpuType {
            CpuType::R3000A
        }
        fn is_main(&self) -> bool {
            true
        }
        fn memory(&self) -> Option<MemoryRef> {
            Some(Arc::clone(&self.mem))
        }
        fn get_register(&self, r: u32) -> u64 {
            self.regs.get(r as usize).copied().unwrap_or(0)
        }
        fn set_register(&self, _r: u32, _v: u64) -> bool {
            false
        }
    }

    fn put32(ram: &TestRam, addr: u32, word: u32) {
        for (i, b) in word.to_le_bytes().iter().enumerate() {
            ram.poke(u64::from(addr) + i as u64, *b);
        }
    }

    #[test]
    fn unwinds_one_saved_frame_and_a_leaf() {
        let ram = Arc::new(TestRam {
            base: 0x8000_0000,
            bytes: std::sync::Mutex::new(vec![0u8; 0x1_0000]),
        });

        // Caller at 0x80000100: addiu sp,sp,-24 ; sw ra,20(sp).
        put32(&ram, 0x8000_0100, 0x27BD_FFE8);
        put32(&ram, 0x8000_0104, 0xAFBF_0014);
        // Callee (current, leaf-ish with its own frame) at 0x80000200:
        // addiu sp,sp,-16 ; sw ra,12(sp).
        put32(&ram, 0x8000_0200, 0x27BD_FFF0);
        put32(&ram, 0x8000_0204, 0xAFBF_000C);

        let sp = 0x8000_8000u32;
        // Saved RA of the callee frame, at sp+12: return into the caller body.
        put32(&ram, sp + 12, 0x8000_0110);
        // Saved RA of the caller frame, at (sp+16)+20: zero terminates.
        put32(&ram, sp + 16 + 20, 0);

        let mem: MemoryRef = ram.clone();
        let mut regs = [0u64; 35];
        regs[arret_abi::r3000a::PC as usize] = 0x8000_0210;
        regs[arret_abi::r3000a::SP as usize] = u64::from(sp);
        regs[arret_abi::r3000a::RA as usize] = 0x8000_0110;
        let cpu = TestCpu { mem, regs };

        let trace = stack_trace(&cpu, 8);
        assert_eq!(trace.status, StackTraceStatus::Ok);
        assert_eq!(trace.frames.len(), 3);
        assert_eq!(trace.frames[0].pc, 0x8000_0210);
        assert_eq!(trace.frames[1].pc, 0x8000_0110);
        assert_eq!(trace.frames[1].sp, u64::from(sp) + 16);
        assert_eq!(trace.frames[1].func_addr, Some(0x8000_0200));
        assert_eq!(trace.frames[2].pc, 0);
    }

    #[test]
    fn zero_ra_terminates_immediately() {
        let ram = Arc::new(TestRam {
            base: 0x8000_0000,
            bytes: std::sync::Mutex::new(vec![0u8; 0x100]),
        });
        let mem: MemoryRef = ram;
        let mut regs = [0u64; 35];
        regs[arret_abi::r3000a::PC as usize] = 0x8000_0000;
        regs[arret_abi::r3000a::SP as usize] = 0x8000_0080;
        let cpu = TestCpu { mem, regs };

        let trace = stack_trace(&cpu, 8);
        assert_eq!(trace.status, StackTraceStatus::Ok);
        assert_eq!(trace.frames.len(), 1);
    }

    #[test]
    fn misaligned_ra_is_invalid() {
        let ram = Arc::new(TestRam {
            base: 0x8000_0000,
            bytes: std::sync::Mutex::new(vec![0u8; 0x100]),
        });
        let mem: MemoryRef = ram;
        let mut regs = [0u64; 35];
        regs[arret_abi::r3000a::PC as usize] = 0x8000_0000;
        regs[arret_abi::r3000a::SP as usize] = 0x8000_0080;
        regs[arret_abi::r3000a::RA as usize] = 0x8000_0001;
        let cpu = TestCpu { mem, regs };

        assert_eq!(stack_trace(&cpu, 8).status, StackTraceStatus::InvalidRa);
    }

    #[test]
    fn out_of_ram_ra_is_invalid() {
        let ram = Arc::new(TestRam {
            base: 0x8000_0000,
            bytes: std::sync::Mutex::new(vec![0u8; 0x100]),
        });
        let mem: MemoryRef = ram;
        let mut regs = [0u64; 35];
        regs[arret_abi::r3000a::PC as usize] = 0x8000_0000;
        regs[arret_abi::r3000a::SP as usize] = 0x8000_0080;
        regs[arret_abi::r3000a::RA as usize] = 0xBF00_0000;
        let cpu = TestCpu { mem, regs };

        assert_eq!(stack_trace(&cpu, 8).status, StackTraceStatus::InvalidRa);
    }
}
