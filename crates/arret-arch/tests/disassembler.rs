//! Property tests over the disassemblers.

use arret_abi::CpuType;
use arret_arch::{arch_for_cpu, disassemble};
use proptest::prelude::*;

proptest! {
    /// Disassembly is a pure function: identical inputs, identical output.
    #[test]
    fn deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..256),
                     base in 0u64..0x1_0000) {
        for cpu in [CpuType::LR35902, CpuType::MOS6502] {
            let a = disassemble(&bytes, base, cpu);
            let b = disassemble(&bytes, base, cpu);
            prop_assert_eq!(a, b);
        }
    }

    /// The listing covers the buffer contiguously for byte-aligned ISAs and
    /// never runs past its end.
    #[test]
    fn contiguous_listing(bytes in proptest::collection::vec(any::<u8>(), 0..256),
                          base in 0u64..0x1_0000) {
        for cpu in [CpuType::LR35902, CpuType::MOS6502] {
            let insns = disassemble(&bytes, base, cpu);
            let mut expect = base;
            for insn in &insns {
                prop_assert_eq!(insn.address, expect);
                prop_assert!(insn.length >= 1);
                expect += u64::from(insn.length);
            }
            prop_assert!(expect <= base + bytes.len() as u64);
        }
    }

    /// Fixed-width ISA: every address and length respects the alignment.
    #[test]
    fn r3000a_alignment(words in proptest::collection::vec(any::<u32>(), 0..64),
                        base_word in 0u64..0x1000) {
        let base = base_word * 4;
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let arch = arch_for_cpu(CpuType::R3000A).unwrap();
        let insns = disassemble(&bytes, base, CpuType::R3000A);
        prop_assert_eq!(insns.len(), words.len());
        for insn in &insns {
            prop_assert_eq!(insn.address % u64::from(arch.alignment), 0);
            prop_assert_eq!(u32::from(insn.length) % arch.alignment, 0);
        }
    }

    /// Targets of flow-breaking instructions stay in the 16-bit address
    /// space on LR35902.
    #[test]
    fn lr35902_targets_masked(bytes in proptest::collection::vec(any::<u8>(), 0..256),
                              base in 0u64..0xFFFF) {
        for insn in disassemble(&bytes, base, CpuType::LR35902) {
            if let Some(target) = insn.target {
                prop_assert!(target <= 0xFFFF);
            }
        }
    }

    /// Instruction text is never empty and errors always render as data
    /// pseudo-ops.
    #[test]
    fn errors_are_data_pseudo_ops(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        for cpu in [CpuType::LR35902, CpuType::MOS6502] {
            for insn in disassemble(&bytes, 0, cpu) {
                prop_assert!(!insn.text.is_empty());
                if insn.is_error {
                    prop_assert!(insn.text.starts_with("DB $"));
                }
            }
        }
    }
}
