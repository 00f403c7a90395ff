//! Memory search engine (cheat finder).
//!
//! A session keeps one bit per alignment-sized slot of the target region
//! plus a snapshot of each slot's previous value. Successive filters narrow
//! the candidate set by comparing current values against a literal or
//! against the snapshot; surviving slots are re-snapshotted after every
//! filter pass. All reads are side-effect free.

use arret_abi::{Memory, MemoryRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl SearchOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "lt" => Some(Self::Lt),
            "gt" => Some(Self::Gt),
            "le" => Some(Self::Le),
            "ge" => Some(Self::Ge),
            _ => None,
        }
    }

    fn keep(self, current: u64, against: u64) -> bool {
        match self {
            Self::Eq => current == against,
            Self::Ne => current != against,
            Self::Lt => current < against,
            Self::Gt => current > against,
            Self::Le => current <= against,
            Self::Ge => current >= against,
        }
    }
}

/// Pass as the filter value to compare against the previous snapshot.
pub const VS_PREV: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    pub addr: u64,
    pub value: u64,
    pub prev: u64,
}

struct Session {
    mem: MemoryRef,
    data_size: u32,
    alignment: u32,
    base: u64,
    num_slots: u64,
    /// One bit per slot; trailing bits of the last byte stay clear.
    candidates: Vec<u8>,
    prev: Vec<u64>,
    count: u64,
}

impl Session {
    fn slot_addr(&self, slot: u64) -> u64 {
        self.base + slot * u64::from(self.alignment)
    }

    fn read_value(&self, addr: u64) -> u64 {
        let mut value = 0u64;
        for i in 0..self.data_size {
            value |= u64::from(self.mem.peek(addr + u64::from(i), false)) << (i * 8);
        }
        value
    }

    fn bit(&self, slot: u64) -> bool {
        self.candidates[(slot >> 3) as usize] >> (slot & 7) & 1 != 0
    }

    fn clear_bit(&mut self, slot: u64) {
        self.candidates[(slot >> 3) as usize] &= !(1 << (slot & 7));
    }
}

#[derive(Default)]
pub struct SearchEngine {
    session: Option<Session>,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session over `mem`. `data_size` and `alignment` are clamped
    /// to {1, 2, 4} and alignment is raised to at least the data size.
    pub fn reset(&mut self, mem: MemoryRef, data_size: u32, alignment: u32) -> bool {
        self.free();

        let data_size = if matches!(data_size, 1 | 2 | 4) {
            data_size
        } else {
            1
        };
        let alignment = if matches!(alignment, 1 | 2 | 4) {
            alignment
        } else {
            1
        };
        let alignment = alignment.max(data_size);

        let num_slots = mem.size() / u64::from(alignment);
        if num_slots == 0 {
            return false;
        }

        let bf_bytes = num_slots.div_ceil(8) as usize;
        let mut candidates = vec![0xFFu8; bf_bytes];
        let tail_bits = num_slots & 7;
        if tail_bits != 0 {
            candidates[bf_bytes - 1] = (1u8 << tail_bits) - 1;
        }

        let mut session = Session {
            base: mem.base_address(),
            mem,
            data_size,
            alignment,
            num_slots,
            candidates,
            prev: Vec::new(),
            count: num_slots,
        };
        session.prev = (0..num_slots)
            .map(|slot| session.read_value(session.slot_addr(slot)))
            .collect();

        self.session = Some(session);
        true
    }

    /// Filters survivors by `op` against `value`, or against the snapshot
    /// when `value == VS_PREV`. Returns the surviving count.
    pub fn filter(&mut self, op: SearchOp, value: u64) -> u64 {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };

        for slot in 0..session.num_slots {
            if !session.bit(slot) {
                continue;
            }
            let current = session.read_value(session.slot_addr(slot));
            let against = if value == VS_PREV {
                session.prev[slot as usize]
            } else {
                value
            };
            if !op.keep(current, against) {
                session.clear_bit(slot);
                session.count -= 1;
            }
        }

        // Re-snapshot survivors only.
        for slot in 0..session.num_slots {
            if session.bit(slot) {
                session.prev[slot as usize] = session.read_value(session.slot_addr(slot));
            }
        }

        session.count
    }

    /// Up to `max` survivors in ascending address order.
    pub fn results(&self, max: usize) -> Vec<SearchResult> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for slot in 0..session.num_slots {
            if out.len() >= max {
                break;
            }
            if !session.bit(slot) {
                continue;
            }
            let addr = session.slot_addr(slot);
            out.push(SearchResult {
                addr,
                value: session.read_value(addr),
                prev: session.prev[slot as usize],
            });
        }
        out
    }

    pub fn count(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.count)
    }

    pub fn active(&self) -> bool {
        self.session.is_some()
    }

    pub fn free(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MappedRegion;
    use arret_abi::Memory;

    fn region16() -> std::sync::Arc<MappedRegion> {
        let mem = MappedRegion::new("wram", 0xC000, 16);
        mem.fill(
            0xC000,
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16],
        );
        mem
    }

    #[test]
    fn reset_marks_every_slot() {
        let mut engine = SearchEngine::new();
        assert!(engine.reset(region16(), 1, 1));
        assert_eq!(engine.count(), 16);
        assert!(engine.active());
    }

    #[test]
    fn filter_by_literal_value() {
        let mem = region16();
        let mut engine = SearchEngine::new();
        engine.reset(mem.clone(), 1, 1);

        let first = u64::from(mem.peek(0xC000, false));
        assert_eq!(engine.filter(SearchOp::Eq, first), 1);
        let results = engine.results(10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].addr, 0xC000);
        assert_eq!(results[0].value, first);
    }

    #[test]
    fn filter_vs_prev_counts_unchanged_slots() {
        let mem = region16();
        let mut engine = SearchEngine::new();
        engine.reset(mem.clone(), 1, 1);

        // Change three slots, then keep only unchanged ones.
        mem.poke(0xC001, 0x7F);
        mem.poke(0xC005, 0x7F);
        mem.poke(0xC00F, 0x7F);
        assert_eq!(engine.filter(SearchOp::Eq, VS_PREV), 13);

        // The snapshot was refreshed: filtering again keeps all 13.
        assert_eq!(engine.filter(SearchOp::Eq, VS_PREV), 13);
    }

    #[test]
    fn count_matches_set_bits() {
        let mem = region16();
        let mut engine = SearchEngine::new();
        engine.reset(mem, 1, 1);
        engine.filter(SearchOp::Gt, 8);
        let session = engine.session.as_ref().unwrap();
        let bits: u32 = session.candidates.iter().map(|b| b.count_ones()).sum();
        assert_eq!(u64::from(bits), session.count);
        assert_eq!(session.count, 8);
    }

    #[test]
    fn alignment_raised_to_data_size() {
        let mem = region16();
        let mut engine = SearchEngine::new();
        assert!(engine.reset(mem, 4, 1));
        // 16 bytes / alignment 4 = 4 slots.
        assert_eq!(engine.count(), 4);
        let results = engine.results(10);
        assert_eq!(results[0].value, 0x04030201);
        assert_eq!(results[1].addr, 0xC004);
    }

    #[test]
    fn free_clears_the_session() {
        let mut engine = SearchEngine::new();
        engine.reset(region16(), 1, 1);
        engine.free();
        assert!(!engine.active());
        assert_eq!(engine.count(), 0);
        assert!(engine.results(4).is_empty());
    }
}
