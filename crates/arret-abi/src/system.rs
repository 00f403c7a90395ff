use std::sync::Arc;

use crate::regs::CpuType;

/// Platform-specific event source exposed by the core (e.g. PSX "GP0"
/// command submission), distinct from CPU execution/memory watchpoints.
#[derive(Debug)]
pub struct MiscBreakpoint {
    pub description: String,
}

impl MiscBreakpoint {
    pub fn new(description: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            description: description.into(),
        })
    }
}

/// One window of a memory map.
///
/// Entries are consecutive: each entry's `base_addr` equals the previous
/// entry's `base_addr + size`, and `size` is never zero.
#[derive(Clone)]
pub struct MemoryMapEntry {
    pub base_addr: u64,
    pub size: u64,
    /// Backing memory object (e.g. the full ROM) this window maps into, if
    /// the core exposes one.
    pub source: Option<MemoryRef>,
    /// Offset within `source` that this window maps to. Zero when `source`
    /// is absent.
    pub source_base_addr: u64,
    /// Bank number, if banking applies to this window.
    pub bank: Option<i64>,
}

/// A named byte-addressable span of emulator memory.
///
/// Handles are compared by their `id()` string, which is unique within a
/// system.
pub trait Memory: Send + Sync {
    fn id(&self) -> &str;
    fn description(&self) -> &str;
    /// Access alignment in bytes.
    fn alignment(&self) -> u32 {
        1
    }
    fn base_address(&self) -> u64;
    fn size(&self) -> u64;

    /// Reads one byte. With `side_effects` false the core must guarantee the
    /// read is invisible to the emulated machine (IO registers included) and
    /// must never fire memory subscriptions; where that is impossible it
    /// returns 0.
    fn peek(&self, address: u64, side_effects: bool) -> u8;

    /// Writes one byte, returning whether the write took effect. Never fires
    /// memory subscriptions.
    fn poke(&self, address: u64, value: u8) -> bool;

    /// Bulk side-effect-free read. Cores with a contiguous backing store can
    /// override this; the default loops over [`peek`](Memory::peek).
    fn peek_range(&self, address: u64, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.peek(address + i as u64, false);
        }
    }

    /// Ordered, non-overlapping memory map, if this region has one.
    fn memory_map(&self) -> Option<Vec<MemoryMapEntry>> {
        None
    }

    /// Where `address` would point if `bank` were loaded, if banking applies
    /// at that address.
    fn bank_address(&self, _address: u64, _bank: i64) -> Option<MemoryMapEntry> {
        None
    }
}

pub type MemoryRef = Arc<dyn Memory>;

pub trait Cpu: Send + Sync {
    fn id(&self) -> &str;
    fn description(&self) -> &str;
    fn cpu_type(&self) -> CpuType;
    /// Only one CPU of a system is the main CPU.
    fn is_main(&self) -> bool;
    /// Memory region addressable by this CPU.
    fn memory(&self) -> Option<MemoryRef>;
    fn get_register(&self, reg: u32) -> u64;
    /// Returns whether the write succeeded.
    fn set_register(&self, reg: u32, value: u64) -> bool;
}

pub type CpuRef = Arc<dyn Cpu>;

pub trait System: Send + Sync {
    /// Common system name, lower case: "nes", "gb", "gbc", "psx", ...
    fn description(&self) -> &str;
    fn cpus(&self) -> &[CpuRef];
    /// Memory regions not addressable by any CPU of the system.
    fn memory_regions(&self) -> &[MemoryRef];
    fn misc_breakpoints(&self) -> &[Arc<MiscBreakpoint>];
    /// Human-readable info about the loaded content (header, mapper, title,
    /// checksum...).
    fn content_info(&self) -> Option<String> {
        None
    }
}

pub type SystemRef = Arc<dyn System>;
