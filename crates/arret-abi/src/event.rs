use std::sync::Arc;

use crate::system::{CpuRef, MemoryRef, MiscBreakpoint};
use crate::MemoryOp;

/// PC range of interest for an execution subscription.
///
/// Cores must accept the broad range and single-address ranges; anything in
/// between may be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub begin: u64,
    pub end: u64,
}

impl AddressRange {
    /// All addresses.
    pub const BROAD: AddressRange = AddressRange {
        begin: 0,
        end: u64::MAX,
    };

    /// A single address (the usual breakpoint shape).
    pub fn point(address: u64) -> Self {
        Self {
            begin: address,
            end: address,
        }
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.begin && address <= self.end
    }

    pub fn is_broad(&self) -> bool {
        *self == Self::BROAD
    }

    pub fn is_point(&self) -> bool {
        self.begin == self.end
    }
}

/// Execution-reporting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Report all execution events.
    Step,
    /// As above, but temporarily disabled while servicing an interrupt.
    SkipInterrupt,
    /// As above, but temporarily disabled inside invoked subroutines.
    CurrentSubroutine,
    /// Initially disabled; enabled after returning from the current
    /// subroutine.
    StepOut,
}

/// A standing request for the core to report one class of events.
#[derive(Clone)]
pub enum Subscription {
    Execution {
        cpu: CpuRef,
        step: StepKind,
        range: AddressRange,
    },
    Interrupt {
        cpu: CpuRef,
        kind: u32,
    },
    Memory {
        memory: MemoryRef,
        range: AddressRange,
        op: MemoryOp,
    },
    Register {
        cpu: CpuRef,
        reg: u32,
    },
    Io {
        cpu: CpuRef,
        range: AddressRange,
        op: MemoryOp,
    },
    Misc {
        breakpoint: Arc<MiscBreakpoint>,
    },
}

/// Payload of one reported event.
#[derive(Clone)]
pub enum EventKind {
    /// A CPU is about to execute the instruction at `address`.
    Execution { cpu: CpuRef, address: u64 },
    /// An interrupt was served. `kind` depends on the CPU model;
    /// `return_address` is the next instruction after returning and
    /// `vector_address` the new program counter.
    Interrupt {
        cpu: CpuRef,
        kind: u32,
        return_address: u64,
        vector_address: u64,
    },
    /// A memory location is about to be accessed.
    Memory {
        memory: MemoryRef,
        address: u64,
        op: MemoryOp,
        value: u8,
    },
    /// A register is about to change.
    Register { cpu: CpuRef, reg: u32, new_value: u64 },
    /// An IO port is about to be accessed.
    Io {
        cpu: CpuRef,
        address: u64,
        op: MemoryOp,
        value: u64,
    },
    /// A misc breakpoint was hit. `data` carries a platform-defined
    /// little-endian payload when the source provides one (e.g. the PSX GPU
    /// post payload, see [`crate::psx`]).
    Misc {
        breakpoint: Arc<MiscBreakpoint>,
        args: [u64; 4],
        data: Option<Arc<[u8]>>,
    },
}

pub struct Event {
    pub kind: EventKind,
    /// True if the core can halt execution and return from its frame
    /// function immediately. When false the core cannot break cleanly at
    /// this point and a frontend wishing to pause must block the calling
    /// thread inside its handler.
    pub can_halt: bool,
}

impl Event {
    pub fn new(kind: EventKind, can_halt: bool) -> Self {
        Self { kind, can_halt }
    }

    /// CPU the event concerns, when it has one.
    pub fn cpu(&self) -> Option<&CpuRef> {
        match &self.kind {
            EventKind::Execution { cpu, .. }
            | EventKind::Interrupt { cpu, .. }
            | EventKind::Register { cpu, .. }
            | EventKind::Io { cpu, .. } => Some(cpu),
            EventKind::Memory { .. } | EventKind::Misc { .. } => None,
        }
    }
}
