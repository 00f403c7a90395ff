//! Debug ABI shared between emulator cores and the Arrêt backend.
//!
//! Everything starts at [`Core::set_debugger`]: the frontend hands the core an
//! [`EventHandler`], and a debug-capable core answers with a [`DebugControl`]
//! handle through which the frontend subscribes to execution, memory,
//! register, IO, interrupt, and platform-specific ("misc") events.
//!
//! The system topology the core exposes ([`System`], [`Cpu`], [`Memory`])
//! is borrowed for the lifetime of the loaded core: handles must not be
//! retained across a core reload.

mod core;
mod event;
mod regs;
mod system;

pub mod psx;

pub use crate::core::{
    AvInfo, ControllerType, Core, GameGeometry, Host, InputDevice, LoadContentError, LogLevel,
    PixelFormat, SerializeError, SystemInfo, SystemTiming, device, joypad,
};
pub use event::{AddressRange, Event, EventKind, StepKind, Subscription};
pub use regs::{CpuType, lr35902, m65816, mos6502, r3000a, z80};
pub use system::{Cpu, CpuRef, Memory, MemoryMapEntry, MemoryRef, MiscBreakpoint, System, SystemRef};

use bitflags::bitflags;
use std::sync::Arc;

/// ABI revision implemented by this crate.
pub const API_VERSION: u32 = 1;

/// Identifies one active subscription.
///
/// IDs are unique across event types and are never reused until the
/// subscription is dropped via [`DebugControl::unsubscribe`]. A negative
/// value signals that the subscribe call failed.
pub type SubscriptionId = i64;

bitflags! {
    /// Operation mask for memory and IO watchpoints.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryOp: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// Receives events from the core, on the core's own thread.
///
/// The return value requests a clean halt: it is only meaningful when the
/// event carries `can_halt = true`, in which case the core breaks its run
/// loop and returns from its frame function, postponing remaining events to
/// the next frame. When `can_halt` is false the handler must either return
/// promptly or block the calling thread itself.
///
/// Handlers may call [`DebugControl::subscribe`] and
/// [`DebugControl::unsubscribe`] from within [`handle_event`]; cores must
/// tolerate mutation of the subscription set during dispatch.
///
/// [`handle_event`]: EventHandler::handle_event
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, subscription: SubscriptionId, event: &Event) -> bool;
}

/// Debug interface a core returns from [`Core::set_debugger`].
///
/// All methods are safe to call from any thread, including from within an
/// [`EventHandler`] invocation.
pub trait DebugControl: Send + Sync {
    /// The emulated system's topology. Contents may keep changing until
    /// content loading has finished.
    fn system(&self) -> SystemRef;

    /// Asks the core to report events matching `subscription`.
    ///
    /// Returns a negative ID when the subscription kind or address range is
    /// not supported. Broad (`[0, MAX]`) and single-address ranges must be
    /// accepted for execution subscriptions; anything in between may be
    /// rejected per core.
    fn subscribe(&self, subscription: &Subscription) -> SubscriptionId;

    /// Drops a subscription. Idempotent for ids that have not been reused.
    fn unsubscribe(&self, id: SubscriptionId);

    /// ABI revision implemented by the core.
    fn core_api_version(&self) -> u32 {
        API_VERSION
    }
}

pub type DebugControlRef = Arc<dyn DebugControl>;
