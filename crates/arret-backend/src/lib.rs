//! Arrêt debugger backend.
//!
//! Hosts an emulator [`Core`](arret_abi::Core) on a dedicated worker thread
//! and exposes the interactive debugging surface on top of the debug ABI:
//! breakpoints and watchpoints, stepping, execution trace, symbol
//! annotation, memory search, and PSX GPU capture. Frontends drive
//! everything through [`Runtime`].

pub mod breakpoint;
pub mod host;
pub mod memmap;
pub mod search;
pub mod symbols;
pub mod sys;
pub mod testing;
pub mod trace;

mod runtime;

pub use runtime::{CoreState, Runtime, RuntimeOptions, StepRequest};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no debug support")]
    NoDebugSupport,
    #[error("no content loaded")]
    NoContentLoaded,
    #[error("unknown memory region: {0}")]
    UnknownRegion(String),
    #[error("unknown cpu: {0}")]
    UnknownCpu(String),
    #[error("unknown register: {0}")]
    UnknownRegister(String),
    #[error("subscription failed (core may not support this breakpoint type)")]
    SubscriptionFailed,
    #[error("cannot save state while core thread is blocked")]
    CoreBlocked,
    #[error("core is busy")]
    CoreBusy,
    #[error("invalid label: must match [a-zA-Z_][a-zA-Z0-9_]*")]
    InvalidLabel,
    #[error("invalid save slot: {0}")]
    InvalidSlot(i64),
    #[error("save states are not supported by this core")]
    SaveStateUnsupported,
    #[error("failed to load content: {path}: {error}")]
    LoadContentFailed { path: PathBuf, error: String },
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}
