//! Arrêt command protocol.
//!
//! One textual command per connection; the response is one or more JSON
//! objects (or streamed text for listing verbs), newline-terminated.
//! `{"ok":true, ...}` on success, `{"ok":false, "error":"..."}` on failure.
//! The TCP server accepts one-shot connections and feeds lines to the main
//! loop over a channel, so commands execute serialized on the thread that
//! owns the runtime.

mod client;
mod cmd;
mod server;

pub use client::{run_client, send_command};
pub use cmd::{CommandHook, Dispatcher};
pub use server::CmdServer;

/// Default TCP command ports.
pub const DEFAULT_PORT: u16 = 2783;
pub const DEFAULT_PORT_ALT: u16 = 2784;
