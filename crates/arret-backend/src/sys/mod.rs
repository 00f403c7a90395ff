//! Per-system metadata: interrupt names and platform-specific tracers.
//!
//! Keyed by the system description string the core reports (`"gb"`,
//! `"psx"`, ...). A system module may contribute trace options with their
//! own subscriptions; the central dispatcher routes events for those
//! subscriptions back here through [`SystemTracer::on_event`].

pub mod psx;
pub mod psx_capture;

use std::sync::Arc;

use arret_abi::{DebugControl, Event, SubscriptionId, System};

use crate::trace::TraceSink;

#[derive(Debug, Clone, Copy)]
pub struct TraceOption {
    pub label: &'static str,
}

pub trait SystemTracer: Send + Sync {
    /// Interrupt-kind names, indexed by kind number. Empty string = no
    /// standard interrupt for that bit.
    fn interrupt_names(&self) -> &'static [&'static str];

    fn trace_options(&self) -> &'static [TraceOption] {
        &[]
    }

    /// Starts a trace option: subscribe to whatever events it needs and log
    /// lines through `sink`. Called with tracing active.
    fn option_start(
        &self,
        _index: usize,
        _control: &dyn DebugControl,
        _system: &dyn System,
        _sink: Arc<TraceSink>,
    ) -> bool {
        false
    }

    fn option_stop(&self, _index: usize, _control: &dyn DebugControl) {}

    /// Whether `sub_id` belongs to this system's trace options.
    fn owns(&self, _sub_id: SubscriptionId) -> bool {
        false
    }

    /// Handles an event for an owned subscription. Never halts.
    fn on_event(&self, _sub_id: SubscriptionId, _event: &Event) {}
}

pub fn interrupt_name(tracer: &dyn SystemTracer, kind: u32) -> Option<&'static str> {
    tracer
        .interrupt_names()
        .get(kind as usize)
        .copied()
        .filter(|name| !name.is_empty())
}

struct SimpleSystem {
    int_names: &'static [&'static str],
}

impl SystemTracer for SimpleSystem {
    fn interrupt_names(&self) -> &'static [&'static str] {
        self.int_names
    }
}

static GB_INT_NAMES: [&str; 5] = ["VBlank", "STAT", "Timer", "Serial", "Joypad"];
static NES_INT_NAMES: [&str; 2] = ["NMI", "IRQ"];

/// Looks up the system module for a core's description string.
pub fn tracer_for(description: &str) -> Option<Arc<dyn SystemTracer>> {
    match description {
        "gb" | "gbc" => Some(Arc::new(SimpleSystem {
            int_names: &GB_INT_NAMES,
        })),
        "nes" => Some(Arc::new(SimpleSystem {
            int_names: &NES_INT_NAMES,
        })),
        "psx" => Some(Arc::new(psx::PsxTracer::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup() {
        assert!(tracer_for("gb").is_some());
        assert!(tracer_for("gbc").is_some());
        assert!(tracer_for("nes").is_some());
        assert!(tracer_for("psx").is_some());
        assert!(tracer_for("megadrive").is_none());
    }

    #[test]
    fn interrupt_names_resolve() {
        let gb = tracer_for("gb").unwrap();
        assert_eq!(interrupt_name(gb.as_ref(), 0), Some("VBlank"));
        assert_eq!(interrupt_name(gb.as_ref(), 4), Some("Joypad"));
        assert_eq!(interrupt_name(gb.as_ref(), 9), None);

        let psx = tracer_for("psx").unwrap();
        assert_eq!(interrupt_name(psx.as_ref(), 0), Some("VBlank"));
        // Bit 8 has no standard interrupt on PSX.
        assert_eq!(interrupt_name(psx.as_ref(), 8), None);
        assert_eq!(interrupt_name(psx.as_ref(), 9), Some("SPU"));
    }

    #[test]
    fn psx_has_three_trace_options() {
        let psx = tracer_for("psx").unwrap();
        let labels: Vec<&str> = psx.trace_options().iter().map(|o| o.label).collect();
        assert_eq!(labels, ["BIOS calls", "GPU commands", "GPU post-commands"]);
    }
}
