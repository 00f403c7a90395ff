//! Central event dispatcher: skip map, stepping, breakpoint routing.
//!
//! Runs on the core thread inside the core's handler invocation. The skip
//! map suppresses the re-fire that would otherwise occur when resuming from
//! a halt at an address that still matches the subscription: before any
//! resume, each CPU's current PC is recorded and a throwaway broad step
//! subscription installed purely to observe the PC advancing; the entry is
//! dropped at the first event where the CPU has moved on. At most one event
//! per CPU is suppressed per resume.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use arret_abi::{
    AddressRange, Cpu, DebugControl, DebugControlRef, Event, EventHandler, EventKind, MemoryOp,
    StepKind, Subscription, SubscriptionId, System, SystemRef,
};
use arret_arch::registers;

use super::core_thread::CoreShared;
use crate::breakpoint::BreakpointEngine;
use crate::sys::SystemTracer;
use crate::sys::psx_capture::GpuCapture;
use crate::trace::{TraceEngine, TraceSink};

/// Step flavors surfaced by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRequest {
    In,
    Over,
    Out,
}

#[derive(Default)]
struct StepState {
    active: bool,
    sub: SubscriptionId,
    complete: bool,
}

struct SkipEntry {
    addr: u64,
    temp_sub: Option<SubscriptionId>,
}

pub(crate) fn cpu_pc(cpu: &dyn Cpu) -> u64 {
    registers::pc_index(cpu.cpu_type())
        .map(|idx| cpu.get_register(idx))
        .unwrap_or(0)
}

pub(crate) struct Debugger {
    shared: Arc<CoreShared>,
    control: OnceCell<DebugControlRef>,
    system: OnceCell<SystemRef>,
    tracer: OnceCell<Arc<dyn SystemTracer>>,
    capture: OnceCell<Arc<GpuCapture>>,

    pub(crate) breakpoints: Mutex<BreakpointEngine>,
    pub(crate) trace: Mutex<TraceEngine>,
    skip: Mutex<HashMap<String, SkipEntry>>,
    step: Mutex<StepState>,
    bp_hit: Mutex<Option<u32>>,
}

impl Debugger {
    pub(crate) fn new(shared: Arc<CoreShared>) -> Self {
        Self {
            shared,
            control: OnceCell::new(),
            system: OnceCell::new(),
            tracer: OnceCell::new(),
            capture: OnceCell::new(),
            breakpoints: Mutex::new(BreakpointEngine::new()),
            trace: Mutex::new(TraceEngine::new(Arc::new(TraceSink::new()))),
            skip: Mutex::new(HashMap::new()),
            step: Mutex::new(StepState::default()),
            bp_hit: Mutex::new(None),
        }
    }

    pub(crate) fn install(
        &self,
        control: DebugControlRef,
        system: SystemRef,
        tracer: Option<Arc<dyn SystemTracer>>,
        capture: Option<Arc<GpuCapture>>,
    ) {
        let _ = self.control.set(control);
        let _ = self.system.set(system);
        if let Some(tracer) = tracer {
            let _ = self.tracer.set(tracer);
        }
        if let Some(capture) = capture {
            let _ = self.capture.set(capture);
        }
    }

    pub(crate) fn has_debug(&self) -> bool {
        self.control.get().is_some()
    }

    pub(crate) fn control(&self) -> Option<DebugControlRef> {
        self.control.get().cloned()
    }

    pub(crate) fn system(&self) -> Option<SystemRef> {
        self.system.get().cloned()
    }

    /// Records each CPU's PC as its skip address and installs the per-CPU
    /// housekeeping subscription. Call before any resume.
    pub(crate) fn set_skip(&self) {
        let (Some(control), Some(system)) = (self.control.get(), self.system.get()) else {
            return;
        };

        let mut skip = self.skip.lock();
        for (_, entry) in skip.drain() {
            if let Some(sub) = entry.temp_sub {
                control.unsubscribe(sub);
            }
        }

        for cpu in system.cpus() {
            let pc = cpu_pc(cpu.as_ref());
            let sub = control.subscribe(&Subscription::Execution {
                cpu: cpu.clone(),
                step: StepKind::Step,
                range: AddressRange::BROAD,
            });
            skip.insert(
                cpu.id().to_string(),
                SkipEntry {
                    addr: pc,
                    temp_sub: (sub >= 0).then_some(sub),
                },
            );
        }
    }

    pub(crate) fn clear_skip(&self) {
        let Some(control) = self.control.get() else {
            return;
        };
        let mut skip = self.skip.lock();
        for (_, entry) in skip.drain() {
            if let Some(sub) = entry.temp_sub {
                control.unsubscribe(sub);
            }
        }
    }

    pub(crate) fn step_begin(&self, request: StepRequest) -> bool {
        let (Some(control), Some(system)) = (self.control.get(), self.system.get()) else {
            return false;
        };
        let Some(cpu) = system
            .cpus()
            .iter()
            .find(|c| c.is_main())
            .or_else(|| system.cpus().first())
            .cloned()
        else {
            return false;
        };

        {
            let mut step = self.step.lock();
            if step.active {
                return false;
            }
            let kind = match request {
                StepRequest::In => StepKind::Step,
                StepRequest::Over => StepKind::CurrentSubroutine,
                StepRequest::Out => StepKind::StepOut,
            };
            let sub = control.subscribe(&Subscription::Execution {
                cpu,
                step: kind,
                range: AddressRange::BROAD,
            });
            if sub < 0 {
                return false;
            }
            step.active = true;
            step.sub = sub;
            step.complete = false;
        }

        // Suppress the immediate fire at the current PC. STEP_OUT is exempt:
        // it only starts reporting after the subroutine returns.
        if request != StepRequest::Out {
            self.set_skip();
        }
        true
    }

    pub(crate) fn step_complete(&self) -> bool {
        self.step.lock().complete
    }

    pub(crate) fn step_end(&self) {
        let mut step = self.step.lock();
        if step.active
            && let Some(control) = self.control.get()
        {
            control.unsubscribe(step.sub);
        }
        *step = StepState::default();
    }

    pub(crate) fn step_reset(&self) {
        self.step.lock().complete = false;
    }

    pub(crate) fn bp_hit(&self) -> Option<u32> {
        *self.bp_hit.lock()
    }

    pub(crate) fn ack_bp_hit(&self) {
        *self.bp_hit.lock() = None;
    }

    /// Skip-map suppression: true when the event's CPU still sits at its
    /// recorded skip address.
    fn suppressed_by_skip(&self, event: &Event) -> bool {
        let EventKind::Execution { cpu, .. } = &event.kind else {
            return false;
        };
        let skip = self.skip.lock();
        skip.get(cpu.id())
            .is_some_and(|entry| cpu_pc(cpu.as_ref()) == entry.addr)
    }
}

impl EventHandler for Debugger {
    fn handle_event(&self, sub_id: SubscriptionId, event: &Event) -> bool {
        let Some(control) = self.control.get() else {
            return false;
        };

        // Skip-map maintenance: drop entries whose CPU advanced past the
        // skip address, along with their housekeeping subscriptions.
        if let Some(system) = self.system.get() {
            let mut skip = self.skip.lock();
            if !skip.is_empty() {
                for cpu in system.cpus() {
                    let advanced = skip
                        .get(cpu.id())
                        .is_some_and(|entry| cpu_pc(cpu.as_ref()) != entry.addr);
                    if advanced
                        && let Some(entry) = skip.remove(cpu.id())
                        && let Some(sub) = entry.temp_sub
                    {
                        control.unsubscribe(sub);
                    }
                }
            }
            // Housekeeping subscriptions never pause, regardless of match.
            if skip.values().any(|entry| entry.temp_sub == Some(sub_id)) {
                return false;
            }
        }

        // Trace subscriptions log and return; they honour the skip address
        // to avoid double-logging the instruction a step halted on.
        {
            let trace = self.trace.lock();
            if trace.owns(sub_id) {
                if !self.suppressed_by_skip(event) {
                    trace.log_event(sub_id, event);
                }
                return false;
            }
        }

        // Platform trace options and GPU capture route to their modules.
        if let Some(tracer) = self.tracer.get()
            && tracer.owns(sub_id)
        {
            tracer.on_event(sub_id, event);
            return false;
        }
        if let Some(capture) = self.capture.get()
            && capture.owns(sub_id)
        {
            capture.on_event(event);
            return false;
        }

        // Step + breakpoint: decide whether to pause.
        let is_step = {
            let step = self.step.lock();
            step.active && step.sub == sub_id
        };
        let is_bp = self.breakpoints.lock().owns(sub_id);
        if !is_step && !is_bp {
            return false;
        }

        if self.suppressed_by_skip(event) {
            return false;
        }

        if is_step {
            self.step.lock().complete = true;
        }
        if is_bp {
            let mut breakpoints = self.breakpoints.lock();
            if let Some(id) = breakpoints.sub_to_id(sub_id) {
                *self.bp_hit.lock() = Some(id);
                match &event.kind {
                    EventKind::Execution { address, .. } => {
                        tracing::info!(
                            id,
                            address = %format_args!("{address:#06x}"),
                            halted = event.can_halt,
                            "breakpoint hit"
                        );
                    }
                    EventKind::Memory { address, op, .. } => {
                        tracing::info!(
                            id,
                            address = %format_args!("{address:#06x}"),
                            write = op.contains(MemoryOp::WRITE),
                            halted = event.can_halt,
                            "watchpoint hit"
                        );
                    }
                    _ => {}
                }
                // Deleting inside the handler would resynchronize the
                // subscription set mid-dispatch and can flip some cores out
                // of debug mode before they see the halt flag; the main
                // loop drains this between frames.
                if breakpoints.get(id).is_some_and(|bp| bp.temporary) {
                    breakpoints.defer_delete(id);
                }
            }
        }

        if event.can_halt {
            // Core halts its run loop and returns from the frame function.
            true
        } else {
            // Core can't halt here; park this thread until resumed.
            self.shared.block_until_resumed();
            false
        }
    }
}
