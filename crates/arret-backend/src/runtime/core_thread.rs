//! Core worker thread and its four-state machine.
//!
//! ```text
//!         start                  frame done
//! IDLE ───────────► RUNNING ───────────────► DONE
//!   ▲                 │                         │
//!   │                 │ can_halt=false & halt   │
//!   │                 ▼                         │
//!   │              BLOCKED                      │
//!   │                 │ resume                  │
//!   └─────────────────┴─────────────────────────┘
//! ```
//!
//! Transitions happen under one mutex and broadcast the condition variable.
//! BLOCKED is entered *by the event dispatcher on the core thread*, inside
//! the core's handler invocation, when a pause is requested for an event
//! the core cannot halt on cleanly.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use arret_abi::Core;

use crate::host::{HostFacade, HostShared};
use crate::sys::psx_capture::GpuCapture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Idle,
    Running,
    Blocked,
    Done,
}

struct SharedInner {
    state: CoreState,
    quit: bool,
}

pub(crate) struct CoreShared {
    inner: Mutex<SharedInner>,
    cv: Condvar,
    block_resume: Mutex<bool>,
    block_cv: Condvar,
}

impl CoreShared {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(SharedInner {
                state: CoreState::Idle,
                quit: false,
            }),
            cv: Condvar::new(),
            block_resume: Mutex::new(false),
            block_cv: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> CoreState {
        self.inner.lock().state
    }

    /// IDLE → RUNNING. Returns false when the core is not idle.
    pub(crate) fn request_run(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != CoreState::Idle {
            return false;
        }
        inner.state = CoreState::Running;
        drop(inner);
        self.cv.notify_all();
        true
    }

    /// Blocks until the frame finished (DONE, acknowledged to IDLE here) or
    /// the dispatcher parked the core thread (BLOCKED).
    pub(crate) fn wait_frame_settled(&self) {
        let mut inner = self.inner.lock();
        while !matches!(inner.state, CoreState::Done | CoreState::Blocked) && !inner.quit {
            self.cv.wait(&mut inner);
        }
        if inner.state == CoreState::Done {
            inner.state = CoreState::Idle;
        }
    }

    /// DONE → IDLE.
    pub(crate) fn ack_done(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CoreState::Done {
            inner.state = CoreState::Idle;
        }
    }

    pub(crate) fn blocked(&self) -> bool {
        self.inner.lock().state == CoreState::Blocked
    }

    /// BLOCKED → RUNNING; wakes the parked handler.
    pub(crate) fn resume_blocked(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == CoreState::Blocked {
                inner.state = CoreState::Running;
            }
        }
        self.cv.notify_all();
        {
            let mut resume = self.block_resume.lock();
            *resume = true;
        }
        self.block_cv.notify_all();
    }

    /// Called by the dispatcher on the core thread: RUNNING → BLOCKED, then
    /// park until [`resume_blocked`](Self::resume_blocked). Falls through
    /// during shutdown so the final frame can drain.
    pub(crate) fn block_until_resumed(&self) {
        {
            let mut inner = self.inner.lock();
            inner.state = CoreState::Blocked;
        }
        self.cv.notify_all();

        let mut resume = self.block_resume.lock();
        loop {
            if *resume {
                *resume = false;
                break;
            }
            if self.inner.lock().quit {
                break;
            }
            self.block_cv.wait(&mut resume);
        }
    }

    /// Signals the worker to exit and releases any parked handler so the
    /// current frame can drain.
    pub(crate) fn signal_quit(&self) {
        {
            let mut inner = self.inner.lock();
            inner.quit = true;
        }
        self.cv.notify_all();
        {
            let mut resume = self.block_resume.lock();
            *resume = true;
        }
        self.block_cv.notify_all();
    }

    pub(crate) fn reset_after_join(&self) {
        let mut inner = self.inner.lock();
        inner.state = CoreState::Idle;
        inner.quit = false;
        *self.block_resume.lock() = false;
    }

    /// Core thread: wait for RUNNING. Returns false on shutdown.
    fn wait_for_work(&self) -> bool {
        let mut inner = self.inner.lock();
        while inner.state != CoreState::Running && !inner.quit {
            self.cv.wait(&mut inner);
        }
        !inner.quit
    }

    /// RUNNING → DONE after the frame function returned.
    fn frame_finished(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == CoreState::Running {
                inner.state = CoreState::Done;
            }
        }
        self.cv.notify_all();
    }
}

pub(crate) fn spawn(
    core: Arc<Mutex<Box<dyn Core>>>,
    host: Arc<HostShared>,
    shared: Arc<CoreShared>,
    capture: Option<Arc<GpuCapture>>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("arret-core".into())
        .spawn(move || {
            while shared.wait_for_work() {
                {
                    let mut core = core.lock();
                    let mut facade = HostFacade {
                        shared: host.as_ref(),
                    };
                    core.run_frame(&mut facade);
                }
                if let Some(capture) = &capture {
                    // VSync boundary for the GPU capture, on the core
                    // thread like the capture itself.
                    capture.frame_boundary();
                }
                shared.frame_finished();
            }
        })
        .expect("spawn core thread")
}
