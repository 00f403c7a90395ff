//! The debugger runtime: owns the core, the worker thread, and every
//! debugging engine, and is the single value frontends talk to.

mod core_thread;
mod debugger;

pub use core_thread::CoreState;
pub use debugger::StepRequest;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use parking_lot::{Mutex, MutexGuard};

use arret_abi::{
    AvInfo, Core, Cpu, CpuRef, DebugControl, EventHandler, MemoryRef, System, SystemInfo,
    SystemRef, device,
};

use crate::breakpoint::{BpFlags, Breakpoint, BreakpointEngine, SyncCtx};
use crate::host::{AudioReader, HostFacade, HostShared};
use crate::memmap;
use crate::search::SearchEngine;
use crate::symbols::SymbolStore;
use crate::sys::psx_capture::GpuCapture;
use crate::sys::{SystemTracer, TraceOption};
use crate::{BackendError, sys};

use self::core_thread::CoreShared;
use self::debugger::Debugger;

pub const MAX_SAVE_SLOTS: i64 = 10;

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub mute: bool,
    pub system_dir: PathBuf,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            mute: false,
            system_dir: PathBuf::from("."),
        }
    }
}

struct ContentPaths {
    rom_path: PathBuf,
    /// ROM path with its extension stripped; persistence files hang off it.
    rom_base: PathBuf,
}

pub struct Runtime {
    core: Arc<Mutex<Box<dyn Core>>>,
    host: Arc<HostShared>,
    audio_reader: Mutex<Option<AudioReader>>,
    shared: Arc<CoreShared>,
    debugger: Arc<Debugger>,
    tracer: Option<Arc<dyn SystemTracer>>,
    capture: Option<Arc<GpuCapture>>,
    sys_trace_enabled: Mutex<Vec<bool>>,
    search: Mutex<SearchEngine>,
    symbols: Mutex<SymbolStore>,
    sys_info: SystemInfo,
    av_info: Mutex<AvInfo>,
    content: Mutex<Option<ContentPaths>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Runtime {
    /// Wraps a core, performing the debug handshake. A core without debug
    /// support still runs; debug operations then fail with
    /// [`BackendError::NoDebugSupport`].
    pub fn new(mut core: Box<dyn Core>, options: RuntimeOptions) -> Self {
        let sys_info = core.system_info();
        let av_info = core.av_info();
        let (host, audio_reader) = HostShared::new(options.mute, options.system_dir);
        let shared = Arc::new(CoreShared::new());
        let debugger = Arc::new(Debugger::new(shared.clone()));

        let handler: Arc<dyn EventHandler> = debugger.clone();
        let mut tracer = None;
        let mut capture = None;
        match core.set_debugger(handler) {
            Some(control) => {
                let system = control.system();
                tracer = sys::tracer_for(system.description());
                if system.description() == "psx" {
                    capture = Some(Arc::new(GpuCapture::new()));
                }
                tracing::info!(
                    system = system.description(),
                    cpus = system.cpus().len(),
                    "debug interface available"
                );
                debugger.install(control, system, tracer.clone(), capture.clone());
            }
            None => {
                tracing::warn!("core has no debug support; debug features unavailable");
            }
        }

        let option_count = tracer.as_ref().map_or(0, |t| t.trace_options().len());

        Self {
            core: Arc::new(Mutex::new(core)),
            host,
            audio_reader: Mutex::new(Some(audio_reader)),
            shared,
            debugger,
            tracer,
            capture,
            sys_trace_enabled: Mutex::new(vec![false; option_count]),
            search: Mutex::new(SearchEngine::new()),
            symbols: Mutex::new(SymbolStore::new()),
            sys_info,
            av_info: Mutex::new(av_info),
            content: Mutex::new(None),
            thread: Mutex::new(None),
            running: AtomicBool::new(true),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn load_content(&self, path: &Path) -> Result<(), BackendError> {
        if self.core_state() != CoreState::Idle {
            return Err(BackendError::CoreBusy);
        }

        {
            let mut core = self.core.lock();
            core.load_content(path)
                .map_err(|e| BackendError::LoadContentFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                })?;
            *self.av_info.lock() = core.av_info();
        }

        let rom_base = path.with_extension("");
        {
            let mut env = self.host.env.lock();
            env.save_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
        }
        {
            let av = self.av_info.lock();
            let mut video = self.host.video.lock();
            video.width = av.geometry.base_width;
            video.height = av.geometry.base_height;
        }
        *self.content.lock() = Some(ContentPaths {
            rom_path: path.to_path_buf(),
            rom_base: rom_base.clone(),
        });

        // Annotations and breakpoints follow the content.
        {
            let mut symbols = self.symbols.lock();
            let mut sym_path = rom_base.clone().into_os_string();
            sym_path.push(".sym.json");
            symbols.set_auto_save_path(Some(PathBuf::from(sym_path)));
            symbols.auto_load();
        }
        if let (Some(control), Some(system)) = (self.debugger.control(), self.debugger.system()) {
            let ctx = SyncCtx {
                control: control.as_ref(),
                system: system.as_ref(),
            };
            let mut engine = self.debugger.breakpoints.lock();
            let mut bp_path = rom_base.into_os_string();
            bp_path.push(".bp");
            engine.set_auto_save_path(Some(PathBuf::from(bp_path)));
            engine.auto_load(&ctx);
        }

        let av = *self.av_info.lock();
        tracing::info!(
            path = %path.display(),
            width = av.geometry.base_width,
            height = av.geometry.base_height,
            fps = av.timing.fps,
            "content loaded"
        );
        Ok(())
    }

    pub fn reload_content(&self) -> Result<(), BackendError> {
        let rom_path = {
            let content = self.content.lock();
            content
                .as_ref()
                .map(|c| c.rom_path.clone())
                .ok_or(BackendError::NoContentLoaded)?
        };
        {
            let mut core = self.core.lock();
            core.unload_content();
        }
        self.load_content(&rom_path)
    }

    pub fn content_loaded(&self) -> bool {
        self.content.lock().is_some()
    }

    pub fn rom_base(&self) -> Option<PathBuf> {
        self.content.lock().as_ref().map(|c| c.rom_base.clone())
    }

    /// Stops the worker thread and releases the core.
    pub fn shutdown(&self) {
        self.stop_core_thread();
        self.debugger.step_end();
        self.debugger.clear_skip();
        self.search.lock().free();
        if self.content_loaded() {
            self.core.lock().unload_content();
            *self.content.lock() = None;
        }
    }

    // ------------------------------------------------------------------
    // Core thread / run control
    // ------------------------------------------------------------------

    pub fn start_core_thread(&self) {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return;
        }
        *thread = Some(core_thread::spawn(
            self.core.clone(),
            self.host.clone(),
            self.shared.clone(),
            self.capture.clone(),
        ));
    }

    pub fn stop_core_thread(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            self.shared.signal_quit();
            let _ = handle.join();
            self.shared.reset_after_join();
        }
    }

    pub fn core_thread_running(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Signals the worker to run one frame. Returns false when no content
    /// is loaded, the worker is not running, or the core is not idle.
    pub fn run_frame_async(&self) -> bool {
        if !self.content_loaded() || !self.core_thread_running() {
            return false;
        }
        self.shared.request_run()
    }

    /// Runs one frame synchronously: through the worker when it is up,
    /// inline on the calling thread otherwise. Blocks until DONE (then
    /// acknowledged) or BLOCKED.
    pub fn run_frame(&self) {
        if !self.content_loaded() {
            return;
        }
        if self.core_thread_running() {
            if self.shared.request_run() {
                self.shared.wait_frame_settled();
            }
        } else {
            let mut core = self.core.lock();
            let mut facade = HostFacade {
                shared: self.host.as_ref(),
            };
            core.run_frame(&mut facade);
            if let Some(capture) = &self.capture {
                capture.frame_boundary();
            }
        }
    }

    pub fn core_state(&self) -> CoreState {
        self.shared.state()
    }

    pub fn ack_done(&self) {
        self.shared.ack_done();
    }

    pub fn resume_blocked(&self) {
        self.shared.resume_blocked();
    }

    pub fn blocked(&self) -> bool {
        self.shared.blocked()
    }

    pub fn reset(&self) -> Result<(), BackendError> {
        if !self.content_loaded() {
            return Err(BackendError::NoContentLoaded);
        }
        if self.core_state() != CoreState::Idle {
            return Err(BackendError::CoreBusy);
        }
        self.core.lock().reset();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Debug surface
    // ------------------------------------------------------------------

    pub fn has_debug(&self) -> bool {
        self.debugger.has_debug()
    }

    pub fn system(&self) -> Option<SystemRef> {
        self.debugger.system()
    }

    /// The `is_main`-flagged CPU (or the first one).
    pub fn primary_cpu(&self) -> Option<CpuRef> {
        let system = self.debugger.system()?;
        system
            .cpus()
            .iter()
            .find(|c| c.is_main())
            .or_else(|| system.cpus().first())
            .cloned()
    }

    pub fn find_cpu(&self, id: &str) -> Option<CpuRef> {
        if id.is_empty() {
            return self.primary_cpu();
        }
        let system = self.debugger.system()?;
        system
            .cpus()
            .iter()
            .find(|c| c.id().eq_ignore_ascii_case(id))
            .cloned()
    }

    /// Primary CPU's addressable memory region.
    pub fn debug_memory(&self) -> Option<MemoryRef> {
        self.primary_cpu()?.memory()
    }

    pub fn find_region(&self, id: &str) -> Result<MemoryRef, BackendError> {
        let system = self.system().ok_or(BackendError::NoDebugSupport)?;
        memmap::find_memory_by_id(system.as_ref(), id)
            .ok_or_else(|| BackendError::UnknownRegion(id.to_string()))
    }

    pub fn regions(&self) -> Result<Vec<MemoryRef>, BackendError> {
        let system = self.system().ok_or(BackendError::NoDebugSupport)?;
        Ok(memmap::collect_regions(system.as_ref()))
    }

    pub fn debug_pc(&self) -> u64 {
        self.primary_cpu()
            .map(|cpu| debugger::cpu_pc(cpu.as_ref()))
            .unwrap_or(0)
    }

    /// Records skip addresses for every CPU; call before resuming from a
    /// halt so the same breakpoint does not immediately re-fire.
    pub fn set_skip(&self) {
        self.debugger.set_skip();
    }

    pub fn step_begin(&self, request: StepRequest) -> bool {
        self.debugger.step_begin(request)
    }

    pub fn step_complete(&self) -> bool {
        self.debugger.step_complete()
    }

    pub fn step_end(&self) {
        self.debugger.step_end();
    }

    pub fn step_reset(&self) {
        self.debugger.step_reset();
    }

    pub fn bp_hit(&self) -> Option<u32> {
        self.debugger.bp_hit()
    }

    pub fn ack_bp_hit(&self) {
        self.debugger.ack_bp_hit();
    }

    // ------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------

    fn with_breakpoints<R>(
        &self,
        f: impl FnOnce(&SyncCtx<'_>, &mut BreakpointEngine) -> R,
    ) -> Result<R, BackendError> {
        let control = self
            .debugger
            .control()
            .ok_or(BackendError::NoDebugSupport)?;
        let system = self.debugger.system().ok_or(BackendError::NoDebugSupport)?;
        let ctx = SyncCtx {
            control: control.as_ref(),
            system: system.as_ref(),
        };
        let mut engine = self.debugger.breakpoints.lock();
        Ok(f(&ctx, &mut engine))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn bp_add(
        &self,
        address: u64,
        flags: BpFlags,
        enabled: bool,
        temporary: bool,
        condition: &str,
        cpu_id: &str,
    ) -> Result<u32, BackendError> {
        self.with_breakpoints(|ctx, engine| {
            engine.add(ctx, address, flags, enabled, temporary, condition, cpu_id)
        })?
        .ok_or(BackendError::SubscriptionFailed)
    }

    pub fn bp_delete(&self, id: u32) -> Result<bool, BackendError> {
        self.with_breakpoints(|ctx, engine| engine.delete(ctx, id))
    }

    pub fn bp_enable(&self, id: u32, enabled: bool) -> Result<bool, BackendError> {
        self.with_breakpoints(|ctx, engine| engine.enable(ctx, id, enabled))
    }

    pub fn bp_clear(&self) -> Result<(), BackendError> {
        self.with_breakpoints(|ctx, engine| engine.clear(ctx))
    }

    pub fn bp_list(&self) -> Vec<Breakpoint> {
        self.debugger.breakpoints.lock().list()
    }

    pub fn bp_count(&self) -> usize {
        self.debugger.breakpoints.lock().count()
    }

    pub fn bp_save(&self, path: &Path) -> Result<(), BackendError> {
        self.debugger.breakpoints.lock().save(path)?;
        Ok(())
    }

    pub fn bp_load(&self, path: &Path) -> Result<usize, BackendError> {
        self.with_breakpoints(|ctx, engine| engine.load(ctx, path))?
            .map_err(BackendError::from)
    }

    /// Drains deferred temporary-breakpoint deletions; the main loop calls
    /// this between frames, never from the event handler.
    pub fn bp_flush_deferred(&self) {
        if !self.debugger.breakpoints.lock().has_deferred() {
            return;
        }
        let _ = self.with_breakpoints(|ctx, engine| {
            for id in engine.take_deferred() {
                engine.delete(ctx, id);
            }
        });
    }

    // ------------------------------------------------------------------
    // Trace
    // ------------------------------------------------------------------

    pub fn trace_start(&self, path: Option<&Path>) -> Result<(), BackendError> {
        let control = self
            .debugger
            .control()
            .ok_or(BackendError::NoDebugSupport)?;
        let system = self.debugger.system().ok_or(BackendError::NoDebugSupport)?;

        let file = match path {
            Some(path) => Some(fs::File::create(path)?),
            None => None,
        };

        let sink = {
            let mut trace = self.debugger.trace.lock();
            trace.start(
                control.as_ref(),
                system.as_ref(),
                file,
                path.map(Path::to_path_buf),
            );
            trace.sink()
        };

        // Bring up the enabled platform trace options.
        if let Some(tracer) = &self.tracer {
            let enabled = self.sys_trace_enabled.lock().clone();
            for (index, on) in enabled.iter().enumerate() {
                if *on
                    && !tracer.option_start(index, control.as_ref(), system.as_ref(), sink.clone())
                {
                    tracing::warn!(index, "platform trace option failed to start");
                }
            }
        }
        Ok(())
    }

    pub fn trace_stop(&self) {
        let Some(control) = self.debugger.control() else {
            return;
        };
        if let Some(tracer) = &self.tracer {
            for index in 0..tracer.trace_options().len() {
                tracer.option_stop(index, control.as_ref());
            }
        }
        self.debugger.trace.lock().stop(control.as_ref());
    }

    pub fn trace_active(&self) -> bool {
        self.debugger.trace.lock().active()
    }

    pub fn trace_total_lines(&self) -> u64 {
        self.debugger.trace.lock().sink().total_lines()
    }

    pub fn trace_file_path(&self) -> Option<PathBuf> {
        self.debugger.trace.lock().sink().file_path()
    }

    pub fn trace_read_new(&self, max: usize) -> Vec<String> {
        let sink = self.debugger.trace.lock().sink();
        sink.read_new(max)
    }

    pub fn trace_cpu_enable(&self, cpu_id: &str, enable: bool) -> Result<bool, BackendError> {
        let control = self
            .debugger
            .control()
            .ok_or(BackendError::NoDebugSupport)?;
        let system = self.debugger.system().ok_or(BackendError::NoDebugSupport)?;
        Ok(self.debugger.trace.lock().cpu_enable(
            control.as_ref(),
            system.as_ref(),
            cpu_id,
            enable,
        ))
    }

    pub fn trace_cpu_enabled(&self, cpu_id: &str) -> bool {
        let Some(system) = self.debugger.system() else {
            return false;
        };
        self.debugger
            .trace
            .lock()
            .cpu_enabled(system.as_ref(), cpu_id)
    }

    pub fn trace_set_registers(&self, enable: bool) {
        self.debugger.trace.lock().set_registers(enable);
    }

    pub fn trace_registers(&self) -> bool {
        self.debugger.trace.lock().registers()
    }

    pub fn trace_set_indent(&self, enable: bool) {
        self.debugger.trace.lock().set_indent(enable);
    }

    pub fn trace_indent(&self) -> bool {
        self.debugger.trace.lock().indent()
    }

    pub fn trace_sys_options(&self) -> &'static [TraceOption] {
        self.tracer.as_ref().map_or(&[], |t| t.trace_options())
    }

    pub fn trace_sys_option_enabled(&self, index: usize) -> bool {
        self.sys_trace_enabled
            .lock()
            .get(index)
            .copied()
            .unwrap_or(false)
    }

    pub fn trace_sys_option_enable(&self, index: usize, enable: bool) -> Result<(), BackendError> {
        let tracer = self.tracer.as_ref().ok_or(BackendError::NoDebugSupport)?;
        if index >= tracer.trace_options().len() {
            return Err(BackendError::Message(format!(
                "unknown trace option: {index}"
            )));
        }
        {
            let mut enabled = self.sys_trace_enabled.lock();
            if enabled[index] == enable {
                return Ok(());
            }
            enabled[index] = enable;
        }

        // Apply immediately when a session is running.
        if self.trace_active() {
            let control = self
                .debugger
                .control()
                .ok_or(BackendError::NoDebugSupport)?;
            let system = self.debugger.system().ok_or(BackendError::NoDebugSupport)?;
            if enable {
                let sink = self.debugger.trace.lock().sink();
                if !tracer.option_start(index, control.as_ref(), system.as_ref(), sink) {
                    self.sys_trace_enabled.lock()[index] = false;
                    return Err(BackendError::SubscriptionFailed);
                }
            } else {
                tracer.option_stop(index, control.as_ref());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Symbols & search
    // ------------------------------------------------------------------

    pub fn symbols(&self) -> MutexGuard<'_, SymbolStore> {
        self.symbols.lock()
    }

    pub fn search(&self) -> MutexGuard<'_, SearchEngine> {
        self.search.lock()
    }

    // ------------------------------------------------------------------
    // GPU capture
    // ------------------------------------------------------------------

    pub fn capture(&self) -> Option<&Arc<GpuCapture>> {
        self.capture.as_ref()
    }

    pub fn capture_start(&self) -> Result<(), BackendError> {
        let capture = self
            .capture
            .as_ref()
            .ok_or_else(|| BackendError::Message("no GPU capture on this system".into()))?;
        let control = self
            .debugger
            .control()
            .ok_or(BackendError::NoDebugSupport)?;
        let system = self.debugger.system().ok_or(BackendError::NoDebugSupport)?;
        if capture.start(control.as_ref(), system.as_ref()) {
            Ok(())
        } else {
            Err(BackendError::Message(
                "capture start failed (already active, or no GP0/vram)".into(),
            ))
        }
    }

    pub fn capture_stop(&self) -> Result<(), BackendError> {
        let capture = self
            .capture
            .as_ref()
            .ok_or_else(|| BackendError::Message("no GPU capture on this system".into()))?;
        let control = self
            .debugger
            .control()
            .ok_or(BackendError::NoDebugSupport)?;
        capture.stop(control.as_ref());
        Ok(())
    }

    // ------------------------------------------------------------------
    // AV / input / state
    // ------------------------------------------------------------------

    pub fn sys_info(&self) -> &SystemInfo {
        &self.sys_info
    }

    pub fn av_info(&self) -> AvInfo {
        *self.av_info.lock()
    }

    /// Copy of the current frame: `(pixels, width, height)`.
    pub fn frame_snapshot(&self) -> (Vec<u32>, u32, u32) {
        let video = self.host.video.lock();
        let len = (video.width * video.height) as usize;
        (video.frame[..len].to_vec(), video.width, video.height)
    }

    /// The audio consumer handle; present until taken once.
    pub fn take_audio_reader(&self) -> Option<AudioReader> {
        self.audio_reader.lock().take()
    }

    pub fn set_mute(&self, mute: bool) {
        self.host.set_mute(mute);
    }

    pub fn muted(&self) -> bool {
        self.host.muted()
    }

    pub fn set_input(&self, id: u32, value: i16) {
        if let Some(slot) = self.host.input.lock().buttons.get_mut(id as usize) {
            *slot = value;
        }
    }

    pub fn input_fix(&self, id: u32, value: i16) {
        if let Some(slot) = self.host.input.lock().fixed.get_mut(id as usize) {
            *slot = Some(value);
        }
    }

    pub fn input_unfix(&self, id: u32) {
        if let Some(slot) = self.host.input.lock().fixed.get_mut(id as usize) {
            *slot = None;
        }
    }

    pub fn input_unfix_all(&self) {
        let mut input = self.host.input.lock();
        input.fixed = [None; 16];
        input.analog_fixed = [None; 4];
    }

    pub fn set_analog(&self, index: u32, axis: u32, value: i16) {
        if index <= 1 && axis <= 1 {
            self.host.input.lock().analog[(index * 2 + axis) as usize] = value;
        }
    }

    pub fn analog_fix(&self, index: u32, axis: u32, value: i16) {
        if index <= 1 && axis <= 1 {
            self.host.input.lock().analog_fixed[(index * 2 + axis) as usize] = Some(value);
        }
    }

    pub fn analog_unfix(&self, index: u32, axis: u32) {
        if index <= 1 && axis <= 1 {
            self.host.input.lock().analog_fixed[(index * 2 + axis) as usize] = None;
        }
    }

    pub fn set_manual_input(&self, on: bool) {
        self.host.input.lock().manual = on;
    }

    pub fn manual_input(&self) -> bool {
        self.host.input.lock().manual
    }

    pub fn controller_has_analog(&self) -> bool {
        self.host
            .env
            .lock()
            .controller_types
            .iter()
            .any(|t| t.id & device::TYPE_MASK == device::ANALOG)
    }

    fn state_path(&self, slot: i64) -> Result<PathBuf, BackendError> {
        if !(0..MAX_SAVE_SLOTS).contains(&slot) {
            return Err(BackendError::InvalidSlot(slot));
        }
        let base = self.rom_base().ok_or(BackendError::NoContentLoaded)?;
        Ok(PathBuf::from(format!("{}.{slot}.state", base.display())))
    }

    pub fn save_state(&self, slot: i64) -> Result<PathBuf, BackendError> {
        let path = self.state_path(slot)?;
        if self.blocked() {
            return Err(BackendError::CoreBlocked);
        }
        if self.core_state() != CoreState::Idle {
            return Err(BackendError::CoreBusy);
        }

        let mut core = self.core.lock();
        let size = core.serialize_size();
        if size == 0 {
            return Err(BackendError::SaveStateUnsupported);
        }
        let mut buffer = vec![0u8; size];
        let written = core
            .serialize(&mut buffer)
            .map_err(|e| BackendError::Message(e.to_string()))?;
        buffer.truncate(written);
        fs::write(&path, &buffer)?;
        tracing::info!(slot, path = %path.display(), "state saved");
        Ok(path)
    }

    pub fn load_state(&self, slot: i64) -> Result<PathBuf, BackendError> {
        let path = self.state_path(slot)?;
        if self.blocked() {
            return Err(BackendError::CoreBlocked);
        }
        if self.core_state() != CoreState::Idle {
            return Err(BackendError::CoreBusy);
        }

        let buffer = fs::read(&path)?;
        let mut core = self.core.lock();
        core.unserialize(&buffer)
            .map_err(|e| BackendError::Message(e.to_string()))?;
        tracing::info!(slot, path = %path.display(), "state loaded");
        Ok(path)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop_core_thread();
    }
}
