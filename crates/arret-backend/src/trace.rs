//! Execution trace logging.
//!
//! One broad execution subscription per enabled CPU; every event is
//! disassembled and formatted into a bounded ring of lines (and optionally
//! a file). The ring is single-producer (core thread) / single-consumer
//! (UI thread); when the writer outruns the capacity the reader snaps
//! forward to the oldest line still held.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use arret_abi::{
    AddressRange, Cpu, CpuRef, DebugControl, Event, EventKind, Memory, StepKind, Subscription,
    SubscriptionId, System,
};
use arret_arch::registers;

/// Formatted lines longer than this are truncated.
pub const TRACE_LINE_MAX: usize = 256;
/// Ring capacity in lines.
pub const TRACE_RING_CAPACITY: usize = 1 << 16;

struct SinkInner {
    ring: Vec<String>,
    /// Next write position (monotonic).
    head: u64,
    /// Consumer read position (monotonic).
    read: u64,
    file: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

/// Line sink shared by the trace engine and platform trace options.
pub struct TraceSink {
    inner: Mutex<SinkInner>,
    total: AtomicU64,
}

impl TraceSink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                ring: Vec::new(),
                head: 0,
                read: 0,
                file: None,
                path: None,
            }),
            total: AtomicU64::new(0),
        }
    }

    /// Clears the ring and attaches an optional file sink.
    pub fn reset(&self, file: Option<File>, path: Option<PathBuf>) {
        let mut inner = self.inner.lock();
        inner.ring.clear();
        inner.head = 0;
        inner.read = 0;
        inner.file = file.map(BufWriter::new);
        inner.path = path;
        self.total.store(0, Ordering::Release);
    }

    pub fn log(&self, line: &str) {
        let mut truncated = line;
        if truncated.len() > TRACE_LINE_MAX {
            let mut cut = TRACE_LINE_MAX;
            while !truncated.is_char_boundary(cut) {
                cut -= 1;
            }
            truncated = &truncated[..cut];
        }

        let mut inner = self.inner.lock();
        let idx = (inner.head % TRACE_RING_CAPACITY as u64) as usize;
        if idx < inner.ring.len() {
            inner.ring[idx] = truncated.to_string();
        } else {
            inner.ring.push(truncated.to_string());
        }
        inner.head += 1;
        if let Some(file) = inner.file.as_mut() {
            let _ = writeln!(file, "{truncated}");
        }
        self.total.fetch_add(1, Ordering::Release);
    }

    /// Drains up to `max` unread lines. A wrapped ring snaps the read
    /// cursor forward to the oldest line still held.
    pub fn read_new(&self, max: usize) -> Vec<String> {
        let mut inner = self.inner.lock();
        let mut available = inner.head - inner.read;
        if available > TRACE_RING_CAPACITY as u64 {
            inner.read = inner.head - TRACE_RING_CAPACITY as u64;
            available = TRACE_RING_CAPACITY as u64;
        }

        let to_read = available.min(max as u64);
        let mut out = Vec::with_capacity(to_read as usize);
        for i in 0..to_read {
            let idx = ((inner.read + i) % TRACE_RING_CAPACITY as u64) as usize;
            out.push(inner.ring[idx].clone());
        }
        inner.read += to_read;
        out
    }

    /// Lines logged since the last reset (monotonic, may exceed the ring).
    pub fn total_lines(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    pub fn close_file(&self) {
        let mut inner = self.inner.lock();
        if let Some(mut file) = inner.file.take() {
            let _ = file.flush();
        }
        inner.path = None;
    }
}

impl Default for TraceSink {
    fn default() -> Self {
        Self::new()
    }
}

struct MmapCacheEntry {
    /// (base, size, bank) windows of the CPU's addressable region.
    windows: Vec<(u64, u64, Option<i64>)>,
    bank_width: usize,
    addr_width: usize,
}

struct TraceCpu {
    cpu: CpuRef,
    id: String,
    enabled: bool,
    sub: Option<SubscriptionId>,
    sp_reg: Option<u32>,
    mmap: MmapCacheEntry,
}

fn build_mmap(cpu: &CpuRef) -> MmapCacheEntry {
    let mut entry = MmapCacheEntry {
        windows: Vec::new(),
        bank_width: 0,
        addr_width: 4,
    };

    let Some(mem) = cpu.memory() else {
        return entry;
    };
    if mem.base_address() + mem.size() > 0x1_0000 {
        entry.addr_width = 8;
    }

    if let Some(map) = mem.memory_map() {
        let mut max_bank: i64 = -1;
        for window in map {
            if let Some(bank) = window.bank {
                max_bank = max_bank.max(bank);
            }
            entry.windows.push((window.base_addr, window.size, window.bank));
        }
        if max_bank >= 0 {
            entry.bank_width = 1;
            let mut v = max_bank;
            while v >= 10 {
                entry.bank_width += 1;
                v /= 10;
            }
        }
    }
    entry
}

fn bank_for_addr(mmap: &MmapCacheEntry, addr: u64) -> Option<i64> {
    mmap.windows
        .iter()
        .find(|(base, size, _)| addr >= *base && addr < base + size)
        .and_then(|(_, _, bank)| *bank)
}

/// Strip the `@` address markers from disassembly text (no symbol
/// interpolation in trace output).
fn strip_at_markers(text: &str) -> String {
    text.chars().filter(|c| *c != '@').collect()
}

pub struct TraceEngine {
    sink: Arc<TraceSink>,
    active: bool,
    registers: bool,
    indent: bool,
    cpus: Vec<TraceCpu>,
    sub_to_cpu: HashMap<SubscriptionId, usize>,
    /// Per-CPU enable settings; survive across trace sessions.
    cpu_settings: HashMap<String, bool>,
}

impl TraceEngine {
    pub fn new(sink: Arc<TraceSink>) -> Self {
        Self {
            sink,
            active: false,
            registers: false,
            indent: false,
            cpus: Vec::new(),
            sub_to_cpu: HashMap::new(),
            cpu_settings: HashMap::new(),
        }
    }

    pub fn sink(&self) -> Arc<TraceSink> {
        self.sink.clone()
    }

    fn sync_subscriptions(&mut self, control: &dyn DebugControl) {
        for tc in &mut self.cpus {
            if let Some(sub) = tc.sub.take() {
                control.unsubscribe(sub);
            }
        }
        self.sub_to_cpu.clear();

        if !self.active {
            return;
        }

        for (index, tc) in self.cpus.iter_mut().enumerate() {
            if !tc.enabled {
                continue;
            }
            let sub = control.subscribe(&Subscription::Execution {
                cpu: tc.cpu.clone(),
                step: StepKind::Step,
                range: AddressRange::BROAD,
            });
            if sub >= 0 {
                tc.sub = Some(sub);
                self.sub_to_cpu.insert(sub, index);
            } else {
                tracing::warn!(cpu = %tc.id, "trace: subscription failed");
            }
        }
    }

    fn populate_cpus(&mut self, system: &dyn System) {
        self.cpus.clear();
        for cpu in system.cpus() {
            let id = cpu.id().to_string();
            let enabled = self
                .cpu_settings
                .get(&id)
                .copied()
                .unwrap_or_else(|| cpu.is_main());
            self.cpus.push(TraceCpu {
                mmap: build_mmap(cpu),
                sp_reg: registers::sp_index(cpu.cpu_type()),
                cpu: cpu.clone(),
                id,
                enabled,
                sub: None,
            });
        }
    }

    /// Starts tracing; `file` mirrors every line when given.
    pub fn start(
        &mut self,
        control: &dyn DebugControl,
        system: &dyn System,
        file: Option<File>,
        path: Option<PathBuf>,
    ) -> bool {
        if self.active {
            self.stop(control);
        }

        self.sink.reset(file, path);
        self.populate_cpus(system);
        self.active = true;
        self.sync_subscriptions(control);

        tracing::info!(file = ?self.sink.file_path(), "trace started");
        true
    }

    pub fn stop(&mut self, control: &dyn DebugControl) {
        if !self.active {
            return;
        }
        self.active = false;
        self.sync_subscriptions(control);
        self.sink.close_file();
        tracing::info!(lines = self.sink.total_lines(), "trace stopped");
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Enables or disables a CPU by id (empty = primary). The setting
    /// persists across sessions; the live subscription set is updated when
    /// tracing is active.
    pub fn cpu_enable(
        &mut self,
        control: &dyn DebugControl,
        system: &dyn System,
        cpu_id: &str,
        enable: bool,
    ) -> bool {
        let resolved = if cpu_id.is_empty() {
            let Some(primary) = system.cpus().iter().find(|c| c.is_main()) else {
                return false;
            };
            primary.id().to_string()
        } else {
            cpu_id.to_string()
        };

        if !system.cpus().iter().any(|c| c.id() == resolved) {
            return false;
        }
        self.cpu_settings.insert(resolved.clone(), enable);

        if self.active
            && let Some(tc) = self.cpus.iter_mut().find(|tc| tc.id == resolved)
        {
            tc.enabled = enable;
            self.sync_subscriptions(control);
        }
        true
    }

    pub fn cpu_enabled(&self, system: &dyn System, cpu_id: &str) -> bool {
        let resolved = if cpu_id.is_empty() {
            match system.cpus().iter().find(|c| c.is_main()) {
                Some(primary) => primary.id().to_string(),
                None => return false,
            }
        } else {
            cpu_id.to_string()
        };

        if let Some(tc) = self.cpus.iter().find(|tc| tc.id == resolved) {
            return tc.enabled;
        }
        if let Some(setting) = self.cpu_settings.get(&resolved) {
            return *setting;
        }
        system
            .cpus()
            .iter()
            .find(|c| c.id() == resolved)
            .is_some_and(|c| c.is_main())
    }

    pub fn set_registers(&mut self, enable: bool) {
        self.registers = enable;
    }

    pub fn registers(&self) -> bool {
        self.registers
    }

    pub fn set_indent(&mut self, enable: bool) {
        self.indent = enable;
    }

    pub fn indent(&self) -> bool {
        self.indent
    }

    pub fn owns(&self, sub_id: SubscriptionId) -> bool {
        self.sub_to_cpu.contains_key(&sub_id)
    }

    /// Formats and logs one execution event. Never halts the core.
    pub fn log_event(&self, sub_id: SubscriptionId, event: &Event) {
        let EventKind::Execution { cpu, address: pc } = &event.kind else {
            return;
        };
        let Some(&cpu_idx) = self.sub_to_cpu.get(&sub_id) else {
            return;
        };
        let Some(tc) = self.cpus.get(cpu_idx) else {
            return;
        };
        let Some(mem) = cpu.memory() else { return };

        let cpu_type = cpu.cpu_type();
        let arch = arret_arch::arch_for_cpu(cpu_type);
        let max_insn = arch.map_or(4, |a| a.max_insn_size).min(16) as usize;
        let mut bytes = [0u8; 16];
        mem.peek_range(*pc, &mut bytes[..max_insn]);

        let insns = arret_arch::disassemble(&bytes[..max_insn], *pc, cpu_type);

        let mut line = String::with_capacity(96);

        // Indentation keyed to the stack depth.
        if self.indent
            && let Some(sp_reg) = tc.sp_reg
        {
            let sp = cpu.get_register(sp_reg);
            for _ in 0..(sp % 64) {
                line.push(' ');
            }
        }

        // Bank prefix, pre-sized to the largest bank number.
        if tc.mmap.bank_width > 0 {
            match bank_for_addr(&tc.mmap, *pc) {
                Some(bank) => {
                    line.push_str(&format!("{bank:>width$}:", width = tc.mmap.bank_width));
                }
                None => {
                    line.push_str(&format!("{:>width$} ", "", width = tc.mmap.bank_width));
                }
            }
        }

        line.push_str(&format!(
            "{pc:0width$X}: ",
            pc = pc,
            width = tc.mmap.addr_width
        ));

        match insns.first() {
            Some(insn) => line.push_str(&strip_at_markers(&insn.text)),
            None => line.push_str("???"),
        }

        if self.registers {
            line.push_str(" ; ");
            let pc_reg = registers::pc_index(cpu_type);
            let mut first = true;

            match arch.and_then(|a| a.trace_regs) {
                Some(trace_regs) => {
                    for tr in trace_regs {
                        if Some(tr.reg) == pc_reg {
                            continue;
                        }
                        let value = cpu.get_register(tr.reg);
                        if !first {
                            line.push(' ');
                        }
                        first = false;
                        let digits = (tr.bits / 4) as usize;
                        line.push_str(&format!("{}={value:0digits$X}", tr.name));
                    }
                }
                None => {
                    for n in 0..registers::reg_count(cpu_type) {
                        let Some(idx) = registers::reg_by_order(cpu_type, n) else {
                            continue;
                        };
                        if Some(idx) == pc_reg {
                            continue;
                        }
                        let Some(name) = registers::reg_name(cpu_type, idx) else {
                            continue;
                        };
                        let digits = registers::reg_digits(cpu_type, idx);
                        let value = cpu.get_register(idx);
                        if !first {
                            line.push(' ');
                        }
                        first = false;
                        line.push_str(&format!(
                            "{}={value:0digits$X}",
                            name.to_ascii_uppercase()
                        ));
                    }
                }
            }
        }

        self.sink.log(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drains_in_order() {
        let sink = TraceSink::new();
        sink.reset(None, None);
        for i in 0..5 {
            sink.log(&format!("line {i}"));
        }
        assert_eq!(sink.total_lines(), 5);
        let lines = sink.read_new(3);
        assert_eq!(lines, vec!["line 0", "line 1", "line 2"]);
        let rest = sink.read_new(100);
        assert_eq!(rest, vec!["line 3", "line 4"]);
        assert!(sink.read_new(10).is_empty());
    }

    #[test]
    fn overrun_snaps_read_cursor_forward() {
        let sink = TraceSink::new();
        sink.reset(None, None);
        let overrun = 100;
        for i in 0..TRACE_RING_CAPACITY + overrun {
            sink.log(&format!("{i}"));
        }
        let lines = sink.read_new(4);
        // Lost lines acknowledged: reading resumes at the oldest held line.
        assert_eq!(lines[0], overrun.to_string());
        assert_eq!(lines[3], (overrun + 3).to_string());
    }

    #[test]
    fn long_lines_are_truncated() {
        let sink = TraceSink::new();
        sink.reset(None, None);
        sink.log(&"x".repeat(1000));
        let lines = sink.read_new(1);
        assert_eq!(lines[0].len(), TRACE_LINE_MAX);
    }

    #[test]
    fn strip_markers() {
        assert_eq!(strip_at_markers("JP $@0150"), "JP $0150");
        assert_eq!(strip_at_markers("NOP"), "NOP");
    }
}
