//! Breakpoint storage and debug-ABI subscription sync.
//!
//! Records live in a map keyed by a monotonically increasing public id
//! (starts at 1, never reused). After any mutation the engine drops every
//! subscription it owns and re-subscribes the enabled records: one
//! execution watchpoint per `X` record, one memory watchpoint per `R|W`
//! record. A record whose subscriptions fail is rolled back by the mutating
//! call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use arret_abi::{
    AddressRange, Cpu, CpuRef, DebugControl, MemoryOp, Subscription, SubscriptionId, StepKind,
    System,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BpFlags: u8 {
        const EXECUTE = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
    }
}

impl BpFlags {
    /// `"XRW"`-style display, dashes for missing flags.
    pub fn display(self) -> String {
        let mut out = String::from("---");
        // String is ASCII here; indexing via replace_range keeps it simple.
        if self.contains(BpFlags::EXECUTE) {
            out.replace_range(0..1, "X");
        }
        if self.contains(BpFlags::READ) {
            out.replace_range(1..2, "R");
        }
        if self.contains(BpFlags::WRITE) {
            out.replace_range(2..3, "W");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub address: u64,
    pub enabled: bool,
    /// Auto-delete on first hit.
    pub temporary: bool,
    pub flags: BpFlags,
    /// Stored and persisted, currently never evaluated.
    pub condition: String,
    /// Empty = primary CPU.
    pub cpu_id: String,
}

/// Debug interface and topology a sync pass works against.
pub struct SyncCtx<'a> {
    pub control: &'a dyn DebugControl,
    pub system: &'a dyn System,
}

impl SyncCtx<'_> {
    fn find_cpu(&self, id: &str) -> Option<CpuRef> {
        if id.is_empty() {
            return self
                .system
                .cpus()
                .iter()
                .find(|c| c.is_main())
                .or_else(|| self.system.cpus().first())
                .cloned();
        }
        self.system.cpus().iter().find(|c| c.id() == id).cloned()
    }
}

#[derive(Default)]
pub struct BreakpointEngine {
    records: BTreeMap<u32, Breakpoint>,
    next_id: u32,
    sub_to_bp: HashMap<SubscriptionId, u32>,
    /// Record ids whose subscriptions failed during the last sync.
    sync_failed: HashSet<u32>,
    deferred_deletes: Vec<u32>,
    auto_save_path: Option<PathBuf>,
}

impl BreakpointEngine {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    fn auto_save(&self) {
        if let Some(path) = &self.auto_save_path
            && let Err(error) = self.save(path)
        {
            tracing::warn!(path = %path.display(), %error, "breakpoint auto-save failed");
        }
    }

    pub fn set_auto_save_path(&mut self, path: Option<PathBuf>) {
        self.auto_save_path = path;
    }

    fn sync(&mut self, ctx: &SyncCtx<'_>) {
        for sub_id in self.sub_to_bp.keys() {
            ctx.control.unsubscribe(*sub_id);
        }
        self.sub_to_bp.clear();
        self.sync_failed.clear();

        for (id, bp) in &self.records {
            if !bp.enabled {
                continue;
            }
            let Some(cpu) = ctx.find_cpu(&bp.cpu_id) else {
                continue;
            };

            if bp.flags.contains(BpFlags::EXECUTE) {
                let sub_id = ctx.control.subscribe(&Subscription::Execution {
                    cpu: cpu.clone(),
                    step: StepKind::Step,
                    range: AddressRange::point(bp.address),
                });
                if sub_id >= 0 {
                    self.sub_to_bp.insert(sub_id, *id);
                } else {
                    self.sync_failed.insert(*id);
                }
            }

            if bp.flags.intersects(BpFlags::READ | BpFlags::WRITE) {
                let Some(memory) = cpu.memory() else {
                    self.sync_failed.insert(*id);
                    continue;
                };
                let mut op = MemoryOp::empty();
                if bp.flags.contains(BpFlags::READ) {
                    op |= MemoryOp::READ;
                }
                if bp.flags.contains(BpFlags::WRITE) {
                    op |= MemoryOp::WRITE;
                }

                let sub_id = ctx.control.subscribe(&Subscription::Memory {
                    memory,
                    range: AddressRange::point(bp.address),
                    op,
                });
                if sub_id >= 0 {
                    self.sub_to_bp.insert(sub_id, *id);
                } else {
                    self.sync_failed.insert(*id);
                }
            }
        }
    }

    /// Adds a record; returns its id, or `None` when the subscription was
    /// rejected (the record is rolled back).
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        ctx: &SyncCtx<'_>,
        address: u64,
        flags: BpFlags,
        enabled: bool,
        temporary: bool,
        condition: &str,
        cpu_id: &str,
    ) -> Option<u32> {
        let id = self.next_id;
        self.next_id += 1;

        self.records.insert(
            id,
            Breakpoint {
                id,
                address,
                enabled,
                temporary,
                flags,
                condition: condition.to_string(),
                cpu_id: cpu_id.to_string(),
            },
        );
        self.sync(ctx);

        if self.sync_failed.contains(&id) {
            self.records.remove(&id);
            self.sync(ctx);
            return None;
        }

        self.auto_save();
        Some(id)
    }

    pub fn delete(&mut self, ctx: &SyncCtx<'_>, id: u32) -> bool {
        if self.records.remove(&id).is_none() {
            return false;
        }
        self.sync(ctx);
        self.auto_save();
        true
    }

    pub fn enable(&mut self, ctx: &SyncCtx<'_>, id: u32, enabled: bool) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        let previous = record.enabled;
        record.enabled = enabled;
        self.sync(ctx);

        if self.sync_failed.contains(&id) {
            self.records.get_mut(&id).unwrap().enabled = previous;
            self.sync(ctx);
            return false;
        }

        self.auto_save();
        true
    }

    pub fn set_temporary(&mut self, id: u32, temporary: bool) -> bool {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.temporary = temporary;
                self.auto_save();
                true
            }
            None => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn replace(
        &mut self,
        ctx: &SyncCtx<'_>,
        id: u32,
        address: u64,
        flags: BpFlags,
        enabled: bool,
        temporary: bool,
        condition: &str,
        cpu_id: &str,
    ) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        let previous = record.clone();
        record.address = address;
        record.flags = flags;
        record.enabled = enabled;
        record.temporary = temporary;
        record.condition = condition.to_string();
        record.cpu_id = cpu_id.to_string();
        self.sync(ctx);

        if self.sync_failed.contains(&id) {
            *self.records.get_mut(&id).unwrap() = previous;
            self.sync(ctx);
            return false;
        }

        self.auto_save();
        true
    }

    pub fn get(&self, id: u32) -> Option<&Breakpoint> {
        self.records.get(&id)
    }

    pub fn list(&self) -> Vec<Breakpoint> {
        self.records.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self, ctx: &SyncCtx<'_>) {
        self.records.clear();
        self.sync(ctx);
        self.auto_save();
    }

    /// Whether the subscription belongs to a breakpoint.
    pub fn owns(&self, sub_id: SubscriptionId) -> bool {
        self.sub_to_bp.contains_key(&sub_id)
    }

    pub fn sub_to_id(&self, sub_id: SubscriptionId) -> Option<u32> {
        self.sub_to_bp.get(&sub_id).copied()
    }

    /// Number of currently-alive subscriptions (one per enabled `X` record
    /// plus one per enabled `R|W` record).
    pub fn subscription_count(&self) -> usize {
        self.sub_to_bp.len()
    }

    /// Queues a delete that is unsafe to run inside the event handler;
    /// drained by the main loop between frames.
    pub fn defer_delete(&mut self, id: u32) {
        self.deferred_deletes.push(id);
    }

    pub fn take_deferred(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.deferred_deletes)
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred_deletes.is_empty()
    }

    /// One record per line: `[cpu.]HEXADDR FLAGS [condition]`, flags drawn
    /// from `XRW` plus `t` (temporary) and `d` (disabled).
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut out = String::new();
        for bp in self.records.values() {
            if !bp.cpu_id.is_empty() {
                out.push_str(&bp.cpu_id);
                out.push('.');
            }
            out.push_str(&format!("{:04X} ", bp.address));
            if bp.flags.contains(BpFlags::EXECUTE) {
                out.push('X');
            }
            if bp.flags.contains(BpFlags::READ) {
                out.push('R');
            }
            if bp.flags.contains(BpFlags::WRITE) {
                out.push('W');
            }
            if bp.temporary {
                out.push('t');
            }
            if !bp.enabled {
                out.push('d');
            }
            if !bp.condition.is_empty() {
                out.push(' ');
                out.push_str(&bp.condition);
            }
            out.push('\n');
        }
        fs::write(path, out)?;
        tracing::info!(count = self.records.len(), path = %path.display(), "saved breakpoints");
        Ok(())
    }

    /// Replaces the current set with the file's records. Blank lines, `#`
    /// comments, and malformed lines are skipped; flag letters are
    /// case-insensitive. Ids are allocated fresh.
    pub fn load(&mut self, ctx: &SyncCtx<'_>, path: &Path) -> io::Result<usize> {
        let data = fs::read_to_string(path)?;

        let saved_path = self.auto_save_path.take();
        self.records.clear();
        self.sync(ctx);

        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(parsed) = parse_record_line(line) else {
                continue;
            };
            self.add(
                ctx,
                parsed.address,
                parsed.flags,
                parsed.enabled,
                parsed.temporary,
                &parsed.condition,
                &parsed.cpu_id,
            );
        }

        self.auto_save_path = saved_path;
        tracing::info!(count = self.records.len(), path = %path.display(), "loaded breakpoints");
        Ok(self.records.len())
    }

    /// Loads from the auto-save path if the file exists.
    pub fn auto_load(&mut self, ctx: &SyncCtx<'_>) {
        if let Some(path) = self.auto_save_path.clone()
            && path.exists()
        {
            let _ = self.load(ctx, &path);
        }
    }
}

struct ParsedRecord {
    address: u64,
    flags: BpFlags,
    enabled: bool,
    temporary: bool,
    condition: String,
    cpu_id: String,
}

fn parse_record_line(line: &str) -> Option<ParsedRecord> {
    let mut tokens = line.split_whitespace();
    let addr_token = tokens.next()?;
    let flags_token = tokens.next()?;
    let condition = tokens.collect::<Vec<_>>().join(" ");

    let (cpu_id, addr_str) = match addr_token.split_once('.') {
        Some((cpu, rest)) if !cpu.is_empty() => (cpu.to_string(), rest),
        _ => (String::new(), addr_token),
    };
    let address = u64::from_str_radix(addr_str, 16).ok()?;

    let mut flags = BpFlags::empty();
    let mut enabled = true;
    let mut temporary = false;
    for c in flags_token.chars() {
        match c.to_ascii_uppercase() {
            'X' => flags |= BpFlags::EXECUTE,
            'R' => flags |= BpFlags::READ,
            'W' => flags |= BpFlags::WRITE,
            'D' => enabled = false,
            'T' => temporary = true,
            _ => return None,
        }
    }

    Some(ParsedRecord {
        address,
        flags,
        enabled,
        temporary,
        condition,
        cpu_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arret_abi::{DebugControlRef, SystemRef};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    use crate::testing::{MappedRegion, StaticSystem};

    /// Records subscriptions; optionally rejects one subscription kind.
    struct FakeControl {
        system: SystemRef,
        next: AtomicI64,
        alive: Mutex<Vec<SubscriptionId>>,
        reject_memory: bool,
    }

    impl DebugControl for FakeControl {
        fn system(&self) -> SystemRef {
            self.system.clone()
        }
        fn subscribe(&self, subscription: &Subscription) -> SubscriptionId {
            if self.reject_memory && matches!(subscription, Subscription::Memory { .. }) {
                return -1;
            }
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            self.alive.lock().push(id);
            id
        }
        fn unsubscribe(&self, id: SubscriptionId) {
            self.alive.lock().retain(|&s| s != id);
        }
    }

    struct TestCpu {
        mem: arret_abi::MemoryRef,
    }

    impl Cpu for TestCpu {
        fn id(&self) -> &str {
            "sm83"
        }
        fn description(&self) -> &str {
            "cpu"
        }
        fn cpu_type(&self) -> arret_abi::CpuType {
            arret_abi::CpuType::LR35902
        }
        fn is_main(&self) -> bool {
            true
        }
        fn memory(&self) -> Option<arret_abi::MemoryRef> {
            Some(self.mem.clone())
        }
        fn get_register(&self, _reg: u32) -> u64 {
            0
        }
        fn set_register(&self, _reg: u32, _value: u64) -> bool {
            false
        }
    }

    fn fixture(reject_memory: bool) -> (Arc<FakeControl>, SystemRef) {
        let mem = MappedRegion::new("mem", 0, 0x1_0000);
        let cpu = Arc::new(TestCpu {
            mem: mem as arret_abi::MemoryRef,
        });
        let system: SystemRef = Arc::new(StaticSystem::new(
            "gb",
            vec![cpu as CpuRef],
            Vec::new(),
            Vec::new(),
        ));
        let control = Arc::new(FakeControl {
            system: system.clone(),
            next: AtomicI64::new(1),
            alive: Mutex::new(Vec::new()),
            reject_memory,
        });
        (control, system)
    }

    #[test]
    fn ids_are_monotone_and_never_reused() {
        let (control, system) = fixture(false);
        let ctx = SyncCtx {
            control: control.as_ref(),
            system: system.as_ref(),
        };
        let mut engine = BreakpointEngine::new();

        let a = engine.add(&ctx, 0x100, BpFlags::EXECUTE, true, false, "", "").unwrap();
        let b = engine.add(&ctx, 0x200, BpFlags::EXECUTE, true, false, "", "").unwrap();
        assert!(b > a);
        engine.delete(&ctx, b);
        let c = engine.add(&ctx, 0x300, BpFlags::EXECUTE, true, false, "", "").unwrap();
        assert!(c > b);
    }

    #[test]
    fn two_breakpoints_same_address_disjoint_flags() {
        let (control, system) = fixture(false);
        let ctx = SyncCtx {
            control: control.as_ref(),
            system: system.as_ref(),
        };
        let mut engine = BreakpointEngine::new();

        let x = engine.add(&ctx, 0x4000, BpFlags::EXECUTE, true, false, "", "").unwrap();
        let w = engine.add(&ctx, 0x4000, BpFlags::WRITE, true, false, "", "").unwrap();
        assert_ne!(x, w);

        let list = engine.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].flags, BpFlags::EXECUTE);
        assert_eq!(list[1].flags, BpFlags::WRITE);
        assert_eq!(engine.subscription_count(), 2);
        assert_eq!(control.alive.lock().len(), 2);

        engine.delete(&ctx, x);
        assert_eq!(engine.subscription_count(), 1);
        assert_eq!(control.alive.lock().len(), 1);
    }

    #[test]
    fn alive_subscriptions_match_enabled_records() {
        let (control, system) = fixture(false);
        let ctx = SyncCtx {
            control: control.as_ref(),
            system: system.as_ref(),
        };
        let mut engine = BreakpointEngine::new();

        let a = engine
            .add(&ctx, 0x100, BpFlags::EXECUTE | BpFlags::WRITE, true, false, "", "")
            .unwrap();
        engine.add(&ctx, 0x200, BpFlags::READ, true, false, "", "").unwrap();

        // X+W record owns two subscriptions, R record one.
        assert_eq!(engine.subscription_count(), 3);

        engine.enable(&ctx, a, false);
        assert_eq!(engine.subscription_count(), 1);
        engine.enable(&ctx, a, true);
        assert_eq!(engine.subscription_count(), 3);
        assert_eq!(control.alive.lock().len(), 3);
    }

    #[test]
    fn failed_subscription_rolls_back_add() {
        let (control, system) = fixture(true);
        let ctx = SyncCtx {
            control: control.as_ref(),
            system: system.as_ref(),
        };
        let mut engine = BreakpointEngine::new();

        assert!(engine.add(&ctx, 0x100, BpFlags::WRITE, true, false, "", "").is_none());
        assert_eq!(engine.count(), 0);
        assert_eq!(engine.subscription_count(), 0);
        assert!(control.alive.lock().is_empty());

        // Execution subscriptions still work and ids keep increasing.
        let id = engine.add(&ctx, 0x100, BpFlags::EXECUTE, true, false, "", "").unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn sub_routing_finds_the_record() {
        let (control, system) = fixture(false);
        let ctx = SyncCtx {
            control: control.as_ref(),
            system: system.as_ref(),
        };
        let mut engine = BreakpointEngine::new();
        let id = engine.add(&ctx, 0x123, BpFlags::EXECUTE, true, false, "", "").unwrap();

        let sub = *control.alive.lock().first().unwrap();
        assert!(engine.owns(sub));
        assert_eq!(engine.sub_to_id(sub), Some(id));
        assert!(!engine.owns(sub + 999));
    }

    #[test]
    fn save_load_round_trips_modulo_ids() {
        let (control, system) = fixture(false);
        let ctx = SyncCtx {
            control: control.as_ref(),
            system: system.as_ref(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.bp");

        let mut engine = BreakpointEngine::new();
        engine.add(&ctx, 0x0150, BpFlags::EXECUTE, true, false, "a == 5", "").unwrap();
        engine
            .add(&ctx, 0xC000, BpFlags::READ | BpFlags::WRITE, false, true, "", "sm83")
            .unwrap();
        engine.save(&path).unwrap();

        let mut restored = BreakpointEngine::new();
        assert_eq!(restored.load(&ctx, &path).unwrap(), 2);
        let list = restored.list();
        assert_eq!(list[0].address, 0x0150);
        assert_eq!(list[0].flags, BpFlags::EXECUTE);
        assert_eq!(list[0].condition, "a == 5");
        assert!(list[0].enabled);
        assert_eq!(list[1].address, 0xC000);
        assert_eq!(list[1].flags, BpFlags::READ | BpFlags::WRITE);
        assert!(!list[1].enabled);
        assert!(list[1].temporary);
        assert_eq!(list[1].cpu_id, "sm83");
    }

    #[test]
    fn load_tolerates_comments_and_junk() {
        let (control, system) = fixture(false);
        let ctx = SyncCtx {
            control: control.as_ref(),
            system: system.as_ref(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messy.bp");
        fs::write(&path, "# comment\n\n0150 x\nnot hex line\n0200 rwd\n0300 Q\n").unwrap();

        let mut engine = BreakpointEngine::new();
        assert_eq!(engine.load(&ctx, &path).unwrap(), 2);
        let list = engine.list();
        assert_eq!(list[0].address, 0x150);
        assert_eq!(list[0].flags, BpFlags::EXECUTE);
        assert_eq!(list[1].address, 0x200);
        assert!(!list[1].enabled);
    }

    #[test]
    fn deferred_deletes_accumulate_until_taken() {
        let mut engine = BreakpointEngine::new();
        engine.defer_delete(3);
        engine.defer_delete(7);
        assert!(engine.has_deferred());
        assert_eq!(engine.take_deferred(), vec![3, 7]);
        assert!(!engine.has_deferred());
        assert!(engine.take_deferred().is_empty());
    }

    #[test]
    fn flags_display() {
        assert_eq!(BpFlags::EXECUTE.display(), "X--");
        assert_eq!((BpFlags::READ | BpFlags::WRITE).display(), "-RW");
        assert_eq!(BpFlags::empty().display(), "---");
    }
}
