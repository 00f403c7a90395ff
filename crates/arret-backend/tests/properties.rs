//! Property tests: breakpoint subscription sync and memory-map resolution.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use proptest::prelude::*;

use arret_abi::{
    Cpu, CpuRef, CpuType, DebugControl, MemoryMapEntry, MemoryRef, Subscription, SubscriptionId,
    SystemRef,
};
use arret_backend::breakpoint::{BpFlags, BreakpointEngine, SyncCtx};
use arret_backend::memmap;
use arret_backend::testing::{MappedRegion, StaticSystem};

struct FakeControl {
    system: SystemRef,
    next: AtomicI64,
    alive: Mutex<Vec<SubscriptionId>>,
}

impl DebugControl for FakeControl {
    fn system(&self) -> SystemRef {
        self.system.clone()
    }
    fn subscribe(&self, _subscription: &Subscription) -> SubscriptionId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.alive.lock().push(id);
        id
    }
    fn unsubscribe(&self, id: SubscriptionId) {
        self.alive.lock().retain(|&s| s != id);
    }
}

struct TestCpu {
    mem: MemoryRef,
}

impl Cpu for TestCpu {
    fn id(&self) -> &str {
        "cpu0"
    }
    fn description(&self) -> &str {
        "cpu"
    }
    fn cpu_type(&self) -> CpuType {
        CpuType::LR35902
    }
    fn is_main(&self) -> bool {
        true
    }
    fn memory(&self) -> Option<MemoryRef> {
        Some(self.mem.clone())
    }
    fn get_register(&self, _reg: u32) -> u64 {
        0
    }
    fn set_register(&self, _reg: u32, _value: u64) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
enum BpOp {
    Add { addr: u16, flags: u8, enabled: bool },
    Delete { pick: usize },
    Toggle { pick: usize, enabled: bool },
    Clear,
}

fn bp_op() -> impl Strategy<Value = BpOp> {
    prop_oneof![
        (any::<u16>(), 1u8..8, any::<bool>())
            .prop_map(|(addr, flags, enabled)| BpOp::Add { addr, flags, enabled }),
        (0usize..16).prop_map(|pick| BpOp::Delete { pick }),
        (0usize..16, any::<bool>()).prop_map(|(pick, enabled)| BpOp::Toggle { pick, enabled }),
        Just(BpOp::Clear),
    ]
}

fn expected_subscriptions(engine: &BreakpointEngine) -> usize {
    engine
        .list()
        .iter()
        .filter(|bp| bp.enabled)
        .map(|bp| {
            usize::from(bp.flags.contains(BpFlags::EXECUTE))
                + usize::from(bp.flags.intersects(BpFlags::READ | BpFlags::WRITE))
        })
        .sum()
}

proptest! {
    /// After any mutation sequence, the alive subscription set is exactly
    /// what the enabled records require.
    #[test]
    fn breakpoint_sync_invariant(ops in proptest::collection::vec(bp_op(), 1..40)) {
        let mem = MappedRegion::new("mem", 0, 0x1_0000);
        let cpu = Arc::new(TestCpu { mem: mem as MemoryRef });
        let system: SystemRef = Arc::new(StaticSystem::new(
            "gb",
            vec![cpu as CpuRef],
            Vec::new(),
            Vec::new(),
        ));
        let control = FakeControl {
            system: system.clone(),
            next: AtomicI64::new(1),
            alive: Mutex::new(Vec::new()),
        };
        let ctx = SyncCtx { control: &control, system: system.as_ref() };
        let mut engine = BreakpointEngine::new();
        let mut last_id = 0u32;

        for op in ops {
            match op {
                BpOp::Add { addr, flags, enabled } => {
                    let flags = BpFlags::from_bits_truncate(flags);
                    if let Some(id) = engine.add(&ctx, u64::from(addr), flags, enabled, false, "", "") {
                        prop_assert!(id > last_id, "ids must be strictly increasing");
                        last_id = id;
                    }
                }
                BpOp::Delete { pick } => {
                    let ids: Vec<u32> = engine.list().iter().map(|bp| bp.id).collect();
                    if !ids.is_empty() {
                        engine.delete(&ctx, ids[pick % ids.len()]);
                    }
                }
                BpOp::Toggle { pick, enabled } => {
                    let ids: Vec<u32> = engine.list().iter().map(|bp| bp.id).collect();
                    if !ids.is_empty() {
                        engine.enable(&ctx, ids[pick % ids.len()], enabled);
                    }
                }
                BpOp::Clear => engine.clear(&ctx),
            }

            prop_assert_eq!(engine.subscription_count(), expected_subscriptions(&engine));
            prop_assert_eq!(control.alive.lock().len(), engine.subscription_count());
        }
    }

    /// Resolution over arbitrary memory-map graphs terminates; cycles are
    /// rejected and successful results name a real region.
    #[test]
    fn resolution_terminates_on_random_graphs(
        edges in proptest::collection::vec((0usize..6, 0usize..6), 0..12),
        start in 0usize..6,
        addr in 0u64..0x100,
    ) {
        let regions: Vec<Arc<MappedRegion>> = (0..6)
            .map(|i| MappedRegion::new(format!("r{i}"), 0, 0x100))
            .collect();

        // Each (from, to) edge maps `from`'s whole window onto `to`.
        for (from, to) in &edges {
            regions[*from].set_map(vec![MemoryMapEntry {
                base_addr: 0,
                size: 0x100,
                source: Some(regions[*to].clone()),
                source_base_addr: 0,
                bank: None,
            }]);
        }

        let system = StaticSystem::with_regions(regions.clone());
        let result = memmap::resolve(&system, &format!("r{start}"), addr);

        if let Some(resolved) = result {
            prop_assert!(resolved.region_id.starts_with('r'));
            prop_assert!(memmap::find_memory_by_id(&system, &resolved.region_id).is_some());
            prop_assert_eq!(resolved.addr, addr);
        }
    }
}
