//! Memory region lookup and address resolution through memory maps.
//!
//! Regions form a graph: a CPU-addressable region's memory map can point
//! into backing regions (ROM banks, shadow RAM), which may themselves carry
//! maps. Resolution walks that graph to the deepest backing region so
//! annotations stick to the real storage, not the window it happens to be
//! mapped through. Sources can legitimately form cycles in hardware, so the
//! walk keeps a visited set.

use std::collections::HashSet;

use arret_abi::{Cpu, Memory, MemoryRef, System};

/// Finds a region by id: CPU-addressable regions first, then system
/// regions, then regions only reachable as memory-map sources.
pub fn find_memory_by_id(system: &dyn System, id: &str) -> Option<MemoryRef> {
    for cpu in system.cpus() {
        if let Some(mem) = cpu.memory()
            && mem.id() == id
        {
            return Some(mem);
        }
    }
    for mem in system.memory_regions() {
        if mem.id() == id {
            return Some(mem.clone());
        }
    }
    for cpu in system.cpus() {
        let Some(mem) = cpu.memory() else { continue };
        let Some(map) = mem.memory_map() else {
            continue;
        };
        for entry in map {
            if let Some(source) = entry.source
                && source.id() == id
            {
                return Some(source);
            }
        }
    }
    None
}

/// Every distinct region of the system, in discovery order.
pub fn collect_regions(system: &dyn System) -> Vec<MemoryRef> {
    let mut seen: Vec<MemoryRef> = Vec::new();
    let mut push_unique = |mem: MemoryRef, seen: &mut Vec<MemoryRef>| {
        if !seen.iter().any(|m| m.id() == mem.id()) {
            seen.push(mem);
        }
    };

    for cpu in system.cpus() {
        if let Some(mem) = cpu.memory() {
            push_unique(mem, &mut seen);
        }
    }
    for mem in system.memory_regions() {
        push_unique(mem.clone(), &mut seen);
    }
    for cpu in system.cpus() {
        let Some(mem) = cpu.memory() else { continue };
        let Some(map) = mem.memory_map() else {
            continue;
        };
        for entry in map {
            if let Some(source) = entry.source {
                push_unique(source, &mut seen);
            }
        }
    }
    seen
}

/// Result of resolving an address through memory maps: the deepest backing
/// region and the translated address within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddr {
    pub region_id: String,
    pub addr: u64,
}

/// Resolves `(region_id, addr)` to the deepest backing region.
///
/// Returns `None` when the region is unknown or the map graph cycles.
pub fn resolve(system: &dyn System, region_id: &str, addr: u64) -> Option<ResolvedAddr> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut cur_region = region_id.to_string();
    let mut cur_addr = addr;

    loop {
        if !visited.insert(cur_region.clone()) {
            return None; // cycle
        }

        let Some(mem) = find_memory_by_id(system, &cur_region) else {
            // First hop: the requested region does not exist at all.
            if visited.len() == 1 {
                return None;
            }
            break;
        };

        let Some(map) = mem.memory_map() else { break };
        if map.is_empty() {
            break;
        }

        let mut followed = false;
        for entry in map {
            if cur_addr >= entry.base_addr
                && cur_addr < entry.base_addr + entry.size
                && let Some(source) = entry.source
            {
                cur_addr = entry.source_base_addr + (cur_addr - entry.base_addr);
                cur_region = source.id().to_string();
                followed = true;
                break;
            }
        }
        if !followed {
            break;
        }
    }

    Some(ResolvedAddr {
        region_id: cur_region,
        addr: cur_addr,
    })
}

/// Resolves a banked address: asks the region where `addr` would point with
/// `bank` loaded, then continues ordinary resolution from there.
pub fn resolve_bank(
    system: &dyn System,
    region_id: &str,
    addr: u64,
    bank: i64,
) -> Option<ResolvedAddr> {
    let mem = find_memory_by_id(system, region_id)?;
    let entry = mem.bank_address(addr, bank)?;

    match entry.source {
        Some(source) => {
            let new_addr = entry.source_base_addr + (addr - entry.base_addr);
            resolve(system, source.id(), new_addr)
        }
        None => resolve(system, region_id, addr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MappedRegion, StaticSystem};
    use arret_abi::MemoryMapEntry;
    use std::sync::Arc;

    fn plain(id: &str, size: u64) -> Arc<MappedRegion> {
        MappedRegion::new(id, 0, size)
    }

    #[test]
    fn resolves_through_two_levels() {
        // cart window 0x4000-0x7FFF maps into rom bank 2, rom maps nowhere.
        let rom = plain("rom", 0x4_0000);
        let cart = plain("cart", 0x8000);
        cart.set_map(vec![
            MemoryMapEntry {
                base_addr: 0,
                size: 0x4000,
                source: Some(rom.clone()),
                source_base_addr: 0,
                bank: Some(0),
            },
            MemoryMapEntry {
                base_addr: 0x4000,
                size: 0x4000,
                source: Some(rom.clone()),
                source_base_addr: 2 * 0x4000,
                bank: Some(2),
            },
        ]);
        let system = StaticSystem::with_regions(vec![cart, rom]);

        let resolved = resolve(&system, "cart", 0x4123).unwrap();
        assert_eq!(resolved.region_id, "rom");
        assert_eq!(resolved.addr, 0x8123);
    }

    #[test]
    fn no_map_resolves_to_self() {
        let ram = plain("ram", 0x2000);
        let system = StaticSystem::with_regions(vec![ram]);
        let resolved = resolve(&system, "ram", 0x10).unwrap();
        assert_eq!(resolved.region_id, "ram");
        assert_eq!(resolved.addr, 0x10);
    }

    #[test]
    fn unknown_region_is_none() {
        let system = StaticSystem::with_regions(vec![plain("ram", 0x100)]);
        assert!(resolve(&system, "nope", 0).is_none());
    }

    #[test]
    fn cycle_is_detected() {
        let a = plain("a", 0x100);
        let b = plain("b", 0x100);
        a.set_map(vec![MemoryMapEntry {
            base_addr: 0,
            size: 0x100,
            source: Some(b.clone()),
            source_base_addr: 0,
            bank: None,
        }]);
        b.set_map(vec![MemoryMapEntry {
            base_addr: 0,
            size: 0x100,
            source: Some(a.clone()),
            source_base_addr: 0,
            bank: None,
        }]);
        let system = StaticSystem::with_regions(vec![a, b]);
        assert!(resolve(&system, "a", 0x40).is_none());
    }

    #[test]
    fn address_outside_all_windows_stops() {
        let rom = plain("rom", 0x4000);
        let cart = plain("cart", 0x8000);
        cart.set_map(vec![MemoryMapEntry {
            base_addr: 0,
            size: 0x4000,
            source: Some(rom.clone()),
            source_base_addr: 0,
            bank: None,
        }]);
        let system = StaticSystem::with_regions(vec![cart, rom]);
        let resolved = resolve(&system, "cart", 0x6000).unwrap();
        assert_eq!(resolved.region_id, "cart");
        assert_eq!(resolved.addr, 0x6000);
    }

    #[test]
    fn banked_resolution_uses_bank_window() {
        let rom = plain("rom", 0x4_0000);
        let cart = plain("cart", 0x8000);
        cart.set_bank_hook(|addr, bank| {
            (0x4000..0x8000).contains(&addr).then(|| MemoryMapEntry {
                base_addr: 0x4000,
                size: 0x4000,
                source: None,
                source_base_addr: 0,
                bank: Some(bank),
            })
        });
        // Without a source in the bank entry, resolution restarts from the
        // region itself; give cart a map so that lands in rom bank 1.
        cart.set_map(vec![MemoryMapEntry {
            base_addr: 0x4000,
            size: 0x4000,
            source: Some(rom.clone()),
            source_base_addr: 0x4000,
            bank: Some(1),
        }]);
        let system = StaticSystem::with_regions(vec![cart, rom]);

        let resolved = resolve_bank(&system, "cart", 0x4100, 1).unwrap();
        assert_eq!(resolved.region_id, "rom");
        assert_eq!(resolved.addr, 0x4100);
    }
}
