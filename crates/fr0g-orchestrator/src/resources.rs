//! Component resource pool: per-component CPU/memory/bandwidth allocations
//! with capped scaling and rebalancing.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

/// Fraction of total CPU above which the rebalance loop compresses
/// everyone's allocation.
const REBALANCE_THRESHOLD: f64 = 0.9;
/// Compression factor applied on rebalance.
const REBALANCE_FACTOR: f64 = 0.9;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Allocation {
    /// CPU share, in fractional cores.
    pub cpu: f64,
    pub memory_bytes: u64,
    pub bandwidth_bps: u64,
}

/// Per-component allocations plus the pool totals.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    allocations: HashMap<String, Allocation>,
    totals: Allocation,
}

impl ResourcePool {
    pub fn new(totals: Allocation) -> Self {
        Self {
            allocations: HashMap::new(),
            totals,
        }
    }

    pub fn allocate(&mut self, component: &str, allocation: Allocation) {
        self.allocations.insert(component.to_string(), allocation);
    }

    pub fn get(&self, component: &str) -> Option<Allocation> {
        self.allocations.get(component).copied()
    }

    pub fn totals(&self) -> Allocation {
        self.totals
    }

    pub fn cpu_in_use(&self) -> f64 {
        self.allocations.values().map(|a| a.cpu).sum()
    }

    /// Multiply a component's CPU share by `cpu_boost`. When the boost would
    /// push the pool past its total, the grant is silently capped to the
    /// remaining headroom.
    pub fn scale(&mut self, component: &str, cpu_boost: f64) {
        let Some(current) = self.allocations.get(component).copied() else {
            return;
        };
        let others: f64 = self
            .allocations
            .iter()
            .filter(|(name, _)| name.as_str() != component)
            .map(|(_, a)| a.cpu)
            .sum();
        let headroom = (self.totals.cpu - others).max(0.0);
        let requested = current.cpu * cpu_boost.max(0.0);
        let granted = requested.min(headroom);
        if granted < requested {
            debug!(component, requested, granted, "scale request capped at pool total");
        }
        self.allocations.insert(
            component.to_string(),
            Allocation {
                cpu: granted,
                ..current
            },
        );
    }

    /// When CPU pressure exceeds 90 % of the total, compress every
    /// allocation by 10 %.
    pub fn rebalance(&mut self) -> bool {
        if self.cpu_in_use() <= REBALANCE_THRESHOLD * self.totals.cpu {
            return false;
        }
        for allocation in self.allocations.values_mut() {
            allocation.cpu *= REBALANCE_FACTOR;
        }
        debug!(cpu_in_use = self.cpu_in_use(), "resource pool rebalanced");
        true
    }

    /// Predictive pre-allocation: +10 % CPU to the cognitive component and
    /// +5 % to the workflow component, both subject to the usual cap.
    pub fn preallocate_for_load(&mut self) {
        self.scale("cognitive", 1.10);
        self.scale("workflow", 1.05);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ResourcePool {
        let mut pool = ResourcePool::new(Allocation {
            cpu: 8.0,
            memory_bytes: 16 << 30,
            bandwidth_bps: 1_000_000_000,
        });
        pool.allocate(
            "cognitive",
            Allocation {
                cpu: 2.0,
                memory_bytes: 4 << 30,
                bandwidth_bps: 100_000_000,
            },
        );
        pool.allocate(
            "workflow",
            Allocation {
                cpu: 2.0,
                memory_bytes: 4 << 30,
                bandwidth_bps: 100_000_000,
            },
        );
        pool
    }

    #[test]
    fn scale_multiplies_within_headroom() {
        let mut pool = pool();
        pool.scale("cognitive", 1.5);
        assert_eq!(pool.get("cognitive").unwrap().cpu, 3.0);
    }

    #[test]
    fn scale_is_silently_capped_at_total() {
        let mut pool = pool();
        pool.scale("cognitive", 100.0);
        // workflow holds 2.0, so cognitive can take at most 6.0.
        assert_eq!(pool.get("cognitive").unwrap().cpu, 6.0);
        assert!(pool.cpu_in_use() <= pool.totals().cpu);
    }

    #[test]
    fn scaling_unknown_component_is_a_no_op() {
        let mut pool = pool();
        pool.scale("ghost", 2.0);
        assert!(pool.get("ghost").is_none());
    }

    #[test]
    fn rebalance_fires_only_above_ninety_percent() {
        let mut pool = pool();
        assert!(!pool.rebalance());

        pool.scale("cognitive", 3.0); // 6.0 + 2.0 = 8.0 > 7.2
        assert!(pool.rebalance());
        let cpu = pool.cpu_in_use();
        assert!((cpu - 7.2).abs() < 1e-9);
    }

    #[test]
    fn predictive_preallocation_boosts_both_components() {
        let mut pool = pool();
        pool.preallocate_for_load();
        assert!((pool.get("cognitive").unwrap().cpu - 2.2).abs() < 1e-9);
        assert!((pool.get("workflow").unwrap().cpu - 2.1).abs() < 1e-9);
    }
}
