//! Bus/branch graph of one connected, energised math model, with CSR-style
//! groupings of the appliances and sensors attached to each bus or branch
//! side. Built once per grid snapshot and shared read-only by the Y-bus and
//! the solvers.

use serde::{Deserialize, Serialize};

use super::common::Idx;
use super::param::{BranchSide, LoadGenType};

/// Ground / disconnected terminal marker in [`BranchIdx`].
pub const DISCONNECTED: i64 = -1;

/// Terminal buses of a branch; either side may be [`DISCONNECTED`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchIdx {
    pub from: i64,
    pub to: i64,
}

impl BranchIdx {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub fn side(&self, side: BranchSide) -> i64 {
        match side {
            BranchSide::From => self.from,
            BranchSide::To => self.to,
        }
    }

    pub fn from_connected(&self) -> bool {
        self.from != DISCONNECTED
    }

    pub fn to_connected(&self) -> bool {
        self.to != DISCONNECTED
    }
}

/// Grouping of consecutively numbered items over groups, stored as CSR
/// offsets. `offsets` has one entry per group plus one, is non-decreasing and
/// counts items in group order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedIdx {
    offsets: Vec<usize>,
}

impl Default for GroupedIdx {
    fn default() -> Self {
        Self { offsets: vec![0] }
    }
}

impl GroupedIdx {
    pub fn from_offsets(offsets: Vec<usize>) -> Self {
        assert!(!offsets.is_empty(), "offsets must have n_groups + 1 entries");
        assert!(
            offsets.windows(2).all(|w| w[0] <= w[1]),
            "offsets must be non-decreasing"
        );
        Self { offsets }
    }

    /// Builds the grouping from the group number of each item. Items must be
    /// sorted by group.
    pub fn from_dense(groups: &[usize], n_groups: usize) -> Self {
        debug_assert!(groups.windows(2).all(|w| w[0] <= w[1]));
        let mut offsets = vec![0usize; n_groups + 1];
        for &g in groups {
            offsets[g + 1] += 1;
        }
        for i in 0..n_groups {
            offsets[i + 1] += offsets[i];
        }
        Self { offsets }
    }

    /// Builds the grouping from per-group item counts.
    pub fn from_counts(counts: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        let mut acc = 0;
        for &c in counts {
            acc += c;
            offsets.push(acc);
        }
        Self { offsets }
    }

    pub fn n_groups(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn n_items(&self) -> usize {
        *self.offsets.last().unwrap()
    }

    #[inline]
    pub fn group(&self, g: usize) -> std::ops::Range<usize> {
        self.offsets[g]..self.offsets[g + 1]
    }

    /// Group that contains `item`.
    pub fn group_of(&self, item: usize) -> usize {
        debug_assert!(item < self.n_items());
        match self.offsets.binary_search(&item) {
            // land on the first group whose range actually contains the item
            Ok(mut g) => {
                while self.offsets[g + 1] == item {
                    g += 1;
                }
                g
            }
            Err(g) => g - 1,
        }
    }

    pub fn iter_groups(&self) -> impl Iterator<Item = (usize, std::ops::Range<usize>)> + '_ {
        (0..self.n_groups()).map(move |g| (g, self.group(g)))
    }
}

/// Topology of one math model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    /// Bus whose angle provides the global reference.
    pub slack_bus: Idx,
    /// Cumulative phase reference of each bus in radians.
    pub phase_shift: Vec<f64>,
    pub branch_bus_idx: Vec<BranchIdx>,
    pub sources_per_bus: GroupedIdx,
    pub shunts_per_bus: GroupedIdx,
    pub load_gens_per_bus: GroupedIdx,
    pub load_gen_type: Vec<LoadGenType>,
    pub voltage_sensors_per_bus: GroupedIdx,
    pub power_sensors_per_bus: GroupedIdx,
    pub power_sensors_per_source: GroupedIdx,
    pub power_sensors_per_load_gen: GroupedIdx,
    pub power_sensors_per_shunt: GroupedIdx,
    pub power_sensors_per_branch_from: GroupedIdx,
    pub power_sensors_per_branch_to: GroupedIdx,
    pub current_sensors_per_branch_from: GroupedIdx,
    pub current_sensors_per_branch_to: GroupedIdx,
}

impl Topology {
    pub fn n_bus(&self) -> usize {
        self.phase_shift.len()
    }

    pub fn n_branch(&self) -> usize {
        self.branch_bus_idx.len()
    }

    /// Structural sanity of the groupings and branch indices; a violation is
    /// a construction bug.
    pub fn validate(&self) -> bool {
        let n = self.n_bus();
        if self.slack_bus >= n {
            return false;
        }
        if self
            .branch_bus_idx
            .iter()
            .any(|b| b.from == b.to && b.from_connected())
        {
            return false;
        }
        if self
            .branch_bus_idx
            .iter()
            .any(|b| b.from >= n as i64 || b.to >= n as i64)
        {
            return false;
        }
        self.sources_per_bus.n_groups() == n
            && self.shunts_per_bus.n_groups() == n
            && self.load_gens_per_bus.n_groups() == n
            && self.load_gen_type.len() == self.load_gens_per_bus.n_items()
    }
}
