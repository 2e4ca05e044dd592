//! Nodal admittance matrix.
//!
//! The structural pattern is derived once from the topology: every connected
//! branch side emits its `(from, to)` / `(to, from)` entries, every bus gets
//! a diagonal entry, and the symbolic elimination inserts the fill-in entries
//! the LU factorisation will touch. The pattern is frozen afterwards; numeric
//! blocks are rebuilt additively whenever a branch or shunt parameter
//! changes. Sources are never folded in here — solvers apply them.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::param::MathModelParam;
use super::sparse::{block_mat_vec, BlockPattern};
use super::tensor::{ComplexTensor, Symmetry};
use super::topology::Topology;

/// Entry positions of the four blocks of one branch in the numeric array.
/// Disconnected sides leave entries unused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchEntries {
    pub ff: Option<usize>,
    pub ft: Option<usize>,
    pub tf: Option<usize>,
    pub tt: Option<usize>,
}

/// Frozen structural part of the Y-bus, shared between both symmetry
/// variants and the solvers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YBusStructure {
    pub pattern: BlockPattern,
    /// Per-branch contributor positions.
    pub branch_entries: Vec<BranchEntries>,
    /// Diagonal entry position of each shunt's bus.
    pub shunt_entries: Vec<usize>,
}

impl YBusStructure {
    pub fn new(topo: &Topology) -> Self {
        let n = topo.n_bus();
        let mut rows: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for branch in &topo.branch_bus_idx {
            if branch.from_connected() && branch.to_connected() {
                let f = branch.from as usize;
                let t = branch.to as usize;
                rows[f].insert(t);
                rows[t].insert(f);
            }
        }
        let pattern = BlockPattern::from_rows(rows);

        let branch_entries = topo
            .branch_bus_idx
            .iter()
            .map(|branch| {
                let f = branch.from;
                let t = branch.to;
                let both = branch.from_connected() && branch.to_connected();
                BranchEntries {
                    ff: branch
                        .from_connected()
                        .then(|| pattern.diag_entry[f as usize]),
                    ft: both.then(|| pattern.find(f as usize, t as usize).unwrap()),
                    tf: both.then(|| pattern.find(t as usize, f as usize).unwrap()),
                    tt: branch.to_connected().then(|| pattern.diag_entry[t as usize]),
                }
            })
            .collect();

        let mut shunt_entries = Vec::with_capacity(topo.shunts_per_bus.n_items());
        for (bus, range) in topo.shunts_per_bus.iter_groups() {
            for _ in range {
                shunt_entries.push(pattern.diag_entry[bus]);
            }
        }

        Self {
            pattern,
            branch_entries,
            shunt_entries,
        }
    }
}

/// Y-bus: shared structure plus mutable numeric blocks of one symmetry.
#[derive(Debug, Clone)]
pub struct YBus<S: Symmetry> {
    pub structure: Arc<YBusStructure>,
    pub blocks: Vec<S::Tensor>,
}

impl<S: Symmetry> YBus<S> {
    pub fn new(structure: Arc<YBusStructure>, param: &MathModelParam<S>) -> Self {
        let mut ybus = Self {
            blocks: vec![S::Tensor::zero(); structure.pattern.nnz()],
            structure,
        };
        ybus.refresh(param);
        ybus
    }

    pub fn n_bus(&self) -> usize {
        self.structure.pattern.n
    }

    /// Rebuilds the numeric blocks from the current parameters. Purely
    /// additive over the recorded contributor positions; the pattern never
    /// changes.
    pub fn refresh(&mut self, param: &MathModelParam<S>) {
        debug_assert_eq!(param.branch_param.len(), self.structure.branch_entries.len());
        debug_assert_eq!(param.shunt_param.len(), self.structure.shunt_entries.len());
        for block in &mut self.blocks {
            *block = S::Tensor::zero();
        }
        for (entries, p) in self
            .structure
            .branch_entries
            .iter()
            .zip(&param.branch_param)
        {
            if let Some(pos) = entries.ff {
                self.blocks[pos] += p.yff;
            }
            if let Some(pos) = entries.ft {
                self.blocks[pos] += p.yft;
            }
            if let Some(pos) = entries.tf {
                self.blocks[pos] += p.ytf;
            }
            if let Some(pos) = entries.tt {
                self.blocks[pos] += p.ytt;
            }
        }
        for (&pos, y) in self.structure.shunt_entries.iter().zip(&param.shunt_param) {
            self.blocks[pos] += *y;
        }
    }

    /// `I = Y·U`.
    pub fn mat_vec(&self, u: &[S::Complex]) -> Vec<S::Complex> {
        block_mat_vec(&self.structure.pattern, &self.blocks, u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::param::BranchCalcParam;
    use crate::basic::tensor::Symmetric;
    use crate::basic::topology::{BranchIdx, GroupedIdx};
    use num_complex::Complex64;

    fn test_topo() -> Topology {
        Topology {
            slack_bus: 0,
            phase_shift: vec![0.0; 3],
            branch_bus_idx: vec![BranchIdx::new(0, 1), BranchIdx::new(1, 2)],
            sources_per_bus: GroupedIdx::from_offsets(vec![0, 1, 1, 1]),
            shunts_per_bus: GroupedIdx::from_offsets(vec![0, 0, 0, 1]),
            load_gens_per_bus: GroupedIdx::from_offsets(vec![0, 0, 0, 0]),
            ..Default::default()
        }
    }

    fn radial_param(y0: Complex64, y1: Complex64, ys: Complex64) -> MathModelParam<Symmetric> {
        MathModelParam {
            branch_param: vec![
                BranchCalcParam {
                    yff: y0,
                    yft: -y0,
                    ytf: -y0,
                    ytt: y0,
                },
                BranchCalcParam {
                    yff: y1,
                    yft: -y1,
                    ytf: -y1,
                    ytt: y1,
                },
            ],
            shunt_param: vec![ys],
            source_param: vec![],
        }
    }

    #[test]
    fn test_structure_pattern() {
        let topo = test_topo();
        let structure = YBusStructure::new(&topo);
        let p = &structure.pattern;
        // radial 0-1-2: branch entries + diagonals, no fills in natural order
        assert!(p.find(0, 1).is_some());
        assert!(p.find(1, 0).is_some());
        assert!(p.find(1, 2).is_some());
        assert!(p.find(2, 1).is_some());
        assert!(p.find(0, 2).is_none());
        for bus in 0..3 {
            assert!(p.find(bus, bus).is_some());
        }
        // every off-diagonal entry has its reverse
        for i in 0..3 {
            for pos in p.row(i) {
                let j = p.col_indices[pos];
                assert!(p.find(j, i).is_some());
            }
        }
    }

    #[test]
    fn test_numeric_refresh() {
        let topo = test_topo();
        let structure = Arc::new(YBusStructure::new(&topo));
        let y0 = Complex64::new(1.0, -2.0);
        let y1 = Complex64::new(3.0, -4.0);
        let ys = Complex64::new(0.1, 0.05);
        let param = radial_param(y0, y1, ys);
        let ybus = YBus::<Symmetric>::new(structure.clone(), &param);

        let p = &structure.pattern;
        assert!((ybus.blocks[p.find(0, 0).unwrap()] - y0).norm() < 1e-12);
        assert!((ybus.blocks[p.find(1, 1).unwrap()] - (y0 + y1)).norm() < 1e-12);
        assert!((ybus.blocks[p.find(2, 2).unwrap()] - (y1 + ys)).norm() < 1e-12);
        assert!((ybus.blocks[p.find(0, 1).unwrap()] + y0).norm() < 1e-12);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let topo = test_topo();
        let structure = Arc::new(YBusStructure::new(&topo));
        let param = radial_param(
            Complex64::new(1.0, -2.0),
            Complex64::new(3.0, -4.0),
            Complex64::new(0.1, 0.05),
        );
        let mut ybus = YBus::<Symmetric>::new(structure, &param);
        let snapshot = ybus.blocks.clone();
        ybus.refresh(&param);
        assert_eq!(snapshot, ybus.blocks);
    }

    #[test]
    fn test_disconnected_branch_sides() {
        let mut topo = test_topo();
        topo.branch_bus_idx[1].to = crate::basic::topology::DISCONNECTED;
        let structure = YBusStructure::new(&topo);
        let entries = &structure.branch_entries[1];
        assert!(entries.ff.is_some());
        assert!(entries.ft.is_none());
        assert!(entries.tf.is_none());
        assert!(entries.tt.is_none());
        assert!(structure.pattern.find(1, 2).is_none());
    }
}
