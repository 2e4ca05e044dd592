//! Short-circuit solver.
//!
//! The pre-fault state is the flat source voltage; faults embed into the
//! nodal equations of the faulted bus, per phase, either as added fault
//! admittance (finite fault impedance) or as replaced constraint rows
//! (direct short, the `Z_fault = 0` limit). Fault currents come out of the
//! residual of the unmodified equations.

use num_complex::Complex64;

use crate::basic::common::*;
use crate::basic::error::GridError;
use crate::basic::param::*;
use crate::basic::sparse::{block_mat_vec, SparseLuSolver};
use crate::basic::tensor::*;
use crate::basic::topology::Topology;
use crate::basic::ybus::YBus;

use super::*;

pub fn run_short_circuit<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    input: &ShortCircuitInput,
) -> Result<ShortCircuitSolverOutput<S>, GridError> {
    let n = topo.n_bus();
    let pattern = &y_bus.structure.pattern;
    let (y_src, i_ref) = source_norton(topo, param, &input.source, |_| true);

    let mut base = y_bus.blocks.clone();
    for bus in 0..n {
        base[pattern.diag_entry[bus]] += y_src[bus];
    }

    // fault-modified copy of matrix and right-hand side
    let mut blocks = base.clone();
    let mut rhs = i_ref.clone();
    for (bus, range) in input.fault_buses.iter_groups() {
        for fault in range {
            apply_fault::<S>(&input.faults[fault], bus, pattern, &mut blocks, &mut rhs)?;
        }
    }

    let mut solver = SparseLuSolver::<S::Tensor>::new();
    solver.factorize_and_solve(pattern, &blocks, &mut rhs)?;
    let u = rhs;
    check_voltage_finite::<S>(&u, 1)?;

    // fault currents: residual of the unmodified nodal equations, masked to
    // the participating phases
    let i_net = block_mat_vec(pattern, &base, &u);
    let mut fault_output = Vec::with_capacity(input.faults.len());
    for (bus, range) in input.fault_buses.iter_groups() {
        for fault in range {
            let f = &input.faults[fault];
            let phase = effective_fault_phase(f.fault_type, f.fault_phase);
            let residual = i_ref[bus] - i_net[bus];
            let mut i_fault = S::Complex::zero();
            for p in fault_phase_indices(phase)? {
                i_fault.set_comp(p, residual.comp(p));
            }
            fault_output.push(FaultSolverOutput { i_fault });
        }
    }

    let branch = topo
        .branch_bus_idx
        .iter()
        .zip(&param.branch_param)
        .map(|(idx, p)| {
            let u_f = if idx.from_connected() {
                u[idx.from as usize]
            } else {
                S::Complex::zero()
            };
            let u_t = if idx.to_connected() {
                u[idx.to as usize]
            } else {
                S::Complex::zero()
            };
            BranchShortCircuitSolverOutput {
                i_f: p.yff.mv(u_f) + p.yft.mv(u_t),
                i_t: p.ytf.mv(u_f) + p.ytt.mv(u_t),
            }
        })
        .collect();

    let mut source = Vec::with_capacity(param.source_param.len());
    for (bus, range) in topo.sources_per_bus.iter_groups() {
        for s_idx in range {
            let y_ref = param.source_param[s_idx].math_param::<S>();
            let i = y_ref.mv(S::embed(input.source[s_idx]) - u[bus]);
            source.push(SourceShortCircuitSolverOutput { i });
        }
    }

    Ok(ShortCircuitSolverOutput {
        u_bus: u,
        branch,
        fault: fault_output,
        source,
    })
}

/// Embeds one fault into the nodal equations of its bus.
fn apply_fault<S: Symmetry>(
    fault: &FaultCalcParam,
    bus: usize,
    pattern: &crate::basic::sparse::BlockPattern,
    blocks: &mut [S::Tensor],
    rhs: &mut [S::Complex],
) -> Result<(), GridError> {
    if fault.fault_phase == FaultPhase::DefaultValue {
        return Err(GridError::InvalidShortCircuitPhaseOrType {
            fault_type: fault.fault_type as i8,
            fault_phase: fault.fault_phase as i8,
        });
    }
    check_fault_phase(fault.fault_type, fault.fault_phase)?;
    if S::IS_SYMMETRIC && fault.fault_type != FaultType::ThreePhase {
        // asymmetric faults need the three-phase model
        return Err(GridError::InvalidShortCircuitType {
            fault_type: fault.fault_type as i8,
        });
    }
    let solid = !fault.y_fault.norm().is_finite();
    let y_f = fault.y_fault;
    let diag = pattern.diag_entry[bus];

    match fault.fault_type {
        FaultType::ThreePhase => {
            if solid {
                for p in 0..block_size::<S>() {
                    replace_phase_row::<S>(pattern, blocks, rhs, bus, p);
                    let mut d = blocks[diag];
                    d.set_elem(p, p, Complex64::new(1.0, 0.0));
                    blocks[diag] = d;
                }
            } else {
                blocks[diag] += S::Tensor::diag_splat(y_f);
            }
        }
        FaultType::SinglePhaseToGround => {
            let p = fault_phase_indices(fault.fault_phase)?[0];
            if solid {
                replace_phase_row::<S>(pattern, blocks, rhs, bus, p);
                let mut d = blocks[diag];
                d.set_elem(p, p, Complex64::new(1.0, 0.0));
                blocks[diag] = d;
            } else {
                let mut d = blocks[diag];
                d.set_elem(p, p, d.elem(p, p) + y_f);
                blocks[diag] = d;
            }
        }
        FaultType::TwoPhase => {
            let pq = fault_phase_indices(fault.fault_phase)?;
            let (p, q) = (pq[0], pq[1]);
            if solid {
                // KCL over both phases on row p, voltage tie on row q
                sum_phase_rows::<S>(pattern, blocks, rhs, bus, p, q);
                replace_phase_row::<S>(pattern, blocks, rhs, bus, q);
                let mut d = blocks[diag];
                d.set_elem(q, p, Complex64::new(1.0, 0.0));
                d.set_elem(q, q, Complex64::new(-1.0, 0.0));
                blocks[diag] = d;
            } else {
                let mut d = blocks[diag];
                d.set_elem(p, p, d.elem(p, p) + y_f);
                d.set_elem(q, q, d.elem(q, q) + y_f);
                d.set_elem(p, q, d.elem(p, q) - y_f);
                d.set_elem(q, p, d.elem(q, p) - y_f);
                blocks[diag] = d;
            }
        }
        FaultType::TwoPhaseToGround => {
            let pq = fault_phase_indices(fault.fault_phase)?;
            let (p, q) = (pq[0], pq[1]);
            if solid {
                for &r in &[p, q] {
                    replace_phase_row::<S>(pattern, blocks, rhs, bus, r);
                    let mut d = blocks[diag];
                    d.set_elem(r, r, Complex64::new(1.0, 0.0));
                    blocks[diag] = d;
                }
            } else {
                // both phases tied together, common fault impedance to
                // ground carrying the phase-current sum
                sum_phase_rows::<S>(pattern, blocks, rhs, bus, p, q);
                let mut d = blocks[diag];
                d.set_elem(p, p, d.elem(p, p) + y_f);
                blocks[diag] = d;
                replace_phase_row::<S>(pattern, blocks, rhs, bus, q);
                let mut d = blocks[diag];
                d.set_elem(q, p, Complex64::new(1.0, 0.0));
                d.set_elem(q, q, Complex64::new(-1.0, 0.0));
                blocks[diag] = d;
            }
        }
    }
    Ok(())
}

fn block_size<S: Symmetry>() -> usize {
    if S::IS_SYMMETRIC { 1 } else { 3 }
}

/// Zeroes phase row `p` of every block in the bus's block row and its
/// right-hand side entry.
fn replace_phase_row<S: Symmetry>(
    pattern: &crate::basic::sparse::BlockPattern,
    blocks: &mut [S::Tensor],
    rhs: &mut [S::Complex],
    bus: usize,
    p: usize,
) {
    for pos in pattern.row(bus) {
        let mut b = blocks[pos];
        for c in 0..block_size::<S>() {
            b.set_elem(p, c, Complex64::new(0.0, 0.0));
        }
        blocks[pos] = b;
    }
    rhs[bus].set_comp(p, Complex64::new(0.0, 0.0));
}

/// Adds phase row `q` onto phase row `p` over the whole block row (KCL of
/// the tied phases), including the right-hand side.
fn sum_phase_rows<S: Symmetry>(
    pattern: &crate::basic::sparse::BlockPattern,
    blocks: &mut [S::Tensor],
    rhs: &mut [S::Complex],
    bus: usize,
    p: usize,
    q: usize,
) {
    for pos in pattern.row(bus) {
        let mut b = blocks[pos];
        for c in 0..block_size::<S>() {
            b.set_elem(p, c, b.elem(p, c) + b.elem(q, c));
        }
        blocks[pos] = b;
    }
    let sum = rhs[bus].comp(p) + rhs[bus].comp(q);
    rhs[bus].set_comp(p, sum);
}

/// Participating phase indices of a resolved fault phase.
fn fault_phase_indices(phase: FaultPhase) -> Result<Vec<usize>, GridError> {
    use FaultPhase::*;
    Ok(match phase {
        Abc => vec![0, 1, 2],
        A => vec![0],
        B => vec![1],
        C => vec![2],
        Ab => vec![0, 1],
        Ac => vec![0, 2],
        Bc => vec![1, 2],
        DefaultValue => {
            return Err(GridError::MissingCaseForEnum {
                context: "fault phase",
                value: DefaultValue as i64,
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::topology::{BranchIdx, GroupedIdx};
    use crate::basic::ybus::YBusStructure;
    use nalgebra::Vector3;
    use std::sync::Arc;

    const VREF: f64 = 1.1;

    struct FaultGrid {
        y0: Complex64,
        y0_0: Complex64,
        yref: Complex64,
        z_fault: Complex64,
    }

    impl Default for FaultGrid {
        fn default() -> Self {
            Self {
                y0: Complex64::new(1.0, -2.0),
                y0_0: Complex64::new(0.5, 0.5),
                yref: Complex64::new(10.0, -50.0),
                z_fault: Complex64::new(1.0, 1.0),
            }
        }
    }

    impl FaultGrid {
        fn topo(&self) -> Topology {
            Topology {
                slack_bus: 0,
                phase_shift: vec![0.0, 0.0],
                branch_bus_idx: vec![BranchIdx::new(0, 1)],
                sources_per_bus: GroupedIdx::from_offsets(vec![0, 1, 1]),
                shunts_per_bus: GroupedIdx::from_offsets(vec![0, 0, 0]),
                load_gens_per_bus: GroupedIdx::from_offsets(vec![0, 0, 0]),
                ..Default::default()
            }
        }

        fn param<S: Symmetry>(&self) -> MathModelParam<S> {
            MathModelParam {
                branch_param: vec![BranchCalcParam {
                    yff: S::tensor_from_sequence(self.y0, self.y0_0),
                    yft: S::tensor_from_sequence(-self.y0, -self.y0_0),
                    ytf: S::tensor_from_sequence(-self.y0, -self.y0_0),
                    ytt: S::tensor_from_sequence(self.y0, self.y0_0),
                }],
                shunt_param: vec![],
                source_param: vec![SourceCalcParam {
                    y1: self.yref,
                    y0: self.yref,
                }],
            }
        }

        fn run<S: Symmetry>(
            &self,
            fault_type: FaultType,
            fault_phase: FaultPhase,
            y_fault: Complex64,
        ) -> Result<ShortCircuitSolverOutput<S>, GridError> {
            let topo = self.topo();
            let param = self.param::<S>();
            let structure = Arc::new(YBusStructure::new(&topo));
            let y_bus = YBus::new(structure, &param);
            let input = ShortCircuitInput {
                fault_buses: GroupedIdx::from_offsets(vec![0, 0, 1]),
                faults: vec![FaultCalcParam {
                    y_fault,
                    fault_type,
                    fault_phase,
                }],
                source: vec![Complex64::new(VREF, 0.0)],
            };
            run_short_circuit(&topo, &param, &y_bus, &input)
        }

        /// Reference per fault type from the sequence-domain superposition.
        fn expected_fault_current(&self, fault_type: FaultType, z_f: Complex64) -> Vector3<Complex64> {
            let zref = 1.0 / self.yref;
            let z0 = 1.0 / self.y0;
            let z0_0 = 1.0 / self.y0_0;
            let vref = Complex64::new(VREF, 0.0);
            match fault_type {
                FaultType::ThreePhase => {
                    let i = vref / (z0 + zref + z_f);
                    Asymmetric::embed(i)
                }
                FaultType::SinglePhaseToGround => {
                    let i1 = vref / ((zref + z0) * 2.0 + (z0_0 + zref) + 3.0 * z_f);
                    Vector3::new(3.0 * i1, Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0))
                }
                FaultType::TwoPhase => {
                    let i = Complex64::new(0.0, -SQRT3) * vref / ((zref + z0) * 2.0 + z_f);
                    Vector3::new(Complex64::new(0.0, 0.0), i, -i)
                }
                FaultType::TwoPhaseToGround => {
                    let y_0 = 1.0 / (zref + z0_0 + 3.0 * z_f);
                    let y_12 = 1.0 / (zref + z0);
                    let y_sum = 2.0 * y_12 + y_0;
                    let i_0 = vref * (-y_0 * y_12 / y_sum);
                    let i_1 = vref * (-y_12 * y_12 / y_sum + y_12);
                    let i_2 = vref * (-y_12 * y_12 / y_sum);
                    Vector3::new(
                        i_0 + i_1 + i_2,
                        i_0 + i_1 * PHASOR_A2 + i_2 * PHASOR_A,
                        i_0 + i_1 * PHASOR_A + i_2 * PHASOR_A2,
                    )
                }
            }
        }

        fn expected_u(&self, i_abc: &Vector3<Complex64>) -> (Vector3<Complex64>, Vector3<Complex64>) {
            let zref = 1.0 / self.yref;
            let z0 = 1.0 / self.y0;
            let z0_0 = 1.0 / self.y0_0;
            let vref_abc = Asymmetric::embed(Complex64::new(VREF, 0.0));
            let u0 = vref_abc - i_abc * zref;
            let z_self = (2.0 * z0 + z0_0) / 3.0;
            let z_mutual = (z0_0 - z0) / 3.0;
            let drop = Vector3::new(
                i_abc[0] * z_self + (i_abc[1] + i_abc[2]) * z_mutual,
                i_abc[1] * z_self + (i_abc[0] + i_abc[2]) * z_mutual,
                i_abc[2] * z_self + (i_abc[0] + i_abc[1]) * z_mutual,
            );
            (u0, u0 - drop)
        }
    }

    fn check_asym_fault(fault_type: FaultType, fault_phase: FaultPhase, solid: bool) {
        let grid = FaultGrid::default();
        let y_fault = if solid {
            Complex64::new(f64::INFINITY, f64::INFINITY)
        } else {
            1.0 / grid.z_fault
        };
        let z_f = if solid {
            Complex64::new(0.0, 0.0)
        } else {
            grid.z_fault
        };
        let output = grid
            .run::<Asymmetric>(fault_type, fault_phase, y_fault)
            .unwrap();
        let i_expected = grid.expected_fault_current(fault_type, z_f);
        let (u0, u1) = grid.expected_u(&i_expected);
        assert!(
            (output.fault[0].i_fault - i_expected).norm() < 1e-8,
            "{fault_type:?} i_fault {} != {}",
            output.fault[0].i_fault,
            i_expected
        );
        assert!((output.u_bus[0] - u0).norm() < 1e-8, "{fault_type:?} u0");
        assert!((output.u_bus[1] - u1).norm() < 1e-8, "{fault_type:?} u1");
        assert!((output.branch[0].i_f - i_expected).norm() < 1e-8);
        assert!((output.branch[0].i_t + i_expected).norm() < 1e-8);
        assert!((output.source[0].i - i_expected).norm() < 1e-8);
    }

    #[test]
    fn test_sc_three_phase() {
        check_asym_fault(FaultType::ThreePhase, FaultPhase::Abc, false);
        check_asym_fault(FaultType::ThreePhase, FaultPhase::Abc, true);
    }

    #[test]
    fn test_sc_single_phase_to_ground() {
        check_asym_fault(FaultType::SinglePhaseToGround, FaultPhase::A, false);
        check_asym_fault(FaultType::SinglePhaseToGround, FaultPhase::A, true);
    }

    #[test]
    fn test_sc_two_phase() {
        check_asym_fault(FaultType::TwoPhase, FaultPhase::Bc, false);
        check_asym_fault(FaultType::TwoPhase, FaultPhase::Bc, true);
    }

    #[test]
    fn test_sc_two_phase_to_ground() {
        check_asym_fault(FaultType::TwoPhaseToGround, FaultPhase::Bc, false);
        check_asym_fault(FaultType::TwoPhaseToGround, FaultPhase::Bc, true);
    }

    #[test]
    fn test_sc_three_phase_sym() {
        let grid = FaultGrid::default();
        for (y_fault, z_f) in [
            (1.0 / grid.z_fault, grid.z_fault),
            (
                Complex64::new(f64::INFINITY, f64::INFINITY),
                Complex64::new(0.0, 0.0),
            ),
        ] {
            let output = grid
                .run::<Symmetric>(FaultType::ThreePhase, FaultPhase::Abc, y_fault)
                .unwrap();
            let zref = 1.0 / grid.yref;
            let z0 = 1.0 / grid.y0;
            let i = Complex64::new(VREF, 0.0) / (z0 + zref + z_f);
            let u0 = Complex64::new(VREF, 0.0) - i * zref;
            let u1 = u0 - i * z0;
            assert!((output.fault[0].i_fault - i).norm() < 1e-8);
            assert!((output.u_bus[0] - u0).norm() < 1e-8);
            assert!((output.u_bus[1] - u1).norm() < 1e-8);
            assert!((output.source[0].i - i).norm() < 1e-8);
        }
    }

    #[test]
    fn test_sc_no_fault_returns_prefault_state() {
        let grid = FaultGrid::default();
        let topo = grid.topo();
        let param = grid.param::<Asymmetric>();
        let structure = Arc::new(YBusStructure::new(&topo));
        let y_bus = YBus::new(structure, &param);
        let input = ShortCircuitInput {
            fault_buses: GroupedIdx::from_offsets(vec![0, 0, 0]),
            faults: vec![],
            source: vec![Complex64::new(VREF, 0.0)],
        };
        let output = run_short_circuit(&topo, &param, &y_bus, &input).unwrap();
        let vref_abc = Asymmetric::embed(Complex64::new(VREF, 0.0));
        for u in &output.u_bus {
            assert!((u - vref_abc).norm() < 1e-8);
        }
        assert!(output.branch[0].i_f.norm() < 1e-8);
    }

    #[test]
    fn test_sc_zero_fault_admittance_keeps_prefault_voltage() {
        // Z_fault = ∞ means no fault current at all
        let grid = FaultGrid::default();
        let output = grid
            .run::<Asymmetric>(FaultType::ThreePhase, FaultPhase::Abc, Complex64::new(0.0, 0.0))
            .unwrap();
        let vref_abc = Asymmetric::embed(Complex64::new(VREF, 0.0));
        assert!((output.u_bus[1] - vref_abc).norm() < 1e-8);
        assert!(output.fault[0].i_fault.norm() < 1e-8);
    }

    #[test]
    fn test_sc_default_phase_is_rejected() {
        let grid = FaultGrid::default();
        let err = grid
            .run::<Asymmetric>(
                FaultType::ThreePhase,
                FaultPhase::DefaultValue,
                1.0 / grid.z_fault,
            )
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidShortCircuitPhaseOrType { .. }));
    }

    #[test]
    fn test_sc_incompatible_phase_is_rejected() {
        let grid = FaultGrid::default();
        let err = grid
            .run::<Asymmetric>(FaultType::ThreePhase, FaultPhase::A, 1.0 / grid.z_fault)
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidShortCircuitPhaseOrType { .. }));
    }

    #[test]
    fn test_sc_asym_fault_rejected_in_sym_calculation() {
        let grid = FaultGrid::default();
        let err = grid
            .run::<Symmetric>(
                FaultType::SinglePhaseToGround,
                FaultPhase::A,
                1.0 / grid.z_fault,
            )
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidShortCircuitType { .. }));
    }

    #[test]
    fn test_sc_fault_on_source_bus() {
        // single bus, fault directly at the source terminal
        let topo = Topology {
            slack_bus: 0,
            phase_shift: vec![0.0],
            branch_bus_idx: vec![],
            sources_per_bus: GroupedIdx::from_offsets(vec![0, 1]),
            shunts_per_bus: GroupedIdx::from_offsets(vec![0, 0]),
            load_gens_per_bus: GroupedIdx::from_offsets(vec![0, 0]),
            ..Default::default()
        };
        let grid = FaultGrid::default();
        let param = MathModelParam::<Asymmetric> {
            branch_param: vec![],
            shunt_param: vec![],
            source_param: vec![SourceCalcParam {
                y1: grid.yref,
                y0: grid.yref,
            }],
        };
        let structure = Arc::new(YBusStructure::new(&topo));
        let y_bus = YBus::new(structure, &param);
        let input = ShortCircuitInput {
            fault_buses: GroupedIdx::from_offsets(vec![0, 1]),
            faults: vec![FaultCalcParam {
                y_fault: 1.0 / grid.z_fault,
                fault_type: FaultType::SinglePhaseToGround,
                fault_phase: FaultPhase::A,
            }],
            source: vec![Complex64::new(VREF, 0.0)],
        };
        let output = run_short_circuit(&topo, &param, &y_bus, &input).unwrap();
        let zref = 1.0 / grid.yref;
        let vref = Complex64::new(VREF, 0.0);
        let i_f = vref / (zref + grid.z_fault);
        let u_f = vref - i_f * zref;
        let expected_u = Vector3::new(u_f, vref * PHASOR_A2, vref * PHASOR_A);
        let expected_i = Vector3::new(i_f, Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0));
        assert!((output.u_bus[0] - expected_u).norm() < 1e-8);
        assert!((output.fault[0].i_fault - expected_i).norm() < 1e-8);
        assert!((output.source[0].i - expected_i).norm() < 1e-8);
    }
}
