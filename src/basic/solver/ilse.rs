//! Iterative-linear state estimation.
//!
//! Every measurement is reformulated as a current-like quantity: a power
//! measurement becomes the pseudo-current `conj(S/U)` at the previous
//! iterate's voltage, a magnitude-only voltage measurement borrows the
//! iterate's angle. The measurement model is then linear in the complex
//! voltage, the normal-equation matrix is constant across iterations and is
//! factorised exactly once.

use crate::basic::error::GridError;
use crate::basic::param::{AngleMeasurementType, MathModelParam};
use crate::basic::sparse::{BlockPattern, SparseLuSolver};
use crate::basic::tensor::*;
use crate::basic::topology::Topology;
use crate::basic::ybus::YBus;

use super::measurement::*;
use super::*;

/// One linear measurement row `H·U = z` with its scalar weight.
struct Row<S: Symmetry> {
    blocks: Vec<(usize, S::Tensor)>,
    weight: f64,
    z: ZKind<S>,
}

/// Right-hand-side value of a row; pseudo-quantities depend on the iterate.
enum ZKind<S: Symmetry> {
    /// Fully known complex value (voltage with angle, global-angle current).
    Phasor(S::Complex),
    /// `conj(S / U_prev)` of a power measurement at the given bus.
    PseudoPower { bus: usize, s: S::Complex },
    /// Local-angle current, rotated into the global frame by the iterate's
    /// voltage phase.
    LocalCurrent { bus: usize, z: S::Complex },
    /// Magnitude-only voltage at the iterate's angle.
    VoltageMag { bus: usize, mag: S::Real },
}

impl<S: Symmetry> ZKind<S> {
    fn eval(&self, u: &[S::Complex]) -> S::Complex {
        match self {
            ZKind::Phasor(v) => *v,
            ZKind::PseudoPower { bus, s } => s.div_ew(u[*bus]).conj(),
            ZKind::LocalCurrent { bus, z } => z.conj().mul_ew(u[*bus].phase()),
            ZKind::VoltageMag { bus, mag } => S::Complex::from_polar(*mag, u[*bus].arg()),
        }
    }
}

pub fn run_state_estimation_iterative_linear<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    input: &StateEstimationInput<S>,
    err_tol: f64,
    max_iter: usize,
    logger: &mut impl CalcLogger,
) -> Result<SolverOutput<S>, GridError> {
    let meas = SeMeasurements::build(topo, input);
    let pattern = se_normal_pattern(topo, &meas);
    let rows = build_rows(topo, param, y_bus, input, &meas);

    // H is constant: assemble and factorise the normal equations once
    let mut normal = vec![S::Tensor::zero(); pattern.nnz()];
    for row in &rows {
        for (bi, h_i) in &row.blocks {
            for (bj, h_j) in &row.blocks {
                let pos = pattern
                    .find(*bi, *bj)
                    .expect("normal-equation entry missing from pattern");
                normal[pos] += (h_i.hermitian_t() * *h_j).scale(row.weight);
            }
        }
    }
    let mut solver = SparseLuSolver::<S::Tensor>::new();
    solver.prefactorize(&pattern, &normal)?;

    let mut u = initial_voltage::<S>(topo);
    for iteration in 1..=max_iter {
        let mut rhs = vec![S::Complex::zero(); topo.n_bus()];
        for row in &rows {
            let z = row.z.eval(&u);
            for (bi, h_i) in &row.blocks {
                rhs[*bi] += h_i.hermitian_t().mv(z).scale(row.weight);
            }
        }
        solver.solve(&pattern, &mut rhs)?;
        check_voltage_finite::<S>(&rhs, iteration)?;

        let max_du = u
            .iter()
            .zip(&rhs)
            .fold(0.0f64, |m, (old, new)| m.max((*new - *old).max_cabs()));
        u = rhs;
        logger.log_iteration(iteration, max_du);
        if max_du < err_tol {
            let mut output = produce_network_output(topo, param, y_bus, u);
            distribute_appliance_outputs(topo, input, &meas, &mut output);
            return Ok(output);
        }
    }
    Err(GridError::IterationDiverge {
        iterations: max_iter,
        max_mismatch: f64::INFINITY,
    })
}

fn build_rows<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    input: &StateEstimationInput<S>,
    meas: &SeMeasurements<S>,
) -> Vec<Row<S>> {
    let mut rows = Vec::new();
    let y_pattern = &y_bus.structure.pattern;

    for (bus, v) in meas.voltage.iter().enumerate() {
        let Some(v) = v else { continue };
        rows.push(Row {
            blocks: vec![(bus, S::Tensor::diag_splat(num_complex::Complex64::new(1.0, 0.0)))],
            weight: v.weight(),
            z: if v.has_angle() {
                ZKind::Phasor(v.value)
            } else {
                ZKind::VoltageMag {
                    bus,
                    mag: v.value.re(),
                }
            },
        });
    }

    for (bus, inj) in meas.bus_injection.iter().enumerate() {
        let Some(m) = inj else { continue };
        let blocks: Vec<(usize, S::Tensor)> = y_pattern
            .row(bus)
            .filter_map(|pos| {
                let block = y_bus.blocks[pos];
                (block != S::Tensor::zero()).then_some((y_pattern.col_indices[pos], block))
            })
            .collect();
        let blocks = if blocks.is_empty() {
            // isolated bus: its injection constrains nothing but itself
            vec![(bus, S::Tensor::zero())]
        } else {
            blocks
        };
        rows.push(Row {
            blocks,
            weight: m.complex_weight(),
            z: ZKind::PseudoPower { bus, s: m.value },
        });
    }

    for (branch, idx) in topo.branch_bus_idx.iter().enumerate() {
        let p = &param.branch_param[branch];
        if let Some(m) = &meas.branch_from_power[branch] {
            if idx.from_connected() {
                rows.push(Row {
                    blocks: branch_side_blocks::<S>(idx, p.yff, p.yft),
                    weight: m.complex_weight(),
                    z: ZKind::PseudoPower {
                        bus: idx.from as usize,
                        s: m.value,
                    },
                });
            }
        }
        if let Some(m) = &meas.branch_to_power[branch] {
            if idx.to_connected() {
                rows.push(Row {
                    blocks: branch_side_blocks::<S>(idx, p.ytf, p.ytt),
                    weight: m.complex_weight(),
                    z: ZKind::PseudoPower {
                        bus: idx.to as usize,
                        s: m.value,
                    },
                });
            }
        }
        if let Some((angle_type, m)) = &meas.branch_from_current[branch] {
            if idx.from_connected() {
                rows.push(Row {
                    blocks: branch_side_blocks::<S>(idx, p.yff, p.yft),
                    weight: m.complex_weight(),
                    z: current_z::<S>(*angle_type, m.value, idx.from as usize),
                });
            }
        }
        if let Some((angle_type, m)) = &meas.branch_to_current[branch] {
            if idx.to_connected() {
                rows.push(Row {
                    blocks: branch_side_blocks::<S>(idx, p.ytf, p.ytt),
                    weight: m.complex_weight(),
                    z: current_z::<S>(*angle_type, m.value, idx.to as usize),
                });
            }
        }
    }

    for (bus, range) in topo.shunts_per_bus.iter_groups() {
        for shunt in range {
            if !*input.shunt_status.get(shunt).unwrap_or(&true) {
                continue;
            }
            let Some(m) = &meas.shunt_power[shunt] else {
                continue;
            };
            rows.push(Row {
                blocks: vec![(bus, -param.shunt_param[shunt])],
                weight: m.complex_weight(),
                z: ZKind::PseudoPower { bus, s: m.value },
            });
        }
    }

    rows
}

/// `(bus, block)` pairs of one branch-side measurement row: `y_from` acts on
/// the from-bus voltage, `y_to` on the to-bus voltage.
fn branch_side_blocks<S: Symmetry>(
    idx: &crate::basic::topology::BranchIdx,
    y_from: S::Tensor,
    y_to: S::Tensor,
) -> Vec<(usize, S::Tensor)> {
    let mut blocks = Vec::with_capacity(2);
    if idx.from_connected() {
        blocks.push((idx.from as usize, y_from));
    }
    if idx.to_connected() {
        blocks.push((idx.to as usize, y_to));
    }
    blocks
}

fn current_z<S: Symmetry>(
    angle_type: AngleMeasurementType,
    value: S::Complex,
    bus: usize,
) -> ZKind<S> {
    match angle_type {
        AngleMeasurementType::GlobalAngle => ZKind::Phasor(value),
        AngleMeasurementType::LocalAngle => ZKind::LocalCurrent { bus, z: value },
    }
}
