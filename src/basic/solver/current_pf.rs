//! Current-injection power-flow solvers.
//!
//! The iterative variant linearises every load as a current injection at the
//! previous iterate's voltage and reuses one LU factorisation across all
//! iterations. The one-pass `linear_current` variant injects the rated-
//! voltage current and solves once.

use crate::basic::error::GridError;
use crate::basic::param::{scale_injection, MathModelParam};
use crate::basic::sparse::SparseLuSolver;
use crate::basic::tensor::*;
use crate::basic::topology::Topology;
use crate::basic::ybus::YBus;

use super::*;

pub fn run_power_flow_iterative_current<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    input: &PowerFlowInput<S>,
    err_tol: f64,
    max_iter: usize,
    logger: &mut impl CalcLogger,
) -> Result<SolverOutput<S>, GridError> {
    let n = topo.n_bus();
    let pattern = &y_bus.structure.pattern;
    let (y_src, i_ref) = source_norton(topo, param, &input.source, |_| true);

    let mut blocks = y_bus.blocks.clone();
    for bus in 0..n {
        blocks[pattern.diag_entry[bus]] += y_src[bus];
    }
    // the matrix is constant: factorise once and only re-solve
    let mut solver = SparseLuSolver::<S::Tensor>::new();
    solver.prefactorize(pattern, &blocks)?;

    let mut u = initial_voltage::<S>(topo);
    for iteration in 1..=max_iter {
        let mut rhs = i_ref.clone();
        inject_load_currents(topo, input, &u, &mut rhs);
        solver.solve(pattern, &mut rhs)?;
        check_voltage_finite::<S>(&rhs, iteration)?;

        let max_du = u
            .iter()
            .zip(&rhs)
            .fold(0.0f64, |m, (old, new)| m.max((*new - *old).max_cabs()));
        u = rhs;
        logger.log_iteration(iteration, max_du);
        if max_du < err_tol {
            return Ok(produce_pf_output(topo, param, y_bus, input, u));
        }
    }
    Err(GridError::IterationDiverge {
        iterations: max_iter,
        max_mismatch: f64::INFINITY,
    })
}

/// One-pass variant: loads become constant currents at rated voltage.
pub fn run_power_flow_linear_current<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    input: &PowerFlowInput<S>,
    _logger: &mut impl CalcLogger,
) -> Result<SolverOutput<S>, GridError> {
    let n = topo.n_bus();
    let pattern = &y_bus.structure.pattern;
    let (y_src, i_ref) = source_norton(topo, param, &input.source, |_| true);

    let mut blocks = y_bus.blocks.clone();
    for bus in 0..n {
        blocks[pattern.diag_entry[bus]] += y_src[bus];
    }
    let u_flat = initial_voltage::<S>(topo);
    let mut rhs = i_ref;
    inject_load_currents(topo, input, &u_flat, &mut rhs);

    let mut solver = SparseLuSolver::<S::Tensor>::new();
    solver.factorize_and_solve(pattern, &blocks, &mut rhs)?;
    check_voltage_finite::<S>(&rhs, 1)?;
    Ok(produce_pf_output(topo, param, y_bus, input, rhs))
}

/// Adds `conj(S_inj(u)/u)` of every load/generator to the right-hand side.
fn inject_load_currents<S: Symmetry>(
    topo: &Topology,
    input: &PowerFlowInput<S>,
    u: &[S::Complex],
    rhs: &mut [S::Complex],
) {
    for (bus, range) in topo.load_gens_per_bus.iter_groups() {
        let u_abs = u[bus].cabs();
        for load_gen in range {
            let s = scale_injection::<S>(
                input.s_injection[load_gen],
                topo.load_gen_type[load_gen],
                u_abs,
            );
            rhs[bus] += s.div_ew(u[bus]).conj();
        }
    }
}
