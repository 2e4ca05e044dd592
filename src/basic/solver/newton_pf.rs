//! Newton-Raphson power flow on polar variables.
//!
//! Sources enter as Norton equivalents: their internal admittance is added to
//! the diagonal of the source bus and the reference current `y_ref·u_ref`
//! becomes a voltage-dependent part of the injection setpoint. Nothing is
//! pinned to the reference voltage; the source admittance anchors both
//! magnitude and angle.

use num_complex::Complex64;

use crate::basic::error::GridError;
use crate::basic::param::{LoadGenType, MathModelParam};
use crate::basic::sparse::{block_mat_vec, LuBlock, LuRhs, SparseLuSolver};
use crate::basic::tensor::*;
use crate::basic::topology::Topology;
use crate::basic::ybus::YBus;

use super::jacobian::{polar_quadrants, power_coeff_c, power_coeff_d};
use super::*;

pub fn run_power_flow<S: Symmetry>(
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

    // network admittance with the source Norton admittances folded in
    let mut blocks = y_bus.blocks.clone();
    for bus in 0..n {
        blocks[pattern.diag_entry[bus]] += y_src[bus];
    }

    let mut u = initial_voltage::<S>(topo);
    let mut jac = vec![S::JacBlock::zero_block(); pattern.nnz()];
    let mut rhs = vec![S::JacRhs::rhs_zero(); n];
    let mut solver = SparseLuSolver::<S::JacBlock>::new();

    for iteration in 1..=max_iter {
        let i_net = block_mat_vec(pattern, &blocks, &u);
        let mismatch = power_mismatch(topo, input, &i_ref, &u, &i_net);

        for i in 0..n {
            for pos in pattern.row(i) {
                let j = pattern.col_indices[pos];
                let d = power_coeff_d::<S>(u[i], blocks[pos]);
                let c = if i == j {
                    power_coeff_c::<S>(i_net[i])
                } else {
                    S::Tensor::zero()
                };
                let (mut alpha, mut beta) = polar_quadrants::<S>(c, d, u[j]);
                if i == j {
                    let (a_set, b_set) = setpoint_derivative(topo, input, &i_ref, &u, i);
                    alpha -= a_set;
                    beta -= b_set;
                }
                jac[pos] = S::jac_block(alpha, beta);
            }
            rhs[i] = S::jac_rhs(mismatch[i].re(), mismatch[i].im());
        }

        solver.factorize_and_solve(pattern, &jac, &mut rhs)?;

        for i in 0..n {
            let (d_theta, d_v) = S::jac_split(rhs[i]);
            let v = u[i].cabs() + d_v;
            let theta = u[i].arg() + d_theta;
            u[i] = S::Complex::from_polar(v, theta);
        }
        check_voltage_finite::<S>(&u, iteration)?;

        let i_net = block_mat_vec(pattern, &blocks, &u);
        let mismatch = power_mismatch(topo, input, &i_ref, &u, &i_net);
        let max_mismatch = mismatch
            .iter()
            .fold(0.0f64, |m, ds| m.max(ds.max_cabs()));
        logger.log_iteration(iteration, max_mismatch);
        if max_mismatch.is_nan() {
            return Err(GridError::IterationDiverge {
                iterations: iteration,
                max_mismatch,
            });
        }
        if max_mismatch < err_tol {
            return Ok(produce_pf_output(topo, param, y_bus, input, u));
        }
    }
    Err(GridError::IterationDiverge {
        iterations: max_iter,
        max_mismatch: f64::INFINITY,
    })
}

/// `ΔS = S_set − S_calc` per bus; the setpoint includes the voltage-dependent
/// source reference injection `U·conj(I_ref)`.
fn power_mismatch<S: Symmetry>(
    topo: &Topology,
    input: &PowerFlowInput<S>,
    i_ref: &[S::Complex],
    u: &[S::Complex],
    i_net: &[S::Complex],
) -> Vec<S::Complex> {
    let mut s_set = bus_injection_setpoint(topo, input, u);
    for (bus, s) in s_set.iter_mut().enumerate() {
        *s += u[bus].mul_ew(i_ref[bus].conj());
        *s -= u[bus].mul_ew(i_net[bus].conj());
    }
    s_set
}

/// Diagonal quadrant contribution of the setpoint derivatives:
/// `∂S_set/∂θ` and `∂S_set/∂V` of the load scaling and the source reference
/// current.
fn setpoint_derivative<S: Symmetry>(
    topo: &Topology,
    input: &PowerFlowInput<S>,
    i_ref: &[S::Complex],
    u: &[S::Complex],
    bus: usize,
) -> (S::Tensor, S::Tensor) {
    let u_abs = u[bus].cabs();
    let mut ds_dv = S::Complex::zero();
    for load_gen in topo.load_gens_per_bus.group(bus) {
        let s = input.s_injection[load_gen];
        match topo.load_gen_type[load_gen] {
            LoadGenType::ConstPq => {}
            LoadGenType::ConstY => ds_dv += s.scale_real(u_abs).scale(2.0),
            LoadGenType::ConstI => ds_dv += s,
        }
    }
    let s_ref = u[bus].mul_ew(i_ref[bus].conj());
    // d(U·conj I_ref)/dθ = j·U·conj I_ref ; d/dV = phase(U)·conj I_ref
    let alpha = S::Tensor::from_diag(s_ref.mul_scalar(Complex64::new(0.0, 1.0)));
    ds_dv += u[bus].phase().mul_ew(i_ref[bus].conj());
    let beta = S::Tensor::from_diag(ds_dv);
    (alpha, beta)
}
