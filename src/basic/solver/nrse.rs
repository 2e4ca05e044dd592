//! Newton-Raphson state estimation on polar variables.
//!
//! Each measurement contributes its full non-linear Jacobian, expressed
//! through the shared complex→polar quadrant machinery, and the
//! Gauss-Newton normal equations are re-assembled and re-factorised every
//! iteration. The global angle reference is pinned at the slack bus when no
//! measurement carries an absolute angle.

use num_complex::Complex64;

use crate::basic::error::GridError;
use crate::basic::param::{AngleMeasurementType, MathModelParam};
use crate::basic::sparse::{BlockPattern, LuBlock, LuRhs, SparseLuSolver};
use crate::basic::tensor::*;
use crate::basic::topology::Topology;
use crate::basic::ybus::YBus;

use super::jacobian::{polar_quadrants, power_coeff_c, power_coeff_d};
use super::measurement::*;
use super::*;

pub fn run_state_estimation_newton_raphson<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    input: &StateEstimationInput<S>,
    err_tol: f64,
    max_iter: usize,
    logger: &mut impl CalcLogger,
) -> Result<SolverOutput<S>, GridError> {
    let n = topo.n_bus();
    let meas = SeMeasurements::build(topo, input);
    let pattern = se_normal_pattern(topo, &meas);

    let mut u = initial_voltage::<S>(topo);
    let mut normal = vec![S::JacBlock::zero_block(); pattern.nnz()];
    let mut rhs = vec![S::JacRhs::rhs_zero(); n];
    let mut scratch: Vec<(usize, S::JacBlock)> = Vec::new();
    let mut solver = SparseLuSolver::<S::JacBlock>::new();

    for iteration in 1..=max_iter {
        for block in &mut normal {
            *block = S::JacBlock::zero_block();
        }
        for r in &mut rhs {
            *r = S::JacRhs::rhs_zero();
        }
        assemble(
            topo,
            param,
            y_bus,
            input,
            &meas,
            &pattern,
            &u,
            &mut normal,
            &mut rhs,
            &mut scratch,
        );
        solver.factorize_and_solve(&pattern, &normal, &mut rhs)?;

        let mut max_du = 0.0f64;
        for i in 0..n {
            let (d_theta, d_v) = S::jac_split(rhs[i]);
            let v = u[i].cabs() + d_v;
            let theta = u[i].arg() + d_theta;
            let u_new = S::Complex::from_polar(v, theta);
            max_du = max_du.max((u_new - u[i]).max_cabs());
            u[i] = u_new;
        }
        check_voltage_finite::<S>(&u, iteration)?;
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

#[allow(clippy::too_many_arguments)]
fn assemble<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    input: &StateEstimationInput<S>,
    meas: &SeMeasurements<S>,
    pattern: &BlockPattern,
    u: &[S::Complex],
    normal: &mut [S::JacBlock],
    rhs: &mut [S::JacRhs],
    scratch: &mut Vec<(usize, S::JacBlock)>,
) {
    let y_pattern = &y_bus.structure.pattern;
    let i_bus = y_bus.mat_vec(u);
    let identity = S::Tensor::diag_splat(Complex64::new(1.0, 0.0));
    let j_identity = S::Tensor::diag_splat(Complex64::new(0.0, 1.0));

    // voltage measurements: magnitude row, and an angle row when measured
    for (bus, v) in meas.voltage.iter().enumerate() {
        let Some(v) = v else { continue };
        let w = v.weight();
        // magnitude-only measurements keep the magnitude in the real part
        let z_mag = if v.has_angle() {
            v.value.cabs()
        } else {
            v.value.re()
        };
        let mag_residual = z_mag - u[bus].cabs();
        if v.has_angle() {
            let block = S::jac_block(j_identity, identity);
            // arg(z·conj(u)) wraps the angle difference into [-π, π]
            let ang_residual = v.value.mul_ew(u[bus].conj()).arg();
            scratch.clear();
            scratch.push((bus, block));
            accumulate::<S>(
                pattern,
                normal,
                rhs,
                scratch,
                S::jac_weight(S::Real::splat(w), S::Real::splat(w)),
                S::jac_rhs(mag_residual, ang_residual),
            );
        } else {
            let block = S::jac_block(S::Tensor::zero(), identity);
            scratch.clear();
            scratch.push((bus, block));
            accumulate::<S>(
                pattern,
                normal,
                rhs,
                scratch,
                S::jac_weight(S::Real::splat(w), S::Real::zero()),
                S::jac_rhs(mag_residual, S::Real::zero()),
            );
        }
    }

    // global angle reference when no absolute angle was measured
    if !meas.has_angle {
        let slack = topo.slack_bus;
        let w = 1.0 / meas.exact_variance;
        let pin = S::Complex::from_polar(
            S::Real::splat(1.0),
            S::Real::splat(topo.phase_shift[slack]),
        );
        let residual = pin.mul_ew(u[slack].conj()).arg();
        scratch.clear();
        scratch.push((slack, S::jac_block(j_identity, S::Tensor::zero())));
        accumulate::<S>(
            pattern,
            normal,
            rhs,
            scratch,
            S::jac_weight(S::Real::zero(), S::Real::splat(w)),
            S::jac_rhs(S::Real::zero(), residual),
        );
    }

    // bus injection measurements
    for (bus, inj) in meas.bus_injection.iter().enumerate() {
        let Some(m) = inj else { continue };
        scratch.clear();
        for pos in y_pattern.row(bus) {
            let y = y_bus.blocks[pos];
            let j = y_pattern.col_indices[pos];
            if y == S::Tensor::zero() && j != bus {
                continue;
            }
            let d = power_coeff_d::<S>(u[bus], y);
            let c = if j == bus {
                power_coeff_c::<S>(i_bus[bus])
            } else {
                S::Tensor::zero()
            };
            let (alpha, beta) = polar_quadrants::<S>(c, d, u[j]);
            scratch.push((j, S::jac_block(alpha, beta)));
        }
        let s_calc = u[bus].mul_ew(i_bus[bus].conj());
        let residual = m.value - s_calc;
        accumulate::<S>(
            pattern,
            normal,
            rhs,
            scratch,
            S::jac_weight(m.weight_re(), m.weight_im()),
            S::jac_rhs(residual.re(), residual.im()),
        );
    }

    // branch flow measurements, power and current
    for (branch, idx) in topo.branch_bus_idx.iter().enumerate() {
        if !(idx.from_connected() && idx.to_connected()) {
            // single-sided branches carry no flow to measure against
            continue;
        }
        let p = &param.branch_param[branch];
        let f = idx.from as usize;
        let t = idx.to as usize;
        let i_f = p.yff.mv(u[f]) + p.yft.mv(u[t]);
        let i_t = p.ytf.mv(u[f]) + p.ytt.mv(u[t]);

        if let Some(m) = &meas.branch_from_power[branch] {
            power_flow_rows::<S>(pattern, normal, rhs, scratch, u, f, t, p.yff, p.yft, i_f, m);
        }
        if let Some(m) = &meas.branch_to_power[branch] {
            power_flow_rows::<S>(pattern, normal, rhs, scratch, u, t, f, p.ytt, p.ytf, i_t, m);
        }
        if let Some((angle_type, m)) = &meas.branch_from_current[branch] {
            current_rows::<S>(pattern, normal, rhs, scratch, u, f, t, p.yff, p.yft, i_f, *angle_type, m);
        }
        if let Some((angle_type, m)) = &meas.branch_to_current[branch] {
            current_rows::<S>(pattern, normal, rhs, scratch, u, t, f, p.ytt, p.ytf, i_t, *angle_type, m);
        }
    }

    // shunt power measurements
    for (bus, range) in topo.shunts_per_bus.iter_groups() {
        for shunt in range {
            if !*input.shunt_status.get(shunt).unwrap_or(&true) {
                continue;
            }
            let Some(m) = &meas.shunt_power[shunt] else {
                continue;
            };
            let y = -param.shunt_param[shunt];
            let i_sh = y.mv(u[bus]);
            let d = power_coeff_d::<S>(u[bus], y);
            let c = power_coeff_c::<S>(i_sh);
            let (alpha, beta) = polar_quadrants::<S>(c, d, u[bus]);
            let residual = m.value - u[bus].mul_ew(i_sh.conj());
            scratch.clear();
            scratch.push((bus, S::jac_block(alpha, beta)));
            accumulate::<S>(
                pattern,
                normal,
                rhs,
                scratch,
                S::jac_weight(m.weight_re(), m.weight_im()),
                S::jac_rhs(residual.re(), residual.im()),
            );
        }
    }
}

/// Rows of one measured branch power: `S_m = diag(U_m)·conj(Y_own·U_m + Y_other·U_o)`.
#[allow(clippy::too_many_arguments)]
fn power_flow_rows<S: Symmetry>(
    pattern: &BlockPattern,
    normal: &mut [S::JacBlock],
    rhs: &mut [S::JacRhs],
    scratch: &mut Vec<(usize, S::JacBlock)>,
    u: &[S::Complex],
    bus_m: usize,
    bus_o: usize,
    y_own: S::Tensor,
    y_other: S::Tensor,
    i_m: S::Complex,
    m: &Combined<S>,
) {
    let d_own = power_coeff_d::<S>(u[bus_m], y_own);
    let c_own = power_coeff_c::<S>(i_m);
    let (alpha_m, beta_m) = polar_quadrants::<S>(c_own, d_own, u[bus_m]);
    let d_other = power_coeff_d::<S>(u[bus_m], y_other);
    let (alpha_o, beta_o) = polar_quadrants::<S>(S::Tensor::zero(), d_other, u[bus_o]);
    let residual = m.value - u[bus_m].mul_ew(i_m.conj());
    scratch.clear();
    scratch.push((bus_m, S::jac_block(alpha_m, beta_m)));
    scratch.push((bus_o, S::jac_block(alpha_o, beta_o)));
    accumulate::<S>(
        pattern,
        normal,
        rhs,
        scratch,
        S::jac_weight(m.weight_re(), m.weight_im()),
        S::jac_rhs(residual.re(), residual.im()),
    );
}

/// Rows of one measured branch current `I_m = Y_own·U_m + Y_other·U_o`.
/// A local-angle measurement is rotated into the global frame with the
/// measured bus's voltage phase of the current iterate.
#[allow(clippy::too_many_arguments)]
fn current_rows<S: Symmetry>(
    pattern: &BlockPattern,
    normal: &mut [S::JacBlock],
    rhs: &mut [S::JacRhs],
    scratch: &mut Vec<(usize, S::JacBlock)>,
    u: &[S::Complex],
    bus_m: usize,
    bus_o: usize,
    y_own: S::Tensor,
    y_other: S::Tensor,
    i_m: S::Complex,
    angle_type: AngleMeasurementType,
    m: &Combined<S>,
) {
    let z = match angle_type {
        AngleMeasurementType::GlobalAngle => m.value,
        AngleMeasurementType::LocalAngle => m.value.conj().mul_ew(u[bus_m].phase()),
    };
    let (alpha_m, beta_m) = polar_quadrants::<S>(y_own, S::Tensor::zero(), u[bus_m]);
    let (alpha_o, beta_o) = polar_quadrants::<S>(y_other, S::Tensor::zero(), u[bus_o]);
    let residual = z - i_m;
    scratch.clear();
    scratch.push((bus_m, S::jac_block(alpha_m, beta_m)));
    scratch.push((bus_o, S::jac_block(alpha_o, beta_o)));
    accumulate::<S>(
        pattern,
        normal,
        rhs,
        scratch,
        S::jac_weight(m.weight_re(), m.weight_im()),
        S::jac_rhs(residual.re(), residual.im()),
    );
}

/// `N += AᵀWA`, `rhs += AᵀW r` over the touched buses of one measurement.
fn accumulate<S: Symmetry>(
    pattern: &BlockPattern,
    normal: &mut [S::JacBlock],
    rhs: &mut [S::JacRhs],
    touched: &[(usize, S::JacBlock)],
    weight: S::JacBlock,
    residual: S::JacRhs,
) {
    for (bi, a_i) in touched {
        let atw = a_i.h_transpose() * weight;
        rhs[*bi] += atw.mv_block(residual);
        for (bj, a_j) in touched {
            let pos = pattern
                .find(*bi, *bj)
                .expect("normal-equation entry missing from pattern");
            normal[pos] += atw * *a_j;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_grid::*;
    use super::*;
    use crate::basic::param::*;
    use crate::basic::topology::{BranchIdx, GroupedIdx};
    use crate::basic::ybus::YBusStructure;
    use std::sync::Arc;

    fn run<S: Symmetry>(
        topo: &Topology,
        param: &MathModelParam<S>,
        input: &StateEstimationInput<S>,
    ) -> Result<SolverOutput<S>, GridError> {
        let structure = Arc::new(YBusStructure::new(topo));
        let y_bus = YBus::new(structure, param);
        run_state_estimation_newton_raphson(topo, param, &y_bus, input, 1e-10, 50, &mut NoLogger)
    }

    fn se_with_angle<S: Symmetry>() {
        let grid = TestGrid::default();
        let topo = grid.se_topo_power();
        let output = run(&topo, &grid.param::<S>(), &grid.se_input_angle::<S>()).unwrap();
        assert_output(&output, &grid.output_ref::<S>(), false, 1e-5);
    }

    #[test]
    fn test_nrse_with_angle_sym() {
        se_with_angle::<Symmetric>();
    }

    #[test]
    fn test_nrse_with_angle_asym() {
        se_with_angle::<Asymmetric>();
    }

    fn se_without_angle<S: Symmetry>() {
        let grid = TestGrid::default();
        let topo = grid.se_topo_power();
        let output = run(&topo, &grid.param::<S>(), &grid.se_input_no_angle::<S>()).unwrap();
        assert_output(&output, &grid.output_ref::<S>(), true, 1e-5);
    }

    #[test]
    fn test_nrse_without_angle_sym() {
        se_without_angle::<Symmetric>();
    }

    #[test]
    fn test_nrse_without_angle_asym() {
        se_without_angle::<Asymmetric>();
    }

    #[test]
    fn test_nrse_const_z() {
        let grid = TestGrid::default();
        let topo = grid.se_topo_power();
        let output = run(
            &topo,
            &grid.param::<Symmetric>(),
            &grid.se_input_angle_const_z::<Symmetric>(),
        )
        .unwrap();
        assert_output(&output, &grid.se_output_ref_z::<Symmetric>(), false, 1e-5);
    }

    #[test]
    fn test_nrse_different_power_variances() {
        let grid = TestGrid::default();
        let topo = grid.se_topo_power();
        let mut input = grid.se_input_angle::<Symmetric>();
        input.measured_branch_from_power[0].real_component.variance = 0.25;
        input.measured_branch_from_power[0].imag_component.variance = 0.75;
        let output = run(&topo, &grid.param::<Symmetric>(), &input).unwrap();
        assert_output(&output, &grid.output_ref::<Symmetric>(), false, 1e-5);
    }

    fn se_current_sensors<S: Symmetry>(angle_type: AngleMeasurementType) {
        let grid = TestGrid::default();
        let topo = grid.se_topo_current();
        let output =
            run(&topo, &grid.param::<S>(), &grid.se_input_current::<S>(angle_type)).unwrap();
        assert_output(&output, &grid.output_ref::<S>(), false, 1e-5);
    }

    #[test]
    fn test_nrse_local_current_sensors_sym() {
        se_current_sensors::<Symmetric>(AngleMeasurementType::LocalAngle);
    }

    #[test]
    fn test_nrse_global_current_sensors_sym() {
        se_current_sensors::<Symmetric>(AngleMeasurementType::GlobalAngle);
    }

    #[test]
    fn test_nrse_local_current_sensors_asym() {
        se_current_sensors::<Asymmetric>(AngleMeasurementType::LocalAngle);
    }

    #[test]
    fn test_nrse_global_current_sensors_asym() {
        se_current_sensors::<Asymmetric>(AngleMeasurementType::GlobalAngle);
    }

    #[test]
    fn test_nrse_zero_variance_voltage_sensor() {
        let topo = Topology {
            slack_bus: 1,
            phase_shift: vec![0.0, 0.0],
            branch_bus_idx: vec![BranchIdx::new(0, 1)],
            sources_per_bus: GroupedIdx::from_offsets(vec![0, 0, 1]),
            shunts_per_bus: GroupedIdx::from_offsets(vec![0, 0, 0]),
            load_gens_per_bus: GroupedIdx::from_offsets(vec![0, 0, 0]),
            voltage_sensors_per_bus: GroupedIdx::from_offsets(vec![0, 0, 1]),
            ..Default::default()
        };
        let one = Complex64::new(1.0, 0.0);
        let param = MathModelParam::<Symmetric> {
            branch_param: vec![BranchCalcParam {
                yff: one,
                yft: -one,
                ytf: -one,
                ytt: one,
            }],
            shunt_param: vec![],
            source_param: vec![SourceCalcParam { y1: one, y0: one }],
        };
        let input = StateEstimationInput::<Symmetric> {
            source_status: vec![true],
            measured_voltage: vec![VoltageSensorCalcParam {
                value: one,
                variance: 0.0,
            }],
            ..Default::default()
        };
        let output = run(&topo, &param, &input).unwrap();
        assert!((output.u[0] - one).norm() < 1e-6);
        assert!((output.u[1] - one).norm() < 1e-6);
    }

    #[test]
    fn test_nrse_measurements_source_and_branch() {
        let topo = Topology {
            slack_bus: 0,
            phase_shift: vec![0.0, 0.0],
            branch_bus_idx: vec![BranchIdx::new(0, 1)],
            sources_per_bus: GroupedIdx::from_offsets(vec![0, 1, 1]),
            shunts_per_bus: GroupedIdx::from_offsets(vec![0, 0, 0]),
            load_gens_per_bus: GroupedIdx::from_offsets(vec![0, 0, 1]),
            load_gen_type: vec![LoadGenType::ConstPq],
            voltage_sensors_per_bus: GroupedIdx::from_offsets(vec![0, 1, 1]),
            power_sensors_per_source: GroupedIdx::from_offsets(vec![0, 1]),
            power_sensors_per_branch_from: GroupedIdx::from_offsets(vec![0, 1]),
            ..Default::default()
        };
        let y = Complex64::new(1.0e3, 0.0);
        let param = MathModelParam::<Symmetric> {
            branch_param: vec![BranchCalcParam {
                yff: y,
                yft: -y,
                ytf: -y,
                ytt: y,
            }],
            shunt_param: vec![],
            source_param: vec![SourceCalcParam { y1: y, y0: y }],
        };
        let input = StateEstimationInput::<Symmetric> {
            source_status: vec![true],
            load_gen_status: vec![true],
            measured_voltage: vec![VoltageSensorCalcParam {
                value: Complex64::new(1.0, 0.0),
                variance: 0.1,
            }],
            measured_source_power: vec![power_meas(Complex64::new(1.93, 0.0), 0.05)],
            measured_branch_from_power: vec![power_meas(Complex64::new(1.97, 0.0), 0.05)],
            ..Default::default()
        };
        let output = run(&topo, &param, &input).unwrap();
        assert!((output.bus_injection[0].re - 1.95).abs() < 1e-4);
        assert!((output.source[0].s.re - 1.95).abs() < 1e-4);
        assert!((output.branch[0].s_f.re - 1.95).abs() < 1e-4);
    }
}
