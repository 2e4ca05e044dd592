//! Steady-state and short-circuit solvers.
//!
//! All solvers consume a [`YBus`] plus per-bus injections or measurements and
//! produce a voltage vector with the derived per-branch and per-appliance
//! quantities. Solver state never leaks between `run_*` calls.

pub mod current_pf;
pub mod ilse;
pub mod jacobian;
pub mod linear_pf;
pub mod measurement;
pub mod newton_pf;
pub mod nrse;
pub mod short_circuit;
#[cfg(test)]
pub(crate) mod test_grid;

use num_complex::Complex64;

use super::error::GridError;
use super::param::*;
use super::tensor::*;
use super::topology::{GroupedIdx, Topology};
use super::ybus::YBus;

/// Iteration log sink of the iterative solvers.
pub trait CalcLogger {
    fn log_iteration(&mut self, iteration: usize, max_mismatch: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLogger;

impl CalcLogger for NoLogger {
    fn log_iteration(&mut self, _iteration: usize, _max_mismatch: f64) {}
}

/// Power-flow input: one reference voltage per source, one complex power
/// injection per load/generator.
#[derive(Debug, Clone, Default)]
pub struct PowerFlowInput<S: Symmetry> {
    pub source: Vec<Complex64>,
    pub s_injection: Vec<S::Complex>,
}

/// State-estimation input: statuses plus one measurement record per sensor,
/// listed in the order of the topology sensor groupings.
#[derive(Debug, Clone, Default)]
pub struct StateEstimationInput<S: Symmetry> {
    pub source_status: Vec<bool>,
    pub shunt_status: Vec<bool>,
    pub load_gen_status: Vec<bool>,
    pub measured_voltage: Vec<VoltageSensorCalcParam<S>>,
    pub measured_bus_injection: Vec<PowerSensorCalcParam<S>>,
    pub measured_source_power: Vec<PowerSensorCalcParam<S>>,
    pub measured_load_gen_power: Vec<PowerSensorCalcParam<S>>,
    pub measured_shunt_power: Vec<PowerSensorCalcParam<S>>,
    pub measured_branch_from_power: Vec<PowerSensorCalcParam<S>>,
    pub measured_branch_to_power: Vec<PowerSensorCalcParam<S>>,
    pub measured_branch_from_current: Vec<CurrentSensorCalcParam<S>>,
    pub measured_branch_to_current: Vec<CurrentSensorCalcParam<S>>,
}

/// Short-circuit input: faults grouped per bus, scaled source references.
#[derive(Debug, Clone, Default)]
pub struct ShortCircuitInput {
    pub fault_buses: GroupedIdx,
    pub faults: Vec<FaultCalcParam>,
    pub source: Vec<Complex64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchSolverOutput<S: Symmetry> {
    pub s_f: S::Complex,
    pub s_t: S::Complex,
    pub i_f: S::Complex,
    pub i_t: S::Complex,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplianceSolverOutput<S: Symmetry> {
    pub s: S::Complex,
    pub i: S::Complex,
}

impl<S: Symmetry> ApplianceSolverOutput<S> {
    pub fn zero() -> Self {
        Self {
            s: S::Complex::zero(),
            i: S::Complex::zero(),
        }
    }
}

/// Output of the steady-state solvers.
#[derive(Debug, Clone, Default)]
pub struct SolverOutput<S: Symmetry> {
    pub u: Vec<S::Complex>,
    pub bus_injection: Vec<S::Complex>,
    pub branch: Vec<BranchSolverOutput<S>>,
    pub source: Vec<ApplianceSolverOutput<S>>,
    pub shunt: Vec<ApplianceSolverOutput<S>>,
    pub load_gen: Vec<ApplianceSolverOutput<S>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchShortCircuitSolverOutput<S: Symmetry> {
    pub i_f: S::Complex,
    pub i_t: S::Complex,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultSolverOutput<S: Symmetry> {
    pub i_fault: S::Complex,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceShortCircuitSolverOutput<S: Symmetry> {
    pub i: S::Complex,
}

#[derive(Debug, Clone, Default)]
pub struct ShortCircuitSolverOutput<S: Symmetry> {
    pub u_bus: Vec<S::Complex>,
    pub branch: Vec<BranchShortCircuitSolverOutput<S>>,
    pub fault: Vec<FaultSolverOutput<S>>,
    pub source: Vec<SourceShortCircuitSolverOutput<S>>,
}

/// Flat start: rated magnitude at the cumulative phase reference of each bus.
pub fn initial_voltage<S: Symmetry>(topo: &Topology) -> Vec<S::Complex> {
    topo.phase_shift
        .iter()
        .map(|&shift| S::embed(Complex64::from_polar(1.0, shift)))
        .collect()
}

/// Per-bus Norton equivalents of the sources: internal admittance tensors for
/// the diagonal and reference currents `y_ref · u_ref` for the right-hand
/// side.
pub fn source_norton<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    source_u_ref: &[Complex64],
    source_on: impl Fn(usize) -> bool,
) -> (Vec<S::Tensor>, Vec<S::Complex>) {
    let n = topo.n_bus();
    let mut y_add = vec![S::Tensor::zero(); n];
    let mut i_ref = vec![S::Complex::zero(); n];
    for (bus, range) in topo.sources_per_bus.iter_groups() {
        for source in range {
            if !source_on(source) {
                continue;
            }
            let y = param.source_param[source].math_param::<S>();
            y_add[bus] += y;
            i_ref[bus] += y.mv(S::embed(source_u_ref[source]));
        }
    }
    (y_add, i_ref)
}

/// Injection setpoint of every bus at the given voltage, summing the
/// load/generator contributions with their behavioural scaling.
pub fn bus_injection_setpoint<S: Symmetry>(
    topo: &Topology,
    input: &PowerFlowInput<S>,
    u: &[S::Complex],
) -> Vec<S::Complex> {
    let mut s_set = vec![S::Complex::zero(); topo.n_bus()];
    for (bus, range) in topo.load_gens_per_bus.iter_groups() {
        let u_abs = u[bus].cabs();
        for load_gen in range {
            s_set[bus] += scale_injection::<S>(
                input.s_injection[load_gen],
                topo.load_gen_type[load_gen],
                u_abs,
            );
        }
    }
    s_set
}

/// Completes a [`SolverOutput`] for power flow from a converged voltage
/// vector.
pub fn produce_pf_output<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    input: &PowerFlowInput<S>,
    u: Vec<S::Complex>,
) -> SolverOutput<S> {
    let mut output = produce_network_output(topo, param, y_bus, u);
    // sources: injection through the internal admittance
    output.source = Vec::with_capacity(param.source_param.len());
    for (bus, range) in topo.sources_per_bus.iter_groups() {
        for source in range {
            let y_ref = param.source_param[source].math_param::<S>();
            let i = y_ref.mv(S::embed(input.source[source]) - output.u[bus]);
            let s = output.u[bus].mul_ew(i.conj());
            output.source.push(ApplianceSolverOutput { s, i });
        }
    }
    // loads and generators: setpoint at the solved voltage
    output.load_gen = Vec::with_capacity(input.s_injection.len());
    for (bus, range) in topo.load_gens_per_bus.iter_groups() {
        let u_abs = output.u[bus].cabs();
        for load_gen in range {
            let s = scale_injection::<S>(
                input.s_injection[load_gen],
                topo.load_gen_type[load_gen],
                u_abs,
            );
            let i = s.div_ew(output.u[bus]).conj();
            output.load_gen.push(ApplianceSolverOutput { s, i });
        }
    }
    output
}

/// Voltage-derived part of the output shared by power flow and state
/// estimation: bus injections, branch flows, shunt flows.
pub fn produce_network_output<S: Symmetry>(
    topo: &Topology,
    param: &MathModelParam<S>,
    y_bus: &YBus<S>,
    u: Vec<S::Complex>,
) -> SolverOutput<S> {
    let i_bus = y_bus.mat_vec(&u);
    let bus_injection: Vec<S::Complex> = u
        .iter()
        .zip(&i_bus)
        .map(|(ui, ii)| ui.mul_ew(ii.conj()))
        .collect();

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
            let i_f = p.yff.mv(u_f) + p.yft.mv(u_t);
            let i_t = p.ytf.mv(u_f) + p.ytt.mv(u_t);
            BranchSolverOutput {
                s_f: u_f.mul_ew(i_f.conj()),
                s_t: u_t.mul_ew(i_t.conj()),
                i_f,
                i_t,
            }
        })
        .collect();

    let mut shunt = Vec::with_capacity(param.shunt_param.len());
    for (bus, range) in topo.shunts_per_bus.iter_groups() {
        for s_idx in range {
            // injection direction: current flowing out of the bus is negative
            let i = -param.shunt_param[s_idx].mv(u[bus]);
            let s = u[bus].mul_ew(i.conj());
            shunt.push(ApplianceSolverOutput { s, i });
        }
    }

    SolverOutput {
        u,
        bus_injection,
        branch,
        source: Vec::new(),
        shunt,
        load_gen: Vec::new(),
    }
}

/// NaN in the iterate means the arithmetic failed (division at a
/// near-singular bus); treated identically to divergence.
pub fn check_voltage_finite<S: Symmetry>(
    u: &[S::Complex],
    iterations: usize,
) -> Result<(), GridError> {
    if u.iter().any(|v| v.is_nan()) {
        return Err(GridError::IterationDiverge {
            iterations,
            max_mismatch: f64::NAN,
        });
    }
    Ok(())
}
