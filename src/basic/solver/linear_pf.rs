//! Linear power flow: every load and generator is approximated by the
//! constant admittance that would draw its specified power at rated voltage,
//! folded into the admittance matrix; one direct solve. Exact for pure
//! constant-impedance grids, a screening approximation otherwise.

use crate::basic::error::GridError;
use crate::basic::param::MathModelParam;
use crate::basic::sparse::SparseLuSolver;
use crate::basic::tensor::*;
use crate::basic::topology::Topology;
use crate::basic::ybus::YBus;

use super::*;

pub fn run_power_flow_linear<S: Symmetry>(
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
        // I_load = conj(S)·U in per-unit at rated voltage, i.e. an
        // admittance of conj(S) per phase
        let mut y_load = S::Complex::zero();
        for load_gen in topo.load_gens_per_bus.group(bus) {
            y_load += input.s_injection[load_gen].conj();
        }
        blocks[pattern.diag_entry[bus]] -= S::Tensor::from_diag(y_load);
    }

    let mut rhs = i_ref;
    let mut solver = SparseLuSolver::<S::Tensor>::new();
    solver.factorize_and_solve(pattern, &blocks, &mut rhs)?;
    check_voltage_finite::<S>(&rhs, 1)?;
    Ok(produce_pf_output(topo, param, y_bus, input, rhs))
}
