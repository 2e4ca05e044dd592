//! The grid model: an ECS world holding the component state, with the
//! calculation entry points on top.
//!
//! Construction spawns and validates the records, assembly derives the math
//! model lazily, and every `run_*` call builds fresh solver inputs from the
//! current component state so updates flow in naturally.

use bevy_app::prelude::*;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::basic::error::GridError;
use crate::basic::param::{CalculationMethod, ShortCircuitVoltageScaling};
use crate::basic::solver::{self, NoLogger};
use crate::basic::tensor::Symmetry;
use crate::basic::ybus::YBus;
use crate::io::records::{GridInput, UpdateBatch};

use super::plugin::GridModelPlugin;
use super::post_processing::{extract_output, extract_sc_output, GridOutput, ShortCircuitGridOutput};
use super::systems::*;
use super::update::{apply_update, inverse_batch, DirtyFlags};

/// Calculation configuration.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct CalcOptions {
    pub pf_method: CalculationMethod,
    pub se_method: CalculationMethod,
    pub err_tol: f64,
    pub max_iter: usize,
    pub voltage_scaling: ShortCircuitVoltageScaling,
}

impl Default for CalcOptions {
    fn default() -> Self {
        Self {
            pf_method: CalculationMethod::NewtonRaphson,
            se_method: CalculationMethod::IterativeLinear,
            err_tol: 1e-8,
            max_iter: 20,
            voltage_scaling: ShortCircuitVoltageScaling::Maximum,
        }
    }
}

/// Pristine input snapshot plus the updates applied since; a logical copy of
/// the model replays both.
#[derive(Resource, Debug, Clone)]
struct StateOfRecord {
    input: GridInput,
    applied: Vec<crate::io::records::UpdateRecord>,
}

/// Access to the underlying world, mirroring the storage-wrapper shape of
/// the ECS layer.
pub trait DataOps {
    fn world(&self) -> &World;
    fn world_mut(&mut self) -> &mut World;
}

/// In-memory power grid with steady-state and short-circuit calculations.
#[derive(Debug)]
pub struct PowerGridModel {
    app: App,
}

impl DataOps for PowerGridModel {
    fn world(&self) -> &World {
        self.app.world()
    }

    fn world_mut(&mut self) -> &mut World {
        self.app.world_mut()
    }
}

impl PowerGridModel {
    /// Builds and validates a model from a grid snapshot.
    pub fn new(input: &GridInput) -> Result<Self, GridError> {
        let mut app = App::new();
        app.add_plugins(GridModelPlugin);
        let world = app.world_mut();
        let reg = spawn_grid(world, input)?;
        world.insert_resource(reg);
        world.insert_resource(StateOfRecord {
            input: input.clone(),
            applied: Vec::new(),
        });
        let mut model = Self { app };
        model.rebuild_math_model()?;
        Ok(model)
    }

    pub fn set_calc_options(&mut self, options: CalcOptions) {
        self.world_mut().insert_resource(options);
    }

    pub fn calc_options(&self) -> CalcOptions {
        self.world().resource::<CalcOptions>().clone()
    }

    fn rebuild_math_model(&mut self) -> Result<(), GridError> {
        build_math_model(self.world_mut())?;
        self.world_mut().resource_mut::<DirtyFlags>().topo = false;
        Ok(())
    }

    fn ensure_fresh_model(&mut self) -> Result<(), GridError> {
        if self.world().resource::<DirtyFlags>().topo {
            self.rebuild_math_model()?;
        }
        Ok(())
    }

    /// Applies a batch of update records.
    pub fn update(&mut self, batch: &UpdateBatch) -> Result<(), GridError> {
        for record in batch {
            apply_update(self.world_mut(), record)?;
            self.world_mut()
                .resource_mut::<StateOfRecord>()
                .applied
                .push(*record);
        }
        Ok(())
    }

    /// Records that would restore the state the batch overwrites.
    pub fn inverse(&self, batch: &UpdateBatch) -> Result<UpdateBatch, GridError> {
        inverse_batch(self.world(), batch)
    }

    /// Runs a power flow with the configured method.
    pub fn run_power_flow<S: Symmetry>(&mut self) -> Result<GridOutput<S>, GridError> {
        self.ensure_fresh_model()?;
        let options = self.calc_options();
        let world = self.world();
        let reg = world.resource::<ElementRegistry>().clone();
        let model = world.resource::<MathModel>().clone();
        let param = build_math_param::<S>(world, &reg, &model)?;
        let y_bus = YBus::new(model.structure.clone(), &param);
        let input = build_pf_input::<S>(world, &model);
        let mut logger = NoLogger;
        let solved = match options.pf_method {
            CalculationMethod::NewtonRaphson => solver::newton_pf::run_power_flow(
                &model.topo,
                &param,
                &y_bus,
                &input,
                options.err_tol,
                options.max_iter,
                &mut logger,
            ),
            CalculationMethod::IterativeCurrent => {
                solver::current_pf::run_power_flow_iterative_current(
                    &model.topo,
                    &param,
                    &y_bus,
                    &input,
                    options.err_tol,
                    options.max_iter,
                    &mut logger,
                )
            }
            CalculationMethod::Linear => solver::linear_pf::run_power_flow_linear(
                &model.topo,
                &param,
                &y_bus,
                &input,
                &mut logger,
            ),
            CalculationMethod::LinearCurrent => {
                solver::current_pf::run_power_flow_linear_current(
                    &model.topo,
                    &param,
                    &y_bus,
                    &input,
                    &mut logger,
                )
            }
            CalculationMethod::IterativeLinear => Err(GridError::MissingCaseForEnum {
                context: "power-flow method",
                value: options.pf_method as i64,
            }),
        }?;
        Ok(extract_output(world, &reg, &model, &solved))
    }

    /// Runs a state estimation with the configured method.
    pub fn run_state_estimation<S: Symmetry>(&mut self) -> Result<GridOutput<S>, GridError> {
        self.ensure_fresh_model()?;
        let options = self.calc_options();
        let world = self.world();
        let reg = world.resource::<ElementRegistry>().clone();
        let model = world.resource::<MathModel>().clone();
        let param = build_math_param::<S>(world, &reg, &model)?;
        let y_bus = YBus::new(model.structure.clone(), &param);
        let input = build_se_input::<S>(world, &model);
        let mut logger = NoLogger;
        let solved = match options.se_method {
            CalculationMethod::IterativeLinear => {
                solver::ilse::run_state_estimation_iterative_linear(
                    &model.topo,
                    &param,
                    &y_bus,
                    &input,
                    options.err_tol,
                    options.max_iter,
                    &mut logger,
                )
            }
            CalculationMethod::NewtonRaphson => {
                solver::nrse::run_state_estimation_newton_raphson(
                    &model.topo,
                    &param,
                    &y_bus,
                    &input,
                    options.err_tol,
                    options.max_iter,
                    &mut logger,
                )
            }
            _ => Err(GridError::MissingCaseForEnum {
                context: "state-estimation method",
                value: options.se_method as i64,
            }),
        }?;
        Ok(extract_output(world, &reg, &model, &solved))
    }

    /// Runs the short-circuit calculation over the active faults.
    pub fn run_short_circuit<S: Symmetry>(&mut self) -> Result<ShortCircuitGridOutput, GridError> {
        self.ensure_fresh_model()?;
        let options = self.calc_options();
        let world = self.world();
        let reg = world.resource::<ElementRegistry>().clone();
        let model = world.resource::<MathModel>().clone();
        let param = build_math_param::<S>(world, &reg, &model)?;
        let y_bus = YBus::new(model.structure.clone(), &param);
        let input = build_sc_input(world, &reg, &model, options.voltage_scaling)?;
        let solved = solver::short_circuit::run_short_circuit(&model.topo, &param, &y_bus, &input)?;
        Ok(extract_sc_output(world, &reg, &model, &solved))
    }

    /// Sequential batch driver: each scenario is applied, solved and
    /// reverted; reverting restores bit-identical results. Failures are
    /// collected into one `BatchCalculation` error.
    pub fn run_power_flow_batch<S: Symmetry>(
        &mut self,
        scenarios: &[UpdateBatch],
    ) -> Result<Vec<GridOutput<S>>, GridError> {
        let mut results = Vec::with_capacity(scenarios.len());
        let mut first_failure: Option<(usize, GridError)> = None;
        let mut failed = 0usize;
        for (entry, scenario) in scenarios.iter().enumerate() {
            let revert = self.inverse(scenario)?;
            self.apply_unlogged(scenario)?;
            let result = self.run_power_flow::<S>();
            self.apply_unlogged(&revert)?;
            match result {
                Ok(output) => results.push(output),
                Err(err) => {
                    failed += 1;
                    if first_failure.is_none() {
                        first_failure = Some((entry, err));
                    }
                }
            }
        }
        if let Some((first_entry, first_error)) = first_failure {
            return Err(GridError::BatchCalculation {
                failed,
                total: scenarios.len(),
                first_entry,
                first_error: first_error.to_string(),
            });
        }
        Ok(results)
    }

    /// Applies updates without touching the state-of-record log (batch
    /// scenarios net out to no change).
    fn apply_unlogged(&mut self, batch: &UpdateBatch) -> Result<(), GridError> {
        for record in batch {
            apply_update(self.world_mut(), record)?;
        }
        Ok(())
    }
}

impl Clone for PowerGridModel {
    /// Logical copy: rebuilds from the input snapshot and replays the
    /// applied updates, preserving solution identity.
    fn clone(&self) -> Self {
        let record = self.world().resource::<StateOfRecord>().clone();
        let mut model =
            PowerGridModel::new(&record.input).expect("state of record was validated before");
        model
            .apply_unlogged(&record.applied)
            .expect("applied updates were validated before");
        model
            .world_mut()
            .resource_mut::<StateOfRecord>()
            .applied = record.applied;
        model.set_calc_options(self.calc_options());
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::common::*;
    use crate::basic::tensor::{Asymmetric, RealValue, Symmetric};
    use crate::io::records::*;
    use num_complex::Complex64;

    /// 3-node radial grid: source at node 1, resistive line 1-2, ideal link
    /// 2-3, shunt plus one symmetric and one asymmetric constant-impedance
    /// load at node 3.
    fn radial_grid() -> GridInput {
        GridInput {
            node: vec![
                NodeInput { id: 1, u_rated: 10e3 },
                NodeInput { id: 2, u_rated: 10e3 },
                NodeInput { id: 3, u_rated: 10e3 },
            ],
            line: vec![LineInput {
                id: 4,
                from_node: 1,
                to_node: 2,
                from_status: 1,
                to_status: 1,
                r1: 10.0,
                x1: 0.0,
                c1: 0.0,
                tan1: 0.0,
                r0: 10.0,
                x0: 0.0,
                c0: 0.0,
                tan0: 0.0,
                i_n: 1e3,
            }],
            link: vec![LinkInput {
                id: 5,
                from_node: 2,
                to_node: 3,
                from_status: 1,
                to_status: 1,
            }],
            source: vec![SourceInput {
                id: 6,
                node: 1,
                status: 1,
                u_ref: 1.05,
                u_ref_angle: f64::NAN,
                sk: f64::NAN,
                rx_ratio: f64::NAN,
                z01_ratio: f64::NAN,
            }],
            shunt: vec![ShuntInput {
                id: 7,
                node: 3,
                status: 1,
                g1: 0.015,
                b1: 0.0,
                g0: 0.015,
                b0: 0.0,
            }],
            sym_load: vec![SymLoadGenInput {
                id: 8,
                node: 3,
                status: 1,
                load_gen_type: 1, // const_y
                p_specified: 0.5e6,
                q_specified: 0.0,
            }],
            asym_load: vec![AsymLoadGenInput {
                id: 9,
                node: 3,
                status: 1,
                load_gen_type: 1,
                p_specified: [0.5e6 / 3.0; 3],
                q_specified: [0.0; 3],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_a_radial_power_flow() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let output = model.run_power_flow::<Symmetric>().unwrap();

        // voltage divider: z_load = 1/(1.5 + 0.5 + 0.5) pu against 0.1 pu line
        let z_bus = 1.0 / 2.5;
        let expected_u2 = 1.05 * z_bus / (z_bus + 0.1);
        assert!((output.node[0].u_pu - 1.05).abs() < 1e-3, "{}", output.node[0].u_pu);
        assert!((output.node[1].u_pu - expected_u2).abs() < 1e-3);
        assert!((output.node[2].u_pu - expected_u2).abs() < 1e-3);

        // line current ≈ 1.05·10⁴ / ((z_bus2 + 10)·√3) A
        let expected_i = 1.05 * 10e3 / ((40.0 + 10.0) * SQRT3);
        assert!(
            (output.branch[0].i_from - expected_i).abs() < 0.5,
            "{} != {expected_i}",
            output.branch[0].i_from
        );

        // shunt takes three fifths of the bus-3 power, each load one fifth
        let p_total = output.shunt[0].p + output.load_gen[0].p + output.load_gen[1].p;
        assert!((output.shunt[0].p / p_total - 0.6).abs() < 1e-6);
        assert!((output.load_gen[0].p / p_total - 0.2).abs() < 1e-6);
        assert!((output.load_gen[1].p / p_total - 0.2).abs() < 1e-6);

        // appliance injections balance the bus injection at every node
        let source_p = output.source[0].p;
        assert!((source_p - output.node[0].p).abs() < 1.0);
    }

    #[test]
    fn test_scenario_a_symmetric_equals_asymmetric() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let sym = model.run_power_flow::<Symmetric>().unwrap();
        let asym = model.run_power_flow::<Asymmetric>().unwrap();
        for (s, a) in sym.node.iter().zip(&asym.node) {
            let a_pu = crate::basic::tensor::Asymmetric::real_to_abc(a.u_pu);
            for phase in 0..3 {
                assert!((a_pu[phase] - s.u_pu).abs() < 1e-8);
            }
            // per-phase powers sum to the symmetric total
            assert!((a.p.sum() - s.p).abs() < 1.0);
        }
        for (s, a) in sym.branch.iter().zip(&asym.branch) {
            assert!((a.p_from.sum() - s.p_from).abs() < 1.0);
            assert!((a.i_from.max_val() - s.i_from).abs() < 1e-6);
        }
    }

    #[test]
    fn test_scenario_b_switching_off_all_consumption_zeroes_flows() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let batch = vec![
            UpdateRecord::Shunt(ShuntUpdate {
                id: 7,
                status: 0,
                g1: f64::NAN,
                b1: f64::NAN,
                g0: f64::NAN,
                b0: f64::NAN,
            }),
            UpdateRecord::SymLoadGen(SymLoadGenUpdate {
                id: 8,
                status: 0,
                p_specified: f64::NAN,
                q_specified: f64::NAN,
            }),
            UpdateRecord::AsymLoadGen(AsymLoadGenUpdate {
                id: 9,
                status: 0,
                p_specified: [f64::NAN; 3],
                q_specified: [f64::NAN; 3],
            }),
        ];
        model.update(&batch).unwrap();
        let output = model.run_power_flow::<Symmetric>().unwrap();
        for node in &output.node {
            assert!((node.u_pu - 1.05).abs() < 1e-6);
        }
        for branch in &output.branch {
            assert!(branch.p_from.abs() < 1.0, "{}", branch.p_from);
            assert!(branch.i_from.abs() < 1e-3);
        }
    }

    #[test]
    fn test_scenario_c_partial_update_retains_fields() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let before = model.run_power_flow::<Symmetric>().unwrap();
        // status-only update leaves p_specified untouched
        model
            .update(&vec![UpdateRecord::SymLoadGen(SymLoadGenUpdate {
                id: 8,
                status: 1,
                p_specified: f64::NAN,
                q_specified: f64::NAN,
            })])
            .unwrap();
        let after = model.run_power_flow::<Symmetric>().unwrap();
        assert_eq!(before.node[2].u_pu, after.node[2].u_pu);
        assert_eq!(before.load_gen[0].p, after.load_gen[0].p);
    }

    #[test]
    fn test_update_inverse_roundtrip() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let before = model.run_power_flow::<Symmetric>().unwrap();
        let batch = vec![
            UpdateRecord::SymLoadGen(SymLoadGenUpdate {
                id: 8,
                status: NA_INT_S,
                p_specified: 0.25e6,
                q_specified: 0.1e6,
            }),
            UpdateRecord::Source(SourceUpdate {
                id: 6,
                status: NA_INT_S,
                u_ref: 1.0,
                u_ref_angle: f64::NAN,
            }),
            UpdateRecord::Branch(BranchUpdate {
                id: 4,
                from_status: NA_INT_S,
                to_status: 0,
            }),
        ];
        let inverse = model.inverse(&batch).unwrap();
        model.update(&batch).unwrap();
        let changed = model.run_power_flow::<Symmetric>().unwrap();
        assert_ne!(before.node[2].u_pu, changed.node[2].u_pu);
        model.update(&inverse).unwrap();
        let restored = model.run_power_flow::<Symmetric>().unwrap();
        for (b, r) in before.node.iter().zip(&restored.node) {
            assert_eq!(b.u_pu, r.u_pu);
            assert_eq!(b.p, r.p);
        }
        for (b, r) in before.branch.iter().zip(&restored.branch) {
            assert_eq!(b.p_from, r.p_from);
        }
    }

    #[test]
    fn test_batch_calculation_reverts_bit_identically() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let pristine = model.run_power_flow::<Symmetric>().unwrap();
        let scenarios: Vec<UpdateBatch> = vec![
            vec![UpdateRecord::SymLoadGen(SymLoadGenUpdate {
                id: 8,
                status: NA_INT_S,
                p_specified: 0.1e6,
                q_specified: f64::NAN,
            })],
            vec![UpdateRecord::Source(SourceUpdate {
                id: 6,
                status: NA_INT_S,
                u_ref: 1.02,
                u_ref_angle: f64::NAN,
            })],
        ];
        let results = model.run_power_flow_batch::<Symmetric>(&scenarios).unwrap();
        assert_eq!(results.len(), 2);
        assert_ne!(results[0].node[2].u_pu, pristine.node[2].u_pu);
        // after the batch, outputs are exactly the pristine ones
        let after = model.run_power_flow::<Symmetric>().unwrap();
        for (p, a) in pristine.node.iter().zip(&after.node) {
            assert_eq!(p.u_pu, a.u_pu);
            assert_eq!(p.u_angle, a.u_angle);
        }
    }

    #[test]
    fn test_batch_error_collects_diagnostics() {
        let mut grid = radial_grid();
        // constant-power load, initially zero
        grid.sym_load.push(SymLoadGenInput {
            id: 15,
            node: 3,
            status: 1,
            load_gen_type: 0,
            p_specified: 0.0,
            q_specified: 0.0,
        });
        let mut model = PowerGridModel::new(&grid).unwrap();
        let scenarios: Vec<UpdateBatch> = vec![
            // feasible
            vec![],
            // infeasible: absurd constant-power demand diverges the iteration
            vec![UpdateRecord::SymLoadGen(SymLoadGenUpdate {
                id: 15,
                status: NA_INT_S,
                p_specified: 1e15,
                q_specified: f64::NAN,
            })],
        ];
        let err = model.run_power_flow_batch::<Symmetric>(&scenarios).unwrap_err();
        match err {
            GridError::BatchCalculation {
                failed,
                total,
                first_entry,
                ..
            } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
                assert_eq!(first_entry, 1);
            }
            other => panic!("unexpected error {other}"),
        }
        // the grid is back at its pristine state
        let output = model.run_power_flow::<Symmetric>().unwrap();
        assert!((output.node[0].u_pu - 1.05).abs() < 1e-3);
    }

    #[test]
    fn test_engine_copy_preserves_solution() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        model
            .update(&vec![UpdateRecord::SymLoadGen(SymLoadGenUpdate {
                id: 8,
                status: NA_INT_S,
                p_specified: 0.3e6,
                q_specified: f64::NAN,
            })])
            .unwrap();
        let mut copy = model.clone();
        let original = model.run_power_flow::<Symmetric>().unwrap();
        let copied = copy.run_power_flow::<Symmetric>().unwrap();
        for (o, c) in original.node.iter().zip(&copied.node) {
            assert_eq!(o.u_pu, c.u_pu);
            assert_eq!(o.u_angle, c.u_angle);
            assert_eq!(o.p, c.p);
        }
    }

    #[test]
    fn test_open_branch_deenergizes_downstream() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        model
            .update(&vec![UpdateRecord::Branch(BranchUpdate {
                id: 4,
                from_status: 0,
                to_status: 0,
            })])
            .unwrap();
        let output = model.run_power_flow::<Symmetric>().unwrap();
        assert!(output.node[0].energized);
        assert!(!output.node[1].energized);
        assert!(!output.node[2].energized);
        assert!(output.node[1].u_pu.is_nan());
        assert!(!output.branch[0].energized);
        assert_eq!(output.branch[0].p_from, 0.0);
        // appliances on dead buses report nothing
        assert!(!output.shunt[0].energized);
        assert!(!output.load_gen[0].energized);
    }

    #[test]
    fn test_all_power_flow_methods_agree() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let reference = model.run_power_flow::<Symmetric>().unwrap();
        for method in [
            CalculationMethod::IterativeCurrent,
            CalculationMethod::Linear,
            CalculationMethod::LinearCurrent,
        ] {
            let mut options = model.calc_options();
            options.pf_method = method;
            options.max_iter = 100;
            model.set_calc_options(options);
            let output = model.run_power_flow::<Symmetric>().unwrap();
            // purely constant-impedance grid: even the direct methods are
            // exact up to the current-at-rated-voltage approximation
            let tol = if method == CalculationMethod::LinearCurrent {
                0.2
            } else {
                1e-6
            };
            for (r, o) in reference.node.iter().zip(&output.node) {
                assert!(
                    (r.u_pu - o.u_pu).abs() < tol,
                    "{method:?}: {} != {}",
                    r.u_pu,
                    o.u_pu
                );
            }
        }
    }

    fn grid_with_perfect_sensors() -> (PowerGridModel, GridOutput<Symmetric>) {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let pf = model.run_power_flow::<Symmetric>().unwrap();
        let mut input = radial_grid();
        input.sym_voltage_sensor = vec![SymVoltageSensorInput {
            id: 10,
            measured_object: 1,
            u_sigma: 0.0,
            u_measured: pf.node[0].u_pu * 10e3,
            u_angle_measured: pf.node[0].u_angle,
        }];
        let power_sensor = |id: ID, object: ID, terminal: IntS, p: f64, q: f64| {
            SymPowerSensorInput {
                id,
                measured_object: object,
                measured_terminal_type: terminal,
                power_sigma: f64::NAN,
                p_measured: p,
                q_measured: q,
                p_sigma: 0.0,
                q_sigma: 0.0,
            }
        };
        input.sym_power_sensor = vec![
            power_sensor(11, 6, 2, pf.source[0].p, pf.source[0].q), // source
            power_sensor(12, 8, 4, pf.load_gen[0].p, pf.load_gen[0].q), // load
            power_sensor(13, 9, 4, pf.load_gen[1].p, pf.load_gen[1].q),
            power_sensor(14, 7, 3, pf.shunt[0].p, pf.shunt[0].q), // shunt
        ];
        (PowerGridModel::new(&input).unwrap(), pf)
    }

    #[test]
    fn test_power_flow_then_state_estimation_identity() {
        let (mut model, pf) = grid_with_perfect_sensors();
        for method in [
            CalculationMethod::IterativeLinear,
            CalculationMethod::NewtonRaphson,
        ] {
            let mut options = model.calc_options();
            options.se_method = method;
            options.max_iter = 50;
            model.set_calc_options(options);
            let se = model.run_state_estimation::<Symmetric>().unwrap();
            for (p, s) in pf.node.iter().zip(&se.node) {
                assert!(
                    (p.u_pu - s.u_pu).abs() < 1e-5,
                    "{method:?}: {} != {}",
                    p.u_pu,
                    s.u_pu
                );
                assert!((p.u_angle - s.u_angle).abs() < 1e-5);
            }
            // sensor residuals vanish for perfect measurements
            for sensor in &se.power_sensor {
                assert!(sensor.p_residual.abs() < 1.0, "{}", sensor.p_residual);
            }
            for sensor in &se.voltage_sensor {
                assert!(sensor.u_residual.abs() < 1e-2);
            }
        }
    }

    /// Scenario E/F: two nodes, one voltage measurement. With any variance
    /// the whole grid floats to the measured value; with zero variance the
    /// measured bus matches exactly.
    fn two_node_se_grid(u_sigma: f64) -> GridInput {
        GridInput {
            node: vec![
                NodeInput { id: 1, u_rated: 10e3 },
                NodeInput { id: 2, u_rated: 10e3 },
            ],
            line: vec![LineInput {
                id: 3,
                from_node: 1,
                to_node: 2,
                from_status: 1,
                to_status: 1,
                r1: 10.0,
                x1: 10.0,
                c1: 0.0,
                tan1: 0.0,
                r0: 10.0,
                x0: 10.0,
                c0: 0.0,
                tan0: 0.0,
                i_n: 1e3,
            }],
            source: vec![SourceInput {
                id: 4,
                node: 1,
                status: 1,
                u_ref: 1.0,
                u_ref_angle: f64::NAN,
                sk: f64::NAN,
                rx_ratio: f64::NAN,
                z01_ratio: f64::NAN,
            }],
            sym_voltage_sensor: vec![SymVoltageSensorInput {
                id: 5,
                measured_object: 1,
                u_sigma,
                u_measured: 1.0 * 10e3,
                u_angle_measured: f64::NAN,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_e_single_voltage_sensor() {
        let mut model = PowerGridModel::new(&two_node_se_grid(10e3)).unwrap();
        let se = model.run_state_estimation::<Symmetric>().unwrap();
        assert!((se.node[0].u_pu - 1.0).abs() < 1e-6, "{}", se.node[0].u_pu);
        assert!((se.node[1].u_pu - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_scenario_f_zero_variance_measurement() {
        let mut model = PowerGridModel::new(&two_node_se_grid(0.0)).unwrap();
        let se = model.run_state_estimation::<Symmetric>().unwrap();
        assert!((se.node[0].u_pu - 1.0).abs() < 1e-6);
        assert!((se.node[1].u_pu - 1.0).abs() < 1e-6);
    }

    /// Scenario D: single-phase-to-ground fault through 0.1 + j0.1 Ω.
    #[test]
    fn test_scenario_d_single_phase_fault() {
        let grid = GridInput {
            node: vec![
                NodeInput { id: 1, u_rated: 10e3 },
                NodeInput { id: 2, u_rated: 10e3 },
            ],
            line: vec![LineInput {
                id: 3,
                from_node: 1,
                to_node: 2,
                from_status: 1,
                to_status: 1,
                r1: 1.0,
                x1: 0.0,
                c1: 0.0,
                tan1: 0.0,
                r0: 1.0,
                x0: 0.0,
                c0: 0.0,
                tan0: 0.0,
                i_n: 1e3,
            }],
            source: vec![SourceInput {
                id: 4,
                node: 1,
                status: 1,
                u_ref: 1.0,
                u_ref_angle: f64::NAN,
                sk: f64::NAN,
                rx_ratio: f64::NAN,
                z01_ratio: f64::NAN,
            }],
            fault: vec![FaultInput {
                id: 5,
                status: 1,
                fault_type: 1, // single phase to ground
                fault_phase: 1, // phase a
                fault_object: 2,
                r_f: 0.1,
                x_f: 0.1,
            }],
            ..Default::default()
        };
        let mut model = PowerGridModel::new(&grid).unwrap();
        let output = model.run_short_circuit::<Asymmetric>().unwrap();

        // analytic sequence superposition with the model's own parameters
        let base_z = 10e3 * 10e3 / BASE_POWER_3P;
        let z1_line = Complex64::new(1.0, 0.0) / base_z;
        let z0_line = z1_line;
        let z_abs = BASE_POWER_3P / DEFAULT_SOURCE_SK;
        let x1 = z_abs / (DEFAULT_SOURCE_RX_RATIO * DEFAULT_SOURCE_RX_RATIO + 1.0).sqrt();
        let zref = Complex64::new(DEFAULT_SOURCE_RX_RATIO * x1, x1);
        let z0_ref = zref * DEFAULT_SOURCE_Z01_RATIO;
        let z_f = Complex64::new(0.1, 0.1) / base_z;
        let c = 1.1; // maximum voltage scaling
        let i1 = c / ((zref + z1_line) * 2.0 + (z0_ref + z0_line) + 3.0 * z_f);
        let base_i = BASE_POWER_3P / 10e3 / SQRT3;
        let expected = 3.0 * i1.norm() * base_i;

        let i_f = output.fault[0].i_f;
        assert!(
            (i_f[0] - expected).abs() / expected < 1e-9,
            "{} != {expected}",
            i_f[0]
        );
        assert!(i_f[1].abs() < 1e-6 * expected);
        assert!(i_f[2].abs() < 1e-6 * expected);
        // branch carries the same current
        assert!((output.branch[0].i_from[0] - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_no_fault_admittance_keeps_prefault_state() {
        // Z_fault = ∞ cannot be expressed by a record (r = x = 0 is a solid
        // short), so take a huge finite impedance instead
        let grid = GridInput {
            node: vec![
                NodeInput { id: 1, u_rated: 10e3 },
                NodeInput { id: 2, u_rated: 10e3 },
            ],
            line: vec![LineInput {
                id: 3,
                from_node: 1,
                to_node: 2,
                from_status: 1,
                to_status: 1,
                r1: 1.0,
                x1: 0.0,
                c1: 0.0,
                tan1: 0.0,
                r0: 1.0,
                x0: 0.0,
                c0: 0.0,
                tan0: 0.0,
                i_n: 1e3,
            }],
            source: vec![SourceInput {
                id: 4,
                node: 1,
                status: 1,
                u_ref: 1.0,
                u_ref_angle: f64::NAN,
                sk: f64::NAN,
                rx_ratio: f64::NAN,
                z01_ratio: f64::NAN,
            }],
            fault: vec![FaultInput {
                id: 20,
                status: 1,
                fault_type: 0,
                fault_phase: 0,
                fault_object: 2,
                r_f: 1e12,
                x_f: 0.0,
            }],
            ..Default::default()
        };
        let mut model = PowerGridModel::new(&grid).unwrap();
        let output = model.run_short_circuit::<Symmetric>().unwrap();
        // pre-fault flat state at the scaled reference voltage
        for node in &output.node {
            assert!((node.u_pu[0] - 1.1).abs() < 1e-3, "{}", node.u_pu[0]);
        }
        assert!(output.fault[0].i_f[0] < 1e-3);
    }

    #[test]
    fn test_validation_errors() {
        let mut grid = radial_grid();
        grid.node.push(NodeInput { id: 1, u_rated: 10e3 });
        assert!(matches!(
            PowerGridModel::new(&grid).unwrap_err(),
            GridError::ConflictId(1)
        ));

        let mut grid = radial_grid();
        grid.line[0].to_node = 99;
        assert!(matches!(
            PowerGridModel::new(&grid).unwrap_err(),
            GridError::IdNotFound(99)
        ));

        let mut grid = radial_grid();
        grid.line[0].to_node = 1;
        assert!(matches!(
            PowerGridModel::new(&grid).unwrap_err(),
            GridError::InvalidBranch { branch: 4, .. }
        ));

        let mut grid = radial_grid();
        grid.sym_voltage_sensor = vec![SymVoltageSensorInput {
            id: 30,
            measured_object: 4, // a line, not a node
            u_sigma: 1.0,
            u_measured: 10e3,
            u_angle_measured: f64::NAN,
        }];
        assert!(matches!(
            PowerGridModel::new(&grid).unwrap_err(),
            GridError::IdWrongType {
                sensor: 30,
                object: 4
            }
        ));

        let mut grid = radial_grid();
        grid.fault = vec![FaultInput {
            id: 31,
            status: 1,
            fault_type: 0,  // three phase
            fault_phase: 1, // phase a: incompatible
            fault_object: 2,
            r_f: f64::NAN,
            x_f: f64::NAN,
        }];
        assert!(matches!(
            PowerGridModel::new(&grid).unwrap_err(),
            GridError::InvalidShortCircuitPhaseOrType { .. }
        ));
    }

    #[test]
    fn test_three_winding_transformer_model() {
        let grid = GridInput {
            node: vec![
                NodeInput { id: 1, u_rated: 110e3 },
                NodeInput { id: 2, u_rated: 10e3 },
                NodeInput { id: 3, u_rated: 400.0 },
            ],
            three_winding_transformer: vec![ThreeWindingTransformerInput {
                id: 4,
                node_1: 1,
                node_2: 2,
                node_3: 3,
                status_1: 1,
                status_2: 1,
                status_3: 1,
                u1: 110e3,
                u2: 10e3,
                u3: 400.0,
                sn_1: 30e6,
                sn_2: 20e6,
                sn_3: 10e6,
                uk_12: 0.1,
                uk_13: 0.12,
                uk_23: 0.08,
                pk_12: 50e3,
                pk_13: 40e3,
                pk_23: 30e3,
                i0: 0.0,
                p0: 0.0,
                winding_1: 1, // wye_n
                winding_2: 1,
                winding_3: 1,
                clock_12: 0,
                clock_13: 0,
                tap_side: NA_INT_S,
                tap_pos: NA_INT_S,
                tap_min: NA_INT_S,
                tap_max: NA_INT_S,
                tap_nom: NA_INT_S,
                tap_size: f64::NAN,
                r_grounding_1: f64::NAN,
                x_grounding_1: f64::NAN,
                r_grounding_2: f64::NAN,
                x_grounding_2: f64::NAN,
                r_grounding_3: f64::NAN,
                x_grounding_3: f64::NAN,
            }],
            source: vec![SourceInput {
                id: 5,
                node: 1,
                status: 1,
                u_ref: 1.0,
                u_ref_angle: f64::NAN,
                sk: f64::NAN,
                rx_ratio: f64::NAN,
                z01_ratio: f64::NAN,
            }],
            sym_load: vec![
                SymLoadGenInput {
                    id: 6,
                    node: 2,
                    status: 1,
                    load_gen_type: 0,
                    p_specified: 5e6,
                    q_specified: 1e6,
                },
                SymLoadGenInput {
                    id: 7,
                    node: 3,
                    status: 1,
                    load_gen_type: 0,
                    p_specified: 0.05e6,
                    q_specified: 0.0,
                },
            ],
            ..Default::default()
        };
        let mut model = PowerGridModel::new(&grid).unwrap();
        let output = model.run_power_flow::<Symmetric>().unwrap();
        assert_eq!(output.branch3.len(), 1);
        assert!(output.branch3[0].energized);
        // power arrives at both secondary loads
        assert!((output.load_gen[0].p - 5e6).abs() < 1e3);
        assert!((output.load_gen[1].p - 0.05e6).abs() < 1e2);
        // side-1 intake covers both loads plus losses
        let p1 = output.branch3[0].p[0].sum();
        assert!(p1 > 5.0e6 && p1 < 5.4e6, "{p1}");
        for node in &output.node {
            assert!(node.energized);
            assert!(node.u_pu > 0.8 && node.u_pu < 1.1);
        }
    }

    #[test]
    fn test_result_tables_and_csv() {
        let mut model = PowerGridModel::new(&radial_grid()).unwrap();
        let output = model.run_power_flow::<Symmetric>().unwrap();
        let table = output.node_table();
        assert!(table.contains("u_pu"));
        assert!(table.contains("| 1"));
        let branches = output.branch_table();
        assert!(branches.contains("loading_percent"));

        let mut csv_bytes = Vec::new();
        output.write_node_csv(&mut csv_bytes).unwrap();
        let text = String::from_utf8(csv_bytes).unwrap();
        assert!(text.starts_with("id,energized,u_pu"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_sum_of_injections_balances_per_bus() {
        let (mut model, _) = grid_with_perfect_sensors();
        let output = model.run_power_flow::<Symmetric>().unwrap();
        // node 3: shunt + both loads equal the bus injection (consumption
        // counts negative in the injection convention)
        let appliance_sum =
            -(output.shunt[0].p + output.load_gen[0].p + output.load_gen[1].p);
        assert!((output.node[2].p - appliance_sum).abs() < 1.0);
    }
}
