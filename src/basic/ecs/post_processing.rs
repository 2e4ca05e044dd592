//! Output records and result presentation.
//!
//! Extraction turns a solver output into the flat per-role output records
//! (nodes, branches, appliances, sensors, faults) with per-unit and SI
//! quantities; display renders markdown tables and CSV exports in the
//! node/branch layout.

use bevy_ecs::prelude::*;
use nalgebra::Vector3;
use num_complex::Complex64;
use std::fmt;
use tabled::{settings::Style, Table, Tabled};

use crate::basic::common::*;
use crate::basic::param::AngleMeasurementType;
use crate::basic::solver::{ShortCircuitSolverOutput, SolverOutput};
use crate::basic::tensor::*;

use super::elements::*;
use super::systems::{ElementRegistry, MathModel, SensorRef};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeOutput<S: Symmetry> {
    pub id: ID,
    pub energized: bool,
    pub u_pu: S::Real,
    /// Voltage in V (line-line for symmetric, line-neutral per phase for
    /// asymmetric).
    pub u: S::Real,
    pub u_angle: S::Real,
    pub p: S::Real,
    pub q: S::Real,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchOutput<S: Symmetry> {
    pub id: ID,
    pub energized: bool,
    pub p_from: S::Real,
    pub q_from: S::Real,
    pub i_from: S::Real,
    pub s_from: S::Real,
    pub p_to: S::Real,
    pub q_to: S::Real,
    pub i_to: S::Real,
    pub s_to: S::Real,
    pub loading: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Branch3Output<S: Symmetry> {
    pub id: ID,
    pub energized: bool,
    pub p: [S::Real; 3],
    pub q: [S::Real; 3],
    pub i: [S::Real; 3],
    pub s: [S::Real; 3],
    pub loading: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplianceOutput<S: Symmetry> {
    pub id: ID,
    pub energized: bool,
    pub p: S::Real,
    pub q: S::Real,
    pub i: S::Real,
    pub s: S::Real,
    pub pf: S::Real,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageSensorOutput<S: Symmetry> {
    pub id: ID,
    pub energized: bool,
    pub u_residual: S::Real,
    pub u_angle_residual: S::Real,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSensorOutput<S: Symmetry> {
    pub id: ID,
    pub energized: bool,
    pub p_residual: S::Real,
    pub q_residual: S::Real,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentSensorOutput<S: Symmetry> {
    pub id: ID,
    pub energized: bool,
    pub i_residual: S::Real,
    pub i_angle_residual: S::Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultOutput {
    pub id: ID,
    pub energized: bool,
}

/// Steady-state output records, grouped per role.
#[derive(Debug, Clone, Default)]
pub struct GridOutput<S: Symmetry> {
    pub node: Vec<NodeOutput<S>>,
    pub branch: Vec<BranchOutput<S>>,
    pub branch3: Vec<Branch3Output<S>>,
    pub source: Vec<ApplianceOutput<S>>,
    pub shunt: Vec<ApplianceOutput<S>>,
    pub load_gen: Vec<ApplianceOutput<S>>,
    pub voltage_sensor: Vec<VoltageSensorOutput<S>>,
    pub power_sensor: Vec<PowerSensorOutput<S>>,
    pub current_sensor: Vec<CurrentSensorOutput<S>>,
    pub fault: Vec<FaultOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeScOutput {
    pub id: ID,
    pub energized: bool,
    pub u_pu: Vector3<f64>,
    pub u: Vector3<f64>,
    pub u_angle: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchScOutput {
    pub id: ID,
    pub energized: bool,
    pub i_from: Vector3<f64>,
    pub i_from_angle: Vector3<f64>,
    pub i_to: Vector3<f64>,
    pub i_to_angle: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultScOutput {
    pub id: ID,
    pub energized: bool,
    /// Fault current magnitude per phase in A.
    pub i_f: Vector3<f64>,
    pub i_f_angle: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceScOutput {
    pub id: ID,
    pub energized: bool,
    pub i: Vector3<f64>,
    pub i_angle: Vector3<f64>,
}

/// Short-circuit output records.
#[derive(Debug, Clone, Default)]
pub struct ShortCircuitGridOutput {
    pub node: Vec<NodeScOutput>,
    pub branch: Vec<BranchScOutput>,
    pub source: Vec<SourceScOutput>,
    pub fault: Vec<FaultScOutput>,
}

fn nan_real<S: Symmetry>() -> S::Real {
    S::Real::splat(f64::NAN)
}

/// Extracts the full output-record family from a steady-state solve.
pub fn extract_output<S: Symmetry>(
    world: &World,
    reg: &ElementRegistry,
    model: &MathModel,
    solved: &SolverOutput<S>,
) -> GridOutput<S> {
    let mut output = GridOutput::default();

    // nodes (input nodes only; internal buses stay internal)
    for (slot, &node) in reg.nodes.iter().take(reg.n_input_nodes).enumerate() {
        let id = world.get::<ElemId>(node).map_or(NA_INT_ID, |i| i.0);
        let u_rated = world.get::<NodeParam>(node).unwrap().u_rated;
        match model.bus_of_slot[slot] {
            Some(bus) => {
                let u = solved.u[bus];
                let s = solved.bus_injection[bus];
                output.node.push(NodeOutput {
                    id,
                    energized: true,
                    u_pu: u.cabs(),
                    u: u.cabs().scale(u_rated * S::U_SCALE),
                    u_angle: u.arg(),
                    p: s.re().scale(S::BASE_POWER),
                    q: s.im().scale(S::BASE_POWER),
                });
            }
            None => output.node.push(NodeOutput {
                id,
                energized: false,
                u_pu: nan_real::<S>(),
                u: nan_real::<S>(),
                u_angle: nan_real::<S>(),
                p: S::Real::zero(),
                q: S::Real::zero(),
            }),
        }
    }

    // two-port branches with their own record (legs are folded into the
    // three-winding outputs below)
    for (b, &branch) in reg.branches.iter().enumerate() {
        let Some(id) = world.get::<ElemId>(branch) else {
            continue;
        };
        output
            .branch
            .push(branch_output::<S>(world, model, solved, b, branch, id.0));
    }

    // three-winding transformers: per-side quantities from the legs
    for &parent in &reg.branch3 {
        let id = world.get::<ElemId>(parent).unwrap().0;
        let legs = world.get::<Branch3Legs>(parent).unwrap();
        let rating = world.get::<Branch3Rating>(parent).unwrap();
        let status = world.get::<Branch3Status>(parent).unwrap();
        let mut p = [S::Real::zero(); 3];
        let mut q = [S::Real::zero(); 3];
        let mut i = [S::Real::zero(); 3];
        let mut s = [S::Real::zero(); 3];
        let mut loading = 0.0f64;
        let mut energized = false;
        for side in 0..3 {
            let leg_entity = legs.legs[side];
            let b = reg
                .branches
                .iter()
                .position(|&e| e == leg_entity)
                .unwrap();
            let leg_out = branch_output::<S>(world, model, solved, b, leg_entity, NA_INT_ID);
            energized |= leg_out.energized && status.status[side];
            p[side] = leg_out.p_from;
            q[side] = leg_out.q_from;
            i[side] = leg_out.i_from;
            s[side] = leg_out.s_from;
            if rating.sn[side] > 0.0 {
                loading = loading.max(sum_of::<S>(leg_out.s_from) / rating.sn[side]);
            }
        }
        output.branch3.push(Branch3Output {
            id,
            energized,
            p,
            q,
            i,
            s,
            loading,
        });
    }

    // appliances
    let appliance = |entities: &[Entity],
                     math_of: &std::collections::HashMap<Entity, usize>,
                     solved_list: &[crate::basic::solver::ApplianceSolverOutput<S>],
                     base_i_of: &dyn Fn(Entity) -> f64,
                     direction: &dyn Fn(Entity) -> f64|
     -> Vec<ApplianceOutput<S>> {
        entities
            .iter()
            .map(|&e| {
                let id = world.get::<ElemId>(e).unwrap().0;
                let on = **world.get::<ApplianceStatus>(e).unwrap();
                match math_of.get(&e) {
                    Some(&m) if on => {
                        let out = solved_list[m];
                        let dir = direction(e);
                        let p = out.s.re().scale(S::BASE_POWER * dir);
                        let q = out.s.im().scale(S::BASE_POWER * dir);
                        let s = out.s.cabs().scale(S::BASE_POWER);
                        let i = out.i.cabs().scale(base_i_of(e));
                        let pf = power_factor::<S>(p, s);
                        ApplianceOutput {
                            id,
                            energized: true,
                            p,
                            q,
                            i,
                            s,
                            pf,
                        }
                    }
                    _ => ApplianceOutput {
                        id,
                        energized: false,
                        p: S::Real::zero(),
                        q: S::Real::zero(),
                        i: S::Real::zero(),
                        s: S::Real::zero(),
                        pf: S::Real::zero(),
                    },
                }
            })
            .collect()
    };

    let base_i_of = |e: Entity| {
        let slot = **world.get::<NodeSlot>(e).unwrap();
        let u_rated = world.get::<NodeParam>(reg.nodes[slot]).unwrap().u_rated;
        BASE_POWER_3P / u_rated / SQRT3
    };
    // sources and shunts follow the math-model sign; loads flip to their
    // physical consumption convention
    output.source = appliance(
        &reg.sources,
        &model.math_source_of,
        &solved.source,
        &base_i_of,
        &|_| 1.0,
    );
    output.shunt = appliance(
        &reg.shunts,
        &model.math_shunt_of,
        &solved.shunt,
        &base_i_of,
        &|_| -1.0,
    );
    output.load_gen = appliance(
        &reg.load_gens,
        &model.math_load_gen_of,
        &solved.load_gen,
        &base_i_of,
        &|e| {
            if let Some(m) = world.get::<SymLoadGenModel>(e) {
                m.direction
            } else {
                world.get::<AsymLoadGenModel>(e).unwrap().direction
            }
        },
    );

    extract_sensor_outputs(world, reg, model, solved, &mut output);

    output.fault = reg
        .faults
        .iter()
        .map(|&e| {
            let id = world.get::<ElemId>(e).unwrap().0;
            let m = world.get::<FaultModel>(e).unwrap();
            let slot = reg.node_slot.get(&m.fault_object).copied();
            let energized =
                slot.is_some_and(|s| model.bus_of_slot[s].is_some());
            FaultOutput { id, energized }
        })
        .collect();

    output
}

fn branch_output<S: Symmetry>(
    world: &World,
    model: &MathModel,
    solved: &SolverOutput<S>,
    b: usize,
    branch: Entity,
    id: ID,
) -> BranchOutput<S> {
    let status = world.get::<BranchStatus>(branch).unwrap();
    let idx = model.topo.branch_bus_idx[b];
    let energized =
        (idx.from_connected() || idx.to_connected()) && (status.from || status.to);
    if !energized {
        return BranchOutput {
            id,
            energized: false,
            p_from: S::Real::zero(),
            q_from: S::Real::zero(),
            i_from: S::Real::zero(),
            s_from: S::Real::zero(),
            p_to: S::Real::zero(),
            q_to: S::Real::zero(),
            i_to: S::Real::zero(),
            s_to: S::Real::zero(),
            loading: 0.0,
        };
    }
    let base = world.get::<BranchBase>(branch).unwrap();
    let flow = &solved.branch[b];
    let p_from = flow.s_f.re().scale(S::BASE_POWER);
    let q_from = flow.s_f.im().scale(S::BASE_POWER);
    let i_from = flow.i_f.cabs().scale(base.base_i_from);
    let s_from = flow.s_f.cabs().scale(S::BASE_POWER);
    let p_to = flow.s_t.re().scale(S::BASE_POWER);
    let q_to = flow.s_t.im().scale(S::BASE_POWER);
    let i_to = flow.i_t.cabs().scale(base.base_i_to);
    let s_to = flow.s_t.cabs().scale(S::BASE_POWER);
    let max_s = sum_of::<S>(s_from).max(sum_of::<S>(s_to));
    let max_i = i_from.max_val().max(i_to.max_val());
    let loading = match world.get::<LoadingRule>(branch).unwrap() {
        LoadingRule::Current { i_n } => max_i / i_n,
        LoadingRule::Power { sn } => max_s / sn,
        LoadingRule::None => 0.0,
    };
    BranchOutput {
        id,
        energized: true,
        p_from,
        q_from,
        i_from,
        s_from,
        p_to,
        q_to,
        i_to,
        s_to,
        loading,
    }
}

fn extract_sensor_outputs<S: Symmetry>(
    world: &World,
    reg: &ElementRegistry,
    model: &MathModel,
    solved: &SolverOutput<S>,
    output: &mut GridOutput<S>,
) {
    // voltage sensors
    for &sensor in &reg.voltage_sensors {
        let id = world.get::<ElemId>(sensor).unwrap().0;
        let SensorRef::Node(slot) = *world.get::<SensorRef>(sensor).unwrap() else {
            continue;
        };
        let Some(bus) = model.bus_of_slot[slot] else {
            output.voltage_sensor.push(VoltageSensorOutput {
                id,
                energized: false,
                u_residual: nan_real::<S>(),
                u_angle_residual: nan_real::<S>(),
            });
            continue;
        };
        let u_rated = world
            .get::<NodeParam>(reg.nodes[slot])
            .unwrap()
            .u_rated;
        let u = solved.u[bus];
        let (mag_meas, ang_meas, has_angle) = measured_voltage::<S>(world, sensor, u_rated);
        let u_residual = (mag_meas - u.cabs()).scale(u_rated * S::U_SCALE);
        let u_angle_residual = if has_angle {
            ang_meas - u.arg()
        } else {
            nan_real::<S>()
        };
        output.voltage_sensor.push(VoltageSensorOutput {
            id,
            energized: true,
            u_residual,
            u_angle_residual,
        });
    }

    // power sensors: residual against the computed quantity of the target
    for &sensor in &reg.power_sensors {
        let id = world.get::<ElemId>(sensor).unwrap().0;
        let target = *world.get::<SensorRef>(sensor).unwrap();
        let computed = computed_power::<S>(reg, model, solved, target);
        let Some(s_calc) = computed else {
            output.power_sensor.push(PowerSensorOutput {
                id,
                energized: false,
                p_residual: nan_real::<S>(),
                q_residual: nan_real::<S>(),
            });
            continue;
        };
        let (meas, direction) = measured_power::<S>(world, sensor);
        let residual = (meas - s_calc).scale(S::BASE_POWER * direction);
        output.power_sensor.push(PowerSensorOutput {
            id,
            energized: true,
            p_residual: residual.re(),
            q_residual: residual.im(),
        });
    }

    // current sensors: residual in magnitude and (frame-matched) angle
    for &sensor in &reg.current_sensors {
        let id = world.get::<ElemId>(sensor).unwrap().0;
        let target = *world.get::<SensorRef>(sensor).unwrap();
        let computed = computed_current::<S>(reg, model, solved, target);
        let Some((i_calc, u_side)) = computed else {
            output.current_sensor.push(CurrentSensorOutput {
                id,
                energized: false,
                i_residual: nan_real::<S>(),
                i_angle_residual: nan_real::<S>(),
            });
            continue;
        };
        let base_i = match target {
            SensorRef::BranchFrom(b) => {
                let slot = model.slot_of_bus[model.topo.branch_bus_idx[b].from as usize];
                base_i_of_slot(world, reg, slot)
            }
            SensorRef::BranchTo(b) => {
                let slot = model.slot_of_bus[model.topo.branch_bus_idx[b].to as usize];
                base_i_of_slot(world, reg, slot)
            }
            _ => continue,
        };
        let (mag_meas, ang_meas, angle_type) = measured_current::<S>(world, sensor, base_i);
        let i_residual = (mag_meas - i_calc.cabs()).scale(base_i);
        let ang_calc = match angle_type {
            AngleMeasurementType::GlobalAngle => i_calc.arg(),
            // local frame: angle against the measured node's voltage
            AngleMeasurementType::LocalAngle => i_calc.conj().mul_ew(u_side.phase()).arg(),
        };
        output.current_sensor.push(CurrentSensorOutput {
            id,
            energized: true,
            i_residual,
            i_angle_residual: ang_meas - ang_calc,
        });
    }
}

fn base_i_of_slot(world: &World, reg: &ElementRegistry, slot: usize) -> f64 {
    let u_rated = world.get::<NodeParam>(reg.nodes[slot]).unwrap().u_rated;
    BASE_POWER_3P / u_rated / SQRT3
}

fn measured_voltage<S: Symmetry>(
    world: &World,
    sensor: Entity,
    u_rated: f64,
) -> (S::Real, S::Real, bool) {
    if let Some(m) = world.get::<SymVoltageSensorModel>(sensor) {
        (
            S::Real::splat(m.u_measured / u_rated),
            S::Real::splat(m.u_angle_measured),
            !m.u_angle_measured.is_nan(),
        )
    } else {
        let m = world.get::<AsymVoltageSensorModel>(sensor).unwrap();
        let scale = u_rated / SQRT3;
        let mags = Vector3::from_fn(|i, _| m.u_measured[i] / scale);
        let angles = Vector3::from_fn(|i, _| m.u_angle_measured[i]);
        (
            S::mean_real_from_abc(mags),
            S::mean_real_from_abc(angles),
            m.u_angle_measured.iter().all(|a| !a.is_nan()),
        )
    }
}

fn measured_power<S: Symmetry>(world: &World, sensor: Entity) -> (S::Complex, f64) {
    if let Some(m) = world.get::<SymPowerSensorModel>(sensor) {
        let s = Complex64::new(m.p_measured, m.q_measured) * m.direction / BASE_POWER_3P;
        (S::Complex::splat(s), m.direction)
    } else {
        let m = world.get::<AsymPowerSensorModel>(sensor).unwrap();
        let s = Vector3::from_fn(|i, _| {
            Complex64::new(m.p_measured[i], m.q_measured[i]) * m.direction / BASE_POWER_1P
        });
        (S::mean_from_abc(s), m.direction)
    }
}

fn measured_current<S: Symmetry>(
    world: &World,
    sensor: Entity,
    base_i: f64,
) -> (S::Real, S::Real, AngleMeasurementType) {
    if let Some(m) = world.get::<SymCurrentSensorModel>(sensor) {
        (
            S::Real::splat(m.i_measured / base_i),
            S::Real::splat(m.i_angle_measured),
            m.angle_measurement_type,
        )
    } else {
        let m = world.get::<AsymCurrentSensorModel>(sensor).unwrap();
        (
            S::mean_real_from_abc(Vector3::from_fn(|i, _| m.i_measured[i] / base_i)),
            S::mean_real_from_abc(Vector3::from_fn(|i, _| m.i_angle_measured[i])),
            m.angle_measurement_type,
        )
    }
}

fn computed_power<S: Symmetry>(
    reg: &ElementRegistry,
    model: &MathModel,
    solved: &SolverOutput<S>,
    target: SensorRef,
) -> Option<S::Complex> {
    match target {
        SensorRef::Node(slot) => model.bus_of_slot[slot].map(|bus| solved.bus_injection[bus]),
        SensorRef::Source(i) => model
            .math_source_of
            .get(&reg.sources[i])
            .map(|&m| solved.source[m].s),
        SensorRef::Shunt(i) => model
            .math_shunt_of
            .get(&reg.shunts[i])
            .map(|&m| solved.shunt[m].s),
        SensorRef::LoadGen(i) => model
            .math_load_gen_of
            .get(&reg.load_gens[i])
            .map(|&m| solved.load_gen[m].s),
        SensorRef::BranchFrom(b) => model.topo.branch_bus_idx[b]
            .from_connected()
            .then(|| solved.branch[b].s_f),
        SensorRef::BranchTo(b) => model.topo.branch_bus_idx[b]
            .to_connected()
            .then(|| solved.branch[b].s_t),
    }
}

fn computed_current<S: Symmetry>(
    reg: &ElementRegistry,
    model: &MathModel,
    solved: &SolverOutput<S>,
    target: SensorRef,
) -> Option<(S::Complex, S::Complex)> {
    let _ = reg;
    match target {
        SensorRef::BranchFrom(b) => {
            let idx = model.topo.branch_bus_idx[b];
            idx.from_connected()
                .then(|| (solved.branch[b].i_f, solved.u[idx.from as usize]))
        }
        SensorRef::BranchTo(b) => {
            let idx = model.topo.branch_bus_idx[b];
            idx.to_connected()
                .then(|| (solved.branch[b].i_t, solved.u[idx.to as usize]))
        }
        _ => None,
    }
}

fn power_factor<S: Symmetry>(p: S::Real, s: S::Real) -> S::Real {
    let p_abc = S::real_to_abc(p);
    let s_abc = S::real_to_abc(s);
    S::mean_real_from_abc(Vector3::from_fn(|i, _| {
        if s_abc[i] < NUMERICAL_TOLERANCE {
            0.0
        } else {
            p_abc[i] / s_abc[i]
        }
    }))
}

/// Total apparent power over the phases.
fn sum_of<S: Symmetry>(r: S::Real) -> f64 {
    r.sum()
}

/// Extracts the short-circuit output records.
pub fn extract_sc_output<S: Symmetry>(
    world: &World,
    reg: &ElementRegistry,
    model: &MathModel,
    solved: &ShortCircuitSolverOutput<S>,
) -> ShortCircuitGridOutput {
    let mut output = ShortCircuitGridOutput::default();
    for (slot, &node) in reg.nodes.iter().take(reg.n_input_nodes).enumerate() {
        let id = world.get::<ElemId>(node).map_or(NA_INT_ID, |i| i.0);
        let u_rated = world.get::<NodeParam>(node).unwrap().u_rated;
        match model.bus_of_slot[slot] {
            Some(bus) => {
                let u = S::to_abc(solved.u_bus[bus]);
                output.node.push(NodeScOutput {
                    id,
                    energized: true,
                    u_pu: u.map(|c| c.norm()),
                    u: u.map(|c| c.norm() * u_rated / SQRT3),
                    u_angle: u.map(|c| c.arg()),
                });
            }
            None => output.node.push(NodeScOutput {
                id,
                energized: false,
                u_pu: Vector3::from_element(f64::NAN),
                u: Vector3::from_element(f64::NAN),
                u_angle: Vector3::from_element(f64::NAN),
            }),
        }
    }

    for (b, &branch) in reg.branches.iter().enumerate() {
        let Some(id) = world.get::<ElemId>(branch) else {
            continue;
        };
        let base = world.get::<BranchBase>(branch).unwrap();
        let idx = model.topo.branch_bus_idx[b];
        let energized = idx.from_connected() || idx.to_connected();
        let (i_f, i_t) = if energized {
            (
                S::to_abc(solved.branch[b].i_f),
                S::to_abc(solved.branch[b].i_t),
            )
        } else {
            (Vector3::zeros(), Vector3::zeros())
        };
        output.branch.push(BranchScOutput {
            id: id.0,
            energized,
            i_from: i_f.map(|c| c.norm() * base.base_i_from),
            i_from_angle: i_f.map(|c| c.arg()),
            i_to: i_t.map(|c| c.norm() * base.base_i_to),
            i_to_angle: i_t.map(|c| c.arg()),
        });
    }

    for (m, &source) in model.source_entities.iter().enumerate() {
        let id = world.get::<ElemId>(source).unwrap().0;
        let i = S::to_abc(solved.source[m].i);
        let slot = **world.get::<NodeSlot>(source).unwrap();
        let base_i = base_i_of_slot(world, reg, slot);
        output.source.push(SourceScOutput {
            id,
            energized: true,
            i: i.map(|c| c.norm() * base_i),
            i_angle: i.map(|c| c.arg()),
        });
    }

    // faults in math order; de-energized faults report nothing
    let mut by_entity = std::collections::HashMap::new();
    for (m, &fault) in model.fault_entities.iter().enumerate() {
        by_entity.insert(fault, m);
    }
    for &fault in &reg.faults {
        let id = world.get::<ElemId>(fault).unwrap().0;
        match by_entity.get(&fault) {
            Some(&m) => {
                let fm = world.get::<FaultModel>(fault).unwrap();
                let slot = reg.node_slot[&fm.fault_object];
                let base_i = base_i_of_slot(world, reg, slot);
                let i = S::to_abc(solved.fault[m].i_fault);
                output.fault.push(FaultScOutput {
                    id,
                    energized: true,
                    i_f: i.map(|c| c.norm() * base_i),
                    i_f_angle: i.map(|c| c.arg()),
                });
            }
            None => output.fault.push(FaultScOutput {
                id,
                energized: false,
                i_f: Vector3::zeros(),
                i_f_angle: Vector3::from_element(f64::NAN),
            }),
        }
    }
    output
}

/// A float rendered with a fixed number of decimals in tables.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

#[derive(Debug, Tabled)]
pub(crate) struct NodeResTable {
    pub(crate) id: ID,
    pub(crate) energized: bool,
    pub(crate) u_pu: FloatWrapper,
    pub(crate) u_kv: FloatWrapper,
    pub(crate) u_angle_deg: FloatWrapper,
    pub(crate) p_mw: FloatWrapper,
    pub(crate) q_mvar: FloatWrapper,
}

#[derive(Debug, Tabled)]
pub(crate) struct BranchResTable {
    pub(crate) id: ID,
    pub(crate) energized: bool,
    pub(crate) p_from_mw: FloatWrapper,
    pub(crate) q_from_mvar: FloatWrapper,
    pub(crate) p_to_mw: FloatWrapper,
    pub(crate) q_to_mvar: FloatWrapper,
    pub(crate) i_from_ka: FloatWrapper,
    pub(crate) i_to_ka: FloatWrapper,
    pub(crate) loading_percent: FloatWrapper,
}

fn mean_of<S: Symmetry>(r: S::Real) -> f64 {
    let abc = S::real_to_abc(r);
    (abc[0] + abc[1] + abc[2]) / 3.0
}

impl<S: Symmetry> GridOutput<S> {
    /// Renders the node results as a markdown table.
    pub fn node_table(&self) -> String {
        let rows = self.node.iter().map(|n| NodeResTable {
            id: n.id,
            energized: n.energized,
            u_pu: FloatWrapper::new(mean_of::<S>(n.u_pu), 4),
            u_kv: FloatWrapper::new(mean_of::<S>(n.u) / 1e3, 4),
            u_angle_deg: FloatWrapper::new(mean_of::<S>(n.u_angle).to_degrees(), 3),
            p_mw: FloatWrapper::new(n.p.sum() / 1e6, 5),
            q_mvar: FloatWrapper::new(n.q.sum() / 1e6, 5),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }

    /// Renders the branch results as a markdown table.
    pub fn branch_table(&self) -> String {
        let rows = self.branch.iter().map(|b| BranchResTable {
            id: b.id,
            energized: b.energized,
            p_from_mw: FloatWrapper::new(b.p_from.sum() / 1e6, 5),
            q_from_mvar: FloatWrapper::new(b.q_from.sum() / 1e6, 5),
            p_to_mw: FloatWrapper::new(b.p_to.sum() / 1e6, 5),
            q_to_mvar: FloatWrapper::new(b.q_to.sum() / 1e6, 5),
            i_from_ka: FloatWrapper::new(mean_of::<S>(b.i_from) / 1e3, 5),
            i_to_ka: FloatWrapper::new(mean_of::<S>(b.i_to) / 1e3, 5),
            loading_percent: FloatWrapper::new(b.loading * 100.0, 1),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }

    /// Writes the node results as CSV.
    pub fn write_node_csv<W: std::io::Write>(&self, writer: W) -> csv::Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record([
            "id",
            "energized",
            super::units::COL_U_PU,
            super::units::COL_U_KV,
            super::units::COL_U_ANGLE,
            super::units::COL_P_MW,
            super::units::COL_Q_MVAR,
        ])?;
        for n in &self.node {
            w.write_record([
                n.id.to_string(),
                (n.energized as u8).to_string(),
                format!("{:.6}", mean_of::<S>(n.u_pu)),
                format!("{:.6}", mean_of::<S>(n.u) / 1e3),
                format!("{:.6}", mean_of::<S>(n.u_angle).to_degrees()),
                format!("{:.6}", n.p.sum() / 1e6),
                format!("{:.6}", n.q.sum() / 1e6),
            ])?;
        }
        w.flush()?;
        Ok(())
    }

    /// Writes the branch results as CSV.
    pub fn write_branch_csv<W: std::io::Write>(&self, writer: W) -> csv::Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record([
            "id",
            "energized",
            super::units::COL_P_FROM,
            super::units::COL_Q_FROM,
            super::units::COL_P_TO,
            super::units::COL_Q_TO,
            super::units::COL_I_FROM,
            super::units::COL_I_TO,
            super::units::COL_LOADING,
        ])?;
        for b in &self.branch {
            w.write_record([
                b.id.to_string(),
                (b.energized as u8).to_string(),
                format!("{:.6}", b.p_from.sum() / 1e6),
                format!("{:.6}", b.q_from.sum() / 1e6),
                format!("{:.6}", b.p_to.sum() / 1e6),
                format!("{:.6}", b.q_to.sum() / 1e6),
                format!("{:.6}", mean_of::<S>(b.i_from) / 1e3),
                format!("{:.6}", mean_of::<S>(b.i_to) / 1e3),
                format!("{:.6}", b.loading * 100.0),
            ])?;
        }
        w.flush()?;
        Ok(())
    }
}
