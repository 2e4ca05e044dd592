//! Update-record application.
//!
//! NaN and `na` fields mean "unchanged". `inverse` produces, for exactly the
//! fields an update would touch, the record that restores the pre-update
//! state — applying an update followed by its inverse restores every
//! observable output.

use bevy_ecs::prelude::*;

use crate::basic::common::*;
use crate::basic::error::GridError;
use crate::basic::param::*;
use crate::io::records::*;

use super::elements::*;
use super::systems::{ComponentKind, ElementRegistry};

/// What the applied updates invalidated. Structural changes force a math
/// model rebuild; value-only changes flow into the next solve's inputs.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct DirtyFlags {
    pub topo: bool,
}

fn set_f64(target: &mut f64, value: f64) {
    if !value.is_nan() {
        *target = value;
    }
}

fn set_f64_3(target: &mut [f64; 3], value: [f64; 3]) {
    for (t, v) in target.iter_mut().zip(value) {
        if !v.is_nan() {
            *t = v;
        }
    }
}

fn set_status(target: &mut bool, value: IntS) -> bool {
    if is_na_ints(value) {
        return false;
    }
    let new = value != 0;
    let changed = *target != new;
    *target = new;
    changed
}

/// Applies one update record to the component state.
pub fn apply_update(world: &mut World, update: &UpdateRecord) -> Result<(), GridError> {
    let reg = world.resource::<ElementRegistry>().clone();
    let (kind, entity) = reg.lookup(update.id())?;
    let wrong = GridError::IdWrongType {
        sensor: update.id(),
        object: update.id(),
    };
    let mut topo_dirty = false;
    match update {
        UpdateRecord::Branch(u) => {
            if kind != ComponentKind::Branch {
                return Err(wrong);
            }
            let mut status = world.get_mut::<BranchStatus>(entity).ok_or(wrong.clone())?;
            topo_dirty |= set_status(&mut status.from, u.from_status);
            topo_dirty |= set_status(&mut status.to, u.to_status);
        }
        UpdateRecord::Transformer(u) => {
            if kind != ComponentKind::Branch || world.get::<TransformerParam>(entity).is_none() {
                return Err(wrong);
            }
            {
                let mut status = world.get_mut::<BranchStatus>(entity).unwrap();
                topo_dirty |= set_status(&mut status.from, u.from_status);
                topo_dirty |= set_status(&mut status.to, u.to_status);
            }
            if !is_na_ints(u.tap_pos) {
                let mut param = world.get_mut::<TransformerParam>(entity).unwrap();
                param.tap_pos = param.clamp_tap(u.tap_pos);
            }
        }
        UpdateRecord::ThreeWindingTransformer(u) => {
            if kind != ComponentKind::Branch3 {
                return Err(wrong);
            }
            let mut input = world.get::<Branch3Input>(entity).unwrap().0;
            if !is_na_ints(u.status_1) {
                input.status_1 = u.status_1;
            }
            if !is_na_ints(u.status_2) {
                input.status_2 = u.status_2;
            }
            if !is_na_ints(u.status_3) {
                input.status_3 = u.status_3;
            }
            if !is_na_ints(u.tap_pos) {
                input.tap_pos = u.tap_pos;
            }
            rebuild_three_winding(world, entity, input)?;
            topo_dirty = true;
        }
        UpdateRecord::Source(u) => {
            if kind != ComponentKind::Source {
                return Err(wrong);
            }
            {
                let mut status = world.get_mut::<ApplianceStatus>(entity).unwrap();
                topo_dirty |= set_status(&mut status.0, u.status);
            }
            let mut model = world.get_mut::<SourceModel>(entity).unwrap();
            set_f64(&mut model.u_ref, u.u_ref);
            set_f64(&mut model.u_ref_angle, u.u_ref_angle);
        }
        UpdateRecord::Shunt(u) => {
            if kind != ComponentKind::Shunt {
                return Err(wrong);
            }
            {
                let mut status = world.get_mut::<ApplianceStatus>(entity).unwrap();
                set_status(&mut status.0, u.status);
            }
            let mut model = world.get_mut::<ShuntModel>(entity).unwrap();
            set_f64(&mut model.g1, u.g1);
            set_f64(&mut model.b1, u.b1);
            set_f64(&mut model.g0, u.g0);
            set_f64(&mut model.b0, u.b0);
        }
        UpdateRecord::SymLoadGen(u) => {
            if kind != ComponentKind::LoadGen {
                return Err(wrong);
            }
            let mut model = world.get_mut::<SymLoadGenModel>(entity).ok_or(wrong.clone())?;
            set_f64(&mut model.p_specified, u.p_specified);
            set_f64(&mut model.q_specified, u.q_specified);
            let mut status = world.get_mut::<ApplianceStatus>(entity).unwrap();
            set_status(&mut status.0, u.status);
        }
        UpdateRecord::AsymLoadGen(u) => {
            if kind != ComponentKind::LoadGen {
                return Err(wrong);
            }
            let mut model = world
                .get_mut::<AsymLoadGenModel>(entity)
                .ok_or(wrong.clone())?;
            set_f64_3(&mut model.p_specified, u.p_specified);
            set_f64_3(&mut model.q_specified, u.q_specified);
            let mut status = world.get_mut::<ApplianceStatus>(entity).unwrap();
            set_status(&mut status.0, u.status);
        }
        UpdateRecord::SymVoltageSensor(u) => {
            let mut model = world
                .get_mut::<SymVoltageSensorModel>(entity)
                .ok_or(wrong.clone())?;
            set_f64(&mut model.u_sigma, u.u_sigma);
            set_f64(&mut model.u_measured, u.u_measured);
            set_f64(&mut model.u_angle_measured, u.u_angle_measured);
        }
        UpdateRecord::AsymVoltageSensor(u) => {
            let mut model = world
                .get_mut::<AsymVoltageSensorModel>(entity)
                .ok_or(wrong.clone())?;
            set_f64(&mut model.u_sigma, u.u_sigma);
            set_f64_3(&mut model.u_measured, u.u_measured);
            set_f64_3(&mut model.u_angle_measured, u.u_angle_measured);
        }
        UpdateRecord::SymPowerSensor(u) => {
            let mut model = world
                .get_mut::<SymPowerSensorModel>(entity)
                .ok_or(wrong.clone())?;
            set_f64(&mut model.power_sigma, u.power_sigma);
            set_f64(&mut model.p_measured, u.p_measured);
            set_f64(&mut model.q_measured, u.q_measured);
            set_f64(&mut model.p_sigma, u.p_sigma);
            set_f64(&mut model.q_sigma, u.q_sigma);
        }
        UpdateRecord::AsymPowerSensor(u) => {
            let mut model = world
                .get_mut::<AsymPowerSensorModel>(entity)
                .ok_or(wrong.clone())?;
            set_f64(&mut model.power_sigma, u.power_sigma);
            set_f64_3(&mut model.p_measured, u.p_measured);
            set_f64_3(&mut model.q_measured, u.q_measured);
            set_f64_3(&mut model.p_sigma, u.p_sigma);
            set_f64_3(&mut model.q_sigma, u.q_sigma);
        }
        UpdateRecord::SymCurrentSensor(u) => {
            let mut model = world
                .get_mut::<SymCurrentSensorModel>(entity)
                .ok_or(wrong.clone())?;
            set_f64(&mut model.i_sigma, u.i_sigma);
            set_f64(&mut model.i_angle_sigma, u.i_angle_sigma);
            set_f64(&mut model.i_measured, u.i_measured);
            set_f64(&mut model.i_angle_measured, u.i_angle_measured);
        }
        UpdateRecord::AsymCurrentSensor(u) => {
            let mut model = world
                .get_mut::<AsymCurrentSensorModel>(entity)
                .ok_or(wrong.clone())?;
            set_f64(&mut model.i_sigma, u.i_sigma);
            set_f64(&mut model.i_angle_sigma, u.i_angle_sigma);
            set_f64_3(&mut model.i_measured, u.i_measured);
            set_f64_3(&mut model.i_angle_measured, u.i_angle_measured);
        }
        UpdateRecord::Fault(u) => {
            if kind != ComponentKind::Fault {
                return Err(wrong);
            }
            let mut model = *world.get::<FaultModel>(entity).unwrap();
            let changed = set_status(&mut model.status, u.status);
            if !is_na_ints(u.fault_type) {
                model.fault_type = Some(lift_enum(u.fault_type, "fault type")?);
            }
            if !is_na_ints(u.fault_phase) {
                model.fault_phase = lift_enum(u.fault_phase, "fault phase")?;
            }
            if !is_na_id(u.fault_object) {
                let (object_kind, _) = reg.lookup(u.fault_object)?;
                if object_kind != ComponentKind::Node {
                    return Err(GridError::IdWrongType {
                        sensor: u.id,
                        object: u.fault_object,
                    });
                }
                model.fault_object = u.fault_object;
                topo_dirty = true;
            }
            set_f64(&mut model.r_f, u.r_f);
            set_f64(&mut model.x_f, u.x_f);
            if let Some(t) = model.fault_type {
                check_fault_phase(t, model.fault_phase)?;
            }
            topo_dirty |= changed;
            *world.get_mut::<FaultModel>(entity).unwrap() = model;
        }
    }
    if topo_dirty {
        world.resource_mut::<DirtyFlags>().topo = true;
    }
    Ok(())
}

/// Recomputes the internal legs of a three-winding transformer after a
/// status or tap update.
fn rebuild_three_winding(
    world: &mut World,
    parent: Entity,
    input: ThreeWindingTransformerInput,
) -> Result<(), GridError> {
    let legs = world.get::<Branch3Legs>(parent).unwrap().clone();
    let reg = world.resource::<ElementRegistry>().clone();
    let rated = [
        world
            .get::<NodeParam>(reg.nodes[reg.node_slot[&input.node_1]])
            .unwrap()
            .u_rated,
        world
            .get::<NodeParam>(reg.nodes[reg.node_slot[&input.node_2]])
            .unwrap()
            .u_rated,
        world
            .get::<NodeParam>(reg.nodes[reg.node_slot[&input.node_3]])
            .unwrap()
            .u_rated,
    ];
    let (params, status) = three_winding_legs(&input, rated)?;
    for (side, param) in params.into_iter().enumerate() {
        let leg = legs.legs[side];
        *world.get_mut::<TransformerParam>(leg).unwrap() = param;
        world.get_mut::<BranchStatus>(leg).unwrap().from = status[side];
    }
    world.get_mut::<Branch3Status>(parent).unwrap().status = status;
    world.get_mut::<Branch3Input>(parent).unwrap().0 = input;
    Ok(())
}

/// Builds the record that restores the state an update would overwrite:
/// every non-`na` field of the update is answered with the current value.
pub fn inverse_update(world: &World, update: &UpdateRecord) -> Result<UpdateRecord, GridError> {
    let reg = world.resource::<ElementRegistry>();
    let (_, entity) = reg.lookup(update.id())?;
    let keep_f64 = |field: f64, current: f64| if field.is_nan() { f64::NAN } else { current };
    let keep_f64_3 = |field: [f64; 3], current: [f64; 3]| {
        let mut out = [f64::NAN; 3];
        for i in 0..3 {
            if !field[i].is_nan() {
                out[i] = current[i];
            }
        }
        out
    };
    let keep_status = |field: IntS, current: bool| {
        if is_na_ints(field) {
            NA_INT_S
        } else {
            current as IntS
        }
    };
    Ok(match update {
        UpdateRecord::Branch(u) => {
            let status = world.get::<BranchStatus>(entity).ok_or_else(|| {
                GridError::IdWrongType {
                    sensor: u.id,
                    object: u.id,
                }
            })?;
            UpdateRecord::Branch(BranchUpdate {
                id: u.id,
                from_status: keep_status(u.from_status, status.from),
                to_status: keep_status(u.to_status, status.to),
            })
        }
        UpdateRecord::Transformer(u) => {
            let status = world.get::<BranchStatus>(entity).unwrap();
            let param = world.get::<TransformerParam>(entity).unwrap();
            UpdateRecord::Transformer(TransformerUpdate {
                id: u.id,
                from_status: keep_status(u.from_status, status.from),
                to_status: keep_status(u.to_status, status.to),
                tap_pos: if is_na_ints(u.tap_pos) {
                    NA_INT_S
                } else {
                    param.tap_pos
                },
            })
        }
        UpdateRecord::ThreeWindingTransformer(u) => {
            let input = world.get::<Branch3Input>(entity).unwrap().0;
            let status = world.get::<Branch3Status>(entity).unwrap();
            UpdateRecord::ThreeWindingTransformer(Branch3Update {
                id: u.id,
                status_1: keep_status(u.status_1, status.status[0]),
                status_2: keep_status(u.status_2, status.status[1]),
                status_3: keep_status(u.status_3, status.status[2]),
                tap_pos: if is_na_ints(u.tap_pos) {
                    NA_INT_S
                } else if is_na_ints(input.tap_pos) {
                    if is_na_ints(input.tap_nom) { 0 } else { input.tap_nom }
                } else {
                    input.tap_pos
                },
            })
        }
        UpdateRecord::Source(u) => {
            let status = world.get::<ApplianceStatus>(entity).unwrap();
            let model = world.get::<SourceModel>(entity).unwrap();
            UpdateRecord::Source(SourceUpdate {
                id: u.id,
                status: keep_status(u.status, status.0),
                u_ref: keep_f64(u.u_ref, model.u_ref),
                u_ref_angle: keep_f64(u.u_ref_angle, model.u_ref_angle),
            })
        }
        UpdateRecord::Shunt(u) => {
            let status = world.get::<ApplianceStatus>(entity).unwrap();
            let model = world.get::<ShuntModel>(entity).unwrap();
            UpdateRecord::Shunt(ShuntUpdate {
                id: u.id,
                status: keep_status(u.status, status.0),
                g1: keep_f64(u.g1, model.g1),
                b1: keep_f64(u.b1, model.b1),
                g0: keep_f64(u.g0, model.g0),
                b0: keep_f64(u.b0, model.b0),
            })
        }
        UpdateRecord::SymLoadGen(u) => {
            let status = world.get::<ApplianceStatus>(entity).unwrap();
            let model = world.get::<SymLoadGenModel>(entity).ok_or_else(|| {
                GridError::IdWrongType {
                    sensor: u.id,
                    object: u.id,
                }
            })?;
            UpdateRecord::SymLoadGen(SymLoadGenUpdate {
                id: u.id,
                status: keep_status(u.status, status.0),
                p_specified: keep_f64(u.p_specified, model.p_specified),
                q_specified: keep_f64(u.q_specified, model.q_specified),
            })
        }
        UpdateRecord::AsymLoadGen(u) => {
            let status = world.get::<ApplianceStatus>(entity).unwrap();
            let model = world.get::<AsymLoadGenModel>(entity).ok_or_else(|| {
                GridError::IdWrongType {
                    sensor: u.id,
                    object: u.id,
                }
            })?;
            UpdateRecord::AsymLoadGen(AsymLoadGenUpdate {
                id: u.id,
                status: keep_status(u.status, status.0),
                p_specified: keep_f64_3(u.p_specified, model.p_specified),
                q_specified: keep_f64_3(u.q_specified, model.q_specified),
            })
        }
        UpdateRecord::SymVoltageSensor(u) => {
            let model = world.get::<SymVoltageSensorModel>(entity).unwrap();
            UpdateRecord::SymVoltageSensor(SymVoltageSensorUpdate {
                id: u.id,
                u_sigma: keep_f64(u.u_sigma, model.u_sigma),
                u_measured: keep_f64(u.u_measured, model.u_measured),
                u_angle_measured: keep_f64(u.u_angle_measured, model.u_angle_measured),
            })
        }
        UpdateRecord::AsymVoltageSensor(u) => {
            let model = world.get::<AsymVoltageSensorModel>(entity).unwrap();
            UpdateRecord::AsymVoltageSensor(AsymVoltageSensorUpdate {
                id: u.id,
                u_sigma: keep_f64(u.u_sigma, model.u_sigma),
                u_measured: keep_f64_3(u.u_measured, model.u_measured),
                u_angle_measured: keep_f64_3(u.u_angle_measured, model.u_angle_measured),
            })
        }
        UpdateRecord::SymPowerSensor(u) => {
            let model = world.get::<SymPowerSensorModel>(entity).unwrap();
            UpdateRecord::SymPowerSensor(SymPowerSensorUpdate {
                id: u.id,
                power_sigma: keep_f64(u.power_sigma, model.power_sigma),
                p_measured: keep_f64(u.p_measured, model.p_measured),
                q_measured: keep_f64(u.q_measured, model.q_measured),
                p_sigma: keep_f64(u.p_sigma, model.p_sigma),
                q_sigma: keep_f64(u.q_sigma, model.q_sigma),
            })
        }
        UpdateRecord::AsymPowerSensor(u) => {
            let model = world.get::<AsymPowerSensorModel>(entity).unwrap();
            UpdateRecord::AsymPowerSensor(AsymPowerSensorUpdate {
                id: u.id,
                power_sigma: keep_f64(u.power_sigma, model.power_sigma),
                p_measured: keep_f64_3(u.p_measured, model.p_measured),
                q_measured: keep_f64_3(u.q_measured, model.q_measured),
                p_sigma: keep_f64_3(u.p_sigma, model.p_sigma),
                q_sigma: keep_f64_3(u.q_sigma, model.q_sigma),
            })
        }
        UpdateRecord::SymCurrentSensor(u) => {
            let model = world.get::<SymCurrentSensorModel>(entity).unwrap();
            UpdateRecord::SymCurrentSensor(SymCurrentSensorUpdate {
                id: u.id,
                i_sigma: keep_f64(u.i_sigma, model.i_sigma),
                i_angle_sigma: keep_f64(u.i_angle_sigma, model.i_angle_sigma),
                i_measured: keep_f64(u.i_measured, model.i_measured),
                i_angle_measured: keep_f64(u.i_angle_measured, model.i_angle_measured),
            })
        }
        UpdateRecord::AsymCurrentSensor(u) => {
            let model = world.get::<AsymCurrentSensorModel>(entity).unwrap();
            UpdateRecord::AsymCurrentSensor(AsymCurrentSensorUpdate {
                id: u.id,
                i_sigma: keep_f64(u.i_sigma, model.i_sigma),
                i_angle_sigma: keep_f64(u.i_angle_sigma, model.i_angle_sigma),
                i_measured: keep_f64_3(u.i_measured, model.i_measured),
                i_angle_measured: keep_f64_3(u.i_angle_measured, model.i_angle_measured),
            })
        }
        UpdateRecord::Fault(u) => {
            let model = world.get::<FaultModel>(entity).unwrap();
            UpdateRecord::Fault(FaultUpdate {
                id: u.id,
                status: keep_status(u.status, model.status),
                fault_type: if is_na_ints(u.fault_type) {
                    NA_INT_S
                } else {
                    model.fault_type.map_or(NA_INT_S, |t| t as IntS)
                },
                fault_phase: if is_na_ints(u.fault_phase) {
                    NA_INT_S
                } else {
                    model.fault_phase as IntS
                },
                fault_object: if is_na_id(u.fault_object) {
                    NA_INT_ID
                } else {
                    model.fault_object
                },
                r_f: keep_f64(u.r_f, model.r_f),
                x_f: keep_f64(u.x_f, model.x_f),
            })
        }
    })
}

/// Inverse of a whole batch: element inverses against the pre-batch state,
/// applied in reverse order on revert.
pub fn inverse_batch(world: &World, batch: &UpdateBatch) -> Result<UpdateBatch, GridError> {
    let mut inverse: UpdateBatch = batch
        .iter()
        .map(|u| inverse_update(world, u))
        .collect::<Result<_, _>>()?;
    inverse.reverse();
    Ok(inverse)
}
