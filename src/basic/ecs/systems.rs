//! Grid intake and math-model assembly.
//!
//! Spawning converts the flat records into component sets (with the
//! construction-time validation), the registry keeps deterministic element
//! ordering, and the assembly derives the energized sub-grid, the math
//! topology with its frozen Y-bus structure, and the per-symmetry
//! calculation parameters.

use std::collections::HashMap;
use std::sync::Arc;

use bevy_ecs::prelude::*;
use nalgebra::Vector3;
use num_complex::Complex64;

use crate::basic::common::*;
use crate::basic::error::GridError;
use crate::basic::param::*;
use crate::basic::solver::{PowerFlowInput, ShortCircuitInput, StateEstimationInput};
use crate::basic::tensor::*;
use crate::basic::topology::{BranchIdx, GroupedIdx, Topology, DISCONNECTED};
use crate::basic::ybus::YBusStructure;
use crate::io::records::*;

use super::defer_builder::*;
use super::elements::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Node,
    Branch,
    Branch3,
    Source,
    Shunt,
    LoadGen,
    VoltageSensor,
    PowerSensor,
    CurrentSensor,
    Fault,
}

/// Deterministic element ordering and id lookup. Three-winding transformers
/// append their internal node and three legs behind the input elements.
#[derive(Resource, Debug, Default, Clone)]
pub struct ElementRegistry {
    pub nodes: Vec<Entity>,
    pub n_input_nodes: usize,
    pub branches: Vec<Entity>,
    pub branch3: Vec<Entity>,
    pub sources: Vec<Entity>,
    pub shunts: Vec<Entity>,
    pub load_gens: Vec<Entity>,
    pub voltage_sensors: Vec<Entity>,
    pub power_sensors: Vec<Entity>,
    pub current_sensors: Vec<Entity>,
    pub faults: Vec<Entity>,
    pub id_map: HashMap<ID, (ComponentKind, Entity)>,
    pub node_slot: HashMap<ID, usize>,
}

impl ElementRegistry {
    fn claim(&mut self, id: ID, kind: ComponentKind, entity: Entity) -> Result<(), GridError> {
        if self.id_map.insert(id, (kind, entity)).is_some() {
            return Err(GridError::ConflictId(id));
        }
        Ok(())
    }

    pub fn lookup(&self, id: ID) -> Result<(ComponentKind, Entity), GridError> {
        self.id_map
            .get(&id)
            .copied()
            .ok_or(GridError::IdNotFound(id))
    }
}

#[derive(OptBundle)]
struct NodeSet {
    /// Internal (fictitious) buses carry no record id.
    id: Option<ElemId>,
    param: NodeParam,
    slot: NodeSlot,
}

#[derive(OptBundle)]
struct BranchCommon {
    id: ElemId,
    nodes: BranchNodes,
    slots: BranchSlots,
    status: BranchStatus,
    base: BranchBase,
    loading: LoadingRule,
    shift: BranchShift,
}

#[derive(OptBundle)]
struct ApplianceCommon {
    id: ElemId,
    node: ApplianceNode,
    slot: NodeSlot,
    status: ApplianceStatus,
}

#[derive(OptBundle)]
struct SensorCommon {
    id: ElemId,
    object: MeasuredObject,
    target: SensorRef,
}

/// Semantic sensor target resolved at intake; stable across updates.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRef {
    Node(usize),
    BranchFrom(usize),
    BranchTo(usize),
    Source(usize),
    Shunt(usize),
    LoadGen(usize),
}

/// Spawns and validates a whole grid snapshot.
pub fn spawn_grid(world: &mut World, input: &GridInput) -> Result<ElementRegistry, GridError> {
    let mut reg = ElementRegistry::default();
    let mut spawner = DeferBundleSpawner::new();

    // nodes first: everything else resolves against their slots
    for (slot, node) in input.node.iter().enumerate() {
        let entity = spawner.spawn_one(
            world,
            NodeSet {
                id: Some(ElemId(node.id)),
                param: NodeParam {
                    u_rated: node.u_rated,
                },
                slot: NodeSlot(slot),
            },
        );
        reg.claim(node.id, ComponentKind::Node, entity)?;
        reg.nodes.push(entity);
        reg.node_slot.insert(node.id, slot);
    }
    reg.n_input_nodes = reg.nodes.len();

    let node_slot = |reg: &ElementRegistry, id: ID| -> Result<usize, GridError> {
        reg.node_slot.get(&id).copied().ok_or(GridError::IdNotFound(id))
    };
    let u_rated_of = |world: &World, reg: &ElementRegistry, slot: usize| -> f64 {
        world.get::<NodeParam>(reg.nodes[slot]).unwrap().u_rated
    };

    let branch_common = |world: &World,
                         reg: &ElementRegistry,
                         id: ID,
                         from: ID,
                         to: ID,
                         from_status: IntS,
                         to_status: IntS,
                         loading: LoadingRule,
                         shift: f64|
     -> Result<(BranchCommon, f64, f64), GridError> {
        if from == to {
            return Err(GridError::InvalidBranch { branch: id, node: from });
        }
        let from_slot = node_slot(reg, from)?;
        let to_slot = node_slot(reg, to)?;
        let u1 = u_rated_of(world, reg, from_slot);
        let u2 = u_rated_of(world, reg, to_slot);
        Ok((
            BranchCommon {
                id: ElemId(id),
                nodes: BranchNodes { from, to },
                slots: BranchSlots {
                    from: from_slot,
                    to: to_slot,
                },
                status: BranchStatus {
                    from: status_bool(from_status),
                    to: status_bool(to_status),
                },
                base: BranchBase {
                    base_i_from: BASE_POWER_3P / u1 / SQRT3,
                    base_i_to: BASE_POWER_3P / u2 / SQRT3,
                },
                loading,
                shift: BranchShift(shift),
            },
            u1,
            u2,
        ))
    };

    for line in &input.line {
        let (common, u1, u2) = branch_common(
            world,
            &reg,
            line.id,
            line.from_node,
            line.to_node,
            line.from_status,
            line.to_status,
            LoadingRule::Current { i_n: line.i_n },
            0.0,
        )?;
        let param = line_param(line, u1, u2)?;
        let entity = spawner.spawn_one(world, common);
        world.entity_mut(entity).insert(param);
        reg.claim(line.id, ComponentKind::Branch, entity)?;
        reg.branches.push(entity);
    }

    for link in &input.link {
        let (common, _, _) = branch_common(
            world,
            &reg,
            link.id,
            link.from_node,
            link.to_node,
            link.from_status,
            link.to_status,
            LoadingRule::None,
            0.0,
        )?;
        let entity = spawner.spawn_one(world, common);
        world.entity_mut(entity).insert(LinkParam);
        reg.claim(link.id, ComponentKind::Branch, entity)?;
        reg.branches.push(entity);
    }

    for branch in &input.generic_branch {
        let loading = if branch.sn.is_nan() {
            LoadingRule::None
        } else {
            LoadingRule::Power { sn: branch.sn }
        };
        let theta = or_default(branch.theta, 0.0);
        let (common, _, u2) = branch_common(
            world,
            &reg,
            branch.id,
            branch.from_node,
            branch.to_node,
            branch.from_status,
            branch.to_status,
            loading,
            theta,
        )?;
        let param = generic_branch_param(branch, u2);
        let entity = spawner.spawn_one(world, common);
        world.entity_mut(entity).insert(param);
        reg.claim(branch.id, ComponentKind::Branch, entity)?;
        reg.branches.push(entity);
    }

    for line in &input.asym_line {
        let (common, u1, u2) = branch_common(
            world,
            &reg,
            line.id,
            line.from_node,
            line.to_node,
            line.from_status,
            line.to_status,
            LoadingRule::Current { i_n: line.i_n },
            0.0,
        )?;
        let param = asym_line_param(line, u1, u2)?;
        let entity = spawner.spawn_one(world, common);
        world.entity_mut(entity).insert(param);
        reg.claim(line.id, ComponentKind::Branch, entity)?;
        reg.branches.push(entity);
    }

    for t in &input.transformer {
        let param_probe = transformer_param(t, 1.0, 1.0)?; // clock/winding validation
        let (common, u1, u2) = branch_common(
            world,
            &reg,
            t.id,
            t.from_node,
            t.to_node,
            t.from_status,
            t.to_status,
            LoadingRule::Power { sn: t.sn },
            param_probe.phase_shift(),
        )?;
        let param = transformer_param(t, u1, u2)?;
        let entity = spawner.spawn_one(world, common);
        world.entity_mut(entity).insert(param);
        reg.claim(t.id, ComponentKind::Branch, entity)?;
        reg.branches.push(entity);
    }

    for t3 in &input.three_winding_transformer {
        spawn_three_winding(world, &mut spawner, &mut reg, t3)?;
    }

    // appliances
    let appliance_common = |reg: &ElementRegistry,
                            id: ID,
                            node: ID,
                            status: IntS|
     -> Result<(ApplianceCommon, usize), GridError> {
        let slot = node_slot(reg, node)?;
        Ok((
            ApplianceCommon {
                id: ElemId(id),
                node: ApplianceNode(node),
                slot: NodeSlot(slot),
                status: ApplianceStatus(status_bool(status)),
            },
            slot,
        ))
    };
    for source in &input.source {
        let (common, _) = appliance_common(&reg, source.id, source.node, source.status)?;
        let entity = spawner.spawn_one(world, common);
        world.entity_mut(entity).insert(source_model(source));
        reg.claim(source.id, ComponentKind::Source, entity)?;
        reg.sources.push(entity);
    }

    for shunt in &input.shunt {
        let (common, slot) = appliance_common(&reg, shunt.id, shunt.node, shunt.status)?;
        let u_rated = u_rated_of(world, &reg, slot);
        let entity = spawner.spawn_one(world, common);
        world.entity_mut(entity).insert(shunt_model(shunt, u_rated));
        reg.claim(shunt.id, ComponentKind::Shunt, entity)?;
        reg.shunts.push(entity);
    }

    let mut spawn_sym_load_gen =
        |world: &mut World, reg: &mut ElementRegistry, records: &[SymLoadGenInput], direction: f64, spawner: &mut DeferBundleSpawner| -> Result<(), GridError> {
            for lg in records {
                let (common, _) = appliance_common(reg, lg.id, lg.node, lg.status)?;
                let load_gen_type: LoadGenType = lift_enum(lg.load_gen_type, "load_gen type")?;
                let entity = spawner.spawn_one(world, common);
                world.entity_mut(entity).insert(SymLoadGenModel {
                    p_specified: lg.p_specified,
                    q_specified: lg.q_specified,
                    load_gen_type,
                    direction,
                });
                reg.claim(lg.id, ComponentKind::LoadGen, entity)?;
                reg.load_gens.push(entity);
            }
            Ok(())
        };
    spawn_sym_load_gen(world, &mut reg, &input.sym_load, -1.0, &mut spawner)?;
    spawn_sym_load_gen(world, &mut reg, &input.sym_gen, 1.0, &mut spawner)?;
    let mut spawn_asym_load_gen =
        |world: &mut World, reg: &mut ElementRegistry, records: &[AsymLoadGenInput], direction: f64, spawner: &mut DeferBundleSpawner| -> Result<(), GridError> {
            for lg in records {
                let (common, _) = appliance_common(reg, lg.id, lg.node, lg.status)?;
                let load_gen_type: LoadGenType = lift_enum(lg.load_gen_type, "load_gen type")?;
                let entity = spawner.spawn_one(world, common);
                world.entity_mut(entity).insert(AsymLoadGenModel {
                    p_specified: lg.p_specified,
                    q_specified: lg.q_specified,
                    load_gen_type,
                    direction,
                });
                reg.claim(lg.id, ComponentKind::LoadGen, entity)?;
                reg.load_gens.push(entity);
            }
            Ok(())
        };
    spawn_asym_load_gen(world, &mut reg, &input.asym_load, -1.0, &mut spawner)?;
    spawn_asym_load_gen(world, &mut reg, &input.asym_gen, 1.0, &mut spawner)?;

    // sensors
    for sensor in &input.sym_voltage_sensor {
        let slot = resolve_voltage_target(&reg, sensor.id, sensor.measured_object)?;
        let entity = spawner.spawn_one(
            world,
            SensorCommon {
                id: ElemId(sensor.id),
                object: MeasuredObject(sensor.measured_object),
                target: SensorRef::Node(slot),
            },
        );
        world.entity_mut(entity).insert(SymVoltageSensorModel {
            u_measured: sensor.u_measured,
            u_angle_measured: sensor.u_angle_measured,
            u_sigma: sensor.u_sigma,
        });
        reg.claim(sensor.id, ComponentKind::VoltageSensor, entity)?;
        reg.voltage_sensors.push(entity);
    }
    for sensor in &input.asym_voltage_sensor {
        let slot = resolve_voltage_target(&reg, sensor.id, sensor.measured_object)?;
        let entity = spawner.spawn_one(
            world,
            SensorCommon {
                id: ElemId(sensor.id),
                object: MeasuredObject(sensor.measured_object),
                target: SensorRef::Node(slot),
            },
        );
        world.entity_mut(entity).insert(AsymVoltageSensorModel {
            u_measured: sensor.u_measured,
            u_angle_measured: sensor.u_angle_measured,
            u_sigma: sensor.u_sigma,
        });
        reg.claim(sensor.id, ComponentKind::VoltageSensor, entity)?;
        reg.voltage_sensors.push(entity);
    }

    for sensor in &input.sym_power_sensor {
        let terminal: MeasuredTerminalType =
            lift_enum(sensor.measured_terminal_type, "measured terminal type")?;
        let target = resolve_flow_target(world, &reg, sensor.id, sensor.measured_object, terminal)?;
        let entity = spawner.spawn_one(
            world,
            SensorCommon {
                id: ElemId(sensor.id),
                object: MeasuredObject(sensor.measured_object),
                target,
            },
        );
        world.entity_mut(entity).insert(SymPowerSensorModel {
            p_measured: sensor.p_measured,
            q_measured: sensor.q_measured,
            power_sigma: sensor.power_sigma,
            p_sigma: sensor.p_sigma,
            q_sigma: sensor.q_sigma,
            direction: terminal_direction(terminal),
        });
        reg.claim(sensor.id, ComponentKind::PowerSensor, entity)?;
        reg.power_sensors.push(entity);
    }
    for sensor in &input.asym_power_sensor {
        let terminal: MeasuredTerminalType =
            lift_enum(sensor.measured_terminal_type, "measured terminal type")?;
        let target = resolve_flow_target(world, &reg, sensor.id, sensor.measured_object, terminal)?;
        let entity = spawner.spawn_one(
            world,
            SensorCommon {
                id: ElemId(sensor.id),
                object: MeasuredObject(sensor.measured_object),
                target,
            },
        );
        world.entity_mut(entity).insert(AsymPowerSensorModel {
            p_measured: sensor.p_measured,
            q_measured: sensor.q_measured,
            power_sigma: sensor.power_sigma,
            p_sigma: sensor.p_sigma,
            q_sigma: sensor.q_sigma,
            direction: terminal_direction(terminal),
        });
        reg.claim(sensor.id, ComponentKind::PowerSensor, entity)?;
        reg.power_sensors.push(entity);
    }

    for sensor in &input.sym_current_sensor {
        let terminal: MeasuredTerminalType =
            lift_enum(sensor.measured_terminal_type, "measured terminal type")?;
        let target = resolve_current_target(world, &reg, sensor.id, sensor.measured_object, terminal)?;
        let angle_measurement_type: AngleMeasurementType =
            lift_enum(sensor.angle_measurement_type, "angle measurement type")?;
        let entity = spawner.spawn_one(
            world,
            SensorCommon {
                id: ElemId(sensor.id),
                object: MeasuredObject(sensor.measured_object),
                target,
            },
        );
        world.entity_mut(entity).insert(SymCurrentSensorModel {
            i_measured: sensor.i_measured,
            i_angle_measured: sensor.i_angle_measured,
            i_sigma: sensor.i_sigma,
            i_angle_sigma: sensor.i_angle_sigma,
            angle_measurement_type,
        });
        reg.claim(sensor.id, ComponentKind::CurrentSensor, entity)?;
        reg.current_sensors.push(entity);
    }
    for sensor in &input.asym_current_sensor {
        let terminal: MeasuredTerminalType =
            lift_enum(sensor.measured_terminal_type, "measured terminal type")?;
        let target = resolve_current_target(world, &reg, sensor.id, sensor.measured_object, terminal)?;
        let angle_measurement_type: AngleMeasurementType =
            lift_enum(sensor.angle_measurement_type, "angle measurement type")?;
        let entity = spawner.spawn_one(
            world,
            SensorCommon {
                id: ElemId(sensor.id),
                object: MeasuredObject(sensor.measured_object),
                target,
            },
        );
        world.entity_mut(entity).insert(AsymCurrentSensorModel {
            i_measured: sensor.i_measured,
            i_angle_measured: sensor.i_angle_measured,
            i_sigma: sensor.i_sigma,
            i_angle_sigma: sensor.i_angle_sigma,
            angle_measurement_type,
        });
        reg.claim(sensor.id, ComponentKind::CurrentSensor, entity)?;
        reg.current_sensors.push(entity);
    }

    #[derive(OptBundle)]
    struct FaultSet {
        id: ElemId,
        model: FaultModel,
    }
    for fault in &input.fault {
        let (kind, _) = reg.lookup(fault.fault_object)?;
        if kind != ComponentKind::Node {
            return Err(GridError::IdWrongType {
                sensor: fault.id,
                object: fault.fault_object,
            });
        }
        let fault_type = if is_na_ints(fault.fault_type) {
            None
        } else {
            Some(lift_enum(fault.fault_type, "fault type")?)
        };
        let fault_phase: FaultPhase = if is_na_ints(fault.fault_phase) {
            FaultPhase::DefaultValue
        } else {
            lift_enum(fault.fault_phase, "fault phase")?
        };
        if let Some(t) = fault_type {
            check_fault_phase(t, fault_phase)?;
        }
        let entity = spawner.spawn_one(
            world,
            FaultSet {
                id: ElemId(fault.id),
                model: FaultModel {
                    status: status_bool(fault.status),
                    fault_type,
                    fault_phase,
                    fault_object: fault.fault_object,
                    r_f: or_default(fault.r_f, 0.0),
                    x_f: or_default(fault.x_f, 0.0),
                },
            },
        );
        reg.claim(fault.id, ComponentKind::Fault, entity)?;
        reg.faults.push(entity);
    }

    Ok(reg)
}

/// Physical-to-math direction of a measured terminal.
fn terminal_direction(terminal: MeasuredTerminalType) -> f64 {
    match terminal {
        MeasuredTerminalType::Load | MeasuredTerminalType::Shunt => -1.0,
        _ => 1.0,
    }
}

fn resolve_voltage_target(
    reg: &ElementRegistry,
    sensor: ID,
    object: ID,
) -> Result<usize, GridError> {
    let (kind, _) = reg.lookup(object)?;
    if kind != ComponentKind::Node {
        return Err(GridError::IdWrongType { sensor, object });
    }
    Ok(reg.node_slot[&object])
}

fn resolve_flow_target(
    world: &World,
    reg: &ElementRegistry,
    sensor: ID,
    object: ID,
    terminal: MeasuredTerminalType,
) -> Result<SensorRef, GridError> {
    use MeasuredTerminalType::*;
    let (kind, entity) = reg.lookup(object)?;
    let wrong = GridError::IdWrongType { sensor, object };
    match terminal {
        Node => {
            if kind != ComponentKind::Node {
                return Err(wrong);
            }
            Ok(SensorRef::Node(reg.node_slot[&object]))
        }
        Source => {
            if kind != ComponentKind::Source {
                return Err(wrong);
            }
            Ok(SensorRef::Source(index_of(&reg.sources, entity)))
        }
        Shunt => {
            if kind != ComponentKind::Shunt {
                return Err(wrong);
            }
            Ok(SensorRef::Shunt(index_of(&reg.shunts, entity)))
        }
        Load | Generator => {
            if kind != ComponentKind::LoadGen {
                return Err(wrong);
            }
            Ok(SensorRef::LoadGen(index_of(&reg.load_gens, entity)))
        }
        BranchFrom => {
            if kind != ComponentKind::Branch {
                return Err(wrong);
            }
            Ok(SensorRef::BranchFrom(index_of(&reg.branches, entity)))
        }
        BranchTo => {
            if kind != ComponentKind::Branch {
                return Err(wrong);
            }
            Ok(SensorRef::BranchTo(index_of(&reg.branches, entity)))
        }
        Branch3Side1 | Branch3Side2 | Branch3Side3 => {
            if kind != ComponentKind::Branch3 {
                return Err(wrong);
            }
            // side k of a three-winding transformer is the from side of leg k
            let side = match terminal {
                Branch3Side1 => 0,
                Branch3Side2 => 1,
                _ => 2,
            };
            let legs = world.get::<Branch3Legs>(entity).ok_or(wrong)?;
            Ok(SensorRef::BranchFrom(index_of(
                &reg.branches,
                legs.legs[side],
            )))
        }
    }
}

fn resolve_current_target(
    world: &World,
    reg: &ElementRegistry,
    sensor: ID,
    object: ID,
    terminal: MeasuredTerminalType,
) -> Result<SensorRef, GridError> {
    use MeasuredTerminalType::*;
    match terminal {
        BranchFrom | BranchTo | Branch3Side1 | Branch3Side2 | Branch3Side3 => {
            resolve_flow_target(world, reg, sensor, object, terminal)
        }
        _ => Err(GridError::IdWrongType { sensor, object }),
    }
}

fn index_of(list: &[Entity], entity: Entity) -> usize {
    list.iter().position(|e| *e == entity).unwrap()
}

/// Converts a three-winding transformer into three two-winding legs around a
/// fictitious internal node at the side-1 voltage level.
fn spawn_three_winding(
    world: &mut World,
    spawner: &mut DeferBundleSpawner,
    reg: &mut ElementRegistry,
    t3: &ThreeWindingTransformerInput,
) -> Result<(), GridError> {
    let slots = [
        *reg.node_slot.get(&t3.node_1).ok_or(GridError::IdNotFound(t3.node_1))?,
        *reg.node_slot.get(&t3.node_2).ok_or(GridError::IdNotFound(t3.node_2))?,
        *reg.node_slot.get(&t3.node_3).ok_or(GridError::IdNotFound(t3.node_3))?,
    ];
    let rated = [
        world.get::<NodeParam>(reg.nodes[slots[0]]).unwrap().u_rated,
        world.get::<NodeParam>(reg.nodes[slots[1]]).unwrap().u_rated,
        world.get::<NodeParam>(reg.nodes[slots[2]]).unwrap().u_rated,
    ];
    let (legs_param, status) = three_winding_legs(t3, rated)?;

    // internal node at the side-1 voltage level
    let internal_slot = reg.nodes.len();
    let internal = spawner.spawn_one(
        world,
        NodeSet {
            id: None,
            param: NodeParam { u_rated: rated[0] },
            slot: NodeSlot(internal_slot),
        },
    );
    reg.nodes.push(internal);

    let mut leg_entities = [Entity::PLACEHOLDER; 3];
    for (side, param) in legs_param.into_iter().enumerate() {
        let entity = world
            .spawn((
                BranchNodes {
                    from: [t3.node_1, t3.node_2, t3.node_3][side],
                    to: NA_INT_ID,
                },
                BranchSlots {
                    from: slots[side],
                    to: internal_slot,
                },
                BranchStatus {
                    from: status[side],
                    to: true,
                },
                BranchBase {
                    base_i_from: BASE_POWER_3P / rated[side] / SQRT3,
                    base_i_to: BASE_POWER_3P / rated[0] / SQRT3,
                },
                LoadingRule::Power {
                    sn: [t3.sn_1, t3.sn_2, t3.sn_3][side],
                },
                BranchShift(f64::from(param.clock) * DEG_30),
                param,
            ))
            .id();
        leg_entities[side] = entity;
        reg.branches.push(entity);
    }

    let parent = spawner.spawn_one(
        world,
        Branch3Set {
            id: ElemId(t3.id),
            nodes: Branch3Nodes {
                nodes: [t3.node_1, t3.node_2, t3.node_3],
            },
            status: Branch3Status { status },
            rating: Branch3Rating {
                sn: [t3.sn_1, t3.sn_2, t3.sn_3],
            },
        },
    );
    world.entity_mut(parent).insert((
        Branch3Legs {
            legs: leg_entities,
            internal_bus: internal_slot,
        },
        Branch3Input(*t3),
    ));
    reg.claim(t3.id, ComponentKind::Branch3, parent)?;
    reg.branch3.push(parent);
    Ok(())
}

#[derive(OptBundle)]
struct Branch3Set {
    id: ElemId,
    nodes: Branch3Nodes,
    status: Branch3Status,
    rating: Branch3Rating,
}

/// Math-model view of the energized sub-grid: shared topology, frozen Y-bus
/// structure and the element order behind every math index.
#[derive(Resource, Debug, Clone)]
pub struct MathModel {
    pub topo: Arc<Topology>,
    pub structure: Arc<YBusStructure>,
    pub energized: Vec<bool>,
    pub bus_of_slot: Vec<Option<usize>>,
    pub slot_of_bus: Vec<usize>,
    pub source_entities: Vec<Entity>,
    pub shunt_entities: Vec<Entity>,
    pub load_gen_entities: Vec<Entity>,
    pub voltage_sensor_entities: Vec<Entity>,
    pub bus_injection_sensors: Vec<Entity>,
    pub source_power_sensors: Vec<Entity>,
    pub load_gen_power_sensors: Vec<Entity>,
    pub shunt_power_sensors: Vec<Entity>,
    pub branch_from_power_sensors: Vec<Entity>,
    pub branch_to_power_sensors: Vec<Entity>,
    pub branch_from_current_sensors: Vec<Entity>,
    pub branch_to_current_sensors: Vec<Entity>,
    pub fault_entities: Vec<Entity>,
    pub math_source_of: HashMap<Entity, usize>,
    pub math_shunt_of: HashMap<Entity, usize>,
    pub math_load_gen_of: HashMap<Entity, usize>,
}

/// Builds the math model from the current component state.
pub fn build_math_model(world: &mut World) -> Result<MathModel, GridError> {
    let reg = world.resource::<ElementRegistry>().clone();
    let n_slots = reg.nodes.len();

    // adjacency over fully closed branches
    let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_slots];
    for &branch in &reg.branches {
        let slots = *world.get::<BranchSlots>(branch).unwrap();
        let status = *world.get::<BranchStatus>(branch).unwrap();
        let shift = **world.get::<BranchShift>(branch).unwrap();
        if status.from && status.to {
            adj[slots.from].push((slots.to, shift));
            adj[slots.to].push((slots.from, -shift));
        }
    }

    // energization: reachable from an in-service source
    let mut energized = vec![false; n_slots];
    let mut phase_shift_of = vec![0.0f64; n_slots];
    let mut slack_slot = None;
    let mut queue = std::collections::VecDeque::new();
    for &source in &reg.sources {
        if !**world.get::<ApplianceStatus>(source).unwrap() {
            continue;
        }
        let slot = **world.get::<NodeSlot>(source).unwrap();
        if slack_slot.is_none() {
            slack_slot = Some(slot);
        }
        if !energized[slot] {
            energized[slot] = true;
            phase_shift_of[slot] = 0.0;
            queue.push_back(slot);
        }
    }
    while let Some(slot) = queue.pop_front() {
        for &(next, shift) in &adj[slot] {
            if !energized[next] {
                energized[next] = true;
                // shift is θ_from − θ_to along the traversal direction
                phase_shift_of[next] = phase_shift_of[slot] - shift;
                queue.push_back(next);
            }
        }
    }

    let mut bus_of_slot = vec![None; n_slots];
    let mut slot_of_bus = Vec::new();
    for (slot, &on) in energized.iter().enumerate() {
        if on {
            bus_of_slot[slot] = Some(slot_of_bus.len());
            slot_of_bus.push(slot);
        }
    }
    let n_bus = slot_of_bus.len();

    let branch_bus_idx: Vec<BranchIdx> = reg
        .branches
        .iter()
        .map(|&branch| {
            let slots = *world.get::<BranchSlots>(branch).unwrap();
            BranchIdx {
                from: bus_of_slot[slots.from].map_or(DISCONNECTED, |b| b as i64),
                to: bus_of_slot[slots.to].map_or(DISCONNECTED, |b| b as i64),
            }
        })
        .collect();

    // appliances grouped per bus, in registry order
    let group_appliances = |world: &World, entities: &[Entity]| {
        let mut per_bus: Vec<Vec<Entity>> = vec![Vec::new(); n_bus];
        for &e in entities {
            let slot = **world.get::<NodeSlot>(e).unwrap();
            if let Some(bus) = bus_of_slot[slot] {
                per_bus[bus].push(e);
            }
        }
        let counts: Vec<usize> = per_bus.iter().map(|v| v.len()).collect();
        let flat: Vec<Entity> = per_bus.into_iter().flatten().collect();
        (GroupedIdx::from_counts(&counts), flat)
    };
    let (sources_per_bus, source_entities) = group_appliances(world, &reg.sources);
    let (shunts_per_bus, shunt_entities) = group_appliances(world, &reg.shunts);
    let (load_gens_per_bus, load_gen_entities) = group_appliances(world, &reg.load_gens);

    let load_gen_type: Vec<LoadGenType> = load_gen_entities
        .iter()
        .map(|&e| {
            if let Some(m) = world.get::<SymLoadGenModel>(e) {
                m.load_gen_type
            } else {
                world.get::<AsymLoadGenModel>(e).unwrap().load_gen_type
            }
        })
        .collect();

    let math_source_of: HashMap<Entity, usize> = source_entities
        .iter()
        .enumerate()
        .map(|(i, &e)| (e, i))
        .collect();
    let math_shunt_of: HashMap<Entity, usize> = shunt_entities
        .iter()
        .enumerate()
        .map(|(i, &e)| (e, i))
        .collect();
    let math_load_gen_of: HashMap<Entity, usize> = load_gen_entities
        .iter()
        .enumerate()
        .map(|(i, &e)| (e, i))
        .collect();

    // voltage sensors per bus
    let mut voltage_per_bus: Vec<Vec<Entity>> = vec![Vec::new(); n_bus];
    for &sensor in &reg.voltage_sensors {
        let SensorRef::Node(slot) = *world.get::<SensorRef>(sensor).unwrap() else {
            continue;
        };
        if let Some(bus) = bus_of_slot[slot] {
            voltage_per_bus[bus].push(sensor);
        }
    }
    let voltage_counts: Vec<usize> = voltage_per_bus.iter().map(|v| v.len()).collect();
    let voltage_sensors_per_bus = GroupedIdx::from_counts(&voltage_counts);
    let voltage_sensor_entities: Vec<Entity> = voltage_per_bus.into_iter().flatten().collect();

    // power sensors per target category
    let mut bus_injection: Vec<Vec<Entity>> = vec![Vec::new(); n_bus];
    let mut per_source: Vec<Vec<Entity>> = vec![Vec::new(); source_entities.len()];
    let mut per_load_gen: Vec<Vec<Entity>> = vec![Vec::new(); load_gen_entities.len()];
    let mut per_shunt: Vec<Vec<Entity>> = vec![Vec::new(); shunt_entities.len()];
    let mut per_branch_from: Vec<Vec<Entity>> = vec![Vec::new(); reg.branches.len()];
    let mut per_branch_to: Vec<Vec<Entity>> = vec![Vec::new(); reg.branches.len()];
    for &sensor in &reg.power_sensors {
        match *world.get::<SensorRef>(sensor).unwrap() {
            SensorRef::Node(slot) => {
                if let Some(bus) = bus_of_slot[slot] {
                    bus_injection[bus].push(sensor);
                }
            }
            SensorRef::Source(i) => {
                if let Some(&m) = math_source_of.get(&reg.sources[i]) {
                    per_source[m].push(sensor);
                }
            }
            SensorRef::Shunt(i) => {
                if let Some(&m) = math_shunt_of.get(&reg.shunts[i]) {
                    per_shunt[m].push(sensor);
                }
            }
            SensorRef::LoadGen(i) => {
                if let Some(&m) = math_load_gen_of.get(&reg.load_gens[i]) {
                    per_load_gen[m].push(sensor);
                }
            }
            SensorRef::BranchFrom(b) => {
                if branch_bus_idx[b].from_connected() {
                    per_branch_from[b].push(sensor);
                }
            }
            SensorRef::BranchTo(b) => {
                if branch_bus_idx[b].to_connected() {
                    per_branch_to[b].push(sensor);
                }
            }
        }
    }
    let mut current_from: Vec<Vec<Entity>> = vec![Vec::new(); reg.branches.len()];
    let mut current_to: Vec<Vec<Entity>> = vec![Vec::new(); reg.branches.len()];
    for &sensor in &reg.current_sensors {
        match *world.get::<SensorRef>(sensor).unwrap() {
            SensorRef::BranchFrom(b) => {
                if branch_bus_idx[b].from_connected() {
                    current_from[b].push(sensor);
                }
            }
            SensorRef::BranchTo(b) => {
                if branch_bus_idx[b].to_connected() {
                    current_to[b].push(sensor);
                }
            }
            _ => {}
        }
    }

    let flatten = |groups: Vec<Vec<Entity>>| -> (GroupedIdx, Vec<Entity>) {
        let counts: Vec<usize> = groups.iter().map(|v| v.len()).collect();
        (
            GroupedIdx::from_counts(&counts),
            groups.into_iter().flatten().collect(),
        )
    };
    let (power_sensors_per_bus, bus_injection_sensors) = flatten(bus_injection);
    let (power_sensors_per_source, source_power_sensors) = flatten(per_source);
    let (power_sensors_per_load_gen, load_gen_power_sensors) = flatten(per_load_gen);
    let (power_sensors_per_shunt, shunt_power_sensors) = flatten(per_shunt);
    let (power_sensors_per_branch_from, branch_from_power_sensors) = flatten(per_branch_from);
    let (power_sensors_per_branch_to, branch_to_power_sensors) = flatten(per_branch_to);
    let (current_sensors_per_branch_from, branch_from_current_sensors) = flatten(current_from);
    let (current_sensors_per_branch_to, branch_to_current_sensors) = flatten(current_to);

    // active faults grouped per bus
    let mut faults_per_bus: Vec<Vec<Entity>> = vec![Vec::new(); n_bus];
    for &fault in &reg.faults {
        let model = *world.get::<FaultModel>(fault).unwrap();
        if !model.status {
            continue;
        }
        let slot = reg.node_slot[&model.fault_object];
        if let Some(bus) = bus_of_slot[slot] {
            faults_per_bus[bus].push(fault);
        }
    }
    let fault_counts: Vec<usize> = faults_per_bus.iter().map(|v| v.len()).collect();
    let fault_buses = GroupedIdx::from_counts(&fault_counts);
    let fault_entities: Vec<Entity> = faults_per_bus.into_iter().flatten().collect();

    let slack_bus = slack_slot
        .and_then(|s| bus_of_slot[s])
        .unwrap_or(0);
    let topo = Topology {
        slack_bus,
        phase_shift: slot_of_bus.iter().map(|&s| phase_shift_of[s]).collect(),
        branch_bus_idx,
        sources_per_bus,
        shunts_per_bus,
        load_gens_per_bus,
        load_gen_type,
        voltage_sensors_per_bus,
        power_sensors_per_bus,
        power_sensors_per_source,
        power_sensors_per_load_gen,
        power_sensors_per_shunt,
        power_sensors_per_branch_from,
        power_sensors_per_branch_to,
        current_sensors_per_branch_from,
        current_sensors_per_branch_to,
    };
    debug_assert!(topo.validate());
    let structure = Arc::new(YBusStructure::new(&topo));

    let model = MathModel {
        topo: Arc::new(topo),
        structure,
        energized,
        bus_of_slot,
        slot_of_bus,
        source_entities,
        shunt_entities,
        load_gen_entities,
        voltage_sensor_entities,
        bus_injection_sensors,
        source_power_sensors,
        load_gen_power_sensors,
        shunt_power_sensors,
        branch_from_power_sensors,
        branch_to_power_sensors,
        branch_from_current_sensors,
        branch_to_current_sensors,
        fault_entities,
        math_source_of,
        math_shunt_of,
        math_load_gen_of,
    };
    // keep the resource current for output extraction
    world.insert_resource(model.clone());
    Ok(model)
}

/// Numeric calculation parameters of the current component state.
pub fn build_math_param<S: Symmetry>(
    world: &World,
    reg: &ElementRegistry,
    model: &MathModel,
) -> Result<MathModelParam<S>, GridError> {
    let mut branch_param = Vec::with_capacity(reg.branches.len());
    for (b, &branch) in reg.branches.iter().enumerate() {
        let status = *world.get::<BranchStatus>(branch).unwrap();
        let idx = model.topo.branch_bus_idx[b];
        let from_on = status.from && idx.from_connected();
        let to_on = status.to && idx.to_connected();
        let param = branch_param_of::<S>(world, branch, from_on, to_on)?;
        branch_param.push(param);
    }

    let mut shunt_param = Vec::with_capacity(model.shunt_entities.len());
    for &shunt in &model.shunt_entities {
        if **world.get::<ApplianceStatus>(shunt).unwrap() {
            let m = world.get::<ShuntModel>(shunt).unwrap();
            shunt_param.push(S::tensor_from_sequence(m.y1(), m.y0()));
        } else {
            shunt_param.push(S::Tensor::zero());
        }
    }

    let mut source_param = Vec::with_capacity(model.source_entities.len());
    for &source in &model.source_entities {
        if **world.get::<ApplianceStatus>(source).unwrap() {
            source_param.push(world.get::<SourceModel>(source).unwrap().param);
        } else {
            source_param.push(SourceCalcParam {
                y1: Complex64::new(0.0, 0.0),
                y0: Complex64::new(0.0, 0.0),
            });
        }
    }

    Ok(MathModelParam {
        branch_param,
        shunt_param,
        source_param,
    })
}

fn branch_param_of<S: Symmetry>(
    world: &World,
    branch: Entity,
    from_on: bool,
    to_on: bool,
) -> Result<BranchCalcParam<S>, GridError> {
    if let Some(p) = world.get::<LineParam>(branch) {
        return BranchParamSource::<S>::branch_param(p, from_on, to_on);
    }
    if let Some(p) = world.get::<LinkParam>(branch) {
        return BranchParamSource::<S>::branch_param(p, from_on, to_on);
    }
    if let Some(p) = world.get::<TransformerParam>(branch) {
        return BranchParamSource::<S>::branch_param(p, from_on, to_on);
    }
    if let Some(p) = world.get::<GenericBranchParam>(branch) {
        return BranchParamSource::<S>::branch_param(p, from_on, to_on);
    }
    if let Some(p) = world.get::<AsymLineParam>(branch) {
        return BranchParamSource::<S>::branch_param(p, from_on, to_on);
    }
    Err(GridError::MissingCaseForEnum {
        context: "branch model",
        value: -1,
    })
}

/// Power-flow input of the current component state.
pub fn build_pf_input<S: Symmetry>(world: &World, model: &MathModel) -> PowerFlowInput<S> {
    let source = model
        .source_entities
        .iter()
        .map(|&e| world.get::<SourceModel>(e).unwrap().u_ref_c())
        .collect();
    let s_injection = model
        .load_gen_entities
        .iter()
        .map(|&e| {
            if !**world.get::<ApplianceStatus>(e).unwrap() {
                return S::Complex::zero();
            }
            load_gen_injection::<S>(world, e)
        })
        .collect();
    PowerFlowInput {
        source,
        s_injection,
    }
}

pub fn load_gen_injection<S: Symmetry>(world: &World, e: Entity) -> S::Complex {
    if let Some(m) = world.get::<SymLoadGenModel>(e) {
        let s = Complex64::new(m.p_specified, m.q_specified) * m.direction / BASE_POWER_3P;
        S::Complex::splat(s)
    } else {
        let m = world.get::<AsymLoadGenModel>(e).unwrap();
        let s = Vector3::from_fn(|i, _| {
            Complex64::new(m.p_specified[i], m.q_specified[i]) * m.direction / BASE_POWER_1P
        });
        S::mean_from_abc(s)
    }
}

/// State-estimation input of the current component state.
pub fn build_se_input<S: Symmetry>(world: &World, model: &MathModel) -> StateEstimationInput<S> {
    let status_of = |e: &Entity| **world.get::<ApplianceStatus>(*e).unwrap();
    let u_rated_of_bus = |bus: usize| {
        let reg = world.resource::<ElementRegistry>();
        world
            .get::<NodeParam>(reg.nodes[model.slot_of_bus[bus]])
            .unwrap()
            .u_rated
    };

    let measured_voltage = model
        .voltage_sensor_entities
        .iter()
        .enumerate()
        .map(|(i, &e)| {
            let bus = model.topo.voltage_sensors_per_bus.group_of(i);
            voltage_sensor_param::<S>(world, e, u_rated_of_bus(bus))
        })
        .collect();

    let power_params = |sensors: &[Entity]| -> Vec<PowerSensorCalcParam<S>> {
        sensors
            .iter()
            .map(|&e| power_sensor_param::<S>(world, e))
            .collect()
    };
    let current_params = |sensors: &[Entity], side_bus_of: &dyn Fn(usize) -> usize, grouping: &GroupedIdx| -> Vec<CurrentSensorCalcParam<S>> {
        sensors
            .iter()
            .enumerate()
            .map(|(i, &e)| {
                let branch = grouping.group_of(i);
                current_sensor_param::<S>(world, e, u_rated_of_bus(side_bus_of(branch)))
            })
            .collect()
    };
    let topo = &model.topo;
    let from_bus = |b: usize| topo.branch_bus_idx[b].from as usize;
    let to_bus = |b: usize| topo.branch_bus_idx[b].to as usize;

    StateEstimationInput {
        source_status: model.source_entities.iter().map(status_of).collect(),
        shunt_status: model.shunt_entities.iter().map(status_of).collect(),
        load_gen_status: model.load_gen_entities.iter().map(status_of).collect(),
        measured_voltage,
        measured_bus_injection: power_params(&model.bus_injection_sensors),
        measured_source_power: power_params(&model.source_power_sensors),
        measured_load_gen_power: power_params(&model.load_gen_power_sensors),
        measured_shunt_power: power_params(&model.shunt_power_sensors),
        measured_branch_from_power: power_params(&model.branch_from_power_sensors),
        measured_branch_to_power: power_params(&model.branch_to_power_sensors),
        measured_branch_from_current: current_params(
            &model.branch_from_current_sensors,
            &from_bus,
            &topo.current_sensors_per_branch_from,
        ),
        measured_branch_to_current: current_params(
            &model.branch_to_current_sensors,
            &to_bus,
            &topo.current_sensors_per_branch_to,
        ),
    }
}

fn voltage_sensor_param<S: Symmetry>(
    world: &World,
    e: Entity,
    u_rated: f64,
) -> VoltageSensorCalcParam<S> {
    if let Some(m) = world.get::<SymVoltageSensorModel>(e) {
        let u_pu = m.u_measured / u_rated;
        let sigma = m.u_sigma / u_rated;
        let value = if m.u_angle_measured.is_nan() {
            S::Complex::from_re_im(S::Real::splat(u_pu), S::Real::splat(f64::NAN))
        } else {
            S::embed(Complex64::from_polar(u_pu, m.u_angle_measured))
        };
        VoltageSensorCalcParam {
            value,
            variance: sigma * sigma,
        }
    } else {
        let m = world.get::<AsymVoltageSensorModel>(e).unwrap();
        let scale = u_rated / SQRT3;
        let sigma = m.u_sigma / scale;
        let has_angle = m.u_angle_measured.iter().all(|a| !a.is_nan());
        let value = if has_angle {
            S::seq_from_abc(Vector3::from_fn(|i, _| {
                Complex64::from_polar(m.u_measured[i] / scale, m.u_angle_measured[i])
            }))
        } else {
            let mags = Vector3::from_fn(|i, _| m.u_measured[i] / scale);
            S::Complex::from_re_im(
                S::mean_real_from_abc(mags),
                S::Real::splat(f64::NAN),
            )
        };
        VoltageSensorCalcParam {
            value,
            variance: sigma * sigma,
        }
    }
}

fn power_sensor_param<S: Symmetry>(world: &World, e: Entity) -> PowerSensorCalcParam<S> {
    if let Some(m) = world.get::<SymPowerSensorModel>(e) {
        let scale = m.direction / BASE_POWER_3P;
        let (var_p, var_q) = power_variances(
            m.p_sigma / BASE_POWER_3P,
            m.q_sigma / BASE_POWER_3P,
            m.power_sigma / BASE_POWER_3P,
        );
        PowerSensorCalcParam {
            real_component: RandVar {
                value: S::Real::splat(m.p_measured * scale),
                variance: S::Real::splat(var_p),
            },
            imag_component: RandVar {
                value: S::Real::splat(m.q_measured * scale),
                variance: S::Real::splat(var_q),
            },
        }
    } else {
        let m = world.get::<AsymPowerSensorModel>(e).unwrap();
        let scale = m.direction / BASE_POWER_1P;
        let mut var_p = Vector3::zeros();
        let mut var_q = Vector3::zeros();
        for i in 0..3 {
            let (p, q) = power_variances(
                m.p_sigma[i] / BASE_POWER_1P,
                m.q_sigma[i] / BASE_POWER_1P,
                m.power_sigma / BASE_POWER_3P,
            );
            var_p[i] = p;
            var_q[i] = q;
        }
        PowerSensorCalcParam {
            real_component: RandVar {
                value: S::mean_real_from_abc(Vector3::from_fn(|i, _| m.p_measured[i] * scale)),
                variance: S::mean_real_from_abc(var_p),
            },
            imag_component: RandVar {
                value: S::mean_real_from_abc(Vector3::from_fn(|i, _| m.q_measured[i] * scale)),
                variance: S::mean_real_from_abc(var_q),
            },
        }
    }
}

/// Per-component variances of a power measurement: explicit sigmas win,
/// the apparent-power sigma splits evenly, nothing at all means an
/// uninformative (infinite-variance) measurement.
fn power_variances(p_sigma: f64, q_sigma: f64, power_sigma: f64) -> (f64, f64) {
    if p_sigma.is_finite() && q_sigma.is_finite() && !p_sigma.is_nan() && !q_sigma.is_nan() {
        (p_sigma * p_sigma, q_sigma * q_sigma)
    } else if !power_sigma.is_nan() && power_sigma.is_finite() {
        let v = power_sigma * power_sigma / 2.0;
        (v, v)
    } else {
        (f64::INFINITY, f64::INFINITY)
    }
}

fn current_sensor_param<S: Symmetry>(
    world: &World,
    e: Entity,
    u_rated: f64,
) -> CurrentSensorCalcParam<S> {
    let base_i = BASE_POWER_3P / u_rated / SQRT3;
    if let Some(m) = world.get::<SymCurrentSensorModel>(e) {
        let i_pu = m.i_measured / base_i;
        let z = Complex64::from_polar(i_pu, m.i_angle_measured);
        let var = current_variance(m.i_sigma / base_i, i_pu, m.i_angle_sigma);
        CurrentSensorCalcParam {
            angle_measurement_type: m.angle_measurement_type,
            measurement: PowerSensorCalcParam {
                real_component: RandVar {
                    value: S::Real::splat(z.re),
                    variance: S::Real::splat(var),
                },
                imag_component: RandVar {
                    value: S::Real::splat(z.im),
                    variance: S::Real::splat(var),
                },
            },
        }
    } else {
        let m = world.get::<AsymCurrentSensorModel>(e).unwrap();
        let z = Vector3::from_fn(|i, _| {
            Complex64::from_polar(m.i_measured[i] / base_i, m.i_angle_measured[i])
        });
        let var = Vector3::from_fn(|i, _| {
            current_variance(m.i_sigma / base_i, m.i_measured[i] / base_i, m.i_angle_sigma)
        });
        CurrentSensorCalcParam {
            angle_measurement_type: m.angle_measurement_type,
            measurement: PowerSensorCalcParam {
                real_component: RandVar {
                    value: S::mean_real_from_abc(z.map(|c| c.re)),
                    variance: S::mean_real_from_abc(var),
                },
                imag_component: RandVar {
                    value: S::mean_real_from_abc(z.map(|c| c.im)),
                    variance: S::mean_real_from_abc(var),
                },
            },
        }
    }
}

/// Rectangular stand-in variance of a polar current measurement.
fn current_variance(i_sigma: f64, i_pu: f64, angle_sigma: f64) -> f64 {
    let angle_term = if angle_sigma.is_nan() {
        0.0
    } else {
        i_pu * angle_sigma
    };
    let i_term = if i_sigma.is_nan() { f64::INFINITY } else { i_sigma };
    (i_term * i_term + angle_term * angle_term) / 2.0
}

/// Short-circuit input with IEC 60909 voltage scaling.
pub fn build_sc_input(
    world: &World,
    reg: &ElementRegistry,
    model: &MathModel,
    scaling: ShortCircuitVoltageScaling,
) -> Result<ShortCircuitInput, GridError> {
    let mut counts = vec![0usize; model.topo.n_bus()];
    let mut faults = Vec::with_capacity(model.fault_entities.len());
    for &fault in &model.fault_entities {
        let m = *world.get::<FaultModel>(fault).unwrap();
        let slot = reg.node_slot[&m.fault_object];
        let bus = model.bus_of_slot[slot].expect("fault grouped on energized bus");
        let u_rated = world.get::<NodeParam>(reg.nodes[slot]).unwrap().u_rated;
        counts[bus] += 1;
        faults.push(m.calc_param(u_rated)?);
    }
    let source = model
        .source_entities
        .iter()
        .map(|&e| {
            let m = world.get::<SourceModel>(e).unwrap();
            let slot = **world.get::<NodeSlot>(e).unwrap();
            let u_rated = world.get::<NodeParam>(reg.nodes[slot]).unwrap().u_rated;
            let c = short_circuit_voltage_scaling_c(u_rated, scaling);
            Complex64::from_polar(c, m.u_ref_angle)
        })
        .collect();
    Ok(ShortCircuitInput {
        fault_buses: GroupedIdx::from_counts(&counts),
        faults,
        source,
    })
}
