//! Flat input and update record families.
//!
//! Every record starts with a 32-bit signed `id`. NaN floating fields and the
//! `na` integer sentinels mean "use default or derive" on input and
//! "unchanged" on update. Enum-valued fields arrive as raw small integers and
//! are lifted at validation time.

use serde::{Deserialize, Serialize};

use crate::basic::common::{ID, IntS, NA_INT_ID, NA_INT_S};

fn nan() -> f64 {
    f64::NAN
}

fn nan3() -> [f64; 3] {
    [f64::NAN; 3]
}

fn na_id() -> ID {
    NA_INT_ID
}

fn na_ints() -> IntS {
    NA_INT_S
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeInput {
    #[serde(default = "na_id")]
    pub id: ID,
    /// Rated line-line voltage in V.
    #[serde(default = "nan")]
    pub u_rated: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub from_node: ID,
    #[serde(default = "na_id")]
    pub to_node: ID,
    #[serde(default = "na_ints")]
    pub from_status: IntS,
    #[serde(default = "na_ints")]
    pub to_status: IntS,
    #[serde(default = "nan")]
    pub r1: f64,
    #[serde(default = "nan")]
    pub x1: f64,
    #[serde(default = "nan")]
    pub c1: f64,
    #[serde(default = "nan")]
    pub tan1: f64,
    #[serde(default = "nan")]
    pub r0: f64,
    #[serde(default = "nan")]
    pub x0: f64,
    #[serde(default = "nan")]
    pub c0: f64,
    #[serde(default = "nan")]
    pub tan0: f64,
    /// Rated current in A.
    #[serde(default = "nan")]
    pub i_n: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub from_node: ID,
    #[serde(default = "na_id")]
    pub to_node: ID,
    #[serde(default = "na_ints")]
    pub from_status: IntS,
    #[serde(default = "na_ints")]
    pub to_status: IntS,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenericBranchInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub from_node: ID,
    #[serde(default = "na_id")]
    pub to_node: ID,
    #[serde(default = "na_ints")]
    pub from_status: IntS,
    #[serde(default = "na_ints")]
    pub to_status: IntS,
    #[serde(default = "nan")]
    pub r1: f64,
    #[serde(default = "nan")]
    pub x1: f64,
    #[serde(default = "nan")]
    pub g1: f64,
    #[serde(default = "nan")]
    pub b1: f64,
    /// Off-nominal ratio, defaults to 1.
    #[serde(default = "nan")]
    pub k: f64,
    /// Angle shift in radians, defaults to 0.
    #[serde(default = "nan")]
    pub theta: f64,
    /// Rated power for loading, optional.
    #[serde(default = "nan")]
    pub sn: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymLineInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub from_node: ID,
    #[serde(default = "na_id")]
    pub to_node: ID,
    #[serde(default = "na_ints")]
    pub from_status: IntS,
    #[serde(default = "na_ints")]
    pub to_status: IntS,
    // lower-triangle R matrix, phases a, b, c and neutral n
    #[serde(default = "nan")]
    pub r_aa: f64,
    #[serde(default = "nan")]
    pub r_ba: f64,
    #[serde(default = "nan")]
    pub r_bb: f64,
    #[serde(default = "nan")]
    pub r_ca: f64,
    #[serde(default = "nan")]
    pub r_cb: f64,
    #[serde(default = "nan")]
    pub r_cc: f64,
    #[serde(default = "nan")]
    pub r_na: f64,
    #[serde(default = "nan")]
    pub r_nb: f64,
    #[serde(default = "nan")]
    pub r_nc: f64,
    #[serde(default = "nan")]
    pub r_nn: f64,
    #[serde(default = "nan")]
    pub x_aa: f64,
    #[serde(default = "nan")]
    pub x_ba: f64,
    #[serde(default = "nan")]
    pub x_bb: f64,
    #[serde(default = "nan")]
    pub x_ca: f64,
    #[serde(default = "nan")]
    pub x_cb: f64,
    #[serde(default = "nan")]
    pub x_cc: f64,
    #[serde(default = "nan")]
    pub x_na: f64,
    #[serde(default = "nan")]
    pub x_nb: f64,
    #[serde(default = "nan")]
    pub x_nc: f64,
    #[serde(default = "nan")]
    pub x_nn: f64,
    #[serde(default = "nan")]
    pub c_aa: f64,
    #[serde(default = "nan")]
    pub c_ba: f64,
    #[serde(default = "nan")]
    pub c_bb: f64,
    #[serde(default = "nan")]
    pub c_ca: f64,
    #[serde(default = "nan")]
    pub c_cb: f64,
    #[serde(default = "nan")]
    pub c_cc: f64,
    #[serde(default = "nan")]
    pub c0: f64,
    #[serde(default = "nan")]
    pub c1: f64,
    #[serde(default = "nan")]
    pub i_n: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransformerInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub from_node: ID,
    #[serde(default = "na_id")]
    pub to_node: ID,
    #[serde(default = "na_ints")]
    pub from_status: IntS,
    #[serde(default = "na_ints")]
    pub to_status: IntS,
    #[serde(default = "nan")]
    pub u1: f64,
    #[serde(default = "nan")]
    pub u2: f64,
    #[serde(default = "nan")]
    pub sn: f64,
    #[serde(default = "nan")]
    pub uk: f64,
    #[serde(default = "nan")]
    pub pk: f64,
    #[serde(default = "nan")]
    pub i0: f64,
    #[serde(default = "nan")]
    pub p0: f64,
    #[serde(default = "na_ints")]
    pub winding_from: IntS,
    #[serde(default = "na_ints")]
    pub winding_to: IntS,
    #[serde(default = "na_ints")]
    pub clock: IntS,
    #[serde(default = "na_ints")]
    pub tap_side: IntS,
    #[serde(default = "na_ints")]
    pub tap_pos: IntS,
    #[serde(default = "na_ints")]
    pub tap_min: IntS,
    #[serde(default = "na_ints")]
    pub tap_max: IntS,
    #[serde(default = "na_ints")]
    pub tap_nom: IntS,
    #[serde(default = "nan")]
    pub tap_size: f64,
    #[serde(default = "nan")]
    pub uk_min: f64,
    #[serde(default = "nan")]
    pub uk_max: f64,
    #[serde(default = "nan")]
    pub pk_min: f64,
    #[serde(default = "nan")]
    pub pk_max: f64,
    #[serde(default = "nan")]
    pub r_grounding_from: f64,
    #[serde(default = "nan")]
    pub x_grounding_from: f64,
    #[serde(default = "nan")]
    pub r_grounding_to: f64,
    #[serde(default = "nan")]
    pub x_grounding_to: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThreeWindingTransformerInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub node_1: ID,
    #[serde(default = "na_id")]
    pub node_2: ID,
    #[serde(default = "na_id")]
    pub node_3: ID,
    #[serde(default = "na_ints")]
    pub status_1: IntS,
    #[serde(default = "na_ints")]
    pub status_2: IntS,
    #[serde(default = "na_ints")]
    pub status_3: IntS,
    #[serde(default = "nan")]
    pub u1: f64,
    #[serde(default = "nan")]
    pub u2: f64,
    #[serde(default = "nan")]
    pub u3: f64,
    #[serde(default = "nan")]
    pub sn_1: f64,
    #[serde(default = "nan")]
    pub sn_2: f64,
    #[serde(default = "nan")]
    pub sn_3: f64,
    #[serde(default = "nan")]
    pub uk_12: f64,
    #[serde(default = "nan")]
    pub uk_13: f64,
    #[serde(default = "nan")]
    pub uk_23: f64,
    #[serde(default = "nan")]
    pub pk_12: f64,
    #[serde(default = "nan")]
    pub pk_13: f64,
    #[serde(default = "nan")]
    pub pk_23: f64,
    #[serde(default = "nan")]
    pub i0: f64,
    #[serde(default = "nan")]
    pub p0: f64,
    #[serde(default = "na_ints")]
    pub winding_1: IntS,
    #[serde(default = "na_ints")]
    pub winding_2: IntS,
    #[serde(default = "na_ints")]
    pub winding_3: IntS,
    #[serde(default = "na_ints")]
    pub clock_12: IntS,
    #[serde(default = "na_ints")]
    pub clock_13: IntS,
    #[serde(default = "na_ints")]
    pub tap_side: IntS,
    #[serde(default = "na_ints")]
    pub tap_pos: IntS,
    #[serde(default = "na_ints")]
    pub tap_min: IntS,
    #[serde(default = "na_ints")]
    pub tap_max: IntS,
    #[serde(default = "na_ints")]
    pub tap_nom: IntS,
    #[serde(default = "nan")]
    pub tap_size: f64,
    #[serde(default = "nan")]
    pub r_grounding_1: f64,
    #[serde(default = "nan")]
    pub x_grounding_1: f64,
    #[serde(default = "nan")]
    pub r_grounding_2: f64,
    #[serde(default = "nan")]
    pub x_grounding_2: f64,
    #[serde(default = "nan")]
    pub r_grounding_3: f64,
    #[serde(default = "nan")]
    pub x_grounding_3: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub node: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    /// Reference voltage in p.u.
    #[serde(default = "nan")]
    pub u_ref: f64,
    #[serde(default = "nan")]
    pub u_ref_angle: f64,
    /// Rated short-circuit capacity in VA.
    #[serde(default = "nan")]
    pub sk: f64,
    #[serde(default = "nan")]
    pub rx_ratio: f64,
    #[serde(default = "nan")]
    pub z01_ratio: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShuntInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub node: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(default = "nan")]
    pub g1: f64,
    #[serde(default = "nan")]
    pub b1: f64,
    #[serde(default = "nan")]
    pub g0: f64,
    #[serde(default = "nan")]
    pub b0: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymLoadGenInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub node: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(rename = "type", default = "na_ints")]
    pub load_gen_type: IntS,
    /// Specified power in W / VAr.
    #[serde(default = "nan")]
    pub p_specified: f64,
    #[serde(default = "nan")]
    pub q_specified: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymLoadGenInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub node: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(rename = "type", default = "na_ints")]
    pub load_gen_type: IntS,
    #[serde(default = "nan3")]
    pub p_specified: [f64; 3],
    #[serde(default = "nan3")]
    pub q_specified: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymVoltageSensorInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub measured_object: ID,
    /// Standard deviation of the measurement in V.
    #[serde(default = "nan")]
    pub u_sigma: f64,
    #[serde(default = "nan")]
    pub u_measured: f64,
    #[serde(default = "nan")]
    pub u_angle_measured: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymVoltageSensorInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub measured_object: ID,
    #[serde(default = "nan")]
    pub u_sigma: f64,
    #[serde(default = "nan3")]
    pub u_measured: [f64; 3],
    #[serde(default = "nan3")]
    pub u_angle_measured: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymPowerSensorInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub measured_object: ID,
    #[serde(default = "na_ints")]
    pub measured_terminal_type: IntS,
    #[serde(default = "nan")]
    pub power_sigma: f64,
    #[serde(default = "nan")]
    pub p_measured: f64,
    #[serde(default = "nan")]
    pub q_measured: f64,
    #[serde(default = "nan")]
    pub p_sigma: f64,
    #[serde(default = "nan")]
    pub q_sigma: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymPowerSensorInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub measured_object: ID,
    #[serde(default = "na_ints")]
    pub measured_terminal_type: IntS,
    #[serde(default = "nan")]
    pub power_sigma: f64,
    #[serde(default = "nan3")]
    pub p_measured: [f64; 3],
    #[serde(default = "nan3")]
    pub q_measured: [f64; 3],
    #[serde(default = "nan3")]
    pub p_sigma: [f64; 3],
    #[serde(default = "nan3")]
    pub q_sigma: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymCurrentSensorInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub measured_object: ID,
    #[serde(default = "na_ints")]
    pub measured_terminal_type: IntS,
    #[serde(default = "na_ints")]
    pub angle_measurement_type: IntS,
    #[serde(default = "nan")]
    pub i_sigma: f64,
    #[serde(default = "nan")]
    pub i_angle_sigma: f64,
    #[serde(default = "nan")]
    pub i_measured: f64,
    #[serde(default = "nan")]
    pub i_angle_measured: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymCurrentSensorInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_id")]
    pub measured_object: ID,
    #[serde(default = "na_ints")]
    pub measured_terminal_type: IntS,
    #[serde(default = "na_ints")]
    pub angle_measurement_type: IntS,
    #[serde(default = "nan")]
    pub i_sigma: f64,
    #[serde(default = "nan")]
    pub i_angle_sigma: f64,
    #[serde(default = "nan3")]
    pub i_measured: [f64; 3],
    #[serde(default = "nan3")]
    pub i_angle_measured: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaultInput {
    #[serde(default = "na_id")]
    pub id: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(default = "na_ints")]
    pub fault_type: IntS,
    #[serde(default = "na_ints")]
    pub fault_phase: IntS,
    /// Faulted node.
    #[serde(default = "na_id")]
    pub fault_object: ID,
    #[serde(default = "nan")]
    pub r_f: f64,
    #[serde(default = "nan")]
    pub x_f: f64,
}

/// One grid snapshot: every record family, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridInput {
    #[serde(default)]
    pub node: Vec<NodeInput>,
    #[serde(default)]
    pub line: Vec<LineInput>,
    #[serde(default)]
    pub link: Vec<LinkInput>,
    #[serde(default)]
    pub generic_branch: Vec<GenericBranchInput>,
    #[serde(default)]
    pub asym_line: Vec<AsymLineInput>,
    #[serde(default)]
    pub transformer: Vec<TransformerInput>,
    #[serde(default)]
    pub three_winding_transformer: Vec<ThreeWindingTransformerInput>,
    #[serde(default)]
    pub source: Vec<SourceInput>,
    #[serde(default)]
    pub shunt: Vec<ShuntInput>,
    #[serde(default)]
    pub sym_load: Vec<SymLoadGenInput>,
    #[serde(default)]
    pub sym_gen: Vec<SymLoadGenInput>,
    #[serde(default)]
    pub asym_load: Vec<AsymLoadGenInput>,
    #[serde(default)]
    pub asym_gen: Vec<AsymLoadGenInput>,
    #[serde(default)]
    pub sym_voltage_sensor: Vec<SymVoltageSensorInput>,
    #[serde(default)]
    pub asym_voltage_sensor: Vec<AsymVoltageSensorInput>,
    #[serde(default)]
    pub sym_power_sensor: Vec<SymPowerSensorInput>,
    #[serde(default)]
    pub asym_power_sensor: Vec<AsymPowerSensorInput>,
    #[serde(default)]
    pub sym_current_sensor: Vec<SymCurrentSensorInput>,
    #[serde(default)]
    pub asym_current_sensor: Vec<AsymCurrentSensorInput>,
    #[serde(default)]
    pub fault: Vec<FaultInput>,
}

// ---------------------------------------------------------------------------
// update records: a proper subset of the input fields, all optional

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BranchUpdate {
    pub id: ID,
    #[serde(default = "na_ints")]
    pub from_status: IntS,
    #[serde(default = "na_ints")]
    pub to_status: IntS,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransformerUpdate {
    pub id: ID,
    #[serde(default = "na_ints")]
    pub from_status: IntS,
    #[serde(default = "na_ints")]
    pub to_status: IntS,
    #[serde(default = "na_ints")]
    pub tap_pos: IntS,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Branch3Update {
    pub id: ID,
    #[serde(default = "na_ints")]
    pub status_1: IntS,
    #[serde(default = "na_ints")]
    pub status_2: IntS,
    #[serde(default = "na_ints")]
    pub status_3: IntS,
    #[serde(default = "na_ints")]
    pub tap_pos: IntS,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceUpdate {
    pub id: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(default = "nan")]
    pub u_ref: f64,
    #[serde(default = "nan")]
    pub u_ref_angle: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShuntUpdate {
    pub id: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(default = "nan")]
    pub g1: f64,
    #[serde(default = "nan")]
    pub b1: f64,
    #[serde(default = "nan")]
    pub g0: f64,
    #[serde(default = "nan")]
    pub b0: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymLoadGenUpdate {
    pub id: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(default = "nan")]
    pub p_specified: f64,
    #[serde(default = "nan")]
    pub q_specified: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymLoadGenUpdate {
    pub id: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(default = "nan3")]
    pub p_specified: [f64; 3],
    #[serde(default = "nan3")]
    pub q_specified: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymVoltageSensorUpdate {
    pub id: ID,
    #[serde(default = "nan")]
    pub u_sigma: f64,
    #[serde(default = "nan")]
    pub u_measured: f64,
    #[serde(default = "nan")]
    pub u_angle_measured: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymVoltageSensorUpdate {
    pub id: ID,
    #[serde(default = "nan")]
    pub u_sigma: f64,
    #[serde(default = "nan3")]
    pub u_measured: [f64; 3],
    #[serde(default = "nan3")]
    pub u_angle_measured: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymPowerSensorUpdate {
    pub id: ID,
    #[serde(default = "nan")]
    pub power_sigma: f64,
    #[serde(default = "nan")]
    pub p_measured: f64,
    #[serde(default = "nan")]
    pub q_measured: f64,
    #[serde(default = "nan")]
    pub p_sigma: f64,
    #[serde(default = "nan")]
    pub q_sigma: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymPowerSensorUpdate {
    pub id: ID,
    #[serde(default = "nan")]
    pub power_sigma: f64,
    #[serde(default = "nan3")]
    pub p_measured: [f64; 3],
    #[serde(default = "nan3")]
    pub q_measured: [f64; 3],
    #[serde(default = "nan3")]
    pub p_sigma: [f64; 3],
    #[serde(default = "nan3")]
    pub q_sigma: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymCurrentSensorUpdate {
    pub id: ID,
    #[serde(default = "nan")]
    pub i_sigma: f64,
    #[serde(default = "nan")]
    pub i_angle_sigma: f64,
    #[serde(default = "nan")]
    pub i_measured: f64,
    #[serde(default = "nan")]
    pub i_angle_measured: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsymCurrentSensorUpdate {
    pub id: ID,
    #[serde(default = "nan")]
    pub i_sigma: f64,
    #[serde(default = "nan")]
    pub i_angle_sigma: f64,
    #[serde(default = "nan3")]
    pub i_measured: [f64; 3],
    #[serde(default = "nan3")]
    pub i_angle_measured: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaultUpdate {
    pub id: ID,
    #[serde(default = "na_ints")]
    pub status: IntS,
    #[serde(default = "na_ints")]
    pub fault_type: IntS,
    #[serde(default = "na_ints")]
    pub fault_phase: IntS,
    #[serde(default = "na_id")]
    pub fault_object: ID,
    #[serde(default = "nan")]
    pub r_f: f64,
    #[serde(default = "nan")]
    pub x_f: f64,
}

/// Tagged update record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum UpdateRecord {
    Branch(BranchUpdate),
    Transformer(TransformerUpdate),
    ThreeWindingTransformer(Branch3Update),
    Source(SourceUpdate),
    Shunt(ShuntUpdate),
    SymLoadGen(SymLoadGenUpdate),
    AsymLoadGen(AsymLoadGenUpdate),
    SymVoltageSensor(SymVoltageSensorUpdate),
    AsymVoltageSensor(AsymVoltageSensorUpdate),
    SymPowerSensor(SymPowerSensorUpdate),
    AsymPowerSensor(AsymPowerSensorUpdate),
    SymCurrentSensor(SymCurrentSensorUpdate),
    AsymCurrentSensor(AsymCurrentSensorUpdate),
    Fault(FaultUpdate),
}

impl UpdateRecord {
    pub fn id(&self) -> ID {
        match self {
            UpdateRecord::Branch(u) => u.id,
            UpdateRecord::Transformer(u) => u.id,
            UpdateRecord::ThreeWindingTransformer(u) => u.id,
            UpdateRecord::Source(u) => u.id,
            UpdateRecord::Shunt(u) => u.id,
            UpdateRecord::SymLoadGen(u) => u.id,
            UpdateRecord::AsymLoadGen(u) => u.id,
            UpdateRecord::SymVoltageSensor(u) => u.id,
            UpdateRecord::AsymVoltageSensor(u) => u.id,
            UpdateRecord::SymPowerSensor(u) => u.id,
            UpdateRecord::AsymPowerSensor(u) => u.id,
            UpdateRecord::SymCurrentSensor(u) => u.id,
            UpdateRecord::AsymCurrentSensor(u) => u.id,
            UpdateRecord::Fault(u) => u.id,
        }
    }
}

/// Batch of updates applied together and revertible together.
pub type UpdateBatch = Vec<UpdateRecord>;
