//! Element components.
//!
//! Every grid element is an entity composed of per-concern components:
//! identity, connectivity, status, and the per-type calculation model. The
//! constructors below turn the flat input records into component sets,
//! applying defaults, per-unit conversion and the construction-time
//! validation of the originals.

use bevy_ecs::prelude::*;
use derive_more::{Deref, DerefMut};
use nalgebra::{Matrix3, Matrix4, Vector3};
use num_complex::Complex64;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::basic::common::*;
use crate::basic::error::GridError;
use crate::basic::param::*;
use crate::basic::tensor::kron_reduction;
use crate::io::records::*;

/// Record identifier of the element.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Deref, DerefMut, Serialize, Deserialize)]
pub struct ElemId(pub ID);

/// Rated voltage of a node.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeParam {
    pub u_rated: f64,
}

/// Position of a node in the model's bus numbering.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Deref, Serialize, Deserialize)]
pub struct NodeSlot(pub usize);

/// Terminal node ids of a branch, for output records.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchNodes {
    pub from: ID,
    pub to: ID,
}

/// Resolved terminal bus slots of a branch.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSlots {
    pub from: usize,
    pub to: usize,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchStatus {
    pub from: bool,
    pub to: bool,
}

/// Base currents of the two branch terminals in A.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchBase {
    pub base_i_from: f64,
    pub base_i_to: f64,
}

/// How a branch's loading is computed from its flows.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LoadingRule {
    /// Worst-side current against the rated current in A.
    Current { i_n: f64 },
    /// Worst-side apparent power against the rated power in VA.
    Power { sn: f64 },
    None,
}

/// `θ_from − θ_to` introduced by the branch.
#[derive(Component, Debug, Clone, Copy, PartialEq, Deref, Serialize, Deserialize)]
pub struct BranchShift(pub f64);

/// Parent component of a three-winding transformer: the three internal
/// two-winding legs meeting at a fictitious node.
#[derive(Component, Debug, Clone)]
pub struct Branch3Legs {
    pub legs: [Entity; 3],
    pub internal_bus: usize,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Branch3Nodes {
    pub nodes: [ID; 3],
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Branch3Status {
    pub status: [bool; 3],
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Branch3Rating {
    pub sn: [f64; 3],
}

/// Node an appliance is attached to.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Deref, Serialize, Deserialize)]
pub struct ApplianceNode(pub ID);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Deref, Serialize, Deserialize)]
pub struct ApplianceStatus(pub bool);

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceModel {
    pub u_ref: f64,
    pub u_ref_angle: f64,
    pub param: SourceCalcParam,
}

impl SourceModel {
    pub fn u_ref_c(&self) -> Complex64 {
        Complex64::from_polar(self.u_ref, self.u_ref_angle)
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShuntModel {
    pub g1: f64,
    pub b1: f64,
    pub g0: f64,
    pub b0: f64,
    pub base_y: f64,
}

impl ShuntModel {
    pub fn y1(&self) -> Complex64 {
        Complex64::new(self.g1, self.b1) / self.base_y
    }

    pub fn y0(&self) -> Complex64 {
        Complex64::new(self.g0, self.b0) / self.base_y
    }
}

/// Load or generator with symmetric specified power (total, in W / VAr).
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymLoadGenModel {
    pub p_specified: f64,
    pub q_specified: f64,
    pub load_gen_type: LoadGenType,
    /// +1 generator, −1 load.
    pub direction: f64,
}

/// Load or generator with per-phase specified power.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsymLoadGenModel {
    pub p_specified: [f64; 3],
    pub q_specified: [f64; 3],
    pub load_gen_type: LoadGenType,
    pub direction: f64,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuredObject(pub ID);

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymVoltageSensorModel {
    /// Measured line-line voltage in V.
    pub u_measured: f64,
    pub u_angle_measured: f64,
    pub u_sigma: f64,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsymVoltageSensorModel {
    /// Measured line-neutral voltages in V.
    pub u_measured: [f64; 3],
    pub u_angle_measured: [f64; 3],
    pub u_sigma: f64,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymPowerSensorModel {
    pub p_measured: f64,
    pub q_measured: f64,
    pub power_sigma: f64,
    pub p_sigma: f64,
    pub q_sigma: f64,
    /// −1 for load/shunt terminals whose physical direction opposes the
    /// math-model injection direction.
    pub direction: f64,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsymPowerSensorModel {
    pub p_measured: [f64; 3],
    pub q_measured: [f64; 3],
    pub power_sigma: f64,
    pub p_sigma: [f64; 3],
    pub q_sigma: [f64; 3],
    pub direction: f64,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymCurrentSensorModel {
    pub i_measured: f64,
    pub i_angle_measured: f64,
    pub i_sigma: f64,
    pub i_angle_sigma: f64,
    pub angle_measurement_type: AngleMeasurementType,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsymCurrentSensorModel {
    pub i_measured: [f64; 3],
    pub i_angle_measured: [f64; 3],
    pub i_sigma: f64,
    pub i_angle_sigma: f64,
    pub angle_measurement_type: AngleMeasurementType,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaultModel {
    pub status: bool,
    pub fault_type: Option<FaultType>,
    pub fault_phase: FaultPhase,
    pub fault_object: ID,
    pub r_f: f64,
    pub x_f: f64,
}

impl FaultModel {
    /// Fault admittance in per-unit of the faulted node's base.
    pub fn calc_param(&self, u_rated: f64) -> Result<FaultCalcParam, GridError> {
        let fault_type = self.fault_type.ok_or(GridError::InvalidShortCircuitType {
            fault_type: NA_INT_S,
        })?;
        let r_f = if self.r_f.is_nan() { 0.0 } else { self.r_f };
        let x_f = if self.x_f.is_nan() { 0.0 } else { self.x_f };
        let y_fault = if r_f == 0.0 && x_f == 0.0 {
            Complex64::new(f64::INFINITY, f64::INFINITY)
        } else {
            let base_z = u_rated * u_rated / BASE_POWER_3P;
            base_z / Complex64::new(r_f, x_f)
        };
        Ok(FaultCalcParam {
            y_fault,
            fault_type,
            fault_phase: self.fault_phase,
        })
    }
}

/// Original record of a three-winding transformer, kept for tap updates
/// which re-derive the internal legs.
#[derive(Component, Debug, Clone, Copy)]
pub struct Branch3Input(pub ThreeWindingTransformerInput);

/// Derives the three internal two-winding legs of a three-winding
/// transformer: tap folded into the winding voltages, short-circuit
/// parameters redistributed by the wye-delta identity, leg 1 always YNyn0
/// towards the internal node at the side-1 voltage level.
pub fn three_winding_legs(
    t3: &ThreeWindingTransformerInput,
    rated: [f64; 3],
) -> Result<([TransformerParam; 3], [bool; 3]), GridError> {
    let winding_1: WindingType = lift_enum(t3.winding_1, "winding type")?;
    let winding_2: WindingType = lift_enum(t3.winding_2, "winding type")?;
    let winding_3: WindingType = lift_enum(t3.winding_3, "winding type")?;
    if !is_valid_clock(t3.clock_12, winding_1, winding_2) {
        return Err(GridError::InvalidTransformerClock {
            id: t3.id,
            clock: t3.clock_12,
        });
    }
    if !is_valid_clock(t3.clock_13, winding_1, winding_3) {
        return Err(GridError::InvalidTransformerClock {
            id: t3.id,
            clock: t3.clock_13,
        });
    }

    let tap_nom = if is_na_ints(t3.tap_nom) { 0 } else { t3.tap_nom };
    let tap_pos = if is_na_ints(t3.tap_pos) { tap_nom } else { t3.tap_pos };
    let tap_min = if is_na_ints(t3.tap_min) { 0 } else { t3.tap_min };
    let tap_max = if is_na_ints(t3.tap_max) { 0 } else { t3.tap_max };
    let tap_direction: f64 = if tap_max > tap_min { 1.0 } else { -1.0 };
    let tap_pos = tap_pos.min(tap_max.max(tap_min)).max(tap_max.min(tap_min));
    let tap_delta = tap_direction * f64::from(tap_pos - tap_nom) * or_default(t3.tap_size, 0.0);
    let tap_side: Branch3Side = if is_na_ints(t3.tap_side) {
        Branch3Side::Side1
    } else {
        lift_enum(t3.tap_side, "tap side")?
    };
    let mut u = [t3.u1, t3.u2, t3.u3];
    u[tap_side as usize] += tap_delta;

    let (uk_t1, uk_t2, uk_t3) =
        three_winding_uk(t3.uk_12, t3.uk_13, t3.uk_23, t3.sn_1, t3.sn_2, t3.sn_3);
    let (pk_t1, pk_t2, pk_t3) =
        three_winding_pk(t3.pk_12, t3.pk_13, t3.pk_23, t3.sn_1, t3.sn_2, t3.sn_3);

    let z_grounding = [
        Complex64::new(
            or_default(t3.r_grounding_1, 0.0),
            or_default(t3.x_grounding_1, 0.0),
        ) / (rated[0] * rated[0] / BASE_POWER_3P),
        Complex64::new(
            or_default(t3.r_grounding_2, 0.0),
            or_default(t3.x_grounding_2, 0.0),
        ) / (rated[1] * rated[1] / BASE_POWER_3P),
        Complex64::new(
            or_default(t3.r_grounding_3, 0.0),
            or_default(t3.x_grounding_3, 0.0),
        ) / (rated[2] * rated[2] / BASE_POWER_3P),
    ];

    let leg = |side: usize, uk: f64, pk: f64, winding_from: WindingType, clock: IntS| {
        TransformerParam {
            u1: u[side],
            u2: u[0],
            sn: [t3.sn_1, t3.sn_2, t3.sn_3][side],
            uk,
            pk,
            i0: if side == 0 { or_default(t3.i0, 0.0) } else { 0.0 },
            p0: if side == 0 { or_default(t3.p0, 0.0) } else { 0.0 },
            winding_from,
            winding_to: if side == 0 { WindingType::WyeN } else { winding_1 },
            clock: clock % 12,
            tap_side: BranchSide::From,
            tap_pos: 0,
            tap_min: 0,
            tap_max: 0,
            tap_nom: 0,
            tap_direction: 1,
            tap_size: 0.0,
            uk_min: uk,
            uk_max: uk,
            pk_min: pk,
            pk_max: pk,
            nominal_ratio: rated[side] / rated[0],
            base_i_to: BASE_POWER_3P / rated[0] / SQRT3,
            z_grounding_from: z_grounding[side],
            z_grounding_to: Complex64::new(0.0, 0.0),
        }
    };
    let legs = [
        leg(0, uk_t1, pk_t1, WindingType::WyeN, 0),
        leg(1, uk_t2, pk_t2, winding_2, (12 - t3.clock_12) % 12),
        leg(2, uk_t3, pk_t3, winding_3, (12 - t3.clock_13) % 12),
    ];
    let status = [
        status_bool(t3.status_1),
        status_bool(t3.status_2),
        status_bool(t3.status_3),
    ];
    Ok((legs, status))
}

/// Defaults a NaN field.
pub(crate) fn or_default(value: f64, default: f64) -> f64 {
    if value.is_nan() { default } else { value }
}

pub(crate) fn status_bool(status: IntS) -> bool {
    !is_na_ints(status) && status != 0
}

pub(crate) fn lift_enum<E: FromPrimitive>(value: IntS, context: &'static str) -> Result<E, GridError> {
    E::from_i8(value).ok_or(GridError::MissingCaseForEnum {
        context,
        value: value as i64,
    })
}

fn base_i(u_rated: f64) -> f64 {
    BASE_POWER_3P / u_rated / SQRT3
}

fn base_y(u_rated: f64) -> f64 {
    base_i(u_rated) / (u_rated / SQRT3)
}

/// Line record → calculation model, with the rated-voltage compatibility
/// check of the original.
pub fn line_param(input: &LineInput, u1: f64, u2: f64) -> Result<LineParam, GridError> {
    if (u1 - u2).abs() > NUMERICAL_TOLERANCE {
        return Err(GridError::ConflictVoltage {
            branch: input.id,
            from_node: input.from_node,
            to_node: input.to_node,
            u1,
            u2,
        });
    }
    let by = base_y(u1);
    let omega = 2.0 * std::f64::consts::PI * SYSTEM_FREQUENCY;
    let y_series_1 = 1.0 / Complex64::new(input.r1, input.x1) / by;
    let y_shunt_1 = omega * input.c1 * Complex64::new(or_default(input.tan1, 0.0), 1.0) / by;
    // missing zero-sequence data falls back to the positive sequence
    let r0 = or_default(input.r0, input.r1);
    let x0 = or_default(input.x0, input.x1);
    let c0 = or_default(input.c0, input.c1);
    let tan0 = or_default(input.tan0, or_default(input.tan1, 0.0));
    let y_series_0 = 1.0 / Complex64::new(r0, x0) / by;
    let y_shunt_0 = omega * c0 * Complex64::new(tan0, 1.0) / by;
    Ok(LineParam {
        y_series_1,
        y_shunt_1: if input.c1.is_nan() {
            Complex64::new(0.0, 0.0)
        } else {
            y_shunt_1
        },
        y_series_0,
        y_shunt_0: if c0.is_nan() {
            Complex64::new(0.0, 0.0)
        } else {
            y_shunt_0
        },
    })
}

pub fn generic_branch_param(input: &GenericBranchInput, u2_rated: f64) -> GenericBranchParam {
    let by = base_y(u2_rated);
    GenericBranchParam {
        y_series: 1.0 / Complex64::new(input.r1, input.x1) / by,
        y_shunt: Complex64::new(or_default(input.g1, 0.0), or_default(input.b1, 0.0)) / by,
        k: or_default(input.k, 1.0),
        theta: or_default(input.theta, 0.0) % (2.0 * std::f64::consts::PI),
    }
}

pub fn asym_line_param(input: &AsymLineInput, u1: f64, u2: f64) -> Result<AsymLineParam, GridError> {
    if (u1 - u2).abs() > NUMERICAL_TOLERANCE {
        return Err(GridError::ConflictVoltage {
            branch: input.id,
            from_node: input.from_node,
            to_node: input.to_node,
            u1,
            u2,
        });
    }
    let by = base_y(u1);
    let z_series = if input.r_na.is_nan() && input.x_na.is_nan() {
        let r = sym_tensor3(
            input.r_aa, input.r_bb, input.r_cc, input.r_ba, input.r_ca, input.r_cb,
        );
        let x = sym_tensor3(
            input.x_aa, input.x_bb, input.x_cc, input.x_ba, input.x_ca, input.x_cb,
        );
        r.map(|v| Complex64::new(v, 0.0)) + x.map(|v| Complex64::new(0.0, v))
    } else {
        let r = sym_tensor4(
            input.r_aa, input.r_bb, input.r_cc, input.r_nn, input.r_ba, input.r_ca, input.r_na,
            input.r_cb, input.r_nb, input.r_nc,
        );
        let x = sym_tensor4(
            input.x_aa, input.x_bb, input.x_cc, input.x_nn, input.x_ba, input.x_ca, input.x_na,
            input.x_cb, input.x_nb, input.x_nc,
        );
        let z = r.map(|v| Complex64::new(v, 0.0)) + x.map(|v| Complex64::new(0.0, v));
        kron_reduction(&z)
    };
    let c_matrix = if !input.c0.is_nan() && !input.c1.is_nan() {
        let s = (2.0 * input.c1 + input.c0) / 3.0;
        let m = (input.c0 - input.c1) / 3.0;
        sym_tensor3(s, s, s, m, m, m)
    } else {
        sym_tensor3(
            input.c_aa, input.c_bb, input.c_cc, input.c_ba, input.c_ca, input.c_cb,
        )
    };
    let z_inv = z_series
        .try_inverse()
        .unwrap_or_else(Matrix3::zeros);
    let omega = 2.0 * std::f64::consts::PI * SYSTEM_FREQUENCY;
    Ok(AsymLineParam {
        y_series_abc: z_inv / Complex64::new(by, 0.0),
        y_shunt_abc: c_matrix.map(|c| Complex64::new(0.0, omega * c)) / Complex64::new(by, 0.0),
    })
}

fn sym_tensor3(s1: f64, s2: f64, s3: f64, m12: f64, m13: f64, m23: f64) -> Matrix3<f64> {
    Matrix3::new(s1, m12, m13, m12, s2, m23, m13, m23, s3)
}

#[allow(clippy::too_many_arguments)]
fn sym_tensor4(
    s1: f64,
    s2: f64,
    s3: f64,
    s4: f64,
    m12: f64,
    m13: f64,
    m14: f64,
    m23: f64,
    m24: f64,
    m34: f64,
) -> Matrix4<f64> {
    Matrix4::new(
        s1, m12, m13, m14, //
        m12, s2, m23, m24, //
        m13, m23, s3, m34, //
        m14, m24, m34, s4,
    )
}

pub fn transformer_param(
    input: &TransformerInput,
    u1_rated: f64,
    u2_rated: f64,
) -> Result<TransformerParam, GridError> {
    let winding_from: WindingType = lift_enum(input.winding_from, "winding type")?;
    let winding_to: WindingType = lift_enum(input.winding_to, "winding type")?;
    if !is_valid_clock(input.clock, winding_from, winding_to) {
        return Err(GridError::InvalidTransformerClock {
            id: input.id,
            clock: input.clock,
        });
    }
    let tap_side: BranchSide = if is_na_ints(input.tap_side) {
        BranchSide::From
    } else {
        lift_enum(input.tap_side, "tap side")?
    };
    let tap_nom = if is_na_ints(input.tap_nom) { 0 } else { input.tap_nom };
    let tap_pos = if is_na_ints(input.tap_pos) { tap_nom } else { input.tap_pos };
    let tap_min = if is_na_ints(input.tap_min) { 0 } else { input.tap_min };
    let tap_max = if is_na_ints(input.tap_max) { 0 } else { input.tap_max };
    let base_z_from = u1_rated * u1_rated / BASE_POWER_3P;
    let base_z_to = u2_rated * u2_rated / BASE_POWER_3P;
    let mut param = TransformerParam {
        u1: input.u1,
        u2: input.u2,
        sn: input.sn,
        uk: input.uk,
        pk: input.pk,
        i0: or_default(input.i0, 0.0),
        p0: or_default(input.p0, 0.0),
        winding_from,
        winding_to,
        clock: input.clock % 12,
        tap_side,
        tap_pos: 0,
        tap_min,
        tap_max,
        tap_nom,
        tap_direction: if tap_max > tap_min { 1 } else { -1 },
        tap_size: or_default(input.tap_size, 0.0),
        uk_min: or_default(input.uk_min, input.uk),
        uk_max: or_default(input.uk_max, input.uk),
        pk_min: or_default(input.pk_min, input.pk),
        pk_max: or_default(input.pk_max, input.pk),
        nominal_ratio: u1_rated / u2_rated,
        base_i_to: base_i(u2_rated),
        z_grounding_from: Complex64::new(
            or_default(input.r_grounding_from, 0.0),
            or_default(input.x_grounding_from, 0.0),
        ) / base_z_from,
        z_grounding_to: Complex64::new(
            or_default(input.r_grounding_to, 0.0),
            or_default(input.x_grounding_to, 0.0),
        ) / base_z_to,
    };
    param.tap_pos = param.clamp_tap(tap_pos);
    Ok(param)
}

pub fn source_model(input: &SourceInput) -> SourceModel {
    let sk = or_default(input.sk, DEFAULT_SOURCE_SK);
    let rx_ratio = or_default(input.rx_ratio, DEFAULT_SOURCE_RX_RATIO);
    let z01_ratio = or_default(input.z01_ratio, DEFAULT_SOURCE_Z01_RATIO);
    SourceModel {
        u_ref: or_default(input.u_ref, 1.0),
        u_ref_angle: or_default(input.u_ref_angle, 0.0),
        param: SourceCalcParam::from_sk(sk, rx_ratio, z01_ratio),
    }
}

pub fn shunt_model(input: &ShuntInput, u_rated: f64) -> ShuntModel {
    ShuntModel {
        g1: or_default(input.g1, 0.0),
        b1: or_default(input.b1, 0.0),
        g0: or_default(input.g0, 0.0),
        b0: or_default(input.b0, 0.0),
        base_y: base_y(u_rated),
    }
}
