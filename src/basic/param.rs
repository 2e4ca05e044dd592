//! Component calculation parameters.
//!
//! Each component type reduces, when connected and energised, to its
//! contribution to the admittance matrix or the injection vector: branches to
//! a 2x2 block of admittance tensors, shunts to one tensor, sources to
//! sequence admittances, loads and generators to a power injection, sensors
//! to a measured value with variances, faults to a fault admittance.

use bevy_ecs::prelude::Component;
use nalgebra::{Matrix3, Vector3};
use num_complex::Complex64;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use super::common::*;
use super::error::GridError;
use super::tensor::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum LoadGenType {
    ConstPq = 0,
    ConstY = 1,
    ConstI = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum WindingType {
    Wye = 0,
    WyeN = 1,
    Delta = 2,
    Zigzag = 3,
    ZigzagN = 4,
}

impl WindingType {
    pub fn is_wye_family(self) -> bool {
        matches!(self, WindingType::Wye | WindingType::WyeN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum BranchSide {
    From = 0,
    To = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum Branch3Side {
    Side1 = 0,
    Side2 = 1,
    Side3 = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum MeasuredTerminalType {
    BranchFrom = 0,
    BranchTo = 1,
    Source = 2,
    Shunt = 3,
    Load = 4,
    Generator = 5,
    Branch3Side1 = 6,
    Branch3Side2 = 7,
    Branch3Side3 = 8,
    Node = 9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum AngleMeasurementType {
    GlobalAngle = 0,
    LocalAngle = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum FaultType {
    ThreePhase = 0,
    SinglePhaseToGround = 1,
    TwoPhase = 2,
    TwoPhaseToGround = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum FaultPhase {
    Abc = 0,
    A = 1,
    B = 2,
    C = 3,
    Ab = 4,
    Ac = 5,
    Bc = 6,
    DefaultValue = -1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum ShortCircuitVoltageScaling {
    Minimum = 0,
    Maximum = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive)]
pub enum CalculationMethod {
    Linear = 0,
    NewtonRaphson = 1,
    IterativeLinear = 2,
    IterativeCurrent = 3,
    LinearCurrent = 4,
}

/// 2x2 block of admittance tensors of a two-port branch relating terminal
/// currents to terminal voltages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchCalcParam<S: Symmetry> {
    pub yff: S::Tensor,
    pub yft: S::Tensor,
    pub ytf: S::Tensor,
    pub ytt: S::Tensor,
}

impl<S: Symmetry> BranchCalcParam<S> {
    pub fn zero() -> Self {
        Self {
            yff: S::Tensor::zero(),
            yft: S::Tensor::zero(),
            ytf: S::Tensor::zero(),
            ytt: S::Tensor::zero(),
        }
    }

    pub fn blocks(&self) -> [S::Tensor; 4] {
        [self.yff, self.yft, self.ytf, self.ytt]
    }
}

/// Positive- and zero-sequence internal admittance of a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceCalcParam {
    pub y1: Complex64,
    pub y0: Complex64,
}

impl SourceCalcParam {
    /// Internal admittance from rated short-circuit capacity, R/X ratio and
    /// zero/positive sequence impedance ratio.
    pub fn from_sk(sk: f64, rx_ratio: f64, z01_ratio: f64) -> Self {
        let z_abs = BASE_POWER_3P / sk;
        let x1 = z_abs / (rx_ratio * rx_ratio + 1.0).sqrt();
        let r1 = x1 * rx_ratio;
        let y1 = 1.0 / Complex64::new(r1, x1);
        Self {
            y1,
            y0: y1 / z01_ratio,
        }
    }

    pub fn math_param<S: Symmetry>(&self) -> S::Tensor {
        S::tensor_from_sequence(self.y1, self.y0)
    }
}

/// Fault admittance with its type and participating phases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultCalcParam {
    pub y_fault: Complex64,
    pub fault_type: FaultType,
    pub fault_phase: FaultPhase,
}

/// A measured real quantity with its variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandVar<S: Symmetry> {
    pub value: S::Real,
    pub variance: S::Real,
}

/// Power (or complex current) measurement with per-component variances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSensorCalcParam<S: Symmetry> {
    pub real_component: RandVar<S>,
    pub imag_component: RandVar<S>,
}

impl<S: Symmetry> PowerSensorCalcParam<S> {
    pub fn value(&self) -> S::Complex {
        S::Complex::from_re_im(self.real_component.value, self.imag_component.value)
    }
}

/// Voltage measurement. A NaN imaginary part encodes a magnitude-only
/// measurement (no angle).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageSensorCalcParam<S: Symmetry> {
    pub value: S::Complex,
    pub variance: f64,
}

impl<S: Symmetry> VoltageSensorCalcParam<S> {
    pub fn has_angle(&self) -> bool {
        !self.value.im().is_nan()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentSensorCalcParam<S: Symmetry> {
    pub angle_measurement_type: AngleMeasurementType,
    pub measurement: PowerSensorCalcParam<S>,
}

/// All component calculation parameters of one math model, in the order of
/// the topology groupings.
#[derive(Debug, Clone, Default)]
pub struct MathModelParam<S: Symmetry> {
    pub branch_param: Vec<BranchCalcParam<S>>,
    pub shunt_param: Vec<S::Tensor>,
    pub source_param: Vec<SourceCalcParam>,
}

/// Single-sequence two-port reduction. `tap_ratio` is the complex off-nominal
/// ratio `k·e^{jθ}` seen from the from side.
fn scalar_branch_blocks(
    from_status: bool,
    to_status: bool,
    y_series: Complex64,
    y_shunt: Complex64,
    tap_ratio: Complex64,
) -> [Complex64; 4] {
    let zero = Complex64::new(0.0, 0.0);
    let tap = tap_ratio.norm();
    if !(from_status && to_status) {
        if !(from_status || to_status) {
            return [zero; 4];
        }
        // single connected side reduces to a one-port admittance
        let branch_shunt = if y_shunt.norm() < NUMERICAL_TOLERANCE {
            zero
        } else {
            0.5 * y_shunt + 1.0 / (1.0 / y_series + 2.0 / y_shunt)
        };
        let yff = if from_status {
            branch_shunt / tap / tap
        } else {
            zero
        };
        let ytt = if to_status { branch_shunt } else { zero };
        return [yff, zero, zero, ytt];
    }
    let ytt = y_series + 0.5 * y_shunt;
    let yff = ytt / tap / tap;
    let yft = -y_series / tap_ratio.conj();
    let ytf = -y_series / tap_ratio;
    [yff, yft, ytf, ytt]
}

/// Branch parameter from positive- and zero-sequence series/shunt
/// admittances. The symmetric variant uses the positive sequence only; the
/// asymmetric variant combines both into phase-domain tensors.
pub fn branch_param_from_sequence<S: Symmetry>(
    from_status: bool,
    to_status: bool,
    y1_series: Complex64,
    y1_shunt: Complex64,
    y0_series: Complex64,
    y0_shunt: Complex64,
    tap_ratio: Complex64,
) -> BranchCalcParam<S> {
    let p1 = scalar_branch_blocks(from_status, to_status, y1_series, y1_shunt, tap_ratio);
    let p0 = scalar_branch_blocks(from_status, to_status, y0_series, y0_shunt, tap_ratio);
    let t = |i: usize| S::tensor_from_sequence(p1[i], p0[i]);
    BranchCalcParam {
        yff: t(0),
        yft: t(1),
        ytf: t(2),
        ytt: t(3),
    }
}

/// Any branch model able to produce its calculation parameter.
pub trait BranchParamSource<S: Symmetry> {
    fn branch_param(
        &self,
        from_status: bool,
        to_status: bool,
    ) -> Result<BranchCalcParam<S>, GridError>;
}

/// Line admittances in per-unit, both sequences.
#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct LineParam {
    pub y_series_1: Complex64,
    pub y_shunt_1: Complex64,
    pub y_series_0: Complex64,
    pub y_shunt_0: Complex64,
}

impl<S: Symmetry> BranchParamSource<S> for LineParam {
    fn branch_param(
        &self,
        from_status: bool,
        to_status: bool,
    ) -> Result<BranchCalcParam<S>, GridError> {
        Ok(branch_param_from_sequence::<S>(
            from_status,
            to_status,
            self.y_series_1,
            self.y_shunt_1,
            self.y_series_0,
            self.y_shunt_0,
            Complex64::new(1.0, 0.0),
        ))
    }
}

/// Ideal connection between two buses of equal rated voltage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Component)]
pub struct LinkParam;

impl<S: Symmetry> BranchParamSource<S> for LinkParam {
    fn branch_param(
        &self,
        from_status: bool,
        to_status: bool,
    ) -> Result<BranchCalcParam<S>, GridError> {
        let zero = Complex64::new(0.0, 0.0);
        Ok(branch_param_from_sequence::<S>(
            from_status,
            to_status,
            Y_LINK,
            zero,
            Y_LINK,
            zero,
            Complex64::new(1.0, 0.0),
        ))
    }
}

/// Generic two-port with explicit ratio and angle shift; positive sequence
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct GenericBranchParam {
    pub y_series: Complex64,
    pub y_shunt: Complex64,
    pub k: f64,
    pub theta: f64,
}

impl<S: Symmetry> BranchParamSource<S> for GenericBranchParam {
    fn branch_param(
        &self,
        from_status: bool,
        to_status: bool,
    ) -> Result<BranchCalcParam<S>, GridError> {
        // a generic branch has no zero-sequence description
        if !S::IS_SYMMETRIC {
            return Err(GridError::NotImplemented);
        }
        let tap = Complex64::from_polar(self.k, self.theta);
        let p = scalar_branch_blocks(from_status, to_status, self.y_series, self.y_shunt, tap);
        let t = |i: usize| S::tensor_from_sequence(p[i], p[i]);
        Ok(BranchCalcParam {
            yff: t(0),
            yft: t(1),
            ytf: t(2),
            ytt: t(3),
        })
    }
}

/// Phase-domain line admittances obtained from the 4x4 impedance matrices by
/// Kron reduction of the neutral.
#[derive(Debug, Clone, PartialEq, Component)]
pub struct AsymLineParam {
    pub y_series_abc: Matrix3<Complex64>,
    pub y_shunt_abc: Matrix3<Complex64>,
}

impl AsymLineParam {
    fn y1_equivalent(&self) -> (Complex64, Complex64) {
        (
            avg_diag(&self.y_series_abc) - avg_off_diag(&self.y_series_abc),
            avg_diag(&self.y_shunt_abc) - avg_off_diag(&self.y_shunt_abc),
        )
    }
}

fn avg_diag(m: &Matrix3<Complex64>) -> Complex64 {
    (m[(0, 0)] + m[(1, 1)] + m[(2, 2)]) / 3.0
}

fn avg_off_diag(m: &Matrix3<Complex64>) -> Complex64 {
    (m[(0, 1)] + m[(0, 2)] + m[(1, 0)] + m[(1, 2)] + m[(2, 0)] + m[(2, 1)]) / 6.0
}

impl<S: Symmetry> BranchParamSource<S> for AsymLineParam {
    fn branch_param(
        &self,
        from_status: bool,
        to_status: bool,
    ) -> Result<BranchCalcParam<S>, GridError> {
        if S::IS_SYMMETRIC {
            // positive-sequence equivalent of the phase tensors
            let (y1_series, y1_shunt) = self.y1_equivalent();
            return Ok(branch_param_from_sequence::<S>(
                from_status,
                to_status,
                y1_series,
                y1_shunt,
                y1_series,
                y1_shunt,
                Complex64::new(1.0, 0.0),
            ));
        }
        let zero = Matrix3::zeros();
        let mut blocks = [zero; 4];
        if !(from_status && to_status) {
            if from_status || to_status {
                let mut branch_shunt = zero;
                let all_shunt_live = self
                    .y_shunt_abc
                    .iter()
                    .all(|c| c.norm() >= NUMERICAL_TOLERANCE);
                if all_shunt_live {
                    if let (Some(zs), Some(zh)) = (
                        ComplexTensor::try_inv(self.y_series_abc),
                        ComplexTensor::try_inv(self.y_shunt_abc),
                    ) {
                        let inner = ComplexTensor::try_inv(zs + zh.scale(2.0))
                            .unwrap_or_else(Matrix3::zeros);
                        branch_shunt = self.y_shunt_abc.scale(0.5) + inner;
                    }
                }
                if from_status {
                    blocks[0] = branch_shunt;
                }
                if to_status {
                    blocks[3] = branch_shunt;
                }
            }
        } else {
            blocks[3] = self.y_series_abc + self.y_shunt_abc.scale(0.5);
            blocks[0] = blocks[3];
            blocks[1] = -self.y_series_abc;
            blocks[2] = -self.y_series_abc;
        }
        Ok(BranchCalcParam {
            yff: S::tensor_from_abc(blocks[0]),
            yft: S::tensor_from_abc(blocks[1]),
            ytf: S::tensor_from_abc(blocks[2]),
            ytt: S::tensor_from_abc(blocks[3]),
        })
    }
}

/// Linear tap interpolation between the nominal and the min/max test values.
pub fn tap_adjust_impedance(
    tap_pos: f64,
    tap_min: f64,
    tap_max: f64,
    tap_nom: f64,
    xk: f64,
    xk_min: f64,
    xk_max: f64,
) -> f64 {
    if tap_pos <= tap_nom.max(tap_max) && tap_pos >= tap_nom.min(tap_max) {
        if tap_max == tap_nom {
            return xk;
        }
        let increment = (xk_max - xk) / (tap_max - tap_nom);
        return xk + (tap_pos - tap_nom) * increment;
    }
    if tap_min == tap_nom {
        return xk;
    }
    let increment = (xk_min - xk) / (tap_min - tap_nom);
    xk + (tap_pos - tap_nom) * increment
}

/// Clock numbers run 0..=12; even numbers pair wye-family windings on both
/// sides, odd numbers mix wye with delta/zigzag.
pub fn is_valid_clock(clock: IntS, winding_from: WindingType, winding_to: WindingType) -> bool {
    let clock_in_range = (0..=12).contains(&clock);
    let clock_is_even = clock % 2 == 0;
    let correct_parity =
        clock_is_even == (winding_from.is_wye_family() == winding_to.is_wye_family());
    clock_in_range && correct_parity
}

/// Two-winding transformer electrical data in per-unit of the to side.
#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct TransformerParam {
    pub u1: f64,
    pub u2: f64,
    pub sn: f64,
    pub uk: f64,
    pub pk: f64,
    pub i0: f64,
    pub p0: f64,
    pub winding_from: WindingType,
    pub winding_to: WindingType,
    /// Stored modulo 12.
    pub clock: IntS,
    pub tap_side: BranchSide,
    pub tap_pos: IntS,
    pub tap_min: IntS,
    pub tap_max: IntS,
    pub tap_nom: IntS,
    pub tap_direction: IntS,
    pub tap_size: f64,
    pub uk_min: f64,
    pub uk_max: f64,
    pub pk_min: f64,
    pub pk_max: f64,
    pub nominal_ratio: f64,
    pub base_i_to: f64,
    pub z_grounding_from: Complex64,
    pub z_grounding_to: Complex64,
}

impl TransformerParam {
    pub fn clamp_tap(&self, tap: IntS) -> IntS {
        tap.min(self.tap_max.max(self.tap_min))
            .max(self.tap_max.min(self.tap_min))
    }

    pub fn phase_shift(&self) -> f64 {
        f64::from(self.clock) * DEG_30
    }

    /// Series admittance, shunt admittance and off-nominal ratio at the
    /// current tap position, all in per-unit of the to side.
    pub fn series_shunt_ratio(&self) -> (Complex64, Complex64, f64) {
        let base_y_to = self.base_i_to * self.base_i_to / BASE_POWER_1P;
        let tap_delta =
            f64::from(self.tap_direction) * f64::from(self.tap_pos - self.tap_nom) * self.tap_size;
        let (u1, u2) = match self.tap_side {
            BranchSide::From => (self.u1 + tap_delta, self.u2),
            BranchSide::To => (self.u1, self.u2 + tap_delta),
        };
        let k = (u1 / u2) / self.nominal_ratio;
        let uk = tap_adjust_impedance(
            f64::from(self.tap_pos),
            f64::from(self.tap_min),
            f64::from(self.tap_max),
            f64::from(self.tap_nom),
            self.uk,
            self.uk_min,
            self.uk_max,
        );
        let pk = tap_adjust_impedance(
            f64::from(self.tap_pos),
            f64::from(self.tap_min),
            f64::from(self.tap_max),
            f64::from(self.tap_nom),
            self.pk,
            self.pk_min,
            self.pk_max,
        );
        // uk can be negative for the artificial legs of a three-winding
        // transformer; the reactance keeps the sign
        let uk_sign = if uk >= 0.0 { 1.0 } else { -1.0 };
        let z_series_abs = uk.abs() * u2 * u2 / self.sn;
        let r_series = pk * u2 * u2 / self.sn / self.sn;
        let x2 = z_series_abs * z_series_abs - r_series * r_series;
        let x_series = uk_sign * if x2 > 0.0 { x2.sqrt() } else { 0.0 };
        let y_series = (1.0 / Complex64::new(r_series, x_series)) / base_y_to;

        let y_shunt_abs = self.i0 * self.sn / self.u2 / self.u2;
        let g_shunt = self.p0 / self.u2 / self.u2;
        let b2 = y_shunt_abs * y_shunt_abs - g_shunt * g_shunt;
        let b_shunt = if b2 > 0.0 { -b2.sqrt() } else { 0.0 };
        let y_shunt = Complex64::new(g_shunt, b_shunt) / base_y_to;
        (y_series, y_shunt, k)
    }

    /// Zero-sequence blocks, depending on the winding pair and grounding.
    fn zero_sequence_blocks(
        &self,
        from_status: bool,
        to_status: bool,
        y_series: Complex64,
        y_shunt: Complex64,
        k: f64,
    ) -> [Complex64; 4] {
        use WindingType::*;
        let zero = Complex64::new(0.0, 0.0);
        let mut p0 = [zero; 4];
        if self.winding_from == WyeN && self.winding_to == WyeN {
            let mut shift0 = 0.0;
            // reverse-connected even clocks flip the zero-sequence reference
            if self.clock == 2 || self.clock == 6 || self.clock == 10 {
                shift0 = 6.0 * DEG_30;
            }
            let z0 = 1.0 / y_series
                + 3.0 * (self.z_grounding_to + self.z_grounding_from / k / k);
            return scalar_branch_blocks(
                from_status,
                to_status,
                1.0 / z0,
                y_shunt,
                Complex64::from_polar(k, shift0),
            );
        }
        if self.winding_from == WyeN && self.winding_to == Delta && from_status {
            let z0 = 1.0 / y_series + 3.0 * self.z_grounding_from / k / k;
            p0[0] = (1.0 / z0 + y_shunt) / k / k;
        }
        if self.winding_from == Delta && self.winding_to == WyeN && to_status {
            let z0 = 1.0 / y_series + 3.0 * self.z_grounding_to;
            p0[3] = 1.0 / z0 + y_shunt;
        }
        if self.winding_from == ZigzagN && from_status {
            let z0 = (1.0 / y_series) * 0.1 + 3.0 * self.z_grounding_from / k / k;
            p0[0] = (1.0 / z0) / k / k;
        }
        if self.winding_to == ZigzagN && to_status {
            let z0 = (1.0 / y_series) * 0.1 + 3.0 * self.z_grounding_to;
            p0[3] = 1.0 / z0;
        }
        p0
    }
}

impl<S: Symmetry> BranchParamSource<S> for TransformerParam {
    fn branch_param(
        &self,
        from_status: bool,
        to_status: bool,
    ) -> Result<BranchCalcParam<S>, GridError> {
        let (y_series, y_shunt, k) = self.series_shunt_ratio();
        let shift = self.phase_shift();
        let p1 = scalar_branch_blocks(
            from_status,
            to_status,
            y_series,
            y_shunt,
            Complex64::from_polar(k, shift),
        );
        let p2 = scalar_branch_blocks(
            from_status,
            to_status,
            y_series,
            y_shunt,
            Complex64::from_polar(k, -shift),
        );
        let p0 = self.zero_sequence_blocks(from_status, to_status, y_series, y_shunt, k);
        let t = |i: usize| S::tensor_from_seq3(p0[i], p1[i], p2[i]);
        Ok(BranchCalcParam {
            yff: t(0),
            yft: t(1),
            ytf: t(2),
            ytt: t(3),
        })
    }
}

/// Wye-delta redistribution of the pairwise short-circuit voltages of a
/// three-winding transformer over its three internal legs.
pub fn three_winding_uk(
    uk_12: f64,
    uk_13: f64,
    uk_23: f64,
    sn_1: f64,
    sn_2: f64,
    sn_3: f64,
) -> (f64, f64, f64) {
    let uk_12 = uk_12 * sn_1 / sn_1.min(sn_2);
    let uk_13 = uk_13 * sn_1 / sn_1.min(sn_3);
    let uk_23 = uk_23 * sn_1 / sn_2.min(sn_3);
    let uk_t1 = 0.5 * (uk_12 + uk_13 - uk_23);
    let uk_t2 = 0.5 * (uk_12 + uk_23 - uk_13);
    let uk_t3 = 0.5 * (uk_13 + uk_23 - uk_12);
    (uk_t1, uk_t2 * (sn_2 / sn_1), uk_t3 * (sn_3 / sn_1))
}

/// Same redistribution for the load losses; losses scale with the square of
/// the power ratio.
pub fn three_winding_pk(
    pk_12: f64,
    pk_13: f64,
    pk_23: f64,
    sn_1: f64,
    sn_2: f64,
    sn_3: f64,
) -> (f64, f64, f64) {
    let pk_12 = pk_12 * (sn_1 / sn_1.min(sn_2)) * (sn_1 / sn_1.min(sn_2));
    let pk_13 = pk_13 * (sn_1 / sn_1.min(sn_3)) * (sn_1 / sn_1.min(sn_3));
    let pk_23 = pk_23 * (sn_1 / sn_2.min(sn_3)) * (sn_1 / sn_2.min(sn_3));
    let pk_t1 = 0.5 * (pk_12 + pk_13 - pk_23);
    let pk_t2 = 0.5 * (pk_12 + pk_23 - pk_13);
    let pk_t3 = 0.5 * (pk_13 + pk_23 - pk_12);
    (
        pk_t1,
        pk_t2 * (sn_2 / sn_1) * (sn_2 / sn_1),
        pk_t3 * (sn_3 / sn_1) * (sn_3 / sn_1),
    )
}

/// Injection setpoint of a load or generator at the given voltage magnitude.
pub fn scale_injection<S: Symmetry>(
    s_specified: S::Complex,
    load_gen_type: LoadGenType,
    u_abs: S::Real,
) -> S::Complex {
    match load_gen_type {
        LoadGenType::ConstPq => s_specified,
        LoadGenType::ConstY => s_specified.scale_real(u_abs.mul_ew(u_abs)),
        LoadGenType::ConstI => s_specified.scale_real(u_abs),
    }
}

/// Resolves the default fault phase of a fault type.
pub fn effective_fault_phase(fault_type: FaultType, fault_phase: FaultPhase) -> FaultPhase {
    if fault_phase != FaultPhase::DefaultValue {
        return fault_phase;
    }
    match fault_type {
        FaultType::ThreePhase => FaultPhase::Abc,
        FaultType::SinglePhaseToGround => FaultPhase::A,
        FaultType::TwoPhase | FaultType::TwoPhaseToGround => FaultPhase::Bc,
    }
}

/// Validates the phase set against the fault type.
pub fn check_fault_phase(fault_type: FaultType, fault_phase: FaultPhase) -> Result<(), GridError> {
    use FaultPhase::*;
    let ok = match fault_type {
        FaultType::ThreePhase => matches!(fault_phase, DefaultValue | Abc),
        FaultType::SinglePhaseToGround => matches!(fault_phase, DefaultValue | A | B | C),
        FaultType::TwoPhase | FaultType::TwoPhaseToGround => {
            matches!(fault_phase, DefaultValue | Ab | Ac | Bc)
        }
    };
    if ok {
        Ok(())
    } else {
        Err(GridError::InvalidShortCircuitPhaseOrType {
            fault_type: fault_type as i8,
            fault_phase: fault_phase as i8,
        })
    }
}

/// IEC 60909 voltage scaling factor `c`.
pub fn short_circuit_voltage_scaling_c(u_rated: f64, scaling: ShortCircuitVoltageScaling) -> f64 {
    match scaling {
        ShortCircuitVoltageScaling::Maximum => 1.1,
        ShortCircuitVoltageScaling::Minimum => {
            if u_rated <= 1000.0 {
                0.95
            } else {
                1.0
            }
        }
    }
}
