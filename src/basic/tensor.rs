//! Three-phase algebra.
//!
//! Every tensor-shaped quantity of the engine is parameterised by a
//! compile-time symmetry tag: the symmetric (single-phase equivalent) variant
//! works on complex scalars, the asymmetric variant on 3-vectors and 3x3
//! tensors. Solvers are written once against the [`Symmetry`] abstraction and
//! monomorphise into both variants.

use nalgebra::{Matrix2, Matrix3, Matrix4, Matrix6, Vector2, Vector3, Vector6};
use num_complex::Complex64;

use super::common::*;
use super::sparse::{LuBlock, LuRhs};

/// Complex scalar / 3-vector operations shared by both symmetry variants.
pub trait ComplexValue:
    Copy
    + std::fmt::Debug
    + PartialEq
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Neg<Output = Self>
    + std::ops::AddAssign
    + std::ops::SubAssign
    + Send
    + Sync
    + 'static
{
    type Real: RealValue;

    fn zero() -> Self;
    /// Repeats `x` on every phase without rotation.
    fn splat(x: Complex64) -> Self;
    fn conj(self) -> Self;
    fn cabs(self) -> Self::Real;
    fn abs2(self) -> Self::Real;
    fn arg(self) -> Self::Real;
    /// `x / |x|`, or 1 for a zero value.
    fn phase(self) -> Self;
    fn re(self) -> Self::Real;
    fn im(self) -> Self::Real;
    fn from_re_im(re: Self::Real, im: Self::Real) -> Self;
    fn from_polar(mag: Self::Real, ang: Self::Real) -> Self;
    /// Element-wise product.
    fn mul_ew(self, rhs: Self) -> Self;
    /// Element-wise quotient.
    fn div_ew(self, rhs: Self) -> Self;
    fn scale(self, s: f64) -> Self;
    /// Element-wise scaling by a real value of matching shape.
    fn scale_real(self, r: Self::Real) -> Self;
    fn mul_scalar(self, s: Complex64) -> Self;
    /// Infinity norm over phase magnitudes.
    fn max_cabs(self) -> f64;
    /// `true` iff any component is NaN.
    fn is_nan(self) -> bool;
    fn sum(self) -> Complex64;
    fn mean(self) -> Complex64;
    /// Positive-sequence component `(x_a + a·x_b + a²·x_c) / 3`.
    fn pos_seq(self) -> Complex64;
    /// Phase component access; the symmetric scalar ignores the index.
    fn comp(self, i: usize) -> Complex64;
    fn set_comp(&mut self, i: usize, v: Complex64);
}

/// Real scalar / 3-vector operations.
pub trait RealValue:
    Copy
    + std::fmt::Debug
    + PartialEq
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::AddAssign
    + std::ops::SubAssign
    + Send
    + Sync
    + 'static
{
    fn zero() -> Self;
    fn splat(x: f64) -> Self;
    fn scale(self, s: f64) -> Self;
    fn mul_ew(self, rhs: Self) -> Self;
    fn recip(self) -> Self;
    fn max_val(self) -> f64;
    fn min_val(self) -> f64;
    fn is_nan(self) -> bool;
    fn sum(self) -> f64;
}

/// 1x1 / 3x3 complex tensor operations.
pub trait ComplexTensor:
    Copy
    + std::fmt::Debug
    + PartialEq
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Neg<Output = Self>
    + std::ops::AddAssign
    + std::ops::SubAssign
    + Send
    + Sync
    + 'static
{
    type Value: ComplexValue;

    fn zero() -> Self;
    /// `x` on the diagonal, zero elsewhere.
    fn diag_splat(x: Complex64) -> Self;
    fn from_diag(v: Self::Value) -> Self;
    fn diag(self) -> Self::Value;
    /// Tensor-vector product.
    fn mv(self, v: Self::Value) -> Self::Value;
    fn try_inv(self) -> Option<Self>;
    fn hermitian_t(self) -> Self;
    fn conj_ew(self) -> Self;
    fn scale(self, s: f64) -> Self;
    fn mul_scalar(self, s: Complex64) -> Self;
    fn add_diag(&mut self, v: Self::Value);
    /// `diag(v) · self`.
    fn scale_rows(self, v: Self::Value) -> Self;
    /// `self · diag(v)`.
    fn scale_cols(self, v: Self::Value) -> Self;
    fn is_nan(self) -> bool;
    /// Phase element access; the symmetric scalar ignores the indices.
    fn elem(self, r: usize, c: usize) -> Complex64;
    fn set_elem(&mut self, r: usize, c: usize, v: Complex64);
}

/// Compile-time symmetry tag. `Symmetric` calculations run on the
/// single-phase equivalent circuit, `Asymmetric` on all three phases.
pub trait Symmetry:
    Copy + Clone + std::fmt::Debug + Default + PartialEq + Send + Sync + 'static
{
    type Complex: ComplexValue<Real = Self::Real>;
    type Tensor: ComplexTensor<Value = Self::Complex> + LuBlock<Rhs = Self::Complex>;
    type Real: RealValue;
    /// Real Jacobian block of the polar Newton-Raphson solvers
    /// (2x2 for symmetric, 6x6 for asymmetric).
    type JacBlock: LuBlock<Rhs = Self::JacRhs>;
    type JacRhs: LuRhs;

    const IS_SYMMETRIC: bool;
    const NAME: &'static str;
    /// Base power of one calculation lane (3-phase or single-phase).
    const BASE_POWER: f64;
    /// Sensor voltage intake scaling (line-line for symmetric,
    /// line-neutral for asymmetric).
    const U_SCALE: f64;

    /// Embeds a positive-sequence phasor, rotating phases b and c.
    fn embed(x: Complex64) -> Self::Complex;
    /// Phase-domain tensor from positive- and zero-sequence scalars.
    fn tensor_from_sequence(y1: Complex64, y0: Complex64) -> Self::Tensor;
    /// Phase-domain tensor from the full `(y0, y1, y2)` sequence diagonal.
    fn tensor_from_seq3(y0: Complex64, y1: Complex64, y2: Complex64) -> Self::Tensor;
    /// Intake of a full phase-domain tensor; the symmetric calculation keeps
    /// its positive-sequence equivalent.
    fn tensor_from_abc(m: Matrix3<Complex64>) -> Self::Tensor;
    fn to_abc(v: Self::Complex) -> Vector3<Complex64>;
    fn real_to_abc(r: Self::Real) -> Vector3<f64>;
    /// Power-like intake of a three-phase value (arithmetic mean when
    /// reducing to the symmetric calculation).
    fn mean_from_abc(v: Vector3<Complex64>) -> Self::Complex;
    /// Phasor-like intake (positive-sequence component when reducing).
    fn seq_from_abc(v: Vector3<Complex64>) -> Self::Complex;
    fn mean_real_from_abc(r: Vector3<f64>) -> Self::Real;

    /// `[[Re α, Re β], [Im α, Im β]]` quadrant block of the polar Jacobian.
    fn jac_block(alpha: Self::Tensor, beta: Self::Tensor) -> Self::JacBlock;
    /// Diagonal weight block with `w_re` on the real rows and `w_im` below.
    fn jac_weight(w_re: Self::Real, w_im: Self::Real) -> Self::JacBlock;
    fn jac_rhs(re: Self::Real, im: Self::Real) -> Self::JacRhs;
    fn jac_split(rhs: Self::JacRhs) -> (Self::Real, Self::Real);
}

/// Symmetric calculation tag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Symmetric;

/// Asymmetric (three-phase) calculation tag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Asymmetric;

impl ComplexValue for Complex64 {
    type Real = f64;

    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }
    fn splat(x: Complex64) -> Self {
        x
    }
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }
    fn cabs(self) -> f64 {
        self.norm()
    }
    fn abs2(self) -> f64 {
        self.norm_sqr()
    }
    fn arg(self) -> f64 {
        Complex64::arg(self)
    }
    fn phase(self) -> Self {
        let n = self.norm();
        if n > 0.0 {
            self / n
        } else {
            Complex64::new(1.0, 0.0)
        }
    }
    fn re(self) -> f64 {
        self.re
    }
    fn im(self) -> f64 {
        self.im
    }
    fn from_re_im(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }
    fn from_polar(mag: f64, ang: f64) -> Self {
        Complex64::from_polar(mag, ang)
    }
    fn mul_ew(self, rhs: Self) -> Self {
        self * rhs
    }
    fn div_ew(self, rhs: Self) -> Self {
        self / rhs
    }
    fn scale(self, s: f64) -> Self {
        self * s
    }
    fn scale_real(self, r: f64) -> Self {
        self * r
    }
    fn mul_scalar(self, s: Complex64) -> Self {
        self * s
    }
    fn max_cabs(self) -> f64 {
        self.norm()
    }
    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }
    fn sum(self) -> Complex64 {
        self
    }
    fn mean(self) -> Complex64 {
        self
    }
    fn pos_seq(self) -> Complex64 {
        self
    }
    fn comp(self, _i: usize) -> Complex64 {
        self
    }
    fn set_comp(&mut self, _i: usize, v: Complex64) {
        *self = v;
    }
}

impl ComplexValue for Vector3<Complex64> {
    type Real = Vector3<f64>;

    fn zero() -> Self {
        Vector3::from_element(Complex64::new(0.0, 0.0))
    }
    fn splat(x: Complex64) -> Self {
        Vector3::from_element(x)
    }
    fn conj(self) -> Self {
        self.map(|c| c.conj())
    }
    fn cabs(self) -> Vector3<f64> {
        self.map(|c| c.norm())
    }
    fn abs2(self) -> Vector3<f64> {
        self.map(|c| c.norm_sqr())
    }
    fn arg(self) -> Vector3<f64> {
        self.map(|c| c.arg())
    }
    fn phase(self) -> Self {
        self.map(|c| ComplexValue::phase(c))
    }
    fn re(self) -> Vector3<f64> {
        self.map(|c| c.re)
    }
    fn im(self) -> Vector3<f64> {
        self.map(|c| c.im)
    }
    fn from_re_im(re: Vector3<f64>, im: Vector3<f64>) -> Self {
        Vector3::from_fn(|i, _| Complex64::new(re[i], im[i]))
    }
    fn from_polar(mag: Vector3<f64>, ang: Vector3<f64>) -> Self {
        Vector3::from_fn(|i, _| Complex64::from_polar(mag[i], ang[i]))
    }
    fn mul_ew(self, rhs: Self) -> Self {
        self.component_mul(&rhs)
    }
    fn div_ew(self, rhs: Self) -> Self {
        self.component_div(&rhs)
    }
    fn scale(self, s: f64) -> Self {
        self * Complex64::new(s, 0.0)
    }
    fn scale_real(self, r: Vector3<f64>) -> Self {
        Vector3::from_fn(|i, _| self[i] * r[i])
    }
    fn mul_scalar(self, s: Complex64) -> Self {
        self * s
    }
    fn max_cabs(self) -> f64 {
        self.iter().fold(0.0f64, |m, c| m.max(c.norm()))
    }
    fn is_nan(self) -> bool {
        self.iter().any(|c| c.re.is_nan() || c.im.is_nan())
    }
    fn sum(self) -> Complex64 {
        self[0] + self[1] + self[2]
    }
    fn mean(self) -> Complex64 {
        (self[0] + self[1] + self[2]) / 3.0
    }
    fn pos_seq(self) -> Complex64 {
        (self[0] + PHASOR_A * self[1] + PHASOR_A2 * self[2]) / 3.0
    }
    fn comp(self, i: usize) -> Complex64 {
        self[i]
    }
    fn set_comp(&mut self, i: usize, v: Complex64) {
        self[i] = v;
    }
}

impl RealValue for f64 {
    fn zero() -> Self {
        0.0
    }
    fn splat(x: f64) -> Self {
        x
    }
    fn scale(self, s: f64) -> Self {
        self * s
    }
    fn mul_ew(self, rhs: Self) -> Self {
        self * rhs
    }
    fn recip(self) -> Self {
        1.0 / self
    }
    fn max_val(self) -> f64 {
        self
    }
    fn min_val(self) -> f64 {
        self
    }
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
    fn sum(self) -> f64 {
        self
    }
}

impl RealValue for Vector3<f64> {
    fn zero() -> Self {
        Vector3::zeros()
    }
    fn splat(x: f64) -> Self {
        Vector3::from_element(x)
    }
    fn scale(self, s: f64) -> Self {
        self * s
    }
    fn mul_ew(self, rhs: Self) -> Self {
        self.component_mul(&rhs)
    }
    fn recip(self) -> Self {
        self.map(|x| 1.0 / x)
    }
    fn max_val(self) -> f64 {
        self.iter().fold(f64::NEG_INFINITY, |m, x| m.max(*x))
    }
    fn min_val(self) -> f64 {
        self.iter().fold(f64::INFINITY, |m, x| m.min(*x))
    }
    fn is_nan(self) -> bool {
        self.iter().any(|x| x.is_nan())
    }
    fn sum(self) -> f64 {
        self[0] + self[1] + self[2]
    }
}

impl ComplexTensor for Complex64 {
    type Value = Complex64;

    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }
    fn diag_splat(x: Complex64) -> Self {
        x
    }
    fn from_diag(v: Complex64) -> Self {
        v
    }
    fn diag(self) -> Complex64 {
        self
    }
    fn mv(self, v: Complex64) -> Complex64 {
        self * v
    }
    fn try_inv(self) -> Option<Self> {
        let n = self.norm();
        if n.is_finite() && n > 1e-30 {
            Some(1.0 / self)
        } else {
            None
        }
    }
    fn hermitian_t(self) -> Self {
        Complex64::conj(&self)
    }
    fn conj_ew(self) -> Self {
        Complex64::conj(&self)
    }
    fn scale(self, s: f64) -> Self {
        self * s
    }
    fn mul_scalar(self, s: Complex64) -> Self {
        self * s
    }
    fn add_diag(&mut self, v: Complex64) {
        *self += v;
    }
    fn scale_rows(self, v: Complex64) -> Self {
        v * self
    }
    fn scale_cols(self, v: Complex64) -> Self {
        self * v
    }
    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }
    fn elem(self, _r: usize, _c: usize) -> Complex64 {
        self
    }
    fn set_elem(&mut self, _r: usize, _c: usize, v: Complex64) {
        *self = v;
    }
}

impl ComplexTensor for Matrix3<Complex64> {
    type Value = Vector3<Complex64>;

    fn zero() -> Self {
        Matrix3::zeros()
    }
    fn diag_splat(x: Complex64) -> Self {
        Matrix3::from_diagonal(&Vector3::from_element(x))
    }
    fn from_diag(v: Vector3<Complex64>) -> Self {
        Matrix3::from_diagonal(&v)
    }
    fn diag(self) -> Vector3<Complex64> {
        Vector3::new(self[(0, 0)], self[(1, 1)], self[(2, 2)])
    }
    fn mv(self, v: Vector3<Complex64>) -> Vector3<Complex64> {
        self * v
    }
    fn try_inv(self) -> Option<Self> {
        if self.determinant().norm() < 1e-30 {
            return None;
        }
        self.try_inverse()
    }
    fn hermitian_t(self) -> Self {
        self.adjoint()
    }
    fn conj_ew(self) -> Self {
        self.map(|c| c.conj())
    }
    fn scale(self, s: f64) -> Self {
        self * Complex64::new(s, 0.0)
    }
    fn mul_scalar(self, s: Complex64) -> Self {
        self * s
    }
    fn add_diag(&mut self, v: Vector3<Complex64>) {
        for i in 0..3 {
            self[(i, i)] += v[i];
        }
    }
    fn scale_rows(self, v: Vector3<Complex64>) -> Self {
        Matrix3::from_fn(|r, c| v[r] * self[(r, c)])
    }
    fn scale_cols(self, v: Vector3<Complex64>) -> Self {
        Matrix3::from_fn(|r, c| self[(r, c)] * v[c])
    }
    fn is_nan(self) -> bool {
        self.iter().any(|c| c.re.is_nan() || c.im.is_nan())
    }
    fn elem(self, r: usize, c: usize) -> Complex64 {
        self[(r, c)]
    }
    fn set_elem(&mut self, r: usize, c: usize, v: Complex64) {
        self[(r, c)] = v;
    }
}

impl Symmetry for Symmetric {
    type Complex = Complex64;
    type Tensor = Complex64;
    type Real = f64;
    type JacBlock = Matrix2<f64>;
    type JacRhs = Vector2<f64>;

    const IS_SYMMETRIC: bool = true;
    const NAME: &'static str = "sym";
    const BASE_POWER: f64 = BASE_POWER_3P;
    const U_SCALE: f64 = 1.0;

    fn embed(x: Complex64) -> Complex64 {
        x
    }
    fn tensor_from_sequence(y1: Complex64, _y0: Complex64) -> Complex64 {
        y1
    }
    fn tensor_from_seq3(_y0: Complex64, y1: Complex64, _y2: Complex64) -> Complex64 {
        y1
    }
    fn tensor_from_abc(m: Matrix3<Complex64>) -> Complex64 {
        let diag = (m[(0, 0)] + m[(1, 1)] + m[(2, 2)]) / 3.0;
        let off = (m[(0, 1)] + m[(0, 2)] + m[(1, 0)] + m[(1, 2)] + m[(2, 0)] + m[(2, 1)]) / 6.0;
        diag - off
    }
    fn to_abc(v: Complex64) -> Vector3<Complex64> {
        Vector3::new(v, v * PHASOR_A2, v * PHASOR_A)
    }
    fn real_to_abc(r: f64) -> Vector3<f64> {
        Vector3::from_element(r)
    }
    fn mean_from_abc(v: Vector3<Complex64>) -> Complex64 {
        ComplexValue::mean(v)
    }
    fn seq_from_abc(v: Vector3<Complex64>) -> Complex64 {
        ComplexValue::pos_seq(v)
    }
    fn mean_real_from_abc(r: Vector3<f64>) -> f64 {
        (r[0] + r[1] + r[2]) / 3.0
    }
    fn jac_block(alpha: Complex64, beta: Complex64) -> Matrix2<f64> {
        Matrix2::new(alpha.re, beta.re, alpha.im, beta.im)
    }
    fn jac_weight(w_re: f64, w_im: f64) -> Matrix2<f64> {
        Matrix2::new(w_re, 0.0, 0.0, w_im)
    }
    fn jac_rhs(re: f64, im: f64) -> Vector2<f64> {
        Vector2::new(re, im)
    }
    fn jac_split(rhs: Vector2<f64>) -> (f64, f64) {
        (rhs[0], rhs[1])
    }
}

impl Symmetry for Asymmetric {
    type Complex = Vector3<Complex64>;
    type Tensor = Matrix3<Complex64>;
    type Real = Vector3<f64>;
    type JacBlock = Matrix6<f64>;
    type JacRhs = Vector6<f64>;

    const IS_SYMMETRIC: bool = false;
    const NAME: &'static str = "asym";
    const BASE_POWER: f64 = BASE_POWER_1P;
    const U_SCALE: f64 = 1.0 / SQRT3;

    fn embed(x: Complex64) -> Vector3<Complex64> {
        Vector3::new(x, x * PHASOR_A2, x * PHASOR_A)
    }
    fn tensor_from_sequence(y1: Complex64, y0: Complex64) -> Matrix3<Complex64> {
        let s = (y1 * 2.0 + y0) / 3.0;
        let m = (y0 - y1) / 3.0;
        Matrix3::new(s, m, m, m, s, m, m, m, s)
    }
    fn tensor_from_seq3(y0: Complex64, y1: Complex64, y2: Complex64) -> Matrix3<Complex64> {
        let y012 = Matrix3::from_diagonal(&Vector3::new(y0, y1, y2));
        sym_matrix() * y012 * sym_matrix_inv()
    }
    fn tensor_from_abc(m: Matrix3<Complex64>) -> Matrix3<Complex64> {
        m
    }
    fn to_abc(v: Vector3<Complex64>) -> Vector3<Complex64> {
        v
    }
    fn real_to_abc(r: Vector3<f64>) -> Vector3<f64> {
        r
    }
    fn mean_from_abc(v: Vector3<Complex64>) -> Vector3<Complex64> {
        v
    }
    fn seq_from_abc(v: Vector3<Complex64>) -> Vector3<Complex64> {
        v
    }
    fn mean_real_from_abc(r: Vector3<f64>) -> Vector3<f64> {
        r
    }
    fn jac_block(alpha: Matrix3<Complex64>, beta: Matrix3<Complex64>) -> Matrix6<f64> {
        Matrix6::from_fn(|r, c| {
            let v = if c < 3 { alpha[(r % 3, c)] } else { beta[(r % 3, c - 3)] };
            if r < 3 { v.re } else { v.im }
        })
    }
    fn jac_weight(w_re: Vector3<f64>, w_im: Vector3<f64>) -> Matrix6<f64> {
        let mut m = Matrix6::zeros();
        for i in 0..3 {
            m[(i, i)] = w_re[i];
            m[(i + 3, i + 3)] = w_im[i];
        }
        m
    }
    fn jac_rhs(re: Vector3<f64>, im: Vector3<f64>) -> Vector6<f64> {
        Vector6::new(re[0], re[1], re[2], im[0], im[1], im[2])
    }
    fn jac_split(rhs: Vector6<f64>) -> (Vector3<f64>, Vector3<f64>) {
        (
            Vector3::new(rhs[0], rhs[1], rhs[2]),
            Vector3::new(rhs[3], rhs[4], rhs[5]),
        )
    }
}

/// Symmetric-components transform `A`.
pub fn sym_matrix() -> Matrix3<Complex64> {
    let one = Complex64::new(1.0, 0.0);
    Matrix3::new(
        one, one, one, //
        one, PHASOR_A2, PHASOR_A, //
        one, PHASOR_A, PHASOR_A2,
    )
}

/// Inverse symmetric-components transform `A⁻¹`.
pub fn sym_matrix_inv() -> Matrix3<Complex64> {
    let one = Complex64::new(1.0, 0.0);
    Matrix3::new(
        one, one, one, //
        one, PHASOR_A, PHASOR_A2, //
        one, PHASOR_A2, PHASOR_A,
    ) / Complex64::new(3.0, 0.0)
}

/// Kron reduction of a phase+neutral tensor: the neutral row and column are
/// absorbed into the 3x3 phase block by `Y_aa − Y_an · Y_nn⁻¹ · Y_na`.
pub fn kron_reduction(z: &Matrix4<Complex64>) -> Matrix3<Complex64> {
    let z_aa = z.fixed_view::<3, 3>(0, 0).into_owned();
    let z_an = z.fixed_view::<3, 1>(0, 3).into_owned();
    let z_na = z.fixed_view::<1, 3>(3, 0).into_owned();
    let z_nn = z[(3, 3)];
    z_aa - z_an * z_na / z_nn
}

/// Restricts an angle to `[-π, π]`.
pub fn phase_mod_2pi(phase: f64) -> f64 {
    Complex64::from_polar(1.0, phase).arg()
}
