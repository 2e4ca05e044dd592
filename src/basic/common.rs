use num_complex::Complex64;
use std::f64::consts::PI;

/// Component identifier as it appears in the flat record families.
pub type ID = i32;
/// Small integer record field (statuses, tap positions, enum members).
pub type IntS = i8;
/// Internal index type of the math model.
pub type Idx = usize;

/// Sentinel for "not applicable" identifiers.
pub const NA_INT_ID: ID = ID::MIN;
/// Sentinel for "not applicable" small integers.
pub const NA_INT_S: IntS = IntS::MIN;

/// Three-phase base power in VA. All internal quantities are per-unit on this
/// base and the per-bus rated voltage.
pub const BASE_POWER_3P: f64 = 1e6;
/// Single-phase base power in VA.
pub const BASE_POWER_1P: f64 = BASE_POWER_3P / 3.0;

pub const SQRT3: f64 = 1.732_050_807_568_877_2;
/// One clock step of a transformer, 30 degrees in radians.
pub const DEG_30: f64 = PI / 6.0;
pub const DEG_120: f64 = 2.0 * PI / 3.0;

/// Tolerance below which admittance magnitudes are treated as zero.
pub const NUMERICAL_TOLERANCE: f64 = 1e-8;

/// System frequency in Hz for line charging susceptance.
pub const SYSTEM_FREQUENCY: f64 = 50.0;

/// Balanced-phasor rotation `a = e^{j 2π/3}`.
pub const PHASOR_A: Complex64 = Complex64::new(-0.5, SQRT3 / 2.0);
/// Balanced-phasor rotation `a² = e^{-j 2π/3}`.
pub const PHASOR_A2: Complex64 = Complex64::new(-0.5, -SQRT3 / 2.0);

/// Admittance of an ideal link branch.
pub const Y_LINK: Complex64 = Complex64::new(1e6, 1e6);

// IEC 60909 style defaults applied when a source record leaves these NaN.
pub const DEFAULT_SOURCE_SK: f64 = 1e10;
pub const DEFAULT_SOURCE_RX_RATIO: f64 = 0.1;
pub const DEFAULT_SOURCE_Z01_RATIO: f64 = 3.0;

/// `true` iff the record identifier is the "not applicable" sentinel.
pub const fn is_na_id(id: ID) -> bool {
    id == NA_INT_ID
}

/// `true` iff the small-integer field is the "not applicable" sentinel.
pub const fn is_na_ints(v: IntS) -> bool {
    v == NA_INT_S
}
