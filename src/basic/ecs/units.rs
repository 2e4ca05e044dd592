//! Unit-tagged display quantities.
//!
//! Result tables and CSV exports name their columns from these constants so
//! the quantity and its unit never drift apart.

use const_format::concatcp;

/// Marker type for a display unit.
pub trait UnitTrait {
    /// Suffix used in column names, e.g. "pu", "kv", "mw".
    const SUFFIX: &'static str;

    fn suffix() -> &'static str {
        Self::SUFFIX
    }
}

macro_rules! define_unit {
    ($unit:ident, $suffix:literal) => {
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $unit;

        impl UnitTrait for $unit {
            const SUFFIX: &'static str = $suffix;
        }
    };
}

define_unit!(PerUnit, "pu");
define_unit!(KV, "kv");
define_unit!(MW, "mw");
define_unit!(MVar, "mvar");
define_unit!(KA, "ka");
define_unit!(Deg, "deg");
define_unit!(Percent, "percent");

/// Column name of a quantity with its unit suffix.
macro_rules! quantity_name {
    ($short:literal, $unit:ident) => {
        concatcp!($short, "_", $unit::SUFFIX)
    };
}

pub const COL_U_PU: &str = quantity_name!("u", PerUnit);
pub const COL_U_KV: &str = quantity_name!("u", KV);
pub const COL_U_ANGLE: &str = quantity_name!("u_angle", Deg);
pub const COL_P_MW: &str = quantity_name!("p", MW);
pub const COL_Q_MVAR: &str = quantity_name!("q", MVar);
pub const COL_P_FROM: &str = quantity_name!("p_from", MW);
pub const COL_Q_FROM: &str = quantity_name!("q_from", MVar);
pub const COL_P_TO: &str = quantity_name!("p_to", MW);
pub const COL_Q_TO: &str = quantity_name!("q_to", MVar);
pub const COL_I_FROM: &str = quantity_name!("i_from", KA);
pub const COL_I_TO: &str = quantity_name!("i_to", KA);
pub const COL_LOADING: &str = quantity_name!("loading", Percent);
