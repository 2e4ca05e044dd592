pub mod basic;
pub mod io;

pub mod prelude {
    pub use crate::basic::common::*;
    pub use crate::basic::ecs::network::{CalcOptions, DataOps, PowerGridModel};
    pub use crate::basic::ecs::plugin::default_app;
    pub use crate::basic::ecs::post_processing::{GridOutput, ShortCircuitGridOutput};
    pub use crate::basic::error::GridError;
    pub use crate::basic::param::{
        CalculationMethod, FaultPhase, FaultType, LoadGenType, MeasuredTerminalType,
        ShortCircuitVoltageScaling,
    };
    pub use crate::basic::solver::{CalcLogger, NoLogger};
    pub use crate::basic::tensor::{Asymmetric, Symmetric, Symmetry};
    pub use crate::io::{load_grid_file, load_grid_json, records::*};
}
