//! Error taxonomy of the engine. Input-validation errors are raised at
//! construction and prevent the model from being used; numerical failures
//! propagate out of the `run_*` entry points.

use thiserror::Error;

use super::common::ID;
use super::sparse::SparseLuError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("id {0} does not exist")]
    IdNotFound(ID),
    #[error("sensor {sensor} measures object {object} of incompatible type")]
    IdWrongType { sensor: ID, object: ID },
    #[error("duplicate id {0} in input")]
    ConflictId(ID),
    #[error("branch {branch} connects nodes {from_node} and {to_node} with conflicting rated voltages {u1} and {u2}")]
    ConflictVoltage {
        branch: ID,
        from_node: ID,
        to_node: ID,
        u1: f64,
        u2: f64,
    },
    #[error("branch {branch} is malformed (from and to node are both {node})")]
    InvalidBranch { branch: ID, node: ID },
    #[error("transformer {id} has invalid clock number {clock}")]
    InvalidTransformerClock { id: ID, clock: i8 },
    #[error("unsupported short-circuit fault type {fault_type}")]
    InvalidShortCircuitType { fault_type: i8 },
    #[error("fault phase {fault_phase} is not valid for fault type {fault_type}")]
    InvalidShortCircuitPhaseOrType { fault_type: i8, fault_phase: i8 },
    /// Internal dispatch saw an enum value it cannot handle. This is a bug,
    /// not a user error.
    #[error("missing case {value} in {context} dispatch")]
    MissingCaseForEnum { context: &'static str, value: i64 },
    #[error("sparse matrix factorisation failed: {0}")]
    SparseMatrix(#[from] SparseLuError),
    #[error("iteration diverged after {iterations} iterations (max mismatch {max_mismatch})")]
    IterationDiverge { iterations: usize, max_mismatch: f64 },
    #[error("operation is not implemented for this component/symmetry combination")]
    NotImplemented,
    #[error("{failed} of {total} batch entries failed; first failure at entry {first_entry}: {first_error}")]
    BatchCalculation {
        failed: usize,
        total: usize,
        first_entry: usize,
        first_error: String,
    },
}
