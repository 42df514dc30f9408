//! Error taxonomy shared by operators, transforms, executors and the plan cache.
//!
//! Every variant carries the name of the operator that raised it so a failing expression can be
//! traced back to the offending node. Backend failures are wrapped rather than flattened so
//! callers can still match on the backend's own error kinds.

use thiserror::Error;

use crate::backend::spec::BackendError;
use crate::executor::ExecutorKind;

/// Convenience alias used throughout the crate.
pub type ExprResult<T> = Result<T, ExprError>;

/// Contract violations surfaced while building or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// Operand shapes are not conformant for the requested combination or assignment.
    #[error("{op}: shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        op: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// Slice or permute dimension bookkeeping is inconsistent.
    #[error("{op}: invalid dimensions: {detail}")]
    InvalidDim { op: String, detail: String },
    /// The transform cannot run on the executor it was handed.
    #[error("{op} cannot run on a {executor} executor")]
    UnsupportedExecutor { op: String, executor: ExecutorKind },
    /// Outputs were bound incorrectly, or a transform was read before it was dispatched.
    #[error("{op}: invalid assignment: {detail}")]
    InvalidAssignment { op: String, detail: String },
    /// A dimension or element index exceeded its bound.
    #[error("{op}: {what} {index} out of range (bound {bound})")]
    OutOfRange {
        op: String,
        what: &'static str,
        index: usize,
        bound: usize,
    },
    /// The backend rejected a plan or failed while executing it.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ExprError {
    pub fn shape_mismatch(op: impl Into<String>, expected: &[usize], found: &[usize]) -> Self {
        ExprError::ShapeMismatch {
            op: op.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    pub fn invalid_dim(op: impl Into<String>, detail: impl Into<String>) -> Self {
        ExprError::InvalidDim {
            op: op.into(),
            detail: detail.into(),
        }
    }

    pub fn unsupported_executor(op: impl Into<String>, executor: ExecutorKind) -> Self {
        ExprError::UnsupportedExecutor {
            op: op.into(),
            executor,
        }
    }

    pub fn invalid_assignment(op: impl Into<String>, detail: impl Into<String>) -> Self {
        ExprError::InvalidAssignment {
            op: op.into(),
            detail: detail.into(),
        }
    }

    pub fn out_of_range(op: impl Into<String>, what: &'static str, index: usize, bound: usize) -> Self {
        ExprError::OutOfRange {
            op: op.into(),
            what,
            index,
            bound,
        }
    }
}
