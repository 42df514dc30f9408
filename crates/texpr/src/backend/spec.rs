//! Backend contract for transform operators.
//!
//! Transforms never compute anything themselves. They describe the work as a [`TransformOp`]
//! plus strided operands, ask a [`Backend`] to prepare a plan for the call's
//! [`PlanSignature`], and later execute that plan on the executor's stream.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::backend::hashing::hash_serializable;
use crate::executor::ExecutorKind;
use crate::tensor::{DType, Element, Layout, Shape};

pub type BackendResult<T> = Result<T, BackendError>;

/// Backend error surfaced to higher layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: &'static str, reason: String },
    #[error("backend execution failed: {message}")]
    Execution { message: String },
    #[error("invalid plan: {message}")]
    InvalidPlan { message: String },
}

impl BackendError {
    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }

    pub fn invalid_plan(message: impl Into<String>) -> Self {
        BackendError::InvalidPlan {
            message: message.into(),
        }
    }
}

/// A floating-point parameter stored by bit pattern so it can take part in hashing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScalarParam(u64);

impl ScalarParam {
    pub fn new(value: f64) -> Self {
        ScalarParam(value.to_bits())
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl fmt::Debug for ScalarParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Output extent policy for 1-D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConvMode {
    /// Every partial overlap: `n + m - 1`.
    Full,
    /// Centred on the longer signal: `max(n, m)`.
    Same,
    /// Complete overlaps only: `max(n, m) - min(n, m) + 1`.
    Valid,
}

impl ConvMode {
    pub fn output_len(self, n: usize, m: usize) -> usize {
        if n == 0 || m == 0 {
            return 0;
        }
        match self {
            ConvMode::Full => n + m - 1,
            ConvMode::Same => n.max(m),
            ConvMode::Valid => n.max(m) - n.min(m) + 1,
        }
    }

    /// Index into the full convolution at which this mode's output starts.
    pub fn full_offset(self, n: usize, m: usize) -> usize {
        match self {
            ConvMode::Full => 0,
            ConvMode::Same => n.min(m).saturating_sub(1) / 2,
            ConvMode::Valid => n.min(m).saturating_sub(1),
        }
    }
}

/// The backend operation requested by a transform, including its scalar parameters.
///
/// Axis selections (matmul axes, contraction pairs) are part of the operation; axis
/// reorderings that can be expressed as strides are not, they show up in the operand layouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TransformOp {
    /// `out = alpha * a @ b + beta * out` over matching leading batch dimensions.
    MatMul { alpha: ScalarParam, beta: ScalarParam },
    /// Batched 1-D convolution along the last dimension.
    Conv1d { mode: ConvMode },
    /// Covariance of the columns of a `[observations, variables]` matrix.
    Cov,
    /// Inclusive prefix sum along the last dimension.
    CumSum,
    /// Sum of the main diagonal of a square matrix.
    Trace,
    /// Tensor contraction over the listed `(lhs_axis, rhs_axis)` pairs.
    Contract { axes: Vec<(usize, usize)> },
    /// Householder QR producing `Q` and `R`.
    Qr,
    /// Householder QR in packed form: `R` on and above the diagonal, the reflector vectors
    /// below it, plus one scaling factor `tau` per reflector.
    QrPacked,
    /// Forward DFT of real signals along the last dimension, as `[re, im]` pairs.
    Rfft,
    /// Inverse of [`TransformOp::Rfft`], scaled by `1 / n`.
    Irfft,
}

impl TransformOp {
    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::MatMul { .. } => "matmul",
            TransformOp::Conv1d { .. } => "conv1d",
            TransformOp::Cov => "cov",
            TransformOp::CumSum => "cumsum",
            TransformOp::Trace => "trace",
            TransformOp::Contract { .. } => "contract",
            TransformOp::Qr => "qr",
            TransformOp::QrPacked => "qr_packed",
            TransformOp::Rfft => "rfft",
            TransformOp::Irfft => "irfft",
        }
    }
}

/// Dims and strides of one operand as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OperandSignature {
    pub dims: Vec<usize>,
    pub strides: Vec<usize>,
}

impl OperandSignature {
    pub fn of(layout: &Layout) -> Self {
        OperandSignature {
            dims: layout.shape().dims().to_vec(),
            strides: layout.strides().to_vec(),
        }
    }

    pub fn shape(&self) -> Shape {
        Shape::new(&self.dims)
    }
}

/// Everything a backend may specialize a plan on.
///
/// Two calls with equal signatures may share a plan. Inputs come first in `operands`,
/// followed by outputs; `inputs` records where the split is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlanSignature {
    pub op: TransformOp,
    pub dtype: DType,
    pub executor: ExecutorKind,
    pub inputs: usize,
    pub operands: Vec<OperandSignature>,
}

impl PlanSignature {
    pub fn new(
        op: TransformOp,
        dtype: DType,
        executor: ExecutorKind,
        inputs: &[&Layout],
        outputs: &[&Layout],
    ) -> Self {
        let operands = inputs
            .iter()
            .chain(outputs.iter())
            .map(|layout| OperandSignature::of(layout))
            .collect();
        PlanSignature {
            op,
            dtype,
            executor,
            inputs: inputs.len(),
            operands,
        }
    }

    pub fn input_operands(&self) -> &[OperandSignature] {
        &self.operands[..self.inputs]
    }

    pub fn output_operands(&self) -> &[OperandSignature] {
        &self.operands[self.inputs..]
    }

    /// Digest used in logs and schedules. Cache lookups compare whole signatures.
    pub fn fingerprint(&self) -> BackendResult<u64> {
        hash_serializable(self)
    }
}

/// Read-only strided operand handed to a backend.
#[derive(Debug, Clone, Copy)]
pub struct StridedRef<'a, T> {
    pub data: &'a [T],
    pub layout: &'a Layout,
}

impl<'a, T: Element> StridedRef<'a, T> {
    pub fn dims(&self) -> &'a [usize] {
        self.layout.shape().dims()
    }

    pub fn get(&self, index: &[usize]) -> T {
        self.data[self.layout.ravel(index)]
    }
}

/// Writable strided operand handed to a backend.
#[derive(Debug)]
pub struct StridedMut<'a, T> {
    pub data: &'a mut [T],
    pub layout: &'a Layout,
}

impl<'a, T: Element> StridedMut<'a, T> {
    pub fn dims(&self) -> &'a [usize] {
        self.layout.shape().dims()
    }

    pub fn get(&self, index: &[usize]) -> T {
        self.data[self.layout.ravel(index)]
    }

    pub fn set(&mut self, index: &[usize], value: T) {
        let offset = self.layout.ravel(index);
        self.data[offset] = value;
    }
}

/// One backend invocation: the operation plus locked operand storage.
#[derive(Debug)]
pub struct TransformCall<'a, 'b, T> {
    pub op: &'a TransformOp,
    pub inputs: &'a [StridedRef<'b, T>],
    pub outputs: &'a mut [StridedMut<'b, T>],
}

/// Executes transform operators on behalf of an executor.
///
/// `prepare` may be expensive; callers go through a [`crate::backend::plan::PlanCache`] so it
/// runs once per distinct signature. `execute` runs on the executor's stream and must only touch
/// the operands of the call.
pub trait Backend: Send + Sync + 'static {
    type Plan: Send + Sync + 'static;

    /// Returns a human-readable backend identifier (e.g., `"ref-cpu"`).
    fn backend_name(&self) -> &str;

    /// Validates the signature and builds a reusable plan for it.
    fn prepare(&self, signature: &PlanSignature) -> BackendResult<Self::Plan>;

    /// Runs a prepared plan against concrete operands.
    fn execute<T: Element>(
        &self,
        plan: &Self::Plan,
        call: TransformCall<'_, '_, T>,
    ) -> BackendResult<()>;
}
