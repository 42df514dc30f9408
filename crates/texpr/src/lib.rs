//! Lazy tensor expressions with fused elementwise kernels and plan-cached transforms.
//!
//! ```
//! use std::sync::Arc;
//! use texpr::{assign, matmul, Executor, OperatorExt, StreamExecutor, TensorView};
//! use texpr_backend_ref_cpu::CpuBackend;
//!
//! # fn main() -> texpr::ExprResult<()> {
//! let exec = StreamExecutor::new(Arc::new(CpuBackend::new()), "doc");
//! let a = TensorView::from_vec([2, 2], vec![1.0f32, 2.0, 3.0, 4.0])?;
//! let b = TensorView::from_vec([2, 2], vec![1.0f32, 0.0, 0.0, 1.0])?;
//! let out = TensorView::<f32, 2>::zeros([2, 2]);
//!
//! // One backend matmul, then one fused kernel for the addition.
//! assign(&out, matmul(&a, &b)?.add(&a)?, &exec)?;
//! exec.synchronize()?;
//! assert_eq!(out.to_vec(), vec![2.0, 4.0, 6.0, 8.0]);
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod env;
pub mod error;
pub mod executor;
pub mod ops;
pub mod profiling;
pub mod tensor;
pub mod transform;

pub use backend::spec::Backend;
pub use error::{ExprError, ExprResult};
pub use executor::{
    AnyExecutor, ExecConfig, ExecContext, Executor, ExecutorKind, HostExecutor, StreamExecutor,
};
pub use ops::{
    assign, assign_outputs, assign_outputs_slice, materialize, Operator, OperatorExt, Scalar,
    Schedule, SliceEnd,
};
pub use tensor::{DType, Element, Shape, TensorView};
pub use transform::{
    contract, conv1d, cov, cumsum, irfft, matmul, matmul_axes, matmul_axes_scaled, matmul_scaled,
    qr, qr_packed, rfft, trace, ConvMode, TransformOutput, TransformState,
};
