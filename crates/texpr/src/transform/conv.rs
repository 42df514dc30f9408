use crate::backend::spec::TransformOp;
use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::rank::MinRank;
use crate::ops::Operator;
use crate::tensor::shape::Dims;
use crate::tensor::Shape;
use crate::transform::{Operands, Transform, TransformOutput};

pub use crate::backend::spec::ConvMode;

/// 1-D convolution along the last dimension.
///
/// The kernel is either rank 1 (applied to every batch row of the signal) or has the signal's
/// rank and batch dimensions.
#[derive(Clone)]
pub struct Conv1d<A: Operator, B: Operator<Elem = A::Elem>> {
    signal: A,
    kernel: B,
    mode: ConvMode,
    shape: Shape,
}

pub fn conv1d<A, B>(signal: &A, kernel: &B, mode: ConvMode) -> ExprResult<TransformOutput<Conv1d<A, B>>>
where
    A: Operator,
    B: Operator<Elem = A::Elem>,
{
    Conv1d::new(signal.clone(), kernel.clone(), mode).map(TransformOutput::new)
}

impl<A: Operator, B: Operator<Elem = A::Elem>> Conv1d<A, B> {
    fn new(signal: A, kernel: B, mode: ConvMode) -> ExprResult<Self> {
        let () = MinRank::<A, 1>::CHECK;
        let () = MinRank::<B, 1>::CHECK;
        let a = signal.shape().dims();
        let b = kernel.shape().dims();
        if B::RANK != 1 && (B::RANK != A::RANK || a[..A::RANK - 1] != b[..B::RANK - 1]) {
            return Err(ExprError::shape_mismatch("conv1d", a, b));
        }
        let n = a[A::RANK - 1];
        let m = b[B::RANK - 1];
        let mut dims = Dims::from_slice(&a[..A::RANK - 1]);
        dims.push(mode.output_len(n, m));
        let shape = Shape::new(dims);
        Ok(Conv1d {
            signal,
            kernel,
            mode,
            shape,
        })
    }
}

impl<A: Operator, B: Operator<Elem = A::Elem>> Transform for Conv1d<A, B> {
    type Elem = A::Elem;
    const RANK: usize = A::RANK;
    const STREAM_ONLY: bool = false;

    fn name(&self) -> String {
        format!("conv1d({}, {})", self.signal.name(), self.kernel.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn op(&self) -> TransformOp {
        TransformOp::Conv1d { mode: self.mode }
    }

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>> {
        let mut operands = Operands::default();
        operands.push(&mut self.signal, exec, schedule)?;
        operands.push(&mut self.kernel, exec, schedule)?;
        Ok(operands)
    }
}
