use crate::backend::spec::{ScalarParam, TransformOp};
use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::rank::{MinRank, SameRank};
use crate::ops::Operator;
use crate::tensor::shape::Dims;
use crate::tensor::{Layout, Shape};
use crate::transform::{Operands, Transform, TransformOutput};

/// Batched matrix product `alpha * a @ b + beta * out` over the last two dimensions.
#[derive(Clone)]
pub struct MatMul<A: Operator, B: Operator<Elem = A::Elem>> {
    lhs: A,
    rhs: B,
    alpha: f64,
    beta: f64,
    /// Moves the selected axes last; `None` multiplies the trailing two dimensions.
    perm: Option<Dims>,
    shape: Shape,
}

/// Matrix product of the trailing two dimensions.
///
/// Matmul only runs on stream executors; handing it to a [`crate::HostExecutor`] is rejected at
/// compile time:
///
/// ```compile_fail
/// use std::sync::Arc;
/// use texpr::{assign, matmul, HostExecutor, TensorView};
/// use texpr_backend_ref_cpu::CpuBackend;
///
/// let exec = HostExecutor::new(Arc::new(CpuBackend::new()));
/// let a = TensorView::<f32, 2>::zeros([2, 2]);
/// assign(&a, matmul(&a, &a).unwrap(), &exec).unwrap();
/// ```
pub fn matmul<A, B>(a: &A, b: &B) -> ExprResult<TransformOutput<MatMul<A, B>>>
where
    A: Operator,
    B: Operator<Elem = A::Elem>,
{
    MatMul::new(a.clone(), b.clone(), 1.0, 0.0, None).map(TransformOutput::new)
}

/// `alpha * a @ b + beta * out`. The result buffer starts zeroed, so `beta` only matters to
/// backends that accumulate into existing storage.
pub fn matmul_scaled<A, B>(a: &A, b: &B, alpha: f64, beta: f64) -> ExprResult<TransformOutput<MatMul<A, B>>>
where
    A: Operator,
    B: Operator<Elem = A::Elem>,
{
    MatMul::new(a.clone(), b.clone(), alpha, beta, None).map(TransformOutput::new)
}

/// Multiplies over `axes = [row, col]` instead of the trailing two dimensions.
///
/// The same axes are used for both operands and for the output; the remaining dimensions are
/// batch dimensions.
pub fn matmul_axes<A, B>(a: &A, b: &B, axes: [usize; 2]) -> ExprResult<TransformOutput<MatMul<A, B>>>
where
    A: Operator,
    B: Operator<Elem = A::Elem>,
{
    MatMul::new(a.clone(), b.clone(), 1.0, 0.0, Some(axes)).map(TransformOutput::new)
}

/// [`matmul_axes`] with the scaling of [`matmul_scaled`].
pub fn matmul_axes_scaled<A, B>(
    a: &A,
    b: &B,
    axes: [usize; 2],
    alpha: f64,
    beta: f64,
) -> ExprResult<TransformOutput<MatMul<A, B>>>
where
    A: Operator,
    B: Operator<Elem = A::Elem>,
{
    MatMul::new(a.clone(), b.clone(), alpha, beta, Some(axes)).map(TransformOutput::new)
}

impl<A: Operator, B: Operator<Elem = A::Elem>> MatMul<A, B> {
    fn new(lhs: A, rhs: B, alpha: f64, beta: f64, axes: Option<[usize; 2]>) -> ExprResult<Self> {
        let () = MinRank::<A, 2>::CHECK;
        let () = SameRank::<A, B>::CHECK;
        let rank = A::RANK;

        let perm = match axes {
            Some([row, col]) => {
                if row >= rank || col >= rank || row == col {
                    return Err(ExprError::invalid_dim(
                        "matmul",
                        format!("axes [{row}, {col}] are not two distinct dimensions of rank {rank}"),
                    ));
                }
                let mut perm: Dims = (0..rank).filter(|&d| d != row && d != col).collect();
                perm.push(row);
                perm.push(col);
                Some(perm)
            }
            None => None,
        };
        let view = |dims: &[usize]| -> Dims {
            match &perm {
                Some(perm) => perm.iter().map(|&p| dims[p]).collect(),
                None => Dims::from_slice(dims),
            }
        };
        let a = view(lhs.shape().dims());
        let b = view(rhs.shape().dims());

        if a[..rank - 2] != b[..rank - 2] || a[rank - 1] != b[rank - 2] {
            return Err(ExprError::shape_mismatch("matmul", &a, &b));
        }
        let mut product = Dims::from_slice(&a[..rank - 1]);
        product.push(b[rank - 1]);

        let dims = match &perm {
            Some(perm) => {
                let mut dims = Dims::from_elem(0, rank);
                for (d, &p) in perm.iter().enumerate() {
                    dims[p] = product[d];
                }
                dims
            }
            None => product,
        };

        Ok(MatMul {
            lhs,
            rhs,
            alpha,
            beta,
            perm,
            shape: Shape::new(dims),
        })
    }
}

impl<A: Operator, B: Operator<Elem = A::Elem>> Transform for MatMul<A, B> {
    type Elem = A::Elem;
    const RANK: usize = A::RANK;
    const STREAM_ONLY: bool = true;

    fn name(&self) -> String {
        format!("matmul({}, {})", self.lhs.name(), self.rhs.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn op(&self) -> TransformOp {
        TransformOp::MatMul {
            alpha: ScalarParam::new(self.alpha),
            beta: ScalarParam::new(self.beta),
        }
    }

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>> {
        let mut operands = Operands::default();
        operands.push(&mut self.lhs, exec, schedule)?;
        operands.push(&mut self.rhs, exec, schedule)?;
        if let Some(perm) = &self.perm {
            operands.permute_input(0, perm);
            operands.permute_input(1, perm);
        }
        Ok(operands)
    }

    fn output_layout(&self, result: &Layout) -> Layout {
        match &self.perm {
            Some(perm) => result.permute(perm),
            None => result.clone(),
        }
    }
}
