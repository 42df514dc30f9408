use crate::backend::spec::TransformOp;
use crate::error::ExprResult;
use crate::executor::Executor;
use crate::ops::assign::{MultiOutput, Schedule};
use crate::ops::rank::MinRank;
use crate::ops::Operator;
use crate::tensor::shape::Dims;
use crate::tensor::{Shape, StridedBuffer};
use crate::transform::{dispatch, Operands};

/// QR decomposition of the trailing `[m, n]` matrices of `a`.
///
/// Produces `Q` with shape `batch + [m, m]` and `R` with shape `batch + [m, n]`. It has two
/// outputs and is therefore not an operator; bind it with `assign_outputs`:
///
/// ```compile_fail
/// use texpr::{qr, OperatorExt, TensorView};
///
/// let a = TensorView::<f64, 2>::zeros([3, 3]);
/// let doubled = qr(&a).unwrap().scale(2.0);
/// ```
pub struct Qr<A: Operator> {
    input: A,
    q: Shape,
    r: Shape,
}

pub fn qr<A: Operator>(a: &A) -> ExprResult<Qr<A>> {
    let () = MinRank::<A, 2>::CHECK;
    let dims = a.shape().dims();
    let rank = A::RANK;
    let m = dims[rank - 2];
    let mut q = Dims::from_slice(&dims[..rank - 1]);
    q.push(m);
    Ok(Qr {
        input: a.clone(),
        q: Shape::new(q),
        r: a.shape().clone(),
    })
}

impl<A: Operator> MultiOutput for Qr<A> {
    type Elem = A::Elem;
    const OUTPUT_RANKS: &'static [usize] = &[A::RANK, A::RANK];
    const STREAM_ONLY: bool = true;

    fn name(&self) -> String {
        format!("qr({})", self.input.name())
    }

    fn output_shapes(&self) -> Vec<Shape> {
        vec![self.q.clone(), self.r.clone()]
    }

    fn dispatch<E: Executor>(
        mut self,
        exec: &E,
        outputs: Vec<StridedBuffer<A::Elem>>,
        schedule: &mut Schedule,
    ) -> ExprResult<()> {
        let name = self.name();
        let mut operands = Operands::default();
        operands.push(&mut self.input, exec, schedule)?;
        dispatch(exec, schedule, &name, TransformOp::Qr, &self.r, operands.inputs(), outputs)
    }
}

/// Householder QR in the packed layout used by LAPACK's `geqrf`.
///
/// The first output has the shape of `a`: `R` on and above the diagonal and the essential part
/// of each reflector `v_k` below it (`v_k[k] = 1` is implicit). The second output holds `tau`
/// with shape `batch + [min(m, n)]`, so that `Q = H_0 H_1 .. H_{p-1}` with
/// `H_k = I - tau_k v_k v_kᵀ`.
pub struct QrPacked<A: Operator> {
    input: A,
    packed: Shape,
    tau: Shape,
}

pub fn qr_packed<A: Operator>(a: &A) -> ExprResult<QrPacked<A>> {
    let () = MinRank::<A, 2>::CHECK;
    let dims = a.shape().dims();
    let rank = A::RANK;
    let mut tau = Dims::from_slice(&dims[..rank - 2]);
    tau.push(dims[rank - 2].min(dims[rank - 1]));
    Ok(QrPacked {
        input: a.clone(),
        packed: a.shape().clone(),
        tau: Shape::new(tau),
    })
}

impl<A: Operator> MultiOutput for QrPacked<A> {
    type Elem = A::Elem;
    const OUTPUT_RANKS: &'static [usize] = &[A::RANK, A::RANK - 1];
    const STREAM_ONLY: bool = true;

    fn name(&self) -> String {
        format!("qr_packed({})", self.input.name())
    }

    fn output_shapes(&self) -> Vec<Shape> {
        vec![self.packed.clone(), self.tau.clone()]
    }

    fn dispatch<E: Executor>(
        mut self,
        exec: &E,
        outputs: Vec<StridedBuffer<A::Elem>>,
        schedule: &mut Schedule,
    ) -> ExprResult<()> {
        let name = self.name();
        let mut operands = Operands::default();
        operands.push(&mut self.input, exec, schedule)?;
        dispatch(exec, schedule, &name, TransformOp::QrPacked, &self.packed, operands.inputs(), outputs)
    }
}
