use crate::backend::spec::TransformOp;
use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::rank::ExactRank;
use crate::ops::Operator;
use crate::tensor::Shape;
use crate::transform::{Operands, Transform, TransformOutput};

/// Sum of the main diagonal of a square matrix, as a rank-0 result.
#[derive(Clone)]
pub struct Trace<A: Operator> {
    input: A,
    shape: Shape,
}

pub fn trace<A: Operator>(a: &A) -> ExprResult<TransformOutput<Trace<A>>> {
    let () = ExactRank::<A, 2>::CHECK;
    let dims = a.shape().dims();
    if dims[0] != dims[1] {
        return Err(ExprError::shape_mismatch(
            format!("trace({})", a.name()),
            &[dims[0], dims[0]],
            dims,
        ));
    }
    Ok(TransformOutput::new(Trace {
        input: a.clone(),
        shape: Shape::scalar(),
    }))
}

impl<A: Operator> Transform for Trace<A> {
    type Elem = A::Elem;
    const RANK: usize = 0;
    const STREAM_ONLY: bool = false;

    fn name(&self) -> String {
        format!("trace({})", self.input.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn op(&self) -> TransformOp {
        TransformOp::Trace
    }

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>> {
        let mut operands = Operands::default();
        operands.push(&mut self.input, exec, schedule)?;
        Ok(operands)
    }
}
