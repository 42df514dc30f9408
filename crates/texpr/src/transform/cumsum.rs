use crate::backend::spec::TransformOp;
use crate::error::ExprResult;
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::rank::MinRank;
use crate::ops::Operator;
use crate::tensor::Shape;
use crate::transform::{Operands, Transform, TransformOutput};

/// Inclusive prefix sum along the last dimension: `[1, 2, 3, 4]` becomes `[1, 3, 6, 10]`.
#[derive(Clone)]
pub struct CumSum<A: Operator> {
    input: A,
    shape: Shape,
}

pub fn cumsum<A: Operator>(a: &A) -> ExprResult<TransformOutput<CumSum<A>>> {
    let () = MinRank::<A, 1>::CHECK;
    Ok(TransformOutput::new(CumSum {
        input: a.clone(),
        shape: a.shape().clone(),
    }))
}

impl<A: Operator> Transform for CumSum<A> {
    type Elem = A::Elem;
    const RANK: usize = A::RANK;
    const STREAM_ONLY: bool = false;

    fn name(&self) -> String {
        format!("cumsum({})", self.input.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn op(&self) -> TransformOp {
        TransformOp::CumSum
    }

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>> {
        let mut operands = Operands::default();
        operands.push(&mut self.input, exec, schedule)?;
        Ok(operands)
    }
}
