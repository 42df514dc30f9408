use crate::backend::spec::TransformOp;
use crate::error::ExprResult;
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::rank::ExactRank;
use crate::ops::Operator;
use crate::tensor::Shape;
use crate::transform::{Operands, Transform, TransformOutput};

/// Sample covariance of the columns of an `[observations, variables]` matrix.
#[derive(Clone)]
pub struct Cov<A: Operator> {
    input: A,
    shape: Shape,
}

pub fn cov<A: Operator>(a: &A) -> ExprResult<TransformOutput<Cov<A>>> {
    let () = ExactRank::<A, 2>::CHECK;
    let vars = a.shape().dims()[1];
    Ok(TransformOutput::new(Cov {
        input: a.clone(),
        shape: Shape::new([vars, vars]),
    }))
}

impl<A: Operator> Transform for Cov<A> {
    type Elem = A::Elem;
    const RANK: usize = 2;
    const STREAM_ONLY: bool = true;

    fn name(&self) -> String {
        format!("cov({})", self.input.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn op(&self) -> TransformOp {
        TransformOp::Cov
    }

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>> {
        let mut operands = Operands::default();
        operands.push(&mut self.input, exec, schedule)?;
        Ok(operands)
    }
}
