use std::marker::PhantomData;

use crate::backend::spec::TransformOp;
use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::Operator;
use crate::tensor::shape::Dims;
use crate::tensor::Shape;
use crate::transform::{Operands, Transform, TransformOutput};

struct ContractRank<A, B, const K: usize>(PhantomData<(A, B)>);

impl<A: Operator, B: Operator, const K: usize> ContractRank<A, B, K> {
    const CHECK: () = assert!(
        K <= A::RANK && K <= B::RANK,
        "cannot contract more axes than an operand has"
    );
}

/// Tensor contraction (tensordot) over `K` pairs of axes.
///
/// The output holds the free dimensions of `a` followed by the free dimensions of `b`, each in
/// their original order.
#[derive(Clone)]
pub struct Contract<A: Operator, B: Operator<Elem = A::Elem>, const K: usize> {
    lhs: A,
    rhs: B,
    axes: [(usize, usize); K],
    shape: Shape,
}

pub fn contract<A, B, const K: usize>(
    a: &A,
    b: &B,
    axes: [(usize, usize); K],
) -> ExprResult<TransformOutput<Contract<A, B, K>>>
where
    A: Operator,
    B: Operator<Elem = A::Elem>,
{
    let () = ContractRank::<A, B, K>::CHECK;
    let name = || format!("contract({}, {})", a.name(), b.name());
    let a_dims = a.shape().dims();
    let b_dims = b.shape().dims();
    let mut a_used = Dims::from_elem(0, A::RANK);
    let mut b_used = Dims::from_elem(0, B::RANK);
    for &(ai, bi) in &axes {
        if ai >= A::RANK || bi >= B::RANK {
            return Err(ExprError::invalid_dim(
                name(),
                format!("axis pair ({ai}, {bi}) is out of range for ranks {} and {}", A::RANK, B::RANK),
            ));
        }
        if a_used[ai] != 0 || b_used[bi] != 0 {
            return Err(ExprError::invalid_dim(
                name(),
                format!("axis pair ({ai}, {bi}) repeats a contracted axis"),
            ));
        }
        a_used[ai] = 1;
        b_used[bi] = 1;
        if a_dims[ai] != b_dims[bi] {
            return Err(ExprError::shape_mismatch(name(), &[a_dims[ai]], &[b_dims[bi]]));
        }
    }

    let dims: Dims = a_dims
        .iter()
        .zip(&a_used)
        .chain(b_dims.iter().zip(&b_used))
        .filter(|&(_, &used)| used == 0)
        .map(|(&dim, _)| dim)
        .collect();
    Ok(TransformOutput::new(Contract {
        lhs: a.clone(),
        rhs: b.clone(),
        axes,
        shape: Shape::new(dims),
    }))
}

impl<A: Operator, B: Operator<Elem = A::Elem>, const K: usize> Transform for Contract<A, B, K> {
    type Elem = A::Elem;
    const RANK: usize = A::RANK + B::RANK - 2 * K;
    const STREAM_ONLY: bool = true;

    fn name(&self) -> String {
        format!("contract({}, {})", self.lhs.name(), self.rhs.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn op(&self) -> TransformOp {
        TransformOp::Contract {
            axes: self.axes.to_vec(),
        }
    }

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>> {
        let mut operands = Operands::default();
        operands.push(&mut self.lhs, exec, schedule)?;
        operands.push(&mut self.rhs, exec, schedule)?;
        Ok(operands)
    }
}
