use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::{check_index, Operator};
use crate::tensor::shape::Dims;
use crate::tensor::{Shape, StridedBuffer};

/// Returns `inv` such that permuting by `perm` and then by `inv` is the identity.
pub fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; perm.len()];
    for (d, &p) in perm.iter().enumerate() {
        inverse[p] = d;
    }
    inverse
}

/// View whose dimension `d` is dimension `perm[d]` of the child.
#[derive(Debug, Clone)]
pub struct Permute<Op: Operator> {
    child: Op,
    perm: Dims,
    shape: Shape,
}

impl<Op: Operator> Permute<Op> {
    pub fn new(child: Op, perm: &[usize]) -> ExprResult<Self> {
        let rank = Op::RANK;
        if perm.len() != rank {
            return Err(ExprError::invalid_dim(
                format!("permute({})", child.name()),
                format!("permutation has {} entries for rank {rank}", perm.len()),
            ));
        }
        let mut seen = Dims::from_elem(0, rank);
        for &p in perm {
            if p >= rank || seen[p] != 0 {
                return Err(ExprError::invalid_dim(
                    format!("permute({})", child.name()),
                    format!("{perm:?} is not a permutation of 0..{rank}"),
                ));
            }
            seen[p] = 1;
        }
        let dims: Dims = perm.iter().map(|&p| child.shape().dims()[p]).collect();
        Ok(Permute {
            shape: Shape::new(dims),
            perm: Dims::from_slice(perm),
            child,
        })
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }
}

impl<Op: Operator> Operator for Permute<Op> {
    type Elem = Op::Elem;
    const RANK: usize = Op::RANK;

    fn name(&self) -> String {
        format!("permute({})", self.child.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn at(&self, index: &[usize]) -> ExprResult<Op::Elem> {
        check_index(self, index)?;
        let mut child = Dims::from_elem(0, index.len());
        for (&i, &p) in index.iter().zip(self.perm.iter()) {
            child[p] = i;
        }
        self.child.at(&child)
    }

    fn pre_run<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<()> {
        self.child.pre_run(exec, schedule)
    }

    fn strided(&self) -> Option<StridedBuffer<Op::Elem>> {
        let parent = self.child.strided()?;
        let layout = parent.layout.permute(&self.perm);
        Some(StridedBuffer::new(parent.buffer, layout))
    }
}
