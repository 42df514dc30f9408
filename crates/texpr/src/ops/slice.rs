//! Strided sub-views that may drop dimensions.

use smallvec::SmallVec;

use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::rank::SliceRank;
use crate::ops::{check_index, Operator};
use crate::tensor::shape::Dims;
use crate::tensor::{Shape, StridedBuffer};

/// Upper bound of a slice along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceEnd {
    /// Exclusive end index.
    At(usize),
    /// Everything from the start to the end of the dimension.
    End,
    /// Pin the dimension at its start index and remove it from the result.
    DropDim,
}

impl From<usize> for SliceEnd {
    fn from(end: usize) -> Self {
        SliceEnd::At(end)
    }
}

/// Rank-`N` view of `Op` selecting `start + i * stride` along each retained dimension.
///
/// Slicing a memory-backed operator stays memory-backed, so the slice can feed a backend
/// directly or serve as an assignment destination.
#[derive(Debug, Clone)]
pub struct Slice<Op: Operator, const N: usize> {
    child: Op,
    starts: Dims,
    steps: Dims,
    retained: Dims,
    shape: Shape,
}

impl<Op: Operator, const N: usize> Slice<Op, N> {
    /// `starts`, `ends` and `strides` hold one entry per dimension of `child`.
    pub fn new(child: Op, starts: &[usize], ends: &[SliceEnd], strides: &[usize]) -> ExprResult<Self> {
        let () = SliceRank::<Op, N>::CHECK;
        let name = || format!("slice({})", child.name());
        let rank = Op::RANK;
        if starts.len() != rank || ends.len() != rank || strides.len() != rank {
            return Err(ExprError::invalid_dim(
                name(),
                format!(
                    "expected {rank} starts, ends and strides, got {}, {} and {}",
                    starts.len(),
                    ends.len(),
                    strides.len()
                ),
            ));
        }
        let retained_count = ends.iter().filter(|end| **end != SliceEnd::DropDim).count();
        if retained_count != N {
            return Err(ExprError::invalid_dim(
                name(),
                format!("{retained_count} dimensions are retained but the slice has rank {N}"),
            ));
        }

        let mut retained = Dims::new();
        let mut dims: SmallVec<[usize; 6]> = SmallVec::new();
        for dim in 0..rank {
            let size = child.shape().dims()[dim];
            let start = starts[dim];
            let stride = strides[dim];
            if stride == 0 {
                return Err(ExprError::invalid_dim(name(), format!("stride of dimension {dim} is zero")));
            }
            match ends[dim] {
                SliceEnd::DropDim => {
                    if start >= size {
                        return Err(ExprError::out_of_range(name(), "start", start, size));
                    }
                }
                end => {
                    let end = match end {
                        SliceEnd::At(end) => end,
                        _ => size,
                    };
                    if end > size {
                        return Err(ExprError::out_of_range(name(), "end", end, size));
                    }
                    if start > end {
                        return Err(ExprError::out_of_range(name(), "start", start, end));
                    }
                    retained.push(dim);
                    dims.push((end - start).div_ceil(stride));
                }
            }
        }

        Ok(Slice {
            child,
            starts: Dims::from_slice(starts),
            steps: Dims::from_slice(strides),
            retained,
            shape: Shape::new(dims),
        })
    }

    fn child_index(&self, index: &[usize]) -> Dims {
        let mut child = self.starts.clone();
        for (&i, &dim) in index.iter().zip(self.retained.iter()) {
            child[dim] += i * self.steps[dim];
        }
        child
    }
}

impl<Op: Operator, const N: usize> Operator for Slice<Op, N> {
    type Elem = Op::Elem;
    const RANK: usize = N;

    fn name(&self) -> String {
        format!("slice({})", self.child.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn at(&self, index: &[usize]) -> ExprResult<Op::Elem> {
        check_index(self, index)?;
        self.child.at(&self.child_index(index))
    }

    fn pre_run<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<()> {
        self.child.pre_run(exec, schedule)
    }

    fn strided(&self) -> Option<StridedBuffer<Op::Elem>> {
        let parent = self.child.strided()?;
        let layout = parent
            .layout
            .slice(&self.starts, &self.steps, &self.retained, self.shape.dims());
        Some(StridedBuffer::new(parent.buffer, layout))
    }
}
