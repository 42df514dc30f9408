//! Lazy operator composition.
//!
//! Every node of an expression implements [`Operator`]: it knows its rank (statically), its
//! extents (at construction) and how to produce the element at a multi-index. Nothing is
//! computed until the expression is handed to [`assign`], which resolves any transforms in the
//! tree and then evaluates the whole expression in a single fused kernel.

pub mod assign;
pub mod elementwise;
pub mod permute;
pub mod rank;
pub mod slice;

use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::tensor::{Element, Shape, StridedBuffer};

pub use assign::{
    assign, assign_outputs, assign_outputs_slice, materialize, MultiOutput, OutputSet, Schedule,
    ScheduledWork,
};
pub use elementwise::{Binary, BinaryOp, Map, Scalar, Unary, UnaryOp, ZipWith};
pub use permute::{inverse_permutation, Permute};
pub use slice::{Slice, SliceEnd};

/// A node of a lazy tensor expression.
///
/// Implementations are cheap to clone: leaves share their storage and transforms share their
/// result buffer.
pub trait Operator: Clone + Send + Sync + 'static {
    type Elem: Element;

    /// Number of dimensions, fixed by the operator type.
    const RANK: usize;

    /// Human-readable description used in errors and logs.
    fn name(&self) -> String;

    fn shape(&self) -> &Shape;

    /// Extent of `dim`; fails with `OutOfRange` when `dim >= RANK`.
    fn size(&self, dim: usize) -> ExprResult<usize> {
        self.shape()
            .size(dim)
            .ok_or_else(|| ExprError::out_of_range(self.name(), "dimension", dim, Self::RANK))
    }

    fn rank(&self) -> usize {
        Self::RANK
    }

    /// Element at `index`, which must have exactly `RANK` in-bounds entries.
    fn at(&self, index: &[usize]) -> ExprResult<Self::Elem>;

    /// Resolves transforms below this node; called once per assignment before evaluation.
    fn pre_run<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<()> {
        let _ = (exec, schedule);
        Ok(())
    }

    /// Concrete storage for memory-backed operators.
    fn strided(&self) -> Option<StridedBuffer<Self::Elem>> {
        None
    }
}

/// Rejects indices of the wrong length or outside the operator's extents.
pub(crate) fn check_index<Op: Operator>(op: &Op, index: &[usize]) -> ExprResult<()> {
    let dims = op.shape().dims();
    if index.len() != dims.len() {
        return Err(ExprError::invalid_dim(
            op.name(),
            format!("index has {} entries for rank {}", index.len(), dims.len()),
        ));
    }
    for (&i, &bound) in index.iter().zip(dims) {
        if i >= bound {
            return Err(ExprError::out_of_range(op.name(), "index", i, bound));
        }
    }
    Ok(())
}

/// Combinators available on every operator. Each borrows its operands and clones them into the
/// new node.
pub trait OperatorExt: Operator {
    fn add<R: Operator<Elem = Self::Elem>>(&self, rhs: &R) -> ExprResult<Binary<Self, R>> {
        Binary::new(BinaryOp::Add, self.clone(), rhs.clone())
    }

    fn sub<R: Operator<Elem = Self::Elem>>(&self, rhs: &R) -> ExprResult<Binary<Self, R>> {
        Binary::new(BinaryOp::Sub, self.clone(), rhs.clone())
    }

    fn mul<R: Operator<Elem = Self::Elem>>(&self, rhs: &R) -> ExprResult<Binary<Self, R>> {
        Binary::new(BinaryOp::Mul, self.clone(), rhs.clone())
    }

    fn div<R: Operator<Elem = Self::Elem>>(&self, rhs: &R) -> ExprResult<Binary<Self, R>> {
        Binary::new(BinaryOp::Div, self.clone(), rhs.clone())
    }

    fn maximum<R: Operator<Elem = Self::Elem>>(&self, rhs: &R) -> ExprResult<Binary<Self, R>> {
        Binary::new(BinaryOp::Max, self.clone(), rhs.clone())
    }

    fn minimum<R: Operator<Elem = Self::Elem>>(&self, rhs: &R) -> ExprResult<Binary<Self, R>> {
        Binary::new(BinaryOp::Min, self.clone(), rhs.clone())
    }

    fn zip_with<R, F>(&self, rhs: &R, f: F) -> ExprResult<ZipWith<Self, R, F>>
    where
        R: Operator<Elem = Self::Elem>,
        F: Fn(Self::Elem, Self::Elem) -> Self::Elem + Clone + Send + Sync + 'static,
    {
        ZipWith::new(self.clone(), rhs.clone(), f)
    }

    fn neg(&self) -> Unary<Self> {
        Unary::new(UnaryOp::Neg, self.clone())
    }

    fn abs(&self) -> Unary<Self> {
        Unary::new(UnaryOp::Abs, self.clone())
    }

    fn scale(&self, factor: Self::Elem) -> Unary<Self> {
        Unary::new(UnaryOp::Scale(factor), self.clone())
    }

    fn map<F>(&self, f: F) -> Map<Self, F>
    where
        F: Fn(Self::Elem) -> Self::Elem + Clone + Send + Sync + 'static,
    {
        Map::new(self.clone(), f)
    }

    /// Strided sub-view keeping `N` dimensions; see [`Slice::new`].
    fn slice<const N: usize>(
        &self,
        starts: &[usize],
        ends: &[SliceEnd],
        strides: &[usize],
    ) -> ExprResult<Slice<Self, N>> {
        Slice::new(self.clone(), starts, ends, strides)
    }

    /// [`OperatorExt::slice`] with a stride of 1 along every dimension.
    fn slice_range<const N: usize>(&self, starts: &[usize], ends: &[SliceEnd]) -> ExprResult<Slice<Self, N>> {
        Slice::new(self.clone(), starts, ends, &vec![1; Self::RANK])
    }

    /// Reorders dimensions so that output dimension `d` is input dimension `perm[d]`.
    fn permute(&self, perm: &[usize]) -> ExprResult<Permute<Self>> {
        Permute::new(self.clone(), perm)
    }

    /// Swaps the last two dimensions.
    fn transpose(&self) -> ExprResult<Permute<Self>> {
        let rank = Self::RANK;
        if rank < 2 {
            return Err(ExprError::invalid_dim(self.name(), "transpose needs at least two dimensions"));
        }
        let mut perm: Vec<usize> = (0..rank).collect();
        perm.swap(rank - 2, rank - 1);
        Permute::new(self.clone(), &perm)
    }
}

impl<Op: Operator> OperatorExt for Op {}
