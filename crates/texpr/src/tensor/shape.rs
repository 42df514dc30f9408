//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::ExprResult;

/// Inline capacity for dimension lists; ranks above this spill to the heap.
pub(crate) const INLINE_RANK: usize = 6;

pub(crate) type Dims = SmallVec<[usize; INLINE_RANK]>;

/// Stores the logical extents of a tensor-like operator.
///
/// A shape of rank 0 describes a scalar holding exactly one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Shape {
    dims: Dims,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    pub fn new<D: AsRef<[usize]>>(dims: D) -> Self {
        Shape {
            dims: Dims::from_slice(dims.as_ref()),
        }
    }

    /// Shape of a rank-0 value.
    pub fn scalar() -> Self {
        Shape { dims: Dims::new() }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the extent of `dim`, or `None` when `dim >= rank`.
    pub fn size(&self, dim: usize) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major strides for a dense buffer of this shape.
    pub fn contiguous_strides(&self) -> Dims {
        let mut strides = Dims::from_elem(0, self.dims.len());
        let mut acc = 1usize;
        for (stride, &dim) in strides.iter_mut().zip(self.dims.iter()).rev() {
            *stride = acc;
            acc *= dim;
        }
        strides
    }

    /// Two shapes combine elementwise when they are equal or one of them is a scalar.
    pub fn is_conformant(&self, other: &Shape) -> bool {
        self == other || self.rank() == 0 || other.rank() == 0
    }

    /// Result shape of an elementwise combination, if the operands conform.
    pub fn broadcast(&self, other: &Shape) -> Option<Shape> {
        if !self.is_conformant(other) {
            return None;
        }
        if self.rank() >= other.rank() {
            Some(self.clone())
        } else {
            Some(other.clone())
        }
    }

    /// Visits every multi-index of the shape in row-major order.
    ///
    /// A scalar shape visits the empty index once; a shape with a zero extent visits nothing.
    pub fn for_each_index<F>(&self, mut f: F) -> ExprResult<()>
    where
        F: FnMut(&[usize]) -> ExprResult<()>,
    {
        if self.num_elements() == 0 {
            return Ok(());
        }
        let rank = self.rank();
        let mut index = Dims::from_elem(0, rank);
        loop {
            f(&index)?;
            let mut axis = rank;
            loop {
                if axis == 0 {
                    return Ok(());
                }
                axis -= 1;
                index[axis] += 1;
                if index[axis] < self.dims[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims)
    }
}
