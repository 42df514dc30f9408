//! Strided layouts over flat element buffers.
//!
//! A layout maps a logical multi-index to a flat element offset. Views (slice, permute) over
//! memory-backed operators rewrite the layout instead of copying data, which lets backends
//! consume them directly and lets them act as assignment destinations.

use smallvec::SmallVec;

use super::shape::{Dims, Shape};

/// Shape plus per-dimension element strides and a base offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    shape: Shape,
    strides: Dims,
    offset: usize,
}

impl Layout {
    /// Dense row-major layout for `shape` starting at element 0.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.contiguous_strides();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Builds a layout from explicit parts; `strides` must have one entry per dimension.
    pub fn from_parts(shape: Shape, strides: &[usize], offset: usize) -> Self {
        assert_eq!(
            shape.rank(),
            strides.len(),
            "layout strides must match the shape rank"
        );
        Layout {
            shape,
            strides: Dims::from_slice(strides),
            offset,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Flat element offset of `index`. The caller guarantees the index is in bounds.
    pub fn ravel(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.strides.len());
        index
            .iter()
            .zip(self.strides.iter())
            .map(|(&i, &stride)| i * stride)
            .sum::<usize>()
            + self.offset
    }

    /// True when the layout addresses a dense row-major block.
    pub fn is_contiguous(&self) -> bool {
        self.shape.num_elements() <= 1 || self.strides == self.shape.contiguous_strides()
    }

    /// One past the largest flat offset this layout can touch.
    pub fn span(&self) -> usize {
        if self.shape.num_elements() == 0 {
            return self.offset;
        }
        self.offset
            + self
                .shape
                .dims()
                .iter()
                .zip(self.strides.iter())
                .map(|(&dim, &stride)| (dim - 1) * stride)
                .sum::<usize>()
            + 1
    }

    /// Reorders dimensions so that output dimension `d` is input dimension `perm[d]`.
    pub fn permute(&self, perm: &[usize]) -> Layout {
        let dims: SmallVec<[usize; 6]> = perm.iter().map(|&p| self.shape.dims()[p]).collect();
        let strides: Dims = perm.iter().map(|&p| self.strides[p]).collect();
        Layout {
            shape: Shape::new(dims),
            strides,
            offset: self.offset,
        }
    }

    /// Applies per-dimension starts and steps, keeping only the `retained` dimensions.
    ///
    /// `sizes` holds the resulting extent of each retained dimension.
    pub fn slice(
        &self,
        starts: &[usize],
        steps: &[usize],
        retained: &[usize],
        sizes: &[usize],
    ) -> Layout {
        let offset = self.offset
            + starts
                .iter()
                .zip(self.strides.iter())
                .map(|(&start, &stride)| start * stride)
                .sum::<usize>();
        let strides: Dims = retained
            .iter()
            .map(|&dim| self.strides[dim] * steps[dim])
            .collect();
        Layout {
            shape: Shape::new(sizes),
            strides,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_layout_ravels_row_major() {
        let layout = Layout::contiguous(Shape::new([2, 3, 4]));
        assert_eq!(layout.strides(), &[12, 4, 1]);
        assert_eq!(layout.ravel(&[1, 2, 3]), 23);
        assert_eq!(layout.span(), 24);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn permuted_layout_swaps_strides() {
        let layout = Layout::contiguous(Shape::new([2, 3])).permute(&[1, 0]);
        assert_eq!(layout.shape().dims(), &[3, 2]);
        assert_eq!(layout.strides(), &[1, 3]);
        assert_eq!(layout.ravel(&[2, 1]), 5);
        assert!(!layout.is_contiguous());
    }

    #[test]
    fn sliced_layout_drops_dimension_and_offsets() {
        // Column 2 of a 4x5 matrix: start (0, 2), keep dim 0, drop dim 1.
        let layout = Layout::contiguous(Shape::new([4, 5]));
        let column = layout.slice(&[0, 2], &[1, 1], &[0], &[4]);
        assert_eq!(column.shape().dims(), &[4]);
        assert_eq!(column.strides(), &[5]);
        assert_eq!(column.offset(), 2);
        assert_eq!(column.ravel(&[3]), 17);
    }

    #[test]
    fn stepped_slice_scales_strides() {
        let layout = Layout::contiguous(Shape::new([10]));
        let evens = layout.slice(&[1], &[3], &[0], &[3]);
        assert_eq!(evens.strides(), &[3]);
        assert_eq!(evens.ravel(&[2]), 7);
        assert_eq!(evens.span(), 8);
    }
}
