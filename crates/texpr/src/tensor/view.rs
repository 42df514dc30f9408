use crate::error::{ExprError, ExprResult};
use crate::ops::{check_index, Operator};
use crate::tensor::{Buffer, Element, Layout, Placement, Shape, StridedBuffer};

/// Memory-backed leaf operator of rank `R`.
///
/// Clones share storage, so a view can be used both inside expressions and as an assignment
/// destination.
#[derive(Debug, Clone)]
pub struct TensorView<T: Element, const R: usize> {
    storage: StridedBuffer<T>,
}

impl<T: Element, const R: usize> TensorView<T, R> {
    /// Wraps row-major host data.
    pub fn from_vec(dims: [usize; R], data: Vec<T>) -> ExprResult<Self> {
        Self::from_vec_on(dims, data, Placement::Host)
    }

    pub fn from_vec_on(dims: [usize; R], data: Vec<T>, placement: Placement) -> ExprResult<Self> {
        let shape = Shape::new(dims);
        if data.len() != shape.num_elements() {
            return Err(ExprError::shape_mismatch(
                "tensor",
                &[shape.num_elements()],
                &[data.len()],
            ));
        }
        Ok(TensorView {
            storage: StridedBuffer::new(Buffer::from_vec(data, placement), Layout::contiguous(shape)),
        })
    }

    pub fn full(dims: [usize; R], value: T) -> Self {
        let shape = Shape::new(dims);
        let data = vec![value; shape.num_elements()];
        TensorView {
            storage: StridedBuffer::new(Buffer::from_vec(data, Placement::Host), Layout::contiguous(shape)),
        }
    }

    pub fn zeros(dims: [usize; R]) -> Self {
        Self::full(dims, T::zero())
    }

    /// Views an existing buffer through `layout`.
    pub fn from_buffer(buffer: Buffer<T>, layout: Layout) -> ExprResult<Self> {
        if layout.shape().rank() != R {
            return Err(ExprError::invalid_dim(
                "tensor",
                format!("layout has rank {} but the view has rank {R}", layout.shape().rank()),
            ));
        }
        let len = buffer.len();
        if layout.span() > len {
            return Err(ExprError::out_of_range("tensor", "layout span", layout.span(), len));
        }
        Ok(TensorView {
            storage: StridedBuffer::new(buffer, layout),
        })
    }

    pub fn buffer(&self) -> &Buffer<T> {
        &self.storage.buffer
    }

    pub fn layout(&self) -> &Layout {
        &self.storage.layout
    }

    pub fn dims(&self) -> [usize; R] {
        let mut dims = [0; R];
        dims.copy_from_slice(self.storage.layout.shape().dims());
        dims
    }

    /// Reads one element. On a stream executor, synchronize first.
    pub fn get(&self, index: [usize; R]) -> ExprResult<T> {
        self.at(&index)
    }

    /// Copies the viewed elements out in row-major order.
    pub fn to_vec(&self) -> Vec<T> {
        self.storage.gather()
    }
}

impl<T: Element> TensorView<T, 0> {
    pub fn scalar(value: T) -> Self {
        Self::full([], value)
    }

    pub fn value(&self) -> T {
        self.storage.load(&[])
    }
}

impl<T: Element, const R: usize> Operator for TensorView<T, R> {
    type Elem = T;
    const RANK: usize = R;

    fn name(&self) -> String {
        format!("tensor#{}", self.storage.buffer.id())
    }

    fn shape(&self) -> &Shape {
        self.storage.layout.shape()
    }

    fn at(&self, index: &[usize]) -> ExprResult<T> {
        check_index(self, index)?;
        Ok(self.storage.load(index))
    }

    fn strided(&self) -> Option<StridedBuffer<T>> {
        Some(self.storage.clone())
    }
}
