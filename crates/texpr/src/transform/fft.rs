use crate::backend::spec::TransformOp;
use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::rank::MinRank;
use crate::ops::Operator;
use crate::tensor::shape::Dims;
use crate::tensor::Shape;
use crate::transform::{Operands, Transform, TransformOutput};

/// Number of non-redundant bins in the spectrum of a real signal of length `n`.
pub fn spectrum_bins(n: usize) -> usize {
    n / 2 + 1
}

/// Forward DFT of real signals along the last dimension.
///
/// A signal of length `n` yields the `n / 2 + 1` non-negative frequency bins. Complex values are
/// stored as `[re, im]` pairs in a new trailing dimension, so `[.., n]` becomes
/// `[.., n / 2 + 1, 2]`. The forward transform is unnormalized.
#[derive(Clone)]
pub struct Rfft<A: Operator> {
    input: A,
    shape: Shape,
}

pub fn rfft<A: Operator>(a: &A) -> ExprResult<TransformOutput<Rfft<A>>> {
    let () = MinRank::<A, 1>::CHECK;
    let dims = a.shape().dims();
    let n = dims[A::RANK - 1];
    if n == 0 {
        return Err(ExprError::invalid_dim(
            format!("rfft({})", a.name()),
            "signal length must be positive",
        ));
    }
    let mut out = Dims::from_slice(&dims[..A::RANK - 1]);
    out.push(spectrum_bins(n));
    out.push(2);
    Ok(TransformOutput::new(Rfft {
        input: a.clone(),
        shape: Shape::new(out),
    }))
}

impl<A: Operator> Transform for Rfft<A> {
    type Elem = A::Elem;
    const RANK: usize = A::RANK + 1;
    const STREAM_ONLY: bool = false;

    fn name(&self) -> String {
        format!("rfft({})", self.input.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn op(&self) -> TransformOp {
        TransformOp::Rfft
    }

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>> {
        let mut operands = Operands::default();
        operands.push(&mut self.input, exec, schedule)?;
        Ok(operands)
    }
}

/// Inverse of [`rfft`]: `[.., n / 2 + 1, 2]` spectra back to real signals of length `len`.
///
/// The result is scaled by `1 / len`, so `irfft(rfft(x), n)` reproduces `x`. The imaginary parts
/// of the zero and (for even `len`) Nyquist bins are ignored.
#[derive(Clone)]
pub struct Irfft<A: Operator> {
    input: A,
    shape: Shape,
}

pub fn irfft<A: Operator>(a: &A, len: usize) -> ExprResult<TransformOutput<Irfft<A>>> {
    let () = MinRank::<A, 2>::CHECK;
    let name = || format!("irfft({})", a.name());
    if len == 0 {
        return Err(ExprError::invalid_dim(name(), "signal length must be positive"));
    }
    let dims = a.shape().dims();
    let rank = A::RANK;
    let mut expected = Dims::from_slice(&dims[..rank - 2]);
    expected.push(spectrum_bins(len));
    expected.push(2);
    if dims != expected.as_slice() {
        return Err(ExprError::shape_mismatch(name(), &expected, dims));
    }
    let mut out = Dims::from_slice(&dims[..rank - 2]);
    out.push(len);
    Ok(TransformOutput::new(Irfft {
        input: a.clone(),
        shape: Shape::new(out),
    }))
}

impl<A: Operator> Transform for Irfft<A> {
    type Elem = A::Elem;
    const RANK: usize = A::RANK - 1;
    const STREAM_ONLY: bool = false;

    fn name(&self) -> String {
        format!("irfft({})", self.input.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn op(&self) -> TransformOp {
        TransformOp::Irfft
    }

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>> {
        let mut operands = Operands::default();
        operands.push(&mut self.input, exec, schedule)?;
        Ok(operands)
    }
}
