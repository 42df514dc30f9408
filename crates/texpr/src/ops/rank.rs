//! Compile-time contract checks.
//!
//! Each checker is a zero-sized type whose associated `CHECK` constant fails to evaluate when
//! the contract is broken. Evaluating it with `let () = Checker::<..>::CHECK;` inside a generic
//! function turns the violation into a compile error at the point the function is instantiated.

use std::marker::PhantomData;

use crate::executor::{Executor, ExecutorKind};
use crate::ops::assign::{MultiOutput, OutputSet};
use crate::ops::Operator;
use crate::transform::Transform;

pub(crate) const fn max_rank(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

const fn ranks_equal(a: &[usize], b: &[usize]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn host_allowed(stream_only: bool, kind: Option<ExecutorKind>) -> bool {
    !(stream_only && matches!(kind, Some(ExecutorKind::Host)))
}

/// Elementwise operands must have equal rank unless one of them is a scalar.
pub(crate) struct Conformant<A, B>(PhantomData<(A, B)>);

impl<A: Operator, B: Operator> Conformant<A, B> {
    pub(crate) const CHECK: () = assert!(
        A::RANK == B::RANK || A::RANK == 0 || B::RANK == 0,
        "elementwise operands must have equal rank or be scalars"
    );
}

/// An expression assigned to a destination must match its rank or be a scalar fill.
pub(crate) struct Assignable<D, X>(PhantomData<(D, X)>);

impl<D: Operator, X: Operator> Assignable<D, X> {
    pub(crate) const CHECK: () = assert!(
        X::RANK == D::RANK || X::RANK == 0,
        "assigned expression rank must match the destination rank"
    );
}

/// A slice keeps at most as many dimensions as its child has.
pub(crate) struct SliceRank<Op, const N: usize>(PhantomData<Op>);

impl<Op: Operator, const N: usize> SliceRank<Op, N> {
    pub(crate) const CHECK: () = assert!(
        Op::RANK > 0 && N <= Op::RANK,
        "slice rank must not exceed the rank of the sliced operator"
    );
}

pub(crate) struct ExactRank<Op, const R: usize>(PhantomData<Op>);

impl<Op: Operator, const R: usize> ExactRank<Op, R> {
    pub(crate) const CHECK: () = assert!(Op::RANK == R, "operator has the wrong rank for this transform");
}

pub(crate) struct MinRank<Op, const R: usize>(PhantomData<Op>);

impl<Op: Operator, const R: usize> MinRank<Op, R> {
    pub(crate) const CHECK: () = assert!(Op::RANK >= R, "operator rank is too small for this transform");
}

pub(crate) struct SameRank<A, B>(PhantomData<(A, B)>);

impl<A: Operator, B: Operator> SameRank<A, B> {
    pub(crate) const CHECK: () = assert!(A::RANK == B::RANK, "transform operands must have equal rank");
}

/// Stream-only transforms cannot be instantiated for a statically host executor.
pub(crate) struct HostCapable<X, E>(PhantomData<(X, E)>);

impl<X: Transform, E: Executor> HostCapable<X, E> {
    pub(crate) const CHECK: () = assert!(
        host_allowed(X::STREAM_ONLY, E::KIND),
        "this transform requires a stream executor"
    );
}

pub(crate) struct MultiHostCapable<M, E>(PhantomData<(M, E)>);

impl<M: MultiOutput, E: Executor> MultiHostCapable<M, E> {
    pub(crate) const CHECK: () = assert!(
        host_allowed(M::STREAM_ONLY, E::KIND),
        "this transform requires a stream executor"
    );
}

/// Output bindings must match the transform's outputs one for one, rank for rank.
pub(crate) struct OutputArity<O, M>(PhantomData<(O, M)>);

impl<M: MultiOutput, O: OutputSet<M::Elem>> OutputArity<O, M> {
    pub(crate) const CHECK: () = assert!(
        ranks_equal(O::RANKS, M::OUTPUT_RANKS),
        "output bindings do not match the transform's outputs"
    );
}
