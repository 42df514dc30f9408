//! Elementwise expression nodes.
//!
//! These nodes never allocate: `at` evaluates the operands at the same index and combines the
//! results. A rank-0 operand is a scalar and is evaluated at the empty index whatever the
//! requested index is.

use std::fmt;

use crate::error::{ExprError, ExprResult};
use crate::executor::Executor;
use crate::ops::assign::Schedule;
use crate::ops::rank::{max_rank, Conformant};
use crate::ops::{check_index, Operator};
use crate::tensor::{Element, Shape};

fn eval<Op: Operator>(op: &Op, index: &[usize]) -> ExprResult<Op::Elem> {
    if Op::RANK == 0 {
        op.at(&[])
    } else {
        op.at(index)
    }
}

fn broadcast_shape<A: Operator, B: Operator>(op: &str, lhs: &A, rhs: &B) -> ExprResult<Shape> {
    lhs.shape()
        .broadcast(rhs.shape())
        .ok_or_else(|| ExprError::shape_mismatch(op, lhs.shape().dims(), rhs.shape().dims()))
}

/// A constant broadcast to any shape.
#[derive(Debug, Clone)]
pub struct Scalar<T: Element> {
    value: T,
    shape: Shape,
}

impl<T: Element> Scalar<T> {
    pub fn new(value: T) -> Self {
        Scalar {
            value,
            shape: Shape::scalar(),
        }
    }
}

impl<T: Element> Operator for Scalar<T> {
    type Elem = T;
    const RANK: usize = 0;

    fn name(&self) -> String {
        format!("{:?}", self.value)
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn at(&self, index: &[usize]) -> ExprResult<T> {
        check_index(self, index)?;
        Ok(self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

impl BinaryOp {
    pub fn apply<T: Element>(self, a: T, b: T) -> T {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
            BinaryOp::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Max => "max",
            BinaryOp::Min => "min",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Built-in binary arithmetic.
///
/// Operands must have the same rank, or one of them must be a scalar:
///
/// ```compile_fail
/// use texpr::{OperatorExt, TensorView};
///
/// let matrix = TensorView::<f32, 2>::zeros([2, 2]);
/// let vector = TensorView::<f32, 1>::zeros([2]);
/// let sum = matrix.add(&vector);
/// ```
#[derive(Debug, Clone)]
pub struct Binary<A: Operator, B: Operator<Elem = A::Elem>> {
    op: BinaryOp,
    lhs: A,
    rhs: B,
    shape: Shape,
}

impl<A: Operator, B: Operator<Elem = A::Elem>> Binary<A, B> {
    pub fn new(op: BinaryOp, lhs: A, rhs: B) -> ExprResult<Self> {
        let () = Conformant::<A, B>::CHECK;
        let shape = broadcast_shape(op.symbol(), &lhs, &rhs)?;
        Ok(Binary { op, lhs, rhs, shape })
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

impl<A: Operator, B: Operator<Elem = A::Elem>> Operator for Binary<A, B> {
    type Elem = A::Elem;
    const RANK: usize = max_rank(A::RANK, B::RANK);

    fn name(&self) -> String {
        format!("{}({}, {})", self.op, self.lhs.name(), self.rhs.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn at(&self, index: &[usize]) -> ExprResult<A::Elem> {
        check_index(self, index)?;
        let a = eval(&self.lhs, index)?;
        let b = eval(&self.rhs, index)?;
        Ok(self.op.apply(a, b))
    }

    fn pre_run<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<()> {
        self.lhs.pre_run(exec, schedule)?;
        self.rhs.pre_run(exec, schedule)
    }
}

/// Binary node applying a caller-supplied function.
#[derive(Clone)]
pub struct ZipWith<A: Operator, B: Operator<Elem = A::Elem>, F> {
    lhs: A,
    rhs: B,
    f: F,
    shape: Shape,
}

impl<A, B, F> ZipWith<A, B, F>
where
    A: Operator,
    B: Operator<Elem = A::Elem>,
    F: Fn(A::Elem, A::Elem) -> A::Elem + Clone + Send + Sync + 'static,
{
    pub fn new(lhs: A, rhs: B, f: F) -> ExprResult<Self> {
        let () = Conformant::<A, B>::CHECK;
        let shape = broadcast_shape("zip_with", &lhs, &rhs)?;
        Ok(ZipWith { lhs, rhs, f, shape })
    }
}

impl<A, B, F> Operator for ZipWith<A, B, F>
where
    A: Operator,
    B: Operator<Elem = A::Elem>,
    F: Fn(A::Elem, A::Elem) -> A::Elem + Clone + Send + Sync + 'static,
{
    type Elem = A::Elem;
    const RANK: usize = max_rank(A::RANK, B::RANK);

    fn name(&self) -> String {
        format!("zip_with({}, {})", self.lhs.name(), self.rhs.name())
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn at(&self, index: &[usize]) -> ExprResult<A::Elem> {
        check_index(self, index)?;
        let a = eval(&self.lhs, index)?;
        let b = eval(&self.rhs, index)?;
        Ok((self.f)(a, b))
    }

    fn pre_run<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<()> {
        self.lhs.pre_run(exec, schedule)?;
        self.rhs.pre_run(exec, schedule)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp<T> {
    Neg,
    Abs,
    Scale(T),
}

impl<T: Element> UnaryOp<T> {
    pub fn apply(self, value: T) -> T {
        match self {
            UnaryOp::Neg => -value,
            UnaryOp::Abs => {
                if value < T::zero() {
                    -value
                } else {
                    value
                }
            }
            UnaryOp::Scale(factor) => value * factor,
        }
    }
}

/// Built-in unary arithmetic.
#[derive(Debug, Clone)]
pub struct Unary<A: Operator> {
    op: UnaryOp<A::Elem>,
    child: A,
}

impl<A: Operator> Unary<A> {
    pub fn new(op: UnaryOp<A::Elem>, child: A) -> Self {
        Unary { op, child }
    }
}

impl<A: Operator> Operator for Unary<A> {
    type Elem = A::Elem;
    const RANK: usize = A::RANK;

    fn name(&self) -> String {
        match self.op {
            UnaryOp::Neg => format!("neg({})", self.child.name()),
            UnaryOp::Abs => format!("abs({})", self.child.name()),
            UnaryOp::Scale(factor) => format!("scale({}, {factor:?})", self.child.name()),
        }
    }

    fn shape(&self) -> &Shape {
        self.child.shape()
    }

    fn at(&self, index: &[usize]) -> ExprResult<A::Elem> {
        Ok(self.op.apply(self.child.at(index)?))
    }

    fn pre_run<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<()> {
        self.child.pre_run(exec, schedule)
    }
}

/// Unary node applying a caller-supplied function.
#[derive(Clone)]
pub struct Map<A: Operator, F> {
    child: A,
    f: F,
}

impl<A, F> Map<A, F>
where
    A: Operator,
    F: Fn(A::Elem) -> A::Elem + Clone + Send + Sync + 'static,
{
    pub fn new(child: A, f: F) -> Self {
        Map { child, f }
    }
}

impl<A, F> Operator for Map<A, F>
where
    A: Operator,
    F: Fn(A::Elem) -> A::Elem + Clone + Send + Sync + 'static,
{
    type Elem = A::Elem;
    const RANK: usize = A::RANK;

    fn name(&self) -> String {
        format!("map({})", self.child.name())
    }

    fn shape(&self) -> &Shape {
        self.child.shape()
    }

    fn at(&self, index: &[usize]) -> ExprResult<A::Elem> {
        Ok((self.f)(self.child.at(index)?))
    }

    fn pre_run<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<()> {
        self.child.pre_run(exec, schedule)
    }
}
