//! Transform operators: nodes that need a backend call and a materialized result.
//!
//! A transform moves through [`TransformState`] during `pre_run`. It first resolves its operands
//! (running their own `pre_run` and materializing any operand that is not memory-backed into
//! scratch), then allocates its result buffer, then acquires a plan and enqueues the backend
//! call. Only after that can it be indexed, and only by work ordered after the call.

pub mod contract;
pub mod conv;
pub mod cov;
pub mod cumsum;
pub mod fft;
pub mod matmul;
pub mod qr;
pub mod trace;

use std::sync::Arc;

use smallvec::SmallVec;

use crate::backend::spec::{
    Backend, PlanSignature, StridedMut, StridedRef, TransformCall, TransformOp,
};
use crate::error::{ExprError, ExprResult};
use crate::executor::{Executor, ExecutorKind, ScratchLease};
use crate::ops::assign::{launch_fused, Schedule, ScheduledWork};
use crate::ops::rank::HostCapable;
use crate::ops::{check_index, Operator};
use crate::tensor::{Buffer, Element, Layout, Shape, StridedBuffer};

pub use contract::{contract, Contract};
pub use conv::{conv1d, Conv1d, ConvMode};
pub use cov::{cov, Cov};
pub use cumsum::{cumsum, CumSum};
pub use fft::{irfft, rfft, Irfft, Rfft};
pub use matmul::{matmul, matmul_axes, matmul_axes_scaled, matmul_scaled, MatMul};
pub use qr::{qr, qr_packed, Qr, QrPacked};
pub use trace::{trace, Trace};

/// Lifecycle of a transform within one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformState {
    Constructed,
    ShapeResolved,
    ScratchBound,
    Dispatched,
}

/// Operands of a transform after resolution.
///
/// Leases for materialized operands are dropped once the transform has been dispatched, which
/// defers their release until the stream has run the backend call.
pub struct Operands<T: Element> {
    inputs: SmallVec<[StridedBuffer<T>; 2]>,
    leases: SmallVec<[ScratchLease<T>; 2]>,
}

impl<T: Element> Default for Operands<T> {
    fn default() -> Self {
        Operands {
            inputs: SmallVec::new(),
            leases: SmallVec::new(),
        }
    }
}

impl<T: Element> Operands<T> {
    /// Resolves `operand` and appends its storage.
    pub fn push<Op, E>(&mut self, operand: &mut Op, exec: &E, schedule: &mut Schedule) -> ExprResult<()>
    where
        Op: Operator<Elem = T>,
        E: Executor,
    {
        operand.pre_run(exec, schedule)?;
        if let Some(strided) = operand.strided() {
            self.inputs.push(strided);
            return Ok(());
        }
        let ctx = exec.context();
        let lease = ScratchLease::allocate(ctx.allocator(), operand.shape(), exec.placement(), exec.stream())?;
        tracing::trace!(operand = %operand.name(), "materializing operand into scratch");
        launch_fused(lease.strided(), operand.clone(), exec.stream())?;
        schedule.record_kernel();
        self.inputs.push(lease.strided());
        self.leases.push(lease);
        Ok(())
    }

    /// Re-views input `index` through a permutation of its dimensions.
    pub fn permute_input(&mut self, index: usize, perm: &[usize]) {
        let input = &mut self.inputs[index];
        input.layout = input.layout.permute(perm);
    }

    pub fn inputs(&self) -> &[StridedBuffer<T>] {
        &self.inputs
    }

    /// Number of operands that had to be materialized into scratch.
    pub fn materialized(&self) -> usize {
        self.leases.len()
    }
}

/// Analytic description of a single-output transform.
pub trait Transform: Clone + Send + Sync + 'static {
    type Elem: Element;
    const RANK: usize;

    /// Whether the transform can only run on a stream executor.
    const STREAM_ONLY: bool;

    fn name(&self) -> String;

    /// Output shape, known from construction.
    fn shape(&self) -> &Shape;

    fn op(&self) -> TransformOp;

    fn resolve<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<Operands<Self::Elem>>;

    /// Layout through which the backend writes the contiguous result buffer.
    fn output_layout(&self, result: &Layout) -> Layout {
        result.clone()
    }
}

/// Operator wrapper owning a transform's result.
///
/// Clones share the result once it has been dispatched.
#[derive(Clone)]
pub struct TransformOutput<X: Transform> {
    transform: X,
    state: TransformState,
    result: Option<Arc<ScratchLease<X::Elem>>>,
}

impl<X: Transform> TransformOutput<X> {
    pub fn new(transform: X) -> Self {
        TransformOutput {
            transform,
            state: TransformState::Constructed,
            result: None,
        }
    }

    pub fn state(&self) -> TransformState {
        self.state
    }

    pub fn transform(&self) -> &X {
        &self.transform
    }
}

impl<X: Transform> Operator for TransformOutput<X> {
    type Elem = X::Elem;
    const RANK: usize = X::RANK;

    fn name(&self) -> String {
        self.transform.name()
    }

    fn shape(&self) -> &Shape {
        self.transform.shape()
    }

    fn at(&self, index: &[usize]) -> ExprResult<X::Elem> {
        let result = match (&self.result, self.state) {
            (Some(result), TransformState::Dispatched) => result,
            _ => {
                return Err(ExprError::invalid_assignment(
                    self.name(),
                    "transform read before it was dispatched",
                ))
            }
        };
        check_index(self, index)?;
        Ok(result.buffer().read()[result.layout().ravel(index)])
    }

    fn pre_run<E: Executor>(&mut self, exec: &E, schedule: &mut Schedule) -> ExprResult<()> {
        if self.state == TransformState::Dispatched {
            return Ok(());
        }
        let () = HostCapable::<X, E>::CHECK;
        if X::STREAM_ONLY && exec.kind() == ExecutorKind::Host {
            return Err(ExprError::unsupported_executor(self.name(), ExecutorKind::Host));
        }

        let operands = self.transform.resolve(exec, schedule)?;
        self.state = TransformState::ShapeResolved;
        tracing::trace!(
            op = %self.name(),
            materialized = operands.materialized(),
            "resolved transform operands"
        );

        let ctx = exec.context();
        let lease = ScratchLease::allocate(ctx.allocator(), self.transform.shape(), exec.placement(), exec.stream())?;
        self.state = TransformState::ScratchBound;

        let output = StridedBuffer::new(lease.buffer().clone(), self.transform.output_layout(lease.layout()));
        dispatch(
            exec,
            schedule,
            &self.name(),
            self.transform.op(),
            self.transform.shape(),
            operands.inputs(),
            vec![output],
        )?;
        self.result = Some(Arc::new(lease));
        self.state = TransformState::Dispatched;
        drop(operands);
        Ok(())
    }

    fn strided(&self) -> Option<StridedBuffer<X::Elem>> {
        match (&self.result, self.state) {
            (Some(result), TransformState::Dispatched) => Some(result.strided()),
            _ => None,
        }
    }
}

/// Acquires a plan for the call and enqueues it on the executor's stream.
pub(crate) fn dispatch<T: Element, E: Executor>(
    exec: &E,
    schedule: &mut Schedule,
    name: &str,
    op: TransformOp,
    shape: &Shape,
    inputs: &[StridedBuffer<T>],
    outputs: Vec<StridedBuffer<T>>,
) -> ExprResult<()> {
    for (i, output) in outputs.iter().enumerate() {
        if inputs.iter().any(|input| input.buffer.same(&output.buffer)) {
            return Err(ExprError::invalid_assignment(name, "an output aliases an input"));
        }
        if outputs[..i].iter().any(|other| other.buffer.same(&output.buffer)) {
            return Err(ExprError::invalid_assignment(name, "two outputs share a buffer"));
        }
    }

    let signature = {
        let input_layouts: SmallVec<[&Layout; 2]> = inputs.iter().map(|input| &input.layout).collect();
        let output_layouts: SmallVec<[&Layout; 2]> = outputs.iter().map(|output| &output.layout).collect();
        PlanSignature::new(op.clone(), T::DTYPE, exec.kind(), &input_layouts, &output_layouts)
    };

    let ctx = exec.context();
    let backend = Arc::clone(ctx.backend());
    let (plan, outcome) = ctx.plans().acquire(&signature, |sig| backend.prepare(sig))?;
    let fingerprint = signature.fingerprint()?;
    tracing::debug!(
        op = name,
        backend = backend.backend_name(),
        ?outcome,
        fingerprint,
        "dispatching transform"
    );
    schedule.record_transform(ScheduledWork {
        op: name.to_string(),
        shape: shape.clone(),
        plan: outcome,
        fingerprint,
    });

    let inputs = inputs.to_vec();
    exec.stream().enqueue(move || {
        let _scope = crate::profiling::backend_scope(op.name());
        execute(backend.as_ref(), &*plan, &op, &inputs, &outputs)
    })
}

/// Locks operand storage and runs the backend.
///
/// Each distinct input buffer is read-locked once even when several inputs view it.
fn execute<B: Backend, T: Element>(
    backend: &B,
    plan: &B::Plan,
    op: &TransformOp,
    inputs: &[StridedBuffer<T>],
    outputs: &[StridedBuffer<T>],
) -> ExprResult<()> {
    let mut distinct: Vec<&Buffer<T>> = Vec::new();
    let mut slots = Vec::with_capacity(inputs.len());
    for input in inputs {
        let slot = match distinct.iter().position(|buffer| buffer.same(&input.buffer)) {
            Some(slot) => slot,
            None => {
                distinct.push(&input.buffer);
                distinct.len() - 1
            }
        };
        slots.push(slot);
    }

    let read_guards: Vec<_> = distinct.iter().map(|buffer| buffer.read()).collect();
    let refs: Vec<StridedRef<'_, T>> = inputs
        .iter()
        .zip(&slots)
        .map(|(input, &slot)| StridedRef {
            data: read_guards[slot].as_slice(),
            layout: &input.layout,
        })
        .collect();

    let mut write_guards: Vec<_> = outputs.iter().map(|output| output.buffer.write()).collect();
    let mut muts: Vec<StridedMut<'_, T>> = write_guards
        .iter_mut()
        .zip(outputs)
        .map(|(guard, output)| StridedMut {
            data: guard.as_mut_slice(),
            layout: &output.layout,
        })
        .collect();

    backend.execute(
        plan,
        TransformCall {
            op,
            inputs: &refs,
            outputs: &mut muts,
        },
    )?;
    Ok(())
}
