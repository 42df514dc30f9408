//! Assignment: the point where a lazy expression turns into work on a stream.
//!
//! `assign` validates the destination, runs the `materialize` pass (which dispatches every
//! transform in the tree, bottom-up, exactly once) and then enqueues one fused elementwise
//! kernel that writes the destination.

use crate::backend::plan::PlanOutcome;
use crate::error::{ExprError, ExprResult};
use crate::executor::{Executor, ExecutorKind, Stream};
use crate::ops::rank::{Assignable, MultiHostCapable, OutputArity};
use crate::ops::Operator;
use crate::tensor::{Element, Shape, StridedBuffer};

/// One backend call issued while materializing an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledWork {
    pub op: String,
    pub shape: Shape,
    pub plan: PlanOutcome,
    /// Fingerprint of the plan signature, for correlating with logs.
    pub fingerprint: u64,
}

/// Record of the work enqueued by one assignment, in enqueue order.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    work: Vec<ScheduledWork>,
    kernels: usize,
}

impl Schedule {
    pub fn work(&self) -> &[ScheduledWork] {
        &self.work
    }

    /// Names of the dispatched transforms, innermost first.
    pub fn ops(&self) -> Vec<&str> {
        self.work.iter().map(|work| work.op.as_str()).collect()
    }

    pub fn transforms(&self) -> usize {
        self.work.len()
    }

    /// Fused elementwise kernels enqueued, including operand materializations.
    pub fn kernels(&self) -> usize {
        self.kernels
    }

    pub fn plan_misses(&self) -> usize {
        self.work
            .iter()
            .filter(|work| work.plan == PlanOutcome::Miss)
            .count()
    }

    pub(crate) fn record_transform(&mut self, work: ScheduledWork) {
        self.work.push(work);
    }

    pub(crate) fn record_kernel(&mut self) {
        self.kernels += 1;
    }
}

/// Resolves every transform reachable from `expr`.
///
/// After this returns, each transform in the tree has been dispatched and is indexable by work
/// enqueued later on the executor's stream. Running it again is a no-op.
pub fn materialize<X: Operator, E: Executor>(expr: &mut X, exec: &E) -> ExprResult<Schedule> {
    let mut schedule = Schedule::default();
    expr.pre_run(exec, &mut schedule)?;
    Ok(schedule)
}

/// Enqueues a kernel evaluating `expr` at every index of `target`.
///
/// All values are computed before the target is locked, so `expr` may read the buffer it is
/// written into.
pub(crate) fn launch_fused<X: Operator>(
    target: StridedBuffer<X::Elem>,
    expr: X,
    stream: &Stream,
) -> ExprResult<()> {
    tracing::trace!(expr = %expr.name(), dims = ?target.layout.shape().dims(), "launching fused kernel");
    stream.enqueue(move || {
        let _scope = crate::profiling::backend_scope("fused_kernel");
        let layout = &target.layout;
        let mut staged = Vec::with_capacity(layout.shape().num_elements());
        layout.shape().for_each_index(|index| {
            let value = if X::RANK == 0 {
                expr.at(&[])?
            } else {
                expr.at(index)?
            };
            staged.push((layout.ravel(index), value));
            Ok(())
        })?;
        let mut data = target.buffer.write();
        for (offset, value) in staged {
            data[offset] = value;
        }
        Ok(())
    })
}

/// Evaluates `expr` into `dest`.
///
/// Shapes are checked before anything is dispatched. A rank-0 expression fills the whole
/// destination. On a stream executor the write is asynchronous; call `synchronize` before
/// reading `dest` from the host.
pub fn assign<D, X, E>(dest: &D, expr: X, exec: &E) -> ExprResult<Schedule>
where
    D: Operator,
    X: Operator<Elem = D::Elem>,
    E: Executor,
{
    let () = Assignable::<D, X>::CHECK;
    let target = dest.strided().ok_or_else(|| {
        ExprError::invalid_assignment(dest.name(), "destination is not backed by memory")
    })?;
    if X::RANK != 0 && expr.shape() != dest.shape() {
        return Err(ExprError::shape_mismatch(
            expr.name(),
            dest.shape().dims(),
            expr.shape().dims(),
        ));
    }

    let mut expr = expr;
    let mut schedule = materialize(&mut expr, exec)?;
    launch_fused(target, expr, exec.stream())?;
    schedule.record_kernel();

    if exec.context().config().sync_after_assign {
        exec.synchronize()?;
    }
    Ok(schedule)
}

/// A transform producing several outputs at once.
///
/// Multi-output transforms are not operators: they cannot be nested in expressions or indexed,
/// only bound to destinations with [`assign_outputs`] or [`assign_outputs_slice`].
pub trait MultiOutput: Sized {
    type Elem: Element;

    /// Rank of each output, in binding order.
    const OUTPUT_RANKS: &'static [usize];

    const STREAM_ONLY: bool;

    fn name(&self) -> String;

    fn output_shapes(&self) -> Vec<Shape>;

    /// Resolves operands and enqueues the backend call writing `outputs`.
    fn dispatch<E: Executor>(
        self,
        exec: &E,
        outputs: Vec<StridedBuffer<Self::Elem>>,
        schedule: &mut Schedule,
    ) -> ExprResult<()>;
}

/// A fixed set of destinations for a [`MultiOutput`] transform.
pub trait OutputSet<T: Element> {
    const RANKS: &'static [usize];

    fn targets(&self) -> ExprResult<Vec<(Shape, StridedBuffer<T>)>>;
}

fn target_of<D: Operator>(dest: &D) -> ExprResult<(Shape, StridedBuffer<D::Elem>)> {
    let strided = dest.strided().ok_or_else(|| {
        ExprError::invalid_assignment(dest.name(), "output is not backed by memory")
    })?;
    Ok((dest.shape().clone(), strided))
}

impl<'a, P: Operator> OutputSet<P::Elem> for (&'a P,) {
    const RANKS: &'static [usize] = &[P::RANK];

    fn targets(&self) -> ExprResult<Vec<(Shape, StridedBuffer<P::Elem>)>> {
        Ok(vec![target_of(self.0)?])
    }
}

impl<'a, P: Operator, Q: Operator<Elem = P::Elem>> OutputSet<P::Elem> for (&'a P, &'a Q) {
    const RANKS: &'static [usize] = &[P::RANK, Q::RANK];

    fn targets(&self) -> ExprResult<Vec<(Shape, StridedBuffer<P::Elem>)>> {
        Ok(vec![target_of(self.0)?, target_of(self.1)?])
    }
}

impl<'a, P, Q, R> OutputSet<P::Elem> for (&'a P, &'a Q, &'a R)
where
    P: Operator,
    Q: Operator<Elem = P::Elem>,
    R: Operator<Elem = P::Elem>,
{
    const RANKS: &'static [usize] = &[P::RANK, Q::RANK, R::RANK];

    fn targets(&self) -> ExprResult<Vec<(Shape, StridedBuffer<P::Elem>)>> {
        Ok(vec![target_of(self.0)?, target_of(self.1)?, target_of(self.2)?])
    }
}

/// Binds every output of `op` at once.
///
/// The tuple must list one destination per output with matching ranks; anything else fails to
/// compile:
///
/// ```compile_fail
/// use std::sync::Arc;
/// use texpr::{assign_outputs, qr, StreamExecutor, TensorView};
/// use texpr_backend_ref_cpu::CpuBackend;
///
/// let exec = StreamExecutor::new(Arc::new(CpuBackend::new()), "qr");
/// let a = TensorView::<f64, 2>::zeros([3, 3]);
/// let q = TensorView::<f64, 2>::zeros([3, 3]);
/// assign_outputs((&q,), qr(&a).unwrap(), &exec).unwrap();
/// ```
pub fn assign_outputs<O, M, E>(outputs: O, op: M, exec: &E) -> ExprResult<Schedule>
where
    M: MultiOutput,
    O: OutputSet<M::Elem>,
    E: Executor,
{
    let () = OutputArity::<O, M>::CHECK;
    bind_outputs(outputs.targets()?, op, exec)
}

/// Like [`assign_outputs`] for a homogeneous slice of destinations; the count is checked at run
/// time.
pub fn assign_outputs_slice<D, M, E>(outputs: &[D], op: M, exec: &E) -> ExprResult<Schedule>
where
    D: Operator,
    M: MultiOutput<Elem = D::Elem>,
    E: Executor,
{
    if outputs.len() != M::OUTPUT_RANKS.len() {
        return Err(ExprError::invalid_assignment(
            op.name(),
            format!(
                "{} outputs bound but the transform produces {}",
                outputs.len(),
                M::OUTPUT_RANKS.len()
            ),
        ));
    }
    let targets = outputs.iter().map(target_of).collect::<ExprResult<Vec<_>>>()?;
    bind_outputs(targets, op, exec)
}

fn bind_outputs<M: MultiOutput, E: Executor>(
    targets: Vec<(Shape, StridedBuffer<M::Elem>)>,
    op: M,
    exec: &E,
) -> ExprResult<Schedule> {
    let () = MultiHostCapable::<M, E>::CHECK;
    if M::STREAM_ONLY && exec.kind() == ExecutorKind::Host {
        return Err(ExprError::unsupported_executor(op.name(), ExecutorKind::Host));
    }
    for ((shape, _), expected) in targets.iter().zip(op.output_shapes()) {
        if *shape != expected {
            return Err(ExprError::shape_mismatch(op.name(), expected.dims(), shape.dims()));
        }
    }

    let mut schedule = Schedule::default();
    let outputs = targets.into_iter().map(|(_, strided)| strided).collect();
    op.dispatch(exec, outputs, &mut schedule)?;
    if exec.context().config().sync_after_assign {
        exec.synchronize()?;
    }
    Ok(schedule)
}
