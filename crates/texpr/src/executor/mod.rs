//! Executors decide where expressions run.
//!
//! Every executor wraps an [`ExecContext`]: the backend, the plan cache, the scratch allocator,
//! the ordering stream and the configuration. The executor type additionally carries a
//! compile-time kind ([`Executor::KIND`]) so that transforms which cannot run on the host are
//! rejected when the expression is instantiated rather than when it runs.

pub mod alloc;
pub mod stream;

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::Serialize;

use crate::backend::plan::PlanCache;
use crate::backend::spec::Backend;
use crate::error::ExprResult;
use crate::tensor::Placement;

pub use alloc::{AllocStats, Allocator, DefaultAllocator, Reservation, ScratchLease};
pub use stream::{Milestone, Stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExecutorKind {
    /// Runs on the calling thread; results are visible as soon as `assign` returns.
    Host,
    /// Runs asynchronously on an ordered stream; host reads require `synchronize`.
    Stream,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorKind::Host => f.write_str("host"),
            ExecutorKind::Stream => f.write_str("stream"),
        }
    }
}

/// Tunables applied to an execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecConfig {
    /// LRU bound for the context's own plan cache; `None` keeps every plan.
    pub plan_cache_capacity: Option<NonZeroUsize>,
    /// Synchronize the stream at the end of every assignment.
    pub sync_after_assign: bool,
}

impl ExecConfig {
    /// Reads `TEXPR_PLAN_CACHE_CAPACITY` and `TEXPR_SYNC`.
    pub fn from_env() -> Self {
        ExecConfig {
            plan_cache_capacity: crate::env::plan_cache_capacity(),
            sync_after_assign: crate::env::sync_after_assign(),
        }
    }
}

/// Everything an executor needs to resolve and dispatch expressions.
pub struct ExecContext<B: Backend> {
    backend: Arc<B>,
    plans: Arc<PlanCache<B::Plan>>,
    allocator: Arc<dyn Allocator>,
    stream: Stream,
    config: ExecConfig,
}

impl<B: Backend> ExecContext<B> {
    /// Context configured from the environment with a private plan cache.
    pub fn new(backend: Arc<B>, stream: Stream) -> Self {
        Self::with_config(backend, stream, ExecConfig::from_env())
    }

    pub fn with_config(backend: Arc<B>, stream: Stream, config: ExecConfig) -> Self {
        ExecContext {
            backend,
            plans: Arc::new(PlanCache::new(config.plan_cache_capacity)),
            allocator: Arc::new(DefaultAllocator::new()),
            stream,
            config,
        }
    }

    /// Shares `plans` with other contexts instead of the private cache.
    pub fn with_plan_cache(mut self, plans: Arc<PlanCache<B::Plan>>) -> Self {
        self.plans = plans;
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn plans(&self) -> &Arc<PlanCache<B::Plan>> {
        &self.plans
    }

    pub fn allocator(&self) -> &dyn Allocator {
        self.allocator.as_ref()
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }
}

/// Execution target for expressions.
pub trait Executor {
    type Backend: Backend;

    /// Statically known kind, or `None` when the kind is chosen at run time.
    const KIND: Option<ExecutorKind>;

    fn kind(&self) -> ExecutorKind;

    fn context(&self) -> &ExecContext<Self::Backend>;

    fn stream(&self) -> &Stream {
        self.context().stream()
    }

    /// Placement used for scratch buffers allocated on behalf of this executor.
    fn placement(&self) -> Placement {
        match self.kind() {
            ExecutorKind::Host => Placement::Host,
            ExecutorKind::Stream => Placement::DeviceAsync,
        }
    }

    /// Waits for all enqueued work and reports the first failure, if any.
    fn synchronize(&self) -> ExprResult<()> {
        self.stream().synchronize()
    }
}

macro_rules! context_builders {
    ($ty:ident) => {
        impl<B: Backend> $ty<B> {
            pub fn from_context(context: ExecContext<B>) -> Self {
                $ty { context }
            }

            pub fn with_plan_cache(self, plans: Arc<PlanCache<B::Plan>>) -> Self {
                $ty {
                    context: self.context.with_plan_cache(plans),
                }
            }

            pub fn with_allocator(self, allocator: Arc<dyn Allocator>) -> Self {
                $ty {
                    context: self.context.with_allocator(allocator),
                }
            }
        }
    };
}

/// Runs everything inline on the calling thread.
pub struct HostExecutor<B: Backend> {
    context: ExecContext<B>,
}

impl<B: Backend> HostExecutor<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::from_context(ExecContext::new(backend, Stream::inline()))
    }

    pub fn with_config(backend: Arc<B>, config: ExecConfig) -> Self {
        Self::from_context(ExecContext::with_config(backend, Stream::inline(), config))
    }
}

context_builders!(HostExecutor);

impl<B: Backend> Executor for HostExecutor<B> {
    type Backend = B;
    const KIND: Option<ExecutorKind> = Some(ExecutorKind::Host);

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Host
    }

    fn context(&self) -> &ExecContext<B> {
        &self.context
    }
}

/// Runs work asynchronously, in order, on a dedicated stream.
pub struct StreamExecutor<B: Backend> {
    context: ExecContext<B>,
}

impl<B: Backend> StreamExecutor<B> {
    pub fn new(backend: Arc<B>, name: &str) -> Self {
        Self::from_context(ExecContext::new(backend, Stream::spawn(name)))
    }

    pub fn with_config(backend: Arc<B>, name: &str, config: ExecConfig) -> Self {
        Self::from_context(ExecContext::with_config(backend, Stream::spawn(name), config))
    }
}

context_builders!(StreamExecutor);

impl<B: Backend> Executor for StreamExecutor<B> {
    type Backend = B;
    const KIND: Option<ExecutorKind> = Some(ExecutorKind::Stream);

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Stream
    }

    fn context(&self) -> &ExecContext<B> {
        &self.context
    }
}

/// Executor whose kind is only known at run time.
///
/// Stream-only transforms handed an `AnyExecutor::Host` fail with `UnsupportedExecutor` when
/// they are resolved.
pub enum AnyExecutor<B: Backend> {
    Host(HostExecutor<B>),
    Stream(StreamExecutor<B>),
}

impl<B: Backend> Executor for AnyExecutor<B> {
    type Backend = B;
    const KIND: Option<ExecutorKind> = None;

    fn kind(&self) -> ExecutorKind {
        match self {
            AnyExecutor::Host(_) => ExecutorKind::Host,
            AnyExecutor::Stream(_) => ExecutorKind::Stream,
        }
    }

    fn context(&self) -> &ExecContext<B> {
        match self {
            AnyExecutor::Host(exec) => exec.context(),
            AnyExecutor::Stream(exec) => exec.context(),
        }
    }
}

impl<B: Backend> From<HostExecutor<B>> for AnyExecutor<B> {
    fn from(exec: HostExecutor<B>) -> Self {
        AnyExecutor::Host(exec)
    }
}

impl<B: Backend> From<StreamExecutor<B>> for AnyExecutor<B> {
    fn from(exec: StreamExecutor<B>) -> Self {
        AnyExecutor::Stream(exec)
    }
}
