use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use anyhow::Result;
use texpr::backend::plan::{PlanCache, PlanOutcome};
use texpr::backend::spec::{BackendError, BackendResult, PlanSignature, TransformCall};
use texpr::{
    assign, cumsum, matmul, Backend, Element, ExecConfig, Executor, ExprError, HostExecutor,
    OperatorExt, StreamExecutor, TensorView,
};
use texpr_backend_ref_cpu::{CpuBackend, CpuPlan};

/// Live and peak plan counts per first-operand dims.
#[derive(Default)]
struct LivePlans {
    counts: Mutex<HashMap<Vec<usize>, (usize, usize)>>,
}

impl LivePlans {
    fn created(&self, key: &[usize]) {
        let mut counts = self.counts.lock().expect("live plan counts poisoned");
        let (live, peak) = counts.entry(key.to_vec()).or_default();
        *live += 1;
        *peak = (*peak).max(*live);
    }

    fn dropped(&self, key: &[usize]) {
        let mut counts = self.counts.lock().expect("live plan counts poisoned");
        if let Some((live, _)) = counts.get_mut(key) {
            *live -= 1;
        }
    }

    fn peak(&self, key: &[usize]) -> usize {
        let counts = self.counts.lock().expect("live plan counts poisoned");
        counts.get(key).map_or(0, |&(_, peak)| peak)
    }
}

struct TrackedPlan {
    inner: CpuPlan,
    key: Vec<usize>,
    live: Arc<LivePlans>,
}

impl Drop for TrackedPlan {
    fn drop(&mut self) {
        self.live.dropped(&self.key);
    }
}

struct CountingBackend {
    inner: CpuBackend,
    prepares: AtomicUsize,
    executes: AtomicUsize,
    live: Arc<LivePlans>,
}

impl CountingBackend {
    fn new() -> Self {
        CountingBackend {
            inner: CpuBackend::new(),
            prepares: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            live: Arc::new(LivePlans::default()),
        }
    }

    fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }
}

impl Backend for CountingBackend {
    type Plan = TrackedPlan;

    fn backend_name(&self) -> &str {
        "cpu-counting"
    }

    fn prepare(&self, signature: &PlanSignature) -> BackendResult<TrackedPlan> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.prepare(signature)?;
        let key = signature.input_operands()[0].dims.clone();
        self.live.created(&key);
        Ok(TrackedPlan {
            inner,
            key,
            live: Arc::clone(&self.live),
        })
    }

    fn execute<T: Element>(
        &self,
        plan: &TrackedPlan,
        call: TransformCall<'_, '_, T>,
    ) -> BackendResult<()> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(&plan.inner, call)
    }
}

fn square(n: usize, value: f32) -> TensorView<f32, 2> {
    TensorView::full([n, n], value)
}

#[test]
fn identical_signatures_prepare_once() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let exec = StreamExecutor::new(Arc::clone(&backend), "plans");
    let out = square(3, 0.0);

    let first = assign(&out, matmul(&square(3, 1.0), &square(3, 2.0))?, &exec)?;
    let second = assign(&out, matmul(&square(3, 3.0), &square(3, 4.0))?, &exec)?;
    exec.synchronize()?;

    assert_eq!(first.plan_misses(), 1);
    assert_eq!(second.plan_misses(), 0);
    assert_eq!(second.work()[0].plan, PlanOutcome::Hit);
    assert_eq!(first.work()[0].fingerprint, second.work()[0].fingerprint);
    assert_eq!(backend.prepares(), 1);
    assert_eq!(backend.executes(), 2);
    assert_eq!(out.to_vec(), vec![36.0; 9]);

    let stats = exec.context().plans().stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    Ok(())
}

#[test]
fn operand_strides_are_part_of_the_signature() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let exec = StreamExecutor::new(Arc::clone(&backend), "strides");
    let a = TensorView::from_vec([2, 2], vec![1.0f32, 2.0, 3.0, 4.0])?;
    let out = square(2, 0.0);

    assign(&out, matmul(&a, &a)?, &exec)?;
    let transposed = assign(&out, matmul(&a.transpose()?, &a)?, &exec)?;
    exec.synchronize()?;

    assert_eq!(transposed.plan_misses(), 1);
    assert_eq!(backend.prepares(), 2);
    assert_eq!(out.to_vec(), vec![10.0, 14.0, 14.0, 20.0]);
    Ok(())
}

#[test]
fn executor_kind_is_part_of_the_signature() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let plans = Arc::new(PlanCache::unbounded());
    let host = HostExecutor::new(Arc::clone(&backend)).with_plan_cache(Arc::clone(&plans));
    let stream =
        StreamExecutor::new(Arc::clone(&backend), "kinds").with_plan_cache(Arc::clone(&plans));
    let a = TensorView::from_vec([4], vec![1.0f32, 1.0, 1.0, 1.0])?;
    let out = TensorView::<f32, 1>::zeros([4]);

    assign(&out, cumsum(&a)?, &host)?;
    assign(&out, cumsum(&a)?, &stream)?;
    stream.synchronize()?;

    assert_eq!(backend.prepares(), 2);
    assert_eq!(plans.len(), 2);
    Ok(())
}

#[test]
fn concurrent_executors_share_one_plan() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let plans = Arc::new(PlanCache::unbounded());

    thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let backend = Arc::clone(&backend);
                let plans = Arc::clone(&plans);
                scope.spawn(move || -> Result<Vec<f32>> {
                    let exec = StreamExecutor::new(backend, &format!("worker-{t}"))
                        .with_plan_cache(plans);
                    let out = square(4, 0.0);
                    assign(&out, matmul(&square(4, t as f32), &square(4, 1.0))?, &exec)?;
                    exec.synchronize()?;
                    Ok(out.to_vec())
                })
            })
            .collect();
        for (t, handle) in handles.into_iter().enumerate() {
            let values = handle.join().map_err(|_| anyhow::anyhow!("worker {t} panicked"))??;
            assert_eq!(values, vec![4.0 * t as f32; 16]);
        }
        Ok(())
    })?;

    assert_eq!(backend.prepares(), 1);
    assert_eq!(backend.executes(), 8);
    assert_eq!(plans.stats().misses, 1);
    assert_eq!(plans.stats().hits, 7);
    Ok(())
}

#[test]
fn bounded_cache_evicts_least_recently_used() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let config = ExecConfig {
        plan_cache_capacity: NonZeroUsize::new(1),
        ..ExecConfig::default()
    };
    let exec = StreamExecutor::with_config(Arc::clone(&backend), "bounded", config);

    // Each call has finished before the next one, so evicted plans are really gone.
    for n in [2, 3, 2] {
        let out = square(n, 0.0);
        assign(&out, matmul(&square(n, 1.0), &square(n, 1.0))?, &exec)?;
        exec.synchronize()?;
    }

    let stats = exec.context().plans().stats();
    assert_eq!(backend.prepares(), 3);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.evictions, 2);
    assert_eq!(stats.entries, 1);
    assert_eq!(exec.context().plans().retired(), 0);
    Ok(())
}

#[test]
fn evicted_plan_still_queued_is_reused() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let config = ExecConfig {
        plan_cache_capacity: NonZeroUsize::new(1),
        ..ExecConfig::default()
    };
    let exec = StreamExecutor::with_config(Arc::clone(&backend), "bounded-gated", config);

    let (release, gate) = mpsc::channel::<()>();
    exec.stream().enqueue(move || {
        gate.recv().map_err(|_| ExprError::Backend(BackendError::execution("gate dropped")))
    })?;

    let outputs: Vec<_> = [2, 3, 2].into_iter().map(|n| square(n, 0.0)).collect();
    for (out, n) in outputs.iter().zip([2, 3, 2]) {
        assign(out, matmul(&square(n, 1.0), &square(n, 1.0))?, &exec)?;
    }
    assert_eq!(exec.context().plans().retired(), 1);

    release.send(())?;
    exec.synchronize()?;

    let stats = exec.context().plans().stats();
    assert_eq!(backend.prepares(), 2);
    assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 2, 2));
    assert_eq!(backend.live.peak(&[2, 2]), 1);
    assert_eq!(backend.live.peak(&[3, 3]), 1);
    assert_eq!(outputs[0].to_vec(), vec![2.0; 4]);
    assert_eq!(outputs[1].to_vec(), vec![3.0; 9]);
    Ok(())
}

#[test]
fn sync_after_assign_makes_results_visible() -> Result<()> {
    let config = ExecConfig {
        sync_after_assign: true,
        ..ExecConfig::default()
    };
    let exec = StreamExecutor::with_config(Arc::new(CountingBackend::new()), "sync", config);
    let out = square(2, 0.0);
    assign(&out, matmul(&square(2, 1.0), &square(2, 1.0))?.scale(0.5), &exec)?;
    assert_eq!(out.to_vec(), vec![1.0; 4]);
    Ok(())
}
