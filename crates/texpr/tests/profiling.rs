#![cfg(feature = "profiler")]

use std::sync::Arc;

use anyhow::Result;
use texpr::profiling;
use texpr::{assign, matmul, Executor, HostExecutor, OperatorExt, StreamExecutor, TensorView};
use texpr_backend_ref_cpu::CpuBackend;

fn count(counters: &[(&'static str, profiling::CounterSnapshot)], name: &str) -> u64 {
    counters
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, snapshot)| snapshot.count)
        .unwrap_or(0)
}

#[test]
fn plan_cache_and_backend_scopes_are_counted() -> Result<()> {
    profiling::take_counters();

    let exec = StreamExecutor::new(Arc::new(CpuBackend::new()), "profiled");
    let a = TensorView::full([2, 2], 1.0f32);
    let out = TensorView::<f32, 2>::zeros([2, 2]);
    for _ in 0..3 {
        assign(&out, matmul(&a, &a)?.add(&a)?, &exec)?;
    }
    exec.synchronize()?;

    let host = HostExecutor::new(Arc::new(CpuBackend::new()));
    assign(&out, a.scale(3.0), &host)?;

    let counters = profiling::take_counters();
    assert_eq!(count(&counters, "plan_cache_miss"), 1);
    assert_eq!(count(&counters, "plan_cache_hit"), 2);
    assert_eq!(count(&counters, "matmul"), 3);
    assert_eq!(count(&counters, "fused_kernel"), 4);
    assert!(profiling::take_counters().is_empty());
    Ok(())
}
