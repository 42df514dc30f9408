use std::sync::Arc;

use anyhow::Result;
use texpr::backend::spec::BackendError;
use texpr::transform::Operands;
use texpr::{
    assign, contract, conv1d, cov, cumsum, irfft, matmul, matmul_axes, matmul_axes_scaled,
    matmul_scaled, rfft, trace, AnyExecutor, ConvMode, Executor, ExecutorKind, ExprError,
    HostExecutor, Operator, OperatorExt, Schedule, StreamExecutor, TensorView, TransformState,
};
use texpr_backend_ref_cpu::CpuBackend;

fn stream(name: &str) -> StreamExecutor<CpuBackend> {
    StreamExecutor::new(Arc::new(CpuBackend::new()), name)
}

fn host() -> HostExecutor<CpuBackend> {
    HostExecutor::new(Arc::new(CpuBackend::new()))
}

fn iota<const R: usize>(dims: [usize; R], scale: f64) -> Result<TensorView<f64, R>> {
    let len = dims.iter().product::<usize>();
    let data = (0..len).map(|v| v as f64 * scale).collect();
    Ok(TensorView::from_vec(dims, data)?)
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= 1e-9 * e.abs().max(1.0), "element {i}: {a} != {e}");
    }
}

#[test]
fn conv_output_extent_is_known_before_dispatch() -> Result<()> {
    let signal = TensorView::<f32, 4>::zeros([4, 2, 14, 133]);
    let kernel = TensorView::<f32, 4>::zeros([4, 2, 14, 4384]);
    let full = conv1d(&signal, &kernel, ConvMode::Full)?;
    assert_eq!(full.state(), TransformState::Constructed);
    assert_eq!(full.size(3)?, 4516);
    assert_eq!(full.shape().dims(), &[4, 2, 14, 4516]);
    assert_eq!(conv1d(&signal, &kernel, ConvMode::Same)?.size(3)?, 4384);
    assert_eq!(conv1d(&signal, &kernel, ConvMode::Valid)?.size(3)?, 4252);
    Ok(())
}

#[test]
fn conv_modes_crop_the_full_convolution() -> Result<()> {
    let exec = host();
    let signal = TensorView::from_vec([3], vec![1.0f64, 2.0, 3.0])?;
    let kernel = TensorView::from_vec([3], vec![0.0f64, 1.0, 0.5])?;

    let full = TensorView::<f64, 1>::zeros([5]);
    assign(&full, conv1d(&signal, &kernel, ConvMode::Full)?, &exec)?;
    assert_close(&full.to_vec(), &[0.0, 1.0, 2.5, 4.0, 1.5]);

    let same = TensorView::<f64, 1>::zeros([3]);
    assign(&same, conv1d(&signal, &kernel, ConvMode::Same)?, &exec)?;
    assert_close(&same.to_vec(), &[1.0, 2.5, 4.0]);

    let valid = TensorView::<f64, 1>::zeros([1]);
    assign(&valid, conv1d(&signal, &kernel, ConvMode::Valid)?, &exec)?;
    assert_close(&valid.to_vec(), &[2.5]);
    Ok(())
}

#[test]
fn batched_conv_shares_a_rank_one_kernel() -> Result<()> {
    let exec = stream("conv");
    let signal = TensorView::from_vec([2, 3], vec![1.0f64, 2.0, 3.0, 0.0, 1.0, 0.0])?;
    let kernel = TensorView::from_vec([2], vec![1.0f64, -1.0])?;
    let out = TensorView::<f64, 2>::zeros([2, 4]);
    assign(&out, conv1d(&signal, &kernel, ConvMode::Full)?, &exec)?;
    exec.synchronize()?;
    assert_close(&out.to_vec(), &[1.0, 1.0, 1.0, -3.0, 0.0, 1.0, -1.0, 0.0]);

    let mismatched = TensorView::<f64, 2>::zeros([3, 2]);
    assert!(matches!(
        conv1d(&signal, &mismatched, ConvMode::Full).err(),
        Some(ExprError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn matmul_multiplies_trailing_matrices() -> Result<()> {
    let exec = stream("matmul");
    let a = TensorView::from_vec([2, 3], vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    let b = TensorView::from_vec([3, 2], vec![7.0f64, 8.0, 9.0, 10.0, 11.0, 12.0])?;
    let out = TensorView::<f64, 2>::zeros([2, 2]);
    let schedule = assign(&out, matmul(&a, &b)?, &exec)?;
    exec.synchronize()?;
    assert_close(&out.to_vec(), &[58.0, 64.0, 139.0, 154.0]);
    assert_eq!(schedule.transforms(), 1);
    assert_eq!(schedule.plan_misses(), 1);

    let scaled = TensorView::<f64, 2>::zeros([2, 2]);
    assign(&scaled, matmul_scaled(&a, &b, 2.0, 0.5)?, &exec)?;
    exec.synchronize()?;
    assert_close(&scaled.to_vec(), &[116.0, 128.0, 278.0, 308.0]);

    let transposed = TensorView::<f64, 2>::zeros([3, 3]);
    assign(&transposed, matmul(&a.transpose()?, &a)?, &exec)?;
    exec.synchronize()?;
    assert_close(
        &transposed.to_vec(),
        &[17.0, 22.0, 27.0, 22.0, 29.0, 36.0, 27.0, 36.0, 45.0],
    );
    Ok(())
}

#[test]
fn matmul_over_leading_axes_treats_the_rest_as_batch() -> Result<()> {
    let exec = stream("matmul-axes");
    let a = iota([2, 3, 2], 1.0)?;
    let b = iota([3, 4, 2], 0.5)?;
    let product = matmul_axes(&a, &b, [0, 1])?;
    assert_eq!(product.shape().dims(), &[2, 4, 2]);

    let out = TensorView::<f64, 3>::zeros([2, 4, 2]);
    assign(&out, product, &exec)?;
    exec.synchronize()?;

    let mut expected = Vec::new();
    for i in 0..2 {
        for j in 0..4 {
            for z in 0..2 {
                let mut acc = 0.0;
                for k in 0..3 {
                    acc += a.get([i, k, z])? * b.get([k, j, z])?;
                }
                expected.push(acc);
            }
        }
    }
    assert_close(&out.to_vec(), &expected);

    assert!(matches!(
        matmul_axes(&a, &b, [1, 1]).err(),
        Some(ExprError::InvalidDim { .. })
    ));
    Ok(())
}

#[test]
fn scaled_matmul_over_selected_axes() -> Result<()> {
    let exec = stream("matmul-axes-scaled");
    let a = iota([2, 2, 3], 1.0)?;
    let b = iota([3, 2, 3], 1.0)?;
    let plain = TensorView::<f64, 3>::zeros([2, 2, 3]);
    let scaled = TensorView::<f64, 3>::zeros([2, 2, 3]);
    assign(&plain, matmul_axes(&a, &b, [0, 2])?, &exec)?;
    let schedule = assign(&scaled, matmul_axes_scaled(&a, &b, [0, 2], -0.5, 0.0)?, &exec)?;
    exec.synchronize()?;

    // Different alpha, different plan.
    assert_eq!(schedule.plan_misses(), 1);
    let expected: Vec<f64> = plain.to_vec().iter().map(|v| -0.5 * v).collect();
    assert_close(&scaled.to_vec(), &expected);
    Ok(())
}

#[test]
fn matmul_rejects_inner_dimension_mismatch() -> Result<()> {
    let a = TensorView::<f32, 2>::zeros([2, 3]);
    let b = TensorView::<f32, 2>::zeros([2, 3]);
    assert!(matches!(matmul(&a, &b).err(), Some(ExprError::ShapeMismatch { .. })));
    Ok(())
}

#[test]
fn cov_of_columns() -> Result<()> {
    let exec = stream("cov");
    let samples = TensorView::from_vec([3, 2], vec![1.0f64, 2.0, 2.0, 4.0, 3.0, 6.0])?;
    let out = TensorView::<f64, 2>::zeros([2, 2]);
    assign(&out, cov(&samples)?, &exec)?;
    exec.synchronize()?;
    assert_close(&out.to_vec(), &[1.0, 2.0, 2.0, 4.0]);
    Ok(())
}

#[test]
fn cumsum_runs_along_the_last_dimension_on_the_host() -> Result<()> {
    let exec = host();
    let a = TensorView::from_vec([4], vec![1i32, 2, 3, 4])?;
    let out = TensorView::<i32, 1>::zeros([4]);
    assign(&out, cumsum(&a)?, &exec)?;
    assert_eq!(out.to_vec(), vec![1, 3, 6, 10]);

    let m = TensorView::from_vec([2, 2], vec![1i32, 2, 3, 4])?;
    let rows = TensorView::<i32, 2>::zeros([2, 2]);
    assign(&rows, cumsum(&m)?, &exec)?;
    assert_eq!(rows.to_vec(), vec![1, 3, 3, 7]);
    Ok(())
}

#[test]
fn trace_produces_a_scalar() -> Result<()> {
    let exec = host();
    let a = TensorView::from_vec([3, 3], vec![1.0f64, 9.0, 9.0, 9.0, 2.0, 9.0, 9.0, 9.0, 3.0])?;
    let out = TensorView::<f64, 0>::scalar(0.0);
    assign(&out, trace(&a)?, &exec)?;
    assert_eq!(out.value(), 6.0);

    let filled = TensorView::<f64, 2>::zeros([2, 2]);
    assign(&filled, trace(&a)?, &exec)?;
    assert_eq!(filled.to_vec(), vec![6.0; 4]);

    let rect = TensorView::<f64, 2>::zeros([2, 3]);
    assert!(matches!(trace(&rect).err(), Some(ExprError::ShapeMismatch { .. })));
    Ok(())
}

#[test]
fn contraction_sums_over_paired_axes() -> Result<()> {
    let exec = stream("contract");
    let a = iota([2, 3, 4], 1.0)?;
    let b = iota([4, 3], 0.25)?;
    let contracted = contract(&a, &b, [(1, 1), (2, 0)])?;
    assert_eq!(contracted.shape().dims(), &[2]);

    let out = TensorView::<f64, 1>::zeros([2]);
    assign(&out, contracted, &exec)?;
    exec.synchronize()?;

    let mut expected = vec![0.0; 2];
    for (i, slot) in expected.iter_mut().enumerate() {
        for j in 0..3 {
            for k in 0..4 {
                *slot += a.get([i, j, k])? * b.get([k, j])?;
            }
        }
    }
    assert_close(&out.to_vec(), &expected);

    let outer = TensorView::<f64, 2>::zeros([2, 2]);
    let x = TensorView::from_vec([2], vec![1.0f64, 2.0])?;
    let y = TensorView::from_vec([2], vec![3.0f64, 4.0])?;
    assign(&outer, contract(&x, &y, [])?, &exec)?;
    exec.synchronize()?;
    assert_close(&outer.to_vec(), &[3.0, 4.0, 6.0, 8.0]);

    assert!(matches!(
        contract(&a, &b, [(0, 0)]).err(),
        Some(ExprError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        contract(&a, &b, [(1, 1), (1, 0)]).err(),
        Some(ExprError::InvalidDim { .. })
    ));
    Ok(())
}

#[test]
fn nested_transforms_dispatch_innermost_first() -> Result<()> {
    let exec = stream("nested");
    let a = TensorView::from_vec([2, 2], vec![1.0f64, 2.0, 3.0, 4.0])?;
    let eye = TensorView::from_vec([2, 2], vec![1.0f64, 0.0, 0.0, 1.0])?;

    let inner = matmul(&a, &eye)?;
    let outer = matmul(&inner, &a)?;
    let expr = cumsum(&outer)?;
    let expected_ops = [inner.name(), outer.name(), expr.name()];

    let out = TensorView::<f64, 2>::zeros([2, 2]);
    let schedule = assign(&out, expr.add(&a)?, &exec)?;
    exec.synchronize()?;

    assert_eq!(schedule.ops(), expected_ops.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(schedule.kernels(), 1);
    assert_close(&out.to_vec(), &[8.0, 19.0, 18.0, 41.0]);
    Ok(())
}

#[test]
fn non_memory_operands_are_materialized_first() -> Result<()> {
    let exec = stream("materialize");
    let a = TensorView::from_vec([3], vec![1.0f64, 2.0, 3.0])?;
    let out = TensorView::<f64, 1>::zeros([3]);
    let schedule = assign(&out, cumsum(&a.scale(2.0))?, &exec)?;
    exec.synchronize()?;
    assert_eq!(schedule.kernels(), 2);
    assert_eq!(schedule.transforms(), 1);
    assert_close(&out.to_vec(), &[2.0, 6.0, 12.0]);
    Ok(())
}

#[test]
fn operand_resolution_borrows_views_and_materializes_expressions() -> Result<()> {
    let exec = host();
    let a = iota([2, 3], 1.0)?;
    let mut schedule = Schedule::default();
    let mut operands = Operands::default();
    operands.push(&mut a.transpose()?, &exec, &mut schedule)?;
    operands.push(&mut a.scale(2.0), &exec, &mut schedule)?;

    assert_eq!(operands.inputs().len(), 2);
    assert_eq!(operands.materialized(), 1);
    assert_eq!(schedule.kernels(), 1);
    let parent = a.strided().ok_or_else(|| anyhow::anyhow!("view is not memory-backed"))?;
    assert!(operands.inputs()[0].buffer.same(&parent.buffer));
    assert_eq!(operands.inputs()[0].layout.shape().dims(), &[3, 2]);
    assert_close(&operands.inputs()[1].gather(), &[0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    Ok(())
}

#[test]
fn rfft_keeps_the_non_negative_frequencies() -> Result<()> {
    let exec = host();
    let x = TensorView::from_vec([4], vec![1.0f64, 2.0, 3.0, 4.0])?;
    let spectrum = rfft(&x)?;
    assert_eq!(spectrum.shape().dims(), &[3, 2]);

    let out = TensorView::<f64, 2>::zeros([3, 2]);
    assign(&out, spectrum, &exec)?;
    assert_close(&out.to_vec(), &[10.0, 0.0, -2.0, 2.0, -2.0, 0.0]);
    Ok(())
}

#[test]
fn irfft_inverts_rfft_for_odd_and_even_lengths() -> Result<()> {
    let exec = stream("fft");
    for n in [5, 8] {
        let x = iota([3, n], 0.25)?.map(|v| (v * 1.7).sin());
        let out = TensorView::<f64, 2>::zeros([3, n]);
        let schedule = assign(&out, irfft(&rfft(&x)?, n)?, &exec)?;
        exec.synchronize()?;

        assert_eq!(schedule.transforms(), 2);
        let expected: Vec<f64> = (0..3 * n).map(|v| (v as f64 * 0.25 * 1.7).sin()).collect();
        assert_close(&out.to_vec(), &expected);
    }
    Ok(())
}

#[test]
fn fft_rejects_bad_spectra_and_integer_signals() -> Result<()> {
    let spectrum = TensorView::<f64, 2>::zeros([4, 2]);
    assert!(matches!(irfft(&spectrum, 8).err(), Some(ExprError::ShapeMismatch { .. })));
    assert_eq!(irfft(&spectrum, 6)?.shape().dims(), &[6]);
    assert_eq!(irfft(&spectrum, 7)?.shape().dims(), &[7]);
    assert!(matches!(
        rfft(&TensorView::<f32, 1>::zeros([0])).err(),
        Some(ExprError::InvalidDim { .. })
    ));

    let exec = host();
    let ints = TensorView::from_vec([4], vec![1i32, 2, 3, 4])?;
    let out = TensorView::<i32, 2>::zeros([3, 2]);
    let err = assign(&out, rfft(&ints)?, &exec).err();
    assert!(matches!(
        err,
        Some(ExprError::Backend(BackendError::Unimplemented { op: "rfft", .. }))
    ));
    Ok(())
}

#[test]
fn reading_a_transform_before_dispatch_fails() -> Result<()> {
    let a = TensorView::<f64, 2>::zeros([2, 2]);
    let product = matmul(&a, &a)?;
    assert!(matches!(product.at(&[0, 0]), Err(ExprError::InvalidAssignment { .. })));
    assert!(product.strided().is_none());
    Ok(())
}

#[test]
fn wrong_destination_shape_fails_before_any_plan() -> Result<()> {
    let exec = stream("dest");
    let a = TensorView::<f64, 2>::zeros([2, 3]);
    let b = TensorView::<f64, 2>::zeros([3, 4]);
    let out = TensorView::<f64, 2>::zeros([2, 3]);
    let err = assign(&out, matmul(&a, &b)?, &exec).err();
    assert!(matches!(err, Some(ExprError::ShapeMismatch { .. })));
    assert_eq!(exec.context().plans().stats().misses, 0);
    assert!(exec.context().plans().is_empty());
    Ok(())
}

#[test]
fn stream_only_transform_on_runtime_host_executor_is_rejected() -> Result<()> {
    let exec: AnyExecutor<CpuBackend> = host().into();
    let a = TensorView::<f64, 2>::zeros([2, 2]);
    let out = TensorView::<f64, 2>::zeros([2, 2]);
    let err = assign(&out, matmul(&a, &a)?, &exec).err();
    assert!(matches!(
        err,
        Some(ExprError::UnsupportedExecutor { executor: ExecutorKind::Host, .. })
    ));

    let exec: AnyExecutor<CpuBackend> = stream("any").into();
    let ones = TensorView::full([2, 2], 1.0f64);
    assign(&out, matmul(&ones, &ones)?, &exec)?;
    exec.synchronize()?;
    assert_eq!(out.to_vec(), vec![2.0; 4]);
    Ok(())
}
