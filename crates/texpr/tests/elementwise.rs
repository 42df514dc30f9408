use std::sync::Arc;

use anyhow::Result;
use texpr::{
    assign, materialize, Executor, ExprError, HostExecutor, Operator, OperatorExt, Scalar,
    StreamExecutor, TensorView,
};
use texpr_backend_ref_cpu::CpuBackend;

fn host() -> HostExecutor<CpuBackend> {
    HostExecutor::new(Arc::new(CpuBackend::new()))
}

#[test]
fn chained_elementwise_ops_fuse_into_one_kernel() -> Result<()> {
    let exec = host();
    let a = TensorView::from_vec([2, 2], vec![1.0f32, 2.0, 3.0, 4.0])?;
    let b = TensorView::from_vec([2, 2], vec![4.0f32, 3.0, 2.0, 1.0])?;
    let c = TensorView::full([2, 2], 0.5f32);
    let out = TensorView::<f32, 2>::zeros([2, 2]);

    let expr = a.add(&b)?.mul(&c)?.sub(&a.neg())?;
    let schedule = assign(&out, expr, &exec)?;

    assert_eq!(schedule.kernels(), 1);
    assert_eq!(schedule.transforms(), 0);
    assert_eq!(out.to_vec(), vec![3.5, 4.5, 5.5, 6.5]);
    Ok(())
}

#[test]
fn reassigning_the_same_expression_is_idempotent() -> Result<()> {
    let exec = host();
    let a = TensorView::from_vec([3], vec![-1.0f64, 2.0, -3.0])?;
    let out = TensorView::<f64, 1>::zeros([3]);
    let expr = a.abs().maximum(&Scalar::new(1.5))?;

    assign(&out, expr.clone(), &exec)?;
    let first = out.to_vec();
    assign(&out, expr, &exec)?;
    assert_eq!(out.to_vec(), first);
    assert_eq!(first, vec![1.5, 2.0, 3.0]);
    Ok(())
}

#[test]
fn materialize_without_transforms_is_a_no_op() -> Result<()> {
    let exec = host();
    let a = TensorView::from_vec([2], vec![1i32, 2])?;
    let mut expr = a.add(&a)?;
    assert_eq!(materialize(&mut expr, &exec)?.transforms(), 0);
    assert_eq!(materialize(&mut expr, &exec)?.kernels(), 0);
    assert_eq!(expr.at(&[1])?, 4);
    Ok(())
}

#[test]
fn mismatched_extents_are_rejected_at_construction() -> Result<()> {
    let a = TensorView::<f32, 2>::zeros([2, 3]);
    let b = TensorView::<f32, 2>::zeros([3, 2]);
    let err = a.add(&b).err();
    assert!(matches!(
        err,
        Some(ExprError::ShapeMismatch { ref expected, ref found, .. })
            if expected == &[2, 3] && found == &[3, 2]
    ));
    Ok(())
}

#[test]
fn assignment_checks_destination_extents() -> Result<()> {
    let exec = host();
    let a = TensorView::<f32, 1>::zeros([4]);
    let out = TensorView::<f32, 1>::zeros([3]);
    let err = assign(&out, a.scale(2.0), &exec).err();
    assert!(matches!(err, Some(ExprError::ShapeMismatch { .. })));
    Ok(())
}

#[test]
fn scalar_expression_fills_the_destination() -> Result<()> {
    let exec = host();
    let out = TensorView::<f32, 3>::zeros([2, 2, 2]);
    let fill = TensorView::scalar(3.0f32).add(&Scalar::new(1.0))?;
    assert_eq!(fill.rank(), 0);
    assign(&out, fill, &exec)?;
    assert_eq!(out.to_vec(), vec![4.0; 8]);
    Ok(())
}

#[test]
fn scalars_broadcast_inside_expressions() -> Result<()> {
    let exec = host();
    let a = TensorView::from_vec([2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    let out = TensorView::<f32, 2>::zeros([2, 3]);
    assign(&out, Scalar::new(10.0).sub(&a)?, &exec)?;
    assert_eq!(out.to_vec(), vec![9.0, 8.0, 7.0, 6.0, 5.0, 4.0]);
    Ok(())
}

#[test]
fn expressions_may_read_their_destination() -> Result<()> {
    let exec = StreamExecutor::new(Arc::new(CpuBackend::new()), "alias");
    let a = TensorView::from_vec([2, 2], vec![1.0f32, 2.0, 3.0, 4.0])?;
    assign(&a, a.transpose()?.add(&a)?, &exec)?;
    exec.synchronize()?;
    assert_eq!(a.to_vec(), vec![2.0, 5.0, 5.0, 8.0]);
    Ok(())
}

#[test]
fn custom_closures_compose_with_builtins() -> Result<()> {
    let exec = host();
    let a = TensorView::from_vec([4], vec![1i64, 2, 3, 4])?;
    let b = TensorView::from_vec([4], vec![10i64, 20, 30, 40])?;
    let out = TensorView::<i64, 1>::zeros([4]);
    let expr = a.zip_with(&b, |x, y| x * y - 1)?.map(|v| v % 7);
    assign(&out, expr, &exec)?;
    assert_eq!(out.to_vec(), vec![2, 4, 5, 5]);
    Ok(())
}
