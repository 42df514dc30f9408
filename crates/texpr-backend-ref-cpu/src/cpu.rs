use smallvec::SmallVec;
use texpr::backend::spec::{
    Backend, BackendError, BackendResult, OperandSignature, PlanSignature, StridedMut, StridedRef,
    TransformCall, TransformOp,
};
use texpr::tensor::Element;

type Index = SmallVec<[usize; 8]>;

/// Straightforward host implementation of every transform.
///
/// Kernels address operands through their layouts, so strided and permuted views are consumed
/// without copies. Plans only carry validated geometry.
#[derive(Debug, Default, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

/// Geometry extracted from a plan signature at prepare time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Geometry {
    MatMul { batch: Vec<usize>, m: usize, k: usize, n: usize },
    Conv1d { batch: Vec<usize>, n: usize, m: usize, len: usize, offset: usize, batched_kernel: bool },
    Cov { observations: usize, variables: usize },
    CumSum { outer: Vec<usize>, len: usize },
    Trace { n: usize },
    Contract { lhs: Vec<usize>, rhs: Vec<usize>, pairs: Vec<(usize, usize)> },
    Qr { batch: Vec<usize>, m: usize, n: usize },
    QrPacked { batch: Vec<usize>, m: usize, n: usize },
    /// Real signals of length `n` and their `bins` complex spectrum entries.
    Spectrum { outer: Vec<usize>, n: usize, bins: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuPlan {
    op: TransformOp,
    geometry: Geometry,
}

impl CpuPlan {
    pub fn op(&self) -> &TransformOp {
        &self.op
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

fn invalid(op: &TransformOp, detail: impl std::fmt::Display) -> BackendError {
    BackendError::invalid_plan(format!("{}: {detail}", op.name()))
}

fn expect_operands<'a>(
    signature: &'a PlanSignature,
    inputs: usize,
    outputs: usize,
) -> BackendResult<(&'a [OperandSignature], &'a [OperandSignature])> {
    let ins = signature.input_operands();
    let outs = signature.output_operands();
    if ins.len() != inputs || outs.len() != outputs {
        return Err(invalid(
            &signature.op,
            format!(
                "expected {inputs} inputs and {outputs} outputs, got {} and {}",
                ins.len(),
                outs.len()
            ),
        ));
    }
    Ok((ins, outs))
}

fn expect_dims(op: &TransformOp, what: &str, found: &[usize], expected: &[usize]) -> BackendResult<()> {
    if found != expected {
        return Err(invalid(op, format!("{what} has dims {found:?}, expected {expected:?}")));
    }
    Ok(())
}

fn geometry(signature: &PlanSignature) -> BackendResult<Geometry> {
    let op = &signature.op;
    match op {
        TransformOp::MatMul { .. } => {
            let (ins, outs) = expect_operands(signature, 2, 1)?;
            let (a, b) = (&ins[0].dims, &ins[1].dims);
            let rank = a.len();
            if rank < 2 || b.len() != rank || a[..rank - 2] != b[..rank - 2] || a[rank - 1] != b[rank - 2] {
                return Err(invalid(op, format!("cannot multiply {a:?} by {b:?}")));
            }
            let batch = a[..rank - 2].to_vec();
            let (m, k, n) = (a[rank - 2], a[rank - 1], b[rank - 1]);
            let mut out = batch.clone();
            out.extend([m, n]);
            expect_dims(op, "output", &outs[0].dims, &out)?;
            Ok(Geometry::MatMul { batch, m, k, n })
        }
        TransformOp::Conv1d { mode } => {
            let (ins, outs) = expect_operands(signature, 2, 1)?;
            let (a, b) = (&ins[0].dims, &ins[1].dims);
            let Some((&n, batch)) = a.split_last() else {
                return Err(invalid(op, "signal has rank 0"));
            };
            let Some((&m, kernel_batch)) = b.split_last() else {
                return Err(invalid(op, "kernel has rank 0"));
            };
            let batched_kernel = !kernel_batch.is_empty();
            if batched_kernel && kernel_batch != batch {
                return Err(invalid(op, format!("kernel {b:?} does not match signal {a:?}")));
            }
            let len = mode.output_len(n, m);
            let mut out = batch.to_vec();
            out.push(len);
            expect_dims(op, "output", &outs[0].dims, &out)?;
            Ok(Geometry::Conv1d {
                batch: batch.to_vec(),
                n,
                m,
                len,
                offset: mode.full_offset(n, m),
                batched_kernel,
            })
        }
        TransformOp::Cov => {
            let (ins, outs) = expect_operands(signature, 1, 1)?;
            let a = &ins[0].dims;
            if a.len() != 2 {
                return Err(invalid(op, format!("input {a:?} is not a matrix")));
            }
            expect_dims(op, "output", &outs[0].dims, &[a[1], a[1]])?;
            Ok(Geometry::Cov {
                observations: a[0],
                variables: a[1],
            })
        }
        TransformOp::CumSum => {
            let (ins, outs) = expect_operands(signature, 1, 1)?;
            let a = &ins[0].dims;
            expect_dims(op, "output", &outs[0].dims, a)?;
            let Some((&len, outer)) = a.split_last() else {
                return Err(invalid(op, "input has rank 0"));
            };
            Ok(Geometry::CumSum {
                outer: outer.to_vec(),
                len,
            })
        }
        TransformOp::Trace => {
            let (ins, outs) = expect_operands(signature, 1, 1)?;
            let a = &ins[0].dims;
            if a.len() != 2 || a[0] != a[1] {
                return Err(invalid(op, format!("input {a:?} is not a square matrix")));
            }
            expect_dims(op, "output", &outs[0].dims, &[])?;
            Ok(Geometry::Trace { n: a[0] })
        }
        TransformOp::Contract { axes } => {
            let (ins, outs) = expect_operands(signature, 2, 1)?;
            let (a, b) = (&ins[0].dims, &ins[1].dims);
            for &(ai, bi) in axes {
                if ai >= a.len() || bi >= b.len() || a[ai] != b[bi] {
                    return Err(invalid(op, format!("cannot contract axis {ai} of {a:?} with axis {bi} of {b:?}")));
                }
            }
            let out: Vec<usize> = a
                .iter()
                .enumerate()
                .filter(|(d, _)| !axes.iter().any(|&(ai, _)| ai == *d))
                .chain(b.iter().enumerate().filter(|(d, _)| !axes.iter().any(|&(_, bi)| bi == *d)))
                .map(|(_, &dim)| dim)
                .collect();
            expect_dims(op, "output", &outs[0].dims, &out)?;
            Ok(Geometry::Contract {
                lhs: a.clone(),
                rhs: b.clone(),
                pairs: axes.clone(),
            })
        }
        TransformOp::Qr => {
            let (ins, outs) = expect_operands(signature, 1, 2)?;
            let a = &ins[0].dims;
            let rank = a.len();
            if rank < 2 {
                return Err(invalid(op, format!("input {a:?} is not a matrix")));
            }
            let batch = a[..rank - 2].to_vec();
            let (m, n) = (a[rank - 2], a[rank - 1]);
            let mut q = batch.clone();
            q.extend([m, m]);
            expect_dims(op, "Q", &outs[0].dims, &q)?;
            expect_dims(op, "R", &outs[1].dims, a)?;
            Ok(Geometry::Qr { batch, m, n })
        }
        TransformOp::QrPacked => {
            let (ins, outs) = expect_operands(signature, 1, 2)?;
            let a = &ins[0].dims;
            let rank = a.len();
            if rank < 2 {
                return Err(invalid(op, format!("input {a:?} is not a matrix")));
            }
            let batch = a[..rank - 2].to_vec();
            let (m, n) = (a[rank - 2], a[rank - 1]);
            let mut tau = batch.clone();
            tau.push(m.min(n));
            expect_dims(op, "packed factors", &outs[0].dims, a)?;
            expect_dims(op, "tau", &outs[1].dims, &tau)?;
            Ok(Geometry::QrPacked { batch, m, n })
        }
        TransformOp::Rfft | TransformOp::Irfft => {
            let (ins, outs) = expect_operands(signature, 1, 1)?;
            if !signature.dtype.is_float() {
                return Err(BackendError::unimplemented(
                    op.name(),
                    format!("{:?} is not a floating-point dtype", signature.dtype),
                ));
            }
            let (real, spectrum) = match op {
                TransformOp::Rfft => (&ins[0].dims, &outs[0].dims),
                _ => (&outs[0].dims, &ins[0].dims),
            };
            let Some((&n, outer)) = real.split_last() else {
                return Err(invalid(op, "signal has rank 0"));
            };
            if n == 0 {
                return Err(invalid(op, "signal length is zero"));
            }
            let bins = n / 2 + 1;
            let mut expected = outer.to_vec();
            expected.extend([bins, 2]);
            expect_dims(op, "spectrum", spectrum, &expected)?;
            Ok(Geometry::Spectrum {
                outer: outer.to_vec(),
                n,
                bins,
            })
        }
    }
}

/// Calls `f` with every index of `dims` in row-major order; a rank-0 space yields one empty index.
fn for_each_index(dims: &[usize], mut f: impl FnMut(&[usize])) {
    if dims.iter().any(|&dim| dim == 0) {
        return;
    }
    let mut index: Index = SmallVec::from_elem(0, dims.len());
    loop {
        f(&index);
        let mut axis = dims.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

fn join(prefix: &[usize], tail: &[usize]) -> Index {
    let mut index: Index = SmallVec::from_slice(prefix);
    index.extend_from_slice(tail);
    index
}

fn matmul<T: Element>(
    batch: &[usize],
    (m, k, n): (usize, usize, usize),
    alpha: T,
    beta: T,
    a: &StridedRef<'_, T>,
    b: &StridedRef<'_, T>,
    out: &mut StridedMut<'_, T>,
) {
    for_each_index(batch, |bi| {
        for i in 0..m {
            for j in 0..n {
                let mut acc = T::zero();
                for p in 0..k {
                    acc = acc + a.get(&join(bi, &[i, p])) * b.get(&join(bi, &[p, j]));
                }
                let at = join(bi, &[i, j]);
                let prior = out.get(&at);
                out.set(&at, alpha * acc + beta * prior);
            }
        }
    });
}

fn conv1d<T: Element>(
    batch: &[usize],
    (n, m, len, offset): (usize, usize, usize, usize),
    batched_kernel: bool,
    signal: &StridedRef<'_, T>,
    kernel: &StridedRef<'_, T>,
    out: &mut StridedMut<'_, T>,
) {
    for_each_index(batch, |bi| {
        for t in 0..len {
            let full = t + offset;
            let mut acc = T::zero();
            let lo = full.saturating_sub(m - 1);
            let hi = full.min(n - 1);
            for i in lo..=hi {
                let j = full - i;
                let k = if batched_kernel {
                    kernel.get(&join(bi, &[j]))
                } else {
                    kernel.get(&[j])
                };
                acc = acc + signal.get(&join(bi, &[i])) * k;
            }
            out.set(&join(bi, &[t]), acc);
        }
    });
}

fn cov<T: Element>(observations: usize, variables: usize, a: &StridedRef<'_, T>, out: &mut StridedMut<'_, T>) {
    let means: Vec<f64> = (0..variables)
        .map(|v| {
            let sum: f64 = (0..observations).map(|o| a.get(&[o, v]).to_f64()).sum();
            sum / observations.max(1) as f64
        })
        .collect();
    let denom = observations.saturating_sub(1).max(1) as f64;
    for i in 0..variables {
        for j in i..variables {
            let sum: f64 = (0..observations)
                .map(|o| (a.get(&[o, i]).to_f64() - means[i]) * (a.get(&[o, j]).to_f64() - means[j]))
                .sum();
            let value = T::from_f64(sum / denom);
            out.set(&[i, j], value);
            out.set(&[j, i], value);
        }
    }
}

fn cumsum<T: Element>(outer: &[usize], len: usize, a: &StridedRef<'_, T>, out: &mut StridedMut<'_, T>) {
    for_each_index(outer, |oi| {
        let mut acc = T::zero();
        for i in 0..len {
            let at = join(oi, &[i]);
            acc = acc + a.get(&at);
            out.set(&at, acc);
        }
    });
}

fn trace<T: Element>(n: usize, a: &StridedRef<'_, T>, out: &mut StridedMut<'_, T>) {
    let mut acc = T::zero();
    for i in 0..n {
        acc = acc + a.get(&[i, i]);
    }
    out.set(&[], acc);
}

fn contract<T: Element>(
    lhs: &[usize],
    rhs: &[usize],
    pairs: &[(usize, usize)],
    a: &StridedRef<'_, T>,
    b: &StridedRef<'_, T>,
    out: &mut StridedMut<'_, T>,
) {
    let lhs_free: Vec<usize> = (0..lhs.len()).filter(|d| !pairs.iter().any(|&(ai, _)| ai == *d)).collect();
    let rhs_free: Vec<usize> = (0..rhs.len()).filter(|d| !pairs.iter().any(|&(_, bi)| bi == *d)).collect();
    let summed: Vec<usize> = pairs.iter().map(|&(ai, _)| lhs[ai]).collect();
    let out_dims = out.dims();

    let mut a_index: Index = SmallVec::from_elem(0, lhs.len());
    let mut b_index: Index = SmallVec::from_elem(0, rhs.len());
    for_each_index(out_dims, |oi| {
        for (slot, &d) in lhs_free.iter().enumerate() {
            a_index[d] = oi[slot];
        }
        for (slot, &d) in rhs_free.iter().enumerate() {
            b_index[d] = oi[lhs_free.len() + slot];
        }
        let mut acc = T::zero();
        for_each_index(&summed, |si| {
            for (&(ai, bi), &s) in pairs.iter().zip(si) {
                a_index[ai] = s;
                b_index[bi] = s;
            }
            acc = acc + a.get(&a_index) * b.get(&b_index);
        });
        out.set(oi, acc);
    });
}

/// Householder QR of each trailing `[m, n]` matrix, computed in `f64`.
fn qr<T: Element>(
    batch: &[usize],
    m: usize,
    n: usize,
    a: &StridedRef<'_, T>,
    outputs: &mut [StridedMut<'_, T>],
) -> BackendResult<()> {
    let [q_out, r_out] = outputs else {
        return Err(BackendError::execution("qr expects exactly two outputs"));
    };
    for_each_index(batch, |bi| {
        let mut r: Vec<f64> = Vec::with_capacity(m * n);
        for i in 0..m {
            for j in 0..n {
                r.push(a.get(&join(bi, &[i, j])).to_f64());
            }
        }
        let mut q = vec![0.0f64; m * m];
        for i in 0..m {
            q[i * m + i] = 1.0;
        }

        for k in 0..m.saturating_sub(1).min(n) {
            let norm = (k..m).map(|i| r[i * n + k].powi(2)).sum::<f64>().sqrt();
            if norm == 0.0 {
                continue;
            }
            let alpha = if r[k * n + k] >= 0.0 { -norm } else { norm };
            let mut v: Vec<f64> = (k..m).map(|i| r[i * n + k]).collect();
            v[0] -= alpha;
            let v_norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
            if v_norm == 0.0 {
                continue;
            }
            v.iter_mut().for_each(|x| *x /= v_norm);

            // R <- H R
            for j in 0..n {
                let dot: f64 = (k..m).map(|i| v[i - k] * r[i * n + j]).sum();
                for i in k..m {
                    r[i * n + j] -= 2.0 * v[i - k] * dot;
                }
            }
            // Q <- Q H
            for i in 0..m {
                let dot: f64 = (k..m).map(|c| q[i * m + c] * v[c - k]).sum();
                for c in k..m {
                    q[i * m + c] -= 2.0 * dot * v[c - k];
                }
            }
        }

        for i in 0..m {
            for j in 0..m {
                q_out.set(&join(bi, &[i, j]), T::from_f64(q[i * m + j]));
            }
            for j in 0..n {
                // Below-diagonal entries are rounding noise after elimination.
                let value = if i > j { 0.0 } else { r[i * n + j] };
                r_out.set(&join(bi, &[i, j]), T::from_f64(value));
            }
        }
    });
    Ok(())
}

/// LAPACK-style (`geqrf`) Householder QR, computed in `f64`.
fn qr_packed<T: Element>(
    batch: &[usize],
    m: usize,
    n: usize,
    a: &StridedRef<'_, T>,
    outputs: &mut [StridedMut<'_, T>],
) -> BackendResult<()> {
    let [packed_out, tau_out] = outputs else {
        return Err(BackendError::execution("qr_packed expects exactly two outputs"));
    };
    for_each_index(batch, |bi| {
        let mut r: Vec<f64> = Vec::with_capacity(m * n);
        for i in 0..m {
            for j in 0..n {
                r.push(a.get(&join(bi, &[i, j])).to_f64());
            }
        }
        for k in 0..m.min(n) {
            let alpha = r[k * n + k];
            let tail = (k + 1..m).map(|i| r[i * n + k].powi(2)).sum::<f64>().sqrt();
            let tau = if tail == 0.0 {
                0.0
            } else {
                let beta = -alpha.signum() * alpha.hypot(tail);
                let scale = 1.0 / (alpha - beta);
                for i in k + 1..m {
                    r[i * n + k] *= scale;
                }
                r[k * n + k] = beta;
                let tau = (beta - alpha) / beta;
                // Apply H = I - tau v vᵀ to the trailing columns; v[k] = 1.
                for j in k + 1..n {
                    let below: f64 = (k + 1..m).map(|i| r[i * n + k] * r[i * n + j]).sum();
                    let dot = r[k * n + j] + below;
                    r[k * n + j] -= tau * dot;
                    for i in k + 1..m {
                        r[i * n + j] -= tau * r[i * n + k] * dot;
                    }
                }
                tau
            };
            tau_out.set(&join(bi, &[k]), T::from_f64(tau));
        }
        for i in 0..m {
            for j in 0..n {
                packed_out.set(&join(bi, &[i, j]), T::from_f64(r[i * n + j]));
            }
        }
    });
    Ok(())
}

fn rfft<T: Element>(
    outer: &[usize],
    n: usize,
    bins: usize,
    signal: &StridedRef<'_, T>,
    out: &mut StridedMut<'_, T>,
) {
    let step = -2.0 * std::f64::consts::PI / n as f64;
    for_each_index(outer, |oi| {
        let x: Vec<f64> = (0..n).map(|t| signal.get(&join(oi, &[t])).to_f64()).collect();
        for k in 0..bins {
            let (mut re, mut im) = (0.0, 0.0);
            for (t, &value) in x.iter().enumerate() {
                let (sin, cos) = (step * ((k * t) % n) as f64).sin_cos();
                re += value * cos;
                im += value * sin;
            }
            out.set(&join(oi, &[k, 0]), T::from_f64(re));
            out.set(&join(oi, &[k, 1]), T::from_f64(im));
        }
    });
}

fn irfft<T: Element>(
    outer: &[usize],
    n: usize,
    bins: usize,
    spectrum: &StridedRef<'_, T>,
    out: &mut StridedMut<'_, T>,
) {
    let step = 2.0 * std::f64::consts::PI / n as f64;
    for_each_index(outer, |oi| {
        let values: Vec<(f64, f64)> = (0..bins)
            .map(|k| {
                (
                    spectrum.get(&join(oi, &[k, 0])).to_f64(),
                    spectrum.get(&join(oi, &[k, 1])).to_f64(),
                )
            })
            .collect();
        for t in 0..n {
            let mut acc = 0.0;
            for (k, &(re, im)) in values.iter().enumerate() {
                // Every bin other than DC and Nyquist stands for itself and its conjugate.
                let weight = if k == 0 || 2 * k == n { 1.0 } else { 2.0 };
                let (sin, cos) = (step * ((k * t) % n) as f64).sin_cos();
                acc += weight * (re * cos - im * sin);
            }
            out.set(&join(oi, &[t]), T::from_f64(acc / n as f64));
        }
    });
}

impl Backend for CpuBackend {
    type Plan = CpuPlan;

    fn backend_name(&self) -> &str {
        "ref-cpu"
    }

    fn prepare(&self, signature: &PlanSignature) -> BackendResult<CpuPlan> {
        let geometry = geometry(signature)?;
        tracing::trace!(op = signature.op.name(), ?geometry, "prepared cpu plan");
        Ok(CpuPlan {
            op: signature.op.clone(),
            geometry,
        })
    }

    fn execute<T: Element>(&self, plan: &CpuPlan, call: TransformCall<'_, '_, T>) -> BackendResult<()> {
        if *call.op != plan.op {
            return Err(BackendError::invalid_plan(format!(
                "plan prepared for {} used for {}",
                plan.op.name(),
                call.op.name()
            )));
        }
        let inputs = call.inputs;
        let outputs = call.outputs;
        let expected_outputs = match plan.op {
            TransformOp::Qr | TransformOp::QrPacked => 2,
            _ => 1,
        };
        let expected_inputs = match plan.op {
            TransformOp::MatMul { .. } | TransformOp::Conv1d { .. } | TransformOp::Contract { .. } => 2,
            _ => 1,
        };
        if inputs.len() != expected_inputs || outputs.len() != expected_outputs {
            return Err(BackendError::execution(format!(
                "{} called with {} inputs and {} outputs",
                plan.op.name(),
                inputs.len(),
                outputs.len()
            )));
        }

        match (&plan.op, &plan.geometry) {
            (TransformOp::MatMul { alpha, beta }, Geometry::MatMul { batch, m, k, n }) => matmul(
                batch,
                (*m, *k, *n),
                T::from_f64(alpha.value()),
                T::from_f64(beta.value()),
                &inputs[0],
                &inputs[1],
                &mut outputs[0],
            ),
            (
                TransformOp::Conv1d { .. },
                Geometry::Conv1d {
                    batch,
                    n,
                    m,
                    len,
                    offset,
                    batched_kernel,
                },
            ) => conv1d(
                batch,
                (*n, *m, *len, *offset),
                *batched_kernel,
                &inputs[0],
                &inputs[1],
                &mut outputs[0],
            ),
            (TransformOp::Cov, Geometry::Cov { observations, variables }) => {
                cov(*observations, *variables, &inputs[0], &mut outputs[0])
            }
            (TransformOp::CumSum, Geometry::CumSum { outer, len }) => {
                cumsum(outer, *len, &inputs[0], &mut outputs[0])
            }
            (TransformOp::Trace, Geometry::Trace { n }) => trace(*n, &inputs[0], &mut outputs[0]),
            (TransformOp::Contract { .. }, Geometry::Contract { lhs, rhs, pairs }) => {
                contract(lhs, rhs, pairs, &inputs[0], &inputs[1], &mut outputs[0])
            }
            (TransformOp::Qr, Geometry::Qr { batch, m, n }) => qr(batch, *m, *n, &inputs[0], outputs)?,
            (TransformOp::QrPacked, Geometry::QrPacked { batch, m, n }) => {
                qr_packed(batch, *m, *n, &inputs[0], outputs)?
            }
            (TransformOp::Rfft, Geometry::Spectrum { outer, n, bins }) => {
                rfft(outer, *n, *bins, &inputs[0], &mut outputs[0])
            }
            (TransformOp::Irfft, Geometry::Spectrum { outer, n, bins }) => {
                irfft(outer, *n, *bins, &inputs[0], &mut outputs[0])
            }
            (op, _) => {
                return Err(BackendError::invalid_plan(format!(
                    "plan geometry does not match {}",
                    op.name()
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texpr::backend::spec::ConvMode;

    #[test]
    fn index_walk_covers_scalar_and_empty_spaces() {
        let mut seen = Vec::new();
        for_each_index(&[], |index| seen.push(index.to_vec()));
        assert_eq!(seen, vec![Vec::<usize>::new()]);

        seen.clear();
        for_each_index(&[2, 0], |index| seen.push(index.to_vec()));
        assert!(seen.is_empty());

        for_each_index(&[2, 2], |index| seen.push(index.to_vec()));
        assert_eq!(seen, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn same_mode_matches_centred_full_convolution() {
        // full([1, 2, 3] * [0, 1, 0.5]) = [0, 1, 2.5, 4, 1.5]
        let mode = ConvMode::Same;
        assert_eq!(mode.output_len(3, 3), 3);
        assert_eq!(mode.full_offset(3, 3), 1);
        assert_eq!(ConvMode::Valid.output_len(5, 3), 3);
        assert_eq!(ConvMode::Valid.full_offset(5, 3), 2);
    }
}
