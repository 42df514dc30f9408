//! Reference host backend for `texpr`.
//!
//! Every transform is implemented with plain loops over strided operands. It exists to make the
//! execution protocol testable, not to be fast.

pub mod cpu;

pub use cpu::{CpuBackend, CpuPlan, Geometry};
