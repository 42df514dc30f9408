//! Enumerates the scalar element types an expression can carry.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::Serialize;

/// Logical dtype identifier; part of every plan signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DType {
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 64-bit floating point following IEEE-754 semantics.
    F64,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

/// Numeric behaviour required from the element type of an expression.
///
/// Backends that need transcendental math (QR, covariance) go through `to_f64`/`from_f64`,
/// so integer element types still flow through every transform.
pub trait Element:
    Copy
    + Default
    + Debug
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Dtype tag recorded in plan signatures.
    const DTYPE: DType;

    /// Returns the additive identity for the element type.
    fn zero() -> Self;
    /// Returns the multiplicative identity for the element type.
    fn one() -> Self;
    /// Converts from a 64-bit float, truncating for integer types.
    fn from_f64(v: f64) -> Self;
    /// Widens the element into a 64-bit float.
    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr, $zero:expr, $one:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn zero() -> Self {
                $zero
            }

            fn one() -> Self {
                $one
            }

            fn from_f64(v: f64) -> Self {
                v as $ty
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_element!(f32, DType::F32, 0.0, 1.0);
impl_element!(f64, DType::F64, 0.0, 1.0);
impl_element!(i32, DType::I32, 0, 1);
impl_element!(i64, DType::I64, 0, 1);
