pub mod hashing;
pub mod plan;
pub mod spec;

pub use plan::{CachedPlan, PlanCache, PlanCacheStats, PlanOutcome};
pub use spec::{
    Backend, BackendError, BackendResult, ConvMode, OperandSignature, PlanSignature, ScalarParam,
    StridedMut, StridedRef, TransformCall, TransformOp,
};
