pub mod dtype;
pub mod layout;
pub mod shape;
pub mod storage;
pub mod view;

pub use dtype::{DType, Element};
pub use layout::Layout;
pub use shape::Shape;
pub use storage::{Buffer, Placement, StridedBuffer};
pub use view::TensorView;
