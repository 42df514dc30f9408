//! Shared element storage backing leaf views and transform results.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use super::dtype::Element;
use super::layout::Layout;
use crate::executor::alloc::Reservation;

static BUFFER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Where a buffer lives and how its release is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Placement {
    /// Host memory, allocated and freed synchronously.
    Host,
    /// Device memory whose allocation and release are ordered on a stream.
    DeviceAsync,
}

/// Reference-counted, lock-protected element storage.
///
/// Clones share the same storage. Each backend call takes one read lock per distinct input
/// buffer and one write lock per output buffer.
pub struct Buffer<T: Element> {
    inner: Arc<BufferInner<T>>,
}

struct BufferInner<T: Element> {
    id: u64,
    placement: Placement,
    data: RwLock<Vec<T>>,
    // Returned to the allocator when the last clone drops.
    _reservation: Option<Reservation>,
}

impl<T: Element> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Buffer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.inner.id)
            .field("placement", &self.inner.placement)
            .field("dtype", &T::DTYPE)
            .finish()
    }
}

impl<T: Element> Buffer<T> {
    /// Wraps caller-provided host data without allocator accounting.
    pub fn from_vec(data: Vec<T>, placement: Placement) -> Self {
        Self::build(data, placement, None)
    }

    /// Zero-filled storage of `len` elements charged to `reservation`.
    pub(crate) fn zeroed(len: usize, placement: Placement, reservation: Reservation) -> Self {
        Self::build(vec![T::zero(); len], placement, Some(reservation))
    }

    fn build(data: Vec<T>, placement: Placement, reservation: Option<Reservation>) -> Self {
        Buffer {
            inner: Arc::new(BufferInner {
                id: BUFFER_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                placement,
                data: RwLock::new(data),
                _reservation: reservation,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn placement(&self) -> Placement {
        self.inner.placement
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two handles refer to the same storage.
    pub fn same(&self, other: &Buffer<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.inner.data.read().expect("buffer lock poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.inner.data.write().expect("buffer lock poisoned")
    }
}

/// A buffer together with the layout used to address it.
#[derive(Debug, Clone)]
pub struct StridedBuffer<T: Element> {
    pub buffer: Buffer<T>,
    pub layout: Layout,
}

impl<T: Element> StridedBuffer<T> {
    pub fn new(buffer: Buffer<T>, layout: Layout) -> Self {
        StridedBuffer { buffer, layout }
    }

    /// Reads the element at `index`; the caller has already bounds-checked it.
    pub(crate) fn load(&self, index: &[usize]) -> T {
        let offset = self.layout.ravel(index);
        self.buffer.read()[offset]
    }

    /// Gathers the addressed elements in row-major logical order.
    pub fn gather(&self) -> Vec<T> {
        let data = self.buffer.read();
        let mut values = Vec::with_capacity(self.layout.shape().num_elements());
        let _ = self.layout.shape().for_each_index(|index| {
            values.push(data[self.layout.ravel(index)]);
            Ok(())
        });
        values
    }
}
