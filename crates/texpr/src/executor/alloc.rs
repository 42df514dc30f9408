//! Scratch allocation accounting and transform-owned leases.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::ExprResult;
use crate::executor::stream::Stream;
use crate::tensor::{Buffer, Element, Layout, Placement, Shape, StridedBuffer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Bytes currently reserved.
    pub live_bytes: usize,
    /// High-water mark of `live_bytes`.
    pub peak_bytes: usize,
    /// Bytes reserved over the allocator's lifetime.
    pub total_bytes: u64,
    pub reservations: u64,
}

/// Shared counters behind an allocator. Reservations hold a reference and settle on drop.
#[derive(Debug, Default)]
pub struct AllocLedger {
    live: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicU64,
    reservations: AtomicU64,
}

impl AllocLedger {
    fn charge(&self, bytes: usize) {
        let live = self.live.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak.fetch_max(live, Ordering::AcqRel);
        self.total.fetch_add(bytes as u64, Ordering::Relaxed);
        self.reservations.fetch_add(1, Ordering::Relaxed);
    }

    fn settle(&self, bytes: usize) {
        self.live.fetch_sub(bytes, Ordering::AcqRel);
    }

    pub fn stats(&self) -> AllocStats {
        AllocStats {
            live_bytes: self.live.load(Ordering::Acquire),
            peak_bytes: self.peak.load(Ordering::Acquire),
            total_bytes: self.total.load(Ordering::Relaxed),
            reservations: self.reservations.load(Ordering::Relaxed),
        }
    }
}

/// Bytes reserved from an allocator; returned when dropped.
pub struct Reservation {
    bytes: usize,
    placement: Placement,
    ledger: Arc<AllocLedger>,
}

impl Reservation {
    /// Charges `bytes` to `ledger`.
    pub fn new(bytes: usize, placement: Placement, ledger: Arc<AllocLedger>) -> Self {
        ledger.charge(bytes);
        Reservation {
            bytes,
            placement,
            ledger,
        }
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("bytes", &self.bytes)
            .field("placement", &self.placement)
            .finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.ledger.settle(self.bytes);
    }
}

/// Source of scratch memory for transforms and materialized operands.
///
/// `DeviceAsync` reservations are ordered on `stream`: they may be used by work enqueued after
/// the reservation and are only returned once the stream has moved past their last use.
pub trait Allocator: Send + Sync {
    fn reserve(&self, bytes: usize, placement: Placement, stream: &Stream) -> ExprResult<Reservation>;

    fn stats(&self) -> AllocStats;
}

/// Accounting-only allocator backed by host memory.
#[derive(Debug, Default, Clone)]
pub struct DefaultAllocator {
    ledger: Arc<AllocLedger>,
}

impl DefaultAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for DefaultAllocator {
    fn reserve(&self, bytes: usize, placement: Placement, stream: &Stream) -> ExprResult<Reservation> {
        tracing::trace!(bytes, ?placement, stream = stream.name(), "reserving scratch");
        Ok(Reservation::new(bytes, placement, Arc::clone(&self.ledger)))
    }

    fn stats(&self) -> AllocStats {
        self.ledger.stats()
    }
}

/// A buffer owned by a transform (or a materialized operand) for the life of its owner.
///
/// Dropping the lease does not free the memory directly: the buffer is handed to the stream,
/// which releases it once all work enqueued so far has completed.
pub struct ScratchLease<T: Element> {
    buffer: Option<Buffer<T>>,
    layout: Layout,
    stream: Stream,
}

impl<T: Element> ScratchLease<T> {
    /// Allocates a zero-filled, contiguous buffer for `shape`.
    pub fn allocate(
        allocator: &dyn Allocator,
        shape: &Shape,
        placement: Placement,
        stream: &Stream,
    ) -> ExprResult<Self> {
        let len = shape.num_elements();
        let reservation = allocator.reserve(len * T::DTYPE.size_in_bytes(), placement, stream)?;
        Ok(ScratchLease {
            buffer: Some(Buffer::zeroed(len, placement, reservation)),
            layout: Layout::contiguous(shape.clone()),
            stream: stream.clone(),
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn buffer(&self) -> &Buffer<T> {
        self.buffer.as_ref().expect("scratch lease already released")
    }

    pub fn strided(&self) -> StridedBuffer<T> {
        StridedBuffer::new(self.buffer().clone(), self.layout.clone())
    }
}

impl<T: Element> Drop for ScratchLease<T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.stream.release_after(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_settle_on_drop() {
        let allocator = DefaultAllocator::new();
        let stream = Stream::inline();
        let lease = ScratchLease::<f64>::allocate(&allocator, &Shape::new([4, 4]), Placement::Host, &stream)
            .unwrap();
        assert_eq!(allocator.stats().live_bytes, 128);
        assert_eq!(lease.buffer().read().len(), 16);
        drop(lease);
        let stats = allocator.stats();
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.peak_bytes, 128);
        assert_eq!(stats.reservations, 1);
    }
}
