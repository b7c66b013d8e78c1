//! Transactional allocation of document numbers.

mod allocator;
mod retry;

pub use allocator::{AllocationError, SequenceAllocator};
pub use retry::{BackoffStrategy, RetryPolicy};
