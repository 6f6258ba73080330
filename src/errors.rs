/*!
 * Error Types
 *
 * Recoverable construction errors. Full/empty queue outcomes are not
 * errors and are reported through the operation return values; usage
 * faults (exiting a lock that is not held, invalid capacities passed to
 * the panicking constructor) are programmer errors and fail fast.
 */

use thiserror::Error;

/// Ring buffer capacity validation errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    #[error("capacity must be a power of two, got {0}")]
    NotPowerOfTwo(usize),

    #[error("capacity must be at least 2, got {0}")]
    TooSmall(usize),
}
