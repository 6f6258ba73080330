/*!
 * Hybrid Synchronization Primitives
 * Lock-free and dual-mode coordination building blocks
 *
 * Three independent components, no shared state between them:
 *
 * - `RingBuffer`: bounded MPMC lock-free queue with sequence-tagged slots
 * - `HybridLock`: exclusive lock acquirable by blocking a thread or by
 *   awaiting, with FIFO-consistent fairness across the two modes
 * - `ManualResetEvent` / `AutoResetEvent`: awaitable signal gates
 *
 * Typical consumers are object pools (ring buffer as a free list) and
 * coordination code that needs a mutex it can sometimes await instead
 * of blocking on.
 */

pub mod config;
pub mod errors;
pub mod event;
pub mod lock;
pub mod ring;

// Re-exports
pub use config::SpinConfig;
pub use errors::CapacityError;
pub use event::{AutoResetEvent, ManualResetEvent, SignalFuture, WaitFuture};
pub use lock::{EnterFuture, HybridLock};
pub use ring::RingBuffer;
