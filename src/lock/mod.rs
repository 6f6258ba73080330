/*!
 * Hybrid Exclusive Lock
 *
 * Mutual exclusion usable from blocking threads and async tasks against
 * the same primitive, with FIFO-consistent fairness across both modes.
 */

mod hybrid;
mod spin;
mod waiters;

pub use hybrid::{EnterFuture, HybridLock};
