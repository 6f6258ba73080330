/*!
 * Awaitable Signal Gates
 *
 * "Completed" state observed through futures, with no lock held across
 * a suspension point:
 *
 * - `ManualResetEvent`: broadcast; stays set until explicitly reset
 * - `AutoResetEvent`: hands each signal to exactly one waiter
 */

mod auto;
mod manual;

pub use auto::{AutoResetEvent, SignalFuture};
pub use manual::{ManualResetEvent, WaitFuture};
