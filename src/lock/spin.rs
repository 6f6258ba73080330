/*!
 * Bounded Optimistic Spin
 *
 * Brief spin before falling back to parking, for the common case where
 * the owner exits within a few hundred nanoseconds.
 */

use crate::config::SpinConfig;
use std::hint;
use std::thread;

/// Spin until `check` returns true or the budget is exhausted.
///
/// Returns true if the condition was observed within budget.
pub(crate) fn spin_until(config: &SpinConfig, check: impl Fn() -> bool) -> bool {
    let mut spins = 0;
    loop {
        if check() {
            return true;
        }

        if spins >= config.max_spins {
            return false;
        }

        // Yield to the scheduler occasionally
        if config.yield_every > 0 && spins % config.yield_every == 0 {
            thread::yield_now();
        } else {
            hint::spin_loop();
        }

        spins += 1;
    }
}
