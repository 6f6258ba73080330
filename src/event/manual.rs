/*!
 * Manual-Reset Event
 *
 * Broadcast gate: once set, every waiter (past and future) observes
 * completion until the event is reset. Reset installs a fresh
 * generation with a compare-and-swap loop, so concurrent resets are
 * idempotent and a racing set is never lost.
 */

use arc_swap::ArcSwap;
use log::trace;
use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// One set/reset cycle of the event.
///
/// Waiters keep a reference to the generation they observed at wait
/// time; a later reset swaps in a new generation without disturbing
/// them, so a pre-reset waiter still sees its own generation complete.
struct Generation {
    state: Mutex<GenerationState>,
    /// Blocking waiters park here
    completed: Condvar,
}

struct GenerationState {
    complete: bool,
    wakers: Vec<Waker>,
}

impl Generation {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GenerationState {
                complete: false,
                wakers: Vec::new(),
            }),
            completed: Condvar::new(),
        })
    }

    fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    /// Complete this generation, waking everyone. Idempotent.
    fn complete(&self) {
        let wakers = {
            let mut state = self.state.lock();
            if state.complete {
                return;
            }
            state.complete = true;
            self.completed.notify_all();
            std::mem::take(&mut state.wakers)
        };

        trace!("manual-reset set: waking {} tasks", wakers.len());
        for waker in wakers {
            waker.wake();
        }
    }
}

/// Broadcast awaitable gate
///
/// # Examples
///
/// ```
/// use hybrid_sync::ManualResetEvent;
///
/// let event = ManualResetEvent::new();
/// let pending = event.wait();
///
/// event.set();
/// futures::executor::block_on(pending); // completes
///
/// event.reset();
/// assert!(!event.is_set());
/// ```
pub struct ManualResetEvent {
    current: ArcSwap<Generation>,
}

impl ManualResetEvent {
    /// Create an unsignaled event
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from(Generation::new()),
        }
    }

    /// Whether the event is currently set
    pub fn is_set(&self) -> bool {
        self.current.load().is_complete()
    }

    /// Set the event, releasing all current and future waiters.
    ///
    /// Idempotent: further sets before a reset are no-ops.
    pub fn set(&self) {
        self.current.load().complete();
    }

    /// Return the event to unsignaled.
    ///
    /// No-op while the event is not set. On a race with other resets
    /// exactly one fresh generation wins; a waiter that captured the
    /// old generation before this call still observes it as complete.
    pub fn reset(&self) {
        loop {
            let current = self.current.load_full();
            if !current.is_complete() {
                return;
            }

            let previous = self.current.compare_and_swap(&current, Generation::new());
            if Arc::ptr_eq(&*previous, &current) {
                return;
            }
            // Lost the swap race; re-examine the winner's generation.
        }
    }

    /// Future completing when the event is (or becomes) set.
    ///
    /// Snapshots the current generation: a reset issued after this call
    /// does not retract the wait.
    pub fn wait(&self) -> WaitFuture {
        WaitFuture {
            generation: self.current.load_full(),
            waker_slot: None,
        }
    }

    /// Block the calling thread until the event is set
    pub fn wait_blocking(&self) {
        let generation = self.current.load_full();
        let mut state = generation.state.lock();
        while !state.complete {
            generation.completed.wait(&mut state);
        }
    }
}

impl Default for ManualResetEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualResetEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualResetEvent")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Future returned by [`ManualResetEvent::wait`]
pub struct WaitFuture {
    generation: Arc<Generation>,
    /// Index of this task's waker in the generation, once registered
    waker_slot: Option<usize>,
}

impl Future for WaitFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = Pin::into_inner(self);
        let mut state = this.generation.state.lock();
        if state.complete {
            return Poll::Ready(());
        }

        // Wakers are only appended until completion drains them all,
        // so the slot index stays valid for re-registration.
        match this.waker_slot {
            Some(slot) => state.wakers[slot] = cx.waker().clone(),
            None => {
                state.wakers.push(cx.waker().clone());
                this.waker_slot = Some(state.wakers.len() - 1);
            }
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::task::noop_waker;

    #[test]
    fn test_set_is_idempotent() {
        let event = ManualResetEvent::new();
        assert!(!event.is_set());

        event.set();
        event.set();
        assert!(event.is_set());

        block_on(event.wait());
    }

    #[test]
    fn test_wait_after_set_completes_immediately() {
        let event = ManualResetEvent::new();
        event.set();
        block_on(event.wait());
    }

    #[test]
    fn test_reset_rearms() {
        let event = ManualResetEvent::new();
        event.set();
        event.reset();
        assert!(!event.is_set());

        // A wait taken after the reset is pending again.
        let mut pending = event.wait();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut pending).poll(&mut cx).is_pending());

        event.set();
        assert!(Pin::new(&mut pending).poll(&mut cx).is_ready());
    }

    #[test]
    fn test_reset_before_set_is_noop() {
        let event = ManualResetEvent::new();
        let pending = event.wait();

        // Resetting an unsignaled event must not replace the generation
        // out from under existing waiters.
        event.reset();
        event.set();
        block_on(pending);
    }

    #[test]
    fn test_pre_reset_waiter_still_completes() {
        let event = ManualResetEvent::new();
        let snapshot = event.wait();

        event.set();
        event.reset();

        // The waiter captured the completed generation; the reset only
        // affects waits requested after it.
        block_on(snapshot);
        assert!(!event.is_set());
    }

    #[test]
    fn test_multiple_waiters_released() {
        let event = ManualResetEvent::new();
        let first = event.wait();
        let second = event.wait();

        event.set();
        block_on(first);
        block_on(second);
    }
}
