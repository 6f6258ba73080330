/*!
 * Auto-Reset Event
 *
 * Single-consumer gate: each set wakes exactly one waiter, or latches
 * one pending signal when nobody is waiting. The latch never stacks:
 * two sets with no waiters still release only the single next waiter.
 */

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// A queued waiter
struct WaitCell {
    state: Mutex<CellState>,
}

struct CellState {
    /// A signal has been delivered to this waiter
    complete: bool,
    waker: Option<Waker>,
}

impl WaitCell {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CellState {
                complete: false,
                waker: None,
            }),
        })
    }

    /// Deliver the signal; the returned waker is invoked after the
    /// event lock is dropped.
    fn complete(&self) -> Option<Waker> {
        let mut state = self.state.lock();
        state.complete = true;
        state.waker.take()
    }

    fn is_complete(&self) -> bool {
        self.state.lock().complete
    }
}

struct AutoState {
    /// One pending signal, consumed by the next wait request
    signaled: bool,
    /// FIFO of waiters registered before any signal arrived
    waiters: VecDeque<Arc<WaitCell>>,
}

/// Single-consumer awaitable gate
///
/// # Examples
///
/// ```
/// use hybrid_sync::AutoResetEvent;
///
/// let event = AutoResetEvent::new();
/// event.set();
/// event.set(); // no waiters: still just one latched signal
///
/// futures::executor::block_on(event.wait()); // consumes the latch
/// ```
pub struct AutoResetEvent {
    state: Mutex<AutoState>,
}

impl AutoResetEvent {
    /// Create an unsignaled event
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AutoState {
                signaled: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Wake the oldest waiter, or latch one signal if nobody waits
    pub fn set(&self) {
        let waker = {
            let mut state = self.state.lock();
            Self::deliver(&mut state)
        };

        // Wake outside the lock
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Hand one signal to the next recipient while the event lock is
    /// held: the oldest queued waiter, or the latch.
    fn deliver(state: &mut AutoState) -> Option<Waker> {
        match state.waiters.pop_front() {
            Some(cell) => cell.complete(),
            None => {
                state.signaled = true;
                None
            }
        }
    }

    /// Future completing when a signal is delivered to this waiter.
    ///
    /// A latched signal is consumed immediately; otherwise the waiter
    /// joins the FIFO. The request takes effect at call time, so
    /// hand-off order is the order of `wait` calls, not of first polls.
    /// Dropping an undelivered waiter re-posts its signal rather than
    /// losing it.
    pub fn wait(&self) -> SignalFuture<'_> {
        let mut state = self.state.lock();

        if state.signaled {
            state.signaled = false;
            return SignalFuture {
                event: self,
                inner: SignalState::Ready { delivered: false },
            };
        }

        let cell = WaitCell::new();
        state.waiters.push_back(Arc::clone(&cell));
        SignalFuture {
            event: self,
            inner: SignalState::Queued {
                cell,
                delivered: false,
            },
        }
    }
}

impl Default for AutoResetEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AutoResetEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AutoResetEvent")
            .field("signaled", &state.signaled)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

enum SignalState {
    /// Latch consumed at `wait` time; the first poll reports it
    Ready { delivered: bool },
    /// Queued; resolved by a later `set`
    Queued {
        cell: Arc<WaitCell>,
        delivered: bool,
    },
}

/// Future returned by [`AutoResetEvent::wait`]
#[must_use = "dropping this future re-posts any signal it consumed"]
pub struct SignalFuture<'a> {
    event: &'a AutoResetEvent,
    inner: SignalState,
}

impl Future for SignalFuture<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = Pin::into_inner(self);
        match &mut this.inner {
            SignalState::Ready { delivered } => {
                *delivered = true;
                Poll::Ready(())
            }
            SignalState::Queued { cell, delivered } => {
                let mut state = cell.state.lock();
                if state.complete {
                    *delivered = true;
                    return Poll::Ready(());
                }
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Drop for SignalFuture<'_> {
    fn drop(&mut self) {
        match &self.inner {
            SignalState::Ready { delivered } => {
                if !*delivered {
                    // The latch was consumed at wait time; return it.
                    self.event.set();
                }
            }
            SignalState::Queued { cell, delivered } => {
                if *delivered {
                    return;
                }

                let mut state = self.event.state.lock();
                if let Some(position) = state
                    .waiters
                    .iter()
                    .position(|queued| Arc::ptr_eq(queued, cell))
                {
                    state.waiters.remove(position);
                    return;
                }

                // Already dequeued: a set delivered into this abandoned
                // waiter. Pass the signal on under the same lock so it
                // cannot vanish.
                debug_assert!(cell.is_complete());
                let waker = AutoResetEvent::deliver(&mut state);
                drop(state);
                if let Some(waker) = waker {
                    waker.wake();
                }
            }
        }
    }
}
