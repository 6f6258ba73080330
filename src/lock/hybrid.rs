/*!
 * Dual-Mode Exclusive Lock
 *
 * A mutual-exclusion primitive that can be acquired by blocking the
 * calling thread (`enter`) or by awaiting (`enter_async`). Both paths
 * contend for one owner token, and waiters are served in a single
 * FIFO-consistent order across the two modes.
 *
 * # Fairness
 *
 * `exit` hands ownership off cooperatively instead of releasing into a
 * free-for-all:
 *
 * - A thread parked on the internal condvar is served first; it already
 *   pins an OS thread, while async waiters are cheap to reschedule.
 * - Otherwise the head of the waiter queue is completed.
 * - A blocking caller that arrives while async waiters are queued does
 *   not barge: it appends a thread-parking node to the same queue.
 *   Condvar waiters therefore always predate everything in the queue,
 *   which keeps the two-tier wake policy consistent with arrival order.
 *
 * # Reentrancy
 *
 * Not reentrant: a second `enter` by the current owner queues like any
 * other caller.
 */

use super::spin::spin_until;
use super::waiters::{WaitNode, WaiterKey, WaiterList, WakeHandle};
use crate::config::SpinConfig;
use log::trace;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;

/// State behind the internal mutex.
///
/// The mutex is held only for O(1) bookkeeping, never across a park or
/// a suspension point.
struct LockState {
    /// Owner token: true while some caller is inside
    entered: bool,
    /// Threads parked on the condvar (fairness-path threads live in
    /// `queue` instead)
    sync_waiters: usize,
    /// A pulse was issued: ownership is reserved for whichever condvar
    /// waiter wakes next. Exclusivity bounds this to one outstanding.
    handoff: bool,
    /// FIFO of async waiters plus fairness-path blocking waiters
    queue: WaiterList,
}

/// Exclusive lock with blocking and asynchronous acquisition
///
/// # Examples
///
/// ```
/// use hybrid_sync::HybridLock;
///
/// let lock = HybridLock::new();
///
/// assert!(lock.enter());
/// assert!(lock.is_entered());
/// lock.exit();
///
/// futures::executor::block_on(async {
///     assert!(lock.enter_async().await);
///     lock.exit();
/// });
/// ```
pub struct HybridLock {
    state: Mutex<LockState>,
    /// Sync waiters park here; woken one at a time on handoff
    lock_available: Condvar,
    /// Advisory mirror of `entered` for the spin phase and `is_entered`
    owned: AtomicBool,
    spin: SpinConfig,
}

impl HybridLock {
    /// Create an unowned lock with default spin tuning
    pub fn new() -> Self {
        Self::with_config(SpinConfig::default())
    }

    /// Create an unowned lock with explicit spin tuning
    pub fn with_config(spin: SpinConfig) -> Self {
        Self {
            state: Mutex::new(LockState {
                entered: false,
                sync_waiters: 0,
                handoff: false,
                queue: WaiterList::new(),
            }),
            lock_available: Condvar::new(),
            owned: AtomicBool::new(false),
            spin,
        }
    }

    /// Whether some caller currently owns the lock.
    ///
    /// Advisory only: the answer may be stale by the time it is read
    /// and must not drive synchronization decisions.
    #[inline]
    pub fn is_entered(&self) -> bool {
        self.owned.load(Ordering::Relaxed)
    }

    /// Acquire the lock, blocking the calling thread.
    ///
    /// Spins briefly while the lock looks held before parking. If async
    /// waiters are already queued, this caller joins the back of that
    /// queue rather than cutting in front of them, so cross-mode
    /// arrival order decides who runs next.
    pub fn enter(&self) -> bool {
        if self.owned.load(Ordering::Acquire) {
            // Owners often exit within the spin budget; skip parking.
            spin_until(&self.spin, || !self.owned.load(Ordering::Acquire));
        }

        let mut state = self.state.lock();

        if !state.queue.is_empty() {
            // Async waiters arrived first; wait in the same queue on a
            // thread-parking node.
            let node = WaitNode::new(Some(WakeHandle::Thread(thread::current())));
            state.queue.push_back(Arc::clone(&node));
            drop(state);

            trace!("enter: queued behind async waiters");
            while !node.is_complete() {
                thread::park();
            }
            return true;
        }

        state.sync_waiters += 1;
        while state.entered && !state.handoff {
            self.lock_available.wait(&mut state);
        }

        if state.handoff {
            // An exit reserved ownership for us; consume the pulse.
            // `entered` stayed true throughout the handoff.
            state.handoff = false;
        } else {
            state.entered = true;
            self.owned.store(true, Ordering::Release);
        }
        state.sync_waiters -= 1;

        true
    }

    /// Acquire the lock without blocking a thread.
    ///
    /// If the lock is free this claims it immediately and the returned
    /// future is already complete. Otherwise a waiter node joins the
    /// queue now (the position is decided by this call, not by the
    /// first poll) and the future resolves once an [`HybridLock::exit`]
    /// hands ownership to it.
    ///
    /// Dropping the future before completion abandons the wait with an
    /// O(1) unlink. A future dropped after losing that race (ownership
    /// already transferred to it) releases the lock onward, so no
    /// wakeup is lost.
    pub fn enter_async(&self) -> EnterFuture<'_> {
        let mut state = self.state.lock();

        if !state.entered {
            debug_assert!(state.queue.is_empty(), "waiters queued on a free lock");
            state.entered = true;
            self.owned.store(true, Ordering::Release);
            return EnterFuture {
                lock: self,
                inner: FutureState::Acquired { delivered: false },
            };
        }

        let node = WaitNode::new(None);
        let key = state.queue.push_back(Arc::clone(&node));
        EnterFuture {
            lock: self,
            inner: FutureState::Waiting {
                node,
                key,
                delivered: false,
            },
        }
    }

    /// Release the lock, handing ownership to the next waiter if any.
    ///
    /// # Panics
    ///
    /// Panics when the lock is not entered: releasing without a
    /// matching acquisition is a usage fault, never tolerated or
    /// retried.
    pub fn exit(&self) {
        let state = self.state.lock();
        assert!(state.entered, "HybridLock::exit called while not entered");
        debug_assert!(!state.handoff, "exit during a pending handoff");
        self.release(state);
    }

    /// Wake policy shared by `exit` and future cancellation.
    ///
    /// Takes the guard by value so wakes happen after the internal
    /// mutex is dropped.
    fn release(&self, mut state: MutexGuard<'_, LockState>) {
        if state.sync_waiters > 0 {
            // Parked threads first. The lock stays logically owned and
            // the pulsed waiter inherits it, so nobody can barge in
            // between the pulse and the wakeup.
            state.handoff = true;
            self.lock_available.notify_one();
            trace!("exit: pulsed a parked thread");
            return;
        }

        if let Some(node) = state.queue.pop_front() {
            // Ownership transfers to the queue head; `entered` stays
            // set on its behalf.
            let wake = node.complete();
            drop(state);
            trace!("exit: completed queue head");
            if let Some(wake) = wake {
                wake.wake();
            }
            return;
        }

        state.entered = false;
        self.owned.store(false, Ordering::Release);
    }
}

impl Default for HybridLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HybridLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridLock")
            .field("entered", &self.is_entered())
            .finish()
    }
}

enum FutureState {
    /// Claimed at `enter_async` time; the first poll reports it
    Acquired { delivered: bool },
    /// Queued; resolved by a later `exit`
    Waiting {
        node: Arc<WaitNode>,
        key: WaiterKey,
        delivered: bool,
    },
}

/// Future returned by [`HybridLock::enter_async`]; resolves to `true`
/// once the caller owns the lock
#[must_use = "dropping this future abandons the acquisition"]
pub struct EnterFuture<'a> {
    lock: &'a HybridLock,
    inner: FutureState,
}

impl Future for EnterFuture<'_> {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        let this = Pin::into_inner(self);
        match &mut this.inner {
            FutureState::Acquired { delivered } => {
                *delivered = true;
                Poll::Ready(true)
            }
            FutureState::Waiting {
                node, delivered, ..
            } => {
                if node.register(WakeHandle::Task(cx.waker().clone())) {
                    Poll::Pending
                } else {
                    // Completed before registration; ownership is ours.
                    *delivered = true;
                    Poll::Ready(true)
                }
            }
        }
    }
}

impl Drop for EnterFuture<'_> {
    fn drop(&mut self) {
        match &self.inner {
            FutureState::Acquired { delivered } => {
                if !*delivered {
                    // Claimed at enter_async time but never polled to
                    // completion; pass ownership on.
                    let state = self.lock.state.lock();
                    debug_assert!(state.entered);
                    self.lock.release(state);
                }
            }
            FutureState::Waiting {
                node,
                key,
                delivered,
            } => {
                if *delivered {
                    return;
                }

                let mut state = self.lock.state.lock();
                if state.queue.remove(*key, node) {
                    // Still pending; the wait is simply abandoned.
                    return;
                }

                // Lost the race: an exit already handed us the lock.
                // Release it onward instead of stranding every waiter.
                debug_assert!(node.is_complete());
                self.lock.release(state);
            }
        }
    }
}
