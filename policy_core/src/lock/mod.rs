//! Fair reader-writer lock.
//!
//! Requests are served in arrival order. Consecutive readers with no writer
//! queued ahead of them run together as one batch; a writer waits for every
//! request ahead of it and then runs alone. A reader that arrives after a
//! waiting writer queues behind it, so a steady stream of readers can never
//! starve a writer.
//!
//! The protected value sits behind a `parking_lot::RwLock` that the fair gate
//! keeps uncontended; guards release the inner lock first and the gate second.


use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

#[derive(Debug, Default)]
struct GateState {
    /// Readers currently holding the lock.
    readers: usize,
    /// Whether a writer currently holds the lock.
    writer: bool,
    /// Pending requests in arrival order.
    queue: VecDeque<(u64, Access)>,
    next_ticket: u64,
}

impl GateState {
    fn enqueue(&mut self, access: Access) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.queue.push_back((ticket, access));
        ticket
    }

    fn can_grant(&self, ticket: u64, access: Access) -> bool {
        if self.writer {
            return false;
        }

        match access {
            Access::Write => {
                self.readers == 0 && self.queue.front().map(|(t, _)| *t) == Some(ticket)
            }
            // A reader only needs every request ahead of it to be a reader too.
            Access::Read => {
                for (queued, kind) in &self.queue {
                    if *queued == ticket {
                        return true;
                    }
                    if *kind == Access::Write {
                        return false;
                    }
                }
                false
            }
        }
    }

    fn dequeue(&mut self, ticket: u64) {
        if let Some(pos) = self.queue.iter().position(|(t, _)| *t == ticket) {
            self.queue.remove(pos);
        }
    }

    fn has_pending_writer(&self) -> bool {
        self.queue.iter().any(|(_, kind)| *kind == Access::Write)
    }
}

#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    fn acquire(&self, access: Access) {
        let mut state = self.state.lock();
        let ticket = state.enqueue(access);

        while !state.can_grant(ticket, access) {
            trace!(ticket, ?access, "waiting for fair lock");
            self.cond.wait(&mut state);
        }

        state.dequeue(ticket);
        match access {
            Access::Read => state.readers += 1,
            Access::Write => state.writer = true,
        }
    }

    fn try_acquire(&self, access: Access) -> bool {
        let mut state = self.state.lock();
        if state.writer {
            return false;
        }

        match access {
            Access::Read if !state.has_pending_writer() => {
                state.readers += 1;
                true
            }
            Access::Write if state.readers == 0 && state.queue.is_empty() => {
                state.writer = true;
                true
            }
            _ => false,
        }
    }

    fn release(&self, access: Access) {
        {
            let mut state = self.state.lock();
            match access {
                Access::Read => state.readers -= 1,
                Access::Write => state.writer = false,
            }
        }
        self.cond.notify_all();
    }
}

/// Releases one gate grant on drop.
struct Grant<'a> {
    gate: &'a Gate,
    access: Access,
}

impl Drop for Grant<'_> {
    fn drop(&mut self) {
        self.gate.release(self.access);
    }
}

/// A reader-writer lock with FIFO, writer-preferring fairness.
///
/// The lock is not reentrant: acquiring it again from a thread that already
/// holds a guard deadlocks as soon as a writer is queued in between.
pub struct FairRwLock<T> {
    gate: Gate,
    data: RwLock<T>,
}

impl<T> FairRwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            gate: Gate::default(),
            data: RwLock::new(value),
        }
    }

    /// Block until shared access is granted.
    pub fn read(&self) -> FairReadGuard<'_, T> {
        self.gate.acquire(Access::Read);
        let grant = Grant {
            gate: &self.gate,
            access: Access::Read,
        };
        FairReadGuard {
            data: self.data.read(),
            _grant: grant,
        }
    }

    /// Block until exclusive access is granted.
    pub fn write(&self) -> FairWriteGuard<'_, T> {
        self.gate.acquire(Access::Write);
        let grant = Grant {
            gate: &self.gate,
            access: Access::Write,
        };
        FairWriteGuard {
            data: self.data.write(),
            _grant: grant,
        }
    }

    /// Shared access without waiting, only if it would not overtake a queued writer.
    pub fn try_read(&self) -> Option<FairReadGuard<'_, T>> {
        if !self.gate.try_acquire(Access::Read) {
            return None;
        }
        let grant = Grant {
            gate: &self.gate,
            access: Access::Read,
        };
        Some(FairReadGuard {
            data: self.data.read(),
            _grant: grant,
        })
    }

    /// Exclusive access without waiting, only if the lock is idle.
    pub fn try_write(&self) -> Option<FairWriteGuard<'_, T>> {
        if !self.gate.try_acquire(Access::Write) {
            return None;
        }
        let grant = Grant {
            gate: &self.gate,
            access: Access::Write,
        };
        Some(FairWriteGuard {
            data: self.data.write(),
            _grant: grant,
        })
    }

    /// Whether any reader or writer currently holds the lock.
    pub fn is_locked(&self) -> bool {
        let state = self.gate.state.lock();
        state.writer || state.readers > 0
    }

    /// Number of requests waiting to be granted.
    pub fn queued(&self) -> usize {
        self.gate.state.lock().queue.len()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for FairRwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for FairRwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.gate.state.lock();
        f.debug_struct("FairRwLock")
            .field("readers", &state.readers)
            .field("writer", &state.writer)
            .field("queued", &state.queue.len())
            .finish_non_exhaustive()
    }
}

/// Shared access to a [`FairRwLock`]; released on drop.
pub struct FairReadGuard<'a, T> {
    // Field order matters: the data guard must drop before the grant.
    data: RwLockReadGuard<'a, T>,
    _grant: Grant<'a>,
}

impl<T> Deref for FairReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// Exclusive access to a [`FairRwLock`]; released on drop.
pub struct FairWriteGuard<'a, T> {
    data: RwLockWriteGuard<'a, T>,
    _grant: Grant<'a>,
}

impl<T> Deref for FairWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for FairWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}
