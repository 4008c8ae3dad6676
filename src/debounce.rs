//! Debounce coordinator.
//!
//! One [`Debouncer`] per reactive input. Each [`schedule`](Debouncer::schedule)
//! aborts the pending timer and starts a new one tagged with a fresh ticket.
//! When a timer elapses it calls its `on_fire` callback with that ticket; the
//! owner then calls [`fire`](Debouncer::fire), which hands back the value only
//! if the ticket is still current. A superseded timer can therefore never
//! deliver an intermediate value, even if its abort raced with the wakeup.
//!
//! ```text
//!   schedule        schedule         elapsed
//! Idle ──▶ Pending(t1) ──▶ Pending(t2) ──▶ fire(t2) ──▶ Idle
//!                              │
//!                     flush / cancel ──▶ Idle
//! ```

use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending,
}

pub struct Debouncer<T> {
    delay: Duration,
    ticket: u64,
    pending: Option<T>,
    timer: Option<JoinHandle<()>>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ticket: 0,
            pending: None,
            timer: None,
        }
    }

    pub fn state(&self) -> DebounceState {
        if self.pending.is_some() {
            DebounceState::Pending
        } else {
            DebounceState::Idle
        }
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// Replace the pending value and restart the timer. Returns the new
    /// ticket. Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, value: T, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.abort_timer();
        self.ticket += 1;
        let ticket = self.ticket;
        let delay = self.delay;
        self.pending = Some(value);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(ticket);
        }));
        ticket
    }

    /// Take the settled value if `ticket` is the current one.
    pub fn fire(&mut self, ticket: u64) -> Option<T> {
        if ticket != self.ticket {
            tracing::debug!(ticket, current = self.ticket, "superseded debounce timer");
            return None;
        }
        self.timer = None;
        self.pending.take()
    }

    /// Cancel the timer and take the pending value immediately.
    pub fn flush(&mut self) -> Option<T> {
        self.abort_timer();
        self.pending.take()
    }

    /// Cancel the timer and drop the pending value.
    pub fn cancel(&mut self) {
        self.abort_timer();
        self.pending = None;
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.abort_timer();
    }
}
