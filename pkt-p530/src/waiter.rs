//! Registers interest in future frames by `(type, seq)` with a deadline.
//!
//! Callbacks take `&mut Engine` so that advancing an Action's state can
//! register further waiters or play a continuation chain without the
//! registry needing to know anything about Actions.

use tracing::debug;

use crate::engine::Engine;
use crate::error::ErrorCode;

/// `true` = the frame was the one this waiter was looking for, consume it.
/// `false` = not mine, keep waiting.
pub type WaiterCallback = Box<dyn FnMut(&mut Engine, ErrorCode, &[u8]) -> bool>;

struct Waiter {
    type_: u8,
    seq: u8,
    deadline_ms: u64,
    callback: WaiterCallback,
}

#[derive(Default)]
pub struct WaiterRegistry {
    waiters: Vec<Waiter>,
}

impl WaiterRegistry {
    pub fn register(&mut self, type_: u8, seq: u8, timeout_ms: u32, now_ms: u64, callback: WaiterCallback) {
        let deadline_ms = if timeout_ms > 0 { now_ms + timeout_ms as u64 } else { 0 };
        debug!(type_ = format_args!("{type_:#04x}"), seq, timeout_ms, "waiter registered");
        self.waiters.push(Waiter { type_, seq, deadline_ms, callback });
    }

    /// Routes a decoded frame to every currently-matching waiter, in
    /// registration order. A waiter that returns `false` is reinserted at
    /// the index it was removed from, so rejecting a frame never reorders
    /// the registry. Waiters registered by a callback during this call are
    /// appended after `remaining` and do not participate in this pass.
    pub fn dispatch(&mut self, engine: &mut Engine, type_: u8, seq: u8, payload: &[u8]) {
        let mut i = 0;
        let mut remaining = self.waiters.len();
        while i < remaining {
            let matches = self.waiters[i].type_ == type_
                && (self.waiters[i].seq == 0 || self.waiters[i].seq == seq);
            if !matches {
                i += 1;
                continue;
            }

            let mut waiter = self.waiters.remove(i);
            remaining -= 1;
            let consumed = (waiter.callback)(engine, ErrorCode::Ok, payload);
            if consumed {
                debug!(type_ = format_args!("{type_:#04x}"), seq, "waiter matched");
            } else {
                self.waiters.insert(i, waiter);
                i += 1;
            }
        }
    }

    /// Expires every waiter whose nonzero deadline has passed, invoking
    /// each with `(Timeout, &[])`. New registrations made by a callback do
    /// not participate in this pass.
    pub fn expire(&mut self, engine: &mut Engine, now_ms: u64) {
        let mut i = 0;
        let mut remaining = self.waiters.len();
        while i < remaining {
            let expired = self.waiters[i].deadline_ms != 0 && now_ms >= self.waiters[i].deadline_ms;
            if !expired {
                i += 1;
                continue;
            }

            let mut waiter = self.waiters.remove(i);
            remaining -= 1;
            debug!(type_ = format_args!("{:#04x}", waiter.type_), seq = waiter.seq, "waiter timeout");
            (waiter.callback)(engine, ErrorCode::Timeout, &[]);
        }
    }

    /// Appends waiters registered elsewhere (e.g. by a callback while this
    /// registry was taken out of the engine for a dispatch/expire pass) so
    /// they rejoin the registry after the older ones, preserving
    /// registration order.
    pub fn append(&mut self, mut other: WaiterRegistry) {
        self.waiters.append(&mut other.waiters);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.waiters.len()
    }
}
