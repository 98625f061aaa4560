//! Ties the Frame Codec, Link Layer, Status Cache, Waiter Registry and
//! Action Framework into the engine's public surface.

use std::collections::VecDeque;

use tracing::info;

use crate::action::Continuation;
use crate::error::ErrorCode;
use crate::io::{Clock, Uart};
use crate::link::Link;
use crate::protocol::report;
use crate::status::{StatusCache, StatusReport};
use crate::waiter::{WaiterCallback, WaiterRegistry};

#[derive(Default)]
struct Observers {
    on_error: Option<Box<dyn FnMut(ErrorCode)>>,
    on_door_blocked: Option<Box<dyn FnMut()>>,
    on_dispense_complete: Option<Box<dyn FnMut(u8)>>,
    door_open_sensor: Option<Box<dyn FnMut(bool)>>,
    door_issue_sensor: Option<Box<dyn FnMut(bool)>>,
    food_low_sensor: Option<Box<dyn FnMut(bool)>>,
    last_portions_sensor: Option<Box<dyn FnMut(u8)>>,
    total_portions_sensor: Option<Box<dyn FnMut(u32)>>,
}

/// The P530 engine. Owns the transport, the cooperative state for every
/// in-flight request, and the observer hooks a host wires up.
pub struct Engine {
    uart: Box<dyn Uart>,
    clock: Box<dyn Clock>,
    link: Link,
    waiters: WaiterRegistry,
    status: StatusCache,
    pending: VecDeque<Continuation>,
    observers: Observers,
    total_portions: u32,
}

impl Engine {
    pub fn new(uart: Box<dyn Uart>, clock: Box<dyn Clock>) -> Self {
        Self {
            uart,
            clock,
            link: Link::new(),
            waiters: WaiterRegistry::default(),
            status: StatusCache::default(),
            pending: VecDeque::new(),
            observers: Observers::default(),
            total_portions: 0,
        }
    }

    // --- §6 upstream host interface ---------------------------------

    /// Non-blocking send; returns `protocol::MAX_SEQ` on UART failure.
    pub fn send(&mut self, type_: u8, payload: &[u8]) -> u8 {
        self.link.send(self.uart.as_mut(), type_, payload)
    }

    pub fn add_report_waiter(&mut self, type_: u8, seq: u8, timeout_ms: u32, callback: WaiterCallback) {
        let now = self.clock.now_ms();
        self.waiters.register(type_, seq, timeout_ms, now, callback);
    }

    /// Drains deferred continuations, drains the UART, and expires timed
    /// out waiters. Must be called repeatedly by the host runtime; never
    /// blocks.
    pub fn tick(&mut self) {
        while let Some(step) = self.pending.pop_front() {
            step(self);
        }

        while let Some(frame) = self.link.poll(self.uart.as_mut()) {
            self.handle_frame(frame.type_, frame.seq, &frame.payload);
        }

        let now = self.clock.now_ms();
        let mut registry = std::mem::take(&mut self.waiters);
        registry.expire(self, now);
        self.merge_waiters(registry);
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    pub fn has_food(&self) -> bool {
        self.status.has_food()
    }

    pub fn status(&self) -> StatusReport {
        self.status.get()
    }

    pub fn on_error(&mut self, cb: impl FnMut(ErrorCode) + 'static) {
        self.observers.on_error = Some(Box::new(cb));
    }

    pub fn on_door_blocked(&mut self, cb: impl FnMut() + 'static) {
        self.observers.on_door_blocked = Some(Box::new(cb));
    }

    pub fn on_dispense_complete(&mut self, cb: impl FnMut(u8) + 'static) {
        self.observers.on_dispense_complete = Some(Box::new(cb));
    }

    pub fn set_door_open_sensor(&mut self, cb: impl FnMut(bool) + 'static) {
        self.observers.door_open_sensor = Some(Box::new(cb));
    }

    pub fn set_door_issue_sensor(&mut self, cb: impl FnMut(bool) + 'static) {
        self.observers.door_issue_sensor = Some(Box::new(cb));
    }

    pub fn set_food_low_sensor(&mut self, cb: impl FnMut(bool) + 'static) {
        self.observers.food_low_sensor = Some(Box::new(cb));
    }

    pub fn set_last_portions_sensor(&mut self, cb: impl FnMut(u8) + 'static) {
        self.observers.last_portions_sensor = Some(Box::new(cb));
    }

    pub fn set_total_portions_sensor(&mut self, cb: impl FnMut(u32) + 'static) {
        self.observers.total_portions_sensor = Some(Box::new(cb));
    }

    // --- crate-internal plumbing -------------------------------------

    pub(crate) fn notify_error(&mut self, code: ErrorCode) {
        if let Some(cb) = self.observers.on_error.as_mut() {
            cb(code);
        }
    }

    pub(crate) fn notify_door_blocked(&mut self) {
        if let Some(cb) = self.observers.on_door_blocked.as_mut() {
            cb();
        }
    }

    pub(crate) fn notify_dispense_complete(&mut self, portions: u8) {
        self.total_portions += portions as u32;
        if let Some(cb) = self.observers.last_portions_sensor.as_mut() {
            cb(portions);
        }
        if let Some(cb) = self.observers.total_portions_sensor.as_mut() {
            cb(self.total_portions);
        }
        if let Some(cb) = self.observers.on_dispense_complete.as_mut() {
            cb(portions);
        }
    }

    /// Queues a continuation to run at the top of the next `tick()`,
    /// bounding the native call-stack depth of long Action chains that
    /// would otherwise recurse synchronously.
    pub(crate) fn defer(&mut self, step: Continuation) {
        self.pending.push_back(step);
    }

    #[cfg(test)]
    pub(crate) fn waiters_mut(&mut self) -> &mut WaiterRegistry {
        &mut self.waiters
    }

    #[cfg(test)]
    pub(crate) fn last_outgoing_seq(&self) -> u8 {
        self.link.last_seq()
    }

    #[cfg(test)]
    pub(crate) fn deliver_test_frame(&mut self, type_: u8, seq: u8, payload: &[u8]) {
        self.handle_frame(type_, seq, payload);
    }

    fn handle_frame(&mut self, type_: u8, seq: u8, payload: &[u8]) {
        match type_ {
            report::STATUS => {
                if let Some(status) = self.status.update(payload) {
                    if let Some(cb) = self.observers.food_low_sensor.as_mut() {
                        cb(!status.has_food());
                    }
                    if let Some(cb) = self.observers.door_open_sensor.as_mut() {
                        cb(status.door_open_now());
                    }
                }
            }
            report::DOOR_OPEN_DONE | report::DOOR_CLOSE_DONE => {
                if let Some(&ok_byte) = payload.first() {
                    let blocked = ok_byte != 0x02;
                    if let Some(cb) = self.observers.door_issue_sensor.as_mut() {
                        cb(blocked);
                    }
                    if blocked {
                        info!(type_ = format_args!("{type_:#04x}"), status = format_args!("{ok_byte:#04x}"), "door report: blocked");
                    } else {
                        info!(type_ = format_args!("{type_:#04x}"), "door report: opened/closed");
                    }
                }
            }
            report::DISPENSE_DONE => {
                if payload.len() >= 3 && payload[2] == 0x01 {
                    info!(portions = payload[0], "dispense complete");
                }
            }
            _ => {}
        }

        let mut registry = std::mem::take(&mut self.waiters);
        registry.dispatch(self, type_, seq, payload);
        self.merge_waiters(registry);
    }

    /// Recombines the leftover (un-consumed) waiters from a just-finished
    /// dispatch/expire pass with any new waiters a callback registered
    /// into `self.waiters` while that pass ran, preserving the order
    /// established in §4.4 (older waiters first).
    fn merge_waiters(&mut self, mut previous: WaiterRegistry) {
        let newly_registered = std::mem::take(&mut self.waiters);
        previous.append(newly_registered);
        self.waiters = previous;
    }
}
