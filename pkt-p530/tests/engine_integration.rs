//! Black-box tests driving the engine through its public API only: a fake
//! in-memory UART, a manually-advanced clock, and the `Action` catalogue.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use pkt_p530::action::{self, ActionArgs, LedTarget};
use pkt_p530::protocol;
use pkt_p530::{Action, Clock, Engine, ErrorCode, Uart};

struct UartState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

/// A fake UART whose receive queue can still be fed from outside after the
/// engine has taken ownership of it, by cloning the handle before handing
/// one copy to `Engine::new`.
#[derive(Clone)]
struct SharedUart(Rc<RefCell<UartState>>);

impl SharedUart {
    fn new() -> Self {
        SharedUart(Rc::new(RefCell::new(UartState { rx: VecDeque::new(), tx: Vec::new() })))
    }

    fn push_frame(&self, type_: u8, seq: u8, payload: &[u8]) {
        let mut frame = Vec::new();
        protocol::encode(type_, seq, payload, &mut frame);
        self.0.borrow_mut().rx.extend(frame);
    }

    fn push_bytes(&self, bytes: impl IntoIterator<Item = u8>) {
        self.0.borrow_mut().rx.extend(bytes);
    }

    fn last_sent_seq(&self) -> u8 {
        decode_all(&self.0.borrow().tx).last().expect("at least one frame sent").seq
    }
}

impl Uart for SharedUart {
    fn available(&mut self) -> usize {
        self.0.borrow().rx.len()
    }
    fn read_byte(&mut self) -> Option<u8> {
        self.0.borrow_mut().rx.pop_front()
    }
    fn read_array(&mut self, buf: &mut [u8]) -> bool {
        let mut state = self.0.borrow_mut();
        if state.rx.len() < buf.len() {
            return false;
        }
        for slot in buf.iter_mut() {
            *slot = state.rx.pop_front().unwrap();
        }
        true
    }
    fn write_array(&mut self, buf: &[u8]) -> bool {
        self.0.borrow_mut().tx.extend_from_slice(buf);
        true
    }
}

/// Walks a buffer of back-to-back encoded frames (as produced by `encode`,
/// never corrupted) and decodes each one in order.
fn decode_all(tx: &[u8]) -> Vec<protocol::Decoded> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tx.len() {
        let len = tx[i + 2] as usize;
        out.push(protocol::decode(&tx[i..i + len]).expect("engine only ever writes valid frames"));
        i += len;
    }
    out
}

struct ManualClock(Rc<RefCell<u64>>);

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        *self.0.borrow()
    }
}

#[test]
fn led_ctl_round_trip_completes_after_ack() {
    let uart = SharedUart::new();
    let uart_handle = uart.clone();
    let mut engine = Engine::new(Box::new(uart), Box::new(ManualClock(Rc::new(RefCell::new(0)))));

    let done = Rc::new(RefCell::new(false));
    let done_cb = done.clone();
    Action::new(&action::LED_CTL).play(
        &mut engine,
        ActionArgs::Led { target: LedTarget::UpperLed, on_ms: 100, off_ms: 100, count: 1 },
        move |_e| *done_cb.borrow_mut() = true,
    );

    assert!(!*done.borrow());
    let seq = uart_handle.last_sent_seq();
    uart_handle.push_frame(protocol::req::LED_CTL, seq, &protocol::ACK_PAYLOAD);
    engine.tick();
    assert!(*done.borrow());
}

#[test]
fn dispense_without_food_never_touches_the_uart() {
    let uart = SharedUart::new();
    let uart_handle = uart.clone();
    let mut engine = Engine::new(Box::new(uart), Box::new(ManualClock(Rc::new(RefCell::new(0)))));

    let error_code = Rc::new(RefCell::new(None));
    let error_cb = error_code.clone();
    Action::new(&action::DISPENSE).play_with_error(
        &mut engine,
        ActionArgs::Portions(2),
        |_e| panic!("must not complete without food"),
        move |_e, code| *error_cb.borrow_mut() = Some(code),
    );

    assert_eq!(*error_code.borrow(), Some(ErrorCode::NoFood));
    assert!(uart_handle.0.borrow().tx.is_empty());
}

#[test]
fn door_open_blocked_notifies_observer_and_error_chain() {
    let uart = SharedUart::new();
    let uart_handle = uart.clone();
    let mut engine = Engine::new(Box::new(uart), Box::new(ManualClock(Rc::new(RefCell::new(0)))));

    let blocked = Rc::new(RefCell::new(false));
    let blocked_obs = blocked.clone();
    engine.on_door_blocked(move || *blocked_obs.borrow_mut() = true);

    let error_code = Rc::new(RefCell::new(None));
    let error_cb = error_code.clone();
    Action::new(&action::OPEN_DOOR).play_with_error(
        &mut engine,
        ActionArgs::Duration(0x1E),
        |_e| panic!("must not complete"),
        move |_e, code| *error_cb.borrow_mut() = Some(code),
    );

    let seq = uart_handle.last_sent_seq();
    uart_handle.push_frame(protocol::req::OPEN_DOOR, seq, &protocol::ACK_PAYLOAD);
    engine.tick();
    uart_handle.push_frame(protocol::report::DOOR_OPEN_DONE, seq, &[0x03, 0x00, 0x00]);
    engine.tick();

    assert!(*blocked.borrow());
    assert_eq!(*error_code.borrow(), Some(ErrorCode::DoorBlocked));
}

#[test]
fn unclaimed_error_falls_back_to_the_global_observer() {
    let uart = SharedUart::new();
    let clock_ms = Rc::new(RefCell::new(0u64));
    let mut engine = Engine::new(Box::new(uart), Box::new(ManualClock(clock_ms.clone())));

    let saw_error = Rc::new(RefCell::new(None));
    let saw_error_cb = saw_error.clone();
    engine.on_error(move |code| *saw_error_cb.borrow_mut() = Some(code));

    Action::new(&action::GET_STATUS).play(&mut engine, ActionArgs::None, |_e| panic!("must not complete"));

    *clock_ms.borrow_mut() = 5_000;
    engine.tick();

    assert_eq!(*saw_error.borrow(), Some(ErrorCode::Timeout));
}

#[test]
fn get_status_report_updates_the_cache_even_without_an_in_flight_action() {
    let uart = SharedUart::new();
    uart.push_frame(protocol::report::STATUS, 0xFF, &[0x01, 0x01, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);
    let mut engine = Engine::new(Box::new(uart), Box::new(ManualClock(Rc::new(RefCell::new(0)))));

    engine.tick();

    assert!(engine.is_ready());
    assert!(engine.has_food());
    assert!(engine.status().door_open_now());
}

#[test]
fn corrupt_byte_burst_still_yields_exactly_the_two_valid_reports() {
    let uart = SharedUart::new();

    let mut p1 = Vec::new();
    protocol::encode(protocol::report::STATUS, 0xFF, &[0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0], &mut p1);
    let mut p2 = Vec::new();
    protocol::encode(protocol::report::STATUS, 0xFF, &[0x01, 0x01, 0x01, 0, 0, 0, 0, 0, 0, 0, 0], &mut p2);
    let mut corrupt = p2.clone();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;

    uart.push_bytes([0xFF, 0xFF]);
    uart.push_bytes(p1.iter().copied());
    uart.push_bytes([0xAA]);
    uart.push_bytes(corrupt.iter().copied());
    uart.push_bytes(p2.iter().copied());

    let mut engine = Engine::new(Box::new(uart), Box::new(ManualClock(Rc::new(RefCell::new(0)))));
    engine.tick();

    assert!(engine.has_food(), "the second, valid STATUS frame should have won");
}

#[test]
fn init_sequence_reaches_the_final_status_round_trip() {
    let uart = SharedUart::new();
    let uart_handle = uart.clone();
    let mut engine = Engine::new(Box::new(uart), Box::new(ManualClock(Rc::new(RefCell::new(0)))));

    let done = Rc::new(RefCell::new(false));
    let done_cb = done.clone();
    action::play_init(&mut engine, move |_e| *done_cb.borrow_mut() = true, |_e, code| panic!("unexpected init error: {code}"));

    for _ in 0..8 {
        engine.tick();
    }
    assert!(!*done.borrow(), "still waiting on the final GET_STATUS round trip");

    let frames = decode_all(&uart_handle.0.borrow().tx);
    let final_status = frames.iter().rev().find(|f| f.type_ == protocol::req::GET_STATUS).expect("a final GET_STATUS was sent");
    let seq = final_status.seq;

    uart_handle.push_frame(protocol::req::GET_STATUS, seq, &protocol::ACK_PAYLOAD);
    engine.tick();
    uart_handle.push_frame(protocol::report::STATUS, seq, &[0x00, 0x01, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);
    engine.tick();

    assert!(*done.borrow());
}
