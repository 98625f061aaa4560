//! Composable command objects (§4.5). A [`Action`] is a thin handle onto a
//! static, shared [`ActionDescriptor`]; all per-invocation state lives in an
//! [`ActionRun`] allocated by `play_complex` and released once the terminal
//! continuation plays.
//!
//! The lifecycle is modeled as an explicit `stage` field behind a single
//! `advance` dispatch function, rather than callbacks that capture
//! themselves, so the whole chain fits in one place instead of being spread
//! across a web of self-capturing bound-method callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::Engine;
use crate::error::ErrorCode;
use crate::protocol::{self, req, report};
use crate::status::StatusReport;

pub type OnComplete = Box<dyn FnOnce(&mut Engine)>;
pub type OnError = Box<dyn FnOnce(&mut Engine, ErrorCode)>;

/// A step queued by a long chain to run at the top of the next `tick()`,
/// keeping synchronous fire-and-forget chains from recursing natively.
pub type Continuation = Box<dyn FnOnce(&mut Engine)>;

const DEFAULT_ACK_TIMEOUT_MS: u32 = 1_000;
const DOOR_REPORT_TIMEOUT_MS: u32 = 10_000;
const STATUS_REPORT_TIMEOUT_MS: u32 = 5_000;
const PORTION_TIMEOUT_MS: u32 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedTarget {
    UpperLed = 1,
    LowerLed = 2,
    Beep = 3,
}

/// Per-invocation arguments. A given [`ActionDescriptor`] only ever reads
/// the variant it expects; a mismatch is a caller bug, not something worth
/// a runtime type. `build_payload` returns [`ErrorCode::NotImplemented`]
/// for a variant it doesn't recognize so a mistake fails loudly instead of
/// silently sending garbage.
#[derive(Debug, Clone, Copy, Default)]
pub enum ActionArgs {
    #[default]
    None,
    Led { target: LedTarget, on_ms: u16, off_ms: u16, count: u16 },
    Duration(u8),
    Portions(u8),
}

/// What happens once the follow-up report for an action arrives.
pub enum ReportOutcome {
    /// The report settles the action; finish with this code.
    Done(ErrorCode),
    /// Wrong shape, or the device is still working; keep waiting.
    Pending,
}

#[derive(Clone, Copy)]
pub struct FollowUp {
    pub report_type: u8,
    pub timeout_ms: fn(&ActionArgs) -> u32,
    pub handle: fn(&ActionArgs, &[u8]) -> ReportOutcome,
}

/// A static, reusable catalogue entry (§4.5's "table-driven descriptor").
pub struct ActionDescriptor {
    pub name: &'static str,
    pub req_type: u8,
    pub send_timeout_ms: u32,
    /// `false` is the Init chain's fire-and-forget mode: the action
    /// completes as soon as the send succeeds, with no ACK or report wait.
    pub wait_for_complete: bool,
    pub follow_up: Option<FollowUp>,
    pub build_payload: fn(&ActionArgs) -> Result<Vec<u8>, ErrorCode>,
    pub precondition: Option<fn(&Engine, &ActionArgs) -> Option<ErrorCode>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    WaitAck,
    WaitReport,
}

struct ActionRun {
    descriptor: &'static ActionDescriptor,
    args: ActionArgs,
    seq: u8,
    stage: Stage,
    on_complete: Option<OnComplete>,
    on_error: Option<OnError>,
}

fn finish(run: &Rc<RefCell<ActionRun>>, engine: &mut Engine, code: ErrorCode) {
    let (descriptor, args, on_complete, on_error) = {
        let mut r = run.borrow_mut();
        (r.descriptor, r.args, r.on_complete.take(), r.on_error.take())
    };

    if code == ErrorCode::DoorBlocked {
        engine.notify_door_blocked();
    }
    if code == ErrorCode::Ok && descriptor.req_type == req::DISPENSE {
        if let ActionArgs::Portions(portions) = args {
            engine.notify_dispense_complete(portions);
        }
    }

    if code == ErrorCode::Ok {
        if let Some(cb) = on_complete {
            cb(engine);
        }
    } else if let Some(cb) = on_error {
        cb(engine, code);
    } else {
        engine.notify_error(code);
    }
}

fn advance(run: &Rc<RefCell<ActionRun>>, engine: &mut Engine, code: ErrorCode, payload: &[u8]) -> bool {
    let stage = run.borrow().stage;
    match stage {
        Stage::WaitAck => {
            if code == ErrorCode::Timeout {
                finish(run, engine, ErrorCode::Timeout);
                return true;
            }
            if payload != &protocol::ACK_PAYLOAD[..] {
                return false;
            }

            let follow_up = run.borrow().descriptor.follow_up;
            match follow_up {
                None => finish(run, engine, ErrorCode::Ok),
                Some(follow_up) => {
                    let (seq, timeout_ms) = {
                        let mut r = run.borrow_mut();
                        r.stage = Stage::WaitReport;
                        (r.seq, (follow_up.timeout_ms)(&r.args))
                    };
                    let run_for_report = run.clone();
                    engine.add_report_waiter(
                        follow_up.report_type,
                        seq,
                        timeout_ms,
                        Box::new(move |engine, code, payload| advance(&run_for_report, engine, code, payload)),
                    );
                }
            }
            true
        }
        Stage::WaitReport => {
            if code == ErrorCode::Timeout {
                finish(run, engine, ErrorCode::Timeout);
                return true;
            }
            let follow_up = run.borrow().descriptor.follow_up.expect("WaitReport only reached when a follow-up exists");
            match (follow_up.handle)(&run.borrow().args, payload) {
                ReportOutcome::Pending => false,
                ReportOutcome::Done(code) => {
                    finish(run, engine, code);
                    true
                }
            }
        }
    }
}

/// A thin handle onto a static [`ActionDescriptor`]. Cheap to copy; holds
/// no per-invocation state.
#[derive(Clone, Copy)]
pub struct Action(pub &'static ActionDescriptor);

impl Action {
    pub const fn new(descriptor: &'static ActionDescriptor) -> Self {
        Action(descriptor)
    }

    /// Plays the action; errors (precondition, send failure, timeout,
    /// device-reported failure) go to the engine's global `on_error`
    /// observer.
    pub fn play(&self, engine: &mut Engine, args: ActionArgs, on_complete: impl FnOnce(&mut Engine) + 'static) {
        self.play_complex(engine, args, Some(Box::new(on_complete)), None);
    }

    /// Plays the action with both a completion and an error continuation.
    pub fn play_with_error(
        &self,
        engine: &mut Engine,
        args: ActionArgs,
        on_complete: impl FnOnce(&mut Engine) + 'static,
        on_error: impl FnOnce(&mut Engine, ErrorCode) + 'static,
    ) {
        self.play_complex(engine, args, Some(Box::new(on_complete)), Some(Box::new(on_error)));
    }

    pub fn play_complex(&self, engine: &mut Engine, args: ActionArgs, on_complete: Option<OnComplete>, on_error: Option<OnError>) {
        let descriptor = self.0;

        if let Some(check) = descriptor.precondition {
            if let Some(err) = check(engine, &args) {
                match on_error {
                    Some(cb) => cb(engine, err),
                    None => engine.notify_error(err),
                }
                return;
            }
        }

        let payload = match (descriptor.build_payload)(&args) {
            Ok(payload) => payload,
            Err(err) => {
                match on_error {
                    Some(cb) => cb(engine, err),
                    None => engine.notify_error(err),
                }
                return;
            }
        };

        let seq = engine.send(descriptor.req_type, &payload);
        if seq == protocol::MAX_SEQ {
            match on_error {
                Some(cb) => cb(engine, ErrorCode::SendFailed),
                None => engine.notify_error(ErrorCode::SendFailed),
            }
            return;
        }

        if !descriptor.wait_for_complete {
            if let Some(cb) = on_complete {
                cb(engine);
            }
            return;
        }

        let run = Rc::new(RefCell::new(ActionRun {
            descriptor,
            args,
            seq,
            stage: Stage::WaitAck,
            on_complete,
            on_error,
        }));

        let run_for_ack = run.clone();
        engine.add_report_waiter(
            descriptor.req_type,
            seq,
            descriptor.send_timeout_ms,
            Box::new(move |engine, code, payload| advance(&run_for_ack, engine, code, payload)),
        );
    }

    /// Sends the request and completes as soon as the write succeeds,
    /// without registering any waiter. Used by the Init chain's no-wait
    /// steps; not exposed as part of the normal catalogue API.
    fn play_fire_and_forget(&self, engine: &mut Engine, args: ActionArgs, on_complete: OnComplete, on_error: OnError) {
        let descriptor = self.0;

        if let Some(check) = descriptor.precondition {
            if let Some(err) = check(engine, &args) {
                on_error(engine, err);
                return;
            }
        }

        let payload = match (descriptor.build_payload)(&args) {
            Ok(payload) => payload,
            Err(err) => {
                on_error(engine, err);
                return;
            }
        };

        if engine.send(descriptor.req_type, &payload) == protocol::MAX_SEQ {
            on_error(engine, ErrorCode::SendFailed);
        } else {
            on_complete(engine);
        }
    }
}

// --- payload builders --------------------------------------------------

fn build_led(args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    let ActionArgs::Led { target, on_ms, off_ms, count } = *args else {
        return Err(ErrorCode::NotImplemented);
    };
    let mut payload = Vec::with_capacity(7);
    payload.push(target as u8);
    payload.extend_from_slice(&on_ms.to_be_bytes());
    payload.extend_from_slice(&off_ms.to_be_bytes());
    payload.extend_from_slice(&count.to_be_bytes());
    Ok(payload)
}

fn build_door(args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    let ActionArgs::Duration(duration) = *args else {
        return Err(ErrorCode::NotImplemented);
    };
    Ok(vec![duration])
}

fn build_dispense(args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    let ActionArgs::Portions(portions) = *args else {
        return Err(ErrorCode::NotImplemented);
    };
    Ok(vec![portions, 0x01, 0x01, 0x50])
}

fn build_get_status(_args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    Ok(Vec::new())
}

fn build_motor_config(_args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    Ok(vec![0x05, 0x7E])
}

fn build_set_params_a(_args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    Ok(vec![0x00, 0x05, 0x00, 0x05])
}

fn build_set_param_a(_args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    Ok(vec![0x00, 0x05])
}

fn build_set_params_b(_args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    Ok(vec![0x00, 0xFF, 0x00, 0xFF])
}

fn build_set_param_b(_args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    Ok(vec![0xFF, 0xFF])
}

fn build_motor_params(_args: &ActionArgs) -> Result<Vec<u8>, ErrorCode> {
    Ok(vec![0x00, 0x3C, 0x01, 0x90, 0x0F, 0x01, 0x22, 0x22, 0x01, 0xF4, 0x0F, 0x01])
}

// --- follow-up timeouts and report handlers ----------------------------

fn door_timeout(_args: &ActionArgs) -> u32 {
    DOOR_REPORT_TIMEOUT_MS
}

fn handle_door_report(_args: &ActionArgs, payload: &[u8]) -> ReportOutcome {
    match payload.first() {
        Some(2) => ReportOutcome::Done(ErrorCode::Ok),
        Some(_) => ReportOutcome::Done(ErrorCode::DoorBlocked),
        None => ReportOutcome::Pending,
    }
}

fn dispense_timeout(args: &ActionArgs) -> u32 {
    match args {
        ActionArgs::Portions(portions) => (*portions as u32) * PORTION_TIMEOUT_MS,
        _ => PORTION_TIMEOUT_MS,
    }
}

fn handle_dispense_report(_args: &ActionArgs, payload: &[u8]) -> ReportOutcome {
    match payload.get(2) {
        Some(1) => ReportOutcome::Done(ErrorCode::Ok),
        _ => ReportOutcome::Pending,
    }
}

fn status_timeout(_args: &ActionArgs) -> u32 {
    STATUS_REPORT_TIMEOUT_MS
}

fn handle_status_report(_args: &ActionArgs, payload: &[u8]) -> ReportOutcome {
    if payload.len() >= StatusReport::WIRE_LEN {
        ReportOutcome::Done(ErrorCode::Ok)
    } else {
        ReportOutcome::Pending
    }
}

fn require_food(engine: &Engine, _args: &ActionArgs) -> Option<ErrorCode> {
    if engine.has_food() {
        None
    } else {
        Some(ErrorCode::NoFood)
    }
}

// --- catalogue -----------------------------------------------------------

pub static LED_CTL: ActionDescriptor = ActionDescriptor {
    name: "led_ctl",
    req_type: req::LED_CTL,
    send_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
    wait_for_complete: true,
    follow_up: None,
    build_payload: build_led,
    precondition: None,
};

pub static OPEN_DOOR: ActionDescriptor = ActionDescriptor {
    name: "open_door",
    req_type: req::OPEN_DOOR,
    send_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
    wait_for_complete: true,
    follow_up: Some(FollowUp { report_type: report::DOOR_OPEN_DONE, timeout_ms: door_timeout, handle: handle_door_report }),
    build_payload: build_door,
    precondition: None,
};

pub static CLOSE_DOOR: ActionDescriptor = ActionDescriptor {
    name: "close_door",
    req_type: req::CLOSE_DOOR,
    send_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
    wait_for_complete: true,
    follow_up: Some(FollowUp { report_type: report::DOOR_CLOSE_DONE, timeout_ms: door_timeout, handle: handle_door_report }),
    build_payload: build_door,
    precondition: None,
};

pub static DISPENSE: ActionDescriptor = ActionDescriptor {
    name: "dispense",
    req_type: req::DISPENSE,
    send_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
    wait_for_complete: true,
    follow_up: Some(FollowUp { report_type: report::DISPENSE_DONE, timeout_ms: dispense_timeout, handle: handle_dispense_report }),
    build_payload: build_dispense,
    precondition: Some(require_food),
};

pub static GET_STATUS: ActionDescriptor = ActionDescriptor {
    name: "get_status",
    req_type: req::GET_STATUS,
    send_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
    wait_for_complete: true,
    follow_up: Some(FollowUp { report_type: report::STATUS, timeout_ms: status_timeout, handle: handle_status_report }),
    build_payload: build_get_status,
    precondition: None,
};

pub static MOTOR_CONFIG: ActionDescriptor = ActionDescriptor {
    name: "motor_config",
    req_type: req::MOTOR_CONFIG,
    send_timeout_ms: 0,
    wait_for_complete: false,
    follow_up: None,
    build_payload: build_motor_config,
    precondition: None,
};

pub static SET_PARAMS_A: ActionDescriptor = ActionDescriptor {
    name: "set_params_a",
    req_type: req::SET_PARAMS_A,
    send_timeout_ms: 0,
    wait_for_complete: false,
    follow_up: None,
    build_payload: build_set_params_a,
    precondition: None,
};

pub static SET_PARAM_A: ActionDescriptor = ActionDescriptor {
    name: "set_param_a",
    req_type: req::SET_PARAM_A,
    send_timeout_ms: 0,
    wait_for_complete: false,
    follow_up: None,
    build_payload: build_set_param_a,
    precondition: None,
};

pub static SET_PARAMS_B: ActionDescriptor = ActionDescriptor {
    name: "set_params_b",
    req_type: req::SET_PARAMS_B,
    send_timeout_ms: 0,
    wait_for_complete: false,
    follow_up: None,
    build_payload: build_set_params_b,
    precondition: None,
};

pub static SET_PARAM_B: ActionDescriptor = ActionDescriptor {
    name: "set_param_b",
    req_type: req::SET_PARAM_B,
    send_timeout_ms: 0,
    wait_for_complete: false,
    follow_up: None,
    build_payload: build_set_param_b,
    precondition: None,
};

pub static MOTOR_PARAMS: ActionDescriptor = ActionDescriptor {
    name: "motor_params",
    req_type: req::MOTOR_PARAMS,
    send_timeout_ms: 0,
    wait_for_complete: false,
    follow_up: None,
    build_payload: build_motor_params,
    precondition: None,
};

/// The fire-and-forget prefix of the Init sequence, in send order. The
/// final step is always a waited `GET_STATUS`, played separately below.
static INIT_CHAIN: [&ActionDescriptor; 7] =
    [&GET_STATUS, &MOTOR_CONFIG, &SET_PARAMS_A, &SET_PARAM_A, &SET_PARAMS_B, &SET_PARAM_B, &MOTOR_PARAMS];

/// Plays the device's seven-step boot sequence, then a final, fully-waited
/// `GET_STATUS`. Each fire-and-forget step's "play next" hook is deferred
/// to the following `tick()` rather than called inline, so a chain of
/// steps that all complete synchronously never recurses on the native
/// stack.
pub fn play_init(engine: &mut Engine, on_complete: impl FnOnce(&mut Engine) + 'static, on_error: impl FnOnce(&mut Engine, ErrorCode) + 'static) {
    let on_error = Rc::new(RefCell::new(Some(Box::new(on_error) as OnError)));
    run_init_step(engine, 0, Box::new(on_complete), on_error);
}

fn run_init_step(engine: &mut Engine, index: usize, on_complete: OnComplete, on_error: Rc<RefCell<Option<OnError>>>) {
    if index == INIT_CHAIN.len() {
        let relay = on_error.clone();
        Action::new(&GET_STATUS).play_complex(
            engine,
            ActionArgs::None,
            Some(on_complete),
            Some(Box::new(move |engine, code| {
                if let Some(cb) = relay.borrow_mut().take() {
                    cb(engine, code);
                }
            })),
        );
        return;
    }

    let descriptor = INIT_CHAIN[index];
    let relay_for_step = on_error.clone();
    let step_error: OnError = Box::new(move |engine, code| {
        if let Some(cb) = relay_for_step.borrow_mut().take() {
            cb(engine, code);
        }
    });
    let on_error_for_next = on_error.clone();
    Action::new(descriptor).play_fire_and_forget(
        engine,
        ActionArgs::None,
        Box::new(move |engine| {
            engine.defer(Box::new(move |engine| {
                run_init_step(engine, index + 1, on_complete, on_error_for_next);
            }));
        }),
        step_error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Clock, Uart};
    use std::cell::RefCell as StdRefCell;
    use std::collections::VecDeque;
    use std::rc::Rc as StdRc;

    struct FakeUart {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl FakeUart {
        fn new() -> Self {
            Self { rx: VecDeque::new(), tx: Vec::new() }
        }

        fn push_frame(&mut self, type_: u8, seq: u8, payload: &[u8]) {
            let mut frame = Vec::new();
            protocol::encode(type_, seq, payload, &mut frame);
            self.rx.extend(frame);
        }
    }

    impl Uart for FakeUart {
        fn available(&mut self) -> usize {
            self.rx.len()
        }
        fn read_byte(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }
        fn read_array(&mut self, buf: &mut [u8]) -> bool {
            if self.rx.len() < buf.len() {
                return false;
            }
            for slot in buf.iter_mut() {
                *slot = self.rx.pop_front().unwrap();
            }
            true
        }
        fn write_array(&mut self, buf: &[u8]) -> bool {
            self.tx.extend_from_slice(buf);
            true
        }
    }

    struct FixedClock(StdRc<StdRefCell<u64>>);
    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            *self.0.borrow()
        }
    }

    #[test]
    fn dispense_without_food_fails_immediately_without_writing_uart() {
        let uart = FakeUart::new();
        let mut engine = Engine::new(Box::new(uart), Box::new(FixedClock(StdRc::new(StdRefCell::new(0)))));

        let result = StdRc::new(StdRefCell::new(None));
        let result_cb = result.clone();
        Action::new(&DISPENSE).play_with_error(
            &mut engine,
            ActionArgs::Portions(2),
            |_e| panic!("must not complete"),
            move |_e, code| *result_cb.borrow_mut() = Some(code),
        );

        assert_eq!(*result.borrow(), Some(ErrorCode::NoFood));
    }

    #[test]
    fn door_open_happy_path_finishes_ok() {
        let uart = FakeUart::new();
        let mut engine = Engine::new(Box::new(uart), Box::new(FixedClock(StdRc::new(StdRefCell::new(0)))));

        let done = StdRc::new(StdRefCell::new(false));
        let done_cb = done.clone();
        Action::new(&OPEN_DOOR).play(&mut engine, ActionArgs::Duration(0x1E), move |_e| *done_cb.borrow_mut() = true);

        let seq = engine.last_outgoing_seq();
        engine.deliver_test_frame(req::OPEN_DOOR, seq, &protocol::ACK_PAYLOAD);
        assert!(!*done.borrow(), "should still be waiting on the report");

        engine.deliver_test_frame(report::DOOR_OPEN_DONE, seq, &[0x02, 0x00, 0x00]);
        assert!(*done.borrow());
    }

    #[test]
    fn door_open_blocked_fires_observer_and_error() {
        let uart = FakeUart::new();
        let mut engine = Engine::new(Box::new(uart), Box::new(FixedClock(StdRc::new(StdRefCell::new(0)))));

        let blocked = StdRc::new(StdRefCell::new(false));
        let blocked_obs = blocked.clone();
        engine.on_door_blocked(move || *blocked_obs.borrow_mut() = true);

        let error_code = StdRc::new(StdRefCell::new(None));
        let error_cb = error_code.clone();
        Action::new(&OPEN_DOOR).play_with_error(
            &mut engine,
            ActionArgs::Duration(0x1E),
            |_e| panic!("must not complete successfully"),
            move |_e, code| *error_cb.borrow_mut() = Some(code),
        );

        let seq = engine.last_outgoing_seq();
        engine.deliver_test_frame(req::OPEN_DOOR, seq, &protocol::ACK_PAYLOAD);
        engine.deliver_test_frame(report::DOOR_OPEN_DONE, seq, &[0x03, 0x00, 0x00]);

        assert!(*blocked.borrow());
        assert_eq!(*error_code.borrow(), Some(ErrorCode::DoorBlocked));
    }

    #[test]
    fn ack_timeout_plays_on_error() {
        let uart = FakeUart::new();
        let clock_ms = StdRc::new(StdRefCell::new(0));
        let mut engine = Engine::new(Box::new(uart), Box::new(FixedClock(clock_ms.clone())));

        let error_code = StdRc::new(StdRefCell::new(None));
        let error_cb = error_code.clone();
        Action::new(&LED_CTL).play_with_error(
            &mut engine,
            ActionArgs::Led { target: LedTarget::UpperLed, on_ms: 100, off_ms: 100, count: 1 },
            |_e| panic!("must not complete"),
            move |_e, code| *error_cb.borrow_mut() = Some(code),
        );

        *clock_ms.borrow_mut() = DEFAULT_ACK_TIMEOUT_MS as u64 + 1;
        engine.tick();

        assert_eq!(*error_code.borrow(), Some(ErrorCode::Timeout));
    }

    #[test]
    fn init_chain_runs_all_seven_steps_then_waits_on_final_status() {
        let uart = FakeUart::new();
        let mut engine = Engine::new(Box::new(uart), Box::new(FixedClock(StdRc::new(StdRefCell::new(0)))));

        let done = StdRc::new(StdRefCell::new(false));
        let done_cb = done.clone();
        play_init(&mut engine, move |_e| *done_cb.borrow_mut() = true, |_e, code| panic!("unexpected error: {code}"));

        // Each fire-and-forget step's continuation is deferred; drain ticks
        // until the final GET_STATUS has actually been sent.
        for _ in 0..16 {
            engine.tick();
            if !*done.borrow() {
                continue;
            }
            break;
        }

        assert!(!*done.borrow(), "still waiting on the final GET_STATUS round trip");

        engine.deliver_test_frame(req::GET_STATUS, engine.last_outgoing_seq(), &protocol::ACK_PAYLOAD);
        engine.deliver_test_frame(report::STATUS, engine.last_outgoing_seq(), &[0x00, 0x01, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);

        assert!(*done.borrow());
    }
}
