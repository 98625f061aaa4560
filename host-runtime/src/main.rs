//! Host binary for the P530 feeder controller.
//!
//! Owns the real serial port, installs structured logging, and drives the
//! engine's `tick()` on a fixed interval. One command is run per invocation;
//! the process exits once it finishes or errors.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serialport::SerialPort;
use tracing::{error, info};

use pkt_p530::action;
use pkt_p530::{Action, ActionArgs, Clock, Engine, ErrorCode, LedTarget, Uart};

#[derive(Parser)]
#[command(name = "host-runtime", version, about = "Drives a Petkit P530 feeder controller over a serial link.")]
struct Cli {
    /// Serial device path.
    #[arg(long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Baud rate.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the device's boot/init sequence.
    Init,
    /// Open the feeder door.
    OpenDoor {
        #[arg(long, default_value_t = 30)]
        duration: u8,
    },
    /// Close the feeder door.
    CloseDoor {
        #[arg(long, default_value_t = 30)]
        duration: u8,
    },
    /// Dispense a number of portions.
    Dispense { portions: u8 },
    /// Request a fresh status report.
    GetStatus,
    /// Blink the upper LED.
    Blink {
        #[arg(long, default_value_t = 100)]
        on_ms: u16,
        #[arg(long, default_value_t = 100)]
        off_ms: u16,
        #[arg(long, default_value_t = 1)]
        count: u16,
    },
}

/// Adapts a blocking [`serialport::SerialPort`] to the engine's non-blocking
/// [`Uart`]. The port is opened with a short read timeout so `read_exact`
/// never stalls the tick loop for long; callers only ever read amounts
/// `available()` has already confirmed are buffered.
struct SerialUart {
    port: Box<dyn SerialPort>,
}

impl Uart for SerialUart {
    fn available(&mut self) -> usize {
        self.port.bytes_to_read().unwrap_or(0) as usize
    }

    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        self.port.read_exact(&mut buf).ok().map(|_| buf[0])
    }

    fn read_array(&mut self, buf: &mut [u8]) -> bool {
        self.port.read_exact(buf).is_ok()
    }

    fn write_array(&mut self, buf: &[u8]) -> bool {
        self.port.write_all(buf).is_ok()
    }
}

struct MonotonicClock {
    start: Instant,
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

fn dispatch_command(engine: &mut Engine, command: Command, done: Rc<RefCell<bool>>) {
    let done_ok = done.clone();
    let on_complete = move |_engine: &mut Engine| {
        info!("command completed");
        *done_ok.borrow_mut() = true;
    };
    let done_err = done;
    let on_error = move |_engine: &mut Engine, code: ErrorCode| {
        error!(%code, "command failed");
        *done_err.borrow_mut() = true;
    };

    match command {
        Command::Init => action::play_init(engine, on_complete, on_error),
        Command::OpenDoor { duration } => {
            Action::new(&action::OPEN_DOOR).play_with_error(engine, ActionArgs::Duration(duration), on_complete, on_error)
        }
        Command::CloseDoor { duration } => {
            Action::new(&action::CLOSE_DOOR).play_with_error(engine, ActionArgs::Duration(duration), on_complete, on_error)
        }
        Command::Dispense { portions } => {
            Action::new(&action::DISPENSE).play_with_error(engine, ActionArgs::Portions(portions), on_complete, on_error)
        }
        Command::GetStatus => Action::new(&action::GET_STATUS).play_with_error(engine, ActionArgs::None, on_complete, on_error),
        Command::Blink { on_ms, off_ms, count } => Action::new(&action::LED_CTL).play_with_error(
            engine,
            ActionArgs::Led { target: LedTarget::UpperLed, on_ms, off_ms, count },
            on_complete,
            on_error,
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    info!(device = %cli.device, baud = cli.baud, "opening serial port");
    let port = serialport::new(&cli.device, cli.baud)
        .timeout(Duration::from_millis(5))
        .open()
        .with_context(|| format!("failed to open serial port {}", cli.device))?;

    let mut engine = Engine::new(Box::new(SerialUart { port }), Box::new(MonotonicClock { start: Instant::now() }));

    engine.on_error(|code| error!(%code, "unhandled action error"));
    engine.on_door_blocked(|| error!("door reported blocked"));
    engine.on_dispense_complete(|portions| info!(portions, "dispense complete"));

    let done = Rc::new(RefCell::new(false));
    dispatch_command(&mut engine, cli.command, done.clone());

    let mut ticker = tokio::time::interval(Duration::from_millis(10));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.tick();
                if *done.borrow() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
                break;
            }
        }
    }

    Ok(())
}
