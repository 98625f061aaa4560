//! Byte-stream resync and outgoing sequence allocation.
//!
//! `poll` is called repeatedly from `Engine::tick`; it drains as many
//! complete packets as the UART currently offers and returns as soon as
//! it would otherwise have to block.

use tracing::{debug, error, warn};

use crate::io::Uart;
use crate::protocol::{self, Decoded};

#[derive(Debug, Clone, Copy)]
enum State {
    /// Looking for two consecutive 0xAA bytes.
    Hunt { seen_first: bool },
    /// Magic found, waiting for the length byte.
    Header,
    /// Length validated, waiting for `len - 3` more bytes (type, seq,
    /// payload, CRC).
    Body { len: usize },
}

pub struct Link {
    state: State,
    body_buf: Vec<u8>,
    last_seq: u8,
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl Link {
    pub fn new() -> Self {
        Self {
            state: State::Hunt { seen_first: false },
            body_buf: Vec::with_capacity(protocol::MAX_SIZE),
            last_seq: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn last_seq(&self) -> u8 {
        self.last_seq
    }

    /// Allocates the next outgoing sequence number: monotonic 1..254,
    /// wrapping back to 1. Never issues 0 or 0xFF.
    fn next_seq(&mut self) -> u8 {
        self.last_seq = if self.last_seq == 0 || self.last_seq >= 254 {
            1
        } else {
            self.last_seq + 1
        };
        self.last_seq
    }

    /// Encodes and writes a request, returning the allocated sequence, or
    /// [`protocol::MAX_SEQ`] if the UART refused the write.
    pub fn send(&mut self, uart: &mut dyn Uart, type_: u8, payload: &[u8]) -> u8 {
        let seq = self.next_seq();
        let mut frame = Vec::with_capacity(protocol::HEADER_SIZE + payload.len() + protocol::CRC_SIZE);
        protocol::encode(type_, seq, payload, &mut frame);

        debug!(type_ = format_args!("{type_:#04x}"), seq, len = payload.len(), "TX");
        if uart.write_array(&frame) {
            seq
        } else {
            error!(type_ = format_args!("{type_:#04x}"), seq, "UART write failed");
            protocol::MAX_SEQ
        }
    }

    /// Pulls the next fully-decoded, CRC-valid frame out of the UART's
    /// currently available bytes, or `None` if no complete frame can be
    /// produced without blocking for more input.
    pub fn poll(&mut self, uart: &mut dyn Uart) -> Option<Decoded> {
        loop {
            match self.state {
                State::Hunt { seen_first } => {
                    if uart.available() == 0 {
                        return None;
                    }
                    let Some(b) = uart.read_byte() else { return None };
                    self.state = if b == protocol::MAGIC {
                        if seen_first {
                            self.body_buf.clear();
                            State::Header
                        } else {
                            State::Hunt { seen_first: true }
                        }
                    } else {
                        if b != protocol::MAGIC && seen_first {
                            warn!(byte = format_args!("{b:#04x}"), "unexpected byte after single 0xAA");
                        }
                        State::Hunt { seen_first: false }
                    };
                }
                State::Header => {
                    if uart.available() == 0 {
                        return None;
                    }
                    let Some(len) = uart.read_byte() else { return None };
                    let len = len as usize;
                    if !(protocol::MIN_SIZE..=protocol::MAX_SIZE).contains(&len) {
                        warn!(len, "invalid packet length, resyncing");
                        self.state = State::Hunt { seen_first: false };
                        continue;
                    }
                    self.state = State::Body { len };
                }
                State::Body { len } => {
                    let needed = len - 3; // type + seq + payload + crc
                    if uart.available() < needed {
                        return None;
                    }
                    self.body_buf.resize(needed, 0);
                    if !uart.read_array(&mut self.body_buf) {
                        error!("UART read failed mid-packet, resyncing");
                        self.state = State::Hunt { seen_first: false };
                        continue;
                    }

                    let mut frame = Vec::with_capacity(len);
                    frame.push(protocol::MAGIC);
                    frame.push(protocol::MAGIC);
                    frame.push(len as u8);
                    frame.extend_from_slice(&self.body_buf);

                    self.state = State::Hunt { seen_first: false };

                    match protocol::decode(&frame) {
                        Ok(decoded) => {
                            debug!(
                                type_ = format_args!("{:#04x}", decoded.type_),
                                seq = decoded.seq,
                                len = decoded.payload.len(),
                                "RX"
                            );
                            return Some(decoded);
                        }
                        Err(err) => {
                            error!(%err, "dropping malformed packet");
                            continue;
                        }
                    }
                }
            }
        }
    }
}
