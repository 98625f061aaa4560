//! Wire format constants and the frame codec.
//!
//! Packet layout (big-endian): `AA AA | len(1) | type(1) | seq(1) | payload(0..248) | crc16(2)`.
//! `len` counts every byte in the packet, including the two magic bytes and the CRC.

use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no xorout.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

pub const MAGIC: u8 = 0xAA;
pub const HEADER_SIZE: usize = 5; // magic(2) + len(1) + type(1) + seq(1)
pub const CRC_SIZE: usize = 2;
pub const MIN_SIZE: usize = HEADER_SIZE + CRC_SIZE; // 7
pub const MAX_SIZE: usize = 0xFF; // 255
pub const MAX_PAYLOAD: usize = MAX_SIZE - MIN_SIZE; // 248

/// Sentinel sequence number: never issued to a real request. Doubles as the
/// "this send failed" return value and the device's own wildcard seq for
/// unsolicited status reports.
pub const MAX_SEQ: u8 = 0xFF;

/// `seq == 0` on a waiter means "match any sequence with this type".
pub const ANY_SEQ: u8 = 0x00;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("missing 0xAA 0xAA magic prefix")]
    BadMagic,
    #[error("packet length {0} outside [{MIN_SIZE}, {MAX_SIZE}]")]
    BadLength(usize),
    #[error("CRC mismatch: got {got:#06x}, expected {expected:#06x}")]
    BadCrc { got: u16, expected: u16 },
}

/// A decoded frame, payload detached from the original byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub type_: u8,
    pub seq: u8,
    pub payload: Vec<u8>,
}

/// Appends the encoded packet for `(type_, seq, payload)` to `out`.
///
/// `payload.len()` must fit within [`MAX_PAYLOAD`]; longer payloads are
/// truncated to fit the one-byte length field rather than panicking, since
/// this is host-controlled data, not attacker input.
pub fn encode(type_: u8, seq: u8, payload: &[u8], out: &mut Vec<u8>) {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];
    let len = (HEADER_SIZE + payload.len() + CRC_SIZE) as u8;

    let start = out.len();
    out.push(MAGIC);
    out.push(MAGIC);
    out.push(len);
    out.push(type_);
    out.push(seq);
    out.extend_from_slice(payload);

    let crc = CRC16.checksum(&out[start..]);
    out.push((crc >> 8) as u8);
    out.push((crc & 0xFF) as u8);
}

/// Decodes a single complete packet. `bytes` must be exactly one packet
/// (the Link Layer is responsible for finding packet boundaries in a byte
/// stream before calling this).
pub fn decode(bytes: &[u8]) -> Result<Decoded, CodecError> {
    if bytes.len() < MIN_SIZE || bytes.len() > MAX_SIZE {
        return Err(CodecError::BadLength(bytes.len()));
    }
    if bytes[0] != MAGIC || bytes[1] != MAGIC {
        return Err(CodecError::BadMagic);
    }

    let len = bytes[2] as usize;
    if len < MIN_SIZE || len > MAX_SIZE || len != bytes.len() {
        return Err(CodecError::BadLength(len));
    }

    let expected = CRC16.checksum(&bytes[..len - CRC_SIZE]);
    let got = u16::from_be_bytes([bytes[len - 2], bytes[len - 1]]);
    if got != expected {
        return Err(CodecError::BadCrc { got, expected });
    }

    let type_ = bytes[3];
    let seq = bytes[4];
    let payload = bytes[HEADER_SIZE..len - CRC_SIZE].to_vec();

    Ok(Decoded { type_, seq, payload })
}

pub mod req {
    pub const GET_STATUS: u8 = 0x01;
    pub const SET_PARAMS_A: u8 = 0x03;
    pub const SET_PARAMS_B: u8 = 0x04;
    pub const SET_PARAM_A: u8 = 0x05;
    pub const SET_PARAM_B: u8 = 0x06;
    pub const OPEN_DOOR: u8 = 0x07;
    pub const CLOSE_DOOR: u8 = 0x09;
    pub const DISPENSE: u8 = 0x0B;
    pub const MOTOR_PARAMS: u8 = 0x0D;
    pub const LED_CTL: u8 = 0x0E;
    pub const MOTOR_CONFIG: u8 = 0x13;
}

pub mod report {
    pub const STATUS: u8 = 0x02;
    pub const DOOR_OPEN_DONE: u8 = 0x08;
    pub const DOOR_CLOSE_DONE: u8 = 0x0A;
    pub const DISPENSE_DONE: u8 = 0x0C;
    pub const MOTOR_READY: u8 = 0x14;
}

/// The one-byte ACK payload every request is answered with before any
/// terminal report.
pub const ACK_PAYLOAD: [u8; 1] = [0x01];
