//! Host protocol constants and reply frames.
//!
//! Every command and reply uses the same envelope:
//! `[length][id][payload...][checksum]` where `length = 1 + payload.len()` and
//! `checksum` is the additive sum of `[id][payload...]`.

use heapless::Vec;

use super::checksum;

// --- Envelope ---
pub const MAX_PACKET_SIZE: usize = 64;
/// Largest legal length byte (`id` + payload).
pub const MAX_FRAME_LEN: u8 = (MAX_PACKET_SIZE - 2) as u8;

// --- General ---
pub const CMD_PING: u8 = 0x01;
pub const CMD_GET_STATUS: u8 = 0x02;
pub const CMD_GET_DUTY: u8 = 0x03;
pub const CMD_STOP_PWM: u8 = 0x09;
pub const CMD_SET_PWM_OUTPUT_PIN: u8 = 0x10;
pub const CMD_SET_PWM_SENSING_PIN: u8 = 0x11;
pub const CMD_SET_CURRENT_SENSING_PIN: u8 = 0x12;
pub const CMD_SET_PWM_FREQ: u8 = 0x13;
pub const CMD_SET_PWM_ADC_RATE: u8 = 0x14;
pub const CMD_SET_CURRENT_ADC_RATE: u8 = 0x15;
pub const CMD_SET_PWM_ADC_RES: u8 = 0x16;
pub const CMD_SET_CURRENT_ADC_RES: u8 = 0x17;
pub const CMD_SET_PWM_DEPTH: u8 = 0x18;
pub const CMD_SET_DUTY_ACK: u8 = 0x19;
pub const CMD_SET_DUTY: u8 = 0x20;
pub const CMD_SET_DUTY_FAST: u8 = 0x21;
pub const CMD_SAVE_SETTINGS: u8 = 0x30;
pub const CMD_SOFT_RESET: u8 = 0x31;
pub const CMD_SOFT_RESET_SAVE: u8 = 0x32;

// --- Streaming ---
pub const CMD_START_STREAM: u8 = 0x40;
pub const CMD_STOP_STREAM: u8 = 0x41;

// --- Automation ---
pub const CMD_START_AUTOMATION: u8 = 0x50;
pub const CMD_STOP_AUTOMATION: u8 = 0x51;
pub const CMD_QUEUE_TRAJ_SEG: u8 = 0x52;

// --- Reply ids ---
pub const RSP_ACK: u8 = 0x7F;
pub const RSP_ERROR: u8 = 0xFE;

/// Length of the status record carried by a `CMD_GET_STATUS` reply.
pub const STATUS_LEN: usize = 16;

/// Error codes reported in an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    /// Checksum mismatch, wrong arity or a parameter out of range.
    InvalidPayload = 0xE1,
    /// Duty above the bit-depth maximum.
    InvalidDuty = 0xE2,
    UnknownCommand = 0xE3,
}

impl ErrorCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0xE1 => Some(Self::InvalidPayload),
            0xE2 => Some(Self::InvalidDuty),
            0xE3 => Some(Self::UnknownCommand),
            _ => None,
        }
    }
}

/// Device → host reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    /// Echoes the acknowledged opcode.
    Ack(u8),
    Error { opcode: u8, code: ErrorCode },
    Duty(u16),
    Status([u8; STATUS_LEN]),
}

impl Reply {
    /// Serialize into a complete frame.
    pub fn encode(&self) -> Vec<u8, MAX_PACKET_SIZE> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let len = match self {
            Reply::Ack(opcode) => build_frame(&mut buf, RSP_ACK, &[*opcode]),
            Reply::Error { opcode, code } => build_frame(&mut buf, RSP_ERROR, &[*opcode, *code as u8]),
            Reply::Duty(duty) => build_frame(&mut buf, CMD_GET_DUTY, &duty.to_be_bytes()),
            Reply::Status(record) => build_frame(&mut buf, CMD_GET_STATUS, record),
        };
        // `len` never exceeds the scratch buffer, which matches the Vec capacity.
        Vec::from_slice(&buf[..len]).unwrap_or_default()
    }

    /// Interpret a checksum-verified frame as a reply.
    pub fn decode(id: u8, payload: &[u8]) -> Option<Self> {
        match (id, payload) {
            (RSP_ACK, [opcode]) => Some(Reply::Ack(*opcode)),
            (RSP_ERROR, [opcode, code]) => ErrorCode::from_u8(*code).map(|code| Reply::Error {
                opcode: *opcode,
                code,
            }),
            (CMD_GET_DUTY, [hi, lo]) => Some(Reply::Duty(u16::from_be_bytes([*hi, *lo]))),
            (CMD_GET_STATUS, record) if record.len() == STATUS_LEN => {
                let mut out = [0u8; STATUS_LEN];
                out.copy_from_slice(record);
                Some(Reply::Status(out))
            }
            _ => None,
        }
    }
}

/// Write `[length][id][payload...][checksum]` into `buf`.
///
/// Returns the number of bytes written, or 0 when `buf` is too small or the
/// payload does not fit a single frame.
pub fn build_frame(buf: &mut [u8], id: u8, payload: &[u8]) -> usize {
    let len = 1 + payload.len();
    if len > MAX_FRAME_LEN as usize || buf.len() < len + 2 {
        return 0;
    }

    buf[0] = len as u8;
    buf[1] = id;
    buf[2..2 + payload.len()].copy_from_slice(payload);
    buf[1 + len] = checksum::additive(&buf[1..1 + len]);

    len + 2
}
