//! Length-prefixed frame parser.
//!
//! Two states: waiting for a length byte, then collecting `length` body bytes
//! plus the checksum. An out-of-range length byte is dropped and the next byte
//! is treated as a fresh length, so the parser resynchronises without ever
//! blocking. The same envelope is used in both directions, so the host side
//! can run this parser over reply frames too.

use heapless::Vec;

use super::checksum;
use super::protocol::{Reply, MAX_FRAME_LEN, MAX_PACKET_SIZE};

/// A checksum-verified frame: the id/opcode byte and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8, MAX_PACKET_SIZE>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Valid(Frame),
    /// Body arrived complete but the checksum did not match.
    Corrupt { opcode: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    AwaitLength,
    AwaitBody { len: u8 },
}

pub struct FrameParser {
    state: RxState,
    buffer: Vec<u8, MAX_PACKET_SIZE>,
    discarded: u32,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub const fn new() -> Self {
        Self {
            state: RxState::AwaitLength,
            buffer: Vec::new(),
            discarded: 0,
        }
    }

    /// True between frames; false while a body is still being collected.
    pub fn is_idle(&self) -> bool {
        self.state == RxState::AwaitLength
    }

    /// Bytes dropped while hunting for a valid length byte.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    pub fn push_byte(&mut self, b: u8) -> Option<FrameEvent> {
        match self.state {
            RxState::AwaitLength => {
                if b < 1 || b > MAX_FRAME_LEN {
                    self.discarded = self.discarded.wrapping_add(1);
                    crate::log_debug!("frame: discarding length byte {}", b);
                    return None;
                }
                self.buffer.clear();
                self.state = RxState::AwaitBody { len: b };
                None
            }
            RxState::AwaitBody { len } => {
                if self.buffer.push(b).is_err() {
                    // Cannot happen with a validated length; resync anyway.
                    self.discarded = self.discarded.wrapping_add(1);
                    self.reset();
                    return None;
                }
                // Body is `len` bytes followed by the checksum.
                if self.buffer.len() < len as usize + 1 {
                    return None;
                }

                let event = self.finish(len as usize);
                self.reset();
                Some(event)
            }
        }
    }

    /// Feed a chunk of bytes, reporting every completed frame.
    pub fn push_bytes(&mut self, data: &[u8], mut on_event: impl FnMut(FrameEvent)) {
        for &b in data {
            if let Some(event) = self.push_byte(b) {
                on_event(event);
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = RxState::AwaitLength;
        self.buffer.clear();
    }

    fn finish(&self, len: usize) -> FrameEvent {
        let body = &self.buffer[..len];
        let received = self.buffer[len];
        let opcode = body[0];

        if checksum::additive(body) != received {
            return FrameEvent::Corrupt { opcode };
        }

        let payload = Vec::from_slice(&body[1..]).unwrap_or_default();
        FrameEvent::Valid(Frame { opcode, payload })
    }
}

/// Host-side reader for device replies.
///
/// Frames that fail their checksum or do not match a known reply shape are
/// dropped and counted.
pub struct ReplyParser {
    frames: FrameParser,
    rejected: u32,
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyParser {
    pub const fn new() -> Self {
        Self {
            frames: FrameParser::new(),
            rejected: 0,
        }
    }

    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    pub fn push_byte(&mut self, b: u8) -> Option<Reply> {
        let reply = match self.frames.push_byte(b)? {
            FrameEvent::Valid(frame) => Reply::decode(frame.opcode, &frame.payload),
            FrameEvent::Corrupt { .. } => None,
        };
        if reply.is_none() {
            self.rejected = self.rejected.wrapping_add(1);
        }
        reply
    }

    pub fn push_bytes(&mut self, data: &[u8], mut on_reply: impl FnMut(Reply)) {
        for &b in data {
            if let Some(reply) = self.push_byte(b) {
                on_reply(reply);
            }
        }
    }
}
