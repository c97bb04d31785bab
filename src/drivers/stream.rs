//! Telemetry packets.
//!
//! ```text
//! snapshot : [0xA5][flags=0][RING_LEN x (duty u16 LE, current u16 LE)][crc8]
//! time sync: [0xAA][type=1][micros u32 BE][crc8]
//! ```
//!
//! The CRC covers everything after the magic byte.

use heapless::Vec;

use super::checksum::crc8;
use crate::state::{Sample, RING_LEN};

pub const STREAM_PACKET_MAGIC: u8 = 0xA5;
pub const STREAM_TIME_MAGIC: u8 = 0xAA;
pub const TIME_SYNC_TYPE: u8 = 0x01;

pub const SNAPSHOT_PACKET_LEN: usize = 2 + 4 * RING_LEN + 1;
pub const TIME_SYNC_PACKET_LEN: usize = 1 + 1 + 4 + 1;

pub fn build_snapshot_packet(samples: &[Sample; RING_LEN]) -> [u8; SNAPSHOT_PACKET_LEN] {
    let mut packet = [0u8; SNAPSHOT_PACKET_LEN];
    packet[0] = STREAM_PACKET_MAGIC;
    packet[1] = 0;
    for (i, s) in samples.iter().enumerate() {
        let base = 2 + 4 * i;
        packet[base..base + 2].copy_from_slice(&s.duty.to_le_bytes());
        packet[base + 2..base + 4].copy_from_slice(&s.current.to_le_bytes());
    }
    packet[SNAPSHOT_PACKET_LEN - 1] = crc8(&packet[1..SNAPSHOT_PACKET_LEN - 1]);
    packet
}

pub fn build_time_sync_packet(micros: u32) -> [u8; TIME_SYNC_PACKET_LEN] {
    let mut packet = [0u8; TIME_SYNC_PACKET_LEN];
    packet[0] = STREAM_TIME_MAGIC;
    packet[1] = TIME_SYNC_TYPE;
    packet[2..6].copy_from_slice(&micros.to_be_bytes());
    packet[6] = crc8(&packet[1..6]);
    packet
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamPacket {
    Snapshot { flags: u8, samples: [Sample; RING_LEN] },
    TimeSync { kind: u8, micros: u32 },
}

/// Host-side reader for the telemetry stream.
///
/// Bytes that do not start a packet are skipped; a packet failing its CRC is
/// dropped whole and counted.
pub struct StreamDecoder {
    buffer: Vec<u8, SNAPSHOT_PACKET_LEN>,
    expected: usize,
    crc_errors: u32,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            expected: 0,
            crc_errors: 0,
        }
    }

    pub fn crc_errors(&self) -> u32 {
        self.crc_errors
    }

    pub fn push_byte(&mut self, b: u8) -> Option<StreamPacket> {
        if self.buffer.is_empty() {
            self.expected = match b {
                STREAM_PACKET_MAGIC => SNAPSHOT_PACKET_LEN,
                STREAM_TIME_MAGIC => TIME_SYNC_PACKET_LEN,
                _ => return None,
            };
        }

        if self.buffer.push(b).is_err() {
            self.buffer.clear();
            return None;
        }
        if self.buffer.len() < self.expected {
            return None;
        }

        let packet = self.decode();
        self.buffer.clear();
        if packet.is_none() {
            self.crc_errors = self.crc_errors.wrapping_add(1);
        }
        packet
    }

    pub fn push_bytes(&mut self, data: &[u8], mut on_packet: impl FnMut(StreamPacket)) {
        for &b in data {
            if let Some(packet) = self.push_byte(b) {
                on_packet(packet);
            }
        }
    }

    fn decode(&self) -> Option<StreamPacket> {
        let raw = self.buffer.as_slice();
        let (body, crc) = raw[1..].split_at(raw.len() - 2);
        if crc8(body) != crc[0] {
            return None;
        }

        match raw[0] {
            STREAM_PACKET_MAGIC => {
                let mut samples = [Sample::default(); RING_LEN];
                for (i, slot) in samples.iter_mut().enumerate() {
                    let base = 1 + 4 * i;
                    slot.duty = u16::from_le_bytes([body[base], body[base + 1]]);
                    slot.current = u16::from_le_bytes([body[base + 2], body[base + 3]]);
                }
                Some(StreamPacket::Snapshot { flags: body[0], samples })
            }
            _ => Some(StreamPacket::TimeSync {
                kind: body[0],
                micros: u32::from_be_bytes([body[1], body[2], body[3], body[4]]),
            }),
        }
    }
}
