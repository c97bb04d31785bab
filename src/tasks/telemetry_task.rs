//! Telemetry streamer.
//!
//! Polled from the cooperative loop whenever no host byte is waiting. Emits a
//! snapshot packet for every completed ring wrap while streaming is enabled,
//! and a time-sync packet every 500 ms regardless.

use crate::drivers::stream::{build_snapshot_packet, build_time_sync_packet};
use crate::state::SharedState;

pub const TIME_SYNC_INTERVAL_US: u64 = 500_000;

pub struct Streamer {
    last_sync_us: u64,
    last_generation: u32,
    skipped: u32,
}

impl Streamer {
    /// `now_us` starts the first time-sync interval.
    pub fn new(now_us: u64) -> Self {
        Self {
            last_sync_us: now_us,
            last_generation: 0,
            skipped: 0,
        }
    }

    /// Ring wraps overwritten before they could be sent.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// Hand every due packet to `emit`, time-sync first.
    pub fn poll(&mut self, now_us: u64, shared: &SharedState, mut emit: impl FnMut(&[u8])) {
        if now_us.wrapping_sub(self.last_sync_us) >= TIME_SYNC_INTERVAL_US {
            self.last_sync_us = now_us;
            emit(&build_time_sync_packet(now_us as u32));
        }

        let snap = shared.snapshot();
        if snap.generation == self.last_generation {
            return;
        }
        let behind = snap.generation.wrapping_sub(self.last_generation);
        self.last_generation = snap.generation;

        if !shared.streaming() {
            return;
        }
        if behind > 1 {
            self.skipped = self.skipped.wrapping_add(behind - 1);
            crate::log_debug!("stream: {} wraps skipped ({} total)", behind - 1, self.skipped);
        }
        emit(&build_snapshot_packet(&snap.samples));
    }
}
