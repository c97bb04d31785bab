//! Queued duty trajectories.
//!
//! The host enqueues segments through a [`SegmentWriter`]; the control tick
//! owns the [`TrajectoryEngine`], which pops segments and interpolates one duty
//! value per tick. The queue is a lock-free single-producer/single-consumer
//! ring: only the writer advances the head, only the tick advances the tail.

use heapless::spsc::{Consumer, Producer, Queue};

/// Queue slots (the usable count is reported by [`SegmentWriter::capacity`]).
pub const TRAJ_QUEUE_LEN: usize = 16;

pub type SegmentQueue = Queue<Segment, TRAJ_QUEUE_LEN>;

/// Duration given to segments whose payload carries none.
pub const DEFAULT_SEGMENT_DURATION_US: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Shape {
    /// Jump to `end` and hold it for the segment duration.
    Step,
    /// Ramp from `start` to `end` across the segment duration.
    Linear,
}

impl Shape {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Step),
            1 => Some(Self::Linear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Segment {
    pub start: u16,
    pub end: u16,
    pub duration_us: u32,
    pub shape: Shape,
}

impl Segment {
    /// Parse a queue-segment payload, all fields big-endian:
    ///
    /// - 5 bytes: `start u16, end u16, shape u8`, lasting
    ///   [`DEFAULT_SEGMENT_DURATION_US`]
    /// - 7 bytes: `start u16, end u16, duration_us u16, shape u8`
    /// - 9 bytes: `start u16, end u16, duration_us u32, shape u8`
    pub fn decode(p: &[u8]) -> Option<Self> {
        let (duration_us, shape) = match p.len() {
            5 => (DEFAULT_SEGMENT_DURATION_US, p[4]),
            7 => (u32::from(u16::from_be_bytes([p[4], p[5]])), p[6]),
            9 => (u32::from_be_bytes([p[4], p[5], p[6], p[7]]), p[8]),
            _ => return None,
        };
        Some(Self {
            start: u16::from_be_bytes([p[0], p[1]]),
            end: u16::from_be_bytes([p[2], p[3]]),
            duration_us,
            shape: Shape::from_u8(shape)?,
        })
    }
}

// ── Producer side (host service) ──────────────────────────────────────────────

pub struct SegmentWriter<'a> {
    queue: Producer<'a, Segment>,
    dropped: u32,
}

impl<'a> SegmentWriter<'a> {
    pub fn new(queue: Producer<'a, Segment>) -> Self {
        Self { queue, dropped: 0 }
    }

    /// Append a segment. A full queue drops it and returns false.
    pub fn enqueue(&mut self, segment: Segment) -> bool {
        match self.queue.enqueue(segment) {
            Ok(()) => true,
            Err(_) => {
                self.dropped = self.dropped.wrapping_add(1);
                false
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Segments lost to a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

// ── Consumer side (control tick) ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct ActiveSegment {
    start: u16,
    end: u16,
    shape: Shape,
    total_steps: u32,
    step: u32,
    /// Running sum of `end - start`; divided by `total_steps` each tick so the
    /// rounding remainder is never lost.
    accum: i64,
}

impl ActiveSegment {
    fn new(seg: Segment, tick_period_us: u32) -> Self {
        Self {
            start: seg.start,
            end: seg.end,
            shape: seg.shape,
            total_steps: seg.duration_us / tick_period_us.max(1),
            step: 0,
            accum: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.step >= self.total_steps
    }

    fn next_duty(&mut self) -> u16 {
        match self.shape {
            Shape::Step => self.end,
            Shape::Linear => {
                self.accum += i64::from(self.end) - i64::from(self.start);
                (i64::from(self.start) + self.accum / i64::from(self.total_steps)) as u16
            }
        }
    }
}

pub struct TrajectoryEngine<'a> {
    queue: Consumer<'a, Segment>,
    active: Option<ActiveSegment>,
    running: bool,
    /// `end` of the most recently finished (or active) segment.
    resting: u16,
}

impl<'a> TrajectoryEngine<'a> {
    pub fn new(queue: Consumer<'a, Segment>) -> Self {
        Self {
            queue,
            active: None,
            running: false,
            resting: 0,
        }
    }

    /// Load the next queued segment. With an empty queue the engine stops and
    /// returns false.
    pub fn start(&mut self, tick_period_us: u32) -> bool {
        match self.queue.dequeue() {
            Some(seg) => {
                self.active = Some(ActiveSegment::new(seg, tick_period_us));
                self.resting = seg.end;
                self.running = true;
                true
            }
            None => {
                self.running = false;
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Duty held once the queue has drained.
    pub fn resting_duty(&self) -> u16 {
        self.resting
    }

    /// Duty for this tick.
    ///
    /// A segment finishing on this tick chains straight into the next queued
    /// one, so the following tick already uses the new segment. Segments
    /// shorter than one tick are skipped on the same tick.
    pub fn advance(&mut self, tick_period_us: u32) -> u16 {
        loop {
            let Some(active) = self.active.as_mut() else {
                return self.resting;
            };

            if active.is_complete() {
                if !self.running || !self.start(tick_period_us) {
                    return self.resting;
                }
                continue;
            }

            let duty = active.next_duty();
            active.step += 1;
            if active.is_complete() {
                self.start(tick_period_us);
            }
            return duty;
        }
    }
}
