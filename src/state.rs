//! State shared between the control tick (preemptive) and the host service
//! (cooperative).
//!
//! Everything here is either an atomic word, the sample ring behind a
//! critical-section mutex, or a bounded channel. Nothing in this module can
//! make the tick wait on the host side.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;

// ── Data types ────────────────────────────────────────────────────────────────

/// Samples per telemetry snapshot.
pub const RING_LEN: usize = 8;

/// Pending peripheral reconfigurations the tick may queue before draining.
pub const PERIPHERAL_QUEUE_LEN: usize = 8;

/// One control-tick observation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub duty: u16,
    pub current: u16,
}

/// A completed wrap of the sample ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Number of wraps completed so far; 0 until the ring first fills.
    pub generation: u32,
    pub samples: [Sample; RING_LEN],
}

/// Fixed ring written once per tick.
///
/// When the write index wraps, the live slots are copied into `completed`, so
/// a reader always sees one whole wrap in chronological order.
pub struct SampleRing {
    live: [Sample; RING_LEN],
    index: usize,
    completed: [Sample; RING_LEN],
    generation: u32,
}

impl SampleRing {
    pub const fn new() -> Self {
        const ZERO: Sample = Sample { duty: 0, current: 0 };
        Self {
            live: [ZERO; RING_LEN],
            index: 0,
            completed: [ZERO; RING_LEN],
            generation: 0,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.live[self.index] = sample;
        self.index += 1;
        if self.index >= RING_LEN {
            self.index = 0;
            self.completed = self.live;
            self.generation = self.generation.wrapping_add(1);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            samples: self.completed,
        }
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconfiguration the host service asks the tick to apply to the peripherals
/// it owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralRequest {
    Frequency(u32),
    Depth(u8),
    SenseResolution(u8),
    OutputPin(u8),
    SensePin(u8),
}

// ── Shared context ────────────────────────────────────────────────────────────

pub struct SharedState {
    ring: Mutex<CriticalSectionRawMutex, RefCell<SampleRing>>,
    streaming: AtomicBool,
    automation: AtomicBool,
    automation_start: AtomicBool,
    commanded_duty: AtomicU16,
    tick_period_us: AtomicU32,
    peripheral_chan: Channel<CriticalSectionRawMutex, PeripheralRequest, PERIPHERAL_QUEUE_LEN>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(SampleRing::new())),
            streaming: AtomicBool::new(false),
            automation: AtomicBool::new(false),
            automation_start: AtomicBool::new(false),
            commanded_duty: AtomicU16::new(0),
            tick_period_us: AtomicU32::new(100),
            peripheral_chan: Channel::new(),
        }
    }

    // --- Sample ring (tick writes, streamer reads) ---

    pub fn publish_sample(&self, sample: Sample) {
        self.ring.lock(|ring| ring.borrow_mut().push(sample));
    }

    /// Copy out the last completed wrap; the critical section lasts one memcpy.
    pub fn snapshot(&self) -> Snapshot {
        self.ring.lock(|ring| ring.borrow().snapshot())
    }

    // --- Mode flags ---

    pub fn streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn set_streaming(&self, enabled: bool) {
        self.streaming.store(enabled, Ordering::Release);
    }

    pub fn automation(&self) -> bool {
        self.automation.load(Ordering::Acquire)
    }

    /// Enable automation; the tick loads the next queued segment on its next run.
    pub fn start_automation(&self) {
        self.automation_start.store(true, Ordering::Release);
        self.automation.store(true, Ordering::Release);
    }

    pub fn stop_automation(&self) {
        self.automation.store(false, Ordering::Release);
        self.automation_start.store(false, Ordering::Release);
    }

    /// Tick side: consume a pending start request.
    pub fn take_automation_start(&self) -> bool {
        self.automation_start.swap(false, Ordering::AcqRel)
    }

    /// Tick side: the queue ran dry.
    pub fn automation_finished(&self) {
        self.automation.store(false, Ordering::Release);
    }

    // --- Duty ---

    pub fn commanded_duty(&self) -> u16 {
        self.commanded_duty.load(Ordering::Acquire)
    }

    pub fn command_duty(&self, duty: u16) {
        self.commanded_duty.store(duty, Ordering::Release);
    }

    // --- Timing ---

    pub fn tick_period_us(&self) -> u32 {
        self.tick_period_us.load(Ordering::Relaxed)
    }

    pub fn set_tick_period_us(&self, period_us: u32) {
        self.tick_period_us.store(period_us.max(1), Ordering::Relaxed);
    }

    // --- Peripheral mailbox ---

    /// Queue a reconfiguration for the tick. Returns false when the mailbox is full.
    pub fn request(&self, req: PeripheralRequest) -> bool {
        self.peripheral_chan.try_send(req).is_ok()
    }

    pub fn next_request(&self) -> Option<PeripheralRequest> {
        self.peripheral_chan.try_receive().ok()
    }
}
