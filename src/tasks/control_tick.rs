//! Fixed-rate control tick.
//!
//! Runs at the highest priority. Each tick applies pending peripheral
//! reconfiguration, picks the duty (trajectory or commanded), writes it, reads
//! the current sense and publishes the pair into the sample ring. It never
//! waits on the host service.

use crate::drivers::actuator::{OutputStage, SenseInput};
use crate::drivers::trajectory::TrajectoryEngine;
use crate::settings::Settings;
use crate::state::{PeripheralRequest, Sample, SharedState};

pub struct ControlTick<'a, O: OutputStage, S: SenseInput> {
    output: O,
    sense: S,
    engine: TrajectoryEngine<'a>,
    max_duty: u16,
    ticks: u32,
}

impl<'a, O: OutputStage, S: SenseInput> ControlTick<'a, O, S> {
    /// Take ownership of the peripherals and configure them from `settings`.
    pub fn new(mut output: O, mut sense: S, engine: TrajectoryEngine<'a>, settings: &Settings) -> Self {
        output.select_pin(settings.pwm_output_pin);
        output.set_frequency(settings.pwm_frequency);
        output.set_depth(settings.pwm_depth);
        sense.select_pin(settings.current_sensing_pin);
        sense.set_resolution(settings.current_adc_resolution);

        Self {
            output,
            sense,
            engine,
            max_duty: settings.max_duty(),
            ticks: 0,
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn sense(&self) -> &S {
        &self.sense
    }

    /// Ticks executed since boot.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn tick(&mut self, shared: &SharedState) -> Sample {
        while let Some(req) = shared.next_request() {
            self.apply(req);
        }

        let period_us = shared.tick_period_us();
        if shared.take_automation_start() && !self.engine.start(period_us) {
            crate::log_debug!("automation: queue empty, holding duty");
            shared.automation_finished();
        }

        let duty = if shared.automation() {
            let duty = self.engine.advance(period_us);
            if !self.engine.is_running() {
                // Hold the final point once the queue drains.
                shared.command_duty(duty);
                shared.automation_finished();
                crate::log_debug!("automation: queue drained at duty {}", duty);
            }
            duty
        } else {
            shared.commanded_duty()
        };

        let duty = duty.min(self.max_duty);
        self.output.write_duty(duty);
        let current = self.sense.read();

        let sample = Sample { duty, current };
        shared.publish_sample(sample);
        self.ticks = self.ticks.wrapping_add(1);
        sample
    }

    fn apply(&mut self, req: PeripheralRequest) {
        crate::log_debug!("tick: applying {:?}", req);
        match req {
            PeripheralRequest::Frequency(hz) => self.output.set_frequency(hz),
            PeripheralRequest::Depth(bits) => {
                self.output.set_depth(bits);
                self.max_duty = ((1u32 << bits.min(16)) - 1) as u16;
            }
            PeripheralRequest::SenseResolution(bits) => self.sense.set_resolution(bits),
            PeripheralRequest::OutputPin(pin) => self.output.select_pin(pin),
            PeripheralRequest::SensePin(pin) => self.sense.select_pin(pin),
        }
    }
}

#[cfg(feature = "stm32")]
pub use firmware::control_tick_task;

#[cfg(feature = "stm32")]
mod firmware {
    use embassy_time::{Duration, Ticker};

    use super::ControlTick;
    use crate::drivers::adc::CurrentSense;
    use crate::drivers::pwm::SolenoidPwm;
    use crate::state::SharedState;

    /// Control loop, spawned on the high-priority interrupt executor.
    ///
    /// The period follows `SharedState::tick_period_us`; a change restarts the
    /// ticker at the new rate.
    #[embassy_executor::task]
    pub async fn control_tick_task(
        mut control: ControlTick<'static, SolenoidPwm<'static>, CurrentSense<'static>>,
        shared: &'static SharedState,
    ) {
        let mut period_us = shared.tick_period_us();
        let mut ticker = Ticker::every(Duration::from_micros(u64::from(period_us)));
        crate::log_info!("tick: running every {} us", period_us);

        loop {
            ticker.next().await;
            control.tick(shared);

            let wanted = shared.tick_period_us();
            if wanted != period_us {
                period_us = wanted;
                ticker = Ticker::every(Duration::from_micros(u64::from(period_us)));
                crate::log_info!("tick: period now {} us", period_us);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::trajectory::{Segment, SegmentQueue, SegmentWriter, Shape};
    use crate::mock::{MockOutput, MockSense};
    use crate::state::RING_LEN;

    #[test]
    fn static_duty_is_written_and_sampled() {
        let shared = SharedState::new();
        let mut q = SegmentQueue::new();
        let (_p, c) = q.split();
        let mut tick = ControlTick::new(MockOutput::new(), MockSense::new(10, 1), TrajectoryEngine::new(c), &Settings::default());

        shared.command_duty(300);
        for _ in 0..RING_LEN {
            tick.tick(&shared);
        }
        let snap = shared.snapshot();
        assert_eq!(snap.generation, 1);
        assert!(snap.samples.iter().all(|s| s.duty == 300));
        assert_eq!(snap.samples[0].current, 10);
        assert_eq!(snap.samples[RING_LEN - 1].current, 17);
        assert_eq!(tick.output().last_duty, Some(300));
        assert_eq!(tick.ticks(), RING_LEN as u32);
    }

    #[test]
    fn settings_configure_peripherals() {
        let mut settings = Settings::default();
        settings.pwm_frequency = 25_000;
        settings.current_adc_resolution = 12;
        let mut q = SegmentQueue::new();
        let (_p, c) = q.split();
        let tick = ControlTick::new(MockOutput::new(), MockSense::new(0, 0), TrajectoryEngine::new(c), &settings);
        assert_eq!(tick.output().frequency, 25_000);
        assert_eq!(tick.output().depth, 10);
        assert_eq!(tick.output().pin, 0x10);
        assert_eq!(tick.sense().resolution, 12);
        assert_eq!(tick.sense().pin, 0x21);
    }

    #[test]
    fn requests_apply_before_the_next_write() {
        let shared = SharedState::new();
        let mut q = SegmentQueue::new();
        let (_p, c) = q.split();
        let mut tick = ControlTick::new(MockOutput::new(), MockSense::new(0, 0), TrajectoryEngine::new(c), &Settings::default());

        shared.command_duty(1000);
        shared.request(PeripheralRequest::Depth(8));
        shared.request(PeripheralRequest::Frequency(2_000));
        shared.request(PeripheralRequest::SensePin(0x04));
        let sample = tick.tick(&shared);

        assert_eq!(sample.duty, 255);
        assert_eq!(tick.output().depth, 8);
        assert_eq!(tick.output().frequency, 2_000);
        assert_eq!(tick.sense().pin, 0x04);
        assert_eq!(shared.next_request(), None);
    }

    #[test]
    fn automation_ramp_then_hold() {
        let shared = SharedState::new();
        let mut q = SegmentQueue::new();
        let (p, c) = q.split();
        let mut writer = SegmentWriter::new(p);
        let mut tick = ControlTick::new(MockOutput::new(), MockSense::new(0, 0), TrajectoryEngine::new(c), &Settings::default());

        writer.enqueue(Segment { start: 100, end: 1000, duration_us: 1000, shape: Shape::Linear });
        shared.start_automation();

        let duties: std::vec::Vec<u16> = (0..12).map(|_| tick.tick(&shared).duty).collect();
        assert_eq!(&duties[..10], &[190, 280, 370, 460, 550, 640, 730, 820, 910, 1000]);
        assert_eq!(&duties[10..], &[1000, 1000]);
        assert!(!shared.automation());
        assert_eq!(shared.commanded_duty(), 1000);
    }

    #[test]
    fn start_with_empty_queue_keeps_commanded_duty() {
        let shared = SharedState::new();
        let mut q = SegmentQueue::new();
        let (_p, c) = q.split();
        let mut tick = ControlTick::new(MockOutput::new(), MockSense::new(0, 0), TrajectoryEngine::new(c), &Settings::default());

        shared.command_duty(42);
        shared.start_automation();
        assert_eq!(tick.tick(&shared).duty, 42);
        assert!(!shared.automation());
    }

    #[test]
    fn stop_automation_returns_to_commanded_duty() {
        let shared = SharedState::new();
        let mut q = SegmentQueue::new();
        let (p, c) = q.split();
        let mut writer = SegmentWriter::new(p);
        let mut tick = ControlTick::new(MockOutput::new(), MockSense::new(0, 0), TrajectoryEngine::new(c), &Settings::default());

        writer.enqueue(Segment { start: 0, end: 800, duration_us: 10_000, shape: Shape::Step });
        shared.command_duty(5);
        shared.start_automation();
        assert_eq!(tick.tick(&shared).duty, 800);
        shared.stop_automation();
        assert_eq!(tick.tick(&shared).duty, 5);
    }
}
