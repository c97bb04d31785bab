//! Host command routing.
//!
//! Turns a parsed frame into state changes and at most one reply. Runs in the
//! cooperative context: it owns `Settings`, the producer end of the trajectory
//! queue and the settings store; everything the tick needs goes through
//! `SharedState`.

use crate::drivers::actuator::BoardPins;
use crate::drivers::frame::{Frame, FrameEvent};
use crate::drivers::protocol::*;
use crate::drivers::trajectory::{Segment, SegmentWriter};
use crate::settings::*;
use crate::state::{PeripheralRequest, SharedState};

/// Delay between the acknowledgement of a save-and-reset and the reset itself,
/// so the reply can leave the link.
pub const RESET_DELAY_MS: u32 = 100;

/// What the caller must do once the reply (if any) has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Continue,
    /// Reset the device after `delay_ms`.
    Reset { delay_ms: u32 },
}

pub struct CommandRouter<'a, St: SettingsStore> {
    settings: Settings,
    queue: SegmentWriter<'a>,
    pins: BoardPins,
    shared: &'a SharedState,
    store: St,
}

impl<'a, St: SettingsStore> CommandRouter<'a, St> {
    /// Publishes the tick period derived from `settings` and parks the output at
    /// its idle (full-scale) level.
    pub fn new(settings: Settings, queue: SegmentWriter<'a>, pins: BoardPins, shared: &'a SharedState, store: St) -> Self {
        shared.set_tick_period_us(settings.tick_period_us());
        shared.command_duty(settings.max_duty());
        Self {
            settings,
            queue,
            pins,
            shared,
            store,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn queue(&self) -> &SegmentWriter<'a> {
        &self.queue
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn handle(&mut self, event: &FrameEvent) -> (Option<Reply>, Action) {
        match event {
            FrameEvent::Valid(frame) => self.dispatch(frame),
            FrameEvent::Corrupt { opcode } => {
                crate::log_warn!("cmd: checksum mismatch on 0x{:x}", opcode);
                (Some(error(*opcode, ErrorCode::InvalidPayload)), Action::Continue)
            }
        }
    }

    fn dispatch(&mut self, frame: &Frame) -> (Option<Reply>, Action) {
        let op = frame.opcode;
        let p = frame.payload.as_slice();

        let result = match op {
            CMD_PING => Ok(Some(Reply::Ack(op))),
            CMD_GET_STATUS => Ok(Some(Reply::Status(self.settings.status_record()))),
            CMD_GET_DUTY => Ok(Some(Reply::Duty(self.shared.commanded_duty()))),

            CMD_STOP_PWM => {
                self.shared.stop_automation();
                self.shared.command_duty(self.settings.max_duty());
                Ok(Some(Reply::Ack(op)))
            }

            CMD_SET_PWM_OUTPUT_PIN => self.set_output_pin(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_PWM_SENSING_PIN => self.set_pwm_sensing_pin(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_CURRENT_SENSING_PIN => self.set_current_sensing_pin(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_PWM_FREQ => self.set_frequency(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_PWM_ADC_RATE => self.set_pwm_adc_rate(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_CURRENT_ADC_RATE => self.set_current_adc_rate(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_PWM_ADC_RES => self.set_pwm_adc_resolution(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_CURRENT_ADC_RES => self.set_current_adc_resolution(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_PWM_DEPTH => self.set_depth(p).map(|()| Some(Reply::Ack(op))),

            CMD_SET_DUTY_ACK => self.set_duty(p).map(|()| Some(Reply::Ack(op))),
            CMD_SET_DUTY => self.set_duty(p).map(|()| None),
            CMD_SET_DUTY_FAST => {
                if let Err(code) = self.set_duty(p) {
                    crate::log_debug!("cmd: fast duty ignored ({:?})", code);
                }
                Ok(None)
            }

            CMD_SAVE_SETTINGS => self.save().map(|()| Some(Reply::Ack(op))),
            CMD_SOFT_RESET => {
                crate::log_info!("cmd: soft reset");
                return (None, Action::Reset { delay_ms: 0 });
            }
            CMD_SOFT_RESET_SAVE => {
                return match self.save() {
                    Ok(()) => {
                        crate::log_info!("cmd: settings saved, resetting");
                        (Some(Reply::Ack(op)), Action::Reset { delay_ms: RESET_DELAY_MS })
                    }
                    Err(code) => (Some(error(op, code)), Action::Continue),
                };
            }

            CMD_START_STREAM => {
                self.shared.set_streaming(true);
                Ok(Some(Reply::Ack(op)))
            }
            CMD_STOP_STREAM => {
                self.shared.set_streaming(false);
                Ok(Some(Reply::Ack(op)))
            }

            CMD_START_AUTOMATION => {
                self.shared.start_automation();
                Ok(Some(Reply::Ack(op)))
            }
            CMD_STOP_AUTOMATION => {
                self.shared.stop_automation();
                Ok(Some(Reply::Ack(op)))
            }
            CMD_QUEUE_TRAJ_SEG => self.enqueue(p).map(|()| Some(Reply::Ack(op))),

            _ => {
                crate::log_warn!("cmd: unknown opcode 0x{:x}", op);
                Err(ErrorCode::UnknownCommand)
            }
        };

        match result {
            Ok(reply) => (reply, Action::Continue),
            Err(code) => (Some(error(op, code)), Action::Continue),
        }
    }

    // ── Setters ───────────────────────────────────────────────────────────────

    fn set_output_pin(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        let pin = arg_u8(p)?;
        if !self.pins.output_ok(pin) {
            return Err(ErrorCode::InvalidPayload);
        }
        self.settings.pwm_output_pin = pin;
        self.post(PeripheralRequest::OutputPin(pin));
        Ok(())
    }

    fn set_pwm_sensing_pin(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        let pin = arg_u8(p)?;
        if !self.pins.pwm_sense_ok(pin) {
            return Err(ErrorCode::InvalidPayload);
        }
        self.settings.pwm_sensing_pin = pin;
        Ok(())
    }

    fn set_current_sensing_pin(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        let pin = arg_u8(p)?;
        if !self.pins.current_sense_ok(pin) {
            return Err(ErrorCode::InvalidPayload);
        }
        self.settings.current_sensing_pin = pin;
        self.post(PeripheralRequest::SensePin(pin));
        Ok(())
    }

    fn set_frequency(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        let [a, b, c, d] = p else {
            return Err(ErrorCode::InvalidPayload);
        };
        let hz = u32::from_be_bytes([*a, *b, *c, *d]).clamp(PWM_FREQ_MIN, PWM_FREQ_MAX);
        self.settings.pwm_frequency = hz;
        self.post(PeripheralRequest::Frequency(hz));
        Ok(())
    }

    fn set_pwm_adc_rate(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        self.settings.pwm_adc_rate = arg_rate(p)?;
        Ok(())
    }

    fn set_current_adc_rate(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        self.settings.current_adc_rate = arg_rate(p)?;
        self.shared.set_tick_period_us(self.settings.tick_period_us());
        Ok(())
    }

    fn set_pwm_adc_resolution(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        self.settings.pwm_adc_resolution = arg_in(p, ADC_RES_MIN, ADC_RES_MAX)?;
        Ok(())
    }

    fn set_current_adc_resolution(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        let bits = arg_in(p, ADC_RES_MIN, ADC_RES_MAX)?;
        self.settings.current_adc_resolution = bits;
        self.post(PeripheralRequest::SenseResolution(bits));
        Ok(())
    }

    fn set_depth(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        let bits = arg_in(p, PWM_DEPTH_MIN, PWM_DEPTH_MAX)?;
        self.settings.pwm_depth = bits;
        self.post(PeripheralRequest::Depth(bits));

        let max = self.settings.max_duty();
        if self.shared.commanded_duty() > max {
            self.shared.command_duty(max);
        }
        Ok(())
    }

    fn set_duty(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        let [hi, lo] = p else {
            return Err(ErrorCode::InvalidPayload);
        };
        let duty = u16::from_be_bytes([*hi, *lo]);
        if duty > self.settings.max_duty() {
            return Err(ErrorCode::InvalidDuty);
        }
        self.shared.command_duty(duty);
        Ok(())
    }

    // ── Queue / storage ───────────────────────────────────────────────────────

    fn enqueue(&mut self, p: &[u8]) -> Result<(), ErrorCode> {
        let segment = Segment::decode(p).ok_or(ErrorCode::InvalidPayload)?;
        if !self.queue.enqueue(segment) {
            crate::log_warn!("cmd: trajectory queue full, {} dropped", self.queue.dropped());
        }
        Ok(())
    }

    fn save(&mut self) -> Result<(), ErrorCode> {
        self.settings.save(&mut self.store).map_err(|err| {
            crate::log_error!("cmd: settings save failed: {:?}", err);
            ErrorCode::InvalidPayload
        })
    }

    fn post(&self, req: PeripheralRequest) {
        if !self.shared.request(req) {
            crate::log_warn!("cmd: peripheral mailbox full, {:?} dropped", req);
        }
    }
}

fn error(opcode: u8, code: ErrorCode) -> Reply {
    Reply::Error { opcode, code }
}

fn arg_u8(p: &[u8]) -> Result<u8, ErrorCode> {
    match p {
        [v] => Ok(*v),
        _ => Err(ErrorCode::InvalidPayload),
    }
}

fn arg_in(p: &[u8], min: u8, max: u8) -> Result<u8, ErrorCode> {
    let v = arg_u8(p)?;
    if (min..=max).contains(&v) {
        Ok(v)
    } else {
        Err(ErrorCode::InvalidPayload)
    }
}

fn arg_rate(p: &[u8]) -> Result<u16, ErrorCode> {
    let [hi, lo] = p else {
        return Err(ErrorCode::InvalidPayload);
    };
    let rate = u16::from_be_bytes([*hi, *lo]);
    if (ADC_RATE_MIN..=ADC_RATE_MAX).contains(&rate) {
        Ok(rate)
    } else {
        Err(ErrorCode::InvalidPayload)
    }
}
