//! Cooperative host service: command parsing and routing first, telemetry
//! when the link is quiet.

use crate::drivers::frame::FrameParser;
use crate::settings::SettingsStore;
use crate::state::SharedState;

use super::command_task::{Action, CommandRouter};
use super::telemetry_task::Streamer;

pub struct HostService<'a, St: SettingsStore> {
    parser: FrameParser,
    router: CommandRouter<'a, St>,
    streamer: Streamer,
    shared: &'a SharedState,
}

impl<'a, St: SettingsStore> HostService<'a, St> {
    pub fn new(router: CommandRouter<'a, St>, shared: &'a SharedState, now_us: u64) -> Self {
        Self {
            parser: FrameParser::new(),
            router,
            streamer: Streamer::new(now_us),
            shared,
        }
    }

    pub fn router(&self) -> &CommandRouter<'a, St> {
        &self.router
    }

    pub fn streamer(&self) -> &Streamer {
        &self.streamer
    }

    /// Parse inbound bytes and route every complete frame, handing encoded
    /// replies to `reply`.
    ///
    /// Stops at the first frame asking for a reset; the remaining bytes are
    /// dropped since the device is about to restart.
    pub fn on_bytes(&mut self, data: &[u8], mut reply: impl FnMut(&[u8])) -> Action {
        for &b in data {
            let Some(event) = self.parser.push_byte(b) else {
                continue;
            };
            let (response, action) = self.router.handle(&event);
            if let Some(response) = response {
                reply(&response.encode());
            }
            if action != Action::Continue {
                return action;
            }
        }
        Action::Continue
    }

    /// Emit due telemetry unless a command is arriving.
    pub fn poll_telemetry(&mut self, now_us: u64, input_pending: bool, emit: impl FnMut(&[u8])) {
        if input_pending || !self.parser.is_idle() {
            return;
        }
        self.streamer.poll(now_us, self.shared, emit);
    }
}

#[cfg(feature = "stm32")]
pub use firmware::host_task;

#[cfg(feature = "stm32")]
mod firmware {
    use embassy_futures::select::{select, Either};
    use embassy_time::{Duration, Instant, Timer};
    use embassy_usb::driver::EndpointError;
    use heapless::Vec;

    use super::HostService;
    use crate::drivers::flash::FlashStore;
    use crate::tasks::command_task::Action;
    use crate::usb::UsbSerial;

    /// Idle wait between telemetry checks; a ring wrap takes 8 ticks.
    const TELEMETRY_POLL: Duration = Duration::from_micros(250);
    const USB_PACKET: usize = 64;

    #[embassy_executor::task]
    pub async fn host_task(mut usb: UsbSerial<'static>, mut service: HostService<'static, FlashStore<'static>>) {
        let mut rx = [0u8; USB_PACKET];
        let mut tx: Vec<u8, 512> = Vec::new();

        loop {
            usb.wait_connection().await;
            crate::log_info!("usb: host connected");

            loop {
                tx.clear();
                // Inbound bytes win: `select` polls the read first.
                let event = select(usb.read_packet(&mut rx), Timer::after(TELEMETRY_POLL)).await;
                let action = match event {
                    Either::First(Ok(n)) => service.on_bytes(&rx[..n], |frame| push(&mut tx, frame)),
                    Either::First(Err(_)) => break,
                    Either::Second(()) => {
                        let now = Instant::now().as_micros();
                        service.poll_telemetry(now, false, |pkt| push(&mut tx, pkt));
                        Action::Continue
                    }
                };

                if write_all(&mut usb, &tx).await.is_err() {
                    break;
                }

                if let Action::Reset { delay_ms } = action {
                    Timer::after(Duration::from_millis(u64::from(delay_ms))).await;
                    cortex_m::peripheral::SCB::sys_reset();
                }
            }

            crate::log_info!("usb: host disconnected");
        }
    }

    fn push(tx: &mut Vec<u8, 512>, data: &[u8]) {
        if tx.extend_from_slice(data).is_err() {
            crate::log_warn!("usb: tx buffer full, {} bytes dropped", data.len());
        }
    }

    async fn write_all(usb: &mut UsbSerial<'static>, data: &[u8]) -> Result<(), EndpointError> {
        if data.is_empty() {
            return Ok(());
        }
        for chunk in data.chunks(USB_PACKET) {
            usb.write_packet(chunk).await?;
        }
        // A full last packet needs a zero-length one to end the transfer.
        if data.len() % USB_PACKET == 0 {
            usb.write_packet(&[]).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::actuator::BoardPins;
    use crate::drivers::frame::ReplyParser;
    use crate::drivers::protocol::*;
    use crate::drivers::trajectory::{SegmentQueue, SegmentWriter};
    use crate::mock::{MemoryStore, MOCK_PINS};
    use crate::settings::Settings;
    use crate::state::{Sample, RING_LEN};

    fn framed(opcode: u8, payload: &[u8]) -> std::vec::Vec<u8> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let n = build_frame(&mut buf, opcode, payload);
        buf[..n].to_vec()
    }

    fn replies(bytes: &[u8]) -> std::vec::Vec<Reply> {
        let mut parser = ReplyParser::new();
        let mut out = std::vec::Vec::new();
        parser.push_bytes(bytes, |r| out.push(r));
        out
    }

    fn service<'a>(shared: &'a SharedState, q: &'a mut SegmentQueue, pins: BoardPins) -> HostService<'a, MemoryStore> {
        let (p, _c) = q.split();
        let router = CommandRouter::new(Settings::default(), SegmentWriter::new(p), pins, shared, MemoryStore::new());
        HostService::new(router, shared, 0)
    }

    #[test]
    fn routes_back_to_back_frames() {
        let shared = SharedState::new();
        let mut q = SegmentQueue::new();
        let mut svc = service(&shared, &mut q, MOCK_PINS);

        let mut input = framed(CMD_PING, &[]);
        input.extend(framed(CMD_SET_DUTY, &[0x00, 0x40]));
        input.extend(framed(CMD_GET_DUTY, &[]));

        let mut out = std::vec::Vec::new();
        assert_eq!(svc.on_bytes(&input, |f| out.extend_from_slice(f)), Action::Continue);
        assert_eq!(replies(&out), vec![Reply::Ack(CMD_PING), Reply::Duty(0x40)]);
    }

    #[test]
    fn reset_stops_processing() {
        let shared = SharedState::new();
        let mut q = SegmentQueue::new();
        let mut svc = service(&shared, &mut q, MOCK_PINS);

        let mut input = framed(CMD_SOFT_RESET_SAVE, &[]);
        input.extend(framed(CMD_PING, &[]));
        let mut out = std::vec::Vec::new();
        let action = svc.on_bytes(&input, |f| out.extend_from_slice(f));
        assert_eq!(action, Action::Reset { delay_ms: 100 });
        assert_eq!(replies(&out), vec![Reply::Ack(CMD_SOFT_RESET_SAVE)]);
    }

    #[test]
    fn telemetry_waits_for_a_quiet_link() {
        let shared = SharedState::new();
        let mut q = SegmentQueue::new();
        let mut svc = service(&shared, &mut q, MOCK_PINS);
        shared.set_streaming(true);
        for n in 0..RING_LEN as u16 {
            shared.publish_sample(Sample { duty: n, current: n });
        }

        let mut out = std::vec::Vec::new();
        svc.poll_telemetry(10, true, |p| out.extend_from_slice(p));
        assert!(out.is_empty());

        // Half a frame received: still busy.
        svc.on_bytes(&[0x03, CMD_SET_DUTY_ACK], |_| {});
        svc.poll_telemetry(20, false, |p| out.extend_from_slice(p));
        assert!(out.is_empty());

        let mut replies_out = std::vec::Vec::new();
        svc.on_bytes(&[0x00, 0x01, 0x1A], |f| replies_out.extend_from_slice(f));
        assert_eq!(replies(&replies_out), vec![Reply::Ack(CMD_SET_DUTY_ACK)]);

        svc.poll_telemetry(30, false, |p| out.extend_from_slice(p));
        assert_eq!(out.len(), crate::drivers::stream::SNAPSHOT_PACKET_LEN);
    }
}
