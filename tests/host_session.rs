//! End-to-end host sessions against the mock board: command bytes in, control
//! ticks run, reply and telemetry bytes decoded back out.

#![cfg(feature = "mock")]

use solenoid_controller::drivers::frame::ReplyParser;
use solenoid_controller::drivers::protocol::*;
use solenoid_controller::drivers::stream::{StreamDecoder, StreamPacket};
use solenoid_controller::drivers::trajectory::{SegmentQueue, SegmentWriter, TrajectoryEngine};
use solenoid_controller::mock::{MemoryStore, MockOutput, MockSense, MOCK_PINS};
use solenoid_controller::settings::Settings;
use solenoid_controller::state::{Sample, SharedState, RING_LEN};
use solenoid_controller::tasks::command_task::{Action, CommandRouter};
use solenoid_controller::tasks::control_tick::ControlTick;
use solenoid_controller::tasks::host_task::HostService;

fn command(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    let n = build_frame(&mut buf, opcode, payload);
    assert!(n > 0);
    buf[..n].to_vec()
}

fn send<St>(service: &mut HostService<'_, St>, bytes: &[u8]) -> (Vec<Reply>, Action)
where
    St: solenoid_controller::settings::SettingsStore,
{
    let mut raw = Vec::new();
    let action = service.on_bytes(bytes, |frame| raw.extend_from_slice(frame));
    let mut parser = ReplyParser::new();
    let mut replies = Vec::new();
    parser.push_bytes(&raw, |r| replies.push(r));
    assert_eq!(parser.rejected(), 0);
    (replies, action)
}

macro_rules! device {
    ($shared:ident, $service:ident, $tick:ident, $store:expr) => {
        let $shared = SharedState::new();
        let mut queue = SegmentQueue::new();
        let (tx, rx) = queue.split();
        let settings = Settings::default();
        let router = CommandRouter::new(settings, SegmentWriter::new(tx), MOCK_PINS, &$shared, $store);
        #[allow(unused_mut, unused_variables)]
        let mut $tick = ControlTick::new(MockOutput::new(), MockSense::new(500, 1), TrajectoryEngine::new(rx), &settings);
        #[allow(unused_mut)]
        let mut $service = HostService::new(router, &$shared, 0);
    };
}

#[test]
fn ping_is_acknowledged() {
    device!(shared, service, _tick, MemoryStore::new());
    let bytes = command(CMD_PING, &[]);
    assert_eq!(bytes, vec![0x01, 0x01, 0x01]);
    assert_eq!(send(&mut service, &bytes), (vec![Reply::Ack(CMD_PING)], Action::Continue));
}

#[test]
fn queued_ramp_streams_out_as_linear_duties() {
    device!(shared, service, tick, MemoryStore::new());

    let mut input = command(CMD_QUEUE_TRAJ_SEG, &[0x00, 0x64, 0x03, 0xE8, 0x03, 0xE8, 0x01]);
    input.extend(command(CMD_START_STREAM, &[]));
    input.extend(command(CMD_START_AUTOMATION, &[]));
    let (replies, _) = send(&mut service, &input);
    assert_eq!(
        replies,
        vec![Reply::Ack(CMD_QUEUE_TRAJ_SEG), Reply::Ack(CMD_START_STREAM), Reply::Ack(CMD_START_AUTOMATION)]
    );

    // 1000 us at the default 100 us tick: ten steps, then hold. Poll telemetry
    // after every tick like the cooperative loop would.
    let mut stream = Vec::new();
    for n in 0..2 * RING_LEN as u64 {
        tick.tick(&shared);
        service.poll_telemetry(100 * (n + 1), false, |pkt| stream.extend_from_slice(pkt));
    }

    let mut decoder = StreamDecoder::new();
    let mut duties = Vec::new();
    decoder.push_bytes(&stream, |pkt| {
        if let StreamPacket::Snapshot { samples, .. } = pkt {
            duties.extend(samples.iter().map(|s| s.duty));
        }
    });
    assert_eq!(decoder.crc_errors(), 0);
    assert_eq!(
        duties,
        vec![190, 280, 370, 460, 550, 640, 730, 820, 910, 1000, 1000, 1000, 1000, 1000, 1000, 1000]
    );
    assert!(!shared.automation());
    let (replies, _) = send(&mut service, &command(CMD_GET_DUTY, &[]));
    assert_eq!(replies, vec![Reply::Duty(1000)]);
}

#[test]
fn bare_segment_frame_ramps_over_default_duration() {
    device!(shared, service, tick, MemoryStore::new());

    // Queue 0x64 -> 0x3E8 linear with no duration field, then start.
    let segment = [0x06, 0x52, 0x00, 0x64, 0x03, 0xE8, 0x01, 0xA2];
    assert_eq!(segment.to_vec(), command(CMD_QUEUE_TRAJ_SEG, &[0x00, 0x64, 0x03, 0xE8, 0x01]));
    let mut input = segment.to_vec();
    input.extend(command(CMD_START_STREAM, &[]));
    input.extend([0x01, 0x50, 0x50]);
    let (replies, _) = send(&mut service, &input);
    assert_eq!(
        replies,
        vec![Reply::Ack(CMD_QUEUE_TRAJ_SEG), Reply::Ack(CMD_START_STREAM), Reply::Ack(CMD_START_AUTOMATION)]
    );

    let mut stream = Vec::new();
    for n in 0..2 * RING_LEN as u64 {
        tick.tick(&shared);
        service.poll_telemetry(100 * (n + 1), false, |pkt| stream.extend_from_slice(pkt));
    }

    let mut decoder = StreamDecoder::new();
    let mut duties = Vec::new();
    decoder.push_bytes(&stream, |pkt| {
        if let StreamPacket::Snapshot { samples, .. } = pkt {
            duties.extend(samples.iter().map(|s| s.duty));
        }
    });
    assert_eq!(decoder.crc_errors(), 0);
    assert_eq!(&duties[..10], &[190, 280, 370, 460, 550, 640, 730, 820, 910, 1000]);
    assert!(duties[10..].iter().all(|&d| d == 0x3E8));
    assert!(!shared.automation());
}

#[test]
fn out_of_range_duty_is_refused() {
    device!(shared, service, tick, MemoryStore::new());

    let (replies, _) = send(&mut service, &command(CMD_SET_DUTY_ACK, &[0x01, 0x00]));
    assert_eq!(replies, vec![Reply::Ack(CMD_SET_DUTY_ACK)]);

    let (replies, _) = send(&mut service, &command(CMD_SET_DUTY_ACK, &[0x04, 0x00]));
    assert_eq!(replies, vec![Reply::Error { opcode: CMD_SET_DUTY_ACK, code: ErrorCode::InvalidDuty }]);

    let (replies, _) = send(&mut service, &command(CMD_GET_DUTY, &[]));
    assert_eq!(replies, vec![Reply::Duty(0x100)]);
    assert_eq!(tick.tick(&shared), Sample { duty: 0x100, current: 500 });
}

#[test]
fn line_noise_and_corruption() {
    device!(shared, service, _tick, MemoryStore::new());

    let mut input = vec![0x00, 0xFF, 0x40];
    input.extend(command(CMD_PING, &[]));
    let mut bad = command(CMD_SET_PWM_FREQ, &20_000u32.to_be_bytes());
    let last = bad.len() - 1;
    bad[last] ^= 0x10;
    input.extend(bad);
    input.extend(command(0x60, &[]));

    let (replies, _) = send(&mut service, &input);
    assert_eq!(
        replies,
        vec![
            Reply::Ack(CMD_PING),
            Reply::Error { opcode: CMD_SET_PWM_FREQ, code: ErrorCode::InvalidPayload },
            Reply::Error { opcode: 0x60, code: ErrorCode::UnknownCommand },
        ]
    );
    assert_eq!(service.router().settings().pwm_frequency, 10_000);
}

#[test]
fn time_sync_runs_without_streaming() {
    device!(shared, service, tick, MemoryStore::new());

    let mut stream = Vec::new();
    for n in 0..=12u64 {
        tick.tick(&shared);
        service.poll_telemetry(n * 100_000, false, |pkt| stream.extend_from_slice(pkt));
    }

    let mut decoder = StreamDecoder::new();
    let mut packets = Vec::new();
    decoder.push_bytes(&stream, |pkt| packets.push(pkt));
    assert_eq!(
        packets,
        vec![
            StreamPacket::TimeSync { kind: 1, micros: 500_000 },
            StreamPacket::TimeSync { kind: 1, micros: 1_000_000 },
        ]
    );
}

#[test]
fn settings_survive_save_and_reset() {
    let mut store = MemoryStore::new();
    {
        device!(shared, service, _tick, MemoryStore::new());
        let mut input = command(CMD_SET_PWM_FREQ, &25_000u32.to_be_bytes());
        input.extend(command(CMD_SET_CURRENT_ADC_RATE, &5_000u16.to_be_bytes()));
        input.extend(command(CMD_SOFT_RESET_SAVE, &[]));
        input.extend(command(CMD_PING, &[]));

        let (replies, action) = send(&mut service, &input);
        assert_eq!(
            replies,
            vec![
                Reply::Ack(CMD_SET_PWM_FREQ),
                Reply::Ack(CMD_SET_CURRENT_ADC_RATE),
                Reply::Ack(CMD_SOFT_RESET_SAVE),
            ]
        );
        assert_eq!(action, Action::Reset { delay_ms: 100 });
        store.record = service.router().store().record;
    }

    let settings = Settings::load(&mut store);
    assert_eq!(settings.pwm_frequency, 25_000);
    assert_eq!(settings.current_adc_rate, 5_000);
    assert_eq!(settings.tick_period_us(), 200);
}
