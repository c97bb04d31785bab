#![no_std]
#![no_main]

use cortex_m_rt::entry;
use embassy_executor::{Executor, InterruptExecutor};
use embassy_stm32::adc::Adc;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Level, Output, OutputType, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::peripherals::PC13;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::Channel;
use embassy_time::{Delay, Duration, Instant, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use solenoid_controller::board::{self, Board};
use solenoid_controller::drivers::adc::CurrentSense;
use solenoid_controller::drivers::flash::FlashStore;
use solenoid_controller::drivers::pwm::SolenoidPwm;
use solenoid_controller::drivers::trajectory::{SegmentQueue, SegmentWriter, TrajectoryEngine};
use solenoid_controller::settings::Settings;
use solenoid_controller::state::SharedState;
use solenoid_controller::tasks::command_task::CommandRouter;
use solenoid_controller::tasks::control_tick::{control_tick_task, ControlTick};
use solenoid_controller::tasks::host_task::{host_task, HostService};
use solenoid_controller::usb;

// ── Shared context ────────────────────────────────────────────────────────────
static SHARED: SharedState = SharedState::new();
static SEGMENTS: StaticCell<SegmentQueue> = StaticCell::new();

// ── Executors ─────────────────────────────────────────────────────────────────
//  High: control tick, preempts everything else. Low: USB, host service, LED.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_LOW: StaticCell<Executor> = StaticCell::new();

#[interrupt]
unsafe fn UART5() {
    EXECUTOR_HIGH.on_interrupt()
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────
#[embassy_executor::task]
async fn heartbeat_task(mut led: Output<'static, PC13>) {
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(500)).await;
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────
#[entry]
fn main() -> ! {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    let p = board.p;

    // 2. Settings from the last flash sector, defaults when blank or invalid
    let mut store = FlashStore::new(Flash::new_blocking(p.FLASH));
    let settings = Settings::load(&mut store);
    defmt::info!("settings: {:?}", settings);

    // 3. Trajectory queue: producer to the host service, consumer to the tick
    let (segments_tx, segments_rx) = SEGMENTS.init(SegmentQueue::new()).split();

    // 4. Solenoid PWM on TIM3 CH3 (PB0), current sense on ADC1 (PC1)
    let ch3 = PwmPin::new_ch3(p.PB0, OutputType::PushPull);
    let pwm = SimplePwm::new(
        p.TIM3,
        None, None, Some(ch3), None,
        Hertz(settings.pwm_frequency),
        Default::default(),
    );
    let output = SolenoidPwm::new(pwm, Channel::Ch3, board::PWM_OUTPUT_PIN);
    let adc = Adc::new(p.ADC1, &mut Delay);
    let sense = CurrentSense::new(adc, p.PC1, board::CURRENT_SENSE_PIN);

    // 5. Router first: it publishes the tick period and the idle duty
    let router = CommandRouter::new(settings, SegmentWriter::new(segments_tx), board::PINS, &SHARED, store);
    let control = ControlTick::new(output, sense, TrajectoryEngine::new(segments_rx), &settings);

    // 6. Control tick on the interrupt executor
    interrupt::UART5.set_priority(Priority::P6);
    let high = EXECUTOR_HIGH.start(interrupt::UART5);
    high.spawn(control_tick_task(control, &SHARED)).unwrap();

    // 7. USB CDC-ACM host link
    let (usb_dev, usb_serial) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
    let service = HostService::new(router, &SHARED, Instant::now().as_micros());

    // 8. Heartbeat LED (PC13)
    let led = Output::new(p.PC13, Level::High, Speed::Low);

    let executor = EXECUTOR_LOW.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(usb::usb_task(usb_dev)).unwrap();
        spawner.spawn(host_task(usb_serial, service)).unwrap();
        spawner.spawn(heartbeat_task(led)).unwrap();
    })
}
