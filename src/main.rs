//! AcousticInjector - main entry point
//!
//! On ESP32:
//! 1. Take peripherals, open NVS, load thresholds
//! 2. Wire relays, DAC tone output and the ADC sampling interrupt
//! 3. Run `Controller::cycle` every CONTROL_PERIOD_MS, drain logs to UART
//!
//! The BOOT button (GPIO0) requests a calibration, or confirms the current
//! capture window while one is running.
//!
//! On the host the same controller runs against simulated sensors and
//! actuators, one cycle per stdin line.

use acoustic_injector::controller::{CalibrationRequest, CONTROL_PERIOD_MS};
use acoustic_injector::thresholds::ThresholdStore;

static THRESHOLDS: ThresholdStore = ThresholdStore::new();
static CALIBRATION_REQUEST: CalibrationRequest = CalibrationRequest::new();

#[cfg(target_os = "espidf")]
fn main() -> Result<(), esp_idf_svc::sys::EspError> {
    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::gpio::{PinDriver, Pull};
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use acoustic_injector::actuator::{ActuatorOrchestrator, Relay, RELAY_ACOUSTIC, RELAY_SECONDARY};
    use acoustic_injector::audio::WaveformSynthesizer;
    use acoustic_injector::controller::Controller;
    use acoustic_injector::hal::esp::{start_sensor_timer, EspToneOutput};
    use acoustic_injector::isr::ISR;
    use acoustic_injector::log_globals::{FAULT, LOG_STREAM};
    use acoustic_injector::sensor::{Channel, SensorChannel};
    use acoustic_injector::state::ControlPolicy;
    use acoustic_injector::storage::nvs::{NvsStore, CALIBRATION_NAMESPACE, THRESHOLD_NAMESPACE};
    use acoustic_injector::uart_logger::{drain_to_uart, init_uart_logger, UartLoggerConfig};
    use acoustic_injector::{rt_info, rt_warn};

    esp_idf_svc::sys::link_patches();

    let now_ms = || (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1000) as u32;

    let p = Peripherals::take()?;
    let mut uart = init_uart_logger(p.uart0, p.pins.gpio1, &UartLoggerConfig::default())?;
    rt_info!(LOG_STREAM, now_ms(), "{}", env!("VERSION_STRING"));

    let partition = EspDefaultNvsPartition::take()?;
    let calib_store = NvsStore::open(partition.clone(), CALIBRATION_NAMESPACE).map_err(storage_error)?;
    let threshold_store = NvsStore::open(partition, THRESHOLD_NAMESPACE).map_err(storage_error)?;
    match THRESHOLDS.load(&threshold_store) {
        Ok(outcome) => rt_info!(LOG_STREAM, now_ms(), "thresholds: {:?}", outcome),
        Err(e) => rt_warn!(LOG_STREAM, now_ms(), "thresholds: {}, using defaults", e),
    }

    let acoustic_relay = Relay::new(PinDriver::output(p.pins.gpio4)?, RELAY_ACOUSTIC, &FAULT);
    let secondary_relay = Relay::new(PinDriver::output(p.pins.gpio2)?, RELAY_SECONDARY, &FAULT);
    let synth = WaveformSynthesizer::new(&ISR.tone, EspToneOutput::new()?, acoustic_relay, FreeRtos, &FAULT);
    let mut actuators = ActuatorOrchestrator::new(synth, secondary_relay);
    actuators.begin();

    start_sensor_timer()?;

    let mut button = PinDriver::input(p.pins.gpio0)?;
    button.set_pull(Pull::Up)?;
    let mut button_was_down = false;

    let map = SensorChannel::new(Channel::Map, ISR.samples.source(Channel::Map));
    let tps = SensorChannel::new(Channel::Tps, ISR.samples.source(Channel::Tps));
    let mut controller = Controller::new(
        map,
        tps,
        actuators,
        calib_store,
        &THRESHOLDS,
        &CALIBRATION_REQUEST,
        &FAULT,
        ControlPolicy::default(),
    );
    rt_info!(LOG_STREAM, now_ms(), "initial state {}", controller.state().as_str());

    loop {
        let down = button.is_low();
        if down && !button_was_down {
            if controller.is_calibrating() {
                controller.confirm_calibration();
            } else {
                CALIBRATION_REQUEST.request();
            }
        }
        button_was_down = down;

        controller.cycle(now_ms());
        drain_to_uart(&mut uart);
        FreeRtos::delay_ms(CONTROL_PERIOD_MS);
    }
}

#[cfg(target_os = "espidf")]
fn storage_error(e: acoustic_injector::storage::StorageError) -> esp_idf_svc::sys::EspError {
    use acoustic_injector::storage::StorageError;
    use esp_idf_svc::sys::{EspError, ESP_FAIL};

    let code = match e {
        StorageError::Io(code) => code,
        _ => ESP_FAIL,
    };
    EspError::from(code).unwrap_or_else(EspError::from_infallible::<ESP_FAIL>)
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    use std::io::BufRead;

    use acoustic_injector::actuator::{ActuatorOrchestrator, Relay, RELAY_ACOUSTIC, RELAY_SECONDARY};
    use acoustic_injector::audio::{ToneChannel, WaveformSynthesizer};
    use acoustic_injector::calibration::BENCH_CALIBRATION;
    use acoustic_injector::controller::Controller;
    use acoustic_injector::debug_override::parse_override;
    use acoustic_injector::fault::FaultState;
    use acoustic_injector::hal::sim::{FixedSource, NoDelay, SimPin, SimToneOutput};
    use acoustic_injector::log_globals::LOG_STREAM;
    use acoustic_injector::sensor::{Channel, SensorChannel};
    use acoustic_injector::state::{ControlPolicy, SystemState};
    use acoustic_injector::storage::MemoryStore;
    use acoustic_injector::thresholds::ThresholdKey;
    use acoustic_injector::uart_logger::format_log_entry;

    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let synth = WaveformSynthesizer::new(
        &tone,
        SimToneOutput::default(),
        Relay::new(SimPin::new(), RELAY_ACOUSTIC, &fault),
        NoDelay,
        &fault,
    );
    let mut actuators = ActuatorOrchestrator::new(synth, Relay::new(SimPin::new(), RELAY_SECONDARY, &fault));
    actuators.begin();

    let mut controller = Controller::new(
        SensorChannel::new(Channel::Map, FixedSource(0)),
        SensorChannel::new(Channel::Tps, FixedSource(0)),
        actuators,
        MemoryStore::new(),
        &THRESHOLDS,
        &CALIBRATION_REQUEST,
        &fault,
        ControlPolicy::default(),
    );
    if let Err(e) = controller.apply_calibration(&BENCH_CALIBRATION, 0) {
        eprintln!("bench calibration failed: {}", e);
    }

    println!("AcousticInjector simulator {}", env!("VERSION_STRING"));
    println!("lines: tps:<V>,map:<V>,tps_raw:<n>,map_raw:<n>,secondary:<0|1>,tone:<level>");
    println!("       force <STATE> | calibrate | confirm | clear | bench | active <0|1>");
    println!("       thresholds | set <name> <percent> | save | reset");

    let mut threshold_nvs = MemoryStore::new();
    let mut now_ms = 0u32;
    let mut log_buf = [0u8; 160];
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();

        if let Some(name) = line.strip_prefix("force ") {
            match SystemState::from_name(name.trim()) {
                Some(target) => {
                    if let Err(e) = controller.force_state(target, now_ms) {
                        println!("{}", e);
                    }
                }
                None => println!("unknown state {}", name.trim()),
            }
        } else if line == "calibrate" {
            CALIBRATION_REQUEST.request();
        } else if line == "confirm" {
            controller.confirm_calibration();
        } else if line == "clear" {
            if let Err(e) = controller.clear_calibration(now_ms) {
                println!("{}", e);
            }
        } else if line == "bench" {
            if let Err(e) = controller.apply_calibration(&BENCH_CALIBRATION, now_ms) {
                println!("{}", e);
            }
        } else if line == "thresholds" {
            for key in ThresholdKey::ALL {
                println!("  {:14} {:5.1}", key.as_str(), THRESHOLDS.get(key));
            }
        } else if let Some(args) = line.strip_prefix("set ") {
            let mut parts = args.split_whitespace();
            let result = match (parts.next(), parts.next().map(str::parse::<f32>)) {
                (Some(name), Some(Ok(value))) => THRESHOLDS.set_by_name(name, value).map(|_| ()),
                _ => {
                    println!("usage: set <name> <percent>");
                    Ok(())
                }
            };
            if let Err(e) = result {
                println!("{}", e);
            }
        } else if line == "save" {
            if let Err(e) = THRESHOLDS.save(&mut threshold_nvs) {
                println!("{}", e);
            }
        } else if line == "reset" {
            if let Err(e) = THRESHOLDS.reset_and_save(&mut threshold_nvs) {
                println!("{}", e);
            }
        } else if let Some(flag) = line.strip_prefix("active ") {
            controller.set_system_active(flag.trim() == "1", now_ms);
        } else if !line.is_empty() {
            match parse_override(line) {
                Ok(cmd) => {
                    controller.apply_override(&cmd, now_ms);
                }
                Err(e) => println!("{}", e),
            }
        }

        controller.cycle(now_ms);
        controller.service_override();
        now_ms = now_ms.wrapping_add(CONTROL_PERIOD_MS);

        while let Some(entry) = LOG_STREAM.drain() {
            let len = format_log_entry(&entry, &mut log_buf);
            print!("{}", String::from_utf8_lossy(&log_buf[..len]));
        }

        let d = controller.dashboard();
        println!(
            "state {} | TPS {:5.1}% {:.2} V | MAP {:5.1}% {:.2} V {:6.1} inHg | tone {} lvl {:.2} | secondary {}",
            d.state.as_str(),
            d.tps.percent,
            d.tps.volts,
            d.map.percent,
            d.map.volts,
            d.vacuum_inhg,
            if d.acoustic_on { "on" } else { "off" },
            d.level,
            if d.secondary_on { "on" } else { "off" },
        );
    }
}
