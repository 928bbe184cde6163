//! ESP-IDF peripheral bindings.
//!
//! Pin-out (ESP32):
//!
//! | signal          | GPIO | peripheral   |
//! |-----------------|------|--------------|
//! | MAP             | 35   | ADC1 CH7     |
//! | TPS             | 34   | ADC1 CH6     |
//! | tone            | 25   | DAC CH0      |
//! | acoustic relay  | 4    | output       |
//! | secondary relay | 2    | output       |
//!
//! Two GPTimers drive the interrupts: a 1 kHz one converts both ADC
//! channels into [`ISR`](crate::isr::ISR), and a [`SAMPLE_RATE_HZ`] one
//! writes the next tone sample to the DAC. Driver handles used from
//! interrupt context are published once through `AtomicPtr`s before the
//! timers start.

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use esp_idf_svc::sys::{self, esp, EspError};

use super::{OutputError, ToneOutput};
use crate::audio::{MIDSCALE, SAMPLE_RATE_HZ};
use crate::isr;

/// MAP input channel (GPIO35).
pub const MAP_ADC_CHANNEL: sys::adc_channel_t = sys::adc_channel_t_ADC_CHANNEL_7;

/// TPS input channel (GPIO34).
pub const TPS_ADC_CHANNEL: sys::adc_channel_t = sys::adc_channel_t_ADC_CHANNEL_6;

/// GPTimer tick rate.
pub const TIMER_RESOLUTION_HZ: u32 = 10_000_000;

/// Sensor interrupt period in timer ticks (1 kHz).
pub const SENSOR_ALARM_TICKS: u64 = (TIMER_RESOLUTION_HZ / 1_000) as u64;

/// Tone interrupt period in timer ticks.
pub const TONE_ALARM_TICKS: u64 = (TIMER_RESOLUTION_HZ / SAMPLE_RATE_HZ) as u64;

static ADC_HANDLE: AtomicPtr<sys::adc_oneshot_unit_ctx_t> = AtomicPtr::new(ptr::null_mut());
static DAC_HANDLE: AtomicPtr<sys::dac_oneshot_s> = AtomicPtr::new(ptr::null_mut());

fn output_error(e: EspError) -> OutputError {
    OutputError(e.code())
}

fn read_isr(handle: sys::adc_oneshot_unit_handle_t, channel: sys::adc_channel_t) -> u16 {
    let mut raw: i32 = 0;
    // SAFETY: handle was published by `start_sensor_timer` and lives forever.
    let ok = unsafe { sys::adc_oneshot_read_isr(handle, channel, &mut raw) } == sys::ESP_OK;
    if ok {
        raw.clamp(0, super::ADC_MAX as i32) as u16
    } else {
        0
    }
}

unsafe extern "C" fn on_sensor_alarm(
    _timer: sys::gptimer_handle_t,
    _edata: *const sys::gptimer_alarm_event_data_t,
    _ctx: *mut c_void,
) -> bool {
    let handle = ADC_HANDLE.load(Ordering::Acquire);
    if !handle.is_null() {
        isr::sensor_tick(read_isr(handle, MAP_ADC_CHANNEL), read_isr(handle, TPS_ADC_CHANNEL));
    }
    false
}

unsafe extern "C" fn on_tone_alarm(
    _timer: sys::gptimer_handle_t,
    _edata: *const sys::gptimer_alarm_event_data_t,
    _ctx: *mut c_void,
) -> bool {
    let handle = DAC_HANDLE.load(Ordering::Acquire);
    if let (Some(sample), false) = (isr::tone_tick(), handle.is_null()) {
        sys::dac_oneshot_output_voltage(handle, sample);
    }
    false
}

fn new_periodic_timer(
    alarm_ticks: u64,
    on_alarm: sys::gptimer_alarm_cb_t,
) -> Result<sys::gptimer_handle_t, EspError> {
    let config = sys::gptimer_config_t {
        clk_src: sys::soc_periph_gptimer_clk_src_t_GPTIMER_CLK_SRC_DEFAULT,
        direction: sys::gptimer_count_direction_t_GPTIMER_COUNT_UP,
        resolution_hz: TIMER_RESOLUTION_HZ,
        ..Default::default()
    };
    let mut timer: sys::gptimer_handle_t = ptr::null_mut();
    let callbacks = sys::gptimer_event_callbacks_t { on_alarm };
    let mut alarm = sys::gptimer_alarm_config_t {
        alarm_count: alarm_ticks,
        reload_count: 0,
        ..Default::default()
    };
    alarm.flags.set_auto_reload_on_alarm(1);

    // SAFETY: plain IDF driver calls with valid config pointers.
    unsafe {
        esp!(sys::gptimer_new_timer(&config, &mut timer))?;
        esp!(sys::gptimer_register_event_callbacks(timer, &callbacks, ptr::null_mut()))?;
        esp!(sys::gptimer_set_alarm_action(timer, &alarm))?;
        esp!(sys::gptimer_enable(timer))?;
    }
    Ok(timer)
}

/// Configure ADC1 for both sensors and start the 1 kHz sampling interrupt.
pub fn start_sensor_timer() -> Result<(), EspError> {
    let unit_cfg = sys::adc_oneshot_unit_init_cfg_t {
        unit_id: sys::adc_unit_t_ADC_UNIT_1,
        ulp_mode: sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    let chan_cfg = sys::adc_oneshot_chan_cfg_t {
        atten: sys::adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: sys::adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    let mut adc: sys::adc_oneshot_unit_handle_t = ptr::null_mut();

    // SAFETY: plain IDF driver calls with valid config pointers.
    unsafe {
        esp!(sys::adc_oneshot_new_unit(&unit_cfg, &mut adc))?;
        esp!(sys::adc_oneshot_config_channel(adc, MAP_ADC_CHANNEL, &chan_cfg))?;
        esp!(sys::adc_oneshot_config_channel(adc, TPS_ADC_CHANNEL, &chan_cfg))?;
    }
    ADC_HANDLE.store(adc, Ordering::Release);

    let timer = new_periodic_timer(SENSOR_ALARM_TICKS, Some(on_sensor_alarm))?;
    // SAFETY: timer was enabled by `new_periodic_timer`.
    unsafe { esp!(sys::gptimer_start(timer)) }
}

/// DAC channel 0 plus the per-sample timer.
///
/// The timer runs only while sampling is enabled; the interrupt reads the
/// tone state from [`ISR`](crate::isr::ISR).
pub struct EspToneOutput {
    timer: sys::gptimer_handle_t,
    dac: sys::dac_oneshot_handle_t,
    running: bool,
}

impl EspToneOutput {
    pub fn new() -> Result<Self, EspError> {
        let dac_cfg = sys::dac_oneshot_config_t {
            chan_id: sys::dac_channel_t_DAC_CHAN_0,
        };
        let mut dac: sys::dac_oneshot_handle_t = ptr::null_mut();

        // SAFETY: plain IDF driver calls with valid config pointers.
        unsafe {
            esp!(sys::dac_oneshot_new_channel(&dac_cfg, &mut dac))?;
            esp!(sys::dac_oneshot_output_voltage(dac, MIDSCALE))?;
        }
        DAC_HANDLE.store(dac, Ordering::Release);

        let timer = new_periodic_timer(TONE_ALARM_TICKS, Some(on_tone_alarm))?;
        Ok(Self { timer, dac, running: false })
    }
}

impl ToneOutput for EspToneOutput {
    fn enable_sampling(&mut self) -> Result<(), OutputError> {
        if self.running {
            return Ok(());
        }
        // SAFETY: timer is enabled and owned by self.
        unsafe { esp!(sys::gptimer_start(self.timer)) }.map_err(output_error)?;
        self.running = true;
        Ok(())
    }

    fn disable_sampling(&mut self) -> Result<(), OutputError> {
        if !self.running {
            return Ok(());
        }
        // SAFETY: timer is running and owned by self.
        unsafe { esp!(sys::gptimer_stop(self.timer)) }.map_err(output_error)?;
        self.running = false;
        Ok(())
    }

    fn write_direct(&mut self, sample: u8) -> Result<(), OutputError> {
        // SAFETY: handle owned by self; the tone timer is stopped.
        unsafe { esp!(sys::dac_oneshot_output_voltage(self.dac, sample)) }.map_err(output_error)
    }
}
