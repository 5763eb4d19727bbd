//! One-shot hardware peripheral initialization and raw bus helpers.
//!
//! Configures GPIO directions, the I²C master, the I²S receive channel and
//! the LEDC timers/channels using raw ESP-IDF sys calls. Called once from
//! `main()` before the event loop starts.
//!
//! Every bus helper takes a zero or short tick timeout so that no sensor
//! read can stall a tick.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    I2cInitFailed(i32),
    I2sInitFailed(i32),
    LedcInitFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::I2cInitFailed(rc) => write!(f, "I2C master init failed (rc={})", rc),
            Self::I2sInitFailed(rc) => write!(f, "I2S channel init failed (rc={})", rc),
            Self::LedcInitFailed(rc) => write!(f, "LEDC timer/channel config failed (rc={})", rc),
        }
    }
}

/// Bus-level failure, carrying the ESP-IDF error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusError(pub i32);

#[cfg(target_os = "espidf")]
fn check(ret: esp_err_t, err: fn(i32) -> HwInitError) -> Result<(), HwInitError> {
    if ret == ESP_OK { Ok(()) } else { Err(err(ret)) }
}

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the event loop; single-threaded.
    unsafe {
        init_gpio_inputs()?;
        init_i2c()?;
        init_i2s()?;
        init_ledc()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    // Buttons: active-low, internal pull-up.
    let mut button_mask = 0u64;
    for &pin in &pins::BUTTON_GPIOS {
        button_mask |= 1u64 << pin;
    }
    let btn_cfg = gpio_config_t {
        pin_bit_mask: button_mask,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    check(unsafe { gpio_config(&btn_cfg) }, HwInitError::GpioConfigFailed)?;

    // PIR: push-pull output on the module, no pull needed.
    let pir_cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::PIR_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    check(unsafe { gpio_config(&pir_cfg) }, HwInitError::GpioConfigFailed)?;

    info!("hw_init: GPIO inputs configured (4 buttons, PIR)");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin; safe to call from main context.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    true
}

// ── I²C master ────────────────────────────────────────────────

/// Ticks a single I²C transaction may wait for the bus.
#[cfg(target_os = "espidf")]
const I2C_TIMEOUT_TICKS: TickType_t = 2;

#[cfg(target_os = "espidf")]
unsafe fn init_i2c() -> Result<(), HwInitError> {
    let mut cfg = i2c_config_t {
        mode: i2c_mode_t_I2C_MODE_MASTER,
        sda_io_num: pins::I2C_SDA_GPIO,
        scl_io_num: pins::I2C_SCL_GPIO,
        sda_pullup_en: true,
        scl_pullup_en: true,
        ..Default::default()
    };
    cfg.__bindgen_anon_1.master.clk_speed = pins::I2C_FREQ_HZ;
    check(
        unsafe { i2c_param_config(pins::I2C_PORT, &cfg) },
        HwInitError::I2cInitFailed,
    )?;
    check(
        unsafe { i2c_driver_install(pins::I2C_PORT, i2c_mode_t_I2C_MODE_MASTER, 0, 0, 0) },
        HwInitError::I2cInitFailed,
    )?;
    info!("hw_init: I2C{} master at {} Hz", pins::I2C_PORT, pins::I2C_FREQ_HZ);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn i2c_write(addr: u8, data: &[u8]) -> Result<(), BusError> {
    // SAFETY: the driver was installed in init_i2c(); the slice outlives
    // the call and only the main loop touches the bus.
    let ret = unsafe {
        i2c_master_write_to_device(pins::I2C_PORT, addr, data.as_ptr(), data.len(), I2C_TIMEOUT_TICKS)
    };
    if ret == ESP_OK { Ok(()) } else { Err(BusError(ret)) }
}

#[cfg(target_os = "espidf")]
pub fn i2c_read(addr: u8, buf: &mut [u8]) -> Result<(), BusError> {
    // SAFETY: as for i2c_write.
    let ret = unsafe {
        i2c_master_read_from_device(pins::I2C_PORT, addr, buf.as_mut_ptr(), buf.len(), I2C_TIMEOUT_TICKS)
    };
    if ret == ESP_OK { Ok(()) } else { Err(BusError(ret)) }
}

#[cfg(not(target_os = "espidf"))]
pub fn i2c_write(_addr: u8, _data: &[u8]) -> Result<(), BusError> {
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn i2c_read(_addr: u8, buf: &mut [u8]) -> Result<(), BusError> {
    buf.fill(0);
    Ok(())
}

// ── I²S receive channel (stereo microphones) ──────────────────

#[cfg(target_os = "espidf")]
static mut I2S_RX: i2s_chan_handle_t = core::ptr::null_mut();

#[cfg(target_os = "espidf")]
unsafe fn init_i2s() -> Result<(), HwInitError> {
    let chan_cfg = i2s_chan_config_t {
        id: pins::I2S_PORT as i2s_port_t,
        role: i2s_role_t_I2S_ROLE_MASTER,
        dma_desc_num: 4,
        dma_frame_num: 256,
        ..Default::default()
    };
    // SAFETY: I2S_RX is only written here, once at boot.
    check(
        unsafe { i2s_new_channel(&chan_cfg, core::ptr::null_mut(), &raw mut I2S_RX) },
        HwInitError::I2sInitFailed,
    )?;

    let mut std_cfg = i2s_std_config_t::default();
    std_cfg.clk_cfg.sample_rate_hz = pins::I2S_SAMPLE_RATE_HZ;
    std_cfg.clk_cfg.clk_src = soc_periph_i2s_clk_src_t_I2S_CLK_SRC_DEFAULT;
    std_cfg.clk_cfg.mclk_multiple = i2s_mclk_multiple_t_I2S_MCLK_MULTIPLE_256;
    std_cfg.slot_cfg.data_bit_width = i2s_data_bit_width_t_I2S_DATA_BIT_WIDTH_32BIT;
    std_cfg.slot_cfg.slot_bit_width = i2s_slot_bit_width_t_I2S_SLOT_BIT_WIDTH_AUTO;
    std_cfg.slot_cfg.slot_mode = i2s_slot_mode_t_I2S_SLOT_MODE_STEREO;
    std_cfg.slot_cfg.slot_mask = i2s_std_slot_mask_t_I2S_STD_SLOT_BOTH;
    std_cfg.slot_cfg.ws_width = 32;
    std_cfg.slot_cfg.bit_shift = true;
    std_cfg.gpio_cfg.mclk = gpio_num_t_GPIO_NUM_NC;
    std_cfg.gpio_cfg.bclk = pins::I2S_SCK_GPIO;
    std_cfg.gpio_cfg.ws = pins::I2S_WS_GPIO;
    std_cfg.gpio_cfg.dout = gpio_num_t_GPIO_NUM_NC;
    std_cfg.gpio_cfg.din = pins::I2S_SD_GPIO;

    // SAFETY: the handle was created above.
    unsafe {
        check(i2s_channel_init_std_mode(I2S_RX, &std_cfg), HwInitError::I2sInitFailed)?;
        check(i2s_channel_enable(I2S_RX), HwInitError::I2sInitFailed)?;
    }
    info!("hw_init: I2S{} RX stereo at {} Hz", pins::I2S_PORT, pins::I2S_SAMPLE_RATE_HZ);
    Ok(())
}

/// Read whatever the DMA buffers hold, without waiting. Returns the byte
/// count copied into `buf`; 0 when nothing is ready or the read failed.
#[cfg(target_os = "espidf")]
pub fn i2s_read(buf: &mut [u8]) -> usize {
    let mut read = 0usize;
    // SAFETY: I2S_RX is written once during init_i2s() before this function
    // is called; single-threaded main-loop access guaranteed.
    let ret = unsafe {
        i2s_channel_read(I2S_RX, buf.as_mut_ptr().cast(), buf.len(), &mut read, 0)
    };
    if ret == ESP_OK || ret == ESP_ERR_TIMEOUT { read } else { 0 }
}

// ── LEDC PWM ─────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() -> Result<(), HwInitError> {
    // Timer 0: mode LED (1 kHz, 8-bit)
    let timer0 = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::LED_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    check(unsafe { ledc_timer_config(&timer0) }, HwInitError::LedcInitFailed)?;

    // Timer 1: buzzer, retuned per tone
    let timer1 = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_1,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::BUZZER_BASE_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    check(unsafe { ledc_timer_config(&timer1) }, HwInitError::LedcInitFailed)?;

    let channels = [
        (pins::LEDC_CH_LED_R, pins::LED_R_GPIO, ledc_timer_t_LEDC_TIMER_0),
        (pins::LEDC_CH_LED_G, pins::LED_G_GPIO, ledc_timer_t_LEDC_TIMER_0),
        (pins::LEDC_CH_LED_B, pins::LED_B_GPIO, ledc_timer_t_LEDC_TIMER_0),
        (pins::LEDC_CH_BUZZER, pins::BUZZER_GPIO, ledc_timer_t_LEDC_TIMER_1),
    ];
    for (channel, gpio, timer) in channels {
        let ret = unsafe {
            ledc_channel_config(&ledc_channel_config_t {
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel,
                timer_sel: timer,
                gpio_num: gpio,
                duty: 0,
                hpoint: 0,
                ..Default::default()
            })
        };
        check(ret, HwInitError::LedcInitFailed)?;
    }

    info!("hw_init: LEDC configured (led=CH0-2, buzzer=CH3)");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    // SAFETY: LEDC channels were configured in init_ledc(); duty register
    // writes are race-free since only the main loop calls this function.
    unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, u32::from(duty));
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u8) {}

/// Retune the buzzer timer.
#[cfg(target_os = "espidf")]
pub fn buzzer_freq(freq_hz: u32) {
    // SAFETY: timer 1 was configured in init_ledc(); main loop only.
    unsafe {
        ledc_set_freq(ledc_mode_t_LEDC_LOW_SPEED_MODE, ledc_timer_t_LEDC_TIMER_1, freq_hz);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn buzzer_freq(_freq_hz: u32) {}
