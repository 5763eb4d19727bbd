//! GPIO / peripheral pin assignments for the AURA controller board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// I²C bus (OLED + two BH1750 light sensors)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
/// I²C controller port.
pub const I2C_PORT: i32 = 0;
/// Bus clock. BH1750 and SSD1306 both accept fast mode.
pub const I2C_FREQ_HZ: u32 = 400_000;

/// BH1750 with ADDR pulled low (right-hand sensor, channel `lux1`).
pub const BH1750_ADDR_RIGHT: u8 = 0x23;
/// BH1750 with ADDR pulled high (left-hand sensor, channel `lux2`).
pub const BH1750_ADDR_LEFT: u8 = 0x5C;
/// SSD1306 128×32 panel.
pub const OLED_ADDR: u8 = 0x3C;

// ---------------------------------------------------------------------------
// Microphones (two INMP441 sharing one stereo I²S frame)
// ---------------------------------------------------------------------------

pub const I2S_SCK_GPIO: i32 = 14;
pub const I2S_WS_GPIO: i32 = 15;
/// Data line of the left microphone (channel `noise1`).
pub const I2S_SD_GPIO: i32 = 32;
pub const I2S_PORT: i32 = 0;
pub const I2S_SAMPLE_RATE_HZ: u32 = 16_000;

// ---------------------------------------------------------------------------
// Motion
// ---------------------------------------------------------------------------

/// PIR module output. HIGH = motion.
pub const PIR_GPIO: i32 = 23;

// ---------------------------------------------------------------------------
// Buttons (active-low with internal pull-up)
// ---------------------------------------------------------------------------

pub const BUTTON_UP_GPIO: i32 = 33;
pub const BUTTON_DOWN_GPIO: i32 = 27;
pub const BUTTON_SELECT_GPIO: i32 = 18;
pub const BUTTON_BACK_GPIO: i32 = 5;

/// In `ButtonId` order.
pub const BUTTON_GPIOS: [i32; 4] = [
    BUTTON_UP_GPIO,
    BUTTON_DOWN_GPIO,
    BUTTON_SELECT_GPIO,
    BUTTON_BACK_GPIO,
];

// ---------------------------------------------------------------------------
// Mode LED (discrete RGB, common cathode)
// ---------------------------------------------------------------------------

pub const LED_R_GPIO: i32 = 26;
pub const LED_G_GPIO: i32 = 19;
pub const LED_B_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// Passive buzzer
// ---------------------------------------------------------------------------

pub const BUZZER_GPIO: i32 = 25;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC frequency for the RGB mode LED (1 kHz).
pub const LED_PWM_FREQ_HZ: u32 = 1_000;
/// Idle frequency for the buzzer timer; cues retune it per tone.
pub const BUZZER_BASE_FREQ_HZ: u32 = 1_000;

/// LEDC channel allocation.
pub const LEDC_CH_LED_R: u32 = 0;
pub const LEDC_CH_LED_G: u32 = 1;
pub const LEDC_CH_LED_B: u32 = 2;
pub const LEDC_CH_BUZZER: u32 = 3;
