//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                    | Connects to                |
//! |-------------|-------------------------------|----------------------------|
//! | `hardware`  | SensorPort, InputPort,        | BH1750, I2S mics, PIR,     |
//! |             | IndicatorPort                 | buttons, RGB LED, buzzer   |
//! | `log_sink`  | EventSink                     | Serial log output          |
//! | `nvs`       | ConfigPort, StoragePort       | NVS / in-memory store      |
//! | `time`      |                               | ESP32 system timer, SNTP   |
//! | `wifi`      | SessionPort                   | ESP-IDF WiFi STA + TCP     |
//! | `device_id` |                               | eFuse MAC                  |

pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod wifi;
