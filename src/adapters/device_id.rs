//! Device identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable device ID in the form `AURA-XXYYZZ` (last 3 bytes of
//! the 6-byte MAC in uppercase hex). It is stamped on every uploaded window
//! and shown on the status page. The same bytes seed the reconnect jitter
//! so that a room full of devices does not retry in lockstep.

/// Fixed-size device ID string: "AURA-XXYYZZ".
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    let _ = write!(id, "AURA-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// Non-zero seed for the backoff jitter generator.
pub fn jitter_seed(mac: &MacAddress) -> u32 {
    let seed = u32::from_le_bytes([mac[2], mac[3], mac[4], mac[5]]) ^ u32::from(mac[0]) << 24;
    if seed == 0 { 0x9E37_79B9 } else { seed }
}
