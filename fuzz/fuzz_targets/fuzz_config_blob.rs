//! Fuzz target: stored configuration blob
//!
//! Writes arbitrary bytes where the config blob lives and loads it back.
//! Loading must never fail or panic, and whatever it returns must pass
//! validation (garbage falls back to defaults).
//!
//! cargo fuzz run fuzz_config_blob

#![no_main]

use aura::adapters::nvs::{NvsAdapter, validate_config};
use aura::app::ports::{ConfigPort, StoragePort};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut nvs) = NvsAdapter::new() else {
        return;
    };
    if nvs.write("aura", "config", data).is_err() {
        return;
    }
    let cfg = nvs.load().expect("load falls back to defaults");
    assert!(validate_config(&cfg).is_ok());
});
