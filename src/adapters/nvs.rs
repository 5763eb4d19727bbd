//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the AURA
//! controller, and stores the saved WiFi network list.
//!
//! | namespace | key        | contents                                   |
//! |-----------|------------|--------------------------------------------|
//! | `aura`    | `config`   | version byte + postcard [`RuntimeConfig`]  |
//! | `auth`    | `networks` | postcard [`NetworkList`], replaced wholesale |
//!
//! - Config validation: all fields are range-checked before persistence.
//! - A blob with an unknown version byte or that fails to decode loads as
//!   [`RuntimeConfig::default`].
//! - Atomic writes: ESP-IDF NVS commits are atomic per nvs_commit().

use crate::adapters::wifi::NetworkList;
use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::RuntimeConfig;
use crate::sensors::window::CHANNELS;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "aura";
const CONFIG_KEY: &str = "config";
/// Bumped whenever `RuntimeConfig` changes shape.
const CONFIG_VERSION: u8 = 1;

const MAX_BLOB_SIZE: usize = 1024;
const CRED_NAMESPACE: &str = "auth";
const NETWORKS_KEY: &str = "networks";

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS
            // access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name (max 15 bytes).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    /// Saved WiFi networks. An absent or undecodable blob is an empty list,
    /// which leaves the session awaiting credentials.
    pub fn load_networks(&self) -> NetworkList {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match self.read(CRED_NAMESPACE, NETWORKS_KEY, &mut buf) {
            Ok(len) => postcard::from_bytes(&buf[..len]).unwrap_or_else(|_| {
                warn!("NvsAdapter: network list corrupted, ignoring");
                NetworkList::new()
            }),
            Err(_) => NetworkList::new(),
        }
    }

    /// Replace the saved network list.
    pub fn save_networks(&mut self, networks: &NetworkList) -> Result<(), StorageError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let bytes = postcard::to_slice(networks, &mut buf).map_err(|_| StorageError::Full)?;
        self.write(CRED_NAMESPACE, NETWORKS_KEY, bytes)?;
        info!("NvsAdapter: {} network(s) saved", networks.len());
        Ok(())
    }

    /// Forget every saved network (factory reset).
    pub fn clear_networks(&mut self) -> Result<(), StorageError> {
        self.delete(CRED_NAMESPACE, NETWORKS_KEY)
    }
}

pub fn validate_config(cfg: &RuntimeConfig) -> Result<(), ConfigError> {
    if cfg.sample_period_ms == 0
        || cfg.button_poll_ms == 0
        || cfg.display_period_ms == 0
        || cfg.network_poll_ms == 0
    {
        return Err(ConfigError::ValidationFailed("periods must be non-zero"));
    }
    if cfg.button_poll_ms >= cfg.sample_period_ms {
        return Err(ConfigError::ValidationFailed(
            "button_poll_ms must be shorter than sample_period_ms",
        ));
    }
    if cfg.debounce_polls == 0 {
        return Err(ConfigError::ValidationFailed("debounce_polls must be at least 1"));
    }
    if cfg.backoff_base_ms == 0 || cfg.backoff_base_ms > cfg.backoff_max_ms {
        return Err(ConfigError::ValidationFailed(
            "backoff_base_ms must be 1..=backoff_max_ms",
        ));
    }
    if usize::from(cfg.alarm_channel) >= CHANNELS {
        return Err(ConfigError::ValidationFailed("alarm_channel must be 0-6"));
    }
    if !cfg.alarm_threshold.is_finite() {
        return Err(ConfigError::ValidationFailed("alarm_threshold must be finite"));
    }
    if cfg.alarm_clock_hour > 23 {
        return Err(ConfigError::ValidationFailed("alarm_clock_hour must be 0-23"));
    }
    if cfg.alarm_clock_minute > 59 {
        return Err(ConfigError::ValidationFailed("alarm_clock_minute must be 0-59"));
    }
    if cfg.backend_host.is_empty() || cfg.backend_port == 0 || cfg.command_port == 0 {
        return Err(ConfigError::ValidationFailed("backend address incomplete"));
    }
    Ok(())
}

fn decode_config(blob: &[u8]) -> Result<RuntimeConfig, ConfigError> {
    match blob.split_first() {
        Some((&CONFIG_VERSION, body)) => {
            postcard::from_bytes(body).map_err(|_| ConfigError::Corrupted)
        }
        _ => Err(ConfigError::Corrupted),
    }
}

fn encode_config(cfg: &RuntimeConfig) -> Result<Vec<u8>, ConfigError> {
    let mut blob = vec![CONFIG_VERSION];
    blob.extend(postcard::to_allocvec(cfg).map_err(|_| ConfigError::IoError)?);
    Ok(blob)
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let len = match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                return Ok(RuntimeConfig::default());
            }
            Err(e) => {
                warn!("NvsAdapter: config read failed ({}), using defaults", e);
                return Ok(RuntimeConfig::default());
            }
        };

        match decode_config(&buf[..len]).and_then(|cfg| validate_config(&cfg).map(|()| cfg)) {
            Ok(cfg) => {
                info!("NvsAdapter: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(e) => {
                warn!("NvsAdapter: stored config rejected ({}), using defaults", e);
                Ok(RuntimeConfig::default())
            }
        }
    }

    fn save(&self, config: &RuntimeConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let blob = encode_config(config)?;
        if blob.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::StorageFull);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, blob);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(CONFIG_KEY);
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        blob.as_ptr() as *const _,
                        blob.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", blob.len());
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(ConfigError::StorageFull),
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => Ok(()),
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StorageError::Full),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let ret = unsafe {
                    nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}
