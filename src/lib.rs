//! AURA firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod fsm;
pub mod pins;
pub mod rpc;
pub mod scheduler;

// Hardware-facing modules; the ESP-IDF implementations are guarded by cfg
// attributes inside, with simulation stand-ins for the host.
pub mod adapters;
pub mod drivers;
pub mod sensors;
