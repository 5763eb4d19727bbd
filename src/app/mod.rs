//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the rules for the AURA controller: arbitration of
//! mode requests between buttons, remote commands and inference, window
//! hand-off to the backend, and the per-cycle ordering of it all. All
//! interaction with hardware happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
