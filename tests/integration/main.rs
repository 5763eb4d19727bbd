//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one flow end to end
//! against the mock rig. All tests run on the host (x86_64) with no real
//! hardware required.

mod app_flow_tests;
mod backend_flow_tests;
mod mock_hw;
mod provisioning_flow_tests;
