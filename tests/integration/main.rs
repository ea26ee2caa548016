//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem through
//! `LinkService` against the mock board. All tests run on the host.

mod console_tests;
mod dynld_tests;
mod engine_tests;
mod layout_tests;
mod mock_hw;
