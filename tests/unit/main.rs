//! Unit test suite entry point.

mod config_tests;
mod fusion_tests;
mod weights_tests;
