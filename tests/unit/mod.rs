//! Unit test modules.

mod config_test;
mod decoder_test;
mod display_test;
