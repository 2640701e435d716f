//! CLI integration tests.
//!
//! A fake compiler and `pkg-config` written as POSIX shell scripts stand in
//! for the real tools, so these run on unix only.

#![cfg(unix)]

mod common;

mod build_tests;
mod failure_tests;
mod mode_tests;
