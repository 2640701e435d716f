//! End-to-end engine scenarios against a fake compiler.
//!
//! The compiler is a small POSIX shell script, so these run on unix only.

#![cfg(unix)]


mod build_tests;
mod structure_tests;
