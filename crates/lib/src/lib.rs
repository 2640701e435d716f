//! bake-lib: a local, incremental build engine.
//!
//! This crate provides:
//! - `target`: declarative targets and the rules derived from them
//! - `flags`: compiler/linker flag resolution through `pkg-config`
//! - `execute`: the rule graph, staleness detection and the parallel scheduler
//! - `driver`: one build invocation from options to report
//! - `manifest`: Bakefile loading

pub mod consts;
pub mod driver;
pub mod execute;
pub mod flags;
pub mod manifest;
pub mod target;
pub mod util;
