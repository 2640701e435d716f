//! Actions the scheduler performs for a rule.

pub mod cmd;

pub use cmd::{ToolOutput, run_tool};
