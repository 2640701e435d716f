//! Declarative targets and the rules derived from them.
//!
//! A [`Target`] names one build product (an executable or static library) with
//! its sources and flags. Targets are collected in an explicit, owned
//! [`RuleSet`]; at the start of every build invocation the set is expanded into
//! [`Rule`]s: one compile rule per source and one link (or archive) rule per
//! target.

pub mod layout;
pub mod rule;
pub mod toolchain;
pub mod types;

pub use layout::Layout;
pub use rule::{PackageFlags, Rule, RuleKind};
pub use toolchain::Toolchain;
pub use types::{RuleSet, Target, TargetBuilder, TargetError, TargetKind};
