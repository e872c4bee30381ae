//! Script bookkeeping: naming and registration state.

pub mod registry;
pub mod resolver;

pub use registry::{ScriptEntry, ScriptLoadState, ScriptRegistry};
pub use resolver::NameResolver;
