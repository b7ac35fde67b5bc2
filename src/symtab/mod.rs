//! Symbol tables: globals, locals, and the typedef/tag registry.

pub mod globals;
pub mod locals;
pub mod typenames;

pub use globals::{Global, GlobalTable};
pub use locals::{slot_size, LocalStack};
pub use typenames::{TagKind, TypeNameEntry, TypeNameRegistry};
