//! Fixed catalog of tags a task can be labeled with. The catalog is built once at startup and
//! handed to whoever needs it, there is no global lookup.

pub mod registry;

pub use registry::{Tag, TagRegistry};
