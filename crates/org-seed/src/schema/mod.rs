//! Schema discovery: describes, child relationships, run-scoped caching.

mod inspector;
mod types;

pub use inspector::{SchemaInspector, CHILD_OBJECT_DENYLIST, CHILD_SUFFIX_DENYLIST};
pub use types::{ChildRelationship, DiscoveredGrandchild, FieldDescriptor, ObjectDescriptor};
