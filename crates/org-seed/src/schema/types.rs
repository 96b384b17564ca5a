//! Schema metadata types, shaped after the platform's describe responses.

use serde::{Deserialize, Serialize};

/// An object type's schema: fields plus child relationships.
///
/// Fetched on demand from source and target and cached for the run by the
/// [`SchemaInspector`](super::SchemaInspector).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    /// API name.
    pub name: String,

    /// Every field on the object.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,

    /// Child relationships (objects holding a lookup to this one).
    #[serde(default)]
    pub child_relationships: Vec<ChildRelationship>,
}

impl ObjectDescriptor {
    /// Look up a field by API name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that can be written on create.
    pub fn writable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.createable)
    }

    /// Whether a field exists and is writable.
    pub fn is_writable(&self, name: &str) -> bool {
        self.field(name).map(|f| f.createable).unwrap_or(false)
    }
}

/// One field's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// API name.
    pub name: String,

    /// Semantic type string: `string`, `reference`, `address`, `location`,
    /// `picklist`, `double`, ...
    #[serde(rename = "type")]
    pub field_type: String,

    /// Whether the field can be set on create.
    #[serde(default)]
    pub createable: bool,

    /// Whether null is an acceptable value.
    #[serde(default)]
    pub nillable: bool,

    /// Whether the field is marked as a unique external id.
    #[serde(default)]
    pub external_id: bool,

    /// For reference fields, the ordered list of possible target object types.
    /// More than one entry means the reference is polymorphic.
    #[serde(default)]
    pub reference_to: Vec<String>,
}

impl FieldDescriptor {
    /// Whether this is a reference (lookup) field.
    pub fn is_reference(&self) -> bool {
        self.field_type == "reference"
    }

    /// Whether this reference can point at more than one object type.
    pub fn is_polymorphic(&self) -> bool {
        self.reference_to.len() > 1
    }

    /// Compound field types that cannot be written directly; their component
    /// fields are written instead.
    pub fn is_compound(&self) -> bool {
        matches!(self.field_type.as_str(), "address" | "location")
    }
}

/// A child relationship: the child object and its lookup field back to the
/// parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRelationship {
    /// Child object's API name.
    #[serde(default)]
    pub child_s_object: String,

    /// The field on the child that references the parent. Some platform
    /// relationships carry no field; those are skipped during discovery.
    #[serde(default)]
    pub field: Option<String>,

    /// Whether deleting the parent cascades to this child.
    #[serde(default)]
    pub cascade_delete: bool,
}

/// A discovered grandchild relationship, tagged with the child tier object it
/// hangs off.
#[derive(Debug, Clone)]
pub struct DiscoveredGrandchild {
    /// The child-tier object this grandchild is parented by.
    pub parent_object: String,

    /// The grandchild relationship itself.
    pub relationship: ChildRelationship,
}
