//! Reference-field classification.
//!
//! Every writable reference field lands in one bucket that tells the preparer
//! what to do with its values: strip, defer to the post-insert pass, remap
//! through the registry, or pull the referenced records in as a shallow
//! dependency first.

use std::collections::BTreeMap;

use crate::registry::IdentityRegistry;
use crate::schema::ObjectDescriptor;

/// Object types whose record ids are org-local and cannot be migrated.
/// References to these are stripped.
pub const SYSTEM_LOOKUP_OBJECTS: &[&str] = &[
    // platform identity
    "User",
    "Group",
    "Profile",
    "Role",
    "UserRole",
    "PermissionSet",
    "PermissionSetGroup",
    "ConnectedApplication",
    "Organization",
    // metadata / config
    "RecordType",
    "BusinessProcess",
    "ApexClass",
    "ApexTrigger",
    "CustomPermission",
    "EmailTemplate",
    "Folder",
    "ListView",
    "Layout",
    // entitlements
    "BusinessHours",
    "Entitlement",
    "EntitlementTemplate",
    "Milestone",
    "MilestoneType",
    "SlaProcess",
    // territory & currency
    "Territory",
    "Territory2",
    "Territory2Model",
    "CurrencyType",
    "DatedConversionRate",
    // miscellaneous platform objects
    "Division",
    "QueueSobject",
    "Calendar",
    "CollaborationGroup",
    "Network",
    "Site",
    "Community",
    "BrandTemplate",
    "DandBCompany",
    "PartnerRole",
    "DuplicateRecordSet",
    "DuplicateRecordItem",
    "DuplicateRule",
    "MatchingRule",
    "Period",
    "FiscalYearSettings",
];

/// The classifier's decision for one reference field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceBucket {
    /// Target is a platform/config object; strip the value.
    System,

    /// Target type includes the object itself; resolve after insert.
    SelfRef,

    /// Target has (or will have) registry entries; remap through it.
    InScope,

    /// Single non-system target not otherwise in scope; pull it in as a
    /// shallow dependency before writing this object.
    DataDependency(String),
}

fn is_system_object(name: &str) -> bool {
    SYSTEM_LOOKUP_OBJECTS.contains(&name)
}

/// Classify the writable reference fields of the root object.
pub fn classify_root_references(
    descriptor: &ObjectDescriptor,
    root_object: &str,
) -> BTreeMap<String, ReferenceBucket> {
    let mut buckets = BTreeMap::new();

    for field in descriptor.writable_fields().filter(|f| f.is_reference()) {
        let targets = &field.reference_to;
        if targets.is_empty() {
            continue;
        }

        let bucket = if targets.len() == 1 && targets[0] == root_object {
            ReferenceBucket::SelfRef
        } else if targets.iter().all(|t| is_system_object(t)) {
            ReferenceBucket::System
        } else if targets.iter().any(|t| t == root_object) {
            // Polymorphic including self: the self-reference pass can still
            // resolve it once the batch is written.
            ReferenceBucket::SelfRef
        } else {
            let non_system: Vec<&String> =
                targets.iter().filter(|t| !is_system_object(t)).collect();
            match non_system.as_slice() {
                [single] => ReferenceBucket::DataDependency((*single).clone()),
                // Polymorphic across multiple non-system targets: stripping is
                // safer than guessing which tier to pull in.
                _ => ReferenceBucket::System,
            }
        };
        buckets.insert(field.name.clone(), bucket);
    }

    buckets
}

/// Classify the writable reference fields of a non-root tier. A field is in
/// scope if any of its possible targets already has registry entries;
/// everything else is stripped.
pub fn classify_tier_references(
    descriptor: &ObjectDescriptor,
    registry: &IdentityRegistry,
) -> BTreeMap<String, ReferenceBucket> {
    let mut buckets = BTreeMap::new();

    for field in descriptor.writable_fields().filter(|f| f.is_reference()) {
        let in_scope = field.reference_to.iter().any(|t| registry.has_entries(t));
        let bucket = if in_scope {
            ReferenceBucket::InScope
        } else {
            ReferenceBucket::System
        };
        buckets.insert(field.name.clone(), bucket);
    }

    buckets
}
