//! Record preparation: projecting writable fields and rewriting references.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::classify::ReferenceBucket;
use crate::connection::{record_id, Record};
use crate::registry::IdentityRegistry;
use crate::results::SeedErrorEntry;
use crate::schema::ObjectDescriptor;

/// Fields the platform maintains and never accepts on create.
pub const SYSTEM_READONLY_FIELDS: &[&str] = &[
    "Id",
    "IsDeleted",
    "CreatedDate",
    "CreatedById",
    "LastModifiedDate",
    "LastModifiedById",
    "SystemModstamp",
    "LastActivityDate",
    "LastViewedDate",
    "LastReferencedDate",
];

/// Additional read-only fields on Task and Event records.
pub const ACTIVITY_SYSTEM_FIELDS: &[&str] = &[
    "IsClosed",
    "IsArchived",
    "IsRecurrence",
    "IsHighPriority",
    "TaskSubtype",
    "EventSubtype",
    "IsGroupEvent",
    "GroupEventType",
    "IsChild",
    "IsAllDayEvent",
    "IsReminderSet",
    "RecurrenceActivityId",
];

/// The insertable field set for a tier: source-writable fields minus system
/// read-only fields, caller exclusions, and compound address/location fields,
/// intersected with the target's writable fields.
pub fn insertable_fields(
    source: &ObjectDescriptor,
    target: &ObjectDescriptor,
    exclusions: &[&str],
) -> Vec<String> {
    source
        .writable_fields()
        .filter(|f| !SYSTEM_READONLY_FIELDS.contains(&f.name.as_str()))
        .filter(|f| !exclusions.contains(&f.name.as_str()))
        .filter(|f| !f.is_compound())
        .filter(|f| target.is_writable(&f.name))
        .map(|f| f.name.clone())
        .collect()
}

/// Outcome of preparing one record.
#[derive(Debug)]
pub enum Prepared {
    /// Target-shaped record, ready to write.
    Ready(Record),

    /// A required reference could not be resolved; the record must not be
    /// written.
    Skipped,
}

/// Produce a target-shaped record from a source record.
///
/// Projects the insertable fields and rewrites each reference per its bucket:
/// system references are dropped, self references deferred to the post-insert
/// pass, and in-scope or dependency references remapped through the registry.
/// A required reference that cannot be resolved logs a `remap` error and
/// skips the record.
pub fn prepare_record(
    object: &str,
    source_record: &Record,
    insertable: &[String],
    buckets: &BTreeMap<String, ReferenceBucket>,
    descriptor: &ObjectDescriptor,
    registry: &IdentityRegistry,
    errors: &mut Vec<SeedErrorEntry>,
) -> Prepared {
    let mut prepared = Record::new();

    for field in insertable {
        let Some(value) = source_record.get(field) else {
            continue;
        };

        match buckets.get(field) {
            Some(ReferenceBucket::System) if !value.is_null() => continue,
            Some(ReferenceBucket::SelfRef) => continue,
            Some(ReferenceBucket::InScope) | Some(ReferenceBucket::DataDependency(_)) => {
                if value.is_null() {
                    prepared.insert(field.clone(), Value::Null);
                    continue;
                }
                let source_ref = value.as_str().unwrap_or_default();
                match registry.resolve_any(source_ref) {
                    Some(target_ref) => {
                        prepared.insert(field.clone(), Value::String(target_ref.to_string()));
                    }
                    None => {
                        let nillable = descriptor
                            .field(field)
                            .map(|f| f.nillable)
                            .unwrap_or(true);
                        if nillable {
                            prepared.insert(field.clone(), Value::Null);
                        } else {
                            errors.push(SeedErrorEntry::new(
                                object,
                                record_id(source_record).map(str::to_string),
                                "remap",
                                format!(
                                    "required reference {} = {} has no mapping",
                                    field, source_ref
                                ),
                            ));
                            return Prepared::Skipped;
                        }
                    }
                }
            }
            _ => {
                prepared.insert(field.clone(), value.clone());
            }
        }
    }

    Prepared::Ready(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use serde_json::json;

    fn field(name: &str, field_type: &str, createable: bool) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            field_type: field_type.to_string(),
            createable,
            nillable: true,
            external_id: false,
            reference_to: Vec::new(),
        }
    }

    fn descriptor(name: &str, fields: Vec<FieldDescriptor>) -> ObjectDescriptor {
        ObjectDescriptor {
            name: name.to_string(),
            fields,
            child_relationships: Vec::new(),
        }
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insertable_set_filters() {
        let source = descriptor(
            "Account",
            vec![
                field("Id", "id", true),
                field("Name", "string", true),
                field("CreatedDate", "datetime", true),
                field("BillingAddress", "address", true),
                field("ReadOnly__c", "string", false),
                field("SourceOnly__c", "string", true),
                field("Shared__c", "string", true),
            ],
        );
        let target = descriptor(
            "Account",
            vec![
                field("Name", "string", true),
                field("Shared__c", "string", true),
            ],
        );

        let fields = insertable_fields(&source, &target, &[]);
        assert_eq!(fields, vec!["Name".to_string(), "Shared__c".to_string()]);
    }

    #[test]
    fn test_insertable_set_applies_exclusions() {
        let source = descriptor(
            "Task",
            vec![field("Subject", "string", true), field("IsClosed", "boolean", true)],
        );
        let target = source.clone();
        let fields = insertable_fields(&source, &target, ACTIVITY_SYSTEM_FIELDS);
        assert_eq!(fields, vec!["Subject".to_string()]);
    }

    #[test]
    fn test_plain_fields_copied_missing_omitted() {
        let desc = descriptor("Account", vec![field("Name", "string", true)]);
        let registry = IdentityRegistry::new();
        let mut errors = Vec::new();
        let rec = record(&[("Id", json!("001A")), ("Name", json!("Acme"))]);

        let insertable = vec!["Name".to_string(), "Phone".to_string()];
        let out = prepare_record(
            "Account",
            &rec,
            &insertable,
            &BTreeMap::new(),
            &desc,
            &registry,
            &mut errors,
        );
        match out {
            Prepared::Ready(r) => {
                assert_eq!(r.get("Name"), Some(&json!("Acme")));
                assert!(!r.contains_key("Phone"));
                assert!(!r.contains_key("Id"));
            }
            Prepared::Skipped => panic!("expected ready"),
        }
        assert!(errors.is_empty());
    }

    #[test]
    fn test_system_reference_stripped_self_reference_deferred() {
        let desc = descriptor("Account", vec![]);
        let registry = IdentityRegistry::new();
        let mut errors = Vec::new();
        let rec = record(&[
            ("OwnerId", json!("005A")),
            ("ParentId", json!("001B")),
        ]);

        let mut buckets = BTreeMap::new();
        buckets.insert("OwnerId".to_string(), ReferenceBucket::System);
        buckets.insert("ParentId".to_string(), ReferenceBucket::SelfRef);

        let insertable = vec!["OwnerId".to_string(), "ParentId".to_string()];
        let Prepared::Ready(r) = prepare_record(
            "Account", &rec, &insertable, &buckets, &desc, &registry, &mut errors,
        ) else {
            panic!("expected ready");
        };
        assert!(r.is_empty());
    }

    #[test]
    fn test_in_scope_reference_remapped() {
        let desc = descriptor("Contact", vec![]);
        let mut registry = IdentityRegistry::new();
        registry.register("Account", "001A", "001X");
        let mut errors = Vec::new();
        let rec = record(&[("AccountId", json!("001A"))]);

        let mut buckets = BTreeMap::new();
        buckets.insert("AccountId".to_string(), ReferenceBucket::InScope);

        let insertable = vec!["AccountId".to_string()];
        let Prepared::Ready(r) = prepare_record(
            "Contact", &rec, &insertable, &buckets, &desc, &registry, &mut errors,
        ) else {
            panic!("expected ready");
        };
        assert_eq!(r.get("AccountId"), Some(&json!("001X")));
    }

    #[test]
    fn test_null_reference_copied_as_null() {
        let desc = descriptor("Contact", vec![]);
        let registry = IdentityRegistry::new();
        let mut errors = Vec::new();
        let rec = record(&[("AccountId", Value::Null)]);

        let mut buckets = BTreeMap::new();
        buckets.insert("AccountId".to_string(), ReferenceBucket::InScope);

        let insertable = vec!["AccountId".to_string()];
        let Prepared::Ready(r) = prepare_record(
            "Contact", &rec, &insertable, &buckets, &desc, &registry, &mut errors,
        ) else {
            panic!("expected ready");
        };
        assert_eq!(r.get("AccountId"), Some(&Value::Null));
    }

    #[test]
    fn test_unresolved_nullable_reference_nulled() {
        let mut f = field("AccountId", "reference", true);
        f.nillable = true;
        let desc = descriptor("Contact", vec![f]);
        let registry = IdentityRegistry::new();
        let mut errors = Vec::new();
        let rec = record(&[("AccountId", json!("001Z"))]);

        let mut buckets = BTreeMap::new();
        buckets.insert("AccountId".to_string(), ReferenceBucket::InScope);

        let insertable = vec!["AccountId".to_string()];
        let Prepared::Ready(r) = prepare_record(
            "Contact", &rec, &insertable, &buckets, &desc, &registry, &mut errors,
        ) else {
            panic!("expected ready");
        };
        assert_eq!(r.get("AccountId"), Some(&Value::Null));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_unresolved_required_reference_skips_record() {
        let mut f = field("AccountId", "reference", true);
        f.nillable = false;
        let desc = descriptor("Contact", vec![f]);
        let registry = IdentityRegistry::new();
        let mut errors = Vec::new();
        let rec = record(&[("Id", json!("003C")), ("AccountId", json!("001Z"))]);

        let mut buckets = BTreeMap::new();
        buckets.insert("AccountId".to_string(), ReferenceBucket::InScope);

        let insertable = vec!["AccountId".to_string()];
        let out = prepare_record(
            "Contact", &rec, &insertable, &buckets, &desc, &registry, &mut errors,
        );
        assert!(matches!(out, Prepared::Skipped));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, "remap");
        assert_eq!(errors[0].source_id.as_deref(), Some("003C"));
    }
}
