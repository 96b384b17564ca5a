//! Batched writes into the target org.
//!
//! All operations process records in fixed batches of [`BATCH_SIZE`], the
//! platform's bulk limit. Successful writes register identity mappings;
//! per-record failures are logged and counted, and the batch continues.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::{debug, info};

use crate::connection::{Connection, Record, SaveError};
use crate::error::Result;
use crate::registry::IdentityRegistry;
use crate::results::SeedErrorEntry;
use crate::soql::{in_list, query_all_chunked};

/// Records per bulk write. Matches the platform's batch size limit.
pub const BATCH_SIZE: usize = 200;

/// Counters from one write operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Join a bulk response's per-record errors into one message.
pub fn format_save_errors(errors: &[SaveError]) -> String {
    if errors.is_empty() {
        return "Unknown error".to_string();
    }
    errors
        .iter()
        .map(|e| {
            let code = e.status_code.as_deref().unwrap_or("UNKNOWN");
            if e.fields.is_empty() {
                format!("{}: {}", code, e.message)
            } else {
                format!("{}: {} [{}]", code, e.message, e.fields.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bulk-insert prepared records, registering each new identity mapping.
///
/// `source_ids[j]` is the source id of `records[j]`. In dry-run mode nothing
/// touches the network and the registry is left untouched.
pub async fn batch_insert(
    conn: &dyn Connection,
    object: &str,
    records: &[Record],
    source_ids: &[String],
    registry: &mut IdentityRegistry,
    errors: &mut Vec<SeedErrorEntry>,
    dry_run: bool,
) -> Result<WriteOutcome> {
    let mut outcome = WriteOutcome::default();

    if dry_run {
        info!("[dry-run] would insert {} {} record(s)", records.len(), object);
        outcome.inserted = records.len();
        return Ok(outcome);
    }

    for (batch, ids) in records.chunks(BATCH_SIZE).zip(source_ids.chunks(BATCH_SIZE)) {
        let results = conn.create(object, batch.to_vec()).await?;
        for (j, result) in results.iter().enumerate() {
            match (&result.id, result.success) {
                (Some(id), true) => {
                    registry.register(object, ids[j].clone(), id.clone());
                    outcome.inserted += 1;
                }
                _ => {
                    outcome.failed += 1;
                    errors.push(SeedErrorEntry::new(
                        object,
                        Some(ids[j].clone()),
                        "insert",
                        format_save_errors(&result.errors),
                    ));
                }
            }
        }
    }

    debug!(
        "{}: inserted {}, failed {}",
        object, outcome.inserted, outcome.failed
    );
    Ok(outcome)
}

/// Bulk-update records for the post-insert self-reference pass. Records carry
/// the target `Id` plus the resolved self-reference fields. Returns the
/// number of failed updates.
pub async fn batch_update(
    conn: &dyn Connection,
    object: &str,
    records: &[Record],
    source_ids: &[String],
    errors: &mut Vec<SeedErrorEntry>,
    dry_run: bool,
) -> Result<usize> {
    if dry_run {
        info!(
            "[dry-run] would update {} {} record(s) with self-references",
            records.len(),
            object
        );
        return Ok(0);
    }

    let mut failed = 0;
    for (batch, ids) in records.chunks(BATCH_SIZE).zip(source_ids.chunks(BATCH_SIZE)) {
        let results = conn.update(object, batch.to_vec()).await?;
        for (j, result) in results.iter().enumerate() {
            if !result.success {
                failed += 1;
                errors.push(SeedErrorEntry::new(
                    object,
                    Some(ids[j].clone()),
                    "self-ref update",
                    format_save_errors(&result.errors),
                ));
            }
        }
    }
    Ok(failed)
}

/// Bulk-upsert prepared records keyed by an external-id field.
///
/// Created records return an id and register directly. Updated records may
/// not, so after each batch the target is queried back by the batch's
/// distinct external-id values and mappings are recovered by matching values
/// to source ids. A missing, unmatched, or ambiguous external-id value yields
/// a per-record `upsert` error instead of a silent mis-mapping.
#[allow(clippy::too_many_arguments)]
pub async fn batch_upsert(
    conn: &dyn Connection,
    object: &str,
    records: &[Record],
    source_ids: &[String],
    external_id_field: &str,
    registry: &mut IdentityRegistry,
    errors: &mut Vec<SeedErrorEntry>,
    dry_run: bool,
) -> Result<WriteOutcome> {
    let mut outcome = WriteOutcome::default();

    if dry_run {
        info!(
            "[dry-run] would upsert {} {} record(s) on {}",
            records.len(),
            object,
            external_id_field
        );
        outcome.inserted = records.len();
        return Ok(outcome);
    }

    for (batch, ids) in records.chunks(BATCH_SIZE).zip(source_ids.chunks(BATCH_SIZE)) {
        let results = conn
            .upsert(object, external_id_field, batch.to_vec())
            .await?;

        for (j, result) in results.iter().enumerate() {
            if !result.success {
                outcome.failed += 1;
                errors.push(SeedErrorEntry::new(
                    object,
                    Some(ids[j].clone()),
                    "upsert",
                    format_save_errors(&result.errors),
                ));
                continue;
            }
            if result.created.unwrap_or(false) {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
            if let Some(id) = &result.id {
                registry.register(object, ids[j].clone(), id.clone());
            }
        }

        recover_updated_mappings(conn, object, batch, ids, external_id_field, registry, errors)
            .await?;
    }

    debug!(
        "{}: upserted {} created / {} updated / {} failed",
        object, outcome.inserted, outcome.updated, outcome.failed
    );
    Ok(outcome)
}

/// Recover registry mappings for batch records the upsert response returned
/// no id for, by querying the target on the external-id values.
async fn recover_updated_mappings(
    conn: &dyn Connection,
    object: &str,
    batch: &[Record],
    source_ids: &[String],
    external_id_field: &str,
    registry: &mut IdentityRegistry,
    errors: &mut Vec<SeedErrorEntry>,
) -> Result<()> {
    // (source id, external-id value) pairs still missing a mapping.
    let mut pending: Vec<(&String, Option<String>)> = Vec::new();
    for (j, record) in batch.iter().enumerate() {
        if registry.resolve(object, &source_ids[j]).is_some() {
            continue;
        }
        let value = record
            .get(external_id_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        pending.push((&source_ids[j], value));
    }
    if pending.is_empty() {
        return Ok(());
    }

    let values: Vec<String> = pending
        .iter()
        .filter_map(|(_, v)| v.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let mut by_value: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if !values.is_empty() {
        let rows = query_all_chunked(conn, &values, |chunk| {
            format!(
                "SELECT Id, {} FROM {} WHERE {} IN ({})",
                external_id_field,
                object,
                external_id_field,
                in_list(chunk)
            )
        })
        .await?;
        for row in rows {
            let (Some(id), Some(value)) = (
                row.get("Id").and_then(Value::as_str),
                row.get(external_id_field).and_then(Value::as_str),
            ) else {
                continue;
            };
            by_value
                .entry(value.to_string())
                .or_default()
                .push(id.to_string());
        }
    }

    for (source_id, value) in pending {
        let Some(value) = value else {
            errors.push(SeedErrorEntry::new(
                object,
                Some(source_id.clone()),
                "upsert",
                format!("source record has no {} value to recover its mapping", external_id_field),
            ));
            continue;
        };
        match by_value.get(&value).map(Vec::as_slice) {
            Some([id]) => {
                registry.register(object, source_id.clone(), id.clone());
            }
            Some(ids) => {
                errors.push(SeedErrorEntry::new(
                    object,
                    Some(source_id.clone()),
                    "upsert",
                    format!(
                        "{} = '{}' matches {} target records; expected exactly one",
                        external_id_field,
                        value,
                        ids.len()
                    ),
                ));
            }
            None => {
                errors.push(SeedErrorEntry::new(
                    object,
                    Some(source_id.clone()),
                    "upsert",
                    format!(
                        "{} = '{}' matches no target record after upsert",
                        external_id_field, value
                    ),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{GlobalSObject, QueryPage, SaveResult};
    use crate::error::SeedError;
    use crate::schema::ObjectDescriptor;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn save_error(code: &str, message: &str, fields: &[&str]) -> SaveError {
        SaveError {
            status_code: Some(code.to_string()),
            message: message.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_format_save_errors() {
        assert_eq!(format_save_errors(&[]), "Unknown error");
        assert_eq!(
            format_save_errors(&[save_error("REQUIRED_FIELD_MISSING", "missing", &["Name"])]),
            "REQUIRED_FIELD_MISSING: missing [Name]"
        );
        assert_eq!(
            format_save_errors(&[save_error("DUPLICATE_VALUE", "dup", &[])]),
            "DUPLICATE_VALUE: dup"
        );
    }

    /// Scripted connection: returns queued save results and answers back-queries
    /// from a fixed row set.
    struct ScriptedConnection {
        save_results: Mutex<Vec<Vec<SaveResult>>>,
        query_rows: Vec<Record>,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedConnection {
        fn new(save_results: Vec<Vec<SaveResult>>, query_rows: Vec<Record>) -> Self {
            Self {
                save_results: Mutex::new(save_results),
                query_rows,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn pop_results(&self, batch_len: usize) -> Vec<SaveResult> {
            self.calls.lock().unwrap().push(batch_len);
            let mut queue = self.save_results.lock().unwrap();
            if queue.is_empty() {
                panic!("unexpected write call");
            }
            queue.remove(0)
        }
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        fn instance_url(&self) -> &str {
            "https://example.test"
        }
        fn access_token(&self) -> &str {
            "token"
        }
        fn api_version(&self) -> &str {
            "62.0"
        }
        async fn describe_global(&self) -> Result<Vec<GlobalSObject>> {
            unimplemented!()
        }
        async fn describe(&self, _object: &str) -> Result<ObjectDescriptor> {
            unimplemented!()
        }
        async fn query(&self, _soql: &str) -> Result<QueryPage> {
            Ok(QueryPage {
                total_size: self.query_rows.len() as i64,
                done: true,
                next_records_url: None,
                records: self.query_rows.clone(),
            })
        }
        async fn query_more(&self, _locator: &str) -> Result<QueryPage> {
            unimplemented!()
        }
        async fn create(&self, _object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>> {
            Ok(self.pop_results(records.len()))
        }
        async fn update(&self, _object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>> {
            Ok(self.pop_results(records.len()))
        }
        async fn upsert(
            &self,
            _object: &str,
            _external_id_field: &str,
            records: Vec<Record>,
        ) -> Result<Vec<SaveResult>> {
            Ok(self.pop_results(records.len()))
        }
        async fn download_version_data(&self, _version_id: &str) -> Result<Vec<u8>> {
            Err(SeedError::Request("no files in this test".into()))
        }
    }

    fn ok(id: &str) -> SaveResult {
        SaveResult {
            id: Some(id.to_string()),
            success: true,
            created: None,
            errors: Vec::new(),
        }
    }

    fn rejected(code: &str) -> SaveResult {
        SaveResult {
            id: None,
            success: false,
            created: None,
            errors: vec![save_error(code, "rejected", &[])],
        }
    }

    fn named_record(name: &str) -> Record {
        let mut r = Record::new();
        r.insert("Name".to_string(), json!(name));
        r
    }

    #[tokio::test]
    async fn test_batch_insert_registers_and_counts() {
        let conn = ScriptedConnection::new(
            vec![vec![ok("001X"), rejected("FIELD_CUSTOM_VALIDATION_EXCEPTION")]],
            Vec::new(),
        );
        let records = vec![named_record("a"), named_record("b")];
        let source_ids = vec!["001A".to_string(), "001B".to_string()];
        let mut registry = IdentityRegistry::new();
        let mut errors = Vec::new();

        let outcome = batch_insert(
            &conn, "Account", &records, &source_ids, &mut registry, &mut errors, false,
        )
        .await
        .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(registry.resolve("Account", "001A"), Some("001X"));
        assert_eq!(registry.resolve("Account", "001B"), None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, "insert");
        assert_eq!(errors[0].source_id.as_deref(), Some("001B"));
    }

    #[tokio::test]
    async fn test_batch_insert_dry_run_touches_nothing() {
        let conn = ScriptedConnection::new(Vec::new(), Vec::new());
        let records = vec![named_record("a"), named_record("b")];
        let source_ids = vec!["001A".to_string(), "001B".to_string()];
        let mut registry = IdentityRegistry::new();
        let mut errors = Vec::new();

        let outcome = batch_insert(
            &conn, "Account", &records, &source_ids, &mut registry, &mut errors, true,
        )
        .await
        .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failed, 0);
        assert!(registry.is_empty());
        assert!(conn.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_insert_splits_into_batches_of_200() {
        let first: Vec<SaveResult> = (0..200).map(|i| ok(&format!("X{}", i))).collect();
        let second: Vec<SaveResult> = (0..50).map(|i| ok(&format!("Y{}", i))).collect();
        let conn = ScriptedConnection::new(vec![first, second], Vec::new());

        let records: Vec<Record> = (0..250).map(|i| named_record(&format!("r{}", i))).collect();
        let source_ids: Vec<String> = (0..250).map(|i| format!("001{:03}", i)).collect();
        let mut registry = IdentityRegistry::new();
        let mut errors = Vec::new();

        let outcome = batch_insert(
            &conn, "Account", &records, &source_ids, &mut registry, &mut errors, false,
        )
        .await
        .unwrap();

        assert_eq!(outcome.inserted, 250);
        assert_eq!(*conn.calls.lock().unwrap(), vec![200, 50]);
    }

    #[tokio::test]
    async fn test_batch_upsert_recovers_updated_mapping_via_back_query() {
        // One created (id returned), one updated (no id returned).
        let results = vec![
            SaveResult {
                id: Some("001X".to_string()),
                success: true,
                created: Some(true),
                errors: Vec::new(),
            },
            SaveResult {
                id: None,
                success: true,
                created: Some(false),
                errors: Vec::new(),
            },
        ];
        let mut row = Record::new();
        row.insert("Id".to_string(), json!("001Y"));
        row.insert("Ext__c".to_string(), json!("k2"));
        let conn = ScriptedConnection::new(vec![results], vec![row]);

        let mut r1 = named_record("a");
        r1.insert("Ext__c".to_string(), json!("k1"));
        let mut r2 = named_record("b");
        r2.insert("Ext__c".to_string(), json!("k2"));
        let records = vec![r1, r2];
        let source_ids = vec!["001A".to_string(), "001B".to_string()];
        let mut registry = IdentityRegistry::new();
        let mut errors = Vec::new();

        let outcome = batch_upsert(
            &conn,
            "Account",
            &records,
            &source_ids,
            "Ext__c",
            &mut registry,
            &mut errors,
            false,
        )
        .await
        .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(registry.resolve("Account", "001A"), Some("001X"));
        assert_eq!(registry.resolve("Account", "001B"), Some("001Y"));
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_batch_upsert_flags_missing_external_id_value() {
        let results = vec![SaveResult {
            id: None,
            success: true,
            created: Some(false),
            errors: Vec::new(),
        }];
        let conn = ScriptedConnection::new(vec![results], Vec::new());

        let records = vec![named_record("a")];
        let source_ids = vec!["001A".to_string()];
        let mut registry = IdentityRegistry::new();
        let mut errors = Vec::new();

        batch_upsert(
            &conn,
            "Account",
            &records,
            &source_ids,
            "Ext__c",
            &mut registry,
            &mut errors,
            false,
        )
        .await
        .unwrap();

        assert!(registry.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, "upsert");
        assert!(errors[0].message.contains("no Ext__c value"));
    }

    #[tokio::test]
    async fn test_batch_update_reports_failures() {
        let conn = ScriptedConnection::new(
            vec![vec![ok("001X"), rejected("UNABLE_TO_LOCK_ROW")]],
            Vec::new(),
        );
        let records = vec![named_record("a"), named_record("b")];
        let source_ids = vec!["001A".to_string(), "001B".to_string()];
        let mut errors = Vec::new();

        let failed = batch_update(&conn, "Account", &records, &source_ids, &mut errors, false)
            .await
            .unwrap();

        assert_eq!(failed, 1);
        assert_eq!(errors[0].stage, "self-ref update");
    }
}
