//! Stage 6: binary file transfer.
//!
//! Walks the link-join object for everything in scope, downloads the latest
//! version of each linked document, re-creates it in the target, and rebuilds
//! the links against the remapped entities. Bodies are read fully into memory
//! and base64-encoded, so each file costs roughly 1.37x its binary size; the
//! version-create API offers no streaming alternative.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tracing::info;

use crate::connection::Record;
use crate::error::Result;
use crate::results::{FileTransferSummary, SeedErrorEntry};
use crate::soql::{escape_literal, in_list, query_all, query_all_chunked};
use crate::writer::{format_save_errors, BATCH_SIZE};

use super::SeedRun;

impl SeedRun<'_> {
    pub(crate) async fn stage_files(&mut self) -> Result<()> {
        let mut summary = FileTransferSummary::default();

        let scope_ids = self.all_scope_ids();
        if scope_ids.is_empty() {
            info!("Skipping files: nothing in scope");
            self.results.files = Some(summary);
            return Ok(());
        }

        info!("Discovering files linked to seeded records...");
        let links = query_all_chunked(self.source.as_ref(), &scope_ids, |chunk| {
            format!(
                "SELECT ContentDocumentId, LinkedEntityId FROM ContentDocumentLink \
                 WHERE LinkedEntityId IN ({})",
                in_list(chunk)
            )
        })
        .await?;

        let mut seen = HashSet::new();
        let document_ids: Vec<String> = links
            .iter()
            .filter_map(|r| r.get("ContentDocumentId").and_then(Value::as_str))
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect();
        summary.documents = document_ids.len();
        if document_ids.is_empty() {
            info!("No files linked to seeded records");
            self.results.files = Some(summary);
            return Ok(());
        }

        let versions = query_all_chunked(self.source.as_ref(), &document_ids, |chunk| {
            format!(
                "SELECT Id, ContentDocumentId, Title, PathOnClient, FileExtension, \
                 ContentSize, Description FROM ContentVersion \
                 WHERE ContentDocumentId IN ({}) AND IsLatestVersion = true",
                in_list(chunk)
            )
        })
        .await?;
        summary.versions = versions.len();

        if self.plan.dry_run {
            let bytes: u64 = versions
                .iter()
                .filter_map(|v| v.get("ContentSize").and_then(Value::as_u64))
                .sum();
            summary.bytes_transferred = bytes;
            info!(
                "[dry-run] would transfer {} file(s) across {} document(s), {} bytes",
                summary.versions, summary.documents, bytes
            );
            self.results.files = Some(summary);
            return Ok(());
        }

        // source document id -> target document id
        let mut document_map: HashMap<String, String> = HashMap::new();
        for version in &versions {
            match self.transfer_version(version).await? {
                Some((source_doc, target_doc, bytes)) => {
                    summary.uploaded += 1;
                    summary.bytes_transferred += bytes;
                    self.registry
                        .register("ContentDocument", source_doc.clone(), target_doc.clone());
                    document_map.insert(source_doc, target_doc);
                }
                None => summary.failed += 1,
            }
        }

        // Rebuild links where both sides exist in the target.
        let mut link_records = Vec::new();
        let mut link_entity_ids = Vec::new();
        for link in &links {
            let (Some(source_doc), Some(entity)) = (
                link.get("ContentDocumentId").and_then(Value::as_str),
                link.get("LinkedEntityId").and_then(Value::as_str),
            ) else {
                continue;
            };
            let (Some(target_doc), Some(target_entity)) =
                (document_map.get(source_doc), self.registry.resolve_any(entity))
            else {
                continue;
            };

            let mut record = Record::new();
            record.insert(
                "ContentDocumentId".to_string(),
                Value::String(target_doc.clone()),
            );
            record.insert(
                "LinkedEntityId".to_string(),
                Value::String(target_entity.to_string()),
            );
            record.insert("ShareType".to_string(), Value::String("V".to_string()));
            record.insert(
                "Visibility".to_string(),
                Value::String("AllUsers".to_string()),
            );
            link_records.push(record);
            link_entity_ids.push(entity.to_string());
        }

        for (batch, ids) in link_records
            .chunks(BATCH_SIZE)
            .zip(link_entity_ids.chunks(BATCH_SIZE))
        {
            let results = self
                .target
                .create("ContentDocumentLink", batch.to_vec())
                .await?;
            for (j, result) in results.iter().enumerate() {
                if result.success {
                    summary.links_created += 1;
                } else {
                    summary.failed += 1;
                    self.results.errors.push(SeedErrorEntry::new(
                        "ContentDocumentLink",
                        Some(ids[j].clone()),
                        "link",
                        format_save_errors(&result.errors),
                    ));
                }
            }
        }

        info!(
            "Files: {} uploaded, {} link(s) created, {} bytes, {} failed",
            summary.uploaded, summary.links_created, summary.bytes_transferred, summary.failed
        );
        self.results.files = Some(summary);
        Ok(())
    }

    /// Download one version's body, create it in the target, and resolve the
    /// new containing document id. Per-record rejections log an `upload`
    /// error and return `None`; transport failures propagate.
    async fn transfer_version(
        &mut self,
        version: &Record,
    ) -> Result<Option<(String, String, u64)>> {
        let version_id = version
            .get("Id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let source_doc = version
            .get("ContentDocumentId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let body = self.source.download_version_data(&version_id).await?;
        let bytes = body.len() as u64;

        let mut record = Record::new();
        for field in ["Title", "PathOnClient"] {
            record.insert(
                field.to_string(),
                version.get(field).cloned().unwrap_or(Value::Null),
            );
        }
        if let Some(description) = version.get("Description").filter(|v| !v.is_null()) {
            record.insert("Description".to_string(), description.clone());
        }
        record.insert(
            "VersionData".to_string(),
            Value::String(BASE64.encode(&body)),
        );

        let results = self.target.create("ContentVersion", vec![record]).await?;
        let result = results.first();
        let new_id = match result {
            Some(r) if r.success => r.id.clone(),
            Some(r) => {
                self.results.errors.push(SeedErrorEntry::new(
                    "ContentVersion",
                    Some(version_id.clone()),
                    "upload",
                    format_save_errors(&r.errors),
                ));
                return Ok(None);
            }
            None => None,
        };
        let Some(new_id) = new_id else {
            self.results.errors.push(SeedErrorEntry::new(
                "ContentVersion",
                Some(version_id.clone()),
                "upload",
                "version create returned no id",
            ));
            return Ok(None);
        };

        // The new version's containing document id is only available by
        // querying it back.
        let rows = query_all(
            self.target.as_ref(),
            &format!(
                "SELECT Id, ContentDocumentId FROM ContentVersion WHERE Id = '{}'",
                escape_literal(&new_id)
            ),
        )
        .await?;
        let target_doc = rows
            .first()
            .and_then(|r| r.get("ContentDocumentId").and_then(Value::as_str));
        match target_doc {
            Some(doc) => Ok(Some((source_doc, doc.to_string(), bytes))),
            None => {
                self.results.errors.push(SeedErrorEntry::new(
                    "ContentVersion",
                    Some(version_id),
                    "upload",
                    "could not resolve the new version's document id",
                ));
                Ok(None)
            }
        }
    }
}
