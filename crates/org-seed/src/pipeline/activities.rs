//! Stages 4 and 5: polymorphic activity seeding (Tasks and Events).
//!
//! An activity can attach to any record seeded by the earlier tiers via its
//! `WhatId` and `WhoId` fields, so remapping scans the whole registry. An
//! activity whose anchors cannot be remapped is still written with those
//! fields nulled, never dropped.

use serde_json::Value;
use tracing::info;

use crate::connection::{record_id, Record};
use crate::error::Result;
use crate::prepare::{insertable_fields, ACTIVITY_SYSTEM_FIELDS};
use crate::results::ObjectCounts;
use crate::soql::{build_projection, in_list, query_all_chunked};
use crate::writer::batch_insert;

use super::SeedRun;

/// Which activity object a stage run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActivityKind {
    Task,
    Event,
}

impl ActivityKind {
    pub(crate) fn object(self) -> &'static str {
        match self {
            ActivityKind::Task => "Task",
            ActivityKind::Event => "Event",
        }
    }
}

impl SeedRun<'_> {
    pub(crate) async fn stage_activities(&mut self, kind: ActivityKind) -> Result<()> {
        let object = kind.object();
        let mut counts = ObjectCounts::new(object);

        let scope_ids = self.all_scope_ids();
        if scope_ids.is_empty() {
            info!("Skipping {}: nothing in scope to attach to", object);
            self.store_activity_counts(kind, counts);
            return Ok(());
        }

        info!("Seeding {} records...", object);
        let source_desc = self.source_schema.describe_object(object).await?;
        let target_desc = self.target_schema.describe_object(object).await?;
        let insertable = insertable_fields(&source_desc, &target_desc, ACTIVITY_SYSTEM_FIELDS);
        let projection = build_projection(&insertable, &["WhatId", "WhoId"]);

        // An activity can anchor to scope through either polymorphic field.
        let by_what = query_all_chunked(self.source.as_ref(), &scope_ids, |chunk| {
            format!(
                "SELECT {} FROM {} WHERE WhatId IN ({})",
                projection,
                object,
                in_list(chunk)
            )
        })
        .await?;
        let by_who = query_all_chunked(self.source.as_ref(), &scope_ids, |chunk| {
            format!(
                "SELECT {} FROM {} WHERE WhoId IN ({})",
                projection,
                object,
                in_list(chunk)
            )
        })
        .await?;

        let mut seen = std::collections::HashSet::new();
        let mut records = Vec::new();
        for record in by_what.into_iter().chain(by_who) {
            let Some(id) = record_id(&record) else { continue };
            if seen.insert(id.to_string()) {
                records.push(record);
            }
        }
        counts.queried = records.len();
        info!("{}: {} record(s) queried", object, records.len());

        if self.plan.dry_run {
            info!("[dry-run] would insert {} {} record(s)", records.len(), object);
            counts.inserted = records.len();
            self.store_activity_counts(kind, counts);
            return Ok(());
        }

        let mut prepared = Vec::new();
        let mut source_ids = Vec::new();
        for record in &records {
            let Some(sid) = record_id(record) else { continue };
            prepared.push(self.prepare_activity(record, &insertable, &source_desc));
            source_ids.push(sid.to_string());
        }

        let outcome = batch_insert(
            self.target.as_ref(),
            object,
            &prepared,
            &source_ids,
            &mut self.registry,
            &mut self.results.errors,
            false,
        )
        .await?;
        counts.inserted = outcome.inserted;
        counts.failed = outcome.failed;

        info!(
            "{}: {} inserted, {} failed",
            object, counts.inserted, counts.failed
        );
        self.store_activity_counts(kind, counts);
        Ok(())
    }

    /// Copy non-reference fields verbatim; remap `WhatId`/`WhoId` through the
    /// whole registry, nulling anchors with no mapping; strip every other
    /// reference.
    fn prepare_activity(
        &self,
        record: &Record,
        insertable: &[String],
        descriptor: &crate::schema::ObjectDescriptor,
    ) -> Record {
        let mut out = Record::new();
        for field in insertable {
            let Some(value) = record.get(field) else { continue };

            if field == "WhatId" || field == "WhoId" {
                let remapped = value
                    .as_str()
                    .and_then(|v| self.registry.resolve_any(v))
                    .map(|t| Value::String(t.to_string()))
                    .unwrap_or(Value::Null);
                out.insert(field.clone(), remapped);
                continue;
            }

            let is_reference = descriptor
                .field(field)
                .map(|f| f.is_reference())
                .unwrap_or(false);
            if is_reference && !value.is_null() {
                continue;
            }
            out.insert(field.clone(), value.clone());
        }
        out
    }

    fn store_activity_counts(&mut self, kind: ActivityKind, counts: ObjectCounts) {
        match kind {
            ActivityKind::Task => self.results.tasks = Some(counts),
            ActivityKind::Event => self.results.events = Some(counts),
        }
    }
}
