//! The seeding pipeline: six sequential stages over a shared identity
//! registry.
//!
//! Stage order is the dependency order: the core object is fully written
//! before any child reads the registry, children before grandchildren, all
//! relational tiers before activities, and everything before files. Batches
//! run strictly one after another; parallelizing them would break the
//! parents-before-children ordering.

mod activities;
mod files;

pub(crate) use activities::ActivityKind;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::classify::{classify_root_references, classify_tier_references, ReferenceBucket};
use crate::connection::{record_id, Connection, Record};
use crate::error::Result;
use crate::plan::SeedPlan;
use crate::prepare::{insertable_fields, prepare_record, Prepared};
use crate::registry::IdentityRegistry;
use crate::results::{ObjectCounts, SeedResults, SeedStatus};
use crate::schema::SchemaInspector;
use crate::soql::{build_projection, build_query, in_list, query_all, query_all_chunked};
use crate::writer::{batch_insert, batch_update, batch_upsert};

/// Runs seed plans between two borrowed org connections.
pub struct Seeder {
    source: Arc<dyn Connection>,
    target: Arc<dyn Connection>,
}

impl Seeder {
    /// Create a seeder over a source and target connection.
    pub fn new(source: Arc<dyn Connection>, target: Arc<dyn Connection>) -> Self {
        Self { source, target }
    }

    /// Execute a seed plan.
    ///
    /// The cancellation receiver is consulted at stage boundaries and between
    /// tiers, never mid-batch; when it flips, the accumulated partial results
    /// are returned with status `PartialDone`. A connection failure aborts the
    /// current stage and propagates.
    pub async fn run(
        &self,
        plan: &SeedPlan,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<SeedResults> {
        plan.validate()?;

        let mut run = SeedRun::new(
            Arc::clone(&self.source),
            Arc::clone(&self.target),
            plan,
            cancel,
        );
        let status = run.execute().await?;

        let mut results = run.results;
        results.status = status;
        results.finished_at = chrono::Utc::now();
        Ok(results)
    }
}

/// Mutable state threaded through one pipeline run.
pub(crate) struct SeedRun<'a> {
    pub(crate) source: Arc<dyn Connection>,
    pub(crate) target: Arc<dyn Connection>,
    pub(crate) source_schema: SchemaInspector,
    pub(crate) target_schema: SchemaInspector,
    pub(crate) plan: &'a SeedPlan,
    pub(crate) registry: IdentityRegistry,
    pub(crate) results: SeedResults,
    cancel: Option<watch::Receiver<bool>>,
    /// Source ids per object as queried, used to scope later tiers during dry
    /// runs when the registry stays empty.
    queried_ids: BTreeMap<String, Vec<String>>,
}

impl<'a> SeedRun<'a> {
    fn new(
        source: Arc<dyn Connection>,
        target: Arc<dyn Connection>,
        plan: &'a SeedPlan,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Self {
        Self {
            source_schema: SchemaInspector::new(Arc::clone(&source)),
            target_schema: SchemaInspector::new(Arc::clone(&target)),
            source,
            target,
            plan,
            registry: IdentityRegistry::new(),
            results: SeedResults::started_now(),
            cancel,
            queried_ids: BTreeMap::new(),
        }
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    async fn execute(&mut self) -> Result<SeedStatus> {
        let wrote = self.stage_core().await?;
        if self.cancelled() {
            return Ok(SeedStatus::PartialDone);
        }
        if !wrote && !self.plan.dry_run {
            info!("core object produced no writes; skipping remaining stages");
            return Ok(SeedStatus::EarlyDone);
        }

        self.stage_children().await?;
        if self.cancelled() {
            return Ok(SeedStatus::PartialDone);
        }

        self.stage_grandchildren().await?;
        if self.cancelled() {
            return Ok(SeedStatus::PartialDone);
        }

        if self.plan.include_tasks {
            self.stage_activities(ActivityKind::Task).await?;
            if self.cancelled() {
                return Ok(SeedStatus::PartialDone);
            }
        }
        if self.plan.include_events {
            self.stage_activities(ActivityKind::Event).await?;
            if self.cancelled() {
                return Ok(SeedStatus::PartialDone);
            }
        }
        if self.plan.include_files {
            self.stage_files().await?;
            if self.cancelled() {
                return Ok(SeedStatus::PartialDone);
            }
        }

        Ok(SeedStatus::Done)
    }

    /// Source ids to parent the next tier off: registered ids normally, the
    /// queried ids in a dry run.
    pub(crate) fn parent_ids(&self, object: &str) -> Vec<String> {
        if self.plan.dry_run {
            self.queried_ids.get(object).cloned().unwrap_or_default()
        } else {
            self.registry.source_ids_for(object)
        }
    }

    /// Every source id in scope so far, for the activity and file stages.
    pub(crate) fn all_scope_ids(&self) -> Vec<String> {
        if self.plan.dry_run {
            self.queried_ids.values().flatten().cloned().collect()
        } else {
            self.registry.all_source_ids()
        }
    }

    fn capture_queried_ids(&mut self, object: &str, records: &[Record]) {
        if !self.plan.dry_run {
            return;
        }
        let ids = records
            .iter()
            .filter_map(record_id)
            .map(str::to_string)
            .collect();
        self.queried_ids.insert(object.to_string(), ids);
    }

    /// Stage 1: seed the core object, its shallow data dependencies, and its
    /// self references. Returns whether anything was written.
    async fn stage_core(&mut self) -> Result<bool> {
        let plan = self.plan;
        let object = plan.root_object.as_str();
        info!("Seeding {}...", object);

        let source_desc = self.source_schema.describe_object(object).await?;
        let target_desc = self.target_schema.describe_object(object).await?;
        let insertable = insertable_fields(&source_desc, &target_desc, &[]);
        let projection = build_projection(&insertable, &[]);

        let soql = build_query(
            &projection,
            object,
            plan.where_clause.as_deref(),
            plan.record_limit,
        );
        let mut records = query_all(self.source.as_ref(), &soql).await?;
        let mut counts = ObjectCounts::new(object);
        counts.queried = records.len();
        self.capture_queried_ids(object, &records);
        info!("{}: {} record(s) queried", object, records.len());

        if plan.dry_run {
            info!("[dry-run] would insert {} {} record(s)", records.len(), object);
            counts.inserted = records.len();
            self.results.core = Some(counts);
            return Ok(true);
        }

        let mut buckets = classify_root_references(&source_desc, object);
        self.seed_data_dependencies(&records, &mut buckets).await;

        // Pull in out-of-batch self-reference parents so the insert itself is
        // ordered parents-first. In-batch parents are handled by the
        // post-insert update pass.
        let self_ref_fields: Vec<String> = buckets
            .iter()
            .filter(|(_, b)| **b == ReferenceBucket::SelfRef)
            .map(|(f, _)| f.clone())
            .collect();
        if !self_ref_fields.is_empty() {
            let parents = self
                .fetch_missing_parents(object, &projection, &records, &self_ref_fields)
                .await?;
            if !parents.is_empty() {
                info!(
                    "{}: pulled in {} out-of-batch parent record(s)",
                    object,
                    parents.len()
                );
                counts.queried += parents.len();
                let mut ordered = parents;
                ordered.append(&mut records);
                records = ordered;
            }
        }

        let mut prepared = Vec::new();
        let mut source_ids = Vec::new();
        for record in &records {
            match prepare_record(
                object,
                record,
                &insertable,
                &buckets,
                &source_desc,
                &self.registry,
                &mut self.results.errors,
            ) {
                Prepared::Ready(r) => {
                    prepared.push(r);
                    source_ids.push(record_id(record).unwrap_or_default().to_string());
                }
                Prepared::Skipped => counts.skipped += 1,
            }
        }

        let outcome = match &plan.root_external_id_field {
            Some(ext) => {
                batch_upsert(
                    self.target.as_ref(),
                    object,
                    &prepared,
                    &source_ids,
                    ext,
                    &mut self.registry,
                    &mut self.results.errors,
                    false,
                )
                .await?
            }
            None => {
                batch_insert(
                    self.target.as_ref(),
                    object,
                    &prepared,
                    &source_ids,
                    &mut self.registry,
                    &mut self.results.errors,
                    false,
                )
                .await?
            }
        };
        counts.inserted = outcome.inserted;
        counts.updated = outcome.updated;
        counts.failed = outcome.failed;

        if !self_ref_fields.is_empty() {
            counts.failed += self
                .resolve_self_references(object, &records, &self_ref_fields)
                .await?;
        }

        info!(
            "{}: {} inserted, {} updated, {} failed, {} skipped",
            object, counts.inserted, counts.updated, counts.failed, counts.skipped
        );
        let wrote = counts.inserted + counts.updated > 0;
        self.results.core = Some(counts);
        Ok(wrote)
    }

    /// Shallow-seed each single-target data dependency referenced by the core
    /// batch. A dependency that cannot be described or inserted is demoted to
    /// a stripped reference so the core records still write.
    async fn seed_data_dependencies(
        &mut self,
        records: &[Record],
        buckets: &mut BTreeMap<String, ReferenceBucket>,
    ) {
        let dependencies: Vec<(String, String)> = buckets
            .iter()
            .filter_map(|(field, bucket)| match bucket {
                ReferenceBucket::DataDependency(target) => {
                    Some((field.clone(), target.clone()))
                }
                _ => None,
            })
            .collect();

        for (field, dep_object) in dependencies {
            let mut seen = HashSet::new();
            let ids: Vec<String> = records
                .iter()
                .filter_map(|r| r.get(&field).and_then(Value::as_str))
                .filter(|id| self.registry.resolve(&dep_object, id).is_none())
                .filter(|id| seen.insert(id.to_string()))
                .map(str::to_string)
                .collect();
            if ids.is_empty() {
                continue;
            }

            if let Err(e) = self.pull_dependency(&dep_object, &ids).await {
                warn!(
                    "Could not seed {} (referenced by {}): {}; stripping the field",
                    dep_object, field, e
                );
                buckets.insert(field, ReferenceBucket::System);
            }
        }
    }

    /// Copy the exact referenced dependency records, with every reference
    /// field stripped. No recursion.
    async fn pull_dependency(&mut self, object: &str, ids: &[String]) -> Result<()> {
        let source_desc = self.source_schema.describe_object(object).await?;
        let target_desc = self.target_schema.describe_object(object).await?;
        let insertable = insertable_fields(&source_desc, &target_desc, &[]);
        let projection = build_projection(&insertable, &[]);

        let records = query_all_chunked(self.source.as_ref(), ids, |chunk| {
            format!(
                "SELECT {} FROM {} WHERE Id IN ({})",
                projection,
                object,
                in_list(chunk)
            )
        })
        .await?;

        let mut prepared = Vec::new();
        let mut source_ids = Vec::new();
        for record in &records {
            let Some(sid) = record_id(record) else { continue };
            let mut out = Record::new();
            for field in &insertable {
                let Some(value) = record.get(field) else { continue };
                let is_reference = source_desc
                    .field(field)
                    .map(|f| f.is_reference())
                    .unwrap_or(false);
                if is_reference {
                    continue;
                }
                out.insert(field.clone(), value.clone());
            }
            prepared.push(out);
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
        info!(
            "{}: seeded {} dependency record(s), {} failed",
            object, outcome.inserted, outcome.failed
        );
        Ok(())
    }

    /// Fetch self-reference parents that are not in the batch, deduplicated
    /// and in first-reference order.
    async fn fetch_missing_parents(
        &self,
        object: &str,
        projection: &str,
        records: &[Record],
        self_ref_fields: &[String],
    ) -> Result<Vec<Record>> {
        let in_batch: HashSet<&str> = records.iter().filter_map(record_id).collect();
        let mut seen = HashSet::new();
        let missing: Vec<String> = records
            .iter()
            .flat_map(|r| {
                self_ref_fields
                    .iter()
                    .filter_map(|f| r.get(f).and_then(Value::as_str))
            })
            .filter(|id| !in_batch.contains(id))
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        query_all_chunked(self.source.as_ref(), &missing, |chunk| {
            format!(
                "SELECT {} FROM {} WHERE Id IN ({})",
                projection,
                object,
                in_list(chunk)
            )
        })
        .await
    }

    /// Post-insert pass: update written records whose self references are now
    /// resolvable through the registry. Returns the number of failed updates.
    async fn resolve_self_references(
        &mut self,
        object: &str,
        records: &[Record],
        self_ref_fields: &[String],
    ) -> Result<usize> {
        let mut updates = Vec::new();
        let mut update_source_ids = Vec::new();

        for record in records {
            let Some(sid) = record_id(record) else { continue };
            let Some(target_id) = self.registry.resolve(object, sid) else {
                continue;
            };

            let mut update = Record::new();
            for field in self_ref_fields {
                let Some(referent) = record.get(field).and_then(Value::as_str) else {
                    continue;
                };
                if let Some(target_ref) = self.registry.resolve_any(referent) {
                    update.insert(field.clone(), Value::String(target_ref.to_string()));
                }
            }
            if update.is_empty() {
                continue;
            }
            update.insert("Id".to_string(), Value::String(target_id.to_string()));
            updates.push(update);
            update_source_ids.push(sid.to_string());
        }

        if updates.is_empty() {
            return Ok(0);
        }
        info!(
            "{}: resolving self-references on {} record(s)",
            object,
            updates.len()
        );
        batch_update(
            self.target.as_ref(),
            object,
            &updates,
            &update_source_ids,
            &mut self.results.errors,
            false,
        )
        .await
    }

    /// Stage 2: declared children, in plan order.
    async fn stage_children(&mut self) -> Result<()> {
        let plan = self.plan;
        for child in &plan.children {
            if self.cancelled() {
                return Ok(());
            }
            let counts = self
                .seed_tier(
                    &child.object,
                    &child.parent_lookup_field,
                    &plan.root_object,
                    child.external_id_field.as_deref(),
                )
                .await?;
            self.results.children.push(counts);
        }
        Ok(())
    }

    /// Stage 3: grandchildren, parented off their child tier's registry
    /// entries.
    async fn stage_grandchildren(&mut self) -> Result<()> {
        let plan = self.plan;
        for child in &plan.children {
            for grandchild in &child.grandchildren {
                if self.cancelled() {
                    return Ok(());
                }
                let counts = self
                    .seed_tier(
                        &grandchild.object,
                        &grandchild.parent_lookup_field,
                        &child.object,
                        grandchild.external_id_field.as_deref(),
                    )
                    .await?;
                self.results.grandchildren.push(counts);
            }
        }
        Ok(())
    }

    /// Seed one non-root tier: query by parent ids, classify against the
    /// registry, prepare, and insert or upsert.
    async fn seed_tier(
        &mut self,
        object: &str,
        parent_field: &str,
        parent_object: &str,
        external_id_field: Option<&str>,
    ) -> Result<ObjectCounts> {
        let mut counts = ObjectCounts::new(object);

        let parent_ids = self.parent_ids(parent_object);
        if parent_ids.is_empty() {
            info!(
                "Skipping {}: no {} records were seeded",
                object, parent_object
            );
            return Ok(counts);
        }

        info!("Seeding {} (parented by {})...", object, parent_object);
        let source_desc = self.source_schema.describe_object(object).await?;
        let target_desc = self.target_schema.describe_object(object).await?;
        let insertable = insertable_fields(&source_desc, &target_desc, &[]);
        let projection = build_projection(&insertable, &[]);

        let records = query_all_chunked(self.source.as_ref(), &parent_ids, |chunk| {
            format!(
                "SELECT {} FROM {} WHERE {} IN ({})",
                projection,
                object,
                parent_field,
                in_list(chunk)
            )
        })
        .await?;
        counts.queried = records.len();
        self.capture_queried_ids(object, &records);
        info!("{}: {} record(s) queried", object, records.len());

        if self.plan.dry_run {
            info!("[dry-run] would insert {} {} record(s)", records.len(), object);
            counts.inserted = records.len();
            return Ok(counts);
        }

        let buckets = classify_tier_references(&source_desc, &self.registry);

        let mut prepared = Vec::new();
        let mut source_ids = Vec::new();
        for record in &records {
            match prepare_record(
                object,
                record,
                &insertable,
                &buckets,
                &source_desc,
                &self.registry,
                &mut self.results.errors,
            ) {
                Prepared::Ready(r) => {
                    prepared.push(r);
                    source_ids.push(record_id(record).unwrap_or_default().to_string());
                }
                Prepared::Skipped => counts.skipped += 1,
            }
        }

        let outcome = match external_id_field {
            Some(ext) => {
                batch_upsert(
                    self.target.as_ref(),
                    object,
                    &prepared,
                    &source_ids,
                    ext,
                    &mut self.registry,
                    &mut self.results.errors,
                    false,
                )
                .await?
            }
            None => {
                batch_insert(
                    self.target.as_ref(),
                    object,
                    &prepared,
                    &source_ids,
                    &mut self.registry,
                    &mut self.results.errors,
                    false,
                )
                .await?
            }
        };
        counts.inserted = outcome.inserted;
        counts.updated = outcome.updated;
        counts.failed = outcome.failed;

        info!(
            "{}: {} inserted, {} updated, {} failed, {} skipped",
            object, counts.inserted, counts.updated, counts.failed, counts.skipped
        );
        Ok(counts)
    }
}
