//! Interactive prompt loop for assembling a seed plan.

use dialoguer::{Confirm, Input, MultiSelect, Select};

use org_seed::plan::{ChildPlan, GrandchildPlan, RecordLimit, SeedPlan};
use org_seed::schema::SchemaInspector;
use org_seed::{Result, SeedError};

/// Defaults carried in from the command line; anything missing is prompted.
#[derive(Debug, Clone, Default)]
pub struct PromptDefaults {
    pub object: Option<String>,
    pub count: String,
    pub include_tasks: bool,
    pub include_events: bool,
    pub include_files: bool,
    pub dry_run: bool,
    pub where_clause: Option<String>,
    pub upsert_field: Option<String>,
}

fn io_err(e: dialoguer::Error) -> SeedError {
    let dialoguer::Error::IO(inner) = e;
    SeedError::Io(inner)
}

/// Ask a yes/no question; backing out (Esc) cancels the whole plan.
fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact_opt()
        .map_err(io_err)?
        .ok_or(SeedError::Cancelled)
}

/// Prompt for an org alias that was not supplied as a flag.
pub fn input_org_alias(which: &str) -> Result<String> {
    Input::<String>::new()
        .with_prompt(format!("{} org alias", which))
        .interact_text()
        .map_err(io_err)
}

/// Walk the operator through a full seed plan: root object, children,
/// grandchildren, activities, files, and query shaping.
pub async fn build_plan(
    inspector: &SchemaInspector,
    defaults: PromptDefaults,
) -> Result<SeedPlan> {
    println!();
    println!("Org Seeding - Interactive Plan");
    println!("==============================");
    println!();

    let root_object = match defaults.object {
        Some(object) => object,
        None => prompt_root_object(inspector).await?,
    };

    let children = prompt_children(inspector, &root_object).await?;
    let mut plan = SeedPlan::for_root(root_object.clone());
    plan.children = children;

    if !plan.children.is_empty() {
        let child_names: Vec<String> = plan.children.iter().map(|c| c.object.clone()).collect();
        let grandchildren = prompt_grandchildren(inspector, &child_names, &root_object).await?;
        for (parent, gc) in grandchildren {
            if let Some(child) = plan.children.iter_mut().find(|c| c.object == parent) {
                child.grandchildren.push(gc);
            }
        }
    }

    plan.record_limit = prompt_count(&defaults.count)?;
    plan.where_clause = prompt_where(defaults.where_clause)?;
    plan.root_external_id_field = prompt_upsert_field(defaults.upsert_field)?;

    plan.include_tasks = confirm("Include Tasks?", defaults.include_tasks)?;
    plan.include_events = confirm("Include Events?", defaults.include_events)?;
    plan.include_files = confirm("Include Files?", defaults.include_files)?;
    plan.dry_run = confirm("Dry run (no writes)?", defaults.dry_run)?;

    plan.validate()?;
    Ok(plan)
}

async fn prompt_root_object(inspector: &SchemaInspector) -> Result<String> {
    println!("Fetching seedable objects from the source org...");
    let objects = inspector.list_insertable_objects().await?;
    if objects.is_empty() {
        return Err(SeedError::Schema("source org has no seedable objects".into()));
    }

    let items: Vec<String> = objects
        .iter()
        .map(|o| format!("{} ({})", o.label, o.name))
        .collect();
    let selection = Select::new()
        .with_prompt("Root object to seed")
        .items(&items)
        .default(0)
        .interact_opt()
        .map_err(io_err)?
        .ok_or(SeedError::Cancelled)?;
    Ok(objects[selection].name.clone())
}

async fn prompt_children(
    inspector: &SchemaInspector,
    root_object: &str,
) -> Result<Vec<ChildPlan>> {
    println!("Discovering child relationships of {}...", root_object);
    let relationships = inspector.discover_children(root_object).await?;
    if relationships.is_empty() {
        println!("No seedable child relationships found.");
        return Ok(Vec::new());
    }

    let items: Vec<String> = relationships
        .iter()
        .map(|r| {
            format!(
                "{} (via {})",
                r.child_s_object,
                r.field.as_deref().unwrap_or("?")
            )
        })
        .collect();
    let chosen = MultiSelect::new()
        .with_prompt("Children to include (space to toggle, enter to confirm)")
        .items(&items)
        .interact_opt()
        .map_err(io_err)?
        .ok_or(SeedError::Cancelled)?;

    Ok(chosen
        .into_iter()
        .filter_map(|index| {
            let rel = &relationships[index];
            rel.field.as_ref().map(|field| ChildPlan {
                object: rel.child_s_object.clone(),
                parent_lookup_field: field.clone(),
                external_id_field: None,
                grandchildren: Vec::new(),
            })
        })
        .collect())
}

async fn prompt_grandchildren(
    inspector: &SchemaInspector,
    child_names: &[String],
    root_object: &str,
) -> Result<Vec<(String, GrandchildPlan)>> {
    println!("Discovering grandchild relationships...");
    let discovered = inspector
        .discover_grandchildren(child_names, root_object)
        .await?;
    if discovered.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<String> = discovered
        .iter()
        .map(|g| {
            format!(
                "{} -> {} (via {})",
                g.parent_object,
                g.relationship.child_s_object,
                g.relationship.field.as_deref().unwrap_or("?")
            )
        })
        .collect();
    let chosen = MultiSelect::new()
        .with_prompt("Grandchildren to include")
        .items(&items)
        .interact_opt()
        .map_err(io_err)?
        .ok_or(SeedError::Cancelled)?;

    Ok(chosen
        .into_iter()
        .filter_map(|index| {
            let g = &discovered[index];
            g.relationship.field.as_ref().map(|field| {
                (
                    g.parent_object.clone(),
                    GrandchildPlan {
                        object: g.relationship.child_s_object.clone(),
                        parent_lookup_field: field.clone(),
                        external_id_field: None,
                    },
                )
            })
        })
        .collect())
}

fn prompt_count(default: &str) -> Result<RecordLimit> {
    let raw: String = Input::new()
        .with_prompt("How many root records? (number or 'All')")
        .default(default.to_string())
        .validate_with(|input: &String| input.parse::<RecordLimit>().map(|_| ()))
        .interact_text()
        .map_err(io_err)?;
    raw.parse().map_err(SeedError::Plan)
}

fn prompt_where(default: Option<String>) -> Result<Option<String>> {
    let raw: String = Input::new()
        .with_prompt("WHERE clause for the root query (blank for none)")
        .default(default.unwrap_or_default())
        .allow_empty(true)
        .interact_text()
        .map_err(io_err)?;
    Ok(if raw.trim().is_empty() { None } else { Some(raw) })
}

fn prompt_upsert_field(default: Option<String>) -> Result<Option<String>> {
    let raw: String = Input::new()
        .with_prompt("External-id field for upserting roots (blank to insert)")
        .default(default.unwrap_or_default())
        .allow_empty(true)
        .interact_text()
        .map_err(io_err)?;
    Ok(if raw.trim().is_empty() { None } else { Some(raw) })
}
