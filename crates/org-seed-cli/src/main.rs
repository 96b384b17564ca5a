//! org-seed CLI - seed a CRM sandbox org from another org.

mod orgs;
mod prompt;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, Level};

use org_seed::plan::{ChildPlan, GrandchildPlan, RecordLimit, SeedPlan};
use org_seed::schema::SchemaInspector;
use org_seed::{Connection, Result, SeedError, Seeder};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "org-seed")]
#[command(about = "Seed a CRM sandbox org with related records from another org")]
#[command(version)]
struct Cli {
    /// Source org alias (from the auth file)
    #[arg(short = 's', long)]
    source_org: Option<String>,

    /// Target org alias (from the auth file)
    #[arg(short = 't', long)]
    target_org: Option<String>,

    /// Root object API name
    #[arg(short = 'o', long)]
    object: Option<String>,

    /// Comma-separated child object names to seed under the root
    #[arg(short = 'c', long)]
    children: Option<String>,

    /// Comma-separated grandchild object names to seed under the children
    #[arg(short = 'g', long)]
    grandchildren: Option<String>,

    /// Seed Task records attached to seeded records
    #[arg(long)]
    include_tasks: bool,

    /// Seed Event records attached to seeded records
    #[arg(long)]
    include_events: bool,

    /// Transfer files linked to seeded records
    #[arg(long)]
    include_files: bool,

    /// How many root records to seed (positive integer or 'All')
    #[arg(short = 'n', long, default_value = "10")]
    count: String,

    /// WHERE clause applied to the root query
    #[arg(short = 'w', long)]
    r#where: Option<String>,

    /// External-id field for upserting root records instead of inserting
    #[arg(short = 'u', long)]
    upsert_field: Option<String>,

    /// Perform all reads and classification but no writes
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// Path to the org auth file (default: ORG_SEED_AUTH_FILE or orgs.json)
    #[arg(long)]
    auth_file: Option<PathBuf>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output the results as JSON
    #[arg(long)]
    output_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)?;

    // Fail fast on a malformed count before touching credentials.
    let record_limit: RecordLimit = cli.count.parse().map_err(SeedError::Plan)?;

    let auth_path = cli
        .auth_file
        .clone()
        .or_else(|| std::env::var_os("ORG_SEED_AUTH_FILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("orgs.json"));

    // All three of -s, -t, -o present means non-interactive; anything missing
    // routes through the prompt loop.
    let interactive =
        cli.source_org.is_none() || cli.target_org.is_none() || cli.object.is_none();

    let source_alias = match &cli.source_org {
        Some(alias) => alias.clone(),
        None => prompt::input_org_alias("source")?,
    };
    let target_alias = match &cli.target_org {
        Some(alias) => alias.clone(),
        None => prompt::input_org_alias("target")?,
    };

    let auth = orgs::load_auth_file(&auth_path)?;
    let source: Arc<dyn Connection> =
        Arc::new(orgs::connect(orgs::resolve(&auth, &source_alias)?)?);
    let target: Arc<dyn Connection> =
        Arc::new(orgs::connect(orgs::resolve(&auth, &target_alias)?)?);
    info!("Seeding from {} into {}", source_alias, target_alias);

    let inspector = SchemaInspector::new(Arc::clone(&source));
    let plan = if interactive {
        let defaults = prompt::PromptDefaults {
            object: cli.object.clone(),
            count: cli.count.clone(),
            include_tasks: cli.include_tasks,
            include_events: cli.include_events,
            include_files: cli.include_files,
            dry_run: cli.dry_run,
            where_clause: cli.r#where.clone(),
            upsert_field: cli.upsert_field.clone(),
        };
        prompt::build_plan(&inspector, defaults).await?
    } else {
        // Non-interactive routing only happens when -o was given.
        let root_object = cli.object.clone().unwrap_or_default();
        build_plan_from_flags(&cli, root_object, record_limit, &inspector).await?
    };

    let cancel = watch_for_shutdown();
    let results = Seeder::new(source, target).run(&plan, Some(cancel)).await?;

    if cli.output_json {
        println!("{}", results.to_json()?);
    } else {
        report::print_summary(&results);
    }

    // Per-record failures are recorded in the results, not an exit code.
    Ok(())
}

/// Assemble a plan from flags alone, resolving child and grandchild names
/// against the source org's discovered relationships.
async fn build_plan_from_flags(
    cli: &Cli,
    root_object: String,
    record_limit: RecordLimit,
    inspector: &SchemaInspector,
) -> Result<SeedPlan> {
    let mut plan = SeedPlan::for_root(root_object.clone());
    plan.record_limit = record_limit;
    plan.include_tasks = cli.include_tasks;
    plan.include_events = cli.include_events;
    plan.include_files = cli.include_files;
    plan.dry_run = cli.dry_run;
    plan.where_clause = cli.r#where.clone();
    plan.root_external_id_field = cli.upsert_field.clone();

    if let Some(children_csv) = &cli.children {
        let relationships = inspector.discover_children(&root_object).await?;
        for name in split_csv(children_csv) {
            let rel = relationships
                .iter()
                .find(|r| r.child_s_object == name)
                .ok_or_else(|| {
                    SeedError::Plan(format!(
                        "{} is not a seedable child of {}",
                        name, root_object
                    ))
                })?;
            plan.children.push(ChildPlan {
                object: rel.child_s_object.clone(),
                parent_lookup_field: rel
                    .field
                    .clone()
                    .ok_or_else(|| SeedError::Plan(format!("{} has no lookup field", name)))?,
                external_id_field: None,
                grandchildren: Vec::new(),
            });
        }
    }

    if let Some(grandchildren_csv) = &cli.grandchildren {
        if plan.children.is_empty() {
            return Err(SeedError::Plan(
                "grandchildren require at least one child (-c)".into(),
            ));
        }
        let child_names: Vec<String> = plan.children.iter().map(|c| c.object.clone()).collect();
        let discovered = inspector
            .discover_grandchildren(&child_names, &root_object)
            .await?;
        for name in split_csv(grandchildren_csv) {
            let found = discovered
                .iter()
                .find(|g| g.relationship.child_s_object == name)
                .ok_or_else(|| {
                    SeedError::Plan(format!(
                        "{} is not a seedable grandchild of the declared children",
                        name
                    ))
                })?;
            let field = found.relationship.field.clone().ok_or_else(|| {
                SeedError::Plan(format!("{} has no lookup field", name))
            })?;
            let parent = found.parent_object.clone();
            if let Some(child) = plan.children.iter_mut().find(|c| c.object == parent) {
                child.grandchildren.push(GrandchildPlan {
                    object: name.to_string(),
                    parent_lookup_field: field,
                    external_id_field: None,
                });
            }
        }
    }

    plan.validate()?;
    Ok(plan)
}

fn split_csv(csv: &str) -> Vec<&str> {
    csv.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn setup_logging(verbosity: &str, format: &str) -> Result<()> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Wire OS signals to the pipeline's cooperative cancellation flag.
///
/// The first SIGINT or SIGTERM flips the flag, letting the run stop cleanly
/// at its next stage boundary with partial results. A further Ctrl-C stops
/// waiting and quits mid-batch. If the handlers cannot be installed the run
/// simply proceeds uncancellable.
#[cfg(unix)]
fn watch_for_shutdown() -> watch::Receiver<bool> {
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        let (mut interrupt, mut terminate) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(i), Ok(t)) => (i, t),
            (i, t) => {
                let err = i.err().or(t.err()).map(|e| e.to_string()).unwrap_or_default();
                eprintln!("warning: signal handlers unavailable ({}); run cannot be cancelled", err);
                return;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => {
                eprintln!("\nStopping at the next stage boundary. Ctrl-C again quits without waiting.");
            }
            _ = terminate.recv() => {
                eprintln!("\nTermination requested; stopping at the next stage boundary.");
            }
        }
        let _ = stop_tx.send(true);

        interrupt.recv().await;
        eprintln!("\nQuitting mid-batch.");
        std::process::exit(130);
    });

    stop_rx
}

/// Windows fallback: Ctrl-C only, no mid-batch escape hatch.
#[cfg(not(unix))]
fn watch_for_shutdown() -> watch::Receiver<bool> {
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping at the next stage boundary.");
            let _ = stop_tx.send(true);
        }
    });

    stop_rx
}
