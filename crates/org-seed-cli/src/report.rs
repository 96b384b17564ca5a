//! Terminal rendering of seed results.

use org_seed::{SeedResults, SeedStatus};

/// Errors shown before the list is truncated.
const ERROR_DISPLAY_LIMIT: usize = 20;

/// Print the per-object summary table, file summary, and truncated error
/// list.
pub fn print_summary(results: &SeedResults) {
    let status = match results.status {
        SeedStatus::Done => "completed",
        SeedStatus::EarlyDone => "completed (core object produced no writes)",
        SeedStatus::PartialDone => "cancelled (partial results)",
    };
    println!();
    println!("Seeding {}", status);
    println!(
        "  Duration: {:.2}s",
        (results.finished_at - results.started_at).num_milliseconds() as f64 / 1000.0
    );
    println!();

    let counts = results.all_counts();
    if !counts.is_empty() {
        let width = counts
            .iter()
            .map(|c| c.object.len())
            .chain(std::iter::once("Object".len()))
            .max()
            .unwrap_or(6);
        println!(
            "  {:<width$}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
            "Object", "Queried", "Inserted", "Updated", "Failed", "Skipped",
            width = width
        );
        for c in counts {
            println!(
                "  {:<width$}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
                c.object, c.queried, c.inserted, c.updated, c.failed, c.skipped,
                width = width
            );
        }
    }

    if let Some(files) = &results.files {
        println!();
        println!(
            "  Files: {} document(s), {} uploaded, {} link(s), {} bytes, {} failed",
            files.documents,
            files.uploaded,
            files.links_created,
            files.bytes_transferred,
            files.failed
        );
    }

    if !results.errors.is_empty() {
        println!();
        println!(
            "  Errors (showing {} of {}):",
            results.errors.len().min(ERROR_DISPLAY_LIMIT),
            results.errors.len()
        );
        for entry in results.errors.iter().take(ERROR_DISPLAY_LIMIT) {
            let source_id = entry.source_id.as_deref().unwrap_or("-");
            println!(
                "    [{}] {} {}: {}",
                entry.stage, entry.object, source_id, entry.message
            );
        }
    }
    println!();
}
