//! End-of-run report printing

use crate::crawler::RunReport;

/// Prints a finished run's report to stdout
pub fn print_run_report(report: &RunReport) {
    if report.dry_run {
        println!("=== Harvest Dry Run ===\n");
    } else {
        println!("=== Harvest Run ===\n");
    }

    println!("Offsets:");
    println!("  Start: {}", report.start_offset);
    println!("  End: {}", report.end_offset);
    if report.exhausted {
        println!("  Search results exhausted");
    }
    println!();

    println!("Records:");
    println!("  Pages fetched: {}", report.pages_fetched);
    println!("  Examined: {}", report.examined);
    println!("  Unresolved: {}", report.resolution_misses);
    println!("  Fetch failures: {}", report.fetch_failures);
    println!("  Recovered from earlier runs: {}", report.recovered);
    println!();

    if report.dry_run {
        println!(
            "Would publish {} entries; nothing was published or saved",
            report.published
        );
        return;
    }

    match &report.receipt {
        Some(receipt) => {
            println!("Published {} entries:", report.published);
            println!("  New rows: {}", receipt.added);
            println!("  Updated rows: {}", receipt.updated);
            println!("  Dataset size: {}", receipt.total_rows);
            if let Some(commit) = &receipt.commit {
                println!("  Commit: {}", commit);
            }
        }
        None => println!("Nothing to publish"),
    }
}
