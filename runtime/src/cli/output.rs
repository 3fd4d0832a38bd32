//! Output helpers honoring the global `--json` / `--quiet` flags.

use crate::model::ScanSummary;
use serde::Serialize;

/// Whether `--json` was passed.
pub fn is_json() -> bool {
    std::env::var("SNIPE_JSON").is_ok_and(|v| v == "1")
}

/// Whether `--quiet` was passed.
pub fn is_quiet() -> bool {
    std::env::var("SNIPE_QUIET").is_ok_and(|v| v == "1")
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}

/// Print a scan summary in the selected format.
pub fn print_summary(title: &str, summary: &ScanSummary) {
    if is_json() {
        print_json(summary);
        return;
    }
    if is_quiet() {
        return;
    }
    println!("{title}");
    println!("  filters processed: {}", summary.filters_processed);
    println!("  items found:       {}", summary.items_found);
    println!("  alerts created:    {}", summary.alerts_created);
    println!("  errors:            {}", summary.errors);
    if summary.snipes_attempted > 0 {
        println!("  snipes attempted:  {}", summary.snipes_attempted);
    }
}
