//! Run summaries as text, JSON or CSV
//!
//! The CSV layout matches the columns the plotting scripts read, one row per
//! (strategy, worker, count) run, so repeated invocations with `--no-header`
//! build up a sweep. The `Program` column names the process strategy
//! `program_a` and the thread strategy `program_b`.

use std::fmt::Write as _;

use crate::cli::OutputFormat;
use crate::dispatch::RunSummary;

/// Header row of the CSV format
pub const CSV_HEADER: &str =
    "Program,WorkerType,NumWorkers,CPU%,Mem(KB),Time(s),context_switches_per_sec,page_faults_total";

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One CSV data row for `summary`
pub fn csv_row(summary: &RunSummary) -> String {
    let usage = &summary.usage;
    [
        escape_field(summary.strategy.program_name()),
        escape_field(summary.kind.as_str()),
        summary.units.to_string(),
        format!("{:.2}", usage.cpu_percent),
        usage.max_rss_kb.to_string(),
        format!("{:.3}", usage.wall_secs),
        format!("{:.2}", usage.context_switches_per_sec),
        usage.page_faults_total.to_string(),
    ]
    .join(",")
}

pub fn render_csv(summary: &RunSummary, include_header: bool) -> String {
    let mut output = String::new();
    if include_header {
        output.push_str(CSV_HEADER);
        output.push('\n');
    }
    output.push_str(&csv_row(summary));
    output.push('\n');
    output
}

pub fn render_json(summary: &RunSummary) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summary)
}

pub fn render_text(summary: &RunSummary) -> String {
    let usage = &summary.usage;
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(
        out,
        "{} {} x {} worker ({} iterations each)",
        summary.units,
        summary.strategy.plural(),
        summary.kind,
        summary.loop_count
    );
    let _ = writeln!(out, "  completed: {}/{}", summary.completed, summary.units);
    let _ = writeln!(out, "  failed:    {}", summary.failed);
    for failure in &summary.failures {
        let _ = writeln!(out, "    unit {}: {}", failure.index, failure.reason);
    }
    let _ = writeln!(
        out,
        "  wall time: {:.3}s  cpu: {:.1}%  max rss: {} KB",
        usage.wall_secs, usage.cpu_percent, usage.max_rss_kb
    );
    let _ = writeln!(
        out,
        "  context switches: {} voluntary, {} involuntary ({:.1}/s)  page faults: {}",
        usage.voluntary_switches,
        usage.involuntary_switches,
        usage.context_switches_per_sec,
        usage.page_faults_total
    );
    let _ = writeln!(out, "All {} {} completed", summary.units, summary.strategy.plural());
    out
}

/// Render `summary` in `format`
pub fn render(
    summary: &RunSummary,
    format: OutputFormat,
    include_header: bool,
) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Text => render_text(summary),
        OutputFormat::Json => render_json(summary)?,
        OutputFormat::Csv => render_csv(summary, include_header),
    })
}
