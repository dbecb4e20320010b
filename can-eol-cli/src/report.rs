//! Test summary output

use anyhow::{Context, Result};
use can_eol_core::{PipelineStats, TestSummary};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Render the summary as a plain-text table
pub fn render_text(summary: &TestSummary, stats: &PipelineStats) -> String {
    let mut out = String::new();
    let width = summary
        .results
        .iter()
        .map(|r| r.rule_name.len())
        .max()
        .unwrap_or(0)
        .max("Rule".len());

    let _ = writeln!(
        out,
        "Frames: {}  Signals: {}  Unknown IDs: {}",
        stats.frames(),
        stats.signals(),
        stats.unknown_frames()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<width$}  Result  Reason", "Rule", width = width);
    let _ = writeln!(out, "{}", "-".repeat(width + 16));

    for result in &summary.results {
        let verdict = if result.passed { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "{:<width$}  {:<6}  {}",
            result.rule_name,
            verdict,
            result.reason,
            width = width
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Total: {}  Passed: {}  Failed: {}",
        summary.total, summary.passed, summary.failed
    );
    out
}

/// Write the summary as pretty JSON
pub fn write_json(summary: &TestSummary, path: &Path) -> Result<()> {
    let json = summary.to_json().context("Failed to serialize summary")?;
    fs::write(path, json).with_context(|| format!("Failed to write summary: {:?}", path))?;
    log::info!("Summary written to {:?}", path);
    Ok(())
}
