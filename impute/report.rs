//! # Presentation
//!
//! Renders the plain data produced by the diagnostics, comparison, forest and
//! QQ helpers as text for the terminal, and writes it as CSV for external
//! plotting. Nothing in here computes statistics.

use crate::censor::CensoredSplit;
use crate::compare::ComparisonTable;
use crate::diagnostics::SummaryTable;
use crate::forest::ForestData;
use crate::qq::QqData;
use crate::simulate::ObservationTable;
use csv::WriterBuilder;
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write CSV output: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to write report file: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimum height of a text QQ plot.
const MIN_PLOT_ROWS: usize = 5;

// ========================================================================================
//                                     Text tables
// ========================================================================================

pub fn render_summary(title: &str, table: &SummaryTable) -> String {
    let (low_label, high_label) = table.hdi_labels();
    let name_width = table
        .rows
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    let _ = writeln!(
        out,
        "{:<name_width$} {:>9} {:>9} {:>9} {:>9} {:>9} {:>8} {:>8} {:>6} {:>9}",
        "", "mean", "sd", low_label, high_label, "mcse_mean", "ess_bulk", "ess_tail", "r_hat", "mode"
    );
    for r in &table.rows {
        let _ = writeln!(
            out,
            "{:<name_width$} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>8.0} {:>8.0} {:>6.2} {:>9.3}",
            r.name, r.mean, r.sd, r.hdi_low, r.hdi_high, r.mcse_mean, r.ess_bulk, r.ess_tail, r.r_hat, r.mode
        );
    }
    out
}

pub fn render_comparison(table: &ComparisonTable) -> String {
    let name_width = table
        .rows
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max(5);
    let mut out = String::new();
    let _ = writeln!(out, "Model comparison (WAIC, log scale)");
    let _ = writeln!(
        out,
        "{:<7} {:<name_width$} {:>4} {:>10} {:>8} {:>10} {:>7} {:>8} {:>8} {:>7}",
        "kind", "model", "rank", "elpd_waic", "p_waic", "elpd_diff", "weight", "se", "dse", "warning"
    );
    for r in &table.rows {
        let kind = r.kind.map_or("-", |k| k.label());
        let _ = writeln!(
            out,
            "{:<7} {:<name_width$} {:>4} {:>10.2} {:>8.2} {:>10.2} {:>7.3} {:>8.2} {:>8.2} {:>7}",
            kind, r.name, r.rank, r.elpd_waic, r.p_waic, r.elpd_diff, r.weight, r.se, r.dse, r.warning
        );
    }
    out
}

// ========================================================================================
//                                      Text plots
// ========================================================================================

/// Maps `x` in `[lo, hi]` onto `0..cells`.
fn cell(x: f64, lo: f64, hi: f64, cells: usize) -> Option<usize> {
    if !x.is_finite() || cells == 0 {
        return None;
    }
    let span = if hi > lo { hi - lo } else { 1.0 };
    let pos = ((x - lo) / span * (cells - 1) as f64).round();
    Some(pos.clamp(0.0, (cells - 1) as f64) as usize)
}

/// One line per term: `-` spans the outer HDI, `=` the inner HDI, `o` marks the
/// mean and `|` the reference line.
pub fn render_forest(title: &str, data: &ForestData, width: usize) -> String {
    let width = width.max(10);
    let (lo, hi) = data.extent();
    let label_width = data.rows.iter().map(|r| r.term.len()).max().unwrap_or(0);
    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    for row in &data.rows {
        let mut line = vec![' '; width];
        if let Some(c) = cell(data.reference, lo, hi, width) {
            line[c] = '|';
        }
        let mut fill = |a: f64, b: f64, ch: char| {
            if let (Some(i), Some(j)) = (cell(a, lo, hi, width), cell(b, lo, hi, width)) {
                for slot in &mut line[i..=j] {
                    *slot = ch;
                }
            }
        };
        fill(row.outer_low, row.outer_high, '-');
        fill(row.inner_low, row.inner_high, '=');
        if let Some(c) = cell(row.mean, lo, hi, width) {
            line[c] = 'o';
        }
        let _ = writeln!(
            out,
            "{:>label_width$} {}  {:.3} [{:.3}, {:.3}]",
            row.term,
            line.iter().collect::<String>(),
            row.mean,
            row.outer_low,
            row.outer_high
        );
    }
    let half = width / 2;
    let _ = writeln!(
        out,
        "{:>label_width$} {:<half$.3}{:>rest$.3}",
        "",
        lo,
        hi,
        rest = width - half
    );
    let _ = writeln!(
        out,
        "{:>label_width$} | {} at {:.3}",
        "", data.reference_label, data.reference
    );
    out
}

/// Scatter of predicted (x) against observed (y) quantiles with the diagonal
/// drawn as `.` and the quantile pairs as `*`.
pub fn render_qq(title: &str, data: &QqData, width: usize) -> String {
    let width = width.max(10);
    let height = (width / 3).max(MIN_PLOT_ROWS);
    let ((lo, _), (hi, _)) = data.reference;
    let mut grid = vec![vec![' '; width]; height];
    for c in 0..width {
        let x = lo + (hi - lo) * c as f64 / (width - 1) as f64;
        if let Some(r) = cell(x, lo, hi, height) {
            grid[height - 1 - r][c] = '.';
        }
    }
    for p in &data.points {
        if let (Some(c), Some(r)) = (cell(p.predicted, lo, hi, width), cell(p.observed, lo, hi, height)) {
            grid[height - 1 - r][c] = '*';
        }
    }
    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{hi:>9.3} +");
    for row in grid {
        let _ = writeln!(out, "{:>9} |{}", "", row.into_iter().collect::<String>());
    }
    let _ = writeln!(out, "{lo:>9.3} +{}", "-".repeat(width));
    let _ = writeln!(
        out,
        "{:>9}  predicted quantiles {lo:.3} .. {hi:.3} (x) vs observed (y)",
        ""
    );
    out
}

// ========================================================================================
//                                      CSV output
// ========================================================================================

fn format_value(x: f64) -> String {
    format!("{x:.6}")
}

pub fn write_summary_csv(path: &Path, table: &SummaryTable) -> Result<(), ReportError> {
    let (low_label, high_label) = table.hdi_labels();
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
    wtr.write_record([
        "name", "mean", "sd", low_label.as_str(), high_label.as_str(), "mcse_mean", "ess_bulk", "ess_tail",
        "r_hat", "mode",
    ])?;
    for r in &table.rows {
        let mut record = vec![r.name.clone()];
        record.extend(
            [
                r.mean, r.sd, r.hdi_low, r.hdi_high, r.mcse_mean, r.ess_bulk, r.ess_tail, r.r_hat,
                r.mode,
            ]
            .into_iter()
            .map(format_value),
        );
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_comparison_csv(path: &Path, table: &ComparisonTable) -> Result<(), ReportError> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in &table.rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_forest_csv(path: &Path, data: &ForestData) -> Result<(), ReportError> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in &data.rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_qq_csv(path: &Path, data: &QqData) -> Result<(), ReportError> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
    for point in &data.points {
        wtr.serialize(point)?;
    }
    wtr.flush()?;
    Ok(())
}

/// The simulated table with a `censored` flag per row.
pub fn write_observations_csv(
    path: &Path,
    table: &ObservationTable,
    split: &CensoredSplit,
) -> Result<(), ReportError> {
    let mut censored = vec![false; table.len()];
    for &i in split.censored() {
        censored[i] = true;
    }
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
    wtr.write_record(["row", "x1", "x2", "noise", "y", "censored"])?;
    for (i, flag) in censored.iter().enumerate() {
        wtr.write_record([
            i.to_string(),
            format_value(table.x1()[i]),
            format_value(table.x2()[i]),
            format_value(table.noise()[i]),
            format_value(table.y()[i]),
            flag.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
