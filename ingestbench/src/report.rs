//! Pretty-print run summaries and speedup tables, CSV and JSON export.

use crate::sweep::{RunOutcome, SweepReport};
use crate::{parse_log_name, BenchError, BenchResult};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use ingestbench_harness::{
    speedup_table, summarize_log, EnvironmentInfo, RunRate, RunSummary, SpeedupRow,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One summarized run, whether it came from a sweep or from a log on disk.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub name: String,
    pub summary: RunSummary,
    pub error: Option<String>,
    pub db_size_bytes: Option<u64>,
}

impl SummaryRow {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            name: outcome.canonical_name.clone(),
            summary: outcome.summary.clone().unwrap_or_default(),
            error: outcome.error.clone(),
            db_size_bytes: outcome.db_size_bytes,
        }
    }
}

/// Everything written by `--export`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportBundle {
    pub environment: EnvironmentInfo,
    pub runs: Vec<SummaryRow>,
    pub speedups: Vec<SpeedupRow>,
}

impl ExportBundle {
    pub fn from_sweep(report: &SweepReport) -> Self {
        Self {
            environment: report.environment.clone(),
            runs: report.outcomes.iter().map(SummaryRow::from_outcome).collect(),
            speedups: report.speedups(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Reading logs back
// ────────────────────────────────────────────────────────────────────────────────

/// Summarize every `*.jsonl` log in `dir`, sorted by file name, plus the
/// speedup table of the logs whose names carry a run configuration. Logs
/// with different workload prefixes are never compared with each other.
pub fn summarize_dir(dir: &Path) -> BenchResult<(Vec<SummaryRow>, Vec<SpeedupRow>)> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| BenchError::Config(format!("read {}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    paths.sort();

    let mut rows = Vec::with_capacity(paths.len());
    let mut rates = Vec::new();
    for path in paths {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let summary = match summarize_log(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable log");
                continue;
            }
        };
        if let Some(parsed) = parse_log_name(&name) {
            rates.push(RunRate {
                workload: parsed.workload,
                backend: parsed.backend.to_string(),
                memory_limit: parsed.memory_limit.to_string(),
                threads: parsed.threads,
                average_rate: summary.average_rate,
            });
        }
        rows.push(SummaryRow {
            name,
            summary,
            error: None,
            db_size_bytes: None,
        });
    }
    Ok((rows, speedup_table(&rates)))
}

// ────────────────────────────────────────────────────────────────────────────────
// Terminal output
// ────────────────────────────────────────────────────────────────────────────────

pub fn print_banner(title: &str, env: &EnvironmentInfo) {
    let line = "═".repeat(62);
    println!("\n{}", format!("╔{}╗", line).bold().blue());
    println!("{}", format!("║ {:<60} ║", title).bold().blue());
    println!("{}", format!("╚{}╝", line).bold().blue());
    println!(
        "  OS: {} {}  CPU: {} ({} cores)  RAM: {}",
        env.os,
        env.os_version,
        env.cpu_model,
        env.logical_cores,
        format_bytes(env.ram_bytes)
    );
    if let Some(limit) = env.cgroup_memory_limit_bytes {
        println!("  cgroup memory limit: {}", format_bytes(limit));
    }
    for w in &env.warnings {
        println!("  {} {}", "WARN".yellow(), w);
    }
}

/// One row per run; the fastest successful run is starred.
pub fn print_run_table(rows: &[SummaryRow]) {
    if rows.is_empty() {
        println!("  {}", "no runs".dimmed());
        return;
    }

    println!("\n{}", "━━━ Runs ━━━".bold().cyan());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        "Run",
        "Units",
        "Failed",
        "Count",
        "Elapsed (s)",
        "Avg rate",
        "p50 (s)",
        "p99 (s)",
        "CPU %",
        "DB Size",
    ]);

    let best_rate = rows
        .iter()
        .filter(|r| r.error.is_none())
        .map(|r| r.summary.average_rate)
        .fold(0.0f64, f64::max);

    for r in rows {
        let s = &r.summary;
        let is_best = r.error.is_none() && s.average_rate > 0.0 && (s.average_rate - best_rate).abs() < 0.01;
        let name_cell = match (&r.error, is_best) {
            (Some(_), _) => Cell::new(format!("✗ {}", r.name)).fg(Color::Red),
            (None, true) => Cell::new(format!("★ {}", r.name)).fg(Color::Green),
            (None, false) => Cell::new(&r.name),
        };
        let rate_cell = if is_best {
            Cell::new(format_throughput(s.average_rate)).fg(Color::Green)
        } else {
            Cell::new(format_throughput(s.average_rate))
        };
        let failed_cell = if s.units_failed > 0 {
            Cell::new(s.units_failed).fg(Color::Yellow)
        } else {
            Cell::new(s.units_failed)
        };

        table.add_row(vec![
            name_cell,
            Cell::new(s.units_total),
            failed_cell,
            Cell::new(format_count(s.total_count)),
            Cell::new(format!("{:.2}", s.total_elapsed)),
            rate_cell,
            Cell::new(format!("{:.4}", s.latency.p50_secs)),
            Cell::new(format!("{:.4}", s.latency.p99_secs)),
            Cell::new(format_cpu(s.mean_cpu_percent)),
            Cell::new(r.db_size_bytes.map(format_bytes).unwrap_or_else(|| "-".to_string())),
        ]);
    }

    println!("{table}");

    for r in rows {
        if let Some(err) = &r.error {
            println!("  {} {}", r.name.dimmed(), err.red());
        }
        if r.summary.malformed_lines > 0 {
            println!(
                "  {} {} malformed log lines skipped",
                r.name.dimmed(),
                r.summary.malformed_lines
            );
        }
    }
}

/// Per-tag breakdown of one run.
pub fn print_type_breakdown(row: &SummaryRow) {
    if row.summary.by_type.len() < 2 {
        return;
    }
    println!("\n{}", format!("── {} by unit type ──", row.name).bold().yellow());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec!["Type", "Units", "Failures", "Count", "Total (s)", "Mean (s)"]);
    for (tag, t) in &row.summary.by_type {
        table.add_row(vec![
            Cell::new(tag),
            Cell::new(t.units),
            Cell::new(t.failures),
            Cell::new(format_count(t.total_count)),
            Cell::new(format!("{:.4}", t.total_elapsed)),
            Cell::new(format!("{:.4}", t.mean_elapsed)),
        ]);
    }
    println!("{table}");
}

pub fn print_speedup_table(rows: &[SpeedupRow]) {
    if rows.is_empty() {
        return;
    }
    println!("\n{}", "── Thread scaling ──".bold().yellow());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec!["Workload", "Backend", "Memory", "Threads", "Avg rate", "Speedup"]);
    for r in rows {
        let speedup = Cell::new(format!("{:.2}x", r.speedup));
        let speedup = if r.speedup > 1.0 {
            speedup.fg(Color::Green)
        } else if r.speedup < 1.0 {
            speedup.fg(Color::Red)
        } else {
            speedup
        };
        table.add_row(vec![
            Cell::new(&r.workload),
            Cell::new(&r.backend),
            Cell::new(&r.memory_limit),
            Cell::new(r.threads),
            Cell::new(format_throughput(r.average_rate)),
            speedup,
        ]);
    }
    println!("{table}");
}

// ────────────────────────────────────────────────────────────────────────────────
// CSV export
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_csv(rows: &[SummaryRow], path: &Path) -> std::io::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "run",
        "status",
        "units_total",
        "units_failed",
        "total_count",
        "total_elapsed_secs",
        "average_rate",
        "p50_secs",
        "p95_secs",
        "p99_secs",
        "max_secs",
        "mean_cpu_percent",
        "db_size_bytes",
    ])?;

    for r in rows {
        let s = &r.summary;
        wtr.write_record([
            r.name.as_str(),
            if r.error.is_some() { "ERROR" } else { "OK" },
            &s.units_total.to_string(),
            &s.units_failed.to_string(),
            &s.total_count.to_string(),
            &format!("{:.4}", s.total_elapsed),
            &format!("{:.2}", s.average_rate),
            &format!("{:.4}", s.latency.p50_secs),
            &format!("{:.4}", s.latency.p95_secs),
            &format!("{:.4}", s.latency.p99_secs),
            &format!("{:.4}", s.latency.max_secs),
            &format!("{:.2}", s.mean_cpu_percent),
            &r.db_size_bytes.map(|b| b.to_string()).unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    println!("  CSV exported to {}", path.display());
    Ok(())
}

pub fn export_speedup_csv(rows: &[SpeedupRow], path: &Path) -> std::io::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    println!("  CSV exported to {}", path.display());
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// JSON export
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_json(bundle: &ExportBundle, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(bundle).map_err(std::io::Error::other)?;
    std::fs::write(path, json)?;
    println!("  JSON exported to {}", path.display());
    Ok(())
}

/// Write `runs.csv`, `speedup.csv` and `summary.json` into `dir`.
pub fn export_all(bundle: &ExportBundle, dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    export_csv(&bundle.runs, &dir.join("runs.csv"))?;
    export_speedup_csv(&bundle.speedups, &dir.join("speedup.csv"))?;
    export_json(bundle, &dir.join("summary.json"))
}

// ────────────────────────────────────────────────────────────────────────────────
// Formatting helpers
// ────────────────────────────────────────────────────────────────────────────────

fn format_throughput(t: f64) -> String {
    if t >= 1_000_000.0 {
        format!("{:.2}M/s", t / 1_000_000.0)
    } else if t >= 1_000.0 {
        format!("{:.1}K/s", t / 1_000.0)
    } else {
        format!("{:.0}/s", t)
    }
}

fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}

fn format_cpu(pct: f64) -> String {
    if pct < 0.0 {
        "n/a".to_string()
    } else {
        format!("{:.1}", pct)
    }
}

fn format_bytes(b: u64) -> String {
    if b >= 1_073_741_824 {
        format!("{:.1} GB", b as f64 / 1_073_741_824.0)
    } else if b >= 1_048_576 {
        format!("{:.1} MB", b as f64 / 1_048_576.0)
    } else if b >= 1_024 {
        format!("{:.1} KB", b as f64 / 1_024.0)
    } else {
        format!("{} B", b)
    }
}
