//! Result aggregation and report rendering.
//!
//! Rendering is a pure function over an immutable result slice plus a
//! [`RunMetadata`] captured once at run end — rendering the same inputs
//! twice produces byte-identical output. Groups with zero successful
//! samples render `N/A` statistics, never zeros and never a panic.

use crate::driver::MultiTurnRun;
use crate::error::{ProbeError, Result};
use crate::request::{Mode, SampleResult, truncate_chars};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// Grouping key for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// One group per model.
    Model,
    /// One group per (model, mode) pair.
    ModelMode,
    /// One group per prompt label.
    Prompt,
}

impl GroupBy {
    fn key(self, result: &SampleResult) -> String {
        match self {
            GroupBy::Model => result.model.clone(),
            GroupBy::ModelMode => format!("{} ({})", result.model, result.mode),
            GroupBy::Prompt => result.prompt_label.clone(),
        }
    }

    fn header(self) -> &'static str {
        match self {
            GroupBy::Model => "Model",
            GroupBy::ModelMode => "Model (mode)",
            GroupBy::Prompt => "Prompt",
        }
    }
}

/// Aggregated statistics for one group of samples.
#[derive(Debug, Clone)]
pub struct GroupStats {
    /// The group key.
    pub key: String,
    /// Samples in the group, failures included.
    pub total: usize,
    /// Successful samples.
    pub successes: usize,
    /// Mean TTFT over successful samples that measured one.
    pub mean_ttft: Option<Duration>,
    /// Minimum TTFT.
    pub min_ttft: Option<Duration>,
    /// Maximum TTFT.
    pub max_ttft: Option<Duration>,
    /// Mean total time over successful samples.
    pub mean_total: Option<Duration>,
    /// Mean tokens per second where computable.
    pub mean_tps: Option<f64>,
}

impl GroupStats {
    /// Success ratio as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total > 0 {
            (self.successes as f64 / self.total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Aggregate results per group, preserving first-seen key order so the
/// rendered tables follow the run's iteration order.
pub fn aggregate(results: &[SampleResult], group_by: GroupBy) -> Vec<GroupStats> {
    let mut keys: Vec<String> = Vec::new();
    for result in results {
        let key = group_by.key(result);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    keys.into_iter()
        .map(|key| {
            let group: Vec<&SampleResult> = results
                .iter()
                .filter(|r| group_by.key(r) == key)
                .collect();

            let ttfts: Vec<f64> = group
                .iter()
                .filter(|r| r.success)
                .filter_map(|r| r.ttft)
                .map(|d| d.as_secs_f64())
                .collect();
            let totals: Vec<f64> = group
                .iter()
                .filter(|r| r.success)
                .filter_map(|r| r.total_time)
                .map(|d| d.as_secs_f64())
                .collect();
            let tps: Vec<f64> = group.iter().filter_map(|r| r.tokens_per_second()).collect();

            GroupStats {
                key,
                total: group.len(),
                successes: group.iter().filter(|r| r.success).count(),
                mean_ttft: mean(&ttfts).map(Duration::from_secs_f64),
                min_ttft: ttfts
                    .iter()
                    .copied()
                    .fold(None, |acc: Option<f64>, x| {
                        Some(acc.map_or(x, |a| a.min(x)))
                    })
                    .map(Duration::from_secs_f64),
                max_ttft: ttfts
                    .iter()
                    .copied()
                    .fold(None, |acc: Option<f64>, x| {
                        Some(acc.map_or(x, |a| a.max(x)))
                    })
                    .map(Duration::from_secs_f64),
                mean_total: mean(&totals).map(Duration::from_secs_f64),
                mean_tps: mean(&tps),
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Metadata for the report header, captured once per run.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    /// Models that were probed.
    pub models: Vec<String>,
    /// Modes that were measured.
    pub modes: Vec<Mode>,
    /// Rounds per (model, prompt) pair.
    pub rounds: u32,
    /// When the run finished.
    pub generated_at: DateTime<Local>,
}

/// Render the full markdown report.
pub fn render(
    meta: &RunMetadata,
    single: &[SampleResult],
    multi: Option<&MultiTurnRun>,
) -> String {
    let mut out = String::new();

    let models = meta.models.join(", ");
    let modes = meta
        .modes
        .iter()
        .map(Mode::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let _ = writeln!(out, "# Gemini latency report");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "**Generated**: {}",
        meta.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "**Models**: {models}");
    let _ = writeln!(out, "**Modes**: {modes}");
    let _ = writeln!(out, "**Rounds**: {}", meta.rounds);
    let _ = writeln!(out);

    if !single.is_empty() {
        let _ = writeln!(out, "## 1. Summary by model");
        let _ = writeln!(out);
        let group_by = if meta.modes.len() > 1 {
            GroupBy::ModelMode
        } else {
            GroupBy::Model
        };
        out.push_str(&summary_table(single, group_by));
        let _ = writeln!(out);

        let _ = writeln!(out, "## 2. Results by prompt");
        let _ = writeln!(out);
        out.push_str(&summary_table(single, GroupBy::Prompt));
        let _ = writeln!(out);
    }

    if let Some(run) = multi {
        let _ = writeln!(out, "## 3. Multi-turn conversation");
        let _ = writeln!(out);
        out.push_str(&turns_table(&run.results));
        let _ = writeln!(out);

        let stats = aggregate(&run.results, GroupBy::Model);
        if let Some(stats) = stats.first() {
            let _ = writeln!(
                out,
                "**Mean TTFT**: {} | **Mean total**: {} | **Success**: {:.0}%",
                fmt_duration(stats.mean_ttft),
                fmt_duration(stats.mean_total),
                stats.success_rate()
            );
            let _ = writeln!(out);
        }
    }

    let _ = writeln!(out, "## Metric notes");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- **TTFT**: elapsed time from request start to the first generated text fragment."
    );
    let _ = writeln!(
        out,
        "- **Total**: elapsed time from request start to the end of the response."
    );
    let _ = writeln!(
        out,
        "- **TPS**: output tokens per second over the whole call. Streaming token counts \
         are whitespace estimates."
    );
    let _ = writeln!(
        out,
        "- Blocking-mode TTFT equals total time: no partial-arrival signal exists there."
    );

    out
}

/// Render one aggregated summary table.
pub fn summary_table(results: &[SampleResult], group_by: GroupBy) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "| {} | Samples | Mean TTFT | Min TTFT | Max TTFT | Mean total | Mean TPS | Success |",
        group_by.header()
    );
    let _ = writeln!(
        out,
        "|---|---|---|---|---|---|---|---|"
    );

    for stats in aggregate(results, group_by) {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {:.0}% |",
            stats.key,
            stats.total,
            fmt_duration(stats.mean_ttft),
            fmt_duration(stats.min_ttft),
            fmt_duration(stats.max_ttft),
            fmt_duration(stats.mean_total),
            fmt_tps(stats.mean_tps),
            stats.success_rate()
        );
    }

    out
}

/// Render the per-turn table of a multi-turn run.
pub fn turns_table(results: &[SampleResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "| Turn | Prompt | TTFT | Total | Status |");
    let _ = writeln!(out, "|---|---|---|---|---|");

    for result in results {
        let status = if result.success {
            "ok".to_string()
        } else {
            result
                .error
                .as_deref()
                .map(|e| truncate_chars(e, 60))
                .unwrap_or_else(|| "failed".to_string())
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            result.round,
            result.prompt_label,
            fmt_duration(result.ttft),
            fmt_duration(result.total_time),
            status
        );
    }

    out
}

fn fmt_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format!("{:.3}s", d.as_secs_f64()),
        None => "N/A".to_string(),
    }
}

fn fmt_tps(tps: Option<f64>) -> String {
    match tps {
        Some(v) => format!("{v:.1}"),
        None => "N/A".to_string(),
    }
}

/// Serialize the raw result records as pretty JSON.
pub fn to_json(results: &[SampleResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

/// Write a report to disk.
pub fn write_report(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| ProbeError::ReportWrite {
        path: path.to_path_buf(),
        source: e,
    })
}
