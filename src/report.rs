//! Run report and checksum file in the output directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::build::RunSummary;

const REPORT_FILENAME: &str = "run-report.json";
const CHECKSUMS_FILENAME: &str = "SHA256SUMS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub tool_version: String,
    pub track: String,
    pub started_at_utc: String,
    pub finished_at_utc: String,
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(summary: RunSummary, track: &str, started: OffsetDateTime) -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            track: track.to_string(),
            started_at_utc: utc_timestamp(started),
            finished_at_utc: utc_timestamp(OffsetDateTime::now_utc()),
            summary,
        }
    }
}

pub fn utc_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub fn report_path(output_dir: &Path) -> PathBuf {
    output_dir.join(REPORT_FILENAME)
}

pub fn checksums_path(output_dir: &Path) -> PathBuf {
    output_dir.join(CHECKSUMS_FILENAME)
}

/// Write `run-report.json` and update `SHA256SUMS` with the run's outputs.
pub fn write(output_dir: &Path, report: &RunReport) -> Result<()> {
    let path = report_path(output_dir);
    write_json_atomic(&path, report)
        .with_context(|| format!("writing run report '{}'", path.display()))?;
    update_checksums(output_dir, &report.summary)
}

/// The last run report in `output_dir`, if one was written.
pub fn load(output_dir: &Path) -> Result<Option<RunReport>> {
    let path = report_path(output_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&path).with_context(|| format!("reading run report '{}'", path.display()))?;
    let report = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing run report '{}'", path.display()))?;
    Ok(Some(report))
}

/// Lines of earlier runs are kept unless this run produced the same file.
fn update_checksums(output_dir: &Path, summary: &RunSummary) -> Result<()> {
    let path = checksums_path(output_dir);
    let mut sums: BTreeMap<String, String> = BTreeMap::new();
    if path.is_file() {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading checksums '{}'", path.display()))?;
        for line in text.lines() {
            if let Some((digest, name)) = line.split_once("  ") {
                if output_dir.join(name).is_file() {
                    sums.insert(name.to_string(), digest.to_string());
                }
            }
        }
    }
    for output in summary.outputs() {
        sums.insert(output.file_name(), output.sha256.clone());
    }

    let mut text = String::new();
    for (name, digest) in &sums {
        text.push_str(&format!("{digest}  {name}\n"));
    }
    write_atomic(&path, text.as_bytes())
        .with_context(|| format!("writing checksums '{}'", path.display()))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_vec_pretty(value).with_context(|| "serializing run report")?;
    write_atomic(path, &payload)
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildResult, BuildStatus, BuildStep, CollectedOutput, FailurePolicy};
    use crate::target::PackageFormat;
    use time::macros::datetime;

    fn summary(output_dir: &Path) -> RunSummary {
        RunSummary {
            target: "wheel-x86_64".to_string(),
            format: PackageFormat::Wheel,
            environment: "host".to_string(),
            policy: FailurePolicy::Continue,
            results: vec![
                BuildResult {
                    name: "six".to_string(),
                    version: "1.16.0".to_string(),
                    status: BuildStatus::Succeeded,
                    outputs: vec![CollectedOutput {
                        path: output_dir.join("six-1.16.0-py3-none-any.whl"),
                        sha256: "ab".repeat(32),
                        size_bytes: 12,
                    }],
                    failed_step: None,
                    message: None,
                    log: None,
                    duration_ms: 5,
                    tool_output: "ignored".to_string(),
                },
                BuildResult {
                    name: "yara".to_string(),
                    version: "4.5.0".to_string(),
                    status: BuildStatus::Failed,
                    outputs: Vec::new(),
                    failed_step: Some(BuildStep::Extract),
                    message: Some("no source archive".to_string()),
                    log: None,
                    duration_ms: 1,
                    tool_output: String::new(),
                },
            ],
            duration_ms: 6,
        }
    }

    #[test]
    fn report_round_trips_through_the_output_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(load(temp.path()).unwrap().is_none());

        let report = RunReport::new(
            summary(temp.path()),
            "stable",
            datetime!(2024-03-01 12:00:00 UTC),
        );
        write(temp.path(), &report).unwrap();

        let loaded = load(temp.path()).unwrap().unwrap();
        assert_eq!(loaded.started_at_utc, "2024-03-01T12:00:00Z");
        assert_eq!(loaded.summary.failed(), 1);
        assert_eq!(loaded.summary.results[1].failed_step, Some(BuildStep::Extract));
        assert!(loaded.summary.results[0].tool_output.is_empty());

        let json = fs::read_to_string(report_path(temp.path())).unwrap();
        assert!(json.contains("\"status\": \"failed\""));
        assert!(!json.contains("ignored"));
    }

    #[test]
    fn checksums_keep_earlier_outputs_that_still_exist() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::write(temp.path().join("old-1.0-py3-none-any.whl"), "x").unwrap();
        fs::write(
            checksums_path(temp.path()),
            format!(
                "{}  old-1.0-py3-none-any.whl\n{}  gone-1.0-py3-none-any.whl\n",
                "cd".repeat(32),
                "ef".repeat(32)
            ),
        )
        .unwrap();

        let report = RunReport::new(summary(temp.path()), "stable", OffsetDateTime::now_utc());
        write(temp.path(), &report).unwrap();

        let sums = fs::read_to_string(checksums_path(temp.path())).unwrap();
        assert_eq!(
            sums,
            format!(
                "{}  old-1.0-py3-none-any.whl\n{}  six-1.16.0-py3-none-any.whl\n",
                "cd".repeat(32),
                "ab".repeat(32)
            )
        );
    }
}
