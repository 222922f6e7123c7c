//! Error taxonomy.
//!
//! Manifest, plan and provisioning errors abort a run before (or instead of)
//! building anything. Template, render and tool errors belong to a single
//! entry and are handled by the configured [`crate::build::FailurePolicy`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading or querying the dependency manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("reading manifest '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing manifest '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid manifest '{path}': {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("undefined preset '{0}'")]
    UnknownPreset(String),

    #[error("undefined project(s): {}", .0.join(", "))]
    UnknownProjects(Vec<String>),
}

/// Errors raised while parsing or loading a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{template}': invalid placeholder at byte {position}: {message}")]
    Syntax {
        template: String,
        position: usize,
        message: String,
    },

    #[error("reading template '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while rendering a template for a dependency.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template '{template}' for '{entry}' has no value for: {}", .missing.join(", "))]
    MissingField {
        template: String,
        entry: String,
        missing: Vec<String>,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Errors raised by an external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("spawning '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {}", exit_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("'{command}' timed out after {}s", seconds(.after))]
    TimedOut {
        command: String,
        after: Duration,
        output: String,
    },
}

impl ToolError {
    /// Output captured before the tool failed, if any.
    pub fn output(&self) -> &str {
        match self {
            ToolError::Spawn { .. } => "",
            ToolError::Failed { output, .. } | ToolError::TimedOut { output, .. } => output,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

/// Errors that make every build of a target impossible.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("missing required host tools:\n{}", format_missing(.0))]
    MissingTools(Vec<(String, String)>),

    #[error("docker binary not found (set DEP_BUILDER_DOCKER or install docker)")]
    DockerNotFound,

    #[error("building environment image '{image}' failed: {source}")]
    ImageBuild {
        image: String,
        #[source]
        source: ToolError,
    },

    #[error("rendering environment for '{image}': {source}")]
    Render {
        image: String,
        #[source]
        source: RenderError,
    },

    #[error("preparing environment directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn seconds(after: &Duration) -> u64 {
    after.as_secs()
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors fetching a source archive from the package index.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("requesting '{url}': {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{project}' {version} has no tar sdist on '{index}'")]
    NoSdist {
        project: String,
        version: String,
        index: String,
    },

    #[error("checksum mismatch for '{url}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("storing '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors detected while planning a run, before anything is built.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("output filename '{filename}' would be produced by both '{first}' and '{second}'")]
    OutputCollision {
        filename: String,
        first: String,
        second: String,
    },
}
