//! Builder configuration.
//!
//! Values resolve as defaults < config file < environment variables < CLI
//! flags. The config file is `dep-builder.toml` in the current directory, or
//! `dep-builder/config.toml` in the user config directory; relative paths in
//! it are resolved against the directory holding the file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::build::FailurePolicy;
use crate::environment::EnvironmentKind;
use crate::process::Tool;

pub const CONFIG_FILE_NAME: &str = "dep-builder.toml";

pub const ENV_TRACK: &str = "DEP_BUILDER_TRACK";
pub const ENV_MAINTAINER: &str = "DEP_BUILDER_MAINTAINER";
pub const ENV_SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org";

pub const DEFAULT_MAINTAINER: &str =
    "Log2Timeline maintainers <log2timeline-maintainers@googlegroups.com>";

/// Channel of dependency versions, e.g. `stable` or `dev`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Track(String);

impl Track {
    pub fn new(name: &str) -> Result<Self, String> {
        let name = name.trim();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_'))
        {
            return Err(format!(
                "invalid track '{name}': expected lowercase letters, digits, '-' or '_'"
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Track {
    fn default() -> Self {
        Self("stable".to_string())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Track {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Track::new(&value)
    }
}

impl From<Track> for String {
    fn from(track: Track) -> Self {
        track.0
    }
}

/// Per-tool path overrides (`[tools]` table).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolPaths {
    pub dpkg_buildpackage: Option<PathBuf>,
    pub dpkg_source: Option<PathBuf>,
    pub rpmbuild: Option<PathBuf>,
    pub python: Option<PathBuf>,
    pub patch: Option<PathBuf>,
    pub make: Option<PathBuf>,
    pub docker: Option<PathBuf>,
}

impl ToolPaths {
    pub fn get(&self, tool: Tool) -> Option<&Path> {
        let path = match tool {
            Tool::DpkgBuildpackage => &self.dpkg_buildpackage,
            Tool::DpkgSource => &self.dpkg_source,
            Tool::Rpmbuild => &self.rpmbuild,
            Tool::Python => &self.python,
            Tool::Patch => &self.patch,
            Tool::Make => &self.make,
            Tool::Docker => &self.docker,
            Tool::Shell => return None,
        };
        path.as_deref()
    }

    fn set(&mut self, tool: Tool, path: PathBuf) {
        let slot = match tool {
            Tool::DpkgBuildpackage => &mut self.dpkg_buildpackage,
            Tool::DpkgSource => &mut self.dpkg_source,
            Tool::Rpmbuild => &mut self.rpmbuild,
            Tool::Python => &mut self.python,
            Tool::Patch => &mut self.patch,
            Tool::Make => &mut self.make,
            Tool::Docker => &mut self.docker,
            Tool::Shell => return,
        };
        *slot = Some(path);
    }
}

/// Fully resolved builder configuration.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub manifest: PathBuf,
    pub sources_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub templates_dir: Option<PathBuf>,
    pub maintainer: String,
    pub track: Track,
    pub policy: FailurePolicy,
    pub jobs: usize,
    pub timeout_secs: Option<u64>,
    pub environment: EnvironmentKind,
    pub tools: ToolPaths,
    /// Fetch missing Python sdists from `index_url`.
    pub download: bool,
    pub index_url: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("dependencies.toml"),
            sources_dir: PathBuf::from("sources"),
            work_dir: PathBuf::from("build"),
            output_dir: PathBuf::from("dist"),
            templates_dir: None,
            maintainer: DEFAULT_MAINTAINER.to_string(),
            track: Track::default(),
            policy: FailurePolicy::Abort,
            jobs: 1,
            timeout_secs: None,
            environment: EnvironmentKind::Host,
            tools: ToolPaths::default(),
            download: false,
            index_url: DEFAULT_INDEX_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuilderConfigToml {
    manifest: Option<String>,
    sources_dir: Option<String>,
    work_dir: Option<String>,
    output_dir: Option<String>,
    templates_dir: Option<String>,
    maintainer: Option<String>,
    track: Option<Track>,
    policy: Option<FailurePolicy>,
    jobs: Option<usize>,
    timeout_secs: Option<u64>,
    environment: Option<EnvironmentKind>,
    download: Option<bool>,
    index_url: Option<String>,
    #[serde(default)]
    tools: ToolPaths,
}

fn resolve_config_path(config_dir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        config_dir.join(candidate)
    }
}

impl BuilderConfig {
    /// Config file used when none is given on the command line.
    pub fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("dep-builder").join("config.toml"))
            .filter(|path| path.is_file())
    }

    /// Defaults overlaid with the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        let parsed: BuilderConfigToml = toml::from_str(&text)
            .with_context(|| format!("parsing config '{}'", path.display()))?;
        let config_dir = path.parent().unwrap_or(Path::new("."));

        let mut config = Self::default();
        if let Some(manifest) = parsed.manifest {
            config.manifest = resolve_config_path(config_dir, &manifest);
        }
        if let Some(sources_dir) = parsed.sources_dir {
            config.sources_dir = resolve_config_path(config_dir, &sources_dir);
        }
        if let Some(work_dir) = parsed.work_dir {
            config.work_dir = resolve_config_path(config_dir, &work_dir);
        }
        if let Some(output_dir) = parsed.output_dir {
            config.output_dir = resolve_config_path(config_dir, &output_dir);
        }
        config.templates_dir = parsed
            .templates_dir
            .map(|dir| resolve_config_path(config_dir, &dir));
        if let Some(maintainer) = parsed.maintainer {
            config.maintainer = maintainer;
        }
        if let Some(track) = parsed.track {
            config.track = track;
        }
        if let Some(policy) = parsed.policy {
            config.policy = policy;
        }
        if let Some(jobs) = parsed.jobs {
            if jobs == 0 {
                bail!("invalid config '{}': jobs must be at least 1", path.display());
            }
            config.jobs = jobs;
        }
        if parsed.timeout_secs == Some(0) {
            bail!("invalid config '{}': timeout_secs must be at least 1", path.display());
        }
        config.timeout_secs = parsed.timeout_secs;
        if let Some(environment) = parsed.environment {
            config.environment = environment;
        }
        config.tools = parsed.tools;
        if let Some(download) = parsed.download {
            config.download = download;
        }
        if let Some(index_url) = parsed.index_url {
            config.index_url = index_url;
        }

        Ok(config)
    }

    /// Config from `explicit`, the discovered config file, or defaults, with
    /// environment overrides applied.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::discover() {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `DEP_BUILDER_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(track) = lookup(ENV_TRACK) {
            self.track = Track::new(&track).map_err(|e| anyhow::anyhow!("{ENV_TRACK}: {e}"))?;
        }
        if let Some(maintainer) = lookup(ENV_MAINTAINER) {
            self.maintainer = maintainer;
        }
        for tool in Tool::ALL {
            if let Some(var) = tool.env_var() {
                if let Some(path) = lookup(var) {
                    self.tools.set(tool, PathBuf::from(path));
                }
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_secs.map(std::time::Duration::from_secs)
    }
}

/// Values every template sees besides the entry and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub maintainer: String,
    pub build_date: OffsetDateTime,
    pub track: Track,
}

impl RenderConfig {
    pub fn new(maintainer: impl Into<String>, build_date: OffsetDateTime, track: Track) -> Self {
        Self {
            maintainer: maintainer.into(),
            build_date,
            track,
        }
    }

    /// Render config for `config`, dated `SOURCE_DATE_EPOCH` when set and now
    /// otherwise.
    pub fn from_builder(config: &BuilderConfig) -> Result<Self> {
        let build_date = source_date_epoch(std::env::var(ENV_SOURCE_DATE_EPOCH).ok())?
            .unwrap_or_else(OffsetDateTime::now_utc);
        Ok(Self::new(
            config.maintainer.clone(),
            build_date,
            config.track.clone(),
        ))
    }
}

fn source_date_epoch(raw: Option<String>) -> Result<Option<OffsetDateTime>> {
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    let seconds: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{ENV_SOURCE_DATE_EPOCH} must be an integer, got '{raw}'"))?;
    let date = OffsetDateTime::from_unix_timestamp(seconds)
        .with_context(|| format!("{ENV_SOURCE_DATE_EPOCH} out of range: {seconds}"))?;
    Ok(Some(date))
}
