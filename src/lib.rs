//! Packaging automation for third-party dependencies.
//!
//! A dependency manifest lists every project, its version and packaging
//! metadata. For a build target (package format plus platform) the crate
//! renders each project's packaging files, runs the packaging tools on the
//! host or in a container, and collects the packages into one output
//! directory.
//!
//! # Architecture
//!
//! ```text
//! manifest ──> build::BuildPlan ──> build::Orchestrator
//!                                      │
//!                                      ├── template: debian/, *.spec
//!                                      ├── environment: host | docker
//!                                      └── collect ──> output dir ──> report
//!
//! writers: requirements.txt, install scripts, CI workflow, tox.ini,
//!          debian/control
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use dep_builder::build::Orchestrator;
//! use dep_builder::config::{BuilderConfig, RenderConfig};
//! use dep_builder::environment::Provisioner;
//! use dep_builder::manifest::{Manifest, Selection};
//! use dep_builder::target::{BuildTarget, PackageFormat};
//!
//! let config = BuilderConfig::resolve(None)?;
//! let manifest = Manifest::load_for_track(&config.manifest, &config.track)?;
//! let entries = manifest.select(&Selection::Preset("plaso".into()))?;
//! let target = BuildTarget::new(PackageFormat::Wheel);
//! let env = Provisioner::new(&config).provision(&target)?;
//! let summary = Orchestrator::new(&config, RenderConfig::from_builder(&config)?, env)
//!     .build(&entries, &target)?;
//! println!("{summary}");
//! ```

pub mod build;
pub mod config;
pub mod environment;
pub mod error;
pub mod manifest;
pub mod process;
pub mod report;
pub mod target;
pub mod template;
pub mod writers;

pub use build::{BuildResult, BuildStatus, FailurePolicy, Orchestrator, RunSummary};
pub use config::{BuilderConfig, RenderConfig};
pub use manifest::{DependencyEntry, Manifest, ProjectInfo, Selection};
pub use target::{BuildTarget, PackageFormat};
