//! Template rendering.
//!
//! Templates use `${name}` or `$name` placeholders and `$$` for a literal
//! dollar sign. A template records the placeholders it declares when it is
//! parsed, and rendering fails if the context lacks any of them; no
//! placeholder is ever rendered as a blank.

pub mod builtin;
mod context;
mod set;

pub use context::TemplateContext;
pub(crate) use context::format_description_long;
pub(crate) use set::load_override_or;
pub use set::{TemplateFile, TemplateSet};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RenderConfig;
use crate::error::{RenderError, TemplateError};
use crate::manifest::DependencyEntry;
use crate::target::BuildTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
    placeholders: BTreeSet<String>,
}

impl Template {
    /// Parse `body`. `name` identifies the template in errors.
    pub fn parse(name: &str, body: &str) -> Result<Self, TemplateError> {
        let syntax = |position: usize, message: &str| TemplateError::Syntax {
            template: name.to_string(),
            position,
            message: message.to_string(),
        };

        let mut segments = Vec::new();
        let mut placeholders = BTreeSet::new();
        let mut literal = String::new();
        let mut chars = body.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }

            let ident = match chars.peek().copied() {
                Some((_, '$')) => {
                    chars.next();
                    literal.push('$');
                    continue;
                }
                Some((_, '{')) => {
                    chars.next();
                    let mut ident = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, c)) if is_ident_char(c, ident.is_empty()) => ident.push(c),
                            Some((at, _)) => {
                                return Err(syntax(at, "invalid character in placeholder name"))
                            }
                            None => return Err(syntax(position, "unterminated '${'")),
                        }
                    }
                    if ident.is_empty() {
                        return Err(syntax(position, "empty placeholder name"));
                    }
                    ident
                }
                Some((_, c)) if is_ident_char(c, true) => {
                    let mut ident = String::new();
                    while let Some((_, c)) = chars.peek().copied() {
                        if !is_ident_char(c, ident.is_empty()) {
                            break;
                        }
                        ident.push(c);
                        chars.next();
                    }
                    ident
                }
                _ => {
                    return Err(syntax(
                        position,
                        "expected '{', '$' or a placeholder name after '$'",
                    ))
                }
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            placeholders.insert(ident.clone());
            segments.push(Segment::Placeholder(ident));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            name: name.to_string(),
            segments,
            placeholders,
        })
    }

    /// Read and parse the template file at `path`.
    pub fn load(name: &str, path: &Path) -> Result<Self, TemplateError> {
        let body = fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(name, &body)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Placeholders the template declares.
    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    /// Substitute `context` into the template. `subject` names what is being
    /// rendered in a [`RenderError::MissingField`].
    pub fn substitute(&self, context: &TemplateContext, subject: &str) -> Result<String, RenderError> {
        let missing = self
            .placeholders
            .iter()
            .filter(|placeholder| !context.contains(placeholder))
            .cloned()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(RenderError::MissingField {
                template: self.name.clone(),
                entry: subject.to_string(),
                missing,
            });
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => out.push_str(context.get(key).unwrap_or_default()),
            }
        }
        Ok(out)
    }
}

fn is_ident_char(c: char, first: bool) -> bool {
    c == '_' || c.is_ascii_alphabetic() || (!first && c.is_ascii_digit())
}

/// Template text after substitution, with the path it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    /// Path relative to the bundle root.
    pub path: PathBuf,
    pub contents: String,
    pub executable: bool,
}

impl RenderedArtifact {
    /// Write the contents to `path`, creating parent directories.
    pub fn write_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.contents)?;
        if self.executable {
            set_executable(path)?;
        }
        Ok(())
    }
}

/// All rendered packaging files of one entry for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactBundle {
    pub entry: String,
    pub artifacts: Vec<RenderedArtifact>,
}

impl ArtifactBundle {
    /// Write every artifact below `root`.
    pub fn write_to(&self, root: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.artifacts.len());
        for artifact in &self.artifacts {
            let path = root.join(&artifact.path);
            artifact.write_file(&path)?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Render one template for `entry` and `target`. The artifact path is the
/// template name.
pub fn render(
    entry: &DependencyEntry,
    target: &BuildTarget,
    template: &Template,
    config: &RenderConfig,
) -> Result<RenderedArtifact, RenderError> {
    let context = TemplateContext::for_entry(entry, target, config);
    Ok(RenderedArtifact {
        path: PathBuf::from(template.name()),
        contents: template.substitute(&context, &entry.name)?,
        executable: false,
    })
}

/// Render every file of `set` for `entry`.
pub fn render_bundle(
    entry: &DependencyEntry,
    target: &BuildTarget,
    set: &TemplateSet,
    config: &RenderConfig,
) -> Result<ArtifactBundle, RenderError> {
    let context = TemplateContext::for_entry(entry, target, config);
    let artifacts = set
        .files()
        .iter()
        .map(|file| {
            Ok(RenderedArtifact {
                path: file.output.clone(),
                contents: file.template.substitute(&context, &entry.name)?,
                executable: file.executable,
            })
        })
        .collect::<Result<Vec<_>, RenderError>>()?;
    Ok(ArtifactBundle {
        entry: entry.name.clone(),
        artifacts,
    })
}
