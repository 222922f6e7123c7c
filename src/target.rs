//! Build targets: a package format plus the platform it is built for.
//!
//! The target decides which template set is rendered, which tools are
//! invoked, which environment image is used, and how the collected package
//! is named in the output directory.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output packaging format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageFormat {
    /// Binary Debian package (.deb).
    Dpkg,
    /// Debian source package (.dsc).
    DpkgSource,
    /// Binary RPM package.
    Rpm,
    /// Source RPM package.
    Srpm,
    /// Python wheel.
    Wheel,
    /// Source distribution tarball.
    Source,
}

impl PackageFormat {
    pub const ALL: [PackageFormat; 6] = [
        PackageFormat::Dpkg,
        PackageFormat::DpkgSource,
        PackageFormat::Rpm,
        PackageFormat::Srpm,
        PackageFormat::Wheel,
        PackageFormat::Source,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PackageFormat::Dpkg => "dpkg",
            PackageFormat::DpkgSource => "dpkg-source",
            PackageFormat::Rpm => "rpm",
            PackageFormat::Srpm => "srpm",
            PackageFormat::Wheel => "wheel",
            PackageFormat::Source => "source",
        }
    }

    /// Package naming family the format belongs to.
    pub fn family(self) -> PackageFamily {
        match self {
            PackageFormat::Dpkg | PackageFormat::DpkgSource => PackageFamily::Dpkg,
            PackageFormat::Rpm | PackageFormat::Srpm => PackageFamily::Rpm,
            PackageFormat::Wheel | PackageFormat::Source => PackageFamily::Pypi,
        }
    }

    /// File extension of the collected package, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            PackageFormat::Dpkg => "deb",
            PackageFormat::DpkgSource => "dsc",
            PackageFormat::Rpm => "rpm",
            PackageFormat::Srpm => "src.rpm",
            PackageFormat::Wheel => "whl",
            PackageFormat::Source => "tar.gz",
        }
    }

    /// Distribution used when none is requested explicitly.
    pub fn default_distribution(self) -> Option<&'static str> {
        match self {
            PackageFormat::Dpkg | PackageFormat::DpkgSource => Some("jammy"),
            PackageFormat::Rpm | PackageFormat::Srpm => Some("fc40"),
            PackageFormat::Wheel | PackageFormat::Source => None,
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        PackageFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == value)
            .ok_or_else(|| {
                let known = PackageFormat::ALL
                    .iter()
                    .map(|format| format.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("unsupported build target '{value}'; expected one of: {known}")
            })
    }
}

/// Family of package names a dependency may override per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFamily {
    Dpkg,
    Rpm,
    Pypi,
}

impl PackageFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageFamily::Dpkg => "dpkg",
            PackageFamily::Rpm => "rpm",
            PackageFamily::Pypi => "pypi",
        }
    }
}

impl fmt::Display for PackageFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageFamily {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dpkg" => Ok(PackageFamily::Dpkg),
            "rpm" => Ok(PackageFamily::Rpm),
            "pypi" => Ok(PackageFamily::Pypi),
            other => Err(format!(
                "unknown platform key '{other}'; expected one of: dpkg, rpm, pypi"
            )),
        }
    }
}

/// Machine architecture, spelled per package family when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    X86_64,
    Aarch64,
    I686,
}

impl Architecture {
    /// Architecture of the machine running the builder.
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "aarch64" => Architecture::Aarch64,
            "x86" => Architecture::I686,
            _ => Architecture::X86_64,
        }
    }

    /// Architecture token used by a package family. `noarch` entries use the
    /// family's architecture-independent token.
    pub fn token(self, family: PackageFamily, noarch: bool) -> &'static str {
        match (family, noarch, self) {
            (PackageFamily::Dpkg, true, _) => "all",
            (PackageFamily::Dpkg, false, Architecture::X86_64) => "amd64",
            (PackageFamily::Dpkg, false, Architecture::Aarch64) => "arm64",
            (PackageFamily::Dpkg, false, Architecture::I686) => "i386",
            (PackageFamily::Rpm, true, _) => "noarch",
            (PackageFamily::Rpm, false, Architecture::X86_64) => "x86_64",
            (PackageFamily::Rpm, false, Architecture::Aarch64) => "aarch64",
            (PackageFamily::Rpm, false, Architecture::I686) => "i686",
            (PackageFamily::Pypi, true, _) => "any",
            (PackageFamily::Pypi, false, Architecture::X86_64) => "linux_x86_64",
            (PackageFamily::Pypi, false, Architecture::Aarch64) => "linux_aarch64",
            (PackageFamily::Pypi, false, Architecture::I686) => "linux_i686",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Aarch64 => "aarch64",
            Architecture::I686 => "i686",
        })
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "x86_64" | "amd64" => Ok(Architecture::X86_64),
            "aarch64" | "arm64" => Ok(Architecture::Aarch64),
            "i686" | "i386" | "x86" => Ok(Architecture::I686),
            other => Err(format!(
                "unsupported architecture '{other}'; expected x86_64|amd64, aarch64|arm64 or i686|i386"
            )),
        }
    }
}

/// A package format built for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildTarget {
    pub format: PackageFormat,
    pub distribution: Option<String>,
    pub architecture: Architecture,
}

impl BuildTarget {
    /// Target for `format` on its default distribution and the host
    /// architecture.
    pub fn new(format: PackageFormat) -> Self {
        Self {
            format,
            distribution: format.default_distribution().map(str::to_string),
            architecture: Architecture::host(),
        }
    }

    pub fn with_distribution(mut self, distribution: impl Into<String>) -> Self {
        self.distribution = Some(distribution.into());
        self
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn family(&self) -> PackageFamily {
        self.format.family()
    }

    /// Directory-safe identifier, e.g. `dpkg-jammy-x86_64`.
    pub fn slug(&self) -> String {
        match &self.distribution {
            Some(distribution) => {
                format!("{}-{}-{}", self.format, distribution, self.architecture)
            }
            None => format!("{}-{}", self.format, self.architecture),
        }
    }

    /// Platform part of the collected package filename.
    pub fn platform_suffix(&self, noarch: bool) -> String {
        let arch = self.architecture.token(self.family(), noarch);
        let distribution = self.distribution.as_deref().unwrap_or("any");
        match self.format {
            PackageFormat::Dpkg => format!("{distribution}_{arch}"),
            PackageFormat::DpkgSource | PackageFormat::Srpm => distribution.to_string(),
            PackageFormat::Rpm => format!("{distribution}.{arch}"),
            PackageFormat::Wheel if noarch => "py3-none-any".to_string(),
            PackageFormat::Wheel => format!("py3-none-{arch}"),
            PackageFormat::Source => "sdist".to_string(),
        }
    }

    /// Deterministic output filename: `<name>-<version>-<platform-suffix>.<ext>`.
    pub fn output_filename(&self, name: &str, version: &str, noarch: bool) -> String {
        format!(
            "{}-{}-{}.{}",
            name,
            version,
            self.platform_suffix(noarch),
            self.format.extension()
        )
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_roundtrip_through_from_str() {
        for format in PackageFormat::ALL {
            assert_eq!(format.as_str().parse::<PackageFormat>(), Ok(format));
        }
        assert!("msi".parse::<PackageFormat>().is_err());
    }

    #[test]
    fn dpkg_filename_uses_distribution_and_arch() {
        let target = BuildTarget::new(PackageFormat::Dpkg)
            .with_distribution("bookworm")
            .with_architecture(Architecture::X86_64);
        assert_eq!(
            target.output_filename("six", "1.16.0", true),
            "six-1.16.0-bookworm_all.deb"
        );
        assert_eq!(
            target.output_filename("libyal", "20240101", false),
            "libyal-20240101-bookworm_amd64.deb"
        );
    }

    #[test]
    fn rpm_and_wheel_filenames() {
        let rpm = BuildTarget::new(PackageFormat::Rpm).with_architecture(Architecture::Aarch64);
        assert_eq!(
            rpm.output_filename("six", "1.16.0", false),
            "six-1.16.0-fc40.aarch64.rpm"
        );

        let wheel = BuildTarget::new(PackageFormat::Wheel);
        assert_eq!(
            wheel.output_filename("six", "1.16.0", true),
            "six-1.16.0-py3-none-any.whl"
        );
        assert_eq!(wheel.distribution, None);
    }

    #[test]
    fn platform_wheel_name_carries_a_full_tag_triple() {
        let wheel = BuildTarget::new(PackageFormat::Wheel).with_architecture(Architecture::X86_64);
        let name = wheel.output_filename("pytsk3", "20231007", false);
        assert_eq!(name, "pytsk3-20231007-py3-none-linux_x86_64.whl");
        // name, version, python tag, abi tag, platform tag
        assert_eq!(name.trim_end_matches(".whl").split('-').count(), 5);
    }

    #[test]
    fn architecture_aliases_parse() {
        assert_eq!("amd64".parse::<Architecture>(), Ok(Architecture::X86_64));
        assert_eq!("arm64".parse::<Architecture>(), Ok(Architecture::Aarch64));
        assert!("sparc".parse::<Architecture>().is_err());
    }

    #[test]
    fn slug_omits_missing_distribution() {
        let target = BuildTarget::new(PackageFormat::Source).with_architecture(Architecture::X86_64);
        assert_eq!(target.slug(), "source-x86_64");
    }
}
