use std::fmt;
use std::str::FromStr;

/// Comparison operator of one version constraint part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// A bare version: the version to build, and the minimum requirement.
    Bare,
    Equal,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Comparison {
    fn as_str(self) -> &'static str {
        match self {
            Comparison::Bare => "",
            Comparison::Equal => "==",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
        }
    }

    fn is_upper_bound(self) -> bool {
        matches!(self, Comparison::Less | Comparison::LessOrEqual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    comparison: Comparison,
    version: String,
}

/// Version constraint of a dependency, e.g. `1.16.0`, `==1.16.0`,
/// `>=20190220` or `>=1.0,<2.0`.
///
/// At most two parts are supported and the second one must be an upper
/// bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    lower: Part,
    upper: Option<Part>,
}

impl VersionConstraint {
    /// Concrete version used for building and naming packages: the version
    /// number of the first part.
    pub fn pinned(&self) -> &str {
        &self.lower.version
    }

    /// Upper bound version, if the constraint has one.
    pub fn upper_bound(&self) -> Option<&str> {
        self.upper.as_ref().map(|part| part.version.as_str())
    }

    /// Requirement specifier as used by pip, e.g. `>=1.16.0` or `>=1.0,<2.0`.
    /// A bare version is a minimum requirement.
    pub fn pip_specifier(&self) -> String {
        let lower = match self.lower.comparison {
            Comparison::Bare => format!(">={}", self.lower.version),
            comparison => format!("{}{}", comparison.as_str(), self.lower.version),
        };
        match &self.upper {
            Some(upper) => format!("{},{}{}", lower, upper.comparison.as_str(), upper.version),
            None => lower,
        }
    }

    /// Debian relation, e.g. `(>= 1.16.0)`; upper bounds are not expressed.
    pub fn dpkg_relation(&self) -> String {
        let operator = match self.lower.comparison {
            Comparison::Bare | Comparison::GreaterOrEqual => ">=",
            Comparison::Equal => "=",
            Comparison::Greater => ">>",
            Comparison::Less => "<<",
            Comparison::LessOrEqual => "<=",
        };
        format!("({} {})", operator, self.lower.version)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.lower.comparison.as_str(), self.lower.version)?;
        if let Some(upper) = &self.upper {
            write!(f, ",{}{}", upper.comparison.as_str(), upper.version)?;
        }
        Ok(())
    }
}

impl FromStr for VersionConstraint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value.split(',').map(str::trim).collect::<Vec<_>>();
        if parts.len() > 2 {
            return Err(format!(
                "unsupported version constraint '{value}': at most two parts are supported"
            ));
        }

        let lower = parse_part(parts[0], value)?;
        if lower.comparison.is_upper_bound() {
            return Err(format!(
                "unsupported version constraint '{value}': the first part must not be an upper bound"
            ));
        }

        let upper = match parts.get(1) {
            Some(raw) => {
                let part = parse_part(raw, value)?;
                if !part.comparison.is_upper_bound() {
                    return Err(format!(
                        "unsupported version constraint '{value}': the second part must start with '<'"
                    ));
                }
                Some(part)
            }
            None => None,
        };

        Ok(Self { lower, upper })
    }
}

fn parse_part(raw: &str, whole: &str) -> Result<Part, String> {
    let (comparison, version) = [
        ("==", Comparison::Equal),
        (">=", Comparison::GreaterOrEqual),
        ("<=", Comparison::LessOrEqual),
        (">", Comparison::Greater),
        ("<", Comparison::Less),
    ]
    .into_iter()
    .find_map(|(prefix, comparison)| {
        raw.strip_prefix(prefix)
            .map(|rest| (comparison, rest.trim()))
    })
    .unwrap_or((Comparison::Bare, raw));

    let valid = version
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit())
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '~'));
    if !valid {
        return Err(format!(
            "unsupported version constraint '{whole}': invalid version '{version}'"
        ));
    }

    Ok(Part {
        comparison,
        version: version.to_string(),
    })
}
