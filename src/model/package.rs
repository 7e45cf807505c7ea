use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical ecosystem identifier substituted for a defaulted `ecosystem`.
pub const DEFAULT_ECOSYSTEM: &str = "hexpm";

/// Three-state optional field value.
///
/// The audit wire format distinguishes a field that was explicitly left
/// without a value (`Unset`), a field that was omitted and should take its
/// schema default (`Default`), and a field carrying a value (`Present`).
/// Collapsing any two of these changes the meaning of a signed record, so
/// the distinction is kept all the way through the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Explicit no-value marker.
    Unset,
    /// Absent-with-default marker; producers substitute the schema default.
    Default,
    /// A concrete value.
    Present(T),
}

impl<T> Field<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    /// Returns the value if one is present.
    pub fn as_present(&self) -> Option<&T> {
        match self {
            Field::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_present(self) -> Option<T> {
        match self {
            Field::Present(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    /// `Some` maps to `Present`, `None` to the no-value marker.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Field::Present(value),
            None => Field::Unset,
        }
    }
}

/// A reviewer's judgment about a package release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Dangerous,
    Suspicious,
    Lgtm,
    Safe,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Dangerous => "dangerous",
            Verdict::Suspicious => "suspicious",
            Verdict::Lgtm => "lgtm",
            Verdict::Safe => "safe",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dangerous" => Ok(Verdict::Dangerous),
            "suspicious" => Ok(Verdict::Suspicious),
            "lgtm" => Ok(Verdict::Lgtm),
            "safe" => Ok(Verdict::Safe),
            _ => Err(format!(
                "unknown verdict: {}. Use: dangerous, suspicious, lgtm, safe",
                s
            )),
        }
    }
}

/// Immutable package descriptor as carried inside audit records.
///
/// `name` and `version` are always present; `ecosystem` may be supplied,
/// omitted (defaulted), or explicitly unset on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub ecosystem: Field<String>,
    pub name: String,
    pub version: String,
}

impl Package {
    /// Creates a descriptor with the ecosystem left to its default.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            ecosystem: Field::Default,
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn with_ecosystem(mut self, ecosystem: impl Into<String>) -> Self {
        self.ecosystem = Field::Present(ecosystem.into());
        self
    }

    /// The concrete ecosystem this descriptor refers to.
    pub fn ecosystem_or_default(&self) -> &str {
        self.ecosystem.as_present().map(String::as_str).unwrap_or(DEFAULT_ECOSYSTEM)
    }

    /// Defaulting step: replaces a non-present ecosystem with the canonical
    /// identifier. Idempotent; used by producers that need a concrete value,
    /// never by the codec.
    pub fn with_default_ecosystem(mut self) -> Self {
        if !self.ecosystem.is_present() {
            self.ecosystem = Field::Present(DEFAULT_ECOSYSTEM.to_string());
        }
        self
    }
}

/// A human-authored trust statement about one package release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audit {
    pub package: Package,
    /// No-opinion audits carry a non-present verdict.
    pub verdict: Field<Verdict>,
    pub message: Field<String>,
    /// SHA-256 hex fingerprint of the signer's public key.
    pub public_key_fingerprint: String,
    /// Unix timestamp, seconds.
    pub created_at: u64,
    /// True when the signer is the package's own author rather than a
    /// third-party reviewer.
    pub audited_by_author: bool,
}

impl Audit {
    pub fn new(package: Package, public_key_fingerprint: impl Into<String>, created_at: u64) -> Self {
        Self {
            package,
            verdict: Field::Unset,
            message: Field::Unset,
            public_key_fingerprint: public_key_fingerprint.into(),
            created_at,
            audited_by_author: false,
        }
    }

    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Field::Present(verdict);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Field::Present(message.into());
        self
    }

    pub fn by_author(mut self, audited_by_author: bool) -> Self {
        self.audited_by_author = audited_by_author;
        self
    }
}

/// An audit plus the Ed25519 signature over its canonical encoding.
///
/// The signature is meaningless without the audit, so the pair travels as
/// one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAudit {
    pub audit: Audit,
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ecosystem_applied() {
        let package = Package::new("phoenix", "1.7.0").with_default_ecosystem();
        assert_eq!(
            package.ecosystem,
            Field::Present(DEFAULT_ECOSYSTEM.to_string())
        );
    }

    #[test]
    fn test_defaulting_is_idempotent() {
        let once = Package::new("phoenix", "1.7.0").with_default_ecosystem();
        let twice = once.clone().with_default_ecosystem();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_defaulting_preserves_supplied_ecosystem() {
        let package = Package::new("rebar", "3.20.0")
            .with_ecosystem("hexpm:acme")
            .with_default_ecosystem();
        assert_eq!(package.ecosystem_or_default(), "hexpm:acme");
    }

    #[test]
    fn test_defaulting_fills_unset() {
        let mut package = Package::new("plug", "1.14.2");
        package.ecosystem = Field::Unset;
        let package = package.with_default_ecosystem();
        assert_eq!(package.ecosystem_or_default(), DEFAULT_ECOSYSTEM);
    }

    #[test]
    fn test_verdict_parse() {
        assert_eq!("safe".parse::<Verdict>(), Ok(Verdict::Safe));
        assert_eq!("LGTM".parse::<Verdict>(), Ok(Verdict::Lgtm));
        assert!("fine".parse::<Verdict>().is_err());
    }

    #[test]
    fn test_audit_builder() {
        let audit = Audit::new(Package::new("plug", "1.14.2"), "ab12", 1_700_000_000)
            .with_verdict(Verdict::Lgtm)
            .with_message("read the diff, looks clean")
            .by_author(false);
        assert_eq!(audit.verdict, Field::Present(Verdict::Lgtm));
        assert!(audit.message.is_present());
        assert!(!audit.audited_by_author);
    }
}
