//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ModuleName`] - Validated YANG module identifier
//! - [`FeatureName`] - Validated YANG feature identifier
//! - [`Revision`] - `YYYY-MM-DD` module revision date
//! - [`Datastore`] - Persisted datastore kind (startup/running)
//! - [`UtcTimestamp`] - RFC3339 timestamp
//! - [`Fingerprint`] - Catalog state hash for atomicity checks
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, so the catalog never holds a malformed name.
//!
//! # Examples
//!
//! ```
//! use yangmods::core::types::{ModuleName, Revision};
//!
//! let name = ModuleName::new("ietf-interfaces").unwrap();
//! let rev = Revision::new("2018-02-20").unwrap();
//! assert_eq!(name.as_str(), "ietf-interfaces");
//! assert!(rev > Revision::new("2014-05-08").unwrap());
//!
//! assert!(ModuleName::new("9lives").is_err());
//! assert!(Revision::new("2018-13-01").is_err());
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid module name: {0}")]
    InvalidModuleName(String),

    #[error("invalid feature name: {0}")]
    InvalidFeatureName(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("unknown datastore: {0}")]
    UnknownDatastore(String),
}

/// Check a string against YANG identifier rules.
///
/// First character is an ASCII letter or `_`; the rest are letters,
/// digits, `_`, `-` or `.`. Identifiers starting with `xml` (any case)
/// are reserved.
pub(crate) fn check_identifier(value: &str) -> Result<(), String> {
    let mut chars = value.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err("identifier cannot be empty".into()),
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(format!(
            "'{}' must start with a letter or '_', found '{}'",
            value, first
        ));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))) {
        return Err(format!("'{}' contains invalid character '{}'", value, bad));
    }
    if value.len() >= 3 && value[..3].eq_ignore_ascii_case("xml") {
        return Err(format!("'{}' uses the reserved 'xml' prefix", value));
    }
    Ok(())
}

/// A validated YANG module name.
///
/// # Example
///
/// ```
/// use yangmods::core::types::ModuleName;
///
/// let name = ModuleName::new("example-mod").unwrap();
/// assert_eq!(name.as_str(), "example-mod");
///
/// assert!(ModuleName::new("").is_err());
/// assert!(ModuleName::new("has space").is_err());
/// assert!(ModuleName::new("-dash").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    /// Create a new validated module name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidModuleName` if the name is not a YANG identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_identifier(&name).map_err(TypeError::InvalidModuleName)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModuleName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModuleName> for String {
    fn from(name: ModuleName) -> Self {
        name.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated YANG feature name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureName(String);

impl FeatureName {
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_identifier(&name).map_err(TypeError::InvalidFeatureName)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FeatureName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FeatureName> for String {
    fn from(name: FeatureName) -> Self {
        name.0
    }
}

impl AsRef<str> for FeatureName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeatureName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A module revision date in `YYYY-MM-DD` form.
///
/// Revisions order chronologically, which for this format is also the
/// lexicographic order of the string.
///
/// # Example
///
/// ```
/// use yangmods::core::types::Revision;
///
/// let old = Revision::new("2020-01-31").unwrap();
/// let new = Revision::new("2021-06-01").unwrap();
/// assert!(new > old);
///
/// assert!(Revision::new("2020-02-30").is_err());
/// assert!(Revision::new("20-01-01").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    /// Create a new validated revision.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRevision` unless the value is a real
    /// calendar date written as `YYYY-MM-DD`.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    fn validate(value: &str) -> Result<(), TypeError> {
        let bytes = value.as_bytes();
        let shaped = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !shaped {
            return Err(TypeError::InvalidRevision(format!(
                "'{}' is not in YYYY-MM-DD form",
                value
            )));
        }
        chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| TypeError::InvalidRevision(format!("'{}' is not a calendar date", value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Revision {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.0
    }
}

impl AsRef<str> for Revision {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted datastores whose contents survive a schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datastore {
    Startup,
    Running,
}

impl Datastore {
    /// Every persisted datastore, in write-back order.
    pub const ALL: [Datastore; 2] = [Datastore::Startup, Datastore::Running];

    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Startup => "startup",
            Datastore::Running => "running",
        }
    }
}

impl FromStr for Datastore {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Datastore::Startup),
            "running" => Ok(Datastore::Running),
            other => Err(TypeError::UnknownDatastore(other.to_string())),
        }
    }
}

impl std::fmt::Display for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A UTC timestamp, serialized as RFC3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// SHA-256 digest of a canonical byte rendering.
///
/// Used to identify a catalog state: two catalogs with equal
/// fingerprints serialize to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the given bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
