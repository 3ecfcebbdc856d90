//! Read-only role registry snapshots.
//!
//! A [`Registry`] is built once per [`Registry::load`] call and never mutated
//! afterwards, so it can be shared behind an `Arc` by any number of readers.
//! There is no caching across loads: callers that need fresh data reload.
//!
//! The backing source is a YAML (or `.json`) document with a top-level `roles`
//! mapping keyed by role name:
//!
//! ```yaml
//! roles:
//!   reviewer:
//!     purpose: Reviews code changes
//!     responsibilities: [check style, flag regressions]
//!     scoring_profile: { priority: 7 }
//!     version: 1.2.0
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use sha2::Digest as _;

use crate::role::{Role, ScoringProfile};

/// Failure to produce a registry snapshot. Loading is all-or-nothing.
#[derive(Debug, thiserror::Error)]
pub enum RegistryLoadError {
    #[error("registry source not found: {}", .path.display())]
    Missing { path: PathBuf },

    #[error("failed to read registry source {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed registry source {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("duplicate role name: {name}")]
    DuplicateRole { name: String },

    #[error("invalid role {role}: {reason}")]
    InvalidRole { role: String, reason: String },

    #[error("registry {} contains no roles", .path.display())]
    Empty { path: PathBuf },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryLoadError>;

/// One entry under `roles:`. The name comes from the mapping key.
#[derive(Debug, Deserialize)]
struct RoleEntry {
    purpose: String,
    #[serde(default)]
    responsibilities: Vec<String>,
    scoring_profile: ScoringProfile,
    #[serde(default)]
    version: Option<String>,
}

/// The `roles` mapping, kept in document order so duplicate keys survive
/// deserialization and can be reported instead of silently overwritten.
struct RoleTable(Vec<(String, RoleEntry)>);

impl<'de> Deserialize<'de> for RoleTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = RoleTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of role name to role definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((name, entry)) = map.next_entry::<String, RoleEntry>()? {
                    entries.push((name, entry));
                }
                Ok(RoleTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

#[derive(Deserialize)]
struct RegistryDocument {
    roles: RoleTable,
}

/// Source document format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Json,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SourceFormat::Json,
            _ => SourceFormat::Yaml,
        }
    }
}

/// Immutable snapshot of role definitions keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    roles: BTreeMap<String, Role>,
    source: Option<PathBuf>,
    digest: String,
}

impl Registry {
    /// Load and validate a snapshot from `path`. The file is only read.
    pub fn load(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RegistryLoadError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                RegistryLoadError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let mut registry = Self::parse(&bytes, SourceFormat::from_path(path), path)?;
        registry.source = Some(path.to_path_buf());
        crate::obs::emit_registry_loaded(path, registry.len(), &registry.digest);
        Ok(registry)
    }

    /// Parse a snapshot from raw source bytes. `origin` is only used in errors.
    pub fn parse(bytes: &[u8], format: SourceFormat, origin: &Path) -> RegistryResult<Self> {
        let parse_err = |reason: String| RegistryLoadError::Parse {
            path: origin.to_path_buf(),
            reason,
        };
        let doc: RegistryDocument = match format {
            SourceFormat::Yaml => {
                serde_yaml::from_slice(bytes).map_err(|e| parse_err(e.to_string()))?
            }
            SourceFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| parse_err(e.to_string()))?
            }
        };

        if doc.roles.0.is_empty() {
            return Err(RegistryLoadError::Empty {
                path: origin.to_path_buf(),
            });
        }

        let roles = doc.roles.0.into_iter().map(|(name, entry)| Role {
            name,
            purpose: entry.purpose,
            responsibilities: entry.responsibilities,
            scoring_profile: entry.scoring_profile,
            version: entry.version.unwrap_or_else(|| "0.1.0".to_string()),
        });
        let mut registry = Self::collect(roles, origin)?;
        registry.digest = hex::encode(sha2::Sha256::digest(bytes));
        Ok(registry)
    }

    /// Build an in-memory snapshot, applying the same validation as `load`.
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> RegistryResult<Self> {
        let mut registry = Self::collect(roles, Path::new("<memory>"))?;
        let canonical: Vec<&Role> = registry.roles.values().collect();
        let bytes = serde_json::to_vec(&canonical).map_err(|e| RegistryLoadError::Parse {
            path: PathBuf::from("<memory>"),
            reason: e.to_string(),
        })?;
        registry.digest = hex::encode(sha2::Sha256::digest(&bytes));
        Ok(registry)
    }

    fn collect(roles: impl IntoIterator<Item = Role>, origin: &Path) -> RegistryResult<Self> {
        let mut map = BTreeMap::new();
        for role in roles {
            validate_role(&role)?;
            if map.contains_key(&role.name) {
                return Err(RegistryLoadError::DuplicateRole { name: role.name });
            }
            map.insert(role.name.clone(), role);
        }
        if map.is_empty() {
            return Err(RegistryLoadError::Empty {
                path: origin.to_path_buf(),
            });
        }
        Ok(Self {
            roles: map,
            source: None,
            digest: String::new(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Roles in ascending name order.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Role names in ascending order.
    pub fn names(&self) -> Vec<&str> {
        self.roles.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Path this snapshot was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// SHA-256 hex digest of the source bytes (or canonical JSON for
    /// in-memory snapshots).
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn validate_role(role: &Role) -> RegistryResult<()> {
    let invalid = |reason: &str| RegistryLoadError::InvalidRole {
        role: role.name.clone(),
        reason: reason.to_string(),
    };
    if role.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if role.purpose.trim().is_empty() {
        return Err(invalid("purpose must not be empty"));
    }
    if role.version.trim().is_empty() {
        return Err(invalid("version must not be empty"));
    }
    Ok(())
}
