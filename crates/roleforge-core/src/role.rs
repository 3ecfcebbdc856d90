//! Role definitions: `Role`, `ScoringProfile`, `Priority`.

use serde::{Deserialize, Serialize};

/// Lowest allowed scoring priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest allowed scoring priority.
pub const MAX_PRIORITY: u8 = 10;

/// A priority value outside `[MIN_PRIORITY, MAX_PRIORITY]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("priority {0} is outside [1, 10]")]
pub struct PriorityOutOfRange(pub i64);

/// Scoring priority of a role, always within `[1, 10]`.
///
/// Construction is fallible for caller-supplied values; the only clamping path
/// is [`Priority::nudged`], used when generating mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub fn new(value: i64) -> Result<Self, PriorityOutOfRange> {
        if (MIN_PRIORITY as i64..=MAX_PRIORITY as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(PriorityOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Scale factor applied to a raw keyword score (`priority / 10`).
    pub fn weight(self) -> f64 {
        f64::from(self.0) / f64::from(MAX_PRIORITY)
    }

    /// Shift by `delta`, clamping into `[1, 10]`.
    pub fn nudged(self, delta: i8) -> Self {
        let shifted = i16::from(self.0) + i16::from(delta);
        Self(shifted.clamp(MIN_PRIORITY as i16, MAX_PRIORITY as i16) as u8)
    }
}

impl TryFrom<i64> for Priority {
    type Error = PriorityOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Scoring knobs attached to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringProfile {
    pub priority: Priority,
}

/// A named capability profile.
///
/// The name is the registry key; it is carried on the struct so a role can be
/// handed around (and embedded in drafts) without its map entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub purpose: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    pub scoring_profile: ScoringProfile,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        purpose: impl Into<String>,
        responsibilities: Vec<String>,
        priority: Priority,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            purpose: purpose.into(),
            responsibilities,
            scoring_profile: ScoringProfile { priority },
            version: version.into(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.scoring_profile.priority
    }

    /// Lowercased `purpose` followed by every responsibility, space separated.
    pub fn searchable_text(&self) -> String {
        let mut text = self.purpose.to_lowercase();
        for r in &self.responsibilities {
            text.push(' ');
            text.push_str(&r.to_lowercase());
        }
        text
    }
}
