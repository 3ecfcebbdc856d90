//! Opinion arbitration.
//!
//! Reduces a set of [`Opinion`]s to exactly one [`Decision`] using two tiers
//! before giving up:
//!
//! 1. **Fast accept**: the single most confident opinion meets the threshold.
//! 2. **Weighted vote**: confidences summed per role; the heaviest role meets
//!    the threshold.
//! 3. **Escalate**: neither tier is satisfied; the full weight table is
//!    handed to a human. A low-confidence consensus is never committed.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Threshold used when callers do not supply one.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Errors produced by [`Negotiator::arbitrate`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArbitrationError {
    #[error("cannot arbitrate an empty opinion set")]
    EmptyOpinions,

    #[error("opinion from {actor} has confidence {value}, expected a value in [0, 1]")]
    InvalidConfidence { actor: String, value: f64 },

    #[error("threshold {0} is outside (0, 1]")]
    InvalidThreshold(f64),
}

pub type ArbitrationResult<T> = std::result::Result<T, ArbitrationError>;

/// One scorer's claim that `role` fits the task with `confidence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub role: String,
    pub confidence: f64,
    pub actor: String,
}

impl Opinion {
    /// Construct a validated opinion.
    pub fn new(
        role: impl Into<String>,
        confidence: f64,
        actor: impl Into<String>,
    ) -> ArbitrationResult<Self> {
        let op = Self {
            role: role.into(),
            confidence,
            actor: actor.into(),
        };
        op.validate()?;
        Ok(op)
    }

    /// Opinions can arrive deserialized from other agents, so the range is
    /// rechecked before arbitration.
    pub fn validate(&self) -> ArbitrationResult<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ArbitrationError::InvalidConfidence {
                actor: self.actor.clone(),
                value: self.confidence,
            });
        }
        Ok(())
    }
}

/// Outcome of a single arbitration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Accept { role: String, confidence: f64 },
    Voted { role: String, weight: f64 },
    Escalate { votes: BTreeMap<String, f64> },
}

impl Decision {
    /// The chosen role, or `None` when escalated.
    pub fn role(&self) -> Option<&str> {
        match self {
            Decision::Accept { role, .. } | Decision::Voted { role, .. } => Some(role),
            Decision::Escalate { .. } => None,
        }
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, Decision::Escalate { .. })
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Accept { .. } => "accept",
            Decision::Voted { .. } => "voted",
            Decision::Escalate { .. } => "escalate",
        }
    }
}

/// Arbiter configured with an acceptance threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Negotiator {
    threshold: f64,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Negotiator {
    /// Create an arbiter; `threshold` must lie in `(0, 1]`.
    pub fn new(threshold: f64) -> ArbitrationResult<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ArbitrationError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide on a single outcome for `opinions`.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::EmptyOpinions`] for an empty slice and
    /// [`ArbitrationError::InvalidConfidence`] for any opinion outside `[0, 1]`.
    pub fn arbitrate(&self, opinions: &[Opinion]) -> ArbitrationResult<Decision> {
        if opinions.is_empty() {
            return Err(ArbitrationError::EmptyOpinions);
        }
        for op in opinions {
            op.validate()?;
        }

        let mut ranked: Vec<&Opinion> = opinions.iter().collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.actor.cmp(&b.actor))
        });

        let top = ranked[0];
        if top.confidence >= self.threshold {
            let decision = Decision::Accept {
                role: top.role.clone(),
                confidence: top.confidence,
            };
            crate::obs::emit_decision(&decision, opinions.len());
            return Ok(decision);
        }

        let mut votes: BTreeMap<String, f64> = BTreeMap::new();
        for op in &ranked {
            *votes.entry(op.role.clone()).or_insert(0.0) += op.confidence;
        }

        // Ascending name iteration plus strict `>` keeps the first name on ties.
        let mut winner: Option<(&String, f64)> = None;
        for (role, &weight) in &votes {
            if winner.map_or(true, |(_, best)| weight > best) {
                winner = Some((role, weight));
            }
        }

        let decision = match winner {
            Some((role, weight)) if weight >= self.threshold => Decision::Voted {
                role: role.clone(),
                weight,
            },
            _ => Decision::Escalate { votes },
        };
        crate::obs::emit_decision(&decision, opinions.len());
        Ok(decision)
    }
}

/// Arbitrate with [`DEFAULT_THRESHOLD`].
pub fn arbitrate(opinions: &[Opinion]) -> ArbitrationResult<Decision> {
    Negotiator::default().arbitrate(opinions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(role: &str, confidence: f64, actor: &str) -> Opinion {
        Opinion::new(role, confidence, actor).unwrap()
    }

    #[test]
    fn test_empty_opinions_fail() {
        assert_eq!(arbitrate(&[]), Err(ArbitrationError::EmptyOpinions));
    }

    #[test]
    fn test_single_strong_opinion_is_accepted() {
        let decision = arbitrate(&[op("A", 0.9, "x")]).unwrap();
        assert_eq!(
            decision,
            Decision::Accept {
                role: "A".to_string(),
                confidence: 0.9
            }
        );
    }

    #[test]
    fn test_threshold_is_inclusive_for_accept() {
        let decision = arbitrate(&[op("A", 0.7, "x")]).unwrap();
        assert_eq!(decision.outcome(), "accept");
    }

    #[test]
    fn test_weighted_vote_wins_when_aggregate_meets_threshold() {
        let decision = arbitrate(&[
            op("A", 0.4, "x"),
            op("A", 0.35, "y"),
            op("B", 0.3, "z"),
        ])
        .unwrap();
        match decision {
            Decision::Voted { role, weight } => {
                assert_eq!(role, "A");
                assert!((weight - 0.75).abs() < 1e-9);
            }
            other => panic!("expected Voted, got {other:?}"),
        }
    }

    #[test]
    fn test_low_confidence_escalates_with_full_table() {
        let decision = arbitrate(&[op("A", 0.2, "x"), op("B", 0.25, "y")]).unwrap();
        match decision {
            Decision::Escalate { votes } => {
                assert_eq!(votes.len(), 2);
                assert!((votes["A"] - 0.2).abs() < 1e-12);
                assert!((votes["B"] - 0.25).abs() < 1e-12);
            }
            other => panic!("expected Escalate, got {other:?}"),
        }
    }

    #[test]
    fn test_vote_tie_breaks_by_role_name() {
        let negotiator = Negotiator::new(0.5).unwrap();
        let decision = negotiator
            .arbitrate(&[
                op("beta", 0.3, "a"),
                op("alpha", 0.3, "b"),
                op("beta", 0.3, "c"),
                op("alpha", 0.3, "d"),
            ])
            .unwrap();
        assert_eq!(decision.role(), Some("alpha"));
    }

    #[test]
    fn test_accept_tie_breaks_by_actor() {
        let decision = arbitrate(&[op("B", 0.8, "zed"), op("A", 0.8, "amy")]).unwrap();
        assert_eq!(decision.role(), Some("A"));
    }

    #[test]
    fn test_out_of_range_confidence_is_rejected() {
        assert!(matches!(
            Opinion::new("A", 1.2, "x"),
            Err(ArbitrationError::InvalidConfidence { .. })
        ));
        let sneaky = Opinion {
            role: "A".to_string(),
            confidence: f64::NAN,
            actor: "x".to_string(),
        };
        assert!(matches!(
            arbitrate(&[sneaky]),
            Err(ArbitrationError::InvalidConfidence { .. })
        ));
    }

    #[test]
    fn test_invalid_thresholds_are_rejected() {
        assert!(Negotiator::new(0.0).is_err());
        assert!(Negotiator::new(1.01).is_err());
        assert!(Negotiator::new(f64::NAN).is_err());
        assert!(Negotiator::new(1.0).is_ok());
    }

    #[test]
    fn test_decision_serializes_with_outcome_tag() {
        let json = serde_json::to_value(Decision::Voted {
            role: "A".to_string(),
            weight: 0.75,
        })
        .unwrap();
        assert_eq!(json["outcome"], "voted");
        assert_eq!(json["role"], "A");
    }
}
