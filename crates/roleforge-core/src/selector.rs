//! Heuristic role selection.
//!
//! Scores every role in a [`Registry`] against a free-text task description,
//! calibrates the score into a confidence with a logistic curve and returns a
//! ranked shortlist. Selection is a pure function of `(task, registry)`.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::negotiator::Opinion;
use crate::registry::Registry;
use crate::role::Role;

/// Tokens must be longer than this (in chars) to count as keywords.
pub const MIN_KEYWORD_CHARS: usize = 3;

/// Raw score at which calibrated confidence is exactly 0.5.
pub const CALIBRATION_MIDPOINT: f64 = 1.0;

/// A single scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub role: String,
    pub raw_score: f64,
    pub confidence: f64,
    pub explanation: String,
}

impl Selection {
    /// Present this candidate as an opinion held by `actor`.
    pub fn to_opinion(&self, actor: impl Into<String>) -> Opinion {
        Opinion {
            role: self.role.clone(),
            confidence: self.confidence,
            actor: actor.into(),
        }
    }
}

/// Logistic calibration centred on [`CALIBRATION_MIDPOINT`].
pub fn calibrate(raw_score: f64) -> f64 {
    1.0 / (1.0 + (-(raw_score - CALIBRATION_MIDPOINT)).exp())
}

/// Distinct lowercase whitespace-separated tokens of `text`.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Stateless scorer over a registry snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selector;

impl Selector {
    pub fn new() -> Self {
        Self
    }

    /// Rank every role for `task` and keep the best `top_k`.
    ///
    /// Ordering is by descending confidence, then ascending role name, so the
    /// result never depends on map iteration order.
    pub fn select(&self, task: &str, registry: &Registry, top_k: NonZeroUsize) -> Vec<Selection> {
        let tokens = tokenize(task);
        let mut scored: Vec<Selection> = registry.roles().map(|r| score_role(r, &tokens)).collect();

        scored.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.role.cmp(&b.role))
        });
        scored.truncate(top_k.get());

        if let Some(top) = scored.first() {
            crate::obs::emit_selection(&top.role, top.confidence, scored.len());
        }
        scored
    }

    /// Run [`Selector::select`] and express each candidate as an opinion by `actor`.
    pub fn opinions(
        &self,
        task: &str,
        registry: &Registry,
        top_k: NonZeroUsize,
        actor: &str,
    ) -> Vec<Opinion> {
        self.select(task, registry, top_k)
            .iter()
            .map(|s| s.to_opinion(actor))
            .collect()
    }
}

fn score_role(role: &Role, tokens: &BTreeSet<String>) -> Selection {
    let haystack = role.searchable_text();
    let matched: Vec<&str> = tokens
        .iter()
        .filter(|t| t.chars().count() > MIN_KEYWORD_CHARS && haystack.contains(t.as_str()))
        .map(String::as_str)
        .collect();

    let priority = role.priority();
    let raw_score = matched.len() as f64 * priority.weight();
    let confidence = calibrate(raw_score);

    let explanation = if matched.is_empty() {
        format!("no keyword matches; priority {priority}/10")
    } else {
        format!(
            "matched {} keyword(s) [{}]; priority {priority}/10",
            matched.len(),
            matched.join(", ")
        )
    };

    Selection {
        role: role.name.clone(),
        raw_score,
        confidence,
        explanation,
    }
}
