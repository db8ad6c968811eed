use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Class labels, index-aligned with the model's output vector.
pub const CLASS_NAMES: [&str; 4] = ["healthy", "leaf_blight", "rust", "pest_damage"];

/// Below this best-class score the label is reported as [`UNCERTAIN_LABEL`].
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const UNCERTAIN_LABEL: &str = "uncertain";

const TOP_K: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum RankError {
    #[error("model returned no scores")]
    Empty,

    #[error("model returned {actual} scores, expected {expected}")]
    Length { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    pub top3: Vec<ScoredLabel>,
}

impl Prediction {
    pub fn is_uncertain(&self) -> bool {
        self.label == UNCERTAIN_LABEL
    }
}

// NaN ranks below every number so it never wins.
fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Ranks a score vector against [`CLASS_NAMES`].
pub fn rank(scores: &[f32]) -> Result<Prediction, RankError> {
    rank_with(scores, &CLASS_NAMES)
}

/// Ranks `scores` against `labels`. Ties keep the lower index first, so the
/// best class is always `top3[0]`.
pub fn rank_with(scores: &[f32], labels: &[&str]) -> Result<Prediction, RankError> {
    if scores.is_empty() {
        return Err(RankError::Empty);
    }
    if scores.len() != labels.len() {
        return Err(RankError::Length {
            expected: labels.len(),
            actual: scores.len(),
        });
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| by_score_desc(scores[a], scores[b]));

    let top3: Vec<ScoredLabel> = order
        .iter()
        .take(TOP_K)
        .map(|&i| ScoredLabel {
            label: labels[i].to_string(),
            confidence: scores[i],
        })
        .collect();

    let best = &top3[0];
    let label = if best.confidence >= CONFIDENCE_THRESHOLD {
        best.label.clone()
    } else {
        UNCERTAIN_LABEL.to_string()
    };

    Ok(Prediction {
        label,
        confidence: best.confidence,
        top3,
    })
}
