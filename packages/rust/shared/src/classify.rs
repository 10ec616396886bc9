//! Prefix classification of annotation texts.
//!
//! An annotation is recognized when its trimmed text starts with `Q`, `A`,
//! or `→`, each optionally followed by a full-width (`：`) or half-width
//! (`:`) colon and whitespace. Matching is case-sensitive and anchored at
//! the start; evaluation order is fixed Q → A → →, so exactly one class
//! applies to any text.

use serde::{Deserialize, Serialize};

/// Classification tag of a single annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationClass {
    /// `Q`-prefixed: a question.
    Question,
    /// `A`-prefixed: an answer.
    Answer,
    /// `→`-prefixed: a follow-up remark.
    FollowUp,
    /// No recognized prefix.
    Other,
}

impl AnnotationClass {
    /// Classes checked in fixed priority order.
    const RECOGNIZED: [AnnotationClass; 3] = [Self::Question, Self::Answer, Self::FollowUp];

    /// The literal the class is matched on.
    fn marker(&self) -> &'static str {
        match self {
            Self::Question => "Q",
            Self::Answer => "A",
            Self::FollowUp => "→",
            Self::Other => "",
        }
    }

    /// Canonical display prefix used when re-emitting a classified member.
    pub fn display_prefix(&self) -> &'static str {
        match self {
            Self::Question => "Q：",
            Self::Answer => "A：",
            Self::FollowUp => "→：",
            Self::Other => "",
        }
    }

    /// Whether the class counts toward thread validity.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// Classify a raw annotation text. Total: every input maps to exactly one
/// class, determined solely by the trimmed text's start.
pub fn classify(text: &str) -> AnnotationClass {
    match split_prefixed(text) {
        Some((class, _)) => class,
        None => AnnotationClass::Other,
    }
}

/// Split a recognized text into its class and the content after the prefix
/// (marker, optional colon, following whitespace all stripped). Returns
/// `None` for unrecognized texts.
pub fn split_prefixed(text: &str) -> Option<(AnnotationClass, &str)> {
    let trimmed = text.trim();
    for class in AnnotationClass::RECOGNIZED {
        if let Some(rest) = trimmed.strip_prefix(class.marker()) {
            let rest = rest
                .strip_prefix('：')
                .or_else(|| rest.strip_prefix(':'))
                .unwrap_or(rest);
            return Some((class, rest.trim_start()));
        }
    }
    None
}
