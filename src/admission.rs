//! Content admission filter.
//!
//! Classifies recipe content against two word lists before anything is
//! queued. Forbidden words make a recipe unrunnable for everyone and take
//! priority over gating; gated words demote it to the low-priority tier,
//! and only for submitters holding the gate role.

use crate::error::SubmitError;
use crate::queue::Tier;

/// Verdict over a recipe's content. Pure function of the content and the
/// word lists; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No listed words present.
    Clean,
    /// At least one gated word present, no forbidden words.
    Gated,
    /// At least one forbidden word present.
    Forbidden,
}

/// The two word lists a recipe is screened against.
///
/// Words are matched as case-insensitive substrings of the full decoded
/// text, the same way the shell tool screens commands against its blocked
/// patterns.
#[derive(Debug, Clone, Default)]
pub struct WordFilter {
    gated: Vec<String>,
    forbidden: Vec<String>,
}

impl WordFilter {
    /// Create a filter from the two word lists. Words are lower-cased;
    /// empty entries are dropped so they can never match everything.
    pub fn new(gated: Vec<String>, forbidden: Vec<String>) -> Self {
        Self {
            gated: normalize(gated),
            forbidden: normalize(forbidden),
        }
    }

    /// Classify content. No side effects; forbidden beats gated.
    pub fn classify(&self, content: &str) -> Verdict {
        let lower = content.to_lowercase();
        if self.forbidden.iter().any(|w| lower.contains(w)) {
            return Verdict::Forbidden;
        }
        if self.gated.iter().any(|w| lower.contains(w)) {
            return Verdict::Gated;
        }
        Verdict::Clean
    }

    /// Screen a submission: classify the content and apply the submitter's
    /// gate privilege. Returns the queue tier the task belongs in, or the
    /// admission error that refuses it.
    pub fn screen(
        &self,
        name: &str,
        content: &str,
        has_gate_role: bool,
    ) -> Result<Tier, SubmitError> {
        match self.classify(content) {
            Verdict::Forbidden => Err(SubmitError::ContentForbidden {
                name: name.to_string(),
            }),
            Verdict::Gated if !has_gate_role => Err(SubmitError::ContentGatedNoPrivilege {
                name: name.to_string(),
            }),
            Verdict::Gated => Ok(Tier::Low),
            Verdict::Clean => Ok(Tier::Normal),
        }
    }
}

fn normalize(words: Vec<String>) -> Vec<String> {
    words
        .into_iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}
