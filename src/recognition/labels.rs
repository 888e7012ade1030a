//! The active set of known labels

use super::error::{RecognitionError, RecognitionResult};
use serde::Serialize;

/// Number of labels the host supplies.
pub const LABEL_COUNT: usize = 8;

/// Ordered list of exactly [`LABEL_COUNT`] unique, non-empty label names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(names: I) -> RecognitionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.into().trim().to_string())
            .collect();

        let invalid = |description: String| RecognitionError::InvalidLabelSet {
            expected: LABEL_COUNT,
            description,
        };

        if names.len() != LABEL_COUNT {
            return Err(invalid(format!("got {} names", names.len())));
        }
        if names.iter().any(|n| n.is_empty()) {
            return Err(invalid("empty label name".to_string()));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].iter().any(|other| other.eq_ignore_ascii_case(name)) {
                return Err(invalid(format!("duplicate label '{}'", name)));
            }
            // Each label persists to its own `<slug>` file
            let stem = slug(name);
            if let Some(other) = names[..i].iter().find(|other| slug(other) == stem) {
                return Err(invalid(format!(
                    "'{}' and '{}' share the file name '{}'",
                    other, name, stem
                )));
            }
        }

        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, label: &str) -> bool {
        self.names.iter().any(|n| n == label)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.names.iter().position(|n| n == label)
    }

    /// Map a free-form answer onto a known label: exact match first, then
    /// case-insensitive after trimming. Anything else is rejected.
    pub fn resolve(&self, answer: &str) -> Option<&str> {
        let answer = answer.trim();
        self.names
            .iter()
            .find(|n| n.as_str() == answer)
            .or_else(|| self.names.iter().find(|n| n.eq_ignore_ascii_case(answer)))
            .map(String::as_str)
    }

    /// Same labels in the same order
    pub fn same_as(&self, other: &LabelSet) -> bool {
        self.names == other.names
    }
}

/// Filesystem-safe file stem for a label: lowercase ASCII alphanumerics,
/// every other run of characters collapsed to a single underscore.
pub fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_sep = false;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        // Non-ASCII names still need a stable, distinct stem.
        let hash = label
            .bytes()
            .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
        out = format!("label_{:016x}", hash);
    }
    out
}
