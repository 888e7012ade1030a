//! Published slot -> label snapshot

use super::region::{PREVIEW_SLOT, SLOT_COUNT, is_primary_slot};
use serde::Serialize;
use std::collections::BTreeMap;

/// Immutable mapping of slot index to label.
///
/// Built only through [`RecognitionState::from_assignments`], which rejects
/// duplicate slots and duplicate labels, so a published state always holds at
/// most one label per slot and one slot per label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecognitionState {
    slots: BTreeMap<usize, String>,
}

impl RecognitionState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from (slot, label) pairs, keeping the first claim on any slot or
    /// label and dropping slots outside the defined range.
    pub fn from_assignments<I>(assignments: I) -> Self
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        let mut slots = BTreeMap::new();
        for (slot, label) in assignments {
            if slot >= SLOT_COUNT || slots.contains_key(&slot) || slots.values().any(|l| l == &label)
            {
                log::debug!("Dropping conflicting assignment slot {} -> '{}'", slot, label);
                continue;
            }
            slots.insert(slot, label);
        }
        Self { slots }
    }

    pub fn label_at(&self, slot: usize) -> Option<&str> {
        self.slots.get(&slot).map(String::as_str)
    }

    /// Slot currently holding `label`, searching primary slots only
    pub fn slot_of(&self, label: &str) -> Option<usize> {
        self.slots
            .iter()
            .find(|(slot, l)| is_primary_slot(**slot) && l.as_str() == label)
            .map(|(slot, _)| *slot)
    }

    pub fn preview_label(&self) -> Option<&str> {
        self.label_at(PREVIEW_SLOT)
    }

    pub fn assignments(&self) -> impl Iterator<Item = (usize, &str)> {
        self.slots.iter().map(|(s, l)| (*s, l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Display for RecognitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = (0..SLOT_COUNT)
            .map(|slot| {
                let name = if slot == PREVIEW_SLOT {
                    "next".to_string()
                } else {
                    slot.to_string()
                };
                format!("{}={}", name, self.label_at(slot).unwrap_or("-"))
            })
            .collect();
        write!(f, "[{}]", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_are_dropped() {
        let state = RecognitionState::from_assignments(vec![
            (0, "A".to_string()),
            (0, "B".to_string()),
            (1, "A".to_string()),
            (2, "C".to_string()),
            (9, "D".to_string()),
        ]);
        assert_eq!(state.len(), 2);
        assert_eq!(state.label_at(0), Some("A"));
        assert_eq!(state.label_at(1), None);
        assert_eq!(state.label_at(2), Some("C"));
    }

    #[test]
    fn test_slot_of_ignores_preview() {
        let state = RecognitionState::from_assignments(vec![
            (1, "A".to_string()),
            (PREVIEW_SLOT, "B".to_string()),
        ]);
        assert_eq!(state.slot_of("A"), Some(1));
        assert_eq!(state.slot_of("B"), None);
        assert_eq!(state.preview_label(), Some("B"));
    }

    #[test]
    fn test_display() {
        let state = RecognitionState::from_assignments(vec![(0, "A".to_string())]);
        assert_eq!(state.to_string(), "[0=A 1=- 2=- 3=- next=-]");
    }
}
