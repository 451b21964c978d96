//! Slot-availability classification.
//!
//! The driver extracts bare facts about each slot element in the page (text,
//! class list, disabled flag); classification over those facts is pure so it
//! can be tested against fixtures without a browser. The bias is deliberate:
//! an ambiguous element counts as unavailable, a false negative costs one
//! poll interval while a false positive triggers a bogus booking attempt.

use serde::Deserialize;

/// Markers that force an element to count as unavailable. Checked before the
/// availability markers so that e.g. "unavailable" never matches "available".
const UNAVAILABLE_MARKERS: &[&str] = &[
    "unavailable",
    "not available",
    "no slots",
    "no appointments",
    "fully booked",
    "sold out",
];

/// Positive markers; at least one must be present for an element to qualify.
const AVAILABLE_MARKERS: &[&str] = &["available", "book", "select", "open"];

/// Facts extracted from one slot-indicator element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlotFacts {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Whether one slot element counts as an open, bookable slot.
pub fn is_available(facts: &SlotFacts) -> bool {
    if facts.disabled {
        return false;
    }

    let haystack = format!("{} {}", facts.text, facts.class_name).to_lowercase();

    if UNAVAILABLE_MARKERS.iter().any(|m| haystack.contains(m)) {
        return false;
    }

    AVAILABLE_MARKERS.iter().any(|m| haystack.contains(m))
}

/// Index of the first qualifying slot element, if any.
pub fn first_available(facts: &[SlotFacts]) -> Option<usize> {
    facts.iter().position(is_available)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Facts as the in-page extraction script would produce them for a slot
    // listing where everything is taken.
    const ALL_UNAVAILABLE: &str = r#"[
        {"text": "09:00 — No slots available", "class_name": "slot", "disabled": false},
        {"text": "10:00", "class_name": "slot slot--unavailable", "disabled": false},
        {"text": "11:00 Book now", "class_name": "slot", "disabled": true},
        {"text": "Fully booked", "class_name": "slot", "disabled": false}
    ]"#;

    // Same listing with one genuinely open slot at index 2.
    const ONE_OPEN: &str = r#"[
        {"text": "09:00", "class_name": "slot slot--unavailable", "disabled": false},
        {"text": "10:00", "class_name": "slot", "disabled": true},
        {"text": "11:00 — Book now", "class_name": "slot slot--available", "disabled": false},
        {"text": "12:00 — Select", "class_name": "slot", "disabled": false}
    ]"#;

    fn parse(json: &str) -> Vec<SlotFacts> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_all_unavailable_fixture_yields_no_slot() {
        let facts = parse(ALL_UNAVAILABLE);
        assert!(facts.iter().all(|f| !is_available(f)));
        assert_eq!(first_available(&facts), None);
    }

    #[test]
    fn test_open_fixture_yields_first_qualifying_slot() {
        let facts = parse(ONE_OPEN);
        assert_eq!(first_available(&facts), Some(2));
    }

    #[test]
    fn test_unavailable_marker_beats_available_marker() {
        // "unavailable" contains "available"; the negative marker wins.
        let facts = SlotFacts {
            text: "Currently unavailable".to_string(),
            class_name: "slot".to_string(),
            disabled: false,
        };
        assert!(!is_available(&facts));
    }

    #[test]
    fn test_disabled_element_never_qualifies() {
        let facts = SlotFacts {
            text: "Book this slot".to_string(),
            class_name: "slot available".to_string(),
            disabled: true,
        };
        assert!(!is_available(&facts));
    }

    #[test]
    fn test_ambiguous_element_counts_as_unavailable() {
        // Neither marker set matches: bias toward the false negative.
        let facts = SlotFacts {
            text: "09:30".to_string(),
            class_name: "slot".to_string(),
            disabled: false,
        };
        assert!(!is_available(&facts));
    }

    #[test]
    fn test_class_markers_count_like_text_markers() {
        let facts = SlotFacts {
            text: "10:15".to_string(),
            class_name: "slot slot--open".to_string(),
            disabled: false,
        };
        assert!(is_available(&facts));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let facts = SlotFacts {
            text: "BOOK NOW".to_string(),
            class_name: String::new(),
            disabled: false,
        };
        assert!(is_available(&facts));
    }
}
