//! Query intent classification.
//!
//! [`classify`] decides which retrieval strategy a question needs:
//!
//! - [`QueryIntent::Definition`] when the question asks what a term means
//!   and a term can be extracted,
//! - [`QueryIntent::Section`] when it names a section number,
//! - [`QueryIntent::General`] otherwise.
//!
//! Definition detection is tried first. A question such as
//! `"what is the definition of section 2?"` is therefore a definition
//! query for the term `"section 2"`, not a section dump.
//!
//! Classification is a pure function of the input string.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::models::QueryKind;

const DEFINITION_KEYWORDS: [&str; 6] = [
    "definition",
    "define",
    "meaning",
    "means",
    "what is",
    "what does",
];

/// Term extraction patterns, tried in order. Group 1 is the term.
static TERM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"definition\s+of\s+["']?(\w+(?:\s+\w+)*)["']?"#,
        r#"meaning\s+of\s+["']?(\w+(?:\s+\w+)*)["']?"#,
        r#"define\s+["']?(\w+(?:\s+\w+)*)["']?"#,
        r#"what\s+does\s+["']?(\w+(?:\s+\w+)*?)["']?\s+mean"#,
        r#"what\s+is\s+(?:a\s+|an\s+)?["']?(\w+(?:\s+\w+)*)["']?"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static SECTION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"section\s+(\d+)").ok());

/// The retrieval strategy chosen for a question, with its parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum QueryIntent {
    /// Look the term up in the statute's definitions section.
    Definition { term: String },
    /// Fetch a section by its canonical zero-padded key (e.g. `"017"`).
    Section { number: String },
    /// Free-text question answered by semantic search.
    General { text: String },
}

impl QueryIntent {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryIntent::Definition { .. } => QueryKind::Definition,
            QueryIntent::Section { .. } => QueryKind::Section,
            QueryIntent::General { .. } => QueryKind::General,
        }
    }

    /// True for the intents served by structural direct lookup.
    pub fn is_direct(&self) -> bool {
        !matches!(self, QueryIntent::General { .. })
    }
}

/// Classify a raw question.
///
/// # Examples
///
/// ```rust
/// use lexguard_core::classifier::{classify, QueryIntent};
///
/// assert_eq!(
///     classify("section 17"),
///     QueryIntent::Section { number: "017".into() }
/// );
/// assert_eq!(
///     classify("What is the definition of memorandum?"),
///     QueryIntent::Definition { term: "memorandum".into() }
/// );
/// ```
pub fn classify(query: &str) -> QueryIntent {
    let lowered = query.to_lowercase();

    if is_definition_question(&lowered) {
        if let Some(term) = extract_term(&lowered) {
            return QueryIntent::Definition { term };
        }
        debug!(query, "classification_ambiguous: definition keyword without extractable term");
    }

    if let Some(number) = extract_section(&lowered) {
        return QueryIntent::Section { number };
    }

    QueryIntent::General {
        text: query.trim().to_string(),
    }
}

fn is_definition_question(lowered: &str) -> bool {
    DEFINITION_KEYWORDS.iter().any(|k| lowered.contains(k))
}

fn extract_term(lowered: &str) -> Option<String> {
    TERM_PATTERNS.iter().find_map(|re| {
        re.captures(lowered)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

fn extract_section(lowered: &str) -> Option<String> {
    let re = SECTION_PATTERN.as_ref()?;
    let digits = re.captures(lowered)?.get(1)?.as_str();
    Some(canonical_section(digits))
}

/// Canonical section key: leading zeros normalised, padded to 3 digits.
pub fn canonical_section(digits: &str) -> String {
    let trimmed = digits.trim().trim_start_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{:0>3}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_section_query_padded() {
        assert_eq!(
            classify("section 17"),
            QueryIntent::Section {
                number: "017".into()
            }
        );
        assert_eq!(
            classify("Explain Section 2 please"),
            QueryIntent::Section {
                number: "002".into()
            }
        );
        assert_eq!(
            classify("section 0149 compliance"),
            QueryIntent::Section {
                number: "149".into()
            }
        );
        assert_eq!(
            classify("section 1234"),
            QueryIntent::Section {
                number: "1234".into()
            }
        );
    }

    #[test]
    fn test_definition_of_term() {
        assert_eq!(
            classify("What is the definition of memorandum?"),
            QueryIntent::Definition {
                term: "memorandum".into()
            }
        );
        assert_eq!(
            classify("Define 'small company'"),
            QueryIntent::Definition {
                term: "small company".into()
            }
        );
        assert_eq!(
            classify("meaning of debenture"),
            QueryIntent::Definition {
                term: "debenture".into()
            }
        );
        assert_eq!(
            classify("What is a private company?"),
            QueryIntent::Definition {
                term: "private company".into()
            }
        );
        assert_eq!(
            classify("What does promoter mean?"),
            QueryIntent::Definition {
                term: "promoter".into()
            }
        );
    }

    #[test]
    fn test_definition_takes_precedence_over_section() {
        // Documented choice: definition detection wins when both match.
        assert_eq!(
            classify("what is the definition of section 2?"),
            QueryIntent::Definition {
                term: "section 2".into()
            }
        );
    }

    #[test]
    fn test_keyword_without_term_degrades() {
        // "means" matches a definition keyword but no extraction pattern.
        assert_eq!(
            classify("By what means is a resolution passed?"),
            QueryIntent::General {
                text: "By what means is a resolution passed?".into()
            }
        );
        // ...and still falls through to section detection.
        assert_eq!(
            classify("what section 17 means"),
            QueryIntent::Section {
                number: "017".into()
            }
        );
    }

    #[test]
    fn test_general_query() {
        let intent = classify("How to register a company?");
        assert_eq!(
            intent,
            QueryIntent::General {
                text: "How to register a company?".into()
            }
        );
        assert_eq!(intent.kind(), QueryKind::General);
        assert!(!intent.is_direct());
    }

    #[test]
    fn test_canonical_section() {
        assert_eq!(canonical_section("2"), "002");
        assert_eq!(canonical_section("000"), "000");
        assert_eq!(canonical_section("017"), "017");
    }

    proptest! {
        #[test]
        fn classification_is_deterministic(q in ".{0,80}") {
            prop_assert_eq!(classify(&q), classify(&q));
        }

        #[test]
        fn section_numbers_always_canonical(n in 0u32..5000) {
            match classify(&format!("section {}", n)) {
                QueryIntent::Section { number } => {
                    prop_assert!(number.len() >= 3);
                    prop_assert_eq!(number.parse::<u32>().unwrap(), n);
                }
                other => prop_assert!(false, "unexpected intent {:?}", other),
            }
        }
    }
}
