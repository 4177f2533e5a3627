//! Turn free-form model output into a validated [`Artifact`].
//!
//! Strategies are tried in a fixed order and the first one that yields the
//! expected JSON shape wins:
//!
//! 1. the whole response
//! 2. the interior of the first fenced code block
//! 3. the first balanced `{...}` fragment anywhere in the text
//!
//! Nothing is ever substituted when all three fail. Validation runs once on
//! the winning candidate and rejects the whole artifact if any item is bad.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::artifact::{Artifact, ArtifactItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    Direct,
    FencedBlock,
    BraceScan,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no structured content found in response")]
    NoStructuredContent,

    #[error("artifact has no items")]
    Empty,

    #[error("item {index}: {reason}")]
    InvalidItem { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    #[serde(alias = "exercises")]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default, alias = "exercise")]
    name: Option<String>,
    #[serde(default, alias = "weight")]
    primary: Option<Value>,
    #[serde(default, alias = "reps")]
    secondary: Option<Value>,
}

/// Parse and validate a generation response.
pub fn parse_artifact(response: &str) -> Result<(Artifact, ParseStrategy), ParseError> {
    let (raw, strategy) = locate(response).ok_or(ParseError::NoStructuredContent)?;
    Ok((validate(raw)?, strategy))
}

fn locate(response: &str) -> Option<(RawArtifact, ParseStrategy)> {
    if let Ok(raw) = serde_json::from_str::<RawArtifact>(response.trim()) {
        return Some((raw, ParseStrategy::Direct));
    }

    if let Some(block) = fenced_block(response) {
        if let Ok(raw) = serde_json::from_str::<RawArtifact>(block) {
            return Some((raw, ParseStrategy::FencedBlock));
        }
    }

    let fragment = first_object(response)?;
    serde_json::from_str::<RawArtifact>(fragment)
        .ok()
        .map(|raw| (raw, ParseStrategy::BraceScan))
}

fn validate(raw: RawArtifact) -> Result<Artifact, ParseError> {
    if raw.items.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut items = Vec::with_capacity(raw.items.len());
    for (index, item) in raw.items.into_iter().enumerate() {
        let invalid = |reason: &str| ParseError::InvalidItem {
            index,
            reason: reason.to_string(),
        };

        let name = item
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid("missing name"))?;

        let primary = match item.primary {
            Some(value) => number(&value).ok_or_else(|| invalid("primary quantity is not a number"))?,
            None => return Err(invalid("missing primary quantity")),
        };

        let secondary = match item.secondary {
            None | Some(Value::Null) => None,
            Some(value) => {
                Some(number(&value).ok_or_else(|| invalid("secondary quantity is not a number"))?)
            }
        };

        items.push(ArtifactItem {
            name,
            primary,
            secondary,
        });
    }

    Ok(Artifact::new(items))
}

fn number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}

/// Interior of the first ``` fenced block, skipping a language tag.
fn fenced_block(response: &str) -> Option<&str> {
    let start = response.find("```")? + 3;
    let rest = &response[start..];
    // Skip the language identifier line if present
    let body_start = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains("```") => newline + 1,
        _ => 0,
    };
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// First balanced `{...}` fragment, ignoring braces inside JSON strings.
fn first_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in response[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{"items":[{"name":"Squat","primary":100,"secondary":5},{"name":"Plank","primary":60}]}"#;

    mod strategy_order_tests {
        use super::*;

        #[test]
        fn valid_json_parses_directly() {
            let (artifact, strategy) = parse_artifact(PLAN).unwrap();
            assert_eq!(strategy, ParseStrategy::Direct);
            assert_eq!(artifact.len(), 2);
            assert_eq!(artifact.items[1].secondary, None);
        }

        #[test]
        fn direct_wins_even_when_content_contains_a_fence() {
            let text = r#"{"items":[{"name":"```json {\"items\":[]} ```","primary":1}]}"#;
            let (artifact, strategy) = parse_artifact(text).unwrap();
            assert_eq!(strategy, ParseStrategy::Direct);
            assert!(artifact.items[0].name.starts_with("```"));
        }

        #[test]
        fn fenced_block_used_when_direct_fails() {
            let text = format!("Here is your plan:\n```json\n{}\n```\nGood luck!", PLAN);
            let (artifact, strategy) = parse_artifact(&text).unwrap();
            assert_eq!(strategy, ParseStrategy::FencedBlock);
            assert_eq!(artifact.items[0].name, "Squat");
        }

        #[test]
        fn fenced_block_without_language_tag() {
            let text = format!("```\n{}\n```", PLAN);
            let (_, strategy) = parse_artifact(&text).unwrap();
            assert_eq!(strategy, ParseStrategy::FencedBlock);
        }

        #[test]
        fn scan_finds_first_bracketed_object() {
            let text = format!(
                "Sure! {} and an unrelated {{\"items\":[{{\"name\":\"Row\",\"primary\":1}}]}}",
                PLAN
            );
            let (artifact, strategy) = parse_artifact(&text).unwrap();
            assert_eq!(strategy, ParseStrategy::BraceScan);
            assert_eq!(artifact.items[0].name, "Squat", "first object wins");
        }

        #[test]
        fn scan_handles_braces_inside_strings() {
            let text = r#"Plan: {"items":[{"name":"Curl {EZ}","primary":20}]} done"#;
            let (artifact, strategy) = parse_artifact(text).unwrap();
            assert_eq!(strategy, ParseStrategy::BraceScan);
            assert_eq!(artifact.items[0].name, "Curl {EZ}");
        }

        #[test]
        fn scan_used_when_fence_holds_garbage() {
            let text = format!("```\nnot json\n```\n{}", PLAN);
            let (_, strategy) = parse_artifact(&text).unwrap();
            assert_eq!(strategy, ParseStrategy::BraceScan);
        }

        #[test]
        fn no_json_is_a_failure() {
            assert_eq!(
                parse_artifact("I could not come up with a plan today."),
                Err(ParseError::NoStructuredContent)
            );
        }

        #[test]
        fn unbalanced_object_is_a_failure() {
            assert_eq!(
                parse_artifact(r#"{"items":[{"name":"Squat""#),
                Err(ParseError::NoStructuredContent)
            );
        }
    }

    mod validation_tests {
        use super::*;

        #[test]
        fn accepts_legacy_field_names() {
            let text = r#"{"exercises":[{"exercise":"Bench","weight":80,"reps":8}]}"#;
            let (artifact, _) = parse_artifact(text).unwrap();
            assert_eq!(artifact.items[0], ArtifactItem::new("Bench", 80.0, Some(8.0)));
        }

        #[test]
        fn missing_name_fails_whole_artifact() {
            let text = r#"{"items":[{"name":"Squat","primary":100},{"primary":50}]}"#;
            assert_eq!(
                parse_artifact(text),
                Err(ParseError::InvalidItem {
                    index: 1,
                    reason: "missing name".to_string()
                })
            );
        }

        #[test]
        fn blank_name_is_missing() {
            let text = r#"{"items":[{"name":"   ","primary":100}]}"#;
            assert!(matches!(
                parse_artifact(text),
                Err(ParseError::InvalidItem { index: 0, .. })
            ));
        }

        #[test]
        fn missing_primary_fails() {
            let text = r#"{"items":[{"name":"Squat","secondary":5}]}"#;
            assert!(matches!(
                parse_artifact(text),
                Err(ParseError::InvalidItem { index: 0, .. })
            ));
        }

        #[test]
        fn non_numeric_primary_fails() {
            let text = r#"{"items":[{"name":"Squat","primary":"heavy"}]}"#;
            assert!(matches!(
                parse_artifact(text),
                Err(ParseError::InvalidItem { index: 0, .. })
            ));
        }

        #[test]
        fn null_secondary_is_absent() {
            let text = r#"{"items":[{"name":"Plank","primary":45,"secondary":null}]}"#;
            let (artifact, _) = parse_artifact(text).unwrap();
            assert_eq!(artifact.items[0].secondary, None);
        }

        #[test]
        fn non_numeric_secondary_fails() {
            let text = r#"{"items":[{"name":"Squat","primary":100,"secondary":"five"}]}"#;
            assert!(parse_artifact(text).is_err());
        }

        #[test]
        fn empty_items_fail() {
            assert_eq!(parse_artifact(r#"{"items":[]}"#), Err(ParseError::Empty));
        }

        #[test]
        fn values_are_not_rounded() {
            let text = r#"{"items":[{"name":"Curl","primary":12.75,"secondary":10}]}"#;
            let (artifact, _) = parse_artifact(text).unwrap();
            assert_eq!(artifact.items[0].primary, 12.75);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(128))]

            /// Property: arbitrary text never panics the parser
            #[test]
            fn prop_arbitrary_text_does_not_panic(text in "\\PC{0,200}") {
                let _ = parse_artifact(&text);
            }

            /// Property: a plan surrounded by brace-free prose is recovered exactly
            #[test]
            fn prop_plan_in_prose_is_recovered(
                prefix in "[a-zA-Z ,.!]{0,40}",
                suffix in "[a-zA-Z ,.!]{0,40}",
                quarters in 0u32..2000,
                secondary in proptest::option::of(1u32..30),
            ) {
                let item = ArtifactItem::new("Squat", f64::from(quarters) * 0.25, secondary.map(f64::from));
                let json = serde_json::to_string(&Artifact::new(vec![item.clone()])).unwrap();
                let text = format!("{}{}{}", prefix, json, suffix);

                let (artifact, _) = parse_artifact(&text).unwrap();
                prop_assert_eq!(artifact.items, vec![item]);
            }
        }
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn fenced_block_extraction() {
            assert_eq!(fenced_block("```json\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
            assert_eq!(
                fenced_block("Result:\n```\n{\"a\": 1}\n```\nDone!"),
                Some("{\"a\": 1}")
            );
            assert_eq!(fenced_block("no fences here"), None);
            assert_eq!(fenced_block("```json\nunterminated"), None);
        }

        #[test]
        fn first_object_extraction() {
            assert_eq!(first_object("x {\"a\":{\"b\":1}} y {}"), Some("{\"a\":{\"b\":1}}"));
            assert_eq!(first_object(r#"{"s":"\"}"}"#), Some(r#"{"s":"\"}"}"#));
            assert_eq!(first_object("none"), None);
        }
    }
}
