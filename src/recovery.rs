//! Turning model text into a roadmap.
//!
//! Each step either hands its output to the next or stops the pipeline:
//! strip fences, slice out the array, parse strictly, repair and re-parse,
//! then check the roadmap shape.

use serde_json::Value;

use crate::repair;
use crate::roadmap::{RoadmapWeek, EXPECTED_WEEKS};

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("no JSON array found in model output")]
    NoArray,

    #[error("model output is not valid JSON even after repair: {0}")]
    Unparseable(#[source] serde_json::Error),

    #[error("model output does not match the roadmap shape: {0}")]
    Shape(#[source] serde_json::Error),

    #[error("model output contained no roadmap weeks")]
    Empty,

    #[error("model output was cut off before the roadmap array closed")]
    Truncated,
}

/// Remove a surrounding markdown code fence (```` ``` ```` or ```` ```json ````,
/// any info string) and the whitespace around it.
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    s
}

/// Cut `text` down to the outermost JSON array: drop prose before the opening
/// bracket and everything after the last closing bracket. An array of objects
/// is preferred over an earlier bracket in leading prose.
pub fn slice_array(text: &str) -> Result<&str, RecoveryError> {
    let start = text
        .match_indices('[')
        .map(|(i, _)| i)
        .find(|&i| text[i + 1..].trim_start().starts_with('{'))
        .or_else(|| text.find('['))
        .ok_or(RecoveryError::NoArray)?;

    let tail = &text[start..];
    let end = tail.rfind(']').ok_or(RecoveryError::Truncated)?;
    Ok(&tail[..=end])
}

/// Strict parse, falling back to [`repair::repair`] on failure. A repair
/// that had to close the root value itself means the text was cut off, and
/// is rejected rather than returned with its tail invented.
pub fn parse_lenient(text: &str) -> Result<Value, RecoveryError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(strict) => {
            tracing::debug!(error = %strict, "strict parse failed, attempting repair");
            let Some(repaired) = repair::repair(text) else {
                return Err(RecoveryError::Unparseable(strict));
            };
            if repaired.closed_at_eof {
                return Err(RecoveryError::Truncated);
            }
            serde_json::from_str(&repaired.text).map_err(RecoveryError::Unparseable)
        }
    }
}

pub fn recover_roadmap(raw: &str) -> Result<Vec<RoadmapWeek>, RecoveryError> {
    let cleaned = strip_code_fences(raw);
    let sliced = slice_array(cleaned)?;
    let value = parse_lenient(sliced)?;
    let weeks: Vec<RoadmapWeek> = serde_json::from_value(value).map_err(RecoveryError::Shape)?;

    if weeks.is_empty() {
        return Err(RecoveryError::Empty);
    }
    if weeks.len() != EXPECTED_WEEKS {
        tracing::warn!(
            weeks = weeks.len(),
            expected = EXPECTED_WEEKS,
            "model returned an unexpected number of weeks"
        );
    }
    Ok(weeks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roadmap::Task;

    const FOUR_WEEKS: &str = r#"[
  {"week": 1, "title": "Foundations", "completed": false, "tasks": [
    {"id": "1-1", "title": "Install the toolchain", "completed": false},
    {"id": "1-2", "title": "Write hello world", "completed": false}
  ]},
  {"week": 2, "title": "Ownership", "completed": false, "tasks": [
    {"id": "2-1", "title": "Read the borrowing chapter", "completed": false}
  ]},
  {"week": 3, "title": "Traits", "completed": false, "tasks": [
    {"id": "3-1", "title": "Implement Display", "completed": false}
  ]},
  {"week": 4, "title": "Async", "completed": false, "tasks": [
    {"id": "4-1", "title": "Build a small server", "completed": false}
  ]}
]"#;

    fn expected() -> Vec<RoadmapWeek> {
        serde_json::from_str(FOUR_WEEKS).unwrap()
    }

    #[test]
    fn clean_output_round_trips() {
        let weeks = recover_roadmap(FOUR_WEEKS).unwrap();
        assert_eq!(weeks, expected());
        assert_eq!(weeks.len(), 4);
        assert_eq!(
            weeks[0].tasks[0],
            Task {
                id: "1-1".to_string(),
                title: "Install the toolchain".to_string(),
                completed: false,
            }
        );
    }

    #[test]
    fn cleanup_is_idempotent_on_clean_json() {
        let once = slice_array(strip_code_fences(FOUR_WEEKS)).unwrap();
        let twice = slice_array(strip_code_fences(once)).unwrap();
        assert_eq!(once, FOUR_WEEKS);
        assert_eq!(once, twice);

        let reserialized = serde_json::to_string(&recover_roadmap(FOUR_WEEKS).unwrap()).unwrap();
        assert_eq!(recover_roadmap(&reserialized).unwrap(), expected());
    }

    #[test]
    fn json_fence_is_stripped() {
        let fenced = format!("```json\n{}\n```", FOUR_WEEKS);
        assert_eq!(recover_roadmap(&fenced).unwrap(), expected());
    }

    #[test]
    fn bare_and_uppercase_fences_are_stripped() {
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```JSON [1]```"), "[1]");
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
    }

    #[test]
    fn trailing_prose_is_discarded() {
        let noisy = format!("{}\n\nLet me know if you want more detail on week 3!", FOUR_WEEKS);
        assert_eq!(recover_roadmap(&noisy).unwrap(), expected());
    }

    #[test]
    fn leading_prose_and_inner_fence() {
        let noisy = format!(
            "Sure! Here is your roadmap [draft]:\n```json\n{}\n```\nGood luck.",
            FOUR_WEEKS
        );
        assert_eq!(recover_roadmap(&noisy).unwrap(), expected());
    }

    #[test]
    fn trailing_prose_with_brackets() {
        let noisy = format!("{}\nSee [the docs] for more.", FOUR_WEEKS);
        assert_eq!(recover_roadmap(&noisy).unwrap(), expected());
    }

    #[test]
    fn malformed_output_is_repaired() {
        let sloppy = r#"[
  {week: 1, title: 'Foundations', completed: false, tasks: [
    {id: '1-1', title: 'Install the toolchain', completed: false},
    {id: '1-2', title: 'Write hello world', completed: false},
  ]}
  {week: 2, title: 'Ownership', completed: false, tasks: [
    {id: '2-1', title: 'Read the borrowing chapter', completed: false},
  ]},
  {week: 3, title: 'Traits', completed: false, tasks: [
    {id: '3-1', title: 'Implement Display', completed: false}
  ]},
  {week: 4, title: 'Async', completed: false, tasks: [
    {id: '4-1', title: 'Build a small server', completed: false}
  ]},
]"#;
        assert_eq!(recover_roadmap(sloppy).unwrap(), expected());
    }

    #[test]
    fn output_without_closing_bracket_is_rejected() {
        let cut = r#"[{"week": 1, "title": "Foundations", "tasks": [{"id": "1-1", "title": "Install the tool"#;
        let err = recover_roadmap(cut).unwrap_err();
        assert!(matches!(err, RecoveryError::Truncated));
    }

    #[test]
    fn output_cut_after_an_inner_bracket_is_rejected() {
        // The last `]` belongs to week 1's tasks, so slicing alone leaves
        // the root open and repair would have to invent its end.
        let cut_at = FOUR_WEEKS.find(r#"{"week": 2"#).unwrap() + 20;
        let err = recover_roadmap(&FOUR_WEEKS[..cut_at]).unwrap_err();
        assert!(matches!(err, RecoveryError::Truncated));
    }

    #[test]
    fn zero_week_and_blank_title_are_rejected() {
        let err = recover_roadmap(r#"[{"week": 0, "title": "Intro", "tasks": []}]"#).unwrap_err();
        assert!(matches!(err, RecoveryError::Shape(_)));

        let err = recover_roadmap(r#"[{"week": 1, "title": "  ", "tasks": []}]"#).unwrap_err();
        assert!(matches!(err, RecoveryError::Shape(_)));
    }

    #[test]
    fn plain_prose_fails() {
        let err = recover_roadmap("I'm sorry, I can't help with that request.").unwrap_err();
        assert!(matches!(err, RecoveryError::NoArray));
    }

    #[test]
    fn wrong_shape_fails() {
        let err = recover_roadmap(r#"["week one", "week two"]"#).unwrap_err();
        assert!(matches!(err, RecoveryError::Shape(_)));

        let err = recover_roadmap("Notes [draft] only").unwrap_err();
        assert!(matches!(err, RecoveryError::Shape(_)));
    }

    #[test]
    fn empty_array_fails() {
        let err = recover_roadmap("```json\n[]\n```").unwrap_err();
        assert!(matches!(err, RecoveryError::Empty));
    }

    #[test]
    fn strict_parse_is_tried_first() {
        let value = parse_lenient(r#"{"a": [1, 2]}"#).unwrap();
        assert_eq!(value, serde_json::json!({ "a": [1, 2] }));
    }
}
