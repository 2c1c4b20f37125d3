//! Decoding of reasoning-service completions into validated values.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::types::{BoundedScores, MetaAnalysis, SegmentOutput, SubQuestion};
use crate::error::{AnalysisError, AnalysisResult, ParseFailure};

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Tries raw JSON first, then a ```json fenced block, then any fenced block.
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, ParseFailure> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    let fenced = if completion.contains("```json") {
        completion.split("```json").nth(1)
    } else if completion.contains("```") {
        completion.split("```").nth(1)
    } else {
        None
    };

    if let Some(block) = fenced {
        return block
            .split("```")
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseFailure::NoJson("fenced block was empty".to_string()));
    }

    Err(ParseFailure::NoJson(format!(
        "first 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    )))
}

/// Decode `completion` as `T` and reject scores outside `[0, 1]`.
///
/// NaN and infinities count as out of range.
pub fn decode_bounded<T>(completion: &str) -> Result<T, ParseFailure>
where
    T: DeserializeOwned + BoundedScores,
{
    let json = extract_json_from_completion(completion)?;
    let value: T = serde_json::from_str(json)?;

    for (field, score) in value.bounded_scores() {
        if !(0.0..=1.0).contains(&score) {
            return Err(ParseFailure::OutOfRange {
                field,
                value: score,
            });
        }
    }
    Ok(value)
}

/// Validate a segment-analysis completion.
pub fn parse_segment_output(raw: &str) -> AnalysisResult<SegmentOutput> {
    decode_bounded(raw).map_err(|cause| AnalysisError::MalformedSegmentOutput {
        cause,
        raw: raw.to_string(),
    })
}

/// Validate a meta-analysis completion.
pub fn parse_meta_analysis(raw: &str) -> AnalysisResult<MetaAnalysis> {
    decode_bounded(raw).map_err(|cause| AnalysisError::MalformedMetaAnalysis {
        cause,
        raw: raw.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubQuestionList {
    Wrapped { items: Vec<SubQuestion> },
    Bare(Vec<SubQuestion>),
}

/// Decode the question generator's output.
///
/// Accepts `{"items": [...]}` or a bare array.
pub fn parse_sub_questions(raw: &str) -> AnalysisResult<Vec<SubQuestion>> {
    let malformed = |cause| AnalysisError::MalformedSubQuestions {
        cause,
        raw: raw.to_string(),
    };

    let json = extract_json_from_completion(raw).map_err(malformed)?;
    let list: SubQuestionList =
        serde_json::from_str(json).map_err(|e| malformed(ParseFailure::Json(e)))?;

    Ok(match list {
        SubQuestionList::Wrapped { items } => items,
        SubQuestionList::Bare(items) => items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VALID_SEGMENT: &str = r#"{
        "key_findings": ["Freight is 40% of COGS"],
        "relevant_data": {"freight_share": 0.4},
        "next_steps": ["Renegotiate carrier contracts"],
        "confidence_score": 0.75,
        "critical_assumptions": ["Fuel prices stay flat"],
        "required_data": ["Carrier invoices"],
        "external_review_required": false
    }"#;

    #[test]
    fn test_extract_raw_json() {
        assert_eq!(extract_json_from_completion("  {\"a\": 1} ").unwrap(), "{\"a\": 1}");
        assert_eq!(extract_json_from_completion("[1]").unwrap(), "[1]");
    }

    #[test]
    fn test_extract_fenced_json() {
        let completion = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(extract_json_from_completion(completion).unwrap(), "{\"a\": 1}");

        let completion = "```\n{\"b\": 2}\n```";
        assert_eq!(extract_json_from_completion(completion).unwrap(), "{\"b\": 2}");
    }

    #[test]
    fn test_extract_empty_fence_fails() {
        let err = extract_json_from_completion("```json\n```").unwrap_err();
        assert!(matches!(err, ParseFailure::NoJson(_)));
    }

    #[test]
    fn test_extract_plain_text_fails() {
        let err = extract_json_from_completion("I cannot help with that").unwrap_err();
        assert!(err.to_string().contains("I cannot help"));
    }

    #[test]
    fn test_parse_segment_output() {
        let output = parse_segment_output(VALID_SEGMENT).unwrap();
        assert_eq!(output.key_findings, vec!["Freight is 40% of COGS"]);
        assert_eq!(output.relevant_data["freight_share"], serde_json::json!(0.4));
        assert_eq!(output.confidence_score, 0.75);
        assert!(!output.external_review_required);
    }

    #[test]
    fn test_parse_segment_output_boundary_scores() {
        for score in ["0", "1", "0.0", "1.0"] {
            let raw = VALID_SEGMENT.replace("0.75", score);
            assert!(parse_segment_output(&raw).is_ok(), "score {}", score);
        }
    }

    #[test]
    fn test_parse_segment_output_out_of_range() {
        let raw = VALID_SEGMENT.replace("0.75", "1.01");
        let err = parse_segment_output(&raw).unwrap_err();
        match err {
            AnalysisError::MalformedSegmentOutput {
                cause: ParseFailure::OutOfRange { field, value },
                raw: kept,
            } => {
                assert_eq!(field, "confidence_score");
                assert_eq!(value, 1.01);
                assert_eq!(kept, raw);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_segment_output_negative_score() {
        let raw = VALID_SEGMENT.replace("0.75", "-0.1");
        assert!(matches!(
            parse_segment_output(&raw),
            Err(AnalysisError::MalformedSegmentOutput { .. })
        ));
    }

    #[test]
    fn test_parse_segment_output_missing_field() {
        let raw = VALID_SEGMENT.replace("\"external_review_required\": false", "\"extra\": 1");
        let err = parse_segment_output(&raw).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MalformedSegmentOutput {
                cause: ParseFailure::Json(_),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_meta_analysis_out_of_range() {
        let raw = r#"{
            "coherence_score": 0.9,
            "consistency_score": 2.0,
            "quality_score": 0.8,
            "improvement_suggestions": [],
            "critical_path": []
        }"#;
        let err = parse_meta_analysis(raw).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MalformedMetaAnalysis {
                cause: ParseFailure::OutOfRange {
                    field: "consistency_score",
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn test_parse_sub_questions_wrapped_and_bare() {
        let wrapped = r#"{"items": [{"sub_question": "Q1", "tool_name": "problem_context"}]}"#;
        let bare = r#"[{"sub_question": "Q1", "tool_name": "problem_context"}]"#;

        let expected = vec![SubQuestion {
            sub_question: "Q1".to_string(),
            tool_name: "problem_context".to_string(),
        }];
        assert_eq!(parse_sub_questions(wrapped).unwrap(), expected);
        assert_eq!(parse_sub_questions(bare).unwrap(), expected);
    }

    #[test]
    fn test_parse_sub_questions_malformed() {
        let err = parse_sub_questions(r#"{"questions": ["Q1"]}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedSubQuestions { .. }));
        assert_eq!(err.status_code(), 422);
    }
}
