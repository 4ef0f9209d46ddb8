//! The post-processor (C6): extracts a rating from raw model text and
//! classifies failures. Primary extraction ports `extract_score`
//! (`eval_tools.py` / `likert_eval.py`) generalized from the legacy
//! bare-numbered-line convention to the JSON-object contract §4.5
//! requires, with the original's leading-`"<digit>."` regex kept as the
//! documented fallback path. Reverse-scale normalization is the
//! original's `6 - x` (`adjusted_reverse_score` in `likert_eval.py`),
//! applied at storage time rather than analysis time (P5).

use bench_core::types::scale::ScaleOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ParseError,
    OutOfRange,
    TransportError,
    SchemaError,
    /// Not raised by the post-processor itself — logged by C8 alongside
    /// the triggering kind once an item's final attempt also fails,
    /// per §7's "on exhaustion: `max_attempts_exceeded` in FailLog".
    MaxAttemptsExceeded,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ParseError => "parse_error",
            FailureKind::OutOfRange => "out_of_range",
            FailureKind::TransportError => "transport_error",
            FailureKind::SchemaError => "schema_error",
            FailureKind::MaxAttemptsExceeded => "max_attempts_exceeded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedRating {
    /// The value as the model expressed it, on the scale it was shown.
    pub rating_raw: u8,
    /// Normalized to the in-order scale: `6 - raw` when `scale_order = rev`.
    pub rating_normalized: u8,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone)]
pub enum PostProcessOutcome {
    Success(ParsedRating),
    Failure(FailureKind),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Postprocessor;

impl Postprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, raw_text: &str, scale_order: ScaleOrder, include_rationale: bool) -> PostProcessOutcome {
        if raw_text.starts_with("[error ") {
            return PostProcessOutcome::Failure(FailureKind::TransportError);
        }

        let extracted = extract_json_rating(raw_text).or_else(|| extract_leading_digit(raw_text));

        let Some((raw_rating, rationale)) = extracted else {
            return PostProcessOutcome::Failure(FailureKind::ParseError);
        };

        if !(1..=5).contains(&raw_rating) {
            return PostProcessOutcome::Failure(FailureKind::OutOfRange);
        }

        if include_rationale && rationale.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return PostProcessOutcome::Failure(FailureKind::SchemaError);
        }

        let normalized = match scale_order {
            ScaleOrder::In => raw_rating,
            ScaleOrder::Rev => 6 - raw_rating,
        };

        PostProcessOutcome::Success(ParsedRating {
            rating_raw: raw_rating,
            rating_normalized: normalized,
            rationale,
        })
    }
}

/// Locates the first well-formed JSON object substring and reads its
/// `rating` (and, if present, `rationale`) field. Scans for balanced
/// `{...}` spans rather than assuming the whole response is JSON, since
/// a model may wrap the object in chatter despite the output spec.
fn extract_json_rating(raw_text: &str) -> Option<(u8, Option<String>)> {
    for (start, end) in balanced_object_spans(raw_text) {
        let candidate = &raw_text[start..=end];
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            let rating = value.get("rating").and_then(rating_from_value);
            if let Some(rating) = rating {
                let rationale = value.get("rationale").and_then(|v| v.as_str()).map(str::to_string);
                return Some((rating, rationale));
            }
        }
    }
    None
}

fn rating_from_value(value: &serde_json::Value) -> Option<u8> {
    if let Some(n) = value.as_u64() {
        return u8::try_from(n).ok();
    }
    if let Some(n) = value.as_i64() {
        return u8::try_from(n).ok();
    }
    if let Some(s) = value.as_str() {
        return s.trim().parse::<u8>().ok();
    }
    None
}

/// Yields `(start, end)` byte index pairs (inclusive) for every
/// balanced `{...}` span in `text`, outermost-first, in order of
/// appearance.
fn balanced_object_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push((s, i));
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

/// Fallback path for the original's bare `"<digit>."` convention — a
/// leading digit token with a trailing period, e.g. `"3. neutral"`.
fn extract_leading_digit(raw_text: &str) -> Option<(u8, Option<String>)> {
    let trimmed = raw_text.trim();
    let mut chars = trimmed.char_indices();
    let (_, first) = chars.next()?;
    if !first.is_ascii_digit() {
        return None;
    }
    let (next_idx, next) = chars.next()?;
    if next != '.' {
        return None;
    }
    let digit = first.to_digit(10)? as u8;
    let rationale = trimmed.get(next_idx + 1..).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Some((digit, rationale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primary_json_rating() {
        let p = Postprocessor::new();
        match p.process(r#"{"rating": 4}"#, ScaleOrder::In, false) {
            PostProcessOutcome::Success(r) => {
                assert_eq!(r.rating_raw, 4);
                assert_eq!(r.rating_normalized, 4);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn parses_json_embedded_in_chatter() {
        let p = Postprocessor::new();
        match p.process(r#"Sicher, hier ist meine Antwort: {"rating": 2} Danke."#, ScaleOrder::In, false) {
            PostProcessOutcome::Success(r) => assert_eq!(r.rating_raw, 2),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_leading_digit_token() {
        let p = Postprocessor::new();
        match p.process("3. neutral", ScaleOrder::In, false) {
            PostProcessOutcome::Success(r) => assert_eq!(r.rating_raw, 3),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn rev_scale_normalizes_to_six_minus_raw() {
        let p = Postprocessor::new();
        match p.process(r#"{"rating": 2}"#, ScaleOrder::Rev, false) {
            PostProcessOutcome::Success(r) => {
                assert_eq!(r.rating_raw, 2);
                assert_eq!(r.rating_normalized, 4);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_text_is_parse_error() {
        let p = Postprocessor::new();
        assert!(matches!(p.process("I cannot answer that.", ScaleOrder::In, false), PostProcessOutcome::Failure(FailureKind::ParseError)));
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let p = Postprocessor::new();
        assert!(matches!(
            p.process(r#"{"rating": 7}"#, ScaleOrder::In, false),
            PostProcessOutcome::Failure(FailureKind::OutOfRange)
        ));
    }

    #[test]
    fn transport_error_marker_is_forwarded() {
        let p = Postprocessor::new();
        assert!(matches!(
            p.process("[error http 503] upstream unavailable", ScaleOrder::In, false),
            PostProcessOutcome::Failure(FailureKind::TransportError)
        ));
    }

    #[test]
    fn missing_rationale_when_required_is_schema_error() {
        let p = Postprocessor::new();
        assert!(matches!(
            p.process(r#"{"rating": 3}"#, ScaleOrder::In, true),
            PostProcessOutcome::Failure(FailureKind::SchemaError)
        ));
    }

    #[test]
    fn rationale_present_when_required_succeeds() {
        let p = Postprocessor::new();
        match p.process(r#"{"rating": 3, "rationale": "seems balanced"}"#, ScaleOrder::In, true) {
            PostProcessOutcome::Success(r) => assert_eq!(r.rationale.as_deref(), Some("seems balanced")),
            other => panic!("expected success, got {other:?}"),
        }
    }
}
