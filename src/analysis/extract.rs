//! Recovery of findings from free-form model output.
//!
//! The reply is expected to hold JSON objects, but it usually arrives wrapped in
//! tags or markdown fences, sprinkled with comments, with unescaped backslashes and
//! raw control characters, several objects glued together, and lines of `...`
//! standing in for elided entries. Each cleanup step is a separate pure function so
//! it can be exercised on its own.

use crate::analysis::finding::{ExtractionResult, Finding};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Marker the service uses to say nothing was found, matched case-insensitively
const ALL_CLEAR: &str = "all clear";

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("fragment is not valid JSON ({source}): {fragment}")]
    Json {
        fragment: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected a JSON object, found {found}: {fragment}")]
    Shape {
        fragment: String,
        found: &'static str,
    },
}

/// Index of the quote closing the string literal opened at `open`.
fn string_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Collect candidate JSON regions, left to right.
///
/// At each position the first matching form wins: `<output>` tags, a ```` ```json ````
/// fence, a plain fence, then a bare `{...}` object. Tag and fence delimiters are
/// not part of the segment; braces are.
pub fn extract_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let found = delimited(rest, "<output>", "</output>")
            .or_else(|| delimited(rest, "```json", "```"))
            .or_else(|| delimited(rest, "```", "```"))
            .or_else(|| brace_object(rest));

        match found {
            Some((segment, consumed)) => {
                segments.push(segment);
                i += consumed;
            }
            None => i += rest.chars().next().map_or(1, char::len_utf8),
        }
    }

    segments
}

fn delimited<'a>(rest: &'a str, open: &str, close: &str) -> Option<(&'a str, usize)> {
    let body = rest.strip_prefix(open)?;
    let end = body.find(close)?;
    Some((&body[..end], open.len() + end + close.len()))
}

// Balanced scan that skips braces inside string literals. If the braces never
// balance, the object ends at the first closing brace.
fn brace_object(rest: &str) -> Option<(&str, usize)> {
    if !rest.starts_with('{') {
        return None;
    }

    let bytes = rest.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => match string_end(bytes, i) {
                Some(end) => i = end,
                None => break,
            },
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&rest[..=i], i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }

    let end = rest.find('}')?;
    Some((&rest[..=end], end + 1))
}

/// Remove `//` and `/* */` comments outside string literals, then trim.
pub fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                if let Some(end) = string_end(bytes, i) {
                    i = end + 1;
                    continue;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                if let Some(len) = text[i + 2..].find("*/") {
                    out.push_str(&text[copied..i]);
                    i += 2 + len + 2;
                    copied = i;
                    continue;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = text[i..]
                    .find(|c: char| c == '\n' || c == '\r')
                    .map_or(text.len(), |n| i + n);
                out.push_str(&text[copied..i]);
                i = end;
                copied = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    out.push_str(&text[copied..]);
    out.trim().to_string()
}

/// Make model-written text acceptable to a strict JSON parser.
///
/// Every backslash is doubled, so Windows paths and regexes written without
/// escaping survive. Raw control characters inside string literals become escape
/// sequences. Newlines are left alone: later steps work line by line.
pub fn normalize_escapes(text: &str) -> String {
    let doubled = text.replace('\\', "\\\\");
    let mut out = String::with_capacity(doubled.len());
    // After doubling no quote is escaped, so each one opens or closes a string
    let mut in_string = false;

    for c in doubled.chars() {
        match c {
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' => out.push(c),
            c if in_string && is_control(c) => push_escaped(&mut out, c),
            c => out.push(c),
        }
    }

    out
}

fn is_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{1f}' | '\u{7f}'..='\u{9f}')
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '\u{8}' => out.push_str("\\b"),
        '\t' => out.push_str("\\t"),
        '\u{c}' => out.push_str("\\f"),
        '\r' => out.push_str("\\r"),
        other => out.push_str(&format!("\\u{:04x}", other as u32)),
    }
}

/// Drop lines that are only an ellipsis placeholder (`...` or `…`).
pub fn strip_ellipsis_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with("...") || trimmed.starts_with('…'))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split concatenated objects wherever `}` is followed by optional whitespace and `{`.
pub fn split_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                if let Some(end) = string_end(bytes, i) {
                    i = end;
                }
            }
            b'}' => {
                let mut next = i + 1;
                while next < bytes.len() && bytes[next].is_ascii_whitespace() {
                    next += 1;
                }
                if bytes.get(next) == Some(&b'{') {
                    parts.push(&text[start..=i]);
                    start = next;
                    i = next;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    parts.push(&text[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Parse one fragment. Arrays are flattened one level; each element must be an object.
pub fn parse_fragment(fragment: &str) -> Vec<Result<Finding, FragmentError>> {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(fragment) {
        Ok(Value::Array(items)) => items.into_iter().map(finding_from_value).collect(),
        Ok(value) => vec![finding_from_value(value)],
        Err(source) => vec![Err(FragmentError::Json {
            fragment: fragment.to_string(),
            source,
        })],
    }
}

fn finding_from_value(value: Value) -> Result<Finding, FragmentError> {
    let found = match &value {
        Value::Object(object) => {
            return Finding::from_object(object.clone()).map_err(|source| FragmentError::Json {
                fragment: value.to_string(),
                source,
            });
        }
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
    };

    Err(FragmentError::Shape {
        fragment: value.to_string(),
        found,
    })
}

/// Run every cleanup step over every segment and collect what parses.
pub fn recover_findings(text: &str) -> (Vec<Finding>, Vec<FragmentError>) {
    let mut findings = Vec::new();
    let mut errors = Vec::new();

    for segment in extract_segments(text) {
        let cleaned = strip_ellipsis_lines(&normalize_escapes(&strip_comments(segment)));
        for fragment in split_objects(&cleaned) {
            for result in parse_fragment(fragment) {
                match result {
                    Ok(finding) => findings.push(finding),
                    Err(e) => errors.push(e),
                }
            }
        }
    }

    (findings, errors)
}

/// Recover findings from a complete response. Unparseable fragments are logged and skipped.
pub fn extract_findings(text: &str) -> ExtractionResult {
    let (findings, errors) = recover_findings(text);

    for error in &errors {
        warn!(error = %error, "Skipping unparseable fragment");
    }

    if findings.is_empty() || text.to_lowercase().contains(ALL_CLEAR) {
        debug!(recovered = findings.len(), "Response reports nothing to flag");
        ExtractionResult::AllClear
    } else {
        ExtractionResult::Findings(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::finding::Severity;

    #[test]
    fn test_output_tag_with_two_objects() {
        let text = "Here:\n<output>\n{\"a\":1}\n{\"b\":2}\n</output>\ndone";
        match extract_findings(text) {
            ExtractionResult::Findings(findings) => {
                assert_eq!(findings.len(), 2);
                assert_eq!(findings[0].extra["a"], 1);
                assert_eq!(findings[1].extra["b"], 2);
            }
            ExtractionResult::AllClear => panic!("expected findings"),
        }
    }

    #[test]
    fn test_all_clear_any_case() {
        let text = "All Clear. Nothing notable, though {\"category\":\"noise\"} was seen.";
        assert_eq!(extract_findings(text), ExtractionResult::AllClear);
    }

    #[test]
    fn test_no_objects_means_all_clear() {
        assert_eq!(
            extract_findings("The logs look routine."),
            ExtractionResult::AllClear
        );
    }

    #[test]
    fn test_comment_outside_string_removed() {
        let text = "{\"url\": \"http://a//b\"} // trailing note\n/* block */{\"x\": 1}";
        let stripped = strip_comments(text);
        assert!(stripped.contains("\"http://a//b\""));
        assert!(!stripped.contains("trailing note"));
        assert!(!stripped.contains("block"));
        assert!(stripped.ends_with("{\"x\": 1}"));
    }

    #[test]
    fn test_comment_lines_inside_tag() {
        let text = "<output>\n// findings below\n{\"category\": \"Scan\"} /* one */\n</output>";
        let (findings, errors) = recover_findings(text);
        assert!(errors.is_empty());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category.as_deref(), Some("Scan"));
    }

    #[test]
    fn test_whitespace_separated_objects_split() {
        assert_eq!(
            split_objects("{\"a\":1}  \n\t{\"b\":2}{\"c\":3}"),
            vec!["{\"a\":1}", "{\"b\":2}", "{\"c\":3}"]
        );
        // A brace pair inside a string is not a boundary
        assert_eq!(split_objects("{\"a\":\"} {\"}"), vec!["{\"a\":\"} {\"}"]);
    }

    #[test]
    fn test_fenced_array_is_flattened() {
        let text = "Results:\n```json\n[\n  {\"category\": \"Auth\", \"severity\": \"DANGEROUS\"},\n  {\"category\": \"Scan\", \"severity\": \"suspicious\"}\n]\n```";
        let (findings, errors) = recover_findings(text);
        assert!(errors.is_empty());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Some(Severity::Dangerous));
        assert_eq!(findings[1].severity, Some(Severity::Suspicious));
    }

    #[test]
    fn test_tag_takes_priority_over_inner_braces() {
        let segments = extract_segments("x <output>{\"a\":{\"b\":1}}</output> y");
        assert_eq!(segments, vec!["{\"a\":{\"b\":1}}"]);
    }

    #[test]
    fn test_bare_objects_balance_nested_braces() {
        let segments = extract_segments("first {\"a\":{\"b\":\"}\"}} then {\"c\":2}");
        assert_eq!(segments, vec!["{\"a\":{\"b\":\"}\"}}", "{\"c\":2}"]);
    }

    #[test]
    fn test_unbalanced_object_ends_at_first_brace() {
        let segments = extract_segments("{\"a\": {\"b\": 1}");
        assert_eq!(segments, vec!["{\"a\": {\"b\": 1}"]);
    }

    #[test]
    fn test_plain_fence() {
        let segments = extract_segments("```\n{\"a\":1}\n```");
        assert_eq!(segments, vec!["\n{\"a\":1}\n"]);
    }

    #[test]
    fn test_unescaped_backslashes_survive() {
        let text = "{\"description\": \"dropped C:\\temp\\new.exe\"}";
        let (findings, errors) = recover_findings(text);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(
            findings[0].description.as_deref(),
            Some("dropped C:\\temp\\new.exe")
        );
    }

    #[test]
    fn test_control_characters_escaped_inside_strings_only() {
        let normalized = normalize_escapes("{\t\"a\":\"x\ty\u{1}\"}\r\n");
        assert_eq!(normalized, "{\t\"a\":\"x\\ty\\u0001\"}\r\n");

        let value: Value = serde_json::from_str(normalized.trim()).unwrap();
        assert_eq!(value["a"], "x\ty\u{1}");
    }

    #[test]
    fn test_ellipsis_lines_dropped() {
        let text = "```json\n[\n{\"a\":1},\n   ...\n{\"b\":2}\n…\n]\n```";
        let (findings, errors) = recover_findings(text);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn test_non_object_fragments_rejected() {
        let results = parse_fragment("[{\"a\":1}, 42, \"text\"]");
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(FragmentError::Shape { found: "a number", .. })
        ));
        assert!(matches!(
            results[2],
            Err(FragmentError::Shape { found: "a string", .. })
        ));
    }

    #[test]
    fn test_numeric_severity_keeps_object() {
        let text = "{\"category\": \"Auth\", \"severity\": 3, \"description\": \"x\"}";
        let (findings, errors) = recover_findings(text);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category.as_deref(), Some("Auth"));
        assert_eq!(findings[0].severity, Some(Severity::Other("3".to_string())));
        assert_eq!(findings[0].to_output().unwrap()["severity"], 3);
    }

    #[test]
    fn test_broken_fragment_does_not_stop_others() {
        let text = "<output>\n{\"a\": }\n{\"category\": \"Ok\"}\n</output>";
        let (findings, errors) = recover_findings(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            FragmentError::Json { fragment, .. } => assert_eq!(fragment, "{\"a\": }"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
