//! Response validation and best-effort repair of truncated JSON.

use crate::exec::FetchError;

/// Validate raw stdout bytes and return the trimmed JSON text.
///
/// Cheap shape checks run before the full structural parse so obviously
/// truncated output is rejected without parsing the whole payload.
pub fn validate(bytes: &[u8]) -> Result<String, FetchError> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(FetchError::EmptyResponse);
    }

    let starts_ok = trimmed.starts_with('{') || trimmed.starts_with('[');
    let ends_ok = trimmed.ends_with('}') || trimmed.ends_with(']');
    if !starts_ok || !ends_ok {
        return Err(FetchError::MalformedResponse(
            "response does not look like complete JSON".to_string(),
        ));
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(_) => Ok(trimmed.to_string()),
        Err(e) => Err(FetchError::MalformedResponse(e.to_string())),
    }
}

/// Attempt to repair a truncated JSON object by appending missing `}`.
///
/// Returns the (possibly unchanged) text when the result parses, `None` when
/// repair is not applicable or still fails. Already-valid input is returned
/// as-is, so repair is idempotent.
pub fn repair(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    if !trimmed.starts_with('{') {
        return None;
    }

    let missing = excess_open_braces(trimmed);
    if missing == 0 {
        return None;
    }

    let mut repaired = trimmed.to_string();
    for _ in 0..missing {
        repaired.push('}');
    }

    if serde_json::from_str::<serde_json::Value>(&repaired).is_ok() {
        Some(repaired)
    } else {
        None
    }
}

/// Count unbalanced `{`, ignoring braces inside string literals
fn excess_open_braces(text: &str) -> usize {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }

    depth.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validate_empty() {
        assert!(matches!(validate(b""), Err(FetchError::EmptyResponse)));
        assert!(matches!(
            validate(b"  \n\t  "),
            Err(FetchError::EmptyResponse)
        ));
    }

    #[test]
    fn test_validate_non_json_prefix() {
        let err = validate(b"oops something broke").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn test_validate_truncated_suffix() {
        let err = validate(b"{\"blocks\": [").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn test_validate_accepts_object_and_array() {
        assert_eq!(validate(b"{\"a\": 1}").expect("object"), "{\"a\": 1}");
        assert_eq!(validate(b" [1, 2] \n").expect("array"), "[1, 2]");
    }

    #[test]
    fn test_validate_surfaces_parse_error() {
        let err = validate(b"{\"a\": nope}").unwrap_err();
        match err {
            FetchError::MalformedResponse(msg) => assert!(!msg.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_repair_missing_brace() {
        assert_eq!(repair("{\"a\":1").as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_repair_nested_missing_braces() {
        assert_eq!(
            repair("{\"a\": {\"b\": 1").as_deref(),
            Some("{\"a\": {\"b\": 1}}")
        );
    }

    #[test]
    fn test_repair_is_idempotent_on_valid_json() {
        assert_eq!(repair("{\"a\":1}").as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_repair_ignores_braces_in_strings() {
        assert_eq!(
            repair("{\"a\": \"{{{\", \"b\": 1").as_deref(),
            Some("{\"a\": \"{{{\", \"b\": 1}")
        );
    }

    #[test]
    fn test_repair_gives_up_on_non_object() {
        assert_eq!(repair("[1, 2"), None);
        assert_eq!(repair("garbage"), None);
    }

    #[test]
    fn test_repair_gives_up_when_still_broken() {
        // Balanced braces but invalid content: nothing to append
        assert_eq!(repair("{\"a\": }"), None);
    }
}
