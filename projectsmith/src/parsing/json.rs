//! Extracting JSON values from model prose.

/// Returns the first balanced JSON object or array in `text` that parses.
///
/// Prose and code fences around the value are ignored. Candidates that are
/// balanced but invalid are skipped and the scan continues after them.
#[must_use]
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    json_values(text).next()
}

/// Every balanced JSON object or array in `text` that parses, in order.
///
/// A value nested inside a parsed candidate is not yielded separately.
pub fn json_values(text: &str) -> impl Iterator<Item = serde_json::Value> + '_ {
    let bytes = text.as_bytes();
    let mut from = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text.get(from..)?.find(['{', '[']) {
            let start = from + offset;
            if let Some(end) = balanced_end(bytes, start) {
                if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                    from = end + 1;
                    return Some(value);
                }
            }
            from = start + 1;
        }
        None
    })
}

/// Index of the bracket closing the one at `start`, honouring JSON strings.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
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
    use serde_json::json;

    #[test]
    fn test_extracts_object_from_prose() {
        let text = "Here is the plan:\n```json\n{\"tasks\": [{\"title\": \"a}\"}]}\n```\nThanks!";
        assert_eq!(extract_json(text), Some(json!({"tasks": [{"title": "a}"}]})));
    }

    #[test]
    fn test_extracts_bare_array() {
        assert_eq!(extract_json("[1, 2, 3] trailing"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_skips_invalid_candidate() {
        let text = "{not json} then {\"ok\": true}";
        assert_eq!(extract_json(text), Some(json!({"ok": true})));
    }

    #[test]
    fn test_json_values_yields_every_candidate() {
        let text = "Step [1]: plan.\n{\"tasks\": [{\"title\": \"a\"}]}\nthen [2]";
        let values: Vec<_> = json_values(text).collect();
        assert_eq!(
            values,
            vec![json!([1]), json!({"tasks": [{"title": "a"}]}), json!([2])]
        );
    }

    #[test]
    fn test_none_when_absent_or_unbalanced() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"open\": [1, 2"), None);
    }
}
