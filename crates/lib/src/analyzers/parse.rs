//! Defensive parsing shared by the analyzers. Models wrap JSON in prose
//! and markdown fences no matter what the prompt says, so every parser
//! here tolerates leading/trailing noise and falls back to raw text
//! rather than failing.

use regex::Regex;
use serde::de::DeserializeOwned;

/// Strips a single wrapping markdown fence (```json ... ``` or ``` ... ```)
/// when the whole payload lives inside one.
pub fn strip_fences(raw: &str) -> String {
    let re = Regex::new(r"(?s)```(?:[a-zA-Z]+)?\n?(.*?)```").unwrap();
    match re.captures(raw.trim()) {
        Some(caps) => caps[1].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Locates and deserializes the first JSON object in a response, however
/// much prose surrounds it.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let cleaned = strip_fences(raw);

    if let Ok(value) = serde_json::from_str::<T>(&cleaned) {
        return Some(value);
    }

    // Walk balanced braces from the first '{'; prose around the object and
    // braces inside string literals are both handled.
    let bytes = cleaned.as_bytes();
    let start = cleaned.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &cleaned[start..=start + offset];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Pulls bullet lines out of markdown, tolerating `-`, `*`, `•`, and
/// numbered markers. Falls back to non-empty lines when the response used
/// no list syntax at all.
pub fn parse_bullets(raw: &str) -> Vec<String> {
    let cleaned = strip_fences(raw);
    let marker = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").unwrap();

    let bullets: Vec<String> = cleaned
        .lines()
        .filter_map(|line| marker.captures(line).map(|c| c[1].trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect();

    if !bullets.is_empty() {
        return bullets;
    }

    cleaned
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Title Case for tags: first letter of each word upper, rest preserved so
/// acronyms like "LLM" survive.
pub fn title_case(tag: &str) -> String {
    tag.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncates a sentence list to at most `max` sentences, rejoining with a
/// single space. Periods inside common abbreviations are not worth
/// special-casing for tag-length prose.
pub fn clamp_sentences(text: &str, max: usize) -> String {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            sentences.push(current.trim().to_string());
            current.clear();
            if sentences.len() == max {
                break;
            }
        }
    }
    if sentences.len() < max && !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Sample {
        value: String,
    }

    #[test]
    fn extracts_json_from_fences() {
        let raw = "```json\n{\"value\": \"ok\"}\n```";
        assert_eq!(
            extract_json::<Sample>(raw),
            Some(Sample { value: "ok".into() })
        );
    }

    #[test]
    fn extracts_json_from_surrounding_prose() {
        let raw = "Sure! Here is the result:\n{\"value\": \"ok\"}\nLet me know if you need more.";
        assert_eq!(
            extract_json::<Sample>(raw),
            Some(Sample { value: "ok".into() })
        );
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let raw = r#"Answer: {"value": "a {weird} string"} done"#;
        assert_eq!(
            extract_json::<Sample>(raw),
            Some(Sample {
                value: "a {weird} string".into()
            })
        );
    }

    #[test]
    fn garbage_yields_none_not_panic() {
        assert_eq!(extract_json::<Sample>("no json here { broken"), None);
    }

    #[test]
    fn bullets_tolerate_mixed_markers() {
        let raw = "- first\n* second\n• third\n2. fourth\nnot a bullet without marker";
        let bullets = parse_bullets(raw);
        assert_eq!(bullets, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn plain_lines_fall_back_when_no_markers() {
        let bullets = parse_bullets("## heading\nOne observation.\nAnother observation.");
        assert_eq!(bullets, vec!["One observation.", "Another observation."]);
    }

    #[test]
    fn title_case_preserves_acronyms() {
        assert_eq!(title_case("large LLM deployments"), "Large LLM Deployments");
        assert_eq!(title_case("ai safety"), "Ai Safety");
    }

    #[test]
    fn sentence_clamping() {
        let text = "One. Two! Three? Four.";
        assert_eq!(clamp_sentences(text, 2), "One. Two!");
        assert_eq!(clamp_sentences("No terminator", 2), "No terminator");
    }
}
