//! Tokenization helpers shared by the lexical index, rerankers and guard.

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "did", "do", "does", "for",
    "from", "had", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "of", "on",
    "or", "our", "so", "than", "that", "the", "their", "then", "there", "these", "this", "those",
    "to", "was", "we", "were", "what", "when", "where", "which", "who", "why", "will", "with",
    "you", "your",
];

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased alphanumeric tokens, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Strip a plural `s` so "invoices" and "invoice" share a term.
fn stem(token: &str) -> String {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

/// Tokens with stop words removed and light stemming applied, in order.
pub fn content_terms(text: &str) -> Vec<String> {
    tokenize(text).into_iter().filter(|t| !is_stop_word(t)).map(|t| stem(&t)).collect()
}

/// Distinct content terms.
pub fn term_set(text: &str) -> HashSet<String> {
    content_terms(text).into_iter().collect()
}

/// Numeric literals in `text`, with thousands separators removed.
///
/// `"$12,400.00 and 3"` yields `[12400.0, 3.0]`.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if (c == ',' || c == '.') && !current.is_empty() {
            let next_is_digit = chars.peek().is_some_and(|n| n.is_ascii_digit());
            if next_is_digit && c == '.' && !current.contains('.') {
                current.push('.');
            } else if !next_is_digit || c == '.' {
                flush_number(&mut current, &mut numbers);
            }
        } else {
            flush_number(&mut current, &mut numbers);
        }
    }
    flush_number(&mut current, &mut numbers);
    numbers
}

fn flush_number(current: &mut String, numbers: &mut Vec<f64>) {
    if !current.is_empty() {
        if let Ok(n) = current.parse::<f64>() {
            numbers.push(n);
        }
        current.clear();
    }
}

/// Split text into sentences, keeping terminal punctuation.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, c) in text.char_indices() {
        let terminal = matches!(c, '.' | '!' | '?' | '\n');
        let at_boundary = bytes.get(i + 1).is_none_or(|b| b.is_ascii_whitespace());
        if terminal && at_boundary {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                result.push(sentence);
            }
            start = i + 1;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        result.push(tail);
    }
    result
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// The payload of a model response with any markdown code fence removed.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    for start in ["```json", "```JSON", "```"] {
        if let Some(idx) = trimmed.find(start) {
            let content_start = idx + start.len();
            if let Some(end) = trimmed[content_start..].find("```") {
                return trimmed[content_start..content_start + end].trim();
            }
        }
    }
    trimmed
}
