//! Utterance text helpers
//!
//! Vocabulary matching works on normalized text: lowercase, punctuation
//! other than apostrophes removed, whitespace collapsed.

/// Normalize an utterance for vocabulary matching
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2019}' | '\u{2018}' => '\'',
            c if c.is_alphanumeric() || c == '\'' => c,
            _ => ' ',
        })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `phrase` occurs in `text` on word boundaries.
///
/// Both sides are normalized first, so "Then," matches "then".
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let text = normalize(text);
    let phrase = normalize(phrase);
    if phrase.is_empty() {
        return false;
    }
    let words: Vec<&str> = text.split(' ').collect();
    let needle: Vec<&str> = phrase.split(' ').collect();
    words.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Whether the normalized utterance is exactly one of `vocabulary`
pub fn is_one_of(text: &str, vocabulary: &[&str]) -> bool {
    let normalized = normalize(text);
    !normalized.is_empty() && vocabulary.iter().any(|v| *v == normalized)
}

/// Whether the text, as spoken, ends with a question
pub fn ends_with_question(text: &str) -> bool {
    text.trim_end().ends_with('?')
}
