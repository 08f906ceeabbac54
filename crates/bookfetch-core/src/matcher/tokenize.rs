//! Word extraction shared by target and candidate titles.

use std::collections::BTreeSet;

/// Words of two characters or fewer carry no signal ("of", "a", "to").
const MIN_WORD_CHARS: usize = 3;

/// Splits `text` into comparable words.
///
/// Lower-cases, splits on whitespace, drops short words, strips every
/// non-alphanumeric character, and finally drops words that end up empty or
/// purely numeric (volume numbers, years). The length filter runs before
/// stripping, so `"it's"` survives as `"its"`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
        .map(sanitize_word)
        .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_numeric()))
        .collect()
}

/// Same as [`tokenize`], collected into a set for membership checks.
pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

fn sanitize_word(word: &str) -> String {
    word.chars().filter(|c| c.is_alphanumeric()).collect()
}
