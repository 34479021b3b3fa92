//! Text folding for case- and diacritic-insensitive matching

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold text for comparison: NFD-decompose, drop combining marks, lowercase,
/// turn punctuation into spaces and collapse runs of whitespace.
///
/// `"Nova  Cobrança!"` folds to `"nova cobranca"`.
pub fn fold(text: &str) -> String {
    let spaced: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Folded words of `text`
pub fn words(text: &str) -> Vec<String> {
    fold(text).split(' ').filter(|w| !w.is_empty()).map(String::from).collect()
}

/// Whether `phrase` occurs in `haystack` as a contiguous run of whole words
pub fn contains_phrase(haystack: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > haystack.len() {
        return false;
    }
    haystack.windows(phrase.len()).any(|window| window == phrase)
}
