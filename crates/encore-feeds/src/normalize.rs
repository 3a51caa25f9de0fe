//! Identity normalization for comparing scraped text across polls.

/// Folds a string down to a stable comparison form: ASCII lowercase
/// alphanumerics and single spaces, everything else dropped. Applied
/// identically to both sides of every comparison, so accented or
/// punctuated source text still matches itself on later polls.
pub fn normalize_identity(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            folded.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() {
            folded.push(' ');
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
