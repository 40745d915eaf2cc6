//! W3W token extraction (spec §4.3.1).
//!
//! A pure function: given a text, produce exactly three lowercase tokens
//! that stand in for the text's content once the source block is demoted
//! and its original content is no longer retained.

/// Fixed English stopword set. Swappable per spec §4.3.1; the three-token
/// contract is what callers depend on, not this particular list.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "with", "this", "from", "have", "are", "was", "were", "will",
    "been", "has", "had", "would",
];

const PLACEHOLDER: &str = "placeholder";

/// Lowercase, split on whitespace, drop short/stop words, take the first
/// three survivors in source order, pad with `"placeholder"` if fewer than
/// three remain. Always returns exactly three tokens.
pub fn tokenize_w3w(text: &str) -> [String; 3] {
    let lower = text.to_lowercase();
    let mut tokens: Vec<String> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect();

    tokens.truncate(3);
    while tokens.len() < 3 {
        tokens.push(PLACEHOLDER.to_string());
    }

    [
        tokens[0].clone(),
        tokens[1].clone(),
        tokens[2].clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_returns_three_tokens() {
        let t = tokenize_w3w("a an it");
        assert_eq!(t.len(), 3);
        assert_eq!(t, ["placeholder".to_string(), "placeholder".to_string(), "placeholder".to_string()]);
    }

    #[test]
    fn picks_first_three_eligible_tokens_in_order() {
        let t = tokenize_w3w("The quick brown fox jumps over the lazy dog");
        assert_eq!(t, ["quick".to_string(), "brown".to_string(), "fox".to_string()]);
    }

    #[test]
    fn drops_stopwords_and_short_tokens() {
        let t = tokenize_w3w("for a cat with the dog");
        // "for"/"with"/"the" are stopwords; "a" is too short.
        assert_eq!(t, ["cat".to_string(), "dog".to_string(), "placeholder".to_string()]);
    }

    #[test]
    fn pads_when_fewer_than_three_remain() {
        let t = tokenize_w3w("ok go");
        assert_eq!(t, ["placeholder".to_string(), "placeholder".to_string(), "placeholder".to_string()]);
    }

    #[test]
    fn is_case_insensitive() {
        let t = tokenize_w3w("QUICK Brown FOX");
        assert_eq!(t, ["quick".to_string(), "brown".to_string(), "fox".to_string()]);
    }

    proptest::proptest! {
        #[test]
        fn always_produces_exactly_three_lowercase_tokens(text in ".{0,200}") {
            let tokens = tokenize_w3w(&text);
            for token in &tokens {
                proptest::prop_assert_eq!(token, &token.to_lowercase());
            }
            proptest::prop_assert_eq!(tokens.len(), 3);
        }
    }
}
