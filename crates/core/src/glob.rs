//! Two glob dialects:
//!
//! - **flat**: used for action globs and `StringLike`/`StringNotLike`. The
//!   whole string is a single segment; `.` has no special meaning. This is
//!   exactly what `glob::Pattern` already does with
//!   `require_literal_separator: false`, so the flat dialect is a thin
//!   wrapper over the `glob` crate.
//! - **segmented**: used for resource globs. `.` separates segments; `*`
//!   matches exactly one segment, `**` matches zero or more segments, and
//!   (unlike a filesystem path) `**` is allowed to sit directly against
//!   literal text in the same segment (`testData**`), which the `glob`
//!   crate's path semantics reject. Implemented here as a small
//!   tokenize-then-match routine instead.

use glob::{MatchOptions, Pattern};

const FLAT_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compile and match `candidate` against `pattern` as a flat glob (actions,
/// `StringLike`). A compile error is logged and treated as "does not match" —
/// a malformed pattern can never accidentally grant access.
pub fn flat_matches(pattern: &str, candidate: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(compiled) => compiled.matches_with(candidate, FLAT_OPTIONS),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "invalid flat glob pattern");
            false
        }
    }
}

/// Compile and match `candidate` against `pattern` as a dotted-segment glob
/// (resources). `*` matches within a segment (never crosses `.`); `**`
/// matches across any number of segments (always crosses `.`).
pub fn segmented_matches(pattern: &str, candidate: &str) -> bool {
    let tokens = tokenize(pattern);
    is_match(&tokens, candidate.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Lit(u8),
    Star,       // matches zero or more bytes, never '.'
    DoubleStar, // matches zero or more bytes, including '.'
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let bytes = pattern.as_bytes();
    let mut tokens = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'*' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'*' {
                tokens.push(Token::DoubleStar);
                i += 2;
            } else {
                tokens.push(Token::Star);
                i += 1;
            }
        } else {
            tokens.push(Token::Lit(bytes[i]));
            i += 1;
        }
    }
    tokens
}

/// Classic wildcard-matching dynamic program, `dp[i][j]` = "the first `i`
/// tokens match the first `j` bytes of the candidate".
fn is_match(tokens: &[Token], text: &[u8]) -> bool {
    let n = tokens.len();
    let m = text.len();
    let mut dp = vec![vec![false; m + 1]; n + 1];
    dp[0][0] = true;
    for i in 1..=n {
        dp[i][0] = matches!(tokens[i - 1], Token::Star | Token::DoubleStar) && dp[i - 1][0];
    }
    for i in 1..=n {
        for j in 1..=m {
            dp[i][j] = match tokens[i - 1] {
                Token::Lit(c) => dp[i - 1][j - 1] && c == text[j - 1],
                Token::Star => (dp[i][j - 1] && text[j - 1] != b'.') || dp[i - 1][j],
                Token::DoubleStar => dp[i][j - 1] || dp[i - 1][j],
            };
        }
    }
    dp[n][m]
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Policy documents are untrusted input; no pattern/candidate pair may panic.
        #[test]
        fn segmented_matches_never_panics(pattern in "[a-zA-Z0-9.*]{0,30}", candidate in "[a-zA-Z0-9.]{0,30}") {
            let _ = segmented_matches(&pattern, &candidate);
        }

        #[test]
        fn segmented_matches_is_deterministic(pattern in "[a-zA-Z0-9.*]{0,30}", candidate in "[a-zA-Z0-9.]{0,30}") {
            prop_assert_eq!(segmented_matches(&pattern, &candidate), segmented_matches(&pattern, &candidate));
        }

        #[test]
        fn literal_pattern_with_no_wildcards_only_matches_itself(literal in "[a-zA-Z0-9]{1,15}") {
            prop_assert!(segmented_matches(&literal, &literal));
        }
    }
}
