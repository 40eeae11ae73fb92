//! Glob Pattern Matching for KEYS
//!
//! Supported syntax:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - every other character matches itself
//!
//! Matching is anchored: the pattern has to cover the whole key.
//!
//! ## Matching Strategy
//!
//! The pattern is compiled once into a token list and then run as a set of
//! live positions (a tiny NFA) over the key, one character at a time. Each
//! step costs at most one pass over the pattern, so a match is
//! `O(pattern * key)` no matter how many `*` the pattern holds. A recursive
//! matcher that retries every split point for every `*` goes exponential on
//! inputs like `a*a*a*a*a*b` against a long run of `a`.

/// A single compiled pattern element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    /// A character that has to match exactly
    Literal(char),
    /// `?`
    AnyChar,
    /// `*` (consecutive stars are collapsed into one)
    AnyRun,
}

/// A compiled glob pattern.
///
/// # Example
///
/// ```
/// use linekv::storage::GlobPattern;
///
/// let pattern = GlobPattern::new("user:*");
/// assert!(pattern.matches("user:1234"));
/// assert!(!pattern.matches("visitor:1"));
/// ```
#[derive(Debug, Clone)]
pub struct GlobPattern {
    tokens: Vec<Token>,
}

impl GlobPattern {
    /// Compiles a pattern.
    pub fn new(pattern: &str) -> Self {
        let mut tokens = Vec::with_capacity(pattern.len());
        for c in pattern.chars() {
            let token = match c {
                '*' => Token::AnyRun,
                '?' => Token::AnyChar,
                c => Token::Literal(c),
            };
            if token == Token::AnyRun && tokens.last() == Some(&Token::AnyRun) {
                continue;
            }
            tokens.push(token);
        }
        Self { tokens }
    }

    /// Returns true if the pattern is a lone `*` and matches everything.
    pub fn matches_all(&self) -> bool {
        self.tokens == [Token::AnyRun]
    }

    /// Returns true if `text` matches the whole pattern.
    pub fn matches(&self, text: &str) -> bool {
        if self.matches_all() {
            return true;
        }

        let accept = self.tokens.len();

        // live[i] == pattern positions 0..i have consumed the text read so far
        let mut live = vec![false; accept + 1];
        let mut next = vec![false; accept + 1];

        live[0] = true;
        self.close_over_stars(&mut live);

        for c in text.chars() {
            next.iter_mut().for_each(|slot| *slot = false);
            let mut any = false;

            for (i, token) in self.tokens.iter().enumerate() {
                if !live[i] {
                    continue;
                }
                match *token {
                    Token::AnyRun => {
                        next[i] = true;
                        any = true;
                    }
                    Token::AnyChar => {
                        next[i + 1] = true;
                        any = true;
                    }
                    Token::Literal(l) if l == c => {
                        next[i + 1] = true;
                        any = true;
                    }
                    Token::Literal(_) => {}
                }
            }

            if !any {
                return false;
            }

            self.close_over_stars(&mut next);
            std::mem::swap(&mut live, &mut next);
        }

        live[accept]
    }

    /// A live `*` can also match the empty string, so the position after it
    /// is live too.
    fn close_over_stars(&self, states: &mut [bool]) {
        for (i, token) in self.tokens.iter().enumerate() {
            if states[i] && *token == Token::AnyRun {
                states[i + 1] = true;
            }
        }
    }
}
