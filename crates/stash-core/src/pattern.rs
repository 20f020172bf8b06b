//! Glob patterns for bulk invalidation.
//!
//! `*` matches any run of characters, including none. Every other
//! character, `?` and `[` included, matches itself.

use std::fmt;

use crate::error::CacheError;

/// A parsed invalidation pattern such as `cache:user:*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    raw: String,
    /// Literal runs between wildcards. A pattern with `n` wildcards has
    /// `n + 1` segments; leading/trailing segments may be empty.
    segments: Vec<String>,
}

impl GlobPattern {
    /// Parses a pattern.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidPattern` for the empty pattern.
    pub fn parse(pattern: &str) -> Result<Self, CacheError> {
        if pattern.is_empty() {
            return Err(CacheError::invalid_pattern(pattern, "pattern must not be empty"));
        }

        let mut segments: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut previous_star = false;
        for ch in pattern.chars() {
            if ch == '*' {
                if !previous_star {
                    segments.push(std::mem::take(&mut current));
                }
                previous_star = true;
            } else {
                current.push(ch);
                previous_star = false;
            }
        }
        segments.push(current);

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` if the pattern contains no wildcard.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.segments.len() == 1
    }

    /// The literal text before the first wildcard.
    #[must_use]
    pub fn literal_prefix(&self) -> &str {
        &self.segments[0]
    }

    /// Tests a key against the pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        let (first, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return false,
        };
        let Some((last, middle)) = rest.split_last() else {
            return key == first;
        };

        let Some(remaining) = key.strip_prefix(first.as_str()) else {
            return false;
        };
        let Some(mut remaining) = remaining.strip_suffix(last.as_str()) else {
            return false;
        };

        // Leftmost match for each inner segment is sufficient when the only
        // wildcard is an unbounded `*`.
        for segment in middle {
            match remaining.find(segment.as_str()) {
                Some(pos) => remaining = &remaining[pos + segment.len()..],
                None => return false,
            }
        }
        true
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for GlobPattern {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
