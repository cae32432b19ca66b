//! Algorithm-qualified checksums (`sha256:abc…`).

use std::fmt;

/// Algorithm assumed when a checksum string carries no `algorithm:` prefix.
pub const DEFAULT_ALGORITHM: &str = "sha256";

/// A hash algorithm name paired with a hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    algorithm: String,
    hash: String,
}

impl Checksum {
    /// Build a checksum from its parts.
    pub fn new(algorithm: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            hash: hash.into(),
        }
    }

    /// Parse an `algorithm:hash` string.
    ///
    /// A string without `:` is a bare hash using [`DEFAULT_ALGORITHM`]. A
    /// string with more than one `:` is kept whole as the hash and has an
    /// empty algorithm.
    pub fn parse(s: &str) -> Self {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [hash] => Self::new(DEFAULT_ALGORITHM, *hash),
            [algorithm, hash] => Self::new(*algorithm, *hash),
            _ => Self::new("", s),
        }
    }

    /// The algorithm name, possibly empty.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The hex digest.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Whether two checksums describe the same digest.
    ///
    /// Hashes must be equal. Algorithms must be equal ignoring case unless
    /// either side has no algorithm at all.
    #[must_use]
    pub fn matches(&self, other: &Checksum) -> bool {
        if self.hash != other.hash {
            return false;
        }
        self.algorithm.is_empty()
            || other.algorithm.is_empty()
            || self.algorithm.eq_ignore_ascii_case(&other.algorithm)
    }

    /// [`Checksum::matches`] against an unparsed string.
    #[must_use]
    pub fn matches_str(&self, other: &str) -> bool {
        self.matches(&Checksum::parse(other))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.algorithm.is_empty() {
            write!(f, "{}", self.hash)
        } else {
            write!(f, "{}:{}", self.algorithm, self.hash)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified() {
        let c = Checksum::parse("sha512:abc");
        assert_eq!(c.algorithm(), "sha512");
        assert_eq!(c.hash(), "abc");
    }

    #[test]
    fn test_parse_bare_defaults_to_sha256() {
        let c = Checksum::parse("abc");
        assert_eq!(c.algorithm(), "sha256");
        assert_eq!(c.hash(), "abc");
    }

    #[test]
    fn test_parse_extra_colons_is_literal_hash() {
        let c = Checksum::parse("md5:c:d");
        assert_eq!(c.algorithm(), "");
        assert_eq!(c.hash(), "md5:c:d");
    }

    #[test]
    fn test_matches_unqualified_against_qualified() {
        assert!(Checksum::parse("sha256:c").matches(&Checksum::parse("c")));
        assert!(Checksum::parse("c").matches(&Checksum::parse("sha256:c")));
    }

    #[test]
    fn test_algorithm_mismatch_does_not_match() {
        assert!(!Checksum::parse("md5:c").matches(&Checksum::parse("sha256:c")));
    }

    #[test]
    fn test_algorithm_compare_ignores_case() {
        assert!(Checksum::parse("SHA256:c").matches_str("sha256:c"));
    }

    #[test]
    fn test_hash_compare_is_case_sensitive() {
        assert!(!Checksum::parse("sha256:ABC").matches_str("sha256:abc"));
    }

    #[test]
    fn test_literal_hash_only_matches_same_literal() {
        let literal = Checksum::parse("md5:c:d");
        assert!(literal.matches_str("md5:c:d"));
        assert!(!literal.matches_str("md5:c"));
        assert!(!literal.matches_str("c:d"));
    }

    #[test]
    fn test_display_round_trips() {
        assert_eq!(Checksum::parse("sha256:abc").to_string(), "sha256:abc");
        assert_eq!(Checksum::parse("abc").to_string(), "sha256:abc");
        assert_eq!(Checksum::parse("a:b:c").to_string(), "a:b:c");
    }
}
