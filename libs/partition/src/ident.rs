//! Validated SQL identifiers.
//!
//! Table and column names are interpolated into DDL and DML text, so they are
//! restricted to a small alphabet and always emitted double-quoted.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::NamingError;

/// Postgres truncates identifiers longer than this many bytes.
pub const MAX_IDENT_LEN: usize = 63;

const HASH_LEN: usize = 8;

/// A validated SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(String);

impl Ident {
    /// Validates `name` against the identifier allow-list.
    ///
    /// Allowed: ASCII letters, digits, `_` and `-`; first character must be a
    /// letter or `_`; at most 63 bytes.
    pub fn new(name: impl Into<String>) -> Result<Self, NamingError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NamingError::Empty);
        }
        if name.len() > MAX_IDENT_LEN {
            let len = name.len();
            return Err(NamingError::TooLong { name, len });
        }
        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(NamingError::InvalidChar { name, ch });
        }
        let first = name.chars().next().unwrap_or('_');
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(NamingError::InvalidStart { name });
        }
        Ok(Self(name))
    }

    /// Joins `parts` with `_`, shortening with a hash suffix when the result
    /// would exceed the identifier limit.
    ///
    /// Two different inputs never map to the same shortened name unless their
    /// SHA-256 prefixes collide.
    pub fn derived(parts: &[&str]) -> Result<Self, NamingError> {
        let joined = parts.join("_");
        if joined.len() <= MAX_IDENT_LEN {
            return Self::new(joined);
        }

        let digest = hex::encode(Sha256::digest(joined.as_bytes()));
        let keep = MAX_IDENT_LEN - HASH_LEN - 1;
        let mut cut = keep;
        while !joined.is_char_boundary(cut) {
            cut -= 1;
        }
        Self::new(format!("{}_{}", &joined[..cut], &digest[..HASH_LEN]))
    }

    /// Short stable hash of arbitrary text, usable inside identifiers.
    #[must_use]
    pub fn short_hash(value: &str) -> String {
        let digest = hex::encode(Sha256::digest(value.as_bytes()));
        digest[..HASH_LEN].to_string()
    }

    /// The raw, unquoted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a single-quoted string literal, for functions that take a
    /// relation name as text (e.g. `create_distributed_table`).
    #[must_use]
    pub fn literal(&self) -> String {
        format!("'{}'", self.0)
    }
}

impl fmt::Display for Ident {
    /// Always renders double-quoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("agg_awc")]
    #[case("agg_awc_2020-08-01")]
    #[case("_scratch")]
    #[case("ucr_icds-cas_static-dashboard_thr_forms_b8bca6ea")]
    fn test_accepts_allow_listed(#[case] name: &str) {
        assert_eq!(Ident::new(name).unwrap().as_str(), name);
    }

    #[rstest]
    #[case("", NamingError::Empty)]
    #[case("1abc", NamingError::InvalidStart { name: "1abc".into() })]
    #[case("a\"b", NamingError::InvalidChar { name: "a\"b".into(), ch: '"' })]
    #[case("a; drop", NamingError::InvalidChar { name: "a; drop".into(), ch: ';' })]
    fn test_rejects(#[case] name: &str, #[case] expected: NamingError) {
        assert_eq!(Ident::new(name).unwrap_err(), expected);
    }

    #[test]
    fn test_display_is_quoted() {
        let ident = Ident::new("child_health_monthly").unwrap();
        assert_eq!(ident.to_string(), "\"child_health_monthly\"");
        assert_eq!(ident.literal(), "'child_health_monthly'");
    }

    #[test]
    fn test_derived_short_names_are_plain_joins() {
        let ident = Ident::derived(&["tmp", "agg_awc_2020-08-01"]).unwrap();
        assert_eq!(ident.as_str(), "tmp_agg_awc_2020-08-01");
    }

    #[test]
    fn test_derived_long_names_are_capped_and_distinct() {
        let long = "icds_dashboard_ccs_record_postnatal_care_forms_2020-08-01";
        let a = Ident::derived(&["tmp", long, "state_one"]).unwrap();
        let b = Ident::derived(&["tmp", long, "state_two"]).unwrap();
        assert_eq!(a.as_str().len(), MAX_IDENT_LEN);
        assert_eq!(b.as_str().len(), MAX_IDENT_LEN);
        assert_ne!(a, b);
        assert_eq!(a, Ident::derived(&["tmp", long, "state_one"]).unwrap());
    }
}
