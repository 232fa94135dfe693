//! Run identity

use std::fmt;

/// Identifier of one extraction run, based on UUIDv7
///
/// Runs started later compare greater, which lets a session tell its
/// current run apart from a stale one without any shared counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u128);

impl RunId {
    /// Generate a new UUIDv7-based RunId
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_domain::RunId;
    ///
    /// let id = RunId::new();
    /// assert!(id.value() > 0);
    /// ```
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Create a RunId from a raw u128 value
    pub fn from_value(value: u128) -> Self {
        Self(value)
    }

    /// Parse a RunId from its string form
    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|u| Self(u.as_u128()))
            .map_err(|e| format!("Invalid run id: {}", e))
    }

    /// Get the raw u128 value
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Milliseconds since the Unix epoch at which the run was started
    pub fn timestamp(&self) -> u64 {
        (self.0 >> 80) as u64
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_string_roundtrip(value: u128) {
            let id = RunId::from_value(value);
            match RunId::from_string(&id.to_string()) {
                Ok(parsed) => prop_assert_eq!(id, parsed),
                Err(e) => return Err(TestCaseError::fail(e)),
            }
        }

        #[test]
        fn test_ordering_matches_value(a: u128, b: u128) {
            prop_assert_eq!(RunId::from_value(a) < RunId::from_value(b), a < b);
        }
    }
}
