//! Token usage accounting

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Token counts for one invocation, or summed across a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetrics {
    /// Tokens in the prompt
    pub prompt_tokens: u64,
    /// Tokens generated
    pub completion_tokens: u64,
    /// Prompt plus completion
    pub total_tokens: u64,
}

impl UsageMetrics {
    /// Build usage from prompt and completion counts
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Whether nothing has been counted
    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

impl Add for UsageMetrics {
    type Output = UsageMetrics;

    fn add(self, rhs: UsageMetrics) -> UsageMetrics {
        UsageMetrics {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for UsageMetrics {
    fn add_assign(&mut self, rhs: UsageMetrics) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum() {
        let mut total = UsageMetrics::default();
        assert!(total.is_empty());
        total += UsageMetrics::new(100, 20);
        total += UsageMetrics::new(50, 5);
        assert_eq!(total, UsageMetrics::new(150, 25));
        assert_eq!(total.total_tokens, 175);
    }

    #[test]
    fn test_camel_case_keys() {
        let json = serde_json::to_string(&UsageMetrics::new(1, 2)).unwrap();
        assert_eq!(json, r#"{"promptTokens":1,"completionTokens":2,"totalTokens":3}"#);
    }
}
