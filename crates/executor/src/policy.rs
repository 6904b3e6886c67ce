use std::time::Duration;

use crate::error::TaskError;

/// How the executor should treat a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Try again after the policy delay.
    Retryable,
    /// Stop now. `matched` is the terminal substring that was found.
    Terminal { matched: String },
}

/// Retry budget and error classification.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use shepherd_executor::{ErrorClass, RetryPolicy, TaskError};
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(5))
///     .with_terminal_substrings(["banned"]);
/// assert_eq!(
///     policy.classify(&TaskError::new("account BANNED by platform")),
///     ErrorClass::Terminal { matched: "banned".into() },
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
    /// Error-message substrings that make a failure terminal. Matched
    /// case-insensitively.
    pub terminal_substrings: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            terminal_substrings: vec![
                "banned".to_owned(),
                "suspended".to_owned(),
                "disabled by the user".to_owned(),
            ],
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            terminal_substrings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_terminal_substrings<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminal_substrings = substrings.into_iter().map(Into::into).collect();
        self
    }

    /// Attempts actually made before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Classify `err` by scanning its message for a terminal substring.
    #[must_use]
    pub fn classify(&self, err: &TaskError) -> ErrorClass {
        let message = err.message().to_lowercase();
        self.terminal_substrings
            .iter()
            .find(|s| !s.is_empty() && message.contains(&s.to_lowercase()))
            .map_or(ErrorClass::Retryable, |s| ErrorClass::Terminal {
                matched: s.clone(),
            })
    }
}
