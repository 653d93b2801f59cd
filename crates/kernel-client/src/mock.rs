//! Mock ActivityOracle for unit testing
//!
//! Returns a fixed answer for every notebook and counts how often it was
//! asked, so tests can assert the oracle was (or was not) consulted.

use crate::error::KernelClientError;
use crate::oracle_trait::ActivityOracle;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Answer {
    Activity {
        idle: bool,
        last: Option<DateTime<Utc>>,
    },
    Failure(String),
}

/// Deterministic [`ActivityOracle`]
#[derive(Debug, Clone)]
pub struct MockActivityOracle {
    answer: Answer,
    calls: Arc<AtomicUsize>,
}

impl MockActivityOracle {
    fn with_answer(answer: Answer) -> Self {
        Self {
            answer,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Idle, last active one hour ago
    #[must_use]
    pub fn always_idle() -> Self {
        Self::idle_since(Utc::now() - Duration::hours(1))
    }

    /// Busy, last active one hour in the future
    #[must_use]
    pub fn never_idle() -> Self {
        Self::with_answer(Answer::Activity {
            idle: false,
            last: Some(Utc::now() + Duration::hours(1)),
        })
    }

    /// Idle, last active at `last`
    #[must_use]
    pub fn idle_since(last: DateTime<Utc>) -> Self {
        Self::with_answer(Answer::Activity {
            idle: true,
            last: Some(last),
        })
    }

    /// Idle with no kernels, so no activity was ever recorded
    #[must_use]
    pub fn without_activity() -> Self {
        Self::with_answer(Answer::Activity {
            idle: true,
            last: None,
        })
    }

    /// Every query fails with a status error carrying `message`
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_answer(Answer::Failure(message.into()))
    }

    /// Number of queries answered so far (shared between clones)
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> Result<(bool, Option<DateTime<Utc>>), KernelClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Answer::Activity { idle, last } => Ok((*idle, *last)),
            Answer::Failure(message) => Err(KernelClientError::Status(message.clone())),
        }
    }
}

#[async_trait::async_trait]
impl ActivityOracle for MockActivityOracle {
    async fn is_idle(&self, _namespace: &str, _name: &str) -> Result<bool, KernelClientError> {
        self.answer().map(|(idle, _)| idle)
    }

    async fn last_activity(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<DateTime<Utc>>, KernelClientError> {
        self.answer().map(|(_, last)| last)
    }
}
