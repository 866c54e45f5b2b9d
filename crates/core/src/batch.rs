//! Partial-success reporting for batch operations.
//!
//! Item add/remove calls act on many independent serials in one request.
//! Some serials succeed and some fail; neither outcome aborts the other.
//! `BatchOutcome` models that explicitly instead of throwing on first
//! failure: an ordered success list plus a per-subject rejection list.

use serde::Serialize;

/// A single rejected subject together with the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection<K, R> {
    pub subject: K,
    pub reason: R,
}

/// Outcome of a batch operation: which subjects were updated, which were
/// rejected and why. Order follows the caller's input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome<K, R> {
    pub updated: Vec<K>,
    pub rejected: Vec<Rejection<K, R>>,
}

impl<K, R> BatchOutcome<K, R> {
    pub fn new() -> Self {
        Self {
            updated: Vec::new(),
            rejected: Vec::new(),
        }
    }

    pub fn record_updated(&mut self, subject: K) {
        self.updated.push(subject);
    }

    pub fn record_rejected(&mut self, subject: K, reason: R) {
        self.rejected.push(Rejection { subject, reason });
    }

    /// True when every subject in the batch was updated.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl<K, R> Default for BatchOutcome<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: core::fmt::Display, R: core::fmt::Display> BatchOutcome<K, R> {
    /// Render the rejections as structured `{subject, reason}` pairs for
    /// callers (e.g. an HTTP layer) that report failures as a flat list.
    pub fn faults(&self) -> Vec<Fault> {
        self.rejected
            .iter()
            .map(|r| Fault {
                subject: r.subject.to_string(),
                reason: r.reason.to_string(),
            })
            .collect()
    }
}

/// Structured failure report entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub subject: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_keeps_input_order_per_list() {
        let mut outcome: BatchOutcome<&str, &str> = BatchOutcome::new();
        outcome.record_updated("S1");
        outcome.record_rejected("S2", "broken");
        outcome.record_updated("S3");

        assert_eq!(outcome.updated, vec!["S1", "S3"]);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(!outcome.is_clean());
    }

    #[test]
    fn faults_render_subject_and_reason() {
        let mut outcome: BatchOutcome<&str, &str> = BatchOutcome::new();
        outcome.record_rejected("S2", "already reserved");

        let faults = outcome.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].subject, "S2");
        assert_eq!(faults[0].reason, "already reserved");

        let json = serde_json::to_string(&faults[0]).unwrap();
        assert_eq!(json, r#"{"subject":"S2","reason":"already reserved"}"#);
    }

    #[test]
    fn empty_outcome_is_clean() {
        let outcome: BatchOutcome<&str, &str> = BatchOutcome::default();
        assert!(outcome.is_clean());
        assert!(outcome.faults().is_empty());
    }
}
