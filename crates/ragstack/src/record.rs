//! The query record: one RAG query's state and result, keyed by
//! `query_id` in the query record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StackError};

/// A stored entry holding the state and result of one RAG query.
///
/// Written by the API function when a query is submitted, completed by
/// the worker, and read back by the API function when callers poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    /// Unique identifier; generated when the caller does not supply one.
    pub query_id: String,

    /// The question text as submitted.
    pub query_text: String,

    /// The generated answer, empty until the worker completes.
    #[serde(default)]
    pub answer_text: String,

    /// Source document ids the answer was grounded on.
    #[serde(default)]
    pub sources: Vec<String>,

    /// Whether the worker has finished this query.
    #[serde(default)]
    pub is_complete: bool,

    /// When the query was submitted.
    pub create_time: DateTime<Utc>,
}

impl QueryRecord {
    /// Creates a fresh, incomplete record with a generated id.
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_id: Uuid::new_v4().to_string(),
            query_text: query_text.into(),
            answer_text: String::new(),
            sources: Vec::new(),
            is_complete: false,
            create_time: Utc::now(),
        }
    }

    /// Marks the record complete with the worker's answer.
    pub fn complete(mut self, answer_text: impl Into<String>, sources: Vec<String>) -> Self {
        self.answer_text = answer_text.into();
        self.sources = sources;
        self.is_complete = true;
        self
    }

    /// Rejects records that cannot be keyed. An empty `query_id` has no
    /// defined storage location; a present id is an upsert and overwrites
    /// deterministically.
    pub fn validate_key(&self) -> Result<()> {
        if self.query_id.is_empty() {
            return Err(StackError::InvalidRecord(
                "query_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_incomplete_with_fresh_id() {
        let a = QueryRecord::new("how much does a landing page cost?");
        let b = QueryRecord::new("how much does a landing page cost?");
        assert!(!a.is_complete);
        assert!(a.answer_text.is_empty());
        assert!(!a.query_id.is_empty());
        assert_ne!(a.query_id, b.query_id);
    }

    #[test]
    fn test_complete_sets_answer_and_flag() {
        let record = QueryRecord::new("q").complete("a", vec!["doc-1".to_string()]);
        assert!(record.is_complete);
        assert_eq!(record.answer_text, "a");
        assert_eq!(record.sources, vec!["doc-1".to_string()]);
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut record = QueryRecord::new("q");
        record.query_id.clear();
        assert!(record.validate_key().is_err());
    }
}
