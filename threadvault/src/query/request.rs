//! Backend-agnostic search request.
//!
//! Produced by the query builder, rendered to a concrete wire format by a
//! [`SearchIndexClient`](crate::backend::SearchIndexClient).

use crate::aggregations::AggregationClause;
use crate::content_type::ContentType;
use crate::query::spec::SortDir;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Clause {
    /// All terms of `query` must match in at least one of `fields`
    FullText { query: String, fields: Vec<String> },
    /// Field equals any of `values`
    Terms { field: String, values: Vec<Value> },
    Term { field: String, value: Value },
    Range { field: String, bounds: RangeBounds },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub dir: SortDir,
}

/// Lookups by exact id: the only requests eligible for the relational fallback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum ExactLookup {
    Comments(Vec<u64>),
    Submissions(Vec<u64>),
    /// Ids of all comments attached to one submission
    CommentIds(u64),
}

impl ExactLookup {
    pub fn content_type(&self) -> ContentType {
        match self {
            ExactLookup::Comments(_) | ExactLookup::CommentIds(_) => ContentType::Comment,
            ExactLookup::Submissions(_) => ContentType::Submission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRequest {
    /// Selects the index the request runs against
    pub content_type: ContentType,
    pub must: Vec<Clause>,
    pub filter: Vec<Clause>,
    pub must_not: Vec<Clause>,
    pub sort: Vec<SortSpec>,
    pub from: usize,
    pub size: usize,
    /// Source fields to return; `id` is always returned
    pub source: Vec<String>,
    pub aggregations: Vec<AggregationClause>,
    pub track_total_hits: bool,
    /// Set when the request is an exact-id lookup
    pub lookup: Option<ExactLookup>,
}

impl BackendRequest {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            must: Vec::new(),
            filter: Vec::new(),
            must_not: Vec::new(),
            sort: Vec::new(),
            from: 0,
            size: 0,
            source: Vec::new(),
            aggregations: Vec::new(),
            track_total_hits: false,
            lookup: None,
        }
    }

    pub fn is_exact_lookup(&self) -> bool {
        self.lookup.is_some()
    }

    /// The range clause on `field`, if any
    pub fn range_on(&self, field: &str) -> Option<&RangeBounds> {
        self.filter.iter().find_map(|c| match c {
            Clause::Range { field: f, bounds } if f == field => Some(bounds),
            _ => None,
        })
    }
}
