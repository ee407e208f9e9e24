//! Backends: search index endpoints with failover, and the relational store
//! used as last resort for exact-id lookups.

pub mod elasticsearch;
pub mod executor;
pub mod health;
pub mod relational;

pub use elasticsearch::ElasticsearchClient;
pub use executor::BackendExecutor;
pub use health::{EndpointState, HealthConfig, HealthRegistry};
pub use relational::SqliteStore;

use crate::error::Result;
use crate::query::request::{BackendRequest, ExactLookup};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One configured search index endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalRelation {
    #[default]
    Exact,
    LowerBound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    /// Numeric record id
    pub id: u64,
    pub source: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBucket {
    pub key: Value,
    pub doc_count: u64,
}

/// Backend response before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    pub took_ms: u64,
    pub total: u64,
    pub total_relation: TotalRelation,
    pub hits: Vec<RawHit>,
    /// Buckets per aggregation name, in the order the backend returned them
    pub aggregations: BTreeMap<String, Vec<RawBucket>>,
    /// Endpoint name, or `relational`; filled in by the executor
    pub backend_used: String,
}

/// Search index protocol client.
///
/// `search` reports timeouts, connection failures and 5xx answers as
/// [`Error::BackendTransient`](crate::Error::BackendTransient); any other
/// error aborts the request without failover.
#[async_trait]
pub trait SearchIndexClient: Send + Sync {
    async fn search(&self, endpoint: &Endpoint, request: &BackendRequest) -> Result<RawResponse>;

    async fn probe(&self, endpoint: &Endpoint) -> bool;
}

/// Parameterized queries the relational store knows how to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationalTemplate {
    CommentsByIds,
    SubmissionsByIds,
    CommentIdsBySubmission,
}

impl RelationalTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationalTemplate::CommentsByIds => "comments_by_ids",
            RelationalTemplate::SubmissionsByIds => "submissions_by_ids",
            RelationalTemplate::CommentIdsBySubmission => "comment_ids_by_submission",
        }
    }

    /// Template and bind parameters answering `lookup`
    pub fn for_lookup(lookup: &ExactLookup) -> (Self, Vec<u64>) {
        match lookup {
            ExactLookup::Comments(ids) => (RelationalTemplate::CommentsByIds, ids.clone()),
            ExactLookup::Submissions(ids) => (RelationalTemplate::SubmissionsByIds, ids.clone()),
            ExactLookup::CommentIds(link_id) => {
                (RelationalTemplate::CommentIdsBySubmission, vec![*link_id])
            }
        }
    }
}

/// A row is a JSON object carrying at least a numeric `id`
pub type Row = Map<String, Value>;

#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn query(&self, template: RelationalTemplate, params: &[u64]) -> Result<Vec<Row>>;
}
