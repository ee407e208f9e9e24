//! The operations the gateway serves, composed from parser, builder,
//! planner, executor and normalizer.

use crate::aggregations;
use crate::analyzer::{UserAnalyzer, UserSummary};
use crate::backend::executor::RELATIONAL_BACKEND;
use crate::backend::health::EndpointStatus;
use crate::backend::{BackendExecutor, RawResponse, TotalRelation};
use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::ids::{base36_encode, parse_id};
use crate::metrics;
use crate::normalize::{
    attach_link_submissions, normalize, NormalizedResult, LINK_ID_AGGREGATION,
};
use crate::query::{build, build_lookup, parse, ExactLookup, RawParams};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Seconds since the epoch; injectable for tests
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct Gateway {
    executor: Arc<BackendExecutor>,
    analyzer: UserAnalyzer,
    clock: Clock,
}

impl Gateway {
    /// `request_timeout` bounds the user analysis fan-out
    pub fn new(executor: Arc<BackendExecutor>, request_timeout: Duration) -> Self {
        Self {
            analyzer: UserAnalyzer::new(Arc::clone(&executor), request_timeout),
            executor,
            clock: system_clock,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn executor(&self) -> &Arc<BackendExecutor> {
        &self.executor
    }

    pub async fn search(
        &self,
        content_type: ContentType,
        raw: &RawParams,
    ) -> Result<NormalizedResult> {
        let started = Instant::now();
        let result = self.run_search(content_type, raw).await;
        metrics::record_request("search", status(&result), started.elapsed());
        result
    }

    async fn run_search(
        &self,
        content_type: ContentType,
        raw: &RawParams,
    ) -> Result<NormalizedResult> {
        let now = (self.clock)();
        let spec = parse(content_type, raw, now)?;
        let mut request = build(&spec);

        let mut warnings = Vec::new();
        if spec.is_exact_lookup() {
            if !spec.aggregations.is_empty() {
                warnings.push("aggregations are ignored for id lookups".to_string());
            }
        } else {
            let plan = aggregations::plan(&spec.aggregations, content_type, &spec.time_range, now)
                .with_min_doc_count(spec.min_doc_count);
            request.aggregations = plan.clauses;
            warnings = plan.warnings;
        }

        let response = self.executor.execute(&request).await?;
        debug!(
            "{} search answered by {} ({} hits)",
            content_type,
            response.backend_used,
            response.hits.len()
        );

        let link_ids: Vec<u64> = response
            .aggregations
            .get(LINK_ID_AGGREGATION)
            .map(|buckets| buckets.iter().filter_map(|b| b.key.as_u64()).collect())
            .unwrap_or_default();

        let mut result = normalize(response, &spec);
        if !link_ids.is_empty() {
            let lookup = build_lookup(&ExactLookup::Submissions(link_ids));
            match self.executor.execute(&lookup).await {
                Ok(submissions) => {
                    attach_link_submissions(&mut result, submissions, spec.time_range.after)
                }
                Err(err) => {
                    warn!("Could not load submissions for link_id buckets: {}", err);
                    warnings.push(format!("link_id submissions unavailable: {}", err.kind()));
                }
            }
        }
        result.warnings = warnings;
        Ok(result)
    }

    /// Base36 ids of every comment on a submission, ascending.
    pub async fn comment_ids(&self, submission_id: &str) -> Result<Vec<String>> {
        let started = Instant::now();
        let result = self.run_comment_ids(submission_id).await;
        metrics::record_request("comment_ids", status(&result), started.elapsed());
        result
    }

    async fn run_comment_ids(&self, submission_id: &str) -> Result<Vec<String>> {
        let link_id = parse_id(submission_id, "t3").map_err(|e| e.for_field("submission_id"))?;
        let lookup = ExactLookup::CommentIds(link_id);

        let mut response = self.executor.execute(&build_lookup(&lookup)).await?;
        if let Some(reason) = incomplete_linkage(&response) {
            if let Some(relational) = self.executor.relational_lookup(&lookup, reason).await? {
                response = relational;
            }
        }

        Ok(response.hits.iter().map(|hit| base36_encode(hit.id)).collect())
    }

    pub async fn analyze_user(&self, username: &str) -> Result<UserSummary> {
        let started = Instant::now();
        let result = self.analyzer.analyze(username).await;
        metrics::record_request("analyze_user", status(&result), started.elapsed());
        result
    }

    pub fn endpoint_health(&self) -> Vec<EndpointStatus> {
        self.executor.registry().snapshot()
    }
}

/// Why an index answer to a comment id lookup cannot be served as is
fn incomplete_linkage(response: &RawResponse) -> Option<&'static str> {
    if response.backend_used == RELATIONAL_BACKEND {
        None
    } else if response.hits.is_empty() {
        Some("index returned no comments")
    } else if response.total_relation == TotalRelation::LowerBound
        || response.total > response.hits.len() as u64
    {
        Some("index result truncated")
    } else {
        None
    }
}

fn status<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(Error::Validation(_)) => "invalid",
        Err(_) => "error",
    }
}
