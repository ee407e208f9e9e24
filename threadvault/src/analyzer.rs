//! Per-author activity summary.
//!
//! Four independent sub-queries run concurrently through the backend executor
//! under one deadline. A sub-query that fails or is still running at the
//! deadline leaves its section empty and is listed in `failed_sections`; the
//! summary only fails when every section failed.

use crate::aggregations::AggregationClause;
use crate::backend::{BackendExecutor, RawResponse};
use crate::content_type::ContentType;
use crate::error::{Error, Result, ValidationError};
use crate::metrics;
use crate::normalize::Bucket;
use crate::query::builder::build;
use crate::query::request::BackendRequest;
use crate::query::spec::QuerySpec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const MAX_USERNAME_LEN: usize = 20;
const TOP_SUBREDDITS: usize = 25;
const ACTIVITY_BUCKET_SECS: i64 = 86_400;

pub const SECTION_COMMENT_COUNT: &str = "comment_count";
pub const SECTION_SUBMISSION_COUNT: &str = "submission_count";
pub const SECTION_TOP_SUBREDDITS: &str = "top_subreddits";
pub const SECTION_ACTIVITY_HISTOGRAM: &str = "activity_histogram";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub author: String,
    pub comment_count: Option<u64>,
    pub submission_count: Option<u64>,
    /// Subreddits the author commented in most, by comment count
    pub top_subreddits: Option<Vec<Bucket>>,
    /// Comments per day, oldest first
    pub activity_histogram: Option<Vec<Bucket>>,
    pub failed_sections: Vec<String>,
}

/// Validate and lowercase a username
pub fn normalize_username(username: &str) -> std::result::Result<String, ValidationError> {
    let valid = !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !valid {
        return Err(ValidationError::new(
            "username",
            format!("'{username}' is not a valid username (1-20 of A-Z, a-z, 0-9, _ or -)"),
        ));
    }
    Ok(username.to_ascii_lowercase())
}

pub struct UserAnalyzer {
    executor: Arc<BackendExecutor>,
    deadline: Duration,
}

impl UserAnalyzer {
    pub fn new(executor: Arc<BackendExecutor>, deadline: Duration) -> Self {
        Self { executor, deadline }
    }

    pub async fn analyze(&self, username: &str) -> Result<UserSummary> {
        let author = normalize_username(username)?;
        let deadline = Instant::now() + self.deadline;

        let (comments, submissions, subreddits, histogram) = tokio::join!(
            self.section(deadline, count_request(ContentType::Comment, &author)),
            self.section(deadline, count_request(ContentType::Submission, &author)),
            self.section(
                deadline,
                aggregation_request(
                    &author,
                    AggregationClause::terms(
                        SECTION_TOP_SUBREDDITS,
                        "subreddit",
                        TOP_SUBREDDITS
                    ),
                )
            ),
            self.section(
                deadline,
                aggregation_request(
                    &author,
                    AggregationClause::date_histogram(
                        SECTION_ACTIVITY_HISTOGRAM,
                        "created_utc",
                        ACTIVITY_BUCKET_SECS
                    ),
                )
            ),
        );

        let mut failures: Vec<(&str, Error)> = Vec::new();
        let mut keep = |section: &'static str, result: Result<RawResponse>| match result {
            Ok(response) => Some(response),
            Err(err) => {
                warn!("User analysis section {} failed for {}: {}", section, author, err);
                metrics::record_failed_section(section);
                failures.push((section, err));
                None
            }
        };

        let comment_count = keep(SECTION_COMMENT_COUNT, comments).map(|r| r.total);
        let submission_count = keep(SECTION_SUBMISSION_COUNT, submissions).map(|r| r.total);
        let top_subreddits = keep(SECTION_TOP_SUBREDDITS, subreddits)
            .map(|r| buckets(r, SECTION_TOP_SUBREDDITS));
        let activity_histogram = keep(SECTION_ACTIVITY_HISTOGRAM, histogram)
            .map(|r| buckets(r, SECTION_ACTIVITY_HISTOGRAM));

        if failures.len() == 4 {
            let detail = failures
                .iter()
                .map(|(section, err)| format!("{section}: {err}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::BackendUnavailable(format!(
                "every user analysis section failed ({detail})"
            )));
        }

        debug!(
            "Analyzed {} with {} failed sections",
            author,
            failures.len()
        );

        Ok(UserSummary {
            author: author.clone(),
            comment_count,
            submission_count,
            top_subreddits,
            activity_histogram,
            failed_sections: failures.iter().map(|(s, _)| s.to_string()).collect(),
        })
    }

    async fn section(&self, deadline: Instant, request: BackendRequest) -> Result<RawResponse> {
        match tokio::time::timeout_at(deadline, self.executor.execute(&request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::BackendTransient(format!(
                "deadline of {}ms exceeded",
                self.deadline.as_millis()
            ))),
        }
    }
}

fn author_spec(content_type: ContentType, author: &str) -> QuerySpec {
    QuerySpec::new(content_type)
        .with_filter("author", &[author])
        .with_size(0)
}

fn count_request(content_type: ContentType, author: &str) -> BackendRequest {
    build(&author_spec(content_type, author))
}

fn aggregation_request(author: &str, clause: AggregationClause) -> BackendRequest {
    let mut request = build(&author_spec(ContentType::Comment, author));
    request.aggregations = vec![clause];
    request
}

fn buckets(mut response: RawResponse, name: &str) -> Vec<Bucket> {
    response
        .aggregations
        .remove(name)
        .unwrap_or_default()
        .into_iter()
        .map(|b| Bucket {
            key: b.key,
            doc_count: b.doc_count,
            data: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::health::{HealthConfig, HealthRegistry};
    use crate::backend::{Endpoint, RawBucket, SearchIndexClient};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Answers every request except those matching `fail` (transient error)
    /// or `hang` (never returns).
    struct ScriptedIndex {
        fail: fn(&BackendRequest) -> bool,
        hang: fn(&BackendRequest) -> bool,
        calls: Mutex<usize>,
    }

    fn never(_: &BackendRequest) -> bool {
        false
    }

    fn always(_: &BackendRequest) -> bool {
        true
    }

    fn is_submission(r: &BackendRequest) -> bool {
        r.content_type == ContentType::Submission
    }

    fn is_histogram(r: &BackendRequest) -> bool {
        r.aggregations.iter().any(|a| a.is_date_histogram())
    }

    #[async_trait]
    impl SearchIndexClient for ScriptedIndex {
        async fn search(&self, _: &Endpoint, request: &BackendRequest) -> Result<RawResponse> {
            *self.calls.lock() += 1;
            if (self.hang)(request) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if (self.fail)(request) {
                return Err(Error::BackendTransient("connection reset".into()));
            }
            let mut response = RawResponse {
                total: match request.content_type {
                    ContentType::Comment => 120,
                    ContentType::Submission => 7,
                },
                ..Default::default()
            };
            for agg in &request.aggregations {
                response.aggregations.insert(
                    agg.name.clone(),
                    vec![RawBucket {
                        key: json!("rust"),
                        doc_count: 100,
                    }],
                );
            }
            Ok(response)
        }

        async fn probe(&self, _: &Endpoint) -> bool {
            false
        }
    }

    fn analyzer(index: Arc<ScriptedIndex>) -> UserAnalyzer {
        let registry = Arc::new(HealthRegistry::new(
            vec![Endpoint::new("primary", "http://primary:9200")],
            HealthConfig::default(),
        ));
        let executor = BackendExecutor::new(index, registry, Duration::from_secs(30));
        UserAnalyzer::new(Arc::new(executor), Duration::from_millis(500))
    }

    fn scripted(
        fail: fn(&BackendRequest) -> bool,
        hang: fn(&BackendRequest) -> bool,
    ) -> Arc<ScriptedIndex> {
        Arc::new(ScriptedIndex {
            fail,
            hang,
            calls: Mutex::new(0),
        })
    }

    #[tokio::test]
    async fn test_all_sections_present() {
        let summary = analyzer(scripted(never, never))
            .analyze("Spez")
            .await
            .unwrap();

        assert_eq!(summary.author, "spez");
        assert_eq!(summary.comment_count, Some(120));
        assert_eq!(summary.submission_count, Some(7));
        assert_eq!(summary.top_subreddits.as_ref().map(Vec::len), Some(1));
        assert_eq!(summary.activity_histogram.as_ref().map(Vec::len), Some(1));
        assert!(summary.failed_sections.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let summary = analyzer(scripted(is_submission, never))
            .analyze("spez")
            .await
            .unwrap();

        assert_eq!(summary.submission_count, None);
        assert_eq!(summary.comment_count, Some(120));
        assert_eq!(summary.failed_sections, vec![SECTION_SUBMISSION_COUNT]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_slow_section() {
        let summary = analyzer(scripted(never, is_histogram))
            .analyze("spez")
            .await
            .unwrap();

        assert_eq!(summary.activity_histogram, None);
        assert!(summary.top_subreddits.is_some());
        assert_eq!(summary.failed_sections, vec![SECTION_ACTIVITY_HISTOGRAM]);
    }

    #[tokio::test]
    async fn test_every_section_failing_is_an_error() {
        let err = analyzer(scripted(always, never))
            .analyze("spez")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_invalid_username_never_reaches_backend() {
        let index = scripted(never, never);
        let analyzer = analyzer(index.clone());

        for bad in ["", "has space", "waytoolongusername_abcdef", "ünïcode"] {
            let err = analyzer.analyze(bad).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{bad}: {err:?}");
        }
        assert_eq!(*index.calls.lock(), 0);
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("Some_User-1").unwrap(), "some_user-1");
        assert_eq!(normalize_username("a").unwrap(), "a");
        assert!(normalize_username(&"a".repeat(21)).is_err());
    }
}
