//! Aggregation planning.
//!
//! Turns requested aggregation names into backend-agnostic clauses. Names the
//! content type does not support are dropped with a warning rather than
//! failing the request.

use crate::content_type::ContentType;
use crate::time_range::TimeRange;
use serde::{Deserialize, Serialize};

/// Span assumed for the activity histogram when no time range bounds it
pub const DEFAULT_HISTOGRAM_SPAN_SECS: i64 = 30 * 86_400;
pub const MIN_BUCKET_WIDTH_SECS: i64 = 3_600;
const TARGET_BUCKETS: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationKind {
    Terms { field: String, size: usize },
    DateHistogram { field: String, interval_secs: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationClause {
    pub name: String,
    pub kind: AggregationKind,
    /// Buckets with fewer documents are omitted; backend default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<u64>,
}

impl AggregationClause {
    pub fn terms(name: &str, field: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: AggregationKind::Terms {
                field: field.to_string(),
                size,
            },
            min_doc_count: None,
        }
    }

    pub fn date_histogram(name: &str, field: &str, interval_secs: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: AggregationKind::DateHistogram {
                field: field.to_string(),
                interval_secs,
            },
            min_doc_count: None,
        }
    }

    pub fn is_date_histogram(&self) -> bool {
        matches!(self.kind, AggregationKind::DateHistogram { .. })
    }

    pub fn with_min_doc_count(mut self, min_doc_count: Option<u64>) -> Self {
        self.min_doc_count = min_doc_count;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationPlan {
    pub clauses: Vec<AggregationClause>,
    pub warnings: Vec<String>,
}

impl AggregationPlan {
    /// Apply a client `min_doc_count` to every planned clause
    pub fn with_min_doc_count(mut self, min_doc_count: Option<u64>) -> Self {
        if min_doc_count.is_some() {
            self.clauses = self
                .clauses
                .into_iter()
                .map(|c| c.with_min_doc_count(min_doc_count))
                .collect();
        }
        self
    }
}

/// Plan the requested aggregations, in request order.
pub fn plan(
    requested: &[String],
    content_type: ContentType,
    time_range: &TimeRange,
    now: i64,
) -> AggregationPlan {
    let mut plan = AggregationPlan::default();

    for name in requested {
        if plan.clauses.iter().any(|c| &c.name == name) {
            continue;
        }
        if !content_type.allows_aggregation(name) {
            plan.warnings.push(format!("unsupported aggregation: {name}"));
            continue;
        }
        let clause = match name.as_str() {
            "subreddit" | "author" | "domain" => AggregationClause::terms(name, name, 1000),
            "link_id" => AggregationClause::terms(name, "link_id", 250),
            "time_of_day" => AggregationClause::terms(name, "hour", 24),
            "created_utc" => AggregationClause::date_histogram(
                name,
                "created_utc",
                bucket_width(time_range, now),
            ),
            other => {
                plan.warnings.push(format!("unsupported aggregation: {other}"));
                continue;
            }
        };
        plan.clauses.push(clause);
    }

    plan
}

/// Histogram bucket width: `max(3600, ceil(span / 50))` seconds.
///
/// With only `after`, the span ends at `now`; without `after` a 30 day span is assumed.
pub fn bucket_width(time_range: &TimeRange, now: i64) -> i64 {
    let span = match (time_range.after, time_range.before) {
        (Some(after), Some(before)) => before.saturating_sub(after),
        (Some(after), None) => now.saturating_sub(after),
        _ => DEFAULT_HISTOGRAM_SPAN_SECS,
    }
    .max(0);

    let per_bucket = span / TARGET_BUCKETS + i64::from(span % TARGET_BUCKETS != 0);
    per_bucket.max(MIN_BUCKET_WIDTH_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unsupported_aggregation_is_dropped_with_warning() {
        let plan = plan(
            &names(&["domain"]),
            ContentType::Comment,
            &TimeRange::default(),
            NOW,
        );
        assert!(plan.clauses.is_empty());
        assert_eq!(plan.warnings, vec!["unsupported aggregation: domain"]);
    }

    #[test]
    fn test_order_preserved_and_mixed_warnings() {
        let plan = plan(
            &names(&["author", "link_id", "bogus", "subreddit"]),
            ContentType::Submission,
            &TimeRange::default(),
            NOW,
        );
        let planned: Vec<_> = plan.clauses.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(planned, vec!["author", "subreddit"]);
        assert_eq!(
            plan.warnings,
            vec![
                "unsupported aggregation: link_id",
                "unsupported aggregation: bogus"
            ]
        );
    }

    #[test]
    fn test_time_of_day_is_submission_only() {
        let plan_sub = plan(
            &names(&["time_of_day"]),
            ContentType::Submission,
            &TimeRange::default(),
            NOW,
        );
        assert_eq!(
            plan_sub.clauses,
            vec![AggregationClause::terms("time_of_day", "hour", 24)]
        );

        let plan_com = plan(
            &names(&["time_of_day"]),
            ContentType::Comment,
            &TimeRange::default(),
            NOW,
        );
        assert!(plan_com.clauses.is_empty());
    }

    #[test]
    fn test_bucket_width_default_span() {
        // 30 days / 50 = 51840s
        assert_eq!(bucket_width(&TimeRange::default(), NOW), 51_840);
    }

    #[test]
    fn test_bucket_width_has_floor() {
        let range = TimeRange {
            after: Some(NOW - 86_400),
            before: Some(NOW),
        };
        assert_eq!(bucket_width(&range, NOW), MIN_BUCKET_WIDTH_SECS);

        let empty = TimeRange {
            after: Some(NOW),
            before: Some(NOW),
        };
        assert_eq!(bucket_width(&empty, NOW), MIN_BUCKET_WIDTH_SECS);
    }

    #[test]
    fn test_bucket_width_rounds_up() {
        let range = TimeRange {
            after: Some(0),
            before: Some(500_001),
        };
        assert_eq!(bucket_width(&range, NOW), 10_001);
    }

    #[test]
    fn test_bucket_width_open_ended() {
        let after_only = TimeRange {
            after: Some(NOW - 365 * 86_400),
            before: None,
        };
        assert_eq!(bucket_width(&after_only, NOW), 630_720);

        let before_only = TimeRange {
            after: None,
            before: Some(NOW - 86_400),
        };
        assert_eq!(bucket_width(&before_only, NOW), 51_840);
    }

    #[test]
    fn test_min_doc_count_applies_to_every_clause() {
        let plan = plan(
            &names(&["subreddit", "created_utc"]),
            ContentType::Comment,
            &TimeRange::default(),
            NOW,
        )
        .with_min_doc_count(Some(5));
        assert!(plan.clauses.iter().all(|c| c.min_doc_count == Some(5)));

        let unset = AggregationPlan {
            clauses: vec![AggregationClause::terms("author", "author", 1000)],
            warnings: Vec::new(),
        }
        .with_min_doc_count(None);
        assert_eq!(unset.clauses[0].min_doc_count, None);
    }

    #[test]
    fn test_histogram_clause() {
        let plan = plan(
            &names(&["created_utc"]),
            ContentType::Comment,
            &TimeRange::default(),
            NOW,
        );
        assert_eq!(
            plan.clauses,
            vec![AggregationClause::date_histogram(
                "created_utc",
                "created_utc",
                51_840
            )]
        );
        assert!(plan.clauses[0].is_date_histogram());
    }
}
