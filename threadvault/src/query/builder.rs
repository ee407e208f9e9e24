//! [`QuerySpec`] → [`BackendRequest`].
//!
//! Filter clauses are emitted in a fixed order so identical specs always
//! produce identical requests: term filters (table order), time range,
//! score, num_comments, boolean flags (table order).

use crate::content_type::ContentType;
use crate::query::request::{BackendRequest, Clause, ExactLookup, RangeBounds, SortSpec};
use crate::query::spec::{Comparison, QuerySpec, SortDir, TextClause};
use serde_json::Value;

/// Canonical timestamp field
pub const TIMESTAMP_FIELD: &str = "created_utc";

/// Upper bound on the comment ids returned for one submission by the index
pub const INDEX_COMMENT_IDS_LIMIT: usize = 10_000;

pub fn build(spec: &QuerySpec) -> BackendRequest {
    let projection = spec.content_type.project_fields(spec.fields.as_deref());

    if let Some(ids) = &spec.ids {
        let lookup = match spec.content_type {
            ContentType::Comment => ExactLookup::Comments(ids.clone()),
            ContentType::Submission => ExactLookup::Submissions(ids.clone()),
        };
        let mut request = build_lookup(&lookup);
        request.source = fetch_fields(spec.content_type, &projection);
        return request;
    }

    let table = spec.content_type.table();
    let mut request = BackendRequest::new(spec.content_type);

    if let Some(query) = &spec.query {
        request.must.push(full_text(
            &TextClause {
                field: None,
                query: query.clone(),
            },
            table.text_fields,
        ));
    }
    for scoped in &spec.scoped_queries {
        request.must.push(full_text(scoped, table.text_fields));
    }
    for exclusion in &spec.exclusions {
        request.must_not.push(full_text(exclusion, table.text_fields));
    }

    for filter in &spec.filters {
        request.filter.push(Clause::Terms {
            field: filter.field.clone(),
            values: filter.values.iter().cloned().map(Value::String).collect(),
        });
    }

    if !spec.time_range.is_empty() {
        request.filter.push(Clause::Range {
            field: TIMESTAMP_FIELD.to_string(),
            bounds: RangeBounds {
                gte: spec.time_range.after,
                lte: spec.time_range.before,
                ..RangeBounds::default()
            },
        });
    }

    for numeric in &spec.numeric_filters {
        let field = numeric.field.clone();
        request.filter.push(match numeric.comparison {
            Comparison::Gt(n) => Clause::Range {
                field,
                bounds: RangeBounds {
                    gt: Some(n),
                    ..RangeBounds::default()
                },
            },
            Comparison::Lt(n) => Clause::Range {
                field,
                bounds: RangeBounds {
                    lt: Some(n),
                    ..RangeBounds::default()
                },
            },
            Comparison::Eq(n) => Clause::Term {
                field,
                value: Value::from(n),
            },
        });
    }

    for (flag, value) in &spec.flags {
        request.filter.push(Clause::Term {
            field: flag.clone(),
            value: Value::Bool(*value),
        });
    }

    request.sort = vec![SortSpec {
        field: spec.sort_field.as_str().to_string(),
        dir: spec.sort_dir,
    }];
    request.from = spec.offset;
    request.size = spec.size;
    request.source = fetch_fields(spec.content_type, &projection);
    request.track_total_hits = true;
    request
}

/// Render an exact-id lookup. Results are ordered by ascending id.
pub fn build_lookup(lookup: &ExactLookup) -> BackendRequest {
    let content_type = lookup.content_type();
    let mut request = BackendRequest::new(content_type);

    match lookup {
        ExactLookup::Comments(ids) | ExactLookup::Submissions(ids) => {
            request.filter.push(Clause::Terms {
                field: "id".to_string(),
                values: ids.iter().map(|id| Value::from(*id)).collect(),
            });
            request.size = ids.len();
            request.source =
                fetch_fields(content_type, &content_type.project_fields(None));
        }
        ExactLookup::CommentIds(link_id) => {
            request.filter.push(Clause::Term {
                field: "link_id".to_string(),
                value: Value::from(*link_id),
            });
            request.size = INDEX_COMMENT_IDS_LIMIT;
        }
    }

    request.sort = vec![SortSpec {
        field: "id".to_string(),
        dir: SortDir::Asc,
    }];
    request.track_total_hits = true;
    request.lookup = Some(lookup.clone());
    request
}

fn full_text(clause: &TextClause, default_fields: &[&str]) -> Clause {
    let fields = match &clause.field {
        Some(field) => vec![field.clone()],
        None => default_fields.iter().map(|f| f.to_string()).collect(),
    };
    Clause::FullText {
        query: clause.query.clone(),
        fields,
    }
}

/// Stored fields needed to render `projection`.
///
/// `full_link` is derived from `permalink`; a comment's missing `parent_id`
/// is derived from `link_id`.
fn fetch_fields(content_type: ContentType, projection: &[String]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::with_capacity(projection.len() + 1);
    let mut push = |field: &str| {
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    };

    for field in projection {
        match field.as_str() {
            "full_link" => push("permalink"),
            "parent_id" if content_type == ContentType::Comment => {
                push("parent_id");
                push("link_id");
            }
            other => push(other),
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::params::{parse, RawParams};
    use crate::query::spec::SortField;

    const NOW: i64 = 1_700_000_000;

    fn build_from(content_type: ContentType, pairs: &[(&str, &str)]) -> BackendRequest {
        let spec = parse(content_type, &RawParams::new(pairs.iter().copied()), NOW).unwrap();
        build(&spec)
    }

    #[test]
    fn test_python_last_week() {
        let request = build_from(
            ContentType::Comment,
            &[("q", "python"), ("after", "7d"), ("size", "50")],
        );

        assert_eq!(
            request.must,
            vec![Clause::FullText {
                query: "python".into(),
                fields: vec!["body".into()],
            }]
        );
        let range = request.range_on(TIMESTAMP_FIELD).unwrap();
        assert_eq!(range.gte, Some(NOW - 604_800));
        assert_eq!(range.lte, None);
        assert_eq!(request.size, 50);
        assert_eq!(
            request.sort,
            vec![SortSpec {
                field: SortField::CreatedUtc.as_str().into(),
                dir: SortDir::Desc,
            }]
        );
        assert!(!request.is_exact_lookup());
    }

    #[test]
    fn test_submission_full_text_fields() {
        let request = build_from(ContentType::Submission, &[("q", "rust")]);
        assert_eq!(
            request.must,
            vec![Clause::FullText {
                query: "rust".into(),
                fields: vec!["title".into(), "selftext".into()],
            }]
        );
    }

    #[test]
    fn test_filter_clause_order_is_fixed() {
        let request = build_from(
            ContentType::Submission,
            &[
                ("locked", "false"),
                ("num_comments", "<10"),
                ("score", "7"),
                ("domain", "self.rust"),
                ("before", "1d"),
                ("author", "a,b"),
                ("subreddit", "rust"),
                ("over_18", "true"),
            ],
        );

        let kinds: Vec<&str> = request
            .filter
            .iter()
            .map(|c| match c {
                Clause::Terms { field, .. }
                | Clause::Term { field, .. }
                | Clause::Range { field, .. } => field.as_str(),
                Clause::FullText { .. } => "full_text",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "subreddit",
                "author",
                "domain",
                "created_utc",
                "score",
                "num_comments",
                "over_18",
                "locked"
            ]
        );
        assert_eq!(
            request.filter[1],
            Clause::Terms {
                field: "author".into(),
                values: vec![Value::from("a"), Value::from("b")],
            }
        );
        assert_eq!(
            request.filter[4],
            Clause::Term {
                field: "score".into(),
                value: Value::from(7),
            }
        );
    }

    #[test]
    fn test_identical_specs_build_identical_requests() {
        let pairs = [("q", "x"), ("author", "B,a"), ("aggs", "author")];
        assert_eq!(
            build_from(ContentType::Comment, &pairs),
            build_from(ContentType::Comment, &pairs)
        );
    }

    #[test]
    fn test_exclusions_go_to_must_not() {
        let request = build_from(
            ContentType::Submission,
            &[("title:not", "meta"), ("q:not", "spam")],
        );
        assert!(request.must.is_empty());
        assert_eq!(
            request.must_not,
            vec![
                Clause::FullText {
                    query: "spam".into(),
                    fields: vec!["title".into(), "selftext".into()],
                },
                Clause::FullText {
                    query: "meta".into(),
                    fields: vec!["title".into()],
                },
            ]
        );
    }

    #[test]
    fn test_source_fields_cover_derived_fields() {
        let request = build_from(
            ContentType::Submission,
            &[("fields", "full_link,title,bogus")],
        );
        assert_eq!(request.source, vec!["permalink", "title"]);

        let request = build_from(ContentType::Comment, &[("fields", "parent_id")]);
        assert_eq!(request.source, vec!["parent_id", "link_id"]);
    }

    #[test]
    fn test_ids_become_exact_lookup() {
        let request = build_from(
            ContentType::Comment,
            &[("ids", "t1_a,b"), ("author", "ignored")],
        );
        assert_eq!(request.lookup, Some(ExactLookup::Comments(vec![10, 11])));
        assert_eq!(
            request.filter,
            vec![Clause::Terms {
                field: "id".into(),
                values: vec![Value::from(10u64), Value::from(11u64)],
            }]
        );
        assert_eq!(request.size, 2);
    }

    #[test]
    fn test_comment_ids_lookup() {
        let request = build_lookup(&ExactLookup::CommentIds(36));
        assert_eq!(request.content_type, ContentType::Comment);
        assert_eq!(
            request.filter,
            vec![Clause::Term {
                field: "link_id".into(),
                value: Value::from(36u64),
            }]
        );
        assert!(request.source.is_empty());
        assert_eq!(request.sort[0].dir, SortDir::Asc);
    }
}
