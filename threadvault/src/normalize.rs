//! Raw backend responses → the stable output shape.
//!
//! Whatever answered (either search index, or the relational store), hits come
//! out with base36 ids, `tN_` fullnames for references, and only whitelisted
//! fields.

use crate::backend::{RawBucket, RawHit, RawResponse, TotalRelation};
use crate::content_type::ContentType;
use crate::ids::{base36_encode, fullname};
use crate::query::spec::QuerySpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

const PERMALINK_BASE: &str = "https://www.reddit.com";

pub const LINK_ID_AGGREGATION: &str = "link_id";

/// Stored entity-escaped; served unescaped, empty as null
const FLAIR_FIELDS: &[&str] = &["author_flair_text", "author_flair_css_class"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Base36 record id
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalCount {
    pub value: u64,
    pub relation: TotalRelation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: Value,
    pub doc_count: u64,
    /// The submission a `link_id` bucket refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Hit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub hits: Vec<Hit>,
    pub total: TotalCount,
    pub aggregations: BTreeMap<String, Vec<Bucket>>,
    pub took_ms: u64,
    pub backend_used: String,
    pub warnings: Vec<String>,
}

pub fn normalize(raw: RawResponse, spec: &QuerySpec) -> NormalizedResult {
    let projection = spec.content_type.project_fields(spec.fields.as_deref());

    let hits = raw
        .hits
        .into_iter()
        .map(|hit| project(render_record(hit, spec.content_type), &projection))
        .collect();

    let aggregations = raw
        .aggregations
        .into_iter()
        .map(|(name, buckets)| {
            let buckets = buckets
                .into_iter()
                .map(|RawBucket { key, doc_count }| Bucket {
                    key: if name == LINK_ID_AGGREGATION {
                        reference(&key, "t3").unwrap_or(key)
                    } else {
                        key
                    },
                    doc_count,
                    data: None,
                })
                .collect();
            (name, buckets)
        })
        .collect();

    NormalizedResult {
        hits,
        total: TotalCount {
            value: raw.total,
            relation: raw.total_relation,
        },
        aggregations,
        took_ms: raw.took_ms,
        backend_used: raw.backend_used,
        warnings: Vec::new(),
    }
}

/// Attach each `link_id` bucket's submission as `data`.
///
/// Buckets whose submission is missing, or was created at or before `after`,
/// are dropped.
pub fn attach_link_submissions(
    result: &mut NormalizedResult,
    submissions: RawResponse,
    after: Option<i64>,
) {
    let Some(buckets) = result.aggregations.get_mut(LINK_ID_AGGREGATION) else {
        return;
    };

    let projection = ContentType::Submission.project_fields(None);
    let mut by_fullname: HashMap<String, Hit> = submissions
        .hits
        .into_iter()
        .map(|hit| {
            let submission = project(render_record(hit, ContentType::Submission), &projection);
            (format!("t3_{}", submission.id), submission)
        })
        .collect();
    let after = after.unwrap_or(0);

    *buckets = std::mem::take(buckets)
        .into_iter()
        .filter_map(|mut bucket| {
            let submission = by_fullname.remove(bucket.key.as_str()?)?;
            let created = submission
                .fields
                .get("created_utc")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if created <= after {
                return None;
            }
            bucket.data = Some(submission);
            Some(bucket)
        })
        .collect();
}

/// A full record in client form, before projection
pub fn render_record(hit: RawHit, content_type: ContentType) -> Hit {
    let RawHit { id, mut source } = hit;
    source.remove("id");

    let raw_link_id = source.get("link_id").cloned();
    rewrite_reference(&mut source, "link_id", "t3");
    rewrite_reference(&mut source, "subreddit_id", "t5");
    for field in FLAIR_FIELDS {
        let flair = unescape_flair(source.get(*field));
        source.insert(field.to_string(), flair);
    }

    match content_type {
        ContentType::Comment => {
            let parent = source.get("parent_id").filter(|v| !v.is_null()).cloned();
            let parent = match parent {
                Some(p) if raw_link_id.as_ref() == Some(&p) => reference(&p, "t3"),
                Some(p) => reference(&p, "t1").or(Some(p)),
                None => source.get("link_id").cloned(),
            };
            if let Some(parent) = parent {
                source.insert("parent_id".into(), parent);
            }
        }
        ContentType::Submission => {
            if let Some(permalink) = source.get("permalink").and_then(Value::as_str) {
                let link = format!("{PERMALINK_BASE}{permalink}");
                source.insert("full_link".into(), Value::String(link));
            }
        }
    }

    Hit {
        id: base36_encode(id),
        fields: source,
    }
}

fn project(record: Hit, projection: &[String]) -> Hit {
    let Hit { id, mut fields } = record;
    let fields = projection
        .iter()
        .filter_map(|name| fields.remove(name).map(|v| (name.clone(), v)))
        .collect();
    Hit { id, fields }
}

fn unescape_flair(value: Option<&Value>) -> Value {
    match value.and_then(Value::as_str) {
        Some(raw) if !raw.is_empty() => {
            let text = quick_xml::escape::unescape(raw)
                .map(|text| text.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            Value::String(text)
        }
        _ => Value::Null,
    }
}

fn rewrite_reference(source: &mut Map<String, Value>, field: &str, prefix: &str) {
    if let Some(value) = source.get(field) {
        if let Some(rendered) = reference(value, prefix) {
            source.insert(field.to_string(), rendered);
        }
    }
}

/// Numeric reference → `prefix_base36`; other values are left alone
fn reference(value: &Value, prefix: &str) -> Option<Value> {
    value
        .as_u64()
        .map(|id| Value::String(fullname(prefix, id)))
}
