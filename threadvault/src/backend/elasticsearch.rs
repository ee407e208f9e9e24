//! Elasticsearch-protocol search index client

use crate::aggregations::{AggregationClause, AggregationKind};
use crate::backend::{Endpoint, RawBucket, RawHit, RawResponse, SearchIndexClient, TotalRelation};
use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::query::request::{BackendRequest, Clause};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Text fields indexed with a `.keyword` sub-field for term aggregations
const KEYWORD_SUBFIELDS: &[&str] = &["subreddit", "author", "domain"];

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct EsSearchResponse {
    took: u64,
    hits: EsHits,
    #[serde(default)]
    aggregations: Map<String, Value>,
}

#[derive(Deserialize)]
struct EsHits {
    #[serde(default)]
    total: Option<EsTotal>,
    #[serde(default)]
    hits: Vec<EsHit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EsTotal {
    Object { value: u64, relation: String },
    Count(u64),
}

#[derive(Deserialize)]
struct EsHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

#[derive(Deserialize)]
struct EsBucket {
    key: Value,
    doc_count: u64,
}

pub struct ElasticsearchClient {
    client: Client,
    comment_index: String,
    submission_index: String,
}

impl ElasticsearchClient {
    pub fn new(comment_index: &str, submission_index: &str) -> Self {
        Self {
            client: Client::new(),
            comment_index: comment_index.trim_matches('/').to_string(),
            submission_index: submission_index.trim_matches('/').to_string(),
        }
    }

    fn index(&self, content_type: ContentType) -> &str {
        match content_type {
            ContentType::Comment => &self.comment_index,
            ContentType::Submission => &self.submission_index,
        }
    }

    fn search_url(&self, endpoint: &Endpoint, content_type: ContentType) -> String {
        format!(
            "{}/{}/_search",
            endpoint.url.trim_end_matches('/'),
            self.index(content_type)
        )
    }
}

#[async_trait]
impl SearchIndexClient for ElasticsearchClient {
    async fn search(&self, endpoint: &Endpoint, request: &BackendRequest) -> Result<RawResponse> {
        let url = self.search_url(endpoint, request.content_type);
        let body = render(request);
        debug!("POST {} {}", url, body);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BackendTransient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", endpoint.name, status, text);
            return Err(if is_transient_status(status) {
                Error::BackendTransient(message)
            } else {
                Error::Internal(message)
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::BackendTransient(e.to_string()))?;
        parse_response(&bytes, request)
    }

    async fn probe(&self, endpoint: &Endpoint) -> bool {
        let url = format!("{}/_cluster/health", endpoint.url.trim_end_matches('/'));
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Probe of {} failed: {}", endpoint, e);
                false
            }
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Render the request as an Elasticsearch search body
pub fn render(request: &BackendRequest) -> Value {
    let mut body = Map::new();

    let query = if request.must.is_empty()
        && request.filter.is_empty()
        && request.must_not.is_empty()
    {
        json!({ "match_all": {} })
    } else {
        json!({
            "bool": {
                "must": request.must.iter().map(render_clause).collect::<Vec<_>>(),
                "filter": request.filter.iter().map(render_clause).collect::<Vec<_>>(),
                "must_not": request.must_not.iter().map(render_clause).collect::<Vec<_>>(),
            }
        })
    };
    body.insert("query".into(), query);

    if !request.sort.is_empty() {
        let sort: Vec<Value> = request
            .sort
            .iter()
            .map(|s| json!({ s.field.clone(): { "order": s.dir.as_str() } }))
            .collect();
        body.insert("sort".into(), Value::Array(sort));
    }

    body.insert("from".into(), json!(request.from));
    body.insert("size".into(), json!(request.size));
    body.insert(
        "_source".into(),
        if request.source.is_empty() {
            Value::Bool(false)
        } else {
            json!(request.source)
        },
    );
    body.insert("track_total_hits".into(), json!(request.track_total_hits));

    if !request.aggregations.is_empty() {
        let aggs: Map<String, Value> = request
            .aggregations
            .iter()
            .map(|clause| (clause.name.clone(), render_aggregation(clause)))
            .collect();
        body.insert("aggs".into(), Value::Object(aggs));
    }

    Value::Object(body)
}

fn render_clause(clause: &Clause) -> Value {
    match clause {
        Clause::FullText { query, fields } => json!({
            "simple_query_string": {
                "query": query,
                "fields": fields,
                "default_operator": "and",
            }
        }),
        Clause::Terms { field, values } => json!({ "terms": { field.clone(): values } }),
        Clause::Term { field, value } => json!({ "term": { field.clone(): value } }),
        Clause::Range { field, bounds } => json!({ "range": { field.clone(): bounds } }),
    }
}

fn render_aggregation(clause: &AggregationClause) -> Value {
    let mut rendered = match &clause.kind {
        AggregationKind::Terms { field, size } => {
            let field = if KEYWORD_SUBFIELDS.contains(&field.as_str()) {
                format!("{field}.keyword")
            } else {
                field.clone()
            };
            json!({
                "terms": {
                    "field": field,
                    "size": size,
                    "order": { "_count": "desc" },
                }
            })
        }
        AggregationKind::DateHistogram {
            field,
            interval_secs,
        } => json!({
            "date_histogram": {
                "field": field,
                "fixed_interval": format!("{interval_secs}s"),
                "order": { "_key": "asc" },
            }
        }),
    };
    if let Some(min_doc_count) = clause.min_doc_count {
        if let Some(body) = rendered.as_object_mut().and_then(|o| o.values_mut().next()) {
            body["min_doc_count"] = json!(min_doc_count);
        }
    }
    rendered
}

/// Decode a search response. Date histogram keys come back in milliseconds
/// and are converted to epoch seconds.
pub fn parse_response(bytes: &[u8], request: &BackendRequest) -> Result<RawResponse> {
    let decoded: EsSearchResponse = serde_json::from_slice(bytes)
        .map_err(|e| Error::Internal(format!("undecodable search response: {e}")))?;

    let (total, total_relation) = match decoded.hits.total {
        Some(EsTotal::Object { value, relation }) => (
            value,
            if relation == "eq" {
                TotalRelation::Exact
            } else {
                TotalRelation::LowerBound
            },
        ),
        Some(EsTotal::Count(value)) => (value, TotalRelation::Exact),
        None => (decoded.hits.hits.len() as u64, TotalRelation::Exact),
    };

    let hits = decoded
        .hits
        .hits
        .into_iter()
        .map(|hit| {
            let id = hit
                .id
                .parse::<u64>()
                .ok()
                .or_else(|| hit.source.get("id").and_then(Value::as_u64))
                .ok_or_else(|| Error::Internal(format!("hit with non-numeric id '{}'", hit.id)))?;
            Ok(RawHit {
                id,
                source: hit.source,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut aggregations = BTreeMap::new();
    for clause in &request.aggregations {
        let Some(buckets) = decoded
            .aggregations
            .get(&clause.name)
            .and_then(|agg| agg.get("buckets"))
        else {
            continue;
        };
        let buckets: Vec<EsBucket> = serde_json::from_value(buckets.clone())
            .map_err(|e| Error::Internal(format!("undecodable buckets for {}: {e}", clause.name)))?;
        let buckets = buckets
            .into_iter()
            .map(|b| RawBucket {
                key: if clause.is_date_histogram() {
                    millis_to_seconds(b.key)
                } else {
                    b.key
                },
                doc_count: b.doc_count,
            })
            .collect();
        aggregations.insert(clause.name.clone(), buckets);
    }

    Ok(RawResponse {
        took_ms: decoded.took,
        total,
        total_relation,
        hits,
        aggregations,
        backend_used: String::new(),
    })
}

fn millis_to_seconds(key: Value) -> Value {
    match key.as_i64() {
        Some(ms) => Value::from(ms.div_euclid(1000)),
        None => key,
    }
}
