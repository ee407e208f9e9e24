//! Request dispatch across search index endpoints.
//!
//! Endpoints are tried in the order the [`HealthRegistry`] hands out, each at
//! most once per request. Transient failures (timeouts, connection errors,
//! 5xx) move on to the next endpoint immediately. When every endpoint has
//! failed, exact-id lookups are answered from the relational store; every
//! other request fails with `BackendUnavailable`.

use crate::backend::health::HealthRegistry;
use crate::backend::{
    RawHit, RawResponse, RelationalStore, RelationalTemplate, Row, SearchIndexClient,
    TotalRelation,
};
use crate::error::{Error, Result};
use crate::metrics;
use crate::query::request::{BackendRequest, ExactLookup};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// `backend_used` value for answers from the relational store
pub const RELATIONAL_BACKEND: &str = "relational";

pub struct BackendExecutor {
    client: Arc<dyn SearchIndexClient>,
    registry: Arc<HealthRegistry>,
    relational: Option<Arc<dyn RelationalStore>>,
    call_timeout: Duration,
}

impl BackendExecutor {
    pub fn new(
        client: Arc<dyn SearchIndexClient>,
        registry: Arc<HealthRegistry>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            relational: None,
            call_timeout,
        }
    }

    pub fn with_relational(mut self, store: Arc<dyn RelationalStore>) -> Self {
        self.relational = Some(store);
        self
    }

    pub fn registry(&self) -> &Arc<HealthRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &Arc<dyn SearchIndexClient> {
        &self.client
    }

    pub fn has_relational(&self) -> bool {
        self.relational.is_some()
    }

    pub async fn execute(&self, request: &BackendRequest) -> Result<RawResponse> {
        let endpoints = self.registry.endpoints();
        let mut failures: Vec<String> = Vec::new();

        for index in self.registry.attempt_order() {
            let Some(endpoint) = endpoints.get(index) else {
                continue;
            };

            let started = Instant::now();
            let outcome =
                match tokio::time::timeout(self.call_timeout, self.client.search(endpoint, request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::BackendTransient(format!(
                        "timed out after {}ms",
                        self.call_timeout.as_millis()
                    ))),
                };

            match outcome {
                Ok(mut response) => {
                    metrics::record_backend_attempt(&endpoint.name, "success", started.elapsed());
                    self.registry.record_success(index);
                    debug!(
                        "Endpoint {} answered in {}ms ({} hits)",
                        endpoint.name,
                        started.elapsed().as_millis(),
                        response.hits.len()
                    );
                    response.backend_used = endpoint.name.clone();
                    return Ok(response);
                }
                Err(Error::BackendTransient(reason)) => {
                    metrics::record_backend_attempt(
                        &endpoint.name,
                        "transient_error",
                        started.elapsed(),
                    );
                    warn!("Search endpoint {} failed: {}", endpoint, reason);
                    self.registry.record_failure(index, &reason);
                    failures.push(format!("{}: {}", endpoint.name, reason));
                }
                Err(err) => {
                    metrics::record_backend_attempt(&endpoint.name, "rejected", started.elapsed());
                    error!("Search endpoint {} rejected request: {}", endpoint, err);
                    return Err(Error::Internal(format!(
                        "endpoint {} rejected request: {}",
                        endpoint.name, err
                    )));
                }
            }
        }

        let reason = if failures.is_empty() {
            "no search endpoint available".to_string()
        } else {
            failures.join("; ")
        };

        match (&request.lookup, &self.relational) {
            (Some(lookup), Some(store)) => self.fallback(lookup, store.as_ref(), &reason).await,
            _ => Err(Error::BackendUnavailable(format!(
                "all search endpoints failed ({reason})"
            ))),
        }
    }

    /// Answer `lookup` from the relational store without trying the index.
    ///
    /// `Ok(None)` when no relational store is configured.
    pub async fn relational_lookup(
        &self,
        lookup: &ExactLookup,
        reason: &str,
    ) -> Result<Option<RawResponse>> {
        match &self.relational {
            Some(store) => self.fallback(lookup, store.as_ref(), reason).await.map(Some),
            None => Ok(None),
        }
    }

    async fn fallback(
        &self,
        lookup: &ExactLookup,
        store: &dyn RelationalStore,
        reason: &str,
    ) -> Result<RawResponse> {
        let (template, params) = RelationalTemplate::for_lookup(lookup);
        info!(
            "Answering {} from relational store ({})",
            template.as_str(),
            reason
        );

        match store.query(template, &params).await {
            Ok(rows) => {
                metrics::record_relational_fallback(template.as_str(), "ok");
                Ok(rows_to_response(rows))
            }
            Err(err) => {
                metrics::record_relational_fallback(template.as_str(), "error");
                error!("Relational fallback {} failed: {}", template.as_str(), err);
                Err(match err {
                    Error::ServiceUnavailable(_) => err,
                    other => Error::BackendUnavailable(format!(
                        "relational fallback failed ({reason}): {other}"
                    )),
                })
            }
        }
    }
}

/// Rows without a numeric `id` are skipped.
fn rows_to_response(rows: Vec<Row>) -> RawResponse {
    let hits: Vec<RawHit> = rows
        .into_iter()
        .filter_map(|mut row| {
            let id = row.remove("id").as_ref().and_then(Value::as_u64)?;
            Some(RawHit { id, source: row })
        })
        .collect();

    RawResponse {
        took_ms: 0,
        total: hits.len() as u64,
        total_relation: TotalRelation::Exact,
        hits,
        aggregations: Default::default(),
        backend_used: RELATIONAL_BACKEND.to_string(),
    }
}
