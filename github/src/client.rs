//! GraphQL client for the hosted search and mutation endpoints.
//!
//! Implements the ingestion core's [`SearchClient`] and [`MutationClient`]
//! traits. Transport concerns live entirely here: transient failures and
//! quota hits are retried with jittered exponential backoff (honoring a
//! `Retry-After` hint when the upstream sends one), so the core only ever
//! sees a single success or failure outcome per page. A 401 is never
//! retried; it surfaces as an authentication failure that halts the whole
//! ingestion run upstream.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use config::shared::SourceConfig;
use ingest::client::{MutationAction, MutationClient, SearchClient, SearchPage, WindowQuery};
use ingest::error::{ErrorKind, IngestError, IngestResult};
use ingest::ingest_error;

use crate::auth::TokenResolver;
use crate::query::{CLOSE_DOCUMENT, MERGE_DOCUMENT, SEARCH_DOCUMENT, build_search_query};
use crate::transform::parse_search_page;

/// Classified outcome of a single HTTP exchange.
enum TransportOutcome {
    /// Not worth retrying; propagate immediately.
    Terminal(IngestError),
    /// Transient; retry after the optional upstream-provided delay.
    Retryable {
        err: IngestError,
        retry_after: Option<Duration>,
    },
}

/// Client for the GitHub GraphQL API.
#[derive(Debug, Clone)]
pub struct GithubClient<R> {
    http: reqwest::Client,
    config: Arc<SourceConfig>,
    resolver: R,
}

impl<R> GithubClient<R>
where
    R: TokenResolver + Send + Sync,
{
    /// Creates a client over `config`, resolving credentials with `resolver`.
    pub fn new(config: SourceConfig, resolver: R) -> IngestResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| {
                ingest_error!(
                    ErrorKind::ConfigError,
                    "Failed to build HTTP client",
                    source: err
                )
            })?;

        Ok(Self {
            http,
            config: Arc::new(config),
            resolver,
        })
    }

    /// Posts a GraphQL document, retrying transient failures, and returns
    /// the `data` payload.
    async fn post_graphql(
        &self,
        document: &str,
        variables: serde_json::Value,
    ) -> IngestResult<serde_json::Value> {
        let mut attempt = 0u32;

        loop {
            match self.exchange(document, &variables).await {
                Ok(data) => return Ok(data),
                Err(TransportOutcome::Terminal(err)) => return Err(err),
                Err(TransportOutcome::Retryable { err, retry_after }) => {
                    if attempt >= self.config.transport_retry.max_attempts {
                        return Err(err);
                    }

                    attempt += 1;
                    let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));

                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient transport failure, retrying"
                    );

                    sleep(delay).await;
                }
            }
        }
    }

    /// Performs one HTTP exchange and classifies its outcome.
    async fn exchange(
        &self,
        document: &str,
        variables: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportOutcome> {
        let token = self.resolver.resolve().await;
        if token.is_none() {
            warn!(
                "no credential resolved, request goes out unauthenticated under the stricter anonymous quota"
            );
        }

        let mut request = self.http.post(&self.config.graphql_url).json(&json!({
            "query": document,
            "variables": variables,
        }));
        if let Some(token) = &token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|err| {
            TransportOutcome::Retryable {
                err: ingest_error!(
                    ErrorKind::TransportFailed,
                    "Search request failed",
                    err.to_string()
                ),
                retry_after: None,
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();

        log_quota(&headers);

        if status == StatusCode::UNAUTHORIZED {
            return Err(TransportOutcome::Terminal(ingest_error!(
                ErrorKind::AuthenticationFailed,
                "Credential rejected by the API"
            )));
        }

        if status == StatusCode::TOO_MANY_REQUESTS || is_secondary_rate_limit(status, &headers) {
            return Err(TransportOutcome::Retryable {
                err: ingest_error!(
                    ErrorKind::QuotaExceeded,
                    "API rate limit exceeded",
                    format!("HTTP {status}")
                ),
                retry_after: retry_after_hint(&headers),
            });
        }

        if status.is_server_error() {
            return Err(TransportOutcome::Retryable {
                err: ingest_error!(
                    ErrorKind::TransportFailed,
                    "Upstream server error",
                    format!("HTTP {status}")
                ),
                retry_after: None,
            });
        }

        if !status.is_success() {
            return Err(TransportOutcome::Terminal(ingest_error!(
                ErrorKind::TransportFailed,
                "Unexpected response status",
                format!("HTTP {status}")
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|err| {
            TransportOutcome::Terminal(ingest_error!(
                ErrorKind::MalformedResponse,
                "Response body was not valid JSON",
                err.to_string()
            ))
        })?;

        if let Some(errors) = body.get("errors").and_then(serde_json::Value::as_array) {
            if !errors.is_empty() {
                return Err(classify_graphql_errors(errors));
            }
        }

        body.get("data")
            .filter(|data| !data.is_null())
            .cloned()
            .ok_or_else(|| {
                TransportOutcome::Terminal(ingest_error!(
                    ErrorKind::MalformedResponse,
                    "Response carried no data payload"
                ))
            })
    }

    /// Jittered exponential backoff for retry attempt `attempt` (1-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let retry = &self.config.transport_retry;

        let exponential = retry
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
            .min(retry.max_delay_ms);

        // Jitter avoids synchronized retries across concurrent scope workers.
        let jitter_fraction = f64::from(retry.jitter_percent) / 100.0;
        let jitter_range = exponential as f64 * jitter_fraction;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);

        Duration::from_millis((exponential as f64 + jitter).max(0.0) as u64)
    }
}

impl<R> SearchClient for GithubClient<R>
where
    R: TokenResolver + Send + Sync,
{
    async fn fetch_page(
        &self,
        query: &WindowQuery,
        cursor: Option<&str>,
    ) -> IngestResult<SearchPage> {
        let variables = json!({
            "searchQuery": build_search_query(query),
            "first": self.config.page_size,
            "after": cursor,
        });

        let data = self.post_graphql(SEARCH_DOCUMENT, variables).await?;

        parse_search_page(data)
    }
}

impl<R> MutationClient for GithubClient<R>
where
    R: TokenResolver + Send + Sync,
{
    async fn perform(&self, action: MutationAction, record_id: &str) -> IngestResult<()> {
        let document = match action {
            MutationAction::Merge => MERGE_DOCUMENT,
            MutationAction::Close => CLOSE_DOCUMENT,
        };

        let variables = json!({
            "input": { "pullRequestId": record_id },
        });

        self.post_graphql(document, variables).await?;

        Ok(())
    }
}

/// A 403 with an exhausted primary quota is a rate limit, not a permission
/// problem.
fn is_secondary_rate_limit(status: StatusCode, headers: &HeaderMap) -> bool {
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|remaining| remaining == "0")
}

/// Reads an upstream `Retry-After` hint in seconds.
fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Classifies GraphQL-level errors: a rate-limit error type is retryable,
/// anything else means the query or response shape is broken.
fn classify_graphql_errors(errors: &[serde_json::Value]) -> TransportOutcome {
    let first_message = errors
        .first()
        .and_then(|error| error.get("message"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown GraphQL error")
        .to_owned();

    let rate_limited = errors.iter().any(|error| {
        error
            .get("type")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|error_type| error_type == "RATE_LIMITED")
    });

    if rate_limited {
        TransportOutcome::Retryable {
            err: ingest_error!(
                ErrorKind::QuotaExceeded,
                "API rate limit exceeded",
                first_message
            ),
            retry_after: None,
        }
    } else {
        TransportOutcome::Terminal(ingest_error!(
            ErrorKind::MalformedResponse,
            "Query rejected by the API",
            first_message
        ))
    }
}

/// Logs the remaining primary quota when the upstream reports it.
fn log_quota(headers: &HeaderMap) {
    if let Some(remaining) = headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
    {
        debug!(remaining, "API quota");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn exhausted_forbidden_counts_as_rate_limit() {
        let exhausted = headers(&[("x-ratelimit-remaining", "0")]);
        assert!(is_secondary_rate_limit(StatusCode::FORBIDDEN, &exhausted));

        let healthy = headers(&[("x-ratelimit-remaining", "4999")]);
        assert!(!is_secondary_rate_limit(StatusCode::FORBIDDEN, &healthy));
        assert!(!is_secondary_rate_limit(StatusCode::OK, &exhausted));
    }

    #[test]
    fn retry_after_parses_seconds() {
        let hinted = headers(&[("retry-after", "17")]);
        assert_eq!(retry_after_hint(&hinted), Some(Duration::from_secs(17)));

        assert_eq!(retry_after_hint(&HeaderMap::new()), None);
    }

    #[test]
    fn graphql_rate_limit_is_retryable() {
        let errors = vec![json!({
            "type": "RATE_LIMITED",
            "message": "API rate limit exceeded for user."
        })];

        match classify_graphql_errors(&errors) {
            TransportOutcome::Retryable { err, .. } => {
                assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
            }
            TransportOutcome::Terminal(_) => panic!("rate limit must be retryable"),
        }
    }

    #[test]
    fn other_graphql_errors_are_terminal() {
        let errors = vec![json!({
            "type": "INSUFFICIENT_SCOPES",
            "message": "Your token has not been granted the required scopes."
        })];

        match classify_graphql_errors(&errors) {
            TransportOutcome::Terminal(err) => {
                assert_eq!(err.kind(), ErrorKind::MalformedResponse);
            }
            TransportOutcome::Retryable { .. } => panic!("must be terminal"),
        }
    }
}
