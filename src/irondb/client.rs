use crate::config::FinderConfig;
use crate::errors::{FinderError, FinderResult};
use crate::irondb::codec::{
    ContentKind, MetricCodec, FIND_RESULT_CONTENT_TYPE, GET_RESULT_CONTENT_TYPE,
    JSON_CONTENT_TYPE,
};
use crate::irondb::hosts::HostRotator;
use crate::models::irondb::{DiscoveryEntry, FetchResult, LeafRequest, SeriesMultiRequest};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const SNOWTH_TIMEOUT_HEADER: &str = "x-snowth-timeout";
const AUTH_TOKEN_HEADER: &str = "x-circonus-auth-token";
const APP_NAME_HEADER: &str = "x-circonus-app-name";

/// Result of one request against one cluster node.
enum Attempt<T> {
    /// Usable answer; stop rotating.
    Done(T),
    /// Node down or answer unusable; spend a retry on the next host.
    Failover,
    /// Node up but stalled; give up on the whole call.
    Abort,
}

fn header_value(name: &'static str, value: &str) -> FinderResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| FinderError::InvalidHeader {
        name,
        reason: e.to_string(),
    })
}

fn base_headers(config: &FinderConfig) -> FinderResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        SNOWTH_TIMEOUT_HEADER,
        header_value(SNOWTH_TIMEOUT_HEADER, &format!("{}ms", config.timeout_ms))?,
    );

    if let Some(token) = &config.auth_token {
        let mut token_value = header_value(AUTH_TOKEN_HEADER, token)?;
        token_value.set_sensitive(true);
        headers.insert(AUTH_TOKEN_HEADER, token_value);
        headers.insert(
            APP_NAME_HEADER,
            header_value(APP_NAME_HEADER, &config.app_name)?,
        );
    }

    Ok(headers)
}

fn transport_failure<T>(url: &str, e: &reqwest::Error) -> Attempt<T> {
    // Connect timeouts report both flags; only a timeout after connecting is a stall.
    if e.is_timeout() && !e.is_connect() {
        error!("Read timeout from {}, not retrying: {}", url, e);
        Attempt::Abort
    } else {
        warn!("IRONdb node unavailable at {}: {}", url, e);
        Attempt::Failover
    }
}

/// HTTP access to an IRONdb cluster with round-robin failover.
///
/// One instance is shared by a finder's discovery calls and by every batch it
/// creates.
pub struct ClusterClient {
    client: Client,
    hosts: Arc<HostRotator>,
    headers: HeaderMap,
    request_timeout: Duration,
    max_retries: u32,
    database_rollups: bool,
    codec: Option<Arc<dyn MetricCodec>>,
}

impl ClusterClient {
    pub fn new(
        config: &FinderConfig,
        hosts: Arc<HostRotator>,
        codec: Option<Arc<dyn MetricCodec>>,
    ) -> FinderResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            hosts,
            headers: base_headers(config)?,
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
            database_rollups: config.database_rollups,
            codec,
        })
    }

    /// Attempts allowed per call: one per host, capped by `max_retries`.
    pub fn max_attempts(&self) -> usize {
        self.hosts
            .count()
            .min(usize::try_from(self.max_retries).unwrap_or(usize::MAX))
    }

    fn accept(&self, binary: &'static str) -> &'static str {
        if self.codec.is_some() {
            binary
        } else {
            JSON_CONTENT_TYPE
        }
    }

    async fn with_failover<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Option<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let tries = self.max_attempts();
        for n in 1..=tries {
            let host = self.hosts.next_host().to_string();
            debug!("IRONdb {} attempt {}/{} against {}", operation, n, tries, host);

            match attempt(host).await {
                Attempt::Done(value) => return Some(value),
                Attempt::Failover => continue,
                Attempt::Abort => return None,
            }
        }

        error!("IRONdb {} failed after {} attempts", operation, tries);
        None
    }

    /// Resolves `pattern` to metric names. Failures yield an empty list.
    pub async fn find(&self, pattern: &str) -> Vec<DiscoveryEntry> {
        let accept = self.accept(FIND_RESULT_CONTENT_TYPE);
        self.with_failover("find", move |host| async move {
            self.find_on(&host, pattern, accept).await
        })
        .await
        .unwrap_or_default()
    }

    async fn find_on(
        &self,
        host: &str,
        pattern: &str,
        accept: &'static str,
    ) -> Attempt<Vec<DiscoveryEntry>> {
        let url = format!("{}/metrics/find/", host);
        let response = match self
            .client
            .get(&url)
            .query(&[("query", pattern)])
            .headers(self.headers.clone())
            .header(ACCEPT, accept)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return transport_failure(&url, &e),
        };

        let kind = ContentKind::of(&response);
        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return transport_failure(&url, &e),
        };

        match (&kind, &self.codec) {
            (ContentKind::Json, _) => match DiscoveryEntry::parse_json(&body) {
                Ok(entries) => Attempt::Done(entries),
                Err(e) => {
                    warn!("Malformed find response from {}: {}", url, e);
                    Attempt::Failover
                }
            },
            (ContentKind::FindResults, Some(codec)) => match codec.decode_find_results(&body) {
                Ok(entries) => Attempt::Done(entries),
                Err(e) => {
                    warn!("Malformed find response from {}: {}", url, e);
                    Attempt::Failover
                }
            },
            _ => {
                warn!(
                    "Ignoring find response from {} with content type {:?}",
                    url, kind
                );
                Attempt::Done(Vec::new())
            }
        }
    }

    /// Fetches every leaf in one `/series_multi/` call. `None` when all attempts failed.
    pub async fn fetch_series(
        &self,
        leaves: &[LeafRequest],
        start_time: i64,
        end_time: i64,
    ) -> Option<FetchResult> {
        let accept = self.accept(GET_RESULT_CONTENT_TYPE);
        let request = SeriesMultiRequest {
            names: leaves,
            start: start_time,
            end: end_time,
            database_rollups: self.database_rollups,
        };
        let request = &request;

        self.with_failover("series_multi", move |host| async move {
            self.fetch_series_on(&host, request, accept).await
        })
        .await
    }

    async fn fetch_series_on(
        &self,
        host: &str,
        request: &SeriesMultiRequest<'_>,
        accept: &'static str,
    ) -> Attempt<FetchResult> {
        let url = format!("{}/series_multi/", host);
        let response = match self
            .client
            .post(&url)
            .json(request)
            .headers(self.headers.clone())
            .header(ACCEPT, accept)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return transport_failure(&url, &e),
        };

        let kind = ContentKind::of(&response);
        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return transport_failure(&url, &e),
        };

        let decoded = match (&kind, &self.codec) {
            (ContentKind::Json, _) => serde_json::from_slice::<FetchResult>(&body)
                .map_err(|e| e.to_string()),
            (ContentKind::GetResults, Some(codec)) => {
                codec.decode_get_results(&body).map_err(|e| e.to_string())
            }
            _ => {
                warn!(
                    "Unrecognized series response from {} with content type {:?}",
                    url, kind
                );
                return Attempt::Failover;
            }
        };

        match decoded {
            Ok(result) => Attempt::Done(result),
            Err(e) => {
                warn!("Malformed series response from {}: {}", url, e);
                Attempt::Failover
            }
        }
    }
}
