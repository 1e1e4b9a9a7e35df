use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::config::RetryConfig;
use crate::error::PatentError;
use crate::identifier::{classify, IdentifierKind};
use crate::record::{flatten_record, PatentRecord};

/// Client for the external patent data gateway. Published applications and
/// granted patents live behind separate routes; the normalized identifier's
/// shape decides which one is queried.
#[derive(Clone)]
pub struct PatentDataClient {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl PatentDataClient {
    pub fn new(base_url: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            retry,
        }
    }

    /// Pure fetch: classifies the identifier, queries the matching source and
    /// flattens the reply into a single-row record. Caching is the session
    /// layer's responsibility.
    pub async fn fetch_record(&self, identifier: &str) -> Result<PatentRecord, PatentError> {
        if identifier.is_empty() {
            return Err(PatentError::NoIdentifier);
        }

        let path = match classify(identifier) {
            IdentifierKind::PublishedApplication => "api/published",
            IdentifierKind::Granted => "api/patents",
            IdentifierKind::Invalid => {
                return Err(PatentError::InvalidIdentifier(identifier.to_string()))
            }
        };

        let url = format!("{}/{}/{}", self.base_url, path, identifier);
        let data = self.get_json_with_retry(&url, identifier).await?;

        let (record, skipped) = flatten_record(&data);
        for diagnostic in &skipped {
            tracing::warn!("skipped field while flattening record {identifier}: {diagnostic}");
        }

        Ok(record)
    }

    async fn get_json_with_retry(
        &self,
        url: &str,
        identifier: &str,
    ) -> Result<serde_json::Value, PatentError> {
        let attempts = self.retry.fetch_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = self.retry.fetch_backoff_ms << (attempt - 1);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                tracing::debug!("retrying patent fetch for {identifier} (attempt {attempt})");
            }

            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(err) => {
                    last_failure = err.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(PatentError::NotFound(identifier.to_string()));
            }
            if status.is_server_error() {
                last_failure = format!("gateway returned {status}");
                continue;
            }
            if !status.is_success() {
                return Err(PatentError::Upstream(format!(
                    "patent gateway returned {status}"
                )));
            }

            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|err| PatentError::Upstream(err.to_string()));
        }

        Err(PatentError::Upstream(last_failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PatentDataClient {
        PatentDataClient::new(
            "http://127.0.0.1:1",
            RetryConfig {
                fetch_attempts: 1,
                fetch_backoff_ms: 1,
            },
        )
    }

    #[tokio::test]
    async fn empty_identifier_is_refused_without_request() {
        let err = client().fetch_record("").await.unwrap_err();
        assert!(matches!(err, PatentError::NoIdentifier));
    }

    #[tokio::test]
    async fn invalid_identifier_is_refused_without_request() {
        // The wired base URL is unreachable; reaching it would surface an
        // Upstream error instead of InvalidIdentifier.
        for bad in ["1234567", "12345678901234", "12345a78"] {
            let err = client().fetch_record(bad).await.unwrap_err();
            assert!(matches!(err, PatentError::InvalidIdentifier(_)), "{bad}");
        }
    }
}
