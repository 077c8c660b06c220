//! HTTP client for the external record store

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    ClassificationRecord, FeedbackRecord, RecordStore, RecordStoreError, WeightsPayload,
};
use crate::config::RecordStoreConfig;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpRecordStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpRecordStore {
    pub fn new(config: &RecordStoreConfig) -> Result<Self, RecordStoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("adaptive-classifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RecordStoreError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: Some(config.api_key.clone()).filter(|k| !k.is_empty()),
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `classifications/<id>` with the id encoded as one path segment
    fn classification_url(&self, id: &str) -> Result<Url, RecordStoreError> {
        if matches!(id, "" | "." | "..") {
            return Err(RecordStoreError::NotFound(id.to_string()));
        }
        let mut url = Url::parse(&self.url("classifications"))
            .map_err(|e| RecordStoreError::Transport(format!("invalid record store URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| RecordStoreError::Transport("record store URL cannot carry a path".to_string()))?
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send with retries on transport errors and 5xx responses
    async fn send<F>(&self, what: &str, build: F) -> Result<reqwest::Response, RecordStoreError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let result = match self.authorize(build()).send().await {
                Ok(response) if response.status().is_server_error() => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    Err(RecordStoreError::Status { status, body })
                }
                Ok(response) => Ok(response),
                Err(e) => Err(RecordStoreError::Transport(e.to_string())),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retry {}/{}",
                        what, e, attempt, self.retry_attempts
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                other => return other,
            }
        }
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, RecordStoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(RecordStoreError::Status { status, body })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RecordStoreError> {
        response
            .json::<T>()
            .await
            .map_err(|e| RecordStoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn get_classification(&self, id: &str) -> Result<ClassificationRecord, RecordStoreError> {
        let url = self.classification_url(id)?;
        let response = self.send("get_classification", || self.client.get(url.clone())).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RecordStoreError::NotFound(id.to_string()));
        }
        Self::decode(Self::expect_success(response).await?).await
    }

    async fn store_classification(&self, record: &ClassificationRecord) -> Result<(), RecordStoreError> {
        let url = self.url("classifications");
        let response = self
            .send("store_classification", || self.client.post(&url).json(record))
            .await?;
        Self::expect_success(response).await?;
        debug!("Stored classification {}", record.classification_id);
        Ok(())
    }

    async fn store_feedback(&self, feedback: &FeedbackRecord) -> Result<(), RecordStoreError> {
        let url = self.url("feedback");
        let response = self
            .send("store_feedback", || self.client.post(&url).json(feedback))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn update_weights(&self, payload: &WeightsPayload) -> Result<(), RecordStoreError> {
        let url = self.url("model-weights");
        let response = self
            .send("update_weights", || self.client.post(&url).json(payload))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn get_weights(&self) -> Result<Option<WeightsPayload>, RecordStoreError> {
        let url = self.url("model-weights/latest");
        let response = self.send("get_weights", || self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Self::decode(Self::expect_success(response).await?).await.map(Some)
    }

    async fn health_check(&self) -> bool {
        let request = self.authorize(self.client.get(self.url("health")).timeout(HEALTH_TIMEOUT));
        matches!(request.send().await, Ok(r) if r.status() == StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let config = RecordStoreConfig {
            base_url: "https://records.example/api/v1/".to_string(),
            ..Default::default()
        };
        let store = HttpRecordStore::new(&config).unwrap();
        assert_eq!(store.url("/feedback"), "https://records.example/api/v1/feedback");
        assert_eq!(
            store.url("classifications/42"),
            "https://records.example/api/v1/classifications/42"
        );
        assert!(store.api_key.is_none());
    }

    #[tokio::test]
    async fn test_classification_id_is_one_path_segment() {
        let config = RecordStoreConfig {
            base_url: "https://records.example/api/v1".to_string(),
            ..Default::default()
        };
        let store = HttpRecordStore::new(&config).unwrap();
        assert_eq!(
            store.classification_url("../feedback").unwrap().as_str(),
            "https://records.example/api/v1/classifications/..%2Ffeedback"
        );
        assert_eq!(
            store.classification_url("a?b#c").unwrap().as_str(),
            "https://records.example/api/v1/classifications/a%3Fb%23c"
        );
        assert!(matches!(
            store.get_classification("..").await,
            Err(RecordStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transport_error() {
        let config = RecordStoreConfig {
            // port 9 (discard) on localhost is closed in test environments
            base_url: "http://127.0.0.1:9".to_string(),
            retry_attempts: 1,
            retry_delay_ms: 0,
            timeout_secs: 2,
            ..Default::default()
        };
        let store = HttpRecordStore::new(&config).unwrap();
        let err = store.get_classification("abc").await.unwrap_err();
        assert!(matches!(err, RecordStoreError::Transport(_)));
        assert!(!store.health_check().await);
    }
}
