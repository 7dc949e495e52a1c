use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info};

use super::handlers::StatusUpdate;
use super::CallbackError;
use crate::command::redact_json;

/// Destination of status updates.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn send(&self, update: &StatusUpdate) -> Result<(), CallbackError>;
}

/// POSTs status updates to the self-service API. Failures are returned,
/// never retried.
#[derive(Debug, Clone)]
pub struct SelfServiceClient {
    client: Client,
    base_url: Url,
}

impl SelfServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CallbackError> {
        let mut base_url = Url::parse(base_url).map_err(|e| CallbackError::InvalidUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        // Endpoints are resolved below the base path, which must end in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallbackError::Delivery {
                uri: base_url.to_string(),
                source: e,
            })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, uri: &str) -> Result<Url, CallbackError> {
        self.base_url
            .join(uri.trim_start_matches('/'))
            .map_err(|e| CallbackError::InvalidUrl {
                url: format!("{}{}", self.base_url, uri),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl StatusSink for SelfServiceClient {
    async fn send(&self, update: &StatusUpdate) -> Result<(), CallbackError> {
        let url = self.url_for(update.uri)?;
        debug!("POST {} {}", url, redact_json(&update.body));

        let response = self
            .client
            .post(url.clone())
            .json(&update.body)
            .send()
            .await
            .map_err(|source| CallbackError::Delivery {
                uri: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallbackError::Status {
                status: status.as_u16(),
                uri: url.to_string(),
                body,
            });
        }

        info!("Delivered status update to {}", update.uri);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining_on_bare_host() {
        let client =
            SelfServiceClient::new("https://self-service:8443", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url_for("/api/infrastructure/edge/status").unwrap().as_str(),
            "https://self-service:8443/api/infrastructure/edge/status"
        );
    }

    #[test]
    fn test_url_joining_keeps_base_path() {
        for base in ["https://host/datalab", "https://host/datalab/"] {
            let client = SelfServiceClient::new(base, Duration::from_secs(1)).unwrap();
            assert_eq!(
                client.url_for("/api/infrastructure/edge/status").unwrap().as_str(),
                "https://host/datalab/api/infrastructure/edge/status",
                "{base}"
            );
        }
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            SelfServiceClient::new("not a url", Duration::from_secs(1)),
            Err(CallbackError::InvalidUrl { .. })
        ));
    }
}
