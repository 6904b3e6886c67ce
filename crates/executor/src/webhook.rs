use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::NotifyError;
use crate::notifier::{FailureNotifier, FailureReport};

/// Posts each [`FailureReport`] as JSON to an HTTP endpoint.
///
/// Any 2xx response counts as delivered.
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    /// Create a notifier with its own client using `timeout` per request.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(url, client))
    }

    /// Create a notifier sharing an existing client.
    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FailureNotifier for WebhookNotifier {
    #[instrument(skip(self, report), fields(item.key = %report.item_key))]
    async fn send_failure(&self, report: &FailureReport) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(report).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        debug!(status = status.as_u16(), "failure report delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use shepherd_core::ItemKey;

    use super::*;
    use crate::notifier::FailureKind;

    /// A minimal HTTP endpoint that answers one request with `status_code`
    /// and hands back the raw request.
    struct MockEndpoint {
        listener: tokio::net::TcpListener,
        url: String,
    }

    impl MockEndpoint {
        async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind mock endpoint");
            let port = listener.local_addr().unwrap().port();
            Self {
                listener,
                url: format!("http://127.0.0.1:{port}/alerts"),
            }
        }

        async fn respond_once(self, status_code: u16) -> String {
            let (mut stream, _) = self.listener.accept().await.unwrap();

            let mut buf = vec![0u8; 16384];
            let mut read = 0;
            // Read until the JSON body has arrived.
            loop {
                let n = stream.read(&mut buf[read..]).await.unwrap();
                read += n;
                let text = String::from_utf8_lossy(&buf[..read]);
                if n == 0 || text.trim_end().ends_with('}') {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status_code} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            String::from_utf8_lossy(&buf[..read]).into_owned()
        }
    }

    fn report() -> FailureReport {
        FailureReport {
            item_key: ItemKey::new("proj:comment"),
            error: "user is banned".into(),
            kind: FailureKind::Terminal {
                matched: "banned".into(),
            },
            attempts: 1,
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn posts_report_as_json() {
        let endpoint = MockEndpoint::start().await;
        let notifier = WebhookNotifier::new(&endpoint.url, Duration::from_secs(5)).unwrap();
        let server = tokio::spawn(endpoint.respond_once(200));

        notifier.send_failure(&report()).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("POST /alerts"));
        assert!(request.contains("application/json"));
        assert!(request.contains(r#""item_key":"proj:comment""#));
        assert!(request.contains(r#""matched":"banned""#));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let endpoint = MockEndpoint::start().await;
        let notifier = WebhookNotifier::new(&endpoint.url, Duration::from_secs(5)).unwrap();
        let server = tokio::spawn(endpoint.respond_once(503));

        let err = notifier.send_failure(&report()).await.unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, NotifyError::Status(503)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let endpoint = MockEndpoint::start().await;
        let url = endpoint.url.clone();
        drop(endpoint);

        let notifier = WebhookNotifier::new(url, Duration::from_secs(2)).unwrap();
        let err = notifier.send_failure(&report()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Http(_)));
    }
}
