//! HTTP sink for the ingestion endpoint
//!
//! Serializes a batch to a JSON array, optionally gzip-compresses the body
//! (`Content-Encoding: gzip`), and POSTs it to the configured endpoint with
//! the application id in the query string. Compression is CPU-bound and
//! runs on the blocking thread pool.

use super::{BatchSink, UploadError};
use crate::batch::Batch;
use crate::config::Profile;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::io::Write;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sink that POSTs batches to an HTTP(S) ingestion endpoint
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    app_id: String,
    gzip: bool,
    log_full_request: bool,
}

impl HttpSink {
    /// New sink for `endpoint`, tagging requests with `app_id`
    pub fn new(
        endpoint: impl Into<String>,
        app_id: impl Into<String>,
        gzip: bool,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            app_id: app_id.into(),
            gzip,
            log_full_request: false,
        })
    }

    /// Sink configured from a resolved profile
    pub fn from_profile(profile: &Profile) -> Result<Self, UploadError> {
        let mut sink = Self::new(&profile.endpoint, &profile.app_id, profile.is_gzip)?;
        sink.log_full_request = profile.log_full_request;
        Ok(sink)
    }

    /// Whether bodies are gzip-compressed
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }
}

#[async_trait]
impl BatchSink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, batch: &Batch) -> Result<(), UploadError> {
        let body = batch.to_json()?;
        if self.log_full_request {
            tracing::debug!(
                seq = batch.seq,
                body = %String::from_utf8_lossy(&body),
                "upload request body"
            );
        }

        let body = if self.gzip {
            tokio::task::spawn_blocking(move || gzip_compress(&body))
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??
        } else {
            body
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .query(&[("appId", self.app_id.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if self.gzip {
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UploadError::Timeout
            } else {
                UploadError::Http(e)
            }
        })?;

        classify_status(response.status())
    }
}

/// Map a response status to the upload error taxonomy
fn classify_status(status: StatusCode) -> Result<(), UploadError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(UploadError::RateLimited);
    }
    if status.is_server_error() {
        return Err(UploadError::Server {
            status: status.as_u16(),
        });
    }
    Err(UploadError::Rejected {
        status: status.as_u16(),
    })
}

/// Gzip-compress a request body
fn gzip_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(classify_status(StatusCode::NO_CONTENT).is_ok());

        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(UploadError::RateLimited)
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(UploadError::Server { status: 500 })
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Err(UploadError::Server { status: 502 })
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN),
            Err(UploadError::Rejected { status: 403 })
        ));
    }

    #[test]
    fn test_retryability_follows_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE)
            .unwrap_err()
            .is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS)
            .unwrap_err()
            .is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST)
            .unwrap_err()
            .is_retryable());
    }

    #[test]
    fn test_gzip_roundtrip() {
        let body = br#"[{"event_type":"screen_view"}]"#;
        let compressed = gzip_compress(body).unwrap();
        assert_ne!(compressed.as_slice(), body.as_slice());

        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).unwrap();
        assert_eq!(restored.as_slice(), body.as_slice());
    }

    #[test]
    fn test_sink_from_profile() {
        use crate::config::AppKind;

        let mut profile = Profile::standalone(AppKind::Shopping);
        profile.endpoint = "https://ingest.example.com/collect".into();
        profile.app_id = "shop-app".into();
        profile.is_gzip = false;

        let sink = HttpSink::from_profile(&profile).unwrap();
        assert!(!sink.is_gzip());
        assert_eq!(sink.name(), "http");
    }
}
