use std::time::Duration;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client};
use serde::Deserialize;
use tracing::debug;
use url::Url;
use crate::core::{Destination, ProgressReporter, QueueError, Result, StorageClient, UploadFile, UploadedObject};
use super::progress_stream::{chunked, ProgressStream};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct HttpStorageConfig {
    /// Base URL of the object store, e.g. `https://storage.example.com/object/`
    pub endpoint: String,
    /// Sent as `Authorization: Bearer <token>`
    pub token: Option<String>,
    pub timeout: Duration,
    /// Body chunk size, progress is reported once per chunk
    pub chunk_size: usize,
}

impl Default for HttpStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: None,
            timeout: Duration::from_secs(300),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// Uploads objects with `PUT {endpoint}/{bucket}/{path}`.
#[derive(Debug, Clone)]
pub struct HttpStorageClient {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    chunk_size: usize,
}

impl HttpStorageClient {
    pub fn new(config: HttpStorageConfig) -> Result<Self> {
        let mut endpoint = Url::parse(&config.endpoint)
            .map_err(|err| QueueError::InvalidConfig(format!("Invalid endpoint {}: {}", config.endpoint, err)))?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: config.token,
            chunk_size: config.chunk_size,
        })
    }

    /// Appends bucket and path to the endpoint, percent-encoding each segment.
    pub fn object_url(&self, destination: &Destination) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| QueueError::storage(format!("Endpoint {} cannot hold an object path", self.endpoint)))?
            .pop_if_empty()
            .extend(
                destination.bucket
                    .split('/')
                    .chain(destination.path.split('/'))
                    .filter(|segment| !segment.is_empty()),
            );

        Ok(url)
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn upload(
        &self,
        file: &UploadFile,
        destination: &Destination,
        progress: ProgressReporter,
    ) -> Result<UploadedObject> {
        let url = self.object_url(destination)?;
        debug!(%url, size = file.size(), "PUT object");

        progress.report(0);
        let stream = ProgressStream::new(
            chunked(file.data.clone(), self.chunk_size),
            progress,
            file.size(),
        );

        let mut request = self.client
            .put(url.clone())
            .header(CONTENT_TYPE, file.mime_type.as_str())
            .header(CONTENT_LENGTH, file.size())
            .body(Body::wrap_stream(stream));

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                format!("Upload failed with status {}", status)
            } else {
                format!("Upload failed with status {}: {}", status, body.trim())
            };
            return Err(QueueError::storage(message));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        let body = response.bytes().await?;
        let url = serde_json::from_slice::<UploadResponse>(&body)
            .ok()
            .map(|response| response.url)
            .or(location)
            .unwrap_or_else(|| url.to_string());

        Ok(UploadedObject { url })
    }
}
