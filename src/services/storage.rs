use reqwest::multipart;
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// What an uploaded asset is for; each kind has its own extension
/// allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AssetKind {
    Cover,
    Book,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    #[serde(default)]
    public_id: Option<String>,
}

#[derive(Debug)]
pub struct StoredAsset {
    pub secure_url: String,
    pub public_id: Option<String>,
}

/// Client for the external object store that holds covers and book
/// files. The store hands back a stable URL which is all the catalog
/// ever persists.
#[derive(Clone)]
pub struct StorageService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_upload_bytes: usize,
    image_extensions: Vec<String>,
    book_extensions: Vec<String>,
}

impl StorageService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.asset_endpoint.trim_end_matches('/').to_string(),
            api_key: config.asset_api_key.clone(),
            max_upload_bytes: config.max_upload_bytes,
            image_extensions: config.image_extensions(),
            book_extensions: config.book_extensions(),
        }
    }

    fn allowed_extensions(&self, kind: AssetKind) -> &[String] {
        match kind {
            AssetKind::Cover => &self.image_extensions,
            AssetKind::Book => &self.book_extensions,
        }
    }

    fn check_filename(&self, kind: AssetKind, filename: &str) -> Result<(), ServiceError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .ok_or_else(|| {
                ServiceError::ValidationError("Filename has no extension".into())
            })?;

        if !self
            .allowed_extensions(kind)
            .iter()
            .any(|allowed| *allowed == extension)
        {
            return Err(ServiceError::ValidationError(format!(
                "Extension '.{}' is not allowed for {} uploads",
                extension, kind
            )));
        }
        Ok(())
    }

    /// Uploads bytes to the object store and returns the stable URL.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        kind: AssetKind,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredAsset, ServiceError> {
        if bytes.is_empty() {
            return Err(ServiceError::ValidationError("Uploaded file is empty".into()));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(ServiceError::ValidationError(format!(
                "File exceeds the {} byte upload limit",
                self.max_upload_bytes
            )));
        }
        self.check_filename(kind, filename)?;

        let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = multipart::Form::new()
            .text("kind", kind.to_string())
            .part("file", part);

        let mut request = self.client.post(format!("{}/upload", self.endpoint));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .multipart(form)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "asset store returned {}",
                response.status()
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        Ok(StoredAsset {
            secure_url: body.secure_url,
            public_id: body.public_id,
        })
    }

    /// Best-effort delete; a failure is logged, never surfaced.
    #[instrument(skip(self))]
    pub async fn delete(&self, public_id: &str) {
        let mut request = self
            .client
            .delete(format!("{}/{}", self.endpoint, public_id));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(public_id, status = %response.status(), "asset delete refused");
            }
            Ok(_) => {}
            Err(e) => warn!(public_id, "asset delete failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(endpoint: &str) -> StorageService {
        let mut config = AppConfig::new(
            "sqlite::memory:".to_string(),
            "a-test-secret-that-is-long-enough!!".to_string(),
            3600,
            2_592_000,
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );
        config.asset_endpoint = endpoint.to_string();
        config.max_upload_bytes = 64;
        StorageService::new(&config)
    }

    #[tokio::test]
    async fn upload_returns_secure_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://cdn.example.com/covers/1.png",
                "public_id": "covers/1"
            })))
            .mount(&server)
            .await;

        let storage = service_for(&server.uri());
        let asset = storage
            .upload(AssetKind::Cover, "cover.png", vec![1, 2, 3])
            .await
            .expect("upload should succeed");
        assert_eq!(asset.secure_url, "https://cdn.example.com/covers/1.png");
        assert_eq!(asset.public_id.as_deref(), Some("covers/1"));
    }

    #[tokio::test]
    async fn upload_rejects_wrong_extension() {
        let storage = service_for("http://localhost:1");
        let err = storage
            .upload(AssetKind::Book, "malware.exe", vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn upload_rejects_oversized_file() {
        let storage = service_for("http://localhost:1");
        let err = storage
            .upload(AssetKind::Cover, "big.png", vec![0; 65])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn upstream_error_maps_to_external_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let storage = service_for(&server.uri());
        let err = storage
            .upload(AssetKind::Book, "book.pdf", vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));
    }

    #[tokio::test]
    async fn delete_hits_the_store_and_tolerates_failure() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/covers/1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        service_for(&server.uri()).delete("covers/1").await;

        // An unreachable store only logs; the call still returns.
        service_for("http://localhost:1").delete("covers/1").await;
    }
}
