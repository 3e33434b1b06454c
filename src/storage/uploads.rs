//! Object store for transcoded audio.
//!
//! `ObjectStore` is the seam; `CloudinaryStore` talks to Cloudinary's upload
//! API (signed multipart POSTs to `/v1_1/<cloud>/<resource_type>/upload` and
//! `/destroy`).
//!
//! Requests are signed with SHA-1, Cloudinary's default. Product environments
//! switched to SHA-256 set `cloudinary.signature_algorithm = "sha256"`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::ReaderStream;

use crate::core::config::CloudinaryConfig;

/// Cloudinary resource category.
///
/// Audio has no category of its own there: audio files are `video` assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Video,
    Raw,
    Auto,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
            ResourceType::Auto => "auto",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash used for request signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
        }
    }
}

/// An uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Public HTTPS URL clients fetch
    pub url: String,
    /// Store id used for deletion
    pub id: String,
}

/// Errors that can occur when talking to the object store
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("Failed to read upload file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Object store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Object store returned an unexpected response: {0}")]
    MalformedResponse(String),

    #[error("Object store is not configured")]
    NotConfigured,
}

/// Trait for object store implementations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &str;

    /// Uploads a local file and returns its public URL and id.
    async fn upload(&self, path: &Path, resource_type: ResourceType) -> Result<StoredObject, ObjectStoreError>;

    /// Deletes an object by id.
    async fn delete(&self, id: &str, resource_type: ResourceType) -> Result<(), ObjectStoreError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Cloudinary-backed object store.
pub struct CloudinaryStore {
    client: Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
    signature_algorithm: SignatureAlgorithm,
}

impl CloudinaryStore {
    pub fn new(config: &CloudinaryConfig) -> Result<Self, ObjectStoreError> {
        let client = Client::builder()
            .user_agent(concat!("reelgrab/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            signature_algorithm: config.signature_algorithm,
        })
    }

    fn endpoint(&self, resource_type: ResourceType, action: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/{}",
            self.api_base, self.cloud_name, resource_type, action
        )
    }

    fn ensure_configured(&self) -> Result<(), ObjectStoreError> {
        if self.cloud_name.is_empty() || self.api_key.is_empty() || self.api_secret.expose_secret().is_empty() {
            return Err(ObjectStoreError::NotConfigured);
        }
        Ok(())
    }

    /// Adds api_key / timestamp / signature to a form.
    fn signed_form(&self, mut form: Form, params: &[(&str, String)]) -> Form {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut signed: Vec<(&str, String)> = params.to_vec();
        signed.push(("timestamp", timestamp.clone()));
        let signature = sign_params(&signed, self.api_secret.expose_secret(), self.signature_algorithm);

        for (key, value) in params {
            form = form.text(key.to_string(), value.clone());
        }
        form.text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
    }

    async fn error_from(response: reqwest::Response) -> ObjectStoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        ObjectStoreError::Rejected { status, message }
    }
}

#[async_trait]
impl ObjectStore for CloudinaryStore {
    fn name(&self) -> &str {
        "cloudinary"
    }

    async fn upload(&self, path: &Path, resource_type: ResourceType) -> Result<StoredObject, ObjectStoreError> {
        self.ensure_configured()?;

        let size = fs_err::tokio::metadata(path).await?.len();
        let file = fs_err::tokio::File::open(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.mp3")
            .to_string();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;
        let form = self.signed_form(Form::new().part("file", part), &[]);

        log::info!(
            "Uploading {} ({:.2} MB) to cloudinary as {}",
            path.display(),
            size as f64 / (1024.0 * 1024.0),
            resource_type
        );

        let response = self
            .client
            .post(self.endpoint(resource_type, "upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body: UploadResponse = response.json().await?;
        match (body.secure_url, body.public_id) {
            (Some(url), Some(id)) => Ok(StoredObject { url, id }),
            _ => Err(ObjectStoreError::MalformedResponse(
                "upload response lacks secure_url or public_id".to_string(),
            )),
        }
    }

    async fn delete(&self, id: &str, resource_type: ResourceType) -> Result<(), ObjectStoreError> {
        self.ensure_configured()?;

        let form = self.signed_form(Form::new(), &[("public_id", id.to_string())]);
        let response = self
            .client
            .post(self.endpoint(resource_type, "destroy"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body: DestroyResponse = response.json().await?;
        match body.result.as_deref() {
            Some("ok") => Ok(()),
            Some("not found") => {
                log::warn!("Cloudinary object {} was already gone", id);
                Ok(())
            }
            other => Err(ObjectStoreError::MalformedResponse(format!(
                "unexpected destroy result: {:?}",
                other
            ))),
        }
    }
}

/// Cloudinary request signature: params sorted by key, joined as
/// `k=v&k=v`, secret appended, hashed, lowercase hex.
pub fn sign_params(params: &[(&str, String)], secret: &str, algorithm: SignatureAlgorithm) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    match algorithm {
        SignatureAlgorithm::Sha1 => hex_digest::<Sha1>(&to_sign, secret),
        SignatureAlgorithm::Sha256 => hex_digest::<Sha256>(&to_sign, secret),
    }
}

fn hex_digest<D: Digest>(to_sign: &str, secret: &str) -> String {
    let mut hasher = D::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_base: &str) -> CloudinaryConfig {
        CloudinaryConfig {
            api_base: api_base.to_string(),
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: SecretString::from("secret".to_string()),
            resource_type: ResourceType::Video,
            signature_algorithm: SignatureAlgorithm::Sha1,
        }
    }

    #[test]
    fn test_sign_params_sha1_known_vectors() {
        assert_eq!(
            sign_params(&[("timestamp", "1700000000".to_string())], "secret", SignatureAlgorithm::Sha1),
            "84af3c6077e429a8e7ff26d2ca13d5feb6bc7cb0"
        );
        // Order of the input does not matter
        assert_eq!(
            sign_params(
                &[
                    ("timestamp", "1700000000".to_string()),
                    ("public_id", "abc123".to_string())
                ],
                "secret",
                SignatureAlgorithm::Sha1
            ),
            "bc038e51808e683a7f74faf4272386fd4de98783"
        );
    }

    #[test]
    fn test_sign_params_sha256_known_vectors() {
        assert_eq!(
            sign_params(&[("timestamp", "1700000000".to_string())], "secret", SignatureAlgorithm::Sha256),
            "899037359ccfa6a61dabc0d9fbdd808ed945046e5d6451ab46bde7d4677d53b4"
        );
        assert_eq!(
            sign_params(
                &[
                    ("timestamp", "1700000000".to_string()),
                    ("public_id", "abc123".to_string())
                ],
                "secret",
                SignatureAlgorithm::Sha256
            ),
            "0c93a6573309ae379dc6e11969e77703899d950d9d61a6e02d2c672ad605be50"
        );
    }

    #[test]
    fn test_signature_algorithm_defaults_to_sha1() {
        assert_eq!(SignatureAlgorithm::default(), SignatureAlgorithm::Sha1);
        assert_eq!(SignatureAlgorithm::Sha256.as_str(), "sha256");
    }

    #[test]
    fn test_resource_type_display() {
        assert_eq!(ResourceType::Video.to_string(), "video");
        assert_eq!(ResourceType::Raw.as_str(), "raw");
    }

    #[tokio::test]
    async fn test_upload_returns_secure_url_and_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/demo/video/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://res.cloudinary.com/demo/video/upload/v1/abc123.mp3",
                "public_id": "abc123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, b"ID3fake").unwrap();

        let store = CloudinaryStore::new(&config(&server.uri())).unwrap();
        let stored = store.upload(&file, ResourceType::Video).await.unwrap();
        assert_eq!(stored.id, "abc123");
        assert_eq!(stored.url, "https://res.cloudinary.com/demo/video/upload/v1/abc123.mp3");
    }

    #[tokio::test]
    async fn test_upload_surfaces_api_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/demo/video/upload"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": {"message": "Invalid Signature"}})),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, b"ID3fake").unwrap();

        let store = CloudinaryStore::new(&config(&server.uri())).unwrap();
        match store.upload(&file, ResourceType::Video).await {
            Err(ObjectStoreError::Rejected { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid Signature");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_streams_file_contents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/demo/video/upload"))
            .and(body_string_contains("ID3streamed-audio-body"))
            .and(body_string_contains("filename=\"a.mp3\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://res.cloudinary.com/demo/video/upload/v1/a.mp3",
                "public_id": "a"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, b"ID3streamed-audio-body").unwrap();

        let store = CloudinaryStore::new(&config(&server.uri())).unwrap();
        assert_eq!(store.upload(&file, ResourceType::Video).await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_read_error() {
        let store = CloudinaryStore::new(&config("http://127.0.0.1:9")).unwrap();
        let result = store.upload(Path::new("/nonexistent/a.mp3"), ResourceType::Video).await;
        match result {
            Err(err @ ObjectStoreError::Read(_)) => {
                assert!(err.to_string().starts_with("Failed to read upload file: "));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_accepts_ok_and_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/demo/video/destroy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "ok"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1_1/demo/video/destroy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "not found"})))
            .mount(&server)
            .await;

        let store = CloudinaryStore::new(&config(&server.uri())).unwrap();
        store.delete("abc123", ResourceType::Video).await.unwrap();
        store.delete("abc123", ResourceType::Video).await.unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_store_refuses() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.api_key.clear();
        let store = CloudinaryStore::new(&cfg).unwrap();
        assert!(matches!(
            store.delete("abc", ResourceType::Video).await,
            Err(ObjectStoreError::NotConfigured)
        ));
    }
}
