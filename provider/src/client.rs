use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use relay_capability::ProvisionError;
use relay_capability::ResourceHandles;
use relay_capability::ResourceProvisioner;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderValue;
use reqwest::multipart;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::ProviderError;

/// Vector stores are provisioned to expire this many days after last access.
/// The provider tracks the lifetime; the relay never renews it.
const VECTOR_STORE_EXPIRY_DAYS: u32 = 30;

const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

/// Client for the upstream OpenAI-compatible API.
#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl ProviderClient {
    pub fn new(base_url: String, api_key: String, default_model: String) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            api_key,
            default_model,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn bearer(&self) -> HeaderValue {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer"));
        value.set_sensitive(true);
        value
    }

    /// Creates one assistant configured for retrieval-style tool use. The
    /// model recorded here is a default; chat turns may override it.
    pub async fn create_assistant(&self) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(self.url("assistants"))
            .header(AUTHORIZATION, self.bearer())
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .json(&serde_json::json!({
                "model": self.default_model,
                "tools": [{ "type": "file_search" }],
            }))
            .send()
            .await?;
        let created: CreatedObject = expect_success(response).await?.json().await?;
        Ok(created.id)
    }

    /// Creates one vector store that the provider expires after
    /// [`VECTOR_STORE_EXPIRY_DAYS`] of inactivity.
    pub async fn create_vector_store(&self) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(self.url("vector_stores"))
            .header(AUTHORIZATION, self.bearer())
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .json(&serde_json::json!({
                "expires_after": {
                    "anchor": "last_active_at",
                    "days": VECTOR_STORE_EXPIRY_DAYS,
                },
            }))
            .send()
            .await?;
        let created: CreatedObject = expect_success(response).await?.json().await?;
        Ok(created.id)
    }

    /// Streams a staged file to the upstream file-storage API.
    ///
    /// `staged` is the randomly named temporary path the server wrote the
    /// upload to; `filename` is the client-supplied display name and travels
    /// only as multipart metadata, never as a storage path.
    pub async fn upload_file(
        &self,
        staged: &Path,
        filename: &str,
    ) -> Result<String, ProviderError> {
        let file = tokio::fs::File::open(staged).await?;
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let part = multipart::Part::stream(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .file_name(filename.to_string())
            .mime_str(mime.essence_str())?;
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let response = self
            .http
            .post(self.url("files"))
            .header(AUTHORIZATION, self.bearer())
            .multipart(form)
            .send()
            .await?;
        let created: CreatedObject = expect_success(response).await?.json().await?;
        Ok(created.id)
    }

    /// Associates an already-uploaded file with a vector store.
    pub async fn attach_file_to_store(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(self.url(&format!("vector_stores/{vector_store_id}/files")))
            .header(AUTHORIZATION, self.bearer())
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceProvisioner for ProviderClient {
    async fn provision(&self) -> Result<ResourceHandles, ProvisionError> {
        let assistant_id = self
            .create_assistant()
            .await
            .map_err(|e| ProvisionError::new(e.to_string()))?;
        let vector_store_id = self
            .create_vector_store()
            .await
            .map_err(|e| ProvisionError::new(e.to_string()))?;
        Ok(ResourceHandles {
            assistant_id,
            vector_store_id,
        })
    }
}

pub(crate) async fn expect_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ProviderError::from_response(response).await)
    }
}
