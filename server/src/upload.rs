use std::path::Path;
use std::path::PathBuf;

use axum::extract::Multipart;
use futures::future::try_join_all;
use relay_provider::ProviderClient;
use relay_provider::ProviderError;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    /// Client sent an unreadable multipart body.
    #[error("Error parsing form data")]
    Form(#[from] axum::extract::multipart::MultipartError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// A file spooled to disk under a random name, removed on drop. Client
/// filenames never reach the filesystem.
struct StagedFile {
    path: PathBuf,
    filename: String,
}

impl StagedFile {
    async fn create(filename: String) -> Result<(Self, tokio::fs::File), std::io::Error> {
        let path = std::env::temp_dir().join(format!("{}.tmp", Uuid::new_v4()));
        let file = tokio::fs::File::create(&path).await?;
        Ok((Self { path, filename }, file))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        // Best effort; a leaked temp file is harmless and the OS reclaims it.
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::debug!(
                "failed to remove staged upload {}: {error}",
                self.path.display()
            );
        }
    }
}

/// Receives every file field of the multipart request, staging each to disk,
/// then pushes them all to the provider concurrently and (when a store is
/// given) attaches each to the vector store.
///
/// Returned file ids match the order the fields appeared in the request.
/// Fails as a whole on the first error; files uploaded before the failure
/// are left orphaned upstream, where the store's expiry reclaims them.
pub async fn receive_and_bind(
    provider: &ProviderClient,
    vector_store_id: Option<&str>,
    mut multipart: Multipart,
) -> Result<Vec<String>, UploadError> {
    // Multipart fields have to be consumed sequentially, so staging is the
    // serial phase and the provider round-trips are the concurrent one.
    let mut staged = Vec::new();
    while let Some(mut field) = multipart.next_field().await? {
        // Plain text fields carry no filename and are not uploads.
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let (entry, mut file) = StagedFile::create(filename).await?;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        staged.push(entry);
    }

    let uploads = staged
        .iter()
        .map(|entry| push_one(provider, vector_store_id, &entry.path, &entry.filename));
    let file_ids = try_join_all(uploads).await?;
    Ok(file_ids)
}

async fn push_one(
    provider: &ProviderClient,
    vector_store_id: Option<&str>,
    staged: &Path,
    filename: &str,
) -> Result<String, ProviderError> {
    let file_id = provider.upload_file(staged, filename).await?;
    if let Some(store) = vector_store_id {
        provider.attach_file_to_store(store, &file_id).await?;
    }
    tracing::info!(file_id = %file_id, filename, "uploaded file");
    Ok(file_id)
}
