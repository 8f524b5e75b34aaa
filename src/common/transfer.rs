use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use url::Url;
use utoipa::ToSchema;

use super::error::PipelineError;

/// One pre-signed upload slot handed out by the asset store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadChunk {
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes: u64,
    pub total: Option<u64>,
}

impl TransferProgress {
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) => Some(100),
            Some(total) => Some(((self.bytes.min(total) * 100) / total) as u8),
            None => None,
        }
    }
}

enum Source {
    Remote(Url),
    Local(PathBuf),
}

fn classify(source: &str) -> Result<Source, PipelineError> {
    match Url::parse(source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Source::Remote(url)),
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(Source::Local)
            .map_err(|_| PipelineError::Validation(format!("invalid file url: {}", source))),
        _ => Ok(Source::Local(PathBuf::from(source))),
    }
}

/// Byte offset of each chunk within the file.
pub fn chunk_offsets(chunks: &[UploadChunk]) -> Vec<u64> {
    chunks
        .iter()
        .scan(0u64, |offset, chunk| {
            let start = *offset;
            *offset += chunk.size;
            Some(start)
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct TransferEngine {
    client: Client,
    max_download_bytes: u64,
}

impl TransferEngine {
    pub fn new(max_download_bytes: u64) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Internal(format!("failed to build http client: {}", e)))?;
        Ok(Self::with_client(client, max_download_bytes))
    }

    pub fn with_client(client: Client, max_download_bytes: u64) -> Self {
        Self {
            client,
            max_download_bytes,
        }
    }

    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_bytes
    }

    /// Copies `source` (http(s) URL, `file://` URL or path) to `dest`.
    /// Nothing is left at `dest` when this fails.
    pub async fn fetch<F>(&self, source: &str, dest: &Path, on_progress: F) -> Result<u64, PipelineError>
    where
        F: FnMut(TransferProgress) + Send,
    {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }

        let result = match classify(source)? {
            Source::Remote(url) => self.fetch_remote(url, dest, on_progress).await,
            Source::Local(path) => self.copy_local(&path, dest, on_progress).await,
        };

        if result.is_err() {
            if let Err(e) = fs::remove_file(dest).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial download {}: {}", dest.display(), e);
                }
            }
        }
        result
    }

    async fn fetch_remote<F>(&self, url: Url, dest: &Path, mut on_progress: F) -> Result<u64, PipelineError>
    where
        F: FnMut(TransferProgress) + Send,
    {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::transport(
                format!("GET {} returned {}: {}", redact(&url), status, body),
                status.is_server_error(),
            ));
        }

        let total = response.content_length();
        if let Some(declared) = total {
            if declared > self.max_download_bytes {
                return Err(PipelineError::AssetTooLarge {
                    size: declared,
                    limit: self.max_download_bytes,
                });
            }
        }

        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| PipelineError::io(dest, e))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > self.max_download_bytes {
                return Err(PipelineError::AssetTooLarge {
                    size: written,
                    limit: self.max_download_bytes,
                });
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| PipelineError::io(dest, e))?;
            on_progress(TransferProgress {
                bytes: written,
                total,
            });
        }
        file.flush().await.map_err(|e| PipelineError::io(dest, e))?;

        info!(bytes = written, "⬇️ Downloaded source media");
        Ok(written)
    }

    async fn copy_local<F>(&self, source: &Path, dest: &Path, mut on_progress: F) -> Result<u64, PipelineError>
    where
        F: FnMut(TransferProgress) + Send,
    {
        let len = fs::metadata(source)
            .await
            .map_err(|e| PipelineError::io(source, e))?
            .len();
        if len > self.max_download_bytes {
            return Err(PipelineError::AssetTooLarge {
                size: len,
                limit: self.max_download_bytes,
            });
        }

        let copied = fs::copy(source, dest)
            .await
            .map_err(|e| PipelineError::io(source, e))?;
        on_progress(TransferProgress {
            bytes: copied,
            total: Some(len),
        });
        Ok(copied)
    }

    /// PUTs `file` slice by slice to the chunk URLs, stopping at the first rejection.
    pub async fn upload<F>(
        &self,
        chunks: &[UploadChunk],
        file: &Path,
        content_type: &str,
        mut on_progress: F,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(TransferProgress) + Send,
    {
        let file_len = fs::metadata(file)
            .await
            .map_err(|e| PipelineError::io(file, e))?
            .len();
        let planned: u64 = chunks.iter().map(|c| c.size).sum();
        if planned != file_len {
            return Err(PipelineError::Validation(format!(
                "upload plan covers {} bytes but {} has {}",
                planned,
                file.display(),
                file_len
            )));
        }

        let total_chunks = chunks.len();
        let mut sent: u64 = 0;

        for (index, (chunk, offset)) in chunks.iter().zip(chunk_offsets(chunks)).enumerate() {
            let mut part = fs::File::open(file)
                .await
                .map_err(|e| PipelineError::io(file, e))?;
            part.seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| PipelineError::io(file, e))?;
            let body = Body::wrap_stream(ReaderStream::new(part.take(chunk.size)));

            let response = self
                .client
                .put(&chunk.url)
                .header(CONTENT_TYPE, content_type)
                .header(CONTENT_LENGTH, chunk.size)
                .header("x-amz-acl", "private")
                .body(body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(PipelineError::transport(
                    format!(
                        "chunk {}/{} rejected with {}: {}",
                        index + 1,
                        total_chunks,
                        status,
                        text
                    ),
                    status.is_server_error(),
                ));
            }

            sent += chunk.size;
            debug!(chunk = index + 1, of = total_chunks, offset, "Uploaded chunk");
            on_progress(TransferProgress {
                bytes: sent,
                total: Some(file_len),
            });
        }

        Ok(())
    }
}

/// Strips query strings, which carry pre-signed credentials.
fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}
