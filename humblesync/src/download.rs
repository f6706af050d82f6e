//! Download orchestrator.
//!
//! Per item: an integrity check on the file-check queue decides between
//! "already satisfied" and "needs transfer"; transfers run on the download
//! queue, wrapped in the retry policy, streaming response bytes to disk and
//! into the dual hasher simultaneously so nothing is ever buffered whole.
//!
//! One item failing, however it fails, never aborts its siblings; failures
//! are collected and reported by name at the end so a re-run retries just
//! the missing subset.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, UrlSigner};
use crate::cache::SharedCache;
use crate::checksum::{self, ChecksumError, DualHasher};
use crate::item::{DownloadInfo, Source};
use crate::progress::ProgressSink;
use crate::queue::{QueueError, Queues};
use crate::retry::RetryPolicy;
use crate::totals::Totals;

/// Errors that can occur while materializing one item.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// The run was interrupted before this item started.
    #[error("cancelled")]
    Cancelled,
}

impl DownloadError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_transient())
    }
}

/// A failed item, identified well enough for the user to retry it.
#[derive(Debug)]
pub struct ItemFailure {
    pub item_name: String,
    pub file_name: String,
    pub attempts: u32,
    pub error: DownloadError,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {} [after {} attempt(s)]",
            self.item_name, self.file_name, self.error, self.attempts
        )
    }
}

/// How an item was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Existing file verified against its digests; no network I/O.
    AlreadyPresent,
    /// Fetched and written to disk.
    Downloaded,
}

/// Drives items through check, transfer, retry, and cache update.
///
/// Clones share queues, cache, and counters.
#[derive(Clone)]
pub struct Downloader {
    client: ApiClient,
    signer: Arc<dyn UrlSigner>,
    cache: Arc<SharedCache>,
    sink: Arc<dyn ProgressSink>,
    totals: Arc<Totals>,
    retry: RetryPolicy,
    queues: Queues,
}

impl Downloader {
    pub fn new(
        client: ApiClient,
        signer: Arc<dyn UrlSigner>,
        cache: Arc<SharedCache>,
        sink: Arc<dyn ProgressSink>,
        totals: Arc<Totals>,
        retry: RetryPolicy,
        queues: Queues,
    ) -> Self {
        Self {
            client,
            signer,
            cache,
            sink,
            totals,
            retry,
            queues,
        }
    }

    /// Fans the item list out onto the download queue and waits for all of
    /// them, returning the failures.
    pub async fn download_all(&self, items: Vec<DownloadInfo>) -> Vec<ItemFailure> {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let downloader = self.clone();
            let handle = self
                .queues
                .downloads
                .add(async move { downloader.process(item).await });
            handles.push(handle);
        }

        let mut failures = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(Ok(_outcome))) => {}
                Ok(Ok(Err(failure))) => failures.push(failure),
                Ok(Err(QueueError::Cancelled)) | Err(_) => {}
            }
        }
        failures
    }

    /// Runs one item through its whole lifecycle.
    pub async fn process(&self, item: DownloadInfo) -> Result<Outcome, ItemFailure> {
        let failure = |attempts, error| ItemFailure {
            item_name: item.item_name.clone(),
            file_name: item.file_name.clone(),
            attempts,
            error,
        };

        match self.check(&item).await {
            Ok(true) => {
                debug!(file = %item.file_name, "Already present and verified");
                self.totals.add_download_done();
                return Ok(Outcome::AlreadyPresent);
            }
            Ok(false) => {}
            Err(error) => return Err(failure(1, error)),
        }

        self.totals.add_download_started();
        let result = self
            .retry
            .run_if(
                |attempt| {
                    let downloader = self.clone();
                    let item = item.clone();
                    async move {
                        if attempt > 1 {
                            debug!(file = %item.file_name, attempt, "Retrying download");
                        }
                        downloader.transfer(&item).await
                    }
                },
                DownloadError::is_transient,
            )
            .await;

        match result {
            Ok(()) => {
                self.totals.add_download_done();
                Ok(Outcome::Downloaded)
            }
            Err(retry_error) => Err(failure(retry_error.attempts, retry_error.source)),
        }
    }

    /// Integrity check, serialized through the file-check queue.
    async fn check(&self, item: &DownloadInfo) -> Result<bool, DownloadError> {
        let cache = Arc::clone(&self.cache);
        let sink = Arc::clone(&self.sink);
        let checked = item.clone();
        let handle = self
            .queues
            .file_check
            .add(async move { checksum::verify(&checked, &cache, sink.as_ref(), false).await });

        match handle.await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(QueueError::Cancelled)) => Err(DownloadError::Cancelled),
            Err(_) => Err(DownloadError::Cancelled),
        }
    }

    /// One transfer attempt: resolve the URL, stream to disk and hasher,
    /// update the cache.
    async fn transfer(&self, item: &DownloadInfo) -> Result<(), DownloadError> {
        tokio::fs::create_dir_all(&item.download_path)
            .await
            .map_err(|source| DownloadError::Io {
                path: item.download_path.clone(),
                source,
            })?;

        let url = match &item.source {
            Source::Direct(url) => url.clone(),
            Source::Signed {
                machine_name,
                file_name,
            } => self.signer.sign_url(machine_name, file_name).await?,
        };
        let url_display = url.to_string();

        let response = self.client.get_stream(url).await?;
        let total = response.content_length().or(item.expected_size);

        let file_err = |source: io::Error| DownloadError::Io {
            path: item.file_path.clone(),
            source,
        };
        let mut file = tokio::fs::File::create(&item.file_path)
            .await
            .map_err(file_err)?;

        let handle = self
            .sink
            .begin(&format!("Downloading: {}", item.file_name), total);

        let mut hasher = DualHasher::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| ApiError::Transport {
                url: url_display.clone(),
                source,
            })?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(file_err)?;
            handle.advance(chunk.len() as u64);
        }
        file.flush().await.map_err(file_err)?;
        handle.finish();

        let computed = hasher.finalize();
        if !item.is_unverifiable() && !item.matches_checksums(&computed) {
            warn!(
                file = %item.file_name,
                computed_sha1 = %computed.sha1,
                expected_sha1 = item.sha1.as_deref().unwrap_or("-"),
                "Integrity warning: downloaded bytes do not match vendor checksum"
            );
        }
        // Freshly downloaded bytes are the ground truth for the cache.
        self.cache.insert(&item.file_name, computed);

        info!(file = %item.file_name, "Downloaded");
        Ok(())
    }
}
