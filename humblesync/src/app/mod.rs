//! Top-level run orchestration.
//!
//! A [`Session`] owns everything one run needs: validated options, the API
//! client, the checksum cache, the queue set, and the totals accumulator.
//! [`Session::run`] executes one [`Command`], and [`Session::interrupt`]
//! is the hook the CLI wires to Ctrl-C: stop scheduling, flush the cache.

mod error;
pub mod options;

pub use error::SyncError;
pub use options::{OptionDiff, Options, OptionsError, SavedOptions, OPTIONS_FILE};

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ApiClient, Order, UrlSigner};
use crate::cache::SharedCache;
use crate::checksum;
use crate::download::{Downloader, ItemFailure};
use crate::filter;
use crate::fsutil;
use crate::progress::ProgressSink;
use crate::queue::{QueueError, Queues};
use crate::reconcile::{self, ReconcileReport};
use crate::retry::RetryPolicy;
use crate::totals::{Totals, TotalsSnapshot};

pub const USER_AGENT: &str = concat!("HumbleSync/", env!("CARGO_PKG_VERSION"));

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What one invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Fetch, filter, and download all purchases.
    All,
    /// Fetch, filter by format priority, and download ebooks.
    Ebooks,
    /// Fetch, filter, and download the subscription catalog.
    Trove,
    /// Remove local files and cache entries no purchase references.
    Cleanup,
    /// Like `Cleanup`, against the ebook filter.
    CleanupEbooks,
    /// Like `Cleanup`, against the catalog filter.
    CleanupTrove,
    /// Recompute checksums of every existing file.
    Checksums,
}

impl Command {
    /// Whether this command talks to the storefront API.
    pub fn needs_auth(&self) -> bool {
        !matches!(self, Self::Checksums)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Ebooks => "ebooks",
            Self::Trove => "trove",
            Self::Cleanup => "cleanup",
            Self::CleanupEbooks => "cleanupebooks",
            Self::CleanupTrove => "cleanuptrove",
            Self::Checksums => "checksums",
        };
        f.write_str(name)
    }
}

/// Outcome of one run: final counters, per-item failures, and the
/// reconciliation report for cleanup commands.
#[derive(Debug)]
pub struct RunReport {
    pub totals: TotalsSnapshot,
    pub failures: Vec<ItemFailure>,
    pub reconcile: Option<ReconcileReport>,
}

/// One run's worth of state.
pub struct Session {
    options: Options,
    client: ApiClient,
    cache: Arc<SharedCache>,
    totals: Arc<Totals>,
    queues: Queues,
    sink: Arc<dyn ProgressSink>,
    retry: RetryPolicy,
}

impl Session {
    pub fn new(options: Options, sink: Arc<dyn ProgressSink>) -> Result<Self, SyncError> {
        options.validate(false)?;
        let client = ApiClient::new(&options.auth_token, USER_AGENT)?;
        let cache = Arc::new(SharedCache::load(&options.download_folder));
        let totals = Arc::new(Totals::default());
        totals.set_checksums_loaded(cache.len() as u64);
        info!(checksums = cache.len(), "Checksums loaded");

        let queues = Queues::new(options.parallel);
        Ok(Self {
            options,
            client,
            cache,
            totals,
            queues,
            sink,
            retry: RetryPolicy::exponential(DEFAULT_MAX_ATTEMPTS),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn totals(&self) -> &Arc<Totals> {
        &self.totals
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.cache
    }

    /// Interruption hook: stop admitting queue tasks and flush the cache.
    /// Safe to call more than once.
    pub fn interrupt(&self) {
        self.queues.clear_all();
        if let Err(e) = self.cache.save() {
            warn!(error = %e, "Could not flush checksum cache on interrupt");
        }
    }

    /// Executes one command to completion and persists the cache.
    pub async fn run(&self, command: Command) -> Result<RunReport, SyncError> {
        self.options.validate(command.needs_auth())?;
        info!(%command, folder = %self.options.download_folder.display(), "Starting run");

        let mut failures = Vec::new();
        let mut reconcile_report = None;

        match command {
            Command::All => {
                let orders = self.fetch_orders().await?;
                let items = filter::filter_bundles(&orders, &self.options, &self.totals);
                failures = self.downloader().download_all(items).await;
            }
            Command::Ebooks => {
                let orders = self.fetch_orders().await?;
                let items = filter::filter_ebooks(&orders, &self.options, &self.totals);
                failures = self.downloader().download_all(items).await;
            }
            Command::Trove => {
                let entries = self.client.fetch_catalog().await?;
                let items = filter::filter_catalog(&entries, &self.options, &self.totals);
                failures = self.downloader().download_all(items).await;
            }
            Command::Cleanup => {
                let orders = self.fetch_orders().await?;
                let items = filter::filter_bundles(&orders, &self.options, &self.totals);
                reconcile_report = Some(self.reconcile(&items).await);
            }
            Command::CleanupEbooks => {
                let orders = self.fetch_orders().await?;
                let items = filter::filter_ebooks(&orders, &self.options, &self.totals);
                reconcile_report = Some(self.reconcile(&items).await);
            }
            Command::CleanupTrove => {
                let entries = self.client.fetch_catalog().await?;
                let items = filter::filter_catalog(&entries, &self.options, &self.totals);
                reconcile_report = Some(self.reconcile(&items).await);
            }
            Command::Checksums => {
                self.recompute_checksums().await;
            }
        }

        self.queues.idle_all().await;
        self.cache.save()?;

        Ok(RunReport {
            totals: self.totals.snapshot(),
            failures,
            reconcile: reconcile_report,
        })
    }

    fn downloader(&self) -> Downloader {
        let signer: Arc<dyn UrlSigner> = Arc::new(self.client.clone());
        Downloader::new(
            self.client.clone(),
            signer,
            Arc::clone(&self.cache),
            Arc::clone(&self.sink),
            Arc::clone(&self.totals),
            self.retry.clone(),
            self.queues.clone(),
        )
    }

    async fn reconcile(&self, items: &[crate::item::DownloadInfo]) -> ReconcileReport {
        reconcile::reconcile(
            items,
            &self.cache,
            &self.options.download_folder,
            &self.totals,
        )
        .await
    }

    /// Lists order keys, then fans the per-order fetches out onto the
    /// order-info queue. Newest purchases come first, matching the
    /// storefront's own listing.
    async fn fetch_orders(&self) -> Result<Vec<Order>, SyncError> {
        let keys = self.client.fetch_game_keys().await?;
        self.totals.set_bundles(keys.len() as u64);
        info!(bundles = keys.len(), "Fetching order details");

        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            let client = self.client.clone();
            handles.push(
                self.queues
                    .order_info
                    .add(async move { client.fetch_order(&key.gamekey).await }),
            );
        }

        let mut orders = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(Ok(order))) => orders.push(order),
                Ok(Ok(Err(e))) => return Err(e.into()),
                Ok(Err(QueueError::Cancelled)) | Err(_) => return Err(SyncError::Interrupted),
            }
        }
        orders.sort_by(|a, b| b.created.cmp(&a.created));

        // Keep a snapshot for debugging; .json files are invisible to
        // reconciliation.
        if let Err(e) = fsutil::write_json_file(
            &self.options.download_folder.join("bundles.json"),
            &orders,
        ) {
            warn!(error = %e, "Could not write bundles snapshot");
        }

        Ok(orders)
    }

    /// Rehashes every file under the download root and replaces its cache
    /// entry, regardless of any previous entry.
    async fn recompute_checksums(&self) {
        info!(
            folder = %self.options.download_folder.display(),
            "Recomputing checksums of existing files"
        );
        let files = match fsutil::walk_files(&self.options.download_folder) {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    folder = %self.options.download_folder.display(),
                    error = %e,
                    "Could not walk download folder"
                );
                return;
            }
        };
        let mut handles = Vec::with_capacity(files.len());
        for path in files {
            let sink = Arc::clone(&self.sink);
            let cache = Arc::clone(&self.cache);
            let totals = Arc::clone(&self.totals);
            handles.push(self.queues.file_check.add(async move {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match checksum::hash_file(&path, sink.as_ref()).await {
                    Ok(sums) => {
                        cache.insert(&name, sums);
                        totals.add_checksum_computed();
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Could not hash file"),
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}
