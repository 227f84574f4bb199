use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::entities::{
    receipt_refresh_policy::ReceiptRefreshPolicy,
    system_info::{OsVersion, Platform, SystemInfo},
};

/// Below this watchOS version, sandbox builds report the production receipt
/// location while the receipt is written next to it as `receipt`.
const FIRST_WATCH_OS_VERSION_WITHOUT_RECEIPT_BUG: OsVersion = OsVersion::new(7, 0, 0);

const PRODUCTION_RECEIPT_FILE_NAME: &str = "receipt";

/// Triggers a receipt refresh through the platform API.
#[async_trait]
pub trait ReceiptRefreshDatasource: Send + Sync {
    /// Completes when the refresh request finishes, whether or not a receipt
    /// was written.
    async fn refresh_receipt(&self);
}

#[async_trait]
pub trait ReceiptFetcher: Send + Sync {
    /// Returns the local receipt according to `refresh_policy`.
    ///
    /// A failed refresh yields `Some` empty data rather than an error; callers
    /// treat empty and `None` alike as "no receipt".
    async fn receipt_data(&self, refresh_policy: ReceiptRefreshPolicy) -> Option<Vec<u8>>;
}

pub struct ReceiptFetcherImpl {
    request_fetcher: Arc<dyn ReceiptRefreshDatasource>,
    system_info: SystemInfo,
}

#[async_trait]
impl ReceiptFetcher for ReceiptFetcherImpl {
    async fn receipt_data(&self, refresh_policy: ReceiptRefreshPolicy) -> Option<Vec<u8>> {
        if refresh_policy == ReceiptRefreshPolicy::Always {
            debug!("Force refreshing the receipt.");
            return Some(self.refresh_receipt().await);
        }

        let data = self.read_receipt().await;
        let is_empty = data.as_ref().map(|d| d.is_empty()).unwrap_or(true);
        if is_empty && refresh_policy == ReceiptRefreshPolicy::OnlyIfEmpty {
            debug!("Receipt is empty, refreshing.");
            Some(self.refresh_receipt().await)
        } else {
            data
        }
    }
}

impl ReceiptFetcherImpl {
    pub fn new(request_fetcher: Arc<dyn ReceiptRefreshDatasource>, system_info: SystemInfo) -> Self {
        Self {
            request_fetcher,
            system_info,
        }
    }

    /// Location to read the receipt from, after correcting the watchOS
    /// sandbox quirk.
    pub(crate) fn receipt_path(&self) -> Option<PathBuf> {
        let reported = self.system_info.receipt_url.clone()?;
        if self.system_info.platform == Platform::WatchOs
            && self.system_info.os_version < FIRST_WATCH_OS_VERSION_WITHOUT_RECEIPT_BUG
            && self.system_info.is_sandbox
        {
            if let Some(folder) = reported.parent() {
                return Some(folder.join(PRODUCTION_RECEIPT_FILE_NAME));
            }
        }
        Some(reported)
    }

    async fn read_receipt(&self) -> Option<Vec<u8>> {
        let Some(path) = self.receipt_path() else {
            debug!("No receipt location is available.");
            return None;
        };
        match tokio::fs::read(&path).await {
            Ok(data) => {
                debug!(path = %path.display(), "Loaded receipt.");
                Some(data)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Unable to load receipt.");
                None
            }
        }
    }

    async fn refresh_receipt(&self) -> Vec<u8> {
        self.request_fetcher.refresh_receipt().await;
        match self.read_receipt().await {
            Some(data) if !data.is_empty() => data,
            _ => {
                warn!("Unable to load receipt after refresh.");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Writes `contents` to `path` when asked to refresh, if set.
    struct MockRefresh {
        calls: AtomicUsize,
        write_on_refresh: Option<(PathBuf, Vec<u8>)>,
    }

    impl MockRefresh {
        fn new(write_on_refresh: Option<(PathBuf, Vec<u8>)>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                write_on_refresh,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReceiptRefreshDatasource for MockRefresh {
        async fn refresh_receipt(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((path, contents)) = &self.write_on_refresh {
                tokio::fs::write(path, contents).await.unwrap();
            }
        }
    }

    fn system_info(receipt_url: Option<PathBuf>) -> SystemInfo {
        SystemInfo {
            platform: Platform::Ios,
            os_version: OsVersion::new(17, 0, 0),
            is_sandbox: false,
            receipt_url,
        }
    }

    #[tokio::test]
    async fn only_if_empty_returns_existing_receipt_without_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt");
        std::fs::write(&path, b"receipt").unwrap();
        let refresh = MockRefresh::new(None);
        let fetcher = ReceiptFetcherImpl::new(refresh.clone(), system_info(Some(path)));

        let data = fetcher
            .receipt_data(ReceiptRefreshPolicy::OnlyIfEmpty)
            .await;

        assert_eq!(data, Some(b"receipt".to_vec()));
        assert_eq!(refresh.calls(), 0);
    }

    #[tokio::test]
    async fn only_if_empty_refreshes_missing_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt");
        let refresh = MockRefresh::new(Some((path.clone(), b"fresh".to_vec())));
        let fetcher = ReceiptFetcherImpl::new(refresh.clone(), system_info(Some(path)));

        let data = fetcher
            .receipt_data(ReceiptRefreshPolicy::OnlyIfEmpty)
            .await;

        assert_eq!(data, Some(b"fresh".to_vec()));
        assert_eq!(refresh.calls(), 1);
    }

    #[tokio::test]
    async fn always_refreshes_even_with_receipt_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt");
        std::fs::write(&path, b"stale").unwrap();
        let refresh = MockRefresh::new(Some((path.clone(), b"fresh".to_vec())));
        let fetcher = ReceiptFetcherImpl::new(refresh.clone(), system_info(Some(path)));

        let data = fetcher.receipt_data(ReceiptRefreshPolicy::Always).await;

        assert_eq!(data, Some(b"fresh".to_vec()));
        assert_eq!(refresh.calls(), 1);
    }

    #[tokio::test]
    async fn never_returns_none_without_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = MockRefresh::new(None);
        let fetcher = ReceiptFetcherImpl::new(
            refresh.clone(),
            system_info(Some(dir.path().join("receipt"))),
        );

        assert_eq!(fetcher.receipt_data(ReceiptRefreshPolicy::Never).await, None);
        assert_eq!(refresh.calls(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_yields_empty_data() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = MockRefresh::new(None);
        let fetcher = ReceiptFetcherImpl::new(
            refresh.clone(),
            system_info(Some(dir.path().join("receipt"))),
        );

        let data = fetcher
            .receipt_data(ReceiptRefreshPolicy::OnlyIfEmpty)
            .await;

        assert_eq!(data, Some(Vec::new()));
        assert_eq!(refresh.calls(), 1);
    }

    #[tokio::test]
    async fn old_watch_os_sandbox_reads_sibling_production_receipt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("receipt"), b"actual").unwrap();
        let fetcher = ReceiptFetcherImpl::new(
            MockRefresh::new(None),
            SystemInfo {
                platform: Platform::WatchOs,
                os_version: OsVersion::new(6, 2, 8),
                is_sandbox: true,
                receipt_url: Some(dir.path().join("sandboxReceipt")),
            },
        );

        assert_eq!(fetcher.receipt_path(), Some(dir.path().join("receipt")));
        assert_eq!(
            fetcher.receipt_data(ReceiptRefreshPolicy::Never).await,
            Some(b"actual".to_vec())
        );
    }

    #[test]
    fn receipt_path_is_unchanged_outside_the_quirk() {
        let reported = PathBuf::from("/bundle/StoreKit/sandboxReceipt");
        let cases = [
            (Platform::WatchOs, OsVersion::new(7, 0, 0), true),
            (Platform::WatchOs, OsVersion::new(6, 2, 8), false),
            (Platform::Ios, OsVersion::new(6, 2, 8), true),
        ];
        for (platform, os_version, is_sandbox) in cases {
            let fetcher = ReceiptFetcherImpl::new(
                MockRefresh::new(None),
                SystemInfo {
                    platform,
                    os_version,
                    is_sandbox,
                    receipt_url: Some(reported.clone()),
                },
            );
            assert_eq!(fetcher.receipt_path(), Some(reported.clone()));
        }
    }
}
