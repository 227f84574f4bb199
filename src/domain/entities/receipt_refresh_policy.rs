#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptRefreshPolicy {
    /// Force a remote refresh before reading.
    Always,
    /// Refresh only when the local receipt is missing or empty.
    OnlyIfEmpty,
    /// Return whatever is on disk.
    Never,
}
