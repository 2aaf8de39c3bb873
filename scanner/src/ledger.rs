//! Scan history ledger and derived statistics.
//!
//! The ledger is bounded and ordered most-recent-first. Statistics are never
//! stored; they are recomputed from whatever the ledger currently holds.

use crate::types::{ScanMethod, ScanRecord, ScanRecordId, ScanStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// History length kept by a session unless configured otherwise
pub const DEFAULT_LEDGER_CAPACITY: usize = 50;

/// Number of entries a history view shows by default
pub const RECENT_SCANS_SHOWN: usize = 10;

/// Bounded, append-only history of scan outcomes
#[derive(Debug, Clone)]
pub struct ScanLedger {
    records: VecDeque<ScanRecord>,
    capacity: usize,
    next_id: u64,
}

impl Default for ScanLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }
}

impl ScanLedger {
    /// Create an empty ledger holding at most `capacity` records (minimum 1)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    /// Insert a new record at the head, evicting the oldest beyond capacity.
    ///
    /// Returns the id assigned to the new record.
    pub fn record(
        &mut self,
        ticket_id: impl Into<String>,
        event_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        status: ScanStatus,
        message: impl Into<String>,
        scan_method: ScanMethod,
    ) -> ScanRecordId {
        let id = ScanRecordId::new(self.next_id);
        self.next_id += 1;

        self.records.push_front(ScanRecord {
            id,
            ticket_id: ticket_id.into(),
            event_name: event_name.into(),
            timestamp,
            status,
            message: message.into(),
            scan_method,
        });
        self.records.truncate(self.capacity);

        id
    }

    /// Records, most recent first
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ScanRecord> {
        self.records.iter()
    }

    /// The most recent record
    #[must_use]
    pub fn head(&self) -> Option<&ScanRecord> {
        self.records.front()
    }

    /// Up to `count` most recent records, cloned for display
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<ScanRecord> {
        self.records.iter().take(count).cloned().collect()
    }

    /// Number of records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no attempt has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records held
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Statistics over the current contents
    #[must_use]
    pub fn stats(&self) -> ScanStats {
        ScanStats::from_records(self.records.iter())
    }
}

/// Counts over a ledger snapshot.
///
/// `total == successful + failed == qr + manual` for every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// All records
    pub total: usize,
    /// Admitted
    pub successful: usize,
    /// Denied
    pub failed: usize,
    /// Scanned from a QR code
    pub qr: usize,
    /// Typed in by staff
    pub manual: usize,
}

impl ScanStats {
    /// Recompute the counts from a sequence of records
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ScanRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut stats, record| {
            stats.total += 1;
            match record.status {
                ScanStatus::Success => stats.successful += 1,
                ScanStatus::Failed => stats.failed += 1,
            }
            match record.scan_method {
                ScanMethod::Qr => stats.qr += 1,
                ScanMethod::Manual => stats.manual += 1,
            }
            stats
        })
    }

    /// Fraction of admitted attempts, `None` when nothing was recorded
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // ledger sizes are tiny
    pub fn success_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.successful as f64 / self.total as f64)
    }
}
