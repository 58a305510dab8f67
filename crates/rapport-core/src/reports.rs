use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{ReportError, StorageError};
use crate::models::{LocalReport, ReportDraft, ReportPatch, ReportStatus};
use crate::storage::KeyValue;

const REPORTS_KEY: &str = "local_reports";

/// Fixed business rule: a report may be edited for exactly 36 hours after
/// local creation, inclusive boundary.
pub const EDIT_WINDOW_MS: i64 = 36 * 60 * 60 * 1000;

/// Local-first store for user-created reports.
///
/// The local store is authoritative for what the user sees, even before a
/// remote write is confirmed; the remote store is only consulted to confirm
/// acceptance and obtain a remote id. Whether a report also has a mutation
/// sitting in the queue is none of this store's business.
pub struct ReportStore {
    kv: Arc<dyn KeyValue>,
    clock: Arc<dyn Clock>,
}

impl ReportStore {
    pub fn new(kv: Arc<dyn KeyValue>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    /// Persist a new report unconditionally, stamped with the current clock.
    /// Local persistence is never skipped because a remote write is also
    /// being tried in the same logical operation.
    pub fn create(&self, data: ReportDraft) -> Result<LocalReport, StorageError> {
        let now = self.clock.now_ms();
        let report = LocalReport {
            data,
            local_id: Uuid::new_v4(),
            created_at: now,
            last_modified: now,
            synced: false,
            remote_id: None,
            status: ReportStatus::Pending,
        };

        let mut reports = self.load_all()?;
        reports.push(report.clone());
        self.save_all(&reports)?;
        Ok(report)
    }

    pub fn get(&self, local_id: Uuid) -> Result<Option<LocalReport>, StorageError> {
        let reports = self.load_all()?;
        Ok(reports.into_iter().find(|r| r.local_id == local_id))
    }

    /// Merge a partial update into a report. Rejected with
    /// [`ReportError::EditWindowExpired`] once the record is outside its
    /// window; the check lives here, not in the UI.
    pub fn update(&self, local_id: Uuid, patch: &ReportPatch) -> Result<LocalReport, ReportError> {
        let mut reports = self.load_all()?;
        let report = reports
            .iter_mut()
            .find(|r| r.local_id == local_id)
            .ok_or(ReportError::NotFound(local_id))?;

        if !self.within_edit_window(report) {
            return Err(ReportError::EditWindowExpired { local_id });
        }

        patch.apply_to(&mut report.data);
        report.last_modified = self.clock.now_ms();
        let updated = report.clone();
        self.save_all(&reports)?;
        Ok(updated)
    }

    /// Record that a remote write for this report succeeded. Idempotent:
    /// confirming the same remote id twice is a no-op. A different remote id
    /// for an already-synced report is refused; the remote id is set-once.
    pub fn mark_synced(&self, local_id: Uuid, remote_id: &str) -> Result<LocalReport, ReportError> {
        let mut reports = self.load_all()?;
        let report = reports
            .iter_mut()
            .find(|r| r.local_id == local_id)
            .ok_or(ReportError::NotFound(local_id))?;

        if let Some(existing) = &report.remote_id {
            if existing == remote_id {
                return Ok(report.clone());
            }
            return Err(ReportError::RemoteIdConflict {
                local_id,
                existing: existing.clone(),
                incoming: remote_id.to_string(),
            });
        }

        report.synced = true;
        report.remote_id = Some(remote_id.to_string());
        let updated = report.clone();
        self.save_all(&reports)?;
        Ok(updated)
    }

    /// All reports for a tenant, newest first. `can_edit` is never stored;
    /// derive it per record via [`ReportStore::is_editable`] at read time.
    pub fn list_all(&self, tenant_id: Option<&str>) -> Result<Vec<LocalReport>, StorageError> {
        let mut reports = self.load_all()?;
        if let Some(tenant) = tenant_id {
            reports.retain(|r| r.data.tenant_id == tenant);
        }
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    /// Hard removal; there are no tombstones. Returns whether a record was
    /// actually deleted.
    pub fn delete(&self, local_id: Uuid) -> Result<bool, StorageError> {
        let mut reports = self.load_all()?;
        let before = reports.len();
        reports.retain(|r| r.local_id != local_id);
        if reports.len() == before {
            return Ok(false);
        }
        self.save_all(&reports)?;
        Ok(true)
    }

    /// Whether the record is still inside its 36 hour edit window, measured
    /// against the injected clock. Inclusive boundary: a record created
    /// exactly 36 hours ago is still editable.
    pub fn is_editable(&self, report: &LocalReport) -> bool {
        self.within_edit_window(report)
    }

    /// Whole hours of edit time left, floored at zero.
    pub fn remaining_edit_hours(&self, report: &LocalReport) -> i64 {
        let elapsed = self.clock.now_ms() - report.created_at;
        let remaining = EDIT_WINDOW_MS - elapsed;
        (remaining / (60 * 60 * 1000)).max(0)
    }

    fn within_edit_window(&self, report: &LocalReport) -> bool {
        self.clock.now_ms() - report.created_at <= EDIT_WINDOW_MS
    }

    fn load_all(&self) -> Result<Vec<LocalReport>, StorageError> {
        match self.kv.get(REPORTS_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_all(&self, reports: &[LocalReport]) -> Result<(), StorageError> {
        let json = serde_json::to_string(reports)?;
        self.kv.set(REPORTS_KEY, &json)
    }
}
