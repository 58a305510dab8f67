use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One structured line of work inside a report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkLine {
    /// 1-based position within the report.
    pub line_number: u32,

    /// Component or building part the work was done on.
    pub component: String,

    /// Description of the work performed.
    pub work_done: String,

    pub quantity: f64,

    pub hours: f64,

    /// Site location (room, floor, ...).
    #[serde(default)]
    pub location: String,

    /// Trade/craft the line belongs to.
    #[serde(default)]
    pub trade: String,
}

/// Remote approval state of a report. Approval itself happens server-side;
/// the local store only carries the last known value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Business fields of a work report as entered by the user. The sync core
/// treats these as opaque payload; only the envelope around them matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDraft {
    /// Owning tenant; local listings are scoped by this.
    pub tenant_id: String,

    pub customer: String,

    pub project_number: String,

    #[serde(default)]
    pub project_name: String,

    pub work_location: String,

    /// ISO date (YYYY-MM-DD) the work was performed.
    pub work_date: String,

    pub total_hours: f64,

    #[serde(default)]
    pub work_description: String,

    /// Trade/craft for the whole report.
    #[serde(default)]
    pub trade: String,

    #[serde(default)]
    pub work_lines: Vec<WorkLine>,
}

/// A report as persisted in the local store: the draft plus the local
/// envelope that drives the edit window and sync reconciliation.
///
/// `can_edit` is deliberately not a field here; it is derived against the
/// current clock at read time (see [`crate::reports::ReportStore`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalReport {
    #[serde(flatten)]
    pub data: ReportDraft,

    /// Local primary key, distinct from any backend-assigned id.
    pub local_id: Uuid,

    /// Creation time in ms. Immutable for the life of the record; the sole
    /// basis for edit-window expiry.
    pub created_at: i64,

    /// Bumped on every local edit.
    pub last_modified: i64,

    /// True once a remote write for this report was observed to succeed.
    pub synced: bool,

    /// Backend-assigned id, populated once `synced` is true. Set-once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,

    #[serde(default)]
    pub status: ReportStatus,
}

/// Partial update applied to a report inside the edit window. `None` fields
/// are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportPatch {
    pub customer: Option<String>,
    pub work_location: Option<String>,
    pub work_date: Option<String>,
    pub total_hours: Option<f64>,
    pub work_description: Option<String>,
    pub trade: Option<String>,
    pub work_lines: Option<Vec<WorkLine>>,
}

impl ReportPatch {
    /// Merge this patch into a draft, leaving unset fields alone.
    pub fn apply_to(&self, data: &mut ReportDraft) {
        if let Some(customer) = &self.customer {
            data.customer = customer.clone();
        }
        if let Some(work_location) = &self.work_location {
            data.work_location = work_location.clone();
        }
        if let Some(work_date) = &self.work_date {
            data.work_date = work_date.clone();
        }
        if let Some(total_hours) = self.total_hours {
            data.total_hours = total_hours;
        }
        if let Some(work_description) = &self.work_description {
            data.work_description = work_description.clone();
        }
        if let Some(trade) = &self.trade {
            data.trade = trade.clone();
        }
        if let Some(work_lines) = &self.work_lines {
            data.work_lines = work_lines.clone();
        }
    }
}
