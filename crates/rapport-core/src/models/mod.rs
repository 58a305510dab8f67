pub mod mutation;
pub mod report;

pub use mutation::{MutationKind, QueuedMutation};
pub use report::{LocalReport, ReportDraft, ReportPatch, ReportStatus, WorkLine};
