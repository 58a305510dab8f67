pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod queue;
pub mod remote;
pub mod reports;
pub mod storage;
pub mod submit;
pub mod sync;

// Re-export commonly used types and functions
pub use config::{get_config, Config};
pub use models::{LocalReport, MutationKind, QueuedMutation, ReportDraft, WorkLine};
pub use queue::MutationQueue;
pub use reports::ReportStore;
pub use submit::{submit_report, SubmitOutcome};
pub use sync::{FlushOutcome, SyncDispatcher};
