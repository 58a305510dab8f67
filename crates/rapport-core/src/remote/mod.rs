use async_trait::async_trait;
use serde_json::Value;

pub mod http;

pub use http::{HttpBackend, HttpProbe};

use crate::error::RemoteError;
use crate::models::MutationKind;

/// Port to the remote document backend: one write call per mutation kind,
/// each returning the backend-assigned id. Implementations must bound their
/// own timeouts so a hung call cannot stall a flush pass.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn create_time_entry(&self, payload: &Value) -> Result<String, RemoteError>;
    async fn update_task_status(&self, payload: &Value) -> Result<String, RemoteError>;
    async fn add_note(&self, payload: &Value) -> Result<String, RemoteError>;
    async fn create_photo_record(&self, payload: &Value) -> Result<String, RemoteError>;
    async fn create_day_report(&self, payload: &Value) -> Result<String, RemoteError>;
    async fn create_project_report(&self, payload: &Value) -> Result<String, RemoteError>;
}

/// Network-state probe consulted before a flush pass.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// The dispatch table: map a mutation kind to its remote write. Adding a
/// mutation kind means adding exactly one arm here.
pub async fn dispatch(
    backend: &dyn RemoteBackend,
    kind: MutationKind,
    payload: &Value,
) -> Result<String, RemoteError> {
    match kind {
        MutationKind::CreateTimeEntry => backend.create_time_entry(payload).await,
        MutationKind::UpdateTaskStatus => backend.update_task_status(payload).await,
        MutationKind::AddNote => backend.add_note(payload).await,
        MutationKind::CreatePhotoRecord => backend.create_photo_record(payload).await,
        MutationKind::CreateDayReport => backend.create_day_report(payload).await,
        MutationKind::CreateProjectReport => backend.create_project_report(payload).await,
    }
}
