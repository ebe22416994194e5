//! External collaborator interfaces.
//!
//! The step manager talks to the outside world through exactly two traits:
//! an image store (blob → hosted URL) and a procedure CRUD store. Both are
//! async; their calls are the only suspension points in a save. The
//! implementations (HTTP clients in the application shell) are out of
//! scope here — tests substitute recording fakes.

use crate::model::{JobAidId, NewProcedure, PersistedProcedure, ProcedureId, ProcedureUpdate};
use async_trait::async_trait;
use thiserror::Error;

/// Transport or server failure while uploading an image blob.
#[derive(Debug, Clone, Error)]
#[error("image upload failed: {reason}")]
pub struct UploadError {
    pub reason: String,
}

impl UploadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Transport or server failure on a procedure CRUD call.
#[derive(Debug, Clone, Error)]
#[error("procedure store failed: {reason}")]
pub struct StoreError {
    pub reason: String,
}

impl StoreError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Uploads an image blob to hosting, returning the hosted URL.
#[async_trait]
pub trait ImageStore {
    async fn upload(&self, bytes: &[u8], folder: &str) -> Result<String, UploadError>;
}

/// Procedure CRUD collaborator. Only this trait ever assigns procedure ids.
#[async_trait]
pub trait ProcedureStore {
    async fn create(
        &self,
        job_aid: JobAidId,
        procedure: NewProcedure,
    ) -> Result<PersistedProcedure, StoreError>;

    async fn update(
        &self,
        id: ProcedureId,
        fields: ProcedureUpdate,
    ) -> Result<PersistedProcedure, StoreError>;

    async fn delete(&self, id: ProcedureId) -> Result<(), StoreError>;

    async fn list_by_job_aid(&self, job_aid: JobAidId)
        -> Result<Vec<PersistedProcedure>, StoreError>;
}
