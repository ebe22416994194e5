pub mod manager;
pub mod model;
pub mod store;

pub use manager::{EditTarget, Phase, SaveError, StepManager, ValidationError};
pub use model::{
    DraftStep, ImageRef, JobAidId, NewProcedure, PersistedProcedure, Precaution, ProcedureId,
    ProcedureUpdate,
};
pub use store::{ImageStore, ProcedureStore, StoreError, UploadError};
