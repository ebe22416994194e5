//! Procedure step manager: drafting, editing, and the save sequence.
//!
//! One manager owns the authoring session for one job aid: the local draft
//! list, the edit-one pointer, the chosen source image, and the local
//! mirror of the server's procedure list. A save is a single linear async
//! sequence:
//!
//! ```text
//! validate → rasterize → (upload if embedded) → persist sequentially → refresh
//! ```
//!
//! Each stage fails with its own typed error (see `SaveError`); the only
//! stage that recovers internally is rasterization, which falls back to the
//! unannotated source image. Persistence across multiple draft steps is
//! deliberately *not* all-or-nothing: the loop stops at the first failure,
//! already-persisted steps stay persisted, and the remaining drafts are
//! retained for retry.
//!
//! There is no mid-flight cancellation. The `Saving` phase doubles as the
//! re-entrancy guard: a second `save` while one is in flight (or while a
//! dropped save never resolved) is rejected outright, never queued.

use crate::model::{
    DraftStep, ImageRef, JobAidId, NewProcedure, PersistedProcedure, Precaution, ProcedureId,
    ProcedureUpdate,
};
use crate::store::{ImageStore, ProcedureStore, StoreError, UploadError};
use mk_core::AnnotationSnapshot;
use thiserror::Error;

/// Session phase. `Saving` is entered only by `save` and left on its
/// resolution; failure returns to the phase the save started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Drafting,
    EditingOne,
    Saving,
}

/// Remembered identity of the procedure loaded by `begin_edit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditTarget {
    pub id: ProcedureId,
    /// Original 1-based step index, carried through the update unchanged.
    pub step: u32,
}

/// Locally detected problems; no collaborator call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no parent job aid selected")]
    NoJobAid,
    #[error("no draft steps to save")]
    NoSteps,
    #[error("draft step {index} has a blank instruction")]
    BlankInstruction { index: usize },
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Upload of the flattened image failed; the whole save is aborted and
    /// every draft is retained.
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// The sequential persistence loop stopped at `index` (1-based).
    /// Earlier steps are already persisted and are not rolled back.
    #[error("persisting step {index} failed: {source}")]
    Persistence {
        index: usize,
        #[source]
        source: StoreError,
    },
    /// A save was already in flight; nothing was queued, no call was made.
    #[error("a save is already in progress")]
    ConcurrentSubmission,
    /// All steps persisted, but re-fetching the authoritative list failed.
    /// Drafts are already cleared — the persisted data is safe server-side.
    #[error("post-save refresh failed: {0}")]
    Refresh(#[source] StoreError),
}

pub struct StepManager<U, P> {
    uploads: U,
    store: P,
    phase: Phase,
    job_aid: Option<JobAidId>,
    source_image: Option<ImageRef>,
    drafts: Vec<DraftStep>,
    editing: Option<EditTarget>,
    /// Local mirror of the server list. Every confirmed `create` appends
    /// here, so the next step number is always derived from the true
    /// persisted count; a fully successful save then replaces the whole
    /// list from the server.
    procedures: Vec<PersistedProcedure>,
}

impl<U: ImageStore, P: ProcedureStore> StepManager<U, P> {
    pub fn new(uploads: U, store: P) -> Self {
        Self {
            uploads,
            store,
            phase: Phase::Idle,
            job_aid: None,
            source_image: None,
            drafts: Vec::new(),
            editing: None,
            procedures: Vec::new(),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn drafts(&self) -> &[DraftStep] {
        &self.drafts
    }

    pub fn procedures(&self) -> &[PersistedProcedure] {
        &self.procedures
    }

    pub fn editing(&self) -> Option<EditTarget> {
        self.editing
    }

    // ─── Session context ─────────────────────────────────────────────────

    /// Switch the authoring session to another job aid. Unsaved drafts are
    /// discarded — explicitly, not silently merged into the new context.
    pub fn select_job_aid(&mut self, job_aid: JobAidId) {
        if self.phase == Phase::Saving {
            return;
        }
        if !self.drafts.is_empty() {
            log::info!("discarding {} unsaved draft step(s) on job aid switch", self.drafts.len());
        }
        self.job_aid = Some(job_aid);
        self.drafts.clear();
        self.editing = None;
        self.procedures.clear();
        self.phase = Phase::Idle;
    }

    /// Swap the reference image. Resets in-progress drafts; the caller is
    /// responsible for resetting its editor session alongside.
    pub fn set_source_image(&mut self, image: ImageRef) {
        if self.phase == Phase::Saving {
            return;
        }
        self.source_image = Some(image);
        if !self.drafts.is_empty() {
            log::info!("discarding {} draft step(s) on source image swap", self.drafts.len());
            self.drafts.clear();
            self.editing = None;
            self.phase = Phase::Idle;
        }
    }

    /// Re-fetch the authoritative procedure list.
    pub async fn refresh(&mut self) -> Result<(), StoreError> {
        let Some(job_aid) = self.job_aid else {
            return Ok(());
        };
        self.procedures = self.store.list_by_job_aid(job_aid).await?;
        Ok(())
    }

    // ─── Local draft edits ───────────────────────────────────────────────

    /// Append an empty draft step. Returns its index, or `None` while a
    /// single persisted procedure is being edited or a save is in flight.
    pub fn add_draft_step(&mut self) -> Option<usize> {
        if matches!(self.phase, Phase::EditingOne | Phase::Saving) {
            return None;
        }
        self.drafts.push(DraftStep::default());
        self.phase = Phase::Drafting;
        Some(self.drafts.len() - 1)
    }

    pub fn remove_draft_step(&mut self, index: usize) -> bool {
        if self.phase == Phase::Saving || index >= self.drafts.len() {
            return false;
        }
        self.drafts.remove(index);
        if self.drafts.is_empty() && self.phase == Phase::Drafting {
            self.phase = Phase::Idle;
        }
        true
    }

    pub fn set_step_instruction(&mut self, index: usize, text: impl Into<String>) -> bool {
        match self.drafts.get_mut(index) {
            Some(d) if self.phase != Phase::Saving => {
                d.instruction = text.into();
                true
            }
            _ => false,
        }
    }

    pub fn set_step_description(&mut self, index: usize, text: impl Into<String>) -> bool {
        match self.drafts.get_mut(index) {
            Some(d) if self.phase != Phase::Saving => {
                d.description = text.into();
                true
            }
            _ => false,
        }
    }

    /// Append a blank precaution to a draft step, returning its index.
    pub fn add_precaution(&mut self, step: usize) -> Option<usize> {
        if self.phase == Phase::Saving {
            return None;
        }
        let draft = self.drafts.get_mut(step)?;
        draft.precautions.push(Precaution::blank());
        Some(draft.precautions.len() - 1)
    }

    pub fn update_precaution(&mut self, step: usize, idx: usize, text: impl Into<String>) -> bool {
        if self.phase == Phase::Saving {
            return false;
        }
        match self.drafts.get_mut(step).and_then(|d| d.precautions.get_mut(idx)) {
            Some(p) => {
                p.instruction = text.into();
                true
            }
            None => false,
        }
    }

    pub fn remove_precaution(&mut self, step: usize, idx: usize) -> bool {
        if self.phase == Phase::Saving {
            return false;
        }
        match self.drafts.get_mut(step) {
            Some(d) if idx < d.precautions.len() => {
                d.precautions.remove(idx);
                true
            }
            _ => false,
        }
    }

    /// Drop all drafts and the edit pointer without saving.
    pub fn cancel(&mut self) {
        if self.phase == Phase::Saving {
            return;
        }
        self.drafts.clear();
        self.editing = None;
        self.phase = Phase::Idle;
    }

    // ─── Edit-one mode ───────────────────────────────────────────────────

    /// Load one mirrored procedure into a single draft for revision.
    /// Remembers the id and original step index for the later `update`.
    pub fn begin_edit(&mut self, id: ProcedureId) -> bool {
        if self.phase == Phase::Saving {
            return false;
        }
        let Some(p) = self.procedures.iter().find(|p| p.id == id) else {
            return false;
        };
        self.drafts = vec![DraftStep {
            instruction: p.instruction.clone(),
            image: Some(p.image.clone()),
            description: p.title.clone(),
            precautions: p.precautions.clone(),
        }];
        self.editing = Some(EditTarget { id: p.id, step: p.step });
        self.phase = Phase::EditingOne;
        true
    }

    // ─── Save ────────────────────────────────────────────────────────────

    /// Persist the draft list (or the single edited procedure).
    ///
    /// `snapshot` is the editor's current annotation snapshot; pass `None`
    /// when the reference image carries no annotations. Flattening needs
    /// the raw source bytes, so a snapshot is only honored when the source
    /// image is `ImageRef::Embedded`; against a `Hosted` source the URL is
    /// passed through unchanged.
    pub async fn save(&mut self, snapshot: Option<&AnnotationSnapshot>) -> Result<(), SaveError> {
        let job_aid = self.job_aid.ok_or(ValidationError::NoJobAid)?;
        if self.drafts.is_empty() {
            return Err(ValidationError::NoSteps.into());
        }
        if let Some(index) = self.drafts.iter().position(|d| d.instruction.trim().is_empty()) {
            return Err(ValidationError::BlankInstruction { index: index + 1 }.into());
        }
        if self.phase == Phase::Saving {
            return Err(SaveError::ConcurrentSubmission);
        }

        let resume = if self.editing.is_some() {
            Phase::EditingOne
        } else {
            Phase::Drafting
        };
        self.phase = Phase::Saving;

        // Stage 1+2: rasterize, then upload if the result is an embedded
        // blob. Rasterization always completes before any upload; upload
        // always completes before any persistence call.
        let save_image = match self.prepare_image(job_aid, snapshot).await {
            Ok(url) => url,
            Err(err) => {
                self.phase = resume;
                return Err(SaveError::Upload(err));
            }
        };

        // Stage 3: persistence.
        if let Some(target) = self.editing {
            let draft = &self.drafts[0];
            let fields = ProcedureUpdate {
                title: draft.description.clone(),
                step: target.step,
                instruction: draft.instruction.clone(),
                image: effective_image(&save_image, draft),
                precautions: draft.effective_precautions(),
            };
            if let Err(err) = self.store.update(target.id, fields).await {
                self.phase = Phase::EditingOne;
                return Err(SaveError::Persistence { index: 1, source: err });
            }
        } else {
            let base = self.procedures.len() as u32;
            let total = self.drafts.len();
            for i in 0..total {
                let draft = &self.drafts[i];
                let payload = NewProcedure {
                    title: draft.description.clone(),
                    step: base + i as u32 + 1,
                    instruction: draft.instruction.clone(),
                    image: effective_image(&save_image, draft),
                    precautions: draft.effective_precautions(),
                };
                log::debug!("persisting step {}/{total} as #{}", i + 1, payload.step);
                match self.store.create(job_aid, payload).await {
                    // Mirror each persisted procedure immediately, so a
                    // retry after a partial failure numbers its steps from
                    // the true persisted count.
                    Ok(persisted) => self.procedures.push(persisted),
                    Err(err) => {
                        // Already-persisted steps leave the draft list; the
                        // failing step and everything after it stay for retry.
                        self.drafts.drain(..i);
                        self.phase = Phase::Drafting;
                        return Err(SaveError::Persistence { index: i + 1, source: err });
                    }
                }
            }
        }

        // Stage 4: the server is the single source of truth — re-fetch
        // rather than merging locally.
        self.drafts.clear();
        self.editing = None;
        match self.store.list_by_job_aid(job_aid).await {
            Ok(list) => self.procedures = list,
            Err(err) => {
                self.phase = Phase::Idle;
                return Err(SaveError::Refresh(err));
            }
        }
        self.phase = Phase::Idle;
        Ok(())
    }

    /// Flatten the source image against `snapshot` and host the result.
    /// Returns the hosted URL to stamp onto payloads, or `None` when the
    /// session has no source image at all.
    async fn prepare_image(
        &self,
        job_aid: JobAidId,
        snapshot: Option<&AnnotationSnapshot>,
    ) -> Result<Option<String>, UploadError> {
        let flattened = match (&self.source_image, snapshot) {
            (Some(ImageRef::Embedded(bytes)), Some(snap)) => {
                match mk_render::rasterize(bytes, snap) {
                    Ok(png) => ImageRef::Embedded(png),
                    Err(err) => {
                        // Rasterization failure must never block a save.
                        log::warn!("rasterization failed ({err}); saving unannotated source");
                        ImageRef::Embedded(bytes.clone())
                    }
                }
            }
            (Some(ImageRef::Hosted(url)), snap) => {
                // No local bytes to flatten against; the ref is passed
                // through as-is.
                if snap.is_some_and(|s| !s.markers.is_empty()) {
                    log::warn!("hosted source image carries no bytes; annotations not flattened");
                }
                ImageRef::Hosted(url.clone())
            }
            (Some(image), _) => image.clone(),
            (None, _) => return Ok(None),
        };

        match flattened {
            ImageRef::Hosted(url) => Ok(Some(url)),
            ImageRef::Embedded(bytes) => {
                let folder = format!("job-aids/{}", job_aid.0);
                let url = self.uploads.upload(&bytes, &folder).await?;
                Ok(Some(url))
            }
        }
    }

    /// Delete one persisted procedure; the mirror entry is removed only
    /// after the collaborator confirms.
    pub async fn delete_step(&mut self, id: ProcedureId) -> Result<(), StoreError> {
        self.store.delete(id).await?;
        self.procedures.retain(|p| p.id != id);
        Ok(())
    }
}

/// The save-level flattened image wins; a draft's own hosted image is the
/// fallback (edit-one keeps the original image when nothing was redrawn).
fn effective_image(save_image: &Option<String>, draft: &DraftStep) -> String {
    save_image
        .clone()
        .or_else(|| draft.image.clone())
        .unwrap_or_default()
}
