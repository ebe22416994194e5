//! Integration tests: the save orchestration (mk-sync).
//!
//! Substitutes recording fakes for the upload and CRUD collaborators and
//! drives `StepManager` through the draft → save → refresh sequence,
//! including partial persistence failure, upload gating, re-entrancy, and
//! edit-one mode.

use mk_core::{AnnotationDocument, Geometry, KindId, Point, Size};
use mk_sync::{
    ImageRef, ImageStore, JobAidId, NewProcedure, PersistedProcedure, Phase, Precaution,
    ProcedureId, ProcedureStore, ProcedureUpdate, SaveError, StepManager, StoreError, UploadError,
    ValidationError,
};
use std::sync::{Arc, Mutex};

const JOB_AID: JobAidId = JobAidId(42);

// ─── Recording fakes ─────────────────────────────────────────────────────

/// Shared chronological event log, to assert cross-collaborator ordering.
type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Default)]
struct FakeUploader {
    events: EventLog,
    uploads: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: bool,
}

#[async_trait::async_trait]
impl ImageStore for FakeUploader {
    async fn upload(&self, bytes: &[u8], folder: &str) -> Result<String, UploadError> {
        self.events.lock().unwrap().push("upload".into());
        if self.fail {
            return Err(UploadError::new("503 from host"));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(bytes.to_vec());
        Ok(format!("https://img.example/{folder}/{}", uploads.len()))
    }
}

#[derive(Clone, Default)]
struct FakeStore {
    events: EventLog,
    server: Arc<Mutex<Vec<PersistedProcedure>>>,
    creates: Arc<Mutex<Vec<NewProcedure>>>,
    updates: Arc<Mutex<Vec<(ProcedureId, ProcedureUpdate)>>>,
    /// 1-based create call number that fails, if any.
    fail_create_at: Option<usize>,
    fail_delete: bool,
}

#[async_trait::async_trait]
impl ProcedureStore for FakeStore {
    async fn create(
        &self,
        _job_aid: JobAidId,
        procedure: NewProcedure,
    ) -> Result<PersistedProcedure, StoreError> {
        self.events.lock().unwrap().push("create".into());
        let mut creates = self.creates.lock().unwrap();
        creates.push(procedure.clone());
        if self.fail_create_at == Some(creates.len()) {
            return Err(StoreError::new("500 on create"));
        }
        let persisted = PersistedProcedure {
            id: ProcedureId(1000 + creates.len() as u64),
            step: procedure.step,
            title: procedure.title,
            instruction: procedure.instruction,
            image: procedure.image,
            precautions: procedure.precautions,
        };
        self.server.lock().unwrap().push(persisted.clone());
        Ok(persisted)
    }

    async fn update(
        &self,
        id: ProcedureId,
        fields: ProcedureUpdate,
    ) -> Result<PersistedProcedure, StoreError> {
        self.events.lock().unwrap().push("update".into());
        self.updates.lock().unwrap().push((id, fields.clone()));
        let mut server = self.server.lock().unwrap();
        let entry = server
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::new("unknown procedure"))?;
        entry.title = fields.title;
        entry.step = fields.step;
        entry.instruction = fields.instruction;
        entry.image = fields.image;
        entry.precautions = fields.precautions;
        Ok(entry.clone())
    }

    async fn delete(&self, id: ProcedureId) -> Result<(), StoreError> {
        self.events.lock().unwrap().push("delete".into());
        if self.fail_delete {
            return Err(StoreError::new("500 on delete"));
        }
        self.server.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }

    async fn list_by_job_aid(
        &self,
        _job_aid: JobAidId,
    ) -> Result<Vec<PersistedProcedure>, StoreError> {
        self.events.lock().unwrap().push("list".into());
        Ok(self.server.lock().unwrap().clone())
    }
}

fn init_test_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fakes() -> (FakeUploader, FakeStore) {
    init_test_logs();
    let events: EventLog = Arc::default();
    let uploader = FakeUploader {
        events: events.clone(),
        ..Default::default()
    };
    let store = FakeStore {
        events,
        ..Default::default()
    };
    (uploader, store)
}

fn manager_with_drafts(
    uploader: FakeUploader,
    store: FakeStore,
    instructions: &[&str],
) -> StepManager<FakeUploader, FakeStore> {
    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    for text in instructions {
        let i = mgr.add_draft_step().unwrap();
        mgr.set_step_instruction(i, *text);
    }
    mgr
}

/// A tiny valid PNG plus a snapshot with one rectangle marker.
fn png_and_snapshot() -> (Vec<u8>, mk_core::AnnotationSnapshot) {
    let img = image::RgbaImage::from_pixel(16, 16, image::Rgba([200, 200, 200, 255]));
    let mut png = Vec::new();
    image::ImageEncoder::write_image(
        image::codecs::png::PngEncoder::new(&mut png),
        img.as_raw(),
        16,
        16,
        image::ExtendedColorType::Rgba8,
    )
    .unwrap();

    let mut doc = AnnotationDocument::new();
    doc.create_marker(
        KindId::intern("rectangle"),
        Geometry::Rect {
            origin: Point::new(2.0, 2.0),
            size: Size::new(8.0, 6.0),
        },
    );
    (png, doc.snapshot())
}

// ─── Validation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn save_without_job_aid_is_rejected_locally() {
    let (uploader, store) = fakes();
    let events = store.events.clone();
    let mut mgr = StepManager::new(uploader, store);
    mgr.add_draft_step();
    mgr.set_step_instruction(0, "step");

    let err = mgr.save(None).await.unwrap_err();
    assert!(matches!(
        err,
        SaveError::Validation(ValidationError::NoJobAid)
    ));
    assert!(events.lock().unwrap().is_empty(), "no network call expected");
}

#[tokio::test]
async fn save_with_zero_drafts_is_rejected_locally() {
    let (uploader, store) = fakes();
    let events = store.events.clone();
    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);

    let err = mgr.save(None).await.unwrap_err();
    assert!(matches!(err, SaveError::Validation(ValidationError::NoSteps)));
    assert!(events.lock().unwrap().is_empty());
}

// ─── Sequential persistence & partial failure ────────────────────────────

#[tokio::test]
async fn full_success_clears_drafts_and_refreshes_mirror() {
    let (uploader, store) = fakes();
    let mut mgr = manager_with_drafts(uploader, store, &["one", "two"]);

    mgr.save(None).await.unwrap();
    assert_eq!(mgr.phase(), Phase::Idle);
    assert!(mgr.drafts().is_empty());
    assert_eq!(mgr.procedures().len(), 2);
    assert_eq!(mgr.procedures()[0].step, 1);
    assert_eq!(mgr.procedures()[1].step, 2);
}

#[tokio::test]
async fn steps_are_numbered_after_existing_procedures() {
    let (uploader, store) = fakes();
    let creates = store.creates.clone();
    let mut mgr = manager_with_drafts(uploader, store, &["first batch"]);
    mgr.save(None).await.unwrap();

    // Second batch lands after the persisted count.
    let i = mgr.add_draft_step().unwrap();
    mgr.set_step_instruction(i, "second batch");
    mgr.save(None).await.unwrap();

    let steps: Vec<u32> = creates.lock().unwrap().iter().map(|c| c.step).collect();
    assert_eq!(steps, vec![1, 2]);
}

#[tokio::test]
async fn create_failure_mid_batch_keeps_unpersisted_drafts() {
    let (uploader, mut store) = fakes();
    store.fail_create_at = Some(2);
    let server = store.server.clone();
    let mut mgr = manager_with_drafts(uploader, store, &["one", "two", "three"]);

    let err = mgr.save(None).await.unwrap_err();
    match err {
        SaveError::Persistence { index, .. } => assert_eq!(index, 2),
        other => panic!("expected Persistence, got {other:?}"),
    }

    // Step 1 persisted and not rolled back; steps 2 and 3 still drafted.
    assert_eq!(server.lock().unwrap().len(), 1);
    assert_eq!(mgr.drafts().len(), 2);
    assert_eq!(mgr.drafts()[0].instruction, "two");
    assert_eq!(mgr.drafts()[1].instruction, "three");
    assert_eq!(mgr.phase(), Phase::Drafting);
}

#[tokio::test]
async fn retry_after_partial_failure_keeps_step_numbers_dense() {
    let (uploader, mut store) = fakes();
    store.fail_create_at = Some(2);
    let server = store.server.clone();
    let mut mgr = manager_with_drafts(uploader, store, &["one", "two", "three"]);

    assert!(mgr.save(None).await.is_err());
    // The persisted step is already mirrored, not waiting on a refresh.
    assert_eq!(mgr.procedures().len(), 1);

    // fail_create_at counts total create calls; call 2 was the failure, so
    // the retry's calls go through.
    mgr.save(None).await.unwrap();

    let steps: Vec<u32> = server.lock().unwrap().iter().map(|p| p.step).collect();
    assert_eq!(steps, vec![1, 2, 3], "steps must stay dense and monotonic");
    assert!(mgr.drafts().is_empty());
    assert_eq!(mgr.phase(), Phase::Idle);
}

// ─── Upload gating ───────────────────────────────────────────────────────

#[tokio::test]
async fn embedded_image_uploads_exactly_once_before_create() {
    let (uploader, store) = fakes();
    let events = store.events.clone();
    let upload_log = uploader.uploads.clone();
    let (png, snapshot) = png_and_snapshot();

    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    mgr.set_source_image(ImageRef::Embedded(png));
    for text in ["one", "two"] {
        let i = mgr.add_draft_step().unwrap();
        mgr.set_step_instruction(i, text);
    }

    mgr.save(Some(&snapshot)).await.unwrap();

    assert_eq!(upload_log.lock().unwrap().len(), 1);
    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec!["upload", "create", "create", "list"],
        "upload must strictly precede persistence"
    );
}

#[tokio::test]
async fn hosted_image_skips_upload() {
    let (uploader, store) = fakes();
    let events = store.events.clone();
    let creates = store.creates.clone();

    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    mgr.set_source_image(ImageRef::Hosted("https://img.example/ref.png".into()));
    let i = mgr.add_draft_step().unwrap();
    mgr.set_step_instruction(i, "inspect the valve");

    mgr.save(None).await.unwrap();

    assert!(!events.lock().unwrap().iter().any(|e| e == "upload"));
    assert_eq!(creates.lock().unwrap()[0].image, "https://img.example/ref.png");
}

#[tokio::test]
async fn hosted_source_with_annotations_passes_url_through() {
    let (uploader, store) = fakes();
    let events = store.events.clone();
    let creates = store.creates.clone();
    let (_, snapshot) = png_and_snapshot();

    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    mgr.set_source_image(ImageRef::Hosted("https://img.example/ref.png".into()));
    let i = mgr.add_draft_step().unwrap();
    mgr.set_step_instruction(i, "inspect the valve");

    // Nothing to flatten against a hosted ref; the save still completes
    // with the original URL and no upload.
    mgr.save(Some(&snapshot)).await.unwrap();

    assert!(!events.lock().unwrap().iter().any(|e| e == "upload"));
    assert_eq!(creates.lock().unwrap()[0].image, "https://img.example/ref.png");
}

#[tokio::test]
async fn upload_failure_aborts_save_and_keeps_drafts() {
    let (mut uploader, store) = fakes();
    uploader.fail = true;
    let creates = store.creates.clone();
    let (png, snapshot) = png_and_snapshot();

    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    mgr.set_source_image(ImageRef::Embedded(png));
    let i = mgr.add_draft_step().unwrap();
    mgr.set_step_instruction(i, "step");

    let err = mgr.save(Some(&snapshot)).await.unwrap_err();
    assert!(matches!(err, SaveError::Upload(_)));
    assert!(creates.lock().unwrap().is_empty(), "no persistence attempted");
    assert_eq!(mgr.drafts().len(), 1);
    assert_eq!(mgr.phase(), Phase::Drafting);
}

#[tokio::test]
async fn render_failure_falls_back_to_unannotated_source() {
    let (uploader, store) = fakes();
    let upload_log = uploader.uploads.clone();
    let (_, snapshot) = png_and_snapshot();
    let garbage = b"definitely not a png".to_vec();

    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    mgr.set_source_image(ImageRef::Embedded(garbage.clone()));
    let i = mgr.add_draft_step().unwrap();
    mgr.set_step_instruction(i, "step");

    // Rasterization fails (undecodable source) but the save still goes
    // through with the raw source bytes.
    mgr.save(Some(&snapshot)).await.unwrap();
    assert_eq!(*upload_log.lock().unwrap(), vec![garbage]);
}

// ─── Re-entrancy guard ───────────────────────────────────────────────────

/// CRUD store whose `create` never resolves, to hold a save in flight.
#[derive(Clone, Default)]
struct StalledStore {
    creates_started: Arc<Mutex<usize>>,
}

#[async_trait::async_trait]
impl ProcedureStore for StalledStore {
    async fn create(
        &self,
        _job_aid: JobAidId,
        _procedure: NewProcedure,
    ) -> Result<PersistedProcedure, StoreError> {
        *self.creates_started.lock().unwrap() += 1;
        std::future::pending().await
    }

    async fn update(
        &self,
        _id: ProcedureId,
        _fields: ProcedureUpdate,
    ) -> Result<PersistedProcedure, StoreError> {
        std::future::pending().await
    }

    async fn delete(&self, _id: ProcedureId) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn list_by_job_aid(
        &self,
        _job_aid: JobAidId,
    ) -> Result<Vec<PersistedProcedure>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn second_save_while_in_flight_is_rejected_with_no_calls() {
    use std::future::Future;
    use std::task::{Context, Waker};

    let uploader = FakeUploader::default();
    let upload_count = uploader.uploads.clone();
    let store = StalledStore::default();
    let creates_started = store.creates_started.clone();

    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    let i = mgr.add_draft_step().unwrap();
    mgr.set_step_instruction(i, "step");

    // Drive the first save until it suspends inside `create`, then drop the
    // future: there is no cancellation, so the manager stays in Saving.
    {
        let mut fut = std::pin::pin!(mgr.save(None));
        let mut cx = Context::from_waker(Waker::noop());
        assert!(fut.as_mut().poll(&mut cx).is_pending());
    }
    assert_eq!(mgr.phase(), Phase::Saving);
    assert_eq!(*creates_started.lock().unwrap(), 1);

    let err = mgr.save(None).await.unwrap_err();
    assert!(matches!(err, SaveError::ConcurrentSubmission));
    assert_eq!(*creates_started.lock().unwrap(), 1, "no extra create");
    assert!(upload_count.lock().unwrap().is_empty(), "no extra upload");
}

// ─── Edit-one mode ───────────────────────────────────────────────────────

fn seeded_store(events: EventLog) -> FakeStore {
    let store = FakeStore {
        events,
        ..Default::default()
    };
    store.server.lock().unwrap().push(PersistedProcedure {
        id: ProcedureId(7),
        step: 3,
        title: "Check seals".into(),
        instruction: "inspect the gasket".into(),
        image: "https://img.example/gasket.png".into(),
        precautions: vec![Precaution {
            id: Some(1),
            instruction: "depressurize first".into(),
        }],
    });
    store
}

#[tokio::test]
async fn begin_edit_then_save_issues_exactly_one_update() {
    let events: EventLog = Arc::default();
    let uploader = FakeUploader {
        events: events.clone(),
        ..Default::default()
    };
    let store = seeded_store(events.clone());
    let creates = store.creates.clone();
    let updates = store.updates.clone();

    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    mgr.refresh().await.unwrap();

    assert!(mgr.begin_edit(ProcedureId(7)));
    assert_eq!(mgr.phase(), Phase::EditingOne);
    mgr.set_step_instruction(0, "inspect and replace the gasket");

    mgr.save(None).await.unwrap();

    assert!(creates.lock().unwrap().is_empty(), "never a create");
    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    let (id, fields) = &updates[0];
    assert_eq!(*id, ProcedureId(7));
    assert_eq!(fields.step, 3, "original step index preserved");
    assert_eq!(fields.instruction, "inspect and replace the gasket");
    // No re-render happened, so the original hosted image is carried over.
    assert_eq!(fields.image, "https://img.example/gasket.png");
    assert_eq!(mgr.phase(), Phase::Idle);
    assert!(mgr.editing().is_none());
}

#[tokio::test]
async fn blank_precautions_never_reach_the_payload() {
    let (uploader, store) = fakes();
    let creates = store.creates.clone();
    let mut mgr = manager_with_drafts(uploader, store, &["torque the flange"]);

    mgr.add_precaution(0);
    mgr.add_precaution(0);
    mgr.add_precaution(0);
    mgr.update_precaution(0, 1, "wear eye protection");

    mgr.save(None).await.unwrap();

    let creates = creates.lock().unwrap();
    assert_eq!(creates[0].precautions.len(), 1);
    assert_eq!(creates[0].precautions[0].instruction, "wear eye protection");
}

// ─── Delete & session context ────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_mirror_entry_on_success_only() {
    let events: EventLog = Arc::default();
    let uploader = FakeUploader::default();
    let mut store = seeded_store(events);
    store.fail_delete = true;

    let mut mgr = StepManager::new(uploader, store);
    mgr.select_job_aid(JOB_AID);
    mgr.refresh().await.unwrap();
    assert_eq!(mgr.procedures().len(), 1);

    assert!(mgr.delete_step(ProcedureId(7)).await.is_err());
    assert_eq!(mgr.procedures().len(), 1, "mirror untouched on failure");
}

#[tokio::test]
async fn switching_job_aids_discards_unsaved_drafts() {
    let (uploader, store) = fakes();
    let mut mgr = manager_with_drafts(uploader, store, &["draft"]);
    assert_eq!(mgr.drafts().len(), 1);

    mgr.select_job_aid(JobAidId(43));
    assert!(mgr.drafts().is_empty());
    assert_eq!(mgr.phase(), Phase::Idle);
}

#[tokio::test]
async fn swapping_source_image_resets_in_progress_drafts() {
    let (uploader, store) = fakes();
    let mut mgr = manager_with_drafts(uploader, store, &["draft"]);

    mgr.set_source_image(ImageRef::Hosted("https://img.example/other.png".into()));
    assert!(mgr.drafts().is_empty());
    assert_eq!(mgr.phase(), Phase::Idle);
}
