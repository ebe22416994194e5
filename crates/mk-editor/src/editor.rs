//! Editor session state machine.
//!
//! One `EditorSession` is constructed per mounted editing surface and owns
//! that surface's document, history, mode, and zoom. It is passed by
//! reference into panels and the step manager — no ambient globals.
//!
//! Mode transitions:
//!
//! ```text
//! Select ⇄ Create(kind)          choose a kind / place or re-select
//! any    → Rendering → Select    bracketing an export
//! ```
//!
//! Placing a marker snaps straight back to `Select` with the new marker
//! selected; create mode is not sticky. `Rendering` refuses all edits.
//! Zoom is a pure view transform — it never touches the document or the
//! history.

use crate::history::History;
use mk_core::{AnnotationDocument, AnnotationSnapshot, Geometry, KindId, MarkerId};

pub const ZOOM_STEP: f32 = 0.1;
pub const ZOOM_FLOOR: f32 = 0.2;

/// Current interaction mode. Mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditorMode {
    Select,
    /// A kind has been chosen; the next placement gesture materializes it.
    Create(KindId),
    /// Transient while an export is running; always returns to `Select`.
    Rendering,
}

/// Derived view of the session for surfaces to bind against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditorState {
    pub mode: EditorMode,
    pub can_undo: bool,
    pub can_redo: bool,
    pub can_delete: bool,
}

pub struct EditorSession {
    pub document: AnnotationDocument,
    pub history: History,
    mode: EditorMode,
    zoom: f32,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    pub fn new() -> Self {
        Self {
            document: AnnotationDocument::new(),
            history: History::new(),
            mode: EditorMode::Select,
            zoom: 1.0,
        }
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn state(&self) -> EditorState {
        EditorState {
            mode: self.mode,
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            can_delete: !self.document.selection().is_empty(),
        }
    }

    fn editing_locked(&self) -> bool {
        self.mode == EditorMode::Rendering
    }

    // ─── Mode transitions ────────────────────────────────────────────────

    /// Back to select mode, dropping any pending marker kind.
    pub fn activate_select(&mut self) {
        if !self.editing_locked() {
            self.mode = EditorMode::Select;
        }
    }

    /// Arm create mode for `kind`. Rejected for unknown kinds and while
    /// rendering.
    pub fn choose_kind(&mut self, kind: KindId) -> bool {
        if self.editing_locked() {
            return false;
        }
        if mk_core::registry::lookup(kind).is_none() {
            log::warn!("unknown marker kind {kind}");
            return false;
        }
        self.mode = EditorMode::Create(kind);
        true
    }

    /// Materialize the pending kind at `geometry`. Legal only in create
    /// mode. The new marker becomes the selection and the session snaps
    /// back to `Select`.
    pub fn place_marker(&mut self, geometry: Geometry) -> Option<MarkerId> {
        let EditorMode::Create(kind) = self.mode else {
            return None;
        };
        let pre = self.document.snapshot();
        let id = self.document.create_marker(kind, geometry)?;
        self.history.record(pre);
        self.mode = EditorMode::Select;
        Some(id)
    }

    // ─── Selection & deletion ────────────────────────────────────────────

    pub fn select_markers(&mut self, ids: &[MarkerId]) {
        if !self.editing_locked() {
            self.document.set_selection(ids);
        }
    }

    pub fn clear_selection(&mut self) {
        if !self.editing_locked() {
            self.document.clear_selection();
        }
    }

    /// Delete the current selection. A no-op on an empty selection — no
    /// spurious history entry is pushed.
    pub fn delete_selection(&mut self) -> bool {
        if self.editing_locked() || self.document.selection().is_empty() {
            return false;
        }
        let pre = self.document.snapshot();
        let ids: Vec<MarkerId> = self.document.selection().iter().copied().collect();
        let removed = self.document.delete_markers(&ids);
        if removed == 0 {
            return false;
        }
        self.history.record(pre);
        true
    }

    // ─── Undo / redo ─────────────────────────────────────────────────────

    /// Never an error: returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        if self.editing_locked() {
            return false;
        }
        match self.history.undo(self.document.snapshot()) {
            Some(snapshot) => {
                self.document.restore(&snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.editing_locked() {
            return false;
        }
        match self.history.redo(self.document.snapshot()) {
            Some(snapshot) => {
                self.document.restore(&snapshot);
                true
            }
            None => false,
        }
    }

    // ─── Patch commit (used by panels) ───────────────────────────────────

    /// Apply a patch to one marker, recording history on success.
    pub(crate) fn commit_patch(&mut self, id: MarkerId, patch: mk_core::MarkerPatch) -> bool {
        if self.editing_locked() {
            return false;
        }
        let pre = self.document.snapshot();
        if self.document.update_marker(id, patch) {
            self.history.record(pre);
            true
        } else {
            false
        }
    }

    // ─── Zoom ────────────────────────────────────────────────────────────

    pub fn zoom_in(&mut self) {
        self.zoom += ZOOM_STEP;
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom - ZOOM_STEP).max(ZOOM_FLOOR);
    }

    pub fn zoom_reset(&mut self) {
        self.zoom = 1.0;
    }

    // ─── Rendering bracket & save ────────────────────────────────────────

    /// Enter the transient rendering mode (disables edits). Returns false
    /// if an export is already in progress.
    pub fn begin_render(&mut self) -> bool {
        if self.mode == EditorMode::Rendering {
            return false;
        }
        self.mode = EditorMode::Rendering;
        true
    }

    /// Leave rendering mode; always lands in `Select`.
    pub fn finish_render(&mut self) {
        self.mode = EditorMode::Select;
    }

    /// Download/export: flatten the current document over `source_png`.
    /// Brackets the transient `Rendering` mode for its duration, then
    /// lands back in `Select`. The output depends only on the source
    /// bytes and the current snapshot, never on zoom.
    pub fn export_png(&mut self, source_png: &[u8]) -> Result<Vec<u8>, mk_render::RenderError> {
        self.begin_render();
        let result = mk_render::rasterize(source_png, &self.document.snapshot());
        self.finish_render();
        result
    }

    /// Emit the current snapshot for the caller (the step manager).
    /// Does not alter the mode.
    pub fn save_snapshot(&self) -> AnnotationSnapshot {
        self.document.snapshot()
    }

    /// Reset document + history for a newly chosen source image.
    pub fn reset_for_new_source(&mut self) {
        self.document = AnnotationDocument::new();
        self.history = History::new();
        self.mode = EditorMode::Select;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mk_core::{Point, Size};

    fn rect_geom() -> Geometry {
        Geometry::Rect {
            origin: Point::new(5.0, 5.0),
            size: Size::new(20.0, 10.0),
        }
    }

    #[test]
    fn place_snaps_back_to_select() {
        let mut s = EditorSession::new();
        assert!(s.choose_kind(KindId::intern("rectangle")));
        let id = s.place_marker(rect_geom()).unwrap();
        assert_eq!(s.mode(), EditorMode::Select);
        assert_eq!(s.document.selection().as_slice(), &[id]);
    }

    #[test]
    fn place_outside_create_mode_is_rejected() {
        let mut s = EditorSession::new();
        assert!(s.place_marker(rect_geom()).is_none());
        assert!(!s.history.can_undo());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut s = EditorSession::new();
        assert!(!s.choose_kind(KindId::intern("hologram")));
        assert_eq!(s.mode(), EditorMode::Select);
    }

    #[test]
    fn delete_on_empty_selection_pushes_nothing() {
        let mut s = EditorSession::new();
        assert!(!s.delete_selection());
        assert!(!s.state().can_undo);
    }

    #[test]
    fn zoom_clamps_at_floor_and_resets() {
        let mut s = EditorSession::new();
        for _ in 0..20 {
            s.zoom_out();
        }
        assert!((s.zoom() - ZOOM_FLOOR).abs() < f32::EPSILON);
        s.zoom_reset();
        assert!((s.zoom() - 1.0).abs() < f32::EPSILON);
        s.zoom_in();
        assert!((s.zoom() - 1.1).abs() < 1e-6);
    }

    #[test]
    fn rendering_mode_locks_edits() {
        let mut s = EditorSession::new();
        s.choose_kind(KindId::intern("rectangle"));
        s.place_marker(rect_geom());

        assert!(s.begin_render());
        assert!(!s.begin_render(), "re-entrant render bracket");
        assert!(!s.choose_kind(KindId::intern("ellipse")));
        assert!(!s.delete_selection());
        assert!(!s.undo());
        s.finish_render();
        assert_eq!(s.mode(), EditorMode::Select);
        assert!(s.undo());
    }

    #[test]
    fn export_lands_back_in_select() {
        use image::ImageEncoder;

        let img = image::RgbaImage::from_pixel(12, 12, image::Rgba([90, 90, 90, 255]));
        let mut src = Vec::new();
        image::codecs::png::PngEncoder::new(&mut src)
            .write_image(img.as_raw(), 12, 12, image::ExtendedColorType::Rgba8)
            .unwrap();

        let mut s = EditorSession::new();
        s.choose_kind(KindId::intern("ellipse"));
        s.place_marker(Geometry::Ellipse {
            center: Point::new(6.0, 6.0),
            radii: Size::new(4.0, 3.0),
        });

        let out = s.export_png(&src).unwrap();
        assert_eq!(s.mode(), EditorMode::Select);
        // Export is a pure function of source + snapshot.
        assert_eq!(out, mk_render::rasterize(&src, &s.save_snapshot()).unwrap());
    }

    #[test]
    fn save_snapshot_leaves_mode_alone() {
        let mut s = EditorSession::new();
        s.choose_kind(KindId::intern("arrow"));
        let _ = s.save_snapshot();
        assert!(matches!(s.mode(), EditorMode::Create(_)));
    }
}
