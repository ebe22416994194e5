//! The annotation document: ordered marker collection + selection.
//!
//! The document is the single mutable owner of all marker instances for one
//! editing surface. Every mutating operation goes through the three methods
//! here (`create_marker`, `update_marker`, `delete_markers`); the editor
//! layer wraps each call with a pre-mutation snapshot for undo.
//!
//! `AnnotationSnapshot` is the portable unit: a structurally complete copy
//! of markers + selection that round-trips through JSON losslessly and is
//! the only input the rasterizer reads — restoring a snapshot reproduces
//! pixel-identical output.

use crate::id::{KindId, MarkerId};
use crate::model::{Geometry, MarkerInstance, MarkerPatch, Selection};
use serde::{Deserialize, Serialize};

/// Immutable, structurally complete copy of the document at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSnapshot {
    pub markers: Vec<MarkerInstance>,
    pub selection: Selection,
}

impl AnnotationSnapshot {
    /// Serialize to the portable JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the portable JSON form.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// In-memory ordered collection of markers, plus the current selection.
#[derive(Debug, Default)]
pub struct AnnotationDocument {
    markers: Vec<MarkerInstance>,
    selection: Selection,
    next_z: u32,
}

impl AnnotationDocument {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Reads ───────────────────────────────────────────────────────────

    pub fn markers(&self) -> &[MarkerInstance] {
        &self.markers
    }

    pub fn get(&self, id: MarkerId) -> Option<&MarkerInstance> {
        self.markers.iter().find(|m| m.id == id)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The single selected marker, if exactly one is selected.
    /// Property panels bind against this.
    pub fn active_marker(&self) -> Option<&MarkerInstance> {
        match self.selection.as_slice() {
            [id] => self.get(*id),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    /// Materialize a new marker of `kind` at `geometry`. The marker gets the
    /// top z-order and becomes the sole selection. `None` for unknown kinds.
    pub fn create_marker(&mut self, kind: KindId, geometry: Geometry) -> Option<MarkerId> {
        let id = MarkerId::with_prefix(kind.as_str());
        let z = self.next_z;
        let marker = MarkerInstance::seeded(id, kind, geometry, z)?;
        self.next_z += 1;
        self.markers.push(marker);
        self.selection.clear();
        self.selection.push(id);
        Some(id)
    }

    /// Apply a partial update. Returns false if the marker doesn't exist
    /// (the patch is then dropped on the floor).
    pub fn update_marker(&mut self, id: MarkerId, patch: MarkerPatch) -> bool {
        let Some(marker) = self.markers.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if let Some(geometry) = patch.geometry {
            marker.geometry = geometry;
        }
        // Style groups only land on markers that carry the group — a patch
        // can never grant a capability the kind doesn't declare.
        if let Some(stroke) = patch.stroke
            && marker.stroke.is_some()
        {
            marker.stroke = Some(stroke);
        }
        if let Some(fill) = patch.fill
            && marker.fill.is_some()
        {
            marker.fill = Some(fill);
        }
        if let Some(font) = patch.font
            && marker.font.is_some()
        {
            marker.font = Some(font);
        }
        if let Some(opacity) = patch.opacity {
            marker.opacity = opacity;
        }
        if let Some(notes) = patch.notes {
            marker.notes = notes;
        }
        true
    }

    /// Remove the given markers. Returns how many were actually removed.
    /// Removed ids also leave the selection.
    pub fn delete_markers(&mut self, ids: &[MarkerId]) -> usize {
        let before = self.markers.len();
        self.markers.retain(|m| !ids.contains(&m.id));
        self.selection.retain(|id| !ids.contains(id));
        before - self.markers.len()
    }

    /// Replace the selection. Ids that don't name a live marker are dropped.
    pub fn set_selection(&mut self, ids: &[MarkerId]) {
        let markers = &self.markers;
        self.selection.clear();
        self.selection
            .extend(ids.iter().copied().filter(|id| markers.iter().any(|m| m.id == *id)));
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ─── Snapshots ───────────────────────────────────────────────────────

    pub fn snapshot(&self) -> AnnotationSnapshot {
        AnnotationSnapshot {
            markers: self.markers.clone(),
            selection: self.selection.clone(),
        }
    }

    /// Replace the whole document content with `snapshot`.
    pub fn restore(&mut self, snapshot: &AnnotationSnapshot) {
        self.markers = snapshot.markers.clone();
        self.selection = snapshot.selection.clone();
        self.next_z = self
            .markers
            .iter()
            .map(|m| m.z_order + 1)
            .max()
            .unwrap_or(0);
    }
}
