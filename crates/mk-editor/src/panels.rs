//! Capability-gated property panels.
//!
//! Each write path targets "the active marker" (the single selected marker)
//! and is gated by set membership on the marker kind's capability set — a
//! fill write against a kind without `Fill` is rejected before it reaches
//! the document. Accepted writes commit through the session, which records
//! one history snapshot per write.
//!
//! Range handling: stroke width is clamped into 0..=50; opacity outside
//! [0, 1] is rejected *silently* — the marker keeps its last valid value
//! and no history entry is pushed.

use crate::editor::EditorSession;
use mk_core::registry::{self, Capability};
use mk_core::{
    ArrowPlacement, DashStyle, FillStyle, FillSwatch, FontFamily, FontScale, MarkerId,
    MarkerPatch, StrokeStyle, Swatch,
};

pub const STROKE_WIDTH_MAX: u32 = 50;

/// Whether the panel for `cap` applies to the currently active marker.
pub fn panel_applies(session: &EditorSession, cap: Capability) -> bool {
    active_capable(session, cap).is_some()
}

/// The active marker's id, if its kind declares `cap`.
fn active_capable(session: &EditorSession, cap: Capability) -> Option<MarkerId> {
    let marker = session.document.active_marker()?;
    let kind = registry::lookup(marker.kind)?;
    kind.supports(cap).then_some(marker.id)
}

fn current_stroke(session: &EditorSession, id: MarkerId) -> Option<StrokeStyle> {
    session.document.get(id)?.stroke
}

// ─── Stroke panel ────────────────────────────────────────────────────────

/// Set stroke width, clamped into 0..=50.
pub fn set_stroke_width(session: &mut EditorSession, width: u32) -> bool {
    let Some(id) = active_capable(session, Capability::Stroke) else {
        return false;
    };
    let Some(mut stroke) = current_stroke(session, id) else {
        return false;
    };
    stroke.width = width.min(STROKE_WIDTH_MAX);
    session.commit_patch(id, MarkerPatch {
        stroke: Some(stroke),
        ..Default::default()
    })
}

pub fn set_dash_style(session: &mut EditorSession, dash: DashStyle) -> bool {
    let Some(id) = active_capable(session, Capability::Stroke) else {
        return false;
    };
    let Some(mut stroke) = current_stroke(session, id) else {
        return false;
    };
    stroke.dash = dash;
    session.commit_patch(id, MarkerPatch {
        stroke: Some(stroke),
        ..Default::default()
    })
}

pub fn set_stroke_color(session: &mut EditorSession, color: Swatch) -> bool {
    let Some(id) = active_capable(session, Capability::Stroke) else {
        return false;
    };
    let Some(mut stroke) = current_stroke(session, id) else {
        return false;
    };
    stroke.color = color;
    session.commit_patch(id, MarkerPatch {
        stroke: Some(stroke),
        ..Default::default()
    })
}

/// Arrow-head placement; only legal for arrow-capable kinds.
pub fn set_arrowheads(session: &mut EditorSession, placement: ArrowPlacement) -> bool {
    let Some(id) = active_capable(session, Capability::Arrowheads) else {
        return false;
    };
    let Some(mut stroke) = current_stroke(session, id) else {
        return false;
    };
    stroke.arrowheads = placement;
    session.commit_patch(id, MarkerPatch {
        stroke: Some(stroke),
        ..Default::default()
    })
}

// ─── Fill panel ──────────────────────────────────────────────────────────

pub fn set_fill(session: &mut EditorSession, color: FillSwatch) -> bool {
    let Some(id) = active_capable(session, Capability::Fill) else {
        return false;
    };
    session.commit_patch(id, MarkerPatch {
        fill: Some(FillStyle { color }),
        ..Default::default()
    })
}

// ─── Font panel ──────────────────────────────────────────────────────────

pub fn set_font_family(session: &mut EditorSession, family: FontFamily) -> bool {
    let Some(id) = active_capable(session, Capability::Font) else {
        return false;
    };
    let Some(mut font) = session.document.get(id).and_then(|m| m.font) else {
        return false;
    };
    font.family = family;
    session.commit_patch(id, MarkerPatch {
        font: Some(font),
        ..Default::default()
    })
}

pub fn set_font_scale(session: &mut EditorSession, scale: FontScale) -> bool {
    let Some(id) = active_capable(session, Capability::Font) else {
        return false;
    };
    let Some(mut font) = session.document.get(id).and_then(|m| m.font) else {
        return false;
    };
    font.scale = scale;
    session.commit_patch(id, MarkerPatch {
        font: Some(font),
        ..Default::default()
    })
}

// ─── Opacity panel ───────────────────────────────────────────────────────

/// Out-of-range input reverts to the last valid value: the write is
/// rejected with no history entry and no error.
pub fn set_opacity(session: &mut EditorSession, opacity: f32) -> bool {
    if !(0.0..=1.0).contains(&opacity) || !opacity.is_finite() {
        return false;
    }
    let Some(id) = active_capable(session, Capability::Opacity) else {
        return false;
    };
    session.commit_patch(id, MarkerPatch {
        opacity: Some(opacity),
        ..Default::default()
    })
}

// ─── Notes panel ─────────────────────────────────────────────────────────

pub fn set_notes(session: &mut EditorSession, notes: impl Into<String>) -> bool {
    let Some(id) = active_capable(session, Capability::Notes) else {
        return false;
    };
    session.commit_patch(id, MarkerPatch {
        notes: Some(notes.into()),
        ..Default::default()
    })
}
