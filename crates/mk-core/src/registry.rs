//! Catalog of marker kinds.
//!
//! Each kind is an immutable descriptor: an id, a display name, and the
//! capability set that decides which property panels may act on markers of
//! that kind. The catalog is fixed after process start — panels and tools
//! check capabilities by simple set membership, never by probing the marker
//! value itself.

use crate::id::KindId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// A style surface a marker kind supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Stroke,
    Fill,
    Font,
    Opacity,
    Notes,
    Arrowheads,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Capability::Stroke => 1 << 0,
            Capability::Fill => 1 << 1,
            Capability::Font => 1 << 2,
            Capability::Opacity => 1 << 3,
            Capability::Notes => 1 << 4,
            Capability::Arrowheads => 1 << 5,
        }
    }

    pub const ALL: [Capability; 6] = [
        Capability::Stroke,
        Capability::Fill,
        Capability::Font,
        Capability::Opacity,
        Capability::Notes,
        Capability::Arrowheads,
    ];
}

/// Compact set of capabilities, const-constructible.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);

    pub const fn of(caps: &[Capability]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < caps.len() {
            bits |= caps[i].bit();
            i += 1;
        }
        CapabilitySet(bits)
    }

    pub const fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Immutable descriptor of one marker kind.
#[derive(Debug, Clone, Copy)]
pub struct MarkerKind {
    /// Stable string key, e.g. `"rectangle"`.
    pub id: &'static str,
    pub display_name: &'static str,
    pub capabilities: CapabilitySet,
    /// Whether the kind is materialized by a pointer drag gesture
    /// (stamps and text are placed with a single click instead).
    pub drag_creatable: bool,
}

impl MarkerKind {
    pub fn kind_id(&self) -> KindId {
        KindId::intern(self.id)
    }

    pub fn supports(&self, cap: Capability) -> bool {
        self.capabilities.contains(cap)
    }
}

// ─── The catalog ─────────────────────────────────────────────────────────

const SHAPE_CAPS: CapabilitySet = CapabilitySet::of(&[
    Capability::Stroke,
    Capability::Fill,
    Capability::Opacity,
    Capability::Notes,
]);

const LINE_CAPS: CapabilitySet = CapabilitySet::of(&[
    Capability::Stroke,
    Capability::Opacity,
    Capability::Notes,
]);

const ARROW_CAPS: CapabilitySet = CapabilitySet::of(&[
    Capability::Stroke,
    Capability::Opacity,
    Capability::Notes,
    Capability::Arrowheads,
]);

const TEXT_CAPS: CapabilitySet = CapabilitySet::of(&[
    Capability::Font,
    Capability::Fill,
    Capability::Opacity,
    Capability::Notes,
]);

const CALLOUT_CAPS: CapabilitySet = CapabilitySet::of(&[
    Capability::Stroke,
    Capability::Fill,
    Capability::Font,
    Capability::Opacity,
    Capability::Notes,
]);

const STAMP_CAPS: CapabilitySet = CapabilitySet::of(&[Capability::Opacity, Capability::Notes]);

static KINDS: &[MarkerKind] = &[
    MarkerKind {
        id: "rectangle",
        display_name: "Rectangle",
        capabilities: SHAPE_CAPS,
        drag_creatable: true,
    },
    MarkerKind {
        id: "ellipse",
        display_name: "Ellipse",
        capabilities: SHAPE_CAPS,
        drag_creatable: true,
    },
    MarkerKind {
        id: "polygon",
        display_name: "Polygon",
        capabilities: SHAPE_CAPS,
        drag_creatable: true,
    },
    MarkerKind {
        id: "line",
        display_name: "Line",
        capabilities: LINE_CAPS,
        drag_creatable: true,
    },
    MarkerKind {
        id: "arrow",
        display_name: "Arrow",
        capabilities: ARROW_CAPS,
        drag_creatable: true,
    },
    MarkerKind {
        id: "freehand",
        display_name: "Freehand",
        capabilities: LINE_CAPS,
        drag_creatable: true,
    },
    MarkerKind {
        id: "text",
        display_name: "Text",
        capabilities: TEXT_CAPS,
        drag_creatable: false,
    },
    MarkerKind {
        id: "callout",
        display_name: "Callout",
        capabilities: CALLOUT_CAPS,
        drag_creatable: true,
    },
    MarkerKind {
        id: "stamp-check",
        display_name: "Check Stamp",
        capabilities: STAMP_CAPS,
        drag_creatable: false,
    },
    MarkerKind {
        id: "stamp-cross",
        display_name: "Cross Stamp",
        capabilities: STAMP_CAPS,
        drag_creatable: false,
    },
    MarkerKind {
        id: "stamp-question",
        display_name: "Question Stamp",
        capabilities: STAMP_CAPS,
        drag_creatable: false,
    },
];

/// Presentation-only grouping of kinds. Has no effect on behavior.
static CATEGORIES: &[(&str, &[&str])] = &[
    ("Basic shapes", &["rectangle", "ellipse"]),
    ("Lines", &["line", "arrow", "freehand"]),
    ("Text", &["text", "callout"]),
    ("Advanced shapes", &["polygon"]),
    ("Stamps", &["stamp-check", "stamp-cross", "stamp-question"]),
];

static LOOKUP: LazyLock<Vec<(KindId, &'static MarkerKind)>> =
    LazyLock::new(|| KINDS.iter().map(|k| (k.kind_id(), k)).collect());

/// Look up a kind descriptor by id. `None` for unknown kinds.
pub fn lookup(kind_id: KindId) -> Option<&'static MarkerKind> {
    LOOKUP.iter().find(|(id, _)| *id == kind_id).map(|(_, k)| *k)
}

/// All registered kinds, in catalog order.
pub fn all_kinds() -> &'static [MarkerKind] {
    KINDS
}

/// Named kind groups for toolbars/palettes.
pub fn categories() -> &'static [(&'static str, &'static [&'static str])] {
    CATEGORIES
}
