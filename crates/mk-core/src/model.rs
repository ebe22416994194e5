//! Marker data model.
//!
//! A marker is one drawable annotation object placed over a reference image:
//! a shape, a line, text, a freehand path, or a stamp. Each marker carries
//! the style groups its kind's capability set declares — a kind without the
//! `Fill` capability simply has no fill group. Style values are drawn from
//! small canonical palettes (swatches, dash patterns, font steps) rather
//! than free-form numbers, so a document stays portable across surfaces.

use crate::id::{KindId, MarkerId};
use crate::registry::{self, Capability};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ─── Colors ──────────────────────────────────────────────────────────────

/// RGBA color. Stored as 4 × f32 [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Quantize to 8-bit channels for rasterization.
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.b.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.a.clamp(0.0, 1.0) * 255.0).round() as u8,
        ]
    }
}

/// Canonical stroke/fill color swatches offered by the panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Swatch {
    Black,
    White,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
}

impl Swatch {
    pub const fn color(self) -> Color {
        match self {
            Swatch::Black => Color::rgba(0.0, 0.0, 0.0, 1.0),
            Swatch::White => Color::rgba(1.0, 1.0, 1.0, 1.0),
            Swatch::Red => Color::rgba(0.88, 0.11, 0.14, 1.0),
            Swatch::Orange => Color::rgba(0.96, 0.55, 0.11, 1.0),
            Swatch::Yellow => Color::rgba(0.98, 0.84, 0.16, 1.0),
            Swatch::Green => Color::rgba(0.17, 0.66, 0.29, 1.0),
            Swatch::Blue => Color::rgba(0.12, 0.42, 0.87, 1.0),
            Swatch::Purple => Color::rgba(0.52, 0.24, 0.77, 1.0),
        }
    }
}

/// Fill swatch, with an explicit transparent sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillSwatch {
    Transparent,
    Solid(Swatch),
}

// ─── Geometry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Marker geometry in source-image pixel coordinates.
///
/// Zoom is a pure view transform; geometry never stores screen coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Axis-aligned rectangle (also callout bodies and text blocks).
    Rect { origin: Point, size: Size },
    Ellipse { center: Point, radii: Size },
    /// Straight segment: lines and arrows.
    Segment { from: Point, to: Point },
    /// Freehand path, in stroke order.
    Polyline { points: Vec<Point> },
    /// Closed polygon, vertices in ring order.
    Polygon { points: Vec<Point> },
    /// Single placement point with a nominal footprint (stamps, text insert).
    Anchor { at: Point, footprint: Size },
}

// ─── Style groups ────────────────────────────────────────────────────────

/// Dash style, one of three canonical on/off patterns (px at natural scale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DashStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl DashStyle {
    /// The canonical pattern: `None` paints continuously.
    pub const fn pattern(self) -> Option<[f32; 2]> {
        match self {
            DashStyle::Solid => None,
            DashStyle::Dashed => Some([8.0, 4.0]),
            DashStyle::Dotted => Some([2.0, 3.0]),
        }
    }
}

/// Arrow-head placement for arrow-capable kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArrowPlacement {
    None,
    Start,
    #[default]
    End,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    /// Stroke width in source pixels. Panels clamp writes into 0..=50.
    pub width: u32,
    pub dash: DashStyle,
    pub color: Swatch,
    pub arrowheads: ArrowPlacement,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            width: 3,
            dash: DashStyle::Solid,
            color: Swatch::Red,
            arrowheads: ArrowPlacement::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillStyle {
    pub color: FillSwatch,
}

impl Default for FillStyle {
    fn default() -> Self {
        Self {
            color: FillSwatch::Transparent,
        }
    }
}

/// One of three canonical families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontFamily {
    #[default]
    Sans,
    Serif,
    Mono,
}

/// Relative font size steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontScale {
    Half,
    FourFifths,
    #[default]
    One,
    OneAndHalf,
    Triple,
}

impl FontScale {
    pub const fn factor(self) -> f32 {
        match self {
            FontScale::Half => 0.5,
            FontScale::FourFifths => 0.8,
            FontScale::One => 1.0,
            FontScale::OneAndHalf => 1.5,
            FontScale::Triple => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FontStyle {
    pub family: FontFamily,
    pub scale: FontScale,
}

// ─── Marker instance ─────────────────────────────────────────────────────

/// One placed marker. Owned exclusively by the document that contains it.
///
/// Style groups are `Some` exactly when the kind's capability set declares
/// the matching capability; seeding happens at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerInstance {
    pub id: MarkerId,
    pub kind: KindId,
    pub geometry: Geometry,
    pub stroke: Option<StrokeStyle>,
    pub fill: Option<FillStyle>,
    pub font: Option<FontStyle>,
    /// [0, 1]; panels silently revert out-of-range writes.
    pub opacity: f32,
    /// Free text shown on hover in viewer surfaces.
    pub notes: String,
    /// Paint order; higher paints later (on top).
    pub z_order: u32,
}

impl MarkerInstance {
    /// Build a new instance with styles seeded from the kind's capabilities.
    /// `None` for kinds the registry doesn't know.
    pub fn seeded(id: MarkerId, kind: KindId, geometry: Geometry, z_order: u32) -> Option<Self> {
        let desc = registry::lookup(kind)?;
        let stroke = desc
            .supports(Capability::Stroke)
            .then(|| StrokeStyle {
                // Arrow-capable kinds default to a head at the end.
                arrowheads: if desc.supports(Capability::Arrowheads) {
                    ArrowPlacement::End
                } else {
                    ArrowPlacement::None
                },
                ..StrokeStyle::default()
            });
        Some(Self {
            id,
            kind,
            geometry,
            stroke,
            fill: desc.supports(Capability::Fill).then(FillStyle::default),
            font: desc.supports(Capability::Font).then(FontStyle::default),
            opacity: 1.0,
            notes: String::new(),
            z_order,
        })
    }
}

/// Partial update applied through `AnnotationDocument::update_marker`.
/// Unset fields leave the marker untouched.
#[derive(Debug, Clone, Default)]
pub struct MarkerPatch {
    pub geometry: Option<Geometry>,
    pub stroke: Option<StrokeStyle>,
    pub fill: Option<FillStyle>,
    pub font: Option<FontStyle>,
    pub opacity: Option<f32>,
    pub notes: Option<String>,
}

/// Selection set; almost always 0 or 1 entries.
pub type Selection = SmallVec<[MarkerId; 4]>;
