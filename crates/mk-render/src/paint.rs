//! Snapshot → raster painting.
//!
//! Walks the snapshot's markers in ascending z-order and paints each one
//! onto the decoded source image, then encodes the result as PNG. The
//! whole pipeline is a pure function of (source bytes, snapshot): no live
//! editor state, no zoom, no clock — repeated calls are byte-identical.
//!
//! Strokes are painted by stamping discs along flattened outlines at a
//! fixed sub-pixel step; fills are per-pixel-center coverage tests. Both
//! use only deterministic integer/f64 math.

use crate::RenderError;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use kurbo::{PathEl, Shape};
use mk_core::{AnnotationSnapshot, ArrowPlacement, FillSwatch, Geometry, MarkerInstance, Point};

/// Flatten `source_png` + `snapshot` into PNG bytes at the source image's
/// natural resolution.
pub fn rasterize(source_png: &[u8], snapshot: &AnnotationSnapshot) -> Result<Vec<u8>, RenderError> {
    let decoded = image::load_from_memory(source_png).map_err(RenderError::Decode)?;
    let mut img = decoded.into_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(RenderError::EmptySource);
    }

    let mut ordered: Vec<&MarkerInstance> = snapshot.markers.iter().collect();
    ordered.sort_by_key(|m| m.z_order);
    for marker in ordered {
        paint_marker(&mut img, marker);
    }

    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .map_err(RenderError::Encode)?;
    Ok(out)
}

fn paint_marker(img: &mut RgbaImage, marker: &MarkerInstance) {
    let alpha = marker.opacity.clamp(0.0, 1.0) as f64;
    if alpha == 0.0 {
        return;
    }
    log::trace!("PAINT {} {}", marker.kind, marker.id);

    match &marker.geometry {
        Geometry::Rect { origin, size } => {
            let x0 = origin.x as f64;
            let y0 = origin.y as f64;
            let x1 = x0 + size.width as f64;
            let y1 = y0 + size.height as f64;
            fill_if_any(img, marker, alpha, (x0, y0, x1, y1), |x, y| {
                x >= x0 && x < x1 && y >= y0 && y < y1
            });
            let ring = [(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)];
            stroke_if_any(img, marker, alpha, &ring);
            if marker.kind.as_str() == "callout" {
                paint_callout_tail(img, marker, alpha, x0, y1);
            }
            paint_text_block(marker);
        }
        Geometry::Ellipse { center, radii } => {
            let (cx, cy) = (center.x as f64, center.y as f64);
            let (rx, ry) = (radii.width as f64, radii.height as f64);
            fill_if_any(
                img,
                marker,
                alpha,
                (cx - rx, cy - ry, cx + rx, cy + ry),
                |x, y| {
                    if rx <= 0.0 || ry <= 0.0 {
                        return false;
                    }
                    let nx = (x - cx) / rx;
                    let ny = (y - cy) / ry;
                    nx * nx + ny * ny <= 1.0
                },
            );
            let outline = flatten_shape(&kurbo::Ellipse::new((cx, cy), (rx, ry), 0.0));
            stroke_if_any(img, marker, alpha, &outline);
        }
        Geometry::Segment { from, to } => {
            let a = (from.x as f64, from.y as f64);
            let b = (to.x as f64, to.y as f64);
            stroke_if_any(img, marker, alpha, &[a, b]);
            paint_arrowheads(img, marker, alpha, a, b);
        }
        Geometry::Polyline { points } => {
            stroke_if_any(img, marker, alpha, &to_f64(points));
        }
        Geometry::Polygon { points } => {
            let ring = to_f64(points);
            if ring.len() >= 3 {
                let bbox = bounds_of(&ring);
                fill_if_any(img, marker, alpha, bbox, |x, y| point_in_polygon(&ring, x, y));
                let mut closed = ring.clone();
                closed.push(ring[0]);
                stroke_if_any(img, marker, alpha, &closed);
            }
        }
        Geometry::Anchor { at, footprint } => {
            paint_stamp(img, marker, alpha, at, footprint.width as f64, footprint.height as f64);
        }
    }
}

// ─── Kind-specific painters ──────────────────────────────────────────────

fn paint_text_block(marker: &MarkerInstance) {
    if marker.kind.as_str() != "text" {
        return;
    }
    // Glyph shaping needs a font context; the viewer surface renders text
    // live and the flattened export carries the backing block only.
    log::trace!("TEXT {} {:?} (glyphs deferred)", marker.id, marker.notes);
}

fn paint_callout_tail(img: &mut RgbaImage, marker: &MarkerInstance, alpha: f64, x0: f64, y1: f64) {
    // Short pointer from the body's lower-left corner.
    let tail = [(x0 + 8.0, y1), (x0 - 6.0, y1 + 14.0)];
    stroke_if_any(img, marker, alpha, &tail);
}

fn paint_stamp(
    img: &mut RgbaImage,
    marker: &MarkerInstance,
    alpha: f64,
    at: &Point,
    w: f64,
    h: f64,
) {
    let (cx, cy) = (at.x as f64, at.y as f64);
    let color = [0.88f32, 0.11, 0.14, 1.0];
    let rgba = quantize(color);
    let width = 3.0;

    match marker.kind.as_str() {
        "stamp-check" => {
            let pts = [
                (cx - w * 0.4, cy),
                (cx - w * 0.1, cy + h * 0.35),
                (cx + w * 0.45, cy - h * 0.35),
            ];
            stroke_polyline(img, &pts, width, None, rgba, alpha);
        }
        "stamp-cross" => {
            stroke_polyline(
                img,
                &[(cx - w * 0.4, cy - h * 0.4), (cx + w * 0.4, cy + h * 0.4)],
                width,
                None,
                rgba,
                alpha,
            );
            stroke_polyline(
                img,
                &[(cx - w * 0.4, cy + h * 0.4), (cx + w * 0.4, cy - h * 0.4)],
                width,
                None,
                rgba,
                alpha,
            );
        }
        "stamp-question" => {
            let r = w.min(h) * 0.3;
            let outline = flatten_shape(&kurbo::Circle::new((cx, cy - r * 0.5), r));
            stroke_polyline(img, &outline, width, None, rgba, alpha);
            stamp_disc(img, cx, cy + r * 1.4, width, rgba, alpha);
        }
        "text" => paint_text_block(marker),
        _ => {
            // Unknown anchor kinds paint their footprint so the marker is
            // still visible in the export.
            let ring = [
                (cx - w / 2.0, cy - h / 2.0),
                (cx + w / 2.0, cy - h / 2.0),
                (cx + w / 2.0, cy + h / 2.0),
                (cx - w / 2.0, cy + h / 2.0),
                (cx - w / 2.0, cy - h / 2.0),
            ];
            stroke_polyline(img, &ring, width, None, rgba, alpha);
        }
    }
}

fn paint_arrowheads(
    img: &mut RgbaImage,
    marker: &MarkerInstance,
    alpha: f64,
    a: (f64, f64),
    b: (f64, f64),
) {
    let Some(stroke) = marker.stroke else { return };
    let placement = stroke.arrowheads;
    if placement == ArrowPlacement::None {
        return;
    }
    let rgba = swatch_rgba(stroke.color);
    let head_len = 6.0 + stroke.width as f64 * 2.0;

    if matches!(placement, ArrowPlacement::End | ArrowPlacement::Both) {
        fill_head(img, a, b, head_len, rgba, alpha);
    }
    if matches!(placement, ArrowPlacement::Start | ArrowPlacement::Both) {
        fill_head(img, b, a, head_len, rgba, alpha);
    }
}

/// Filled triangle head pointing at `tip`, oriented along `from → tip`.
fn fill_head(
    img: &mut RgbaImage,
    from: (f64, f64),
    tip: (f64, f64),
    len: f64,
    rgba: [u8; 4],
    alpha: f64,
) {
    let dx = tip.0 - from.0;
    let dy = tip.1 - from.1;
    let mag = (dx * dx + dy * dy).sqrt();
    if mag < 1e-6 {
        return;
    }
    let (ux, uy) = (dx / mag, dy / mag);
    let (px, py) = (-uy, ux);
    let base = (tip.0 - ux * len, tip.1 - uy * len);
    let half = len * 0.5;
    let tri = vec![
        tip,
        (base.0 + px * half, base.1 + py * half),
        (base.0 - px * half, base.1 - py * half),
    ];
    let bbox = bounds_of(&tri);
    fill_region(img, bbox, rgba, alpha, |x, y| point_in_polygon(&tri, x, y));
}

// ─── Style plumbing ──────────────────────────────────────────────────────

fn stroke_if_any(img: &mut RgbaImage, marker: &MarkerInstance, alpha: f64, pts: &[(f64, f64)]) {
    let Some(stroke) = marker.stroke else { return };
    if stroke.width == 0 {
        return;
    }
    stroke_polyline(
        img,
        pts,
        stroke.width as f64,
        stroke.dash.pattern(),
        swatch_rgba(stroke.color),
        alpha,
    );
}

fn fill_if_any(
    img: &mut RgbaImage,
    marker: &MarkerInstance,
    alpha: f64,
    bbox: (f64, f64, f64, f64),
    inside: impl Fn(f64, f64) -> bool,
) {
    let Some(fill) = marker.fill else { return };
    let FillSwatch::Solid(swatch) = fill.color else {
        return;
    };
    fill_region(img, bbox, swatch_rgba(swatch), alpha, inside);
}

fn swatch_rgba(swatch: mk_core::Swatch) -> [u8; 4] {
    swatch.color().to_rgba8()
}

fn quantize(c: [f32; 4]) -> [u8; 4] {
    mk_core::Color::rgba(c[0], c[1], c[2], c[3]).to_rgba8()
}

// ─── Geometry helpers ────────────────────────────────────────────────────

fn to_f64(points: &[Point]) -> Vec<(f64, f64)> {
    points.iter().map(|p| (p.x as f64, p.y as f64)).collect()
}

fn bounds_of(pts: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    let mut bb = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (x, y) in pts {
        bb.0 = bb.0.min(*x);
        bb.1 = bb.1.min(*y);
        bb.2 = bb.2.max(*x);
        bb.3 = bb.3.max(*y);
    }
    bb
}

/// Flatten any kurbo shape into a polyline at fixed tolerance.
fn flatten_shape(shape: &impl Shape) -> Vec<(f64, f64)> {
    let mut pts = Vec::new();
    let mut start = None;
    kurbo::flatten(shape.path_elements(0.1), 0.1, |el| match el {
        PathEl::MoveTo(p) => {
            start = Some((p.x, p.y));
            pts.push((p.x, p.y));
        }
        PathEl::LineTo(p) => pts.push((p.x, p.y)),
        PathEl::ClosePath => {
            if let Some(s) = start {
                pts.push(s);
            }
        }
        // flatten() only emits MoveTo/LineTo/ClosePath
        _ => {}
    });
    pts
}

/// Even-odd crossing test against a vertex ring.
fn point_in_polygon(ring: &[(f64, f64)], x: f64, y: f64) -> bool {
    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

// ─── Raster primitives ───────────────────────────────────────────────────

const STROKE_STEP: f64 = 0.5;

/// Stamp discs along the polyline at a fixed arc-length step, honoring the
/// dash pattern (distances in source px at natural scale).
fn stroke_polyline(
    img: &mut RgbaImage,
    pts: &[(f64, f64)],
    width: f64,
    dash: Option<[f32; 2]>,
    rgba: [u8; 4],
    alpha: f64,
) {
    let radius = (width / 2.0).max(0.5);
    let mut travelled = 0.0f64;

    for pair in pts.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        let len = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        if len < 1e-9 {
            continue;
        }
        let steps = (len / STROKE_STEP).ceil() as u64;
        for s in 0..=steps {
            let t = s as f64 / steps as f64;
            let d = travelled + t * len;
            if dash_on(dash, d) {
                stamp_disc(img, x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, radius, rgba, alpha);
            }
        }
        travelled += len;
    }
}

fn dash_on(dash: Option<[f32; 2]>, distance: f64) -> bool {
    match dash {
        None => true,
        Some([on, off]) => {
            let period = (on + off) as f64;
            distance.rem_euclid(period) < on as f64
        }
    }
}

fn stamp_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, rgba: [u8; 4], alpha: f64) {
    let x_lo = (cx - radius).floor() as i64;
    let x_hi = (cx + radius).ceil() as i64;
    let y_lo = (cy - radius).floor() as i64;
    let y_hi = (cy + radius).ceil() as i64;
    let r2 = radius * radius;
    for y in y_lo..=y_hi {
        for x in x_lo..=x_hi {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                blend_px(img, x, y, rgba, alpha);
            }
        }
    }
}

fn fill_region(
    img: &mut RgbaImage,
    bbox: (f64, f64, f64, f64),
    rgba: [u8; 4],
    alpha: f64,
    inside: impl Fn(f64, f64) -> bool,
) {
    let (x0, y0, x1, y1) = bbox;
    if !x0.is_finite() || !y0.is_finite() {
        return;
    }
    for y in y0.floor() as i64..=y1.ceil() as i64 {
        for x in x0.floor() as i64..=x1.ceil() as i64 {
            if inside(x as f64 + 0.5, y as f64 + 0.5) {
                blend_px(img, x, y, rgba, alpha);
            }
        }
    }
}

/// Source-over blend of one pixel, with `alpha` scaling the paint's own
/// alpha channel. Out-of-bounds coordinates are clipped.
fn blend_px(img: &mut RgbaImage, x: i64, y: i64, rgba: [u8; 4], alpha: f64) {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return;
    }
    let px = img.get_pixel_mut(x as u32, y as u32);
    let sa = (rgba[3] as f64 / 255.0) * alpha;
    if sa <= 0.0 {
        return;
    }
    let da = px[3] as f64 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let sc = rgba[c] as f64 / 255.0;
        let dc = px[c] as f64 / 255.0;
        let out = if out_a > 0.0 {
            (sc * sa + dc * da * (1.0 - sa)) / out_a
        } else {
            0.0
        };
        px[c] = (out * 255.0).round() as u8;
    }
    px[3] = (out_a * 255.0).round() as u8;
}
