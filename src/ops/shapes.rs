use egui::{Pos2, Rect, Vec2};

use crate::canvas::{BrushPoint, LabelBuffer, PixelBounds, merge_bounds, union_bounds};

/// Slack so pixel centres lying exactly on a brush rim are covered.
const RIM_EPSILON: f32 = 1e-3;

/// Bounding-box accumulator shared by the rasterizers.
#[derive(Default)]
struct Touched(Option<PixelBounds>);

impl Touched {
    #[inline]
    fn span(&mut self, y: u32, x0: u32, x1: u32) {
        let b = (x0, y, x1, y);
        self.0 = Some(match self.0 {
            Some(prev) => merge_bounds(prev, b),
            None => b,
        });
    }
}

/// Clip the inclusive float span `[xa, xb]` on row `y` to the buffer and
/// fill the pixel centres it covers.
#[inline]
fn fill_row(buffer: &mut LabelBuffer, y: u32, xa: f32, xb: f32, label: u8, touched: &mut Touched) {
    let w = buffer.width() as i64;
    let x0 = (xa.ceil() as i64).max(0);
    let x1 = (xb.floor() as i64).min(w - 1);
    if x0 > x1 {
        return;
    }
    buffer.fill_span(y, x0 as u32, x1 as u32, label);
    touched.span(y, x0 as u32, x1 as u32);
}

/// Inclusive row range `[ceil(y_min), floor(y_max)]` clipped to the buffer.
fn row_range(buffer: &LabelBuffer, y_min: f32, y_max: f32) -> Option<(u32, u32)> {
    let h = buffer.height() as i64;
    let y0 = (y_min.ceil() as i64).max(0);
    let y1 = (y_max.floor() as i64).min(h - 1);
    (y0 <= y1).then_some((y0 as u32, y1 as u32))
}

fn finite(p: Pos2) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

// ============================================================================
// CIRCLE
// ============================================================================

/// Paint every pixel whose centre lies within `radius` of `center`.
///
/// When no pixel centre is covered the pixel nearest to `center` is painted,
/// provided `center` rounds to a pixel inside the buffer.
pub fn draw_circle(buffer: &mut LabelBuffer, center: Pos2, radius: f32, label: u8) -> Option<PixelBounds> {
    if buffer.is_empty() || !finite(center) || !radius.is_finite() {
        return None;
    }
    let r = radius.max(0.0);
    let r2 = r * r + RIM_EPSILON;
    let mut touched = Touched::default();

    if let Some((y0, y1)) = row_range(buffer, center.y - r, center.y + r) {
        for y in y0..=y1 {
            let dy = y as f32 - center.y;
            let rem = r2 - dy * dy;
            if rem < 0.0 {
                continue;
            }
            let half = rem.sqrt();
            fill_row(buffer, y, center.x - half, center.x + half, label, &mut touched);
        }
    }

    if touched.0.is_none() {
        let (w, h) = buffer.dimensions();
        let x = center.x.round();
        let y = center.y.round();
        if x >= 0.0 && y >= 0.0 && (x as u32) < w && (y as u32) < h {
            buffer.set(x as u32, y as u32, label);
            touched.span(y as u32, x as u32, x as u32);
        }
    }
    touched.0
}

// ============================================================================
// CAPSULE
// ============================================================================

/// Paint the convex hull of two brush discs.
///
/// The side quad is built from the segment normal scaled by each end's
/// radius, then unioned with both end circles.  Coincident endpoints
/// degenerate to the two circles.
pub fn draw_capsule(buffer: &mut LabelBuffer, start: &BrushPoint, end: &BrushPoint, label: u8) -> Option<PixelBounds> {
    if buffer.is_empty() || !finite(start.pos) || !finite(end.pos) {
        return None;
    }
    let d = end.pos - start.pos;
    let len = d.length();

    let mut bounds = draw_circle(buffer, start.pos, start.radius, label);
    let end_bounds = draw_circle(buffer, end.pos, end.radius, label);
    bounds = union_bounds(bounds, end_bounds);
    if len < 1e-4 {
        return bounds;
    }

    let n = Vec2::new(d.y, -d.x) / len;
    let (r1, r2) = (start.radius.max(0.0), end.radius.max(0.0));
    // Inflated so both long sides include centres on the rim, matching the
    // circles; the scanline rule alone would drop the lower side.
    let (q1, q2) = (r1 + RIM_EPSILON, r2 + RIM_EPSILON);
    let quad = [
        start.pos + n * q1,
        end.pos + n * q2,
        end.pos - n * q2,
        start.pos - n * q1,
    ];
    let quad_bounds = fill_polygon(buffer, &quad, label);
    bounds = union_bounds(bounds, quad_bounds);

    // Where the quad is thinner than a pixel it may miss every centre, which
    // would split a tapered stroke into islands.
    if r1.min(r2) < 0.5 {
        bounds = union_bounds(bounds, draw_thin_line(buffer, start.pos, end.pos, label));
    }
    bounds
}

/// 4-connected walk from the pixel nearest `a` to the pixel nearest `b`.
///
/// Steps one pixel along the major axis at a time; a change on the minor
/// axis is bridged inside the same column so no two steps touch only at a
/// corner.
fn draw_thin_line(buffer: &mut LabelBuffer, a: Pos2, b: Pos2, label: u8) -> Option<PixelBounds> {
    let (w, h) = (buffer.width() as i64, buffer.height() as i64);
    let d = b - a;
    let x_major = d.x.abs() >= d.y.abs();
    let (a_maj, a_min, d_maj, d_min) = if x_major { (a.x, a.y, d.x, d.y) } else { (a.y, a.x, d.y, d.x) };
    let minor_at = |m: i64| -> i64 {
        if d_maj.abs() < 1e-6 {
            return a_min.round() as i64;
        }
        let t = ((m as f32 - a_maj) / d_maj).clamp(0.0, 1.0);
        (a_min + d_min * t).round() as i64
    };

    let mut touched = Touched::default();
    let mut column = |m: i64, from: i64, to: i64| {
        for k in from.min(to)..=from.max(to) {
            let (x, y) = if x_major { (m, k) } else { (k, m) };
            if x >= 0 && y >= 0 && x < w && y < h {
                buffer.set(x as u32, y as u32, label);
                touched.span(y as u32, x as u32, x as u32);
            }
        }
    };

    let m0 = a_maj.round() as i64;
    let m1 = (a_maj + d_maj).round() as i64;
    let step = if m1 >= m0 { 1 } else { -1 };
    let mut prev = a_min.round() as i64;
    let mut m = m0;
    loop {
        let cur = minor_at(m);
        column(m, prev, cur);
        prev = cur;
        if m == m1 {
            break;
        }
        m += step;
    }
    column(m1, prev, (a_min + d_min).round() as i64);
    touched.0
}

// ============================================================================
// POLYGON – scanline even-odd fill
// ============================================================================

/// Fill a closed polygon with the even-odd rule, sampling each pixel centre.
///
/// An edge crosses row `y` when `y` lies in its half-open vertical extent
/// `[min(y_a, y_b), max(y_a, y_b))`, so shared vertices are counted once and
/// horizontal edges are skipped.
pub fn fill_polygon(buffer: &mut LabelBuffer, points: &[Pos2], label: u8) -> Option<PixelBounds> {
    if points.len() < 3 || buffer.is_empty() || !points.iter().all(|p| finite(*p)) {
        return None;
    }
    let y_min = points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let y_max = points.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
    let (y0, y1) = row_range(buffer, y_min, y_max)?;

    let n = points.len();
    let mut touched = Touched::default();
    let mut nodes: Vec<f32> = Vec::with_capacity(n);
    for y in y0..=y1 {
        let yf = y as f32;
        nodes.clear();
        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            if (a.y <= yf && b.y > yf) || (b.y <= yf && a.y > yf) {
                let t = (yf - a.y) / (b.y - a.y);
                nodes.push(a.x + t * (b.x - a.x));
            }
        }
        nodes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for pair in nodes.chunks_exact(2) {
            fill_row(buffer, y, pair[0], pair[1], label, &mut touched);
        }
    }
    touched.0
}

// ============================================================================
// RECTANGLE CLEAR
// ============================================================================

/// Set every pixel in `[round(min.x), round(max.x)) × [round(min.y), round(max.y))`.
pub fn clear_rect(buffer: &mut LabelBuffer, rect: Rect, label: u8) -> Option<PixelBounds> {
    if buffer.is_empty() || !finite(rect.min) || !finite(rect.max) {
        return None;
    }
    let rect = Rect::from_two_pos(rect.min, rect.max);
    let (w, h) = (buffer.width() as i64, buffer.height() as i64);
    let x0 = (rect.min.x.round() as i64).clamp(0, w);
    let x1 = (rect.max.x.round() as i64).clamp(0, w);
    let y0 = (rect.min.y.round() as i64).clamp(0, h);
    let y1 = (rect.max.y.round() as i64).clamp(0, h);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    for y in y0..y1 {
        buffer.fill_span(y as u32, x0 as u32, (x1 - 1) as u32, label);
    }
    Some((x0 as u32, y0 as u32, (x1 - 1) as u32, (y1 - 1) as u32))
}
