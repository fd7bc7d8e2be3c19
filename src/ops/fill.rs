use egui::Pos2;
use rayon::prelude::*;

use crate::canvas::{LabelBuffer, PixelBounds, merge_bounds};
use crate::ops::superpixels::SuperpixelIndex;

/// 4-connected flood fill from the pixel nearest `seed`.
///
/// Every pixel reachable through pixels holding the seed's original label is
/// set to `label`.  Returns `None` without touching the buffer when the seed
/// already holds `label`.
pub fn flood_fill(buffer: &mut LabelBuffer, seed: Pos2, label: u8) -> Option<PixelBounds> {
    let (sx, sy) = buffer.pixel_at(seed)?;
    let (w, h) = buffer.dimensions();
    let wu = w as usize;
    let data = buffer.as_raw_mut();

    let seed_idx = sy as usize * wu + sx as usize;
    let target = data[seed_idx];
    if target == label {
        return None;
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);

    // Relabelling on push doubles as the visited marker since label != target.
    let mut stack: Vec<u32> = Vec::with_capacity(4096);
    data[seed_idx] = label;
    stack.push(seed_idx as u32);

    while let Some(idx) = stack.pop() {
        let x = (idx as usize % wu) as u32;
        let y = (idx as usize / wu) as u32;

        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        // Left
        if x > 0 {
            let ni = idx as usize - 1;
            if data[ni] == target {
                data[ni] = label;
                stack.push(ni as u32);
            }
        }
        // Right
        if x + 1 < w {
            let ni = idx as usize + 1;
            if data[ni] == target {
                data[ni] = label;
                stack.push(ni as u32);
            }
        }
        // Up
        if y > 0 {
            let ni = idx as usize - wu;
            if data[ni] == target {
                data[ni] = label;
                stack.push(ni as u32);
            }
        }
        // Down
        if y + 1 < h {
            let ni = idx as usize + wu;
            if data[ni] == target {
                data[ni] = label;
                stack.push(ni as u32);
            }
        }
    }

    Some((min_x, min_y, max_x, max_y))
}

/// Paint every superpixel that intersects the disk of `radius` around
/// `center`.  The region under the centre pixel is always included.
///
/// Returns `None` if the index does not match the buffer's dimensions.
pub fn region_fill(
    buffer: &mut LabelBuffer,
    index: &SuperpixelIndex,
    center: Pos2,
    radius: f32,
    label: u8,
) -> Option<PixelBounds> {
    if index.dimensions() != buffer.dimensions() {
        return None;
    }
    let (cx, cy) = buffer.pixel_at(center)?;
    let (w, h) = buffer.dimensions();
    let regions = index.regions();

    let mut selected = vec![false; index.region_count() as usize];
    let mark = |selected: &mut Vec<bool>, x: u32, y: u32| {
        let id = regions[y as usize * w as usize + x as usize] as usize;
        if let Some(slot) = selected.get_mut(id) {
            *slot = true;
        }
    };
    mark(&mut selected, cx, cy);

    let r = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
    let r2 = r * r + 1e-3;
    let y0 = ((center.y - r).ceil() as i64).max(0);
    let y1 = ((center.y + r).floor() as i64).min(h as i64 - 1);
    for y in y0..=y1 {
        let dy = y as f32 - center.y;
        let rem = r2 - dy * dy;
        if rem < 0.0 {
            continue;
        }
        let half = rem.sqrt();
        let x0 = ((center.x - half).ceil() as i64).max(0);
        let x1 = ((center.x + half).floor() as i64).min(w as i64 - 1);
        for x in x0..=x1 {
            mark(&mut selected, x as u32, y as u32);
        }
    }

    let selected = &selected;
    buffer
        .as_raw_mut()
        .par_chunks_mut(w as usize)
        .zip(regions.par_chunks(w as usize))
        .enumerate()
        .filter_map(|(y, (row, ids))| {
            let mut span: Option<(u32, u32)> = None;
            for (x, (px, &id)) in row.iter_mut().zip(ids).enumerate() {
                if selected.get(id as usize).copied().unwrap_or(false) {
                    *px = label;
                    let x = x as u32;
                    span = Some(span.map_or((x, x), |(a, _)| (a, x)));
                }
            }
            span.map(|(a, b)| (a, y as u32, b, y as u32))
        })
        .reduce_with(merge_bounds)
}
