//! SLIC superpixel segmentation.
//!
//! The index assigns every pixel a dense region id and records which pixels
//! sit on a region boundary.  It is built once per image/parameter pair and
//! only read while painting.

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// SLIC tuning parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperpixelParams {
    /// Seed grid step `S` in pixels.
    pub region_size: u32,
    /// Weight of spatial distance against colour distance.
    pub smoothness: f32,
    /// Maximum clustering rounds.
    pub iterations: u32,
}

impl Default for SuperpixelParams {
    fn default() -> Self {
        Self {
            region_size: 20,
            smoothness: 10.0,
            iterations: 10,
        }
    }
}

/// Centres moving less than this (in pixels) end the clustering early.
const CONVERGENCE_SHIFT: f32 = 0.5;

#[derive(Clone, Copy, Debug, Default)]
struct Lab {
    l: f32,
    a: f32,
    b: f32,
}

impl Lab {
    #[inline]
    fn distance(self, other: Lab) -> f32 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        (dl * dl + da * da + db * db).sqrt()
    }

    #[inline]
    fn distance_squared(self, other: Lab) -> f32 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        dl * dl + da * da + db * db
    }
}

#[derive(Clone, Copy, Debug)]
struct ClusterCenter {
    lab: Lab,
    x: f32,
    y: f32,
}

// ============================================================================
// INDEX
// ============================================================================

/// Region id per pixel plus the derived boundary mask.
#[derive(Clone, Debug, PartialEq)]
pub struct SuperpixelIndex {
    width: u32,
    height: u32,
    regions: Vec<u32>,
    region_count: u32,
    boundary: Vec<bool>,
}

impl SuperpixelIndex {
    /// Segment `image` with SLIC. Returns `None` for an empty image.
    pub fn compute(image: &RgbaImage, params: &SuperpixelParams) -> Option<Self> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        let start = Instant::now();
        let labs = to_lab(image);
        let step = params.region_size.max(1) as usize;
        let raw = slic(&labs, w as usize, h as usize, step, params);
        let min_size = (step * step / 4).max(1);
        let (regions, region_count) = enforce_connectivity(&raw, w as usize, h as usize, min_size);
        let index = Self::build(w, h, regions, region_count);
        crate::log_info!(
            "Superpixels: {} regions for {}x{} in {:.1} ms",
            index.region_count,
            w,
            h,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Some(index)
    }

    /// Wrap a precomputed region grid, renumbering ids densely in order of
    /// first appearance.  Regions are taken as given; connectivity is not
    /// enforced.
    pub fn from_regions(width: u32, height: u32, regions: Vec<u32>) -> Option<Self> {
        if regions.len() != width as usize * height as usize || regions.is_empty() {
            return None;
        }
        let mut remap = std::collections::HashMap::new();
        let dense: Vec<u32> = regions
            .iter()
            .map(|id| {
                let next = remap.len() as u32;
                *remap.entry(*id).or_insert(next)
            })
            .collect();
        let count = remap.len() as u32;
        Some(Self::build(width, height, dense, count))
    }

    fn build(width: u32, height: u32, regions: Vec<u32>, region_count: u32) -> Self {
        let boundary = boundary_mask(&regions, width as usize, height as usize);
        Self {
            width,
            height,
            regions,
            region_count,
            boundary,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn region_count(&self) -> u32 {
        self.region_count
    }

    /// Row-major region ids.
    pub fn regions(&self) -> &[u32] {
        &self.regions
    }

    pub fn region_at(&self, x: u32, y: u32) -> Option<u32> {
        (x < self.width && y < self.height)
            .then(|| self.regions[y as usize * self.width as usize + x as usize])
    }

    /// `true` where the right or lower neighbour belongs to another region.
    pub fn boundary_mask(&self) -> &[bool] {
        &self.boundary
    }

    pub fn is_boundary(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.boundary[y as usize * self.width as usize + x as usize]
    }

    /// Blend `color` over the boundary pixels of a display image.
    pub fn overlay_boundaries(&self, image: &mut RgbaImage, color: [u8; 3], opacity: f32) {
        if image.dimensions() != (self.width, self.height) {
            return;
        }
        let a = opacity.clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let pixels: &mut [u8] = image;
        pixels
            .par_chunks_mut(4)
            .zip(self.boundary.par_iter())
            .filter(|(_, b)| **b)
            .for_each(|(px, _)| {
                for c in 0..3 {
                    px[c] = (px[c] as f32 * (1.0 - a) + color[c] as f32 * a).round() as u8;
                }
                px[3] = px[3].max((a * 255.0).round() as u8);
            });
    }
}

// ============================================================================
// SLIC
// ============================================================================

/// sRGB → CIELAB (D65), one pixel per rayon task.
fn to_lab(image: &RgbaImage) -> Vec<Lab> {
    image
        .as_raw()
        .par_chunks(4)
        .map(|px| rgb_to_lab(px[0], px[1], px[2]))
        .collect()
}

fn rgb_to_lab(r: u8, g: u8, b: u8) -> Lab {
    fn linear(c: u8) -> f32 {
        let c = c as f32 / 255.0;
        if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
    }
    fn f(t: f32) -> f32 {
        if t > 0.008_856 { t.cbrt() } else { 7.787 * t + 16.0 / 116.0 }
    }
    let (r, g, b) = (linear(r), linear(g), linear(b));
    let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / 0.950_47;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175 * b;
    let z = (0.019_333_9 * r + 0.119_192 * g + 0.950_304_1 * b) / 1.088_83;
    let (fx, fy, fz) = (f(x), f(y), f(z));
    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// Squared Lab gradient magnitude used to nudge seeds off edges.
fn gradient(labs: &[Lab], width: usize, height: usize) -> Vec<f32> {
    let mut grad = vec![0.0f32; labs.len()];
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let idx = y * width + x;
            grad[idx] = labs[idx + 1].distance_squared(labs[idx - 1])
                + labs[idx + width].distance_squared(labs[idx - width]);
        }
    }
    grad
}

fn seed_centers(labs: &[Lab], width: usize, height: usize, step: usize) -> Vec<ClusterCenter> {
    let grad = gradient(labs, width, height);
    let mut centers = Vec::new();
    let mut y = step / 2;
    while y < height {
        let mut x = step / 2;
        while x < width {
            // Lowest gradient in the 3x3 neighbourhood.
            let (mut bx, mut by) = (x, y);
            let mut best = f32::MAX;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let g = grad[ny * width + nx];
                    if g < best {
                        best = g;
                        bx = nx;
                        by = ny;
                    }
                }
            }
            centers.push(ClusterCenter {
                lab: labs[by * width + bx],
                x: bx as f32,
                y: by as f32,
            });
            x += step;
        }
        y += step;
    }
    if centers.is_empty() {
        let (cx, cy) = (width / 2, height / 2);
        centers.push(ClusterCenter {
            lab: labs[cy * width + cx],
            x: cx as f32,
            y: cy as f32,
        });
    }
    centers
}

/// Cluster pixels around grid seeds; returns a (possibly fragmented) label
/// per pixel.
fn slic(labs: &[Lab], width: usize, height: usize, step: usize, params: &SuperpixelParams) -> Vec<u32> {
    let mut centers = seed_centers(labs, width, height, step);
    let s = step as f32;
    let weight = params.smoothness.max(0.0) / s;
    let mut labels = vec![u32::MAX; labs.len()];
    let mut distances = vec![f32::MAX; labs.len()];

    for _ in 0..params.iterations.max(1) {
        distances.fill(f32::MAX);

        for (k, center) in centers.iter().enumerate() {
            let x_min = (center.x - 2.0 * s).max(0.0) as usize;
            let x_max = (center.x + 2.0 * s).min(width as f32 - 1.0) as usize;
            let y_min = (center.y - 2.0 * s).max(0.0) as usize;
            let y_max = (center.y + 2.0 * s).min(height as f32 - 1.0) as usize;
            for y in y_min..=y_max {
                let dy = y as f32 - center.y;
                for x in x_min..=x_max {
                    let idx = y * width + x;
                    let dx = x as f32 - center.x;
                    let d = center.lab.distance(labs[idx]) + weight * (dx * dx + dy * dy).sqrt();
                    if d < distances[idx] {
                        distances[idx] = d;
                        labels[idx] = k as u32;
                    }
                }
            }
        }

        let mut sums = vec![(Lab::default(), 0.0f32, 0.0f32, 0usize); centers.len()];
        for (idx, &k) in labels.iter().enumerate() {
            if let Some((lab, sx, sy, n)) = sums.get_mut(k as usize) {
                lab.l += labs[idx].l;
                lab.a += labs[idx].a;
                lab.b += labs[idx].b;
                *sx += (idx % width) as f32;
                *sy += (idx / width) as f32;
                *n += 1;
            }
        }

        let mut max_shift = 0.0f32;
        for (center, (lab, sx, sy, n)) in centers.iter_mut().zip(sums) {
            if n == 0 {
                continue;
            }
            let n = n as f32;
            let (nx, ny) = (sx / n, sy / n);
            max_shift = max_shift.max(((center.x - nx).powi(2) + (center.y - ny).powi(2)).sqrt());
            center.lab = Lab {
                l: lab.l / n,
                a: lab.a / n,
                b: lab.b / n,
            };
            center.x = nx;
            center.y = ny;
        }
        if max_shift <= CONVERGENCE_SHIFT {
            break;
        }
    }
    labels
}

/// Relabel 4-connected components in raster order, folding components
/// smaller than `min_size` into the region of the previously visited
/// neighbour of their first pixel.  Returns dense ids and their count.
fn enforce_connectivity(labels: &[u32], width: usize, height: usize, min_size: usize) -> (Vec<u32>, u32) {
    let mut out = vec![u32::MAX; labels.len()];
    let mut next = 0u32;
    let mut stack: Vec<usize> = Vec::new();
    let mut component: Vec<usize> = Vec::new();

    for start in 0..labels.len() {
        if out[start] != u32::MAX {
            continue;
        }
        let (sx, sy) = (start % width, start / width);
        // Left or upper neighbour is always visited before `start`.
        let adjacent = if sx > 0 {
            Some(out[start - 1])
        } else if sy > 0 {
            Some(out[start - width])
        } else {
            None
        };

        let original = labels[start];
        component.clear();
        out[start] = next;
        stack.push(start);
        while let Some(idx) = stack.pop() {
            component.push(idx);
            let (x, y) = (idx % width, idx / width);
            let mut visit = |ni: usize| {
                if out[ni] == u32::MAX && labels[ni] == original {
                    out[ni] = next;
                    stack.push(ni);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - width);
            }
            if y + 1 < height {
                visit(idx + width);
            }
        }

        match adjacent {
            Some(adj) if component.len() < min_size => {
                for &idx in &component {
                    out[idx] = adj;
                }
            }
            _ => next += 1,
        }
    }
    (out, next)
}

/// Parallel over rows: a pixel is a boundary when its right or lower
/// neighbour carries a different region id.
fn boundary_mask(regions: &[u32], width: usize, height: usize) -> Vec<bool> {
    let mut mask = vec![false; regions.len()];
    if width == 0 {
        return mask;
    }
    mask.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let base = y * width;
        for (x, cell) in row.iter_mut().enumerate() {
            let id = regions[base + x];
            let right = x + 1 < width && regions[base + x + 1] != id;
            let down = y + 1 < height && regions[base + width + x] != id;
            *cell = right || down;
        }
    });
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn quadrants(size: u32) -> RgbaImage {
        let half = size / 2;
        RgbaImage::from_fn(size, size, |x, y| match (x < half, y < half) {
            (true, true) => Rgba([255, 0, 0, 255]),
            (false, true) => Rgba([0, 255, 0, 255]),
            (true, false) => Rgba([0, 0, 255, 255]),
            (false, false) => Rgba([255, 255, 0, 255]),
        })
    }

    fn is_connected(index: &SuperpixelIndex, id: u32) -> bool {
        let (w, h) = (index.width() as usize, index.height() as usize);
        let regions = index.regions();
        let Some(start) = regions.iter().position(|&r| r == id) else {
            return false;
        };
        let mut seen = vec![false; regions.len()];
        let mut stack = vec![start];
        seen[start] = true;
        let mut count = 0;
        while let Some(i) = stack.pop() {
            count += 1;
            let (x, y) = (i % w, i / w);
            let mut push = |n: usize| {
                if !seen[n] && regions[n] == id {
                    seen[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                push(i - 1);
            }
            if x + 1 < w {
                push(i + 1);
            }
            if y > 0 {
                push(i - w);
            }
            if y + 1 < h {
                push(i + w);
            }
        }
        count == regions.iter().filter(|&&r| r == id).count()
    }

    #[test]
    fn empty_image_has_no_index() {
        assert!(SuperpixelIndex::compute(&RgbaImage::new(0, 0), &SuperpixelParams::default()).is_none());
    }

    #[test]
    fn regions_are_dense_and_connected() {
        let image = quadrants(40);
        let params = SuperpixelParams {
            region_size: 10,
            ..Default::default()
        };
        let index = SuperpixelIndex::compute(&image, &params).unwrap();
        let count = index.region_count();
        assert!(count >= 4);
        let mut used = vec![false; count as usize];
        for &r in index.regions() {
            used[r as usize] = true;
        }
        assert!(used.iter().all(|&u| u));
        for id in 0..count {
            assert!(is_connected(&index, id), "region {id} is fragmented");
        }
    }

    #[test]
    fn regions_respect_strong_colour_edges() {
        let image = quadrants(40);
        let params = SuperpixelParams {
            region_size: 10,
            smoothness: 1.0,
            iterations: 10,
        };
        let index = SuperpixelIndex::compute(&image, &params).unwrap();
        // No region straddles the red/green seam on the top row.
        for y in 0..20 {
            let left = index.region_at(19, y).unwrap();
            let right = index.region_at(20, y).unwrap();
            assert_ne!(left, right);
        }
    }

    #[test]
    fn uniform_image_small_region_size() {
        let image = RgbaImage::from_pixel(7, 5, Rgba([10, 10, 10, 255]));
        let params = SuperpixelParams {
            region_size: 1,
            ..Default::default()
        };
        let index = SuperpixelIndex::compute(&image, &params).unwrap();
        assert!(index.region_count() >= 1);
        assert_eq!(index.regions().len(), 35);
        assert!(index.regions().iter().all(|&r| r < index.region_count()));
    }

    #[test]
    fn boundary_marks_right_and_lower_edges() {
        let index = SuperpixelIndex::from_regions(3, 2, vec![7, 7, 9, 7, 7, 9]).unwrap();
        assert_eq!(index.region_count(), 2);
        assert_eq!(index.region_at(2, 0), Some(1));
        assert_eq!(
            index.boundary_mask(),
            &[false, true, false, false, true, false]
        );
        assert!(SuperpixelIndex::from_regions(3, 2, vec![0; 5]).is_none());
    }

    #[test]
    fn overlay_only_touches_boundaries() {
        let index = SuperpixelIndex::from_regions(2, 1, vec![0, 1]).unwrap();
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        index.overlay_boundaries(&mut image, [255, 255, 0], 1.0);
        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 0, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn small_fragments_merge_into_neighbour() {
        // A lone pixel of id 5 inside region 1 is folded away.
        let labels = vec![1, 1, 1, 1, 5, 1, 1, 1, 1];
        let (out, count) = enforce_connectivity(&labels, 3, 3, 2);
        assert_eq!(count, 1);
        assert!(out.iter().all(|&r| r == 0));
    }
}
