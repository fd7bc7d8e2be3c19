use egui::{Pos2, Rect};
use image::{GrayImage, RgbaImage};
use rayon::prelude::*;

use crate::components::colors::Palette;
use crate::ops::superpixels::SuperpixelIndex;
use crate::ops::{fill, shapes};

/// Inclusive bounding box of touched pixels: `(min_x, min_y, max_x, max_y)`.
pub type PixelBounds = (u32, u32, u32, u32);

/// Smallest box covering both inputs.
pub fn merge_bounds(a: PixelBounds, b: PixelBounds) -> PixelBounds {
    (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3))
}

pub fn union_bounds(a: Option<PixelBounds>, b: Option<PixelBounds>) -> Option<PixelBounds> {
    match (a, b) {
        (Some(a), Some(b)) => Some(merge_bounds(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

// ============================================================================
// LABEL BUFFER – one u8 class id per pixel
// ============================================================================

/// Row-major grid of label ids.
///
/// Pixel `(x, y)` is sampled at the image-space coordinate `(x, y)`; all
/// geometry in `ops` measures distances to that point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl LabelBuffer {
    pub fn new(width: u32, height: u32, label: u8) -> Self {
        Self {
            width,
            height,
            data: vec![label; width as usize * height as usize],
        }
    }

    /// Wrap existing row-major data. Returns `None` on a length mismatch.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_gray_image(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.as_raw().clone(),
        }
    }

    /// Grayscale image with the label id as intensity.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
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

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.data[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    /// Set a single pixel; out-of-range coordinates are ignored.
    pub fn set(&mut self, x: u32, y: u32, label: u8) -> bool {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize] = label;
            true
        } else {
            false
        }
    }

    pub fn fill(&mut self, label: u8) {
        self.data.fill(label);
    }

    /// Fill `x0..=x1` on row `y`. Callers clip beforehand.
    pub(crate) fn fill_span(&mut self, y: u32, x0: u32, x1: u32, label: u8) {
        let row = y as usize * self.width as usize;
        self.data[row + x0 as usize..=row + x1 as usize].fill(label);
    }

    /// Nearest pixel to an image-space position, clamped into the buffer.
    pub fn pixel_at(&self, pos: Pos2) -> Option<(u32, u32)> {
        if self.is_empty() || !pos.x.is_finite() || !pos.y.is_finite() {
            return None;
        }
        let x = pos.x.round().clamp(0.0, (self.width - 1) as f32) as u32;
        let y = pos.y.round().clamp(0.0, (self.height - 1) as f32) as u32;
        Some((x, y))
    }

    /// Number of pixels holding `label`.
    pub fn count(&self, label: u8) -> usize {
        self.data.par_iter().filter(|&&l| l == label).count()
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }
}

// ============================================================================
// BRUSH POINT
// ============================================================================

/// An image-space position with a brush radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushPoint {
    pub pos: Pos2,
    pub radius: f32,
}

impl BrushPoint {
    pub fn new(pos: Pos2, radius: f32) -> Self {
        Self {
            pos,
            radius: radius.max(0.0),
        }
    }
}

// ============================================================================
// PROBABILITY STACK – per-class scores from an external classifier
// ============================================================================

/// Class-major probability volume: `data[c * width * height + y * width + x]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityStack {
    pub width: u32,
    pub height: u32,
    pub classes: u32,
    pub data: Vec<f32>,
}

impl ProbabilityStack {
    pub fn new(width: u32, height: u32, classes: u32, data: Vec<f32>) -> Option<Self> {
        let expected = width as usize * height as usize * classes as usize;
        (data.len() == expected && classes > 0 && classes <= 256).then_some(Self {
            width,
            height,
            classes,
            data,
        })
    }

    /// Most probable class per pixel. Ties resolve to the lowest class id.
    pub fn argmax(&self) -> LabelBuffer {
        let plane = self.width as usize * self.height as usize;
        let classes = self.classes as usize;
        let data = &self.data;
        let labels: Vec<u8> = (0..plane)
            .into_par_iter()
            .map(|i| {
                let mut best = 0usize;
                let mut best_p = f32::NEG_INFINITY;
                for c in 0..classes {
                    let p = data[c * plane + i];
                    if p > best_p {
                        best_p = p;
                        best = c;
                    }
                }
                best as u8
            })
            .collect();
        LabelBuffer {
            width: self.width,
            height: self.height,
            data: labels,
        }
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// One label buffer with its display parameters and a lazily rebuilt
/// colour rendering.
pub struct Layer {
    pub name: String,
    pub visible: bool,
    opacity: f32,
    default_label: u8,
    palette: Palette,
    mask: LabelBuffer,
    /// Palette-mapped rendering; `None` while dirty.
    render_cache: Option<RgbaImage>,
    /// Bumped on every pixel or palette change.
    generation: u64,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, default_label: u8, palette: Palette) -> Self {
        Self {
            name: name.into(),
            visible: true,
            opacity: 1.0,
            default_label,
            palette,
            mask: LabelBuffer::new(width, height, default_label),
            render_cache: None,
            generation: 0,
        }
    }

    /// Replace the buffer with a default-filled one of the given size.
    pub fn reset(&mut self, width: u32, height: u32) {
        self.mask = LabelBuffer::new(width, height, self.default_label);
        self.mark_dirty();
    }

    pub fn set_mask(&mut self, mask: LabelBuffer) {
        self.mask = mask;
        self.mark_dirty();
    }

    pub fn mask(&self) -> &LabelBuffer {
        &self.mask
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn default_label(&self) -> u8 {
        self.default_label
    }

    pub fn set_default_label(&mut self, label: u8) {
        self.default_label = label;
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
        self.mark_dirty();
    }

    pub fn is_dirty(&self) -> bool {
        self.render_cache.is_none()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mark_dirty(&mut self) {
        self.render_cache = None;
        self.generation += 1;
    }

    /// Colour rendering of the buffer, rebuilt only after a change.
    pub fn rendered_image(&mut self) -> &RgbaImage {
        let image = match self.render_cache.take() {
            Some(image) => image,
            None => self.render(),
        };
        self.render_cache.insert(image)
    }

    /// Cached rendering without rebuilding.
    pub fn cached_image(&self) -> Option<&RgbaImage> {
        self.render_cache.as_ref()
    }

    fn render(&self) -> RgbaImage {
        let (w, h) = self.mask.dimensions();
        let colors = self.palette.colors();
        let mut out = vec![0u8; self.mask.as_raw().len() * 4];
        out.par_chunks_mut(4)
            .zip(self.mask.as_raw().par_iter())
            .for_each(|(px, &label)| px.copy_from_slice(&colors[label as usize].0));
        RgbaImage::from_raw(w, h, out).unwrap_or_else(|| RgbaImage::new(w, h))
    }

    fn touched(&mut self, bounds: Option<PixelBounds>) -> Option<PixelBounds> {
        if bounds.is_some() {
            self.mark_dirty();
        }
        bounds
    }

    // ---- drawing primitives -------------------------------------------------

    pub fn draw_point(&mut self, point: &BrushPoint, label: u8) -> Option<PixelBounds> {
        let bounds = shapes::draw_circle(&mut self.mask, point.pos, point.radius, label);
        self.touched(bounds)
    }

    pub fn draw_stroke(&mut self, start: &BrushPoint, end: &BrushPoint, label: u8) -> Option<PixelBounds> {
        let bounds = shapes::draw_capsule(&mut self.mask, start, end, label);
        self.touched(bounds)
    }

    pub fn draw_polygon(&mut self, points: &[Pos2], label: u8) -> Option<PixelBounds> {
        let bounds = shapes::fill_polygon(&mut self.mask, points, label);
        self.touched(bounds)
    }

    pub fn flood_fill(&mut self, seed: Pos2, label: u8) -> Option<PixelBounds> {
        let bounds = fill::flood_fill(&mut self.mask, seed, label);
        self.touched(bounds)
    }

    pub fn draw_superpixels(&mut self, index: &SuperpixelIndex, point: &BrushPoint, label: u8) -> Option<PixelBounds> {
        let bounds = fill::region_fill(&mut self.mask, index, point.pos, point.radius, label);
        self.touched(bounds)
    }

    pub fn clear_rect(&mut self, rect: Rect, label: u8) -> Option<PixelBounds> {
        let bounds = shapes::clear_rect(&mut self.mask, rect, label);
        self.touched(bounds)
    }
}

// ============================================================================
// CANVAS STATE – the layer stack
// ============================================================================

pub struct CanvasState {
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
    pub width: u32,
    pub height: u32,
}

impl CanvasState {
    pub fn new(layers: Vec<Layer>) -> Self {
        let (width, height) = layers.first().map(|l| l.mask().dimensions()).unwrap_or((0, 0));
        Self {
            layers,
            active_layer_index: 0,
            width,
            height,
        }
    }

    /// Resize every layer to `width × height`, filled with its default label.
    pub fn reset(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        for layer in &mut self.layers {
            layer.reset(width, height);
        }
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active_layer_index)
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        self.layers.get_mut(self.active_layer_index)
    }

    /// Blend every visible layer, bottom to top, over `base`.
    ///
    /// Each layer pixel contributes `palette alpha × layer opacity`.  A base
    /// image of the wrong size is replaced by transparent black.
    pub fn composite_over(&mut self, base: &RgbaImage) -> RgbaImage {
        let mut result = if base.dimensions() == (self.width, self.height) {
            base.clone()
        } else {
            RgbaImage::new(self.width, self.height)
        };

        for layer in self.layers.iter_mut().filter(|l| l.visible && l.opacity > 0.0) {
            layer.rendered_image();
        }
        let sources: Vec<(&[u8], f32)> = self
            .layers
            .iter()
            .filter(|l| l.visible && l.opacity > 0.0)
            .filter_map(|l| {
                l.cached_image()
                    .filter(|img| img.dimensions() == (self.width, self.height))
                    .map(|img| (img.as_raw().as_slice(), l.opacity))
            })
            .collect();
        if sources.is_empty() {
            return result;
        }

        let out: &mut [u8] = &mut result;
        out.par_chunks_mut(4).enumerate().for_each(|(i, px)| {
            let o = i * 4;
            let mut r = px[0] as f32;
            let mut g = px[1] as f32;
            let mut b = px[2] as f32;
            let mut a = px[3] as f32 / 255.0;
            for (src, opacity) in &sources {
                let sa = src[o + 3] as f32 / 255.0 * opacity;
                if sa <= 0.0 {
                    continue;
                }
                r = r * (1.0 - sa) + src[o] as f32 * sa;
                g = g * (1.0 - sa) + src[o + 1] as f32 * sa;
                b = b * (1.0 - sa) + src[o + 2] as f32 * sa;
                a = sa + a * (1.0 - sa);
            }
            px[0] = r.round().clamp(0.0, 255.0) as u8;
            px[1] = g.round().clamp(0.0, 255.0) as u8;
            px[2] = b.round().clamp(0.0, 255.0) as u8;
            px[3] = (a * 255.0).round().clamp(0.0, 255.0) as u8;
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn two_color_palette() -> Palette {
        let mut p = Palette::default().with_transparent(0);
        p.set_color(1, Rgba([255, 0, 0, 255]));
        p
    }

    #[test]
    fn buffer_roundtrips_through_gray_image() {
        let mut buf = LabelBuffer::new(4, 3, 2);
        buf.set(3, 2, 9);
        let gray = buf.to_gray_image();
        assert_eq!(gray.get_pixel(3, 2).0[0], 9);
        assert_eq!(LabelBuffer::from_gray_image(&gray), buf);
        assert!(LabelBuffer::from_raw(2, 2, vec![0; 3]).is_none());
    }

    #[test]
    fn pixel_at_rounds_and_clamps() {
        let buf = LabelBuffer::new(10, 5, 0);
        assert_eq!(buf.pixel_at(Pos2::new(3.4, 2.6)), Some((3, 3)));
        assert_eq!(buf.pixel_at(Pos2::new(-50.0, 900.0)), Some((0, 4)));
        assert_eq!(LabelBuffer::new(0, 0, 0).pixel_at(Pos2::ZERO), None);
    }

    #[test]
    fn render_cache_is_reused_until_dirty() {
        let mut layer = Layer::new("a", 8, 8, 0, two_color_palette());
        assert!(layer.is_dirty());
        assert_eq!(layer.rendered_image().get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert!(!layer.is_dirty());
        let generation = layer.generation();

        // Opacity is a display parameter only.
        layer.set_opacity(0.3);
        assert!(!layer.is_dirty());

        layer.draw_point(&BrushPoint::new(Pos2::new(4.0, 4.0), 1.0), 1);
        assert!(layer.is_dirty());
        assert!(layer.generation() > generation);
        assert_eq!(layer.rendered_image().get_pixel(4, 4).0, [255, 0, 0, 255]);
    }

    #[test]
    fn palette_swap_keeps_pixels() {
        let mut layer = Layer::new("a", 4, 4, 1, two_color_palette());
        let before = layer.mask().clone();
        layer.set_palette(Palette::default());
        assert_eq!(layer.mask(), &before);
        assert!(layer.is_dirty());
    }

    #[test]
    fn noop_primitive_does_not_dirty() {
        let mut layer = Layer::new("a", 4, 4, 1, two_color_palette());
        layer.rendered_image();
        assert_eq!(layer.flood_fill(Pos2::new(1.0, 1.0), 1), None);
        assert!(!layer.is_dirty());
    }

    #[test]
    fn composite_respects_order_and_opacity() {
        let mut bottom = Layer::new("bottom", 2, 1, 1, two_color_palette());
        let mut top = Layer::new("top", 2, 1, 0, two_color_palette());
        top.set_mask(LabelBuffer::from_raw(2, 1, vec![0, 1]).unwrap());
        top.set_opacity(0.5);
        bottom.set_opacity(1.0);
        let mut canvas = CanvasState::new(vec![bottom, top]);
        let base = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 255, 255]));
        let out = canvas.composite_over(&base);
        // Pixel 0: bottom red fully over blue, top transparent.
        assert_eq!(out.get_pixel(0, 0).0, [255, 0, 0, 255]);
        // Pixel 1: red over blue, then red at half opacity: still red.
        assert_eq!(out.get_pixel(1, 0).0, [255, 0, 0, 255]);

        canvas.layers[0].visible = false;
        let out = canvas.composite_over(&base);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [128, 0, 128, 255]);
    }

    #[test]
    fn argmax_picks_highest_class() {
        let stack = ProbabilityStack::new(
            2,
            1,
            3,
            vec![
                0.1, 0.5, // class 0
                0.7, 0.2, // class 1
                0.2, 0.3, // class 2
            ],
        )
        .unwrap();
        assert_eq!(stack.argmax().as_raw(), &[1, 0]);
        assert!(ProbabilityStack::new(2, 1, 3, vec![0.0; 5]).is_none());
    }
}
