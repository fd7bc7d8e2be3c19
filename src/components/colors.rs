use egui::Color32;
use image::Rgba;
use std::sync::OnceLock;

use crate::config::LabelConfig;

/// Number of addressable label ids.
pub const PALETTE_SIZE: usize = 256;

/// Hand-picked leading colours; the remainder of the table is generated.
const BASE_COLORS: [[u8; 3]; 20] = [
    [0, 0, 0],
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
    [210, 245, 60],
    [250, 190, 212],
    [0, 128, 128],
    [220, 190, 255],
    [170, 110, 40],
    [255, 250, 200],
    [128, 0, 0],
    [170, 255, 195],
    [128, 128, 0],
    [255, 215, 180],
    [0, 0, 128],
];

static DEFAULT_COLORS: OnceLock<[Rgba<u8>; PALETTE_SIZE]> = OnceLock::new();

/// Process-wide default colour table, built once on first use.
pub fn default_colors() -> &'static [Rgba<u8>; PALETTE_SIZE] {
    DEFAULT_COLORS.get_or_init(build_default_colors)
}

fn build_default_colors() -> [Rgba<u8>; PALETTE_SIZE] {
    let mut colors = [Rgba([0, 0, 0, 255]); PALETTE_SIZE];
    for (slot, rgb) in colors.iter_mut().zip(BASE_COLORS.iter()) {
        *slot = Rgba([rgb[0], rgb[1], rgb[2], 255]);
    }
    // Golden-ratio hue walk keeps neighbouring ids visually distinct.
    const GOLDEN: f32 = 0.618_034;
    for (i, slot) in colors.iter_mut().enumerate().skip(BASE_COLORS.len()) {
        let h = (i as f32 * GOLDEN).fract();
        let l = if i % 2 == 0 { 0.45 } else { 0.6 };
        let (r, g, b) = hsl_to_rgb(h, 0.75, l);
        *slot = Rgba([
            (r * 255.0).round() as u8,
            (g * 255.0).round() as u8,
            (b * 255.0).round() as u8,
            255,
        ]);
    }
    colors
}

/// HSL (H: 0..1, S: 0..1, L: 0..1) → RGB (0..1)
fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 { t += 1.0; }
    if t > 1.0 { t -= 1.0; }
    if t < 1.0 / 6.0 { return p + (q - p) * 6.0 * t; }
    if t < 1.0 / 2.0 { return q; }
    if t < 2.0 / 3.0 { return p + (q - p) * (2.0 / 3.0 - t) * 6.0; }
    p
}

// ============================================================================
// PALETTE
// ============================================================================

/// Label id → display colour lookup used to render a label buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    colors: [Rgba<u8>; PALETTE_SIZE],
    transparent_label: Option<u8>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: *default_colors(),
            transparent_label: None,
        }
    }
}

impl Palette {
    /// Build a palette from a label configuration. Unconfigured ids keep the
    /// default table colours.
    pub fn from_config(config: &LabelConfig) -> Self {
        let mut palette = Self::default();
        for (id, entry) in config.labels.iter().enumerate().take(PALETTE_SIZE) {
            let [r, g, b] = entry.color;
            palette.colors[id] = Rgba([r, g, b, 255]);
        }
        if let Some(ignore) = config.ignore_label {
            palette.colors[ignore as usize] = Rgba(config.ignore_color);
        }
        if let Some(transparent) = config.transparent_label {
            palette = palette.with_transparent(transparent);
        }
        palette
    }

    /// Mark `label` as fully transparent.
    pub fn with_transparent(mut self, label: u8) -> Self {
        self.colors[label as usize].0[3] = 0;
        self.transparent_label = Some(label);
        self
    }

    pub fn set_color(&mut self, label: u8, color: Rgba<u8>) {
        self.colors[label as usize] = color;
        if self.transparent_label == Some(label) && color.0[3] != 0 {
            self.transparent_label = None;
        }
    }

    pub fn color(&self, label: u8) -> Rgba<u8> {
        self.colors[label as usize]
    }

    /// Opaque egui colour for outlines and swatches.
    pub fn color32(&self, label: u8) -> Color32 {
        let [r, g, b, _] = self.colors[label as usize].0;
        Color32::from_rgb(r, g, b)
    }

    pub fn colors(&self) -> &[Rgba<u8>; PALETTE_SIZE] {
        &self.colors
    }

    pub fn transparent_label(&self) -> Option<u8> {
        self.transparent_label
    }
}
