use serde::{Deserialize, Serialize};

use crate::ops::superpixels::SuperpixelParams;

/// One named class in the label configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub name: String,
    /// Display colour (RGB).
    pub color: [u8; 3],
}

impl LabelEntry {
    pub fn new(name: impl Into<String>, color: [u8; 3]) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }
}

/// Label configuration supplied by the host application.
///
/// Entry `i` of `labels` describes label id `i`.  The editor core never reads
/// this from disk itself; it only turns it into palettes and default ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub labels: Vec<LabelEntry>,
    /// Label every fresh buffer is filled with.
    pub default_label: u8,
    /// "Don't care" label, drawn with `ignore_color`.
    pub ignore_label: Option<u8>,
    /// RGBA colour of the ignored label.
    pub ignore_color: [u8; 4],
    /// Label rendered fully transparent so the image shows through.
    pub transparent_label: Option<u8>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            labels: vec![
                LabelEntry::new("background", [0, 0, 0]),
                LabelEntry::new("foreground", [230, 25, 75]),
            ],
            default_label: 0,
            ignore_label: Some(255),
            ignore_color: [255, 255, 255, 96],
            transparent_label: Some(0),
        }
    }
}

impl LabelConfig {
    /// Name of a label id, if configured.
    pub fn label_name(&self, id: u8) -> Option<&str> {
        if Some(id) == self.ignore_label {
            return Some("ignore");
        }
        self.labels.get(id as usize).map(|e| e.name.as_str())
    }

    /// Find a label id by (case-insensitive) name.
    pub fn label_id(&self, name: &str) -> Option<u8> {
        self.labels
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
            .and_then(|i| u8::try_from(i).ok())
    }
}

/// Per-layer settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub name: String,
    pub opacity: f32,
    pub visible: bool,
    /// Overrides `LabelConfig::default_label` for this layer.
    pub default_label: Option<u8>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            name: "annotation".to_string(),
            opacity: 0.6,
            visible: true,
            default_label: None,
        }
    }
}

impl LayerConfig {
    pub fn named(name: impl Into<String>, opacity: f32) -> Self {
        Self {
            name: name.into(),
            opacity,
            ..Default::default()
        }
    }
}

/// Brush radius range in image pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub radius: f32,
    pub min_radius: f32,
    pub max_radius: f32,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            radius: 10.0,
            min_radius: 0.0,
            max_radius: 100.0,
        }
    }
}

/// Everything an [`EditorSession`](crate::session::EditorSession) is built from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bottom-to-top layer stack.
    pub layers: Vec<LayerConfig>,
    pub labels: LabelConfig,
    pub brush: BrushConfig,
    pub superpixels: SuperpixelParams,
    /// RGB colour of the superpixel boundary overlay.
    pub boundary_color: [u8; 3],
    /// Opacity of the superpixel boundary overlay (0.0–1.0).
    pub boundary_opacity: f32,
    /// Maximum number of undo steps.
    pub max_undo_steps: usize,
    /// Memory cap for the undo/redo stacks, in bytes.
    pub max_history_bytes: Option<usize>,
    /// Index of the layer that receives edits after load.
    pub active_layer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            layers: vec![
                LayerConfig::named("prediction", 0.4),
                LayerConfig::named("annotation", 0.6),
            ],
            labels: LabelConfig::default(),
            brush: BrushConfig::default(),
            superpixels: SuperpixelParams::default(),
            boundary_color: [255, 255, 0],
            boundary_opacity: 0.5,
            max_undo_steps: 200,
            max_history_bytes: Some(512 * 1024 * 1024),
            active_layer: 1,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON session configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Default label for the layer at `index`.
    pub fn layer_default_label(&self, index: usize) -> u8 {
        self.layers
            .get(index)
            .and_then(|l| l.default_label)
            .unwrap_or(self.labels.default_label)
    }
}
