use egui::{Modifiers, PointerButton, Pos2, Rect};
use serde::{Deserialize, Serialize};

use crate::canvas::BrushPoint;

/// Editing mode of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Selection,
    #[default]
    Points,
    Lines,
    Fill,
    #[serde(rename = "superpixels")]
    SuperPixels,
    Polygons,
}

impl Tool {
    pub fn all() -> [Tool; 6] {
        [
            Tool::Selection,
            Tool::Points,
            Tool::Lines,
            Tool::Fill,
            Tool::SuperPixels,
            Tool::Polygons,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            Tool::Selection => "Selection",
            Tool::Points => "Points",
            Tool::Lines => "Lines",
            Tool::Fill => "Fill",
            Tool::SuperPixels => "Superpixels",
            Tool::Polygons => "Polygons",
        }
    }

    /// History description for edits made with this tool.
    pub fn action_name(self) -> &'static str {
        match self {
            Tool::Selection => "Clear Selection",
            Tool::Points => "Brush Dab",
            Tool::Lines => "Line",
            Tool::Fill => "Flood Fill",
            Tool::SuperPixels => "Superpixel Paint",
            Tool::Polygons => "Polygon",
        }
    }

    /// Whether the brush radius applies to this tool.
    pub fn uses_radius(self) -> bool {
        matches!(self, Tool::Points | Tool::Lines | Tool::SuperPixels)
    }
}

// ============================================================================
// POINTER INPUT
// ============================================================================

/// Pointer input in screen space (pixels of the zoomed view).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Pressed {
        pos: Pos2,
        button: PointerButton,
        modifiers: Modifiers,
    },
    Moved {
        pos: Pos2,
        modifiers: Modifiers,
    },
    Released {
        pos: Pos2,
        button: PointerButton,
        modifiers: Modifiers,
    },
}

impl PointerEvent {
    pub fn pos(&self) -> Pos2 {
        match self {
            PointerEvent::Pressed { pos, .. }
            | PointerEvent::Moved { pos, .. }
            | PointerEvent::Released { pos, .. } => *pos,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        match self {
            PointerEvent::Pressed { modifiers, .. }
            | PointerEvent::Moved { modifiers, .. }
            | PointerEvent::Released { modifiers, .. } => *modifiers,
        }
    }
}

// ============================================================================
// TOOL PROPERTIES & GESTURE STATE
// ============================================================================

/// Brush radius and active label shared by all tools.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolProperties {
    pub radius: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    pub label: u8,
}

impl Default for ToolProperties {
    fn default() -> Self {
        Self {
            radius: 10.0,
            min_radius: 0.0,
            max_radius: 100.0,
            label: 1,
        }
    }
}

impl ToolProperties {
    /// Clamp into the configured range; returns the stored value.
    pub fn set_radius(&mut self, radius: f32) -> f32 {
        let r = if radius.is_finite() { radius } else { self.radius };
        self.radius = r.clamp(self.min_radius, self.max_radius.max(self.min_radius));
        self.radius
    }
}

/// Drag state for Points and SuperPixels.
#[derive(Default, Clone, Debug)]
pub struct ToolState {
    pub drawing: bool,
    /// Screen position of the last move, for shift-drag radius changes.
    pub last_screen_pos: Option<Pos2>,
    /// Last known cursor in image space, for the brush outline.
    pub cursor: Option<Pos2>,
}

#[derive(Default, Clone, Debug)]
pub struct LineToolState {
    pub anchor: Option<BrushPoint>,
}

#[derive(Default, Clone, Debug)]
pub struct PolygonToolState {
    pub points: Vec<Pos2>,
}

#[derive(Default, Clone, Debug)]
pub struct SelectionToolState {
    pub dragging: bool,
    pub drag_start: Option<Pos2>,
    /// Normalised rectangle in image space.
    pub rect: Option<Rect>,
}

impl SelectionToolState {
    pub fn update(&mut self, corner: Pos2) {
        if let Some(start) = self.drag_start {
            self.rect = Some(Rect::from_two_pos(start, corner));
        }
    }
}

/// Active tool, its properties and every per-tool gesture state.
#[derive(Default)]
pub struct ToolsState {
    pub active_tool: Tool,
    pub properties: ToolProperties,
    pub tool_state: ToolState,
    pub line_state: LineToolState,
    pub polygon_state: PolygonToolState,
    pub selection_state: SelectionToolState,
}

impl ToolsState {
    pub fn new(active_tool: Tool, properties: ToolProperties) -> Self {
        Self {
            active_tool,
            properties,
            ..Default::default()
        }
    }

    /// Whether a gesture is in progress for the active tool.
    pub fn is_active(&self) -> bool {
        match self.active_tool {
            Tool::Points | Tool::SuperPixels => self.tool_state.drawing,
            Tool::Lines => self.line_state.anchor.is_some(),
            Tool::Polygons => !self.polygon_state.points.is_empty(),
            Tool::Selection => self.selection_state.dragging,
            Tool::Fill => false,
        }
    }

    /// Drop every in-progress gesture without committing anything.
    /// Returns true if a gesture was active.
    pub fn cancel_active_tool(&mut self) -> bool {
        let was_active = self.is_active();
        self.tool_state.drawing = false;
        self.tool_state.last_screen_pos = None;
        self.line_state.anchor = None;
        self.polygon_state.points.clear();
        self.selection_state.dragging = false;
        self.selection_state.drag_start = None;
        was_active
    }

    /// Switch tools. Callers cancel first.
    pub fn change_tool(&mut self, new_tool: Tool) -> bool {
        if self.active_tool == new_tool {
            return false;
        }
        self.active_tool = new_tool;
        true
    }
}
