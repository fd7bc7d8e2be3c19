//! Interactive editing session: owns the layer stack, history, tool state
//! and superpixel index, and turns pointer events into drawing primitives.

use egui::{Color32, ColorImage, Modifiers, PointerButton, Pos2, Rect, Shape, Stroke, Vec2};
use image::RgbaImage;
use image::imageops::FilterType;
use uuid::Uuid;

use crate::canvas::{BrushPoint, CanvasState, LabelBuffer, Layer, PixelBounds, ProbabilityStack};
use crate::components::colors::Palette;
use crate::components::events::{EventLog, GestureKind};
use crate::components::history::HistoryManager;
use crate::components::tools::{PointerEvent, Tool, ToolProperties, ToolsState};
use crate::config::{LabelConfig, LayerConfig, SessionConfig};
use crate::ops::superpixels::{SuperpixelIndex, SuperpixelParams};

/// Brush radius change per screen pixel of vertical shift-drag.
pub const RADIUS_PER_SCREEN_PIXEL: f32 = 0.5;

pub const MIN_ZOOM: f32 = 0.01;
pub const MAX_ZOOM: f32 = 64.0;

pub struct EditorSession {
    id: Uuid,
    config: SessionConfig,
    palette: Palette,
    canvas: CanvasState,
    base_image: RgbaImage,
    history: HistoryManager,
    tools: ToolsState,
    superpixels: Option<SuperpixelIndex>,
    superpixel_params: SuperpixelParams,
    zoom: f32,
    events: EventLog,
    /// Radius set by a shift-drag, waiting for the host to read it.
    pending_radius_change: Option<f32>,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl EditorSession {
    pub fn new(config: SessionConfig) -> Self {
        let palette = Palette::from_config(&config.labels);
        let layer_configs = if config.layers.is_empty() {
            vec![LayerConfig::default()]
        } else {
            config.layers.clone()
        };
        let layers = layer_configs
            .iter()
            .enumerate()
            .map(|(i, lc)| {
                let mut layer = Layer::new(lc.name.clone(), 0, 0, config.layer_default_label(i), palette.clone());
                layer.set_opacity(lc.opacity);
                layer.visible = lc.visible;
                layer
            })
            .collect::<Vec<_>>();
        let mut canvas = CanvasState::new(layers);
        canvas.active_layer_index = config.active_layer.min(canvas.layers.len() - 1);

        let label = if config.labels.labels.len() > 1 { 1 } else { config.labels.default_label };
        let mut properties = ToolProperties {
            radius: config.brush.radius,
            min_radius: config.brush.min_radius,
            max_radius: config.brush.max_radius,
            label,
        };
        properties.set_radius(config.brush.radius);

        let history = HistoryManager::new(config.max_undo_steps).with_memory_limit(config.max_history_bytes);
        let id = Uuid::new_v4();
        crate::log_info!("Session {}: {} layer(s), active {}", id, canvas.layers.len(), canvas.active_layer_index);

        Self {
            id,
            superpixel_params: config.superpixels.clone(),
            config,
            palette,
            canvas,
            base_image: RgbaImage::new(0, 0),
            history,
            tools: ToolsState::new(Tool::default(), properties),
            superpixels: None,
            zoom: 1.0,
            events: EventLog::default(),
            pending_radius_change: None,
        }
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Replace the image and every layer mask.
    ///
    /// `masks[i]` seeds layer `i`; a missing mask or one whose size differs
    /// from the image leaves the layer filled with its default label.
    pub fn load_image(&mut self, image: RgbaImage, masks: Vec<Option<LabelBuffer>>) {
        let (w, h) = image.dimensions();
        self.canvas.reset(w, h);
        for (i, mask) in masks.into_iter().enumerate() {
            let Some(mask) = mask else { continue };
            let Some(layer) = self.canvas.layers.get_mut(i) else {
                crate::log_warn!("Load: mask for missing layer {} ignored", i);
                continue;
            };
            if mask.dimensions() == (w, h) {
                layer.set_mask(mask);
            } else {
                crate::log_info!(
                    "Load: mask for layer '{}' is {}x{}, image is {}x{}; using default label",
                    layer.name,
                    mask.width(),
                    mask.height(),
                    w,
                    h
                );
            }
        }
        self.base_image = image;
        self.history.clear();
        self.tools.cancel_active_tool();
        self.tools.selection_state.rect = None;
        self.tools.tool_state.cursor = None;
        self.events.reset();
        self.superpixels = None;
        if self.tools.active_tool == Tool::SuperPixels {
            self.ensure_superpixels();
        }
        crate::log_info!("Session {}: loaded {}x{} image", self.id, w, h);
    }

    /// Write the per-pixel arg-max of a classifier output into `layer`.
    /// Undoable. Returns false if the stack does not match the image.
    pub fn load_probabilities(&mut self, stack: &ProbabilityStack, layer: usize) -> bool {
        if (stack.width, stack.height) != self.dimensions() || layer >= self.canvas.layers.len() {
            crate::log_warn!(
                "Prediction: {}x{} stack for layer {} does not fit {}x{} canvas",
                stack.width,
                stack.height,
                layer,
                self.canvas.width,
                self.canvas.height
            );
            return false;
        }
        let mask = stack.argmax();
        self.history.snapshot("Load Prediction", &self.canvas);
        self.canvas.layers[layer].set_mask(mask);
        true
    }

    /// Replace one layer's mask directly (no history entry).
    pub fn set_mask(&mut self, layer: usize, mask: LabelBuffer) -> bool {
        let dims = self.dimensions();
        match self.canvas.layers.get_mut(layer) {
            Some(l) if mask.dimensions() == dims => {
                l.set_mask(mask);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // POINTER INPUT
    // ========================================================================

    /// Screen position → image position, clamped into the image.
    pub fn screen_to_image(&self, pos: Pos2) -> Pos2 {
        let (w, h) = self.dimensions();
        if w == 0 || h == 0 {
            return Pos2::ZERO;
        }
        let p = (pos.to_vec2() / self.zoom).to_pos2();
        Pos2::new(
            p.x.clamp(0.0, (w - 1) as f32),
            p.y.clamp(0.0, (h - 1) as f32),
        )
    }

    pub fn handle_event(&mut self, event: PointerEvent) {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return;
        }
        let image_pos = self.screen_to_image(event.pos());
        self.tools.tool_state.cursor = Some(image_pos);

        match event {
            PointerEvent::Moved { pos, modifiers } => self.on_move(pos, image_pos, modifiers),
            PointerEvent::Pressed { pos, button, modifiers } => {
                self.tools.tool_state.last_screen_pos = Some(pos);
                self.on_press(image_pos, button, modifiers);
            }
            PointerEvent::Released { button, .. } => self.on_release(image_pos, button),
        }
    }

    fn on_move(&mut self, screen: Pos2, image_pos: Pos2, modifiers: Modifiers) {
        let last = self.tools.tool_state.last_screen_pos.replace(screen);

        if modifiers.shift && self.tools.active_tool.uses_radius() {
            if let Some(last) = last {
                let dy = screen.y - last.y;
                let old = self.tools.properties.radius;
                let new = self.tools.properties.set_radius(old - dy * RADIUS_PER_SCREEN_PIXEL);
                if new != old {
                    self.pending_radius_change = Some(new);
                }
            }
            return;
        }

        match self.tools.active_tool {
            Tool::Points | Tool::SuperPixels if self.tools.tool_state.drawing => {
                self.paint_sample(image_pos);
            }
            Tool::Selection if self.tools.selection_state.dragging => {
                self.tools.selection_state.update(image_pos);
            }
            _ => {}
        }
    }

    fn on_press(&mut self, image_pos: Pos2, button: PointerButton, modifiers: Modifiers) {
        let primary = button == PointerButton::Primary;
        let radius = self.tools.properties.radius;

        match self.tools.active_tool {
            Tool::Points | Tool::SuperPixels => {
                if primary {
                    self.tools.tool_state.drawing = true;
                    self.events.record(GestureKind::BeginDrawing);
                    self.paint_sample(image_pos);
                }
            }
            Tool::Lines => {
                if !primary {
                    self.cancel();
                    return;
                }
                let point = BrushPoint::new(image_pos, radius);
                match self.tools.line_state.anchor.take() {
                    Some(anchor) => {
                        let label = self.tools.properties.label;
                        self.apply(Tool::Lines.action_name(), |layer, _| {
                            layer.draw_stroke(&anchor, &point, label)
                        });
                        if modifiers.command {
                            self.tools.line_state.anchor = Some(point);
                        } else {
                            self.events.record(GestureKind::EndDrawing);
                        }
                    }
                    None => {
                        self.tools.line_state.anchor = Some(point);
                        self.events.record(GestureKind::BeginDrawing);
                    }
                }
            }
            Tool::Fill => {
                if primary {
                    self.events.record(GestureKind::Click);
                    let label = self.tools.properties.label;
                    self.apply(Tool::Fill.action_name(), |layer, _| layer.flood_fill(image_pos, label));
                }
            }
            Tool::Polygons => {
                let points = &mut self.tools.polygon_state.points;
                if primary {
                    if points.is_empty() {
                        self.events.record(GestureKind::BeginDrawing);
                    }
                    points.push(image_pos);
                    return;
                }
                let was_drawing = !points.is_empty();
                points.push(image_pos);
                let vertices = std::mem::take(points);
                if vertices.len() > 2 {
                    let label = self.tools.properties.label;
                    self.apply(Tool::Polygons.action_name(), |layer, _| layer.draw_polygon(&vertices, label));
                }
                if was_drawing {
                    self.events.record(GestureKind::EndDrawing);
                }
            }
            Tool::Selection => {
                if primary {
                    let sel = &mut self.tools.selection_state;
                    sel.dragging = true;
                    sel.drag_start = Some(image_pos);
                    sel.rect = Some(Rect::from_two_pos(image_pos, image_pos));
                }
            }
        }
    }

    fn on_release(&mut self, image_pos: Pos2, button: PointerButton) {
        if button != PointerButton::Primary {
            return;
        }
        match self.tools.active_tool {
            Tool::Points | Tool::SuperPixels if self.tools.tool_state.drawing => {
                self.tools.tool_state.drawing = false;
                self.events.record(GestureKind::EndDrawing);
            }
            Tool::Selection if self.tools.selection_state.dragging => {
                let sel = &mut self.tools.selection_state;
                sel.update(image_pos);
                sel.dragging = false;
                sel.drag_start = None;
                self.events.record(GestureKind::Selection);
            }
            _ => {}
        }
    }

    /// One brush sample for the drag tools.
    fn paint_sample(&mut self, image_pos: Pos2) {
        let point = BrushPoint::new(image_pos, self.tools.properties.radius);
        let label = self.tools.properties.label;
        match self.tools.active_tool {
            Tool::Points => {
                self.apply(Tool::Points.action_name(), |layer, _| layer.draw_point(&point, label));
            }
            Tool::SuperPixels => {
                if self.superpixels.is_none() {
                    return;
                }
                self.apply(Tool::SuperPixels.action_name(), |layer, index| {
                    index.and_then(|index| layer.draw_superpixels(index, &point, label))
                });
            }
            _ => {}
        }
    }

    /// Snapshot, then run one primitive on the active layer.
    fn apply<F>(&mut self, description: &str, op: F) -> Option<PixelBounds>
    where
        F: FnOnce(&mut Layer, Option<&SuperpixelIndex>) -> Option<PixelBounds>,
    {
        self.canvas.active_layer()?;
        self.history.snapshot(description, &self.canvas);
        let index = self.superpixels.as_ref();
        let layer = self.canvas.active_layer_mut()?;
        op(layer, index)
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Switch tools. Any gesture in progress is cancelled first.
    pub fn set_tool(&mut self, tool: Tool) {
        self.cancel();
        if self.tools.change_tool(tool) {
            crate::log_info!("Tool: {}", tool.label());
        }
        if tool == Tool::SuperPixels {
            self.ensure_superpixels();
        }
    }

    pub fn tool(&self) -> Tool {
        self.tools.active_tool
    }

    /// Discard in-progress gestures and the selection. Buffers are untouched.
    pub fn cancel(&mut self) {
        if self.tools.cancel_active_tool() {
            self.events.record(GestureKind::EndDrawing);
        }
        self.tools.selection_state.rect = None;
    }

    /// Push the current state onto the undo stack.
    pub fn snapshot(&mut self, description: &str) {
        self.history.snapshot(description, &self.canvas);
    }

    pub fn undo(&mut self) -> Option<String> {
        self.cancel();
        let description = self.history.undo(&mut self.canvas)?;
        crate::log_info!("Undo: {}", description);
        Some(description)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.cancel();
        let description = self.history.redo(&mut self.canvas)?;
        crate::log_info!("Redo: {}", description);
        Some(description)
    }

    /// Reset the selected rectangle on the active layer to its default label.
    ///
    /// Selection corners are clamped pixel positions, so the pixels under
    /// both corners are included.
    pub fn delete_selection(&mut self) -> Option<PixelBounds> {
        let rect = self.tools.selection_state.rect.take()?;
        let rect = Rect::from_min_max(rect.min, rect.max + Vec2::splat(1.0));
        self.tools.selection_state.dragging = false;
        self.tools.selection_state.drag_start = None;
        self.apply(Tool::Selection.action_name(), |layer, _| {
            let label = layer.default_label();
            layer.clear_rect(rect, label)
        })
    }

    pub fn selection(&self) -> Option<Rect> {
        self.tools.selection_state.rect
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn set_zoom(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.zoom = factor.clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    /// Zoom given as a percentage (100 = 1:1).
    pub fn set_zoom_percent(&mut self, level: f32) {
        self.set_zoom(level / 100.0);
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Set the brush radius from the host UI. Does not raise a change
    /// notification.
    pub fn set_brush_radius(&mut self, radius: f32) -> f32 {
        self.tools.properties.set_radius(radius)
    }

    pub fn brush_radius(&self) -> f32 {
        self.tools.properties.radius
    }

    /// Radius changed by a shift-drag since the last call, if any.
    pub fn take_radius_change(&mut self) -> Option<f32> {
        self.pending_radius_change.take()
    }

    pub fn set_label(&mut self, label: u8) {
        self.tools.properties.label = label;
    }

    pub fn label(&self) -> u8 {
        self.tools.properties.label
    }

    pub fn set_active_layer(&mut self, index: usize) -> bool {
        if index >= self.canvas.layers.len() {
            return false;
        }
        self.cancel();
        self.canvas.active_layer_index = index;
        true
    }

    pub fn active_layer_index(&self) -> usize {
        self.canvas.active_layer_index
    }

    pub fn set_layer_opacity(&mut self, index: usize, opacity: f32) {
        if let Some(layer) = self.canvas.layers.get_mut(index) {
            layer.set_opacity(opacity);
        }
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) {
        if let Some(layer) = self.canvas.layers.get_mut(index) {
            layer.visible = visible;
        }
    }

    /// Swap in a new label configuration. Pixel data is kept; every layer
    /// gets the new palette.
    pub fn set_label_config(&mut self, labels: LabelConfig) {
        self.palette = Palette::from_config(&labels);
        for layer in &mut self.canvas.layers {
            layer.set_palette(self.palette.clone());
        }
        self.config.labels = labels;
    }

    pub fn label_config(&self) -> &LabelConfig {
        &self.config.labels
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Change SLIC parameters. The index is rebuilt now in superpixel mode,
    /// otherwise on the next switch into it.
    pub fn set_superpixel_params(&mut self, params: SuperpixelParams) {
        if params == self.superpixel_params {
            return;
        }
        self.superpixel_params = params;
        self.superpixels = None;
        if self.tools.active_tool == Tool::SuperPixels {
            self.ensure_superpixels();
        }
    }

    pub fn superpixel_params(&self) -> &SuperpixelParams {
        &self.superpixel_params
    }

    fn ensure_superpixels(&mut self) {
        if self.superpixels.is_none() {
            self.superpixels = SuperpixelIndex::compute(&self.base_image, &self.superpixel_params);
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.canvas.width, self.canvas.height)
    }

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.canvas.layers.get(index)
    }

    pub fn mask(&self, index: usize) -> Option<&LabelBuffer> {
        self.layer(index).map(|l| l.mask())
    }

    pub fn active_mask(&self) -> Option<&LabelBuffer> {
        self.canvas.active_layer().map(|l| l.mask())
    }

    pub fn base_image(&self) -> &RgbaImage {
        &self.base_image
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn superpixels(&self) -> Option<&SuperpixelIndex> {
        self.superpixels.as_ref()
    }

    pub fn line_anchor(&self) -> Option<BrushPoint> {
        self.tools.line_state.anchor
    }

    pub fn pending_polygon(&self) -> &[Pos2] {
        &self.tools.polygon_state.points
    }

    pub fn is_drawing(&self) -> bool {
        self.tools.tool_state.drawing
    }

    // ========================================================================
    // RENDERING
    // ========================================================================

    /// Composite the display image at the current zoom.
    pub fn render(&mut self) -> RgbaImage {
        let mut base = self.base_image.clone();
        if self.tools.active_tool == Tool::SuperPixels
            && let Some(index) = &self.superpixels
        {
            index.overlay_boundaries(&mut base, self.config.boundary_color, self.config.boundary_opacity);
        }
        let composite = self.canvas.composite_over(&base);

        let (w, h) = composite.dimensions();
        if w == 0 || h == 0 || (self.zoom - 1.0).abs() < f32::EPSILON {
            return composite;
        }
        let zw = ((w as f32 * self.zoom).round() as u32).max(1);
        let zh = ((h as f32 * self.zoom).round() as u32).max(1);
        let filter = if self.zoom >= 1.0 { FilterType::Nearest } else { FilterType::Triangle };
        image::imageops::resize(&composite, zw, zh, filter)
    }

    /// [`render`](Self::render) as an egui texture source.
    pub fn to_color_image(&mut self) -> ColorImage {
        let image = self.render();
        let size = [image.width() as usize, image.height() as usize];
        ColorImage::from_rgba_unmultiplied(size, image.as_raw())
    }

    /// Live gesture feedback in screen space, with the image's top-left
    /// corner drawn at `origin`.
    pub fn overlay_shapes(&self, origin: Pos2) -> Vec<Shape> {
        let zoom = self.zoom;
        let to_screen = |p: Pos2| origin + p.to_vec2() * zoom;
        let color = self.palette.color32(self.tools.properties.label);
        let stroke = Stroke::new(1.5, color);
        let outline = Stroke::new(1.0, Color32::WHITE);
        let radius = self.tools.properties.radius;
        let cursor = self.tools.tool_state.cursor;
        let mut shapes = Vec::new();

        if self.tools.active_tool.uses_radius()
            && let Some(c) = cursor
        {
            shapes.push(Shape::circle_stroke(to_screen(c), radius.max(0.5) * zoom, stroke));
        }

        if let (Some(anchor), Some(c)) = (self.tools.line_state.anchor, cursor) {
            let end = BrushPoint::new(c, radius);
            shapes.extend(capsule_outline(&anchor, &end, &to_screen, zoom, stroke));
        }

        let points = &self.tools.polygon_state.points;
        if !points.is_empty() {
            let mut screen: Vec<Pos2> = points.iter().map(|p| to_screen(*p)).collect();
            if let Some(c) = cursor {
                screen.push(to_screen(c));
            }
            shapes.push(Shape::closed_line(screen, stroke));
        }

        if let Some(rect) = self.tools.selection_state.rect {
            let screen = Rect::from_two_pos(to_screen(rect.min), to_screen(rect.max));
            shapes.push(Shape::rect_stroke(screen, 0.0, outline));
        }
        shapes
    }
}

fn capsule_outline(
    start: &BrushPoint,
    end: &BrushPoint,
    to_screen: &impl Fn(Pos2) -> Pos2,
    zoom: f32,
    stroke: Stroke,
) -> Vec<Shape> {
    let mut shapes = vec![
        Shape::circle_stroke(to_screen(start.pos), start.radius.max(0.5) * zoom, stroke),
        Shape::circle_stroke(to_screen(end.pos), end.radius.max(0.5) * zoom, stroke),
    ];
    let d = end.pos - start.pos;
    let len = d.length();
    if len > 1e-4 {
        let n = Vec2::new(d.y, -d.x) / len;
        shapes.push(Shape::line_segment(
            [to_screen(start.pos + n * start.radius), to_screen(end.pos + n * end.radius)],
            stroke,
        ));
        shapes.push(Shape::line_segment(
            [to_screen(start.pos - n * start.radius), to_screen(end.pos - n * end.radius)],
            stroke,
        ));
    }
    shapes
}
