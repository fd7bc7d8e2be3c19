use std::collections::HashSet;

use annotate::components::events::GestureKind;
use annotate::config::SessionConfig;
use annotate::ops::superpixels::SuperpixelParams;
use annotate::{EditorSession, LabelBuffer, PointerEvent, Tool};
use egui::{Modifiers, PointerButton, Pos2};
use image::{Rgba, RgbaImage};

fn session(w: u32, h: u32) -> EditorSession {
    let mut s = EditorSession::new(SessionConfig::default());
    s.load_image(RgbaImage::from_pixel(w, h, Rgba([50, 50, 50, 255])), vec![]);
    s
}

fn press_with(s: &mut EditorSession, x: f32, y: f32, button: PointerButton, modifiers: Modifiers) {
    s.handle_event(PointerEvent::Pressed {
        pos: Pos2::new(x, y),
        button,
        modifiers,
    });
}

fn press(s: &mut EditorSession, x: f32, y: f32) {
    press_with(s, x, y, PointerButton::Primary, Modifiers::NONE);
}

fn move_to(s: &mut EditorSession, x: f32, y: f32, modifiers: Modifiers) {
    s.handle_event(PointerEvent::Moved {
        pos: Pos2::new(x, y),
        modifiers,
    });
}

fn release(s: &mut EditorSession, x: f32, y: f32) {
    s.handle_event(PointerEvent::Released {
        pos: Pos2::new(x, y),
        button: PointerButton::Primary,
        modifiers: Modifiers::NONE,
    });
}

fn mask(s: &EditorSession) -> LabelBuffer {
    s.active_mask().unwrap().clone()
}

fn labelled(buf: &LabelBuffer, label: u8) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    for y in 0..buf.height() {
        for x in 0..buf.width() {
            if buf.get(x, y) == Some(label) {
                out.push((x, y));
            }
        }
    }
    out
}

const SHIFT: Modifiers = Modifiers {
    alt: false,
    ctrl: false,
    shift: true,
    mac_cmd: false,
    command: false,
};

const COMMAND: Modifiers = Modifiers {
    alt: false,
    ctrl: true,
    shift: false,
    mac_cmd: false,
    command: true,
};

#[test]
fn brush_dab_paints_disk_and_records_gesture() {
    let mut s = session(50, 50);
    s.set_tool(Tool::Points);
    s.set_brush_radius(3.0);
    s.set_label(2);
    press(&mut s, 10.0, 10.0);
    release(&mut s, 10.0, 10.0);

    let m = mask(&s);
    assert_eq!(m.count(2), 29);
    for (x, y) in labelled(&m, 2) {
        let (dx, dy) = (x as f32 - 10.0, y as f32 - 10.0);
        assert!(dx * dx + dy * dy <= 9.0 + 1e-3);
    }
    assert_eq!(s.history().undo_count(), 1);
    assert_eq!(
        s.events().kinds(),
        vec![GestureKind::BeginDrawing, GestureKind::EndDrawing]
    );
    assert!(!s.is_drawing());
}

#[test]
fn drag_paints_every_sample_until_release() {
    let mut s = session(40, 20);
    s.set_brush_radius(1.0);
    press(&mut s, 5.0, 5.0);
    move_to(&mut s, 20.0, 5.0, Modifiers::NONE);
    release(&mut s, 20.0, 5.0);
    move_to(&mut s, 30.0, 5.0, Modifiers::NONE);

    let m = mask(&s);
    assert_eq!(m.get(5, 5), Some(1));
    assert_eq!(m.get(20, 5), Some(1));
    assert_eq!(m.get(30, 5), Some(0));
    // One history entry per primitive call.
    assert_eq!(s.history().undo_count(), 2);
}

#[test]
fn two_click_line_paints_capsule() {
    let mut s = session(40, 20);
    s.set_tool(Tool::Lines);
    s.set_brush_radius(2.0);
    press(&mut s, 5.0, 10.0);
    assert!(s.line_anchor().is_some());
    assert_eq!(mask(&s).count(1), 0);

    press(&mut s, 30.0, 10.0);
    let m = mask(&s);
    for x in 5..=30 {
        assert_eq!(m.get(x, 10), Some(1), "gap at x={x}");
    }
    assert_eq!(m.get(17, 12), Some(1));
    assert_eq!(m.get(17, 13), Some(0));
    assert!(s.line_anchor().is_none());
    assert_eq!(
        s.events().kinds(),
        vec![GestureKind::BeginDrawing, GestureKind::EndDrawing]
    );
}

#[test]
fn vertical_two_click_line_stays_in_its_band() {
    let mut s = session(30, 60);
    s.set_tool(Tool::Lines);
    s.set_brush_radius(2.0);
    s.set_label(7);
    press(&mut s, 10.0, 10.0);
    press(&mut s, 10.0, 20.0);

    let m = mask(&s);
    for y in 10..=20 {
        for x in 8..=12 {
            assert_eq!(m.get(x, y), Some(7), "gap at ({x},{y})");
        }
        assert_eq!(m.get(7, y), Some(0));
        assert_eq!(m.get(13, y), Some(0));
    }
    assert_eq!(m.get(10, 8), Some(7));
    assert_eq!(m.get(10, 22), Some(7));
    assert_eq!(m.get(10, 23), Some(0));
    assert_eq!(m.get(10, 50), Some(0));
}

#[test]
fn line_continues_with_modifier_and_aborts_on_secondary() {
    let mut s = session(40, 40);
    s.set_tool(Tool::Lines);
    s.set_brush_radius(1.0);
    press(&mut s, 5.0, 5.0);
    press_with(&mut s, 30.0, 5.0, PointerButton::Primary, COMMAND);
    assert_eq!(s.line_anchor().map(|a| a.pos), Some(Pos2::new(30.0, 5.0)));

    press(&mut s, 30.0, 30.0);
    let m = mask(&s);
    assert_eq!(m.get(30, 20), Some(1));
    assert!(s.line_anchor().is_none());

    press(&mut s, 2.0, 35.0);
    let before = mask(&s);
    press_with(&mut s, 20.0, 35.0, PointerButton::Secondary, Modifiers::NONE);
    assert!(s.line_anchor().is_none());
    assert_eq!(mask(&s), before);
}

#[test]
fn undo_after_flood_fill_restores_previous_mask() {
    let mut s = session(10, 10);
    s.set_tool(Tool::Lines);
    s.set_brush_radius(0.0);
    press(&mut s, 5.0, 0.0);
    press(&mut s, 5.0, 9.0);
    let walled = mask(&s);
    assert_eq!(walled.count(1), 10);

    s.set_tool(Tool::Fill);
    s.set_label(2);
    press(&mut s, 1.0, 1.0);
    assert_eq!(mask(&s).count(2), 50);
    assert_eq!(mask(&s).get(8, 8), Some(0));

    assert_eq!(s.undo().as_deref(), Some("Flood Fill"));
    assert_eq!(mask(&s), walled);
}

#[test]
fn flood_fill_twice_is_idempotent() {
    let mut s = session(12, 12);
    s.set_tool(Tool::Fill);
    press(&mut s, 3.0, 3.0);
    let once = mask(&s);
    press(&mut s, 3.0, 3.0);
    assert_eq!(mask(&s), once);
}

#[test]
fn undo_redo_round_trip() {
    let mut s = session(30, 30);
    let initial = mask(&s);
    s.set_brush_radius(2.0);
    press(&mut s, 5.0, 5.0);
    release(&mut s, 5.0, 5.0);
    s.set_tool(Tool::Polygons);
    s.set_label(3);
    press(&mut s, 10.0, 10.0);
    press(&mut s, 25.0, 10.0);
    press_with(&mut s, 25.0, 25.0, PointerButton::Secondary, Modifiers::NONE);
    let final_mask = mask(&s);
    let steps = s.history().undo_count();
    assert_eq!(steps, 2);

    for _ in 0..steps {
        assert!(s.undo().is_some());
    }
    assert_eq!(mask(&s), initial);
    assert_eq!(s.undo(), None);

    for _ in 0..steps {
        assert!(s.redo().is_some());
    }
    assert_eq!(mask(&s), final_mask);
}

#[test]
fn new_edit_invalidates_redo() {
    let mut s = session(20, 20);
    press(&mut s, 5.0, 5.0);
    release(&mut s, 5.0, 5.0);
    s.undo();
    assert!(s.history().can_redo());
    press(&mut s, 10.0, 10.0);
    assert!(!s.history().can_redo());
    assert_eq!(s.redo(), None);
}

#[test]
fn out_of_range_pointer_is_clamped() {
    let mut s = session(20, 20);
    s.set_brush_radius(0.0);
    press(&mut s, -100.0, 500.0);
    let m = mask(&s);
    assert_eq!(labelled(&m, 1), vec![(0, 19)]);
}

#[test]
fn polygon_fill_stays_inside() {
    let mut s = session(20, 20);
    s.set_tool(Tool::Polygons);
    press(&mut s, 2.0, 2.0);
    press(&mut s, 17.0, 2.0);
    assert_eq!(mask(&s).count(1), 0);
    press_with(&mut s, 2.0, 17.0, PointerButton::Secondary, Modifiers::NONE);

    let m = mask(&s);
    assert!(m.count(1) > 50);
    for (x, y) in labelled(&m, 1) {
        assert!(x >= 2 && y >= 2 && x + y <= 19, "({x},{y}) outside triangle");
    }
    assert!(s.pending_polygon().is_empty());
    assert_eq!(
        s.events().kinds(),
        vec![GestureKind::BeginDrawing, GestureKind::EndDrawing]
    );
}

#[test]
fn polygon_with_two_vertices_is_discarded() {
    let mut s = session(20, 20);
    s.set_tool(Tool::Polygons);
    press(&mut s, 2.0, 2.0);
    press_with(&mut s, 10.0, 10.0, PointerButton::Secondary, Modifiers::NONE);
    assert_eq!(mask(&s).count(1), 0);
    assert!(!s.history().can_undo());
}

fn quadrant_image(size: u32) -> RgbaImage {
    let half = size / 2;
    RgbaImage::from_fn(size, size, |x, y| match (x < half, y < half) {
        (true, true) => Rgba([255, 0, 0, 255]),
        (false, true) => Rgba([0, 255, 0, 255]),
        (true, false) => Rgba([0, 0, 255, 255]),
        (false, false) => Rgba([255, 255, 0, 255]),
    })
}

#[test]
fn region_paint_covers_whole_regions_only() {
    let mut s = EditorSession::new(SessionConfig {
        superpixels: SuperpixelParams {
            region_size: 10,
            smoothness: 10.0,
            iterations: 10,
        },
        ..Default::default()
    });
    s.load_image(quadrant_image(40), vec![]);
    assert!(s.superpixels().is_none());

    s.set_tool(Tool::SuperPixels);
    s.set_brush_radius(1.0);
    press(&mut s, 5.0, 5.0);
    release(&mut s, 5.0, 5.0);

    let index = s.superpixels().unwrap();
    let m = mask(&s);
    let hit: HashSet<u32> = labelled(&m, 1)
        .into_iter()
        .map(|(x, y)| index.region_at(x, y).unwrap())
        .collect();
    assert!(!hit.is_empty());
    for y in 0..40 {
        for x in 0..40 {
            let region = index.region_at(x, y).unwrap();
            let painted = m.get(x, y) == Some(1);
            assert_eq!(painted, hit.contains(&region), "({x},{y})");
            if painted {
                assert!(x < 20 && y < 20, "paint leaked out of the red quadrant");
            }
        }
    }
}

#[test]
fn superpixel_mode_without_image_is_noop() {
    let mut s = EditorSession::default();
    s.set_tool(Tool::SuperPixels);
    assert!(s.superpixels().is_none());
    press(&mut s, 1.0, 1.0);
    assert!(!s.history().can_undo());
}

#[test]
fn loading_a_new_image_resets_state() {
    let mut s = session(20, 20);
    s.set_tool(Tool::SuperPixels);
    assert!(s.superpixels().is_some());
    press(&mut s, 5.0, 5.0);
    s.load_image(RgbaImage::new(30, 10), vec![]);
    assert_eq!(s.dimensions(), (30, 10));
    assert!(!s.history().can_undo());
    assert!(s.events().is_empty());
    assert!(!s.is_drawing());
    // Still in superpixel mode, so the index is rebuilt for the new image.
    assert_eq!(s.superpixels().map(|i| i.dimensions()), Some((30, 10)));
}

#[test]
fn switching_tools_cancels_gesture() {
    let mut s = session(20, 20);
    s.set_tool(Tool::Lines);
    press(&mut s, 3.0, 3.0);
    let before = mask(&s);
    s.set_tool(Tool::Fill);
    assert!(s.line_anchor().is_none());
    assert_eq!(mask(&s), before);
    assert_eq!(s.events().kinds().last(), Some(&GestureKind::EndDrawing));

    // Nothing in progress: no extra event.
    let n = s.events().len();
    s.set_tool(Tool::Points);
    assert_eq!(s.events().len(), n);
}

#[test]
fn shift_drag_adjusts_radius_within_range() {
    let mut s = session(20, 20);
    s.set_brush_radius(10.0);
    assert_eq!(s.take_radius_change(), None);

    move_to(&mut s, 10.0, 10.0, Modifiers::NONE);
    move_to(&mut s, 10.0, 6.0, SHIFT);
    assert_eq!(s.brush_radius(), 12.0);
    assert_eq!(s.take_radius_change(), Some(12.0));
    assert_eq!(s.take_radius_change(), None);

    move_to(&mut s, 10.0, -5000.0, SHIFT);
    assert_eq!(s.brush_radius(), 100.0);
    move_to(&mut s, 10.0, 5000.0, SHIFT);
    assert_eq!(s.brush_radius(), 0.0);
    assert_eq!(s.take_radius_change(), Some(0.0));

    // Radius changes never paint.
    assert_eq!(mask(&s).count(1), 0);
    assert_eq!(s.set_brush_radius(1e6), 100.0);
    assert_eq!(s.take_radius_change(), None);
}

#[test]
fn selection_delete_resets_to_default_label() {
    let mut s = session(12, 12);
    s.set_tool(Tool::Fill);
    press(&mut s, 0.0, 0.0);
    assert_eq!(mask(&s).count(1), 144);

    s.set_tool(Tool::Selection);
    press(&mut s, 6.0, 5.0);
    move_to(&mut s, 2.0, 2.0, Modifiers::NONE);
    release(&mut s, 2.0, 2.0);
    let rect = s.selection().unwrap();
    assert_eq!(rect.min, Pos2::new(2.0, 2.0));
    assert_eq!(rect.max, Pos2::new(6.0, 5.0));
    assert_eq!(s.events().kinds().last(), Some(&GestureKind::Selection));

    assert_eq!(s.delete_selection(), Some((2, 2, 6, 5)));
    assert_eq!(mask(&s).count(0), 20);
    assert!(s.selection().is_none());
    assert_eq!(s.delete_selection(), None);

    s.undo();
    assert_eq!(mask(&s).count(1), 144);
}

#[test]
fn select_all_delete_reaches_last_row_and_column() {
    let mut s = session(10, 10);
    s.set_tool(Tool::Fill);
    press(&mut s, 3.0, 3.0);
    assert_eq!(mask(&s).count(1), 100);

    s.set_tool(Tool::Selection);
    press(&mut s, -50.0, -50.0);
    move_to(&mut s, 500.0, 500.0, Modifiers::NONE);
    release(&mut s, 500.0, 500.0);
    assert_eq!(s.delete_selection(), Some((0, 0, 9, 9)));
    assert_eq!(mask(&s).count(0), 100);
}

#[test]
fn cancel_drops_selection() {
    let mut s = session(12, 12);
    s.set_tool(Tool::Selection);
    press(&mut s, 1.0, 1.0);
    release(&mut s, 4.0, 4.0);
    assert!(s.selection().is_some());
    s.cancel();
    assert!(s.selection().is_none());
}

#[test]
fn mismatched_mask_falls_back_to_default() {
    let mut s = EditorSession::default();
    let good = LabelBuffer::new(8, 8, 4);
    let bad = LabelBuffer::new(3, 3, 4);
    s.load_image(RgbaImage::new(8, 8), vec![Some(good.clone()), Some(bad)]);
    assert_eq!(s.mask(0), Some(&good));
    assert_eq!(s.mask(1).unwrap().count(0), 64);
}

#[test]
fn zoomed_input_maps_to_image_pixels() {
    let mut s = session(20, 20);
    s.set_zoom_percent(400.0);
    s.set_brush_radius(0.0);
    press(&mut s, 40.0, 20.0);
    assert_eq!(labelled(&mask(&s), 1), vec![(10, 5)]);
    let frame = s.render();
    assert_eq!(frame.dimensions(), (80, 80));
}

#[test]
fn render_blends_active_layer_over_image() {
    let mut s = session(4, 4);
    s.set_layer_opacity(1, 1.0);
    s.set_tool(Tool::Fill);
    press(&mut s, 0.0, 0.0);
    let frame = s.render();
    let expected = s.palette().color(1);
    assert_eq!(frame.get_pixel(2, 2).0, [expected[0], expected[1], expected[2], 255]);

    s.set_layer_visible(1, false);
    assert_eq!(s.render().get_pixel(2, 2).0, [50, 50, 50, 255]);
    let color = s.to_color_image();
    assert_eq!(color.size, [4, 4]);
}
