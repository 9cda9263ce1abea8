//! Fullscreen selection overlay.
//!
//! Translates egui pointer and key input into [`InputEvent`]s for the
//! [`CaptureController`] and paints the frozen snapshot with the selection
//! chrome on top.
//!
//! Points handed to the controller are in monitor coordinates, not snapshot
//! pixels: on HiDPI displays the snapshot is larger than the monitor by its
//! scale factor.

use super::rendering::{
    draw_corner_handles, draw_selection_border, draw_selection_overlay, draw_size_label,
};
use crate::capture::MonitorDescriptor;
use crate::image_processing::ImageProcessor;
use crate::selection::{CaptureController, Effect, InputEvent, Key, Point};
use eframe::egui;
use image::DynamicImage;

const DIM_ALPHA: u8 = 100;
const BORDER_COLOR: egui::Color32 = egui::Color32::from_rgb(0, 255, 0);

/// The overlay: snapshot texture plus the capture state machine.
pub struct OverlayView {
    controller: CaptureController,
    texture: Option<egui::TextureHandle>,
    /// Pre-converted image data for fast texture upload
    color_image: Option<egui::ColorImage>,
    /// Monitor size in the units the controller and grabber work in.
    frame_size: [u32; 2],
}

impl OverlayView {
    pub fn new(snapshot: &DynamicImage, monitor: MonitorDescriptor) -> Self {
        Self {
            controller: CaptureController::new(monitor),
            texture: None,
            color_image: Some(ImageProcessor::to_color_image(snapshot)),
            frame_size: [monitor.width, monitor.height],
        }
    }

    /// Renders one frame and returns the effects of this frame's input.
    ///
    /// A frame that requests a capture paints the bare snapshot: the window is
    /// about to be hidden and must not flash the dimmed idle state.
    pub fn show(&mut self, ctx: &egui::Context) -> Vec<Effect> {
        if self.texture.is_none() {
            if let Some(color_image) = self.color_image.take() {
                self.texture =
                    Some(ctx.load_texture("snapshot", color_image, egui::TextureOptions::LINEAR));
            }
        }

        let panel_frame = egui::Frame::default()
            .inner_margin(egui::Margin::same(0))
            .outer_margin(egui::Margin::same(0));

        let mut effects = Vec::new();
        egui::CentralPanel::default().frame(panel_frame).show(ctx, |ui| {
            let rect = ui.max_rect();

            if let Some(texture) = &self.texture {
                ui.painter().image(
                    texture.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }

            ctx.set_cursor_icon(egui::CursorIcon::Crosshair);
            let response = ui.interact(rect, ui.id().with("selection"), egui::Sense::drag());
            for event in self.collect_input(ctx, &response, rect) {
                effects.extend(self.controller.handle(event));
            }

            let capturing = effects.iter().any(|e| matches!(e, Effect::Capture(_)));
            if !capturing {
                self.paint_chrome(ui, rect, ctx.pixels_per_point());
            }
        });

        if effects.contains(&Effect::Redraw) {
            ctx.request_repaint();
        }
        effects
    }

    fn collect_input(
        &self,
        ctx: &egui::Context,
        response: &egui::Response,
        rect: egui::Rect,
    ) -> Vec<InputEvent> {
        let to_local = |pos: egui::Pos2| {
            ImageProcessor::to_image_point((pos - rect.min).to_pos2(), rect.size(), self.frame_size)
        };
        let pointer = response
            .interact_pointer_pos()
            .or_else(|| ctx.pointer_latest_pos())
            .map(to_local);

        let mut events = Vec::new();
        if let Some(p) = pointer {
            if response.drag_started() {
                events.push(InputEvent::PointerDown(p));
            } else if response.dragged() {
                events.push(InputEvent::PointerMove(p));
            } else if response.drag_stopped() {
                events.push(InputEvent::PointerUp(p));
            }
        }

        ctx.input(|i| {
            if i.key_pressed(egui::Key::Escape) {
                events.push(InputEvent::Key(Key::Escape));
            }
            if i.key_pressed(egui::Key::Enter) {
                events.push(InputEvent::Key(Key::Enter));
            }
        });
        events
    }

    fn paint_chrome(&self, ui: &egui::Ui, rect: egui::Rect, pixels_per_point: f32) {
        let painter = ui.painter();
        let frame_size = self.frame_size;
        let to_ui = |x: i32, y: i32| {
            rect.min + ImageProcessor::to_ui_pos(Point::new(x, y), rect.size(), frame_size).to_vec2()
        };

        let Some(selection) = self.controller.state().selection() else {
            painter.rect_filled(rect, 0.0, egui::Color32::from_black_alpha(DIM_ALPHA));
            return;
        };

        let region = selection.normalized();
        let selection_rect = egui::Rect::from_min_max(
            to_ui(region.x, region.y),
            to_ui(region.x + region.width, region.y + region.height),
        );

        draw_selection_overlay(painter, rect, selection_rect, DIM_ALPHA);
        if region.is_empty() {
            return;
        }
        draw_selection_border(painter, selection_rect, 1.0, BORDER_COLOR);
        draw_corner_handles(painter, selection_rect, BORDER_COLOR);
        draw_size_label(painter, region, to_ui, pixels_per_point);
    }
}
