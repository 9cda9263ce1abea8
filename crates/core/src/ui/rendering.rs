//! UI rendering helpers and overlay components.
//!
//! This module contains reusable rendering functions for the capture overlay
//! and the analysis window: the dark cutout effect, selection border, corner
//! handles, size readout, and image fitting.

use crate::config::Theme;
use crate::selection::{size_label_placement, size_label_text, Region};
use eframe::egui;

/// Side length of a corner handle, in points.
const HANDLE_SIZE: f32 = 6.0;

/// Draws the dark overlay with a transparent "cutout" for the selection area.
///
/// Creates a visual effect where the selected region is clear/bright while
/// the rest of the screen is dimmed, helping users focus on their selection.
///
/// # Arguments
/// * `painter` - The egui painter to draw with
/// * `screen_rect` - The full screen rectangle
/// * `selection_rect` - The selected area to keep clear
/// * `alpha` - Darkness level (0-255, higher = darker)
pub fn draw_selection_overlay(
    painter: &egui::Painter,
    screen_rect: egui::Rect,
    selection_rect: egui::Rect,
    alpha: u8,
) {
    let color = egui::Color32::from_black_alpha(alpha);

    // Above
    painter.rect_filled(
        egui::Rect::from_min_max(
            screen_rect.min,
            egui::pos2(screen_rect.max.x, selection_rect.min.y),
        ),
        0.0,
        color,
    );

    // Below
    painter.rect_filled(
        egui::Rect::from_min_max(
            egui::pos2(screen_rect.min.x, selection_rect.max.y),
            screen_rect.max,
        ),
        0.0,
        color,
    );

    // Left, between top and bottom strips
    painter.rect_filled(
        egui::Rect::from_min_max(
            egui::pos2(screen_rect.min.x, selection_rect.min.y),
            egui::pos2(selection_rect.min.x, selection_rect.max.y),
        ),
        0.0,
        color,
    );

    // Right, between top and bottom strips
    painter.rect_filled(
        egui::Rect::from_min_max(
            egui::pos2(selection_rect.max.x, selection_rect.min.y),
            egui::pos2(screen_rect.max.x, selection_rect.max.y),
        ),
        0.0,
        color,
    );
}

/// Draws a border just inside the selection rectangle.
pub fn draw_selection_border(
    painter: &egui::Painter,
    selection_rect: egui::Rect,
    stroke_width: f32,
    color: egui::Color32,
) {
    painter.rect_stroke(
        selection_rect,
        0.0,
        egui::Stroke::new(stroke_width, color),
        egui::StrokeKind::Inside,
    );
}

/// Draws small square handles on the four corners of the selection.
pub fn draw_corner_handles(painter: &egui::Painter, selection_rect: egui::Rect, color: egui::Color32) {
    let corners = [
        selection_rect.left_top(),
        selection_rect.right_top(),
        selection_rect.left_bottom(),
        selection_rect.right_bottom(),
    ];
    for corner in corners {
        painter.rect_filled(
            egui::Rect::from_center_size(corner, egui::vec2(HANDLE_SIZE, HANDLE_SIZE)),
            1.0,
            color,
        );
    }
}

/// Draws the `W × H` readout of a selection.
///
/// `region` is the selection in image pixels (what gets saved); `to_ui`
/// maps image pixels to screen points for painting.
pub fn draw_size_label(
    painter: &egui::Painter,
    region: Region,
    to_ui: impl Fn(i32, i32) -> egui::Pos2,
    pixels_per_point: f32,
) {
    let font = egui::FontId::monospace(13.0);
    let text = size_label_text(region);
    let galley = painter.layout_no_wrap(text, font, egui::Color32::WHITE);

    let padding = egui::vec2(6.0, 3.0);
    let label_height_px = ((galley.size().y + padding.y * 2.0) * pixels_per_point).ceil() as i32;
    let placement = size_label_placement(region, label_height_px);

    let origin = to_ui(placement.origin.x, placement.origin.y);
    let background = egui::Rect::from_min_size(origin, galley.size() + padding * 2.0);
    painter.rect_filled(background, 3.0, egui::Color32::from_black_alpha(180));
    painter.galley(origin + padding, galley, egui::Color32::WHITE);
}

/// Largest size with the image's aspect ratio that fits in `bounds`.
pub fn fit_size(image_size: [usize; 2], bounds: egui::Vec2) -> egui::Vec2 {
    let width = image_size[0].max(1) as f32;
    let height = image_size[1].max(1) as f32;
    let scale = (bounds.x / width).min(bounds.y / height).min(1.0);
    egui::vec2(width * scale, height * scale)
}

/// Visuals matching the configured theme.
pub fn visuals(theme: Theme) -> egui::Visuals {
    match theme {
        Theme::Dark => egui::Visuals::dark(),
        Theme::Light => egui::Visuals::light(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_size_downscales_keeping_ratio() {
        let size = fit_size([800, 400], egui::vec2(400.0, 400.0));
        assert_eq!(size, egui::vec2(400.0, 200.0));
    }

    #[test]
    fn test_fit_size_never_upscales() {
        let size = fit_size([100, 50], egui::vec2(400.0, 400.0));
        assert_eq!(size, egui::vec2(100.0, 50.0));
    }
}
